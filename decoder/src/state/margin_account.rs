//! Margin accounts and the perp positions and orders they hold.
use bytemuck::{Pod, Zeroable};
use rust_decimal::Decimal;
use solana_program::pubkey::Pubkey;

use crate::{
    adapters::{optional_pubkey, Flag, LeI128, LeI64, LeU64, I80F48},
    error::MangoResult,
    utils::cast_layout,
};

use super::{
    AccountLayout, DataType, MetaData, Side, FREE_ORDER_SLOT, MAX_PAIRS, MAX_PERP_OPEN_ORDERS,
    MAX_TOKENS,
};

/// Byte layout of a [`PerpAccount`].
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct PerpAccountLayout {
    pub base_position: LeI64,
    pub quote_position: I80F48,
    pub long_settled_funding: I80F48,
    pub short_settled_funding: I80F48,
    pub bids_quantity: LeI64,
    pub asks_quantity: LeI64,
    pub taker_base: LeI64,
    pub taker_quote: LeI64,
    pub mngo_accrued: LeU64,
}

/// Byte layout of a [`MarginAccount`] account.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct MarginAccountLayout {
    pub meta_data: MetaData,
    pub mango_group: Pubkey,
    pub owner: Pubkey,
    pub in_margin_basket: [Flag; MAX_PAIRS],
    pub num_in_margin_basket: u8,
    pub deposits: [I80F48; MAX_TOKENS],
    pub borrows: [I80F48; MAX_TOKENS],
    pub spot_open_orders: [Pubkey; MAX_PAIRS],
    pub perp_accounts: [PerpAccountLayout; MAX_PAIRS],
    pub order_market: [u8; MAX_PERP_OPEN_ORDERS],
    pub order_side: [u8; MAX_PERP_OPEN_ORDERS],
    pub orders: [LeI128; MAX_PERP_OPEN_ORDERS],
    pub client_order_ids: [LeU64; MAX_PERP_OPEN_ORDERS],
    pub msrm_amount: LeU64,
    pub being_liquidated: Flag,
    pub is_bankrupt: Flag,
    pub info: [u8; 32],
    pub advanced_orders_key: Pubkey,
    pub not_upgradable: Flag,
    pub delegate: Pubkey,
    pub padding: [u8; 5],
}

/// Position of a margin account in one perp market.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerpAccount {
    /// Signed position in base lots.
    pub base_position: i64,
    /// Signed quote balance in quote native units.
    pub quote_position: Decimal,
    /// Funding index at the last settlement of a long position.
    pub long_settled_funding: Decimal,
    /// Funding index at the last settlement of a short position.
    pub short_settled_funding: Decimal,
    /// Base lots resting in open bids.
    pub bids_quantity: i64,
    /// Base lots resting in open asks.
    pub asks_quantity: i64,
    /// Base lots taken but not yet applied by the event consumer.
    pub taker_base: i64,
    /// Quote lots taken but not yet applied by the event consumer.
    pub taker_quote: i64,
    /// Liquidity mining rewards not yet redeemed.
    pub mngo_accrued: u64,
}

impl PerpAccount {
    fn from_layout(layout: &PerpAccountLayout) -> Self {
        PerpAccount {
            base_position: layout.base_position.get(),
            quote_position: layout.quote_position.to_decimal(),
            long_settled_funding: layout.long_settled_funding.to_decimal(),
            short_settled_funding: layout.short_settled_funding.to_decimal(),
            bids_quantity: layout.bids_quantity.get(),
            asks_quantity: layout.asks_quantity.get(),
            taker_base: layout.taker_base.get(),
            taker_quote: layout.taker_quote.get(),
            mngo_accrued: layout.mngo_accrued.get(),
        }
    }

    /// No position, no resting orders and nothing pending.
    pub fn is_empty(&self) -> bool {
        self.base_position == 0
            && self.quote_position.is_zero()
            && self.bids_quantity == 0
            && self.asks_quantity == 0
            && self.taker_base == 0
            && self.taker_quote == 0
    }
}

/// A resting perp order referenced from a margin account's order slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerpOpenOrder {
    /// Index of the order slot in the account.
    pub slot: usize,
    /// Perp market slot in the group.
    pub market_index: usize,
    #[allow(missing_docs)]
    pub side: Side,
    /// The order's book key.
    pub order_id: i128,
    #[allow(missing_docs)]
    pub client_order_id: u64,
}

/// A user's margin account: deposits, borrows, spot open orders and perp positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarginAccount {
    #[allow(missing_docs)]
    pub meta_data: MetaData,
    /// The [`Group`](super::Group) the account belongs to.
    pub mango_group: Pubkey,
    #[allow(missing_docs)]
    pub owner: Pubkey,
    /// Whether each spot market counts toward the account's health.
    pub in_margin_basket: Vec<bool>,
    /// Number of `true` entries in `in_margin_basket`.
    pub num_in_margin_basket: u8,
    /// Per token, in deposit units.
    pub deposits: Vec<Decimal>,
    /// Per token, in borrow units.
    pub borrows: Vec<Decimal>,
    /// Serum open orders account per spot market, if created.
    pub spot_open_orders: Vec<Option<Pubkey>>,
    /// One entry per perp market slot.
    pub perp_accounts: Vec<PerpAccount>,
    /// Used slots only, in slot order.
    pub perp_orders: Vec<PerpOpenOrder>,
    /// MSRM deposited for serum fee discounts.
    pub msrm_amount: u64,
    /// A liquidation is in progress.
    pub being_liquidated: bool,
    /// Liabilities exceed assets and no assets are left.
    pub is_bankrupt: bool,
    /// Account name bytes, see [`MarginAccount::name`].
    pub info: [u8; 32],
    /// The advanced orders account, if created.
    pub advanced_orders_key: Option<Pubkey>,
    /// The account opted out of layout upgrades.
    pub not_upgradable: bool,
    /// Key allowed to trade on the owner's behalf, if set.
    pub delegate: Option<Pubkey>,
}

impl MarginAccount {
    /// Account data length.
    pub const LEN: usize = std::mem::size_of::<MarginAccountLayout>();

    /// The account name, with trailing zero bytes removed.
    pub fn name(&self) -> String {
        let end = self
            .info
            .iter()
            .rposition(|b| *b != 0)
            .map_or(0, |last| last + 1);
        String::from_utf8_lossy(&self.info[..end]).into_owned()
    }

    /// Open perp orders on one market, in slot order.
    pub fn perp_orders_for_market(
        &self,
        market_index: usize,
    ) -> impl Iterator<Item = &PerpOpenOrder> + '_ {
        self.perp_orders
            .iter()
            .filter(move |o| o.market_index == market_index)
    }

    #[allow(missing_docs)]
    pub fn find_order_by_client_id(&self, client_order_id: u64) -> Option<&PerpOpenOrder> {
        self.perp_orders
            .iter()
            .find(|o| o.client_order_id == client_order_id)
    }
}

impl AccountLayout for MarginAccount {
    const NAME: &'static str = "MarginAccount";

    fn decode(data: &[u8]) -> MangoResult<Self> {
        let layout: &MarginAccountLayout = cast_layout(Self::NAME, data)?;
        layout.meta_data.check(DataType::MangoAccount)?;

        let mut perp_orders = Vec::new();
        for slot in 0..MAX_PERP_OPEN_ORDERS {
            let market = layout.order_market[slot];
            if market == FREE_ORDER_SLOT {
                continue;
            }
            perp_orders.push(PerpOpenOrder {
                slot,
                market_index: market as usize,
                side: Side::from_raw(layout.order_side[slot])?,
                order_id: layout.orders[slot].get(),
                client_order_id: layout.client_order_ids[slot].get(),
            });
        }

        Ok(MarginAccount {
            meta_data: layout.meta_data,
            mango_group: layout.mango_group,
            owner: layout.owner,
            in_margin_basket: layout.in_margin_basket.iter().map(|f| f.get()).collect(),
            num_in_margin_basket: layout.num_in_margin_basket,
            deposits: layout.deposits.iter().map(|d| d.to_decimal()).collect(),
            borrows: layout.borrows.iter().map(|b| b.to_decimal()).collect(),
            spot_open_orders: layout
                .spot_open_orders
                .iter()
                .map(|k| optional_pubkey(*k))
                .collect(),
            perp_accounts: layout
                .perp_accounts
                .iter()
                .map(PerpAccount::from_layout)
                .collect(),
            perp_orders,
            msrm_amount: layout.msrm_amount.get(),
            being_liquidated: layout.being_liquidated.get(),
            is_bankrupt: layout.is_bankrupt.get(),
            info: layout.info,
            advanced_orders_key: optional_pubkey(layout.advanced_orders_key),
            not_upgradable: layout.not_upgradable.get(),
            delegate: optional_pubkey(layout.delegate),
        })
    }
}
