//! Serum dex open orders records. These are owned by the dex program and carry
//! the serum framing instead of a [`MetaData`](super::MetaData) header.
use bytemuck::{Pod, Zeroable};
use solana_program::pubkey::Pubkey;

use crate::{
    adapters::{LeU128, LeU64},
    error::MangoResult,
    utils::{cast_layout, strip_serum_padding, SERUM_HEAD_PADDING, SERUM_TAIL_PADDING},
};

use super::{AccountLayout, Side};

/// Order slots in a serum open orders account.
pub const MAX_SPOT_OPEN_ORDERS: usize = 128;

/// Byte layout of an [`OpenOrders`] body, between the serum markers.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct OpenOrdersLayout {
    pub account_flags: LeU64,
    pub market: Pubkey,
    pub owner: Pubkey,
    pub base_token_free: LeU64,
    pub base_token_total: LeU64,
    pub quote_token_free: LeU64,
    pub quote_token_total: LeU64,
    pub free_slot_bits: LeU128,
    pub is_bid_bits: LeU128,
    pub orders: [LeU128; MAX_SPOT_OPEN_ORDERS],
    pub client_ids: [LeU64; MAX_SPOT_OPEN_ORDERS],
    pub referrer_rebates_accrued: LeU64,
}

/// A resting order on a serum market.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpotOpenOrder {
    #[allow(missing_docs)]
    pub slot: usize,
    #[allow(missing_docs)]
    pub side: Side,
    /// The order's book key.
    pub order_id: u128,
    /// Price in lots, the high 64 bits of the order id.
    pub price: u64,
    #[allow(missing_docs)]
    pub client_id: u64,
}

/// Balances and resting orders of one owner on one serum market.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOrders {
    /// Serum account flag bits.
    pub account_flags: u64,
    /// The serum market account.
    pub market: Pubkey,
    #[allow(missing_docs)]
    pub owner: Pubkey,
    /// Settleable base native units.
    pub base_token_free: u64,
    /// Base native units held, free or locked in orders.
    pub base_token_total: u64,
    /// Settleable quote native units.
    pub quote_token_free: u64,
    /// Quote native units held, free or locked in orders.
    pub quote_token_total: u64,
    /// Bit `i` set when slot `i` is unused.
    pub free_slot_bits: u128,
    /// Bit `i` set when slot `i` holds a bid.
    pub is_bid_bits: u128,
    /// Used slots only, in slot order.
    pub orders: Vec<SpotOpenOrder>,
    /// Quote native units owed to the referrer.
    pub referrer_rebates_accrued: u64,
}

impl OpenOrders {
    /// Length of the body between the serum markers.
    pub const BODY_LEN: usize = std::mem::size_of::<OpenOrdersLayout>();
    /// Account data length.
    pub const LEN: usize = SERUM_HEAD_PADDING.len() + Self::BODY_LEN + SERUM_TAIL_PADDING.len();

    /// `false` for slots beyond [`MAX_SPOT_OPEN_ORDERS`].
    pub fn is_slot_free(&self, slot: usize) -> bool {
        slot < MAX_SPOT_OPEN_ORDERS && self.free_slot_bits & (1u128 << slot) != 0
    }

    /// Base native units locked in resting orders.
    pub fn base_token_locked(&self) -> u64 {
        self.base_token_total.saturating_sub(self.base_token_free)
    }

    /// Quote native units locked in resting orders.
    pub fn quote_token_locked(&self) -> u64 {
        self.quote_token_total.saturating_sub(self.quote_token_free)
    }
}

impl AccountLayout for OpenOrders {
    const NAME: &'static str = "OpenOrders";

    fn decode(data: &[u8]) -> MangoResult<Self> {
        crate::utils::check_size(Self::NAME, Self::LEN, data)?;
        let body = strip_serum_padding(data)?;
        let layout: &OpenOrdersLayout = cast_layout(Self::NAME, body)?;

        let free_slot_bits = layout.free_slot_bits.get();
        let is_bid_bits = layout.is_bid_bits.get();
        let orders = (0..MAX_SPOT_OPEN_ORDERS)
            .filter(|slot| free_slot_bits & (1u128 << slot) == 0)
            .map(|slot| {
                let order_id = layout.orders[slot].get();
                let side = if is_bid_bits & (1u128 << slot) != 0 {
                    Side::Bid
                } else {
                    Side::Ask
                };
                SpotOpenOrder {
                    slot,
                    side,
                    order_id,
                    price: (order_id >> 64) as u64,
                    client_id: layout.client_ids[slot].get(),
                }
            })
            .collect();

        Ok(OpenOrders {
            account_flags: layout.account_flags.get(),
            market: layout.market,
            owner: layout.owner,
            base_token_free: layout.base_token_free.get(),
            base_token_total: layout.base_token_total.get(),
            quote_token_free: layout.quote_token_free.get(),
            quote_token_total: layout.quote_token_total.get(),
            free_slot_bits,
            is_bid_bits,
            orders,
            referrer_rebates_accrued: layout.referrer_rebates_accrued.get(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::MangoError, utils::add_serum_padding};

    #[test]
    fn open_orders_size() {
        assert_eq!(OpenOrders::BODY_LEN, 3216);
        assert_eq!(OpenOrders::LEN, 3228);
    }

    #[test]
    fn decode_open_orders() {
        let mut layout = OpenOrdersLayout::zeroed();
        layout.market = Pubkey::new_unique();
        layout.base_token_free = LeU64::new(5);
        layout.base_token_total = LeU64::new(12);
        // slots 0 and 3 in use, slot 3 is a bid
        layout.free_slot_bits = LeU128::new(!0u128 & !(1 | 1 << 3));
        layout.is_bid_bits = LeU128::new(1 << 3);
        layout.orders[0] = LeU128::new((250u128 << 64) | 17);
        layout.orders[3] = LeU128::new((240u128 << 64) | 18);
        layout.client_ids[3] = LeU64::new(4242);

        let data = add_serum_padding(bytemuck::bytes_of(&layout));
        let open_orders = OpenOrders::decode(&data).unwrap();
        assert_eq!(open_orders.market, layout.market);
        assert_eq!(open_orders.base_token_locked(), 7);
        assert_eq!(open_orders.orders.len(), 2);
        assert!(!open_orders.is_slot_free(3));
        assert!(open_orders.is_slot_free(4));
        assert!(!open_orders.is_slot_free(MAX_SPOT_OPEN_ORDERS));

        let ask = open_orders.orders[0];
        assert_eq!((ask.slot, ask.side, ask.price), (0, Side::Ask, 250));
        let bid = open_orders.orders[1];
        assert_eq!((bid.slot, bid.side, bid.price), (3, Side::Bid, 240));
        assert_eq!(bid.client_id, 4242);
    }

    #[test]
    fn decode_open_orders_checks_framing() {
        let layout = OpenOrdersLayout::zeroed();
        let mut data = add_serum_padding(bytemuck::bytes_of(&layout));
        data[1] = 0;
        assert!(matches!(
            OpenOrders::decode(&data),
            Err(MangoError::WrongAccountHeadPadding)
        ));
        assert!(matches!(
            OpenOrders::decode(&data[..OpenOrders::LEN - 1]),
            Err(MangoError::SizeMismatch {
                expected: 3228,
                actual: 3227,
                ..
            })
        ));
    }
}
