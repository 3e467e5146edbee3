//! The group account: token, spot market and perp market configuration shared by
//! every margin account of the group.
use bytemuck::{Pod, Zeroable};
use rust_decimal::Decimal;
use solana_program::pubkey::Pubkey;

use crate::{
    adapters::{optional_pubkey, LeI64, LeU32, LeU64, I80F48},
    error::MangoResult,
    utils::cast_layout,
};

use super::{AccountLayout, DataType, MetaData, MAX_PAIRS, MAX_TOKENS, QUOTE_INDEX};

/// Byte layout of a [`TokenInfo`] slot.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct TokenInfoLayout {
    pub mint: Pubkey,
    pub root_bank: Pubkey,
    pub decimals: u8,
    pub padding: [u8; 7],
}

/// Byte layout of a [`SpotMarketInfo`] slot.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct SpotMarketInfoLayout {
    pub spot_market: Pubkey,
    pub maint_asset_weight: I80F48,
    pub init_asset_weight: I80F48,
    pub maint_liab_weight: I80F48,
    pub init_liab_weight: I80F48,
    pub liquidation_fee: I80F48,
}

/// Byte layout of a [`PerpMarketInfo`] slot.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct PerpMarketInfoLayout {
    pub perp_market: Pubkey,
    pub maint_asset_weight: I80F48,
    pub init_asset_weight: I80F48,
    pub maint_liab_weight: I80F48,
    pub init_liab_weight: I80F48,
    pub liquidation_fee: I80F48,
    pub maker_fee: I80F48,
    pub taker_fee: I80F48,
    pub base_lot_size: LeI64,
    pub quote_lot_size: LeI64,
}

/// Byte layout of a [`Group`] account.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct GroupLayout {
    pub meta_data: MetaData,
    pub num_oracles: LeU64,
    pub tokens: [TokenInfoLayout; MAX_TOKENS],
    pub spot_markets: [SpotMarketInfoLayout; MAX_PAIRS],
    pub perp_markets: [PerpMarketInfoLayout; MAX_PAIRS],
    pub oracles: [Pubkey; MAX_PAIRS],
    pub signer_nonce: LeU64,
    pub signer_key: Pubkey,
    pub admin: Pubkey,
    pub dex_program_id: Pubkey,
    pub mango_cache: Pubkey,
    pub valid_interval: LeU64,
    pub insurance_vault: Pubkey,
    pub srm_vault: Pubkey,
    pub msrm_vault: Pubkey,
    pub fees_vault: Pubkey,
    pub max_mango_accounts: LeU32,
    pub num_mango_accounts: LeU32,
    pub ref_surcharge_centibps: LeU32,
    pub ref_share_centibps: LeU32,
    pub ref_mngo_required: LeU64,
    pub padding: [u8; 8],
}

/// A token usable as collateral in the group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    /// Slot in [`Group::tokens`].
    pub index: usize,
    #[allow(missing_docs)]
    pub mint: Pubkey,
    /// The token's [`RootBank`](super::RootBank) account.
    pub root_bank: Pubkey,
    /// Decimals of the mint.
    pub decimals: u8,
}

/// A serum spot market listed in the group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotMarketInfo {
    /// Slot in [`Group::spot_markets`], also the base token index.
    pub index: usize,
    /// The serum market account.
    pub spot_market: Pubkey,
    /// Asset weight used for the maintenance health check.
    pub maint_asset_weight: Decimal,
    /// Asset weight used for the initial health check.
    pub init_asset_weight: Decimal,
    /// Liability weight used for the maintenance health check.
    pub maint_liab_weight: Decimal,
    /// Liability weight used for the initial health check.
    pub init_liab_weight: Decimal,
    /// Share of a liquidated position paid to the liquidator.
    pub liquidation_fee: Decimal,
}

/// A perp market listed in the group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerpMarketInfo {
    /// Slot in [`Group::perp_markets`], also the base token index.
    pub index: usize,
    /// The [`PerpMarket`](super::PerpMarket) account.
    pub perp_market: Pubkey,
    /// Asset weight used for the maintenance health check.
    pub maint_asset_weight: Decimal,
    /// Asset weight used for the initial health check.
    pub init_asset_weight: Decimal,
    /// Liability weight used for the maintenance health check.
    pub maint_liab_weight: Decimal,
    /// Liability weight used for the initial health check.
    pub init_liab_weight: Decimal,
    /// Share of a liquidated position paid to the liquidator.
    pub liquidation_fee: Decimal,
    /// Fee rate charged to makers, negative for a rebate.
    pub maker_fee: Decimal,
    /// Fee rate charged to takers.
    pub taker_fee: Decimal,
    /// Base native units per base lot.
    pub base_lot_size: i64,
    /// Quote native units per quote lot.
    pub quote_lot_size: i64,
}

/// Decoded group account. Unused token and market slots are `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    #[allow(missing_docs)]
    pub meta_data: MetaData,
    /// [`MAX_TOKENS`] slots; the last one holds the quote token.
    pub tokens: Vec<Option<TokenInfo>>,
    /// [`MAX_PAIRS`] slots, indexed like the base tokens.
    pub spot_markets: Vec<Option<SpotMarketInfo>>,
    /// [`MAX_PAIRS`] slots, indexed like the base tokens.
    pub perp_markets: Vec<Option<PerpMarketInfo>>,
    /// Only the first `num_oracles` oracle slots.
    pub oracles: Vec<Pubkey>,
    /// Bump seed of `signer_key`.
    pub signer_nonce: u64,
    /// Program derived authority of the group's vaults.
    pub signer_key: Pubkey,
    #[allow(missing_docs)]
    pub admin: Pubkey,
    /// The serum dex program the spot markets run on.
    pub dex_program_id: Pubkey,
    /// The group's [`Cache`](super::Cache) account.
    pub cache: Pubkey,
    /// Seconds a cache entry stays valid.
    pub valid_interval: u64,
    /// Vault covering losses of bankrupt accounts, if set.
    pub insurance_vault: Option<Pubkey>,
    /// Vault of SRM deposited for serum fee discounts, if set.
    pub srm_vault: Option<Pubkey>,
    /// Vault of MSRM deposited for serum fee discounts, if set.
    pub msrm_vault: Option<Pubkey>,
    /// Vault collecting perp fees, if set.
    pub fees_vault: Option<Pubkey>,
    /// Cap on `num_mango_accounts`.
    pub max_mango_accounts: u32,
    /// Margin accounts created in the group so far.
    pub num_mango_accounts: u32,
    /// Extra taker fee, in hundredths of a basis point, for accounts without a referrer.
    pub ref_surcharge_centibps: u32,
    /// Part of the taker fee, in hundredths of a basis point, paid to referrers.
    pub ref_share_centibps: u32,
    /// Native MNGO a referrer must hold to earn `ref_share_centibps`.
    pub ref_mngo_required: u64,
}

impl Group {
    /// Account data length.
    pub const LEN: usize = std::mem::size_of::<GroupLayout>();

    /// The quote token every market settles in.
    pub fn shared_quote_token(&self) -> Option<&TokenInfo> {
        self.tokens.get(QUOTE_INDEX)?.as_ref()
    }

    #[allow(missing_docs)]
    pub fn token_by_mint(&self, mint: &Pubkey) -> Option<&TokenInfo> {
        self.tokens.iter().flatten().find(|t| &t.mint == mint)
    }

    /// Slot of the perp market whose account is `perp_market`.
    pub fn perp_market_index(&self, perp_market: &Pubkey) -> Option<usize> {
        self.perp_markets
            .iter()
            .flatten()
            .find(|p| &p.perp_market == perp_market)
            .map(|p| p.index)
    }

    /// Slot of the spot market whose account is `spot_market`.
    pub fn spot_market_index(&self, spot_market: &Pubkey) -> Option<usize> {
        self.spot_markets
            .iter()
            .flatten()
            .find(|s| &s.spot_market == spot_market)
            .map(|s| s.index)
    }
}

impl AccountLayout for Group {
    const NAME: &'static str = "Group";

    fn decode(data: &[u8]) -> MangoResult<Self> {
        let layout: &GroupLayout = cast_layout(Self::NAME, data)?;
        layout.meta_data.check(DataType::MangoGroup)?;

        let tokens = layout
            .tokens
            .iter()
            .enumerate()
            .map(|(index, t)| {
                optional_pubkey(t.mint).map(|mint| TokenInfo {
                    index,
                    mint,
                    root_bank: t.root_bank,
                    decimals: t.decimals,
                })
            })
            .collect();

        let spot_markets = layout
            .spot_markets
            .iter()
            .enumerate()
            .map(|(index, s)| {
                optional_pubkey(s.spot_market).map(|spot_market| SpotMarketInfo {
                    index,
                    spot_market,
                    maint_asset_weight: s.maint_asset_weight.to_decimal(),
                    init_asset_weight: s.init_asset_weight.to_decimal(),
                    maint_liab_weight: s.maint_liab_weight.to_decimal(),
                    init_liab_weight: s.init_liab_weight.to_decimal(),
                    liquidation_fee: s.liquidation_fee.to_decimal(),
                })
            })
            .collect();

        let perp_markets = layout
            .perp_markets
            .iter()
            .enumerate()
            .map(|(index, p)| {
                optional_pubkey(p.perp_market).map(|perp_market| PerpMarketInfo {
                    index,
                    perp_market,
                    maint_asset_weight: p.maint_asset_weight.to_decimal(),
                    init_asset_weight: p.init_asset_weight.to_decimal(),
                    maint_liab_weight: p.maint_liab_weight.to_decimal(),
                    init_liab_weight: p.init_liab_weight.to_decimal(),
                    liquidation_fee: p.liquidation_fee.to_decimal(),
                    maker_fee: p.maker_fee.to_decimal(),
                    taker_fee: p.taker_fee.to_decimal(),
                    base_lot_size: p.base_lot_size.get(),
                    quote_lot_size: p.quote_lot_size.get(),
                })
            })
            .collect();

        let num_oracles = (layout.num_oracles.get() as usize).min(MAX_PAIRS);

        Ok(Group {
            meta_data: layout.meta_data,
            tokens,
            spot_markets,
            perp_markets,
            oracles: layout.oracles[..num_oracles].to_vec(),
            signer_nonce: layout.signer_nonce.get(),
            signer_key: layout.signer_key,
            admin: layout.admin,
            dex_program_id: layout.dex_program_id,
            cache: layout.mango_cache,
            valid_interval: layout.valid_interval.get(),
            insurance_vault: optional_pubkey(layout.insurance_vault),
            srm_vault: optional_pubkey(layout.srm_vault),
            msrm_vault: optional_pubkey(layout.msrm_vault),
            fees_vault: optional_pubkey(layout.fees_vault),
            max_mango_accounts: layout.max_mango_accounts.get(),
            num_mango_accounts: layout.num_mango_accounts.get(),
            ref_surcharge_centibps: layout.ref_surcharge_centibps.get(),
            ref_share_centibps: layout.ref_share_centibps.get(),
            ref_mngo_required: layout.ref_mngo_required.get(),
        })
    }
}
