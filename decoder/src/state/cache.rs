//! The cache account: prices, bank indices and funding for every slot of a group.
use bytemuck::{Pod, Zeroable};
use rust_decimal::Decimal;

use crate::{
    adapters::{UnixTimestamp, I80F48},
    error::MangoResult,
    utils::cast_layout,
};

use super::{AccountLayout, DataType, MetaData, MAX_PAIRS, MAX_TOKENS};

/// Byte layout of a [`PriceCache`] entry.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct PriceCacheLayout {
    pub price: I80F48,
    pub last_update: UnixTimestamp,
}

/// Byte layout of a [`RootBankCache`] entry.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct RootBankCacheLayout {
    pub deposit_index: I80F48,
    pub borrow_index: I80F48,
    pub last_update: UnixTimestamp,
}

/// Byte layout of a [`PerpMarketCache`] entry.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct PerpMarketCacheLayout {
    pub long_funding: I80F48,
    pub short_funding: I80F48,
    pub last_update: UnixTimestamp,
}

/// Byte layout of a [`Cache`] account.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct CacheLayout {
    pub meta_data: MetaData,
    pub price_cache: [PriceCacheLayout; MAX_PAIRS],
    pub root_bank_cache: [RootBankCacheLayout; MAX_TOKENS],
    pub perp_market_cache: [PerpMarketCacheLayout; MAX_PAIRS],
}

/// Oracle price of a base token, in quote native units per base native unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceCache {
    #[allow(missing_docs)]
    pub price: Decimal,
    #[allow(missing_docs)]
    pub last_update: UnixTimestamp,
}

/// Cached copy of a [`RootBank`](super::RootBank)'s indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootBankCache {
    /// Native tokens per deposit unit.
    pub deposit_index: Decimal,
    /// Native tokens per borrow unit.
    pub borrow_index: Decimal,
    #[allow(missing_docs)]
    pub last_update: UnixTimestamp,
}

/// Cumulative funding of one perp market, in quote native units per base lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerpMarketCache {
    /// Paid by longs so far.
    pub long_funding: Decimal,
    /// Received by shorts so far.
    pub short_funding: Decimal,
    #[allow(missing_docs)]
    pub last_update: UnixTimestamp,
}

/// Per-instrument prices, bank indices and funding, refreshed by keepers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cache {
    #[allow(missing_docs)]
    pub meta_data: MetaData,
    /// One entry per market index.
    pub price_cache: Vec<PriceCache>,
    /// One entry per token index.
    pub root_bank_cache: Vec<RootBankCache>,
    /// One entry per market index.
    pub perp_market_cache: Vec<PerpMarketCache>,
}

impl Cache {
    /// Account data length.
    pub const LEN: usize = std::mem::size_of::<CacheLayout>();

    /// Price of token `token_index`; the quote token is always worth one.
    pub fn price(&self, token_index: usize) -> Option<Decimal> {
        if token_index == super::QUOTE_INDEX {
            return Some(Decimal::ONE);
        }
        self.price_cache.get(token_index).map(|p| p.price)
    }
}

impl AccountLayout for Cache {
    const NAME: &'static str = "Cache";

    fn decode(data: &[u8]) -> MangoResult<Self> {
        let layout: &CacheLayout = cast_layout(Self::NAME, data)?;
        layout.meta_data.check(DataType::MangoCache)?;
        Ok(Cache {
            meta_data: layout.meta_data,
            price_cache: layout
                .price_cache
                .iter()
                .map(|p| PriceCache {
                    price: p.price.to_decimal(),
                    last_update: p.last_update,
                })
                .collect(),
            root_bank_cache: layout
                .root_bank_cache
                .iter()
                .map(|r| RootBankCache {
                    deposit_index: r.deposit_index.to_decimal(),
                    borrow_index: r.borrow_index.to_decimal(),
                    last_update: r.last_update,
                })
                .collect(),
            perp_market_cache: layout
                .perp_market_cache
                .iter()
                .map(|p| PerpMarketCache {
                    long_funding: p.long_funding.to_decimal(),
                    short_funding: p.short_funding.to_decimal(),
                    last_update: p.last_update,
                })
                .collect(),
        })
    }
}
