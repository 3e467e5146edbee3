//! Perp market accounts and the conversions between lots and native or UI units.
use bytemuck::{Pod, Zeroable};
use rust_decimal::{prelude::ToPrimitive, Decimal};
use solana_program::pubkey::Pubkey;

use crate::{
    adapters::{UnixTimestamp, LeI64, LeU64, I80F48},
    error::MangoResult,
    utils::cast_layout,
};

use super::{AccountLayout, DataType, MetaData};

/// Byte layout of a [`LiquidityMiningInfo`].
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct LiquidityMiningInfoLayout {
    pub rate: I80F48,
    pub max_depth_bps: I80F48,
    pub period_start: UnixTimestamp,
    pub target_period_length: LeU64,
    pub mngo_left: LeU64,
    pub mngo_per_period: LeU64,
}

/// Byte layout of a [`PerpMarket`] account.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct PerpMarketLayout {
    pub meta_data: MetaData,
    pub mango_group: Pubkey,
    pub bids: Pubkey,
    pub asks: Pubkey,
    pub event_queue: Pubkey,
    pub quote_lot_size: LeI64,
    pub base_lot_size: LeI64,
    pub long_funding: I80F48,
    pub short_funding: I80F48,
    pub open_interest: LeI64,
    pub last_updated: UnixTimestamp,
    pub seq_num: LeU64,
    pub fees_accrued: I80F48,
    pub liquidity_mining_info: LiquidityMiningInfoLayout,
    pub mngo_vault: Pubkey,
}

/// MNGO rewards paid to makers resting close to the best price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidityMiningInfo {
    /// Reward rate, adjusted every period.
    pub rate: Decimal,
    /// Only orders within this many basis points of the best price earn rewards.
    pub max_depth_bps: Decimal,
    #[allow(missing_docs)]
    pub period_start: UnixTimestamp,
    /// Intended period length in seconds.
    pub target_period_length: u64,
    /// Rewards left in the current period.
    pub mngo_left: u64,
    /// Rewards paid out per period.
    pub mngo_per_period: u64,
}

/// A perpetual futures market: where its book sides and event queue live, and
/// how prices and quantities are expressed in lots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerpMarket {
    #[allow(missing_docs)]
    pub meta_data: MetaData,
    /// The [`Group`](super::Group) listing the market.
    pub mango_group: Pubkey,
    /// The bids [`BookSide`](super::BookSide) account.
    pub bids: Pubkey,
    /// The asks [`BookSide`](super::BookSide) account.
    pub asks: Pubkey,
    /// The [`PerpEventQueue`](super::PerpEventQueue) account.
    pub event_queue: Pubkey,
    /// Quote native units per quote lot.
    pub quote_lot_size: i64,
    /// Base native units per base lot.
    pub base_lot_size: i64,
    /// Cumulative funding paid by longs, per base lot.
    pub long_funding: Decimal,
    /// Cumulative funding received by shorts, per base lot.
    pub short_funding: Decimal,
    /// Open long positions in base lots.
    pub open_interest: i64,
    /// When funding was last updated.
    pub last_updated: UnixTimestamp,
    /// Sequence number assigned to the next order.
    pub seq_num: u64,
    /// Fees collected and not yet swept, in quote native units.
    pub fees_accrued: Decimal,
    #[allow(missing_docs)]
    pub liquidity_mining_info: LiquidityMiningInfo,
    /// Vault holding the liquidity mining rewards.
    pub mngo_vault: Pubkey,
}

fn pow10(exponent: i64) -> Decimal {
    let scale = exponent.unsigned_abs().min(28) as u32;
    if exponent >= 0 {
        Decimal::from_i128_with_scale(10i128.pow(scale), 0)
    } else {
        Decimal::new(1, scale)
    }
}

impl PerpMarket {
    /// Account data length.
    pub const LEN: usize = std::mem::size_of::<PerpMarketLayout>();

    /// Price in quote native units per base native unit.
    ///
    /// `None` when the market has no lot sizes or the result does not fit a
    /// [`Decimal`].
    pub fn lot_to_native_price(&self, price_lots: i64) -> Option<Decimal> {
        Decimal::from(price_lots)
            .checked_mul(Decimal::from(self.quote_lot_size))?
            .checked_div(Decimal::from(self.base_lot_size))
    }

    /// Inverse of [`Self::lot_to_native_price`], truncated to a whole lot.
    pub fn native_price_to_lot(&self, price: Decimal) -> Option<i64> {
        price
            .checked_mul(Decimal::from(self.base_lot_size))?
            .checked_div(Decimal::from(self.quote_lot_size))?
            .trunc()
            .to_i64()
    }

    /// Price in quote tokens per base token.
    pub fn price_lots_to_ui(
        &self,
        price_lots: i64,
        base_decimals: u8,
        quote_decimals: u8,
    ) -> Option<Decimal> {
        self.lot_to_native_price(price_lots)?
            .checked_mul(pow10(base_decimals as i64 - quote_decimals as i64))
    }

    /// Inverse of [`Self::price_lots_to_ui`], truncated to a whole lot.
    pub fn ui_price_to_lots(
        &self,
        price: Decimal,
        base_decimals: u8,
        quote_decimals: u8,
    ) -> Option<i64> {
        let native = price.checked_mul(pow10(quote_decimals as i64 - base_decimals as i64))?;
        self.native_price_to_lot(native)
    }

    /// Quantity in base tokens.
    pub fn quantity_lots_to_ui(&self, quantity_lots: i64, base_decimals: u8) -> Option<Decimal> {
        Decimal::from(quantity_lots)
            .checked_mul(Decimal::from(self.base_lot_size))?
            .checked_mul(pow10(-(base_decimals as i64)))
    }

    /// Inverse of [`Self::quantity_lots_to_ui`], truncated to a whole lot.
    pub fn ui_quantity_to_lots(&self, quantity: Decimal, base_decimals: u8) -> Option<i64> {
        quantity
            .checked_mul(pow10(base_decimals as i64))?
            .checked_div(Decimal::from(self.base_lot_size))?
            .trunc()
            .to_i64()
    }
}

impl AccountLayout for PerpMarket {
    const NAME: &'static str = "PerpMarket";

    fn decode(data: &[u8]) -> MangoResult<Self> {
        let layout: &PerpMarketLayout = cast_layout(Self::NAME, data)?;
        layout.meta_data.check(DataType::PerpMarket)?;
        let lm = &layout.liquidity_mining_info;
        Ok(PerpMarket {
            meta_data: layout.meta_data,
            mango_group: layout.mango_group,
            bids: layout.bids,
            asks: layout.asks,
            event_queue: layout.event_queue,
            quote_lot_size: layout.quote_lot_size.get(),
            base_lot_size: layout.base_lot_size.get(),
            long_funding: layout.long_funding.to_decimal(),
            short_funding: layout.short_funding.to_decimal(),
            open_interest: layout.open_interest.get(),
            last_updated: layout.last_updated,
            seq_num: layout.seq_num.get(),
            fees_accrued: layout.fees_accrued.to_decimal(),
            liquidity_mining_info: LiquidityMiningInfo {
                rate: lm.rate.to_decimal(),
                max_depth_bps: lm.max_depth_bps.to_decimal(),
                period_start: lm.period_start,
                target_period_length: lm.target_period_length.get(),
                mngo_left: lm.mngo_left.get(),
                mngo_per_period: lm.mngo_per_period.get(),
            },
            mngo_vault: layout.mngo_vault,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    // A SOL-PERP style market: 9 base decimals, 6 quote decimals.
    fn sample_market() -> PerpMarket {
        let mut layout = PerpMarketLayout::zeroed();
        layout.meta_data = MetaData::new(DataType::PerpMarket, 0, true);
        layout.bids = Pubkey::new_unique();
        layout.asks = Pubkey::new_unique();
        layout.event_queue = Pubkey::new_unique();
        layout.base_lot_size = LeI64::new(10_000_000);
        layout.quote_lot_size = LeI64::new(100);
        layout.open_interest = LeI64::new(55);
        layout.seq_num = LeU64::new(9001);
        layout.liquidity_mining_info.mngo_left = LeU64::new(3);
        PerpMarket::decode(bytemuck::bytes_of(&layout)).unwrap()
    }

    #[test]
    fn perp_market_size() {
        assert_eq!(std::mem::size_of::<LiquidityMiningInfoLayout>(), 64);
        assert_eq!(PerpMarket::LEN, 320);
    }

    #[test]
    fn decode_perp_market() {
        let market = sample_market();
        assert_eq!(market.open_interest, 55);
        assert_eq!(market.seq_num, 9001);
        assert_eq!(market.liquidity_mining_info.mngo_left, 3);
        assert_ne!(market.bids, market.asks);
    }

    #[test]
    fn price_conversions() {
        let market = sample_market();
        // 1500 lots * 100 / 1e7 = 0.015 quote native per base native
        assert_eq!(market.lot_to_native_price(1500), Some(dec!(0.015)));
        assert_eq!(market.native_price_to_lot(dec!(0.015)), Some(1500));
        // 0.015 * 10^(9 - 6) = 15 USD per SOL
        assert_eq!(market.price_lots_to_ui(1500, 9, 6), Some(dec!(15)));
        assert_eq!(market.ui_price_to_lots(dec!(15), 9, 6), Some(1500));
        // 25 lots of 0.01 SOL
        assert_eq!(market.quantity_lots_to_ui(25, 9), Some(dec!(0.25)));
        assert_eq!(market.ui_quantity_to_lots(dec!(0.25), 9), Some(25));
    }

    #[test]
    fn price_conversions_without_lot_sizes() {
        let mut layout = PerpMarketLayout::zeroed();
        layout.meta_data = MetaData::new(DataType::PerpMarket, 0, true);
        let market = PerpMarket::decode(bytemuck::bytes_of(&layout)).unwrap();
        assert_eq!(market.lot_to_native_price(10), None);
        assert_eq!(market.native_price_to_lot(dec!(1)), None);
    }

    #[test]
    fn price_conversions_out_of_range() {
        let mut market = sample_market();
        market.quote_lot_size = i64::MAX;
        market.base_lot_size = 1;
        assert_eq!(market.lot_to_native_price(i64::MAX), None);
        assert_eq!(market.price_lots_to_ui(i64::MAX, 9, 6), None);
        assert_eq!(market.ui_price_to_lots(Decimal::MAX, 0, 28), None);

        market.base_lot_size = i64::MAX;
        assert_eq!(market.native_price_to_lot(Decimal::MAX), None);
        assert_eq!(market.quantity_lots_to_ui(i64::MAX, 0), None);
        assert_eq!(market.ui_quantity_to_lots(Decimal::MAX, 9), None);
        // a representable result still converts
        assert_eq!(market.quantity_lots_to_ui(1, 0), Some(Decimal::from(i64::MAX)));
    }
}
