//! Lending pool accounts. A root bank holds the interest rate curve and the
//! accumulated indices of one token; its node banks hold the actual vaults.
use bytemuck::{Pod, Zeroable};
use rust_decimal::Decimal;
use solana_program::pubkey::Pubkey;

use crate::{
    adapters::{UnixTimestamp, LeU64, I80F48},
    error::MangoResult,
    utils::cast_layout,
};

use super::{AccountLayout, DataType, MetaData, MAX_NODE_BANKS};

/// Byte layout of a [`RootBank`] account.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct RootBankLayout {
    pub meta_data: MetaData,
    pub optimal_util: I80F48,
    pub optimal_rate: I80F48,
    pub max_rate: I80F48,
    pub num_node_banks: LeU64,
    pub node_banks: [Pubkey; MAX_NODE_BANKS],
    pub deposit_index: I80F48,
    pub borrow_index: I80F48,
    pub last_updated: UnixTimestamp,
    pub padding: [u8; 64],
}

/// Byte layout of a [`NodeBank`] account.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct NodeBankLayout {
    pub meta_data: MetaData,
    pub deposits: I80F48,
    pub borrows: I80F48,
    pub vault: Pubkey,
}

/// Interest rate parameters and indices of one token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootBank {
    #[allow(missing_docs)]
    pub meta_data: MetaData,
    /// Utilization at which the rate curve bends.
    pub optimal_util: Decimal,
    /// Borrow rate at `optimal_util`.
    pub optimal_rate: Decimal,
    /// Borrow rate at full utilization.
    pub max_rate: Decimal,
    /// The first `num_node_banks` node bank keys.
    pub node_banks: Vec<Pubkey>,
    /// Native tokens per deposit unit.
    pub deposit_index: Decimal,
    /// Native tokens per borrow unit.
    pub borrow_index: Decimal,
    /// When the indices were last accrued.
    pub last_updated: UnixTimestamp,
}

impl RootBank {
    /// Account data length.
    pub const LEN: usize = std::mem::size_of::<RootBankLayout>();

    /// Converts deposit units held by a margin account into native token units.
    pub fn native_deposit(&self, deposit: Decimal) -> Decimal {
        deposit * self.deposit_index
    }

    /// Converts borrow units into native token units.
    pub fn native_borrow(&self, borrow: Decimal) -> Decimal {
        borrow * self.borrow_index
    }
}

impl AccountLayout for RootBank {
    const NAME: &'static str = "RootBank";

    fn decode(data: &[u8]) -> MangoResult<Self> {
        let layout: &RootBankLayout = cast_layout(Self::NAME, data)?;
        layout.meta_data.check(DataType::RootBank)?;
        let num_node_banks = (layout.num_node_banks.get() as usize).min(MAX_NODE_BANKS);
        Ok(RootBank {
            meta_data: layout.meta_data,
            optimal_util: layout.optimal_util.to_decimal(),
            optimal_rate: layout.optimal_rate.to_decimal(),
            max_rate: layout.max_rate.to_decimal(),
            node_banks: layout.node_banks[..num_node_banks].to_vec(),
            deposit_index: layout.deposit_index.to_decimal(),
            borrow_index: layout.borrow_index.to_decimal(),
            last_updated: layout.last_updated,
        })
    }
}

/// One vault of a token and the deposits and borrows against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeBank {
    #[allow(missing_docs)]
    pub meta_data: MetaData,
    /// Total deposits, in deposit units.
    pub deposits: Decimal,
    /// Total borrows, in borrow units.
    pub borrows: Decimal,
    /// The token account holding the funds.
    pub vault: Pubkey,
}

impl NodeBank {
    /// Account data length.
    pub const LEN: usize = std::mem::size_of::<NodeBankLayout>();
}

impl AccountLayout for NodeBank {
    const NAME: &'static str = "NodeBank";

    fn decode(data: &[u8]) -> MangoResult<Self> {
        let layout: &NodeBankLayout = cast_layout(Self::NAME, data)?;
        layout.meta_data.check(DataType::NodeBank)?;
        Ok(NodeBank {
            meta_data: layout.meta_data,
            deposits: layout.deposits.to_decimal(),
            borrows: layout.borrows.to_decimal(),
            vault: layout.vault,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn bank_sizes() {
        assert_eq!(RootBank::LEN, 424);
        assert_eq!(NodeBank::LEN, 72);
    }

    #[test]
    fn decode_root_bank() {
        let mut layout = RootBankLayout::zeroed();
        layout.meta_data = MetaData::new(DataType::RootBank, 0, true);
        layout.num_node_banks = LeU64::new(2);
        for key in layout.node_banks.iter_mut() {
            *key = Pubkey::new_unique();
        }
        layout.deposit_index = I80F48::from_decimal(dec!(1.5));
        layout.borrow_index = I80F48::from_decimal(dec!(2));
        layout.optimal_util = I80F48::from_decimal(dec!(0.7));

        let bank = RootBank::decode(bytemuck::bytes_of(&layout)).unwrap();
        assert_eq!(bank.node_banks, layout.node_banks[..2].to_vec());
        assert_eq!(bank.native_deposit(dec!(10)), dec!(15));
        assert_eq!(bank.native_borrow(dec!(10)), dec!(20));
        assert!((bank.optimal_util - dec!(0.7)).abs() < dec!(0.000000000001));
    }

    #[test]
    fn decode_node_bank() {
        let mut layout = NodeBankLayout::zeroed();
        layout.meta_data = MetaData::new(DataType::NodeBank, 0, true);
        layout.deposits = I80F48::from_decimal(dec!(1000));
        layout.vault = Pubkey::new_unique();

        let bank = NodeBank::decode(bytemuck::bytes_of(&layout)).unwrap();
        assert_eq!(bank.deposits, dec!(1000));
        assert_eq!(bank.borrows, Decimal::ZERO);
        assert_eq!(bank.vault, layout.vault);
        assert!(RootBank::decode(bytemuck::bytes_of(&layout)).is_err());
    }
}
