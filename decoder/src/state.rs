//! Fixed layouts of the protocol's on-chain records and their typed views.
use borsh::{BorshDeserialize, BorshSerialize};
use bytemuck::{Pod, Zeroable};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::{
    adapters::Flag,
    error::{MangoError, MangoResult},
};

/// Root and node banks
pub mod bank;
/// The shared price and index cache
pub mod cache;
/// Order book sides
pub mod critbit;
/// Perp and spot event queues
pub mod event_queue;
/// The group account
pub mod group;
/// Margin accounts
pub mod margin_account;
/// Serum open orders accounts
pub mod open_orders;
/// Perp markets and lot conversions
pub mod perp_market;

pub use bank::{NodeBank, RootBank};
pub use cache::Cache;
pub use critbit::{BookSide, Node};
pub use event_queue::{PerpEvent, PerpEventQueue, SpotEvent, SpotEventQueue};
pub use group::Group;
pub use margin_account::MarginAccount;
pub use open_orders::OpenOrders;
pub use perp_market::PerpMarket;

/// Token slots in a group. The last one is the shared quote token.
pub const MAX_TOKENS: usize = 16;
/// Spot and perp market slots in a group.
pub const MAX_PAIRS: usize = MAX_TOKENS - 1;
/// Token index of the quote token.
pub const QUOTE_INDEX: usize = MAX_TOKENS - 1;
/// Node bank slots in a root bank.
pub const MAX_NODE_BANKS: usize = 8;
/// Open perp orders a margin account can hold.
pub const MAX_PERP_OPEN_ORDERS: usize = 64;
/// Marks an unused perp open-order slot in a margin account.
pub const FREE_ORDER_SLOT: u8 = u8::MAX;

/// Something that can be decoded from the complete data of one account.
pub trait AccountLayout: Sized {
    /// Name used in size mismatch reports.
    const NAME: &'static str;

    /// Fails unless `data` has the exact layout length and the expected header.
    fn decode(data: &[u8]) -> MangoResult<Self>;
}

/// Account kind stored in the first header byte.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum DataType {
    MangoGroup,
    MangoAccount,
    RootBank,
    NodeBank,
    PerpMarket,
    Bids,
    Asks,
    MangoCache,
    EventQueue,
    AdvancedOrders,
    ReferrerMemory,
    ReferrerIdRecord,
}

/// The eight byte header every protocol account starts with.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct MetaData {
    /// Raw [`DataType`].
    pub data_type: u8,
    #[allow(missing_docs)]
    pub version: u8,
    #[allow(missing_docs)]
    pub is_initialized: Flag,
    /// Kind specific, unused by most accounts.
    pub extra_info: [u8; 5],
}

impl MetaData {
    /// Expected size in bytes of MetaData
    pub const LEN: usize = std::mem::size_of::<Self>();

    #[allow(missing_docs)]
    pub fn new(data_type: DataType, version: u8, is_initialized: bool) -> Self {
        Self {
            data_type: data_type.into(),
            version,
            is_initialized: Flag::new(is_initialized),
            extra_info: [0; 5],
        }
    }

    /// `None` for a tag this crate does not know.
    pub fn data_type(&self) -> Option<DataType> {
        DataType::try_from(self.data_type).ok()
    }

    pub(crate) fn check(&self, expected: DataType) -> MangoResult {
        if self.data_type != u8::from(expected) {
            return Err(MangoError::WrongAccountType {
                expected,
                actual: self.data_type,
            });
        }
        Ok(())
    }
}

/// Order side.
#[derive(
    BorshDeserialize,
    BorshSerialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    TryFromPrimitive,
    IntoPrimitive,
)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    #[allow(missing_docs)]
    pub fn opposite(&self) -> Self {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }

    pub(crate) fn from_raw(raw: u8) -> MangoResult<Self> {
        Side::try_from(raw).map_err(|_| MangoError::UnknownTag {
            kind: "side",
            tag: raw as u32,
        })
    }
}

/// How an order interacts with the book when placed.
#[derive(
    BorshDeserialize,
    BorshSerialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    TryFromPrimitive,
    IntoPrimitive,
)]
#[repr(u8)]
pub enum OrderType {
    /// Rests on the book for whatever does not match.
    Limit,
    /// Matches what it can and drops the rest.
    ImmediateOrCancel,
    /// Never takes; rejected if it would cross.
    PostOnly,
    /// Takes at any price.
    Market,
    /// Like `PostOnly`, but moved one tick behind the best opposite price instead of rejected.
    PostOnlySlide,
}

impl OrderType {
    pub(crate) fn from_raw(raw: u8) -> MangoResult<Self> {
        OrderType::try_from(raw).map_err(|_| MangoError::UnknownTag {
            kind: "order type",
            tag: raw as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_data_check() {
        let meta = MetaData::new(DataType::PerpMarket, 1, true);
        assert_eq!(MetaData::LEN, 8);
        assert!(meta.check(DataType::PerpMarket).is_ok());
        assert_eq!(meta.data_type(), Some(DataType::PerpMarket));
        match meta.check(DataType::MangoCache) {
            Err(MangoError::WrongAccountType { expected, actual }) => {
                assert_eq!(expected, DataType::MangoCache);
                assert_eq!(actual, 4);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn side_tags() {
        assert_eq!(Side::from_raw(0).unwrap(), Side::Bid);
        assert_eq!(Side::from_raw(1).unwrap(), Side::Ask);
        assert!(matches!(
            Side::from_raw(2),
            Err(MangoError::UnknownTag { kind: "side", tag: 2 })
        ));
        assert_eq!(Side::Bid.opposite(), Side::Ask);
    }
}
