//! Ring buffer event queues. The perp queue is a protocol account; the spot
//! queue is owned by the serum dex and carries its framing.
use bytemuck::{Pod, Zeroable};
use enumflags2::{bitflags, BitFlags};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use rust_decimal::Decimal;
use solana_program::pubkey::Pubkey;

use crate::{
    adapters::{Flag, UnixTimestamp, LeI128, LeI64, LeU128, LeU64, I80F48},
    error::{MangoError, MangoResult},
    utils::{cast_layout, check_size, strip_serum_padding},
};

use super::{AccountLayout, DataType, MetaData, Side};

/// Size in bytes of one perp event slot.
pub const PERP_EVENT_SIZE: usize = 200;
/// Size in bytes of one serum event slot.
pub const SERUM_EVENT_SIZE: usize = 88;

/// One record of an event queue, decoded from its ring slot.
pub trait QueueEvent: Sized {
    /// Size in bytes of one ring slot.
    const SIZE: usize;

    /// Decode the slot at index `slot`.
    fn decode(slot: usize, data: &[u8]) -> MangoResult<Self>;

    /// Ring slot the event was read from.
    fn slot(&self) -> usize;

    #[allow(missing_docs)]
    fn is_fill(&self) -> bool;
}

/// First byte of a perp event slot.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum PerpEventTag {
    Fill,
    Out,
    Liquidate,
}

/// Header of a perp event queue account, before the ring.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct PerpEventQueueHeader {
    pub meta_data: MetaData,
    pub head: LeU64,
    pub count: LeU64,
    pub seq_num: LeU64,
}

/// Byte layout of a [`FillEvent`] slot.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct FillEventLayout {
    pub event_type: u8,
    pub taker_side: u8,
    pub maker_slot: u8,
    pub maker_out: Flag,
    pub version: u8,
    pub padding: [u8; 3],
    pub timestamp: UnixTimestamp,
    pub seq_num: LeU64,
    pub maker: Pubkey,
    pub maker_order_id: LeI128,
    pub maker_client_order_id: LeU64,
    pub maker_fee: I80F48,
    pub best_initial: LeI64,
    pub maker_timestamp: UnixTimestamp,
    pub taker: Pubkey,
    pub taker_order_id: LeI128,
    pub taker_client_order_id: LeU64,
    pub taker_fee: I80F48,
    pub price: LeI64,
    pub quantity: LeI64,
}

/// Byte layout of an [`OutEvent`] slot.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct OutEventLayout {
    pub event_type: u8,
    pub side: u8,
    pub owner_slot: u8,
    pub padding0: [u8; 5],
    pub timestamp: UnixTimestamp,
    pub seq_num: LeU64,
    pub owner: Pubkey,
    pub quantity: LeI64,
    pub padding1: [u8; 136],
}

/// Byte layout of a [`LiquidateEvent`] slot.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct LiquidateEventLayout {
    pub event_type: u8,
    pub padding0: [u8; 7],
    pub timestamp: UnixTimestamp,
    pub seq_num: LeU64,
    pub liqee: Pubkey,
    pub liqor: Pubkey,
    pub price: I80F48,
    pub quantity: LeI64,
    pub liquidation_fee: I80F48,
    pub padding1: [u8; 72],
}

/// A taker order matched a resting maker order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillEvent {
    /// Ring slot the event was read from.
    pub slot: usize,
    #[allow(missing_docs)]
    pub taker_side: Side,
    /// Order slot in the maker's margin account.
    pub maker_slot: u8,
    /// The maker order left the book with this fill.
    pub maker_out: bool,
    /// Layout version of the event.
    pub version: u8,
    /// When the match happened.
    pub timestamp: UnixTimestamp,
    /// Position of the event in the queue's history.
    pub seq_num: u64,
    /// The maker's margin account.
    pub maker: Pubkey,
    #[allow(missing_docs)]
    pub maker_order_id: i128,
    #[allow(missing_docs)]
    pub maker_client_order_id: u64,
    /// Fee rate charged to the maker, negative for a rebate.
    pub maker_fee: Decimal,
    /// Best opposite price when the maker order was placed.
    pub best_initial: i64,
    /// When the maker order was placed.
    pub maker_timestamp: UnixTimestamp,
    /// The taker's margin account.
    pub taker: Pubkey,
    #[allow(missing_docs)]
    pub taker_order_id: i128,
    #[allow(missing_docs)]
    pub taker_client_order_id: u64,
    /// Fee rate charged to the taker.
    pub taker_fee: Decimal,
    /// Price in lots.
    pub price: i64,
    /// Quantity in base lots.
    pub quantity: i64,
}

/// An order left the book without matching: cancelled or expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutEvent {
    /// Ring slot the event was read from.
    pub slot: usize,
    #[allow(missing_docs)]
    pub side: Side,
    /// Order slot in the owner's margin account.
    pub owner_slot: u8,
    #[allow(missing_docs)]
    pub timestamp: UnixTimestamp,
    /// Position of the event in the queue's history.
    pub seq_num: u64,
    /// The owner's margin account.
    pub owner: Pubkey,
    /// Quantity removed, in base lots.
    pub quantity: i64,
}

/// A perp position moved from a liquidated account to its liquidator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidateEvent {
    /// Ring slot the event was read from.
    pub slot: usize,
    #[allow(missing_docs)]
    pub timestamp: UnixTimestamp,
    /// Position of the event in the queue's history.
    pub seq_num: u64,
    /// The liquidated margin account.
    pub liquidatee: Pubkey,
    /// The liquidator's margin account.
    pub liquidator: Pubkey,
    /// Oracle price used, in quote native units per base native unit.
    pub price: Decimal,
    /// Base lots transferred.
    pub quantity: i64,
    #[allow(missing_docs)]
    pub liquidation_fee: Decimal,
}

/// A record whose tag is not understood. It still occupies its slot and can be
/// consumed like any other event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownEvent {
    /// Ring slot the event was read from.
    pub slot: usize,
    /// The raw tag or flag byte.
    pub tag: u8,
    /// The bytes where known events keep their owner.
    pub owner: Pubkey,
}

/// One perp event queue record.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerpEvent {
    Fill(FillEvent),
    Out(OutEvent),
    Liquidate(LiquidateEvent),
    Unknown(UnknownEvent),
}

impl PerpEvent {
    /// `None` for unknown events.
    pub fn seq_num(&self) -> Option<u64> {
        match self {
            PerpEvent::Fill(e) => Some(e.seq_num),
            PerpEvent::Out(e) => Some(e.seq_num),
            PerpEvent::Liquidate(e) => Some(e.seq_num),
            PerpEvent::Unknown(_) => None,
        }
    }

    fn unknown(slot: usize, data: &[u8]) -> Self {
        let mut owner = [0u8; 32];
        owner.copy_from_slice(&data[24..56]);
        PerpEvent::Unknown(UnknownEvent {
            slot,
            tag: data[0],
            owner: Pubkey::new_from_array(owner),
        })
    }
}

impl QueueEvent for PerpEvent {
    const SIZE: usize = PERP_EVENT_SIZE;

    fn decode(slot: usize, data: &[u8]) -> MangoResult<Self> {
        check_size("PerpEvent", Self::SIZE, data)?;
        let event = match PerpEventTag::from_u8(data[0]) {
            Some(PerpEventTag::Fill) => {
                let fill: &FillEventLayout = cast_layout("FillEvent", data)?;
                let taker_side = match Side::try_from(fill.taker_side) {
                    Ok(side) => side,
                    Err(_) => return Ok(Self::unknown(slot, data)),
                };
                PerpEvent::Fill(FillEvent {
                    slot,
                    taker_side,
                    maker_slot: fill.maker_slot,
                    maker_out: fill.maker_out.get(),
                    version: fill.version,
                    timestamp: fill.timestamp,
                    seq_num: fill.seq_num.get(),
                    maker: fill.maker,
                    maker_order_id: fill.maker_order_id.get(),
                    maker_client_order_id: fill.maker_client_order_id.get(),
                    maker_fee: fill.maker_fee.to_decimal(),
                    best_initial: fill.best_initial.get(),
                    maker_timestamp: fill.maker_timestamp,
                    taker: fill.taker,
                    taker_order_id: fill.taker_order_id.get(),
                    taker_client_order_id: fill.taker_client_order_id.get(),
                    taker_fee: fill.taker_fee.to_decimal(),
                    price: fill.price.get(),
                    quantity: fill.quantity.get(),
                })
            }
            Some(PerpEventTag::Out) => {
                let out: &OutEventLayout = cast_layout("OutEvent", data)?;
                let side = match Side::try_from(out.side) {
                    Ok(side) => side,
                    Err(_) => return Ok(Self::unknown(slot, data)),
                };
                PerpEvent::Out(OutEvent {
                    slot,
                    side,
                    owner_slot: out.owner_slot,
                    timestamp: out.timestamp,
                    seq_num: out.seq_num.get(),
                    owner: out.owner,
                    quantity: out.quantity.get(),
                })
            }
            Some(PerpEventTag::Liquidate) => {
                let liquidate: &LiquidateEventLayout = cast_layout("LiquidateEvent", data)?;
                PerpEvent::Liquidate(LiquidateEvent {
                    slot,
                    timestamp: liquidate.timestamp,
                    seq_num: liquidate.seq_num.get(),
                    liquidatee: liquidate.liqee,
                    liquidator: liquidate.liqor,
                    price: liquidate.price.to_decimal(),
                    quantity: liquidate.quantity.get(),
                    liquidation_fee: liquidate.liquidation_fee.to_decimal(),
                })
            }
            None => Self::unknown(slot, data),
        };
        Ok(event)
    }

    fn slot(&self) -> usize {
        match self {
            PerpEvent::Fill(e) => e.slot,
            PerpEvent::Out(e) => e.slot,
            PerpEvent::Liquidate(e) => e.slot,
            PerpEvent::Unknown(e) => e.slot,
        }
    }

    fn is_fill(&self) -> bool {
        matches!(self, PerpEvent::Fill(_))
    }
}

/// Flag bits of a serum event.
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFlag {
    /// The event is a fill.
    Fill = 0x1,
    /// The event is an order leaving the book.
    Out = 0x2,
    /// The order is a bid.
    Bid = 0x4,
    /// The order was the maker side of the fill.
    Maker = 0x8,
    /// Funds locked by the order can be released.
    ReleaseFunds = 0x10,
}

impl EventFlag {
    /// The flags encoding `side`.
    pub fn from_side(side: Side) -> BitFlags<Self> {
        match side {
            Side::Bid => EventFlag::Bid.into(),
            Side::Ask => BitFlags::empty(),
        }
    }

    /// Inverse of [`EventFlag::from_side`].
    pub fn flags_to_side(flags: BitFlags<Self>) -> Side {
        if flags.contains(EventFlag::Bid) {
            Side::Bid
        } else {
            Side::Ask
        }
    }
}

/// Header of a serum event queue body, before the ring.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct SpotEventQueueHeader {
    pub account_flags: LeU64,
    pub head: LeU64,
    pub count: LeU64,
    pub seq_num: LeU64,
}

/// Byte layout of a serum event slot.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct SpotEventLayout {
    pub event_flags: u8,
    pub owner_slot: u8,
    pub fee_tier: u8,
    pub padding: [u8; 5],
    pub native_qty_released: LeU64,
    pub native_qty_paid: LeU64,
    pub native_fee_or_rebate: LeU64,
    pub order_id: LeU128,
    pub owner: Pubkey,
    pub client_order_id: LeU64,
}

/// Body shared by spot fill and out events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpotEventRecord {
    /// Ring slot the event was read from.
    pub slot: usize,
    /// The raw flags, unknown bits dropped.
    pub flags: BitFlags<EventFlag>,
    #[allow(missing_docs)]
    pub side: Side,
    /// Set by [`EventFlag::Maker`].
    pub maker: bool,
    /// Set by [`EventFlag::ReleaseFunds`].
    pub release_funds: bool,
    /// Order slot in the owner's open orders account.
    pub owner_slot: u8,
    /// Serum fee tier of the owner.
    pub fee_tier: u8,
    /// Native units credited to the owner.
    pub native_qty_released: u64,
    /// Native units debited from the owner.
    pub native_qty_paid: u64,
    /// Fee paid, or rebate received when `maker` is set.
    pub native_fee_or_rebate: u64,
    /// The order's book key.
    pub order_id: u128,
    /// The open orders account of the order owner.
    pub owner: Pubkey,
    #[allow(missing_docs)]
    pub client_order_id: u64,
}

impl SpotEventRecord {
    /// Price in lots, the high 64 bits of the order id.
    pub fn price(&self) -> u64 {
        (self.order_id >> 64) as u64
    }
}

/// One serum event queue record.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpotEvent {
    Fill(SpotEventRecord),
    Out(SpotEventRecord),
    Unknown(UnknownEvent),
}

impl QueueEvent for SpotEvent {
    const SIZE: usize = SERUM_EVENT_SIZE;

    fn decode(slot: usize, data: &[u8]) -> MangoResult<Self> {
        let layout: &SpotEventLayout = cast_layout("SpotEvent", data)?;
        let flags = BitFlags::<EventFlag>::from_bits_truncate(layout.event_flags);
        let record = SpotEventRecord {
            slot,
            flags,
            side: EventFlag::flags_to_side(flags),
            maker: flags.contains(EventFlag::Maker),
            release_funds: flags.contains(EventFlag::ReleaseFunds),
            owner_slot: layout.owner_slot,
            fee_tier: layout.fee_tier,
            native_qty_released: layout.native_qty_released.get(),
            native_qty_paid: layout.native_qty_paid.get(),
            native_fee_or_rebate: layout.native_fee_or_rebate.get(),
            order_id: layout.order_id.get(),
            owner: layout.owner,
            client_order_id: layout.client_order_id.get(),
        };
        Ok(if flags.contains(EventFlag::Fill) {
            SpotEvent::Fill(record)
        } else if flags.contains(EventFlag::Out) {
            SpotEvent::Out(record)
        } else {
            SpotEvent::Unknown(UnknownEvent {
                slot,
                tag: layout.event_flags,
                owner: layout.owner,
            })
        })
    }

    fn slot(&self) -> usize {
        match self {
            SpotEvent::Fill(e) | SpotEvent::Out(e) => e.slot,
            SpotEvent::Unknown(e) => e.slot,
        }
    }

    fn is_fill(&self) -> bool {
        matches!(self, SpotEvent::Fill(_))
    }
}

/// A decoded queue snapshot. `events` holds every ring slot; the live window is
/// `[head, head + count)` modulo the capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQueue<E> {
    /// Slot of the oldest live event.
    pub head: u64,
    /// Number of live events.
    pub count: u64,
    /// Total number of events ever pushed.
    pub seq_num: u64,
    /// Every ring slot, in account order.
    pub events: Vec<E>,
}

/// A perp market's event queue.
pub type PerpEventQueue = EventQueue<PerpEvent>;
/// A serum market's event queue.
pub type SpotEventQueue = EventQueue<SpotEvent>;

impl<E> EventQueue<E> {
    /// Number of ring slots.
    pub fn capacity(&self) -> usize {
        self.events.len()
    }

    fn slot_at(&self, offset: u64) -> &E {
        let capacity = self.capacity() as u64;
        &self.events[(self.head.wrapping_add(offset) % capacity) as usize]
    }

    /// Events still waiting to be consumed, oldest first.
    pub fn live_events(&self) -> impl Iterator<Item = &E> + '_ {
        (0..self.count).map(move |offset| self.slot_at(offset))
    }

    /// Already consumed events that have not been overwritten yet, oldest first.
    pub fn processed_events(&self) -> impl Iterator<Item = &E> + '_ {
        let capacity = self.capacity() as u64;
        let written = self.seq_num.saturating_sub(self.count);
        let retained = written.min(capacity.saturating_sub(self.count));
        (capacity - retained..capacity).map(move |offset| self.slot_at(offset))
    }

    /// The most recent `min(seq_num - last_seq_num, capacity)` published events,
    /// oldest first, whether consumed or not.
    pub fn events_since(&self, last_seq_num: u64) -> impl Iterator<Item = &E> + '_ {
        let capacity = self.capacity() as u64;
        let distance = self.seq_num.saturating_sub(last_seq_num).min(capacity);
        // the slot the next event will be written to
        let write = self.count;
        (0..distance).map(move |j| self.slot_at(write + capacity - distance + j))
    }

    fn from_ring<H>(
        layout: &'static str,
        header_len: usize,
        data: &[u8],
        event_size: usize,
        read_header: impl FnOnce(&[u8]) -> MangoResult<H>,
        header_fields: impl Fn(&H) -> (u64, u64, u64),
    ) -> MangoResult<Self>
    where
        E: QueueEvent,
    {
        if data.len() < header_len || (data.len() - header_len) % event_size != 0 {
            let whole_events = data.len().saturating_sub(header_len) / event_size;
            return Err(MangoError::SizeMismatch {
                layout,
                expected: header_len + whole_events * event_size,
                actual: data.len(),
            });
        }
        let (header, ring) = data.split_at(header_len);
        let header = read_header(header)?;
        let (head, count, seq_num) = header_fields(&header);

        let capacity = ring.len() / event_size;
        if count > capacity as u64 {
            return Err(MangoError::InvalidQueueHeader { count, capacity });
        }
        let events = ring
            .chunks_exact(event_size)
            .enumerate()
            .map(|(slot, chunk)| E::decode(slot, chunk))
            .collect::<MangoResult<Vec<_>>>()?;
        Ok(EventQueue {
            // a queue without slots has no meaningful head
            head: if capacity == 0 { 0 } else { head % capacity as u64 },
            count,
            seq_num,
            events,
        })
    }
}

impl AccountLayout for EventQueue<PerpEvent> {
    const NAME: &'static str = "PerpEventQueue";

    fn decode(data: &[u8]) -> MangoResult<Self> {
        Self::from_ring(
            Self::NAME,
            std::mem::size_of::<PerpEventQueueHeader>(),
            data,
            PerpEvent::SIZE,
            |header| {
                let header: &PerpEventQueueHeader = cast_layout(Self::NAME, header)?;
                header.meta_data.check(DataType::EventQueue)?;
                Ok(*header)
            },
            |header| (header.head.get(), header.count.get(), header.seq_num.get()),
        )
    }
}

impl AccountLayout for EventQueue<SpotEvent> {
    const NAME: &'static str = "SpotEventQueue";

    fn decode(data: &[u8]) -> MangoResult<Self> {
        let body = strip_serum_padding(data)?;
        Self::from_ring(
            Self::NAME,
            std::mem::size_of::<SpotEventQueueHeader>(),
            body,
            SpotEvent::SIZE,
            |header| cast_layout::<SpotEventQueueHeader>(Self::NAME, header).map(|h| *h),
            |header| (header.head.get(), header.count.get(), header.seq_num.get()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::add_serum_padding;

    fn perp_queue_bytes(head: u64, count: u64, seq_num: u64, events: &[[u8; 200]]) -> Vec<u8> {
        let header = PerpEventQueueHeader {
            meta_data: MetaData::new(DataType::EventQueue, 0, true),
            head: LeU64::new(head),
            count: LeU64::new(count),
            seq_num: LeU64::new(seq_num),
        };
        let mut data = bytemuck::bytes_of(&header).to_vec();
        for event in events {
            data.extend_from_slice(event);
        }
        data
    }

    fn out_event(seq_num: u64, quantity: i64) -> [u8; 200] {
        let mut out = OutEventLayout::zeroed();
        out.event_type = PerpEventTag::Out as u8;
        out.side = Side::Ask.into();
        out.owner_slot = 3;
        out.seq_num = LeU64::new(seq_num);
        out.owner = Pubkey::new_unique();
        out.quantity = LeI64::new(quantity);
        bytemuck::cast(out)
    }

    #[test]
    fn event_sizes() {
        assert_eq!(std::mem::size_of::<PerpEventQueueHeader>(), 32);
        assert_eq!(std::mem::size_of::<FillEventLayout>(), PERP_EVENT_SIZE);
        assert_eq!(std::mem::size_of::<OutEventLayout>(), PERP_EVENT_SIZE);
        assert_eq!(std::mem::size_of::<LiquidateEventLayout>(), PERP_EVENT_SIZE);
        assert_eq!(std::mem::size_of::<SpotEventQueueHeader>(), 32);
        assert_eq!(std::mem::size_of::<SpotEventLayout>(), SERUM_EVENT_SIZE);
    }

    #[test]
    fn decode_perp_events() {
        let mut fill = FillEventLayout::zeroed();
        fill.event_type = PerpEventTag::Fill as u8;
        fill.taker_side = Side::Ask.into();
        fill.maker_out = Flag::new(true);
        fill.seq_num = LeU64::new(11);
        fill.maker = Pubkey::new_unique();
        fill.taker = Pubkey::new_unique();
        fill.maker_fee = I80F48::from_bits(-(1i128 << 46));
        fill.price = LeI64::new(1234);
        fill.quantity = LeI64::new(5);

        let mut liquidate = LiquidateEventLayout::zeroed();
        liquidate.event_type = PerpEventTag::Liquidate as u8;
        liquidate.liqee = Pubkey::new_unique();
        liquidate.price = I80F48::from_bits(3i128 << 48);

        let mut unknown = [0u8; 200];
        unknown[0] = 9;

        match PerpEvent::decode(0, bytemuck::bytes_of(&fill)).unwrap() {
            PerpEvent::Fill(e) => {
                assert_eq!(e.taker_side, Side::Ask);
                assert!(e.maker_out);
                assert_eq!((e.price, e.quantity, e.seq_num), (1234, 5, 11));
                assert_eq!(e.maker_fee, Decimal::new(-25, 2));
                assert_eq!(e.maker, fill.maker);
            }
            other => panic!("unexpected event {:?}", other),
        }
        match PerpEvent::decode(1, bytemuck::bytes_of(&liquidate)).unwrap() {
            PerpEvent::Liquidate(e) => {
                assert_eq!(e.slot, 1);
                assert_eq!(e.liquidatee, liquidate.liqee);
                assert_eq!(e.price, Decimal::from(3));
            }
            other => panic!("unexpected event {:?}", other),
        }
        let event = PerpEvent::decode(2, &unknown).unwrap();
        assert_eq!(event.slot(), 2);
        assert!(matches!(event, PerpEvent::Unknown(UnknownEvent { tag: 9, .. })));
        assert!(!event.is_fill());
    }

    #[test]
    fn live_and_processed_windows() {
        // capacity 4, two consumed events then two live ones wrapping the end
        let events: Vec<[u8; 200]> = (0..4).map(|i| out_event(i, i as i64)).collect();
        let data = perp_queue_bytes(3, 2, 6, &events);
        let queue = PerpEventQueue::decode(&data).unwrap();
        assert_eq!(queue.capacity(), 4);

        let live: Vec<usize> = queue.live_events().map(QueueEvent::slot).collect();
        assert_eq!(live, vec![3, 0]);
        let processed: Vec<usize> = queue.processed_events().map(QueueEvent::slot).collect();
        assert_eq!(processed, vec![1, 2]);
        let since: Vec<usize> = queue.events_since(3).map(QueueEvent::slot).collect();
        assert_eq!(since, vec![2, 3, 0]);
        assert_eq!(queue.events_since(6).count(), 0);
        assert_eq!(queue.events_since(0).count(), 4);
    }

    #[test]
    fn processed_events_skip_unwritten_slots() {
        let events: Vec<[u8; 200]> = (0..8).map(|_| [0u8; 200]).collect();
        let data = perp_queue_bytes(1, 0, 1, &events);
        let queue = PerpEventQueue::decode(&data).unwrap();
        let processed: Vec<usize> = queue.processed_events().map(QueueEvent::slot).collect();
        assert_eq!(processed, vec![0]);
    }

    #[test]
    fn decode_perp_queue_errors() {
        let events = vec![out_event(0, 1)];
        let data = perp_queue_bytes(0, 2, 2, &events);
        assert!(matches!(
            PerpEventQueue::decode(&data),
            Err(MangoError::InvalidQueueHeader {
                count: 2,
                capacity: 1
            })
        ));

        let data = perp_queue_bytes(0, 0, 0, &events);
        assert!(matches!(
            PerpEventQueue::decode(&data[..data.len() - 1]),
            Err(MangoError::SizeMismatch {
                expected: 32,
                actual: 231,
                ..
            })
        ));
    }

    #[test]
    fn decode_spot_queue() {
        let header = SpotEventQueueHeader {
            account_flags: LeU64::new(0),
            head: LeU64::new(1),
            count: LeU64::new(2),
            seq_num: LeU64::new(40),
        };
        let mut fill = SpotEventLayout::zeroed();
        fill.event_flags = (EventFlag::Fill | EventFlag::Bid | EventFlag::Maker).bits();
        fill.order_id = LeU128::new((77u128 << 64) | 1);
        fill.native_qty_paid = LeU64::new(500);
        let mut out = SpotEventLayout::zeroed();
        out.event_flags = (EventFlag::Out | EventFlag::ReleaseFunds).bits();
        out.owner = Pubkey::new_unique();
        let empty = SpotEventLayout::zeroed();

        let mut body = bytemuck::bytes_of(&header).to_vec();
        body.extend_from_slice(bytemuck::bytes_of(&empty));
        body.extend_from_slice(bytemuck::bytes_of(&fill));
        body.extend_from_slice(bytemuck::bytes_of(&out));
        let queue = SpotEventQueue::decode(&add_serum_padding(&body)).unwrap();

        assert_eq!(queue.capacity(), 3);
        let live: Vec<&SpotEvent> = queue.live_events().collect();
        match live[0] {
            SpotEvent::Fill(e) => {
                assert_eq!(e.side, Side::Bid);
                assert!(e.maker);
                assert_eq!(e.price(), 77);
                assert_eq!(e.native_qty_paid, 500);
            }
            other => panic!("unexpected event {:?}", other),
        }
        match live[1] {
            SpotEvent::Out(e) => {
                assert_eq!(e.side, Side::Ask);
                assert!(e.release_funds);
                assert_eq!(e.owner, out.owner);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(queue.events[0], SpotEvent::Unknown(UnknownEvent { tag: 0, .. })));
    }
}
