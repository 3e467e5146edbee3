use bytemuck::Zeroable;
use mango_decoder::adapters::{LeI64, LeU64, I80F48};
use mango_decoder::state::event_queue::{
    FillEventLayout, OutEventLayout, PerpEvent, PerpEventQueue, PerpEventQueueHeader,
    PerpEventTag, PERP_EVENT_SIZE,
};
use mango_decoder::state::{AccountLayout, DataType, MetaData, Side};
use mango_decoder::tracker::{TrackerRegistry, UnseenEventTracker, UnseenEvents};
use mango_decoder::MangoError;
use rust_decimal_macros::dec;
use solana_program::pubkey::Pubkey;

const CAPACITY: usize = 8;

/// A queue account whose ring is filled by replaying `published` events in
/// order, with the oldest `count` of the last ones still live.
struct QueueWriter {
    slots: Vec<[u8; PERP_EVENT_SIZE]>,
    head: u64,
    count: u64,
    seq_num: u64,
}

impl QueueWriter {
    fn new() -> Self {
        QueueWriter {
            slots: vec![[0; PERP_EVENT_SIZE]; CAPACITY],
            head: 0,
            count: 0,
            seq_num: 0,
        }
    }

    fn push(&mut self, event: [u8; PERP_EVENT_SIZE]) {
        let slot = (self.head + self.count) as usize % CAPACITY;
        self.slots[slot] = event;
        if self.count as usize == CAPACITY {
            self.head = (self.head + 1) % CAPACITY as u64;
        } else {
            self.count += 1;
        }
        self.seq_num += 1;
    }

    fn consume(&mut self, n: u64) {
        let n = n.min(self.count);
        self.head = (self.head + n) % CAPACITY as u64;
        self.count -= n;
    }

    fn bytes(&self) -> Vec<u8> {
        let header = PerpEventQueueHeader {
            meta_data: MetaData::new(DataType::EventQueue, 0, true),
            head: LeU64::new(self.head),
            count: LeU64::new(self.count),
            seq_num: LeU64::new(self.seq_num),
        };
        let mut data = bytemuck::bytes_of(&header).to_vec();
        for slot in &self.slots {
            data.extend_from_slice(slot);
        }
        data
    }

    fn snapshot(&self) -> PerpEventQueue {
        PerpEventQueue::decode(&self.bytes()).unwrap()
    }
}

fn fill(seq_num: u64, price: i64) -> [u8; PERP_EVENT_SIZE] {
    let mut fill = FillEventLayout::zeroed();
    fill.event_type = PerpEventTag::Fill as u8;
    fill.taker_side = Side::Bid.into();
    fill.seq_num = LeU64::new(seq_num);
    fill.maker = Pubkey::new_unique();
    fill.taker = Pubkey::new_unique();
    fill.maker_fee = I80F48::from_bits(-(1 << 44));
    fill.price = LeI64::new(price);
    fill.quantity = LeI64::new(1);
    bytemuck::cast(fill)
}

fn out(seq_num: u64) -> [u8; PERP_EVENT_SIZE] {
    let mut out = OutEventLayout::zeroed();
    out.event_type = PerpEventTag::Out as u8;
    out.side = Side::Ask.into();
    out.seq_num = LeU64::new(seq_num);
    out.owner = Pubkey::new_unique();
    out.quantity = LeI64::new(3);
    bytemuck::cast(out)
}

fn seq_nums(events: &[PerpEvent]) -> Vec<u64> {
    events.iter().filter_map(PerpEvent::seq_num).collect()
}

#[test]
fn every_event_is_seen_once_in_order() {
    let mut writer = QueueWriter::new();
    for seq in 0..4 {
        writer.push(fill(seq, 100));
    }
    writer.consume(4);
    let mut tracker = UnseenEventTracker::new(&writer.snapshot());

    let mut seen = vec![];
    let mut next = 4;
    for (published, consumed) in [(3, 1), (5, 5), (0, 0), (7, 2), (8, 8), (1, 0)] {
        for _ in 0..published {
            let event = if next % 3 == 0 { out(next) } else { fill(next, 100 + next as i64) };
            writer.push(event);
            next += 1;
        }
        let unseen = tracker.unseen(&writer.snapshot()).unwrap();
        assert!(!unseen.is_overflowed());
        seen.extend(seq_nums(unseen.events()));
        writer.consume(consumed);
    }
    assert_eq!(seen, (4..next).collect::<Vec<_>>());
    assert_eq!(tracker.last_sequence_number(), next);
}

#[test]
fn decoded_fill_fields() {
    let mut writer = QueueWriter::new();
    let mut tracker = UnseenEventTracker::new(&writer.snapshot());
    writer.push(fill(0, 1234));

    let events = tracker.unseen(&writer.snapshot()).unwrap().into_events();
    match events.as_slice() {
        [PerpEvent::Fill(fill)] => {
            assert_eq!(fill.slot, 0);
            assert_eq!(fill.price, 1234);
            assert_eq!(fill.taker_side, Side::Bid);
            assert_eq!(fill.maker_fee, dec!(-0.0625));
        }
        other => panic!("unexpected events {:?}", other),
    }
}

#[test]
fn overflow_between_snapshots() {
    let mut writer = QueueWriter::new();
    let mut tracker = UnseenEventTracker::new(&writer.snapshot());
    for seq in 0..11 {
        writer.push(fill(seq, 1));
        writer.consume(1);
    }

    match tracker.unseen(&writer.snapshot()).unwrap() {
        UnseenEvents::Overflowed { missed, recovered } => {
            assert_eq!(missed, 3);
            assert_eq!(seq_nums(&recovered), (3..11).collect::<Vec<_>>());
        }
        other => panic!("expected an overflow, got {:?}", other),
    }

    writer.push(out(11));
    let unseen = tracker.unseen(&writer.snapshot()).unwrap();
    assert_eq!(seq_nums(unseen.events()), vec![11]);
}

#[test]
fn registry_rejects_stale_snapshots() {
    let queue = Pubkey::new_unique();
    let mut writer = QueueWriter::new();
    writer.push(fill(0, 1));
    let stale = writer.snapshot();
    writer.push(fill(1, 1));

    let mut registry = TrackerRegistry::new();
    assert!(registry.observe(queue, &writer.snapshot()).unwrap().events().is_empty());
    assert!(matches!(
        registry.observe(queue, &stale),
        Err(MangoError::SequenceRegression {
            previous: 2,
            current: 1
        })
    ));
    writer.push(fill(2, 1));
    assert_eq!(
        seq_nums(registry.observe(queue, &writer.snapshot()).unwrap().events()),
        vec![2]
    );
}
