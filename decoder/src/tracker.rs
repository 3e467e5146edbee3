//! Incremental consumption of event queue snapshots.
//!
//! A tracker remembers the sequence number of the last snapshot it saw. Given a
//! newer snapshot it returns exactly the events published in between, oldest
//! first, as long as fewer than a full queue of events was published. When more
//! were published the oldest ones have been overwritten, and the tracker says so.
use std::collections::HashMap;

use solana_program::pubkey::Pubkey;
use tracing::{debug, warn};

use crate::{
    error::{MangoError, MangoResult},
    state::event_queue::EventQueue,
};

/// The result of comparing a snapshot with the last one observed.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnseenEvents<E> {
    /// Every event published since the last observation.
    Complete(Vec<E>),
    /// More events were published than the queue holds. `recovered` holds the
    /// newest `capacity` of them; `missed` were overwritten before being seen.
    #[allow(missing_docs)]
    Overflowed { missed: u64, recovered: Vec<E> },
}

impl<E> UnseenEvents<E> {
    /// The delivered events, oldest first.
    pub fn events(&self) -> &[E] {
        match self {
            UnseenEvents::Complete(events) => events,
            UnseenEvents::Overflowed { recovered, .. } => recovered,
        }
    }

    #[allow(missing_docs)]
    pub fn into_events(self) -> Vec<E> {
        match self {
            UnseenEvents::Complete(events) => events,
            UnseenEvents::Overflowed { recovered, .. } => recovered,
        }
    }

    /// Whether some events were lost.
    pub fn is_overflowed(&self) -> bool {
        matches!(self, UnseenEvents::Overflowed { .. })
    }
}

/// Remembers how far one event queue has been read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnseenEventTracker {
    last_sequence_number: u64,
}

impl UnseenEventTracker {
    /// Events present in `initial` count as already seen.
    pub fn new<E>(initial: &EventQueue<E>) -> Self {
        Self::from_sequence_number(initial.seq_num)
    }

    /// Resume from a sequence number saved earlier.
    pub fn from_sequence_number(last_sequence_number: u64) -> Self {
        Self {
            last_sequence_number,
        }
    }

    /// Sequence number of the last observed snapshot.
    pub fn last_sequence_number(&self) -> u64 {
        self.last_sequence_number
    }

    /// Events published since the last observed snapshot. A snapshot older
    /// than the last one is an error and leaves the tracker untouched.
    pub fn unseen<E: Clone>(&mut self, snapshot: &EventQueue<E>) -> MangoResult<UnseenEvents<E>> {
        let previous = self.last_sequence_number;
        let current = snapshot.seq_num;
        if current < previous {
            return Err(MangoError::SequenceRegression { previous, current });
        }

        let distance = current - previous;
        let capacity = snapshot.capacity() as u64;
        let recovered: Vec<E> = snapshot.events_since(previous).cloned().collect();
        self.last_sequence_number = current;

        if distance > capacity {
            let missed = distance - capacity;
            warn!(
                previous,
                current, capacity, missed, "event queue overflowed between observations"
            );
            return Ok(UnseenEvents::Overflowed { missed, recovered });
        }
        if distance > 0 {
            debug!(previous, current, unseen = distance, "new events");
        }
        Ok(UnseenEvents::Complete(recovered))
    }
}

/// One tracker per event queue address.
#[derive(Debug, Default, Clone)]
pub struct TrackerRegistry {
    trackers: HashMap<Pubkey, UnseenEventTracker>,
}

impl TrackerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The tracker of `queue`, once a snapshot of it was observed.
    pub fn get(&self, queue: &Pubkey) -> Option<&UnseenEventTracker> {
        self.trackers.get(queue)
    }

    /// Number of tracked queues.
    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }

    /// Stop tracking `queue`.
    pub fn remove(&mut self, queue: &Pubkey) -> Option<UnseenEventTracker> {
        self.trackers.remove(queue)
    }

    /// The first snapshot of an address only starts tracking it and yields no
    /// events. Later snapshots behave like [`UnseenEventTracker::unseen`].
    pub fn observe<E: Clone>(
        &mut self,
        queue: Pubkey,
        snapshot: &EventQueue<E>,
    ) -> MangoResult<UnseenEvents<E>> {
        match self.trackers.get_mut(&queue) {
            Some(tracker) => tracker.unseen(snapshot),
            None => {
                debug!(%queue, seq_num = snapshot.seq_num, "tracking event queue");
                self.trackers
                    .insert(queue, UnseenEventTracker::new(snapshot));
                Ok(UnseenEvents::Complete(vec![]))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(head: u64, count: u64, seq_num: u64, events: Vec<u32>) -> EventQueue<u32> {
        EventQueue {
            head,
            count,
            seq_num,
            events,
        }
    }

    #[test]
    fn single_new_event() {
        let initial = queue(1, 0, 1, vec![1, 2, 3, 4, 0, 0, 0, 0]);
        let mut tracker = UnseenEventTracker::new(&initial);
        assert_eq!(tracker.last_sequence_number(), 1);

        let next = queue(2, 1, 2, vec![1, 2, 42, 4, 0, 0, 0, 0]);
        assert_eq!(
            tracker.unseen(&next).unwrap(),
            UnseenEvents::Complete(vec![42])
        );
        assert_eq!(tracker.last_sequence_number(), 2);

        // observing the same snapshot again yields nothing
        assert_eq!(
            tracker.unseen(&next).unwrap(),
            UnseenEvents::Complete(vec![])
        );
    }

    #[test]
    fn events_across_the_wrap() {
        let mut tracker = UnseenEventTracker::from_sequence_number(5);
        // capacity 4: events 6 and 7 went to slots 1 and 2, 8 and 9 wrapped to 3 and 0
        let snapshot = queue(1, 4, 9, vec![9, 6, 7, 8]);
        assert_eq!(
            tracker.unseen(&snapshot).unwrap(),
            UnseenEvents::Complete(vec![6, 7, 8, 9])
        );
    }

    #[test]
    fn overflow_is_reported_and_resynced() {
        let mut tracker = UnseenEventTracker::from_sequence_number(0);
        let snapshot = queue(2, 0, 10, vec![9, 10, 7, 8]);
        let unseen = tracker.unseen(&snapshot).unwrap();
        assert!(unseen.is_overflowed());
        assert_eq!(
            unseen,
            UnseenEvents::Overflowed {
                missed: 6,
                recovered: vec![7, 8, 9, 10]
            }
        );
        assert_eq!(tracker.last_sequence_number(), 10);

        let snapshot = queue(2, 1, 11, vec![9, 10, 11, 8]);
        assert_eq!(tracker.unseen(&snapshot).unwrap().into_events(), vec![11]);
    }

    #[test]
    fn regression_is_an_error() {
        let mut tracker = UnseenEventTracker::from_sequence_number(7);
        let snapshot = queue(0, 0, 6, vec![0; 4]);
        assert!(matches!(
            tracker.unseen(&snapshot),
            Err(MangoError::SequenceRegression {
                previous: 7,
                current: 6
            })
        ));
        assert_eq!(tracker.last_sequence_number(), 7);
    }

    #[test]
    fn registry_tracks_each_queue() {
        let mut registry = TrackerRegistry::new();
        let first = Pubkey::new_unique();
        let second = Pubkey::new_unique();

        let snapshot = queue(0, 1, 1, vec![1, 0]);
        assert_eq!(registry.observe(first, &snapshot).unwrap().events(), &[] as &[u32]);
        assert_eq!(registry.observe(second, &snapshot).unwrap().events(), &[] as &[u32]);

        let snapshot = queue(0, 2, 2, vec![1, 2]);
        assert_eq!(registry.observe(first, &snapshot).unwrap().events(), &[2]);
        assert_eq!(registry.get(&first).unwrap().last_sequence_number(), 2);
        assert_eq!(registry.get(&second).unwrap().last_sequence_number(), 1);
        assert_eq!(registry.len(), 2);
        assert!(registry.remove(&second).is_some());
        assert_eq!(registry.len(), 1);
    }
}
