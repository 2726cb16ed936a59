//! Virtual-clock discrete-event scheduler.
//!
//! Events are ordered by `(at_ms, seq)`, so events due at the same instant
//! fire in the order they were scheduled. Every entry is stamped with the
//! generation that scheduled it; [`Scheduler::cancel_all`] starts a new
//! generation, and entries from an older one are dropped when popped even if
//! they somehow survive in the queue.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

/// Identifies one scheduled event so it can be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket {
    seq: u64,
    generation: u64,
}

#[derive(Debug)]
struct Entry<E> {
    at_ms: u64,
    seq: u64,
    generation: u64,
    event: E,
}

impl<E> PartialEq for Entry<E> {
    fn eq(&self, other: &Self) -> bool {
        self.at_ms == other.at_ms && self.seq == other.seq
    }
}

impl<E> Eq for Entry<E> {}

impl<E> PartialOrd for Entry<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Entry<E> {
    // Reversed: BinaryHeap is a max-heap and we want the earliest first.
    fn cmp(&self, other: &Self) -> Ordering {
        (other.at_ms, other.seq).cmp(&(self.at_ms, self.seq))
    }
}

/// A discrete-event queue over virtual milliseconds.
#[derive(Debug)]
pub struct Scheduler<E> {
    now_ms: u64,
    generation: u64,
    next_seq: u64,
    queue: BinaryHeap<Entry<E>>,
    cancelled: HashSet<u64>,
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Scheduler<E> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            now_ms: 0,
            generation: 0,
            next_seq: 0,
            queue: BinaryHeap::new(),
            cancelled: HashSet::new(),
        }
    }

    /// Returns the current virtual time.
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Returns the current generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Schedules `event` to fire `delay_ms` after now.
    pub fn schedule_in(&mut self, delay_ms: u64, event: E) -> Ticket {
        self.schedule_at(self.now_ms.saturating_add(delay_ms), event)
    }

    /// Schedules `event` at an absolute time. Times in the past fire next.
    pub fn schedule_at(&mut self, at_ms: u64, event: E) -> Ticket {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Entry {
            at_ms: at_ms.max(self.now_ms),
            seq,
            generation: self.generation,
            event,
        });
        Ticket {
            seq,
            generation: self.generation,
        }
    }

    /// Cancels one event. Cancelling a fired or stale ticket does nothing.
    pub fn cancel(&mut self, ticket: Ticket) {
        if ticket.generation == self.generation {
            self.cancelled.insert(ticket.seq);
        }
    }

    /// Cancels every outstanding event and starts a new generation.
    pub fn cancel_all(&mut self) {
        self.generation += 1;
        self.queue.clear();
        self.cancelled.clear();
    }

    /// Returns the time of the earliest live event.
    pub fn next_due(&mut self) -> Option<u64> {
        self.discard_dead();
        self.queue.peek().map(|entry| entry.at_ms)
    }

    /// Pops the earliest live event due at or before `until_ms` and moves
    /// the clock to its time.
    pub fn pop_due(&mut self, until_ms: u64) -> Option<(Ticket, E)> {
        self.discard_dead();
        if self.queue.peek()?.at_ms > until_ms {
            return None;
        }
        let entry = self.queue.pop()?;
        self.now_ms = self.now_ms.max(entry.at_ms);
        Some((
            Ticket {
                seq: entry.seq,
                generation: entry.generation,
            },
            entry.event,
        ))
    }

    /// Moves the clock forward. The clock never runs backwards.
    pub fn advance_to(&mut self, at_ms: u64) {
        self.now_ms = self.now_ms.max(at_ms);
    }

    /// Returns true if no live event is queued.
    pub fn is_empty(&mut self) -> bool {
        self.next_due().is_none()
    }

    fn discard_dead(&mut self) {
        while let Some(entry) = self.queue.peek() {
            let stale = entry.generation != self.generation;
            let cancelled = self.cancelled.contains(&entry.seq);
            if !stale && !cancelled {
                break;
            }
            if let Some(entry) = self.queue.pop() {
                self.cancelled.remove(&entry.seq);
            }
        }
    }
}
