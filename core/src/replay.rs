//! Bounded per-client replay buffer: the gap recovery mechanism for clients
//! that briefly fall behind their own send queue.

use std::collections::VecDeque;

use crate::envelope::Envelope;

/// The result of a range or since lookup against a [`ReplayBuffer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayResult {
    /// The full requested range was available.
    Full(Vec<i64>),
    /// The requested range started before the oldest retained `seq`; the
    /// returned envelopes start at the oldest retained entry instead. The
    /// caller (connection handler) must detect this by comparing the first
    /// returned `seq` against the request and inform the client it was
    /// truncated.
    Truncated(Vec<i64>),
}

/// A ring of the last `K` envelopes delivered to one client, ordered by
/// `seq`. Entries are appended *before* the send to the client's queue is
/// attempted, so anything offered for delivery is replayable while still in
/// the window — see invariant (b) of the data model.
#[derive(Debug)]
pub struct ReplayBuffer {
    capacity: usize,
    entries: VecDeque<Envelope>,
}

impl ReplayBuffer {
    /// Create an empty buffer retaining at most `capacity` envelopes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), entries: VecDeque::with_capacity(capacity) }
    }

    /// Append an envelope, evicting the oldest entry if the buffer is full.
    pub fn add(&mut self, envelope: Envelope) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(envelope);
    }

    /// The oldest retained `seq`, or `None` if the buffer is empty.
    #[must_use]
    pub fn oldest_seq(&self) -> Option<i64> {
        self.entries.front().map(|e| e.seq)
    }

    /// Return the inclusive `[from, to]` subrange, in seq order.
    ///
    /// If `from` precedes the oldest retained seq the result is
    /// [`ReplayResult::Truncated`] and starts at the oldest retained entry
    /// instead of failing outright — the buffer is a best-effort recovery
    /// mechanism, not a durable log.
    #[must_use]
    pub fn get_range(&self, from: i64, to: i64) -> ReplayResult {
        let truncated = self.oldest_seq().is_some_and(|oldest| from < oldest);
        let envelopes: Vec<Envelope> = self
            .entries
            .iter()
            .filter(|e| e.seq >= from && e.seq <= to)
            .cloned()
            .collect();
        let seqs = envelopes.into_iter().map(|e| e.seq).collect();
        if truncated {
            ReplayResult::Truncated(seqs)
        } else {
            ReplayResult::Full(seqs)
        }
    }

    /// Return the envelopes in the buffer whose `seq` strictly exceeds `since`.
    #[must_use]
    pub fn get_since(&self, since: i64) -> Vec<Envelope> {
        self.entries.iter().filter(|e| e.seq > since).cloned().collect()
    }

    /// Fetch the inclusive `[from, to]` range of full envelopes (not just
    /// their sequence numbers) — used by the shard to re-enqueue replay
    /// payloads to the client's send queue.
    #[must_use]
    pub fn envelopes_in_range(&self, from: i64, to: i64) -> Vec<Envelope> {
        self.entries.iter().filter(|e| e.seq >= from && e.seq <= to).cloned().collect()
    }

    /// Discard all retained envelopes.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of envelopes currently retained.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the buffer currently holds no envelopes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::value::RawValue;

    fn env(seq: i64) -> Envelope {
        Envelope::new(seq, 0, "trade".to_string(), RawValue::from_string("{}".to_string()).unwrap())
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut buf = ReplayBuffer::new(3);
        for s in 1..=5 {
            buf.add(env(s));
        }
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.oldest_seq(), Some(3));
    }

    #[test]
    fn get_range_full_when_within_window() {
        let mut buf = ReplayBuffer::new(100);
        for s in 1..=5 {
            buf.add(env(s));
        }
        assert_eq!(buf.get_range(2, 4), ReplayResult::Full(vec![2, 3, 4]));
    }

    #[test]
    fn get_range_truncated_when_from_precedes_oldest() {
        let mut buf = ReplayBuffer::new(3);
        for s in 1..=5 {
            buf.add(env(s));
        }
        // oldest retained is 3; requesting from=1 must report truncation
        match buf.get_range(1, 4) {
            ReplayResult::Truncated(seqs) => assert_eq!(seqs, vec![3, 4]),
            ReplayResult::Full(_) => panic!("expected truncation"),
        }
    }

    #[test]
    fn get_since_returns_strictly_greater() {
        let mut buf = ReplayBuffer::new(10);
        for s in 1..=5 {
            buf.add(env(s));
        }
        let seqs: Vec<i64> = buf.get_since(3).iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![4, 5]);
    }

    #[test]
    fn clear_empties_buffer() {
        let mut buf = ReplayBuffer::new(10);
        buf.add(env(1));
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.oldest_seq(), None);
    }
}
