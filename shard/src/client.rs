//! A shard's view of one connected client: send queue, sequencing, and
//! replay buffer, all exclusively owned by the shard's event loop task.

use gateway_core::{BroadcastRecord, Envelope, ReplayBuffer, ReplayRequest, ReplayResult, SequenceGenerator};
use tokio::sync::mpsc;

/// A frame handed to a client's writer pump over its send queue.
#[derive(Debug, Clone)]
pub enum ClientFrame {
    /// A sequenced server-to-client envelope.
    Envelope(Envelope),
}

/// Everything a shard tracks about one client.
///
/// A client belongs to exactly one shard for its lifetime; this type is
/// never shared across tasks, so plain fields suffice — no atomics, no
/// locks.
pub struct Client {
    /// The client's id, stable for its lifetime.
    pub id: u64,
    sender: mpsc::Sender<ClientFrame>,
    seq: SequenceGenerator,
    replay: ReplayBuffer,
    consecutive_failures: u8,
    closed: bool,
}

impl Client {
    /// Register a new client with a fresh sequence generator and replay buffer.
    #[must_use]
    pub fn new(id: u64, sender: mpsc::Sender<ClientFrame>, replay_capacity: usize) -> Self {
        Self {
            id,
            sender,
            seq: SequenceGenerator::new(),
            replay: ReplayBuffer::new(replay_capacity),
            consecutive_failures: 0,
            closed: false,
        }
    }

    /// Whether this client has already been closed by its shard.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Consecutive non-blocking send failures since the last success.
    #[must_use]
    pub const fn consecutive_failures(&self) -> u8 {
        self.consecutive_failures
    }

    /// Wrap `record` with this client's next sequence number, append it to
    /// the replay buffer, and attempt a non-blocking enqueue onto the send
    /// queue.
    ///
    /// Returns `true` on success. On failure the caller is responsible for
    /// checking [`Client::consecutive_failures`] against the eviction
    /// threshold — this method only tracks the counter, it never closes the
    /// client itself.
    pub fn deliver(&mut self, record: &BroadcastRecord) -> bool {
        let envelope = Envelope::from_broadcast(self.seq.next(), record);
        self.replay.add(envelope.clone());
        match self.sender.try_send(ClientFrame::Envelope(envelope)) {
            Ok(()) => {
                self.consecutive_failures = 0;
                true
            },
            Err(_) => {
                self.consecutive_failures += 1;
                false
            },
        }
    }

    /// Mark the client closed. A no-op if already closed — cleanup must be
    /// idempotent. The shard drops this client's sender (via removal from
    /// its map) rather than trying to enqueue a close frame onto the very
    /// queue whose fullness triggered the close; the writer pump emits the
    /// close frame itself on observing the sender gone.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Resolve a `replay` control frame against this client's buffer.
    ///
    /// Returns whether the result was truncated (the request's `from`
    /// preceded the oldest retained entry) and the envelopes to redeliver.
    /// Pure and synchronous — re-enqueuing onto the send queue is the
    /// caller's job, since that involves a soft timeout the shard loop
    /// itself must not block on.
    #[must_use]
    pub fn fetch_replay(&self, request: &ReplayRequest) -> (bool, Vec<Envelope>) {
        match *request {
            ReplayRequest::Range { from, to } => match self.replay.get_range(from, to) {
                ReplayResult::Full(_) => (false, self.replay.envelopes_in_range(from, to)),
                ReplayResult::Truncated(_) => {
                    let oldest = self.replay.oldest_seq().unwrap_or(from);
                    (true, self.replay.envelopes_in_range(oldest, to))
                },
            },
            ReplayRequest::Since { since } => (false, self.replay.get_since(since)),
        }
    }

    /// Clone the send queue handle, e.g. to hand to a spawned replay-delivery task.
    #[must_use]
    pub fn sender(&self) -> mpsc::Sender<ClientFrame> {
        self.sender.clone()
    }
}
