//! Per-bucket write ordering
//!
//! Every background write takes a ticket for the buckets it touches. A
//! ticket waits for the previous ticket on each of those buckets, so writes
//! to one bucket land in issue order while other buckets proceed freely.
//!
//! Each bucket also carries an epoch that advances whenever the bucket is
//! reloaded from the store. A ticket remembers the epochs it was issued
//! under; if one moved by the time the ticket gets its turn, the optimistic
//! state it was built from has already been overwritten.

use crate::game::GameStatus;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;

#[derive(Default)]
struct QueueState {
    tails: HashMap<GameStatus, watch::Receiver<()>>,
    epochs: HashMap<GameStatus, u64>,
}

#[derive(Default)]
pub(crate) struct BucketQueues {
    state: Mutex<QueueState>,
}

impl BucketQueues {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue behind the latest ticket of every listed bucket
    pub(crate) fn enqueue(&self, buckets: &[GameStatus]) -> QueueTicket {
        let (done, released) = watch::channel(());
        let mut state = self.lock();

        let mut predecessors = Vec::with_capacity(buckets.len());
        let mut epochs = Vec::with_capacity(buckets.len());
        for (index, &bucket) in buckets.iter().enumerate() {
            // A ticket must never wait on itself
            if buckets[..index].contains(&bucket) {
                continue;
            }
            if let Some(previous) = state.tails.insert(bucket, released.clone()) {
                predecessors.push(previous);
            }
            epochs.push((bucket, state.epochs.get(&bucket).copied().unwrap_or_default()));
        }

        QueueTicket {
            predecessors,
            epochs,
            _done: done,
        }
    }

    /// Record that a bucket was overwritten from persisted state
    pub(crate) fn advance(&self, bucket: GameStatus) {
        *self.lock().epochs.entry(bucket).or_default() += 1;
    }

    /// Buckets reloaded since the ticket was issued
    pub(crate) fn stale_buckets(&self, ticket: &QueueTicket) -> Vec<GameStatus> {
        let state = self.lock();
        ticket
            .epochs
            .iter()
            .filter(|(bucket, epoch)| state.epochs.get(bucket).copied().unwrap_or_default() != *epoch)
            .map(|(bucket, _)| *bucket)
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Turn in one or more bucket queues; dropping it releases the successors
pub(crate) struct QueueTicket {
    predecessors: Vec<watch::Receiver<()>>,
    epochs: Vec<(GameStatus, u64)>,
    _done: watch::Sender<()>,
}

impl QueueTicket {
    /// Resolve once every earlier ticket on the same buckets was dropped
    pub(crate) async fn wait_turn(&mut self) {
        for previous in &mut self.predecessors {
            // Nothing is ever sent; the channel closes when the sender drops
            while previous.changed().await.is_ok() {}
        }
        self.predecessors.clear();
    }
}
