//! Optimistic collection updates with background persistence
//!
//! Every operation runs through four phases:
//!
//! 1. **Applying**: the in-memory buckets are mutated synchronously and the
//!    caller gets a [`SyncHandle`] straight away.
//! 2. **Persisting**: the captured writes run on the blocking pool, queued
//!    behind earlier writes to the same buckets.
//! 3. **Confirmed**: the writes landed.
//! 4. **Reconciling**: the writes failed or timed out. The affected buckets
//!    are reread from the store and loaded over the optimistic state.
//!
//! Failures are never retried. They surface as [`SyncEvent`] notices and as
//! the handle's [`SyncOutcome`].

use crate::LibraryError;
use crate::game::{GameDetails, GameStatus, Platform, TrackedGame};
use crate::gateway::{PersistenceError, PersistenceGateway};
use crate::metadata::MetadataLookupPort;
use crate::queue::{BucketQueues, QueueTicket};
use crate::repository::{AbortSignal, GameRepository, WriteIntent};
use crate::store::StatusCollectionStore;
use chrono::Utc;
use quest_config::SyncConfig;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, error, info, warn};

/// What a user intent did to the collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Add,
    StatusChange,
    Reorder,
    Remove,
    Details,
    Platform,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Add => "add",
            OperationKind::StatusChange => "status_change",
            OperationKind::Reorder => "reorder",
            OperationKind::Remove => "remove",
            OperationKind::Details => "details",
            OperationKind::Platform => "platform",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of one optimistic operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// In-memory buckets were mutated
    Applying,
    /// Writing to the store in the background
    Persisting,
    /// The write landed; in-memory state matches the store
    Confirmed,
    /// Reloading buckets from the store
    Reconciling,
}

/// Terminal result of an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Confirmed,
    /// The write failed and the buckets were reloaded from the store
    Reconciled { cause: String },
    /// An earlier reconciliation already discarded this change; nothing was written
    Discarded,
    /// The write failed and so did the reload
    Unreconciled { cause: String },
}

impl SyncOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, SyncOutcome::Confirmed)
    }
}

/// Progress notice for the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEvent {
    pub op_id: u64,
    pub kind: OperationKind,
    pub phase: SyncPhase,
    /// Human readable message for failures
    pub notice: Option<String>,
}

/// Returned by every mutation once the optimistic change is visible
#[derive(Debug)]
pub struct SyncHandle {
    op_id: u64,
    kind: OperationKind,
    outcome: oneshot::Receiver<SyncOutcome>,
}

impl SyncHandle {
    pub fn op_id(&self) -> u64 {
        self.op_id
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Wait for the background write to settle
    pub async fn settled(self) -> SyncOutcome {
        self.outcome.await.unwrap_or_else(|_| SyncOutcome::Unreconciled {
            cause: "background task dropped".to_string(),
        })
    }
}

struct PendingWrite {
    op_id: u64,
    kind: OperationKind,
    buckets: Vec<GameStatus>,
    /// `None` when the store already reported an invariant violation
    intents: Option<Vec<WriteIntent>>,
    ticket: QueueTicket,
    outcome: oneshot::Sender<SyncOutcome>,
}

struct Inner {
    store: RwLock<StatusCollectionStore>,
    repository: GameRepository,
    metadata: Arc<dyn MetadataLookupPort>,
    queues: BucketQueues,
    events: broadcast::Sender<SyncEvent>,
    persist_timeout: Duration,
    next_op: AtomicU64,
    runtime: Handle,
}

/// Owns the collection and keeps it in step with the store
#[derive(Clone)]
pub struct CollectionSyncController {
    inner: Arc<Inner>,
}

impl CollectionSyncController {
    /// Create a controller bound to the current Tokio runtime
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        metadata: Arc<dyn MetadataLookupPort>,
        config: &SyncConfig,
    ) -> Result<Self, LibraryError> {
        let runtime = Handle::try_current().map_err(|e| LibraryError::Runtime(e.to_string()))?;
        let (events, _) = broadcast::channel(config.notice_capacity.max(1));

        Ok(Self {
            inner: Arc::new(Inner {
                store: RwLock::new(StatusCollectionStore::new()),
                repository: GameRepository::new(gateway),
                metadata,
                queues: BucketQueues::new(),
                events,
                persist_timeout: config.persist_timeout(),
                next_op: AtomicU64::new(0),
                runtime,
            }),
        })
    }

    /// Read every bucket from the store into memory
    pub async fn load_all(&self) -> Result<(), LibraryError> {
        let mut loaded = Vec::with_capacity(GameStatus::ALL.len());
        for status in GameStatus::ALL {
            let repository = self.inner.repository.clone();
            let games = self.inner.bounded(move || repository.load_bucket(status)).await?;
            loaded.push((status, games));
        }

        let mut store = self.inner.write_store();
        for (status, games) in loaded {
            store.load(status, games);
            self.inner.queues.advance(status);
        }
        info!("Collection loaded: {:?}", store.counts());
        Ok(())
    }

    /// Notices for every operation issued after subscribing
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    pub fn snapshot(&self, status: GameStatus) -> Vec<TrackedGame> {
        self.inner.read_store().snapshot(status)
    }

    pub fn find(&self, id: i64) -> Option<(GameStatus, TrackedGame)> {
        self.inner
            .read_store()
            .find(id)
            .map(|(status, game)| (status, game.clone()))
    }

    pub fn status_of(&self, id: i64) -> Option<GameStatus> {
        self.inner.read_store().status_of(id)
    }

    pub fn counts(&self) -> Vec<(GameStatus, usize)> {
        self.inner.read_store().counts()
    }

    /// Move a game between buckets
    pub fn change_status(
        &self,
        id: i64,
        new_status: GameStatus,
        old_status: GameStatus,
    ) -> Result<SyncHandle, LibraryError> {
        self.dispatch(
            OperationKind::StatusChange,
            &[old_status, new_status],
            |store| {
                let moved = store.move_game(id, old_status, new_status)?;
                let mut intents = vec![WriteIntent::Upsert(moved)];
                if old_status.is_backlog() && old_status != new_status {
                    intents.push(WriteIntent::Renumber(store.backlog_ids()));
                }
                Ok(intents)
            },
        )
    }

    /// Drag a backlog entry to a new position
    pub fn reorder(
        &self,
        status: GameStatus,
        from_index: usize,
        to_index: usize,
    ) -> Result<SyncHandle, LibraryError> {
        self.dispatch(OperationKind::Reorder, &[status], |store| {
            store.reorder(status, from_index, to_index)?;
            Ok(vec![WriteIntent::Renumber(store.backlog_ids())])
        })
    }

    /// Stop tracking a game; it is kept as `undiscovered`
    pub fn remove(&self, id: i64, status: GameStatus) -> Result<SyncHandle, LibraryError> {
        self.dispatch(
            OperationKind::Remove,
            &[status, GameStatus::Undiscovered],
            |store| {
                let removed = store.remove(id, status)?;
                let mut intents = vec![WriteIntent::Upsert(removed)];
                if status.is_backlog() {
                    intents.push(WriteIntent::Renumber(store.backlog_ids()));
                }
                Ok(intents)
            },
        )
    }

    /// Start tracking a game.
    ///
    /// Games the collection already knows, including undiscovered ones, are
    /// simply moved. New games get their metadata fetched once.
    pub async fn add_game(&self, id: i64, status: GameStatus) -> Result<SyncHandle, LibraryError> {
        if let Some(current) = self.status_of(id) {
            debug!(game_id = id, %current, "game already known; changing status");
            return self.change_status(id, status, current);
        }

        let mut metadata = self
            .inner
            .metadata
            .fetch_by_id(id)
            .await?
            .ok_or(LibraryError::MetadataNotFound(id))?;
        metadata.id = id;

        let game = TrackedGame::from_metadata(metadata, status, Utc::now().to_rfc3339());
        self.dispatch(OperationKind::Add, &[status], move |store| {
            Ok(vec![WriteIntent::Upsert(store.insert(game)?)])
        })
    }

    /// Set rating, notes and completion date
    pub fn update_details(&self, id: i64, details: GameDetails) -> Result<SyncHandle, LibraryError> {
        let status = self.status_of(id).ok_or(LibraryError::GameNotFound(id))?;
        self.dispatch(OperationKind::Details, &[status], move |store| {
            Ok(vec![WriteIntent::Upsert(store.update_details(id, status, details)?)])
        })
    }

    /// Choose the platform the game is played on
    pub fn select_platform(&self, id: i64, platform: Platform) -> Result<SyncHandle, LibraryError> {
        let status = self.status_of(id).ok_or(LibraryError::GameNotFound(id))?;
        self.dispatch(OperationKind::Platform, &[status], move |store| {
            Ok(vec![WriteIntent::Upsert(store.select_platform(id, status, platform)?)])
        })
    }

    fn dispatch<F>(
        &self,
        kind: OperationKind,
        buckets: &[GameStatus],
        mutate: F,
    ) -> Result<SyncHandle, LibraryError>
    where
        F: FnOnce(&mut StatusCollectionStore) -> Result<Vec<WriteIntent>, LibraryError>,
    {
        let inner = &self.inner;

        // Mutation and ticket share the store lock so a reconciliation
        // cannot slip in between them
        let (result, ticket) = {
            let mut store = inner.write_store();
            match mutate(&mut *store) {
                Ok(intents) => (Ok(intents), inner.queues.enqueue(buckets)),
                Err(err @ LibraryError::InvariantViolation(_)) => {
                    (Err(err), inner.queues.enqueue(buckets))
                }
                Err(err) => return Err(err),
            }
        };

        let op_id = inner.next_op.fetch_add(1, Ordering::Relaxed) + 1;
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (intents, violation) = match result {
            Ok(intents) => {
                debug!(op_id, %kind, writes = intents.len(), "applied optimistically");
                inner.emit(op_id, kind, SyncPhase::Applying, None);
                (Some(intents), None)
            }
            Err(err) => (None, Some(err)),
        };

        let pending = PendingWrite {
            op_id,
            kind,
            buckets: buckets.to_vec(),
            intents,
            ticket,
            outcome: outcome_tx,
        };
        inner.runtime.spawn(Arc::clone(inner).persist(pending));

        if let Some(err) = violation {
            return Err(err);
        }

        Ok(SyncHandle {
            op_id,
            kind,
            outcome: outcome_rx,
        })
    }
}

impl Inner {
    async fn persist(self: Arc<Self>, pending: PendingWrite) {
        let PendingWrite {
            op_id,
            kind,
            buckets,
            intents,
            mut ticket,
            outcome,
        } = pending;

        ticket.wait_turn().await;

        let stale = self.queues.stale_buckets(&ticket);
        let result = if !stale.is_empty() {
            info!(op_id, %kind, ?stale, "operation superseded by reconciliation; skipping write");
            // Buckets that were not reloaded still show this change
            let holding: Vec<GameStatus> = buckets
                .iter()
                .copied()
                .filter(|bucket| !stale.contains(bucket))
                .collect();
            if holding.is_empty() {
                SyncOutcome::Discarded
            } else {
                match self.recover(op_id, kind, &holding, "superseded".to_string()).await {
                    SyncOutcome::Reconciled { .. } => SyncOutcome::Discarded,
                    other => other,
                }
            }
        } else {
            match intents {
                Some(intents) => {
                    self.emit(op_id, kind, SyncPhase::Persisting, None);
                    match self.bounded_write(op_id, intents).await {
                        Ok(()) => {
                            debug!(op_id, %kind, "write confirmed");
                            self.emit(op_id, kind, SyncPhase::Confirmed, None);
                            SyncOutcome::Confirmed
                        }
                        Err(err) => {
                            warn!(op_id, %kind, error = %err, "persistence failed; reconciling");
                            self.recover(op_id, kind, &buckets, err.to_string()).await
                        }
                    }
                }
                None => {
                    self.recover(op_id, kind, &buckets, "invariant violation".to_string())
                        .await
                }
            }
        };

        drop(ticket);
        let _ = outcome.send(result);
    }

    async fn recover(
        &self,
        op_id: u64,
        kind: OperationKind,
        buckets: &[GameStatus],
        cause: String,
    ) -> SyncOutcome {
        self.emit(
            op_id,
            kind,
            SyncPhase::Reconciling,
            Some(format!("Could not save {}: {}", kind, cause)),
        );

        match self.reconcile(buckets).await {
            Ok(()) => {
                info!(op_id, %kind, ?buckets, "buckets reloaded from store");
                SyncOutcome::Reconciled { cause }
            }
            Err(err) => {
                error!(op_id, %kind, error = %err, "reconciliation failed");
                self.emit(
                    op_id,
                    kind,
                    SyncPhase::Reconciling,
                    Some(format!("Could not reload collection: {}", err)),
                );
                SyncOutcome::Unreconciled {
                    cause: err.to_string(),
                }
            }
        }
    }

    /// Overwrite buckets with what the store holds
    async fn reconcile(&self, buckets: &[GameStatus]) -> Result<(), PersistenceError> {
        let mut reloaded = Vec::with_capacity(buckets.len());
        for &status in buckets {
            let repository = self.repository.clone();
            let games = self.bounded(move || repository.load_bucket(status)).await?;
            reloaded.push((status, games));
        }

        let mut store = self.write_store();
        for (status, games) in reloaded {
            store.load(status, games);
            self.queues.advance(status);
        }
        Ok(())
    }

    /// Run a blocking read with the configured timeout; an abandoned read changes nothing
    async fn bounded<T, F>(&self, work: F) -> Result<T, PersistenceError>
    where
        F: FnOnce() -> Result<T, PersistenceError> + Send + 'static,
        T: Send + 'static,
    {
        match tokio::time::timeout(self.persist_timeout, tokio::task::spawn_blocking(work)).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(PersistenceError::Background(join_error.to_string())),
            Err(_) => Err(PersistenceError::Timeout(self.persist_timeout)),
        }
    }

    /// Write with the configured timeout.
    ///
    /// An overrunning write is aborted and then awaited, so it has either
    /// rolled back or committed before the caller rereads the store. The
    /// queue ticket is still held meanwhile, so later writes to the same
    /// buckets stay behind it.
    async fn bounded_write(
        &self,
        op_id: u64,
        intents: Vec<WriteIntent>,
    ) -> Result<(), PersistenceError> {
        let abort = AbortSignal::new();
        let repository = self.repository.clone();
        let signal = abort.clone();
        let mut task =
            tokio::task::spawn_blocking(move || repository.apply_abortable(&intents, &signal));

        match tokio::time::timeout(self.persist_timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(PersistenceError::Background(join_error.to_string())),
            Err(_) => {
                abort.abort();
                match task.await {
                    Ok(Ok(())) => warn!(op_id, "write committed after timing out"),
                    Ok(Err(err)) => debug!(op_id, error = %err, "timed out write stopped"),
                    Err(join_error) => warn!(op_id, error = %join_error, "timed out write panicked"),
                }
                Err(PersistenceError::Timeout(self.persist_timeout))
            }
        }
    }

    fn emit(&self, op_id: u64, kind: OperationKind, phase: SyncPhase, notice: Option<String>) {
        // No subscribers is fine
        let _ = self.events.send(SyncEvent {
            op_id,
            kind,
            phase,
            notice,
        });
    }

    fn read_store(&self) -> RwLockReadGuard<'_, StatusCollectionStore> {
        self.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_store(&self) -> RwLockWriteGuard<'_, StatusCollectionStore> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }
}
