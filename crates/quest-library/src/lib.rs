//! Tracked game collection management for Quest
//!
//! Keeps the per-status buckets of tracked games (ongoing, backlog,
//! completed, ...) in memory, applies user changes optimistically, and
//! persists them to SQLite in the background. A failed write is corrected by
//! rereading the affected buckets.

mod game;
mod gateway;
mod mapper;
mod metadata;
mod queue;
mod repository;
mod store;
mod sync;

pub use game::{
    GameDetails, GameStatus, Genre, InvolvedCompany, MAX_RATING, ParseStatusError, Platform,
    ReleaseDate, Screenshot, TrackedGame,
};
pub use gateway::{Executor, PersistenceError, PersistenceGateway, Row, SqlValue, SqliteGateway};
pub use mapper::{COLUMNS, GameRecordMapper, GameRow};
pub use metadata::{CachedMetadata, CatalogMetadata, GameMetadata, MetadataError, MetadataLookupPort};
pub use repository::{AbortSignal, GameRepository, WriteIntent};
pub use store::StatusCollectionStore;
pub use sync::{
    CollectionSyncController, OperationKind, SyncEvent, SyncHandle, SyncOutcome, SyncPhase,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Game {id} not found in {status}")]
    NotFound { id: i64, status: GameStatus },

    #[error("Game not found: {0}")]
    GameNotFound(i64),

    #[error("Index {index} out of range for bucket of {len}")]
    Range { index: usize, len: usize },

    #[error("Rating {0} out of range (0-10)")]
    RatingOutOfRange(u8),

    #[error("Bucket {0} cannot be reordered")]
    NotReorderable(GameStatus),

    #[error("Game already tracked: {0}")]
    AlreadyTracked(i64),

    #[error("Platform {platform} is not available for game {id}")]
    UnknownPlatform { id: i64, platform: i64 },

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    #[error("No metadata for game {0}")]
    MetadataNotFound(i64),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Runtime error: {0}")]
    Runtime(String),
}
