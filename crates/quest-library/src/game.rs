//! Tracked game entity and status buckets

use crate::metadata::GameMetadata;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Bucket a tracked game belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// Currently being played
    Ongoing,
    /// Queued to play, manually ranked
    Backlog,
    /// Finished
    Completed,
    /// Paused for later
    OnHold,
    /// Known but not tracked; removal lands here
    Undiscovered,
    /// Abandoned
    Dropped,
}

impl GameStatus {
    /// Every status, in bucket order
    pub const ALL: [GameStatus; 6] = [
        GameStatus::Ongoing,
        GameStatus::Backlog,
        GameStatus::Completed,
        GameStatus::OnHold,
        GameStatus::Undiscovered,
        GameStatus::Dropped,
    ];

    /// Persisted name of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            GameStatus::Ongoing => "ongoing",
            GameStatus::Backlog => "backlog",
            GameStatus::Completed => "completed",
            GameStatus::OnHold => "on_hold",
            GameStatus::Undiscovered => "undiscovered",
            GameStatus::Dropped => "dropped",
        }
    }

    /// Only the backlog carries priorities
    pub fn is_backlog(&self) -> bool {
        matches!(self, GameStatus::Backlog)
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            GameStatus::Ongoing => 0,
            GameStatus::Backlog => 1,
            GameStatus::Completed => 2,
            GameStatus::OnHold => 3,
            GameStatus::Undiscovered => 4,
            GameStatus::Dropped => 5,
        }
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown status name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown game status: {0}")]
pub struct ParseStatusError(pub String);

impl FromStr for GameStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "ongoing" => Ok(GameStatus::Ongoing),
            "backlog" => Ok(GameStatus::Backlog),
            "completed" => Ok(GameStatus::Completed),
            "on_hold" | "onhold" => Ok(GameStatus::OnHold),
            "undiscovered" => Ok(GameStatus::Undiscovered),
            "dropped" => Ok(GameStatus::Dropped),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

/// A platform a game is released on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub id: i64,
    pub name: String,
}

impl Platform {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// Sentinel for "no platform chosen yet"
    pub fn unselected() -> Self {
        Self::default()
    }

    pub fn is_unselected(&self) -> bool {
        self.id == 0 && self.name.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    pub id: i64,
    pub name: String,
}

/// Release date on one platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseDate {
    #[serde(default)]
    pub platform_id: Option<i64>,
    /// Unix timestamp, when known
    #[serde(default)]
    pub date: Option<i64>,
    /// Human readable form such as "2017-03-03" or "Q4 2024"
    #[serde(default)]
    pub human: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Screenshot {
    pub id: i64,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvolvedCompany {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub developer: bool,
    #[serde(default)]
    pub publisher: bool,
}

/// User annotations, usually filled in once a game is completed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameDetails {
    /// Rating from 0 to 10
    pub personal_rating: Option<u8>,
    pub notes: Option<String>,
    pub completion_date: Option<String>,
}

/// Highest accepted personal rating
pub const MAX_RATING: u8 = 10;

/// One tracked entry in the collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedGame {
    pub id: i64,
    pub name: String,
    pub status: GameStatus,
    /// 1-based rank, set only while the game is in the backlog
    pub priority: Option<u32>,
    pub personal_rating: Option<u8>,
    pub notes: Option<String>,
    pub completion_date: Option<String>,
    /// RFC 3339 timestamp, set once when the game is first tracked
    pub date_added: String,
    pub selected_platform: Platform,
    pub summary: Option<String>,
    pub cover_url: Option<String>,
    pub genres: Vec<Genre>,
    pub release_dates: Vec<ReleaseDate>,
    pub platforms: Vec<Platform>,
    pub screenshots: Vec<Screenshot>,
    pub involved_companies: Vec<InvolvedCompany>,
}

impl TrackedGame {
    /// Build a fresh entry from fetched metadata.
    ///
    /// Priority is left unset; the store assigns it when the game is
    /// appended to the backlog.
    pub fn from_metadata(
        metadata: GameMetadata,
        status: GameStatus,
        date_added: impl Into<String>,
    ) -> Self {
        Self {
            id: metadata.id,
            name: metadata.name,
            status,
            priority: None,
            personal_rating: None,
            notes: None,
            completion_date: None,
            date_added: date_added.into(),
            selected_platform: Platform::unselected(),
            summary: metadata.summary,
            cover_url: metadata.cover_url,
            genres: metadata.genres,
            release_dates: metadata.release_dates,
            platforms: metadata.platforms,
            screenshots: metadata.screenshots,
            involved_companies: metadata.involved_companies,
        }
    }

    /// Drop every per-bucket annotation; used when a game stops being tracked
    pub(crate) fn clear_annotations(&mut self) {
        self.priority = None;
        self.personal_rating = None;
        self.notes = None;
        self.completion_date = None;
    }

    pub(crate) fn apply_details(&mut self, details: GameDetails) {
        self.personal_rating = details.personal_rating;
        self.notes = details.notes;
        self.completion_date = details.completion_date;
    }
}
