//! In-memory status buckets
//!
//! `StatusCollectionStore` owns one ordered list per status. Every mutation
//! is synchronous and either fails without touching state or leaves the
//! buckets satisfying:
//!
//! - each game id lives in exactly one bucket, and its `status` names it;
//! - backlog priorities are exactly `1..=N` in bucket order;
//! - no game outside the backlog carries a priority.
//!
//! A broken invariant after a mutation is a bug. Debug builds panic on it;
//! release builds report `InvariantViolation` so the caller can reload.

use crate::LibraryError;
use crate::game::{GameDetails, GameStatus, MAX_RATING, Platform, TrackedGame};
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct StatusCollectionStore {
    buckets: [Vec<TrackedGame>; 6],
}

impl StatusCollectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a bucket wholesale.
    ///
    /// Backlog input must already be sorted by priority. Ids present in the
    /// incoming list are evicted from every other bucket, since the loaded
    /// rows are authoritative.
    pub fn load(&mut self, status: GameStatus, games: Vec<TrackedGame>) {
        let incoming: HashSet<i64> = games.iter().map(|game| game.id).collect();

        for other in GameStatus::ALL {
            if other == status {
                continue;
            }
            let bucket = self.bucket_mut(other);
            let before = bucket.len();
            bucket.retain(|game| !incoming.contains(&game.id));
            if bucket.len() != before {
                tracing::debug!(
                    status = %other,
                    evicted = before - bucket.len(),
                    "evicted ids reloaded into another bucket"
                );
                if other.is_backlog() {
                    renumber(bucket);
                }
            }
        }

        tracing::debug!(status = %status, count = games.len(), "bucket loaded");
        *self.bucket_mut(status) = games;
    }

    /// Move a game to the end of another bucket.
    ///
    /// Entering the backlog ranks the game last. Leaving the backlog closes
    /// the gap in the remaining priorities. Leaving `completed` clears the
    /// completion date.
    pub fn move_game(
        &mut self,
        id: i64,
        from: GameStatus,
        to: GameStatus,
    ) -> Result<TrackedGame, LibraryError> {
        let position = self.position(id, from)?;
        if from == to {
            return Ok(self.bucket(from)[position].clone());
        }

        let mut game = self.bucket_mut(from).remove(position);
        if from.is_backlog() {
            renumber(self.bucket_mut(from));
        }
        if from == GameStatus::Completed {
            game.completion_date = None;
        }

        game.status = to;
        game.priority = if to.is_backlog() {
            Some(next_priority(self.bucket(to)))
        } else {
            None
        };
        self.bucket_mut(to).push(game.clone());

        self.enforce_invariants()?;
        Ok(game)
    }

    /// Move the backlog entry at `from_index` to `to_index` and renumber
    pub fn reorder(
        &mut self,
        status: GameStatus,
        from_index: usize,
        to_index: usize,
    ) -> Result<(), LibraryError> {
        if !status.is_backlog() {
            return Err(LibraryError::NotReorderable(status));
        }

        let len = self.bucket(status).len();
        for index in [from_index, to_index] {
            if index >= len {
                return Err(LibraryError::Range { index, len });
            }
        }
        if from_index == to_index {
            return Ok(());
        }

        let bucket = self.bucket_mut(status);
        let game = bucket.remove(from_index);
        bucket.insert(to_index, game);
        renumber(bucket);

        self.enforce_invariants()
    }

    /// Stop tracking a game.
    ///
    /// The entry moves to `undiscovered` with its priority and annotations
    /// cleared, mirroring the persisted row.
    pub fn remove(&mut self, id: i64, status: GameStatus) -> Result<TrackedGame, LibraryError> {
        let position = self.position(id, status)?;
        if status == GameStatus::Undiscovered {
            return Ok(self.bucket(status)[position].clone());
        }

        let mut game = self.bucket_mut(status).remove(position);
        if status.is_backlog() {
            renumber(self.bucket_mut(status));
        }

        game.clear_annotations();
        game.selected_platform = Platform::unselected();
        game.status = GameStatus::Undiscovered;
        self.bucket_mut(GameStatus::Undiscovered).push(game.clone());

        self.enforce_invariants()?;
        Ok(game)
    }

    /// Start tracking a new game at the end of its bucket
    pub fn insert(&mut self, mut game: TrackedGame) -> Result<TrackedGame, LibraryError> {
        if self.find(game.id).is_some() {
            return Err(LibraryError::AlreadyTracked(game.id));
        }

        game.priority = if game.status.is_backlog() {
            Some(next_priority(self.bucket(game.status)))
        } else {
            None
        };
        self.bucket_mut(game.status).push(game.clone());

        self.enforce_invariants()?;
        Ok(game)
    }

    /// Replace a game's rating, notes and completion date
    pub fn update_details(
        &mut self,
        id: i64,
        status: GameStatus,
        details: GameDetails,
    ) -> Result<TrackedGame, LibraryError> {
        if let Some(rating) = details.personal_rating.filter(|rating| *rating > MAX_RATING) {
            return Err(LibraryError::RatingOutOfRange(rating));
        }

        let position = self.position(id, status)?;
        let game = &mut self.bucket_mut(status)[position];
        game.apply_details(details);
        Ok(game.clone())
    }

    /// Choose one of the game's platforms, or the unselected sentinel
    pub fn select_platform(
        &mut self,
        id: i64,
        status: GameStatus,
        platform: Platform,
    ) -> Result<TrackedGame, LibraryError> {
        let position = self.position(id, status)?;
        let game = &mut self.bucket_mut(status)[position];

        if !platform.is_unselected() && !game.platforms.iter().any(|p| p.id == platform.id) {
            return Err(LibraryError::UnknownPlatform {
                id,
                platform: platform.id,
            });
        }

        // Keep the provider's canonical name for the chosen platform
        game.selected_platform = game
            .platforms
            .iter()
            .find(|p| p.id == platform.id)
            .cloned()
            .unwrap_or(platform);
        Ok(game.clone())
    }

    /// Owned copy of a bucket, in display order
    pub fn snapshot(&self, status: GameStatus) -> Vec<TrackedGame> {
        self.bucket(status).to_vec()
    }

    pub fn find(&self, id: i64) -> Option<(GameStatus, &TrackedGame)> {
        GameStatus::ALL.into_iter().find_map(|status| {
            self.bucket(status)
                .iter()
                .find(|game| game.id == id)
                .map(|game| (status, game))
        })
    }

    pub fn status_of(&self, id: i64) -> Option<GameStatus> {
        self.find(id).map(|(status, _)| status)
    }

    pub fn len(&self, status: GameStatus) -> usize {
        self.bucket(status).len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(Vec::is_empty)
    }

    /// Size of every bucket, in status order
    pub fn counts(&self) -> Vec<(GameStatus, usize)> {
        GameStatus::ALL
            .into_iter()
            .map(|status| (status, self.len(status)))
            .collect()
    }

    /// Backlog ids in priority order
    pub fn backlog_ids(&self) -> Vec<i64> {
        self.bucket(GameStatus::Backlog).iter().map(|game| game.id).collect()
    }

    /// Check every bucket invariant
    pub fn check_invariants(&self) -> Result<(), LibraryError> {
        let mut seen = HashSet::new();

        for status in GameStatus::ALL {
            for (position, game) in self.bucket(status).iter().enumerate() {
                if !seen.insert(game.id) {
                    return Err(LibraryError::InvariantViolation(format!(
                        "game {} appears in more than one bucket",
                        game.id
                    )));
                }
                if game.status != status {
                    return Err(LibraryError::InvariantViolation(format!(
                        "game {} has status {} but sits in {}",
                        game.id, game.status, status
                    )));
                }

                let expected = status.is_backlog().then_some(position as u32 + 1);
                if game.priority != expected {
                    return Err(LibraryError::InvariantViolation(format!(
                        "game {} in {} has priority {:?}, expected {:?}",
                        game.id, status, game.priority, expected
                    )));
                }
            }
        }

        Ok(())
    }

    fn enforce_invariants(&self) -> Result<(), LibraryError> {
        let result = self.check_invariants();
        if let Err(err) = &result {
            tracing::error!("{}", err);
            if cfg!(debug_assertions) {
                panic!("{}", err);
            }
        }
        result
    }

    fn position(&self, id: i64, status: GameStatus) -> Result<usize, LibraryError> {
        self.bucket(status)
            .iter()
            .position(|game| game.id == id)
            .ok_or(LibraryError::NotFound { id, status })
    }

    fn bucket(&self, status: GameStatus) -> &Vec<TrackedGame> {
        &self.buckets[status.index()]
    }

    fn bucket_mut(&mut self, status: GameStatus) -> &mut Vec<TrackedGame> {
        &mut self.buckets[status.index()]
    }
}

fn next_priority(bucket: &[TrackedGame]) -> u32 {
    bucket.len() as u32 + 1
}

fn renumber(bucket: &mut [TrackedGame]) {
    for (position, game) in bucket.iter_mut().enumerate() {
        game.priority = Some(position as u32 + 1);
    }
}
