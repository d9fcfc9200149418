//! Game metadata lookup
//!
//! Descriptive data comes from an external provider. The collection only
//! needs it once, when a game is first tracked; after that the tracked row
//! carries its own denormalized copy.

use crate::game::{Genre, InvolvedCompany, Platform, ReleaseDate, Screenshot};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Metadata provider unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid metadata catalogue: {0}")]
    Json(#[from] serde_json::Error),
}

/// Descriptive game metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameMetadata {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub platforms: Vec<Platform>,
    #[serde(default)]
    pub release_dates: Vec<ReleaseDate>,
    #[serde(default)]
    pub screenshots: Vec<Screenshot>,
    #[serde(default)]
    pub involved_companies: Vec<InvolvedCompany>,
}

impl GameMetadata {
    /// Merge with another metadata (non-empty fields take precedence)
    pub fn merge(&mut self, other: &GameMetadata) {
        if self.name.is_empty() {
            self.name = other.name.clone();
        }
        if self.summary.is_none() {
            self.summary = other.summary.clone();
        }
        if self.cover_url.is_none() {
            self.cover_url = other.cover_url.clone();
        }
        if self.genres.is_empty() {
            self.genres = other.genres.clone();
        }
        if self.platforms.is_empty() {
            self.platforms = other.platforms.clone();
        }
        if self.release_dates.is_empty() {
            self.release_dates = other.release_dates.clone();
        }
        if self.screenshots.is_empty() {
            self.screenshots = other.screenshots.clone();
        }
        if self.involved_companies.is_empty() {
            self.involved_companies = other.involved_companies.clone();
        }
    }
}

/// Read-only lookup of descriptive metadata by game id
#[async_trait]
pub trait MetadataLookupPort: Send + Sync {
    /// `Ok(None)` when the provider has no such game
    async fn fetch_by_id(&self, id: i64) -> Result<Option<GameMetadata>, MetadataError>;
}

/// Metadata held in memory, typically loaded from a JSON catalogue file
#[derive(Debug, Default)]
pub struct CatalogMetadata {
    games: HashMap<i64, GameMetadata>,
}

impl CatalogMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON array of `GameMetadata`
    pub fn from_json_file(path: &Path) -> Result<Self, MetadataError> {
        let contents = std::fs::read_to_string(path)?;
        let entries: Vec<GameMetadata> = serde_json::from_str(&contents)?;
        tracing::debug!("Loaded {} catalogue entries from {}", entries.len(), path.display());
        Ok(entries.into_iter().collect())
    }

    /// Add an entry; an existing entry keeps its fields and gains missing ones
    pub fn insert(&mut self, metadata: GameMetadata) {
        match self.games.get_mut(&metadata.id) {
            Some(existing) => existing.merge(&metadata),
            None => {
                self.games.insert(metadata.id, metadata);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }
}

impl FromIterator<GameMetadata> for CatalogMetadata {
    fn from_iter<I: IntoIterator<Item = GameMetadata>>(iter: I) -> Self {
        let mut catalog = Self::new();
        for metadata in iter {
            catalog.insert(metadata);
        }
        catalog
    }
}

#[async_trait]
impl MetadataLookupPort for CatalogMetadata {
    async fn fetch_by_id(&self, id: i64) -> Result<Option<GameMetadata>, MetadataError> {
        Ok(self.games.get(&id).cloned())
    }
}

/// Memoizes successful lookups of another port
pub struct CachedMetadata<P> {
    inner: P,
    cache: Mutex<HashMap<i64, GameMetadata>>,
}

impl<P: MetadataLookupPort> CachedMetadata<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn cached(&self, id: i64) -> Option<GameMetadata> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }
}

#[async_trait]
impl<P: MetadataLookupPort> MetadataLookupPort for CachedMetadata<P> {
    async fn fetch_by_id(&self, id: i64) -> Result<Option<GameMetadata>, MetadataError> {
        if let Some(hit) = self.cached(id) {
            return Ok(Some(hit));
        }

        let fetched = self.inner.fetch_by_id(id).await?;
        if let Some(metadata) = &fetched {
            self.cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(id, metadata.clone());
        }
        Ok(fetched)
    }
}
