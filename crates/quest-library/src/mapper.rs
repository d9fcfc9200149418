//! Conversion between `TrackedGame` and its persisted row
//!
//! Nested collections are stored as JSON text columns. Missing or null JSON
//! decodes to an empty list. Values only ever reach SQL as bound parameters.

use crate::game::{GameStatus, Platform, TrackedGame};
use crate::gateway::{PersistenceError, Row, SqlValue};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Column list shared by every select and upsert, in parameter order
pub const COLUMNS: [&str; 17] = [
    "id",
    "name",
    "status",
    "priority",
    "personal_rating",
    "completion_date",
    "notes",
    "date_added",
    "selected_platform_id",
    "selected_platform_name",
    "summary",
    "cover_url",
    "genres",
    "platforms",
    "release_dates",
    "screenshots",
    "involved_companies",
];

/// Flat persisted form of a tracked game
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameRow {
    pub id: i64,
    pub name: String,
    pub status: String,
    pub priority: Option<i64>,
    pub personal_rating: Option<i64>,
    pub completion_date: Option<String>,
    pub notes: Option<String>,
    pub date_added: String,
    pub selected_platform_id: i64,
    pub selected_platform_name: String,
    pub summary: Option<String>,
    pub cover_url: Option<String>,
    pub genres: Option<String>,
    pub platforms: Option<String>,
    pub release_dates: Option<String>,
    pub screenshots: Option<String>,
    pub involved_companies: Option<String>,
}

impl GameRow {
    /// Read a row produced by a select over `COLUMNS`
    pub fn from_sql_row(row: &Row) -> Result<Self, PersistenceError> {
        Ok(Self {
            id: required(row.get_i64("id")?, "id")?,
            name: required(row.get_text("name")?, "name")?,
            status: required(row.get_text("status")?, "status")?,
            priority: row.get_i64("priority")?,
            personal_rating: row.get_i64("personal_rating")?,
            completion_date: row.get_text("completion_date")?,
            notes: row.get_text("notes")?,
            date_added: required(row.get_text("date_added")?, "date_added")?,
            selected_platform_id: row.get_i64("selected_platform_id")?.unwrap_or_default(),
            selected_platform_name: row.get_text("selected_platform_name")?.unwrap_or_default(),
            summary: row.get_text("summary")?,
            cover_url: row.get_text("cover_url")?,
            genres: row.get_text("genres")?,
            platforms: row.get_text("platforms")?,
            release_dates: row.get_text("release_dates")?,
            screenshots: row.get_text("screenshots")?,
            involved_companies: row.get_text("involved_companies")?,
        })
    }

    /// Bound parameters in `COLUMNS` order
    pub fn params(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Integer(self.id),
            SqlValue::Text(self.name.clone()),
            SqlValue::Text(self.status.clone()),
            optional_integer(self.priority),
            optional_integer(self.personal_rating),
            optional_text(&self.completion_date),
            optional_text(&self.notes),
            SqlValue::Text(self.date_added.clone()),
            SqlValue::Integer(self.selected_platform_id),
            SqlValue::Text(self.selected_platform_name.clone()),
            optional_text(&self.summary),
            optional_text(&self.cover_url),
            optional_text(&self.genres),
            optional_text(&self.platforms),
            optional_text(&self.release_dates),
            optional_text(&self.screenshots),
            optional_text(&self.involved_companies),
        ]
    }
}

/// Maps rows to entities and back
pub struct GameRecordMapper;

impl GameRecordMapper {
    pub fn to_row(game: &TrackedGame) -> Result<GameRow, PersistenceError> {
        Ok(GameRow {
            id: game.id,
            name: game.name.clone(),
            status: game.status.as_str().to_string(),
            priority: game.priority.map(i64::from),
            personal_rating: game.personal_rating.map(i64::from),
            completion_date: game.completion_date.clone(),
            notes: game.notes.clone(),
            date_added: game.date_added.clone(),
            selected_platform_id: game.selected_platform.id,
            selected_platform_name: game.selected_platform.name.clone(),
            summary: game.summary.clone(),
            cover_url: game.cover_url.clone(),
            genres: Some(encode(&game.genres)?),
            platforms: Some(encode(&game.platforms)?),
            release_dates: Some(encode(&game.release_dates)?),
            screenshots: Some(encode(&game.screenshots)?),
            involved_companies: Some(encode(&game.involved_companies)?),
        })
    }

    pub fn from_row(row: &GameRow) -> Result<TrackedGame, PersistenceError> {
        let status = row
            .status
            .parse::<GameStatus>()
            .map_err(|e| PersistenceError::column("status", format!("{}", e)))?;

        let priority = match row.priority {
            Some(value) if value >= 1 => Some(
                u32::try_from(value)
                    .map_err(|_| PersistenceError::column("priority", format!("out of range: {}", value)))?,
            ),
            Some(value) => {
                return Err(PersistenceError::column(
                    "priority",
                    format!("must be positive, found {}", value),
                ));
            }
            None => None,
        };

        let personal_rating = row
            .personal_rating
            .map(|value| {
                u8::try_from(value).map_err(|_| {
                    PersistenceError::column("personal_rating", format!("out of range: {}", value))
                })
            })
            .transpose()?;

        Ok(TrackedGame {
            id: row.id,
            name: row.name.clone(),
            status,
            priority,
            personal_rating,
            notes: row.notes.clone(),
            completion_date: row.completion_date.clone(),
            date_added: row.date_added.clone(),
            selected_platform: Platform::new(row.selected_platform_id, row.selected_platform_name.clone()),
            summary: row.summary.clone(),
            cover_url: row.cover_url.clone(),
            genres: decode(row.genres.as_deref(), "genres")?,
            release_dates: decode(row.release_dates.as_deref(), "release_dates")?,
            platforms: decode(row.platforms.as_deref(), "platforms")?,
            screenshots: decode(row.screenshots.as_deref(), "screenshots")?,
            involved_companies: decode(row.involved_companies.as_deref(), "involved_companies")?,
        })
    }
}

fn required<T>(value: Option<T>, column: &str) -> Result<T, PersistenceError> {
    value.ok_or_else(|| PersistenceError::column(column, "unexpected NULL"))
}

fn optional_integer(value: Option<i64>) -> SqlValue {
    value.map_or(SqlValue::Null, SqlValue::Integer)
}

fn optional_text(value: &Option<String>) -> SqlValue {
    value.clone().map_or(SqlValue::Null, SqlValue::Text)
}

fn encode<T: Serialize>(items: &[T]) -> Result<String, PersistenceError> {
    Ok(serde_json::to_string(items)?)
}

fn decode<T: DeserializeOwned>(json: Option<&str>, column: &str) -> Result<Vec<T>, PersistenceError> {
    match json.map(str::trim) {
        None | Some("") | Some("null") => Ok(Vec::new()),
        Some(text) => serde_json::from_str(text)
            .map_err(|e| PersistenceError::column(column, format!("invalid JSON: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{Genre, InvolvedCompany, ReleaseDate, Screenshot};

    fn populated_game() -> TrackedGame {
        TrackedGame {
            id: 1020,
            name: "Grand Theft Auto V".to_string(),
            status: GameStatus::Completed,
            priority: None,
            personal_rating: Some(9),
            notes: Some("Heist \"finale\" was great".to_string()),
            completion_date: Some("2024-02-11".to_string()),
            date_added: "2024-01-03T10:00:00+00:00".to_string(),
            selected_platform: Platform::new(6, "PC (Microsoft Windows)"),
            summary: Some("Open world".to_string()),
            cover_url: Some("https://images.example/co2lbd.jpg".to_string()),
            genres: vec![
                Genre { id: 5, name: "Shooter".to_string() },
                Genre { id: 31, name: "Adventure".to_string() },
            ],
            release_dates: vec![ReleaseDate {
                platform_id: Some(6),
                date: Some(1429056000),
                human: Some("2015-04-14".to_string()),
            }],
            platforms: vec![Platform::new(6, "PC (Microsoft Windows)"), Platform::new(48, "PlayStation 4")],
            screenshots: vec![Screenshot { id: 1, url: "https://images.example/sc1.jpg".to_string() }],
            involved_companies: vec![InvolvedCompany {
                id: 10,
                name: "Rockstar North".to_string(),
                developer: true,
                publisher: false,
            }],
        }
    }

    #[test]
    fn test_round_trip_populated_game() {
        let game = populated_game();
        let row = GameRecordMapper::to_row(&game).unwrap();
        let back = GameRecordMapper::from_row(&row).unwrap();

        assert_eq!(back, game);
        assert_eq!(GameRecordMapper::to_row(&back).unwrap(), row);
    }

    #[test]
    fn test_round_trip_empty_collections() {
        let mut game = populated_game();
        game.genres.clear();
        game.release_dates.clear();
        game.platforms.clear();
        game.screenshots.clear();
        game.involved_companies.clear();
        game.selected_platform = Platform::unselected();

        let row = GameRecordMapper::to_row(&game).unwrap();
        assert_eq!(row.genres.as_deref(), Some("[]"));
        let back = GameRecordMapper::from_row(&row).unwrap();
        assert_eq!(GameRecordMapper::to_row(&back).unwrap(), row);
        assert!(back.selected_platform.is_unselected());
    }

    #[test]
    fn test_null_json_defaults_to_empty() {
        let mut row = GameRecordMapper::to_row(&populated_game()).unwrap();
        row.genres = None;
        row.platforms = Some("null".to_string());
        row.screenshots = Some(String::new());

        let game = GameRecordMapper::from_row(&row).unwrap();
        assert!(game.genres.is_empty());
        assert!(game.platforms.is_empty());
        assert!(game.screenshots.is_empty());
        assert_eq!(game.release_dates.len(), 1);
    }

    #[test]
    fn test_rejects_bad_columns() {
        let mut row = GameRecordMapper::to_row(&populated_game()).unwrap();
        row.status = "wishlist".to_string();
        assert!(GameRecordMapper::from_row(&row).is_err());

        let mut row = GameRecordMapper::to_row(&populated_game()).unwrap();
        row.priority = Some(0);
        assert!(GameRecordMapper::from_row(&row).is_err());

        let mut row = GameRecordMapper::to_row(&populated_game()).unwrap();
        row.genres = Some("{not json".to_string());
        assert!(GameRecordMapper::from_row(&row).is_err());
    }

    #[test]
    fn test_params_follow_column_order() {
        let row = GameRecordMapper::to_row(&populated_game()).unwrap();
        let params = row.params();
        assert_eq!(params.len(), COLUMNS.len());
        assert_eq!(params[0], SqlValue::Integer(1020));
        assert_eq!(params[2], SqlValue::Text("completed".to_string()));
        assert_eq!(params[3], SqlValue::Null);

        let sql_row = Row::new(
            COLUMNS
                .iter()
                .map(|name| name.to_string())
                .zip(params)
                .collect(),
        );
        assert_eq!(GameRow::from_sql_row(&sql_row).unwrap(), row);
    }
}
