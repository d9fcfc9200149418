//! Tracked game statements on top of the persistence gateway

use crate::game::{GameStatus, TrackedGame};
use crate::gateway::{PersistenceError, PersistenceGateway, SqlValue};
use crate::mapper::{COLUMNS, GameRecordMapper, GameRow};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A write captured at mutation time, persisted later in the background
#[derive(Debug, Clone, PartialEq)]
pub enum WriteIntent {
    /// Insert the row, or overwrite everything but `date_added`
    Upsert(TrackedGame),
    /// Assign backlog priorities 1..N to these ids, in order
    Renumber(Vec<i64>),
}

/// Calls off a write that has not committed yet.
///
/// The write checks the signal before every statement and once more before
/// commit; an aborted write rolls back whole.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), PersistenceError> {
        if self.is_aborted() {
            return Err(PersistenceError::Aborted);
        }
        Ok(())
    }
}

/// Reads and writes `tracked_games` rows
#[derive(Clone)]
pub struct GameRepository {
    gateway: Arc<dyn PersistenceGateway>,
}

impl GameRepository {
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self { gateway }
    }

    /// Every game in a bucket; backlog ordered by priority, others by date added
    pub fn load_bucket(&self, status: GameStatus) -> Result<Vec<TrackedGame>, PersistenceError> {
        let order = if status.is_backlog() {
            "priority ASC, id ASC"
        } else {
            "date_added ASC, id ASC"
        };
        let statement = format!(
            "SELECT {} FROM tracked_games WHERE status = ?1 ORDER BY {}",
            COLUMNS.join(", "),
            order
        );

        self.gateway
            .query(&statement, &[SqlValue::Text(status.as_str().to_string())])?
            .iter()
            .map(|row| GameRecordMapper::from_row(&GameRow::from_sql_row(row)?))
            .collect()
    }

    /// One row by id, whatever its status
    pub fn load_game(&self, id: i64) -> Result<Option<TrackedGame>, PersistenceError> {
        let statement = format!("SELECT {} FROM tracked_games WHERE id = ?1", COLUMNS.join(", "));
        let rows = self.gateway.query(&statement, &[SqlValue::Integer(id)])?;

        rows.first()
            .map(|row| GameRecordMapper::from_row(&GameRow::from_sql_row(row)?))
            .transpose()
    }

    /// Persist every intent in one transaction
    pub fn apply(&self, intents: &[WriteIntent]) -> Result<(), PersistenceError> {
        self.apply_abortable(intents, &AbortSignal::new())
    }

    /// Like [`apply`](Self::apply), but rolls back once `abort` is raised
    pub fn apply_abortable(
        &self,
        intents: &[WriteIntent],
        abort: &AbortSignal,
    ) -> Result<(), PersistenceError> {
        let upsert = upsert_statement();
        let mut statements: Vec<(&str, Vec<SqlValue>)> = Vec::new();

        for intent in intents {
            match intent {
                WriteIntent::Upsert(game) => {
                    statements.push((upsert.as_str(), GameRecordMapper::to_row(game)?.params()));
                }
                WriteIntent::Renumber(ids) => {
                    for (position, id) in ids.iter().enumerate() {
                        statements.push((
                            RENUMBER_STATEMENT,
                            vec![
                                SqlValue::Integer(position as i64 + 1),
                                SqlValue::Integer(*id),
                                SqlValue::Text(GameStatus::Backlog.as_str().to_string()),
                            ],
                        ));
                    }
                }
            }
        }

        self.gateway.transaction(&mut |tx| {
            for (statement, params) in &statements {
                abort.check()?;
                tx.execute(statement, params)?;
            }
            abort.check()
        })?;

        tracing::debug!("Persisted {} statements", statements.len());
        Ok(())
    }
}

const RENUMBER_STATEMENT: &str = "UPDATE tracked_games SET priority = ?1 WHERE id = ?2 AND status = ?3";

fn upsert_statement() -> String {
    let placeholders: Vec<String> = (1..=COLUMNS.len()).map(|i| format!("?{}", i)).collect();
    let updates: Vec<String> = COLUMNS
        .iter()
        .filter(|column| !matches!(**column, "id" | "date_added"))
        .map(|column| format!("{} = excluded.{}", column, column))
        .collect();

    format!(
        "INSERT INTO tracked_games ({}) VALUES ({}) ON CONFLICT(id) DO UPDATE SET {}",
        COLUMNS.join(", "),
        placeholders.join(", "),
        updates.join(", ")
    )
}
