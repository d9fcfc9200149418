//! Persistence gateway over SQLite
//!
//! The gateway knows nothing about games. It runs parameterized statements,
//! returns row sets, and wraps multi-statement writes in a transaction.

use rusqlite::{Connection, params_from_iter};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// Bound parameter and column value
pub type SqlValue = rusqlite::types::Value;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON column error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Column {column}: {reason}")]
    Column { column: String, reason: String },

    #[error("Persistence call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Background persistence task failed: {0}")]
    Background(String),

    #[error("Write aborted before commit")]
    Aborted,

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl PersistenceError {
    pub(crate) fn column(column: &str, reason: impl Into<String>) -> Self {
        PersistenceError::Column {
            column: column.to_string(),
            reason: reason.into(),
        }
    }
}

/// One result row, columns in select order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: Vec<(String, SqlValue)>,
}

impl Row {
    pub fn new(values: Vec<(String, SqlValue)>) -> Self {
        Self { values }
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Nullable integer column
    pub fn get_i64(&self, column: &str) -> Result<Option<i64>, PersistenceError> {
        match self.get(column) {
            None => Err(PersistenceError::column(column, "missing")),
            Some(SqlValue::Null) => Ok(None),
            Some(SqlValue::Integer(value)) => Ok(Some(*value)),
            Some(other) => Err(PersistenceError::column(
                column,
                format!("expected integer, found {:?}", other.data_type()),
            )),
        }
    }

    /// Nullable text column
    pub fn get_text(&self, column: &str) -> Result<Option<String>, PersistenceError> {
        match self.get(column) {
            None => Err(PersistenceError::column(column, "missing")),
            Some(SqlValue::Null) => Ok(None),
            Some(SqlValue::Text(value)) => Ok(Some(value.clone())),
            Some(other) => Err(PersistenceError::column(
                column,
                format!("expected text, found {:?}", other.data_type()),
            )),
        }
    }
}

/// Statement execution, inside or outside a transaction
pub trait Executor {
    /// Run a statement, returning the number of affected rows
    fn execute(&self, statement: &str, params: &[SqlValue]) -> Result<usize, PersistenceError>;

    /// Run a query, returning every row
    fn query(&self, statement: &str, params: &[SqlValue]) -> Result<Vec<Row>, PersistenceError>;
}

/// Relational store used by the collection
pub trait PersistenceGateway: Executor + Send + Sync {
    /// Run `body` atomically. Any error inside `body` rolls every statement back.
    fn transaction(
        &self,
        body: &mut dyn FnMut(&dyn Executor) -> Result<(), PersistenceError>,
    ) -> Result<(), PersistenceError>;
}

struct ConnectionExecutor<'a>(&'a Connection);

impl Executor for ConnectionExecutor<'_> {
    fn execute(&self, statement: &str, params: &[SqlValue]) -> Result<usize, PersistenceError> {
        Ok(self.0.execute(statement, params_from_iter(params.iter()))?)
    }

    fn query(&self, statement: &str, params: &[SqlValue]) -> Result<Vec<Row>, PersistenceError> {
        let mut stmt = self.0.prepare(statement)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                let mut values = Vec::with_capacity(columns.len());
                for (index, name) in columns.iter().enumerate() {
                    values.push((name.clone(), row.get::<_, SqlValue>(index)?));
                }
                Ok(Row::new(values))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }
}

/// SQLite-backed gateway
pub struct SqliteGateway {
    conn: Mutex<Connection>,
}

impl SqliteGateway {
    /// Open or create a database
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let conn = Connection::open(path)?;

        let gateway = Self {
            conn: Mutex::new(conn),
        };
        gateway.init_schema()?;

        Ok(gateway)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()?;

        let gateway = Self {
            conn: Mutex::new(conn),
        };
        gateway.init_schema()?;

        Ok(gateway)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<(), PersistenceError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tracked_games (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                status TEXT NOT NULL CHECK (status IN
                    ('ongoing', 'backlog', 'completed', 'on_hold', 'undiscovered', 'dropped')),
                priority INTEGER,
                personal_rating INTEGER,
                completion_date TEXT,
                notes TEXT,
                date_added TEXT NOT NULL,
                selected_platform_id INTEGER NOT NULL DEFAULT 0,
                selected_platform_name TEXT NOT NULL DEFAULT '',
                summary TEXT,
                cover_url TEXT,
                genres TEXT,
                platforms TEXT,
                release_dates TEXT,
                screenshots TEXT,
                involved_companies TEXT,
                CHECK ((status = 'backlog' AND priority >= 1)
                    OR (status <> 'backlog' AND priority IS NULL))
            );

            CREATE INDEX IF NOT EXISTS idx_tracked_games_status
                ON tracked_games(status, priority);
        "#,
        )?;

        Ok(())
    }

    fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Executor for SqliteGateway {
    fn execute(&self, statement: &str, params: &[SqlValue]) -> Result<usize, PersistenceError> {
        let conn = self.connection();
        ConnectionExecutor(&conn).execute(statement, params)
    }

    fn query(&self, statement: &str, params: &[SqlValue]) -> Result<Vec<Row>, PersistenceError> {
        let conn = self.connection();
        ConnectionExecutor(&conn).query(statement, params)
    }
}

impl PersistenceGateway for SqliteGateway {
    fn transaction(
        &self,
        body: &mut dyn FnMut(&dyn Executor) -> Result<(), PersistenceError>,
    ) -> Result<(), PersistenceError> {
        let mut conn = self.connection();
        let tx = conn.transaction()?;

        // Dropping an uncommitted transaction rolls it back
        body(&ConnectionExecutor(&tx))?;
        tx.commit()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert_statement() -> &'static str {
        "INSERT INTO tracked_games (id, name, status, priority, date_added) VALUES (?1, ?2, ?3, ?4, ?5)"
    }

    fn backlog_params(id: i64, priority: i64) -> Vec<SqlValue> {
        vec![
            SqlValue::Integer(id),
            SqlValue::Text(format!("Game {}", id)),
            SqlValue::Text("backlog".to_string()),
            SqlValue::Integer(priority),
            SqlValue::Text("2024-01-01T00:00:00Z".to_string()),
        ]
    }

    #[test]
    fn test_gateway_creation() {
        let gateway = SqliteGateway::in_memory().unwrap();
        let rows = gateway
            .query("SELECT COUNT(*) AS total FROM tracked_games", &[])
            .unwrap();
        assert_eq!(rows[0].get_i64("total").unwrap(), Some(0));
    }

    #[test]
    fn test_execute_and_query_with_bound_params() {
        let gateway = SqliteGateway::in_memory().unwrap();
        let affected = gateway.execute(insert_statement(), &backlog_params(1, 1)).unwrap();
        assert_eq!(affected, 1);

        let rows = gateway
            .query(
                "SELECT id, name, notes FROM tracked_games WHERE status = ?1",
                &[SqlValue::Text("backlog".to_string())],
            )
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_i64("id").unwrap(), Some(1));
        assert_eq!(rows[0].get_text("name").unwrap(), Some("Game 1".to_string()));
        assert_eq!(rows[0].get_text("notes").unwrap(), None);
        assert!(rows[0].get_text("id").is_err());
        assert!(rows[0].get_i64("missing").is_err());
    }

    #[test]
    fn test_quotes_are_bound_not_interpolated() {
        let gateway = SqliteGateway::in_memory().unwrap();
        let mut params = backlog_params(1, 1);
        params[1] = SqlValue::Text("Baldur's Gate'); DROP TABLE tracked_games; --".to_string());
        gateway.execute(insert_statement(), &params).unwrap();

        let rows = gateway.query("SELECT name FROM tracked_games", &[]).unwrap();
        assert_eq!(
            rows[0].get_text("name").unwrap().as_deref(),
            Some("Baldur's Gate'); DROP TABLE tracked_games; --")
        );
    }

    #[test]
    fn test_transaction_commits() {
        let gateway = SqliteGateway::in_memory().unwrap();
        gateway
            .transaction(&mut |tx| {
                tx.execute(insert_statement(), &backlog_params(1, 1))?;
                tx.execute(insert_statement(), &backlog_params(2, 2))?;
                Ok(())
            })
            .unwrap();

        let rows = gateway.query("SELECT id FROM tracked_games", &[]).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let gateway = SqliteGateway::in_memory().unwrap();
        gateway.execute(insert_statement(), &backlog_params(1, 1)).unwrap();

        let result = gateway.transaction(&mut |tx| {
            tx.execute(
                "UPDATE tracked_games SET priority = ?1 WHERE id = ?2",
                &[SqlValue::Integer(5), SqlValue::Integer(1)],
            )?;
            Err(PersistenceError::Unavailable("disk full".to_string()))
        });
        assert!(result.is_err());

        let rows = gateway.query("SELECT priority FROM tracked_games", &[]).unwrap();
        assert_eq!(rows[0].get_i64("priority").unwrap(), Some(1));
    }

    #[test]
    fn test_schema_rejects_priority_outside_backlog() {
        let gateway = SqliteGateway::in_memory().unwrap();
        let mut params = backlog_params(1, 1);
        params[2] = SqlValue::Text("completed".to_string());
        assert!(gateway.execute(insert_statement(), &params).is_err());
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("quest.db");
        {
            let gateway = SqliteGateway::open(&path).unwrap();
            gateway.execute(insert_statement(), &backlog_params(1, 1)).unwrap();
        }
        let reopened = SqliteGateway::open(&path).unwrap();
        let rows = reopened.query("SELECT id FROM tracked_games", &[]).unwrap();
        assert_eq!(rows.len(), 1);
    }
}
