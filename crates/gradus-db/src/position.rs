use chrono::{DateTime, NaiveDateTime, Utc};
use gradus_common::{Error, Result};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_TABLE: &str = "gradus_steps";

/// Bookkeeping row for one step. `applied_at` is set while the step is up
/// and cleared when it is reverted; rows are never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub name: String,
    pub applied_at: Option<DateTime<Utc>>,
}

impl PositionRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            applied_at: None,
        }
    }

    pub fn is_applied(&self) -> bool {
        self.applied_at.is_some()
    }
}

/// Persistent record of which steps are applied, keyed by step name.
///
/// Every operation takes the connection of the caller's atomic scope, so
/// reads observe writes made earlier in the same transaction.
#[derive(Debug, Clone)]
pub struct PositionStore {
    table: String,
}

impl Default for PositionStore {
    fn default() -> Self {
        Self {
            table: DEFAULT_TABLE.to_string(),
        }
    }
}

impl PositionStore {
    pub fn new(table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        validate_identifier(&table)?;
        Ok(Self { table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn ensure_table(&self, conn: &Connection) -> Result<()> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                applied_at TEXT
            );",
            table = self.table
        ))
        .map_err(|e| Error::Database(format!("failed to create {}: {e}", self.table)))
    }

    pub fn table_exists(&self, conn: &Connection) -> Result<bool> {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![self.table],
                |row| row.get(0),
            )
            .map_err(|e| Error::Database(format!("failed to inspect schema: {e}")))?;
        Ok(count > 0)
    }

    pub fn find(&self, conn: &Connection, name: &str) -> Result<Option<PositionRecord>> {
        conn.query_row(
            &format!(
                "SELECT name, applied_at FROM {} WHERE name = ?1",
                self.table
            ),
            params![name],
            read_record,
        )
        .optional()
        .map_err(|e| Error::Database(format!("failed to look up step {name}: {e}")))
    }

    /// Name of the greatest applied step, or `None` at the initial position.
    pub fn current(&self, conn: &Connection) -> Result<Option<String>> {
        let current = conn
            .query_row(
                &format!(
                    "SELECT name FROM {} WHERE applied_at IS NOT NULL
                     ORDER BY name DESC LIMIT 1",
                    self.table
                ),
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(|e| Error::Database(format!("failed to resolve current position: {e}")))?;
        debug!("current position: {}", current.as_deref().unwrap_or("<none>"));
        Ok(current)
    }

    /// Insert the record, or update `applied_at` if the name already exists.
    pub fn upsert(&self, conn: &Connection, record: &PositionRecord) -> Result<()> {
        conn.execute(
            &format!(
                "INSERT INTO {} (name, applied_at) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET applied_at = excluded.applied_at",
                self.table
            ),
            params![record.name, record.applied_at.map(|t| t.to_rfc3339())],
        )
        .map_err(|e| Error::Database(format!("failed to save step {}: {e}", record.name)))?;
        Ok(())
    }

    /// Every record ever written, ordered by name.
    pub fn history(&self, conn: &Connection) -> Result<Vec<PositionRecord>> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT name, applied_at FROM {} ORDER BY name ASC",
                self.table
            ))
            .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map([], read_record)
            .map_err(|e| Error::Database(format!("failed to query history: {e}")))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(
                row.map_err(|e| Error::Database(format!("failed to read position row: {e}")))?,
            );
        }
        Ok(records)
    }
}

fn read_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<PositionRecord> {
    let applied_at = row
        .get::<_, Option<String>>(1)?
        .map(|s| parse_datetime(1, &s))
        .transpose()?;
    Ok(PositionRecord {
        name: row.get(0)?,
        applied_at,
    })
}

fn parse_datetime(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // SQLite datetime('now') produces "YYYY-MM-DD HH:MM:SS"
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|naive| naive.and_utc())
        })
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::Config(format!("invalid position table name: {name:?}")))
    }
}
