use std::sync::Mutex;
use std::time::{Duration, Instant};

use rusqlite::{Connection, OpenFlags};
use tracing::debug;

use crate::error::{Result, SqlError};

/// One result row as column-name → JSON value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Read-only SQL execution with row and wall-clock caps.
///
/// Wraps a single SQLite connection in a `Mutex`, the same single-node
/// posture as the rest of the storage layer. The connection is opened
/// read-only so even a validator escape cannot mutate anything.
pub struct SqlExecutor {
    conn: Mutex<Connection>,
}

impl SqlExecutor {
    /// Open the dealership database read-only.
    pub fn open_read_only(path: &str) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Wrap an already-open connection. Used by tests with seeded
    /// in-memory databases.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Run one validated statement. Exceeding `row_cap` rows or `time_cap`
    /// wall time aborts with `Capacity`.
    pub fn execute(&self, sql: &str, row_cap: usize, time_cap: Duration) -> Result<Vec<Row>> {
        let started = Instant::now();
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(sql)?;

        let column_names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();

        let mut rows = stmt.query([])?;
        let mut out: Vec<Row> = Vec::new();

        while let Some(row) = rows.next()? {
            if out.len() >= row_cap {
                return Err(SqlError::Capacity(format!(
                    "result exceeds the {row_cap} row cap"
                )));
            }
            if started.elapsed() > time_cap {
                return Err(SqlError::Capacity(format!(
                    "query exceeded the {}ms time cap",
                    time_cap.as_millis()
                )));
            }

            let mut obj = Row::new();
            for (i, name) in column_names.iter().enumerate() {
                obj.insert(name.clone(), column_to_json(row.get_ref(i)?));
            }
            out.push(obj);
        }

        debug!(rows = out.len(), elapsed_ms = started.elapsed().as_millis() as u64, "sql executed");
        Ok(out)
    }
}

fn column_to_json(value: rusqlite::types::ValueRef<'_>) -> serde_json::Value {
    use rusqlite::types::ValueRef;
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(t) => serde_json::Value::from(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => serde_json::Value::from(format!("<blob {} bytes>", b.len())),
    }
}
