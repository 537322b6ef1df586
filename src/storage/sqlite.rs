use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::{ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{Connection, OpenFlags, ToSql, params_from_iter};
use tracing::{info, warn};

use crate::codec::{MATCH_COLUMNS, StoredValue, match_from_row, match_to_row};
use crate::models::Match;
use crate::storage::{MatchStore, StoreError, StorePredicate};

/// One schema step.
enum Step {
    Sql(&'static str),
    /// `(name, type)` pairs added to `matches` unless already present, so a
    /// table touched by hand or by an older build still converges.
    AddColumns(&'static [(&'static str, &'static str)]),
}

/// Ordered schema steps. Each runs once, inside its own transaction.
const MIGRATIONS: &[(u32, Step)] = &[
    (
        1,
        Step::Sql(
        "CREATE TABLE IF NOT EXISTS matches (
            id TEXT PRIMARY KEY,
            shortcode TEXT,
            driver_id TEXT,
            state TEXT,
            bill_of_lading_photo TEXT,
            bill_of_lading_required BOOLEAN,
            origin_photo TEXT,
            vehicle_class_id TEXT,
            vehicle_class TEXT,
            service_level TEXT,
            origin_address TEXT,
            distance NUMERIC,
            total_volume NUMERIC,
            total_weight NUMERIC,
            po TEXT,
            pickup_notes TEXT,
            pickup_at INTEGER,
            dropoff_at INTEGER,
            shipper TEXT,
            created_at INTEGER,
            completed_at INTEGER,
            accepted_at INTEGER,
            picked_up_at INTEGER,
            driver_total_pay NUMERIC,
            rating NUMERIC,
            origin_photo_required BOOLEAN,
            stops TEXT
        );
        CREATE INDEX IF NOT EXISTS matches_state_idx ON matches (state);",
        ),
    ),
    (
        2,
        Step::AddColumns(&[
            ("fees", "TEXT"),
            ("slas", "TEXT"),
            ("scheduled", "BOOLEAN"),
            ("unload_method", "TEXT"),
        ]),
    ),
];

pub const SCHEMA_VERSION: u32 = 2;

impl ToSql for StoredValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            StoredValue::Null => ToSqlOutput::Owned(SqlValue::Null),
            StoredValue::Integer(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            StoredValue::Real(r) => ToSqlOutput::Owned(SqlValue::Real(*r)),
            StoredValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

fn stored_from_ref(value: ValueRef<'_>) -> StoredValue {
    match value {
        ValueRef::Null | ValueRef::Blob(_) => StoredValue::Null,
        ValueRef::Integer(i) => StoredValue::Integer(i),
        ValueRef::Real(r) => StoredValue::Real(r),
        ValueRef::Text(bytes) => StoredValue::Text(String::from_utf8_lossy(bytes).into_owned()),
    }
}

/// SQLite-backed match store.
pub struct SqliteMatchStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMatchStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self, StoreError> {
        migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn schema_version(&self) -> Result<u32, StoreError> {
        let conn = lock(&self.conn)?;
        current_version(&conn)
    }

    async fn with_conn<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = lock(&conn)?;
            op(&guard)
        })
        .await
        .map_err(|err| StoreError::Unavailable(format!("store task failed: {err}")))?
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
    conn.lock()
        .map_err(|err| StoreError::Unavailable(format!("connection poisoned: {err}")))
}

fn current_version(conn: &Connection) -> Result<u32, StoreError> {
    let version: i64 = conn.query_row(
        "SELECT schema_version FROM schema_meta WHERE id = 0",
        [],
        |row| row.get(0),
    )?;
    Ok(version as u32)
}

fn migrate(conn: &mut Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_meta (
            id INTEGER PRIMARY KEY CHECK (id = 0),
            schema_version INTEGER NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        INSERT OR IGNORE INTO schema_meta (id, schema_version) VALUES (0, 0);",
    )?;

    let current = current_version(conn)?;

    for (version, step) in MIGRATIONS.iter().filter(|(v, _)| *v > current) {
        let tx = conn.transaction()?;
        apply_step(&tx, step).map_err(|err| StoreError::Migration {
            version: *version,
            reason: err.to_string(),
        })?;
        tx.execute(
            "UPDATE schema_meta SET schema_version = ?1, updated_at = datetime('now') WHERE id = 0",
            [i64::from(*version)],
        )?;
        tx.commit()?;
        info!(version, "applied schema migration");
    }

    Ok(())
}

fn apply_step(conn: &Connection, step: &Step) -> rusqlite::Result<()> {
    match step {
        Step::Sql(sql) => conn.execute_batch(sql),
        Step::AddColumns(columns) => {
            let existing = table_columns(conn, "matches")?;
            for (name, kind) in columns.iter() {
                if existing.iter().any(|c| c == name) {
                    warn!(column = *name, "column already present; skipping");
                    continue;
                }
                conn.execute_batch(&format!("ALTER TABLE matches ADD COLUMN {name} {kind};"))?;
            }
            Ok(())
        }
    }
}

fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>("name"))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

fn column_list() -> String {
    MATCH_COLUMNS
        .iter()
        .map(|c| c.name)
        .collect::<Vec<_>>()
        .join(", ")
}

fn upsert_sql() -> String {
    let placeholders = (1..=MATCH_COLUMNS.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let updates = MATCH_COLUMNS
        .iter()
        .filter(|c| c.name != "id")
        .map(|c| format!("{0} = excluded.{0}", c.name))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "INSERT INTO matches ({}) VALUES ({placeholders}) ON CONFLICT(id) DO UPDATE SET {updates}",
        column_list()
    )
}

/// Renders a predicate as a `WHERE` fragment plus its bound parameters.
fn where_clause(predicate: &StorePredicate) -> (String, Vec<String>) {
    fn in_list(column: &str, values: Vec<String>) -> (String, Vec<String>) {
        if values.is_empty() {
            return ("0 = 1".to_string(), values);
        }
        let marks = vec!["?"; values.len()].join(", ");
        (format!("{column} IN ({marks})"), values)
    }

    match predicate {
        StorePredicate::All => ("1 = 1".to_string(), Vec::new()),
        StorePredicate::IdIn(ids) => in_list("id", ids.clone()),
        StorePredicate::StateIn(states) => in_list(
            "state",
            states.iter().map(|s| s.as_str().to_string()).collect(),
        ),
    }
}

#[async_trait]
impl MatchStore for SqliteMatchStore {
    async fn save(&self, m: &Match) -> Result<(), StoreError> {
        let row = match_to_row(m);
        self.with_conn(move |conn| {
            conn.execute(&upsert_sql(), params_from_iter(row.iter()))?;
            Ok(())
        })
        .await
    }

    async fn select(&self, predicate: &StorePredicate) -> Result<Vec<Match>, StoreError> {
        let (clause, params) = where_clause(predicate);
        self.with_conn(move |conn| {
            let sql = format!("SELECT {} FROM matches WHERE {clause} ORDER BY rowid", column_list());
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
                (0..MATCH_COLUMNS.len())
                    .map(|i| row.get_ref(i).map(stored_from_ref))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })?;

            let mut matches = Vec::new();
            for row in rows {
                match match_from_row(&row?) {
                    Ok(m) => matches.push(m),
                    Err(err) => warn!(error = %err, "skipping unreadable match row"),
                }
            }
            Ok(matches)
        })
        .await
    }

    async fn delete_where(&self, predicate: &StorePredicate) -> Result<usize, StoreError> {
        let (clause, params) = where_clause(predicate);
        self.with_conn(move |conn| {
            let deleted = conn.execute(
                &format!("DELETE FROM matches WHERE {clause}"),
                params_from_iter(params.iter()),
            )?;
            Ok(deleted)
        })
        .await
    }
}
