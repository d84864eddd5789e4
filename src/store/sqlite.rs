use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::broadcast;

use crate::events::EventRecord;

use super::{ChangeFeed, ChangeKind, EventStore, StoreChange, StoreError};

struct Migration {
    version: i64,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: r#"
CREATE TABLE event_overrides (
    id                 TEXT PRIMARY KEY,
    seed_name          TEXT NOT NULL UNIQUE,
    title              TEXT NOT NULL,
    description        TEXT NOT NULL,
    event_type         TEXT NOT NULL,
    event_date         TEXT NOT NULL,
    start_time         TEXT,
    end_time           TEXT,
    location           TEXT NOT NULL,
    address            TEXT,
    max_participants   INTEGER,
    requirements_json  TEXT NOT NULL DEFAULT '[]',
    what_to_bring_json TEXT NOT NULL DEFAULT '[]',
    organizer_name     TEXT,
    organizer_contact  TEXT,
    status             TEXT NOT NULL DEFAULT 'upcoming',
    created_by         TEXT,
    updated_at         TEXT NOT NULL
);
"#,
    },
    Migration {
        version: 2,
        sql: r#"
CREATE INDEX idx_event_overrides_updated ON event_overrides(updated_at);
"#,
    },
];

fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version     INTEGER PRIMARY KEY,
            applied_at  TEXT NOT NULL
        );",
    )?;

    let applied: Vec<i64> = {
        let mut stmt = conn.prepare("SELECT version FROM _migrations ORDER BY version")?;
        let result = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        result
    };

    for migration in MIGRATIONS {
        if applied.contains(&migration.version) {
            continue;
        }

        tracing::info!("applying migration v{}", migration.version);

        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.sql)
            .map_err(|e| StoreError::Migration(format!("v{}: {e}", migration.version)))?;
        tx.execute(
            "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
            params![migration.version],
        )?;
        tx.commit()?;
    }

    Ok(())
}

const COLUMNS: &str = "id, seed_name, title, description, event_type, event_date, \
     start_time, end_time, location, address, max_participants, \
     requirements_json, what_to_bring_json, organizer_name, organizer_contact, \
     status, created_by, updated_at";

/// SQLite-backed store. Stands in for the hosted table the deployed platform
/// writes to; tests and offline installs run against it directly.
pub struct SqliteEventStore {
    conn: Mutex<Connection>,
    feed: ChangeFeed,
}

impl SqliteEventStore {
    /// Open (or create) a database file at `path`, enable WAL mode, and run
    /// migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an ephemeral in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            feed: ChangeFeed::new(),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    fn select_by_id(conn: &Connection, id: &str) -> Result<Option<EventRecord>, StoreError> {
        let mut stmt = stmt_select_where(conn, "id = ?1")?;
        let raw = stmt.query_row(params![id], raw_row_from).optional()?;
        raw.map(decode_row).transpose()
    }

    fn select_by_seed_name(
        conn: &Connection,
        seed_name: &str,
    ) -> Result<Option<EventRecord>, StoreError> {
        let mut stmt = stmt_select_where(conn, "seed_name = ?1")?;
        let raw = stmt
            .query_row(params![seed_name], raw_row_from)
            .optional()?;
        raw.map(decode_row).transpose()
    }
}

fn stmt_select_where<'c>(
    conn: &'c Connection,
    predicate: &str,
) -> Result<rusqlite::Statement<'c>, StoreError> {
    Ok(conn.prepare(&format!(
        "SELECT {COLUMNS} FROM event_overrides WHERE {predicate}"
    ))?)
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn list(&self) -> Result<Vec<EventRecord>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM event_overrides ORDER BY seed_name"
        ))?;
        let raws = stmt
            .query_map([], raw_row_from)?
            .collect::<Result<Vec<_>, _>>()?;
        raws.into_iter().map(decode_row).collect()
    }

    async fn get(&self, id: &str) -> Result<Option<EventRecord>, StoreError> {
        let conn = self.conn();
        Self::select_by_id(&conn, id)
    }

    async fn insert(&self, record: EventRecord) -> Result<EventRecord, StoreError> {
        let requirements = encode_list(&record.requirements)?;
        let what_to_bring = encode_list(&record.what_to_bring)?;
        {
            let conn = self.conn();
            conn.execute(
                &format!("INSERT INTO event_overrides ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"),
                params![
                    record.id,
                    record.seed_name,
                    record.title,
                    record.description,
                    record.event_type.as_str(),
                    record.event_date,
                    record.start_time,
                    record.end_time,
                    record.location,
                    record.address,
                    record.max_participants,
                    requirements,
                    what_to_bring,
                    record.organizer_name,
                    record.organizer_contact,
                    record.status.as_str(),
                    record.created_by,
                    record.updated_at,
                ],
            )
            .map_err(map_constraint)?;
        }
        self.feed.publish(&record.id, ChangeKind::Inserted);
        Ok(record)
    }

    async fn update(&self, id: &str, record: EventRecord) -> Result<EventRecord, StoreError> {
        let stored = {
            let conn = self.conn();
            // id, seed_name, and created_by are immutable columns; they are
            // deliberately absent from the SET list.
            let affected = conn.execute(
                "UPDATE event_overrides SET
                    title = ?2, description = ?3, event_type = ?4, event_date = ?5,
                    start_time = ?6, end_time = ?7, location = ?8, address = ?9,
                    max_participants = ?10, requirements_json = ?11,
                    what_to_bring_json = ?12, organizer_name = ?13,
                    organizer_contact = ?14, status = ?15, updated_at = ?16
                 WHERE id = ?1",
                params![
                    id,
                    record.title,
                    record.description,
                    record.event_type.as_str(),
                    record.event_date,
                    record.start_time,
                    record.end_time,
                    record.location,
                    record.address,
                    record.max_participants,
                    encode_list(&record.requirements)?,
                    encode_list(&record.what_to_bring)?,
                    record.organizer_name,
                    record.organizer_contact,
                    record.status.as_str(),
                    record.updated_at,
                ],
            )?;
            if affected == 0 {
                return Err(StoreError::NotFound(format!("no row with id {id:?}")));
            }
            Self::select_by_id(&conn, id)?
                .ok_or_else(|| StoreError::NotFound(format!("no row with id {id:?}")))?
        };
        self.feed.publish(&stored.id, ChangeKind::Updated);
        Ok(stored)
    }

    async fn upsert(&self, record: EventRecord) -> Result<EventRecord, StoreError> {
        let requirements = encode_list(&record.requirements)?;
        let what_to_bring = encode_list(&record.what_to_bring)?;
        let (stored, inserted) = {
            let conn = self.conn();
            let affected = conn.execute(
                &format!("INSERT INTO event_overrides ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18) ON CONFLICT(seed_name) DO NOTHING"),
                params![
                    record.id,
                    record.seed_name,
                    record.title,
                    record.description,
                    record.event_type.as_str(),
                    record.event_date,
                    record.start_time,
                    record.end_time,
                    record.location,
                    record.address,
                    record.max_participants,
                    requirements,
                    what_to_bring,
                    record.organizer_name,
                    record.organizer_contact,
                    record.status.as_str(),
                    record.created_by,
                    record.updated_at,
                ],
            )?;
            let stored = Self::select_by_seed_name(&conn, &record.seed_name)?.ok_or_else(|| {
                StoreError::NotFound(format!("upserted row vanished: {:?}", record.seed_name))
            })?;
            (stored, affected > 0)
        };
        if inserted {
            self.feed.publish(&stored.id, ChangeKind::Inserted);
        }
        Ok(stored)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let affected = {
            let conn = self.conn();
            conn.execute("DELETE FROM event_overrides WHERE id = ?1", params![id])?
        };
        if affected > 0 {
            self.feed.publish(id, ChangeKind::Deleted);
        }
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<StoreChange> {
        self.feed.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

struct RawRow {
    id: String,
    seed_name: String,
    title: String,
    description: String,
    event_type: String,
    event_date: String,
    start_time: Option<String>,
    end_time: Option<String>,
    location: String,
    address: Option<String>,
    max_participants: Option<i64>,
    requirements_json: String,
    what_to_bring_json: String,
    organizer_name: Option<String>,
    organizer_contact: Option<String>,
    status: String,
    created_by: Option<String>,
    updated_at: String,
}

fn raw_row_from(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        seed_name: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        event_type: row.get(4)?,
        event_date: row.get(5)?,
        start_time: row.get(6)?,
        end_time: row.get(7)?,
        location: row.get(8)?,
        address: row.get(9)?,
        max_participants: row.get(10)?,
        requirements_json: row.get(11)?,
        what_to_bring_json: row.get(12)?,
        organizer_name: row.get(13)?,
        organizer_contact: row.get(14)?,
        status: row.get(15)?,
        created_by: row.get(16)?,
        updated_at: row.get(17)?,
    })
}

fn decode_row(raw: RawRow) -> Result<EventRecord, StoreError> {
    let event_type = raw.event_type.parse().map_err(StoreError::Encoding)?;
    let status = raw.status.parse().map_err(StoreError::Encoding)?;
    let max_participants = raw
        .max_participants
        .map(u32::try_from)
        .transpose()
        .map_err(|e| StoreError::Encoding(format!("max_participants: {e}")))?;
    Ok(EventRecord {
        id: raw.id,
        seed_name: raw.seed_name,
        title: raw.title,
        description: raw.description,
        event_type,
        event_date: raw.event_date,
        start_time: raw.start_time,
        end_time: raw.end_time,
        location: raw.location,
        address: raw.address,
        max_participants,
        requirements: decode_list(&raw.requirements_json)?,
        what_to_bring: decode_list(&raw.what_to_bring_json)?,
        organizer_name: raw.organizer_name,
        organizer_contact: raw.organizer_contact,
        status,
        created_by: raw.created_by,
        updated_at: raw.updated_at,
    })
}

fn encode_list(items: &[String]) -> Result<String, StoreError> {
    serde_json::to_string(items).map_err(|e| StoreError::Encoding(e.to_string()))
}

fn decode_list(json: &str) -> Result<Vec<String>, StoreError> {
    serde_json::from_str(json).map_err(|e| StoreError::Encoding(e.to_string()))
}

fn map_constraint(e: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(err, _) = &e {
        if err.code == rusqlite::ErrorCode::ConstraintViolation {
            return StoreError::Conflict(e.to_string());
        }
    }
    StoreError::Sqlite(e)
}
