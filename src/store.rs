//! Workspace store: one SQLite file holding a key-value table with one row
//! per collection, each row the whole JSON-serialized collection.
//!
//! This mirrors the single-origin local store the desktop shell replaces:
//! reads happen once at open, every mutation rewrites the collection row from
//! the in-memory copy. A missing or corrupt row decodes to the collection
//! default with a warning; a failed write is logged and the in-memory state
//! stays authoritative.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::model::{
    AttendanceRecord, Expense, Fee, Payment, SchoolClass, SchoolState, ScoreSheet, Settings,
    StaffMember, Student, Teacher,
};

pub const DB_FILE: &str = "schoolbook.sqlite3";

/// The ten store keys. One row each; nothing else lives in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Settings,
    Students,
    Teachers,
    Staff,
    Classes,
    Fees,
    Payments,
    Expenses,
    Scores,
    Attendance,
}

impl Collection {
    pub const ALL: [Collection; 10] = [
        Collection::Settings,
        Collection::Students,
        Collection::Teachers,
        Collection::Staff,
        Collection::Classes,
        Collection::Fees,
        Collection::Payments,
        Collection::Expenses,
        Collection::Scores,
        Collection::Attendance,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Collection::Settings => "settings",
            Collection::Students => "students",
            Collection::Teachers => "teachers",
            Collection::Staff => "staff",
            Collection::Classes => "classes",
            Collection::Fees => "fees",
            Collection::Payments => "payments",
            Collection::Expenses => "expenses",
            Collection::Scores => "scores",
            Collection::Attendance => "attendance",
        }
    }
}

pub struct Store {
    conn: Connection,
    pub state: SchoolState,
}

impl Store {
    /// Opens (creating if needed) the workspace database and decodes all ten
    /// collections into memory.
    pub fn open(workspace: &Path) -> anyhow::Result<Store> {
        std::fs::create_dir_all(workspace)?;
        let conn = Connection::open(workspace.join(DB_FILE))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS store(
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;

        let state = SchoolState {
            settings: decode_or_default::<Settings>(&conn, Collection::Settings),
            students: decode_or_default::<Vec<Student>>(&conn, Collection::Students),
            teachers: decode_or_default::<Vec<Teacher>>(&conn, Collection::Teachers),
            staff: decode_or_default::<Vec<StaffMember>>(&conn, Collection::Staff),
            classes: decode_or_default::<Vec<SchoolClass>>(&conn, Collection::Classes),
            fees: decode_or_default::<Vec<Fee>>(&conn, Collection::Fees),
            payments: decode_or_default::<Vec<Payment>>(&conn, Collection::Payments),
            expenses: decode_or_default::<Vec<Expense>>(&conn, Collection::Expenses),
            scores: decode_or_default::<Vec<ScoreSheet>>(&conn, Collection::Scores),
            attendance: decode_or_default::<Vec<AttendanceRecord>>(&conn, Collection::Attendance),
        };

        Ok(Store { conn, state })
    }

    /// Serializes one collection from the in-memory state and overwrites its
    /// row. Write failures are logged, never propagated: the in-memory state
    /// is what callers observe.
    pub fn persist(&self, collection: Collection) {
        let value = match self.encode(collection) {
            Ok(v) => v,
            Err(e) => {
                warn!(key = collection.key(), error = %e, "failed to serialize collection");
                return;
            }
        };
        let res = self.conn.execute(
            "INSERT OR REPLACE INTO store(key, value) VALUES(?, ?)",
            (collection.key(), &value),
        );
        if let Err(e) = res {
            warn!(key = collection.key(), error = %e, "failed to persist collection");
        }
    }

    pub fn persist_all(&self) {
        for c in Collection::ALL {
            self.persist(c);
        }
    }

    /// Swaps in a whole new state (backup import) and rewrites every row.
    pub fn replace_state(&mut self, state: SchoolState) {
        self.state = state;
        self.persist_all();
    }

    fn encode(&self, collection: Collection) -> serde_json::Result<String> {
        match collection {
            Collection::Settings => serde_json::to_string(&self.state.settings),
            Collection::Students => serde_json::to_string(&self.state.students),
            Collection::Teachers => serde_json::to_string(&self.state.teachers),
            Collection::Staff => serde_json::to_string(&self.state.staff),
            Collection::Classes => serde_json::to_string(&self.state.classes),
            Collection::Fees => serde_json::to_string(&self.state.fees),
            Collection::Payments => serde_json::to_string(&self.state.payments),
            Collection::Expenses => serde_json::to_string(&self.state.expenses),
            Collection::Scores => serde_json::to_string(&self.state.scores),
            Collection::Attendance => serde_json::to_string(&self.state.attendance),
        }
    }
}

fn read_raw(conn: &Connection, key: &str) -> Option<String> {
    match conn
        .query_row("SELECT value FROM store WHERE key = ?", [key], |r| {
            r.get::<_, String>(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => {
            warn!(key, error = %e, "failed to read collection row");
            None
        }
    }
}

/// Missing row or undecodable JSON both land on the default. Corrupt data
/// never fails a request; it is reported and replaced on the next write.
fn decode_or_default<T: Default + DeserializeOwned>(conn: &Connection, collection: Collection) -> T {
    let key = collection.key();
    let Some(raw) = read_raw(conn, key) else {
        return T::default();
    };
    match serde_json::from_str(&raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(key, error = %e, "collection row is corrupt, using default");
            T::default()
        }
    }
}
