//! SQLite session ledger
//!
//! Single-writer store owned by the coordinator. Identities are keyed by token
//! id; sessions are append-only and at most one per identity may be open
//! (`check_out IS NULL`), which a partial unique index also enforces.
//!
//! Every read-then-write decision runs inside `Ledger::transact`, an
//! `IMMEDIATE` transaction taken while holding the connection mutex, so two
//! concurrent requests can never both observe "no open session".

use crate::domain::types::{Identity, IdentityId, Session, Timestamp};
use crate::domain::wire::{HistoryEntry, UserEntry};
use crate::services::error::{Conflict, CoordinatorError};
use anyhow::Context;
use parking_lot::Mutex;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, ErrorCode, OpenFlags, OptionalExtension, TransactionBehavior};
use std::path::Path;
use tracing::info;

const SCHEMA: &str = "BEGIN;
     CREATE TABLE IF NOT EXISTS identities (
        identity_id TEXT PRIMARY KEY,
        name TEXT NOT NULL
     );
     CREATE TABLE IF NOT EXISTS sessions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        identity_id TEXT NOT NULL REFERENCES identities(identity_id),
        check_in TEXT NOT NULL,
        check_out TEXT,
        duration TEXT
     );
     CREATE UNIQUE INDEX IF NOT EXISTS sessions_one_open
        ON sessions(identity_id) WHERE check_out IS NULL;
     COMMIT;";

impl ToSql for IdentityId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for IdentityId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Integer(i) => Ok(IdentityId::new(i.to_string())),
            _ => value.as_str().map(IdentityId::new),
        }
    }
}

impl ToSql for Timestamp {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for Timestamp {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()
            .and_then(|s| Timestamp::parse(s).map_err(|e| FromSqlError::Other(Box::new(e))))
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

/// Open session row as seen inside a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenSession {
    pub id: i64,
    pub check_in: Timestamp,
}

pub struct Ledger {
    conn: Mutex<Connection>,
    location: String,
}

impl Ledger {
    /// Open (or create) the ledger file and apply the schema
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create ledger dir {}", parent.display()))?;
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let conn = Connection::open_with_flags(path, flags)
            .with_context(|| format!("Failed to open ledger {}", path.display()))?;

        conn.pragma_update(None, "journal_mode", "WAL").context("Failed to enable WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .context("Failed to set synchronous")?;

        Self::init(conn, path.display().to_string())
    }

    /// Ledger that lives only as long as the process (tests, dry runs)
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory ledger")?;
        Self::init(conn, ":memory:".to_string())
    }

    fn init(conn: Connection, location: String) -> anyhow::Result<Self> {
        conn.pragma_update(None, "busy_timeout", 5000).context("Failed to set busy_timeout")?;
        conn.pragma_update(None, "foreign_keys", "ON").context("Failed to enable foreign keys")?;
        conn.execute_batch(SCHEMA).context("Failed to initialize ledger schema")?;

        info!(location = %location, "ledger_opened");
        Ok(Self { conn: Mutex::new(conn), location })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Run raw SQL against the connection, for tests that break the schema
    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> rusqlite::Result<()> {
        self.conn.lock().execute_batch(sql)
    }

    /// Run `op` as one atomic unit. Nothing it wrote survives if it fails.
    pub fn transact<T>(
        &self,
        op: impl FnOnce(&LedgerTx<'_>) -> Result<T, CoordinatorError>,
    ) -> Result<T, CoordinatorError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = op(&LedgerTx { conn: &tx })?;
        tx.commit()?;
        Ok(value)
    }

    pub fn identity(&self, id: &IdentityId) -> Result<Option<Identity>, CoordinatorError> {
        let conn = self.conn.lock();
        let identity = conn
            .query_row(
                "SELECT identity_id, name FROM identities WHERE identity_id = ?1",
                params![id],
                |row| Ok(Identity { id: row.get(0)?, name: row.get(1)? }),
            )
            .optional()?;
        Ok(identity)
    }

    /// All sessions of one identity, oldest first
    pub fn sessions_for(&self, id: &IdentityId) -> Result<Vec<Session>, CoordinatorError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, identity_id, check_in, check_out, duration \
             FROM sessions WHERE identity_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![id], |row| {
            Ok(Session {
                id: row.get(0)?,
                identity_id: row.get(1)?,
                check_in: row.get(2)?,
                check_out: row.get(3)?,
                duration: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Session history joined with names, newest first
    pub fn history(&self) -> Result<Vec<HistoryEntry>, CoordinatorError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT identities.name, sessions.check_in, sessions.check_out, sessions.duration \
             FROM sessions \
             JOIN identities ON sessions.identity_id = identities.identity_id \
             ORDER BY sessions.id DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(HistoryEntry {
                name: row.get(0)?,
                check_in: row.get(1)?,
                check_out: row.get(2)?,
                duration: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Every identity with the check-in time of its open session, if any
    pub fn users(&self) -> Result<Vec<UserEntry>, CoordinatorError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT i.identity_id, i.name, \
                (SELECT s.check_in FROM sessions s \
                 WHERE s.identity_id = i.identity_id AND s.check_out IS NULL) \
             FROM identities i ORDER BY i.name ASC, i.identity_id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(UserEntry {
                identity_id: row.get(0)?,
                name: row.get(1)?,
                active_checkin: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

/// Ledger operations available inside a transaction
pub struct LedgerTx<'a> {
    conn: &'a Connection,
}

impl LedgerTx<'_> {
    pub fn identity_name(&self, id: &IdentityId) -> Result<Option<String>, CoordinatorError> {
        let name = self
            .conn
            .query_row(
                "SELECT name FROM identities WHERE identity_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name)
    }

    /// Insert a new identity; an existing id is a conflict, never an overwrite
    pub fn insert_identity(&self, id: &IdentityId, name: &str) -> Result<(), CoordinatorError> {
        match self.conn.execute(
            "INSERT INTO identities (identity_id, name) VALUES (?1, ?2)",
            params![id, name],
        ) {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(Conflict::AlreadyRegistered.into()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn rename_identity(&self, id: &IdentityId, name: &str) -> Result<bool, CoordinatorError> {
        let changed = self
            .conn
            .execute("UPDATE identities SET name = ?1 WHERE identity_id = ?2", params![name, id])?;
        Ok(changed > 0)
    }

    pub fn open_session(&self, id: &IdentityId) -> Result<Option<OpenSession>, CoordinatorError> {
        let session = self
            .conn
            .query_row(
                "SELECT id, check_in FROM sessions WHERE identity_id = ?1 AND check_out IS NULL",
                params![id],
                |row| Ok(OpenSession { id: row.get(0)?, check_in: row.get(1)? }),
            )
            .optional()?;
        Ok(session)
    }

    /// Open a session; returns its surrogate key
    pub fn insert_session(
        &self,
        id: &IdentityId,
        check_in: Timestamp,
    ) -> Result<i64, CoordinatorError> {
        self.conn.execute(
            "INSERT INTO sessions (identity_id, check_in) VALUES (?1, ?2)",
            params![id, check_in],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn close_session(
        &self,
        session_id: i64,
        check_out: Timestamp,
        duration: &str,
    ) -> Result<(), CoordinatorError> {
        self.conn.execute(
            "UPDATE sessions SET check_out = ?1, duration = ?2 \
             WHERE id = ?3 AND check_out IS NULL",
            params![check_out, duration, session_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    fn id(s: &str) -> IdentityId {
        IdentityId::new(s)
    }

    #[test]
    fn test_duplicate_identity_is_conflict() {
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.transact(|tx| tx.insert_identity(&id("1001"), "Ada")).unwrap();

        let err = ledger.transact(|tx| tx.insert_identity(&id("1001"), "Grace")).unwrap_err();
        assert!(matches!(err, CoordinatorError::Conflict(Conflict::AlreadyRegistered)));
        assert_eq!(ledger.identity(&id("1001")).unwrap().unwrap().name, "Ada");
    }

    #[test]
    fn test_index_rejects_second_open_session() {
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.transact(|tx| tx.insert_identity(&id("1001"), "Ada")).unwrap();
        ledger.transact(|tx| tx.insert_session(&id("1001"), ts("2024-01-01 09:00:00"))).unwrap();

        let err = ledger
            .transact(|tx| tx.insert_session(&id("1001"), ts("2024-01-01 09:05:00")))
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::Storage(_)));
        assert_eq!(ledger.sessions_for(&id("1001")).unwrap().len(), 1);
    }

    #[test]
    fn test_failed_transaction_rolls_back() {
        let ledger = Ledger::open_in_memory().unwrap();
        let result: Result<(), _> = ledger.transact(|tx| {
            tx.insert_identity(&id("1001"), "Ada")?;
            Err(CoordinatorError::validation("abort"))
        });
        assert!(result.is_err());
        assert!(ledger.identity(&id("1001")).unwrap().is_none());
    }

    #[test]
    fn test_history_and_users() {
        let ledger = Ledger::open_in_memory().unwrap();
        ledger
            .transact(|tx| {
                tx.insert_identity(&id("1001"), "Ada")?;
                tx.insert_identity(&id("1002"), "Grace")?;
                let first = tx.insert_session(&id("1001"), ts("2024-01-01 09:00:00"))?;
                tx.close_session(first, ts("2024-01-01 10:00:00"), "1:00:00")?;
                tx.insert_session(&id("1002"), ts("2024-01-01 11:00:00"))?;
                Ok(())
            })
            .unwrap();

        let history = ledger.history().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].name, "Grace");
        assert_eq!(history[0].check_out, None);
        assert_eq!(history[1].duration.as_deref(), Some("1:00:00"));

        let users = ledger.users().unwrap();
        assert_eq!(users[0].name, "Ada");
        assert_eq!(users[0].active_checkin, None);
        assert_eq!(users[1].active_checkin, Some(ts("2024-01-01 11:00:00")));
    }

    #[test]
    fn test_file_ledger_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("attendance.db");
        {
            let ledger = Ledger::open(&path).unwrap();
            ledger.transact(|tx| tx.insert_identity(&id("77"), "Linus")).unwrap();
        }
        let reopened = Ledger::open(&path).unwrap();
        assert_eq!(reopened.identity(&id("77")).unwrap().unwrap().name, "Linus");
    }
}
