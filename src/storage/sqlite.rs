//! Row-level SQLite store. Each `(user, date)` is a primary key, so an upsert
//! is one statement and never rewrites other rows.

use super::LogStore;
use crate::errors::StoreError;
use crate::models::{AuditEntry, DATE_FORMAT, StoredRow, TIMESTAMP_FORMAT};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::Type;
use rusqlite::{Connection, Row, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS logs (
    user      TEXT NOT NULL,
    date      TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    completed TEXT NOT NULL,
    role      TEXT NOT NULL DEFAULT '',
    action    TEXT NOT NULL DEFAULT '',
    PRIMARY KEY (user, date)
);
CREATE TABLE IF NOT EXISTS audit (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    user      TEXT NOT NULL,
    date      TEXT NOT NULL,
    action    TEXT NOT NULL
);
";

const SELECT_LOGS: &str =
    "SELECT user, date, timestamp, completed, role, action FROM logs ORDER BY date ASC, user ASC";
const SELECT_AUDIT: &str = "SELECT timestamp, user, date, action FROM audit ORDER BY id ASC";

const UPSERT: &str = "
INSERT INTO logs (user, date, timestamp, completed, role, action)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT(user, date) DO UPDATE SET
    timestamp = excluded.timestamp,
    completed = excluded.completed,
    role      = excluded.role,
    action    = excluded.action
";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn upsert_row(conn: &Connection, row: &StoredRow) -> Result<(), StoreError> {
    let completed = serde_json::to_string(&row.completed)?;
    conn.execute(
        UPSERT,
        params![row.user, row.date, row.timestamp, completed, row.role, row.action],
    )?;
    Ok(())
}

fn conversion<E>(column: usize) -> impl FnOnce(E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    move |err| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

/// Column order follows `SELECT_LOGS`.
fn map_row(row: &Row) -> rusqlite::Result<StoredRow> {
    let completed: String = row.get(3)?;
    let completed = serde_json::from_str(&completed).map_err(conversion(3))?;

    Ok(StoredRow {
        user: row.get(0)?,
        date: row.get(1)?,
        timestamp: row.get(2)?,
        completed,
        role: row.get(4)?,
        action: row.get(5)?,
    })
}

/// Column order follows `SELECT_AUDIT`.
fn map_audit(row: &Row) -> rusqlite::Result<AuditEntry> {
    let timestamp: String = row.get(0)?;
    let date: String = row.get(2)?;

    Ok(AuditEntry {
        timestamp: NaiveDateTime::parse_from_str(&timestamp, TIMESTAMP_FORMAT)
            .map_err(conversion(0))?,
        user: row.get(1)?,
        date: NaiveDate::parse_from_str(&date, DATE_FORMAT).map_err(conversion(2))?,
        action: row.get(3)?,
    })
}

impl LogStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn load(&self) -> Result<Vec<StoredRow>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(SELECT_LOGS)?;
        let rows = stmt.query_map([], map_row)?;

        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    fn upsert_one(&self, row: StoredRow) -> Result<(), StoreError> {
        let conn = self.lock()?;
        upsert_row(&conn, &row)
    }

    fn delete(&self, user: &str, date: NaiveDate) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM logs WHERE user = ?1 AND date = ?2",
            params![user, date.format(DATE_FORMAT).to_string()],
        )?;
        Ok(removed > 0)
    }

    fn replace_all(&self, rows: Vec<StoredRow>) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM logs", [])?;
        for row in &rows {
            upsert_row(&tx, row)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn append_audit(&self, entry: AuditEntry) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO audit (timestamp, user, date, action) VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                entry.user,
                entry.date.format(DATE_FORMAT).to_string(),
                entry.action,
            ],
        )?;
        Ok(())
    }

    fn audit_trail(&self) -> Result<Vec<AuditEntry>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(SELECT_AUDIT)?;
        let rows = stmt.query_map([], map_audit)?;

        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(user: &str, date: &str, completed: Vec<bool>) -> StoredRow {
        StoredRow {
            timestamp: format!("{date} 08:00:00"),
            user: user.to_string(),
            date: date.to_string(),
            completed,
            role: "User".to_string(),
            action: "Log Updated".to_string(),
        }
    }

    #[test]
    fn upsert_keeps_one_row_per_key() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert_one(row("MQ", "2024-06-01", vec![false, true])).unwrap();
        store.upsert_one(row("MQ", "2024-06-01", vec![true, true])).unwrap();
        store.upsert_one(row("MQ", "2024-06-02", vec![true, false])).unwrap();

        let rows = store.load().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, "2024-06-01");
        assert_eq!(rows[0].completed, vec![true, true]);
    }

    #[test]
    fn delete_reports_whether_row_existed() {
        let store = SqliteStore::open_in_memory().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert!(!store.delete("MQ", date).unwrap());
        store.upsert_one(row("MQ", "2024-06-01", vec![true, true])).unwrap();
        assert!(store.delete("MQ", date).unwrap());
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn replace_all_swaps_contents() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert_one(row("Bashe", "2024-05-01", vec![true, true])).unwrap();
        store
            .replace_all(vec![
                row("MQ", "2024-06-01", vec![false, false]),
                row("Samo", "2024-06-01", vec![true, false]),
            ])
            .unwrap();

        let users: Vec<String> = store.load().unwrap().into_iter().map(|r| r.user).collect();
        assert_eq!(users, vec!["MQ".to_string(), "Samo".to_string()]);
    }

    #[test]
    fn audit_entries_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let entry = AuditEntry {
            timestamp: date.and_hms_opt(12, 30, 0).unwrap(),
            user: "MQ".to_string(),
            date,
            action: "Deleted".to_string(),
        };
        store.append_audit(entry.clone()).unwrap();
        assert_eq!(store.audit_trail().unwrap(), vec![entry]);
    }

    #[test]
    fn bad_completed_value_names_its_column() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO logs (user, date, timestamp, completed) VALUES ('MQ', '2024-06-01', '', 'nope')",
                [],
            )
            .unwrap();

        assert!(matches!(
            store.load(),
            Err(StoreError::Db(rusqlite::Error::FromSqlConversionFailure(3, Type::Text, _)))
        ));
    }

    #[test]
    fn bad_audit_date_names_its_column() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO audit (timestamp, user, date, action) VALUES ('2024-06-01 12:00:00', 'MQ', 'June', 'Deleted')",
                [],
            )
            .unwrap();

        assert!(matches!(
            store.audit_trail(),
            Err(StoreError::Db(rusqlite::Error::FromSqlConversionFailure(2, Type::Text, _)))
        ));
    }
}
