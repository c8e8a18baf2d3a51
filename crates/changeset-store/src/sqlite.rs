// ABOUTME: SQLite-backed change ledger storing one row per (entity kind, name) pending change.
// ABOUTME: Uses ON CONFLICT upserts for dedupe and snapshot-key deletes for race-free commits.

use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use changeset_core::{ChangeKind, ChangeRecord, EntityKind, RecordKey};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, Row, params};

use crate::ledger::{ChangeLedger, LedgerError};

/// Table name the host integration has always used.
pub const DEFAULT_TABLE: &str = "Chauffeur_Changes";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const COLUMNS: &str = "Id, EntityType, Name, ChangeDate, ChangeType, Revision";

type RawRow = (i64, i64, String, String, i64, i64);

/// A change ledger in a SQLite database file. The connection is guarded by a
/// mutex so one handle can be shared between the recorder and the builder;
/// other processes coordinate through SQLite's own locking.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
    table: String,
}

impl SqliteLedger {
    /// Open or create the ledger database at `path` using the default table.
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        Self::open_with_table(path, DEFAULT_TABLE)
    }

    /// Open or create the ledger database at `path`, storing records in
    /// `table`. Creates parent directories and the table if needed; a schema
    /// failure here is fatal for the recording path.
    pub fn open_with_table(path: &Path, table: &str) -> Result<Self, LedgerError> {
        validate_table_name(table)?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let ledger = Self {
            conn: Mutex::new(conn),
            table: table.to_string(),
        };
        ledger.ensure_schema()?;
        tracing::debug!("opened change ledger {} at {}", ledger.table, path.display());

        Ok(ledger)
    }

    /// The table this ledger writes to.
    pub fn table(&self) -> &str {
        &self.table
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, LedgerError> {
        self.conn.lock().map_err(|_| LedgerError::Poisoned)
    }
}

impl ChangeLedger for SqliteLedger {
    fn ensure_schema(&self) -> Result<(), LedgerError> {
        let conn = self.conn()?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                Id INTEGER PRIMARY KEY AUTOINCREMENT,
                EntityType INTEGER NOT NULL,
                Name TEXT NOT NULL,
                ChangeDate TEXT NOT NULL,
                ChangeType INTEGER NOT NULL,
                Revision INTEGER NOT NULL DEFAULT 0
            );

            CREATE UNIQUE INDEX IF NOT EXISTS UX_{table}_EntityType_Name
                ON {table} (EntityType, Name);",
            table = self.table
        ))?;

        // Tables created by the host integration predate the revision counter.
        if !has_column(&conn, &self.table, "Revision")? {
            tracing::info!("adding Revision column to {}", self.table);
            conn.execute_batch(&format!(
                "ALTER TABLE {} ADD COLUMN Revision INTEGER NOT NULL DEFAULT 0;",
                self.table
            ))?;
        }
        Ok(())
    }

    fn upsert(
        &self,
        kind: EntityKind,
        name: &str,
        change_kind: ChangeKind,
    ) -> Result<ChangeRecord, LedgerError> {
        let conn = self.conn()?;
        let now = format_date(&Utc::now());

        let raw = conn.query_row(
            &format!(
                "INSERT INTO {table} (EntityType, Name, ChangeDate, ChangeType)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(EntityType, Name) DO UPDATE SET
                    ChangeDate = excluded.ChangeDate,
                    ChangeType = excluded.ChangeType,
                    Revision = {table}.Revision + 1
                 RETURNING {columns}",
                table = self.table,
                columns = COLUMNS
            ),
            params![kind.code(), name, now, change_kind.code()],
            raw_row,
        )?;

        into_record(raw)
    }

    fn read_all(&self) -> Result<Vec<ChangeRecord>, LedgerError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {COLUMNS} FROM {} ORDER BY EntityType ASC, Name ASC",
            self.table
        );
        let mut stmt = conn.prepare(&sql)?;

        let rows = stmt.query_map([], raw_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(into_record(row?)?);
        }
        Ok(records)
    }

    fn clear(&self) -> Result<usize, LedgerError> {
        let conn = self.conn()?;
        let removed = conn.execute(&format!("DELETE FROM {}", self.table), [])?;
        Ok(removed)
    }

    fn remove(&self, keys: &[RecordKey]) -> Result<usize, LedgerError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut removed = 0;
        {
            let mut stmt = tx.prepare(&format!(
                "DELETE FROM {} WHERE Id = ?1 AND Revision = ?2",
                self.table
            ))?;
            for key in keys {
                removed += stmt.execute(params![key.id, key.revision])?;
            }
        }
        tx.commit()?;

        if removed < keys.len() {
            tracing::info!(
                "{} change(s) were recorded during the build and remain pending",
                keys.len() - removed
            );
        }
        Ok(removed)
    }

    fn forget(&self, kind: EntityKind, name: &str) -> Result<bool, LedgerError> {
        let conn = self.conn()?;
        let removed = conn.execute(
            &format!("DELETE FROM {} WHERE EntityType = ?1 AND Name = ?2", self.table),
            params![kind.code(), name],
        )?;
        Ok(removed > 0)
    }

    fn len(&self) -> Result<usize, LedgerError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.table),
            [],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }
}

/// Whether `table` is a plain SQL identifier: an ASCII letter or underscore
/// followed by ASCII letters, digits or underscores. Table names are
/// interpolated into SQL, so nothing else is accepted.
pub fn is_valid_table_name(table: &str) -> bool {
    let mut chars = table.chars();
    match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}

fn validate_table_name(table: &str) -> Result<(), LedgerError> {
    if is_valid_table_name(table) {
        Ok(())
    } else {
        Err(LedgerError::InvalidTable(table.to_string()))
    }
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool, LedgerError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for name in names {
        if name?.eq_ignore_ascii_case(column) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Dates are stored as RFC 3339 text at nanosecond precision.
fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn raw_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn into_record(
    (id, entity_type, name, change_date, change_type, revision): RawRow,
) -> Result<ChangeRecord, LedgerError> {
    let parsed = DateTime::parse_from_rfc3339(&change_date).map_err(|source| {
        LedgerError::InvalidDate {
            value: change_date.clone(),
            source,
        }
    })?;

    Ok(ChangeRecord {
        id,
        kind: EntityKind::from_code(entity_type)?,
        name,
        change_date: parsed.with_timezone(&Utc),
        change_kind: ChangeKind::from_code(change_type)?,
        revision,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn open_ledger(dir: &TempDir) -> SqliteLedger {
        SqliteLedger::open(&dir.path().join("changes.db")).unwrap()
    }

    fn save(ledger: &SqliteLedger, kind: EntityKind, name: &str) -> ChangeRecord {
        ledger.upsert(kind, name, ChangeKind::Saved).unwrap()
    }

    fn names(ledger: &SqliteLedger) -> Vec<String> {
        let records = ledger.read_all().unwrap();
        records.into_iter().map(|r| r.name).collect()
    }

    #[test]
    fn ensure_schema_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let ledger = open_ledger(&dir);

        ledger.ensure_schema().unwrap();
        ledger.ensure_schema().unwrap();

        // Reopening runs schema creation again against an existing table.
        drop(ledger);
        let reopened = open_ledger(&dir);
        assert!(reopened.is_empty().unwrap());
    }

    #[test]
    fn upsert_inserts_then_updates_in_place() {
        let dir = TempDir::new().unwrap();
        let ledger = open_ledger(&dir);

        let first = save(&ledger, EntityKind::ContentType, "homePage");
        let second = save(&ledger, EntityKind::ContentType, "homePage");

        assert_eq!(first.id, second.id);
        assert_eq!(first.revision, 0);
        assert_eq!(second.revision, 1);
        assert!(second.change_date >= first.change_date);

        let records = ledger.read_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0], second);
    }

    #[test]
    fn upsert_refreshes_change_kind() {
        let dir = TempDir::new().unwrap();
        let ledger = open_ledger(&dir);

        save(&ledger, EntityKind::Macro, "nav");
        ledger
            .upsert(EntityKind::Macro, "nav", ChangeKind::Deleted)
            .unwrap();

        let records = ledger.read_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].change_kind, ChangeKind::Deleted);
    }

    #[test]
    fn same_name_in_different_kinds_is_distinct() {
        let dir = TempDir::new().unwrap();
        let ledger = open_ledger(&dir);

        save(&ledger, EntityKind::Template, "Master");
        save(&ledger, EntityKind::PartialView, "Master");

        assert_eq!(ledger.len().unwrap(), 2);
    }

    #[test]
    fn read_all_orders_by_kind_then_name() {
        let dir = TempDir::new().unwrap();
        let ledger = open_ledger(&dir);

        save(&ledger, EntityKind::Macro, "b");
        save(&ledger, EntityKind::ContentType, "z");
        save(&ledger, EntityKind::Macro, "a");

        let keys: Vec<(EntityKind, String)> = ledger
            .read_all()
            .unwrap()
            .into_iter()
            .map(|r| (r.kind, r.name))
            .collect();
        assert_eq!(
            keys,
            vec![
                (EntityKind::ContentType, "z".to_string()),
                (EntityKind::Macro, "a".to_string()),
                (EntityKind::Macro, "b".to_string()),
            ]
        );
    }

    #[test]
    fn clear_removes_everything() {
        let dir = TempDir::new().unwrap();
        let ledger = open_ledger(&dir);

        save(&ledger, EntityKind::DataType, "Tags");
        save(&ledger, EntityKind::Stylesheet, "site");

        assert_eq!(ledger.clear().unwrap(), 2);
        assert!(ledger.read_all().unwrap().is_empty());
    }

    #[test]
    fn remove_keeps_records_refreshed_after_snapshot() {
        let dir = TempDir::new().unwrap();
        let ledger = open_ledger(&dir);

        save(&ledger, EntityKind::ContentType, "A");
        save(&ledger, EntityKind::ContentType, "B");

        let records = ledger.read_all().unwrap();
        let snapshot: Vec<RecordKey> = records.iter().map(ChangeRecord::key).collect();

        // "B" changes again and "C" appears while the build is running.
        save(&ledger, EntityKind::ContentType, "B");
        save(&ledger, EntityKind::ContentType, "C");

        let removed = ledger.remove(&snapshot).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(names(&ledger), vec!["B".to_string(), "C".to_string()]);
    }

    #[test]
    fn remove_keeps_a_refresh_that_shares_the_snapshot_timestamp() {
        let dir = TempDir::new().unwrap();
        let ledger = open_ledger(&dir);

        let read = save(&ledger, EntityKind::Template, "Master");
        let snapshot = [read.key()];

        // Refreshed mid-build within the same clock tick: date and change
        // kind are identical to what the build read.
        let refreshed = save(&ledger, EntityKind::Template, "Master");
        {
            let conn = ledger.conn().unwrap();
            conn.execute(
                "UPDATE Chauffeur_Changes SET ChangeDate = ?1 WHERE Id = ?2",
                params![format_date(&read.change_date), read.id],
            )
            .unwrap();
        }
        let current = ledger.read_all().unwrap();
        assert_eq!(current[0].change_date, read.change_date);
        assert_eq!(current[0].change_kind, read.change_kind);
        assert_eq!(refreshed.revision, read.revision + 1);

        assert_eq!(ledger.remove(&snapshot).unwrap(), 0);
        assert_eq!(names(&ledger), vec!["Master".to_string()]);

        let latest: Vec<RecordKey> = current.iter().map(ChangeRecord::key).collect();
        assert_eq!(ledger.remove(&latest).unwrap(), 1);
        assert!(ledger.is_empty().unwrap());
    }

    #[test]
    fn forget_drops_a_single_record() {
        let dir = TempDir::new().unwrap();
        let ledger = open_ledger(&dir);

        save(&ledger, EntityKind::Template, "Master");
        assert!(ledger.forget(EntityKind::Template, "Master").unwrap());
        assert!(!ledger.forget(EntityKind::Template, "Master").unwrap());
        assert!(ledger.is_empty().unwrap());
    }

    #[test]
    fn concurrent_upserts_for_one_key_produce_one_record() {
        let dir = TempDir::new().unwrap();
        let ledger = Arc::new(open_ledger(&dir));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || {
                    for _ in 0..10 {
                        save(&ledger, EntityKind::DataType, "Rich Text");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let records = ledger.read_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].revision, 159);
    }

    #[test]
    fn concurrent_upserts_across_connections_produce_one_record() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("changes.db");
        SqliteLedger::open(&path).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let path = path.clone();
                thread::spawn(move || {
                    let ledger = SqliteLedger::open(&path).unwrap();
                    for _ in 0..10 {
                        save(&ledger, EntityKind::Template, "Master");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(SqliteLedger::open(&path).unwrap().len().unwrap(), 1);
    }

    #[test]
    fn legacy_table_gains_a_revision_column() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("changes.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE Chauffeur_Changes (
                    Id INTEGER PRIMARY KEY AUTOINCREMENT,
                    EntityType INTEGER NOT NULL,
                    Name TEXT NOT NULL,
                    ChangeDate TEXT NOT NULL,
                    ChangeType INTEGER NOT NULL
                );
                INSERT INTO Chauffeur_Changes (EntityType, Name, ChangeDate, ChangeType)
                VALUES (2, 'Master', '2024-01-01T00:00:00.000000000Z', 0);",
            )
            .unwrap();
        }

        let ledger = SqliteLedger::open(&path).unwrap();
        let records = ledger.read_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Master");
        assert_eq!(records[0].revision, 0);

        let refreshed = save(&ledger, EntityKind::Template, "Master");
        assert_eq!(refreshed.id, records[0].id);
        assert_eq!(refreshed.revision, 1);
    }

    #[test]
    fn rejects_unsafe_table_names() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.db");
        let result = SqliteLedger::open_with_table(&path, "changes; DROP TABLE x");
        assert!(matches!(result, Err(LedgerError::InvalidTable(_))));

        assert!(is_valid_table_name("Chauffeur_Changes"));
        assert!(is_valid_table_name("_pending2"));
        assert!(!is_valid_table_name("2pending"));
        assert!(!is_valid_table_name("x; DROP"));
        assert!(!is_valid_table_name(""));
    }

    #[test]
    fn custom_table_names_are_isolated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("changes.db");
        let a = SqliteLedger::open_with_table(&path, "ledger_a").unwrap();
        let b = SqliteLedger::open_with_table(&path, "ledger_b").unwrap();

        save(&a, EntityKind::Macro, "nav");

        assert_eq!(a.len().unwrap(), 1);
        assert_eq!(b.len().unwrap(), 0);
        assert_eq!(a.table(), "ledger_a");
    }

    #[test]
    fn rows_with_unknown_codes_surface_as_errors() {
        let dir = TempDir::new().unwrap();
        let ledger = open_ledger(&dir);
        {
            let conn = ledger.conn().unwrap();
            conn.execute(
                "INSERT INTO Chauffeur_Changes (EntityType, Name, ChangeDate, ChangeType)
                 VALUES (99, 'x', '2024-01-01T00:00:00.000000000Z', 0)",
                [],
            )
            .unwrap();
        }

        assert!(matches!(ledger.read_all(), Err(LedgerError::InvalidRow(_))));
    }
}
