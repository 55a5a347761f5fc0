use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::types::{Criteria, RememberedCommand};

/// Ordered schema migrations. Each is applied once, inside its own transaction,
/// and recorded in `schema_version`.
const MIGRATIONS: &[(i64, &str)] = &[(1, include_str!("../migrations/001_init.sql"))];

const COLUMNS: &str = "id, command, key, metadata, created_at";

// Concurrent invocations from other terminals wait this long for the write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("create store directory {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("schema: {0}")]
    Schema(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("key '{key}' is already used by command #{id}")]
    Conflict { key: String, id: i64 },
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

pub struct Db {
    conn: Connection,
    unique_keys: bool,
}

impl Db {
    /// Open (creating if needed) the store at `path` and bring its schema up to date.
    /// `":memory:"` gives a private in-memory store.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        // WAL mode for concurrent readers + single writer
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let mut db = Self {
            conn,
            unique_keys: false,
        };
        let version = db.ensure_schema()?;
        debug!(path = %path.display(), version, "store opened");
        Ok(db)
    }

    /// Reject inserts whose key is already present.
    pub fn with_unique_keys(mut self, unique_keys: bool) -> Self {
        self.unique_keys = unique_keys;
        self
    }

    /// Apply any pending migrations. Idempotent; returns the schema version.
    pub fn ensure_schema(&mut self) -> Result<i64> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (
                 version    INTEGER PRIMARY KEY,
                 applied_at TEXT NOT NULL
             );",
        )?;

        let latest = MIGRATIONS.last().map_or(0, |(v, _)| *v);
        let current = self.schema_version()?;
        if current > latest {
            return Err(StoreError::Schema(format!(
                "store is at version {current}, newer than the supported version {latest}"
            )));
        }

        for (version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > current) {
            let tx = self
                .conn
                .transaction_with_behavior(TransactionBehavior::Immediate)?;
            // Another process may have migrated while we waited for the lock.
            let applied: i64 = tx.query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |r| r.get(0),
            )?;
            if applied >= *version {
                continue;
            }
            tx.execute_batch(sql)?;
            tx.execute(
                "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
                params![version, Utc::now().to_rfc3339()],
            )?;
            tx.commit()?;
            debug!(version, "applied migration");
        }

        self.schema_version()
    }

    pub fn schema_version(&self) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |r| r.get(0),
        )?)
    }

    // ── Commands ──────────────────────────────────────────────────────────────

    pub fn insert(
        &mut self,
        command: &str,
        key: Option<&str>,
        metadata: Option<&str>,
    ) -> Result<RememberedCommand> {
        if command.trim().is_empty() {
            return Err(StoreError::InvalidInput(
                "command must not be empty".to_string(),
            ));
        }

        let now = Utc::now();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        if self.unique_keys {
            if let Some(k) = key {
                let existing: Option<i64> = tx
                    .query_row(
                        "SELECT id FROM commands WHERE key = ?1 ORDER BY id LIMIT 1",
                        params![k],
                        |r| r.get(0),
                    )
                    .optional()?;
                if let Some(id) = existing {
                    return Err(StoreError::Conflict {
                        key: k.to_string(),
                        id,
                    });
                }
            }
        }

        tx.execute(
            "INSERT INTO commands (command, key, metadata, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![command, key, metadata, now.to_rfc3339()],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(RememberedCommand {
            id,
            command: command.to_string(),
            key: key.map(String::from),
            metadata: metadata.map(String::from),
            created_at: now,
        })
    }

    /// Rows matching `criteria`, oldest first.
    pub fn find(&self, criteria: &Criteria) -> Result<Vec<RememberedCommand>> {
        let (clause, values) = where_clause(criteria);
        let sql = format!("SELECT {COLUMNS} FROM commands{clause} ORDER BY id ASC");
        debug!(%sql, "find");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), row_to_command)?;
        rows.map(|r| r.map_err(Into::into)).collect()
    }

    /// Remove every row matching `criteria`; returns how many were removed.
    pub fn delete(&self, criteria: &Criteria) -> Result<usize> {
        let (clause, values) = where_clause(criteria);
        let sql = format!("DELETE FROM commands{clause}");
        debug!(%sql, "delete");

        Ok(self.conn.execute(&sql, params_from_iter(values))?)
    }

    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM commands", [], |r| r.get(0))?;
        Ok(usize::try_from(n).unwrap_or(0))
    }
}

// ── Query helpers ─────────────────────────────────────────────────────────────

/// Build ` WHERE col op ?1 AND ...` plus the values to bind, in placeholder order.
/// Empty criteria yield an empty clause, i.e. every row.
fn where_clause(criteria: &Criteria) -> (String, Vec<&str>) {
    let op = if criteria.pattern { "LIKE" } else { "=" };
    let terms = criteria.terms();
    if terms.is_empty() {
        return (String::new(), Vec::new());
    }

    let conditions: Vec<String> = terms
        .iter()
        .enumerate()
        .map(|(i, (field, _))| format!("{} {op} ?{}", field.column(), i + 1))
        .collect();
    let values = terms.into_iter().map(|(_, v)| v).collect();

    (format!(" WHERE {}", conditions.join(" AND ")), values)
}

fn row_to_command(row: &rusqlite::Row<'_>) -> rusqlite::Result<RememberedCommand> {
    let created_at_str: String = row.get(4)?;
    let created_at = created_at_str.parse().map_err(|e: chrono::ParseError| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(RememberedCommand {
        id: row.get(0)?,
        command: row.get(1)?,
        key: row.get(2)?,
        metadata: row.get(3)?,
        created_at,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn in_memory_db() -> Db {
        Db::open(Path::new(":memory:")).expect("in-memory DB")
    }

    #[test]
    fn insert_then_find_by_exact_command() {
        let mut db = in_memory_db();
        db.insert("ls -la", None, None).unwrap();

        let rows = db.find(&Criteria::by_command("ls -la")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].command, "ls -la");
        assert_eq!(rows[0].key, None);
        assert_eq!(rows[0].metadata, None);
    }

    #[test]
    fn insert_rejects_empty_command() {
        let mut db = in_memory_db();
        let err = db.insert("  \t", Some("k"), None).unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)), "{err:?}");
        assert_eq!(db.count().unwrap(), 0);
    }

    #[test]
    fn duplicate_keys_allowed_by_default_and_ordered_by_id() {
        let mut db = in_memory_db();
        let a = db.insert("git status", Some("g"), None).unwrap();
        let b = db.insert("git log", Some("g"), None).unwrap();
        assert!(a.id < b.id);

        let rows = db.find(&Criteria::by_key("g")).unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
    }

    #[test]
    fn unique_keys_mode_rejects_duplicate_key() {
        let mut db = in_memory_db().with_unique_keys(true);
        let first = db.insert("git status", Some("g"), None).unwrap();

        let err = db.insert("git log", Some("g"), None).unwrap_err();
        match err {
            StoreError::Conflict { key, id } => {
                assert_eq!(key, "g");
                assert_eq!(id, first.id);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(db.count().unwrap(), 1);

        // Rows without a key never conflict
        db.insert("git log", None, None).unwrap();
        db.insert("git diff", None, None).unwrap();
        assert_eq!(db.count().unwrap(), 3);
    }

    #[test]
    fn delete_by_unknown_key_removes_nothing() {
        let mut db = in_memory_db();
        db.insert("make test", Some("mt"), None).unwrap();
        let before = db.count().unwrap();

        let removed = db.delete(&Criteria::by_key("nope")).unwrap();
        assert_eq!(removed, 0);
        assert_eq!(db.count().unwrap(), before);
    }

    #[test]
    fn delete_removes_all_matches_and_reports_count() {
        let mut db = in_memory_db();
        db.insert("a", Some("x"), None).unwrap();
        db.insert("b", Some("x"), None).unwrap();
        db.insert("c", Some("y"), None).unwrap();

        assert_eq!(db.delete(&Criteria::by_key("x")).unwrap(), 2);
        let rest = db.find(&Criteria::default()).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].command, "c");
    }

    #[test]
    fn pattern_mode_uses_caller_wildcards() {
        let mut db = in_memory_db();
        db.insert("history | grep foo", None, None).unwrap();
        db.insert("history | grep bar", None, None).unwrap();
        db.insert("ls", None, None).unwrap();

        let like = db
            .find(&Criteria::by_command("%grep%").pattern(true))
            .unwrap();
        assert_eq!(like.len(), 2);
        assert_eq!(like[0].command, "history | grep foo");
        assert_eq!(like[1].command, "history | grep bar");

        let exact = db.find(&Criteria::by_command("%grep%")).unwrap();
        assert!(exact.is_empty());

        // No auto-wrapping: without wildcards LIKE only matches the whole value
        let bare = db.find(&Criteria::by_command("grep").pattern(true)).unwrap();
        assert!(bare.is_empty());
    }

    #[test]
    fn pattern_delete_by_metadata() {
        let mut db = in_memory_db();
        db.insert("du -sh *", None, Some("disk usage here"))
            .unwrap();
        db.insert("df -h", None, Some("disk free")).unwrap();
        db.insert("uptime", None, Some("load")).unwrap();

        let removed = db
            .delete(&Criteria::by_metadata("disk%").pattern(true))
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(db.count().unwrap(), 1);
    }

    #[test]
    fn criteria_are_anded() {
        let mut db = in_memory_db();
        db.insert("cargo test", Some("ct"), Some("rust")).unwrap();
        db.insert("cargo test", Some("ct2"), Some("rust")).unwrap();

        let c = Criteria {
            command: Some("cargo test".into()),
            key: Some("ct".into()),
            metadata: Some("rust".into()),
            pattern: false,
        };
        let rows = db.find(&c).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key.as_deref(), Some("ct"));
    }

    #[test]
    fn empty_criteria_lists_everything_in_insertion_order() {
        let mut db = in_memory_db();
        for cmd in ["one", "two", "three"] {
            db.insert(cmd, None, None).unwrap();
        }
        let all: Vec<String> = db
            .find(&Criteria::default())
            .unwrap()
            .into_iter()
            .map(|r| r.command)
            .collect();
        assert_eq!(all, vec!["one", "two", "three"]);
    }

    #[test]
    fn roundtrip_preserves_fields() {
        let mut db = in_memory_db();
        let saved = db
            .insert("tar xzf a.tgz", Some("untar"), Some("extract archive"))
            .unwrap();
        let got = db.find(&Criteria::by_command("tar xzf a.tgz")).unwrap();
        assert_eq!(got, vec![saved]);
    }

    #[test]
    fn user_values_are_bound_not_interpolated() {
        let mut db = in_memory_db();
        db.insert("echo 'x'; DROP TABLE commands; --", None, None)
            .unwrap();
        let rows = db
            .find(&Criteria::by_command("' OR 1=1 --"))
            .unwrap();
        assert!(rows.is_empty());
        assert_eq!(db.count().unwrap(), 1);
    }

    #[test]
    fn ids_are_not_reused_after_delete() {
        let mut db = in_memory_db();
        db.insert("a", None, None).unwrap();
        let b = db.insert("b", None, None).unwrap();
        db.delete(&Criteria::by_command("b")).unwrap();

        let c = db.insert("c", None, None).unwrap();
        assert!(c.id > b.id);
    }

    #[test]
    fn ensure_schema_is_idempotent() {
        let mut db = in_memory_db();
        db.insert("keep me", None, None).unwrap();
        assert_eq!(db.ensure_schema().unwrap(), 1);
        assert_eq!(db.ensure_schema().unwrap(), 1);
        assert_eq!(db.schema_version().unwrap(), 1);
        assert_eq!(db.count().unwrap(), 1);
    }

    #[test]
    fn reopen_file_store_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("remember.db");
        {
            let mut db = Db::open(&path).unwrap();
            db.insert("whoami", Some("me"), None).unwrap();
        }
        assert!(path.exists());
        let db = Db::open(&path).unwrap();
        let rows = db.find(&Criteria::by_key("me")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].command, "whoami");
    }

    #[test]
    fn newer_schema_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("remember.db");
        drop(Db::open(&path).unwrap());

        let conn = Connection::open(&path).unwrap();
        conn.execute(
            "INSERT INTO schema_version (version, applied_at) VALUES (99, 'later')",
            [],
        )
        .unwrap();
        drop(conn);

        match Db::open(&path) {
            Err(StoreError::Schema(msg)) => assert!(msg.contains("99"), "{msg}"),
            Err(other) => panic!("expected schema error, got {other:?}"),
            Ok(_) => panic!("expected schema error, got an open store"),
        }
    }

    #[test]
    fn where_clause_numbers_placeholders_in_order() {
        let c = Criteria {
            command: None,
            key: Some("k".into()),
            metadata: Some("m".into()),
            pattern: true,
        };
        let (clause, values) = where_clause(&c);
        assert_eq!(clause, " WHERE key LIKE ?1 AND metadata LIKE ?2");
        assert_eq!(values, vec!["k", "m"]);

        let everything = Criteria::default();
        let (clause, values) = where_clause(&everything);
        assert!(clause.is_empty());
        assert!(values.is_empty());
    }
}
