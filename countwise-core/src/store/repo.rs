//! Store repository layer
//!
//! Provides read and write operations for counters and settings.

use crate::error::{Error, Result};
use crate::types::{StoredValue, ValueKind};
use chrono::Utc;
use rusqlite::types::{Type, Value};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::installation::{InstallationId, INSTALLATION_FILE};

/// File name of the SQLite database inside the store directory
pub const DATABASE_FILE: &str = "analytics.db";

/// Storage handle shared by every analytics operation.
///
/// Owns the SQLite connection and the installation id of the directory it was
/// opened on. Two handles opened on the same directory see the same data and
/// the same installation id.
pub struct Store {
    dir: PathBuf,
    conn: Mutex<Connection>,
    installation: InstallationId,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("dir", &self.dir).finish()
    }
}

impl Store {
    /// Open or create a store in the given directory and run migrations
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let conn = Connection::open(dir.join(DATABASE_FILE))?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;
        super::schema::run_migrations(&conn)?;

        tracing::debug!(dir = %dir.display(), "Opened store");

        Ok(Self {
            installation: InstallationId::new(dir.join(INSTALLATION_FILE)),
            dir,
            conn: Mutex::new(conn),
        })
    }

    /// Returns the store directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path of the installation id file
    pub fn installation_path(&self) -> &Path {
        self.installation.path()
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ============================================
    // Counter operations
    // ============================================

    /// Get a single stored entry
    pub fn get_value(&self, key: &str) -> Result<Option<StoredValue>> {
        let conn = self.conn();
        let value = conn
            .query_row(
                "SELECT key, kind, value FROM counters WHERE key = ?1",
                [key],
                Self::row_to_entry,
            )
            .optional()?;
        Ok(value.map(|(_, value)| value))
    }

    /// Add `delta` to an integer counter, treating a missing key as zero.
    /// Arithmetic wraps on overflow, so subtracting `delta` again always
    /// restores the previous value.
    ///
    /// Returns the new value.
    pub fn add_int(&self, key: &str, delta: i64) -> Result<i64> {
        let updated = self.update_counter(key, ValueKind::Int, |current| match current {
            Some(StoredValue::Int(v)) => StoredValue::Int(v.wrapping_add(delta)),
            _ => StoredValue::Int(delta),
        })?;
        match updated {
            StoredValue::Int(v) => Ok(v),
            other => Err(mismatch(key, other.kind(), ValueKind::Int)),
        }
    }

    /// Add `delta` to a float counter, treating a missing key as zero.
    ///
    /// Returns the new value.
    pub fn add_float(&self, key: &str, delta: f64) -> Result<f64> {
        if !delta.is_finite() {
            return Err(Error::InvalidValue(format!(
                "float delta for {:?} must be finite, got {}",
                key, delta
            )));
        }
        let updated = self.update_counter(key, ValueKind::Float, |current| match current {
            Some(StoredValue::Float(v)) => StoredValue::Float(v + delta),
            _ => StoredValue::Float(delta),
        })?;
        match updated {
            StoredValue::Float(v) => Ok(v),
            other => Err(mismatch(key, other.kind(), ValueKind::Float)),
        }
    }

    /// Store a value, replacing any previous value of the same kind
    pub fn set_value(&self, key: &str, value: StoredValue) -> Result<()> {
        let kind = value.kind();
        self.update_counter(key, kind, move |_| value)?;
        Ok(())
    }

    /// Read-modify-write a single key inside an immediate transaction.
    ///
    /// Fails with [`Error::TypeMismatch`] if the key already holds a value of
    /// another kind; the stored value is left untouched in that case.
    fn update_counter<F>(&self, key: &str, kind: ValueKind, apply: F) -> Result<StoredValue>
    where
        F: FnOnce(Option<StoredValue>) -> StoredValue,
    {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = tx
            .query_row(
                "SELECT key, kind, value FROM counters WHERE key = ?1",
                [key],
                Self::row_to_entry,
            )
            .optional()?
            .map(|(_, value)| value);

        if let Some(stored) = &current {
            if stored.kind() != kind {
                return Err(mismatch(key, stored.kind(), kind));
            }
        }

        let updated = apply(current);
        tx.execute(
            r#"
            INSERT INTO counters (key, kind, value, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![
                key,
                kind.as_str(),
                to_sql_value(&updated),
                Utc::now().to_rfc3339()
            ],
        )?;
        tx.commit()?;

        Ok(updated)
    }

    /// All stored entries, ordered by key
    pub fn all_values(&self) -> Result<Vec<(String, StoredValue)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT key, kind, value FROM counters ORDER BY key")?;
        let rows = stmt
            .query_map([], Self::row_to_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn row_to_entry(row: &Row) -> rusqlite::Result<(String, StoredValue)> {
        let key: String = row.get(0)?;
        let kind_str: String = row.get(1)?;
        let kind = kind_str.parse::<ValueKind>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, Type::Text, e.into())
        })?;

        let value = match kind {
            ValueKind::Int => StoredValue::Int(row.get(2)?),
            ValueKind::Float => StoredValue::Float(row.get(2)?),
            ValueKind::Bool => StoredValue::Bool(row.get(2)?),
            ValueKind::Text => StoredValue::Text(row.get(2)?),
        };
        Ok((key, value))
    }

    // ============================================
    // Settings operations
    // ============================================

    /// Get a setting value
    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn();
        let value = conn
            .query_row("SELECT value FROM settings WHERE key = ?1", [key], |r| {
                r.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Insert or replace a setting value
    pub fn put_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            r#"
            INSERT INTO settings (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Insert a setting only if the key has no value yet.
    ///
    /// Returns true if the value was written.
    pub fn put_setting_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        let conn = self.conn();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(changed == 1)
    }

    // ============================================
    // Durability and identity
    // ============================================

    /// Flush the write-ahead log into the main database file
    pub fn checkpoint(&self) -> Result<()> {
        let conn = self.conn();
        conn.query_row("PRAGMA wal_checkpoint(FULL)", [], |_| Ok(()))?;
        Ok(())
    }

    /// Installation id for this store directory, created on first access
    pub fn installation_id(&self) -> Result<String> {
        self.installation.get()
    }
}

fn to_sql_value(value: &StoredValue) -> Value {
    match value {
        StoredValue::Int(v) => Value::Integer(*v),
        StoredValue::Float(v) => Value::Real(*v),
        StoredValue::Bool(v) => Value::Integer(i64::from(*v)),
        StoredValue::Text(v) => Value::Text(v.clone()),
    }
}

fn mismatch(key: &str, stored: ValueKind, requested: ValueKind) -> Error {
    Error::TypeMismatch {
        key: key.to_string(),
        stored,
        requested,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_add_int_defaults_to_zero() {
        let (_dir, store) = open_store();
        assert_eq!(store.add_int("launches", 1).unwrap(), 1);
        assert_eq!(store.add_int("launches", 4).unwrap(), 5);
        assert_eq!(store.get_value("launches").unwrap(), Some(StoredValue::Int(5)));
    }

    #[test]
    fn test_add_int_wraps_and_restores() {
        let (_dir, store) = open_store();
        store.add_int("big", i64::MAX - 1).unwrap();
        assert_eq!(store.add_int("big", 5).unwrap(), i64::MIN + 3);
        assert_eq!(store.add_int("big", -5).unwrap(), i64::MAX - 1);
    }

    #[test]
    fn test_add_float() {
        let (_dir, store) = open_store();
        assert_eq!(store.add_float("ratio", 0.5).unwrap(), 0.5);
        assert_eq!(store.add_float("ratio", 0.25).unwrap(), 0.75);
    }

    #[test]
    fn test_add_float_rejects_non_finite() {
        let (_dir, store) = open_store();
        store.add_float("ratio", 0.5).unwrap();

        for delta in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = store.add_float("ratio", delta).unwrap_err();
            assert!(matches!(err, Error::InvalidValue(_)));
        }
        assert_eq!(store.get_value("ratio").unwrap(), Some(StoredValue::Float(0.5)));
    }

    #[test]
    fn test_kind_is_fixed_per_key() {
        let (_dir, store) = open_store();
        store.add_int("x", 3).unwrap();

        let err = store.add_float("x", 1.0).unwrap_err();
        assert!(matches!(
            err,
            Error::TypeMismatch {
                stored: ValueKind::Int,
                requested: ValueKind::Float,
                ..
            }
        ));
        assert!(store
            .set_value("x", StoredValue::Text("three".into()))
            .is_err());
        assert_eq!(store.get_value("x").unwrap(), Some(StoredValue::Int(3)));
    }

    #[test]
    fn test_all_values_sorted_and_typed() {
        let (_dir, store) = open_store();
        store.set_value("b", StoredValue::Bool(true)).unwrap();
        store.set_value("a", StoredValue::Text("hello".into())).unwrap();
        store.add_float("c", 1.5).unwrap();

        let all = store.all_values().unwrap();
        assert_eq!(
            all,
            vec![
                ("a".to_string(), StoredValue::Text("hello".into())),
                ("b".to_string(), StoredValue::Bool(true)),
                ("c".to_string(), StoredValue::Float(1.5)),
            ]
        );
    }

    #[test]
    fn test_settings_set_once() {
        let (_dir, store) = open_store();
        assert!(store.put_setting_if_absent("url", "https://a").unwrap());
        assert!(!store.put_setting_if_absent("url", "https://b").unwrap());
        assert_eq!(store.get_setting("url").unwrap().as_deref(), Some("https://a"));

        store.put_setting("url", "https://c").unwrap();
        assert_eq!(store.get_setting("url").unwrap().as_deref(), Some("https://c"));
    }

    #[test]
    fn test_settings_separate_from_counters() {
        let (_dir, store) = open_store();
        store.put_setting("flag", "true").unwrap();
        assert!(store.all_values().unwrap().is_empty());
    }

    #[test]
    fn test_data_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = Store::open(dir.path()).unwrap();
            store.add_int("opens", 2).unwrap();
            store.checkpoint().unwrap();
        }
        let store = Store::open(dir.path()).unwrap();
        assert_eq!(store.get_value("opens").unwrap(), Some(StoredValue::Int(2)));
    }
}
