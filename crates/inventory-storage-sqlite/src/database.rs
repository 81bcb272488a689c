//! Database connection and initialization

use crate::migrations::{self, MigrationOutcome};
use crate::{encryption::EncryptionKey, Error, Result};
use rusqlite::{Connection, OpenFlags};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Database connection wrapper
pub struct Database {
    conn: Connection,
    path: Option<PathBuf>,
    outcome: MigrationOutcome,
}

impl Database {
    /// Open (or create) the item database.
    ///
    /// With a key the file is opened through SQLCipher. A file that cannot be
    /// read with the supplied key, or that records another schema version, is
    /// discarded and recreated empty.
    pub fn open<P: AsRef<Path>>(path: P, key: Option<&EncryptionKey>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut conn = connect(&path, key)?;
        if !is_readable(&conn) {
            drop(conn);
            tracing::warn!(
                path = %path.display(),
                "Item database cannot be read with the current key, recreating it"
            );
            remove_database_files(&path)?;
            conn = connect(&path, key)?;
            if !is_readable(&conn) {
                return Err(Error::StoreInit(format!(
                    "cannot open item database at {}",
                    path.display()
                )));
            }
        }

        let outcome = migrations::run_migrations(&conn)
            .map_err(|e| Error::StoreInit(format!("schema setup failed: {}", e)))?;
        tracing::info!(
            path = %path.display(),
            encrypted = key.is_some(),
            ?outcome,
            "Opened item database"
        );

        Ok(Self {
            conn,
            path: Some(path),
            outcome,
        })
    }

    /// Open an unencrypted in-memory database (tests and dry runs)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let outcome = migrations::run_migrations(&conn)?;
        Ok(Self {
            conn,
            path: None,
            outcome,
        })
    }

    /// Get connection
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// On-disk location, `None` for in-memory databases
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// What happened to the schema when this handle was opened
    pub fn migration_outcome(&self) -> MigrationOutcome {
        self.outcome
    }
}

fn connect(path: &Path, key: Option<&EncryptionKey>) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;

    if let Some(key) = key {
        // PRAGMA key must be the first statement on the connection.
        let literal = key.pragma_literal();
        let pragma = zeroize::Zeroizing::new(format!("PRAGMA key = {};", literal.as_str()));
        match conn.execute(pragma.as_str(), []) {
            Ok(_) | Err(rusqlite::Error::ExecuteReturnedResults) => {}
            Err(e) => {
                return Err(Error::Encryption(format!(
                    "Failed to set database encryption key: {}",
                    e
                )))
            }
        }

        let cipher_version: Option<String> = conn
            .query_row("PRAGMA cipher_version", [], |row| row.get(0))
            .ok();
        match cipher_version {
            Some(version) if !version.is_empty() => {
                tracing::debug!("SQLCipher version: {}", version);
            }
            _ => {
                return Err(Error::Encryption(
                    "SQLCipher is not available, refusing to open database unencrypted".to_string(),
                ))
            }
        }
    }

    Ok(conn)
}

fn is_readable(conn: &Connection) -> bool {
    let readable = conn
        .query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
        .is_ok();
    readable && conn.execute_batch("PRAGMA journal_mode=WAL;").is_ok()
}

fn remove_database_files(path: &Path) -> Result<()> {
    for suffix in ["", "-wal", "-shm"] {
        let mut name = OsString::from(path.as_os_str());
        name.push(suffix);
        match std::fs::remove_file(PathBuf::from(name)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::MasterKey;

    fn key() -> EncryptionKey {
        EncryptionKey::for_item_database(&MasterKey::generate()).unwrap()
    }

    #[test]
    fn test_open_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("stock.db"), Some(&key())).unwrap();
        assert_eq!(db.migration_outcome(), MigrationOutcome::Created);
    }

    #[test]
    fn test_sqlcipher_verification() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("stock.db"), Some(&key())).unwrap();

        let version: String = db
            .conn()
            .query_row("PRAGMA cipher_version", [], |row| row.get(0))
            .unwrap();
        assert!(!version.is_empty(), "SQLCipher version should be non-empty");
    }

    #[test]
    fn test_reopen_with_same_key_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stock.db");
        let key = key();

        let db = Database::open(&path, Some(&key)).unwrap();
        db.conn()
            .execute("INSERT INTO Item (name, price, quantity) VALUES ('Gear', 3.5, 2)", [])
            .unwrap();
        drop(db);

        let db = Database::open(&path, Some(&key)).unwrap();
        assert_eq!(db.migration_outcome(), MigrationOutcome::UpToDate);
        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM Item", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_wrong_key_recreates_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stock.db");

        let db = Database::open(&path, Some(&key())).unwrap();
        db.conn()
            .execute("INSERT INTO Item (name, price, quantity) VALUES ('Gear', 3.5, 2)", [])
            .unwrap();
        drop(db);

        let db = Database::open(&path, Some(&key())).unwrap();
        assert_eq!(db.migration_outcome(), MigrationOutcome::Created);
        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM Item", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_database_file_is_encrypted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stock.db");

        let db = Database::open(&path, Some(&key())).unwrap();
        db.conn()
            .execute(
                "INSERT INTO Item (name, price, quantity) VALUES ('sensitive widget', 1.0, 1)",
                [],
            )
            .unwrap();
        db.conn().execute_batch("PRAGMA wal_checkpoint(TRUNCATE);").unwrap();
        drop(db);

        let contents = std::fs::read(&path).unwrap();
        let text = String::from_utf8_lossy(&contents);
        assert!(!text.contains("sensitive widget"));
        assert!(!text.contains("SQLite format 3"));
    }

    #[test]
    fn test_plain_database_without_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stock.db");
        drop(Database::open(&path, None).unwrap());

        let contents = std::fs::read(&path).unwrap();
        assert!(contents.starts_with(b"SQLite format 3"));
    }
}
