//! Database schema and the destructive migration policy
//!
//! There is no upgrade path between schema versions. A store whose recorded
//! version differs from [`SCHEMA_VERSION`] (older or newer) is wiped and
//! recreated; every item it held is lost.

use crate::Result;
use rusqlite::Connection;

/// Compiled schema version. Bump on any change to the `Item` table shape.
pub const SCHEMA_VERSION: i32 = 4;

/// What [`run_migrations`] did to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Empty store; schema created
    Created,
    /// Schema already at [`SCHEMA_VERSION`]
    UpToDate,
    /// Store held a different version and was recreated without its data
    Recreated {
        /// Version found on disk
        from: i32,
    },
}

/// Bring the schema to [`SCHEMA_VERSION`], destroying data on mismatch
pub fn run_migrations(conn: &Connection) -> Result<MigrationOutcome> {
    let current_version = get_schema_version(conn)?;

    tracing::debug!(
        "Running migrations: current_version={}, target_version={}",
        current_version,
        SCHEMA_VERSION
    );

    let outcome = match current_version {
        v if v == SCHEMA_VERSION => return Ok(MigrationOutcome::UpToDate),
        0 if !table_exists(conn, "Item")? => MigrationOutcome::Created,
        from => {
            tracing::warn!(
                from,
                to = SCHEMA_VERSION,
                "Schema version mismatch, recreating item store (existing items are discarded)"
            );
            drop_all(conn)?;
            MigrationOutcome::Recreated { from }
        }
    };

    create_schema(conn)?;
    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(outcome)
}

/// Version recorded in `schema_version`, or 0 when none is recorded
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    if !table_exists(conn, "schema_version")? {
        return Ok(0);
    }

    let version: Option<i32> = conn.query_row(
        "SELECT MAX(version) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version.unwrap_or(0))
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        [name],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY);
         DELETE FROM schema_version;",
    )?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    tracing::debug!("Recorded schema version {}", version);
    Ok(())
}

fn drop_all(conn: &Connection) -> Result<()> {
    let tables: Vec<String> = {
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        )?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<std::result::Result<_, _>>()?
    };

    for table in tables {
        conn.execute_batch(&format!("DROP TABLE IF EXISTS \"{}\";", table.replace('"', "\"\"")))?;
    }
    Ok(())
}

fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS Item (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL CHECK (length(name) > 0),
            price REAL NOT NULL CHECK (price >= 0),
            quantity INTEGER NOT NULL CHECK (quantity >= 0),
            supplier_name TEXT NOT NULL DEFAULT '',
            supplier_email TEXT NOT NULL DEFAULT '',
            supplier_phone TEXT NOT NULL DEFAULT ''
        );

        CREATE INDEX IF NOT EXISTS idx_item_name ON Item(name);
        "#,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_store_is_created() {
        let conn = Connection::open_in_memory().unwrap();

        assert_eq!(run_migrations(&conn).unwrap(), MigrationOutcome::Created);
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_migration_idempotency() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO Item (name, price, quantity) VALUES ('Bolt', 0.5, 10)",
            [],
        )
        .unwrap();

        assert_eq!(run_migrations(&conn).unwrap(), MigrationOutcome::UpToDate);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM Item", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_unversioned_item_table_is_recreated() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE Item (id INTEGER PRIMARY KEY, label TEXT);")
            .unwrap();

        assert_eq!(
            run_migrations(&conn).unwrap(),
            MigrationOutcome::Recreated { from: 0 }
        );
    }

    #[test]
    fn test_previous_plural_table_is_dropped() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT);
             CREATE TABLE schema_version (version INTEGER PRIMARY KEY);
             INSERT INTO schema_version (version) VALUES (3);",
        )
        .unwrap();

        assert_eq!(
            run_migrations(&conn).unwrap(),
            MigrationOutcome::Recreated { from: 3 }
        );
        assert!(table_exists(&conn, "Item").unwrap());
        assert!(!table_exists(&conn, "items").unwrap());
    }
}
