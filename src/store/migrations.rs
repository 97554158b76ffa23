//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.
//! A legacy `conversation_state` table (one row per phone and flow, no
//! `line` column) is carried over into the V1 schema on first run.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "flow_state",
        sql: r#"
            CREATE TABLE IF NOT EXISTS conversation_state (
                phone TEXT NOT NULL,
                line TEXT NOT NULL,
                flow TEXT NOT NULL,
                step TEXT NOT NULL,
                data TEXT NOT NULL DEFAULT '{}',
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (phone, line)
            );
            CREATE INDEX IF NOT EXISTS idx_conversation_state_flow ON conversation_state(flow);
        "#,
    },
    Migration {
        version: 2,
        name: "users",
        sql: r#"
            CREATE TABLE IF NOT EXISTS users (
                phone TEXT PRIMARY KEY,
                name TEXT,
                prison_id TEXT,
                affiliate_code TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_users_affiliate ON users(affiliate_code);
        "#,
    },
    Migration {
        version: 3,
        name: "user_preferences",
        sql: r#"
            CREATE TABLE IF NOT EXISTS user_preferences (
                phone TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (phone, key)
            );
        "#,
    },
];

/// Run all pending migrations against the given connection.
///
/// Creates the `_migrations` table if it doesn't exist.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    // Legacy table has the same name as the V1 table; move it aside first.
    let import_legacy = current_version == 0 && legacy_state_table_exists(conn).await?;
    if import_legacy {
        conn.execute(
            "ALTER TABLE conversation_state RENAME TO conversation_state_legacy",
            (),
        )
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to rename legacy state table: {e}")))?;
        tracing::info!("Legacy conversation_state table detected, importing rows");
    }

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    if import_legacy {
        conn.execute_batch(
            "INSERT OR REPLACE INTO conversation_state (phone, line, flow, step, data, updated_at)
                SELECT phone, 'normal', flow, step, COALESCE(data, '{}'), updated_at
                FROM conversation_state_legacy
                ORDER BY updated_at;
            DROP TABLE conversation_state_legacy;",
        )
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to import legacy state rows: {e}")))?;
    }

    tracing::info!(
        "Database migrations complete (at V{})",
        get_current_version(conn).await?
    );

    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => {
            let version: i64 = row.get(0).map_err(|e| {
                DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
            })?;
            Ok(version)
        }
        None => Ok(0),
    }
}

/// A `conversation_state` table without a `line` column predates V1.
async fn legacy_state_table_exists(conn: &Connection) -> Result<bool, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT
                (SELECT COUNT(*) FROM sqlite_master
                    WHERE type='table' AND name='conversation_state'),
                (SELECT COUNT(*) FROM pragma_table_info('conversation_state')
                    WHERE name='line')",
            (),
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("Failed to check legacy tables: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Query(format!("Failed to read legacy check: {e}")))?;

    match row {
        Some(row) => {
            let tables: i64 = row.get(0).unwrap_or(0);
            let line_columns: i64 = row.get(1).unwrap_or(0);
            Ok(tables > 0 && line_columns == 0)
        }
        None => Ok(false),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}
