//! Schema migrations for the durable store.
//!
//! Applied versions are recorded in `_migrations`. Each pending migration
//! runs in its own transaction together with its version row, so a failed
//! batch leaves the schema at the previous version.

use super::Error;
use tokio_rusqlite::{Connection, params};

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// Ordered by version. Versions are never reused.
const MIGRATIONS: &[Migration] = &[
    Migration { version: 1, name: "asset_cache", sql: include_str!("../../migrations/001_asset_cache.sql") },
    Migration { version: 2, name: "sync_queue", sql: include_str!("../../migrations/002_sync_queue.sql") },
    Migration { version: 3, name: "registration", sql: include_str!("../../migrations/003_registration.sql") },
];

fn latest_version() -> i64 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Bring the schema up to the latest version.
///
/// Refuses to open a store written by a newer build.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            )",
        )?;

        let current: i64 = conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))?;
        if current > latest_version() {
            return Err(Error::MigrationFailed(format!(
                "store is at schema version {current}, this build knows up to {}",
                latest_version()
            )));
        }

        for migration in MIGRATIONS.iter().filter(|migration| migration.version > current) {
            let tx = conn.transaction()?;
            tx.execute_batch(migration.sql)
                .map_err(|e| Error::MigrationFailed(format!("{} ({}): {e}", migration.version, migration.name)))?;
            tx.execute(
                "INSERT INTO _migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
                params![migration.version, migration.name, chrono::Utc::now().to_rfc3339()],
            )?;
            tx.commit()?;
            tracing::debug!(version = migration.version, name = migration.name, "applied store migration");
        }

        Ok(())
    })
    .await
    .map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn applied(conn: &Connection) -> Vec<(i64, String)> {
        conn.call(|conn| {
            let mut stmt = conn.prepare("SELECT version, name FROM _migrations ORDER BY version")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?.collect::<Result<Vec<_>, _>>();
            rows
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_rerun_applies_nothing_new() {
        let conn = Connection::open_in_memory().await.unwrap();
        run(&conn).await.unwrap();
        run(&conn).await.unwrap();

        assert_eq!(applied(&conn).await, vec![
            (1, "asset_cache".to_string()),
            (2, "sync_queue".to_string()),
            (3, "registration".to_string())
        ]);
    }

    #[tokio::test]
    async fn test_newer_schema_is_refused() {
        let conn = Connection::open_in_memory().await.unwrap();
        run(&conn).await.unwrap();
        conn.call(|conn| {
            conn.execute("INSERT INTO _migrations (version, name, applied_at) VALUES (99, 'future', 'now')", [])
        })
        .await
        .unwrap();

        assert!(matches!(run(&conn).await, Err(Error::MigrationFailed(_))));
    }

    #[test]
    fn test_versions_strictly_increase() {
        assert!(MIGRATIONS.windows(2).all(|pair| pair[0].version < pair[1].version));
        assert_eq!(latest_version(), 3);
    }
}
