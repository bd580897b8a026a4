//! Pending job application queue operations.
//!
//! Identifiers come from SQLite `AUTOINCREMENT`, so they grow monotonically
//! and are never reused for the lifetime of the database file.

use super::connection::StoreDb;
use crate::Error;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;

/// A queued job application awaiting upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingApplication {
    pub id: i64,
    pub payload: serde_json::Value,
    pub enqueued_at: String,
}

impl StoreDb {
    /// Append an application to the queue, returning its assigned id.
    pub async fn enqueue_application(&self, payload: &serde_json::Value) -> Result<i64, Error> {
        let payload_json = serde_json::to_string(payload)?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<i64, Error> {
                conn.execute(
                    "INSERT INTO applications (payload_json, enqueued_at) VALUES (?1, ?2)",
                    params![payload_json, now],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(Error::from)
    }

    /// List queued applications in insertion order.
    pub async fn list_applications(&self) -> Result<Vec<PendingApplication>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<PendingApplication>, Error> {
                let mut stmt = conn.prepare("SELECT id, payload_json, enqueued_at FROM applications ORDER BY id ASC")?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                rows.into_iter()
                    .map(|(id, payload_json, enqueued_at)| -> Result<PendingApplication, Error> {
                        Ok(PendingApplication { id, payload: serde_json::from_str(&payload_json)?, enqueued_at })
                    })
                    .collect()
            })
            .await
            .map_err(Error::from)
    }

    /// Remove every queued application.
    ///
    /// Returns the number of deleted entries.
    pub async fn clear_applications(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM applications", [])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Remove queued applications with `id <= max_id`.
    ///
    /// Entries enqueued after a drain always carry larger ids, so this clears
    /// exactly the drained prefix. Returns the number of deleted entries.
    pub async fn clear_applications_through(&self, max_id: i64) -> Result<u64, Error> {
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM applications WHERE id <= ?1", params![max_id])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
