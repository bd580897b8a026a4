//! Pending résumé snapshot operations.
//!
//! At most one snapshot exists, stored under [`RESUME_SNAPSHOT_ID`]. Writes are
//! last-write-wins; each write takes a fresh revision from a store-wide counter
//! so a sync cycle can clear exactly the snapshot it uploaded.

use super::connection::StoreDb;
use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// Fixed key of the singleton snapshot row.
pub const RESUME_SNAPSHOT_ID: &str = "current-resume";

const REVISION_COUNTER: &str = "resume_revision";

/// The pending résumé snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeSnapshot {
    pub id: String,
    pub payload: serde_json::Value,
    pub captured_at: DateTime<Utc>,
    pub revision: i64,
}

impl StoreDb {
    /// Overwrite the singleton snapshot with `payload`.
    ///
    /// Returns the stored snapshot.
    pub async fn put_resume_snapshot(&self, payload: &serde_json::Value) -> Result<ResumeSnapshot, Error> {
        let payload_json = serde_json::to_string(payload)?;
        let payload = payload.clone();
        let captured_at = Utc::now();
        self.conn
            .call(move |conn| -> Result<ResumeSnapshot, Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO counters (name, value) VALUES (?1, 1)
                     ON CONFLICT(name) DO UPDATE SET value = value + 1",
                    params![REVISION_COUNTER],
                )?;
                let revision: i64 =
                    tx.query_row("SELECT value FROM counters WHERE name = ?1", params![REVISION_COUNTER], |row| {
                        row.get(0)
                    })?;
                tx.execute(
                    "INSERT INTO resumes (id, payload_json, captured_at, revision) VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(id) DO UPDATE SET
                        payload_json = excluded.payload_json,
                        captured_at = excluded.captured_at,
                        revision = excluded.revision",
                    params![RESUME_SNAPSHOT_ID, payload_json, captured_at.to_rfc3339(), revision],
                )?;
                tx.commit()?;

                Ok(ResumeSnapshot { id: RESUME_SNAPSHOT_ID.to_string(), payload, captured_at, revision })
            })
            .await
            .map_err(Error::from)
    }

    /// Get the pending snapshot, if any.
    pub async fn get_resume_snapshot(&self) -> Result<Option<ResumeSnapshot>, Error> {
        self.conn
            .call(|conn| -> Result<Option<ResumeSnapshot>, Error> {
                let result = conn.query_row(
                    "SELECT payload_json, captured_at, revision FROM resumes WHERE id = ?1",
                    params![RESUME_SNAPSHOT_ID],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?)),
                );

                match result {
                    Ok((payload_json, captured_at, revision)) => {
                        let captured_at = DateTime::parse_from_rfc3339(&captured_at)
                            .map_err(|e| Error::InvalidPayload(format!("captured_at: {e}")))?
                            .with_timezone(&Utc);
                        Ok(Some(ResumeSnapshot {
                            id: RESUME_SNAPSHOT_ID.to_string(),
                            payload: serde_json::from_str(&payload_json)?,
                            captured_at,
                            revision,
                        }))
                    }
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Remove the pending snapshot. No-op if absent.
    pub async fn clear_resume_snapshot(&self) -> Result<(), Error> {
        self.conn
            .call(|conn| -> Result<(), Error> {
                conn.execute("DELETE FROM resumes WHERE id = ?1", params![RESUME_SNAPSHOT_ID])?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Remove the pending snapshot only if it still carries `revision`.
    ///
    /// Returns false when a newer snapshot replaced it (or it is gone).
    pub async fn clear_resume_snapshot_revision(&self, revision: i64) -> Result<bool, Error> {
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute(
                    "DELETE FROM resumes WHERE id = ?1 AND revision = ?2",
                    params![RESUME_SNAPSHOT_ID, revision],
                )?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }
}
