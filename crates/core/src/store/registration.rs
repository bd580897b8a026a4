//! The persisted record of which release is active.
//!
//! Written when activation completes and read at startup, so a restarted
//! worker serves the release it last activated rather than whatever
//! generation happens to exist in the store.

use super::connection::StoreDb;
use crate::Error;
use crate::config::ReleaseConfig;
use chrono::Utc;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

impl StoreDb {
    /// Record `release` as the active release, replacing any previous one.
    pub async fn set_active_release(&self, release: &ReleaseConfig) -> Result<(), Error> {
        let cache_name = release.cache_name.clone();
        let release_json = serde_json::to_string(release)?;
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO active_release (slot, cache_name, release_json, activated_at) VALUES (1, ?1, ?2, ?3)
                     ON CONFLICT(slot) DO UPDATE SET
                        cache_name = excluded.cache_name,
                        release_json = excluded.release_json,
                        activated_at = excluded.activated_at",
                    params![cache_name, release_json, Utc::now().to_rfc3339()],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// The last activated release, if its generation still exists.
    pub async fn active_release(&self) -> Result<Option<ReleaseConfig>, Error> {
        self.conn
            .call(|conn| -> Result<Option<ReleaseConfig>, Error> {
                let result = conn.query_row(
                    "SELECT r.release_json FROM active_release r
                     JOIN asset_caches c ON c.name = r.cache_name
                     WHERE r.slot = 1",
                    [],
                    |row| row.get::<_, String>(0),
                );

                match result {
                    Ok(release_json) => Ok(Some(serde_json::from_str(&release_json)?)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }
}
