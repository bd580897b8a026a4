//! Asset cache generation operations.
//!
//! A cache generation is a named set of stored responses (`careerboost-v1.0.0`).
//! Entries belong to exactly one generation and are removed with it.

use super::connection::StoreDb;
use crate::Error;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A stored response for one request key within a cache generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedAsset {
    pub request_key: String,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub stored_at: String,
}

impl StoreDb {
    /// Create a cache generation if it doesn't exist yet.
    pub async fn open_cache(&self, cache_name: &str) -> Result<(), Error> {
        let cache_name = cache_name.to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO asset_caches (name, created_at) VALUES (?1, ?2)
                     ON CONFLICT(name) DO NOTHING",
                    params![cache_name, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// List the names of every cache generation, oldest first.
    pub async fn cache_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM asset_caches ORDER BY created_at ASC, name ASC")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or replace the stored response for a request key.
    ///
    /// Opens the generation implicitly so a put never fails on a missing cache.
    pub async fn put_asset(&self, cache_name: &str, asset: &CachedAsset) -> Result<(), Error> {
        let cache_name = cache_name.to_string();
        let asset = asset.clone();
        let headers_json = serde_json::to_string(&asset.headers)?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO asset_caches (name, created_at) VALUES (?1, ?2)
                     ON CONFLICT(name) DO NOTHING",
                    params![cache_name, now],
                )?;
                tx.execute(
                    "INSERT INTO asset_entries (
                        cache_name, request_key, method, url, status, headers_json, body, stored_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    ON CONFLICT(cache_name, request_key) DO UPDATE SET
                        method = excluded.method,
                        url = excluded.url,
                        status = excluded.status,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        stored_at = excluded.stored_at",
                    params![
                        &cache_name,
                        &asset.request_key,
                        &asset.method,
                        &asset.url,
                        asset.status as i64,
                        &headers_json,
                        &asset.body,
                        &asset.stored_at,
                    ],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Look up a stored response by request key in one generation.
    ///
    /// Returns None on a miss, including when the generation doesn't exist.
    pub async fn match_asset(&self, cache_name: &str, request_key: &str) -> Result<Option<CachedAsset>, Error> {
        let cache_name = cache_name.to_string();
        let request_key = request_key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<CachedAsset>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT request_key, method, url, status, headers_json, body, stored_at
                     FROM asset_entries WHERE cache_name = ?1 AND request_key = ?2",
                )?;

                let result = stmt.query_row(params![cache_name, request_key], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Vec<u8>>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                });

                match result {
                    Ok((request_key, method, url, status, headers_json, body, stored_at)) => Ok(Some(CachedAsset {
                        request_key,
                        method,
                        url,
                        status: u16::try_from(status)
                            .map_err(|_| Error::InvalidPayload(format!("stored status {status} out of range")))?,
                        headers: serde_json::from_str(&headers_json)?,
                        body,
                        stored_at,
                    })),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Count the entries stored in one generation.
    pub async fn asset_count(&self, cache_name: &str) -> Result<u64, Error> {
        let cache_name = cache_name.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM asset_entries WHERE cache_name = ?1",
                    params![cache_name],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every cache generation except `live`, with all their entries.
    ///
    /// Returns the names of the deleted generations. Running it again with the
    /// same name deletes nothing.
    pub async fn delete_caches_except(&self, live: &str) -> Result<Vec<String>, Error> {
        let live = live.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let tx = conn.transaction()?;
                let stale = {
                    let mut stmt = tx.prepare("SELECT name FROM asset_caches WHERE name != ?1 ORDER BY name")?;
                    let names = stmt
                        .query_map(params![live], |row| row.get(0))?
                        .collect::<Result<Vec<String>, _>>()?;
                    names
                };
                tx.execute("DELETE FROM asset_caches WHERE name != ?1", params![live])?;
                tx.commit()?;
                Ok(stale)
            })
            .await
            .map_err(Error::from)
    }
}
