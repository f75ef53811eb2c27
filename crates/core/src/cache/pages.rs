//! SQLite storage for rendered pages and the index of cached keys.

use chrono::{Duration, Utc};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use crate::Error;
use crate::db::Db;

impl Db {
    /// Get a cached page body by key.
    ///
    /// Returns None if the key doesn't exist or has expired.
    pub async fn get_page(&self, key: &str) -> Result<Option<String>, Error> {
        let key = key.to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<Option<String>, Error> {
                let result = conn.query_row(
                    "SELECT body FROM page_cache WHERE key = ?1 AND expires_at > ?2",
                    params![key, now],
                    |row| row.get(0),
                );

                match result {
                    Ok(body) => Ok(Some(body)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or replace a cached page.
    pub async fn put_page(&self, key: &str, body: &str, ttl_seconds: i64) -> Result<(), Error> {
        let key = key.to_string();
        let body = body.to_string();

        let stored_at = Utc::now().to_rfc3339();
        let expires_at = (Utc::now() + Duration::seconds(ttl_seconds)).to_rfc3339();

        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO page_cache (key, body, stored_at, expires_at)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(key) DO UPDATE SET
                        body = excluded.body,
                        stored_at = excluded.stored_at,
                        expires_at = excluded.expires_at",
                    params![key, body, stored_at, expires_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Add a key to the page index if it isn't there yet.
    pub async fn index_page(&self, key: &str) -> Result<(), Error> {
        let key = key.to_string();
        let added_at = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO page_index (key, added_at) VALUES (?1, ?2)",
                    params![key, added_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// All indexed keys, oldest first.
    pub async fn indexed_pages(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT key FROM page_index ORDER BY added_at ASC, key ASC")?;
                let keys = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete the given pages and drop them from the index.
    ///
    /// Returns the number of cached pages deleted.
    pub async fn delete_pages(&self, keys: Vec<String>) -> Result<u64, Error> {
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let tx = conn.transaction()?;
                let mut deleted = 0u64;
                for key in &keys {
                    deleted += tx.execute("DELETE FROM page_cache WHERE key = ?1", params![key])? as u64;
                    tx.execute("DELETE FROM page_index WHERE key = ?1", params![key])?;
                }
                tx.commit()?;
                Ok(deleted)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete expired pages.
    ///
    /// Index entries are left in place; the index may name expired keys.
    pub async fn purge_expired_pages(&self) -> Result<u64, Error> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM page_cache WHERE expires_at <= ?1", params![now])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_get_page() {
        let db = Db::open_in_memory().await.unwrap();
        db.put_page("/", "<html>listing</html>", 3600).await.unwrap();

        assert_eq!(db.get_page("/").await.unwrap().as_deref(), Some("<html>listing</html>"));
    }

    #[tokio::test]
    async fn test_get_missing_page() {
        let db = Db::open_in_memory().await.unwrap();
        assert!(db.get_page("/nothing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_page_replaces() {
        let db = Db::open_in_memory().await.unwrap();
        db.put_page("/", "old", 3600).await.unwrap();
        db.put_page("/", "new", 3600).await.unwrap();

        assert_eq!(db.get_page("/").await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_expired_page_is_a_miss() {
        let db = Db::open_in_memory().await.unwrap();
        db.put_page("/stale", "body", 1).await.unwrap();
        db.put_page("/fresh", "body", 3600).await.unwrap();

        tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;

        assert!(db.get_page("/stale").await.unwrap().is_none());
        assert_eq!(db.purge_expired_pages().await.unwrap(), 1);
        assert!(db.get_page("/fresh").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_index_is_deduplicated() {
        let db = Db::open_in_memory().await.unwrap();
        db.index_page("/").await.unwrap();
        db.index_page("/add").await.unwrap();
        db.index_page("/").await.unwrap();

        let keys = db.indexed_pages().await.unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&"/".to_string()));
        assert!(keys.contains(&"/add".to_string()));
    }

    #[tokio::test]
    async fn test_delete_pages() {
        let db = Db::open_in_memory().await.unwrap();
        for key in ["/", "/add"] {
            db.put_page(key, "body", 3600).await.unwrap();
            db.index_page(key).await.unwrap();
        }

        let deleted = db.delete_pages(vec!["/".into(), "/add".into(), "/gone".into()]).await.unwrap();
        assert_eq!(deleted, 2);
        assert!(db.indexed_pages().await.unwrap().is_empty());
        assert!(db.get_page("/").await.unwrap().is_none());
    }
}
