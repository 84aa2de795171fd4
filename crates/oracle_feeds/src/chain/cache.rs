//! SQLite cache of raw block JSON, keyed by chain, block number and detail level.

use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Raw `eth_getBlockByNumber` results. Values are stored undecoded so a later
/// change of decode mode applies to cached entries too. Each row carries the
/// SHA-256 of its body; a row that no longer matches is treated as a miss.
pub struct BlockCache {
    conn: Mutex<Connection>,
}

impl BlockCache {
    /// Open or create cache at `path`. Creates parent dirs if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS blocks (
                chain_id INTEGER NOT NULL,
                number INTEGER NOT NULL,
                full INTEGER NOT NULL,
                body TEXT NOT NULL,
                digest TEXT NOT NULL,
                created_utc INTEGER NOT NULL,
                PRIMARY KEY (chain_id, number, full)
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn digest(body: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(body.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn get(
        &self,
        chain_id: u64,
        number: u64,
        full: bool,
    ) -> Result<Option<String>, CacheError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        let mut stmt = conn.prepare(
            "SELECT body, digest FROM blocks WHERE chain_id = ?1 AND number = ?2 AND full = ?3",
        )?;
        let row = stmt
            .query_row(
                rusqlite::params![chain_id as i64, number as i64, full],
                |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)),
            )
            .optional()?;
        Ok(row.and_then(|(body, digest)| {
            if Self::digest(&body) == digest {
                Some(body)
            } else {
                warn!(chain_id, number, full, "cached block digest mismatch, ignoring");
                None
            }
        }))
    }

    pub fn set(
        &self,
        chain_id: u64,
        number: u64,
        full: bool,
        body: &str,
    ) -> Result<(), CacheError> {
        let created = time::OffsetDateTime::now_utc().unix_timestamp();
        let conn = self
            .conn
            .lock()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        conn.execute(
            "INSERT OR REPLACE INTO blocks (chain_id, number, full, body, digest, created_utc) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                chain_id as i64,
                number as i64,
                full,
                body,
                Self::digest(body),
                created
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn digest_deterministic() {
        let d1 = BlockCache::digest(r#"{"number":"0x1"}"#);
        let d2 = BlockCache::digest(r#"{"number":"0x1"}"#);
        assert_eq!(d1, d2);
        assert_eq!(d1.len(), 64);
    }

    #[test]
    fn detail_levels_are_separate_entries() {
        let tmp = NamedTempFile::new().unwrap();
        let cache = BlockCache::open(tmp.path()).unwrap();
        cache.set(1, 100, false, r#"{"n":"header"}"#).unwrap();
        assert_eq!(
            cache.get(1, 100, false).unwrap().as_deref(),
            Some(r#"{"n":"header"}"#)
        );
        assert!(cache.get(1, 100, true).unwrap().is_none());
        assert!(cache.get(137, 100, false).unwrap().is_none());
    }

    #[test]
    fn tampered_row_is_a_miss() {
        let tmp = NamedTempFile::new().unwrap();
        let cache = BlockCache::open(tmp.path()).unwrap();
        cache.set(1, 7, true, "{}").unwrap();
        {
            let conn = cache.conn.lock().unwrap();
            conn.execute("UPDATE blocks SET body = '{\"x\":1}'", [])
                .unwrap();
        }
        assert!(cache.get(1, 7, true).unwrap().is_none());
    }
}
