//! A durable `sqlx`-backed `Storage`, for production deployments that
//! need more than an in-process map. Grounded in the indexer's own
//! `PgPoolOptions`-based pool wrapper; unlike a purpose-built schema per
//! record type, this backend keeps the same flat key/value contract the
//! rest of the workspace is written against, storing rows in one table
//! keyed by the byte string `keys::*` builders already produce.

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use async_trait::async_trait;

use crate::{Storage, StorageError};

pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let storage = Self { pool };
        storage.migrate().await?;
        Ok(storage)
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS zkseq_kv (key BYTEA PRIMARY KEY, value BYTEA NOT NULL)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let row = sqlx::query("SELECT value FROM zkseq_kv WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(row.map(|r| r.get::<Vec<u8>, _>("value")))
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO zkseq_kv (key, value) VALUES ($1, $2) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM zkseq_kv WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        // Postgres has no native "starts with" over BYTEA short of a LIKE
        // pattern; build one that escapes the operand and matches on its
        // raw bytes followed by a wildcard.
        let rows = sqlx::query(
            "SELECT key, value FROM zkseq_kv WHERE key >= $1 AND key < $2 ORDER BY key",
        )
        .bind(prefix)
        .bind(prefix_upper_bound(prefix))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get::<Vec<u8>, _>("key"), row.get::<Vec<u8>, _>("value")))
            .collect())
    }
}

/// The smallest byte string that is strictly greater than every string
/// with `prefix` as a prefix: increment the last byte that isn't already
/// `0xff`, dropping everything after it. `None` (no upper bound, i.e. an
/// all-`0xff` prefix) is represented as a key one byte longer than any
/// real key could be, which never matches.
fn prefix_upper_bound(prefix: &[u8]) -> Vec<u8> {
    let mut bound = prefix.to_vec();
    for i in (0..bound.len()).rev() {
        if bound[i] != 0xff {
            bound[i] += 1;
            bound.truncate(i + 1);
            return bound;
        }
    }
    let mut max = vec![0xffu8; prefix.len() + 1];
    max.push(0xff);
    max
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_upper_bound_is_exclusive_and_tight() {
        assert_eq!(prefix_upper_bound(b"vote/1/"), b"vote/1\x30".to_vec());
        assert!(b"vote/1/a".as_slice() < prefix_upper_bound(b"vote/1/").as_slice());
        assert!(b"vote/2/a".as_slice() >= prefix_upper_bound(b"vote/1/").as_slice());
    }
}
