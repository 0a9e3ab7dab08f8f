//! Redb backend for the FaceFind blob store.
//!
//! Each [`Namespace`] maps to two tables: one holding the raw bytes and one
//! holding a small bincode-encoded [`BlobHeader`] (creation time and size).
//! `stat` and `list` only touch the header table, so metadata lookups never
//! read photo bytes. Both tables are written in the same transaction.
//! Redb calls are blocking, so every operation runs on the blocking pool.
//!
//! # Configuration Example
//! ```yaml
//! store:
//!   backend: "redb"
//!   path: "/data/facefind.redb"
//! ```

use crate::{BlobBackend, BlobMeta, Namespace, StoreError};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

type Table = TableDefinition<'static, &'static str, &'static [u8]>;

const PHOTOS_DATA: Table = TableDefinition::new("facefind_photos");
const PHOTOS_META: Table = TableDefinition::new("facefind_photos_meta");
const ENCODINGS_DATA: Table = TableDefinition::new("facefind_encodings");
const ENCODINGS_META: Table = TableDefinition::new("facefind_encodings_meta");

fn data_table(ns: Namespace) -> Table {
    match ns {
        Namespace::Photos => PHOTOS_DATA,
        Namespace::Encodings => ENCODINGS_DATA,
    }
}

fn meta_table(ns: Namespace) -> Table {
    match ns {
        Namespace::Photos => PHOTOS_META,
        Namespace::Encodings => ENCODINGS_META,
    }
}

/// Per-blob metadata, stored apart from the bytes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct BlobHeader {
    created_at_ms: i64,
    size: u64,
}

impl BlobHeader {
    fn meta(&self, key: &str) -> BlobMeta {
        BlobMeta {
            key: key.to_string(),
            size: self.size,
            created_at: Utc
                .timestamp_millis_opt(self.created_at_ms)
                .single()
                .unwrap_or_default(),
        }
    }
}

fn encode(header: &BlobHeader) -> Result<Vec<u8>, StoreError> {
    Ok(bincode::serde::encode_to_vec(
        header,
        bincode::config::standard(),
    )?)
}

fn decode(bytes: &[u8]) -> Result<BlobHeader, StoreError> {
    let (header, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
    Ok(header)
}

/// Redb backend implementation for persistent blob storage.
///
/// The `Arc<Database>` is cloned into each blocking task; redb handles its
/// own locking and MVCC.
pub struct RedbBackend {
    db: Arc<Database>,
}

impl RedbBackend {
    /// Open or create a Redb database at the given path, creating the data
    /// and header tables of both namespaces.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(StoreError::backend)?;

        let write_txn = db.begin_write().map_err(StoreError::backend)?;
        for ns in Namespace::ALL {
            write_txn.open_table(data_table(ns)).map_err(StoreError::backend)?;
            write_txn.open_table(meta_table(ns)).map_err(StoreError::backend)?;
        }
        write_txn.commit().map_err(StoreError::backend)?;

        Ok(Self { db: Arc::new(db) })
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| StoreError::backend(format!("blocking task failed: {e}")))?
    }
}

#[async_trait]
impl BlobBackend for RedbBackend {
    async fn put(&self, ns: Namespace, key: &str, data: Vec<u8>) -> Result<BlobMeta, StoreError> {
        let key = key.to_string();
        self.blocking(move |db| {
            let header = BlobHeader {
                created_at_ms: Utc::now().timestamp_millis(),
                size: data.len() as u64,
            };
            let encoded = encode(&header)?;
            let write_txn = db.begin_write().map_err(StoreError::backend)?;
            {
                let mut blobs = write_txn
                    .open_table(data_table(ns))
                    .map_err(StoreError::backend)?;
                blobs
                    .insert(key.as_str(), data.as_slice())
                    .map_err(StoreError::backend)?;
                let mut headers = write_txn
                    .open_table(meta_table(ns))
                    .map_err(StoreError::backend)?;
                headers
                    .insert(key.as_str(), encoded.as_slice())
                    .map_err(StoreError::backend)?;
            }
            write_txn.commit().map_err(StoreError::backend)?;
            Ok(header.meta(&key))
        })
        .await
    }

    async fn get(&self, ns: Namespace, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let key = key.to_string();
        self.blocking(move |db| {
            let read_txn = db.begin_read().map_err(StoreError::backend)?;
            let table = read_txn
                .open_table(data_table(ns))
                .map_err(StoreError::backend)?;
            let value = table.get(key.as_str()).map_err(StoreError::backend)?;
            Ok(value.map(|v| v.value().to_vec()))
        })
        .await
    }

    async fn stat(&self, ns: Namespace, key: &str) -> Result<Option<BlobMeta>, StoreError> {
        let key = key.to_string();
        self.blocking(move |db| {
            let read_txn = db.begin_read().map_err(StoreError::backend)?;
            let table = read_txn
                .open_table(meta_table(ns))
                .map_err(StoreError::backend)?;
            match table.get(key.as_str()).map_err(StoreError::backend)? {
                Some(value) => Ok(Some(decode(value.value())?.meta(&key))),
                None => Ok(None),
            }
        })
        .await
    }

    async fn delete(&self, ns: Namespace, key: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        self.blocking(move |db| {
            let write_txn = db.begin_write().map_err(StoreError::backend)?;
            {
                for def in [data_table(ns), meta_table(ns)] {
                    let mut table = write_txn.open_table(def).map_err(StoreError::backend)?;
                    table.remove(key.as_str()).map_err(StoreError::backend)?;
                }
            }
            write_txn.commit().map_err(StoreError::backend)?;
            Ok(())
        })
        .await
    }

    async fn list(
        &self,
        ns: Namespace,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<BlobMeta>, StoreError> {
        let prefix = prefix.to_string();
        self.blocking(move |db| {
            let read_txn = db.begin_read().map_err(StoreError::backend)?;
            let table = read_txn
                .open_table(meta_table(ns))
                .map_err(StoreError::backend)?;
            let mut out = Vec::new();
            for item in table
                .range(prefix.as_str()..)
                .map_err(StoreError::backend)?
            {
                if out.len() >= limit {
                    break;
                }
                let (key, value) = item.map_err(StoreError::backend)?;
                let key = key.value();
                if !key.starts_with(prefix.as_str()) {
                    break;
                }
                out.push(decode(value.value())?.meta(key));
            }
            Ok(out)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn redb_roundtrip_and_namespaces() {
        let dir = tempdir().unwrap();
        let backend = RedbBackend::open(dir.path().join("blobs.redb")).unwrap();

        let meta = backend
            .put(Namespace::Photos, "p1.jpg", vec![7; 32])
            .await
            .unwrap();
        assert_eq!(meta.size, 32);

        assert_eq!(
            backend.get(Namespace::Photos, "p1.jpg").await.unwrap(),
            Some(vec![7; 32])
        );
        assert_eq!(backend.get(Namespace::Encodings, "p1.jpg").await.unwrap(), None);

        let stat = backend.stat(Namespace::Photos, "p1.jpg").await.unwrap().unwrap();
        assert_eq!(stat.created_at, meta.created_at);

        backend.delete(Namespace::Photos, "p1.jpg").await.unwrap();
        assert!(backend.stat(Namespace::Photos, "p1.jpg").await.unwrap().is_none());
        assert!(backend.get(Namespace::Photos, "p1.jpg").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn redb_stat_reads_only_the_header() {
        let dir = tempdir().unwrap();
        let backend = RedbBackend::open(dir.path().join("stat.redb")).unwrap();
        let meta = backend
            .put(Namespace::Photos, "big.png", vec![1; 4096])
            .await
            .unwrap();

        // Drop the bytes behind the backend's back; the header must still answer.
        let write_txn = backend.db.begin_write().unwrap();
        {
            let mut blobs = write_txn.open_table(data_table(Namespace::Photos)).unwrap();
            blobs.remove("big.png").unwrap();
        }
        write_txn.commit().unwrap();

        let stat = backend.stat(Namespace::Photos, "big.png").await.unwrap().unwrap();
        assert_eq!(stat.size, 4096);
        assert_eq!(stat.created_at, meta.created_at);
        let listed = backend.list(Namespace::Photos, "", 10).await.unwrap();
        assert_eq!(listed, vec![stat]);
        assert_eq!(backend.get(Namespace::Photos, "big.png").await.unwrap(), None);
    }

    #[tokio::test]
    async fn redb_list_is_prefix_bounded_and_ordered() {
        let dir = tempdir().unwrap();
        let backend = RedbBackend::open(dir.path().join("list.redb")).unwrap();
        for key in ["b-2", "a-1", "b-1", "c-1", "b-3"] {
            backend
                .put(Namespace::Photos, key, key.as_bytes().to_vec())
                .await
                .unwrap();
        }

        let keys: Vec<String> = backend
            .list(Namespace::Photos, "b-", 10)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.key)
            .collect();
        assert_eq!(keys, ["b-1", "b-2", "b-3"]);

        let first_two = backend.list(Namespace::Photos, "", 2).await.unwrap();
        assert_eq!(first_two.len(), 2);
        assert_eq!(first_two[0].key, "a-1");
    }

    #[tokio::test]
    async fn redb_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("persist.redb");
        {
            let backend = RedbBackend::open(&path).unwrap();
            backend
                .put(Namespace::Encodings, "cache-key", vec![1, 2, 3])
                .await
                .unwrap();
        }
        let reopened = RedbBackend::open(&path).unwrap();
        assert_eq!(
            reopened.get(Namespace::Encodings, "cache-key").await.unwrap(),
            Some(vec![1, 2, 3])
        );
    }
}
