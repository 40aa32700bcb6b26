//! SQLite-backed store with an in-memory HNSW index
//!
//! Documents, metadata and raw embeddings persist in SQLite. The HNSW graph is
//! rebuilt from the persisted embeddings when the store is opened, and again
//! whenever another process has written to the collection since.
//!
//! Every write bumps `collection_state.generation`. Each store remembers the
//! generation its index reflects and compares it before vector recall.

use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use super::{
    Metadata, MetadataFilter, RecallItem, RecallSet, Store, StoreError, UpsertRecord, VectorIndex,
    VectorIndexError,
};
use crate::embedding::{EmbeddingError, EmbeddingProvider, IndexConfig};

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Database migrations
const MIGRATIONS: &[&str] = &[
    // Migration 1: documents and exact-match metadata
    "
    CREATE TABLE chunks (
        id TEXT PRIMARY KEY,
        document TEXT NOT NULL,
        metadata TEXT NOT NULL,
        embedding BLOB NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE chunk_metadata (
        chunk_id TEXT NOT NULL REFERENCES chunks(id) ON DELETE CASCADE,
        key TEXT NOT NULL,
        value TEXT NOT NULL,
        PRIMARY KEY (chunk_id, key)
    );

    CREATE INDEX idx_chunk_metadata_kv ON chunk_metadata(key, value, chunk_id);
    ",
    // Migration 2: write generation shared by every process using the file
    "
    CREATE TABLE collection_state (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        generation INTEGER NOT NULL
    );

    INSERT INTO collection_state (id, generation) VALUES (1, 0);
    ",
];

/// Vector + metadata store over one SQLite collection
///
/// Database and index work runs on tokio's blocking pool.
pub struct SqliteStore {
    shared: Arc<Shared>,
    embedder: Arc<dyn EmbeddingProvider>,
}

struct Shared {
    pool: DbPool,
    index: VectorIndex,
    /// Collection generation the in-memory index reflects
    indexed_generation: AtomicI64,
    /// Held by in-process writes and index rebuilds
    writer: Mutex<()>,
}

impl SqliteStore {
    /// Open (or create) the collection at `db_path`
    pub fn open(
        db_path: &Path,
        embedder: Arc<dyn EmbeddingProvider>,
        config: &IndexConfig,
    ) -> Result<Self, StoreError> {
        if embedder.dimension() != config.vector_dim {
            return Err(EmbeddingError::DimensionMismatch {
                expected: config.vector_dim,
                actual: embedder.dimension(),
            }
            .into());
        }

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA foreign_keys = ON;
                PRAGMA busy_timeout = 5000;
                ",
            )
        });

        let pool = Pool::builder().max_size(16).build(manager)?;

        let shared = Shared {
            pool,
            index: VectorIndex::new(
                config.vector_dim,
                config.hnsw_m,
                config.hnsw_ef_construction,
                config.hnsw_ef_search,
                config.max_elements,
            ),
            indexed_generation: AtomicI64::new(-1),
            writer: Mutex::new(()),
        };

        shared.migrate()?;
        let count = shared.rebuild_index()?;
        if count > 0 {
            tracing::info!("Rebuilt vector index with {} embeddings", count);
        }
        tracing::debug!(
            "Opened {} with query model {}",
            db_path.display(),
            embedder.model_name()
        );

        Ok(Self {
            shared: Arc::new(shared),
            embedder,
        })
    }

    /// Number of stored documents
    pub fn len(&self) -> Result<usize, StoreError> {
        let conn = self.shared.pool.get()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

impl Shared {
    fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.pool.get()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying migration {}", version);
                conn.execute_batch(migration)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    fn lock_writer(&self) -> Result<std::sync::MutexGuard<'_, ()>, StoreError> {
        self.writer
            .lock()
            .map_err(|_| StoreError::Index(VectorIndexError::Poisoned))
    }

    /// Reload every embedding from one read snapshot and swap the index
    fn rebuild_index(&self) -> Result<usize, StoreError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        let generation = read_generation(&tx)?;
        let mut entries = Vec::new();
        {
            let mut stmt = tx.prepare("SELECT id, embedding FROM chunks ORDER BY id")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?;
            for row in rows {
                let (id, blob) = row?;
                let vector = decode_embedding(&id, &blob)?;
                entries.push((id, vector));
            }
        }
        tx.commit()?;

        let count = self.index.replace_all(entries)?;
        self.indexed_generation.store(generation, Ordering::SeqCst);
        Ok(count)
    }

    /// Rebuild the index if another process wrote since it was built
    fn refresh_if_stale(&self) -> Result<(), StoreError> {
        let on_disk = read_generation(&*self.pool.get()?)?;
        if on_disk == self.indexed_generation.load(Ordering::SeqCst) {
            return Ok(());
        }

        let _guard = self.lock_writer()?;
        let indexed = self.indexed_generation.load(Ordering::SeqCst);
        let on_disk = read_generation(&*self.pool.get()?)?;
        if on_disk == indexed {
            return Ok(());
        }

        let count = self.rebuild_index()?;
        tracing::info!(
            "Collection changed on disk (generation {} -> {}), reindexed {} embeddings",
            indexed,
            on_disk,
            count
        );
        Ok(())
    }

    fn vector_recall(&self, query: &[f32], top_k: usize) -> Result<RecallSet, StoreError> {
        let hits = self.index.search(query, top_k)?;

        if let Some(best) = hits.first() {
            tracing::debug!(
                "Vector recall matched {} of top {} (best {:.3})",
                hits.len(),
                top_k,
                best.score
            );
        }

        let ids: Vec<String> = hits.into_iter().map(|hit| hit.id).collect();
        self.hydrate(&ids)
    }

    /// Load rows for `ids`, returned in the order of `ids`
    fn hydrate(&self, ids: &[String]) -> Result<RecallSet, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare_cached("SELECT document, metadata FROM chunks WHERE id = ?1")?;

        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            let row = stmt
                .query_row(params![id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .optional()?;

            match row {
                Some((document, metadata)) => {
                    items.push(RecallItem::new(id, document, parse_metadata(id, &metadata)?));
                }
                None => tracing::warn!("Vector index references missing chunk {}", id),
            }
        }

        Ok(items)
    }

    fn metadata_get(&self, filter: &MetadataFilter, limit: usize) -> Result<RecallSet, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare_cached(
            "SELECT c.id, c.document, c.metadata
             FROM chunk_metadata m
             JOIN chunks c ON c.id = m.chunk_id
             WHERE m.key = ?1 AND m.value = ?2
             ORDER BY c.id ASC
             LIMIT ?3",
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![filter.key, filter.value, limit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut items = Vec::new();
        for row in rows {
            let (id, document, metadata) = row?;
            let metadata = parse_metadata(&id, &metadata)?;
            items.push(RecallItem::new(id, document, metadata));
        }

        Ok(items)
    }

    fn upsert(&self, batch: &[UpsertRecord]) -> Result<(), StoreError> {
        // Reject the whole batch before touching the database
        for record in batch {
            if record.embedding.len() != self.index.dimension() {
                return Err(VectorIndexError::InvalidDimension {
                    expected: self.index.dimension(),
                    actual: record.embedding.len(),
                }
                .into());
            }
        }

        let _guard = self.lock_writer()?;

        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let before = read_generation(&tx)?;
        let now = chrono::Utc::now().to_rfc3339();

        // Later duplicates of an id within one batch win, same as sequential upserts
        let mut latest: HashMap<&str, &UpsertRecord> = HashMap::new();
        for record in batch {
            latest.insert(record.id.as_str(), record);
        }

        {
            let mut upsert_chunk = tx.prepare_cached(
                "INSERT INTO chunks (id, document, metadata, embedding, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    document = excluded.document,
                    metadata = excluded.metadata,
                    embedding = excluded.embedding,
                    updated_at = excluded.updated_at",
            )?;
            let mut clear_metadata =
                tx.prepare_cached("DELETE FROM chunk_metadata WHERE chunk_id = ?1")?;
            let mut insert_metadata = tx.prepare_cached(
                "INSERT INTO chunk_metadata (chunk_id, key, value) VALUES (?1, ?2, ?3)",
            )?;

            for record in latest.values() {
                let metadata_json = serde_json::to_string(&record.metadata).map_err(|e| {
                    StoreError::Corrupt {
                        id: record.id.clone(),
                        message: e.to_string(),
                    }
                })?;

                upsert_chunk.execute(params![
                    record.id,
                    record.document,
                    metadata_json,
                    encode_embedding(&record.embedding),
                    now
                ])?;
                clear_metadata.execute(params![record.id])?;
                for (key, value) in &record.metadata {
                    insert_metadata.execute(params![record.id, key, value])?;
                }
            }
        }

        tx.execute(
            "UPDATE collection_state SET generation = generation + 1 WHERE id = 1",
            [],
        )?;
        tx.commit()?;

        if before == self.indexed_generation.load(Ordering::SeqCst) {
            for record in batch {
                self.index.upsert(&record.id, &record.embedding)?;
            }
            self.indexed_generation.store(before + 1, Ordering::SeqCst);
        } else {
            // Someone else wrote first; the snapshot includes this batch
            let count = self.rebuild_index()?;
            tracing::info!("Collection changed on disk, reindexed {} embeddings", count);
        }

        Ok(())
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn vector_query(&self, query_text: &str, top_k: usize) -> Result<RecallSet, StoreError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let shared = Arc::clone(&self.shared);
        let empty = tokio::task::spawn_blocking(move || -> Result<bool, StoreError> {
            shared.refresh_if_stale()?;
            Ok(shared.index.is_empty())
        })
        .await??;
        if empty {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(query_text).await?;

        let shared = Arc::clone(&self.shared);
        tokio::task::spawn_blocking(move || shared.vector_recall(&query_embedding, top_k)).await?
    }

    async fn metadata_get(
        &self,
        filter: &MetadataFilter,
        limit: usize,
    ) -> Result<RecallSet, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let shared = Arc::clone(&self.shared);
        let filter = filter.clone();
        tokio::task::spawn_blocking(move || shared.metadata_get(&filter, limit)).await?
    }

    async fn upsert(&self, batch: Vec<UpsertRecord>) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        tokio::task::spawn_blocking(move || shared.upsert(&batch)).await?
    }
}

fn read_generation(conn: &Connection) -> Result<i64, StoreError> {
    Ok(conn.query_row(
        "SELECT generation FROM collection_state WHERE id = 1",
        [],
        |row| row.get(0),
    )?)
}

fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_embedding(id: &str, blob: &[u8]) -> Result<Vec<f32>, StoreError> {
    if blob.len() % 4 != 0 {
        return Err(StoreError::Corrupt {
            id: id.to_string(),
            message: format!("embedding blob of {} bytes", blob.len()),
        });
    }

    Ok(blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn parse_metadata(id: &str, raw: &str) -> Result<Metadata, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Corrupt {
        id: id.to_string(),
        message: e.to_string(),
    })
}
