//! SQLite-backed flat vector store
//!
//! Every row is mirrored in memory so searches never touch the database. Writers
//! hold the cache write lock across the SQLite transaction and only publish the
//! new rows after commit, so readers see either the whole batch or none of it.

use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::providers::VectorSearchResult;
use crate::types::{Chunk, IndexedVector};

use super::similarity::{cosine_distance, decode_vector, encode_vector};

/// A persisted entry plus its insertion sequence
#[derive(Debug, Clone)]
struct StoredEntry {
    seq: i64,
    entry: IndexedVector,
}

#[derive(Debug, Default)]
struct Cache {
    entries: Vec<StoredEntry>,
    /// Fixed by the first vector written; reset when the store empties
    dimension: Option<usize>,
    next_seq: i64,
}

/// Persistent embedded-chunk store with exhaustive cosine search
pub struct VectorStore {
    conn: Mutex<Connection>,
    cache: RwLock<Cache>,
}

impl VectorStore {
    /// Create or open the store at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)
            .map_err(|e| Error::internal(format!("Failed to open vector store: {}", e)))?;
        Self::with_connection(conn)
    }

    /// Create an in-memory store
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::internal(format!("Failed to open in-memory store: {}", e)))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        migrate(&conn)?;
        let cache = load_cache(&conn)?;
        tracing::info!(
            "Vector store loaded ({} entries, dimension {:?})",
            cache.entries.len(),
            cache.dimension
        );
        Ok(Self {
            conn: Mutex::new(conn),
            cache: RwLock::new(cache),
        })
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.cache.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Embedding dimension in use, if any vector has been stored
    pub fn dimension(&self) -> Option<usize> {
        self.cache.read().dimension
    }

    /// Distinct source ids, sorted
    pub fn sources(&self) -> Vec<String> {
        let cache = self.cache.read();
        let mut sources: Vec<String> = cache
            .entries
            .iter()
            .map(|e| e.entry.chunk.source_id.clone())
            .collect();
        sources.sort();
        sources.dedup();
        sources
    }

    /// Persist a batch atomically
    pub fn insert_batch(&self, entries: Vec<IndexedVector>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut cache = self.cache.write();
        let dimension = check_dimensions(cache.dimension, &entries)?;

        let stored = {
            let mut conn = self.conn.lock();
            let tx = conn.transaction().map_err(write_error)?;
            let stored = insert_rows(&tx, cache.next_seq, entries)?;
            tx.commit().map_err(write_error)?;
            stored
        };

        cache.next_seq += stored.len() as i64;
        cache.dimension = Some(dimension);
        cache.entries.extend(stored);
        Ok(())
    }

    /// Atomically drop every entry of `source_id` and insert `entries`
    pub fn replace_source(&self, source_id: &str, entries: Vec<IndexedVector>) -> Result<usize> {
        let mut cache = self.cache.write();

        let remaining = cache
            .entries
            .iter()
            .filter(|e| e.entry.chunk.source_id != source_id)
            .count();
        let removed = cache.entries.len() - remaining;
        let current_dimension = if remaining > 0 { cache.dimension } else { None };
        let dimension = if entries.is_empty() {
            current_dimension
        } else {
            Some(check_dimensions(current_dimension, &entries)?)
        };

        let stored = {
            let mut conn = self.conn.lock();
            let tx = conn.transaction().map_err(write_error)?;
            tx.execute("DELETE FROM chunks WHERE source_id = ?1", params![source_id])
                .map_err(write_error)?;
            let stored = insert_rows(&tx, cache.next_seq, entries)?;
            tx.commit().map_err(write_error)?;
            stored
        };

        cache.entries.retain(|e| e.entry.chunk.source_id != source_id);
        cache.next_seq += stored.len() as i64;
        cache.entries.extend(stored);
        cache.dimension = dimension;

        if removed > 0 {
            tracing::debug!("Replaced {} entries of '{}'", removed, source_id);
        }
        Ok(removed)
    }

    /// Delete all entries of one source
    pub fn delete_by_source(&self, source_id: &str) -> Result<usize> {
        let mut cache = self.cache.write();
        let deleted = self
            .conn
            .lock()
            .execute("DELETE FROM chunks WHERE source_id = ?1", params![source_id])
            .map_err(write_error)?;

        cache.entries.retain(|e| e.entry.chunk.source_id != source_id);
        if cache.entries.is_empty() {
            cache.dimension = None;
        }
        Ok(deleted)
    }

    /// Delete everything
    pub fn clear(&self) -> Result<usize> {
        let mut cache = self.cache.write();
        let deleted = self
            .conn
            .lock()
            .execute("DELETE FROM chunks", [])
            .map_err(write_error)?;

        cache.entries.clear();
        cache.dimension = None;
        Ok(deleted)
    }

    /// The `top_k` entries closest to `query`
    ///
    /// Ordered by ascending cosine distance, ties broken by `sequence_index`
    /// and then insertion order.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<VectorSearchResult>> {
        let cache = self.cache.read();
        if cache.entries.is_empty() {
            return Err(Error::IndexEmpty);
        }
        if let Some(dimension) = cache.dimension {
            if query.len() != dimension {
                return Err(Error::model_call(format!(
                    "query embedding has dimension {}, index uses {}",
                    query.len(),
                    dimension
                )));
            }
        }

        let mut scored = Vec::with_capacity(cache.entries.len());
        for stored in &cache.entries {
            let distance = cosine_distance(query, &stored.entry.vector)?;
            scored.push((distance, stored));
        }

        scored.sort_by(|(da, a), (db, b)| {
            da.total_cmp(db)
                .then_with(|| a.entry.chunk.sequence_index.cmp(&b.entry.chunk.sequence_index))
                .then_with(|| a.seq.cmp(&b.seq))
        });

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(distance, stored)| VectorSearchResult {
                chunk: stored.entry.chunk.clone(),
                distance,
            })
            .collect())
    }
}

fn write_error(e: rusqlite::Error) -> Error {
    Error::index_write(e.to_string())
}

/// Every vector must be non-empty, finite, and share one dimension
fn check_dimensions(current: Option<usize>, entries: &[IndexedVector]) -> Result<usize> {
    let expected = match current {
        Some(d) => d,
        None => entries.first().map(|e| e.vector.len()).unwrap_or(0),
    };
    if expected == 0 {
        return Err(Error::index_write("embedding vectors must not be empty"));
    }
    for entry in entries {
        if entry.vector.len() != expected {
            return Err(Error::index_write(format!(
                "embedding dimension mismatch for chunk {} of '{}': expected {}, got {}",
                entry.chunk.sequence_index,
                entry.chunk.source_id,
                expected,
                entry.vector.len()
            )));
        }
        if entry.vector.iter().any(|v| !v.is_finite()) {
            return Err(Error::index_write(format!(
                "embedding for chunk {} of '{}' contains non-finite values",
                entry.chunk.sequence_index, entry.chunk.source_id
            )));
        }
    }
    Ok(expected)
}

fn insert_rows(
    tx: &rusqlite::Transaction<'_>,
    first_seq: i64,
    entries: Vec<IndexedVector>,
) -> Result<Vec<StoredEntry>> {
    let mut stmt = tx
        .prepare(
            r#"INSERT INTO chunks
               (seq, id, source_id, sequence_index, char_start, char_end, text, metadata, vector)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
        )
        .map_err(write_error)?;

    let mut stored = Vec::with_capacity(entries.len());
    for (offset, entry) in entries.into_iter().enumerate() {
        let seq = first_seq + offset as i64;
        let metadata = serde_json::to_string(&entry.chunk.metadata)?;
        stmt.execute(params![
            seq,
            entry.id,
            entry.chunk.source_id,
            entry.chunk.sequence_index,
            entry.chunk.char_start as i64,
            entry.chunk.char_end as i64,
            entry.chunk.text,
            metadata,
            encode_vector(&entry.vector),
        ])
        .map_err(write_error)?;
        stored.push(StoredEntry { seq, entry });
    }
    Ok(stored)
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;
        PRAGMA temp_store=MEMORY;
        "#,
    )
    .map_err(|e| Error::internal(format!("Failed to set pragmas: {}", e)))?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            seq INTEGER PRIMARY KEY,
            id TEXT NOT NULL UNIQUE,
            source_id TEXT NOT NULL,
            sequence_index INTEGER NOT NULL,
            char_start INTEGER NOT NULL,
            char_end INTEGER NOT NULL,
            text TEXT NOT NULL,
            metadata TEXT NOT NULL,
            vector BLOB NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_chunks_source_id ON chunks(source_id);
        "#,
    )
    .map_err(|e| Error::internal(format!("Failed to run migrations: {}", e)))?;

    Ok(())
}

fn load_cache(conn: &Connection) -> Result<Cache> {
    let mut stmt = conn.prepare(
        r#"SELECT seq, id, source_id, sequence_index, char_start, char_end, text, metadata, vector
           FROM chunks ORDER BY seq"#,
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, u32>(3)?,
            row.get::<_, i64>(4)?,
            row.get::<_, i64>(5)?,
            row.get::<_, String>(6)?,
            row.get::<_, String>(7)?,
            row.get::<_, Vec<u8>>(8)?,
        ))
    })?;

    let mut cache = Cache::default();
    for row in rows {
        let (seq, id, source_id, sequence_index, char_start, char_end, text, metadata, blob) = row?;
        let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata)?;
        let vector = decode_vector(&blob)?;

        match cache.dimension {
            None => cache.dimension = Some(vector.len()),
            Some(d) if d != vector.len() => {
                return Err(Error::internal(format!(
                    "stored vector {} has dimension {}, expected {}",
                    id,
                    vector.len(),
                    d
                )));
            }
            Some(_) => {}
        }

        let chunk = Chunk {
            text,
            source_id,
            sequence_index,
            char_start: char_start as usize,
            char_end: char_end as usize,
            metadata,
        };
        cache.next_seq = seq + 1;
        cache.entries.push(StoredEntry {
            seq,
            entry: IndexedVector { id, vector, chunk },
        });
    }

    Ok(cache)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(source: &str, seq: u32, vector: Vec<f32>) -> IndexedVector {
        let text = format!("{} chunk {}", source, seq);
        let len = text.chars().count();
        IndexedVector::new(vector, Chunk::new(source, text, seq, 0, len))
    }

    #[test]
    fn test_insert_and_search() {
        let store = VectorStore::in_memory().unwrap();
        store
            .insert_batch(vec![
                entry("a.txt", 0, vec![1.0, 0.0]),
                entry("a.txt", 1, vec![0.0, 1.0]),
                entry("b.txt", 0, vec![0.7, 0.7]),
            ])
            .unwrap();

        assert_eq!(store.len(), 3);
        assert_eq!(store.dimension(), Some(2));

        let results = store.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.text, "a.txt chunk 0");
        assert!(results[0].distance.abs() < 1e-6);
        assert_eq!(results[1].chunk.source_id, "b.txt");
    }

    #[test]
    fn test_search_empty_store() {
        let store = VectorStore::in_memory().unwrap();
        assert!(matches!(store.search(&[1.0, 0.0], 4), Err(Error::IndexEmpty)));
    }

    #[test]
    fn test_query_dimension_mismatch_is_model_error() {
        let store = VectorStore::in_memory().unwrap();
        store.insert_batch(vec![entry("a.txt", 0, vec![1.0, 0.0])]).unwrap();
        assert!(matches!(
            store.search(&[1.0, 0.0, 0.0], 4),
            Err(Error::ModelCall(_))
        ));
    }

    #[test]
    fn test_tie_break_by_sequence_then_insertion() {
        let store = VectorStore::in_memory().unwrap();
        store.insert_batch(vec![entry("z.txt", 3, vec![1.0, 0.0])]).unwrap();
        store
            .insert_batch(vec![
                entry("y.txt", 1, vec![2.0, 0.0]),
                entry("x.txt", 1, vec![3.0, 0.0]),
            ])
            .unwrap();

        let results = store.search(&[1.0, 0.0], 3).unwrap();
        let order: Vec<_> = results.iter().map(|r| r.chunk.source_id.as_str()).collect();
        assert_eq!(order, vec!["y.txt", "x.txt", "z.txt"]);
    }

    #[test]
    fn test_dimension_mismatch_rejects_whole_batch() {
        let store = VectorStore::in_memory().unwrap();
        store.insert_batch(vec![entry("a.txt", 0, vec![1.0, 0.0])]).unwrap();

        let result = store.insert_batch(vec![
            entry("b.txt", 0, vec![0.0, 1.0]),
            entry("b.txt", 1, vec![0.0, 1.0, 0.0]),
        ]);
        assert!(matches!(result, Err(Error::IndexWrite(_))));
        assert_eq!(store.len(), 1);
        assert_eq!(store.sources(), vec!["a.txt".to_string()]);
    }

    #[test]
    fn test_failed_transaction_leaves_store_intact() {
        let store = VectorStore::in_memory().unwrap();
        let first = entry("a.txt", 0, vec![1.0, 0.0]);
        let mut duplicate = entry("b.txt", 1, vec![0.0, 1.0]);
        duplicate.id = first.id.clone();

        store.insert_batch(vec![first]).unwrap();
        let result = store.insert_batch(vec![entry("b.txt", 0, vec![0.5, 0.5]), duplicate]);

        assert!(matches!(result, Err(Error::IndexWrite(_))));
        assert_eq!(store.len(), 1);
        assert_eq!(store.sources(), vec!["a.txt".to_string()]);
    }

    #[test]
    fn test_replace_source() {
        let store = VectorStore::in_memory().unwrap();
        store
            .insert_batch(vec![
                entry("a.txt", 0, vec![1.0, 0.0]),
                entry("a.txt", 1, vec![1.0, 0.1]),
                entry("b.txt", 0, vec![0.0, 1.0]),
            ])
            .unwrap();

        let removed = store
            .replace_source("a.txt", vec![entry("a.txt", 0, vec![0.9, 0.1])])
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_delete_and_clear() {
        let store = VectorStore::in_memory().unwrap();
        store
            .insert_batch(vec![
                entry("a.txt", 0, vec![1.0, 0.0]),
                entry("b.txt", 0, vec![0.0, 1.0]),
            ])
            .unwrap();

        assert_eq!(store.delete_by_source("a.txt").unwrap(), 1);
        assert_eq!(store.sources(), vec!["b.txt".to_string()]);

        assert_eq!(store.clear().unwrap(), 1);
        assert!(store.is_empty());
        assert_eq!(store.dimension(), None);

        // dimension is free to change once the store is empty
        store.insert_batch(vec![entry("c.txt", 0, vec![1.0, 0.0, 0.0])]).unwrap();
        assert_eq!(store.dimension(), Some(3));
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index").join("vectors.sqlite3");

        {
            let store = VectorStore::open(&path).unwrap();
            let mut first = entry("a.txt", 0, vec![1.0, 0.0]);
            first.chunk = first.chunk.with_metadata("file_type", "txt");
            store
                .insert_batch(vec![first, entry("a.txt", 1, vec![0.0, 1.0])])
                .unwrap();
        }

        let store = VectorStore::open(&path).unwrap();
        assert_eq!(store.len(), 2);
        let results = store.search(&[1.0, 0.0], 1).unwrap();
        assert_eq!(results[0].chunk.sequence_index, 0);
        assert_eq!(
            results[0].chunk.metadata.get("file_type").map(String::as_str),
            Some("txt")
        );

        // new rows continue the insertion sequence
        store.insert_batch(vec![entry("b.txt", 0, vec![1.0, 0.0])]).unwrap();
        let results = store.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(results[0].chunk.source_id, "a.txt");
        assert_eq!(results[1].chunk.source_id, "b.txt");
    }
}
