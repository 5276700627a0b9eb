//! In-memory [`VectorIndex`] implementation.
//!
//! Chunks live in a `Vec` behind `std::sync::RwLock`, with a `chunk_id` →
//! position map for replacement. Queries are brute-force: filter by metadata,
//! rank by cosine distance, break distance ties by `chunk_id`, truncate to `k`.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::embedding::cosine_distance;
use crate::filter::RetrievalFilter;
use crate::models::{ChunkMetadata, ChunkRecord};

use super::{IndexHit, VectorIndex};

#[derive(Debug)]
struct StoredChunk {
    text: String,
    metadata: ChunkMetadata,
    metadata_json: serde_json::Map<String, serde_json::Value>,
    vector: Vec<f32>,
}

#[derive(Debug, Default)]
struct Inner {
    chunks: Vec<StoredChunk>,
    positions: HashMap<String, usize>,
}

impl Inner {
    fn dims(&self) -> Option<usize> {
        self.chunks.first().map(|c| c.vector.len())
    }
}

/// Brute-force index keyed by `chunk_id`.
#[derive(Debug)]
pub struct InMemoryIndex {
    inner: RwLock<Inner>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Insert a chunk, replacing any existing chunk with the same `chunk_id`.
    ///
    /// Every vector in the index must have the same dimension.
    pub fn insert(&self, record: ChunkRecord, vector: Vec<f32>) -> Result<()> {
        if vector.is_empty() {
            bail!("chunk {}: empty embedding", record.chunk_id);
        }

        let (text, metadata) = record.split();
        let metadata_json = match serde_json::to_value(&metadata)? {
            serde_json::Value::Object(map) => map,
            _ => bail!("chunk {}: metadata is not an object", metadata.chunk_id),
        };

        let mut inner = self
            .inner
            .write()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))?;

        if let Some(dims) = inner.dims() {
            if dims != vector.len() {
                bail!(
                    "chunk {}: embedding has {} dims, index has {}",
                    metadata.chunk_id,
                    vector.len(),
                    dims
                );
            }
        }

        let chunk_id = metadata.chunk_id.clone();
        let stored = StoredChunk {
            text,
            metadata,
            metadata_json,
            vector,
        };
        match inner.positions.get(&chunk_id).copied() {
            Some(pos) => inner.chunks[pos] = stored,
            None => {
                let pos = inner.chunks.len();
                inner.chunks.push(stored);
                inner.positions.insert(chunk_id, pos);
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.chunks.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dimension of the stored vectors, if any are stored.
    pub fn dims(&self) -> Option<usize> {
        self.inner.read().ok().and_then(|i| i.dims())
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&RetrievalFilter>,
    ) -> Result<Vec<IndexHit>> {
        let inner = self
            .inner
            .read()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))?;

        if let Some(dims) = inner.dims() {
            if dims != embedding.len() {
                bail!(
                    "query embedding has {} dims, index has {}",
                    embedding.len(),
                    dims
                );
            }
        }

        let chunks = &inner.chunks;
        let mut ranked: Vec<(f32, usize)> = chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| filter.map_or(true, |f| f.matches_json(&c.metadata_json)))
            .map(|(i, c)| (cosine_distance(embedding, &c.vector), i))
            .collect();

        ranked.sort_by(|(da, ia), (db, ib)| {
            da.partial_cmp(db)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| chunks[*ia].metadata.chunk_id.cmp(&chunks[*ib].metadata.chunk_id))
        });
        ranked.truncate(k);

        Ok(ranked
            .into_iter()
            .map(|(distance, i)| IndexHit {
                text: chunks[i].text.clone(),
                metadata: chunks[i].metadata.clone(),
                distance,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{DOC_TYPE, YEAR};
    use crate::models::ChunkType;

    fn record(id: &str, doc_type: &str, year: Option<i32>, text: &str) -> ChunkRecord {
        ChunkRecord {
            doc_id: id.to_string(),
            source_path: format!("data/raw/{}.pdf", id),
            year,
            doc_type: doc_type.to_string(),
            audited: false,
            period: "no_definido".to_string(),
            page_number: 1,
            chunk_id: ChunkRecord::derive_chunk_id(id, 1, ChunkType::Text, 0),
            chunk_index: 0,
            chunk_text: text.to_string(),
            chunk_type: ChunkType::Text,
        }
    }

    fn index() -> InMemoryIndex {
        let idx = InMemoryIndex::new();
        idx.insert(record("a", "financial_statements", Some(2023), "activos"), vec![1.0, 0.0])
            .unwrap();
        idx.insert(record("b", "financial_statements", Some(2024), "pasivos"), vec![0.8, 0.2])
            .unwrap();
        idx.insert(record("c", "important_facts", Some(2023), "junta"), vec![0.0, 1.0])
            .unwrap();
        idx
    }

    #[tokio::test]
    async fn test_query_ranks_by_distance() {
        let idx = index();
        let hits = idx.query(&[1.0, 0.0], 10, None).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.metadata.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(hits[0].distance < hits[1].distance);
    }

    #[tokio::test]
    async fn test_query_applies_filter() {
        let idx = index();
        let f = RetrievalFilter::new()
            .with(DOC_TYPE, "financial_statements")
            .with(YEAR, 2023);
        let hits = idx.query(&[0.0, 1.0], 10, Some(&f)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "activos");
    }

    #[tokio::test]
    async fn test_query_truncates_to_k() {
        let idx = index();
        assert_eq!(idx.query(&[1.0, 0.0], 2, None).await.unwrap().len(), 2);
        assert!(idx.query(&[1.0, 0.0], 0, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_equal_distance_ties_by_chunk_id() {
        let idx = InMemoryIndex::new();
        idx.insert(record("z", "x", None, "z"), vec![1.0, 0.0]).unwrap();
        idx.insert(record("m", "x", None, "m"), vec![1.0, 0.0]).unwrap();
        let hits = idx.query(&[1.0, 0.0], 2, None).await.unwrap();
        assert_eq!(hits[0].metadata.doc_id, "m");
        assert_eq!(hits[1].metadata.doc_id, "z");
    }

    #[tokio::test]
    async fn test_insert_replaces_same_chunk_id() {
        let idx = index();
        idx.insert(record("a", "financial_statements", Some(2023), "activos v2"), vec![0.0, 1.0])
            .unwrap();
        assert_eq!(idx.len(), 3);
        let hits = idx.query(&[0.0, 1.0], 1, None).await.unwrap();
        // ties with "c" on distance, wins on chunk_id
        assert_eq!(hits[0].text, "activos v2");
    }

    #[tokio::test]
    async fn test_bulk_insert_then_replace() {
        let idx = InMemoryIndex::new();
        for i in 0..5000 {
            let id = format!("doc{}", i);
            idx.insert(record(&id, "financial_statements", Some(2023), &id), vec![1.0, 0.0])
                .unwrap();
        }
        assert_eq!(idx.len(), 5000);

        idx.insert(record("doc4321", "important_facts", Some(2024), "reemplazo"), vec![0.0, 1.0])
            .unwrap();
        assert_eq!(idx.len(), 5000);

        let f = RetrievalFilter::new().with(DOC_TYPE, "important_facts");
        let hits = idx.query(&[0.0, 1.0], 10, Some(&f)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "reemplazo");
        assert_eq!(hits[0].metadata.year, Some(2024));
    }

    #[tokio::test]
    async fn test_query_only_returns_top_k_of_many() {
        let idx = InMemoryIndex::new();
        for i in 0..100 {
            let id = format!("d{:03}", i);
            idx.insert(record(&id, "x", None, &id), vec![1.0, i as f32 / 100.0])
                .unwrap();
        }
        let hits = idx.query(&[1.0, 0.0], 3, None).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.metadata.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["d000", "d001", "d002"]);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_error() {
        let idx = index();
        assert!(idx.query(&[1.0, 0.0, 0.0], 3, None).await.is_err());
        assert!(idx
            .insert(record("d", "x", None, "d"), vec![1.0, 0.0, 0.0])
            .is_err());
        assert_eq!(idx.dims(), Some(2));
    }

    #[tokio::test]
    async fn test_empty_index() {
        let idx = InMemoryIndex::new();
        assert!(idx.is_empty());
        assert_eq!(idx.dims(), None);
        assert!(idx.query(&[1.0], 5, None).await.unwrap().is_empty());
    }
}
