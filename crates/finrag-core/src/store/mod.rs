//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the retriever's only view of stored chunks:
//! a filtered nearest-neighbour query returning text, metadata and distance.
//! Insertion belongs to whatever job builds the index and is not part of the
//! trait.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::filter::RetrievalFilter;
use crate::models::ChunkMetadata;

pub use memory::InMemoryIndex;

/// One ranked result of a [`VectorIndex::query`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexHit {
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Lower is more similar.
    pub distance: f32,
}

/// Filtered similarity search over indexed chunks.
///
/// `filter` is a conjunctive predicate over metadata fields, or `None` for a
/// pure similarity search. Fields the index does not know are its own
/// concern. Results come back best first and are never reordered by callers.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&RetrievalFilter>,
    ) -> Result<Vec<IndexHit>>;
}
