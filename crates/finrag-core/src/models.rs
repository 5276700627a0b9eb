//! Data models shared by the retrieval pipeline.
//!
//! [`ChunkRecord`]s are produced by the ingestion side (PDF parsing, page
//! splitting, table heuristics) and are treated as immutable here. The
//! retriever only ever sees them through the vector index, as a
//! [`ChunkMetadata`] plus the chunk text, and hands them back to callers as
//! [`Evidence`].

use serde::{Deserialize, Serialize};

/// Period value used by ingestion when a chunk has no identifiable month.
pub const PERIOD_UNDEFINED: &str = "no_definido";

/// Kind of content a chunk carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    /// Plain running text from a page.
    Text,
    /// A synthesized "TOTAL" line extracted from a table.
    TableFactTotal,
    /// One parsed row of a table.
    TableFactRow,
    /// A raw table fragment split at date boundaries.
    TableSegment,
}

impl ChunkType {
    /// Short tag embedded in derived chunk ids.
    pub fn id_tag(self) -> &'static str {
        match self {
            ChunkType::Text => "c",
            ChunkType::TableFactTotal => "ttotal",
            ChunkType::TableFactRow => "trow",
            ChunkType::TableSegment => "tseg",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChunkType::Text => "text",
            ChunkType::TableFactTotal => "table_fact_total",
            ChunkType::TableFactRow => "table_fact_row",
            ChunkType::TableSegment => "table_segment",
        }
    }
}

/// A chunk of a parsed financial document, as stored in the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub doc_id: String,
    pub source_path: String,
    pub year: Option<i32>,
    pub doc_type: String,
    pub audited: bool,
    /// `"YYYY-MM"` or [`PERIOD_UNDEFINED`].
    pub period: String,
    pub page_number: u32,
    /// Globally unique; see [`ChunkRecord::derive_chunk_id`].
    pub chunk_id: String,
    pub chunk_index: u32,
    pub chunk_text: String,
    pub chunk_type: ChunkType,
}

impl ChunkRecord {
    /// Derive the deterministic chunk id used as the index dedup key.
    ///
    /// ```rust
    /// use finrag_core::models::{ChunkRecord, ChunkType};
    ///
    /// let id = ChunkRecord::derive_chunk_id("eeff_2023", 4, ChunkType::TableFactRow, 2);
    /// assert_eq!(id, "eeff_2023_p004_trow_002");
    /// ```
    pub fn derive_chunk_id(
        doc_id: &str,
        page_number: u32,
        chunk_type: ChunkType,
        index: u32,
    ) -> String {
        format!(
            "{}_p{:03}_{}_{:03}",
            doc_id,
            page_number,
            chunk_type.id_tag(),
            index
        )
    }

    pub fn has_defined_period(&self) -> bool {
        self.period != PERIOD_UNDEFINED
    }

    /// Metadata view of this record (every field except the text).
    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            doc_id: self.doc_id.clone(),
            source_path: self.source_path.clone(),
            year: self.year,
            doc_type: self.doc_type.clone(),
            audited: self.audited,
            period: self.period.clone(),
            page_number: self.page_number,
            chunk_id: self.chunk_id.clone(),
            chunk_index: self.chunk_index,
            chunk_type: self.chunk_type,
        }
    }

    /// Split into `(text, metadata)`, the shape the vector index stores.
    pub fn split(self) -> (String, ChunkMetadata) {
        let metadata = self.metadata();
        (self.chunk_text, metadata)
    }
}

/// Every [`ChunkRecord`] field except `chunk_text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub doc_id: String,
    pub source_path: String,
    pub year: Option<i32>,
    pub doc_type: String,
    pub audited: bool,
    pub period: String,
    pub page_number: u32,
    pub chunk_id: String,
    pub chunk_index: u32,
    pub chunk_type: ChunkType,
}

/// A retrieved chunk used as grounding material for an answer.
///
/// `distance` comes straight from the index: lower means more similar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub chunk_id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub distance: f32,
}
