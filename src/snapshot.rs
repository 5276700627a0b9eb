//! JSONL index snapshots.
//!
//! An indexing job exports the vector index as one JSON object per line: the
//! chunk record fields plus its `embedding`:
//!
//! ```json
//! {"doc_id":"eeff_2023","source_path":"data/raw/eeff_2023.pdf","year":2023,
//!  "doc_type":"financial_statements","audited":true,"period":"no_definido",
//!  "page_number":4,"chunk_id":"eeff_2023_p004_c_000","chunk_index":0,
//!  "chunk_text":"Estado de situación financiera ...","chunk_type":"text",
//!  "embedding":[0.012,-0.034,...]}
//! ```
//!
//! Loading one yields an [`InMemoryIndex`] the retriever can query.

use anyhow::{Context, Result};
use finrag_core::{ChunkRecord, InMemoryIndex};
use serde::Deserialize;
use std::io::BufRead;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct SnapshotLine {
    #[serde(flatten)]
    record: ChunkRecord,
    embedding: Vec<f32>,
}

/// Load a snapshot file into an in-memory index.
pub fn load_snapshot(path: &Path) -> Result<InMemoryIndex> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open index snapshot: {}", path.display()))?;
    let index = read_snapshot(std::io::BufReader::new(file))
        .with_context(|| format!("Invalid index snapshot: {}", path.display()))?;

    tracing::info!(
        path = %path.display(),
        chunks = index.len(),
        dims = ?index.dims(),
        "Index snapshot loaded"
    );
    Ok(index)
}

/// Read snapshot lines from any buffered reader.
///
/// Blank lines are skipped. A later line with an already seen `chunk_id`
/// replaces the earlier one.
pub fn read_snapshot<R: BufRead>(reader: R) -> Result<InMemoryIndex> {
    let index = InMemoryIndex::new();
    let mut lines_read = 0usize;

    for (i, line) in reader.lines().enumerate() {
        let line_no = i + 1;
        let line = line.with_context(|| format!("line {}: read failed", line_no))?;
        if line.trim().is_empty() {
            continue;
        }

        let parsed: SnapshotLine = serde_json::from_str(&line)
            .with_context(|| format!("line {}: malformed chunk record", line_no))?;
        index
            .insert(parsed.record, parsed.embedding)
            .with_context(|| format!("line {}", line_no))?;
        lines_read += 1;
    }

    if lines_read > index.len() {
        tracing::debug!(
            duplicates = lines_read - index.len(),
            "Duplicate chunk ids in snapshot, kept last"
        );
    }

    Ok(index)
}
