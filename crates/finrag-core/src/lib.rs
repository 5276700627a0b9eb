//! # finrag core
//!
//! Signal-driven retrieval for a Spanish-language financial document corpus:
//! question normalization, temporal resolution, lexicon-based category
//! classification, metadata filter building and adaptive vector retrieval.
//!
//! This crate contains no tokio runtime, network or filesystem-heavy
//! dependencies. Embedding and the vector index are reached through the
//! [`embedding::Embedder`] and [`store::VectorIndex`] traits; the crate ships
//! [`store::InMemoryIndex`] and leaves embedding clients to the application.
//!
//! ```rust
//! use finrag_core::{detect_signals, Lexicon};
//!
//! let signal = detect_signals("¿Cuál fue la utilidad neta el año pasado?", &Lexicon::builtin(), 2025);
//! assert_eq!(signal.key, "financial_statements");
//! assert_eq!(signal.filter.to_string(), r#"{"doc_type":"financial_statements","year":2024}"#);
//! ```

pub mod classify;
pub mod embedding;
pub mod filter;
pub mod lexicon;
pub mod models;
pub mod retrieve;
pub mod store;
pub mod temporal;
pub mod text;

pub use classify::{detect_signals, SignalMatch};
pub use embedding::Embedder;
pub use filter::RetrievalFilter;
pub use lexicon::Lexicon;
pub use models::{ChunkMetadata, ChunkRecord, ChunkType, Evidence};
pub use retrieve::{FilterOverride, Retrieval, RetrieveError, RetrieveRequest, Retriever};
pub use store::{InMemoryIndex, IndexHit, VectorIndex};
