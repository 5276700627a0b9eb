//! # finrag
//!
//! Evidence retrieval for questions about a Spanish-language financial
//! document corpus (earnings reports, financial statements, important-fact
//! filings).
//!
//! The engine itself lives in [`finrag_core`]: signal detection, temporal
//! resolution, filter building and the adaptive retriever. This crate wires
//! it to the outside world.
//!
//! ## Architecture
//!
//! ```text
//! question ──▶ signals (category + year/period) ──▶ filter
//!                                                     │
//!   embedding client ──▶ query vector ──▶ index query ◀┘
//!                                          │ empty? relax period → year → all
//!                                          ▼
//!                                       evidence
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! finrag signals "¿Cuál fue la utilidad neta el año pasado?"
//! finrag --config ./config/finrag.toml ask "hechos de importancia de abril 2023" --debug
//! finrag --config ./config/finrag.toml repl
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`embedding`] | Embedding provider clients |
//! | [`snapshot`] | JSONL index snapshot loading |
//! | [`ask`] | CLI commands and output formatting |

pub mod ask;
pub mod config;
pub mod embedding;
pub mod snapshot;
