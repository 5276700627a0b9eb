//! Adaptive retrieval with progressive filter relaxation.
//!
//! # Algorithm
//!
//! 1. Detect signals for the question (always, even under an override).
//! 2. Embed the question once.
//! 3. Query the index under the effective filter: the caller's override if
//!    one was given, otherwise the signal filter. An empty filter is sent as
//!    no filter at all.
//! 4. While the result is empty and no override was given, relax and query
//!    again with the same embedding and `top_k`:
//!    drop `period`, then drop `year`, then drop the whole filter. A step
//!    that would not shrink the filter is skipped.
//! 5. Map hits to [`Evidence`] in index order.
//!
//! An empty result after the last step is a valid outcome. Embedding and
//! index failures are returned as errors and never retried here.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classify::{detect_signals, SignalMatch};
use crate::embedding::Embedder;
use crate::filter::{RetrievalFilter, PERIOD, YEAR};
use crate::lexicon::Lexicon;
use crate::models::Evidence;
use crate::store::{IndexHit, VectorIndex};

#[derive(Error, Debug)]
pub enum RetrieveError {
    #[error("top_k must be >= 1")]
    InvalidTopK,

    #[error("Embedding error")]
    Embedding(#[source] anyhow::Error),

    #[error("Embedding error: provider returned an empty vector")]
    EmptyEmbedding,

    #[error("Vector index error")]
    Index(#[source] anyhow::Error),
}

/// Caller-supplied replacement for the signal-derived filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOverride {
    Where(RetrievalFilter),
    /// Explicitly search without any filter.
    Unfiltered,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrieveRequest {
    pub question: String,
    pub top_k: usize,
    pub filter_override: Option<FilterOverride>,
}

impl RetrieveRequest {
    pub fn new(question: impl Into<String>, top_k: usize) -> Self {
        Self {
            question: question.into(),
            top_k,
            filter_override: None,
        }
    }

    pub fn with_override(mut self, filter_override: FilterOverride) -> Self {
        self.filter_override = Some(filter_override);
        self
    }
}

/// Which step of the cascade produced an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelaxStage {
    Initial,
    DropPeriod,
    DropYear,
    Unfiltered,
}

impl RelaxStage {
    const CASCADE: [RelaxStage; 3] = [
        RelaxStage::DropPeriod,
        RelaxStage::DropYear,
        RelaxStage::Unfiltered,
    ];

    fn relax(self, filter: &RetrievalFilter) -> RetrievalFilter {
        match self {
            RelaxStage::Initial => filter.clone(),
            RelaxStage::DropPeriod => filter.without(PERIOD),
            RelaxStage::DropYear => filter.without(YEAR),
            RelaxStage::Unfiltered => RetrievalFilter::new(),
        }
    }
}

/// One index query made while answering a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub stage: RelaxStage,
    pub filter: RetrievalFilter,
    pub hits: usize,
}

/// Result of [`Retriever::retrieve`]: evidence plus the full trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Retrieval {
    pub evidence: Vec<Evidence>,
    pub signal: SignalMatch,
    pub attempts: Vec<Attempt>,
}

impl Retrieval {
    /// Filter of the attempt that produced the evidence (or the last one).
    pub fn final_filter(&self) -> Option<&RetrievalFilter> {
        self.attempts.last().map(|a| &a.filter)
    }

    pub fn relaxed(&self) -> bool {
        self.attempts.len() > 1
    }
}

/// Map index hits to evidence, preserving order.
pub fn assemble_evidence(hits: Vec<IndexHit>) -> Vec<Evidence> {
    hits.into_iter()
        .map(|hit| Evidence {
            chunk_id: hit.metadata.chunk_id.clone(),
            text: hit.text,
            metadata: hit.metadata,
            distance: hit.distance,
        })
        .collect()
}

pub struct Retriever<E, I> {
    lexicon: Lexicon,
    embedder: E,
    index: I,
    baseline_year: i32,
}

impl<E: Embedder, I: VectorIndex> Retriever<E, I> {
    pub fn new(lexicon: Lexicon, embedder: E, index: I, baseline_year: i32) -> Self {
        Self {
            lexicon,
            embedder,
            index,
            baseline_year,
        }
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    pub fn baseline_year(&self) -> i32 {
        self.baseline_year
    }

    /// Signal detection only; no embedding, no index.
    pub fn detect(&self, question: &str) -> SignalMatch {
        detect_signals(question, &self.lexicon, self.baseline_year)
    }

    pub async fn retrieve(&self, request: &RetrieveRequest) -> Result<Retrieval, RetrieveError> {
        if request.top_k == 0 {
            return Err(RetrieveError::InvalidTopK);
        }

        let signal = self.detect(&request.question);

        let embedding = self.embed_question(request.question.trim()).await?;

        let (initial, may_relax) = match &request.filter_override {
            Some(FilterOverride::Where(filter)) => (filter.clone(), false),
            Some(FilterOverride::Unfiltered) => (RetrievalFilter::new(), false),
            None => (signal.filter.clone(), true),
        };

        let mut attempts = Vec::new();
        let mut hits = self
            .attempt(&embedding, request.top_k, RelaxStage::Initial, &initial, &mut attempts)
            .await?;

        if hits.is_empty() && may_relax {
            let mut current = initial;
            for stage in RelaxStage::CASCADE {
                let next = stage.relax(&current);
                if !next.is_strict_subset_of(&current) {
                    continue;
                }
                tracing::info!(
                    stage = ?stage,
                    from = %current,
                    to = %next,
                    "No evidence, relaxing filter"
                );
                hits = self
                    .attempt(&embedding, request.top_k, stage, &next, &mut attempts)
                    .await?;
                current = next;
                if !hits.is_empty() {
                    break;
                }
            }
        }

        Ok(Retrieval {
            evidence: assemble_evidence(hits),
            signal,
            attempts,
        })
    }

    async fn embed_question(&self, question: &str) -> Result<Vec<f32>, RetrieveError> {
        let vectors = self
            .embedder
            .embed(&[question.to_string()])
            .await
            .map_err(RetrieveError::Embedding)?;

        if vectors.len() != 1 {
            return Err(RetrieveError::Embedding(anyhow::anyhow!(
                "expected 1 embedding, got {}",
                vectors.len()
            )));
        }

        match vectors.into_iter().next() {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(RetrieveError::EmptyEmbedding),
        }
    }

    async fn attempt(
        &self,
        embedding: &[f32],
        top_k: usize,
        stage: RelaxStage,
        filter: &RetrievalFilter,
        attempts: &mut Vec<Attempt>,
    ) -> Result<Vec<IndexHit>, RetrieveError> {
        let where_clause = (!filter.is_empty()).then_some(filter);
        let hits = self
            .index
            .query(embedding, top_k, where_clause)
            .await
            .map_err(RetrieveError::Index)?;

        tracing::debug!(
            stage = ?stage,
            filter = %filter,
            hits = hits.len(),
            "Index query"
        );

        attempts.push(Attempt {
            stage,
            filter: filter.clone(),
            hits: hits.len(),
        });
        Ok(hits)
    }
}
