//! Category classification and signal detection.
//!
//! Every category of the [`Lexicon`] is scored against the normalized
//! question:
//!
//! ```text
//! score = 6 × phrase_hits + 1 × word_hits + priority
//! ```
//!
//! `phrase_hits` counts distinct declared phrases occurring as substrings,
//! `word_hits` counts declared words present in the question's `\w+` token
//! set. A category with no hits of either kind is not a candidate, whatever
//! its priority. The highest score wins; equal scores fall back to more
//! phrase hits, then higher priority, then declaration order.
//!
//! [`detect_signals`] composes this with temporal resolution and the filter
//! builder into a [`SignalMatch`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::filter::{build_filter, has_audit_intent, RetrievalFilter};
use crate::lexicon::{CategoryDefinition, Lexicon, DEFAULT_KEY};
use crate::temporal::{self, normalize_question, YearSource};
use crate::text::word_tokens;

const PHRASE_WEIGHT: f64 = 6.0;
const WORD_WEIGHT: f64 = 1.0;

/// Debug reason recorded when no category produced a candidate.
pub const REASON_NO_SIGNAL: &str = "no_signal_matched";

/// Score breakdown of one candidate category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub key: String,
    /// Position in the lexicon's declaration order.
    pub order: usize,
    pub priority: f64,
    pub phrase_hits: Vec<String>,
    pub word_hits: Vec<String>,
    pub score: f64,
}

/// The rule that separated the winner from an equally scored candidate.
///
/// Variants are ordered by depth in the tie-break chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    PhraseHits,
    Priority,
    DeclarationOrder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Candidates in declaration order.
    pub candidates: Vec<Candidate>,
    /// Index into `candidates`.
    pub winner: Option<usize>,
    pub tie_break: Option<TieBreak>,
}

impl Classification {
    pub fn winner(&self) -> Option<&Candidate> {
        self.winner.and_then(|i| self.candidates.get(i))
    }
}

fn score_category(
    order: usize,
    cat: &CategoryDefinition,
    question_norm: &str,
    tokens: &BTreeSet<&str>,
) -> Option<Candidate> {
    let mut phrase_hits: Vec<String> = Vec::new();
    for phrase in &cat.phrases {
        if question_norm.contains(phrase.as_str()) && !phrase_hits.contains(phrase) {
            phrase_hits.push(phrase.clone());
        }
    }

    let word_hits: Vec<String> = cat
        .words
        .iter()
        .filter(|w| tokens.contains(w.as_str()))
        .cloned()
        .collect();

    if phrase_hits.is_empty() && word_hits.is_empty() {
        return None;
    }

    let score = PHRASE_WEIGHT * phrase_hits.len() as f64
        + WORD_WEIGHT * word_hits.len() as f64
        + cat.priority;

    Some(Candidate {
        key: cat.key.clone(),
        order,
        priority: cat.priority,
        phrase_hits,
        word_hits,
        score,
    })
}

/// True when `a` beats `b` on (score, phrase hits, priority).
fn outranks(a: &Candidate, b: &Candidate) -> bool {
    if a.score != b.score {
        return a.score > b.score;
    }
    if a.phrase_hits.len() != b.phrase_hits.len() {
        return a.phrase_hits.len() > b.phrase_hits.len();
    }
    a.priority > b.priority
}

fn separating_rule(winner: &Candidate, other: &Candidate) -> TieBreak {
    if winner.phrase_hits.len() != other.phrase_hits.len() {
        TieBreak::PhraseHits
    } else if winner.priority != other.priority {
        TieBreak::Priority
    } else {
        TieBreak::DeclarationOrder
    }
}

/// Score every category of `lexicon` against an already normalized question.
pub fn classify(question_norm: &str, lexicon: &Lexicon) -> Classification {
    let tokens = word_tokens(question_norm);

    let candidates: Vec<Candidate> = lexicon
        .categories
        .iter()
        .enumerate()
        .filter_map(|(order, cat)| score_category(order, cat, question_norm, &tokens))
        .collect();

    let mut winner: Option<usize> = None;
    for (i, cand) in candidates.iter().enumerate() {
        match winner {
            Some(w) if !outranks(cand, &candidates[w]) => {}
            _ => winner = Some(i),
        }
    }

    let tie_break = winner.and_then(|w| {
        let best = &candidates[w];
        candidates
            .iter()
            .enumerate()
            .filter(|(i, c)| *i != w && c.score == best.score)
            .map(|(_, c)| separating_rule(best, c))
            .max()
    });

    Classification {
        candidates,
        winner,
        tie_break,
    }
}

/// Period sub-signal reported for the winning category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSignalHit {
    pub label: String,
    pub trigger: String,
    pub months: Vec<String>,
}

/// Topic sub-signal reported for the winning category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicSignalHit {
    pub label: String,
    pub triggers: Vec<String>,
}

/// Single-word triggers match whole tokens, multi-word triggers match as
/// substrings.
fn trigger_matches(trigger: &str, question_norm: &str, tokens: &BTreeSet<&str>) -> bool {
    if trigger.contains(char::is_whitespace) {
        question_norm.contains(trigger)
    } else {
        tokens.contains(trigger)
    }
}

fn sub_signals(
    cat: &CategoryDefinition,
    question_norm: &str,
) -> (Option<PeriodSignalHit>, Vec<TopicSignalHit>) {
    let tokens = word_tokens(question_norm);

    let period = cat.period_signals.iter().find_map(|p| {
        p.triggers
            .iter()
            .find(|t| trigger_matches(t, question_norm, &tokens))
            .map(|t| PeriodSignalHit {
                label: p.label.clone(),
                trigger: t.clone(),
                months: p.months.clone(),
            })
    });

    let topics = cat
        .topic_signals
        .iter()
        .filter_map(|t| {
            let triggers: Vec<String> = t
                .triggers
                .iter()
                .filter(|tr| trigger_matches(tr, question_norm, &tokens))
                .cloned()
                .collect();
            (!triggers.is_empty()).then(|| TopicSignalHit {
                label: t.label.clone(),
                triggers,
            })
        })
        .collect();

    (period, topics)
}

/// Trace of how a [`SignalMatch`] was reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDebug {
    pub question_norm: String,
    pub priority: Option<f64>,
    pub phrase_hits: Vec<String>,
    pub word_hits: Vec<String>,
    pub year: Option<i32>,
    pub year_source: Option<YearSource>,
    pub year_trigger: Option<String>,
    pub baseline_year: i32,
    pub month: Option<String>,
    pub month_token: Option<String>,
    pub period: Option<String>,
    pub audited_intent: bool,
    pub tie_break: Option<TieBreak>,
    pub candidates: Vec<Candidate>,
    pub period_signal: Option<PeriodSignalHit>,
    pub topic_signals: Vec<TopicSignalHit>,
    pub reason: Option<String>,
}

/// Winning category, resolved filter and trace for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalMatch {
    pub key: String,
    pub score: f64,
    #[serde(rename = "where")]
    pub filter: RetrievalFilter,
    pub debug: SignalDebug,
}

impl SignalMatch {
    pub fn is_default(&self) -> bool {
        self.key == DEFAULT_KEY
    }
}

/// Classify `question` and resolve its metadata filter.
///
/// Deterministic for a given question, lexicon and baseline year.
pub fn detect_signals(question: &str, lexicon: &Lexicon, baseline_year: i32) -> SignalMatch {
    let question_norm = normalize_question(question);
    let temporal = temporal::resolve(&question_norm, baseline_year);
    let audited_intent = has_audit_intent(&question_norm, &lexicon.audit_terms);
    let classification = classify(&question_norm, lexicon);

    let mut debug = SignalDebug {
        question_norm: question_norm.clone(),
        priority: None,
        phrase_hits: Vec::new(),
        word_hits: Vec::new(),
        year: temporal.year,
        year_source: temporal.year_source,
        year_trigger: temporal.year_trigger.clone(),
        baseline_year,
        month: temporal.month.clone(),
        month_token: temporal.month_token.clone(),
        period: temporal.period.clone(),
        audited_intent,
        tie_break: classification.tie_break,
        candidates: Vec::new(),
        period_signal: None,
        topic_signals: Vec::new(),
        reason: None,
    };

    let winner = classification
        .winner()
        .and_then(|c| lexicon.categories.get(c.order).map(|cat| (c.clone(), cat)));

    let mut signal = match winner {
        Some((cand, cat)) => {
            let (period_signal, topic_signals) = sub_signals(cat, &question_norm);
            debug.priority = Some(cand.priority);
            debug.phrase_hits = cand.phrase_hits.clone();
            debug.word_hits = cand.word_hits.clone();
            debug.period_signal = period_signal;
            debug.topic_signals = topic_signals;
            SignalMatch {
                key: cand.key,
                score: cand.score,
                filter: build_filter(&cat.base_filter, &temporal, audited_intent),
                debug,
            }
        }
        None => {
            debug.reason = Some(REASON_NO_SIGNAL.to_string());
            SignalMatch {
                key: DEFAULT_KEY.to_string(),
                score: 0.0,
                filter: RetrievalFilter::new(),
                debug,
            }
        }
    };

    tracing::debug!(
        key = %signal.key,
        score = signal.score,
        filter = %signal.filter,
        tie_break = ?signal.debug.tie_break,
        candidates = classification.candidates.len(),
        "Signals detected"
    );

    signal.debug.candidates = classification.candidates;
    signal
}
