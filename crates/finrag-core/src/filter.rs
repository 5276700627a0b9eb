//! Conjunctive metadata filters and the filter builder.
//!
//! A [`RetrievalFilter`] is a plain field→value map; every entry must hold for
//! a chunk to qualify. Fields the builder does not know about are carried
//! verbatim, since validating them against the index schema is the index's
//! job.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::ChunkMetadata;
use crate::temporal::TemporalResolution;

pub const DOC_TYPE: &str = "doc_type";
pub const YEAR: &str = "year";
pub const PERIOD: &str = "period";
pub const AUDITED: &str = "audited";

/// The only document type for which audit intent narrows the filter.
pub const AUDITABLE_DOC_TYPE: &str = "financial_statements";

/// A scalar filter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl FilterValue {
    fn to_json(&self) -> serde_json::Value {
        match self {
            FilterValue::Bool(b) => serde_json::Value::Bool(*b),
            FilterValue::Int(i) => serde_json::Value::from(*i),
            FilterValue::Str(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        FilterValue::Str(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        FilterValue::Str(s)
    }
}

impl From<i64> for FilterValue {
    fn from(i: i64) -> Self {
        FilterValue::Int(i)
    }
}

impl From<i32> for FilterValue {
    fn from(i: i32) -> Self {
        FilterValue::Int(i64::from(i))
    }
}

impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        FilterValue::Bool(b)
    }
}

/// Conjunctive metadata predicate (`field == value` for every entry).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RetrievalFilter {
    fields: BTreeMap<String, FilterValue>,
}

impl RetrievalFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<FilterValue>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&FilterValue> {
        self.fields.get(field)
    }

    pub fn remove(&mut self, field: &str) -> Option<FilterValue> {
        self.fields.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FilterValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Copy of this filter without `field`.
    pub fn without(&self, field: &str) -> Self {
        let mut copy = self.clone();
        copy.remove(field);
        copy
    }

    /// True when every entry of `self` is in `other` and `other` has more.
    pub fn is_strict_subset_of(&self, other: &RetrievalFilter) -> bool {
        self.len() < other.len() && self.fields().all(|(k, v)| other.get(k) == Some(v))
    }

    /// Evaluate against a metadata object already rendered as JSON.
    ///
    /// A field absent from `meta` never matches, and neither does a `null`.
    pub fn matches_json(&self, meta: &serde_json::Map<String, serde_json::Value>) -> bool {
        self.fields
            .iter()
            .all(|(field, value)| meta.get(field) == Some(&value.to_json()))
    }

    pub fn matches(&self, meta: &ChunkMetadata) -> bool {
        if self.is_empty() {
            return true;
        }
        match serde_json::to_value(meta) {
            Ok(serde_json::Value::Object(map)) => self.matches_json(&map),
            _ => false,
        }
    }
}

impl fmt::Display for RetrievalFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(&self.fields).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

/// True when the question carries audit vocabulary (plain substring test).
pub fn has_audit_intent(question_norm: &str, audit_terms: &[String]) -> bool {
    audit_terms.iter().any(|t| question_norm.contains(t.as_str()))
}

/// Merge a category's base filter with the temporal resolution.
///
/// `year` and `period` are added only when resolved; `audited = true` only
/// when there is audit intent and the base filter targets
/// [`AUDITABLE_DOC_TYPE`].
pub fn build_filter(
    base: &RetrievalFilter,
    temporal: &TemporalResolution,
    audited_intent: bool,
) -> RetrievalFilter {
    let mut filter = base.clone();

    if let Some(year) = temporal.year {
        filter.insert(YEAR, year);
    }

    if let Some(period) = &temporal.period {
        filter.insert(PERIOD, period.clone());
    }

    if audited_intent && filter.get(DOC_TYPE) == Some(&FilterValue::from(AUDITABLE_DOC_TYPE)) {
        filter.insert(AUDITED, true);
    }

    filter
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkType;
    use crate::temporal::YearSource;

    fn temporal(year: Option<i32>, period: Option<&str>) -> TemporalResolution {
        TemporalResolution {
            year,
            year_source: year.map(|_| YearSource::Explicit),
            year_trigger: year.map(|y| y.to_string()),
            month: None,
            month_token: None,
            period: period.map(|p| p.to_string()),
        }
    }

    fn meta(doc_type: &str, year: Option<i32>, period: &str) -> ChunkMetadata {
        ChunkMetadata {
            doc_id: "d".to_string(),
            source_path: "d.pdf".to_string(),
            year,
            doc_type: doc_type.to_string(),
            audited: false,
            period: period.to_string(),
            page_number: 1,
            chunk_id: "d_p001_c_000".to_string(),
            chunk_index: 0,
            chunk_type: ChunkType::Text,
        }
    }

    #[test]
    fn test_build_filter_omits_absent_fields() {
        let base = RetrievalFilter::new().with(DOC_TYPE, "earnings_reports");
        let f = build_filter(&base, &temporal(None, None), false);
        assert_eq!(f.len(), 1);
        assert!(!f.contains(YEAR));
        assert!(!f.contains(PERIOD));
    }

    #[test]
    fn test_build_filter_adds_year_and_period() {
        let base = RetrievalFilter::new().with(DOC_TYPE, "important_facts");
        let f = build_filter(&base, &temporal(Some(2023), Some("2023-04")), false);
        assert_eq!(f.get(YEAR), Some(&FilterValue::Int(2023)));
        assert_eq!(f.get(PERIOD), Some(&FilterValue::from("2023-04")));
    }

    #[test]
    fn test_audited_only_for_financial_statements() {
        let fs = RetrievalFilter::new().with(DOC_TYPE, "financial_statements");
        let er = RetrievalFilter::new().with(DOC_TYPE, "earnings_reports");
        let t = temporal(None, None);

        assert_eq!(
            build_filter(&fs, &t, true).get(AUDITED),
            Some(&FilterValue::Bool(true))
        );
        assert!(!build_filter(&fs, &t, false).contains(AUDITED));
        assert!(!build_filter(&er, &t, true).contains(AUDITED));
    }

    #[test]
    fn test_audit_intent_substring() {
        let terms = vec!["dictamen".to_string(), "auditor".to_string()];
        assert!(has_audit_intent("cual fue el dictamen", &terms));
        assert!(has_audit_intent("informe de auditoria", &terms));
        assert!(!has_audit_intent("ventas del trimestre", &terms));
    }

    #[test]
    fn test_strict_subset() {
        let full = RetrievalFilter::new()
            .with(DOC_TYPE, "important_facts")
            .with(YEAR, 2023)
            .with(PERIOD, "2023-04");
        let no_period = full.without(PERIOD);
        assert!(no_period.is_strict_subset_of(&full));
        assert!(!full.is_strict_subset_of(&full));
        assert!(RetrievalFilter::new().is_strict_subset_of(&no_period));

        let other = RetrievalFilter::new().with(DOC_TYPE, "earnings_reports");
        assert!(!other.is_strict_subset_of(&full));
    }

    #[test]
    fn test_matches_metadata() {
        let m = meta("important_facts", Some(2023), "2023-04");
        let f = RetrievalFilter::new()
            .with(DOC_TYPE, "important_facts")
            .with(YEAR, 2023);
        assert!(f.matches(&m));
        assert!(!f.clone().with(PERIOD, "2023-05").matches(&m));
        assert!(RetrievalFilter::new().matches(&m));
    }

    #[test]
    fn test_null_year_never_matches() {
        let m = meta("financial_statements", None, "no_definido");
        let f = RetrievalFilter::new().with(YEAR, 2023);
        assert!(!f.matches(&m));
    }

    #[test]
    fn test_unknown_field_does_not_match() {
        let m = meta("financial_statements", Some(2023), "no_definido");
        let f = RetrievalFilter::new().with("currency", "PEN");
        assert!(!f.matches(&m));
    }

    #[test]
    fn test_json_round_shape() {
        let f = RetrievalFilter::new()
            .with(DOC_TYPE, "financial_statements")
            .with(YEAR, 2024)
            .with(AUDITED, true);
        assert_eq!(
            f.to_string(),
            r#"{"audited":true,"doc_type":"financial_statements","year":2024}"#
        );
        let parsed: RetrievalFilter =
            serde_json::from_str(r#"{"doc_type":"financial_statements","year":2024,"audited":true}"#)
                .unwrap();
        assert_eq!(parsed, f);
    }
}
