//! Category lexicon: the immutable table the classifier scores against.
//!
//! The built-in table covers three document categories of a Spanish-language
//! financial corpus. A deployment can replace it with a TOML file of the same
//! shape:
//!
//! ```toml
//! audit_terms = ["auditado", "dictamen"]
//!
//! [[categories]]
//! key = "financial_statements"
//! priority = 30
//! phrases = ["estado de resultados"]
//! words = ["activos", "pasivos"]
//! base_filter = { doc_type = "financial_statements" }
//! ```
//!
//! Entries are matched literally against the lowercased question, so every
//! phrase, word and trigger must already be lowercase.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::filter::{FilterValue, RetrievalFilter, DOC_TYPE};

/// Key reserved for the no-match outcome.
pub const DEFAULT_KEY: &str = "default";

/// A sub-signal naming a reporting period inside a category (e.g. `Q2`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSignal {
    pub label: String,
    pub triggers: Vec<String>,
    /// Two-digit months covered by the period.
    #[serde(default)]
    pub months: Vec<String>,
}

/// A sub-signal naming a topic inside a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicSignal {
    pub label: String,
    pub triggers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDefinition {
    pub key: String,
    pub priority: f64,
    #[serde(default)]
    pub phrases: Vec<String>,
    #[serde(default)]
    pub words: BTreeSet<String>,
    pub base_filter: RetrievalFilter,
    #[serde(default)]
    pub period_signals: Vec<PeriodSignal>,
    #[serde(default)]
    pub topic_signals: Vec<TopicSignal>,
}

/// Ordered category table plus the audit-intent vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lexicon {
    pub categories: Vec<CategoryDefinition>,
    #[serde(default = "default_audit_terms")]
    pub audit_terms: Vec<String>,
}

fn default_audit_terms() -> Vec<String> {
    strings(&[
        "auditado",
        "auditados",
        "dictamen",
        "opinion del auditor",
        "auditor",
    ])
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn period(label: &str, triggers: &[&str], months: &[&str]) -> PeriodSignal {
    PeriodSignal {
        label: label.to_string(),
        triggers: strings(triggers),
        months: strings(months),
    }
}

fn topic(label: &str, triggers: &[&str]) -> TopicSignal {
    TopicSignal {
        label: label.to_string(),
        triggers: strings(triggers),
    }
}

fn category(key: &str, priority: f64, phrases: &[&str], words: &[&str]) -> CategoryDefinition {
    CategoryDefinition {
        key: key.to_string(),
        priority,
        phrases: strings(phrases),
        words: words.iter().map(|w| w.to_string()).collect(),
        base_filter: RetrievalFilter::new().with(DOC_TYPE, key),
        period_signals: Vec::new(),
        topic_signals: Vec::new(),
    }
}

const ALL_MONTHS: &[&str] = &[
    "01", "02", "03", "04", "05", "06", "07", "08", "09", "10", "11", "12",
];

impl Lexicon {
    /// The built-in table: `earnings_reports`, `financial_statements`,
    /// `important_facts`, in that declaration order.
    pub fn builtin() -> Self {
        let mut earnings = category(
            "earnings_reports",
            10.0,
            &[
                "presentacion de resultados",
                "informe trimestral",
                "reporte trimestral",
                "resultados trimestrales",
                "earnings release",
                "quarterly results",
                "trading update",
                "1t",
                "2t",
                "3t",
                "4t",
                "primer trimestre",
                "segundo trimestre",
                "tercer trimestre",
                "cuarto trimestre",
                "q1",
                "q2",
                "q3",
                "q4",
                "first quarter",
                "second quarter",
                "third quarter",
                "fourth quarter",
                "6m",
                "semestral",
                "primer semestre",
                "segundo semestre",
                "half year",
                "9m",
                "nueve meses",
                "nine months",
                "12m",
                "doce meses",
                "twelve months",
                "full year",
                "resultados anuales",
                "informe anual",
                "reporte anual",
            ],
            &[
                "trimestre",
                "trimestral",
                "quarter",
                "resultados",
                "ganancias",
                "earnings",
                "ingresos",
                "ventas",
                "volumen",
                "precio",
                "mix",
                "margen",
                "bruto",
                "operativo",
                "neto",
                "ebitda",
                "ajustado",
                "adjusted",
                "capex",
                "inversion",
                "flujo",
                "caja",
                "cash",
                "cashflow",
                "deuda",
                "apalancamiento",
                "leverage",
                "guidance",
                "outlook",
                "proyecciones",
                "estimaciones",
                "crecimiento",
                "yoy",
                "qoq",
                "consolidado",
                "consolidados",
            ],
        );
        earnings.period_signals = vec![
            period(
                "Q1",
                &["1t", "q1", "primer trimestre", "first quarter"],
                &["01", "02", "03"],
            ),
            period(
                "Q2",
                &["2t", "q2", "segundo trimestre", "second quarter"],
                &["04", "05", "06"],
            ),
            period(
                "Q3",
                &["3t", "q3", "tercer trimestre", "third quarter"],
                &["07", "08", "09"],
            ),
            period(
                "Q4",
                &["4t", "q4", "cuarto trimestre", "fourth quarter"],
                &["10", "11", "12"],
            ),
            period(
                "6M",
                &["6m", "semestral", "half year"],
                &["01", "02", "03", "04", "05", "06"],
            ),
            period(
                "H1",
                &["primer semestre", "first half", "h1"],
                &["01", "02", "03", "04", "05", "06"],
            ),
            period(
                "H2",
                &["segundo semestre", "second half", "h2"],
                &["07", "08", "09", "10", "11", "12"],
            ),
            period(
                "9M",
                &["9m", "nueve meses", "nine months"],
                &["01", "02", "03", "04", "05", "06", "07", "08", "09"],
            ),
            period(
                "12M",
                &[
                    "12m",
                    "doce meses",
                    "twelve months",
                    "full year",
                    "resultados anuales",
                    "informe anual",
                    "reporte anual",
                    "fy",
                ],
                ALL_MONTHS,
            ),
        ];

        let statements = category(
            "financial_statements",
            30.0,
            &[
                "estado de resultados",
                "estado de resultados integrales",
                "estado de situacion financiera",
                "estado de flujos de efectivo",
                "cambios en el patrimonio",
                "notas a los estados financieros",
                "politicas contables",
                "estados financieros",
                "eeff",
                "dictamen del auditor",
            ],
            &[
                "activos",
                "pasivos",
                "patrimonio",
                "ingresos",
                "ventas",
                "costo",
                "costos",
                "gastos",
                "utilidad",
                "perdida",
                "utilidad neta",
                "resultado neto",
                "flujo",
                "efectivo",
                "equivalentes",
                "depreciacion",
                "deterioro",
                "impuesto",
                "auditor",
                "auditado",
                "dictamen",
            ],
        );

        let mut facts = category(
            "important_facts",
            20.0,
            &[
                "hecho de importancia",
                "hechos de importancia",
                "comunicacion de hecho de importancia",
                "informacion a la smv",
                "superintendencia del mercado de valores",
                "smv",
                "comunicado al mercado",
                "convocatoria a junta",
                "convocatoria a junta general",
                "junta general de accionistas",
                "junta de accionistas",
                "asamblea de accionistas",
                "sesion de directorio",
                "acuerdos de junta",
                "acuerdo de junta",
                "agenda de la junta",
                "orden del dia",
                "quorum",
                "poderes para la junta",
                "otorgamiento de poderes",
                "emision de valores",
                "programa de bonos",
                "programa de instrumentos",
                "bonos corporativos",
                "papeles comerciales",
                "instrumentos de deuda",
                "oferta publica",
                "colocacion",
                "prospecto",
                "registro de valores",
                "inscripcion en el registro",
                "tasa de interes",
                "plazo de vencimiento",
                "condiciones de la emision",
                "recompra",
                "programa de recompra",
                "recompra de acciones",
                "adquisicion de acciones propias",
                "redencion",
                "rescate",
                "cancelacion anticipada",
                "amortizacion",
                "rescate anticipado",
                "call option",
            ],
            &[
                "hecho",
                "importancia",
                "smv",
                "mercado",
                "comunicado",
                "relevante",
                "convocatoria",
                "junta",
                "accionistas",
                "asamblea",
                "directorio",
                "sesion",
                "acuerdo",
                "agenda",
                "quorum",
                "votacion",
                "delegacion",
                "emision",
                "valores",
                "bonos",
                "deuda",
                "instrumentos",
                "papeles",
                "prospecto",
                "registro",
                "oferta",
                "colocacion",
                "tasa",
                "interes",
                "vencimiento",
                "recompra",
                "redencion",
                "rescate",
                "amortizacion",
                "cancelacion",
                "anticipada",
            ],
        );
        facts.topic_signals = vec![
            topic(
                "junta_convocatoria",
                &[
                    "convocatoria",
                    "junta",
                    "accionistas",
                    "asamblea",
                    "agenda",
                    "orden del dia",
                ],
            ),
            topic(
                "emision_valores",
                &[
                    "emision",
                    "valores",
                    "bonos",
                    "papeles comerciales",
                    "prospecto",
                    "colocacion",
                ],
            ),
            topic(
                "recompra_redencion_rescate",
                &[
                    "recompra",
                    "redencion",
                    "rescate",
                    "amortizacion",
                    "cancelacion anticipada",
                ],
            ),
            topic("otros", &["evento", "relevante", "comunicado"]),
        ];

        Self {
            categories: vec![earnings, statements, facts],
            audit_terms: default_audit_terms(),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let lexicon: Lexicon =
            toml::from_str(content).with_context(|| "Failed to parse lexicon file")?;
        lexicon.validate()?;
        Ok(lexicon)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read lexicon file: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid lexicon file: {}", path.display()))
    }

    pub fn category(&self, key: &str) -> Option<&CategoryDefinition> {
        self.categories.iter().find(|c| c.key == key)
    }

    pub fn validate(&self) -> Result<()> {
        if self.categories.is_empty() {
            anyhow::bail!("lexicon must declare at least one category");
        }

        let mut seen = HashSet::new();
        for cat in &self.categories {
            if cat.key.trim().is_empty() {
                anyhow::bail!("lexicon category key must not be empty");
            }
            if cat.key == DEFAULT_KEY {
                anyhow::bail!("lexicon category key '{}' is reserved", DEFAULT_KEY);
            }
            if !seen.insert(cat.key.as_str()) {
                anyhow::bail!("duplicate lexicon category '{}'", cat.key);
            }
            if !cat.priority.is_finite() {
                anyhow::bail!("category '{}': priority must be a finite number", cat.key);
            }
            if cat.phrases.is_empty() && cat.words.is_empty() {
                anyhow::bail!("category '{}' declares neither phrases nor words", cat.key);
            }
            match cat.base_filter.get(DOC_TYPE) {
                Some(FilterValue::Str(_)) if cat.base_filter.len() == 1 => {}
                _ => anyhow::bail!(
                    "category '{}': base_filter must contain exactly a string '{}'",
                    cat.key,
                    DOC_TYPE
                ),
            }

            let entries = cat
                .phrases
                .iter()
                .chain(cat.words.iter())
                .chain(cat.period_signals.iter().flat_map(|p| p.triggers.iter()))
                .chain(cat.topic_signals.iter().flat_map(|t| t.triggers.iter()));
            for entry in entries {
                check_entry(&cat.key, entry)?;
            }
        }

        for term in &self.audit_terms {
            check_entry("audit_terms", term)?;
        }

        Ok(())
    }
}

impl Default for Lexicon {
    fn default() -> Self {
        Self::builtin()
    }
}

fn check_entry(owner: &str, entry: &str) -> Result<()> {
    if entry.trim().is_empty() {
        anyhow::bail!("{}: empty lexicon entry", owner);
    }
    if entry != entry.to_lowercase() || entry != entry.trim() {
        anyhow::bail!(
            "{}: lexicon entry '{}' must be lowercase without surrounding whitespace",
            owner,
            entry
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_declaration_order_and_priorities() {
        let lex = Lexicon::builtin();
        let keys: Vec<_> = lex.categories.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["earnings_reports", "financial_statements", "important_facts"]
        );
        let priorities: Vec<_> = lex.categories.iter().map(|c| c.priority).collect();
        assert_eq!(priorities, vec![10.0, 30.0, 20.0]);
        lex.validate().unwrap();
    }

    #[test]
    fn test_builtin_base_filters() {
        let lex = Lexicon::builtin();
        for cat in &lex.categories {
            assert_eq!(
                cat.base_filter.get(DOC_TYPE),
                Some(&FilterValue::from(cat.key.as_str()))
            );
        }
    }

    #[test]
    fn test_builtin_sub_signals() {
        let lex = Lexicon::builtin();
        let er = lex.category("earnings_reports").unwrap();
        let labels: Vec<_> = er.period_signals.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["Q1", "Q2", "Q3", "Q4", "6M", "H1", "H2", "9M", "12M"]);
        assert_eq!(er.period_signals[8].months.len(), 12);

        let hi = lex.category("important_facts").unwrap();
        assert_eq!(hi.topic_signals.len(), 4);
        assert!(lex.category("financial_statements").unwrap().topic_signals.is_empty());
    }

    #[test]
    fn test_from_toml_str() {
        let lex = Lexicon::from_toml_str(
            r#"
audit_terms = ["auditado"]

[[categories]]
key = "financial_statements"
priority = 30
phrases = ["estado de resultados"]
words = ["activos"]
base_filter = { doc_type = "financial_statements" }

[[categories]]
key = "important_facts"
priority = 20
words = ["junta"]
base_filter = { doc_type = "important_facts" }

[[categories.topic_signals]]
label = "junta_convocatoria"
triggers = ["junta"]
"#,
        )
        .unwrap();
        assert_eq!(lex.categories.len(), 2);
        assert_eq!(lex.audit_terms, vec!["auditado".to_string()]);
        assert!(lex.categories[1].phrases.is_empty());
        assert_eq!(lex.categories[1].topic_signals[0].label, "junta_convocatoria");
    }

    #[test]
    fn test_audit_terms_default_when_omitted() {
        let lex = Lexicon::from_toml_str(
            r#"
[[categories]]
key = "eeff"
priority = 1
words = ["activos"]
base_filter = { doc_type = "financial_statements" }
"#,
        )
        .unwrap();
        assert!(lex.audit_terms.contains(&"dictamen".to_string()));
    }

    #[test]
    fn test_rejects_empty_category_list() {
        let err = Lexicon::from_toml_str("categories = []").unwrap_err();
        assert!(err.to_string().contains("at least one category"));
    }

    #[test]
    fn test_rejects_duplicate_and_reserved_keys() {
        let dup = r#"
[[categories]]
key = "a"
priority = 1
words = ["x"]
base_filter = { doc_type = "a" }

[[categories]]
key = "a"
priority = 2
words = ["y"]
base_filter = { doc_type = "a" }
"#;
        assert!(Lexicon::from_toml_str(dup)
            .unwrap_err()
            .to_string()
            .contains("duplicate"));

        let reserved = r#"
[[categories]]
key = "default"
priority = 1
words = ["x"]
base_filter = { doc_type = "a" }
"#;
        assert!(Lexicon::from_toml_str(reserved)
            .unwrap_err()
            .to_string()
            .contains("reserved"));
    }

    #[test]
    fn test_rejects_category_without_lexical_entries() {
        let toml = r#"
[[categories]]
key = "a"
priority = 5
base_filter = { doc_type = "a" }
"#;
        let err = Lexicon::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("neither phrases nor words"));
    }

    #[test]
    fn test_rejects_non_doc_type_base_filter() {
        let toml = r#"
[[categories]]
key = "a"
priority = 5
words = ["x"]
base_filter = { doc_type = "a", year = 2023 }
"#;
        assert!(Lexicon::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_rejects_uppercase_entries() {
        let toml = r#"
[[categories]]
key = "a"
priority = 5
phrases = ["Estado de Resultados"]
base_filter = { doc_type = "a" }
"#;
        let err = Lexicon::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("lowercase"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Lexicon::load(Path::new("/nonexistent/lexicon.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read lexicon file"));
    }
}
