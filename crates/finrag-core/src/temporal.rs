//! Temporal resolution of a question: year, month and period.
//!
//! Precedence for the year:
//!
//! 1. An explicit `20xx` token (`explicit`), which overrides everything else.
//! 2. Fixed-offset phrases, rules and patterns in declared order
//!    (`relative_phrase`): "este año" = 0, "el año pasado" = −1,
//!    "el próximo año" = +1, with accented and unaccented spellings.
//! 3. Regex rules in declared order: "hace N años" / "N años atrás"
//!    (`relative_regex_past`) and "en N años" (`relative_regex_future`).
//!
//! Month and period are detected independently. [`resolve`] is a pure
//! function of the normalized text and the baseline year.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::text::{fold_accents, word_tokens};

pub use crate::text::normalize_question;

/// How the resolved year was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YearSource {
    Explicit,
    RelativePhrase,
    RelativeRegexPast,
    RelativeRegexFuture,
}

/// Output of [`resolve`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalResolution {
    pub year: Option<i32>,
    pub year_source: Option<YearSource>,
    /// The exact text that produced the year.
    pub year_trigger: Option<String>,
    /// Two-digit month, `"01"`..`"12"`.
    pub month: Option<String>,
    /// The month token that matched (after accent folding).
    pub month_token: Option<String>,
    /// `"YYYY-MM"`.
    pub period: Option<String>,
}

struct OffsetRule {
    offset: i32,
    patterns: &'static [&'static str],
}

const PHRASE_RULES: &[OffsetRule] = &[
    OffsetRule {
        offset: 0,
        patterns: &[
            "este año",
            "este anio",
            "del presente año",
            "del presente anio",
            "en el presente año",
            "en el presente anio",
            "año en curso",
            "anio en curso",
        ],
    },
    OffsetRule {
        offset: -1,
        patterns: &[
            "el año pasado",
            "el anio pasado",
            "año pasado",
            "anio pasado",
            "el año anterior",
            "el anio anterior",
            "año anterior",
            "anio anterior",
            "del año pasado",
            "del anio pasado",
        ],
    },
    OffsetRule {
        offset: 1,
        patterns: &[
            "el próximo año",
            "el proximo anio",
            "próximo año",
            "proximo anio",
            "año que viene",
            "anio que viene",
            "el año que viene",
            "el anio que viene",
            "el siguiente año",
            "el siguiente anio",
        ],
    },
];

#[derive(Clone, Copy)]
enum Direction {
    Past,
    Future,
}

static REGEX_RULES: LazyLock<Vec<(Direction, Regex)>> = LazyLock::new(|| {
    vec![
        (
            Direction::Past,
            Regex::new(r"\bhace\s+([0-9]{1,2})\s+a(?:ñ|n)os?\b").expect("Invalid regex"),
        ),
        (
            Direction::Past,
            Regex::new(r"\b([0-9]{1,2})\s+a(?:ñ|n)os?\s+atr[aá]s\b").expect("Invalid regex"),
        ),
        (
            Direction::Future,
            Regex::new(r"\ben\s+([0-9]{1,2})\s+a(?:ñ|n)os?\b").expect("Invalid regex"),
        ),
    ]
});

static EXPLICIT_YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(20[0-9]{2})\b").expect("Invalid regex"));

static PERIOD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b20[0-9]{2}-(?:0[1-9]|1[0-2])\b").expect("Invalid regex"));

/// Spanish month names and abbreviations, in declaration order.
const MONTHS_ES: &[(&str, &str)] = &[
    ("enero", "01"),
    ("ene", "01"),
    ("febrero", "02"),
    ("feb", "02"),
    ("marzo", "03"),
    ("mar", "03"),
    ("abril", "04"),
    ("abr", "04"),
    ("mayo", "05"),
    ("may", "05"),
    ("junio", "06"),
    ("jun", "06"),
    ("julio", "07"),
    ("jul", "07"),
    ("agosto", "08"),
    ("ago", "08"),
    ("septiembre", "09"),
    ("setiembre", "09"),
    ("sep", "09"),
    ("set", "09"),
    ("octubre", "10"),
    ("oct", "10"),
    ("noviembre", "11"),
    ("nov", "11"),
    ("diciembre", "12"),
    ("dic", "12"),
];

/// Resolve year, month and period from normalized question text.
pub fn resolve(text: &str, baseline_year: i32) -> TemporalResolution {
    let (month, month_token) = match detect_month(text) {
        Some((token, mm)) => (Some(mm.to_string()), Some(token.to_string())),
        None => (None, None),
    };

    let explicit = EXPLICIT_YEAR_RE.captures(text).and_then(|caps| {
        let m = caps.get(1)?;
        let year = m.as_str().parse::<i32>().ok()?;
        Some((year, YearSource::Explicit, m.as_str().to_string()))
    });

    let (year, year_source, year_trigger) = match explicit.or_else(|| relative_year(text, baseline_year)) {
        Some((y, src, trigger)) => (Some(y), Some(src), Some(trigger)),
        None => (None, None, None),
    };

    let period = PERIOD_RE
        .find(text)
        .map(|m| m.as_str().to_string())
        .or_else(|| match (year, month.as_deref()) {
            (Some(y), Some(mm)) => Some(format!("{}-{}", y, mm)),
            _ => None,
        });

    TemporalResolution {
        year,
        year_source,
        year_trigger,
        month,
        month_token,
        period,
    }
}

/// Relative year cues, phrases first and regex rules after.
///
/// The first matching cue decides; if the year it points to overflows `i32`
/// there is no relative year.
pub fn relative_year(text: &str, baseline_year: i32) -> Option<(i32, YearSource, String)> {
    for rule in PHRASE_RULES {
        if let Some(p) = rule.patterns.iter().find(|p| text.contains(**p)) {
            return baseline_year
                .checked_add(rule.offset)
                .map(|year| (year, YearSource::RelativePhrase, p.to_string()));
        }
    }

    for (direction, re) in REGEX_RULES.iter() {
        let Some(caps) = re.captures(text) else {
            continue;
        };
        let (Some(whole), Some(n)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let Ok(n) = n.as_str().parse::<i32>() else {
            continue;
        };
        let (year, source) = match direction {
            Direction::Past => (baseline_year.checked_sub(n), YearSource::RelativeRegexPast),
            Direction::Future => (baseline_year.checked_add(n), YearSource::RelativeRegexFuture),
        };
        return year.map(|year| (year, source, whole.as_str().to_string()));
    }

    None
}

/// Longest month token present in the text; equal lengths keep the earlier
/// declaration.
fn detect_month(text: &str) -> Option<(&'static str, &'static str)> {
    let folded = fold_accents(text);
    let tokens = word_tokens(&folded);

    let mut best: Option<(&'static str, &'static str)> = None;
    for (token, mm) in MONTHS_ES {
        if !tokens.contains(token) {
            continue;
        }
        if best.map_or(true, |(b, _)| token.len() > b.len()) {
            best = Some((token, mm));
        }
    }
    best
}
