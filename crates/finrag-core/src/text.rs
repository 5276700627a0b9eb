//! Question normalization and tokenization.
//!
//! Matching throughout the crate is literal: exact substrings and exact
//! token-set membership, no stemming.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").expect("Invalid regex"));

/// Lowercase, collapse whitespace runs to a single space and trim.
pub fn normalize_question(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Set of maximal word-character runs in `text`.
pub fn word_tokens(text: &str) -> BTreeSet<&str> {
    WORD_RE.find_iter(text).map(|m| m.as_str()).collect()
}

/// Replace accented Spanish vowels with their plain form.
pub fn fold_accents(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'á' | 'à' | 'ä' => 'a',
            'é' | 'è' | 'ë' => 'e',
            'í' | 'ì' | 'ï' => 'i',
            'ó' | 'ò' | 'ö' => 'o',
            'ú' | 'ù' | 'ü' => 'u',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_question() {
        assert_eq!(
            normalize_question("  ¿Cuál   fue\tla UTILIDAD\n neta? "),
            "¿cuál fue la utilidad neta?"
        );
        assert_eq!(normalize_question("   "), "");
    }

    #[test]
    fn test_word_tokens_unicode() {
        let tokens = word_tokens("¿cuál fue el ebitda 2t-2024?");
        assert!(tokens.contains("cuál"));
        assert!(tokens.contains("ebitda"));
        assert!(tokens.contains("2t"));
        assert!(tokens.contains("2024"));
        assert!(!tokens.contains("¿cuál"));
    }

    #[test]
    fn test_fold_accents() {
        assert_eq!(fold_accents("séptiembre atrás"), "septiembre atras");
        assert_eq!(fold_accents("año"), "año");
    }
}
