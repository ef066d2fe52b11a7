//! Text utilities for the search and traversal engines.
//!
//! Tokenization, stop-word filtering, lightweight morphology for the normal
//! search tier, and trigram similarity for the fuzzy tier.

// Static regexes use literal patterns validated by tests; expect is confined
// to initialization.
#![allow(clippy::expect_used)]

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-z0-9_]+").expect("token pattern is a valid literal"));

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "and", "for", "are", "but", "not", "you", "all", "can", "had", "her", "was",
        "one", "our", "out", "has", "have", "this", "that", "with", "from", "they", "been",
        "were", "will", "would", "could", "should", "there", "their", "then", "than", "them",
        "when", "what", "where", "which", "while", "into", "onto", "over", "under", "after",
        "before", "about", "because", "does", "doing", "done", "each", "very", "some", "such",
        "also", "only", "more", "most", "other", "these", "those", "being", "both", "between",
    ]
    .into_iter()
    .collect()
});

/// Splits text into lowercase alphanumeric tokens.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    TOKEN_RE
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Returns true for common English stop words.
#[must_use]
pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(word)
}

/// Extracts the keyword set used for similarity matching: stop-word-filtered
/// tokens of length >= 3, deduplicated in first-seen order.
#[must_use]
pub fn keywords(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize(text)
        .into_iter()
        .filter(|t| t.len() >= 3 && !is_stop_word(t))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Generates morphological match keys for a query term.
///
/// Matching a haystack against any of these substrings makes singular/plural
/// and common verb-tense variants of the term find each other:
/// "timeouts" finds "timeout", "retried" finds "retry", "retry" finds
/// "retried"/"retries"/"retrying".
#[must_use]
pub fn term_variants(term: &str) -> Vec<String> {
    let mut variants = vec![term.to_string()];
    let mut push = |v: String| {
        if v.len() >= 3 && !variants.contains(&v) {
            variants.push(v);
        }
    };

    if let Some(stem) = term.strip_suffix("ies") {
        push(format!("{stem}y"));
    }
    if let Some(stem) = term.strip_suffix("ied") {
        push(format!("{stem}y"));
    }
    if let Some(stem) = term.strip_suffix("es") {
        push(stem.to_string());
    }
    if let Some(stem) = term.strip_suffix('s') {
        push(stem.to_string());
    }
    if let Some(stem) = term.strip_suffix("ing") {
        push(stem.to_string());
        push(format!("{stem}e"));
    }
    if let Some(stem) = term.strip_suffix("ed") {
        push(stem.to_string());
        push(format!("{stem}e"));
    }
    if let Some(stem) = term.strip_suffix('y') {
        push(format!("{stem}i"));
    }

    variants
}

/// Substring match with morphology: true when the term or any of its
/// variants appears in the haystack. The haystack must already be lowercase.
#[must_use]
pub fn normal_match(term: &str, haystack: &str) -> bool {
    term_variants(term).iter().any(|v| haystack.contains(v))
}

/// Padded character trigrams of a token.
fn trigrams(token: &str) -> HashSet<String> {
    let padded: Vec<char> = format!("  {token} ").chars().collect();
    padded.windows(3).map(|w| w.iter().collect()).collect()
}

/// Dice coefficient over padded trigram sets, in `[0, 1]`.
#[must_use]
pub fn trigram_similarity(a: &str, b: &str) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let ta = trigrams(a);
    let tb = trigrams(b);
    let shared = ta.intersection(&tb).count();
    #[allow(clippy::cast_precision_loss)]
    let similarity = (2 * shared) as f32 / (ta.len() + tb.len()) as f32;
    similarity
}

/// Minimum trigram similarity for a fuzzy token match.
pub const FUZZY_SIMILARITY_THRESHOLD: f32 = 0.5;

/// Typo-tolerant match: any haystack token whose trigram similarity to the
/// term reaches the threshold. Best-effort by design; callers combine this
/// with [`normal_match`] so the fuzzy tier is a superset of normal.
#[must_use]
pub fn fuzzy_token_match(term: &str, haystack_tokens: &[String]) -> bool {
    haystack_tokens
        .iter()
        .any(|token| trigram_similarity(term, token) >= FUZZY_SIMILARITY_THRESHOLD)
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("Redis Connection-Pool fix!"),
            vec!["redis", "connection", "pool", "fix"]
        );
    }

    #[test]
    fn test_keywords_filters_stop_words_and_short_tokens() {
        let kws = keywords("the timeout in db was from a retry");
        assert_eq!(kws, vec!["timeout", "retry"]);
    }

    #[test_case("timeouts", "connection timeout occurred"; "plural query finds singular")]
    #[test_case("timeout", "timeouts everywhere"; "singular query finds plural")]
    #[test_case("retry", "kept retrying forever"; "base form finds ing form")]
    #[test_case("retry", "we retried twice"; "base form finds past tense")]
    #[test_case("retried", "we retry on failure"; "past tense finds base form")]
    #[test_case("caches", "cache invalidation"; "es plural finds stem")]
    fn test_normal_match_morphology(term: &str, haystack: &str) {
        assert!(normal_match(term, haystack));
    }

    #[test]
    fn test_normal_match_includes_strict() {
        assert!(normal_match("redis", "uses redis heavily"));
        assert!(!normal_match("redis", "uses postgres"));
    }

    #[test]
    fn test_trigram_similarity_bounds() {
        assert_eq!(trigram_similarity("redis", "redis"), 1.0);
        assert_eq!(trigram_similarity("", "redis"), 0.0);
        let sim = trigram_similarity("redis", "rediss");
        assert!(sim > 0.5 && sim < 1.0);
    }

    #[test]
    fn test_fuzzy_token_match_tolerates_typo() {
        let tokens = tokenize("connection timout fix");
        assert!(fuzzy_token_match("timeout", &tokens));
        assert!(!fuzzy_token_match("kubernetes", &tokens));
    }
}
