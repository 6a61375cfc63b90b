// Candidate phrase extraction from a free-text query.
//
// Chunks are maximal runs of words that are not stopwords or numbers,
// broken at clause punctuation. Content tokens and adjacent content-token
// bigrams follow. Order of first appearance is kept.

use nestfind_core::text::{is_content_token, is_stopword, normalize, word_tokens};
use std::collections::HashSet;

const CLAUSE_BREAKS: &[char] = &[',', '.', ';', ':', '!', '?', '(', ')'];

/// Multi-word chunks of a query, in order.
pub fn chunks(query: &str) -> Vec<String> {
    let normalized = normalize(query);
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for raw in normalized.split_whitespace() {
        let word = raw.trim_matches(|c: char| !c.is_alphanumeric());
        let is_break = word.is_empty()
            || is_stopword(word)
            || word.chars().any(|c| c.is_ascii_digit());
        if is_break {
            flush(&mut current, &mut out);
        } else {
            current.push(word);
        }
        if raw.ends_with(CLAUSE_BREAKS) {
            flush(&mut current, &mut out);
        }
    }
    flush(&mut current, &mut out);
    out
}

fn flush(current: &mut Vec<&str>, out: &mut Vec<String>) {
    if !current.is_empty() {
        out.push(current.join(" "));
        current.clear();
    }
}

/// Content tokens of a query in order of appearance, deduplicated.
pub fn ordered_content_tokens(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    word_tokens(query)
        .into_iter()
        .filter(|t| is_content_token(t) && !t.chars().all(|c| c.is_ascii_digit()))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Chunks, then content tokens, then bigrams of adjacent content tokens.
pub fn candidate_phrases(query: &str) -> Vec<String> {
    let tokens = ordered_content_tokens(query);
    let bigrams = tokens.windows(2).map(|w| format!("{} {}", w[0], w[1]));

    let mut seen = HashSet::new();
    chunks(query)
        .into_iter()
        .chain(tokens.iter().cloned())
        .chain(bigrams)
        .filter(|p| !p.trim().is_empty())
        .filter(|p| seen.insert(p.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunks_split_at_stopwords_and_numbers() {
        assert_eq!(
            chunks("Entire apartment in Centro with wifi, under 100 euros"),
            vec!["entire apartment", "centro", "wifi", "euros"]
        );
    }

    #[test]
    fn test_chunks_keep_inner_hyphens() {
        assert_eq!(chunks("fast Wi-Fi and free parking"), vec!["fast wi-fi", "free parking"]);
    }

    #[test]
    fn test_candidate_phrases_order_and_dedup() {
        let phrases = candidate_phrases("private pool, private garden");
        assert_eq!(
            phrases,
            vec![
                "private pool",
                "private garden",
                "private",
                "pool",
                "garden",
                "pool garden",
            ]
            .into_iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_empty_query() {
        assert!(candidate_phrases("").is_empty());
        assert!(candidate_phrases("with the of").is_empty());
    }

    #[test]
    fn test_accents_stripped() {
        assert_eq!(chunks("Chamberí apartment"), vec!["chamberi apartment"]);
    }
}
