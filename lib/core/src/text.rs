//! Text normalization shared by every matching and indexing component.
//!
//! Normal form: accents stripped (NFD, combining marks dropped), lowercase,
//! surrounding whitespace trimmed, inner whitespace collapsed to one space.
//! Content tokens are the ASCII alphanumeric words of the normal form that
//! are at least three characters long and are neither stopwords nor
//! domain-generic filler.

use ahash::AHashSet;
use once_cell::sync::Lazy;
use std::collections::BTreeSet;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Minimum length of a content token
pub const MIN_CONTENT_TOKEN_LEN: usize = 3;

/// English stopwords
const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "almost", "alone", "along",
    "already", "also", "although", "always", "am", "among", "an", "and", "another", "any",
    "anyhow", "anyone", "anything", "anyway", "anywhere", "are", "around", "as", "at", "back",
    "be", "became", "because", "become", "been", "before", "being", "below", "beside",
    "besides", "between", "beyond", "both", "but", "by", "can", "cannot", "could", "did",
    "do", "does", "doing", "done", "down", "due", "during", "each", "either", "else",
    "elsewhere", "enough", "even", "ever", "every", "everyone", "everything", "everywhere",
    "few", "for", "former", "from", "front", "full", "further", "get", "give", "go", "had",
    "has", "have", "he", "hence", "her", "here", "hers", "herself", "him", "himself", "his",
    "how", "however", "i", "if", "in", "indeed", "into", "is", "it", "its", "itself", "just",
    "keep", "last", "least", "less", "made", "make", "many", "may", "me", "meanwhile",
    "might", "mine", "more", "moreover", "most", "mostly", "much", "must", "my", "myself",
    "near", "nearby", "neither", "never", "nevertheless", "next", "no", "nobody", "none",
    "nor", "not", "nothing", "now", "nowhere", "of", "off", "often", "on", "once", "one",
    "only", "onto", "or", "other", "others", "otherwise", "our", "ours", "ourselves", "out",
    "over", "own", "per", "perhaps", "please", "put", "quite", "rather", "really", "same",
    "say", "see", "seem", "seemed", "seems", "several", "she", "should", "show", "since",
    "so", "some", "someone", "something", "sometime", "sometimes", "somewhere", "still",
    "such", "take", "than", "that", "the", "their", "them", "themselves", "then", "there",
    "thereafter", "therefore", "these", "they", "this", "those", "though", "through",
    "throughout", "thus", "to", "together", "too", "toward", "towards", "under", "until",
    "up", "upon", "us", "used", "using", "very", "via", "want", "was", "we", "well", "were",
    "what", "whatever", "when", "whenever", "where", "whereas", "wherever", "whether",
    "which", "while", "who", "whoever", "whole", "whom", "whose", "why", "will", "with",
    "within", "without", "would", "yet", "you", "your", "yours", "yourself", "yourselves",
];

/// Domain filler that carries no discriminating meaning in listing queries
const GENERIC_TERMS: &[&str] = &[
    "city", "center", "centre", "view", "area", "place", "space", "access", "daily", "day",
    "night", "room",
];

static STOP_SET: Lazy<AHashSet<&'static str>> = Lazy::new(|| STOP_WORDS.iter().copied().collect());
static GENERIC_SET: Lazy<AHashSet<&'static str>> =
    Lazy::new(|| GENERIC_TERMS.iter().copied().collect());

/// Remove diacritics: decompose and drop combining marks.
pub fn strip_accents(s: &str) -> String {
    s.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Canonical normal form of a string.
pub fn normalize(s: &str) -> String {
    let stripped = strip_accents(s).to_lowercase();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// All ASCII alphanumeric words of the normal form, in order.
pub fn word_tokens(s: &str) -> Vec<String> {
    normalize(s)
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[inline]
pub fn is_stopword(token: &str) -> bool {
    STOP_SET.contains(token)
}

#[inline]
pub fn is_generic(token: &str) -> bool {
    GENERIC_SET.contains(token)
}

#[inline]
pub fn is_content_token(token: &str) -> bool {
    token.len() >= MIN_CONTENT_TOKEN_LEN && !is_stopword(token) && !is_generic(token)
}

/// Content-token set of a string.
pub fn content_tokens(s: &str) -> BTreeSet<String> {
    word_tokens(s)
        .into_iter()
        .filter(|t| is_content_token(t))
        .collect()
}

/// True when `needle` occurs in `haystack` on word boundaries.
/// Both sides are normalized first.
pub fn contains_words(haystack: &str, needle: &str) -> bool {
    let needle = word_tokens(needle);
    if needle.is_empty() {
        return false;
    }
    let hay = word_tokens(haystack);
    hay.windows(needle.len()).any(|w| w == needle.as_slice())
}

/// Upper-case the first letter of every whitespace-separated word.
pub fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
