//! Text normalization
//!
//! Folds case, strips accents and punctuation so that French and English
//! spellings of the same word compare equal.

use std::collections::HashSet;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// Canonicalize text for matching.
///
/// Lower-cases, decomposes (NFD) and drops combining marks, replaces every
/// character that is not a word character, whitespace, apostrophe or hyphen
/// with a space, then collapses whitespace. Idempotent.
pub fn normalize(text: &str) -> String {
    let folded: String = text
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| if is_kept(c) { c } else { ' ' })
        .collect();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_kept(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '\'' || c == '-' || c.is_whitespace()
}

/// Set of adjacent character pairs
pub fn char_bigrams(text: &str) -> HashSet<(char, char)> {
    let chars: Vec<char> = text.chars().collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Jaccard similarity of two bigram sets; 0 when either is empty
pub fn bigram_jaccard(a: &HashSet<(char, char)>, b: &HashSet<(char, char)>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;

    intersection as f64 / union as f64
}
