//! Speech response classification
//!
//! Pure keyword matching over a fixed lexicon. No scoring: the affirmative
//! lexicon is checked first, and the first class with a match wins.

use crate::types::ResponseClassification;

/// Phrases indicating the patient has taken their medication
const AFFIRMATIVE: &[&str] = &["yes", "yeah", "yep", "correct", "i did", "i have"];

/// Phrases indicating the patient has not taken their medication
const NEGATIVE: &[&str] = &["no", "nope", "haven't", "i haven't", "not yet", "didn't"];

/// Classify a free-text utterance as affirmative, negative, or unclear.
///
/// Case and surrounding whitespace are normalized before matching. Lexicon
/// entries match on word boundaries, so "no I haven't" does not match the
/// affirmative phrase "i have".
pub fn classify(utterance: &str) -> ResponseClassification {
    let speech = utterance.trim().to_lowercase();
    // Strip punctuation stuck to words ("yeah," / "no!") but keep interior
    // apostrophes so "haven't" survives.
    let words: Vec<&str> = speech
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\''))
        .filter(|w| !w.is_empty())
        .collect();

    if matches_lexicon(&words, AFFIRMATIVE) {
        ResponseClassification::Affirmative
    } else if matches_lexicon(&words, NEGATIVE) {
        ResponseClassification::Negative
    } else {
        ResponseClassification::Unclear
    }
}

/// True if any lexicon phrase appears as a contiguous word sequence.
fn matches_lexicon(words: &[&str], lexicon: &[&str]) -> bool {
    lexicon.iter().any(|phrase| {
        let phrase_words: Vec<&str> = phrase.split_whitespace().collect();
        words
            .windows(phrase_words.len())
            .any(|window| window == phrase_words.as_slice())
    })
}
