use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref RE: Regex = Regex::new(r"[0-9a-z']+").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
}

/// Fold to lowercase ASCII where possible: NFKD, drop combining marks, lowercase.
fn fold(text: &str) -> String {
    text.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// Normalize a single raw word into an index term. Returns `None` when
/// nothing is left once apostrophes are stripped.
pub fn normalize(word: &str) -> Option<String> {
    let cleaned: String = word.chars().filter(|c| *c != '\'').collect();
    if cleaned.is_empty() {
        return None;
    }
    Some(STEMMER.stem(&cleaned).into_owned())
}

/// Tokenize text into index terms: accent folding, lowercase, split on
/// anything outside `[0-9a-z']`, strip apostrophes, stem.
///
/// The same rule is used for documents and queries so both sides agree on
/// term spelling.
pub fn tokenize(text: &str) -> Vec<String> {
    let folded = fold(text);
    RE.find_iter(&folded)
        .filter_map(|m| normalize(m.as_str()))
        .collect()
}
