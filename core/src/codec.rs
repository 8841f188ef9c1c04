//! Line codec for partial and final index files.
//!
//! Every line holds one term and its ordered posting list:
//!
//! ```text
//! term - doc:weight, doc:weight, ...
//! ```
//!
//! Partial indices carry integer counts, final shards carry tf-idf scores
//! printed with [`WEIGHT_PRECISION`](crate::config::WEIGHT_PRECISION) decimals.
//! The codec is pure; callers own the files.

use crate::config::WEIGHT_PRECISION;
use crate::{DocId, Posting, RawWeight};
use std::fmt::Write as _;
use thiserror::Error;

const TERM_SEP: &str = " - ";
const POSTING_SEP: &str = ", ";
const PAIR_SEP: char = ':';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("missing ' - ' separator after term")]
    MissingSeparator,
    #[error("empty term")]
    EmptyTerm,
    #[error("malformed posting {0:?}")]
    MalformedPosting(String),
}

/// A weight type that can live in an index line.
pub trait Weight: Copy {
    fn encode(&self, out: &mut String);
    fn decode(s: &str) -> Option<Self>;
}

impl Weight for RawWeight {
    fn encode(&self, out: &mut String) {
        let _ = write!(out, "{self}");
    }

    fn decode(s: &str) -> Option<Self> {
        s.parse().ok()
    }
}

impl Weight for f64 {
    fn encode(&self, out: &mut String) {
        let _ = write!(out, "{:.*}", WEIGHT_PRECISION, self);
    }

    fn decode(s: &str) -> Option<Self> {
        s.parse::<f64>().ok().filter(|w| w.is_finite())
    }
}

/// One term with its posting list, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexLine<W> {
    pub term: String,
    pub postings: Vec<Posting<W>>,
}

impl<W: Weight> IndexLine<W> {
    pub fn new(term: impl Into<String>, postings: Vec<Posting<W>>) -> Self {
        Self {
            term: term.into(),
            postings,
        }
    }

    /// Render without a trailing newline.
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.term.len() + 3 + self.postings.len() * 10);
        out.push_str(&self.term);
        out.push_str(TERM_SEP);
        for (i, p) in self.postings.iter().enumerate() {
            if i > 0 {
                out.push_str(POSTING_SEP);
            }
            let _ = write!(out, "{}{}", p.doc_id, PAIR_SEP);
            p.weight.encode(&mut out);
        }
        out
    }

    /// Parse one line; a trailing `\n` or `\r\n` is tolerated.
    pub fn decode(line: &str) -> Result<Self, CodecError> {
        let line = line.trim_end_matches(['\n', '\r']);
        let (term, rest) = line.split_once(TERM_SEP).ok_or(CodecError::MissingSeparator)?;
        if term.is_empty() {
            return Err(CodecError::EmptyTerm);
        }
        let rest = rest.trim_end();
        let mut postings = Vec::new();
        if !rest.is_empty() {
            for raw in rest.split(POSTING_SEP) {
                postings.push(decode_posting(raw)?);
            }
        }
        Ok(Self {
            term: term.to_string(),
            postings,
        })
    }
}

/// Read only the term of a line, without touching the postings.
pub fn peek_term(line: &str) -> Option<&str> {
    line.split_once(TERM_SEP).map(|(term, _)| term)
}

fn decode_posting<W: Weight>(raw: &str) -> Result<Posting<W>, CodecError> {
    let malformed = || CodecError::MalformedPosting(raw.to_string());
    let (doc, weight) = raw.trim().split_once(PAIR_SEP).ok_or_else(malformed)?;
    let doc_id: DocId = doc.trim().parse().map_err(|_| malformed())?;
    let weight = W::decode(weight.trim()).ok_or_else(malformed)?;
    Ok(Posting { doc_id, weight })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_raw_counts() {
        let line = IndexLine::new("cat", vec![Posting::new(1, 16u64), Posting::new(0, 2)]);
        assert_eq!(line.encode(), "cat - 1:16, 0:2");
    }

    #[test]
    fn encodes_scores_to_three_decimals() {
        let line = IndexLine::new("dog", vec![Posting::new(4, 1.47712f64), Posting::new(2, 0.0)]);
        assert_eq!(line.encode(), "dog - 4:1.477, 2:0.000");
    }

    #[test]
    fn decodes_final_line() {
        let line: IndexLine<f64> = IndexLine::decode("dog - 4:1.477, 2:0.000\n").unwrap();
        assert_eq!(line.term, "dog");
        assert_eq!(line.postings.len(), 2);
        assert_eq!(line.postings[0].doc_id, 4);
        assert!((line.postings[0].weight - 1.477).abs() < 1e-9);
    }

    #[test]
    fn tolerates_legacy_spacing() {
        let line: IndexLine<u64> = IndexLine::decode("cat - 0: 2, 1: 16").unwrap();
        assert_eq!(line.postings, vec![Posting::new(0, 2), Posting::new(1, 16)]);
    }

    #[test]
    fn rejects_malformed_lines() {
        assert_eq!(IndexLine::<u64>::decode("cat 0:2"), Err(CodecError::MissingSeparator));
        assert_eq!(IndexLine::<u64>::decode(" - 0:2"), Err(CodecError::EmptyTerm));
        assert!(matches!(
            IndexLine::<u64>::decode("cat - 0:two"),
            Err(CodecError::MalformedPosting(_))
        ));
        assert!(matches!(
            IndexLine::<u64>::decode("cat - 0:1.5"),
            Err(CodecError::MalformedPosting(_))
        ));
    }

    #[test]
    fn peeks_term() {
        assert_eq!(peek_term("zebra - 3:0.301"), Some("zebra"));
        assert_eq!(peek_term("garbage"), None);
    }
}
