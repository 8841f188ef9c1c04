//! Bounded-memory inverted index construction and ranked boolean search.
//!
//! Documents are folded into sorted partial indices a group at a time
//! ([`builder`]), the partials are k-way merged into per-leading-character
//! tf-idf shards ([`merge`]), and queries intersect shard posting lists into a
//! paged result stream ([`search`]).

pub mod builder;
pub mod codec;
pub mod config;
pub mod error;
pub mod extract;
pub mod merge;
pub mod persist;
pub mod registry;
pub mod search;
pub mod tokenizer;

pub use error::{Error, Result};

pub type DocId = u32;

/// Accumulated, tier-boosted occurrence count held by partial indices.
pub type RawWeight = u64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Posting<W> {
    pub doc_id: DocId,
    pub weight: W,
}

impl<W> Posting<W> {
    pub fn new(doc_id: DocId, weight: W) -> Self {
        Self { doc_id, weight }
    }
}

/// Pre-merge posting: `weight` is a raw count.
pub type RawPosting = Posting<RawWeight>;

/// Post-merge posting: `weight` is a tf-idf score.
pub type ScoredPosting = Posting<f64>;
