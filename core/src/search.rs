//! Ranked AND queries over the final shards.

use crate::codec::{peek_term, IndexLine};
use crate::persist::IndexPaths;
use crate::registry::RegistryReader;
use crate::tokenizer::tokenize;
use crate::{DocId, Error, Posting, Result, ScoredPosting};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};

/// How a multi-term AND query scores the documents it keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScoringMode {
    /// Sum the weights of every matched term.
    #[default]
    IncludeProbe,
    /// Sum only the non-probe terms, leaving out the shortest posting
    /// list's own weight. Kept for parity with indices ranked that way.
    ExcludeProbe,
}

/// Results in descending score order, produced once from a pre-sorted list.
#[derive(Debug)]
pub struct ResultStream {
    inner: std::vec::IntoIter<ScoredPosting>,
    total: usize,
}

impl ResultStream {
    fn new(ranked: Vec<ScoredPosting>) -> Self {
        let total = ranked.len();
        Self { inner: ranked.into_iter(), total }
    }

    /// Hits in the stream before anything was consumed.
    pub fn total(&self) -> usize {
        self.total
    }
}

impl Iterator for ResultStream {
    type Item = ScoredPosting;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for ResultStream {}

#[derive(Debug)]
pub struct SearchOutcome {
    pub query: String,
    /// Query terms found in the index, in query order.
    pub matched: Vec<String>,
    /// Query terms with no shard entry; they were left out of the AND-set.
    pub missing: Vec<String>,
    pub results: ResultStream,
}

#[derive(Debug, Clone, Serialize)]
pub struct Hit {
    /// 1-based position in the full ranking.
    pub rank: usize,
    pub doc_id: DocId,
    /// `None` if the registry has no line for this document.
    pub url: Option<String>,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page {
    /// 1-based.
    pub number: usize,
    pub hits: Vec<Hit>,
    pub total: usize,
}

impl Page {
    pub fn is_last(&self) -> bool {
        self.hits.last().map_or(true, |h| h.rank >= self.total)
    }
}

/// Hands out one page per call; the caller decides whether to ask again.
pub struct Paginator {
    results: ResultStream,
    registry: RegistryReader,
    page_size: usize,
    served: usize,
    pages: usize,
}

impl Paginator {
    pub fn new(results: ResultStream, registry: RegistryReader, page_size: usize) -> Result<Self> {
        if page_size == 0 {
            return Err(Error::InvalidConfig("page size must be at least 1".into()));
        }
        Ok(Self { results, registry, page_size, served: 0, pages: 0 })
    }

    pub fn total(&self) -> usize {
        self.results.total()
    }

    pub fn remaining(&self) -> usize {
        self.results.len()
    }

    /// Next page, or `None` once every result has been handed out.
    pub fn next_page(&mut self) -> Result<Option<Page>> {
        let batch: Vec<ScoredPosting> = self.results.by_ref().take(self.page_size).collect();
        if batch.is_empty() {
            return Ok(None);
        }
        let mut hits = Vec::with_capacity(batch.len());
        for p in batch {
            self.served += 1;
            hits.push(Hit {
                rank: self.served,
                doc_id: p.doc_id,
                url: self.registry.url(p.doc_id)?,
                score: p.weight,
            });
        }
        self.pages += 1;
        Ok(Some(Page { number: self.pages, hits, total: self.results.total() }))
    }

    /// Skip `n` pages without resolving their URLs.
    pub fn skip_pages(&mut self, n: usize) {
        let skipped = self.results.by_ref().take(n.saturating_mul(self.page_size)).count();
        self.served += skipped;
        self.pages += skipped.div_ceil(self.page_size);
    }
}

/// Read-only view over one index directory.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    paths: IndexPaths,
}

impl QueryEngine {
    pub fn new(paths: IndexPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &IndexPaths {
        &self.paths
    }

    /// Scan the shard for `term`'s leading character. Shards are sorted, so
    /// the scan stops at the first line past `term`.
    pub fn lookup(&self, term: &str) -> Result<Option<IndexLine<f64>>> {
        let Some(leading) = term.chars().next() else {
            return Ok(None);
        };
        let path = self.paths.shard(leading);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(term, shard = %path.display(), "no shard for term");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            let Some(found) = peek_term(&line) else {
                continue;
            };
            if found == term {
                let entry = IndexLine::<f64>::decode(&line).map_err(|e| Error::corrupt(&path, i + 1, e.to_string()))?;
                tracing::debug!(term, postings = entry.postings.len(), "term found");
                return Ok(Some(entry));
            }
            if found > term {
                break;
            }
        }
        Ok(None)
    }

    /// Resolve `query` to a ranked result stream. Missing terms narrow the
    /// AND-set instead of failing the query.
    pub fn search(&self, query: &str, mode: ScoringMode) -> Result<SearchOutcome> {
        let mut seen = HashSet::new();
        let terms: Vec<String> = tokenize(query).into_iter().filter(|t| seen.insert(t.clone())).collect();

        let mut matched = Vec::new();
        let mut missing = Vec::new();
        let mut lists = Vec::new();
        for term in terms {
            match self.lookup(&term)? {
                Some(entry) => {
                    matched.push(term);
                    lists.push(entry);
                }
                None => {
                    tracing::info!(term = %term, "no documents contain term");
                    missing.push(term);
                }
            }
        }

        let ranked = intersect(&lists, mode);
        tracing::info!(query, matched = matched.len(), missing = missing.len(), hits = ranked.len(), "query resolved");
        Ok(SearchOutcome {
            query: query.to_string(),
            matched,
            missing,
            results: ResultStream::new(ranked),
        })
    }

    /// Page through `results`, resolving URLs from the registry on demand.
    pub fn paginate(&self, results: ResultStream, page_size: usize) -> Result<Paginator> {
        let registry = RegistryReader::open(self.paths.registry())?;
        Paginator::new(results, registry, page_size)
    }
}

/// AND the posting lists together and rank the survivors.
///
/// A single list comes back whole. With several, the shortest one is the
/// probe (first in query order on ties); a document survives only if every
/// list holds it, and only with a positive summed score.
pub fn intersect(lists: &[IndexLine<f64>], mode: ScoringMode) -> Vec<ScoredPosting> {
    let mut ranked = match lists {
        [] => Vec::new(),
        [only] => only.postings.clone(),
        _ => {
            let probe = lists
                .iter()
                .enumerate()
                .min_by_key(|(_, l)| l.postings.len())
                .map(|(i, _)| i)
                .unwrap_or(0);
            let others: Vec<HashMap<DocId, f64>> = lists
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != probe)
                .map(|(_, l)| l.postings.iter().map(|p| (p.doc_id, p.weight)).collect())
                .collect();

            let mut hits = Vec::new();
            'probe: for p in &lists[probe].postings {
                let mut score = match mode {
                    ScoringMode::IncludeProbe => p.weight,
                    ScoringMode::ExcludeProbe => 0.0,
                };
                for other in &others {
                    match other.get(&p.doc_id) {
                        Some(w) => score += w,
                        None => continue 'probe,
                    }
                }
                if score > 0.0 {
                    hits.push(Posting::new(p.doc_id, score));
                }
            }
            hits
        }
    };
    ranked.sort_by(|a, b| b.weight.total_cmp(&a.weight).then(a.doc_id.cmp(&b.doc_id)));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(term: &str, postings: &[(DocId, f64)]) -> IndexLine<f64> {
        IndexLine::new(term, postings.iter().map(|&(d, w)| Posting::new(d, w)).collect())
    }

    #[test]
    fn no_lists_no_results() {
        assert!(intersect(&[], ScoringMode::default()).is_empty());
    }

    #[test]
    fn single_term_keeps_whole_list() {
        let a = line("a", &[(3, 0.0), (1, 2.0), (2, 1.0)]);
        let ranked = intersect(&[a], ScoringMode::IncludeProbe);
        let ids: Vec<DocId> = ranked.iter().map(|p| p.doc_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn probe_exclusive_scoring() {
        let a = line("a", &[(0, 1.0), (1, 2.0)]);
        let b = line("b", &[(1, 3.0), (2, 4.0)]);
        let ranked = intersect(&[a, b], ScoringMode::ExcludeProbe);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].doc_id, 1);
        assert!((ranked[0].weight - 3.0).abs() < 1e-9);
    }

    #[test]
    fn probe_inclusive_scoring_is_default() {
        let a = line("a", &[(0, 1.0), (1, 2.0)]);
        let b = line("b", &[(1, 3.0), (2, 4.0)]);
        let ranked = intersect(&[a, b], ScoringMode::default());
        assert_eq!(ranked.len(), 1);
        assert!((ranked[0].weight - 5.0).abs() < 1e-9);
    }

    #[test]
    fn shorter_list_is_probe() {
        let long = line("long", &[(0, 1.0), (1, 1.0), (2, 1.0)]);
        let short = line("short", &[(2, 5.0)]);
        let ranked = intersect(&[long, short], ScoringMode::ExcludeProbe);
        assert_eq!(ranked.len(), 1);
        assert!((ranked[0].weight - 1.0).abs() < 1e-9);
    }

    #[test]
    fn non_positive_sums_are_dropped() {
        let a = line("a", &[(0, 0.0), (1, 1.0)]);
        let b = line("b", &[(0, 0.0), (1, 0.5)]);
        let ranked = intersect(&[a, b], ScoringMode::IncludeProbe);
        let ids: Vec<DocId> = ranked.iter().map(|p| p.doc_id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn results_only_contain_common_documents() {
        let a = line("a", &[(0, 1.0), (1, 1.0), (2, 1.0), (5, 1.0)]);
        let b = line("b", &[(1, 1.0), (2, 1.0), (5, 1.0)]);
        let c = line("c", &[(2, 1.0), (5, 2.0), (9, 1.0)]);
        let ranked = intersect(&[a, b, c], ScoringMode::IncludeProbe);
        let ids: Vec<DocId> = ranked.iter().map(|p| p.doc_id).collect();
        assert_eq!(ids, vec![5, 2]);
    }
}
