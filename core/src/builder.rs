//! Single-pass, bounded-memory partial index construction.
//!
//! Documents are folded into an in-memory `term -> doc -> weight` map; every
//! `group_size` documents the map is written out as a term-sorted partial
//! index and cleared.

use crate::codec::IndexLine;
use crate::extract::{read_records, source_files, HtmlExtractor, Tier, TokenizedDocument};
use crate::persist::{remove_partials, AtomicFile, IndexPaths};
use crate::registry::RegistryWriter;
use crate::{DocId, Error, Posting, RawPosting, RawWeight, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BuildSummary {
    pub num_docs: u64,
    pub num_partials: usize,
    /// Records that could not be parsed and were left out.
    pub skipped: usize,
}

pub struct PartialIndexBuilder {
    paths: IndexPaths,
    group_size: usize,
    registry: RegistryWriter,
    terms: HashMap<String, HashMap<DocId, RawWeight>>,
    in_group: usize,
    written: Vec<PathBuf>,
}

impl PartialIndexBuilder {
    /// Start a new index generation under `paths`. The registry is staged
    /// next to the partial indices; the live one is only replaced when the
    /// merge publishes.
    pub fn create(paths: &IndexPaths, group_size: usize) -> Result<Self> {
        if group_size == 0 {
            return Err(Error::InvalidConfig("group size must be at least 1".into()));
        }
        fs::create_dir_all(paths.partial_dir())?;
        Ok(Self {
            paths: paths.clone(),
            group_size,
            registry: RegistryWriter::create(paths.staged_registry())?,
            terms: HashMap::new(),
            in_group: 0,
            written: Vec::new(),
        })
    }

    /// Register `doc`, fold its tokens in, and flush if the group is full.
    pub fn add_document(&mut self, doc: &TokenizedDocument) -> Result<DocId> {
        let doc_id = self.registry.append(&doc.url)?;
        for term in &doc.body {
            self.bump(term, doc_id, 1);
        }
        for tier in Tier::ALL {
            let bonus = tier.bonus();
            for term in doc.tier(tier) {
                self.bump(term, doc_id, bonus);
            }
        }
        self.in_group += 1;
        if self.in_group >= self.group_size {
            self.flush()?;
        }
        Ok(doc_id)
    }

    fn bump(&mut self, term: &str, doc_id: DocId, by: RawWeight) {
        if let Some(docs) = self.terms.get_mut(term) {
            *docs.entry(doc_id).or_insert(0) += by;
            return;
        }
        self.terms.entry(term.to_string()).or_default().insert(doc_id, by);
    }

    /// Write the current group as the next numbered partial index.
    fn flush(&mut self) -> Result<()> {
        let group = std::mem::take(&mut self.terms);
        let docs_in_group = std::mem::replace(&mut self.in_group, 0);
        let lines = sorted_lines(group);

        let path = self.paths.partial(self.written.len());
        let mut out = AtomicFile::create(&path)?;
        for line in &lines {
            out.write_line(&line.encode())?;
        }
        let path = out.commit()?;
        tracing::info!(
            partial = self.written.len(),
            docs = docs_in_group,
            terms = lines.len(),
            path = %path.display(),
            "flushed partial index"
        );
        self.written.push(path);
        Ok(())
    }

    /// Flush any remainder and commit the staged registry.
    pub fn finish(mut self) -> Result<BuildSummary> {
        if self.in_group > 0 {
            self.flush()?;
        }
        let num_docs = self.registry.len();
        self.registry.finish()?;
        Ok(BuildSummary {
            num_docs,
            num_partials: self.written.len(),
            skipped: 0,
        })
    }

    pub fn partials(&self) -> &[PathBuf] {
        &self.written
    }
}

/// Terms ascending, postings by weight descending (doc id ascending on ties).
/// The empty term never reaches disk.
fn sorted_lines(group: HashMap<String, HashMap<DocId, RawWeight>>) -> Vec<IndexLine<RawWeight>> {
    let mut lines: Vec<IndexLine<RawWeight>> = group
        .into_iter()
        .filter(|(term, _)| !term.is_empty())
        .map(|(term, docs)| {
            let mut postings: Vec<RawPosting> =
                docs.into_iter().map(|(d, w)| Posting::new(d, w)).collect();
            postings.sort_by(|a, b| b.weight.cmp(&a.weight).then(a.doc_id.cmp(&b.doc_id)));
            IndexLine::new(term, postings)
        })
        .collect();
    lines.sort_by(|a, b| a.term.cmp(&b.term));
    lines
}

/// Walk `source`, index every document record, and write the staged registry
/// plus numbered partial indices under `paths`. The published index is left
/// alone.
///
/// Fails with [`Error::NotADirectory`] before anything on disk is touched if
/// `source` is not a directory.
pub fn build_partial_indices(source: &Path, paths: &IndexPaths, group_size: usize) -> Result<BuildSummary> {
    if !source.is_dir() {
        return Err(Error::NotADirectory(source.to_path_buf()));
    }
    if group_size == 0 {
        return Err(Error::InvalidConfig("group size must be at least 1".into()));
    }
    let files = source_files(source);
    tracing::info!(source = %source.display(), files = files.len(), group_size, "building partial indices");

    let stale = remove_partials(paths)?;
    if stale > 0 {
        tracing::debug!(stale, "removed partial indices from a previous run");
    }

    let mut builder = PartialIndexBuilder::create(paths, group_size)?;
    match ingest(&mut builder, &files) {
        Ok(skipped) => {
            let mut summary = builder.finish()?;
            summary.skipped = skipped;
            tracing::info!(
                num_docs = summary.num_docs,
                num_partials = summary.num_partials,
                skipped,
                "partial indexing complete"
            );
            Ok(summary)
        }
        Err(e) => {
            // Partials without their registry would be unmergeable.
            drop(builder);
            let _ = remove_partials(paths);
            Err(e)
        }
    }
}

fn ingest(builder: &mut PartialIndexBuilder, files: &[PathBuf]) -> Result<usize> {
    let extractor = HtmlExtractor::new();
    let mut skipped = 0usize;
    for file in files {
        for record in read_records(file)? {
            match record {
                Ok(raw) => {
                    builder.add_document(&extractor.extract(&raw.url, &raw.content))?;
                }
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(file = %file.display(), error = %e, "skipping unreadable document");
                }
            }
        }
    }
    Ok(skipped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn flush_sorts_terms_and_drops_empty_term() {
        let mut terms = HashMap::new();
        terms.insert("cat".to_string(), HashMap::from([(0, 16), (1, 2)]));
        terms.insert(String::new(), HashMap::from([(0, 1)]));
        terms.insert("ant".to_string(), HashMap::from([(1, 1)]));
        let lines = sorted_lines(terms);
        let encoded: Vec<String> = lines.iter().map(|l| l.encode()).collect();
        assert_eq!(encoded, vec!["ant - 1:1", "cat - 0:16, 1:2"]);
    }

    #[test]
    fn bonuses_accumulate_with_body() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let mut b = PartialIndexBuilder::create(&paths, 10).unwrap();
        let doc = TokenizedDocument::new("u0", toks("cat dog"))
            .with_tier(Tier::Title, toks("cat"))
            .with_tier(Tier::Bold, toks("dog"))
            .with_tier(Tier::MinorHeading, toks("dog"));
        b.add_document(&doc).unwrap();
        let summary = b.finish().unwrap();
        assert_eq!(summary.num_partials, 1);
        let text = fs::read_to_string(paths.partial(0)).unwrap();
        assert_eq!(text, "cat - 0:16\ndog - 0:5\n");
    }
}
