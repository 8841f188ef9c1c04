//! K-way merge of partial indices into tf-idf weighted final shards.
//!
//! Every partial index is read forward-only. A min-heap keyed by term yields
//! the globally smallest pending term, so merged output is fully sorted and
//! shards (one per leading character) are written strictly in order. Shards
//! are staged in a scratch directory and only published once the whole pass
//! succeeds.

use crate::codec::IndexLine;
use crate::persist::{
    list_partials, list_shards, remove_partials, save_meta, shard_file_name, AtomicFile,
    IndexPaths, MetaFile,
};
use crate::registry::count_documents;
use crate::{DocId, Error, Posting, RawWeight, Result, ScoredPosting};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    pub num_docs: u64,
    pub num_terms: u64,
    pub shards: Vec<char>,
}

/// `(1 + log10(tf)) * log10(N / df)`; zero when `tf` is zero.
pub fn tfidf(term_freq: RawWeight, doc_freq: usize, total_docs: u64) -> f64 {
    if term_freq == 0 || doc_freq == 0 {
        return 0.0;
    }
    let tf = 1.0 + (term_freq as f64).log10();
    let idf = (total_docs as f64 / doc_freq as f64).log10();
    tf * idf
}

/// Turn aggregated raw frequencies for one term into ranked tf-idf postings.
pub fn weigh(aggregate: HashMap<DocId, RawWeight>, total_docs: u64) -> Vec<ScoredPosting> {
    let doc_freq = aggregate.len();
    let mut postings: Vec<ScoredPosting> = aggregate
        .into_iter()
        .map(|(doc_id, tf)| Posting::new(doc_id, tfidf(tf, doc_freq, total_docs)))
        .collect();
    postings.sort_by(|a, b| b.weight.total_cmp(&a.weight).then(a.doc_id.cmp(&b.doc_id)));
    postings
}

/// Forward-only cursor over one partial index file.
struct PartialReader {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_no: usize,
    current: Option<IndexLine<RawWeight>>,
}

impl PartialReader {
    fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = Self {
            path: path.to_path_buf(),
            lines: BufReader::new(file).lines(),
            line_no: 0,
            current: None,
        };
        reader.advance()?;
        Ok(reader)
    }

    /// Move to the next entry, checking that terms stay strictly ascending.
    fn advance(&mut self) -> Result<()> {
        let previous = self.current.take().map(|l| l.term);
        for line in self.lines.by_ref() {
            let line = line?;
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let entry = IndexLine::<RawWeight>::decode(&line)
                .map_err(|e| Error::corrupt(&self.path, self.line_no, e.to_string()))?;
            if let Some(prev) = &previous {
                if entry.term.as_str() <= prev.as_str() {
                    return Err(Error::corrupt(
                        &self.path,
                        self.line_no,
                        format!("term {:?} does not sort after {:?}", entry.term, prev),
                    ));
                }
            }
            self.current = Some(entry);
            return Ok(());
        }
        Ok(())
    }
}

/// Writes shards into the staging directory, one leading character at a time.
struct ShardWriter {
    staging: PathBuf,
    open: Option<(char, AtomicFile)>,
    done: Vec<char>,
}

impl ShardWriter {
    fn new(staging: PathBuf) -> Self {
        Self { staging, open: None, done: Vec::new() }
    }

    fn write(&mut self, line: &IndexLine<f64>) -> Result<()> {
        let leading = line.term.chars().next().ok_or(crate::codec::CodecError::EmptyTerm)?;
        match &self.open {
            Some((c, _)) if *c == leading => {}
            Some((c, file)) if leading < *c => {
                return Err(Error::corrupt(
                    file.path(),
                    0,
                    format!("term {:?} arrived after shard {c:?} was opened", line.term),
                ));
            }
            _ => {
                self.close()?;
                let path = self.staging.join(shard_file_name(leading));
                let file = AtomicFile::create(&path)?;
                tracing::info!(shard = %leading, path = %path.display(), "writing shard");
                self.open = Some((leading, file));
            }
        }
        if let Some((_, file)) = self.open.as_mut() {
            file.write_line(&line.encode())?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some((c, file)) = self.open.take() {
            file.commit()?;
            self.done.push(c);
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<char>> {
        self.close()?;
        Ok(self.done)
    }
}

/// Merge every partial index under `paths` into final shards, publish them
/// together with the staged registry, write `meta.json`, and delete the
/// partials.
///
/// The staged registry must exist; its line count is the corpus size. Nothing
/// is touched if it is missing. An empty corpus publishes an empty index. On
/// failure the published index and the partial indices are left as they were.
pub fn merge_partial_indices(paths: &IndexPaths) -> Result<MergeSummary> {
    let num_docs = count_documents(&paths.staged_registry())?;
    let partials = list_partials(paths)?;
    if partials.is_empty() && num_docs > 0 {
        return Err(Error::NoPartialIndices(paths.partial_dir()));
    }
    if num_docs == 0 && !partials.is_empty() {
        return Err(Error::InvalidConfig(
            "document id registry is empty but partial indices exist".into(),
        ));
    }
    if num_docs == 0 {
        tracing::warn!("no documents were indexed; publishing an empty index");
    }
    tracing::info!(num_docs, partials = partials.len(), "merging partial indices");

    let staging = paths.staging_dir();
    if staging.is_dir() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    let (num_terms, shards) = match merge_into(&partials, num_docs, &staging) {
        Ok(done) => done,
        Err(e) => {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }
    };

    publish(paths, &shards)?;
    save_meta(
        paths,
        &MetaFile {
            num_docs,
            num_terms,
            shards: shards.clone(),
            created_at: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_default(),
            version: crate::config::META_VERSION,
        },
    )?;
    let removed = remove_partials(paths)?;
    tracing::info!(num_terms, shards = shards.len(), removed, "merge complete");

    Ok(MergeSummary { num_docs, num_terms, shards })
}

/// The merge loop proper. Readers and the shard writer are owned here and
/// released when it returns, whichever way it returns.
fn merge_into(partials: &[PathBuf], num_docs: u64, staging: &Path) -> Result<(u64, Vec<char>)> {
    let mut readers = partials
        .iter()
        .map(|p| PartialReader::open(p))
        .collect::<Result<Vec<_>>>()?;

    let mut heap: BinaryHeap<Reverse<(String, usize)>> = readers
        .iter()
        .enumerate()
        .filter_map(|(i, r)| r.current.as_ref().map(|l| Reverse((l.term.clone(), i))))
        .collect();

    let mut writer = ShardWriter::new(staging.to_path_buf());
    let mut num_terms = 0u64;

    while let Some(Reverse((pending, first))) = heap.pop() {
        let mut contributors = vec![first];
        while let Some(Reverse((term, _))) = heap.peek() {
            if *term != pending {
                break;
            }
            if let Some(Reverse((_, i))) = heap.pop() {
                contributors.push(i);
            }
        }

        let mut aggregate: HashMap<DocId, RawWeight> = HashMap::new();
        for &i in &contributors {
            let reader = &mut readers[i];
            if let Some(entry) = reader.current.as_ref() {
                for p in &entry.postings {
                    *aggregate.entry(p.doc_id).or_insert(0) += p.weight;
                }
            }
            reader.advance()?;
            if let Some(next) = reader.current.as_ref() {
                heap.push(Reverse((next.term.clone(), i)));
            }
        }

        writer.write(&IndexLine::new(pending, weigh(aggregate, num_docs)))?;
        num_terms += 1;
    }

    Ok((num_terms, writer.finish()?))
}

/// Move staged shards into the final directory and the staged registry over
/// the live one, then drop shards whose leading character no longer occurs.
fn publish(paths: &IndexPaths, shards: &[char]) -> Result<()> {
    let staging = paths.staging_dir();
    let final_dir = paths.final_dir();
    fs::create_dir_all(&final_dir)?;
    for &c in shards {
        fs::rename(staging.join(shard_file_name(c)), paths.shard(c))?;
    }
    fs::rename(paths.staged_registry(), paths.registry())?;
    for (c, path) in list_shards(&final_dir)? {
        if !shards.contains(&c) {
            fs::remove_file(path)?;
        }
    }
    fs::remove_dir_all(&staging)?;
    Ok(())
}
