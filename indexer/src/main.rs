use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use spimi_core::builder::build_partial_indices;
use spimi_core::config::{DEFAULT_GROUP_SIZE, DEFAULT_INDEX_DIR, DEFAULT_PAGE_SIZE};
use spimi_core::merge::merge_partial_indices;
use spimi_core::persist::IndexPaths;
use spimi_core::search::{Page, QueryEngine, ScoringMode};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build a sharded tf-idf inverted index and query it", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the document id registry and partial indices from a source directory
    Partial {
        /// Directory of crawled documents (*.json / *.jsonl)
        #[arg(long)]
        input: PathBuf,
        /// Index directory
        #[arg(long, default_value = DEFAULT_INDEX_DIR)]
        index: PathBuf,
        /// Documents per partial index
        #[arg(long, default_value_t = DEFAULT_GROUP_SIZE)]
        group_size: usize,
    },
    /// Merge existing partial indices into the final shards
    Merge {
        #[arg(long, default_value = DEFAULT_INDEX_DIR)]
        index: PathBuf,
    },
    /// Rebuild partial indices, then merge them
    Build {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = DEFAULT_INDEX_DIR)]
        index: PathBuf,
        #[arg(long, default_value_t = DEFAULT_GROUP_SIZE)]
        group_size: usize,
    },
    /// Run an AND query and print ranked pages
    Search {
        #[arg(long, default_value = DEFAULT_INDEX_DIR)]
        index: PathBuf,
        /// Results per page
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: usize,
        /// Pages to print; 0 prints every page
        #[arg(long, default_value_t = 1)]
        pages: usize,
        /// Leave the shortest posting list's weight out of multi-term scores
        #[arg(long, default_value_t = false)]
        exclude_probe: bool,
        /// Free-text query
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Partial { input, index, group_size } => partial(&input, &index, group_size),
        Commands::Merge { index } => merge(&index),
        Commands::Build { input, index, group_size } => {
            partial(&input, &index, group_size)?;
            merge(&index)
        }
        Commands::Search { index, page_size, pages, exclude_probe, query } => {
            let mode = if exclude_probe { ScoringMode::ExcludeProbe } else { ScoringMode::IncludeProbe };
            search(&index, &query.join(" "), page_size, pages, mode)
        }
    }
}

fn partial(input: &Path, index: &Path, group_size: usize) -> Result<()> {
    let start = Instant::now();
    let paths = IndexPaths::new(index);
    let summary = build_partial_indices(input, &paths, group_size)
        .with_context(|| format!("building partial indices from {}", input.display()))?;
    tracing::info!(
        num_docs = summary.num_docs,
        num_partials = summary.num_partials,
        skipped = summary.skipped,
        registry = %paths.staged_registry().display(),
        took_s = start.elapsed().as_secs_f64(),
        "partial indexing finished"
    );
    Ok(())
}

fn merge(index: &Path) -> Result<()> {
    let start = Instant::now();
    let paths = IndexPaths::new(index);
    let summary = merge_partial_indices(&paths)
        .with_context(|| format!("merging partial indices in {}", index.display()))?;
    tracing::info!(
        num_docs = summary.num_docs,
        num_terms = summary.num_terms,
        shards = summary.shards.len(),
        took_s = start.elapsed().as_secs_f64(),
        "index merge finished"
    );
    Ok(())
}

fn search(index: &Path, query: &str, page_size: usize, pages: usize, mode: ScoringMode) -> Result<()> {
    let start = Instant::now();
    let engine = QueryEngine::new(IndexPaths::new(index));
    let outcome = engine.search(query, mode).context("running query")?;
    for term in &outcome.missing {
        println!("No documents contain the term \"{term}\"");
    }
    let total = outcome.results.total();
    println!("{total} results (found in {:.3}s)", start.elapsed().as_secs_f64());
    if total == 0 {
        return Ok(());
    }

    let mut pager = engine.paginate(outcome.results, page_size)?;
    let mut printed = 0;
    while pages == 0 || printed < pages {
        let Some(page) = pager.next_page()? else { break };
        print_page(&page);
        printed += 1;
    }
    if pager.remaining() > 0 {
        println!("{} more results; pass --pages to see them", pager.remaining());
    }
    Ok(())
}

fn print_page(page: &Page) {
    for hit in &page.hits {
        let url = hit.url.as_deref().unwrap_or("<unknown document>");
        println!("{}. {} \t(Score: {:.3})", hit.rank, url, hit.score);
    }
    if let (Some(first), Some(last)) = (page.hits.first(), page.hits.last()) {
        println!("Showing results {} - {} of {}", first.rank, last.rank, page.total);
    }
}
