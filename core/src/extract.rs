//! Turning crawled pages into token streams.
//!
//! A page contributes its whole visible text plus four importance tiers whose
//! occurrences earn an extra bonus in the partial index.

use crate::tokenizer::tokenize;
use crate::{RawWeight, Result};
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Importance tiers, lowest rank first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Bold,
    MinorHeading,
    MajorHeading,
    Title,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Bold, Tier::MinorHeading, Tier::MajorHeading, Tier::Title];

    pub fn rank(self) -> u32 {
        match self {
            Tier::Bold => 0,
            Tier::MinorHeading => 1,
            Tier::MajorHeading => 2,
            Tier::Title => 3,
        }
    }

    /// Extra weight per occurrence inside this tier: `2^(rank+1) - 1`.
    pub fn bonus(self) -> RawWeight {
        (1 << (self.rank() + 1)) - 1
    }

    fn selector(self) -> &'static str {
        match self {
            Tier::Bold => "b",
            Tier::MinorHeading => "h4, h5, h6",
            Tier::MajorHeading => "h1, h2, h3",
            Tier::Title => "title",
        }
    }
}

/// Everything the partial index builder needs from one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenizedDocument {
    pub url: String,
    pub body: Vec<String>,
    /// Indexed by [`Tier::rank`].
    pub tiers: [Vec<String>; 4],
}

impl TokenizedDocument {
    pub fn new(url: impl Into<String>, body: Vec<String>) -> Self {
        Self { url: url.into(), body, ..Default::default() }
    }

    pub fn with_tier(mut self, tier: Tier, tokens: Vec<String>) -> Self {
        self.tiers[tier.rank() as usize] = tokens;
        self
    }

    pub fn tier(&self, tier: Tier) -> &[String] {
        &self.tiers[tier.rank() as usize]
    }
}

/// A crawled page as stored on disk.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDocument {
    pub url: String,
    #[serde(default)]
    pub content: String,
}

pub struct HtmlExtractor {
    tiers: Vec<(Tier, Selector)>,
}

impl Default for HtmlExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl HtmlExtractor {
    pub fn new() -> Self {
        let tiers = Tier::ALL
            .iter()
            .map(|&t| (t, Selector::parse(t.selector()).expect("valid selector")))
            .collect();
        Self { tiers }
    }

    pub fn extract(&self, url: &str, html: &str) -> TokenizedDocument {
        let doc = Html::parse_document(html);
        let body = tokenize(&element_text(doc.root_element()));
        let mut out = TokenizedDocument::new(url, body);
        for (tier, sel) in &self.tiers {
            let tokens: Vec<String> = doc
                .select(sel)
                .flat_map(|el| tokenize(&element_text(el)))
                .collect();
            out = out.with_tier(*tier, tokens);
        }
        out
    }
}

// Text nodes are joined with a space so adjacent blocks never fuse into one word.
fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ")
}

/// Document files under `root` in a stable, name-sorted walk order.
pub fn source_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!(path = ?err.path(), error = %err, "skipping unreadable source entry");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| matches!(p.extension().and_then(|s| s.to_str()), Some("json" | "jsonl")))
        .collect()
}

/// Parse every document record in `file`. Records that fail to parse come
/// back as errors so the caller can skip them individually.
pub fn read_records(file: &Path) -> Result<Vec<serde_json::Result<RawDocument>>> {
    let reader = BufReader::new(File::open(file)?);
    if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
        let mut out = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            out.push(serde_json::from_str(&line));
        }
        return Ok(out);
    }
    let json: serde_json::Value = match serde_json::from_reader(reader) {
        Ok(v) => v,
        Err(e) => return Ok(vec![Err(e)]),
    };
    Ok(match json {
        serde_json::Value::Array(arr) => arr.into_iter().map(serde_json::from_value).collect(),
        other => vec![serde_json::from_value(other)],
    })
}
