//! Defaults and on-disk names.
//!
//! Runtime overrides arrive through the command-line front ends; everything
//! here is a compile-time default.

/// Documents folded into one partial index before it is flushed.
pub const DEFAULT_GROUP_SIZE: usize = 1000;

/// Results per page handed out by [`crate::search::Paginator`].
pub const DEFAULT_PAGE_SIZE: usize = 5;

/// Decimal places written for tf-idf weights in final shards.
pub const WEIGHT_PRECISION: usize = 3;

/// Document id registry, one URL per line.
pub const REGISTRY_FILE: &str = "doc_ids.txt";

pub const PARTIAL_DIR: &str = "partial_indices";
pub const PARTIAL_PREFIX: &str = "partial_index_";

pub const FINAL_DIR: &str = "final_indices";
pub const FINAL_STAGING_DIR: &str = "final_indices.tmp";
pub const FINAL_PREFIX: &str = "final_index_";

pub const INDEX_FILE_EXT: &str = "txt";
pub const TMP_SUFFIX: &str = "tmp";

pub const META_FILE: &str = "meta.json";
pub const META_VERSION: u32 = 1;

/// Default index root used by the front ends.
pub const DEFAULT_INDEX_DIR: &str = "./index";
