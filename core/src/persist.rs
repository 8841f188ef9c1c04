use crate::config::{
    FINAL_DIR, FINAL_PREFIX, FINAL_STAGING_DIR, INDEX_FILE_EXT, META_FILE, PARTIAL_DIR,
    PARTIAL_PREFIX, REGISTRY_FILE, TMP_SUFFIX,
};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: u64,
    pub num_terms: u64,
    /// Leading characters that have a shard, ascending.
    pub shards: Vec<char>,
    pub created_at: String,
    pub version: u32,
}

/// Every on-disk location of one index, derived from a single root.
#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn registry(&self) -> PathBuf { self.root.join(REGISTRY_FILE) }
    /// Registry written by a partial pass; it goes live when the merge publishes.
    pub fn staged_registry(&self) -> PathBuf { self.partial_dir().join(REGISTRY_FILE) }
    pub fn meta(&self) -> PathBuf { self.root.join(META_FILE) }
    pub fn partial_dir(&self) -> PathBuf { self.root.join(PARTIAL_DIR) }
    pub fn final_dir(&self) -> PathBuf { self.root.join(FINAL_DIR) }
    pub fn staging_dir(&self) -> PathBuf { self.root.join(FINAL_STAGING_DIR) }

    pub fn partial(&self, n: usize) -> PathBuf {
        self.partial_dir().join(format!("{PARTIAL_PREFIX}{n}.{INDEX_FILE_EXT}"))
    }

    pub fn shard(&self, leading: char) -> PathBuf {
        self.final_dir().join(shard_file_name(leading))
    }
}

pub fn shard_file_name(leading: char) -> String {
    format!("{FINAL_PREFIX}{leading}.{INDEX_FILE_EXT}")
}

/// Sibling path used while a file is being written.
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(TMP_SUFFIX);
    path.with_file_name(name)
}

/// A buffered file that only appears under its final name on [`commit`].
///
/// Dropping without committing removes the temporary file, so an aborted
/// writer never leaves a half-written artifact behind.
///
/// [`commit`]: AtomicFile::commit
pub struct AtomicFile {
    path: PathBuf,
    tmp: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl AtomicFile {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = tmp_path(&path);
        let writer = BufWriter::new(File::create(&tmp)?);
        Ok(Self { path, tmp, writer: Some(writer) })
    }

    pub fn path(&self) -> &Path { &self.path }

    /// Write one line followed by `\n`.
    pub fn write_line(&mut self, line: &str) -> Result<()> {
        if let Some(w) = self.writer.as_mut() {
            w.write_all(line.as_bytes())?;
            w.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Flush, then atomically rename the temporary file over the target.
    pub fn commit(mut self) -> Result<PathBuf> {
        if let Some(mut w) = self.writer.take() {
            w.flush()?;
            w.get_ref().sync_all()?;
        }
        fs::rename(&self.tmp, &self.path)?;
        Ok(self.path.clone())
    }
}

impl Drop for AtomicFile {
    fn drop(&mut self) {
        if self.writer.take().is_some() {
            let _ = fs::remove_file(&self.tmp);
        }
    }
}

/// Partial index files under `paths`, ordered by their sequence number.
pub fn list_partials(paths: &IndexPaths) -> Result<Vec<PathBuf>> {
    let dir = paths.partial_dir();
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut numbered: Vec<(usize, PathBuf)> = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let path = entry?.path();
        if let Some(n) = partial_number(&path) {
            numbered.push((n, path));
        }
    }
    numbered.sort_by_key(|(n, _)| *n);
    Ok(numbered.into_iter().map(|(_, p)| p).collect())
}

fn partial_number(path: &Path) -> Option<usize> {
    if path.extension().and_then(|e| e.to_str()) != Some(INDEX_FILE_EXT) {
        return None;
    }
    path.file_stem()?.to_str()?.strip_prefix(PARTIAL_PREFIX)?.parse().ok()
}

/// Final shard files in `dir`, keyed by leading character.
pub fn list_shards(dir: &Path) -> Result<Vec<(char, PathBuf)>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut shards = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(INDEX_FILE_EXT) {
            continue;
        }
        let leading = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.strip_prefix(FINAL_PREFIX))
            .and_then(|s| {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(c),
                    _ => None,
                }
            });
        if let Some(c) = leading {
            shards.push((c, path));
        }
    }
    shards.sort_by_key(|(c, _)| *c);
    Ok(shards)
}

/// Delete the partial indices and the registry staged with them. Returns
/// how many partial indices were removed.
pub fn remove_partials(paths: &IndexPaths) -> Result<usize> {
    let partials = list_partials(paths)?;
    for p in &partials {
        fs::remove_file(p)?;
    }
    match fs::remove_file(paths.staged_registry()) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    Ok(partials.len())
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    fs::create_dir_all(&paths.root)?;
    let mut f = AtomicFile::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_line(&json)?;
    f.commit()?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let mut f = File::open(paths.meta())?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}
