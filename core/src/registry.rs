//! Document id registry: line `n` (1-indexed) holds the URL of document `n - 1`.

use crate::persist::AtomicFile;
use crate::{DocId, Error, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Append-only writer; the registry only replaces the previous one on [`finish`].
///
/// [`finish`]: RegistryWriter::finish
pub struct RegistryWriter {
    file: AtomicFile,
    next: DocId,
}

impl RegistryWriter {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self { file: AtomicFile::create(path)?, next: 0 })
    }

    /// Record `url` and hand back the document id it was assigned.
    pub fn append(&mut self, url: &str) -> Result<DocId> {
        // A newline would shift every later id by one line.
        let url = url.replace(['\n', '\r'], " ");
        self.file.write_line(&url)?;
        let id = self.next;
        self.next += 1;
        Ok(id)
    }

    pub fn len(&self) -> u64 { self.next as u64 }

    pub fn is_empty(&self) -> bool { self.next == 0 }

    pub fn finish(self) -> Result<PathBuf> { self.file.commit() }
}

/// Number of documents recorded in the registry at `path`.
pub fn count_documents(path: &Path) -> Result<u64> {
    let f = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::MissingRegistry(path.to_path_buf()),
        _ => Error::Io(e),
    })?;
    let mut n = 0u64;
    for line in BufReader::new(f).lines() {
        line?;
        n += 1;
    }
    Ok(n)
}

/// Looks URLs up by document id on demand.
///
/// Nothing is read up front; byte offsets of lines already scanned are kept
/// so later lookups seek straight to the line.
pub struct RegistryReader {
    path: PathBuf,
    reader: BufReader<File>,
    offsets: Vec<u64>,
    scanned_to: u64,
    /// Whether the underlying reader sits at `scanned_to`.
    at_scan_cursor: bool,
    exhausted: bool,
}

impl RegistryReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let f = File::open(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::MissingRegistry(path.clone()),
            _ => Error::Io(e),
        })?;
        Ok(Self {
            path,
            reader: BufReader::new(f),
            offsets: Vec::new(),
            scanned_to: 0,
            at_scan_cursor: true,
            exhausted: false,
        })
    }

    pub fn path(&self) -> &Path { &self.path }

    /// URL recorded for `doc_id`, or `None` when the registry is shorter.
    pub fn url(&mut self, doc_id: DocId) -> Result<Option<String>> {
        let idx = doc_id as usize;
        while self.offsets.len() <= idx && !self.exhausted {
            self.scan_line()?;
        }
        let Some(&offset) = self.offsets.get(idx) else {
            return Ok(None);
        };
        self.reader.seek(SeekFrom::Start(offset))?;
        self.at_scan_cursor = false;
        let mut line = String::new();
        self.reader.read_line(&mut line)?;
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }

    // `scanned_to` is the byte just past the last cached line.
    fn scan_line(&mut self) -> Result<()> {
        if !self.at_scan_cursor {
            self.reader.seek(SeekFrom::Start(self.scanned_to))?;
            self.at_scan_cursor = true;
        }
        let mut line = String::new();
        let read = self.reader.read_line(&mut line)?;
        if read == 0 {
            self.exhausted = true;
            return Ok(());
        }
        self.offsets.push(self.scanned_to);
        self.scanned_to += read as u64;
        Ok(())
    }
}
