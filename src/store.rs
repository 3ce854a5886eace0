//! The in-memory file store (§4.2): create/commit/read with at-most-one-committed-name
//! semantics, and the page-addressed `File`/`FileReader` types that back RRQ/WRQ.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::packet::BLOCK_SIZE;

/// Failures the store can report; both map directly onto wire `ErrorCode`s in
/// `crate::session` (§7).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum StoreError {
    AlreadyExists,
    NotFound,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::AlreadyExists => write!(f, "a file with that name is already committed"),
            StoreError::NotFound => write!(f, "no committed file with that name"),
        }
    }
}

impl std::error::Error for StoreError {}

/// An ordered sequence of pages. Pages are exactly `BLOCK_SIZE` bytes except possibly
/// the last one. Immutable once committed (§3).
#[derive(Debug, Clone, Default)]
pub struct File {
    filename: String,
    pages: Vec<Vec<u8>>,
}

impl File {
    fn new(filename: String) -> Self {
        File { filename, pages: Vec::new() }
    }

    /// Appends one DATA payload as the next page. The caller (WriteSession) is
    /// responsible for rejecting out-of-order blocks before calling this.
    pub fn append_page(&mut self, data: Vec<u8>) {
        self.pages.push(data);
    }

    /// Number of pages appended so far, i.e. the highest block number written.
    pub fn block_count(&self) -> u16 {
        self.pages.len() as u16
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }
}

/// A lazy, finite, non-restartable cursor over a committed file's pages (§3).
pub struct FileReader {
    file: Arc<File>,
    /// 1-indexed block number of the page the cursor currently points at.
    block: u16,
}

impl FileReader {
    fn new(file: Arc<File>) -> Self {
        FileReader { file, block: 1 }
    }

    /// The block number the cursor currently points at.
    pub fn block(&self) -> u16 {
        self.block
    }

    /// The bytes of the page the cursor currently points at.
    pub fn read_block(&self) -> &[u8] {
        self.file.pages[(self.block - 1) as usize].as_slice()
    }

    /// True when the current page is the last one in the file.
    pub fn at_end(&self) -> bool {
        self.block as usize == self.file.pages.len()
    }

    /// Advances the cursor to the next block. Must not be called once `at_end()`.
    pub fn advance_block(&mut self) {
        debug_assert!(!self.at_end(), "advancing past the last page of a file");
        self.block += 1;
    }
}

/// A mapping from filename to a committed file (§3), guarded by a single mutex
/// (§4.2, §9 design note: simpler than a lock-free map and sufficient at this scale).
#[derive(Default)]
pub struct FileStore {
    files: Mutex<HashMap<String, Arc<File>>>,
}

impl FileStore {
    pub fn new() -> Self {
        FileStore { files: Mutex::new(HashMap::new()) }
    }

    /// Returns a fresh, uncommitted file handle owned by the caller, unless a file is
    /// already committed under `filename`. Does not reserve the name against other
    /// callers: two concurrent `create_file` calls for the same not-yet-committed name
    /// both succeed, the first to `commit` wins (§4.2, §8 scenario 3).
    pub fn create_file(&self, filename: &str) -> Result<File, StoreError> {
        let files = self.files.lock().expect("file store mutex poisoned");
        if files.contains_key(filename) {
            return Err(StoreError::AlreadyExists);
        }
        Ok(File::new(filename.to_owned()))
    }

    /// Installs `file` under its name if no file is currently committed under that
    /// name. The check-then-insert is atomic with respect to every other store
    /// operation by virtue of the shared mutex (§4.2, §8 at-most-once commit).
    pub fn commit(&self, file: File) -> Result<(), StoreError> {
        let mut files = self.files.lock().expect("file store mutex poisoned");
        if files.contains_key(&file.filename) {
            return Err(StoreError::AlreadyExists);
        }
        files.insert(file.filename.clone(), Arc::new(file));
        Ok(())
    }

    /// Returns a cursor at block 1 over the committed file named `filename`.
    pub fn get_reader(&self, filename: &str) -> Result<FileReader, StoreError> {
        let files = self.files.lock().expect("file store mutex poisoned");
        let file = files.get(filename).cloned().ok_or(StoreError::NotFound)?;
        Ok(FileReader::new(file))
    }
}
