use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// The fundamental edit primitive: byte-span replacement with verification.
///
/// Every change the YAML encoder makes to a document (a rewritten scalar, a new
/// comment, appended mapping entries) compiles down to this primitive applied
/// against the original source text. Text outside the edited spans is copied
/// through untouched, which is what keeps unrelated formatting byte-identical.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Edit does nothing until applied"]
pub struct Edit {
    /// Starting byte offset (inclusive)
    pub byte_start: usize,
    /// Ending byte offset (exclusive)
    pub byte_end: usize,
    /// New text to place at [byte_start, byte_end)
    pub new_text: String,
    /// Verification of what we expect to find before applying
    pub expected_before: EditVerification,
}

/// Verification strategy for edit safety.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditVerification {
    /// Exact text match required
    ExactMatch(String),
    /// xxh3 hash of expected text (faster for large spans)
    Hash(u64),
}

impl EditVerification {
    /// Check if the provided text matches the verification criteria.
    pub fn matches(&self, text: &str) -> bool {
        match self {
            EditVerification::ExactMatch(expected) => text == expected,
            EditVerification::Hash(expected_hash) => xxh3_64(text.as_bytes()) == *expected_hash,
        }
    }

    /// Create verification from text, using hash for text over 1KB.
    pub fn from_text(text: &str) -> Self {
        if text.len() > 1024 {
            EditVerification::Hash(xxh3_64(text.as_bytes()))
        } else {
            EditVerification::ExactMatch(text.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum EditError {
    #[error("before-text verification failed at byte {byte_start}: found {found:?}")]
    BeforeTextMismatch {
        byte_start: usize,
        byte_end: usize,
        found: String,
    },

    #[error("invalid byte range: [{byte_start}, {byte_end}) in text of length {len}")]
    InvalidByteRange {
        byte_start: usize,
        byte_end: usize,
        len: usize,
    },

    #[error("byte offset {offset} is not on a UTF-8 character boundary")]
    NotCharBoundary { offset: usize },

    #[error("overlapping edits: [{first_start}, {first_end}) and [{second_start}, {second_end})")]
    Overlap {
        first_start: usize,
        first_end: usize,
        second_start: usize,
        second_end: usize,
    },

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of writing a re-encoded document back to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "WriteResult should be checked for written/unchanged"]
pub enum WriteResult {
    /// New content was written
    Written { file: PathBuf, bytes: usize },
    /// File already had the requested content; nothing was touched
    Unchanged { file: PathBuf },
}

impl Edit {
    /// Create a replacement of `[byte_start, byte_end)` verified against `expected_before`.
    pub fn new(
        byte_start: usize,
        byte_end: usize,
        new_text: impl Into<String>,
        expected_before: impl Into<String>,
    ) -> Self {
        let expected = expected_before.into();
        Self {
            byte_start,
            byte_end,
            new_text: new_text.into(),
            expected_before: EditVerification::from_text(&expected),
        }
    }

    /// Create a zero-width insertion at `offset`.
    pub fn insertion(offset: usize, new_text: impl Into<String>) -> Self {
        Self::new(offset, offset, new_text, "")
    }

    /// Create a replacement whose expected text is read from `content`.
    pub fn replacing(
        content: &str,
        byte_start: usize,
        byte_end: usize,
        new_text: impl Into<String>,
    ) -> Result<Self, EditError> {
        let current = slice(content, byte_start, byte_end)?;
        Ok(Self::new(byte_start, byte_end, new_text, current))
    }

    /// Validate the edit against the current contents.
    ///
    /// Returns the current text at [byte_start, byte_end) if validation succeeds.
    fn validate<'a>(&self, content: &'a str) -> Result<&'a str, EditError> {
        let current = slice(content, self.byte_start, self.byte_end)?;
        if !self.expected_before.matches(current) {
            return Err(EditError::BeforeTextMismatch {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                found: current.to_string(),
            });
        }
        Ok(current)
    }

    /// Apply this edit to `content`, returning the new text.
    pub fn apply_to(&self, content: &str) -> Result<String, EditError> {
        Edit::apply_all(content, std::slice::from_ref(self))
    }

    /// Apply several edits to the same text in one pass.
    ///
    /// Edits are ordered by start offset; zero-width insertions sharing an
    /// offset keep their relative input order. Overlapping spans are rejected.
    pub fn apply_all(content: &str, edits: &[Edit]) -> Result<String, EditError> {
        let mut ordered: Vec<&Edit> = edits.iter().collect();
        ordered.sort_by_key(|edit| (edit.byte_start, edit.byte_end));

        for edit in &ordered {
            edit.validate(content)?;
        }

        for window in ordered.windows(2) {
            let (first, second) = (window[0], window[1]);
            if first.byte_end > second.byte_start {
                return Err(EditError::Overlap {
                    first_start: first.byte_start,
                    first_end: first.byte_end,
                    second_start: second.byte_start,
                    second_end: second.byte_end,
                });
            }
        }

        let grown: usize = ordered.iter().map(|edit| edit.new_text.len()).sum();
        let mut output = String::with_capacity(content.len() + grown);
        let mut cursor = 0;
        for edit in ordered {
            output.push_str(&content[cursor..edit.byte_start]);
            output.push_str(&edit.new_text);
            cursor = edit.byte_end;
        }
        output.push_str(&content[cursor..]);

        Ok(output)
    }
}

fn slice(content: &str, byte_start: usize, byte_end: usize) -> Result<&str, EditError> {
    if byte_start > byte_end || byte_end > content.len() {
        return Err(EditError::InvalidByteRange {
            byte_start,
            byte_end,
            len: content.len(),
        });
    }
    for offset in [byte_start, byte_end] {
        if !content.is_char_boundary(offset) {
            return Err(EditError::NotCharBoundary { offset });
        }
    }
    Ok(&content[byte_start..byte_end])
}

/// Write `updated` to `path` unless the file already holds exactly that text.
pub fn write_if_changed(path: &Path, original: &str, updated: &str) -> Result<WriteResult, EditError> {
    if original == updated {
        return Ok(WriteResult::Unchanged {
            file: path.to_path_buf(),
        });
    }

    atomic_write(path, updated.as_bytes())?;

    Ok(WriteResult::Written {
        file: path.to_path_buf(),
        bytes: updated.len(),
    })
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the full write succeeds or the original file is left as it was.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<(), EditError> {
    // Same directory keeps the rename on one filesystem
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        Some(_) => Path::new("."),
        None => {
            return Err(EditError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "path has no parent directory",
            )))
        }
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;

    // Keep the permissions of the file we replace
    if let Ok(metadata) = fs::metadata(path) {
        temp.as_file().set_permissions(metadata.permissions())?;
    }

    temp.persist(path).map_err(|e| e.error)?;

    let now = filetime::FileTime::now();
    filetime::set_file_mtime(path, now)?;

    Ok(())
}
