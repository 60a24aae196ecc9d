use std::io::Write;
use std::path::Path;
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// The fundamental edit primitive: byte-span replacement with verification.
///
/// Every replacement a patch makes compiles down to this single primitive.
/// Intelligence lives in span acquisition (regex matches), not application.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Edit does nothing until apply() is called"]
pub struct Edit {
    /// Starting byte offset (inclusive)
    pub byte_start: usize,
    /// Ending byte offset (exclusive)
    pub byte_end: usize,
    /// New text to insert at [byte_start, byte_end)
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
    #[error("Before-text verification failed at byte {byte_start}")]
    BeforeTextMismatch {
        byte_start: usize,
        byte_end: usize,
        expected: String,
        found: String,
    },

    #[error("Invalid byte range: [{byte_start}, {byte_end}) in text of length {len}")]
    InvalidByteRange {
        byte_start: usize,
        byte_end: usize,
        len: usize,
    },

    #[error("Byte offset {offset} is not on a UTF-8 character boundary")]
    NotCharBoundary { offset: usize },

    #[error("Overlapping edits at bytes {first_end} and {second_start}")]
    Overlap {
        first_end: usize,
        second_start: usize,
    },

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of applying an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "EditResult should be checked for success/already-applied"]
pub enum EditResult {
    /// Edit was successfully applied
    Applied { bytes_changed: usize },
    /// Edit was already applied (current text matches new_text)
    AlreadyApplied,
}

impl Edit {
    /// Create a new edit with automatic verification generation.
    pub fn new(
        byte_start: usize,
        byte_end: usize,
        new_text: impl Into<String>,
        expected_before: impl AsRef<str>,
    ) -> Self {
        Self {
            byte_start,
            byte_end,
            new_text: new_text.into(),
            expected_before: EditVerification::from_text(expected_before.as_ref()),
        }
    }

    /// Validate the edit against the current text.
    ///
    /// Returns the current text at [byte_start, byte_end) if validation succeeds.
    fn validate<'a>(&self, content: &'a str) -> Result<&'a str, EditError> {
        if self.byte_start > self.byte_end || self.byte_end > content.len() {
            return Err(EditError::InvalidByteRange {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                len: content.len(),
            });
        }

        for offset in [self.byte_start, self.byte_end] {
            if !content.is_char_boundary(offset) {
                return Err(EditError::NotCharBoundary { offset });
            }
        }

        let current = &content[self.byte_start..self.byte_end];

        // Already applied
        if current == self.new_text {
            return Ok(current);
        }

        if !self.expected_before.matches(current) {
            return Err(EditError::BeforeTextMismatch {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                expected: format!("{:?}", self.expected_before),
                found: current.to_string(),
            });
        }

        Ok(current)
    }

    /// Apply this edit to `content` in place.
    pub fn apply(&self, content: &mut String) -> Result<EditResult, EditError> {
        let current = self.validate(content)?;
        if current == self.new_text {
            return Ok(EditResult::AlreadyApplied);
        }

        content.replace_range(self.byte_start..self.byte_end, &self.new_text);
        Ok(EditResult::Applied {
            bytes_changed: self.new_text.len(),
        })
    }

    /// Apply multiple edits to the same text in a single operation.
    ///
    /// All edits are validated against the original text before any is
    /// applied. Edits are then applied bottom-to-top to avoid offset
    /// invalidation. Results are returned in the order the edits were given.
    pub fn apply_batch(edits: &[Edit], content: &mut String) -> Result<Vec<EditResult>, EditError> {
        for edit in edits {
            edit.validate(content)?;
        }

        let mut order: Vec<usize> = (0..edits.len()).collect();
        order.sort_by(|&a, &b| edits[b].byte_start.cmp(&edits[a].byte_start));

        // Sorted descending: the later edit must start at or after the earlier one's end
        for window in order.windows(2) {
            let (later, earlier) = (&edits[window[0]], &edits[window[1]]);
            if earlier.byte_end > later.byte_start {
                return Err(EditError::Overlap {
                    first_end: earlier.byte_end,
                    second_start: later.byte_start,
                });
            }
        }

        let mut results = vec![EditResult::AlreadyApplied; edits.len()];
        for idx in order {
            results[idx] = edits[idx].apply(content)?;
        }
        Ok(results)
    }
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the full write succeeds or nothing changes.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<(), EditError> {
    // Same directory keeps the rename on one filesystem
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        Some(_) => Path::new("."),
        None => {
            return Err(EditError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Path has no parent directory",
            )))
        }
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_edit_verification_exact_match() {
        let verify = EditVerification::ExactMatch("a+b".to_string());
        assert!(verify.matches("a+b"));
        assert!(!verify.matches("a-b"));
    }

    #[test]
    fn test_edit_verification_from_text_large() {
        let text = "x".repeat(2000);
        let verify = EditVerification::from_text(&text);
        assert!(matches!(verify, EditVerification::Hash(_)));
        assert!(verify.matches(&text));
    }

    #[test]
    fn test_apply_replaces_span_only() {
        let mut content = "function f(a,b){return a+b}".to_string();
        let edit = Edit::new(23, 26, "a-b", "a+b");
        assert_eq!(
            edit.apply(&mut content).unwrap(),
            EditResult::Applied { bytes_changed: 3 }
        );
        assert_eq!(content, "function f(a,b){return a-b}");
    }

    #[test]
    fn test_apply_already_applied() {
        let mut content = "return a-b".to_string();
        let edit = Edit::new(7, 10, "a-b", "a+b");
        assert_eq!(edit.apply(&mut content).unwrap(), EditResult::AlreadyApplied);
        assert_eq!(content, "return a-b");
    }

    #[test]
    fn test_before_text_mismatch() {
        let mut content = "return a*b".to_string();
        let edit = Edit::new(7, 10, "a-b", "a+b");
        let err = edit.apply(&mut content).unwrap_err();
        assert!(matches!(err, EditError::BeforeTextMismatch { .. }));
        assert_eq!(content, "return a*b");
    }

    #[test]
    fn test_invalid_ranges() {
        let mut content = "hello".to_string();
        assert!(matches!(
            Edit::new(3, 20, "x", "").apply(&mut content),
            Err(EditError::InvalidByteRange { .. })
        ));
        assert!(matches!(
            Edit::new(4, 2, "x", "").apply(&mut content),
            Err(EditError::InvalidByteRange { .. })
        ));
    }

    #[test]
    fn test_char_boundary_rejected() {
        let mut content = "héllo".to_string();
        let err = Edit::new(2, 3, "e", "").apply(&mut content).unwrap_err();
        assert!(matches!(err, EditError::NotCharBoundary { offset: 2 }));
    }

    #[test]
    fn test_batch_edits_preserve_input_order() {
        let mut content = "line1\nline2\nline3\n".to_string();
        let edits = vec![
            Edit::new(0, 5, "LINE1", "line1"),
            Edit::new(12, 17, "L3", "line3"),
            Edit::new(6, 11, "line2", "line2"),
        ];
        let results = Edit::apply_batch(&edits, &mut content).unwrap();
        assert_eq!(content, "LINE1\nline2\nL3\n");
        assert_eq!(results[0], EditResult::Applied { bytes_changed: 5 });
        assert_eq!(results[1], EditResult::Applied { bytes_changed: 2 });
        assert_eq!(results[2], EditResult::AlreadyApplied);
    }

    #[test]
    fn test_batch_overlap_rejected() {
        let mut content = "abcdef".to_string();
        let edits = vec![Edit::new(0, 3, "x", "abc"), Edit::new(2, 4, "y", "cd")];
        let err = Edit::apply_batch(&edits, &mut content).unwrap_err();
        assert!(matches!(err, EditError::Overlap { .. }));
        assert_eq!(content, "abcdef");
    }

    #[test]
    fn test_atomic_write() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("module.js");
        fs::write(&file_path, b"original").unwrap();

        atomic_write(&file_path, b"patched").unwrap();
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "patched");
    }
}
