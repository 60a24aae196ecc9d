use thiserror::Error;

/// Why a single patch could not be applied to a piece of source.
///
/// All variants are recoverable: the failing patch is skipped and the
/// remaining patches and plugins continue.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    #[error("patch target not found: {find}")]
    TargetNotFound { find: String },

    #[error("replacement #{index} ({pattern}) had no match")]
    RegexNoMatch { index: usize, pattern: String },

    #[error("replacement #{index} ({pattern}) threw: {message}")]
    ReplacementThrew {
        index: usize,
        pattern: String,
        message: String,
    },
}

impl PatchError {
    /// Short machine-readable kind, used in logs and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            PatchError::TargetNotFound { .. } => "target-not-found",
            PatchError::RegexNoMatch { .. } => "regex-no-match",
            PatchError::ReplacementThrew { .. } => "replacement-threw",
        }
    }
}
