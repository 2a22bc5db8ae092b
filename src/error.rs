use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Failed to extract text from document: {0}")]
    Extraction(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Artifact not found: {}", .0.display())]
    ArtifactNotFound(PathBuf),

    #[error("Corrupt artifact at {}: {reason}", .path.display())]
    CorruptArtifact { path: PathBuf, reason: String },

    #[error("Cannot derive an artifact name from source '{0}'")]
    InvalidSource(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of [`RetrievalError`] for callers that branch on failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Extraction,
    Embedding,
    DimensionMismatch,
    ArtifactNotFound,
    CorruptArtifact,
    InvalidSource,
    Io,
}

impl RetrievalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Extraction(_) => ErrorKind::Extraction,
            Self::Embedding(_) => ErrorKind::Embedding,
            Self::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            Self::ArtifactNotFound(_) => ErrorKind::ArtifactNotFound,
            Self::CorruptArtifact { .. } => ErrorKind::CorruptArtifact,
            Self::InvalidSource(_) => ErrorKind::InvalidSource,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptArtifact {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type RetrievalResult<T> = Result<T, RetrievalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        let err = RetrievalError::DimensionMismatch {
            expected: 4,
            actual: 3,
        };
        assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
        assert_eq!(err.to_string(), "Vector dimension mismatch: expected 4, got 3");

        let err = RetrievalError::corrupt("/tmp/a.meta", "count mismatch");
        assert_eq!(err.kind(), ErrorKind::CorruptArtifact);
        assert!(err.to_string().contains("count mismatch"));
    }
}
