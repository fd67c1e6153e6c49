use thiserror::Error;

/// Errors raised while parsing, editing or writing JPEG metadata.
///
/// `Format` and `InvalidTree` are deliberately separate: the first means the
/// byte stream is corrupt, the second means an edited tree was rejected and
/// the document it was merged into is unchanged.
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Image format error: {0}")]
    Format(String),

    #[error("Invalid tree at node \"{node}\": {message}")]
    InvalidTree { node: String, message: String },

    #[error("Unsupported metadata format name: {0}")]
    UnsupportedFormatName(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Metadata document is already in use")]
    Busy,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a [`MetadataError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The source stream is malformed.
    Format,
    /// The supplied tree is malformed; retrying with another tree may work.
    InvalidTree,
    /// The call itself was not valid for this document.
    Usage,
    /// The byte source or sink failed.
    Io,
}

impl MetadataError {
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format(message.into())
    }

    pub fn invalid_tree(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidTree {
            node: node.into(),
            message: message.into(),
        }
    }

    pub fn truncated() -> Self {
        Self::Format("truncated stream".to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Format(_) => ErrorKind::Format,
            Self::InvalidTree { .. } => ErrorKind::InvalidTree,
            Self::UnsupportedFormatName(_) | Self::InvalidArgument(_) | Self::Busy => {
                ErrorKind::Usage
            }
            Self::Io(_) => ErrorKind::Io,
        }
    }

    pub fn is_format_error(&self) -> bool {
        self.kind() == ErrorKind::Format
    }

    pub fn is_invalid_tree(&self) -> bool {
        self.kind() == ErrorKind::InvalidTree
    }
}

pub type Result<T> = std::result::Result<T, MetadataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_distinguishable() {
        assert_eq!(MetadataError::truncated().kind(), ErrorKind::Format);
        assert_eq!(
            MetadataError::invalid_tree("sos", "ambiguous").kind(),
            ErrorKind::InvalidTree
        );
        assert!(!MetadataError::Busy.is_format_error());
    }

    #[test]
    fn test_io_error_converts() {
        let err: MetadataError = std::io::Error::other("disk gone").into();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_string().contains("disk gone"));
    }
}
