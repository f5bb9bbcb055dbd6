use thiserror::Error;

/// The layer read that failed, attached to content errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerOperation {
    /// Hashing the compressed representation
    Digest,
    /// Hashing the uncompressed representation
    DiffId,
    /// Measuring the compressed size
    Size,
    /// Opening the compressed stream
    Compressed,
    /// Opening the uncompressed stream
    Uncompressed,
}

impl std::fmt::Display for LayerOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Digest => write!(f, "digest"),
            Self::DiffId => write!(f, "diff id"),
            Self::Size => write!(f, "size"),
            Self::Compressed => write!(f, "compressed read"),
            Self::Uncompressed => write!(f, "uncompressed read"),
        }
    }
}

/// Strata error types
#[derive(Error, Debug)]
pub enum StrataError {
    /// Malformed mutation input, detected before any work is done
    #[error("Validation error: {0}")]
    Validation(String),

    /// Failure reading or hashing a layer's content
    #[error("Layer {operation} failed: {source}")]
    Layer {
        operation: LayerOperation,
        #[source]
        source: Box<StrataError>,
    },

    /// No layer with the requested digest or diff id
    #[error("Layer not found: {0}")]
    LayerNotFound(String),

    /// Manifest or config document could not be parsed or serialized
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Failure while reading or writing a tar stream
    #[error("Archive error: {0}")]
    ArchiveError(String),

    /// Malformed digest string
    #[error("Invalid digest: {0}")]
    InvalidDigest(String),

    /// OCI image layout problem
    #[error("Image layout error: {0}")]
    LayoutError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl StrataError {
    /// Tag an error with the layer operation that produced it.
    ///
    /// An error that already carries a tag keeps it.
    pub fn layer(operation: LayerOperation, source: impl Into<StrataError>) -> Self {
        match source.into() {
            tagged @ StrataError::Layer { .. } => tagged,
            other => StrataError::Layer {
                operation,
                source: Box::new(other),
            },
        }
    }

    /// Convert into an `std::io::Error`, keeping I/O errors intact.
    ///
    /// Used where a strata error has to cross a `Read`/`Write` boundary.
    pub fn into_io(self) -> std::io::Error {
        match self {
            StrataError::IoError(e) => e,
            other => std::io::Error::new(std::io::ErrorKind::Other, other),
        }
    }
}

impl From<serde_json::Error> for StrataError {
    fn from(err: serde_json::Error) -> Self {
        StrataError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for StrataError {
    fn from(err: serde_yaml::Error) -> Self {
        StrataError::SerializationError(err.to_string())
    }
}

/// Result type alias for strata operations
pub type Result<T> = std::result::Result<T, StrataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let error = StrataError::Validation("unable to add a missing layer".to_string());
        assert_eq!(
            error.to_string(),
            "Validation error: unable to add a missing layer"
        );
    }

    #[test]
    fn test_layer_error_display_names_operation() {
        let io_error = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "truncated");
        let error = StrataError::layer(LayerOperation::DiffId, io_error);
        assert_eq!(
            error.to_string(),
            "Layer diff id failed: I/O error: truncated"
        );
    }

    #[test]
    fn test_layer_error_source_is_preserved() {
        use std::error::Error as _;

        let error = StrataError::layer(
            LayerOperation::Digest,
            StrataError::Other("boom".to_string()),
        );
        let source = error.source().unwrap();
        assert_eq!(source.to_string(), "boom");
    }

    #[test]
    fn test_layer_error_keeps_innermost_tag() {
        let inner = StrataError::layer(
            LayerOperation::Compressed,
            StrataError::Other("gone".to_string()),
        );
        let error = StrataError::layer(LayerOperation::Digest, inner);
        assert!(matches!(
            error,
            StrataError::Layer {
                operation: LayerOperation::Compressed,
                ..
            }
        ));
    }

    #[test]
    fn test_layer_not_found_display() {
        let error = StrataError::LayerNotFound("sha256:abc".to_string());
        assert_eq!(error.to_string(), "Layer not found: sha256:abc");
    }

    #[test]
    fn test_archive_error_display() {
        let error = StrataError::ArchiveError("reading tar: unexpected EOF".to_string());
        assert_eq!(
            error.to_string(),
            "Archive error: reading tar: unexpected EOF"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: StrataError = io_error.into();
        assert!(matches!(error, StrataError::IoError(_)));
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_into_io_keeps_io_kind() {
        let error = StrataError::IoError(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "closed",
        ));
        assert_eq!(error.into_io().kind(), std::io::ErrorKind::BrokenPipe);

        let error = StrataError::ArchiveError("bad header".to_string());
        let io_error = error.into_io();
        assert_eq!(io_error.kind(), std::io::ErrorKind::Other);
        assert!(io_error.to_string().contains("bad header"));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let error: StrataError = result.unwrap_err().into();
        assert!(matches!(error, StrataError::SerializationError(_)));
    }

    #[test]
    fn test_serde_yaml_error_conversion() {
        let result: std::result::Result<serde_yaml::Value, _> =
            serde_yaml::from_str("invalid: yaml: content:");
        let error: StrataError = result.unwrap_err().into();
        assert!(matches!(error, StrataError::SerializationError(_)));
    }
}
