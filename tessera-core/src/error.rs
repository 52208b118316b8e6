use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Image not found: {0}")]
    ImageNotFound(String),

    #[error("Unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("Duplicate algorithm: {0}")]
    DuplicateAlgorithm(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Coarse classification used at the request boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any work ran (4xx).
    Validation,
    /// A referenced resource does not exist (404).
    NotFound,
    /// One unit of work failed.
    Execution,
    /// Cache or store unavailable.
    Infrastructure,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) | Error::UnknownAlgorithm(_) => ErrorKind::Validation,
            Error::ImageNotFound(_) => ErrorKind::NotFound,
            Error::Execution(_) => ErrorKind::Execution,
            Error::Storage(_) | Error::Cache(_) | Error::Io(_) => ErrorKind::Infrastructure,
            Error::DuplicateAlgorithm(_)
            | Error::Serialization(_)
            | Error::Configuration(_) => ErrorKind::Internal,
        }
    }

    /// Text safe to show a client. Validation, not-found and algorithm
    /// errors carry their detail; everything else collapses to a generic
    /// message.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Validation | ErrorKind::NotFound | ErrorKind::Execution => self.to_string(),
            _ => "Internal server error".to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UnknownAlgorithm("kmeans".to_string());
        assert_eq!(err.to_string(), "Unknown algorithm: kmeans");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::Validation("x".into()).kind(), ErrorKind::Validation);
        assert_eq!(Error::UnknownAlgorithm("x".into()).kind(), ErrorKind::Validation);
        assert_eq!(Error::ImageNotFound("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(Error::Execution("x".into()).kind(), ErrorKind::Execution);
        assert_eq!(Error::Cache("x".into()).kind(), ErrorKind::Infrastructure);
        assert_eq!(Error::Configuration("x".into()).kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_public_message_hides_internals() {
        assert_eq!(
            Error::ImageNotFound("img-1".into()).public_message(),
            "Image not found: img-1"
        );
        assert_eq!(
            Error::Storage("disk /var/x full".into()).public_message(),
            "Internal server error"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
    }

    #[test]
    fn test_error_from_serde() {
        let parse_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: Error = parse_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
