//! Error types for tessera-storage

use tessera_core::Error as CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(err: tokio::task::JoinError) -> Self {
        StorageError::Task(err.to_string())
    }
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => CoreError::ImageNotFound(id),
            StorageError::InvalidId(id) => CoreError::ImageNotFound(id),
            StorageError::InvalidImage(msg) => CoreError::Validation(msg),
            other => CoreError::Storage(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::ErrorKind;

    #[test]
    fn test_not_found_maps_to_image_not_found() {
        let core: CoreError = StorageError::NotFound("abc".to_string()).into();
        assert!(matches!(core, CoreError::ImageNotFound(ref id) if id == "abc"));
        assert_eq!(core.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_io_maps_to_infrastructure() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let core: CoreError = StorageError::from(io).into();
        assert_eq!(core.kind(), ErrorKind::Infrastructure);
    }
}
