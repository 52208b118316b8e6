//! Error types for tessera-vision

use tessera_core::Error as CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("Duplicate algorithm: {0}")]
    DuplicateAlgorithm(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl From<VisionError> for CoreError {
    fn from(err: VisionError) -> Self {
        match err {
            VisionError::UnknownAlgorithm(name) => CoreError::UnknownAlgorithm(name),
            VisionError::DuplicateAlgorithm(name) => CoreError::DuplicateAlgorithm(name),
            other => CoreError::Execution(other.to_string()),
        }
    }
}
