use serde::{Deserialize, Serialize};
use tessera_core::SegmentationResponse;

/// One failed entry of a batch, by position in the submitted list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItemError {
    pub index: usize,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub successful_results: Vec<SegmentationResponse>,
    pub errors: Vec<BatchItemError>,
    pub total_requested: usize,
    pub successful_count: usize,
    pub error_count: usize,
}
