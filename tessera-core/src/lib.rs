pub mod config;
pub mod error;
pub mod params;
pub mod types;

pub use config::{ConfigError, LogFormat, ServiceConfig};
pub use error::{Error, ErrorKind, Result};
pub use params::{canonical_parameter_string, ParamValue, Parameters};
pub use types::{
    AlgorithmConfig, LabelMap, PerformanceMetrics, SegmentationMetrics, SegmentationRequest,
    SegmentationResponse, SegmentationResult, ViewMode,
};
