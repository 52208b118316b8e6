//! tessera-vision: segmentation algorithms and their registry
//!
//! Every algorithm implements [`SegmentationAlgorithm`]; the four built-in
//! methods are registered by [`AlgorithmRegistry::with_builtins`]. Results
//! are turned into displayable images by [`render_label_map`].

pub mod algorithm;
pub mod algorithms;
pub mod error;
pub mod memory;
pub mod registry;
pub mod render;

pub use algorithm::{ParamKind, ParameterRange, ParameterRanges, SegmentationAlgorithm};
pub use error::VisionError;
pub use registry::AlgorithmRegistry;
pub use render::render_label_map;
