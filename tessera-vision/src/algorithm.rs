//! Shared contract for segmentation algorithms

use crate::error::VisionError;
use crate::memory;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tessera_core::{LabelMap, ParamValue, Parameters, SegmentationMetrics};
use tracing::debug;

/// Numeric type of a tunable parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Int,
    Float,
}

/// Bounds for one parameter. `segment` rejects resolved values outside them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
    #[serde(rename = "type")]
    pub kind: ParamKind,
}

impl ParameterRange {
    pub fn int(min: i64, max: i64, step: i64) -> Self {
        Self {
            min: min as f64,
            max: max as f64,
            step: step as f64,
            kind: ParamKind::Int,
        }
    }

    pub fn float(min: f64, max: f64, step: f64) -> Self {
        Self {
            min,
            max,
            step,
            kind: ParamKind::Float,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

pub type ParameterRanges = BTreeMap<String, ParameterRange>;

/// A segmentation method. Implementations are pure: the same pixels and
/// parameters always give the same labels.
pub trait SegmentationAlgorithm: Send + Sync {
    /// Stable registry key.
    fn name(&self) -> &str;

    fn display_name(&self) -> &str;

    fn default_parameters(&self) -> Parameters;

    fn parameter_ranges(&self) -> ParameterRanges;

    /// Label every pixel. `params` already has defaults merged in.
    fn compute_labels(&self, image: &RgbImage, params: &Parameters) -> Result<LabelMap, VisionError>;

    /// Defaults overlaid with the caller's values for known keys.
    fn resolve_parameters(&self, supplied: &Parameters) -> Parameters {
        let mut resolved = self.default_parameters();
        for (key, value) in supplied {
            if resolved.contains_key(key) && *value != ParamValue::Null {
                resolved.insert(key.clone(), value.clone());
            }
        }
        resolved
    }

    /// Reject numeric values that fall outside the declared ranges. Values
    /// that are not numeric are left for the algorithm's own reads.
    fn check_ranges(&self, params: &Parameters) -> Result<(), VisionError> {
        for (key, range) in self.parameter_ranges() {
            let Some(value) = params.get(&key).and_then(ParamValue::as_f64) else {
                continue;
            };
            if !range.contains(value) {
                return Err(VisionError::InvalidInput(format!(
                    "{}: parameter '{}' must be between {} and {}, got {}",
                    self.name(),
                    key,
                    range.min,
                    range.max,
                    value
                )));
            }
        }
        Ok(())
    }

    /// Run the algorithm and report timing, memory and segment count.
    fn segment(
        &self,
        image: &RgbImage,
        supplied: &Parameters,
    ) -> Result<(LabelMap, SegmentationMetrics), VisionError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(VisionError::InvalidInput("image has no pixels".to_string()));
        }
        let params = self.resolve_parameters(supplied);
        self.check_ranges(&params)?;

        let rss_before = memory::resident_megabytes();
        let start = Instant::now();
        let labels = self.compute_labels(image, &params)?;
        let processing_time = start.elapsed().as_secs_f64();
        let memory_usage = match (rss_before, memory::resident_megabytes()) {
            (Some(before), Some(after)) => Some(after - before),
            _ => None,
        };

        if labels.width() != image.width() || labels.height() != image.height() {
            return Err(VisionError::Processing(format!(
                "{} produced a {}x{} label map for a {}x{} image",
                self.name(),
                labels.width(),
                labels.height(),
                image.width(),
                image.height()
            )));
        }

        let segments_count = labels.segments_count();
        debug!(
            algorithm = self.name(),
            segments = segments_count,
            seconds = processing_time,
            "Segmentation finished"
        );

        Ok((
            labels,
            SegmentationMetrics {
                segments_count,
                processing_time,
                memory_usage,
                parameters_used: params,
            },
        ))
    }
}

/// Typed reads from a resolved parameter map.
pub(crate) struct ParamReader<'a> {
    algorithm: &'a str,
    params: &'a Parameters,
}

impl<'a> ParamReader<'a> {
    pub(crate) fn new(algorithm: &'a str, params: &'a Parameters) -> Self {
        Self { algorithm, params }
    }

    fn value(&self, key: &str) -> Result<&ParamValue, VisionError> {
        self.params.get(key).ok_or_else(|| {
            VisionError::InvalidInput(format!("{}: missing parameter '{}'", self.algorithm, key))
        })
    }

    pub(crate) fn f64(&self, key: &str) -> Result<f64, VisionError> {
        let value = self.value(key)?;
        value.as_f64().ok_or_else(|| {
            VisionError::InvalidInput(format!(
                "{}: parameter '{}' is not numeric: {}",
                self.algorithm, key, value
            ))
        })
    }

    pub(crate) fn i64(&self, key: &str) -> Result<i64, VisionError> {
        let value = self.value(key)?;
        value.as_i64().ok_or_else(|| {
            VisionError::InvalidInput(format!(
                "{}: parameter '{}' is not an integer: {}",
                self.algorithm, key, value
            ))
        })
    }
}
