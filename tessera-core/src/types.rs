// Request, result and label map types shared across the workspace

use crate::params::Parameters;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Display hint echoed back to the client. Never affects execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ViewMode {
    #[default]
    #[serde(rename = "single")]
    Single,
    #[serde(rename = "split")]
    Split,
    #[serde(rename = "grid_2x2")]
    Grid2x2,
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewMode::Single => write!(f, "single"),
            ViewMode::Split => write!(f, "split"),
            ViewMode::Grid2x2 => write!(f, "grid_2x2"),
        }
    }
}

fn default_active() -> bool {
    true
}

/// One algorithm invocation requested by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub parameters: Parameters,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl AlgorithmConfig {
    pub fn new(name: impl Into<String>, parameters: Parameters) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            parameters,
            is_active: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationRequest {
    pub image_id: String,
    pub algorithms: Vec<AlgorithmConfig>,
    #[serde(default)]
    pub view_mode: ViewMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resize_dimensions: Option<(u32, u32)>,
}

impl SegmentationRequest {
    pub fn new(image_id: impl Into<String>, algorithms: Vec<AlgorithmConfig>) -> Self {
        Self {
            image_id: image_id.into(),
            algorithms,
            view_mode: ViewMode::Single,
            resize_dimensions: None,
        }
    }
}

/// Per-pixel segment ids, row-major, same size as the source image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    width: u32,
    height: u32,
    labels: Vec<u32>,
}

impl LabelMap {
    /// Returns `None` when the buffer length does not match the dimensions.
    pub fn new(width: u32, height: u32, labels: Vec<u32>) -> Option<Self> {
        if labels.len() != width as usize * height as usize {
            return None;
        }
        Some(Self { width, height, labels })
    }

    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> u32) -> Self {
        let mut labels = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                labels.push(f(x, y));
            }
        }
        Self { width, height, labels }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> u32 {
        self.labels[y as usize * self.width as usize + x as usize]
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.labels
    }

    /// Distinct label values in ascending order.
    pub fn unique_labels(&self) -> Vec<u32> {
        self.labels
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn segments_count(&self) -> usize {
        self.labels.iter().copied().collect::<BTreeSet<_>>().len()
    }
}

/// What an algorithm reports about one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationMetrics {
    pub segments_count: usize,
    /// Seconds spent inside the algorithm call.
    pub processing_time: f64,
    /// RSS delta in megabytes, when the platform can tell.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_usage: Option<f64>,
    pub parameters_used: Parameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub processing_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_usage: Option<f64>,
    pub segments_count: usize,
    pub algorithm_name: String,
    /// (height, width)
    pub image_dimensions: (u32, u32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationResult {
    pub algorithm_name: String,
    pub result_image_url: String,
    pub segments_count: usize,
    pub processing_time: f64,
    pub parameters_used: Parameters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<PerformanceMetrics>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationResponse {
    pub request_id: String,
    pub original_image_url: String,
    /// Successful units only, in submission order.
    pub results: Vec<SegmentationResult>,
    pub view_mode: ViewMode,
    /// Wall clock for the whole request, in seconds.
    pub total_processing_time: f64,
    pub created_at: DateTime<Utc>,
}
