use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use tessera_core::{ParamValue, Parameters};
use tessera_storage::ImageInfo;
use tessera_vision::{ParamKind, ParameterRange, SegmentationAlgorithm};

/// One tunable parameter with its default and bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    pub name: String,
    pub value: ParamValue,
    #[serde(rename = "type")]
    pub kind: String,
    pub min_value: Option<JsonValue>,
    pub max_value: Option<JsonValue>,
    pub step: Option<JsonValue>,
}

/// Bounds without the type tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeBounds {
    pub min: JsonValue,
    pub max: JsonValue,
    pub step: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmInfo {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub default_parameters: BTreeMap<String, ParameterSchema>,
    pub parameter_ranges: BTreeMap<String, RangeBounds>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmsListResponse {
    pub algorithms: Vec<AlgorithmInfo>,
    pub total_count: usize,
}

/// Integer-typed bounds are rendered as JSON integers.
fn bound(value: f64, kind: ParamKind) -> JsonValue {
    match kind {
        ParamKind::Int if value.fract() == 0.0 => JsonValue::from(value as i64),
        _ => JsonValue::from(value),
    }
}

fn kind_name(kind: ParamKind) -> &'static str {
    match kind {
        ParamKind::Int => "int",
        ParamKind::Float => "float",
    }
}

impl RangeBounds {
    fn from_range(range: &ParameterRange) -> Self {
        Self {
            min: bound(range.min, range.kind),
            max: bound(range.max, range.kind),
            step: bound(range.step, range.kind),
        }
    }
}

impl AlgorithmInfo {
    pub fn from_algorithm(algorithm: &dyn SegmentationAlgorithm) -> Self {
        let ranges = algorithm.parameter_ranges();
        let defaults: Parameters = algorithm.default_parameters();

        let default_parameters = defaults
            .into_iter()
            .map(|(name, value)| {
                let range = ranges.get(&name);
                let schema = ParameterSchema {
                    name: name.clone(),
                    value,
                    kind: range.map(|r| kind_name(r.kind)).unwrap_or("float").to_string(),
                    min_value: range.map(|r| bound(r.min, r.kind)),
                    max_value: range.map(|r| bound(r.max, r.kind)),
                    step: range.map(|r| bound(r.step, r.kind)),
                };
                (name, schema)
            })
            .collect();

        let parameter_ranges = ranges
            .iter()
            .map(|(name, range)| (name.clone(), RangeBounds::from_range(range)))
            .collect();

        Self {
            name: algorithm.name().to_string(),
            display_name: algorithm.display_name().to_string(),
            description: format!("{} segmentation algorithm", algorithm.display_name()),
            default_parameters,
            parameter_ranges,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUploadResponse {
    pub success: bool,
    pub image: Option<ImageInfo>,
    pub message: String,
    pub upload_url: Option<String>,
}

impl ImageUploadResponse {
    pub fn uploaded(image: ImageInfo) -> Self {
        Self {
            success: true,
            upload_url: Some(image.url.clone()),
            image: Some(image),
            message: "Image uploaded successfully".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDetails {
    pub id: String,
    pub url: String,
    /// (height, width)
    pub dimensions: (u32, u32),
    pub channels: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheClearResponse {
    pub prefix: String,
    pub cleared: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
}

/// Offset/limit query used by the listing endpoints.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl PageQuery {
    pub fn apply<T: Clone>(&self, items: &[T]) -> Vec<T> {
        items.iter().skip(self.offset).take(self.limit).cloned().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub image_id: String,
    pub image_filename: String,
    pub algorithm_name: String,
    pub result_image_url: String,
    pub segments_count: usize,
    pub processing_time: f64,
    pub created_at: DateTime<Utc>,
    pub parameters_used: Parameters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPage {
    pub results: Vec<HistoryEntry>,
    pub total_count: usize,
    pub offset: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageListPage {
    pub images: Vec<ImageInfo>,
    pub total_count: usize,
    pub offset: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }
}
