//! Illustrative records served by the history and image listing endpoints.
//! Nothing is persisted; these exist so the web client has something to show.

use crate::rest::HistoryEntry;
use chrono::{DateTime, TimeZone, Utc};
use tessera_core::{ParamValue, Parameters};
use tessera_storage::ImageInfo;

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 21, hour, minute, 0)
        .single()
        .unwrap_or_default()
}

fn params(pairs: &[(&str, ParamValue)]) -> Parameters {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn entry(
    n: u32,
    image_id: &str,
    image_filename: &str,
    algorithm_name: &str,
    segments_count: usize,
    processing_time: f64,
    created_at: DateTime<Utc>,
    parameters_used: Parameters,
) -> HistoryEntry {
    HistoryEntry {
        id: format!("result_{}", n),
        image_id: image_id.to_string(),
        image_filename: image_filename.to_string(),
        algorithm_name: algorithm_name.to_string(),
        result_image_url: format!("/static/results/result_{}.png", n),
        segments_count,
        processing_time,
        created_at,
        parameters_used,
    }
}

/// Newest last.
pub fn history() -> Vec<HistoryEntry> {
    vec![
        entry(
            1,
            "img_123",
            "test_image.jpg",
            "felzenszwalb",
            245,
            2.3,
            at(10, 30),
            params(&[
                ("scale", ParamValue::Int(100)),
                ("sigma", ParamValue::Float(0.5)),
                ("min_size", ParamValue::Int(50)),
            ]),
        ),
        entry(
            2,
            "img_124",
            "another_image.jpg",
            "slic",
            180,
            1.8,
            at(11, 15),
            params(&[
                ("n_segments", ParamValue::Int(250)),
                ("compactness", ParamValue::Int(10)),
                ("sigma", ParamValue::Int(1)),
            ]),
        ),
        entry(
            3,
            "img_125",
            "third_image.jpg",
            "quickshift",
            320,
            3.1,
            at(12, 0),
            params(&[
                ("kernel_size", ParamValue::Int(3)),
                ("max_dist", ParamValue::Int(6)),
                ("ratio", ParamValue::Float(0.5)),
            ]),
        ),
    ]
}

/// Only the first two history records can be fetched individually.
pub fn history_entry(id: &str) -> Option<HistoryEntry> {
    history()
        .into_iter()
        .take(2)
        .find(|entry| entry.id == id)
}

pub fn images() -> Vec<ImageInfo> {
    let image = |id: &str, filename: &str, size: u64, dimensions: (u32, u32), created_at: DateTime<Utc>| ImageInfo {
        id: id.to_string(),
        filename: filename.to_string(),
        original_filename: filename.to_string(),
        url: format!("/static/uploads/{}", filename),
        content_type: "image/jpeg".to_string(),
        size,
        dimensions,
        created_at,
    };
    vec![
        image("img_123", "test_image.jpg", 245_760, (1920, 1080), at(10, 0)),
        image("img_124", "another_image.jpg", 387_520, (1600, 900), at(10, 30)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_lookup() {
        assert_eq!(history().len(), 3);
        assert_eq!(history_entry("result_2").unwrap().algorithm_name, "slic");
        assert!(history_entry("result_3").is_none());
        assert!(history_entry("nope").is_none());
    }

    #[test]
    fn test_fixture_timestamps() {
        let json = serde_json::to_value(&history()[0]).unwrap();
        assert_eq!(json["created_at"], "2025-09-21T10:30:00Z");
        assert_eq!(json["parameters_used"]["scale"], 100);
    }
}
