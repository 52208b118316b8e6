//! Marker-based watershed over a Sobel gradient

use super::common::FloatImage;
use crate::algorithm::{ParamReader, ParameterRange, ParameterRanges, SegmentationAlgorithm};
use crate::error::VisionError;
use image::RgbImage;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use tessera_core::{LabelMap, ParamValue, Parameters};

/// Minimum spacing between two markers, in pixels.
const MARKER_MIN_DISTANCE: usize = 10;

pub struct Watershed;

impl SegmentationAlgorithm for Watershed {
    fn name(&self) -> &str {
        "watershed"
    }

    fn display_name(&self) -> &str {
        "Watershed"
    }

    fn default_parameters(&self) -> Parameters {
        Parameters::from([
            ("markers".to_string(), ParamValue::Int(250)),
            ("compactness".to_string(), ParamValue::Int(0)),
        ])
    }

    fn parameter_ranges(&self) -> ParameterRanges {
        ParameterRanges::from([
            ("markers".to_string(), ParameterRange::int(50, 1000, 10)),
            ("compactness".to_string(), ParameterRange::float(0.0, 1.0, 0.1)),
        ])
    }

    fn compute_labels(&self, image: &RgbImage, params: &Parameters) -> Result<LabelMap, VisionError> {
        let reader = ParamReader::new(self.name(), params);
        let marker_count = reader.i64("markers")?.max(1) as usize;
        let compactness = reader.f64("compactness")?.max(0.0);

        let img = FloatImage::from_rgb(image);
        let (w, h) = (img.width, img.height);
        let gray: Vec<f64> = img
            .data
            .iter()
            .map(|p| (p[0] as f64 + p[1] as f64 + p[2] as f64) / 3.0)
            .collect();
        let elevation = sobel(&gray, w, h);

        let seeds = find_markers(&elevation, w, h, MARKER_MIN_DISTANCE, marker_count);
        let labels = flood(&elevation, w, h, &seeds, compactness);
        LabelMap::new(image.width(), image.height(), labels)
            .ok_or_else(|| VisionError::Processing("label buffer size mismatch".to_string()))
    }
}

/// Gradient magnitude with reflected borders.
fn sobel(gray: &[f64], w: usize, h: usize) -> Vec<f64> {
    let at = |x: isize, y: isize| -> f64 {
        let cx = x.clamp(0, w as isize - 1) as usize;
        let cy = y.clamp(0, h as isize - 1) as usize;
        gray[cy * w + cx]
    };
    let mut out = vec![0.0; w * h];
    for y in 0..h as isize {
        for x in 0..w as isize {
            let gx = (at(x + 1, y - 1) + 2.0 * at(x + 1, y) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2.0 * at(x - 1, y) + at(x - 1, y + 1));
            let gy = (at(x - 1, y + 1) + 2.0 * at(x, y + 1) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2.0 * at(x, y - 1) + at(x + 1, y - 1));
            // normalized so a unit step gives a magnitude near 1
            out[y as usize * w + x as usize] = (gx * gx + gy * gy).sqrt() / (4.0 * std::f64::consts::SQRT_2);
        }
    }
    out
}

/// Local minima of the elevation at least `min_distance` apart, lowest
/// first, capped at `max_markers`. Falls back to the global minimum when
/// the image is too small to host any.
fn find_markers(
    elevation: &[f64],
    w: usize,
    h: usize,
    min_distance: usize,
    max_markers: usize,
) -> Vec<usize> {
    let r = min_distance as isize;
    let mut candidates = Vec::new();
    if w > 2 * min_distance && h > 2 * min_distance {
        for y in min_distance..h - min_distance {
            for x in min_distance..w - min_distance {
                let v = elevation[y * w + x];
                let mut is_min = true;
                'window: for ny in (y as isize - r)..=(y as isize + r) {
                    for nx in (x as isize - r)..=(x as isize + r) {
                        if elevation[ny as usize * w + nx as usize] < v {
                            is_min = false;
                            break 'window;
                        }
                    }
                }
                if is_min {
                    candidates.push(y * w + x);
                }
            }
        }
    }
    candidates.sort_by(|&a, &b| elevation[a].total_cmp(&elevation[b]).then(a.cmp(&b)));

    let min_dist_sq = (min_distance * min_distance) as isize;
    let mut chosen: Vec<usize> = Vec::new();
    for idx in candidates {
        if chosen.len() >= max_markers {
            break;
        }
        let (x, y) = ((idx % w) as isize, (idx / w) as isize);
        let crowded = chosen.iter().any(|&c| {
            let (cx, cy) = ((c % w) as isize, (c / w) as isize);
            (cx - x).pow(2) + (cy - y).pow(2) <= min_dist_sq
        });
        if !crowded {
            chosen.push(idx);
        }
    }

    if chosen.is_empty() {
        let lowest = (0..elevation.len())
            .min_by(|&a, &b| elevation[a].total_cmp(&elevation[b]))
            .unwrap_or(0);
        chosen.push(lowest);
    }
    chosen
}

/// Priority flood from the seeds; seed `i` gets label `i + 1`.
fn flood(elevation: &[f64], w: usize, h: usize, seeds: &[usize], compactness: f64) -> Vec<u32> {
    let mut labels = vec![0u32; w * h];
    // (priority bits, insertion age, pixel, seed)
    let mut heap: BinaryHeap<Reverse<(u64, u64, usize, usize)>> = BinaryHeap::new();
    let mut age = 0u64;

    let priority = |idx: usize, seed: usize| -> u64 {
        let mut p = elevation[idx];
        if compactness > 0.0 {
            let (x, y) = ((idx % w) as f64, (idx / w) as f64);
            let (sx, sy) = ((seed % w) as f64, (seed / w) as f64);
            p += compactness * ((x - sx).powi(2) + (y - sy).powi(2)).sqrt();
        }
        // non-negative floats order the same as their bit patterns
        p.max(0.0).to_bits()
    };

    for (i, &seed) in seeds.iter().enumerate() {
        labels[seed] = i as u32 + 1;
        heap.push(Reverse((priority(seed, seed), age, seed, seed)));
        age += 1;
    }

    while let Some(Reverse((_, _, idx, seed))) = heap.pop() {
        let label = labels[idx];
        let (x, y) = (idx % w, idx / w);
        let mut neighbours = [usize::MAX; 4];
        if x > 0 {
            neighbours[0] = idx - 1;
        }
        if x + 1 < w {
            neighbours[1] = idx + 1;
        }
        if y > 0 {
            neighbours[2] = idx - w;
        }
        if y + 1 < h {
            neighbours[3] = idx + w;
        }
        for n in neighbours.into_iter().filter(|&n| n != usize::MAX) {
            if labels[n] == 0 {
                labels[n] = label;
                heap.push(Reverse((priority(n, seed), age, n, seed)));
                age += 1;
            }
        }
    }
    labels
}
