//! SLIC superpixels: localized k-means in Lab + image space

use super::common::{color_distance_sq, enforce_connectivity, FloatImage};
use crate::algorithm::{ParamReader, ParameterRange, ParameterRanges, SegmentationAlgorithm};
use crate::error::VisionError;
use image::RgbImage;
use tessera_core::{LabelMap, ParamValue, Parameters};

const ITERATIONS: usize = 10;
const MIN_SIZE_FACTOR: f64 = 0.5;

pub struct Slic;

#[derive(Clone, Copy)]
struct Center {
    color: [f32; 3],
    x: f64,
    y: f64,
}

impl SegmentationAlgorithm for Slic {
    fn name(&self) -> &str {
        "slic"
    }

    fn display_name(&self) -> &str {
        "SLIC"
    }

    fn default_parameters(&self) -> Parameters {
        Parameters::from([
            ("n_segments".to_string(), ParamValue::Int(250)),
            ("compactness".to_string(), ParamValue::Int(10)),
            ("sigma".to_string(), ParamValue::Int(1)),
            ("start_label".to_string(), ParamValue::Int(1)),
        ])
    }

    fn parameter_ranges(&self) -> ParameterRanges {
        ParameterRanges::from([
            ("n_segments".to_string(), ParameterRange::int(50, 1000, 10)),
            ("compactness".to_string(), ParameterRange::int(1, 50, 1)),
            ("sigma".to_string(), ParameterRange::float(0.0, 5.0, 0.1)),
            ("start_label".to_string(), ParameterRange::int(0, 1, 1)),
        ])
    }

    fn compute_labels(&self, image: &RgbImage, params: &Parameters) -> Result<LabelMap, VisionError> {
        let reader = ParamReader::new(self.name(), params);
        let n_segments = reader.i64("n_segments")?.max(1) as usize;
        let compactness = reader.f64("compactness")?.max(0.0);
        let sigma = reader.f64("sigma")?;
        let start_label = reader.i64("start_label")?.max(0) as u32;

        let mut img = FloatImage::from_rgb(image);
        img.gaussian_blur(sigma);
        img.to_lab();

        let (w, h) = (img.width, img.height);
        let total = img.len();
        let step = ((total as f64) / n_segments as f64).sqrt().max(1.0);

        let mut centers = initial_centers(&img, step);
        let mut assigned = vec![0usize; total];
        let mut best = vec![f64::INFINITY; total];
        let spatial_weight = (compactness / step).powi(2);
        let window = (2.0 * step).ceil() as isize;

        for _ in 0..ITERATIONS {
            best.iter_mut().for_each(|d| *d = f64::INFINITY);
            for (k, c) in centers.iter().enumerate() {
                let (cx, cy) = (c.x.round() as isize, c.y.round() as isize);
                let x0 = (cx - window).max(0) as usize;
                let x1 = ((cx + window) as usize).min(w - 1);
                let y0 = (cy - window).max(0) as usize;
                let y1 = ((cy + window) as usize).min(h - 1);
                for y in y0..=y1 {
                    for x in x0..=x1 {
                        let idx = img.index(x, y);
                        let dc = color_distance_sq(img.data[idx], c.color) as f64;
                        let dx = x as f64 - c.x;
                        let dy = y as f64 - c.y;
                        let d = dc + (dx * dx + dy * dy) * spatial_weight;
                        if d < best[idx] {
                            best[idx] = d;
                            assigned[idx] = k;
                        }
                    }
                }
            }

            let mut sums = vec![([0.0f64; 3], 0.0f64, 0.0f64, 0usize); centers.len()];
            for y in 0..h {
                for x in 0..w {
                    let idx = img.index(x, y);
                    let entry = &mut sums[assigned[idx]];
                    for c in 0..3 {
                        entry.0[c] += img.data[idx][c] as f64;
                    }
                    entry.1 += x as f64;
                    entry.2 += y as f64;
                    entry.3 += 1;
                }
            }
            for (center, (color, sx, sy, count)) in centers.iter_mut().zip(sums) {
                if count == 0 {
                    continue;
                }
                let n = count as f64;
                center.color = [
                    (color[0] / n) as f32,
                    (color[1] / n) as f32,
                    (color[2] / n) as f32,
                ];
                center.x = sx / n;
                center.y = sy / n;
            }
        }

        let min_size = (MIN_SIZE_FACTOR * total as f64 / n_segments as f64) as usize;
        let labels = enforce_connectivity(&assigned, w, h, min_size, start_label);
        LabelMap::new(image.width(), image.height(), labels)
            .ok_or_else(|| VisionError::Processing("label buffer size mismatch".to_string()))
    }
}

fn initial_centers(img: &FloatImage, step: f64) -> Vec<Center> {
    let nx = ((img.width as f64 / step).round() as usize).max(1);
    let ny = ((img.height as f64 / step).round() as usize).max(1);
    let (sx, sy) = (img.width as f64 / nx as f64, img.height as f64 / ny as f64);

    let mut centers = Vec::with_capacity(nx * ny);
    for j in 0..ny {
        for i in 0..nx {
            let x = ((i as f64 + 0.5) * sx).min(img.width as f64 - 1.0);
            let y = ((j as f64 + 0.5) * sy).min(img.height as f64 - 1.0);
            centers.push(Center {
                color: img.at(x as usize, y as usize),
                x,
                y,
            });
        }
    }
    centers
}
