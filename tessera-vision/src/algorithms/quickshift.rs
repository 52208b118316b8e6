//! Quickshift: mode seeking over a Parzen density in (color, position) space

use super::common::{color_distance_sq, relabel_sequential, FloatImage};
use crate::algorithm::{ParamReader, ParameterRange, ParameterRanges, SegmentationAlgorithm};
use crate::error::VisionError;
use image::RgbImage;
use tessera_core::{LabelMap, ParamValue, Parameters};

pub struct Quickshift;

impl SegmentationAlgorithm for Quickshift {
    fn name(&self) -> &str {
        "quickshift"
    }

    fn display_name(&self) -> &str {
        "Quickshift"
    }

    fn default_parameters(&self) -> Parameters {
        Parameters::from([
            ("kernel_size".to_string(), ParamValue::Int(3)),
            ("max_dist".to_string(), ParamValue::Int(6)),
            ("ratio".to_string(), ParamValue::Float(0.5)),
        ])
    }

    fn parameter_ranges(&self) -> ParameterRanges {
        ParameterRanges::from([
            ("kernel_size".to_string(), ParameterRange::int(1, 10, 1)),
            ("max_dist".to_string(), ParameterRange::int(1, 20, 1)),
            ("ratio".to_string(), ParameterRange::float(0.1, 1.0, 0.1)),
        ])
    }

    fn compute_labels(&self, image: &RgbImage, params: &Parameters) -> Result<LabelMap, VisionError> {
        let reader = ParamReader::new(self.name(), params);
        let kernel_size = reader.f64("kernel_size")?;
        let max_dist = reader.f64("max_dist")?.max(0.0);
        let ratio = reader.f64("ratio")? as f32;
        if kernel_size <= 0.0 {
            return Err(VisionError::InvalidInput(
                "quickshift: kernel_size must be positive".to_string(),
            ));
        }

        let mut img = FloatImage::from_rgb(image);
        img.to_lab();
        for p in img.data.iter_mut() {
            for c in p.iter_mut() {
                *c *= ratio;
            }
        }

        let (w, h) = (img.width as isize, img.height as isize);
        let radius = (3.0 * kernel_size).ceil().min(w.max(h) as f64) as isize;
        let inv_two_sigma_sq = 1.0 / (2.0 * kernel_size * kernel_size);

        let distance_sq = |a: usize, b: usize, dx: isize, dy: isize| -> f64 {
            color_distance_sq(img.data[a], img.data[b]) as f64 + (dx * dx + dy * dy) as f64
        };

        let mut density = vec![0.0f64; img.len()];
        for y in 0..h {
            for x in 0..w {
                let idx = (y * w + x) as usize;
                let mut acc = 0.0;
                for ny in (y - radius).max(0)..=(y + radius).min(h - 1) {
                    for nx in (x - radius).max(0)..=(x + radius).min(w - 1) {
                        let j = (ny * w + nx) as usize;
                        acc += (-distance_sq(idx, j, nx - x, ny - y) * inv_two_sigma_sq).exp();
                    }
                }
                density[idx] = acc;
            }
        }

        // ties on density are broken by pixel index so the tree is acyclic
        let higher = |a: usize, b: usize| density[b] > density[a] || (density[b] == density[a] && b > a);

        let max_dist_sq = max_dist * max_dist;
        let mut parent: Vec<usize> = (0..img.len()).collect();
        for y in 0..h {
            for x in 0..w {
                let idx = (y * w + x) as usize;
                let mut closest = f64::INFINITY;
                let mut best = idx;
                for ny in (y - radius).max(0)..=(y + radius).min(h - 1) {
                    for nx in (x - radius).max(0)..=(x + radius).min(w - 1) {
                        let j = (ny * w + nx) as usize;
                        if higher(idx, j) {
                            let d = distance_sq(idx, j, nx - x, ny - y);
                            if d < closest {
                                closest = d;
                                best = j;
                            }
                        }
                    }
                }
                if closest <= max_dist_sq {
                    parent[idx] = best;
                }
            }
        }

        let roots: Vec<usize> = (0..parent.len())
            .map(|mut i| {
                while parent[i] != i {
                    i = parent[i];
                }
                i
            })
            .collect();

        let labels = relabel_sequential(&roots, 0);
        LabelMap::new(image.width(), image.height(), labels)
            .ok_or_else(|| VisionError::Processing("label buffer size mismatch".to_string()))
    }
}
