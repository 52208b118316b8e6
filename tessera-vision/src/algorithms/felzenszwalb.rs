//! Felzenszwalb-Huttenlocher graph-based segmentation

use super::common::{color_distance_sq, relabel_sequential, FloatImage, UnionFind};
use crate::algorithm::{ParamReader, ParameterRange, ParameterRanges, SegmentationAlgorithm};
use crate::error::VisionError;
use image::RgbImage;
use tessera_core::{LabelMap, ParamValue, Parameters};

pub struct Felzenszwalb;

struct Edge {
    weight: f32,
    a: usize,
    b: usize,
}

impl SegmentationAlgorithm for Felzenszwalb {
    fn name(&self) -> &str {
        "felzenszwalb"
    }

    fn display_name(&self) -> &str {
        "Felzenszwalb"
    }

    fn default_parameters(&self) -> Parameters {
        Parameters::from([
            ("scale".to_string(), ParamValue::Int(100)),
            ("sigma".to_string(), ParamValue::Float(0.5)),
            ("min_size".to_string(), ParamValue::Int(50)),
        ])
    }

    fn parameter_ranges(&self) -> ParameterRanges {
        ParameterRanges::from([
            ("scale".to_string(), ParameterRange::int(10, 1000, 10)),
            ("sigma".to_string(), ParameterRange::float(0.1, 2.0, 0.1)),
            ("min_size".to_string(), ParameterRange::int(10, 500, 10)),
        ])
    }

    fn compute_labels(&self, image: &RgbImage, params: &Parameters) -> Result<LabelMap, VisionError> {
        let reader = ParamReader::new(self.name(), params);
        let scale = reader.f64("scale")?.max(0.0);
        let sigma = reader.f64("sigma")?;
        let min_size = reader.i64("min_size")?.max(0) as usize;

        let mut img = FloatImage::from_rgb(image);
        img.gaussian_blur(sigma);

        let (w, h) = (img.width, img.height);
        let mut edges = Vec::with_capacity(img.len() * 4);
        for y in 0..h {
            for x in 0..w {
                let a = img.index(x, y);
                let mut push = |nx: usize, ny: usize| {
                    let b = img.index(nx, ny);
                    edges.push(Edge {
                        weight: color_distance_sq(img.data[a], img.data[b]).sqrt(),
                        a,
                        b,
                    });
                };
                if x + 1 < w {
                    push(x + 1, y);
                }
                if y + 1 < h {
                    push(x, y + 1);
                    if x + 1 < w {
                        push(x + 1, y + 1);
                    }
                    if x > 0 {
                        push(x - 1, y + 1);
                    }
                }
            }
        }
        edges.sort_by(|e1, e2| e1.weight.total_cmp(&e2.weight));

        // scale is expressed in 8-bit intensity units, weights in [0, 1]
        let k = (scale / 255.0) as f32;
        let mut forest = UnionFind::new(img.len());
        let mut threshold = vec![k; img.len()];

        for edge in &edges {
            let ra = forest.find(edge.a);
            let rb = forest.find(edge.b);
            if ra != rb && edge.weight <= threshold[ra] && edge.weight <= threshold[rb] {
                let root = forest.union_roots(ra, rb);
                threshold[root] = edge.weight + k / forest.size(root) as f32;
            }
        }

        for edge in &edges {
            let ra = forest.find(edge.a);
            let rb = forest.find(edge.b);
            if ra != rb && (forest.size(ra) < min_size || forest.size(rb) < min_size) {
                forest.union_roots(ra, rb);
            }
        }

        let roots: Vec<usize> = (0..img.len()).map(|i| forest.find(i)).collect();
        let labels = relabel_sequential(&roots, 0);
        LabelMap::new(image.width(), image.height(), labels)
            .ok_or_else(|| VisionError::Processing("label buffer size mismatch".to_string()))
    }
}
