//! Label map to color image

use image::{Rgb, RgbImage};
use std::collections::HashMap;
use tessera_core::LabelMap;

/// Qualitative 20-color cycle used for the first twenty segments.
pub const TAB20: [[u8; 3]; 20] = [
    [31, 119, 180],
    [174, 199, 232],
    [255, 127, 14],
    [255, 187, 120],
    [44, 160, 44],
    [152, 223, 138],
    [214, 39, 40],
    [255, 152, 150],
    [148, 103, 189],
    [197, 176, 213],
    [140, 86, 75],
    [196, 156, 148],
    [227, 119, 194],
    [247, 182, 210],
    [127, 127, 127],
    [199, 199, 199],
    [188, 189, 34],
    [219, 219, 141],
    [23, 190, 207],
    [158, 218, 229],
];

/// Pastel 12-color cycle for segments beyond the twentieth.
pub const SET3: [[u8; 3]; 12] = [
    [141, 211, 199],
    [255, 255, 179],
    [190, 186, 218],
    [251, 128, 114],
    [128, 177, 211],
    [253, 180, 98],
    [179, 222, 105],
    [252, 205, 229],
    [217, 217, 217],
    [188, 128, 189],
    [204, 235, 197],
    [255, 237, 111],
];

/// `count` colors spread evenly across a listed palette, endpoints included.
fn sample_palette(palette: &[[u8; 3]], count: usize) -> impl Iterator<Item = [u8; 3]> + '_ {
    let n = palette.len();
    (0..count).map(move |i| {
        let position = if count > 1 {
            i as f64 / (count - 1) as f64
        } else {
            0.0
        };
        let idx = ((position * n as f64) as usize).min(n - 1);
        palette[idx]
    })
}

/// One color per distinct label, in ascending label order.
pub fn label_colors(unique_labels: &[u32]) -> HashMap<u32, [u8; 3]> {
    let count = unique_labels.len();
    let primary = count.min(TAB20.len());
    let colors = sample_palette(&TAB20, primary).chain(sample_palette(&SET3, count - primary));
    unique_labels.iter().copied().zip(colors).collect()
}

/// Colorize a label map. A map with a single label renders as grayscale
/// using the label value (clamped to 255) as intensity.
pub fn render_label_map(labels: &LabelMap) -> RgbImage {
    let unique = labels.unique_labels();
    if unique.len() <= 1 {
        return RgbImage::from_fn(labels.width(), labels.height(), |x, y| {
            let v = labels.get(x, y).min(255) as u8;
            Rgb([v, v, v])
        });
    }

    let colors = label_colors(&unique);
    RgbImage::from_fn(labels.width(), labels.height(), |x, y| {
        Rgb(colors[&labels.get(x, y)])
    })
}
