//! Pixel helpers shared by the built-in algorithms

use image::RgbImage;

/// Three-channel float image, row-major.
#[derive(Debug, Clone)]
pub(crate) struct FloatImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<[f32; 3]>,
}

impl FloatImage {
    /// RGB scaled to `[0, 1]`.
    pub fn from_rgb(image: &RgbImage) -> Self {
        let data = image
            .pixels()
            .map(|p| {
                [
                    p[0] as f32 / 255.0,
                    p[1] as f32 / 255.0,
                    p[2] as f32 / 255.0,
                ]
            })
            .collect();
        Self {
            width: image.width() as usize,
            height: image.height() as usize,
            data,
        }
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    #[inline]
    pub fn at(&self, x: usize, y: usize) -> [f32; 3] {
        self.data[self.index(x, y)]
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Separable Gaussian blur with edge clamping. `sigma <= 0` is a no-op.
    pub fn gaussian_blur(&mut self, sigma: f64) {
        if sigma <= 0.0 || self.data.is_empty() {
            return;
        }
        let kernel = gaussian_kernel(sigma, self.width.max(self.height));
        let radius = (kernel.len() / 2) as isize;
        let (w, h) = (self.width as isize, self.height as isize);

        let mut tmp = vec![[0.0f32; 3]; self.data.len()];
        for y in 0..h {
            for x in 0..w {
                let mut acc = [0.0f32; 3];
                for (k, weight) in kernel.iter().enumerate() {
                    let sx = (x + k as isize - radius).clamp(0, w - 1);
                    let p = self.data[(y * w + sx) as usize];
                    for c in 0..3 {
                        acc[c] += p[c] * weight;
                    }
                }
                tmp[(y * w + x) as usize] = acc;
            }
        }
        for y in 0..h {
            for x in 0..w {
                let mut acc = [0.0f32; 3];
                for (k, weight) in kernel.iter().enumerate() {
                    let sy = (y + k as isize - radius).clamp(0, h - 1);
                    let p = tmp[(sy * w + x) as usize];
                    for c in 0..3 {
                        acc[c] += p[c] * weight;
                    }
                }
                self.data[(y * w + x) as usize] = acc;
            }
        }
    }

    /// Convert in place from `[0, 1]` sRGB to CIE Lab (D65).
    pub fn to_lab(&mut self) {
        for p in self.data.iter_mut() {
            *p = srgb_to_lab(*p);
        }
    }
}

/// Truncated at 4 sigma, and never wider than `max_radius` taps per side.
fn gaussian_kernel(sigma: f64, max_radius: usize) -> Vec<f32> {
    let radius = (4.0 * sigma).ceil().clamp(1.0, max_radius.max(1) as f64) as isize;
    let two_sigma_sq = 2.0 * sigma * sigma;
    let mut kernel: Vec<f64> = (-radius..=radius)
        .map(|i| (-((i * i) as f64) / two_sigma_sq).exp())
        .collect();
    let sum: f64 = kernel.iter().sum();
    for k in kernel.iter_mut() {
        *k /= sum;
    }
    kernel.into_iter().map(|k| k as f32).collect()
}

fn srgb_to_lab(rgb: [f32; 3]) -> [f32; 3] {
    fn linear(c: f32) -> f32 {
        if c > 0.04045 {
            ((c + 0.055) / 1.055).powf(2.4)
        } else {
            c / 12.92
        }
    }
    fn f(t: f32) -> f32 {
        if t > 0.008856 {
            t.cbrt()
        } else {
            7.787 * t + 16.0 / 116.0
        }
    }

    let (r, g, b) = (linear(rgb[0]), linear(rgb[1]), linear(rgb[2]));
    let x = (0.412453 * r + 0.357580 * g + 0.180423 * b) / 0.95047;
    let y = 0.212671 * r + 0.715160 * g + 0.072169 * b;
    let z = (0.019334 * r + 0.119193 * g + 0.950227 * b) / 1.08883;

    let (fx, fy, fz) = (f(x), f(y), f(z));
    let l = if y > 0.008856 { 116.0 * fy - 16.0 } else { 903.3 * y };
    [l, 500.0 * (fx - fy), 200.0 * (fy - fz)]
}

#[inline]
pub(crate) fn color_distance_sq(a: [f32; 3], b: [f32; 3]) -> f32 {
    let d0 = a[0] - b[0];
    let d1 = a[1] - b[1];
    let d2 = a[2] - b[2];
    d0 * d0 + d1 * d1 + d2 * d2
}

/// Disjoint-set forest with union by rank and component sizes.
pub(crate) struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
    size: Vec<usize>,
}

impl UnionFind {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
            size: vec![1; n],
        }
    }

    pub fn find(&mut self, mut x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        while self.parent[x] != root {
            let next = self.parent[x];
            self.parent[x] = root;
            x = next;
        }
        root
    }

    /// Join two roots; returns the surviving root.
    pub fn union_roots(&mut self, a: usize, b: usize) -> usize {
        if a == b {
            return a;
        }
        let (big, small) = if self.rank[a] >= self.rank[b] { (a, b) } else { (b, a) };
        self.parent[small] = big;
        self.size[big] += self.size[small];
        if self.rank[big] == self.rank[small] {
            self.rank[big] += 1;
        }
        big
    }

    pub fn size(&self, root: usize) -> usize {
        self.size[root]
    }
}

/// Map arbitrary ids onto `start, start + 1, ...` in first-seen order.
pub(crate) fn relabel_sequential(labels: &[usize], start: u32) -> Vec<u32> {
    let mut mapping = std::collections::HashMap::new();
    labels
        .iter()
        .map(|&id| {
            let next = start + mapping.len() as u32;
            *mapping.entry(id).or_insert(next)
        })
        .collect()
}

/// Merge 4-connected fragments smaller than `min_size` into the label of
/// the fragment preceding them in scan order, then relabel from `start`.
pub(crate) fn enforce_connectivity(
    labels: &[usize],
    width: usize,
    height: usize,
    min_size: usize,
    start: u32,
) -> Vec<u32> {
    let n = labels.len();
    let mut out = vec![usize::MAX; n];
    let mut next_label = 0usize;
    let mut stack = Vec::new();
    let mut component = Vec::new();

    for seed in 0..n {
        if out[seed] != usize::MAX {
            continue;
        }
        let original = labels[seed];
        // neighbouring, already assigned label used when this piece is too small
        let (sx, sy) = (seed % width, seed / width);
        let adjacent = if sx > 0 {
            Some(out[seed - 1])
        } else if sy > 0 {
            Some(out[seed - width])
        } else {
            None
        };

        component.clear();
        stack.push(seed);
        out[seed] = next_label;
        while let Some(idx) = stack.pop() {
            component.push(idx);
            let (x, y) = (idx % width, idx / width);
            let mut visit = |j: usize| {
                if out[j] == usize::MAX && labels[j] == original {
                    out[j] = next_label;
                    stack.push(j);
                }
            };
            if x > 0 {
                visit(idx - 1);
            }
            if x + 1 < width {
                visit(idx + 1);
            }
            if y > 0 {
                visit(idx - width);
            }
            if y + 1 < height {
                visit(idx + width);
            }
        }

        match adjacent {
            Some(target) if component.len() < min_size => {
                for &idx in &component {
                    out[idx] = target;
                }
            }
            _ => next_label += 1,
        }
    }

    relabel_sequential(&out, start)
}
