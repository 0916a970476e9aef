use ndarray as nd;

use crate::filter::{box_sum, reflect101};
use crate::image::Image;
use crate::my_types::*;

/// Dense grid sampler restricted to textured locations.
#[derive(Clone, Debug)]
pub struct DenseSampler {
    quality: f32,
    min_distance: usize,
}

impl DenseSampler {
    pub fn new(quality: f32, min_distance: usize) -> Self {
        DenseSampler {
            quality,
            min_distance,
        }
    }

    /// Candidate points in raster order, one per grid cell at most.
    ///
    /// Cells holding one of the `existing` points, and cell centers closer
    /// than `min_distance` to any of them, are skipped.
    pub fn sample(&self, grey: &Image, existing: &[Vector2f]) -> Vec<Vector2f> {
        let d = self.min_distance;
        let cols = grey.width / d;
        let rows = grey.height / d;
        if cols == 0 || rows == 0 {
            return vec![];
        }

        let eig = min_eigen_map(grey);
        let max_val = eig.iter().copied().fold(0f32, f32::max);
        let threshold = max_val * self.quality;

        let mut occupied = vec![false; cols * rows];
        let mut buckets: Vec<Vec<Vector2f>> = vec![vec![]; cols * rows];
        for p in existing {
            let x = p.x.floor();
            let y = p.y.floor();
            if x < 0. || y < 0. {
                continue;
            }
            let (cx, cy) = (x as usize / d, y as usize / d);
            if cx < cols && cy < rows {
                occupied[cy * cols + cx] = true;
            }
            buckets[cy.min(rows - 1) * cols + cx.min(cols - 1)].push(*p);
        }

        let too_close = |cx: usize, cy: usize, candidate: &Vector2f| -> bool {
            let min_dist2 = (d * d) as f32;
            for ny in cy.saturating_sub(1)..=usize::min(cy + 1, rows - 1) {
                for nx in cx.saturating_sub(1)..=usize::min(cx + 1, cols - 1) {
                    let hit = buckets[ny * cols + nx]
                        .iter()
                        .any(|p| (p - candidate).norm_squared() < min_dist2);
                    if hit {
                        return true;
                    }
                }
            }
            false
        };

        let offset = d / 2;
        let mut points = vec![];
        for cy in 0..rows {
            for cx in 0..cols {
                if occupied[cy * cols + cx] {
                    continue;
                }
                let x = cx * d + offset;
                let y = cy * d + offset;
                if eig[(y, x)] <= threshold {
                    continue;
                }
                let candidate = Vector2f::new(x as f32, y as f32);
                if too_close(cx, cy, &candidate) {
                    continue;
                }
                points.push(candidate);
            }
        }
        points
    }
}

/// Minimum eigenvalue of the 3x3 Sobel structure tensor summed over a 3x3
/// block, the corner strength used to pick textured grid cells.
pub fn min_eigen_map(grey: &Image) -> nd::Array2<f32> {
    let (w, h) = (grey.width, grey.height);
    let v = |x: isize, y: isize| -> f32 { grey.value(reflect101(x, w), reflect101(y, h)) as f32 };

    let mut tensor = Field::zeros((h, w, 3));
    for y in 0..h as isize {
        for x in 0..w as isize {
            let dx = v(x + 1, y - 1) + 2. * v(x + 1, y) + v(x + 1, y + 1)
                - v(x - 1, y - 1)
                - 2. * v(x - 1, y)
                - v(x - 1, y + 1);
            let dy = v(x - 1, y + 1) + 2. * v(x, y + 1) + v(x + 1, y + 1)
                - v(x - 1, y - 1)
                - 2. * v(x, y - 1)
                - v(x + 1, y - 1);
            let (yy, xx) = (y as usize, x as usize);
            tensor[(yy, xx, 0)] = dx * dx;
            tensor[(yy, xx, 1)] = dx * dy;
            tensor[(yy, xx, 2)] = dy * dy;
        }
    }

    let tensor = box_sum(&tensor, 3);
    nd::Array2::from_shape_fn((h, w), |(y, x)| {
        let a = tensor[(y, x, 0)] * 0.5;
        let b = tensor[(y, x, 1)];
        let c = tensor[(y, x, 2)] * 0.5;
        (a + c) - ((a - c) * (a - c) + b * b).sqrt()
    })
}
