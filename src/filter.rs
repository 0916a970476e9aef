//! Low-level float image operations shared by the pyramid, flow and
//! descriptor stages. All buffers are `(rows, cols, channels)`.

use ndarray as nd;

use crate::my_types::*;

/// Reflect an out of range index back into `0..len` without repeating the
/// edge sample (`gfedcb|abcdefgh|gfedcba`).
#[inline]
pub fn reflect101(i: isize, len: usize) -> usize {
    let len = len as isize;
    if len == 1 {
        return 0;
    }
    let mut i = i;
    while i < 0 || i >= len {
        if i < 0 {
            i = -i;
        }
        if i >= len {
            i = 2 * (len - 1) - i;
        }
    }
    i as usize
}

#[inline]
fn clamp_index(i: isize, len: usize) -> usize {
    i.clamp(0, len as isize - 1) as usize
}

/// Bilinear resize with pixel-center alignment and clamped borders.
pub fn resize_linear(src: &Field, width: usize, height: usize) -> Field {
    let (src_h, src_w, channels) = src.dim();
    if src_w == width && src_h == height {
        return src.clone();
    }
    let sx = src_w as f32 / width as f32;
    let sy = src_h as f32 / height as f32;

    let taps = |dst: usize, scale: f32, len: usize| -> (usize, usize, f32) {
        let f = ((dst as f32 + 0.5) * scale - 0.5).max(0.);
        let i0 = f.floor() as isize;
        let t = f - i0 as f32;
        (clamp_index(i0, len), clamp_index(i0 + 1, len), t)
    };
    let xs: Vec<_> = (0..width).map(|x| taps(x, sx, src_w)).collect();

    let mut dst = Field::zeros((height, width, channels));
    for y in 0..height {
        let (y0, y1, ty) = taps(y, sy, src_h);
        for (x, &(x0, x1, tx)) in xs.iter().enumerate() {
            for c in 0..channels {
                let top = src[(y0, x0, c)] * (1. - tx) + src[(y0, x1, c)] * tx;
                let bottom = src[(y1, x0, c)] * (1. - tx) + src[(y1, x1, c)] * tx;
                dst[(y, x, c)] = top * (1. - ty) + bottom * ty;
            }
        }
    }
    dst
}

/// Normalized 1-D Gaussian. A non-positive sigma is derived from the size.
pub fn gaussian_kernel(ksize: usize, sigma: f32) -> Vec<f32> {
    let sigma = if sigma > f32::EPSILON {
        sigma
    } else {
        0.3 * ((ksize as f32 - 1.) * 0.5 - 1.) + 0.8
    };
    let r = (ksize / 2) as isize;
    let mut kernel: Vec<f32> = (-r..=r)
        .map(|i| (-((i * i) as f32) / (2. * sigma * sigma)).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= sum);
    kernel
}

/// Separable convolution with an odd symmetric kernel, reflect-101 borders.
pub fn convolve_separable(src: &Field, kernel: &[f32]) -> Field {
    let (h, w, channels) = src.dim();
    let r = (kernel.len() / 2) as isize;

    let mut tmp = Field::zeros((h, w, channels));
    for y in 0..h {
        for x in 0..w {
            for c in 0..channels {
                let mut acc = 0.;
                for (k, weight) in kernel.iter().enumerate() {
                    let xx = reflect101(x as isize + k as isize - r, w);
                    acc += weight * src[(y, xx, c)];
                }
                tmp[(y, x, c)] = acc;
            }
        }
    }

    let mut dst = Field::zeros((h, w, channels));
    for y in 0..h {
        for x in 0..w {
            for c in 0..channels {
                let mut acc = 0.;
                for (k, weight) in kernel.iter().enumerate() {
                    let yy = reflect101(y as isize + k as isize - r, h);
                    acc += weight * tmp[(yy, x, c)];
                }
                dst[(y, x, c)] = acc;
            }
        }
    }
    dst
}

pub fn gaussian_blur(src: &Field, ksize: usize, sigma: f32) -> Field {
    convolve_separable(src, &gaussian_kernel(ksize, sigma))
}

/// Central differences `[-1, 0, 1]` of one channel along x and y.
pub fn central_diff(src: &Field, channel: usize) -> (nd::Array2<f32>, nd::Array2<f32>) {
    let (h, w, _) = src.dim();
    let mut dx = nd::Array2::zeros((h, w));
    let mut dy = nd::Array2::zeros((h, w));
    for y in 0..h {
        let up = reflect101(y as isize - 1, h);
        let down = reflect101(y as isize + 1, h);
        for x in 0..w {
            let left = reflect101(x as isize - 1, w);
            let right = reflect101(x as isize + 1, w);
            dx[(y, x)] = src[(y, right, channel)] - src[(y, left, channel)];
            dy[(y, x)] = src[(down, x, channel)] - src[(up, x, channel)];
        }
    }
    (dx, dy)
}

/// Sum over a `size` x `size` box centered on every pixel, edges replicated.
pub fn box_sum(src: &Field, size: usize) -> Field {
    let (h, w, channels) = src.dim();
    let lo = (size / 2) as isize;
    let hi = size as isize - 1 - lo;

    let mut tmp = Field::zeros((h, w, channels));
    for y in 0..h {
        for x in 0..w {
            for c in 0..channels {
                tmp[(y, x, c)] = (-lo..=hi)
                    .map(|d| src[(y, clamp_index(x as isize + d, w), c)])
                    .sum();
            }
        }
    }
    let mut dst = Field::zeros((h, w, channels));
    for y in 0..h {
        for x in 0..w {
            for c in 0..channels {
                dst[(y, x, c)] = (-lo..=hi)
                    .map(|d| tmp[(clamp_index(y as isize + d, h), x, c)])
                    .sum();
            }
        }
    }
    dst
}
