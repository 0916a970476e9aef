use log::debug;
use ndarray as nd;
use rayon::prelude::*;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::filter::{box_sum, gaussian_blur, resize_linear};
use crate::image::Image;
use crate::my_types::*;
use crate::pyramid::ScaleLevel;

/// Polynomial expansion channels, in storage order
pub const POLY_CHANNELS: usize = 5;

/// Width of the attenuated frame border when building matching matrices
const BORDER: usize = 5;
const BORDER_WEIGHTS: [f32; BORDER] = [0.14, 0.14, 0.4472, 0.4472, 0.4472];

/// Local quadratic fit `r1 + r2 x + r3 y + r4 x^2 + r5 y^2 + r6 xy` of every
/// neighborhood, weighted by a separable Gaussian applicability.
///
/// The constant term is not stored; the output channels are
/// `[y, x, y^2, x^2, xy]` coefficients.
#[derive(Clone, Debug)]
pub struct PolyExpansion {
    n: usize,
    g: Vec<f32>,
    xg: Vec<f32>,
    xxg: Vec<f32>,
    ig11: f64,
    ig03: f64,
    ig33: f64,
    ig55: f64,
}

impl PolyExpansion {
    pub fn new(n: usize, sigma: f32) -> Result<Self> {
        let sigma = if sigma < f32::EPSILON {
            n as f32 * 0.3
        } else {
            sigma
        };
        let n_i = n as isize;
        let mut g: Vec<f32> = (-n_i..=n_i)
            .map(|x| (-((x * x) as f32) / (2. * sigma * sigma)).exp())
            .collect();
        let s: f32 = g.iter().sum();
        g.iter_mut().for_each(|v| *v /= s);
        let xg: Vec<f32> = (-n_i..=n_i).zip(&g).map(|(x, v)| x as f32 * v).collect();
        let xxg: Vec<f32> = (-n_i..=n_i)
            .zip(&g)
            .map(|(x, v)| (x * x) as f32 * v)
            .collect();

        // Gram matrix of the basis [1, x, y, x^2, y^2, xy] under the
        // applicability; only a handful of distinct entries are non-zero.
        let mut gram = Matrix6d::zeros();
        for y in -n_i..=n_i {
            for x in -n_i..=n_i {
                let w = g[(y + n_i) as usize] as f64 * g[(x + n_i) as usize] as f64;
                let (xf, yf) = (x as f64, y as f64);
                gram[(0, 0)] += w;
                gram[(1, 1)] += w * xf * xf;
                gram[(3, 3)] += w * xf.powi(4);
                gram[(5, 5)] += w * xf * xf * yf * yf;
            }
        }
        let g11 = gram[(1, 1)];
        for (r, c) in [(2, 2), (0, 3), (0, 4), (3, 0), (4, 0)] {
            gram[(r, c)] = g11;
        }
        gram[(4, 4)] = gram[(3, 3)];
        gram[(3, 4)] = gram[(5, 5)];
        gram[(4, 3)] = gram[(5, 5)];

        let inv = gram
            .cholesky()
            .map(|c| c.inverse())
            .ok_or_else(|| Error::InvalidConfig(format!("degenerate polynomial window n={n}")))?;

        Ok(PolyExpansion {
            n,
            g,
            xg,
            xxg,
            ig11: inv[(1, 1)],
            ig03: inv[(0, 3)],
            ig33: inv[(3, 3)],
            ig55: inv[(5, 5)],
        })
    }

    /// Expand a single channel image into a `POLY_CHANNELS` field.
    pub fn expand(&self, src: &Field) -> Field {
        let (height, width, _) = src.dim();
        let n = self.n;
        let (g, xg, xxg) = (&self.g[n..], &self.xg[n..], &self.xxg[n..]);
        let mut dst = Field::zeros((height, width, POLY_CHANNELS));

        // vertical pass results: [sum g, sum x g, sum x^2 g] per column
        let mut row = nd::Array2::<f32>::zeros((width, 3));
        for y in 0..height {
            for x in 0..width {
                row[(x, 0)] = src[(y, x, 0)] * g[0];
                row[(x, 1)] = 0.;
                row[(x, 2)] = 0.;
            }
            for k in 1..=n {
                let above = y.saturating_sub(k);
                let below = usize::min(y + k, height - 1);
                for x in 0..width {
                    let (a, b) = (src[(above, x, 0)], src[(below, x, 0)]);
                    let p = a + b;
                    row[(x, 0)] += g[k] * p;
                    row[(x, 1)] += xg[k] * (b - a);
                    row[(x, 2)] += xxg[k] * p;
                }
            }

            for x in 0..width {
                let mut b1 = row[(x, 0)] as f64 * g[0] as f64;
                let mut b2 = 0f64;
                let mut b3 = row[(x, 1)] as f64 * g[0] as f64;
                let mut b4 = 0f64;
                let mut b5 = row[(x, 2)] as f64 * g[0] as f64;
                let mut b6 = 0f64;
                for k in 1..=n {
                    let left = x.saturating_sub(k);
                    let right = usize::min(x + k, width - 1);
                    let (gk, xgk, xxgk) = (g[k] as f64, xg[k] as f64, xxg[k] as f64);
                    let tg = (row[(right, 0)] + row[(left, 0)]) as f64;
                    b1 += tg * gk;
                    b4 += tg * xxgk;
                    b2 += (row[(right, 0)] - row[(left, 0)]) as f64 * xgk;
                    b3 += (row[(right, 1)] + row[(left, 1)]) as f64 * gk;
                    b6 += (row[(right, 1)] - row[(left, 1)]) as f64 * xgk;
                    b5 += (row[(right, 2)] + row[(left, 2)]) as f64 * gk;
                }
                dst[(y, x, 0)] = (b3 * self.ig11) as f32;
                dst[(y, x, 1)] = (b2 * self.ig11) as f32;
                dst[(y, x, 2)] = (b1 * self.ig03 + b5 * self.ig33) as f32;
                dst[(y, x, 3)] = (b1 * self.ig03 + b4 * self.ig33) as f32;
                dst[(y, x, 4)] = (b6 * self.ig55) as f32;
            }
        }
        dst
    }
}

/// Dense two-frame flow by polynomial expansion matching, coarse to fine
/// over the scale pyramid.
#[derive(Clone, Debug)]
pub struct OpticalFlow {
    poly: PolyExpansion,
    window: usize,
    iterations: usize,
    ratio: f32,
}

impl OpticalFlow {
    pub fn new(config: &Config) -> Result<OpticalFlow> {
        Ok(OpticalFlow {
            poly: PolyExpansion::new(config.poly_n, config.poly_sigma)?,
            window: config.flow_window,
            iterations: config.flow_iterations,
            ratio: config.scale_ratio,
        })
    }

    /// Expansion of every level, each derived from the full resolution frame
    /// smoothed in proportion to the level's scale.
    pub fn poly_pyramid(&self, grey: &Image, levels: &[ScaleLevel]) -> Vec<Field> {
        let base = grey.to_field();
        levels
            .par_iter()
            .map(|level| {
                let sigma = (level.scale - 1.) * 0.5;
                let ksize = usize::max(((sigma * 5.).round() as usize) | 1, 3);
                let smoothed = gaussian_blur(&base, ksize, sigma);
                let resized = resize_linear(&smoothed, level.width, level.height);
                self.poly.expand(&resized)
            })
            .collect()
    }

    /// Flow from `prev` to `next` expansions, one `(dx, dy)` field per level.
    pub fn compute(&self, prev: &[Field], next: &[Field]) -> Vec<Field> {
        assert_eq!(prev.len(), next.len());
        let mut flows: Vec<Field> = Vec::with_capacity(prev.len());
        let stride = 1. / self.ratio;

        for k in (0..prev.len()).rev() {
            let (height, width, _) = prev[k].dim();
            let mut flow = match flows.last() {
                None => Field::zeros((height, width, 2)),
                Some(coarse) => resize_linear(coarse, width, height) * stride,
            };

            let mut matrices = update_matrices(&prev[k], &next[k], &flow);
            for i in 0..self.iterations {
                flow = update_flow(&matrices, self.window);
                if i + 1 < self.iterations {
                    matrices = update_matrices(&prev[k], &next[k], &flow);
                }
            }
            debug!("flow level {k}: {width}x{height}");
            flows.push(flow);
        }

        flows.reverse();
        flows
    }
}

/// Per-pixel normal equations `[g11 g12; g12 g22] d = [h1; h2]` for the
/// displacement that aligns the two expansions, given the current estimate.
fn update_matrices(r0: &Field, r1: &Field, flow: &Field) -> Field {
    let (height, width, _) = flow.dim();
    let mut m = Field::zeros((height, width, POLY_CHANNELS));

    for y in 0..height {
        for x in 0..width {
            let dx = flow[(y, x, 0)];
            let dy = flow[(y, x, 1)];
            let fx = x as f32 + dx;
            let fy = y as f32 + dy;
            let x1 = fx.floor();
            let y1 = fy.floor();
            let (tx, ty) = (fx - x1, fy - y1);

            let inside =
                x1 >= 0. && y1 >= 0. && (x1 as usize) < width - 1 && (y1 as usize) < height - 1;
            let (r2, r3, mut r4, mut r5, mut r6) = if inside {
                let (x1, y1) = (x1 as usize, y1 as usize);
                let a00 = (1. - tx) * (1. - ty);
                let a01 = tx * (1. - ty);
                let a10 = (1. - tx) * ty;
                let a11 = tx * ty;
                let sample = |c: usize| {
                    a00 * r1[(y1, x1, c)]
                        + a01 * r1[(y1, x1 + 1, c)]
                        + a10 * r1[(y1 + 1, x1, c)]
                        + a11 * r1[(y1 + 1, x1 + 1, c)]
                };
                (
                    sample(0),
                    sample(1),
                    (r0[(y, x, 2)] + sample(2)) * 0.5,
                    (r0[(y, x, 3)] + sample(3)) * 0.5,
                    (r0[(y, x, 4)] + sample(4)) * 0.25,
                )
            } else {
                (0., 0., r0[(y, x, 2)], r0[(y, x, 3)], r0[(y, x, 4)] * 0.5)
            };

            let mut r2 = (r0[(y, x, 0)] - r2) * 0.5;
            let mut r3 = (r0[(y, x, 1)] - r3) * 0.5;
            r2 += r4 * dy + r6 * dx;
            r3 += r6 * dy + r5 * dx;

            let weight = border_weight(x, width) * border_weight(y, height);
            if weight < 1. {
                r2 *= weight;
                r3 *= weight;
                r4 *= weight;
                r5 *= weight;
                r6 *= weight;
            }

            m[(y, x, 0)] = r4 * r4 + r6 * r6;
            m[(y, x, 1)] = (r4 + r5) * r6;
            m[(y, x, 2)] = r5 * r5 + r6 * r6;
            m[(y, x, 3)] = r4 * r2 + r6 * r3;
            m[(y, x, 4)] = r6 * r2 + r5 * r3;
        }
    }
    m
}

fn border_weight(i: usize, len: usize) -> f32 {
    let mut w = 1.;
    if i < BORDER {
        w *= BORDER_WEIGHTS[i];
    }
    if i + BORDER >= len {
        w *= BORDER_WEIGHTS[len - i - 1];
    }
    w
}

/// Solve the window-averaged normal equations at every pixel.
///
/// The box spans `2 * (window / 2) + 1` pixels but the sums are scaled by
/// `1 / window²`, which sets the weight of the regularizer.
fn update_flow(matrices: &Field, window: usize) -> Field {
    let (height, width, _) = matrices.dim();
    let size = 2 * (window / 2) + 1;
    let summed = box_sum(matrices, size);
    let scale = 1. / (window * window) as f64;
    let mut flow = Field::zeros((height, width, 2));
    for y in 0..height {
        for x in 0..width {
            let g11 = summed[(y, x, 0)] as f64 * scale;
            let g12 = summed[(y, x, 1)] as f64 * scale;
            let g22 = summed[(y, x, 2)] as f64 * scale;
            let h1 = summed[(y, x, 3)] as f64 * scale;
            let h2 = summed[(y, x, 4)] as f64 * scale;
            let idet = 1. / (g11 * g22 - g12 * g12 + 1e-3);
            flow[(y, x, 0)] = ((g11 * h2 - g12 * h1) * idet) as f32;
            flow[(y, x, 1)] = ((g22 * h1 - g12 * h2) * idet) as f32;
        }
    }
    flow
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pyramid::scale_levels;
    use approx::assert_abs_diff_eq;

    fn pattern(width: usize, height: usize, shift_x: f32) -> Image {
        let mut image = Image::new(width, height, 0);
        for y in 0..height {
            for x in 0..width {
                let xf = x as f32 - shift_x;
                let v = 128. + 60. * (xf / 4.).sin() * (y as f32 / 5.).cos();
                image.set_value(x, y, v.round() as u8);
            }
        }
        image
    }

    fn interior_mean(flow: &Field, margin: usize, channel: usize) -> f32 {
        let (h, w, _) = flow.dim();
        let mut sum = 0.;
        let mut count = 0.;
        for y in margin..h - margin {
            for x in margin..w - margin {
                sum += flow[(y, x, channel)];
                count += 1.;
            }
        }
        sum / count
    }

    #[test]
    fn test_expansion_coefficients() {
        let poly = PolyExpansion::new(3, 1.5).unwrap();
        let linear = Field::from_shape_fn((20, 20, 1), |(y, x, _)| 3. * x as f32 + 2. * y as f32);
        let r = poly.expand(&linear);
        assert_abs_diff_eq!(r[(10, 10, 0)], 2., epsilon = 1e-3);
        assert_abs_diff_eq!(r[(10, 10, 1)], 3., epsilon = 1e-3);
        assert_abs_diff_eq!(r[(10, 10, 3)], 0., epsilon = 1e-3);

        let quadratic = Field::from_shape_fn((20, 20, 1), |(y, x, _)| {
            let (xf, yf) = (x as f32 - 10., y as f32 - 10.);
            0.5 * xf * xf + 0.25 * yf * yf + xf * yf
        });
        let r = poly.expand(&quadratic);
        assert_abs_diff_eq!(r[(10, 10, 3)], 0.5, epsilon = 1e-3);
        assert_abs_diff_eq!(r[(10, 10, 2)], 0.25, epsilon = 1e-3);
        assert_abs_diff_eq!(r[(10, 10, 4)], 1., epsilon = 1e-3);
    }

    #[test]
    fn test_identical_frames_have_zero_flow() {
        let config = Config::default();
        let flow = OpticalFlow::new(&config).unwrap();
        let image = pattern(40, 40, 0.);
        let levels = scale_levels(40, 40, 16, 1, config.scale_ratio).unwrap();
        let polys = flow.poly_pyramid(&image, &levels);
        let flows = flow.compute(&polys, &polys);
        // the frame border is attenuated, not matched
        for y in 12..28 {
            for x in 12..28 {
                assert_eq!(flows[0][(y, x, 0)], 0.);
                assert_eq!(flows[0][(y, x, 1)], 0.);
            }
        }
    }

    #[test]
    fn test_level_shapes() {
        let config = Config::default();
        let flow = OpticalFlow::new(&config).unwrap();
        let levels = scale_levels(40, 36, 16, 3, config.scale_ratio).unwrap();
        let prev = flow.poly_pyramid(&pattern(40, 36, 0.), &levels);
        let next = flow.poly_pyramid(&pattern(40, 36, 0.5), &levels);
        let flows = flow.compute(&prev, &next);
        assert_eq!(flows.len(), levels.len());
        for ((field, poly), level) in flows.iter().zip(&prev).zip(&levels) {
            assert_eq!(field.dim(), (level.height, level.width, 2));
            assert_eq!(poly.dim(), (level.height, level.width, POLY_CHANNELS));
            assert!(field.iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn test_translation() {
        let config = Config::default();
        let flow = OpticalFlow::new(&config).unwrap();
        let levels = scale_levels(48, 48, 48, 1, config.scale_ratio).unwrap();
        let prev = flow.poly_pyramid(&pattern(48, 48, 0.), &levels);
        let next = flow.poly_pyramid(&pattern(48, 48, 1.), &levels);
        let flows = flow.compute(&prev, &next);
        assert_abs_diff_eq!(interior_mean(&flows[0], 14, 0), 1., epsilon = 0.25);
        assert_abs_diff_eq!(interior_mean(&flows[0], 14, 1), 0., epsilon = 0.25);
    }

    #[test]
    fn test_update_flow_scale() {
        let mut matrices = Field::zeros((20, 20, 5));
        for ((_, _, c), v) in matrices.indexed_iter_mut() {
            if c == 0 || c == 2 || c == 4 {
                *v = 0.01;
            }
        }
        // an 11x11 box scaled by 1/100 gives g = h = 0.0121
        let flow = update_flow(&matrices, 10);
        let g = 0.0121f64;
        let expected = (g * g / (g * g + 1e-3)) as f32;
        assert_abs_diff_eq!(flow[(10, 10, 0)], expected, epsilon = 1e-4);
        assert_abs_diff_eq!(flow[(10, 10, 1)], 0., epsilon = 1e-6);
        // edges are replicated, so the scale is the same everywhere
        assert_abs_diff_eq!(flow[(0, 0, 0)], expected, epsilon = 1e-4);
    }

    #[test]
    fn test_border_weight() {
        assert_eq!(border_weight(0, 20), 0.14);
        assert_eq!(border_weight(10, 20), 1.);
        assert_eq!(border_weight(19, 20), 0.14);
        assert_eq!(border_weight(15, 20), 0.4472);
    }
}
