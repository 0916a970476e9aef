//! Integral orientation histograms (HOG, HOF, MBH) and the per-point
//! descriptor queries answered from them.
//!
//! Every descriptor type goes through the same machinery; the only thing
//! that differs is the pair of x/y component fields whose orientation and
//! magnitude vote into the bins, see [`DescriptorKind::components`].

use ndarray as nd;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::filter::central_diff;
use crate::image::Image;
use crate::my_types::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// Opposite directions share a bin (0..180 degrees)
    Unsigned,
    /// Full circle (0..360 degrees)
    Signed,
}

impl Orientation {
    fn max_angle(self) -> f32 {
        match self {
            Orientation::Unsigned => 180.,
            Orientation::Signed => 360.,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    /// Gradient orientation of the appearance
    Hog,
    /// Flow orientation
    Hof,
    /// Orientation of the flow x-component's gradient
    MbhX,
    /// Orientation of the flow y-component's gradient
    MbhY,
}

impl DescriptorKind {
    pub const ALL: [DescriptorKind; 4] = [
        DescriptorKind::Hog,
        DescriptorKind::Hof,
        DescriptorKind::MbhX,
        DescriptorKind::MbhY,
    ];

    pub fn index(self) -> usize {
        match self {
            DescriptorKind::Hog => 0,
            DescriptorKind::Hof => 1,
            DescriptorKind::MbhX => 2,
            DescriptorKind::MbhY => 3,
        }
    }

    /// The x/y vector field that votes into this descriptor's histogram.
    pub fn components(self, grey: &Field, flow: &Field) -> (nd::Array2<f32>, nd::Array2<f32>) {
        match self {
            DescriptorKind::Hog => central_diff(grey, 0),
            DescriptorKind::Hof => (
                flow.index_axis(nd::Axis(2), 0).to_owned(),
                flow.index_axis(nd::Axis(2), 1).to_owned(),
            ),
            DescriptorKind::MbhX => central_diff(flow, 0),
            DescriptorKind::MbhY => central_diff(flow, 1),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DescriptorConfig {
    /// Total bins, including the zero bin when present
    pub bins: usize,
    pub orientation: Orientation,
    /// Reserve the last bin for near-zero magnitudes
    pub zero_bin: bool,
    pub patch_size: usize,
    pub nx_cells: usize,
    pub ny_cells: usize,
    pub nt_cells: usize,
}

impl DescriptorConfig {
    /// Length of one spatial sample
    pub fn dim(&self) -> usize {
        self.bins * self.nx_cells * self.ny_cells
    }

    /// Length of a whole trajectory descriptor
    pub fn total_dim(&self) -> usize {
        self.dim() * self.nt_cells
    }

    fn orientation_bins(&self) -> usize {
        if self.zero_bin {
            self.bins - 1
        } else {
            self.bins
        }
    }
}

/// Everything needed to build and query the four histograms of one scale.
#[derive(Clone, Debug, PartialEq)]
pub struct DescriptorParams {
    pub configs: [DescriptorConfig; 4],
    pub epsilon: f32,
    pub min_flow: f32,
}

impl DescriptorParams {
    pub fn from_config(config: &Config) -> Self {
        DescriptorParams {
            configs: DescriptorKind::ALL.map(|kind| config.descriptor_config(kind)),
            epsilon: config.epsilon,
            min_flow: config.min_flow,
        }
    }

    pub fn get(&self, kind: DescriptorKind) -> &DescriptorConfig {
        &self.configs[kind.index()]
    }
}

/// Axis-aligned pixel rectangle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RectInfo {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl RectInfo {
    /// Patch centered on `point`, shifted to stay inside a `width` x `height`
    /// image. The image must be at least `patch_size` on both sides.
    pub fn around(point: &Vector2f, width: usize, height: usize, patch_size: usize) -> RectInfo {
        let half = (patch_size / 2) as i64;
        let x_max = (width - patch_size) as i64;
        let y_max = (height - patch_size) as i64;
        let x = (point.x.round() as i64 - half).clamp(0, x_max);
        let y = (point.y.round() as i64 - half).clamp(0, y_max);
        RectInfo {
            x: x as usize,
            y: y as usize,
            width: patch_size,
            height: patch_size,
        }
    }
}

/// Raw per-pixel votes, `(rows, cols, bins)`.
///
/// Each vector's magnitude is split between the two orientation bins
/// adjacent to its angle. With a zero bin, vectors no longer than
/// `min_flow` cast a unit vote there instead.
pub fn vote(
    x_comp: &nd::Array2<f32>,
    y_comp: &nd::Array2<f32>,
    config: &DescriptorConfig,
    min_flow: f32,
) -> nd::Array3<f32> {
    let (height, width) = x_comp.dim();
    let n_bins = config.orientation_bins();
    let max_angle = config.orientation.max_angle();
    let angle_base = n_bins as f32 / max_angle;

    let mut raw = nd::Array3::zeros((height, width, config.bins));
    for y in 0..height {
        for x in 0..width {
            let (vx, vy) = (x_comp[(y, x)], y_comp[(y, x)]);
            let magnitude = (vx * vx + vy * vy).sqrt();
            if config.zero_bin && magnitude <= min_flow {
                raw[(y, x, n_bins)] += 1.;
                continue;
            }

            let mut angle = vy.atan2(vx).to_degrees();
            if angle < 0. {
                angle += 360.;
            }
            while angle >= max_angle {
                angle -= max_angle;
            }
            let fbin = angle * angle_base;
            let bin0 = usize::min(fbin.floor() as usize, n_bins - 1);
            let bin1 = (bin0 + 1) % n_bins;
            let share = (fbin - bin0 as f32).clamp(0., 1.) * magnitude;
            raw[(y, x, bin0)] += magnitude - share;
            raw[(y, x, bin1)] += share;
        }
    }
    raw
}

/// Summed-area table over every bin: `sums[(y, x, b)]` is the total of bin
/// `b` over pixels `[0, y) x [0, x)`.
#[derive(Clone, Debug)]
pub struct IntegralHistogram {
    sums: nd::Array3<f32>,
}

impl IntegralHistogram {
    /// Prefix sums along each row, then down the columns.
    pub fn from_raw(raw: &nd::Array3<f32>) -> Self {
        let (height, width, bins) = raw.dim();
        let mut sums = nd::Array3::zeros((height + 1, width + 1, bins));
        let mut row_sum = vec![0f32; bins];
        for y in 0..height {
            row_sum.iter_mut().for_each(|s| *s = 0.);
            for x in 0..width {
                for b in 0..bins {
                    row_sum[b] += raw[(y, x, b)];
                    sums[(y + 1, x + 1, b)] = sums[(y, x + 1, b)] + row_sum[b];
                }
            }
        }
        IntegralHistogram { sums }
    }

    pub fn build(
        x_comp: &nd::Array2<f32>,
        y_comp: &nd::Array2<f32>,
        config: &DescriptorConfig,
        min_flow: f32,
    ) -> Self {
        Self::from_raw(&vote(x_comp, y_comp, config, min_flow))
    }

    pub fn width(&self) -> usize {
        self.sums.dim().1 - 1
    }

    pub fn height(&self) -> usize {
        self.sums.dim().0 - 1
    }

    pub fn bins(&self) -> usize {
        self.sums.dim().2
    }

    /// Total of `bin` inside `rect`, from four corner lookups.
    #[inline]
    pub fn region_sum(&self, rect: &RectInfo, bin: usize) -> f32 {
        let (x0, y0) = (rect.x, rect.y);
        let (x1, y1) = (rect.x + rect.width, rect.y + rect.height);
        debug_assert!(x1 <= self.width() && y1 <= self.height());
        self.sums[(y1, x1, bin)] + self.sums[(y0, x0, bin)]
            - self.sums[(y1, x0, bin)]
            - self.sums[(y0, x1, bin)]
    }

    /// Histogram of every cell of `rect`, cells x-major then y, bins
    /// innermost. Each value is floored at zero and offset by `epsilon`;
    /// the whole vector is then L2-normalized.
    pub fn describe(&self, rect: &RectInfo, config: &DescriptorConfig, epsilon: f32) -> Vec<f32> {
        let x_stride = rect.width / config.nx_cells;
        let y_stride = rect.height / config.ny_cells;

        let mut desc = Vec::with_capacity(config.dim());
        for cx in 0..config.nx_cells {
            for cy in 0..config.ny_cells {
                let cell = RectInfo {
                    x: rect.x + cx * x_stride,
                    y: rect.y + cy * y_stride,
                    width: x_stride,
                    height: y_stride,
                };
                for bin in 0..config.bins {
                    desc.push(self.region_sum(&cell, bin).max(0.) + epsilon);
                }
            }
        }

        let norm = desc.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0. {
            desc.iter_mut().for_each(|v| *v /= norm);
        }
        desc
    }
}

/// The four integral histograms of one scale for one frame pair.
#[derive(Clone, Debug)]
pub struct DescriptorSet {
    histograms: [IntegralHistogram; 4],
}

impl DescriptorSet {
    /// `grey` is the earlier frame of the pair, `flow` the field from it to
    /// the later one, both at the same scale.
    pub fn compute(grey: &Image, flow: &Field, params: &DescriptorParams) -> Self {
        let grey = grey.to_field();
        let histograms = DescriptorKind::ALL.map(|kind| {
            let (x_comp, y_comp) = kind.components(&grey, flow);
            IntegralHistogram::build(&x_comp, &y_comp, params.get(kind), params.min_flow)
        });
        DescriptorSet { histograms }
    }

    pub fn get(&self, kind: DescriptorKind) -> &IntegralHistogram {
        &self.histograms[kind.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn config(bins: usize, orientation: Orientation, zero_bin: bool) -> DescriptorConfig {
        DescriptorConfig {
            bins,
            orientation,
            zero_bin,
            patch_size: 8,
            nx_cells: 2,
            ny_cells: 2,
            nt_cells: 1,
        }
    }

    fn single(vx: f32, vy: f32, config: &DescriptorConfig) -> Vec<f32> {
        let raw = vote(
            &nd::arr2(&[[vx]]),
            &nd::arr2(&[[vy]]),
            config,
            0.4,
        );
        raw.iter().copied().collect()
    }

    #[test]
    fn test_region_sum_matches_naive() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        let (h, w, bins) = (13, 17, 5);
        let raw = nd::Array3::from_shape_fn((h, w, bins), |_| rng.gen_range(0f32..4.));
        let hist = IntegralHistogram::from_raw(&raw);
        assert_eq!((hist.width(), hist.height(), hist.bins()), (w, h, bins));

        for _ in 0..200 {
            let x = rng.gen_range(0..w);
            let y = rng.gen_range(0..h);
            let rect = RectInfo {
                x,
                y,
                width: rng.gen_range(0..=w - x),
                height: rng.gen_range(0..=h - y),
            };
            for bin in 0..bins {
                let mut naive = 0.;
                for yy in rect.y..rect.y + rect.height {
                    for xx in rect.x..rect.x + rect.width {
                        naive += raw[(yy, xx, bin)];
                    }
                }
                assert_abs_diff_eq!(hist.region_sum(&rect, bin), naive, epsilon = 1e-2);
            }
        }
    }

    #[test]
    fn test_integral_monotone() {
        let raw = nd::Array3::from_elem((6, 5, 2), 1f32);
        let hist = IntegralHistogram::from_raw(&raw);
        for b in 0..2 {
            for y in 0..6 {
                for x in 0..5 {
                    assert!(hist.sums[(y + 1, x, b)] >= hist.sums[(y, x, b)]);
                    assert!(hist.sums[(y, x + 1, b)] >= hist.sums[(y, x, b)]);
                }
            }
            assert_eq!(hist.sums[(6, 5, b)], 30.);
            assert_eq!(hist.sums[(0, 3, b)], 0.);
        }
    }

    #[test]
    fn test_vote_signed() {
        let c = config(8, Orientation::Signed, false);
        assert_eq!(single(2., 0., &c), vec![2., 0., 0., 0., 0., 0., 0., 0.]);
        // halfway between bin 0 (0 deg) and bin 1 (45 deg)
        let angle = 22.5f32.to_radians();
        let v = single(angle.cos(), angle.sin(), &c);
        assert_abs_diff_eq!(v[0], 0.5, epsilon = 1e-5);
        assert_abs_diff_eq!(v[1], 0.5, epsilon = 1e-5);
        // pointing down-left wraps from the last bin into the first
        let angle = 337.5f32.to_radians();
        let v = single(angle.cos(), angle.sin(), &c);
        assert_abs_diff_eq!(v[7], 0.5, epsilon = 1e-4);
        assert_abs_diff_eq!(v[0], 0.5, epsilon = 1e-4);
    }

    #[test]
    fn test_vote_unsigned() {
        let c = config(8, Orientation::Unsigned, false);
        for (a, b) in single(1., 0., &c).iter().zip(single(-1., 0., &c)) {
            assert_abs_diff_eq!(*a, b, epsilon = 1e-4);
        }
        let v = single(0., -3., &c);
        // 270 deg folds to 90 deg, bin 4 of 22.5 deg bins
        assert_abs_diff_eq!(v[4], 3., epsilon = 1e-4);
    }

    #[test]
    fn test_vote_zero_bin() {
        let c = config(9, Orientation::Signed, true);
        let v = single(0.1, 0.2, &c);
        assert_eq!(v[8], 1.);
        assert_eq!(v[..8].iter().sum::<f32>(), 0.);
        let v = single(0., 1., &c);
        assert_eq!(v[8], 0.);
        assert_abs_diff_eq!(v[2], 1., epsilon = 1e-5);
    }

    #[test]
    fn test_rect_clamp() {
        let rect = RectInfo::around(&Vector2f::new(20.4, 30.6), 64, 48, 16);
        assert_eq!(rect, RectInfo { x: 12, y: 23, width: 16, height: 16 });
        let rect = RectInfo::around(&Vector2f::new(1., 1.), 64, 48, 16);
        assert_eq!((rect.x, rect.y), (0, 0));
        let rect = RectInfo::around(&Vector2f::new(63.5, 47.9), 64, 48, 16);
        assert_eq!((rect.x, rect.y), (48, 32));
        assert!(rect.x + rect.width <= 64 && rect.y + rect.height <= 48);
    }

    #[test]
    fn test_describe_uniform_flow() {
        let c = config(9, Orientation::Signed, true);
        let flow = Field::from_shape_fn((20, 20, 2), |(_, _, ch)| if ch == 0 { 1. } else { 0. });
        let (x_comp, y_comp) = DescriptorKind::Hof.components(&Field::zeros((20, 20, 1)), &flow);
        let hist = IntegralHistogram::build(&x_comp, &y_comp, &c, 0.4);
        let rect = RectInfo::around(&Vector2f::new(10., 10.), 20, 20, 8);
        let desc = hist.describe(&rect, &c, 0.05);

        assert_eq!(desc.len(), c.dim());
        let norm: f32 = desc.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert_abs_diff_eq!(norm, 1., epsilon = 1e-5);
        // every 4x4 cell holds 16 votes in bin 0
        let raw_cell = {
            let mut v = vec![0.05f32; 9];
            v[0] += 16.;
            v
        };
        let raw_norm = (raw_cell.iter().map(|v| v * v).sum::<f32>() * 4.).sqrt();
        for cell in 0..4 {
            for bin in 0..9 {
                assert_abs_diff_eq!(desc[cell * 9 + bin], raw_cell[bin] / raw_norm, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn test_describe_cell_order() {
        // votes only in the right half: x-major cell order puts them last
        let c = config(1, Orientation::Signed, false);
        let mut raw = nd::Array3::zeros((8, 8, 1));
        for y in 0..8 {
            for x in 4..8 {
                raw[(y, x, 0)] = 1.;
            }
        }
        let hist = IntegralHistogram::from_raw(&raw);
        let rect = RectInfo { x: 0, y: 0, width: 8, height: 8 };
        let desc = hist.describe(&rect, &c, 0.);
        assert_eq!(desc[0], 0.);
        assert_eq!(desc[1], 0.);
        assert_abs_diff_eq!(desc[2], std::f32::consts::FRAC_1_SQRT_2, epsilon = 1e-6);
        assert_abs_diff_eq!(desc[3], std::f32::consts::FRAC_1_SQRT_2, epsilon = 1e-6);
    }

    #[test]
    fn test_descriptor_set() {
        let params = DescriptorParams::from_config(&Config {
            patch_size: 8,
            ..Config::default()
        });
        let mut grey = Image::new(24, 16, 0);
        for y in 0..16 {
            for x in 0..24 {
                grey.set_value(x, y, (x * 10) as u8);
            }
        }
        let flow = Field::zeros((16, 24, 2));
        let set = DescriptorSet::compute(&grey, &flow, &params);
        for kind in DescriptorKind::ALL {
            let hist = set.get(kind);
            assert_eq!((hist.width(), hist.height()), (24, 16));
            assert_eq!(hist.bins(), params.get(kind).bins);
        }
        let everything = RectInfo { x: 0, y: 0, width: 24, height: 16 };
        // zero flow: every HOF vote is a zero-bin vote, MBH sees no gradient
        assert_eq!(set.get(DescriptorKind::Hof).region_sum(&everything, 8), 384.);
        assert_eq!(set.get(DescriptorKind::MbhX).region_sum(&everything, 0), 0.);
        // horizontal intensity ramp: HOG mass sits in bin 0
        assert!(set.get(DescriptorKind::Hog).region_sum(&everything, 0) > 0.);
        assert_eq!(set.get(DescriptorKind::Hog).region_sum(&everything, 3), 0.);
    }
}
