use serde::{Deserialize, Serialize};

use crate::descriptor::{DescriptorConfig, DescriptorKind, Orientation};
use crate::error::{Error, Result};

pub const DEFAULT_TRACK_LENGTH: usize = 15;
pub const DEFAULT_INIT_GAP: usize = 1;
pub const DEFAULT_MIN_DISTANCE: usize = 5;
pub const DEFAULT_QUALITY: f32 = 0.001;
pub const DEFAULT_PATCH_SIZE: usize = 32;
pub const DEFAULT_NXY_CELL: usize = 2;
pub const DEFAULT_NT_CELL: usize = 3;
pub const DEFAULT_SCALE_NUM: usize = 8;
pub const DEFAULT_SCALE_RATIO: f32 = std::f32::consts::FRAC_1_SQRT_2;
pub const DEFAULT_EPSILON: f32 = 0.05;
pub const DEFAULT_MIN_FLOW: f32 = 0.4;
pub const DEFAULT_MIN_VAR: f32 = 1.732_050_8;
pub const DEFAULT_MAX_VAR: f32 = 50.;
pub const DEFAULT_MAX_DIS: f32 = 20.;

/// Engine parameters, settable from the command line or a JSON file.
#[derive(Debug, Clone, PartialEq, clap::Parser, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// number of frames a trajectory is tracked for
    #[clap(long, default_value_t = DEFAULT_TRACK_LENGTH)]
    pub track_length: usize,

    /// re-seed every this many frames
    #[clap(long, default_value_t = DEFAULT_INIT_GAP)]
    pub init_gap: usize,

    /// dense sampling grid step in pixels
    #[clap(long, default_value_t = DEFAULT_MIN_DISTANCE)]
    pub min_distance: usize,

    /// corner quality relative to the strongest response
    #[clap(long, default_value_t = DEFAULT_QUALITY)]
    pub quality: f32,

    #[clap(long, default_value_t = DEFAULT_PATCH_SIZE)]
    pub patch_size: usize,

    #[clap(long, default_value_t = DEFAULT_NXY_CELL)]
    pub nxy_cell: usize,

    #[clap(long, default_value_t = DEFAULT_NT_CELL)]
    pub nt_cell: usize,

    /// upper bound on pyramid levels
    #[clap(long, default_value_t = DEFAULT_SCALE_NUM)]
    pub scale_num: usize,

    /// size ratio between consecutive pyramid levels
    #[clap(long, default_value_t = DEFAULT_SCALE_RATIO)]
    pub scale_ratio: f32,

    #[clap(long, default_value_t = DEFAULT_EPSILON)]
    pub epsilon: f32,

    /// flow magnitude at or below which HOF votes into the zero bin
    #[clap(long, default_value_t = DEFAULT_MIN_FLOW)]
    pub min_flow: f32,

    #[clap(long, default_value_t = DEFAULT_MIN_VAR)]
    pub min_var: f32,

    #[clap(long, default_value_t = DEFAULT_MAX_VAR)]
    pub max_var: f32,

    #[clap(long, default_value_t = DEFAULT_MAX_DIS)]
    pub max_dis: f32,

    #[clap(long, default_value_t = 7)]
    pub poly_n: usize,

    #[clap(long, default_value_t = 1.5)]
    pub poly_sigma: f32,

    #[clap(long, default_value_t = 10)]
    pub flow_window: usize,

    #[clap(long, default_value_t = 2)]
    pub flow_iterations: usize,

    #[clap(long, default_value_t = 8)]
    pub hog_bins: usize,

    #[clap(long, default_value_t = 9)]
    pub hof_bins: usize,

    #[clap(long, default_value_t = 8)]
    pub mbh_bins: usize,

    #[clap(long, value_enum, default_value_t = Orientation::Unsigned)]
    pub hog_orientation: Orientation,

    #[clap(long, value_enum, default_value_t = Orientation::Signed)]
    pub hof_orientation: Orientation,

    #[clap(long, value_enum, default_value_t = Orientation::Signed)]
    pub mbh_orientation: Orientation,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            track_length: DEFAULT_TRACK_LENGTH,
            init_gap: DEFAULT_INIT_GAP,
            min_distance: DEFAULT_MIN_DISTANCE,
            quality: DEFAULT_QUALITY,
            patch_size: DEFAULT_PATCH_SIZE,
            nxy_cell: DEFAULT_NXY_CELL,
            nt_cell: DEFAULT_NT_CELL,
            scale_num: DEFAULT_SCALE_NUM,
            scale_ratio: DEFAULT_SCALE_RATIO,
            epsilon: DEFAULT_EPSILON,
            min_flow: DEFAULT_MIN_FLOW,
            min_var: DEFAULT_MIN_VAR,
            max_var: DEFAULT_MAX_VAR,
            max_dis: DEFAULT_MAX_DIS,
            poly_n: 7,
            poly_sigma: 1.5,
            flow_window: 10,
            flow_iterations: 2,
            hog_bins: 8,
            hof_bins: 9,
            mbh_bins: 8,
            hog_orientation: Orientation::Unsigned,
            hof_orientation: Orientation::Signed,
            mbh_orientation: Orientation::Signed,
        }
    }
}

/// Trajectory length and re-seeding cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackInfo {
    pub length: usize,
    pub gap: usize,
}

impl Config {
    /// Reject degenerate parameters before any frame is processed.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(Error::InvalidConfig(msg.to_string()));

        if self.track_length == 0 {
            return invalid("track_length must be positive");
        }
        if self.init_gap == 0 {
            return invalid("init_gap must be positive");
        }
        if self.min_distance == 0 {
            return invalid("min_distance must be positive");
        }
        if !(self.quality > 0. && self.quality <= 1.) {
            return invalid("quality must lie in (0, 1]");
        }
        if self.patch_size == 0 {
            return invalid("patch_size must be positive");
        }
        if self.nxy_cell == 0 || self.nt_cell == 0 {
            return invalid("cell counts must be positive");
        }
        if self.nxy_cell > self.patch_size {
            return invalid("nxy_cell cannot exceed patch_size");
        }
        if self.nt_cell > self.track_length {
            return invalid("nt_cell cannot exceed track_length");
        }
        if self.scale_num == 0 {
            return invalid("scale_num must be positive");
        }
        if !(self.scale_ratio > 0. && self.scale_ratio < 1.) {
            return invalid("scale_ratio must lie in (0, 1)");
        }
        if self.hog_bins == 0 || self.mbh_bins == 0 {
            return invalid("bin counts must be positive");
        }
        // one bin is reserved for near-zero flow
        if self.hof_bins < 2 {
            return invalid("hof_bins must be at least 2");
        }
        if self.epsilon < 0. || self.min_flow < 0. {
            return invalid("epsilon and min_flow cannot be negative");
        }
        if !(self.min_var >= 0. && self.max_var > 0. && self.max_dis > 0.) {
            return invalid("trajectory thresholds must be positive");
        }
        if self.min_var > self.max_var {
            return invalid("min_var cannot exceed max_var");
        }
        if self.poly_n == 0 || !(self.poly_sigma > 0.) {
            return invalid("polynomial expansion needs a positive window and sigma");
        }
        if self.flow_window == 0 || self.flow_iterations == 0 {
            return invalid("flow_window and flow_iterations must be positive");
        }
        Ok(())
    }

    pub fn track_info(&self) -> TrackInfo {
        TrackInfo {
            length: self.track_length,
            gap: self.init_gap,
        }
    }

    pub fn descriptor_config(&self, kind: DescriptorKind) -> DescriptorConfig {
        let (bins, orientation, zero_bin) = match kind {
            DescriptorKind::Hog => (self.hog_bins, self.hog_orientation, false),
            DescriptorKind::Hof => (self.hof_bins, self.hof_orientation, true),
            DescriptorKind::MbhX | DescriptorKind::MbhY => {
                (self.mbh_bins, self.mbh_orientation, false)
            }
        };
        DescriptorConfig {
            bins,
            orientation,
            zero_bin,
            patch_size: self.patch_size,
            nx_cells: self.nxy_cell,
            ny_cells: self.nxy_cell,
            nt_cells: self.nt_cell,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::vote;
    use approx::assert_abs_diff_eq;
    use clap::Parser;
    use ndarray as nd;

    #[test]
    fn test_default_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_cli_defaults_match_default() {
        let config = Config::parse_from(["dense-track"]);
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_cli_override() {
        let config = Config::parse_from(["dense-track", "--track-length", "4", "--patch-size", "8"]);
        assert_eq!(config.track_length, 4);
        assert_eq!(config.patch_size, 8);
        assert_eq!(config.nt_cell, DEFAULT_NT_CELL);
    }

    #[test]
    fn test_json_partial() {
        let config: Config = serde_json::from_str(r#"{"track_length": 6, "min_var": 0.5}"#).unwrap();
        assert_eq!(config.track_length, 6);
        assert_eq!(config.min_var, 0.5);
        assert_eq!(config.hof_bins, 9);
    }

    #[test]
    fn test_rejects_degenerate() {
        let cases: Vec<Box<dyn Fn(&mut Config)>> = vec![
            Box::new(|c| c.hog_bins = 0),
            Box::new(|c| c.hof_bins = 1),
            Box::new(|c| c.track_length = 0),
            Box::new(|c| c.nt_cell = 20),
            Box::new(|c| c.scale_ratio = 1.),
            Box::new(|c| c.quality = 0.),
            Box::new(|c| c.flow_iterations = 0),
            Box::new(|c| c.min_var = 60.),
        ];
        for mutate in cases {
            let mut config = Config::default();
            mutate(&mut config);
            assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_descriptor_conventions() {
        let config = Config::default();
        let hog = config.descriptor_config(DescriptorKind::Hog);
        assert_eq!(hog.orientation, Orientation::Unsigned);
        assert!(!hog.zero_bin);
        let hof = config.descriptor_config(DescriptorKind::Hof);
        assert_eq!(hof.orientation, Orientation::Signed);
        assert!(hof.zero_bin);
        assert_eq!(hof.dim(), 9 * 2 * 2);
        let mbh = config.descriptor_config(DescriptorKind::MbhY);
        assert_eq!(mbh.bins, 8);
        assert_eq!(mbh.orientation, Orientation::Signed);
    }

    #[test]
    fn test_orientation_flag() {
        let config = Config::parse_from(["dense-track", "--hog-orientation", "signed"]);
        assert_eq!(config.hog_orientation, Orientation::Signed);
        let json: Config = serde_json::from_str(r#"{"mbh_orientation": "unsigned"}"#).unwrap();
        assert_eq!(json.mbh_orientation, Orientation::Unsigned);
        assert_eq!(json.hog_orientation, Orientation::Unsigned);

        // a gradient pointing left folds onto pointing right only when unsigned
        let x_comp = nd::Array2::from_elem((1, 1), -1f32);
        let y_comp = nd::Array2::zeros((1, 1));
        let unsigned = Config::default().descriptor_config(DescriptorKind::Hog);
        let signed = config.descriptor_config(DescriptorKind::Hog);
        assert_eq!(signed.orientation, Orientation::Signed);
        let folded = vote(&x_comp, &y_comp, &unsigned, 0.);
        let full = vote(&x_comp, &y_comp, &signed, 0.);
        assert_abs_diff_eq!(folded[(0, 0, 0)], 1., epsilon = 1e-4);
        assert_abs_diff_eq!(full[(0, 0, 0)], 0., epsilon = 1e-4);
        assert_abs_diff_eq!(full[(0, 0, 4)], 1., epsilon = 1e-4);
    }
}
