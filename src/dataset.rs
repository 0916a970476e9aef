use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context as AnyhowContext, Result};
use log::{debug, info};

use crate::image::ColorImage;

/// Extensions picked up when listing a directory
const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// An ordered stream of RGB frames.
pub trait FrameSource {
    /// `None` once the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<ColorImage>>;

    /// Number of frames, when known up front
    fn len(&self) -> Option<u64>;
}

/// Frames decoded one by one from a list of image files.
pub struct ImageSequence {
    paths: Vec<PathBuf>,
    next: usize,
}

impl ImageSequence {
    pub fn from_paths(paths: Vec<PathBuf>) -> Self {
        ImageSequence { paths, next: 0 }
    }

    /// Every image file directly inside `dir`, sorted by file name.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|| format!("Failed to list {}", dir.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && is_image(p))
            .collect();
        if paths.is_empty() {
            bail!("No image files in {}", dir.display());
        }
        paths.sort();
        info!("{} frames in {}", paths.len(), dir.display());
        Ok(ImageSequence::from_paths(paths))
    }

    /// A directory is listed, anything else is taken as a list of frames.
    pub fn new(inputs: &[PathBuf]) -> Result<Self> {
        match inputs {
            [] => bail!("No input frames given"),
            [dir] if dir.is_dir() => ImageSequence::from_dir(dir),
            _ => Ok(ImageSequence::from_paths(inputs.to_vec())),
        }
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl FrameSource for ImageSequence {
    fn next_frame(&mut self) -> Result<Option<ColorImage>> {
        let Some(path) = self.paths.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;
        debug!("decoding {}", path.display());

        let rgb = image::open(path)
            .with_context(|| format!("Failed to decode {}", path.display()))?
            .to_rgb8();
        let (width, height) = rgb.dimensions();
        Ok(Some(ColorImage {
            data: rgb.into_raw(),
            width: width as usize,
            height: height as usize,
        }))
    }

    fn len(&self) -> Option<u64> {
        Some(self.paths.len() as u64)
    }
}
