use std::path::Path;

use anyhow::{bail, Context as AnyhowContext, Result};
use cv2::prelude::*;
use log::info;
use opencv as cv2;

use crate::dataset::FrameSource;
use crate::image::ColorImage;

/// Frames decoded from a video file.
pub struct VideoInput {
    capture: cv2::videoio::VideoCapture,
    frame: cv2::core::Mat,
    rgb: cv2::core::Mat,
    frame_count: Option<u64>,
}

impl VideoInput {
    pub fn new(path: &Path) -> Result<VideoInput> {
        let name = path.to_str().context("Video path is not valid UTF-8")?;
        let capture = cv2::videoio::VideoCapture::from_file(name, cv2::videoio::CAP_ANY)
            .with_context(|| format!("Failed to open video {}", path.display()))?;
        if !capture.is_opened()? {
            bail!("Failed to open video {}", path.display());
        }

        let frame_count = capture.get(cv2::videoio::CAP_PROP_FRAME_COUNT)?;
        let frame_count = (frame_count > 0.).then_some(frame_count as u64);
        info!(
            "video {}: {}x{}, {:?} frames",
            path.display(),
            capture.get(cv2::videoio::CAP_PROP_FRAME_WIDTH)?,
            capture.get(cv2::videoio::CAP_PROP_FRAME_HEIGHT)?,
            frame_count
        );

        Ok(VideoInput {
            capture,
            frame: cv2::core::Mat::default(),
            rgb: cv2::core::Mat::default(),
            frame_count,
        })
    }
}

impl FrameSource for VideoInput {
    fn next_frame(&mut self) -> Result<Option<ColorImage>> {
        if !self.capture.read(&mut self.frame)? || self.frame.empty() {
            return Ok(None);
        }
        cv2::imgproc::cvt_color(&self.frame, &mut self.rgb, cv2::imgproc::COLOR_BGR2RGB, 0)?;
        let size = self.rgb.size()?;
        Ok(Some(ColorImage {
            data: self.rgb.data_bytes()?.to_vec(),
            width: size.width as usize,
            height: size.height as usize,
        }))
    }

    fn len(&self) -> Option<u64> {
        self.frame_count
    }
}
