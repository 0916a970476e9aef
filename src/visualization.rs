use anyhow::Result;

use crate::image::ColorImage;
use crate::my_types::*;

/// Observer of the live tracks, called once per processed frame.
pub trait Visualizer {
    /// `tracks` are pixel polylines, oldest point first. Return `false` to
    /// stop the run.
    fn show(&mut self, frame: &ColorImage, tracks: &[Vec<Vector2f>]) -> Result<bool>;
}

pub struct NoopVisualizer;

impl Visualizer for NoopVisualizer {
    fn show(&mut self, _frame: &ColorImage, _tracks: &[Vec<Vector2f>]) -> Result<bool> {
        Ok(true)
    }
}

pub const HEAD_COLOR: [u8; 3] = [255, 0, 0];
pub const TRACK_COLOR: [u8; 3] = [0, 255, 0];
pub const HEAD_RADIUS: i32 = 2;

/// Green level of segment `j` of a polyline with `segments` segments, so the
/// tail fades out towards the oldest point.
pub fn segment_shade(j: usize, segments: usize) -> u8 {
    (255 * (j + 1) / segments.max(1)).min(255) as u8
}

#[cfg(feature = "rerun")]
pub use self::recording::RerunVisualizer;

#[cfg(feature = "rerun")]
mod recording {
    use anyhow::{Context as AnyhowContext, Result};
    use ndarray as nd;
    use rerun::{RecordingStream, RecordingStreamBuilder};
    use std::path::Path;

    use super::{Visualizer, HEAD_COLOR, HEAD_RADIUS, TRACK_COLOR};
    use crate::image::ColorImage;
    use crate::my_types::*;

    /// Logs every frame with its live tracks to a rerun recording file.
    pub struct RerunVisualizer {
        recorder: RecordingStream,
        frame_number: i64,
    }

    impl RerunVisualizer {
        pub fn new(path: &Path) -> Result<Self> {
            let recorder = RecordingStreamBuilder::new("dense-track")
                .save(path)
                .with_context(|| format!("Failed to create recording {}", path.display()))?;
            Ok(RerunVisualizer {
                recorder,
                frame_number: 0,
            })
        }
    }

    impl Visualizer for RerunVisualizer {
        fn show(&mut self, frame: &ColorImage, tracks: &[Vec<Vector2f>]) -> Result<bool> {
            self.recorder.set_time_sequence("frame", self.frame_number);
            self.frame_number += 1;

            let image =
                nd::Array3::from_shape_vec((frame.height, frame.width, 3), frame.data.clone())?;
            self.recorder
                .log("camera/image", &rerun::Image::try_from(image)?)?;

            let strips: Vec<Vec<[f32; 2]>> = tracks
                .iter()
                .filter(|points| points.len() > 1)
                .map(|points| points.iter().map(|p| [p.x, p.y]).collect())
                .collect();
            let heads: Vec<[f32; 2]> = tracks
                .iter()
                .filter_map(|points| points.last())
                .map(|p| [p.x, p.y])
                .collect();
            let [r, g, b] = TRACK_COLOR;
            self.recorder.log(
                "camera/image/tracks",
                &rerun::LineStrips2D::new(strips).with_colors([rerun::Color::from_rgb(r, g, b)]),
            )?;
            let [r, g, b] = HEAD_COLOR;
            self.recorder.log(
                "camera/image/heads",
                &rerun::Points2D::new(heads)
                    .with_colors([rerun::Color::from_rgb(r, g, b)])
                    .with_radii([HEAD_RADIUS as f32]),
            )?;
            Ok(true)
        }
    }
}

#[cfg(feature = "opencv")]
pub use self::window::WindowVisualizer;

#[cfg(feature = "opencv")]
mod window {
    use anyhow::Result;
    use cv2::prelude::*;
    use opencv as cv2;

    use super::{segment_shade, Visualizer, HEAD_COLOR, HEAD_RADIUS};
    use crate::image::ColorImage;
    use crate::my_types::*;

    const WINDOW_NAME: &str = "DenseTrack";
    const KEY_ESCAPE: i32 = 27;

    fn to_cv_point(p: &Vector2f) -> cv2::core::Point {
        cv2::core::Point {
            x: p.x.round() as i32,
            y: p.y.round() as i32,
        }
    }

    fn bgr([r, g, b]: [u8; 3]) -> cv2::core::Scalar {
        cv2::core::Scalar::new(b as f64, g as f64, r as f64, 0.0)
    }

    /// Interactive OpenCV window; Esc ends the run.
    pub struct WindowVisualizer;

    impl WindowVisualizer {
        pub fn new() -> Result<Self> {
            cv2::highgui::named_window(WINDOW_NAME, cv2::highgui::WINDOW_NORMAL)?;
            Ok(WindowVisualizer)
        }
    }

    impl Drop for WindowVisualizer {
        fn drop(&mut self) {
            let _ = cv2::highgui::destroy_window(WINDOW_NAME);
        }
    }

    impl Visualizer for WindowVisualizer {
        fn show(&mut self, frame: &ColorImage, tracks: &[Vec<Vector2f>]) -> Result<bool> {
            let rgb = unsafe {
                cv2::core::Mat::new_rows_cols_with_data(
                    frame.height as i32,
                    frame.width as i32,
                    cv2::core::CV_8UC3,
                    frame.data.as_ptr() as *mut std::ffi::c_void,
                    cv2::core::Mat_AUTO_STEP,
                )?
            };
            let mut canvas = cv2::core::Mat::default();
            cv2::imgproc::cvt_color(&rgb, &mut canvas, cv2::imgproc::COLOR_RGB2BGR, 0)?;

            for points in tracks {
                let Some(head) = points.last() else {
                    continue;
                };
                let segments = points.len() - 1;
                for (j, pair) in points.windows(2).enumerate() {
                    cv2::imgproc::line(
                        &mut canvas,
                        to_cv_point(&pair[0]),
                        to_cv_point(&pair[1]),
                        bgr([0, segment_shade(j, segments), 0]),
                        1,
                        cv2::imgproc::LINE_AA,
                        0,
                    )?;
                }
                cv2::imgproc::circle(
                    &mut canvas,
                    to_cv_point(head),
                    HEAD_RADIUS,
                    bgr(HEAD_COLOR),
                    -1,
                    cv2::imgproc::LINE_AA,
                    0,
                )?;
            }

            cv2::highgui::imshow(WINDOW_NAME, &canvas)?;
            Ok(cv2::highgui::wait_key(5)? != KEY_ESCAPE)
        }
    }
}
