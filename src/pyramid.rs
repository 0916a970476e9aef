use crate::error::{Error, Result};
use crate::filter::resize_linear;
use crate::image::Image;

/// One level of the scale space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleLevel {
    pub index: usize,
    /// Multiply level coordinates by this to get level-0 pixels
    pub scale: f32,
    pub width: usize,
    pub height: usize,
}

/// Compute the level geometry for frames of the given size.
///
/// Level 0 is the frame itself. Each following level is `ratio` times the
/// previous one (rounded), and no level is allowed below `patch_size`.
pub fn scale_levels(
    width: usize,
    height: usize,
    patch_size: usize,
    max_levels: usize,
    ratio: f32,
) -> Result<Vec<ScaleLevel>> {
    if width == 0 || height == 0 {
        return Err(Error::EmptyFrame);
    }
    if width < patch_size || height < patch_size {
        return Err(Error::FrameTooSmall {
            width,
            height,
            patch_size,
        });
    }

    let stride = 1. / ratio;
    let mut min_size = usize::min(width, height) as f32;
    let mut level_count = 0;
    while min_size >= patch_size as f32 {
        min_size /= stride;
        level_count += 1;
    }
    let level_count = usize::min(max_levels, level_count.max(1));

    let mut levels = vec![ScaleLevel {
        index: 0,
        scale: 1.,
        width,
        height,
    }];
    for index in 1..level_count {
        let parent = levels[index - 1];
        let child = ScaleLevel {
            index,
            scale: parent.scale * stride,
            width: (parent.width as f32 * ratio).round() as usize,
            height: (parent.height as f32 * ratio).round() as usize,
        };
        if child.width < patch_size || child.height < patch_size {
            break;
        }
        levels.push(child);
    }
    Ok(levels)
}

#[derive(Debug)]
pub struct Pyramid {
    pub levels: Vec<Image>,
}

impl Pyramid {
    pub fn empty() -> Self {
        Self { levels: vec![] }
    }

    /// Level 0 copies the frame; level k+1 is a linear resize of level k.
    pub fn compute(&mut self, frame: &Image, scales: &[ScaleLevel]) -> Result<()> {
        if frame.is_empty() {
            return Err(Error::EmptyFrame);
        }
        if let Some(base) = scales.first() {
            if (base.width, base.height) != (frame.width, frame.height) {
                return Err(Error::FrameSizeMismatch {
                    expected: (base.width, base.height),
                    actual: (frame.width, frame.height),
                });
            }
        }

        self.levels.clear();
        for level in scales {
            let image = match self.levels.last() {
                None => frame.clone(),
                Some(parent) => {
                    let resized = resize_linear(&parent.to_field(), level.width, level.height);
                    Image::from_field(&resized)
                }
            };
            self.levels.push(image);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_SCALE_RATIO;

    #[test]
    fn test_level_dimensions() {
        let levels = scale_levels(320, 240, 32, 8, DEFAULT_SCALE_RATIO).unwrap();
        assert_eq!(levels[0].width, 320);
        assert_eq!(levels[0].height, 240);
        assert_eq!(levels[0].scale, 1.);
        for pair in levels.windows(2) {
            let (parent, child) = (pair[0], pair[1]);
            assert_eq!(child.width, (parent.width as f32 * DEFAULT_SCALE_RATIO).round() as usize);
            assert_eq!(child.height, (parent.height as f32 * DEFAULT_SCALE_RATIO).round() as usize);
            assert!(child.width >= 32 && child.height >= 32);
            assert!((child.scale / parent.scale - std::f32::consts::SQRT_2).abs() < 1e-5);
        }
        // 240 / sqrt(2)^k stays >= 32 for k = 0..=5
        assert_eq!(levels.len(), 6);
    }

    #[test]
    fn test_level_cap() {
        let levels = scale_levels(640, 480, 32, 3, DEFAULT_SCALE_RATIO).unwrap();
        assert_eq!(levels.len(), 3);
        let single = scale_levels(40, 40, 32, 8, DEFAULT_SCALE_RATIO).unwrap();
        assert_eq!(single.len(), 1);
    }

    #[test]
    fn test_too_small() {
        assert!(matches!(
            scale_levels(20, 50, 32, 8, 0.5),
            Err(Error::FrameTooSmall { .. })
        ));
        assert!(matches!(scale_levels(0, 0, 32, 8, 0.5), Err(Error::EmptyFrame)));
    }

    #[test]
    fn test_compute() {
        let levels = scale_levels(64, 48, 8, 4, 0.5).unwrap();
        let frame = Image::new(64, 48, 90);
        let mut pyramid = Pyramid::empty();
        pyramid.compute(&frame, &levels).unwrap();
        assert_eq!(pyramid.levels.len(), levels.len());
        assert_eq!(pyramid.levels[0], frame);
        for (image, level) in pyramid.levels.iter().zip(&levels) {
            assert_eq!((image.width, image.height), (level.width, level.height));
            assert!(image.data.iter().all(|&v| v == 90));
        }

        let wrong = Image::new(32, 48, 0);
        assert!(matches!(
            pyramid.compute(&wrong, &levels),
            Err(Error::FrameSizeMismatch { .. })
        ));
    }
}
