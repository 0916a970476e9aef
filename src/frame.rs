use crate::descriptor::{DescriptorParams, DescriptorSet};
use crate::error::Result;
use crate::image::{ColorImage, Image};
use crate::my_types::*;
use crate::optical_flow::OpticalFlow;
use crate::pyramid::{Pyramid, ScaleLevel};

/// Everything derived from a single input frame: the grey pyramid used for
/// sampling and appearance, and the polynomial expansion used for flow.
#[derive(Debug)]
pub struct FrameBuffers {
    pub grey: Pyramid,
    pub poly: Vec<Field>,
}

impl FrameBuffers {
    pub fn new(
        input: &ColorImage,
        scales: &[ScaleLevel],
        optical_flow: &OpticalFlow,
        unused: Option<FrameBuffers>,
    ) -> Result<FrameBuffers> {
        // Reuse the pyramid of a retired frame to avoid allocation
        let mut frame = unused.unwrap_or_else(|| FrameBuffers {
            grey: Pyramid::empty(),
            poly: vec![],
        });
        let grey = Image::from_color(input);
        frame.grey.compute(&grey, scales)?;
        frame.poly = optical_flow.poly_pyramid(&grey, scales);
        Ok(frame)
    }

    pub fn level(&self, index: usize) -> &Image {
        &self.grey.levels[index]
    }
}

/// Read-only view of one scale for one frame pair. Tracks at this scale are
/// advanced against it.
#[derive(Debug)]
pub struct ScaleFrame {
    pub level: ScaleLevel,
    /// `(dx, dy)` per pixel, from the earlier frame to the later one
    pub flow: Field,
    pub descriptors: DescriptorSet,
}

impl ScaleFrame {
    /// `grey` is the earlier frame at this scale.
    pub fn new(level: ScaleLevel, grey: &Image, flow: Field, params: &DescriptorParams) -> Self {
        let descriptors = DescriptorSet::compute(grey, &flow, params);
        ScaleFrame {
            level,
            flow,
            descriptors,
        }
    }

    /// Flow at the pixel nearest to `point`, clamped to the image.
    pub fn flow_at(&self, point: &Vector2f) -> Vector2f {
        let (height, width, _) = self.flow.dim();
        let x = (point.x.round() as i64).clamp(0, width as i64 - 1) as usize;
        let y = (point.y.round() as i64).clamp(0, height as i64 - 1) as usize;
        Vector2f::new(self.flow[(y, x, 0)], self.flow[(y, x, 1)])
    }
}
