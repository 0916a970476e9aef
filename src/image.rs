use ndarray as nd;

use crate::my_types::*;

/// Row-major grayscale image storage
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

/// Row-major interleaved RGB frame, as delivered by a frame source
#[derive(Clone, Debug, PartialEq)]
pub struct ColorImage {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

impl Image {
    /// Create an empty image
    pub fn empty() -> Image {
        Image {
            data: vec![],
            width: 0,
            height: 0,
        }
    }

    pub fn new(width: usize, height: usize, value: u8) -> Image {
        Image {
            data: vec![value; width * height],
            width,
            height,
        }
    }

    /// Luma conversion with the ITU-R BT.601 weights
    pub fn from_color(color: &ColorImage) -> Image {
        let data = color
            .data
            .chunks_exact(3)
            .map(|p| {
                let y = 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32;
                y.round().clamp(0., 255.) as u8
            })
            .collect();
        Image {
            data,
            width: color.width,
            height: color.height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Get the size for a chosen dimension
    pub fn size(&self, dim: usize) -> usize {
        if dim == 0 {
            self.width
        } else {
            self.height
        }
    }

    #[inline(always)]
    pub fn value(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    #[inline(always)]
    pub fn set_value(&mut self, x: usize, y: usize, value: u8) {
        self.data[y * self.width + x] = value;
    }

    /// Single channel float copy
    pub fn to_field(&self) -> Field {
        nd::Array::from_shape_fn((self.height, self.width, 1), |(y, x, _)| {
            self.value(x, y) as f32
        })
    }

    /// Round and saturate a single channel float buffer back to bytes
    pub fn from_field(field: &Field) -> Image {
        let (height, width, _) = field.dim();
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(field[(y, x, 0)].round().clamp(0., 255.) as u8);
            }
        }
        Image {
            data,
            width,
            height,
        }
    }
}

impl ColorImage {
    pub fn new(width: usize, height: usize, rgb: [u8; 3]) -> ColorImage {
        ColorImage {
            data: rgb.iter().copied().cycle().take(width * height * 3).collect(),
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}
