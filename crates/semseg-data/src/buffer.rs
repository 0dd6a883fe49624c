//! Single-channel float pixel buffer shared by all augmentation primitives.

use image::DynamicImage;

/// Row-major single-channel image with `f32` pixels in `[0, 1]`.
///
/// Decoded images of any source format are funneled through this type so the
/// augmentation chain only ever deals with one layout.
#[derive(Debug, Clone, PartialEq)]
pub struct GrayBuffer {
    data: Vec<f32>,
    height: usize,
    width: usize,
}

impl GrayBuffer {
    /// Wrap an existing row-major pixel vector.
    pub fn new(data: Vec<f32>, height: usize, width: usize) -> Self {
        assert_eq!(
            data.len(),
            height * width,
            "pixel count must match dimensions"
        );
        Self {
            data,
            height,
            width,
        }
    }

    /// All-zero buffer of the given dimensions.
    pub fn zeros(height: usize, width: usize) -> Self {
        Self {
            data: vec![0.0; height * width],
            height,
            width,
        }
    }

    /// Collapse a decoded image to grayscale float pixels in `[0, 1]`.
    pub fn from_dynamic(img: DynamicImage) -> Self {
        let luma = img.to_luma32f();
        let (width, height) = (luma.width() as usize, luma.height() as usize);
        Self {
            data: luma.into_raw(),
            height,
            width,
        }
    }

    pub const fn height(&self) -> usize {
        self.height
    }

    pub const fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn get(&self, y: usize, x: usize) -> f32 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, y: usize, x: usize, value: f32) {
        self.data[y * self.width + x] = value;
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Consume the buffer, returning the raw pixel vector.
    pub fn into_raw(self) -> Vec<f32> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexing_is_row_major() {
        let mut buf = GrayBuffer::zeros(2, 3);
        buf.set(1, 2, 0.5);
        assert_eq!(buf.as_slice()[5], 0.5);
        assert_eq!(buf.get(1, 2), 0.5);
    }

    #[test]
    fn from_dynamic_scales_to_unit_range() {
        let img = image::DynamicImage::ImageLuma8(image::ImageBuffer::from_fn(4, 2, |_, _| {
            image::Luma([255u8])
        }));
        let buf = GrayBuffer::from_dynamic(img);
        assert_eq!(buf.height(), 2);
        assert_eq!(buf.width(), 4);
        assert!(buf.as_slice().iter().all(|&v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    #[should_panic(expected = "pixel count must match dimensions")]
    fn new_rejects_mismatched_length() {
        let _ = GrayBuffer::new(vec![0.0; 5], 2, 3);
    }
}
