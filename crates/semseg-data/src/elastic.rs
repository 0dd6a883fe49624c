//! Seeded elastic deformation.
//!
//! Draws a uniform random displacement per pixel, smooths the field with a
//! Gaussian filter and scales it by `alpha`, then resamples the source with
//! bilinear interpolation. The whole transform is a pure function of the
//! seed, so an image and its mask warped with the same seed stay aligned.

use image::{ImageBuffer, Luma};
use imageproc::filter::gaussian_blur_f32;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::buffer::GrayBuffer;

/// Warp `buf` with a smoothed random displacement field.
///
/// `alpha` controls the displacement magnitude, `sigma` the smoothness of the
/// field. Two calls with the same `seed` on equally sized buffers use
/// identical displacement fields.
pub fn elastic_transform(buf: &GrayBuffer, alpha: f32, sigma: f32, seed: u64) -> GrayBuffer {
    let (height, width) = (buf.height(), buf.width());
    let (dy, dx) = displacement_fields(height, width, alpha, sigma, seed);

    let mut out = GrayBuffer::zeros(height, width);
    for y in 0..height {
        for x in 0..width {
            let i = y * width + x;
            let src_y = y as f32 + dy[i];
            let src_x = x as f32 + dx[i];
            out.set(y, x, bilinear_sample(buf, src_y, src_x));
        }
    }
    out
}

/// Row and column displacement fields for a `height` x `width` grid.
pub(crate) fn displacement_fields(
    height: usize,
    width: usize,
    alpha: f32,
    sigma: f32,
    seed: u64,
) -> (Vec<f32>, Vec<f32>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let dy = random_field(&mut rng, height * width);
    let dx = random_field(&mut rng, height * width);
    (
        smooth_and_scale(dy, height, width, sigma, alpha),
        smooth_and_scale(dx, height, width, sigma, alpha),
    )
}

fn random_field(rng: &mut StdRng, len: usize) -> Vec<f32> {
    (0..len).map(|_| rng.random_range(-1.0..=1.0)).collect()
}

fn smooth_and_scale(
    field: Vec<f32>,
    height: usize,
    width: usize,
    sigma: f32,
    alpha: f32,
) -> Vec<f32> {
    if sigma <= 0.0 {
        return field.into_iter().map(|v| v * alpha).collect();
    }
    let img: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_raw(width as u32, height as u32, field)
            .expect("field length matches dimensions");
    let blurred = gaussian_blur_f32(&img, sigma);
    blurred.into_raw().into_iter().map(|v| v * alpha).collect()
}

fn bilinear_sample(buf: &GrayBuffer, y: f32, x: f32) -> f32 {
    let max_y = (buf.height() - 1) as f32;
    let max_x = (buf.width() - 1) as f32;
    let y = y.clamp(0.0, max_y);
    let x = x.clamp(0.0, max_x);

    let y0 = y.floor() as usize;
    let x0 = x.floor() as usize;
    let y1 = (y0 + 1).min(buf.height() - 1);
    let x1 = (x0 + 1).min(buf.width() - 1);
    let fy = y - y0 as f32;
    let fx = x - x0 as f32;

    let top = buf.get(y0, x0) * (1.0 - fx) + buf.get(y0, x1) * fx;
    let bottom = buf.get(y1, x0) * (1.0 - fx) + buf.get(y1, x1) * fx;
    top * (1.0 - fy) + bottom * fy
}
