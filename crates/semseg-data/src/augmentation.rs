//! Augmentation primitives and the paired image/mask augmentation chain.
//!
//! The training pipeline applies, in order: flip, additive noise (Gaussian or
//! uniform), brightness shift, optional elastic deformation, and a random
//! crop with padding. Geometric steps (flip, elastic, crop) are shared
//! between the image and its mask so spatial correspondence is preserved;
//! noise and brightness touch the image only. Every drawn parameter is
//! recorded in an [`AugmentationTrace`] so callers can report or replay it.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::{buffer::GrayBuffer, elastic::elastic_transform};

/// Flip applied to both image and mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlipMode {
    /// Leave the sample unchanged.
    None,
    /// Mirror rows (top/bottom).
    Vertical,
    /// Mirror columns (left/right).
    Horizontal,
    /// Mirror rows and columns.
    Both,
}

/// Noise model drawn for one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoiseKind {
    Gaussian { stdev: f32 },
    Uniform { lo: f32, hi: f32 },
}

/// Augmentation parameter ranges, all in the `[0, 1]` pixel scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentationConfig {
    /// Flip applied to every sample. Production training runs without one.
    pub flip: FlipMode,
    /// Gaussian noise stdev is drawn uniformly from `[0, max_noise_stdev]`.
    pub max_noise_stdev: f32,
    /// Uniform noise bounds are drawn from `[-uniform_noise_bound, 0]` and
    /// `[0, uniform_noise_bound]`.
    pub uniform_noise_bound: f32,
    /// Brightness shift is drawn from `[-max_brightness_shift, max_brightness_shift]`.
    pub max_brightness_shift: f32,
    /// Probability of applying an elastic deformation.
    pub elastic_prob: f64,
    /// Elastic displacement magnitude.
    pub elastic_alpha: f32,
    /// Elastic displacement-field smoothness.
    pub elastic_sigma: f32,
}

/// 20 intensity levels of the original 8-bit data.
const MAX_PIXEL_SHIFT: f32 = 20.0 / 255.0;

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            flip: FlipMode::None,
            max_noise_stdev: MAX_PIXEL_SHIFT,
            uniform_noise_bound: MAX_PIXEL_SHIFT,
            max_brightness_shift: MAX_PIXEL_SHIFT,
            elastic_prob: 0.5,
            elastic_alpha: 34.0,
            elastic_sigma: 4.0,
        }
    }
}

/// Parameters drawn while augmenting one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AugmentationTrace {
    pub flip: FlipMode,
    pub noise: NoiseKind,
    pub brightness: f32,
    /// Seed of the shared displacement field, if deformation was applied.
    pub elastic_seed: Option<u64>,
    /// `(row, column)` offset of the training crop.
    pub crop_offset: (usize, usize),
}

/// Applies the augmentation chain to an image/mask pair.
#[derive(Debug, Clone)]
pub struct PairAugmentor {
    config: AugmentationConfig,
    in_size: usize,
    out_size: usize,
}

impl PairAugmentor {
    pub fn new(config: AugmentationConfig, in_size: usize, out_size: usize) -> Self {
        assert!(
            out_size <= in_size,
            "output size must not exceed input size"
        );
        Self {
            config,
            in_size,
            out_size,
        }
    }

    /// Augment one image/mask pair.
    ///
    /// The mask receives the same flip, the same displacement field (shared
    /// seed) when deformation fires, and the identical crop offset. It is
    /// re-binarized after the geometric steps so interpolated values snap
    /// back to `{0, 1}`.
    pub fn augment(
        &self,
        image: GrayBuffer,
        mask: GrayBuffer,
        rng: &mut impl Rng,
    ) -> (GrayBuffer, GrayBuffer, AugmentationTrace) {
        let cfg = &self.config;

        let mut image = flip(&image, cfg.flip);
        let mut mask = flip(&mask, cfg.flip);

        let noise = if rng.random_bool(0.5) {
            let stdev = rng.random_range(0.0..=cfg.max_noise_stdev);
            image = add_gaussian_noise(image, 0.0, stdev, rng);
            NoiseKind::Gaussian { stdev }
        } else {
            let lo = rng.random_range(-cfg.uniform_noise_bound..=0.0);
            let hi = rng.random_range(0.0..=cfg.uniform_noise_bound);
            image = add_uniform_noise(image, lo, hi, rng);
            NoiseKind::Uniform { lo, hi }
        };

        let brightness = rng.random_range(-cfg.max_brightness_shift..=cfg.max_brightness_shift);
        image = shift_brightness(image, brightness);

        let elastic_seed = if rng.random_bool(cfg.elastic_prob) {
            let seed = rng.random();
            image = elastic_transform(&image, cfg.elastic_alpha, cfg.elastic_sigma, seed);
            mask = elastic_transform(&mask, cfg.elastic_alpha, cfg.elastic_sigma, seed);
            Some(seed)
        } else {
            None
        };
        mask = binarize(mask, 0.5);

        let (image, y_off, x_off) = crop_pad_train(image, self.in_size, self.out_size, rng);
        let mask = crop(&pad_to(&mask, self.in_size), y_off, x_off, self.out_size);

        let trace = AugmentationTrace {
            flip: cfg.flip,
            noise,
            brightness,
            elastic_seed,
            crop_offset: (y_off, x_off),
        };
        (image, mask, trace)
    }
}

/// Mirror a buffer according to `mode`.
pub fn flip(buf: &GrayBuffer, mode: FlipMode) -> GrayBuffer {
    if mode == FlipMode::None {
        return buf.clone();
    }
    let (height, width) = (buf.height(), buf.width());
    let mut out = GrayBuffer::zeros(height, width);
    for y in 0..height {
        for x in 0..width {
            let (src_y, src_x) = match mode {
                FlipMode::None => (y, x),
                FlipMode::Vertical => (height - 1 - y, x),
                FlipMode::Horizontal => (y, width - 1 - x),
                FlipMode::Both => (height - 1 - y, width - 1 - x),
            };
            out.set(y, x, buf.get(src_y, src_x));
        }
    }
    out
}

/// Add `N(mean, stdev)` noise per pixel, clamped to `[0, 1]`.
pub fn add_gaussian_noise(
    mut buf: GrayBuffer,
    mean: f32,
    stdev: f32,
    rng: &mut impl Rng,
) -> GrayBuffer {
    if stdev <= 0.0 {
        return buf;
    }
    let Ok(normal) = Normal::new(mean, stdev) else {
        return buf;
    };
    for v in buf.as_mut_slice() {
        *v = (*v + normal.sample(rng)).clamp(0.0, 1.0);
    }
    buf
}

/// Add `U(lo, hi)` noise per pixel, clamped to `[0, 1]`.
pub fn add_uniform_noise(mut buf: GrayBuffer, lo: f32, hi: f32, rng: &mut impl Rng) -> GrayBuffer {
    if hi <= lo {
        return buf;
    }
    for v in buf.as_mut_slice() {
        *v = (*v + rng.random_range(lo..=hi)).clamp(0.0, 1.0);
    }
    buf
}

/// Shift every pixel by `delta`, clamped to `[0, 1]`.
pub fn shift_brightness(mut buf: GrayBuffer, delta: f32) -> GrayBuffer {
    for v in buf.as_mut_slice() {
        *v = (*v + delta).clamp(0.0, 1.0);
    }
    buf
}

/// Center `buf` on a zero canvas of at least `size` per side.
///
/// Dimensions already at or above `size` are kept; the extra pixel of an odd
/// margin goes to the bottom/right.
pub fn pad_to(buf: &GrayBuffer, size: usize) -> GrayBuffer {
    let (height, width) = (buf.height(), buf.width());
    if height >= size && width >= size {
        return buf.clone();
    }
    let out_h = height.max(size);
    let out_w = width.max(size);
    let top = (out_h - height) / 2;
    let left = (out_w - width) / 2;

    let mut out = GrayBuffer::zeros(out_h, out_w);
    for y in 0..height {
        for x in 0..width {
            out.set(top + y, left + x, buf.get(y, x));
        }
    }
    out
}

/// Copy the `size` x `size` window at `(y_off, x_off)`.
pub fn crop(buf: &GrayBuffer, y_off: usize, x_off: usize, size: usize) -> GrayBuffer {
    let mut out = GrayBuffer::zeros(size, size);
    for y in 0..size {
        for x in 0..size {
            out.set(y, x, buf.get(y_off + y, x_off + x));
        }
    }
    out
}

/// Pad to `in_size`, then take a random `out_size` crop.
///
/// Returns the crop together with its `(row, column)` offset; offsets are
/// drawn from `[0, in_size - out_size]` inclusive.
pub fn crop_pad_train(
    buf: GrayBuffer,
    in_size: usize,
    out_size: usize,
    rng: &mut impl Rng,
) -> (GrayBuffer, usize, usize) {
    let padded = pad_to(&buf, in_size);
    let max_off = in_size - out_size;
    let y_off = rng.random_range(0..=max_off);
    let x_off = rng.random_range(0..=max_off);
    (crop(&padded, y_off, x_off, out_size), y_off, x_off)
}

/// Pad to `in_size`, then take the four overlapping corner crops.
///
/// Order: top-left, top-right, bottom-left, bottom-right.
pub fn crop_pad_test(buf: &GrayBuffer, in_size: usize, out_size: usize) -> [GrayBuffer; 4] {
    let padded = pad_to(buf, in_size);
    let y_max = padded.height() - out_size;
    let x_max = padded.width() - out_size;
    [
        crop(&padded, 0, 0, out_size),
        crop(&padded, 0, x_max, out_size),
        crop(&padded, y_max, 0, out_size),
        crop(&padded, y_max, x_max, out_size),
    ]
}

/// Center and scale: `(x - mean) / stdev`.
pub fn normalize(mut buf: GrayBuffer, mean: f32, stdev: f32) -> GrayBuffer {
    for v in buf.as_mut_slice() {
        *v = (*v - mean) / stdev;
    }
    buf
}

/// Threshold to exactly `{0.0, 1.0}`.
pub fn binarize(mut buf: GrayBuffer, threshold: f32) -> GrayBuffer {
    for v in buf.as_mut_slice() {
        *v = if *v > threshold { 1.0 } else { 0.0 };
    }
    buf
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    fn marker_buffer(height: usize, width: usize, y: usize, x: usize) -> GrayBuffer {
        let mut buf = GrayBuffer::zeros(height, width);
        buf.set(y, x, 1.0);
        buf
    }

    fn argmax(buf: &GrayBuffer) -> (usize, usize) {
        let mut best = (0, 0);
        let mut best_val = f32::NEG_INFINITY;
        for y in 0..buf.height() {
            for x in 0..buf.width() {
                if buf.get(y, x) > best_val {
                    best_val = buf.get(y, x);
                    best = (y, x);
                }
            }
        }
        best
    }

    #[test]
    fn flip_moves_known_pixel() {
        let buf = marker_buffer(4, 6, 1, 2);
        assert_eq!(argmax(&flip(&buf, FlipMode::Vertical)), (2, 2));
        assert_eq!(argmax(&flip(&buf, FlipMode::Horizontal)), (1, 3));
        assert_eq!(argmax(&flip(&buf, FlipMode::Both)), (2, 3));
        assert_eq!(argmax(&flip(&buf, FlipMode::None)), (1, 2));
    }

    #[test]
    fn flip_is_an_involution() {
        let buf = marker_buffer(5, 5, 3, 1);
        for mode in [FlipMode::Vertical, FlipMode::Horizontal, FlipMode::Both] {
            assert_eq!(flip(&flip(&buf, mode), mode), buf);
        }
    }

    #[test]
    fn gaussian_noise_stays_in_unit_range() {
        let mut rng = StdRng::seed_from_u64(0);
        let buf = GrayBuffer::new(vec![0.5; 64], 8, 8);
        let noisy = add_gaussian_noise(buf.clone(), 0.0, 0.3, &mut rng);
        assert_ne!(noisy, buf);
        assert!(noisy.as_slice().iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn zero_stdev_noise_is_identity() {
        let mut rng = StdRng::seed_from_u64(0);
        let buf = GrayBuffer::new(vec![0.5; 16], 4, 4);
        assert_eq!(add_gaussian_noise(buf.clone(), 0.0, 0.0, &mut rng), buf);
    }

    #[test]
    fn uniform_noise_respects_bounds() {
        let mut rng = StdRng::seed_from_u64(1);
        let buf = GrayBuffer::new(vec![0.5; 256], 16, 16);
        let noisy = add_uniform_noise(buf, -0.05, 0.08, &mut rng);
        assert!(noisy
            .as_slice()
            .iter()
            .all(|&v| (0.45..=0.58).contains(&v)));
    }

    #[test]
    fn brightness_shift_clamps() {
        let buf = GrayBuffer::new(vec![0.9; 4], 2, 2);
        let bright = shift_brightness(buf, 0.3);
        assert!(bright.as_slice().iter().all(|&v| v == 1.0));
        let dark = shift_brightness(bright, -1.5);
        assert!(dark.as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn normalize_matches_reference_values() {
        let buf = GrayBuffer::new(vec![0.5; 9], 3, 3);
        let normed = normalize(buf, 0.4911, 0.0402);
        for &v in normed.as_slice() {
            assert!((v - 0.2214).abs() < 1e-3);
        }
    }

    #[test]
    fn binarize_yields_exactly_zero_or_one() {
        let buf = GrayBuffer::new(vec![0.0, 0.2, 0.5, 0.51, 0.9, 1.0], 2, 3);
        let bin = binarize(buf, 0.5);
        assert_eq!(bin.as_slice(), &[0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn pad_to_centers_the_source() {
        let buf = GrayBuffer::new(vec![1.0; 4], 2, 2);
        let padded = pad_to(&buf, 4);
        assert_eq!(padded.height(), 4);
        assert_eq!(padded.width(), 4);
        assert_eq!(padded.get(0, 0), 0.0);
        assert_eq!(padded.get(1, 1), 1.0);
        assert_eq!(padded.get(2, 2), 1.0);
        assert_eq!(padded.get(3, 3), 0.0);
    }

    #[test]
    fn train_crop_offset_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..32 {
            let buf = GrayBuffer::zeros(512, 512);
            let (cropped, y, x) = crop_pad_train(buf, 572, 388, &mut rng);
            assert_eq!(cropped.height(), 388);
            assert_eq!(cropped.width(), 388);
            assert!(y <= 184);
            assert!(x <= 184);
            assert!(y + 388 <= 572);
            assert!(x + 388 <= 572);
        }
    }

    #[test]
    fn train_crop_pads_small_sources() {
        let mut rng = StdRng::seed_from_u64(4);
        let buf = GrayBuffer::new(vec![1.0; 100 * 100], 100, 100);
        let (cropped, _, _) = crop_pad_train(buf, 128, 96, &mut rng);
        assert_eq!(cropped.height(), 96);
        assert_eq!(cropped.width(), 96);
    }

    #[test]
    fn test_crops_cover_all_corners() {
        let mut buf = GrayBuffer::zeros(512, 512);
        for y in 0..512 {
            for x in 0..512 {
                buf.set(y, x, (y * 512 + x) as f32);
            }
        }
        let crops = crop_pad_test(&buf, 572, 388);
        for c in &crops {
            assert_eq!(c.height(), 388);
            assert_eq!(c.width(), 388);
        }
        let padded = pad_to(&buf, 572);
        // Corner pixels of the padded canvas appear in the matching crops.
        assert_eq!(crops[0].get(0, 0), padded.get(0, 0));
        assert_eq!(crops[1].get(0, 387), padded.get(0, 571));
        assert_eq!(crops[2].get(387, 0), padded.get(571, 0));
        assert_eq!(crops[3].get(387, 387), padded.get(571, 571));
    }

    fn quiet_config(flip: FlipMode, elastic_prob: f64) -> AugmentationConfig {
        AugmentationConfig {
            flip,
            max_noise_stdev: 0.0,
            uniform_noise_bound: 0.0,
            max_brightness_shift: 0.0,
            elastic_prob,
            ..AugmentationConfig::default()
        }
    }

    #[test]
    fn augmentor_keeps_image_and_mask_aligned() {
        let mut rng = StdRng::seed_from_u64(11);
        let augmentor = PairAugmentor::new(quiet_config(FlipMode::Both, 0.0), 96, 64);
        let image = marker_buffer(96, 96, 20, 70);
        let mask = marker_buffer(96, 96, 20, 70);
        for _ in 0..8 {
            let (img, msk, trace) =
                augmentor.augment(image.clone(), mask.clone(), &mut rng);
            assert_eq!(trace.flip, FlipMode::Both);
            // The marker may fall outside the crop; when it survives, it has
            // to land on the same position in both outputs.
            let img_max = argmax(&img);
            if img.get(img_max.0, img_max.1) > 0.5 {
                assert_eq!(msk.get(img_max.0, img_max.1), 1.0);
            }
        }
    }

    #[test]
    fn augmentor_mask_is_binary_after_elastic() {
        let mut rng = StdRng::seed_from_u64(12);
        let augmentor = PairAugmentor::new(quiet_config(FlipMode::None, 1.0), 96, 64);
        let mut mask = GrayBuffer::zeros(96, 96);
        for y in 0..96 {
            for x in 48..96 {
                mask.set(y, x, 1.0);
            }
        }
        let (_, msk, trace) = augmentor.augment(GrayBuffer::zeros(96, 96), mask, &mut rng);
        assert!(trace.elastic_seed.is_some());
        assert!(msk.as_slice().iter().all(|&v| v == 0.0 || v == 1.0));
    }

    #[test]
    fn trace_records_drawn_parameters() {
        let mut rng = StdRng::seed_from_u64(13);
        let augmentor = PairAugmentor::new(AugmentationConfig::default(), 572, 388);
        let image = GrayBuffer::new(vec![0.5; 512 * 512], 512, 512);
        let mask = GrayBuffer::zeros(512, 512);
        let (_, _, trace) = augmentor.augment(image, mask, &mut rng);
        assert!(trace.crop_offset.0 <= 184);
        assert!(trace.crop_offset.1 <= 184);
        match trace.noise {
            NoiseKind::Gaussian { stdev } => assert!((0.0..=MAX_PIXEL_SHIFT).contains(&stdev)),
            NoiseKind::Uniform { lo, hi } => {
                assert!((-MAX_PIXEL_SHIFT..=0.0).contains(&lo));
                assert!((0.0..=MAX_PIXEL_SHIFT).contains(&hi));
            }
        }
        assert!(trace.brightness.abs() <= MAX_PIXEL_SHIFT);
    }
}
