//! Dataset implementations for segmentation training and tiled inference.
//!
//! Datasets return raw float data following Burn's convention; the batchers
//! handle tensor creation and device placement. File pairs are discovered
//! once at construction; every access re-reads and re-augments from disk so
//! repeated accesses of one index draw fresh augmentation parameters.

use std::{
    fs,
    marker::PhantomData,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    tensor::{backend::Backend, Tensor, TensorData},
};
use image::ImageFormat;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    augmentation::{self, AugmentationConfig, AugmentationTrace, PairAugmentor},
    buffer::GrayBuffer,
    error::{DatasetError, DatasetResult},
    stats::{self, PixelStats},
};

/// Pipeline configuration passed at dataset construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Network input side length; sources are padded up to this size.
    pub in_size: usize,
    /// Network output side length; crops have this size.
    pub out_size: usize,
    /// Normalization constants for the test path, where no per-directory
    /// statistics are computed.
    pub fallback_stats: PixelStats,
    /// Augmentation parameter ranges for the training path.
    pub augmentation: AugmentationConfig,
    /// Base seed for the per-sample random streams. `None` draws one from
    /// entropy at construction.
    pub base_seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            in_size: 572,
            out_size: 388,
            fallback_stats: PixelStats {
                mean: 0.4911,
                stdev: 0.0402,
            },
            augmentation: AugmentationConfig::default(),
            base_seed: None,
        }
    }
}

/// One augmented training sample as raw data.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainItem {
    /// Normalized image pixels, row-major `[H, W]`.
    pub image: Vec<f32>,
    /// Binary mask pixels in `{0.0, 1.0}`, row-major `[H, W]`.
    pub mask: Vec<f32>,
    pub height: usize,
    pub width: usize,
    /// Parameters drawn while augmenting this sample.
    pub trace: AugmentationTrace,
}

/// Four normalized corner crops of one test image.
#[derive(Debug, Clone, PartialEq)]
pub struct TestItem {
    /// Top-left, top-right, bottom-left, bottom-right crops, each row-major
    /// `[H, W]`.
    pub crops: [Vec<f32>; 4],
    pub height: usize,
    pub width: usize,
}

/// Training dataset over an image/mask directory pair.
///
/// Pairing is positional over the filename-sorted listings; the dataset
/// length is the number of mask files. Directory statistics for input
/// normalization are computed once at construction.
#[derive(Debug)]
pub struct SemSegTrainDataset {
    pairs: Vec<(PathBuf, PathBuf)>,
    stats: PixelStats,
    augmentor: PairAugmentor,
    base_seed: u64,
    access_counter: AtomicUsize,
}

impl SemSegTrainDataset {
    pub fn new<P, Q>(image_dir: P, mask_dir: Q, config: PipelineConfig) -> DatasetResult<Self>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let image_dir = image_dir.as_ref();
        let mask_dir = mask_dir.as_ref();
        let pairs = collect_pairs(image_dir, mask_dir)?;
        let stats = stats::directory_stats(image_dir)?;
        let augmentor =
            PairAugmentor::new(config.augmentation.clone(), config.in_size, config.out_size);
        let base_seed = config.base_seed.unwrap_or_else(rand::random);

        Ok(Self {
            pairs,
            stats,
            augmentor,
            base_seed,
            access_counter: AtomicUsize::new(0),
        })
    }

    /// Directory statistics used to normalize training images.
    pub const fn stats(&self) -> PixelStats {
        self.stats
    }

    fn sample_seed(&self, index: usize, nonce: u64) -> u64 {
        self.base_seed
            ^ (index as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15)
            ^ nonce.wrapping_mul(0xd1b5_4a32_d192_ed03)
    }
}

impl Dataset<TrainItem> for SemSegTrainDataset {
    fn get(&self, index: usize) -> Option<TrainItem> {
        let (image_path, mask_path) = self.pairs.get(index)?;

        let image = match image::open(image_path) {
            Ok(img) => img,
            Err(e) => {
                eprintln!("failed to open image {}: {e}", image_path.display());
                return None;
            }
        };
        let mask = match image::open(mask_path) {
            Ok(img) => img,
            Err(e) => {
                eprintln!("failed to open mask {}: {e}", mask_path.display());
                return None;
            }
        };

        let image = GrayBuffer::from_dynamic(image);
        let mask = GrayBuffer::from_dynamic(mask);

        let nonce = self.access_counter.fetch_add(1, Ordering::Relaxed) as u64;
        let mut rng = StdRng::seed_from_u64(self.sample_seed(index, nonce));

        let (image, mask, trace) = self.augmentor.augment(image, mask, &mut rng);
        let image = augmentation::normalize(image, self.stats.mean, self.stats.stdev);

        let (height, width) = (image.height(), image.width());
        Some(TrainItem {
            image: image.into_raw(),
            mask: mask.into_raw(),
            height,
            width,
            trace,
        })
    }

    fn len(&self) -> usize {
        self.pairs.len()
    }
}

/// Test dataset producing four overlapping corner crops per image.
///
/// Each crop is normalized independently from its own pixel data with the
/// configured fallback statistics.
pub struct SemSegTestDataset {
    images: Vec<PathBuf>,
    data_len: usize,
    config: PipelineConfig,
}

impl SemSegTestDataset {
    pub fn new<P, Q>(image_dir: P, mask_dir: Q, config: PipelineConfig) -> DatasetResult<Self>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let pairs = collect_pairs(image_dir.as_ref(), mask_dir.as_ref())?;
        let data_len = pairs.len();
        let images = pairs.into_iter().map(|(image, _)| image).collect();

        Ok(Self {
            images,
            data_len,
            config,
        })
    }
}

impl Dataset<TestItem> for SemSegTestDataset {
    fn get(&self, index: usize) -> Option<TestItem> {
        if index >= self.data_len {
            return None;
        }
        let image_path = &self.images[index];
        let image = match image::open(image_path) {
            Ok(img) => img,
            Err(e) => {
                eprintln!("failed to open image {}: {e}", image_path.display());
                return None;
            }
        };

        let buf = GrayBuffer::from_dynamic(image);
        let PixelStats { mean, stdev } = self.config.fallback_stats;
        let crops = augmentation::crop_pad_test(&buf, self.config.in_size, self.config.out_size)
            .map(|crop| augmentation::normalize(crop, mean, stdev).into_raw());

        Some(TestItem {
            crops,
            height: self.config.out_size,
            width: self.config.out_size,
        })
    }

    fn len(&self) -> usize {
        self.data_len
    }
}

/// Batched training tensors.
#[derive(Debug, Clone)]
pub struct TrainBatch<B: Backend> {
    /// Images, `[B, 1, H, W]`.
    pub images: Tensor<B, 4>,
    /// Binary masks, `[B, 1, H, W]`.
    pub masks: Tensor<B, 4>,
}

/// Converts vectors of [`TrainItem`] into a [`TrainBatch`].
#[derive(Clone, Default)]
pub struct TrainBatcher<B: Backend> {
    _phantom: PhantomData<B>,
}

impl<B: Backend> TrainBatcher<B> {
    pub const fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<B: Backend> Batcher<B, TrainItem, TrainBatch<B>> for TrainBatcher<B> {
    fn batch(&self, items: Vec<TrainItem>, device: &B::Device) -> TrainBatch<B> {
        let batch_size = items.len();
        let mut images = Vec::with_capacity(batch_size);
        let mut masks = Vec::with_capacity(batch_size);

        for item in items {
            // [H, W] -> [1, H, W]; the singleton channel dimension comes first.
            let image = Tensor::<B, 2>::from_data(
                TensorData::new(item.image, [item.height, item.width]),
                device,
            )
            .unsqueeze::<3>();
            let mask = Tensor::<B, 2>::from_data(
                TensorData::new(item.mask, [item.height, item.width]),
                device,
            )
            .unsqueeze::<3>();

            images.push(image);
            masks.push(mask);
        }

        TrainBatch {
            images: Tensor::stack(images, 0),
            masks: Tensor::stack(masks, 0),
        }
    }
}

/// Batched test crops for tiled inference.
#[derive(Debug, Clone)]
pub struct TestBatch<B: Backend> {
    /// Crops, `[B * 4, 1, H, W]`; item `b`'s crops occupy rows `4b..4b + 4`
    /// in top-left, top-right, bottom-left, bottom-right order.
    pub crops: Tensor<B, 4>,
}

/// Converts vectors of [`TestItem`] into a [`TestBatch`].
#[derive(Clone, Default)]
pub struct TestBatcher<B: Backend> {
    _phantom: PhantomData<B>,
}

impl<B: Backend> TestBatcher<B> {
    pub const fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<B: Backend> Batcher<B, TestItem, TestBatch<B>> for TestBatcher<B> {
    fn batch(&self, items: Vec<TestItem>, device: &B::Device) -> TestBatch<B> {
        let mut crops = Vec::with_capacity(items.len() * 4);
        for item in items {
            for crop in item.crops {
                let tensor = Tensor::<B, 2>::from_data(
                    TensorData::new(crop, [item.height, item.width]),
                    device,
                )
                .unsqueeze::<3>();
                crops.push(tensor);
            }
        }

        TestBatch {
            crops: Tensor::stack(crops, 0),
        }
    }
}

/// Discover image/mask pairs from two directories.
///
/// Listings are sorted by filename and paired positionally; the mask listing
/// defines the dataset length, and trailing images without a mask are
/// ignored.
fn collect_pairs(image_dir: &Path, mask_dir: &Path) -> DatasetResult<Vec<(PathBuf, PathBuf)>> {
    if !image_dir.exists() {
        return Err(DatasetError::ImageDirectoryNotFound {
            path: image_dir.to_path_buf(),
        });
    }
    if !mask_dir.exists() {
        return Err(DatasetError::MaskDirectoryNotFound {
            path: mask_dir.to_path_buf(),
        });
    }

    let images = list_image_files(image_dir)?;
    let masks = list_image_files(mask_dir)?;

    if masks.is_empty() {
        return Err(DatasetError::NoMaskFiles {
            path: mask_dir.to_path_buf(),
        });
    }
    if images.len() < masks.len() {
        return Err(DatasetError::MissingImageForMask {
            image_count: images.len(),
            mask_count: masks.len(),
        });
    }

    Ok(images.into_iter().zip(masks).collect())
}

/// List the decodable image files in `dir`, sorted by filename.
///
/// Extensions are validated against the formats the `image` crate supports
/// rather than a hardcoded list.
pub(crate) fn list_image_files(dir: &Path) -> DatasetResult<Vec<PathBuf>> {
    let supported: Vec<&str> = ImageFormat::all()
        .flat_map(|format| format.extensions_str().iter().copied())
        .collect();

    let entries = fs::read_dir(dir).map_err(|source| DatasetError::DirectoryReadFailed {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| DatasetError::DirectoryReadFailed {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .is_some_and(|ext| supported.iter().any(|&s| s == ext));
        if matches {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}
