//! Per-directory pixel statistics used for input normalization.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    dataset::list_image_files,
    error::{DatasetError, DatasetResult},
};

/// Scalar mean and standard deviation of pixel intensities in `[0, 1]` scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelStats {
    pub mean: f32,
    pub stdev: f32,
}

/// Mean and population standard deviation across every image in `dir`.
///
/// Accumulates in `f64` over all pixels of all decodable files. A file that
/// fails to decode aborts the sweep with [`DatasetError::ImageOpenFailed`].
pub fn directory_stats<P: AsRef<Path>>(dir: P) -> DatasetResult<PixelStats> {
    let dir = dir.as_ref();
    let files = list_image_files(dir)?;
    if files.is_empty() {
        return Err(DatasetError::EmptyStatsDirectory {
            path: dir.to_path_buf(),
        });
    }

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut count = 0u64;
    for path in &files {
        let img = image::open(path).map_err(|source| DatasetError::ImageOpenFailed {
            path: path.clone(),
            source,
        })?;
        let luma = img.to_luma32f();
        for &v in luma.as_raw() {
            let v = f64::from(v);
            sum += v;
            sum_sq += v * v;
            count += 1;
        }
    }

    let n = count as f64;
    let mean = sum / n;
    let variance = (sum_sq / n - mean * mean).max(0.0);
    Ok(PixelStats {
        mean: mean as f32,
        stdev: variance.sqrt() as f32,
    })
}
