//! Error types for dataset construction and statistics.

use std::path::PathBuf;

use thiserror::Error;

/// Error type for dataset operations.
///
/// Covers directory discovery, image/mask pairing, and the statistics sweep
/// performed at dataset construction.
#[derive(Error, Debug)]
pub enum DatasetError {
    /// The image directory does not exist.
    #[error("image directory not found: {path}")]
    ImageDirectoryNotFound {
        /// The expected image directory path.
        path: PathBuf,
    },

    /// The mask directory does not exist.
    #[error("mask directory not found: {path}")]
    MaskDirectoryNotFound {
        /// The expected mask directory path.
        path: PathBuf,
    },

    /// Reading a directory listing failed.
    #[error("failed to read directory: {path}")]
    DirectoryReadFailed {
        /// The directory that failed to read.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// No mask files were discovered, so the dataset has no length.
    #[error("no mask files found in: {path}")]
    NoMaskFiles {
        /// The mask directory that came up empty.
        path: PathBuf,
    },

    /// The mask listing is longer than the image listing, leaving trailing
    /// masks without a positional partner.
    #[error("found {mask_count} masks but only {image_count} images; pairing is positional")]
    MissingImageForMask {
        /// Number of discovered image files.
        image_count: usize,
        /// Number of discovered mask files.
        mask_count: usize,
    },

    /// Opening or decoding an image file failed.
    #[error("failed to open image: {path}")]
    ImageOpenFailed {
        /// The file that failed to decode.
        path: PathBuf,
        /// The underlying decoder error.
        #[source]
        source: image::ImageError,
    },

    /// The statistics sweep found no decodable images.
    #[error("no images to compute statistics from in: {path}")]
    EmptyStatsDirectory {
        /// The directory the sweep ran over.
        path: PathBuf,
    },
}

/// A specialized `Result` type for dataset operations.
pub type DatasetResult<T> = Result<T, DatasetError>;
