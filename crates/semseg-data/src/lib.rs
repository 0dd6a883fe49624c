pub mod augmentation;
pub mod buffer;
pub mod dataset;
pub mod elastic;
pub mod error;
pub mod stats;

// Re-export commonly used types
pub use augmentation::{
    AugmentationConfig, AugmentationTrace, FlipMode, NoiseKind, PairAugmentor,
};
pub use buffer::GrayBuffer;
pub use dataset::{
    PipelineConfig, SemSegTestDataset, SemSegTrainDataset, TestBatch, TestBatcher, TestItem,
    TrainBatch, TrainBatcher, TrainItem,
};
pub use elastic::elastic_transform;
pub use error::{DatasetError, DatasetResult};
pub use stats::{directory_stats, PixelStats};
