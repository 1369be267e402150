pub mod flagger;
pub mod image_set;
pub mod quality;

pub use flagger::{FlagMask, Flagger};
pub use image_set::ImageSet;
pub use quality::QualityStatistics;
