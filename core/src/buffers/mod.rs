pub mod image;
pub mod mask;

pub use image::Image2D;
pub use mask::Mask2D;
