use std::sync::Arc;

use ndarray::{Array2, ArrayView2};

use crate::buffers::Image2D;
use crate::prelude::{FlagError, FlagResult};

/// The buffers of one baseline handed to [`Flagger::run`](super::Flagger::run):
/// 1 amplitude image, or 2, 4 or 8 images of real/imaginary pairs.
#[derive(Debug, Clone)]
pub struct ImageSet {
    images: Vec<Arc<Image2D>>,
}

impl ImageSet {
    pub(crate) fn new(width: usize, height: usize, count: usize, value: f32) -> FlagResult<Self> {
        if !matches!(count, 1 | 2 | 4 | 8) {
            return Err(FlagError::invalid(format!(
                "invalid image count {count}; should be 1, 2, 4 or 8"
            )));
        }
        let image = Arc::new(Image2D::with_value(width, height, value));
        Ok(Self {
            images: vec![image; count],
        })
    }

    pub fn width(&self) -> usize {
        self.images[0].width()
    }

    pub fn height(&self) -> usize {
        self.images[0].height()
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Floats between the starts of two consecutive channel rows.
    pub fn horizontal_stride(&self) -> usize {
        self.images[0].stride()
    }

    pub fn image(&self, index: usize) -> FlagResult<&Image2D> {
        self.images
            .get(index)
            .map(Arc::as_ref)
            .ok_or_else(|| FlagError::invalid(format!("image index {index} out of range")))
    }

    pub fn image_buffer(&self, index: usize) -> FlagResult<&[f32]> {
        Ok(self.image(index)?.data())
    }

    pub fn image_buffer_mut(&mut self, index: usize) -> FlagResult<&mut [f32]> {
        let image = self
            .images
            .get_mut(index)
            .ok_or_else(|| FlagError::invalid(format!("image index {index} out of range")))?;
        Ok(Arc::make_mut(image).data_mut())
    }

    /// Replace image `index` by `array`, shaped `(height, width)`.
    pub fn set_image_from_array(&mut self, index: usize, array: ArrayView2<'_, f32>) -> FlagResult<()> {
        if array.dim() != (self.height(), self.width()) {
            return Err(FlagError::invalid(format!(
                "array of {:?} does not fit images of {}x{}",
                array.dim(),
                self.width(),
                self.height()
            )));
        }
        let slot = self
            .images
            .get_mut(index)
            .ok_or_else(|| FlagError::invalid(format!("image index {index} out of range")))?;
        *slot = Arc::new(Image2D::from_array(array));
        Ok(())
    }

    pub fn image_to_array(&self, index: usize) -> FlagResult<Array2<f32>> {
        Ok(self.image(index)?.to_array())
    }

    /// Shared handles to every image, in order.
    pub(crate) fn images(&self) -> Vec<Arc<Image2D>> {
        self.images.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_padded_to_the_stride() {
        let set = ImageSet::new(5, 3, 2, 0.0).unwrap();
        assert_eq!(set.horizontal_stride(), 8);
        assert_eq!(set.image_buffer(1).unwrap().len(), 24);
    }

    #[test]
    fn writes_touch_one_image_only() {
        let mut set = ImageSet::new(2, 2, 4, 1.0).unwrap();
        set.image_buffer_mut(2).unwrap()[0] = 7.0;
        assert_eq!(set.image(2).unwrap().value(0, 0), 7.0);
        assert_eq!(set.image(1).unwrap().value(0, 0), 1.0);
        assert!(set.image_buffer(8).is_err());
    }

    #[test]
    fn arrays_load_into_one_slot() {
        let mut set = ImageSet::new(3, 2, 2, 0.0).unwrap();
        let array = ndarray::array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        set.set_image_from_array(1, array.view()).unwrap();
        assert_eq!(set.image(1).unwrap().value(2, 1), 6.0);
        assert_eq!(set.image_to_array(1).unwrap(), array);
        assert!(set.set_image_from_array(0, array.t()).is_err());
    }

    #[test]
    fn unsupported_counts_are_rejected() {
        for count in [0, 3, 5, 16] {
            assert!(ImageSet::new(4, 4, count, 0.0).is_err());
        }
    }
}
