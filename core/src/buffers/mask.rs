//! Boolean flag mask sharing the row layout of [`Image2D`](super::Image2D).
use crate::buffers::image::aligned_stride;
use crate::buffers::Image2D;
use crate::prelude::{FlagError, FlagResult};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mask2D {
    width: usize,
    height: usize,
    stride: usize,
    data: Vec<bool>,
}

impl Mask2D {
    /// Mask with every sample unflagged.
    pub fn new(width: usize, height: usize) -> Self {
        let stride = aligned_stride(width);
        Self {
            width,
            height,
            stride,
            data: vec![false; stride * height],
        }
    }

    pub fn with_value(width: usize, height: usize, value: bool) -> Self {
        let mut mask = Self::new(width, height);
        if value {
            for y in 0..height {
                mask.row_mut(y).fill(true);
            }
        }
        mask
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn matches(&self, image: &Image2D) -> bool {
        self.width == image.width() && self.height == image.height()
    }

    pub fn same_dimensions(&self, other: &Mask2D) -> bool {
        self.width == other.width && self.height == other.height
    }

    #[inline]
    pub fn value(&self, x: usize, y: usize) -> bool {
        debug_assert!(x < self.width && y < self.height);
        self.data[y * self.stride + x]
    }

    #[inline]
    pub fn set_value(&mut self, x: usize, y: usize, value: bool) {
        debug_assert!(x < self.width && y < self.height);
        self.data[y * self.stride + x] = value;
    }

    #[inline]
    pub fn row(&self, y: usize) -> &[bool] {
        let start = y * self.stride;
        &self.data[start..start + self.width]
    }

    #[inline]
    pub fn row_mut(&mut self, y: usize) -> &mut [bool] {
        let start = y * self.stride;
        &mut self.data[start..start + self.width]
    }

    /// Whole padded buffer, `stride * height` elements.
    pub fn data(&self) -> &[bool] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [bool] {
        &mut self.data
    }

    fn check_dimensions(&self, other: &Mask2D, operation: &str) -> FlagResult<()> {
        if self.same_dimensions(other) {
            Ok(())
        } else {
            Err(FlagError::invalid(format!(
                "{operation}: mask is {}x{} but the other mask is {}x{}",
                self.width, self.height, other.width, other.height
            )))
        }
    }

    /// Fails unless the mask has the geometry of `image`.
    pub fn check_fits(&self, image: &Image2D, operation: &str) -> FlagResult<()> {
        if self.matches(image) {
            Ok(())
        } else {
            Err(FlagError::invalid(format!(
                "{operation}: mask is {}x{} but image is {}x{}",
                self.width,
                self.height,
                image.width(),
                image.height()
            )))
        }
    }

    /// In-place logical OR.
    pub fn join(&mut self, other: &Mask2D) -> FlagResult<()> {
        self.check_dimensions(other, "join")?;
        for (dst, &src) in self.data.iter_mut().zip(other.data.iter()) {
            *dst |= src;
        }
        Ok(())
    }

    /// In-place logical AND.
    pub fn intersect(&mut self, other: &Mask2D) -> FlagResult<()> {
        self.check_dimensions(other, "intersect")?;
        for (dst, &src) in self.data.iter_mut().zip(other.data.iter()) {
            *dst &= src;
        }
        Ok(())
    }

    pub fn invert(&mut self) {
        for y in 0..self.height {
            for flag in self.row_mut(y) {
                *flag = !*flag;
            }
        }
    }

    pub fn count_flagged(&self) -> usize {
        (0..self.height)
            .map(|y| self.row(y).iter().filter(|&&flag| flag).count())
            .sum()
    }

    pub fn is_clear(&self) -> bool {
        self.count_flagged() == 0
    }

    /// OR-reduce groups of `factor` adjacent columns, dropping an incomplete
    /// trailing group.
    pub fn shrink_horizontally(&self, factor: usize) -> Mask2D {
        let factor = factor.max(1);
        let mut out = Mask2D::new(self.width / factor, self.height);
        for y in 0..self.height {
            let src = self.row(y);
            for (x, dst) in out.row_mut(y).iter_mut().enumerate() {
                *dst = src[x * factor..(x + 1) * factor].iter().any(|&flag| flag);
            }
        }
        out
    }

    pub fn shrink_vertically(&self, factor: usize) -> Mask2D {
        let factor = factor.max(1);
        let new_height = self.height / factor;
        let mut out = Mask2D::new(self.width, new_height);
        for y in 0..new_height {
            for x in 0..self.width {
                let flagged = (0..factor).any(|i| self.value(x, y * factor + i));
                out.set_value(x, y, flagged);
            }
        }
        out
    }

    pub fn enlarge_horizontally(&self, factor: usize, new_width: usize) -> Mask2D {
        let factor = factor.max(1);
        let mut out = Mask2D::new(new_width, self.height);
        if self.width == 0 {
            return out;
        }
        for y in 0..self.height {
            let src = self.row(y);
            for (x, dst) in out.row_mut(y).iter_mut().enumerate() {
                *dst = src[(x / factor).min(self.width - 1)];
            }
        }
        out
    }

    pub fn enlarge_vertically(&self, factor: usize, new_height: usize) -> Mask2D {
        let factor = factor.max(1);
        let mut out = Mask2D::new(self.width, new_height);
        if self.height == 0 {
            return out;
        }
        for y in 0..new_height {
            let src_y = (y / factor).min(self.height - 1);
            out.row_mut(y).copy_from_slice(self.row(src_y));
        }
        out
    }
}
