//! Owned f32 time/frequency image with padded rows.
//!
//! Columns index time, rows index frequency. Every row occupies `stride`
//! elements so that rows start on an 8-float boundary; the padding is kept at
//! zero and is never read by the algorithms.
use ndarray::{Array2, ArrayView2};

use crate::prelude::{FlagError, FlagResult};

pub(crate) const STRIDE_ALIGNMENT: usize = 8;

pub(crate) fn aligned_stride(width: usize) -> usize {
    width.div_ceil(STRIDE_ALIGNMENT) * STRIDE_ALIGNMENT
}

#[derive(Clone, Debug, PartialEq)]
pub struct Image2D {
    width: usize,
    height: usize,
    stride: usize,
    data: Vec<f32>,
}

impl Image2D {
    /// Zero-initialized image of size `width × height`.
    pub fn new(width: usize, height: usize) -> Self {
        let stride = aligned_stride(width);
        Self {
            width,
            height,
            stride,
            data: vec![0.0; stride * height],
        }
    }

    /// Image with every logical sample set to `value`.
    pub fn with_value(width: usize, height: usize, value: f32) -> Self {
        let mut image = Self::new(width, height);
        for y in 0..height {
            image.row_mut(y).fill(value);
        }
        image
    }

    /// Build from an ndarray view shaped `(height, width)`.
    pub fn from_array(array: ArrayView2<'_, f32>) -> Self {
        let (height, width) = array.dim();
        let mut image = Self::new(width, height);
        for (y, row) in array.outer_iter().enumerate() {
            for (dst, &src) in image.row_mut(y).iter_mut().zip(row.iter()) {
                *dst = src;
            }
        }
        image
    }

    pub fn to_array(&self) -> Array2<f32> {
        Array2::from_shape_fn((self.height, self.width), |(y, x)| self.value(x, y))
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

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn same_dimensions(&self, other: &Image2D) -> bool {
        self.width == other.width && self.height == other.height
    }

    #[inline]
    pub fn value(&self, x: usize, y: usize) -> f32 {
        debug_assert!(x < self.width && y < self.height);
        self.data[y * self.stride + x]
    }

    #[inline]
    pub fn set_value(&mut self, x: usize, y: usize, value: f32) {
        debug_assert!(x < self.width && y < self.height);
        self.data[y * self.stride + x] = value;
    }

    #[inline]
    pub fn row(&self, y: usize) -> &[f32] {
        let start = y * self.stride;
        &self.data[start..start + self.width]
    }

    #[inline]
    pub fn row_mut(&mut self, y: usize) -> &mut [f32] {
        let start = y * self.stride;
        &mut self.data[start..start + self.width]
    }

    /// Whole padded buffer, `stride * height` elements.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Average groups of `factor` adjacent columns. A trailing group with
    /// fewer than `factor` columns is dropped.
    pub fn shrink_horizontally(&self, factor: usize) -> Image2D {
        let factor = factor.max(1);
        let new_width = self.width / factor;
        let mut out = Image2D::new(new_width, self.height);
        for y in 0..self.height {
            let src = self.row(y);
            for (x, dst) in out.row_mut(y).iter_mut().enumerate() {
                let group = &src[x * factor..(x + 1) * factor];
                *dst = group.iter().sum::<f32>() / factor as f32;
            }
        }
        out
    }

    /// Average groups of `factor` adjacent rows, dropping an incomplete
    /// trailing group.
    pub fn shrink_vertically(&self, factor: usize) -> Image2D {
        let factor = factor.max(1);
        let new_height = self.height / factor;
        let mut out = Image2D::new(self.width, new_height);
        for y in 0..new_height {
            for x in 0..self.width {
                let sum: f32 = (0..factor).map(|i| self.value(x, y * factor + i)).sum();
                out.set_value(x, y, sum / factor as f32);
            }
        }
        out
    }

    /// Replicate every column `factor` times into an image `new_width` wide.
    /// Columns beyond the replicated range repeat the last source column.
    pub fn enlarge_horizontally(&self, factor: usize, new_width: usize) -> Image2D {
        let factor = factor.max(1);
        let mut out = Image2D::new(new_width, self.height);
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

    pub fn enlarge_vertically(&self, factor: usize, new_height: usize) -> Image2D {
        let factor = factor.max(1);
        let mut out = Image2D::new(self.width, new_height);
        if self.height == 0 {
            return out;
        }
        for y in 0..new_height {
            let src_y = (y / factor).min(self.height - 1);
            out.row_mut(y).copy_from_slice(self.row(src_y));
        }
        out
    }

    /// Element-wise `self - other`.
    pub fn difference(&self, other: &Image2D) -> FlagResult<Image2D> {
        if !self.same_dimensions(other) {
            return Err(FlagError::invalid(format!(
                "cannot subtract {}x{} image from {}x{} image",
                other.width, other.height, self.width, self.height
            )));
        }
        let mut out = Image2D::new(self.width, self.height);
        for y in 0..self.height {
            let (lhs, rhs) = (self.row(y), other.row(y));
            for (x, dst) in out.row_mut(y).iter_mut().enumerate() {
                *dst = lhs[x] - rhs[x];
            }
        }
        Ok(out)
    }
}
