//! Polarization/complex-component bundle of images and masks.
//!
//! Buffers are held in `Arc`s: narrowing to one polarization or one complex
//! component shares the underlying images, and mutation goes through
//! `Arc::make_mut` so a copy is made only when a buffer is shared.
use std::sync::Arc;

use num_complex::Complex32;
use serde::{Deserialize, Serialize};

use crate::buffers::{Image2D, Mask2D};
use crate::prelude::{FlagError, FlagResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Polarization {
    Single,
    XX,
    XY,
    YX,
    YY,
}

/// Which view of the complex visibilities the images carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Representation {
    Amplitude,
    Phase,
    Real,
    Imaginary,
    Complex,
}

impl Representation {
    pub fn images_per_polarization(self) -> usize {
        match self {
            Representation::Complex => 2,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone)]
struct PolarizationData {
    polarization: Polarization,
    images: Vec<Arc<Image2D>>,
    mask: Option<Arc<Mask2D>>,
}

#[derive(Debug, Clone)]
pub struct TimeFrequencyData {
    representation: Representation,
    polarizations: Vec<PolarizationData>,
}

impl TimeFrequencyData {
    /// Validated constructor: `images` holds the images of every polarization
    /// in order (real before imaginary for complex data).
    pub fn new(
        representation: Representation,
        polarizations: &[Polarization],
        images: Vec<Arc<Image2D>>,
    ) -> FlagResult<Self> {
        if !matches!(polarizations.len(), 1 | 2 | 4) {
            return Err(FlagError::invalid(format!(
                "{} polarizations is not a supported layout",
                polarizations.len()
            )));
        }
        let per = representation.images_per_polarization();
        if images.len() != polarizations.len() * per {
            return Err(FlagError::invalid(format!(
                "{:?} data with {} polarizations needs {} images, got {}",
                representation,
                polarizations.len(),
                polarizations.len() * per,
                images.len()
            )));
        }
        if let Some(pair) = images.windows(2).find(|pair| !pair[0].same_dimensions(&pair[1])) {
            return Err(FlagError::invalid(format!(
                "images of one data set differ in size: {}x{} vs {}x{}",
                pair[0].width(),
                pair[0].height(),
                pair[1].width(),
                pair[1].height()
            )));
        }
        let mut images = images.into_iter();
        let polarizations = polarizations
            .iter()
            .map(|&polarization| PolarizationData {
                polarization,
                images: images.by_ref().take(per).collect(),
                mask: None,
            })
            .collect();
        Ok(Self {
            representation,
            polarizations,
        })
    }

    /// Maps an image count onto the four supported layouts: 1 amplitude
    /// image, 2 complex images, 4 complex images of XX/YY or 8 complex
    /// images of XX/XY/YX/YY.
    pub fn from_image_count(images: Vec<Arc<Image2D>>) -> FlagResult<Self> {
        use Polarization::*;
        match images.len() {
            1 => Self::new(Representation::Amplitude, &[Single], images),
            2 => Self::new(Representation::Complex, &[Single], images),
            4 => Self::new(Representation::Complex, &[XX, YY], images),
            8 => Self::new(Representation::Complex, &[XX, XY, YX, YY], images),
            count => Err(FlagError::invalid(format!(
                "invalid image count {count}; should be 1, 2, 4 or 8"
            ))),
        }
    }

    /// Same layout, every image replaced by zeros, masks copied.
    pub fn zeroed_like(&self) -> Self {
        let zero = Arc::new(Image2D::new(self.width(), self.height()));
        let mut out = self.clone();
        for pol in &mut out.polarizations {
            for image in &mut pol.images {
                *image = Arc::clone(&zero);
            }
        }
        out
    }

    pub fn representation(&self) -> Representation {
        self.representation
    }

    pub fn is_complex(&self) -> bool {
        self.representation == Representation::Complex
    }

    pub fn polarization_count(&self) -> usize {
        self.polarizations.len()
    }

    pub fn polarizations(&self) -> Vec<Polarization> {
        self.polarizations.iter().map(|p| p.polarization).collect()
    }

    pub fn image_count(&self) -> usize {
        self.polarizations.iter().map(|p| p.images.len()).sum()
    }

    pub fn width(&self) -> usize {
        self.polarizations[0].images[0].width()
    }

    pub fn height(&self) -> usize {
        self.polarizations[0].images[0].height()
    }

    fn locate(&self, index: usize) -> FlagResult<(usize, usize)> {
        let per = self.representation.images_per_polarization();
        if index >= self.image_count() {
            return Err(FlagError::invalid(format!(
                "image index {index} out of range for {} images",
                self.image_count()
            )));
        }
        Ok((index / per, index % per))
    }

    pub fn image(&self, index: usize) -> FlagResult<&Arc<Image2D>> {
        let (p, k) = self.locate(index)?;
        Ok(&self.polarizations[p].images[k])
    }

    /// Exclusive access to one image, copying it first if it is shared.
    pub fn image_mut(&mut self, index: usize) -> FlagResult<&mut Image2D> {
        let (p, k) = self.locate(index)?;
        Ok(Arc::make_mut(&mut self.polarizations[p].images[k]))
    }

    pub fn set_image(&mut self, index: usize, image: Arc<Image2D>) -> FlagResult<()> {
        if image.width() != self.width() || image.height() != self.height() {
            return Err(FlagError::invalid(format!(
                "replacement image is {}x{} but the data set is {}x{}",
                image.width(),
                image.height(),
                self.width(),
                self.height()
            )));
        }
        let (p, k) = self.locate(index)?;
        self.polarizations[p].images[k] = image;
        Ok(())
    }

    /// The one image of a single-polarization, non-complex view.
    pub fn sole_image(&self) -> FlagResult<&Arc<Image2D>> {
        if self.image_count() != 1 {
            return Err(FlagError::inconsistent(format!(
                "operation requires a single image, data holds {} ({:?}, {} polarizations)",
                self.image_count(),
                self.representation,
                self.polarization_count()
            )));
        }
        Ok(&self.polarizations[0].images[0])
    }

    pub fn sole_image_mut(&mut self) -> FlagResult<&mut Image2D> {
        self.sole_image()?;
        self.image_mut(0)
    }

    /// One amplitude-like image summarizing all polarizations: the image itself
    /// for a single non-complex view, otherwise the mean amplitude over
    /// polarizations.
    pub fn single_image(&self) -> Arc<Image2D> {
        if self.image_count() == 1 {
            return Arc::clone(&self.polarizations[0].images[0]);
        }
        let mut out = Image2D::new(self.width(), self.height());
        let count = self.polarizations.len() as f32;
        for pol in &self.polarizations {
            let amplitude = self.component_of(pol, Representation::Amplitude);
            for y in 0..out.height() {
                let src = amplitude.row(y);
                for (dst, &v) in out.row_mut(y).iter_mut().zip(src) {
                    *dst += v / count;
                }
            }
        }
        Arc::new(out)
    }

    fn component_of(&self, pol: &PolarizationData, target: Representation) -> Arc<Image2D> {
        if self.representation != Representation::Complex {
            return Arc::clone(&pol.images[0]);
        }
        let (re, im) = (&pol.images[0], &pol.images[1]);
        match target {
            Representation::Real => Arc::clone(re),
            Representation::Imaginary => Arc::clone(im),
            Representation::Amplitude | Representation::Phase | Representation::Complex => {
                let mut out = Image2D::new(re.width(), re.height());
                for y in 0..re.height() {
                    let (re_row, im_row) = (re.row(y), im.row(y));
                    for (x, dst) in out.row_mut(y).iter_mut().enumerate() {
                        let value = Complex32::new(re_row[x], im_row[x]);
                        *dst = if target == Representation::Phase {
                            value.arg()
                        } else {
                            value.norm()
                        };
                    }
                }
                Arc::new(out)
            }
        }
    }

    /// View of the data as `target`. Complex data can be turned into any
    /// single component; non-complex data only into its own representation.
    pub fn make_representation(&self, target: Representation) -> FlagResult<Self> {
        if target == self.representation {
            return Ok(self.clone());
        }
        if self.representation != Representation::Complex || target == Representation::Complex {
            return Err(FlagError::inconsistent(format!(
                "cannot convert {:?} data to {:?}",
                self.representation, target
            )));
        }
        let polarizations = self
            .polarizations
            .iter()
            .map(|pol| PolarizationData {
                polarization: pol.polarization,
                images: vec![self.component_of(pol, target)],
                mask: pol.mask.clone(),
            })
            .collect();
        Ok(Self {
            representation: target,
            polarizations,
        })
    }

    /// Rescale complex samples so that their amplitude equals `amplitude`
    /// while keeping their phase. Zero samples take the new amplitude on the
    /// real axis.
    pub fn restore_from_amplitude(&mut self, amplitude: &TimeFrequencyData) -> FlagResult<()> {
        if !self.is_complex()
            || amplitude.representation != Representation::Amplitude
            || amplitude.polarization_count() != self.polarization_count()
        {
            return Err(FlagError::inconsistent(
                "amplitude restore needs complex data and a matching amplitude view",
            ));
        }
        for (pol, source) in self.polarizations.iter_mut().zip(&amplitude.polarizations) {
            let target = &source.images[0];
            let (re_slot, im_slot) = pol.images.split_at_mut(1);
            let re = Arc::make_mut(&mut re_slot[0]);
            let im = Arc::make_mut(&mut im_slot[0]);
            for y in 0..re.height() {
                let target_row = target.row(y);
                let (re_row, im_row) = (re.row_mut(y), im.row_mut(y));
                for x in 0..target_row.len() {
                    let norm = Complex32::new(re_row[x], im_row[x]).norm();
                    if norm > 0.0 {
                        let scale = target_row[x] / norm;
                        re_row[x] *= scale;
                        im_row[x] *= scale;
                    } else {
                        re_row[x] = target_row[x];
                        im_row[x] = 0.0;
                    }
                }
            }
        }
        Ok(())
    }

    /// Narrow to polarization `index`, sharing buffers.
    pub fn polarization_data(&self, index: usize) -> FlagResult<Self> {
        let pol = self.polarizations.get(index).ok_or_else(|| {
            FlagError::invalid(format!("polarization {index} out of range"))
        })?;
        Ok(Self {
            representation: self.representation,
            polarizations: vec![pol.clone()],
        })
    }

    /// Write a single-polarization view back into slot `index`.
    pub fn set_polarization_data(&mut self, index: usize, data: &TimeFrequencyData) -> FlagResult<()> {
        if data.polarization_count() != 1 || data.representation != self.representation {
            return Err(FlagError::inconsistent(format!(
                "cannot store {:?} data with {} polarizations into a {:?} polarization slot",
                data.representation,
                data.polarization_count(),
                self.representation
            )));
        }
        let slot = self.polarizations.get_mut(index).ok_or_else(|| {
            FlagError::invalid(format!("polarization {index} out of range"))
        })?;
        let polarization = slot.polarization;
        *slot = data.polarizations[0].clone();
        slot.polarization = polarization;
        Ok(())
    }

    /// Same representation, polarization count and image size.
    pub fn is_layout_compatible(&self, other: &TimeFrequencyData) -> bool {
        self.representation == other.representation
            && self.polarization_count() == other.polarization_count()
            && self.width() == other.width()
            && self.height() == other.height()
    }

    /// Replace all images by those of `other`, keeping this data's masks.
    pub fn set_images_from(&mut self, other: &TimeFrequencyData) -> FlagResult<()> {
        if !self.is_layout_compatible(other) {
            return Err(FlagError::inconsistent(
                "image source has an incompatible layout",
            ));
        }
        for (dst, src) in self.polarizations.iter_mut().zip(&other.polarizations) {
            dst.images = src.images.clone();
        }
        Ok(())
    }

    /// Image-wise `self - other`; masks are taken from `self`.
    pub fn difference(&self, other: &TimeFrequencyData) -> FlagResult<Self> {
        if self.image_count() != other.image_count() {
            return Err(FlagError::inconsistent(format!(
                "cannot subtract data with {} images from data with {} images",
                other.image_count(),
                self.image_count()
            )));
        }
        let mut out = self.clone();
        for (dst, src) in out.polarizations.iter_mut().zip(&other.polarizations) {
            for (image, rhs) in dst.images.iter_mut().zip(&src.images) {
                *image = Arc::new(image.difference(rhs)?);
            }
        }
        Ok(out)
    }

    /// Apply `image_op`/`mask_op` to every buffer, producing new data.
    fn map_buffers(
        &self,
        image_op: impl Fn(&Image2D) -> Image2D,
        mask_op: impl Fn(&Mask2D) -> Mask2D,
    ) -> Self {
        let polarizations = self
            .polarizations
            .iter()
            .map(|pol| PolarizationData {
                polarization: pol.polarization,
                images: pol.images.iter().map(|i| Arc::new(image_op(i))).collect(),
                mask: pol.mask.as_ref().map(|m| Arc::new(mask_op(m))),
            })
            .collect();
        Self {
            representation: self.representation,
            polarizations,
        }
    }

    /// Reduce resolution: images average, masks OR-reduce.
    pub fn shrink(&self, time_factor: usize, frequency_factor: usize) -> Self {
        self.map_buffers(
            |image| {
                image
                    .shrink_horizontally(time_factor)
                    .shrink_vertically(frequency_factor)
            },
            |mask| {
                mask.shrink_horizontally(time_factor)
                    .shrink_vertically(frequency_factor)
            },
        )
    }

    /// Inverse of [`shrink`](Self::shrink) onto a `width × height` grid.
    pub fn enlarge(&self, time_factor: usize, frequency_factor: usize, width: usize, height: usize) -> Self {
        self.map_buffers(
            |image| {
                image
                    .enlarge_horizontally(time_factor, width)
                    .enlarge_vertically(frequency_factor, height)
            },
            |mask| {
                mask.enlarge_horizontally(time_factor, width)
                    .enlarge_vertically(frequency_factor, height)
            },
        )
    }

    fn check_mask(&self, mask: &Mask2D) -> FlagResult<()> {
        if mask.width() == self.width() && mask.height() == self.height() {
            Ok(())
        } else {
            Err(FlagError::invalid(format!(
                "mask of {}x{} does not fit data of {}x{}",
                mask.width(),
                mask.height(),
                self.width(),
                self.height()
            )))
        }
    }

    pub fn mask(&self, polarization: usize) -> Option<&Arc<Mask2D>> {
        self.polarizations.get(polarization)?.mask.as_ref()
    }

    /// Exclusive access to the mask of a polarization, creating an
    /// unflagged one if it has none.
    pub fn mask_mut(&mut self, polarization: usize) -> FlagResult<&mut Mask2D> {
        let (width, height) = (self.width(), self.height());
        let pol = self.polarizations.get_mut(polarization).ok_or_else(|| {
            FlagError::invalid(format!("polarization {polarization} out of range"))
        })?;
        let mask = pol
            .mask
            .get_or_insert_with(|| Arc::new(Mask2D::new(width, height)));
        Ok(Arc::make_mut(mask))
    }

    /// Share one mask between every polarization.
    pub fn set_global_mask(&mut self, mask: Arc<Mask2D>) -> FlagResult<()> {
        self.check_mask(&mask)?;
        for pol in &mut self.polarizations {
            pol.mask = Some(Arc::clone(&mask));
        }
        Ok(())
    }

    pub fn set_polarization_mask(&mut self, polarization: usize, mask: Arc<Mask2D>) -> FlagResult<()> {
        self.check_mask(&mask)?;
        let pol = self.polarizations.get_mut(polarization).ok_or_else(|| {
            FlagError::invalid(format!("polarization {polarization} out of range"))
        })?;
        pol.mask = Some(mask);
        Ok(())
    }

    pub fn set_masks_to_value(&mut self, value: bool) {
        let mask = Arc::new(Mask2D::with_value(self.width(), self.height(), value));
        for pol in &mut self.polarizations {
            pol.mask = Some(Arc::clone(&mask));
        }
    }

    /// Take the masks of `other`: per polarization when the counts agree,
    /// otherwise its combined mask for every polarization.
    pub fn copy_masks_from(&mut self, other: &TimeFrequencyData) -> FlagResult<()> {
        if other.polarization_count() == self.polarization_count() {
            for (index, src) in other.polarizations.iter().enumerate() {
                match &src.mask {
                    Some(mask) => self.set_polarization_mask(index, Arc::clone(mask))?,
                    None => self.polarizations[index].mask = None,
                }
            }
            Ok(())
        } else {
            self.set_global_mask(Arc::new(other.single_mask()))
        }
    }

    /// OR the masks of `other` into this data's masks.
    pub fn join_mask(&mut self, other: &TimeFrequencyData) -> FlagResult<()> {
        if other.polarization_count() == self.polarization_count() {
            for index in 0..self.polarization_count() {
                if let Some(mask) = other.mask(index).cloned() {
                    self.mask_mut(index)?.join(&mask)?;
                }
            }
        } else {
            let combined = other.single_mask();
            for index in 0..self.polarization_count() {
                self.mask_mut(index)?.join(&combined)?;
            }
        }
        Ok(())
    }

    /// AND the masks of `other` into this data's masks. A missing mask counts
    /// as unflagged.
    pub fn intersect_mask(&mut self, other: &TimeFrequencyData) -> FlagResult<()> {
        let same_layout = other.polarization_count() == self.polarization_count();
        let combined = other.single_mask();
        let clear = Mask2D::new(other.width(), other.height());
        for index in 0..self.polarization_count() {
            let rhs: &Mask2D = if same_layout {
                other.mask(index).map(|m| m.as_ref()).unwrap_or(&clear)
            } else {
                &combined
            };
            self.mask_mut(index)?.intersect(rhs)?;
        }
        Ok(())
    }

    /// OR of every polarization mask; unflagged when there are none.
    pub fn single_mask(&self) -> Mask2D {
        let mut out = Mask2D::new(self.width(), self.height());
        for mask in self.polarizations.iter().filter_map(|p| p.mask.as_ref()) {
            for y in 0..out.height() {
                for (dst, &src) in out.row_mut(y).iter_mut().zip(mask.row(y)) {
                    *dst |= src;
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(value: f32) -> Arc<Image2D> {
        Arc::new(Image2D::with_value(4, 3, value))
    }

    #[test]
    fn image_counts_map_to_layouts() {
        for count in [1usize, 2, 4, 8] {
            let data = TimeFrequencyData::from_image_count(vec![image(0.0); count]).unwrap();
            assert_eq!(data.image_count(), count);
        }
        assert!(TimeFrequencyData::from_image_count(vec![image(0.0); 3]).is_err());
        let quad = TimeFrequencyData::from_image_count(vec![image(0.0); 8]).unwrap();
        assert_eq!(
            quad.polarizations(),
            vec![Polarization::XX, Polarization::XY, Polarization::YX, Polarization::YY]
        );
    }

    #[test]
    fn amplitude_of_complex_data() {
        let data = TimeFrequencyData::from_image_count(vec![image(3.0), image(4.0)]).unwrap();
        let amplitude = data.make_representation(Representation::Amplitude).unwrap();
        assert_eq!(amplitude.sole_image().unwrap().value(1, 1), 5.0);
        assert!(amplitude
            .make_representation(Representation::Real)
            .is_err());
    }

    #[test]
    fn image_mut_copies_shared_buffers() {
        let shared = image(1.0);
        let mut data = TimeFrequencyData::from_image_count(vec![Arc::clone(&shared)]).unwrap();
        data.image_mut(0).unwrap().set_value(0, 0, 9.0);
        assert_eq!(shared.value(0, 0), 1.0);
        assert_eq!(data.image(0).unwrap().value(0, 0), 9.0);
    }

    #[test]
    fn polarization_narrowing_round_trips_masks() {
        let mut data = TimeFrequencyData::from_image_count(vec![image(1.0); 4]).unwrap();
        let mut yy = data.polarization_data(1).unwrap();
        yy.mask_mut(0).unwrap().set_value(2, 2, true);
        data.set_polarization_data(1, &yy).unwrap();
        assert!(data.mask(0).is_none());
        assert!(data.mask(1).unwrap().value(2, 2));
        assert_eq!(data.single_mask().count_flagged(), 1);
        assert_eq!(data.polarizations()[1], Polarization::YY);
    }

    #[test]
    fn global_mask_must_match_geometry() {
        let mut data = TimeFrequencyData::from_image_count(vec![image(1.0)]).unwrap();
        assert!(data.set_global_mask(Arc::new(Mask2D::new(5, 3))).is_err());
    }

    #[test]
    fn restore_from_amplitude_keeps_phase() {
        let mut data = TimeFrequencyData::from_image_count(vec![image(3.0), image(4.0)]).unwrap();
        let mut amplitude = data.make_representation(Representation::Amplitude).unwrap();
        amplitude.sole_image_mut().unwrap().set_value(0, 0, 10.0);
        data.restore_from_amplitude(&amplitude).unwrap();
        assert!((data.image(0).unwrap().value(0, 0) - 6.0).abs() < 1e-5);
        assert!((data.image(1).unwrap().value(0, 0) - 8.0).abs() < 1e-5);
        assert!((data.image(0).unwrap().value(1, 0) - 3.0).abs() < 1e-5);
    }
}
