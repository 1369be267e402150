//! Flag dilation.
use crate::buffers::Mask2D;

/// Grow every flagged sample by `time_size` samples left and right and by
/// `frequency_size` samples up and down.
pub fn dilate_flags(mask: &mut Mask2D, time_size: usize, frequency_size: usize) {
    if time_size > 0 {
        for y in 0..mask.height() {
            let dilated = dilate_line(mask.row(y), time_size);
            mask.row_mut(y).copy_from_slice(&dilated);
        }
    }
    if frequency_size > 0 {
        for x in 0..mask.width() {
            let column: Vec<bool> = (0..mask.height()).map(|y| mask.value(x, y)).collect();
            for (y, flagged) in dilate_line(&column, frequency_size).into_iter().enumerate() {
                mask.set_value(x, y, flagged);
            }
        }
    }
}

/// `out[i]` is set when any of `line[i-size..=i+size]` is set.
fn dilate_line(line: &[bool], size: usize) -> Vec<bool> {
    // prefix[i] = number of flags in line[..i]
    let mut prefix = Vec::with_capacity(line.len() + 1);
    prefix.push(0usize);
    for &flag in line {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + flag as usize);
    }
    (0..line.len())
        .map(|i| {
            let start = i.saturating_sub(size);
            let end = (i + size + 1).min(line.len());
            prefix[end] > prefix[start]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dilation_grows_rectangle_around_flag() {
        let mut mask = Mask2D::new(7, 7);
        mask.set_value(3, 3, true);
        dilate_flags(&mut mask, 2, 1);
        assert_eq!(mask.count_flagged(), 5 * 3);
        assert!(mask.value(1, 2) && mask.value(5, 4));
        assert!(!mask.value(0, 3) && !mask.value(3, 1));
    }

    #[test]
    fn dilation_is_monotonic_in_radius() {
        let mut base = Mask2D::new(20, 10);
        for (x, y) in [(0, 0), (7, 3), (8, 3), (15, 9), (19, 5)] {
            base.set_value(x, y, true);
        }
        let mut previous = base.clone();
        for radius in 1..5 {
            let mut mask = base.clone();
            dilate_flags(&mut mask, radius, radius / 2);
            for y in 0..10 {
                for x in 0..20 {
                    assert!(!previous.value(x, y) || mask.value(x, y));
                }
            }
            assert!(mask.count_flagged() >= previous.count_flagged());
            previous = mask;
        }
    }

    #[test]
    fn zero_radius_is_identity() {
        let mut mask = Mask2D::new(4, 4);
        mask.set_value(1, 2, true);
        let before = mask.clone();
        dilate_flags(&mut mask, 0, 0);
        assert_eq!(mask, before);
    }
}
