//! Scale-invariant rank (SIR) operator.
//!
//! A sample ends up flagged when some window containing it has at most a
//! fraction `eta` of unflagged samples. Weighting flagged samples with `eta`
//! and unflagged ones with `eta - 1`, that is a window with non-negative
//! sum, so the whole line is resolved with one prefix-minimum and one
//! suffix-maximum over the cumulative sum.
use crate::buffers::Mask2D;

pub fn operate_horizontally(mask: &mut Mask2D, eta: f64) {
    for y in 0..mask.height() {
        let result = operate_line(mask.row(y), eta);
        mask.row_mut(y).copy_from_slice(&result);
    }
}

pub fn operate_vertically(mask: &mut Mask2D, eta: f64) {
    for x in 0..mask.width() {
        let column: Vec<bool> = (0..mask.height()).map(|y| mask.value(x, y)).collect();
        for (y, flagged) in operate_line(&column, eta).into_iter().enumerate() {
            mask.set_value(x, y, flagged);
        }
    }
}

pub fn operate_line(line: &[bool], eta: f64) -> Vec<bool> {
    let eta = eta.clamp(0.0, 1.0);
    let n = line.len();
    let mut cumulative = Vec::with_capacity(n + 1);
    cumulative.push(0.0f64);
    for &flag in line {
        let last = cumulative[cumulative.len() - 1];
        cumulative.push(last + if flag { eta } else { eta - 1.0 });
    }

    // lowest cumulative value at or before each window start
    let mut prefix_min = Vec::with_capacity(n);
    let mut low = f64::INFINITY;
    for &value in &cumulative[..n] {
        low = low.min(value);
        prefix_min.push(low);
    }
    // highest cumulative value after each window end
    let mut suffix_max = vec![f64::NEG_INFINITY; n];
    let mut high = f64::NEG_INFINITY;
    for i in (0..n).rev() {
        high = high.max(cumulative[i + 1]);
        suffix_max[i] = high;
    }

    (0..n).map(|i| suffix_max[i] >= prefix_min[i]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(pattern: &str) -> Vec<bool> {
        pattern.chars().map(|c| c == 'x').collect()
    }

    fn render(flags: &[bool]) -> String {
        flags.iter().map(|&f| if f { 'x' } else { '.' }).collect()
    }

    #[test]
    fn zero_eta_is_identity() {
        let input = line("..x.xx...x");
        assert_eq!(operate_line(&input, 0.0), input);
    }

    #[test]
    fn fills_small_gap_between_runs() {
        // window "xxx.xxx" has 1/7 good samples
        assert_eq!(render(&operate_line(&line("xxx.xxx"), 0.25)), "xxxxxxx");
        // a single flag does not spread at eta 0.25
        assert_eq!(render(&operate_line(&line("...x..."), 0.25)), "...x...");
    }

    #[test]
    fn extends_long_runs_proportionally() {
        // 6 flags can absorb 2 good samples at eta 0.25 (2/8 good)
        assert_eq!(
            render(&operate_line(&line("....xxxxxx...."), 0.25)),
            "..xxxxxxxxxx.."
        );
    }

    #[test]
    fn stricter_eta_never_flags_fewer() {
        let patterns = [
            "x..x.xx....xxx.x..",
            "..........x.......",
            "xxxxx.....xx.x.x.x",
            "x.x.x.x.x.x.x.x.x.",
        ];
        let etas = [0.0, 0.125, 0.25, 0.5, 0.75, 1.0];
        for pattern in patterns {
            let input = line(pattern);
            let mut previous = input.clone();
            for eta in etas {
                let out = operate_line(&input, eta);
                for (before, after) in previous.iter().zip(&out) {
                    assert!(!before || *after, "eta {eta} lost a flag on {pattern}");
                }
                previous = out;
            }
        }
    }

    #[test]
    fn two_dimensional_passes_use_rows_then_columns() {
        let mut mask = Mask2D::new(3, 3);
        mask.set_value(0, 1, true);
        mask.set_value(2, 1, true);
        operate_horizontally(&mut mask, 0.5);
        assert!(mask.value(1, 1));
        operate_vertically(&mut mask, 0.0);
        assert_eq!(mask.count_flagged(), 3);
    }
}
