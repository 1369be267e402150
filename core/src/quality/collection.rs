//! Online visibility statistics, mergeable across workers.
//!
//! Every aggregate is a plain sum, so collecting two disjoint sample sets
//! separately and merging gives the same counts and sums as collecting them
//! together.
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::AddAssign;

use num_complex::Complex64;

use crate::data::Baseline;
use crate::prelude::{FlagError, FlagResult};

/// Sums over the samples of one polarization.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PolarizationStatistics {
    pub count: u64,
    pub sum: Complex64,
    pub sum_sq_real: f64,
    pub sum_sq_imaginary: f64,
    pub rfi_count: u64,
    pub correlator_flagged_count: u64,
    /// Same sums over differences between adjacent unflagged channels.
    pub differential_count: u64,
    pub differential_sum: Complex64,
    pub differential_sum_sq_real: f64,
    pub differential_sum_sq_imaginary: f64,
}

impl PolarizationStatistics {
    fn add_sample(&mut self, value: Complex64) {
        self.count += 1;
        self.sum += value;
        self.sum_sq_real += value.re * value.re;
        self.sum_sq_imaginary += value.im * value.im;
    }

    fn add_difference(&mut self, value: Complex64) {
        self.differential_count += 1;
        self.differential_sum += value;
        self.differential_sum_sq_real += value.re * value.re;
        self.differential_sum_sq_imaginary += value.im * value.im;
    }

    pub fn mean(&self) -> Option<Complex64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    /// Population variance of the real and imaginary parts.
    pub fn variance(&self) -> Option<(f64, f64)> {
        let mean = self.mean()?;
        let n = self.count as f64;
        Some((
            self.sum_sq_real / n - mean.re * mean.re,
            self.sum_sq_imaginary / n - mean.im * mean.im,
        ))
    }

    /// Fraction of the correlator-valid samples that were flagged as RFI.
    pub fn rfi_ratio(&self) -> Option<f64> {
        let total = self.count + self.rfi_count;
        (total > 0).then(|| self.rfi_count as f64 / total as f64)
    }
}

impl AddAssign<&PolarizationStatistics> for PolarizationStatistics {
    fn add_assign(&mut self, rhs: &PolarizationStatistics) {
        self.count += rhs.count;
        self.sum += rhs.sum;
        self.sum_sq_real += rhs.sum_sq_real;
        self.sum_sq_imaginary += rhs.sum_sq_imaginary;
        self.rfi_count += rhs.rfi_count;
        self.correlator_flagged_count += rhs.correlator_flagged_count;
        self.differential_count += rhs.differential_count;
        self.differential_sum += rhs.differential_sum;
        self.differential_sum_sq_real += rhs.differential_sum_sq_real;
        self.differential_sum_sq_imaginary += rhs.differential_sum_sq_imaginary;
    }
}

/// Per-polarization statistics of one key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefaultStatistics {
    polarizations: Vec<PolarizationStatistics>,
}

impl DefaultStatistics {
    pub fn new(polarization_count: usize) -> Self {
        Self {
            polarizations: vec![PolarizationStatistics::default(); polarization_count],
        }
    }

    pub fn polarizations(&self) -> &[PolarizationStatistics] {
        &self.polarizations
    }

    pub fn polarization(&self, index: usize) -> Option<&PolarizationStatistics> {
        self.polarizations.get(index)
    }

    fn pad_to(&mut self, polarization_count: usize) {
        if self.polarizations.len() < polarization_count {
            self.polarizations
                .resize(polarization_count, PolarizationStatistics::default());
        }
    }

    fn polarization_mut(&mut self, index: usize) -> &mut PolarizationStatistics {
        if index >= self.polarizations.len() {
            self.polarizations
                .resize(index + 1, PolarizationStatistics::default());
        }
        &mut self.polarizations[index]
    }
}

impl AddAssign<&DefaultStatistics> for DefaultStatistics {
    fn add_assign(&mut self, rhs: &DefaultStatistics) {
        for (index, stats) in rhs.polarizations.iter().enumerate() {
            *self.polarization_mut(index) += stats;
        }
    }
}

/// Totally ordered `f64` map key (times and frequencies).
#[derive(Debug, Clone, Copy)]
pub struct AxisKey(pub f64);

impl PartialEq for AxisKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for AxisKey {}

impl PartialOrd for AxisKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AxisKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Where a column of samples belongs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleKey {
    pub antenna1: usize,
    pub antenna2: usize,
    pub time: f64,
    pub band: usize,
    pub polarization: usize,
}

/// One timestep of one polarization across all channels of a band. Channel
/// `c` is read at `c * sample_stride` in the sample slices and at
/// `c * flag_stride` in the flag slices.
#[derive(Debug, Clone, Copy)]
pub struct SampleColumn<'a> {
    pub real: &'a [f32],
    pub imaginary: &'a [f32],
    pub sample_stride: usize,
    pub rfi_flags: &'a [bool],
    pub correlator_flags: &'a [bool],
    pub flag_stride: usize,
}

impl SampleColumn<'_> {
    fn check(&self, channel_count: usize) -> FlagResult<()> {
        if channel_count == 0 {
            return Ok(());
        }
        let samples_needed = (channel_count - 1) * self.sample_stride + 1;
        let flags_needed = (channel_count - 1) * self.flag_stride + 1;
        if self.real.len() < samples_needed
            || self.imaginary.len() < samples_needed
            || self.rfi_flags.len() < flags_needed
            || self.correlator_flags.len() < flags_needed
        {
            return Err(FlagError::invalid(format!(
                "sample column too short for {channel_count} channels"
            )));
        }
        Ok(())
    }

    fn sample(&self, channel: usize) -> Complex64 {
        let i = channel * self.sample_stride;
        Complex64::new(self.real[i] as f64, self.imaginary[i] as f64)
    }

    fn flags(&self, channel: usize) -> (bool, bool) {
        let i = channel * self.flag_stride;
        (self.rfi_flags[i], self.correlator_flags[i])
    }
}

/// Statistics keyed by baseline, by time and by channel frequency. Time and
/// frequency statistics only take cross-correlations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatisticsCollection {
    polarization_count: usize,
    bands: BTreeMap<usize, Vec<f64>>,
    baselines: BTreeMap<Baseline, DefaultStatistics>,
    times: BTreeMap<AxisKey, DefaultStatistics>,
    frequencies: BTreeMap<AxisKey, DefaultStatistics>,
}

impl StatisticsCollection {
    pub fn new(polarization_count: usize) -> Self {
        Self {
            polarization_count,
            ..Self::default()
        }
    }

    pub fn polarization_count(&self) -> usize {
        self.polarization_count
    }

    /// Register the channel frequencies of `band`.
    pub fn initialize_band(&mut self, band: usize, channel_frequencies: Vec<f64>) {
        self.bands.insert(band, channel_frequencies);
    }

    pub fn band(&self, band: usize) -> Option<&[f64]> {
        self.bands.get(&band).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.baselines.is_empty()
    }

    /// Accumulate one column of samples. A sample flagged by the correlator
    /// only counts as such; otherwise an RFI flag only counts as RFI; the
    /// remaining samples feed the sums.
    pub fn add(&mut self, key: SampleKey, column: &SampleColumn<'_>) -> FlagResult<()> {
        let frequencies = self
            .bands
            .get(&key.band)
            .cloned()
            .ok_or_else(|| FlagError::invalid(format!("band {} was not initialized", key.band)))?;
        let channel_count = frequencies.len();
        column.check(channel_count)?;
        if key.polarization >= self.polarization_count {
            self.polarization_count = key.polarization + 1;
            self.pad_entries();
        }

        let baseline = Baseline::new(key.antenna1, key.antenna2);
        let cross = !baseline.is_auto_correlation();
        let polarization_count = self.polarization_count;
        let new_stats = || DefaultStatistics::new(polarization_count);

        let mut baseline_sum = PolarizationStatistics::default();
        let mut time_sum = PolarizationStatistics::default();
        let mut previous: Option<Complex64> = None;
        for channel in 0..channel_count {
            let mut channel_sum = PolarizationStatistics::default();
            let (rfi, correlator) = column.flags(channel);
            if correlator {
                channel_sum.correlator_flagged_count += 1;
                previous = None;
            } else if rfi {
                channel_sum.rfi_count += 1;
                previous = None;
            } else {
                let value = column.sample(channel);
                channel_sum.add_sample(value);
                if let Some(last) = previous {
                    channel_sum.add_difference(value - last);
                }
                previous = Some(value);
            }
            baseline_sum += &channel_sum;
            if cross {
                time_sum += &channel_sum;
                *self
                    .frequencies
                    .entry(AxisKey(frequencies[channel]))
                    .or_insert_with(new_stats)
                    .polarization_mut(key.polarization) += &channel_sum;
            }
        }

        *self
            .baselines
            .entry(baseline)
            .or_insert_with(new_stats)
            .polarization_mut(key.polarization) += &baseline_sum;
        if cross {
            *self
                .times
                .entry(AxisKey(key.time))
                .or_insert_with(new_stats)
                .polarization_mut(key.polarization) += &time_sum;
        }
        Ok(())
    }

    /// Fold `other` into `self`.
    pub fn merge(&mut self, other: &StatisticsCollection) {
        self.polarization_count = self.polarization_count.max(other.polarization_count);
        for (band, frequencies) in &other.bands {
            self.bands.entry(*band).or_insert_with(|| frequencies.clone());
        }
        merge_maps(&mut self.baselines, &other.baselines);
        merge_maps(&mut self.times, &other.times);
        merge_maps(&mut self.frequencies, &other.frequencies);
        self.pad_entries();
    }

    /// Every entry holds exactly `polarization_count` polarizations.
    fn pad_entries(&mut self) {
        let count = self.polarization_count;
        self.baselines
            .values_mut()
            .chain(self.times.values_mut())
            .chain(self.frequencies.values_mut())
            .for_each(|stats| stats.pad_to(count));
    }

    pub fn baseline_statistics(&self) -> &BTreeMap<Baseline, DefaultStatistics> {
        &self.baselines
    }

    pub fn time_statistics(&self) -> &BTreeMap<AxisKey, DefaultStatistics> {
        &self.times
    }

    pub fn frequency_statistics(&self) -> &BTreeMap<AxisKey, DefaultStatistics> {
        &self.frequencies
    }

    /// Sum over every baseline.
    pub fn totals(&self) -> DefaultStatistics {
        let mut total = DefaultStatistics::new(self.polarization_count);
        for stats in self.baselines.values() {
            total += stats;
        }
        total
    }
}

fn merge_maps<K: Ord + Clone>(
    target: &mut BTreeMap<K, DefaultStatistics>,
    source: &BTreeMap<K, DefaultStatistics>,
) {
    for (key, stats) in source {
        *target.entry(key.clone()).or_default() += stats;
    }
}

impl AddAssign<&StatisticsCollection> for StatisticsCollection {
    fn add_assign(&mut self, rhs: &StatisticsCollection) {
        self.merge(rhs);
    }
}

impl AddAssign for StatisticsCollection {
    fn add_assign(&mut self, rhs: StatisticsCollection) {
        self.merge(&rhs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::StatisticsReport;

    struct Column {
        real: Vec<f32>,
        imaginary: Vec<f32>,
        rfi: Vec<bool>,
        correlator: Vec<bool>,
    }

    impl Column {
        fn new(real: &[f32], imaginary: &[f32]) -> Self {
            Self {
                real: real.to_vec(),
                imaginary: imaginary.to_vec(),
                rfi: vec![false; real.len()],
                correlator: vec![false; real.len()],
            }
        }

        fn view(&self) -> SampleColumn<'_> {
            SampleColumn {
                real: &self.real,
                imaginary: &self.imaginary,
                sample_stride: 1,
                rfi_flags: &self.rfi,
                correlator_flags: &self.correlator,
                flag_stride: 1,
            }
        }
    }

    fn collection() -> StatisticsCollection {
        let mut stats = StatisticsCollection::new(1);
        stats.initialize_band(0, vec![100.0, 110.0, 120.0]);
        stats
    }

    fn key(antenna1: usize, antenna2: usize, time: f64) -> SampleKey {
        SampleKey {
            antenna1,
            antenna2,
            time,
            band: 0,
            polarization: 0,
        }
    }

    #[test]
    fn flags_route_samples_to_the_right_counters() {
        let mut stats = collection();
        let mut column = Column::new(&[1.0, 2.0, 4.0], &[0.0, 1.0, 1.0]);
        column.rfi[1] = true;
        column.rfi[2] = true;
        column.correlator[2] = true;
        stats.add(key(0, 1, 5.0), &column.view()).unwrap();

        let total = stats.totals();
        let pol = total.polarization(0).unwrap();
        assert_eq!((pol.count, pol.rfi_count, pol.correlator_flagged_count), (1, 1, 1));
        assert_eq!(pol.sum, Complex64::new(1.0, 0.0));
        assert_eq!(pol.rfi_ratio(), Some(0.5));
        assert_eq!(stats.frequency_statistics().len(), 3);
    }

    #[test]
    fn differences_skip_flagged_channels() {
        let mut stats = collection();
        let column = Column::new(&[1.0, 3.0, 6.0], &[0.0, 0.0, 0.0]);
        stats.add(key(0, 1, 0.0), &column.view()).unwrap();
        let pol = *stats.totals().polarization(0).unwrap();
        assert_eq!(pol.differential_count, 2);
        assert_eq!(pol.differential_sum, Complex64::new(5.0, 0.0));
        assert_eq!(pol.differential_sum_sq_real, 13.0);
    }

    #[test]
    fn auto_correlations_only_reach_baseline_statistics() {
        let mut stats = collection();
        stats
            .add(key(3, 3, 0.0), &Column::new(&[1.0; 3], &[1.0; 3]).view())
            .unwrap();
        assert_eq!(stats.baseline_statistics().len(), 1);
        assert!(stats.time_statistics().is_empty());
        assert!(stats.frequency_statistics().is_empty());
    }

    #[test]
    fn merge_matches_single_collection() {
        let columns = [
            (key(0, 1, 0.0), Column::new(&[1.0, 2.0, 3.0], &[1.0, -1.0, 0.0])),
            (key(0, 1, 1.0), Column::new(&[4.0, -2.0, 0.0], &[2.0, 2.0, 5.0])),
            (key(1, 2, 0.0), Column::new(&[7.0, 8.0, -9.0], &[0.0, 3.0, 1.0])),
        ];
        let mut all = collection();
        let (mut a, mut b) = (collection(), collection());
        for (i, (k, column)) in columns.iter().enumerate() {
            all.add(*k, &column.view()).unwrap();
            let part = if i % 2 == 0 { &mut a } else { &mut b };
            part.add(*k, &column.view()).unwrap();
        }
        let mut ab = a.clone();
        ab += &b;
        let mut ba = b.clone();
        ba += a;
        assert_eq!(ab, all);
        assert_eq!(ba, all);
    }

    #[test]
    fn merge_grows_polarizations() {
        let mut narrow = collection();
        narrow
            .add(key(0, 1, 0.0), &Column::new(&[1.0; 3], &[0.0; 3]).view())
            .unwrap();
        let mut wide = collection();
        let mut k = key(0, 1, 0.0);
        k.polarization = 3;
        wide.add(k, &Column::new(&[2.0; 3], &[0.0; 3]).view()).unwrap();
        narrow += &wide;
        assert_eq!(narrow.polarization_count(), 4);
        let baseline = &narrow.baseline_statistics()[&Baseline::new(0, 1)];
        assert_eq!(baseline.polarizations().len(), 4);
        assert_eq!(baseline.polarization(3).unwrap().count, 3);
    }

    #[test]
    fn merge_matches_single_collection_when_polarizations_grow() {
        let mut wide_key = key(1, 2, 0.0);
        wide_key.polarization = 3;
        let wide = Column::new(&[2.0, 1.0, 0.5], &[0.0, 1.0, 0.0]);
        let narrow = Column::new(&[1.0, 4.0, 2.0], &[1.0, 0.0, 0.0]);

        let mut all = collection();
        all.add(wide_key, &wide.view()).unwrap();
        all.add(key(0, 1, 0.0), &narrow.view()).unwrap();

        let (mut a, mut b) = (collection(), collection());
        a.add(key(0, 1, 0.0), &narrow.view()).unwrap();
        b.add(wide_key, &wide.view()).unwrap();
        let mut ab = a.clone();
        ab += &b;
        let mut ba = b;
        ba += a;

        assert_eq!(ab, all);
        assert_eq!(ba, all);
        for stats in all.baseline_statistics().values() {
            assert_eq!(stats.polarizations().len(), 4);
        }
        assert_eq!(
            StatisticsReport::from_collection(&ab),
            StatisticsReport::from_collection(&all)
        );
    }

    #[test]
    fn unknown_band_and_short_columns_are_rejected() {
        let mut stats = collection();
        let mut k = key(0, 1, 0.0);
        k.band = 7;
        assert!(stats.add(k, &Column::new(&[1.0; 3], &[1.0; 3]).view()).is_err());
        assert!(stats
            .add(key(0, 1, 0.0), &Column::new(&[1.0; 2], &[1.0; 2]).view())
            .is_err());
    }

    #[test]
    fn axis_keys_are_totally_ordered() {
        assert!(AxisKey(-0.5) < AxisKey(0.25));
        assert_eq!(AxisKey(1.0), AxisKey(1.0));
        assert!(AxisKey(f64::NAN) > AxisKey(f64::INFINITY));
    }
}
