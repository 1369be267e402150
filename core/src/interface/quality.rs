use std::ops::AddAssign;

use crate::quality::StatisticsCollection;

/// Statistics accumulated over many [`Flagger::collect_statistics`] calls.
///
/// Not meant for concurrent updates: give every worker its own instance and
/// merge them with `+=` afterwards.
///
/// [`Flagger::collect_statistics`]: super::Flagger::collect_statistics
#[derive(Debug, Clone, PartialEq)]
pub struct QualityStatistics {
    scan_times: Vec<f64>,
    channel_frequencies: Vec<f64>,
    collection: StatisticsCollection,
}

impl QualityStatistics {
    pub(crate) fn new(scan_times: &[f64], channel_frequencies: &[f64], polarization_count: usize) -> Self {
        let mut collection = StatisticsCollection::new(polarization_count);
        collection.initialize_band(0, channel_frequencies.to_vec());
        Self {
            scan_times: scan_times.to_vec(),
            channel_frequencies: channel_frequencies.to_vec(),
            collection,
        }
    }

    pub fn scan_times(&self) -> &[f64] {
        &self.scan_times
    }

    pub fn channel_frequencies(&self) -> &[f64] {
        &self.channel_frequencies
    }

    pub fn collection(&self) -> &StatisticsCollection {
        &self.collection
    }

    pub(crate) fn collection_mut(&mut self) -> &mut StatisticsCollection {
        &mut self.collection
    }
}

impl AddAssign<&QualityStatistics> for QualityStatistics {
    fn add_assign(&mut self, rhs: &QualityStatistics) {
        self.collection += &rhs.collection;
    }
}

impl AddAssign for QualityStatistics {
    fn add_assign(&mut self, rhs: QualityStatistics) {
        self.collection += rhs.collection;
    }
}
