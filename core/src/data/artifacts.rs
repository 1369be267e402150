//! Mutable state threaded through one strategy execution.
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::data::baselines::{BaselineRecord, BaselineSource};
use crate::data::metadata::TimeFrequencyMetadata;
use crate::data::time_frequency::TimeFrequencyData;
use crate::prelude::{FlagError, FlagResult};

/// Holds the three views of the data an action works on:
///
/// * `original`: the input, not modified by the default actions;
/// * `contaminated`: the working copy whose masks accumulate flags;
/// * `revised`: the modelled clean background.
///
/// A fresh set is built for every run and dropped once the mask has been
/// extracted.
pub struct ArtifactSet {
    original: TimeFrequencyData,
    contaminated: TimeFrequencyData,
    revised: TimeFrequencyData,
    sensitivity: f64,
    metadata: TimeFrequencyMetadata,
    shared_lock: Arc<Mutex<()>>,
    baseline_source: Option<Arc<dyn BaselineSource>>,
    baseline_records: Arc<Mutex<Vec<BaselineRecord>>>,
}

impl ArtifactSet {
    /// `data` becomes both original and contaminated; revised starts at zero.
    pub fn new(data: TimeFrequencyData, shared_lock: Arc<Mutex<()>>) -> Self {
        let revised = data.zeroed_like();
        Self {
            original: data.clone(),
            contaminated: data,
            revised,
            sensitivity: 1.0,
            metadata: TimeFrequencyMetadata::default(),
            shared_lock,
            baseline_source: None,
            baseline_records: Arc::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: TimeFrequencyMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_baseline_source(mut self, source: Arc<dyn BaselineSource>) -> Self {
        self.baseline_source = Some(source);
        self
    }

    /// Set for one baseline of a fan-out: shares the lock, baseline source and
    /// baseline records of `self`, everything else starts fresh.
    pub fn nested(&self, data: TimeFrequencyData, metadata: TimeFrequencyMetadata) -> Self {
        let mut nested = ArtifactSet::new(data, Arc::clone(&self.shared_lock)).with_metadata(metadata);
        nested.baseline_source = self.baseline_source.clone();
        nested.baseline_records = Arc::clone(&self.baseline_records);
        nested
    }

    pub fn original(&self) -> &TimeFrequencyData {
        &self.original
    }

    pub fn contaminated(&self) -> &TimeFrequencyData {
        &self.contaminated
    }

    pub fn revised(&self) -> &TimeFrequencyData {
        &self.revised
    }

    pub fn contaminated_mut(&mut self) -> &mut TimeFrequencyData {
        &mut self.contaminated
    }

    pub fn revised_mut(&mut self) -> &mut TimeFrequencyData {
        &mut self.revised
    }

    pub fn original_mut(&mut self) -> &mut TimeFrequencyData {
        &mut self.original
    }

    pub fn set_contaminated(&mut self, data: TimeFrequencyData) {
        self.contaminated = data;
    }

    pub fn set_revised(&mut self, data: TimeFrequencyData) {
        self.revised = data;
    }

    /// Replace all three views at once, returning the previous ones in
    /// `(original, contaminated, revised)` order.
    pub fn replace_views(
        &mut self,
        original: TimeFrequencyData,
        contaminated: TimeFrequencyData,
        revised: TimeFrequencyData,
    ) -> (TimeFrequencyData, TimeFrequencyData, TimeFrequencyData) {
        (
            std::mem::replace(&mut self.original, original),
            std::mem::replace(&mut self.contaminated, contaminated),
            std::mem::replace(&mut self.revised, revised),
        )
    }

    pub fn sensitivity(&self) -> f64 {
        self.sensitivity
    }

    pub fn set_sensitivity(&mut self, sensitivity: f64) {
        self.sensitivity = sensitivity;
    }

    pub fn metadata(&self) -> &TimeFrequencyMetadata {
        &self.metadata
    }

    pub fn shared_lock(&self) -> &Arc<Mutex<()>> {
        &self.shared_lock
    }

    pub fn baseline_source(&self) -> Option<&Arc<dyn BaselineSource>> {
        self.baseline_source.as_ref()
    }

    /// Store `record` for the baseline selection at the end of the run.
    pub fn record_baseline(&self, record: BaselineRecord) -> FlagResult<()> {
        self.exclusive(|| {
            self.baseline_records
                .lock()
                .map(|mut records| records.push(record))
                .map_err(|_| FlagError::inconsistent("baseline records lock poisoned"))
        })?
    }

    /// Drain the records stored so far by this set and its nested sets.
    pub fn take_baseline_records(&self) -> FlagResult<Vec<BaselineRecord>> {
        self.exclusive(|| {
            self.baseline_records
                .lock()
                .map(|mut records| std::mem::take(&mut *records))
                .map_err(|_| FlagError::inconsistent("baseline records lock poisoned"))
        })?
    }

    /// Run `f` while holding the lock shared by every baseline of a run.
    pub fn exclusive<R>(&self, f: impl FnOnce() -> R) -> FlagResult<R> {
        let _guard = self
            .shared_lock
            .lock()
            .map_err(|_| FlagError::inconsistent("shared artifact lock poisoned"))?;
        Ok(f())
    }
}

impl fmt::Debug for ArtifactSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactSet")
            .field("original", &self.original)
            .field("contaminated", &self.contaminated)
            .field("revised", &self.revised)
            .field("sensitivity", &self.sensitivity)
            .field("metadata", &self.metadata)
            .field("has_baseline_source", &self.baseline_source.is_some())
            .finish()
    }
}
