//! Flattened tables of a statistics collection, as written to disk.
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::prelude::{FlagError, FlagResult};
use crate::quality::collection::{
    AxisKey, DefaultStatistics, PolarizationStatistics, StatisticsCollection,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolarizationRow {
    pub count: u64,
    pub rfi_count: u64,
    pub correlator_flagged_count: u64,
    pub sum_real: f64,
    pub sum_imaginary: f64,
    pub sum_sq_real: f64,
    pub sum_sq_imaginary: f64,
    pub differential_count: u64,
    pub differential_sum_sq_real: f64,
    pub differential_sum_sq_imaginary: f64,
    pub mean_real: Option<f64>,
    pub mean_imaginary: Option<f64>,
    pub variance_real: Option<f64>,
    pub variance_imaginary: Option<f64>,
    pub rfi_ratio: Option<f64>,
}

impl From<&PolarizationStatistics> for PolarizationRow {
    fn from(stats: &PolarizationStatistics) -> Self {
        let mean = stats.mean();
        let variance = stats.variance();
        Self {
            count: stats.count,
            rfi_count: stats.rfi_count,
            correlator_flagged_count: stats.correlator_flagged_count,
            sum_real: stats.sum.re,
            sum_imaginary: stats.sum.im,
            sum_sq_real: stats.sum_sq_real,
            sum_sq_imaginary: stats.sum_sq_imaginary,
            differential_count: stats.differential_count,
            differential_sum_sq_real: stats.differential_sum_sq_real,
            differential_sum_sq_imaginary: stats.differential_sum_sq_imaginary,
            mean_real: mean.map(|m| m.re),
            mean_imaginary: mean.map(|m| m.im),
            variance_real: variance.map(|v| v.0),
            variance_imaginary: variance.map(|v| v.1),
            rfi_ratio: stats.rfi_ratio(),
        }
    }
}

fn rows(stats: &DefaultStatistics) -> Vec<PolarizationRow> {
    stats.polarizations().iter().map(PolarizationRow::from).collect()
}

fn axis_tables(map: &BTreeMap<AxisKey, DefaultStatistics>) -> Vec<AxisTable> {
    map.iter()
        .map(|(key, stats)| AxisTable {
            value: key.0,
            polarizations: rows(stats),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineTable {
    pub antenna1: usize,
    pub antenna2: usize,
    pub polarizations: Vec<PolarizationRow>,
}

/// Statistics at one time or channel frequency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisTable {
    pub value: f64,
    pub polarizations: Vec<PolarizationRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsReport {
    pub polarization_count: usize,
    pub total: Vec<PolarizationRow>,
    pub baselines: Vec<BaselineTable>,
    pub times: Vec<AxisTable>,
    pub frequencies: Vec<AxisTable>,
}

impl StatisticsReport {
    pub fn from_collection(collection: &StatisticsCollection) -> Self {
        Self {
            polarization_count: collection.polarization_count(),
            total: rows(&collection.totals()),
            baselines: collection
                .baseline_statistics()
                .iter()
                .map(|(baseline, stats)| BaselineTable {
                    antenna1: baseline.antenna1,
                    antenna2: baseline.antenna2,
                    polarizations: rows(stats),
                })
                .collect(),
            times: axis_tables(collection.time_statistics()),
            frequencies: axis_tables(collection.frequency_statistics()),
        }
    }

    pub fn write(&self, path: impl AsRef<Path>) -> FlagResult<()> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self).map_err(|source| FlagError::Format {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, text).map_err(|source| FlagError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn read(path: impl AsRef<Path>) -> FlagResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| FlagError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| FlagError::Format {
            path: path.to_path_buf(),
            source,
        })
    }
}
