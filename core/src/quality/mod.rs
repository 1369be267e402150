pub mod collection;
pub mod tables;

pub use collection::{
    AxisKey, DefaultStatistics, PolarizationStatistics, SampleColumn, SampleKey, StatisticsCollection,
};
pub use tables::StatisticsReport;
