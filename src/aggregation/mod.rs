//! Quality-control aggregation over labeled batches

pub mod kpi;
pub mod time_bucket;

pub use kpi::{KpiAggregator, KpiSummary};
pub use time_bucket::{TimeBucketAggregator, TimeBuckets};
