//! Per-instrument batch processing of book snapshots.

pub mod processor;
pub mod series;
#[cfg(test)]
mod processor_tests;

pub use processor::{
    BatchOutput, BatchStats, MalformedRow, SlippageRecord, SnapshotBatchProcessor, SnapshotInput,
    SnapshotSource,
};
pub use series::{CurvePoint, InstrumentSlippageSeries, MeanSlippageCurve};
