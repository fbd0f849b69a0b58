//! Fact loading: bounded batching in front of a pluggable [`FactSink`].
//!
//! [`BatchWriter`] owns the pending buffer (at most one batch resident) and
//! enforces both ceilings before anything reaches the store:
//!
//!   |batch| ≤ batch_limit           else BatchTooLarge
//!   written + |batch| ≤ max_records  else RecordLimitExceeded

pub mod bulk;
pub mod rows;

use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};
use crate::landuse::TransitionType;

pub use bulk::ParquetCopySink;
pub use rows::RowInsertSink;

/// Largest batch ever handed to a sink.
pub const MAX_BATCH_SIZE: usize = 1_000_000;

/// Largest number of fact rows one run may write.
pub const MAX_RECORDS: u64 = 100_000_000;

/// One `fact_transition` row with surrogate keys resolved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactRow {
    pub transition_id: i64,
    pub scenario_id: i32,
    pub time_id: i32,
    pub geography_id: i32,
    pub from_landuse_id: i32,
    pub to_landuse_id: i32,
    pub acres: f64,
    pub acres_std_dev: f64,
    pub acres_min: f64,
    pub acres_max: f64,
    pub transition_type: TransitionType,
}

/// How fact batches reach the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStrategy {
    /// Parquet intermediate file + `COPY ... (FORMAT PARQUET)`.
    #[default]
    BulkCopy,
    /// Prepared `INSERT` per row.
    RowInsert,
}

/// Destination for complete batches. A batch is either fully written or the
/// call fails.
pub trait FactSink {
    fn write_batch(&mut self, batch: Vec<FactRow>) -> Result<()>;
}

impl<S: FactSink + ?Sized> FactSink for &mut S {
    fn write_batch(&mut self, batch: Vec<FactRow>) -> Result<()> {
        (**self).write_batch(batch)
    }
}

impl<S: FactSink + ?Sized> FactSink for Box<S> {
    fn write_batch(&mut self, batch: Vec<FactRow>) -> Result<()> {
        (**self).write_batch(batch)
    }
}

/// Totals reported by [`BatchWriter::finish`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    pub rows: u64,
    pub batches: u64,
}

pub struct BatchWriter<S> {
    sink: S,
    pending: Vec<FactRow>,
    batch_size: usize,
    batch_limit: usize,
    max_records: u64,
    written: u64,
    batches: u64,
}

impl<S: FactSink> BatchWriter<S> {
    /// Writer with the default ceilings. `batch_size` is clamped to
    /// `1..=MAX_BATCH_SIZE`.
    pub fn new(sink: S, batch_size: usize) -> Self {
        Self::with_limits(sink, batch_size, MAX_BATCH_SIZE, MAX_RECORDS)
    }

    pub fn with_limits(sink: S, batch_size: usize, batch_limit: usize, max_records: u64) -> Self {
        let batch_size = batch_size.clamp(1, batch_limit.max(1));
        Self {
            sink,
            pending: Vec::with_capacity(batch_size.min(64 * 1024)),
            batch_size,
            batch_limit,
            max_records,
            written: 0,
            batches: 0,
        }
    }

    /// Buffer one row, flushing when the buffer reaches the batch size.
    pub fn push(&mut self, row: FactRow) -> Result<()> {
        self.pending.push(row);
        if self.pending.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Hand a pre-built batch straight to the sink, after any pending rows.
    pub fn submit(&mut self, batch: Vec<FactRow>) -> Result<()> {
        if batch.len() > self.batch_limit {
            return Err(ConvertError::BatchTooLarge {
                size: batch.len(),
                limit: self.batch_limit,
            });
        }
        self.flush()?;
        self.write(batch)
    }

    pub fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let capacity = self.pending.capacity();
        let batch = std::mem::replace(&mut self.pending, Vec::with_capacity(capacity));
        self.write(batch)
    }

    fn write(&mut self, batch: Vec<FactRow>) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let attempted = self.written + batch.len() as u64;
        if attempted > self.max_records {
            return Err(ConvertError::RecordLimitExceeded {
                attempted,
                limit: self.max_records,
            });
        }
        let rows = batch.len();
        self.sink.write_batch(batch)?;
        self.written = attempted;
        self.batches += 1;
        tracing::debug!(batch = self.batches, rows, total = self.written, "fact batch written");
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush the remainder and return the totals and the sink.
    pub fn finish(mut self) -> Result<(LoadStats, S)> {
        self.flush()?;
        let stats = LoadStats {
            rows: self.written,
            batches: self.batches,
        };
        Ok((stats, self.sink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recording {
        batches: Vec<usize>,
    }

    impl FactSink for Recording {
        fn write_batch(&mut self, batch: Vec<FactRow>) -> Result<()> {
            self.batches.push(batch.len());
            Ok(())
        }
    }

    pub(crate) fn row(id: i64) -> FactRow {
        FactRow {
            transition_id: id,
            scenario_id: 1,
            time_id: 1,
            geography_id: 1,
            from_landuse_id: 1,
            to_landuse_id: 5,
            acres: 2.0,
            acres_std_dev: 0.5,
            acres_min: 1.5,
            acres_max: 2.5,
            transition_type: TransitionType::Change,
        }
    }

    #[test]
    fn push_flushes_at_batch_size() {
        let mut w = BatchWriter::new(Recording::default(), 3);
        for id in 1..=7 {
            w.push(row(id)).unwrap();
        }
        let (stats, sink) = w.finish().unwrap();
        assert_eq!(sink.batches, vec![3, 3, 1]);
        assert_eq!(stats, LoadStats { rows: 7, batches: 3 });
    }

    #[test]
    fn oversized_batch_rejected_without_partial_write() {
        let mut w = BatchWriter::with_limits(Recording::default(), 4, 4, 100);
        w.push(row(1)).unwrap();
        let err = w.submit((0..5).map(row).collect()).unwrap_err();
        assert!(matches!(err, ConvertError::BatchTooLarge { size: 5, limit: 4 }));
        assert_eq!(w.written(), 0);
        let (stats, sink) = w.finish().unwrap();
        assert_eq!(sink.batches, vec![1]);
        assert_eq!(stats.rows, 1);
    }

    #[test]
    fn record_ceiling_stops_before_offending_batch() {
        let mut w = BatchWriter::with_limits(Recording::default(), 2, 10, 5);
        for id in 1..=4 {
            w.push(row(id)).unwrap();
        }
        w.push(row(5)).unwrap();
        let err = w.push(row(6)).unwrap_err();
        assert!(matches!(err, ConvertError::RecordLimitExceeded { attempted: 6, limit: 5 }));
        assert_eq!(w.written(), 4);
    }

    #[test]
    fn batch_size_is_clamped() {
        let mut w = BatchWriter::with_limits(Recording::default(), 0, 2, 100);
        w.push(row(1)).unwrap();
        w.push(row(2)).unwrap();
        let (_, sink) = w.finish().unwrap();
        assert_eq!(sink.batches, vec![1, 1]);
    }

    #[test]
    fn load_strategy_serde_names() {
        let s: LoadStrategy = serde_json::from_str("\"row_insert\"").unwrap();
        assert_eq!(s, LoadStrategy::RowInsert);
        assert_eq!(LoadStrategy::default(), LoadStrategy::BulkCopy);
    }
}
