//! Bulk path: each batch is written to a Parquet file in the staging
//! directory, then loaded with `COPY fact_transition FROM ... (FORMAT PARQUET)`.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int32Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use duckdb::Connection;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use super::{FactRow, FactSink};
use crate::error::{ConvertError, Result};
use crate::validate::ensure_within;

// ── Schema ────────────────────────────────────────────────────────────────────

/// Column layout of `fact_transition`, in table order.
pub fn fact_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("transition_id", DataType::Int64, false),
        Field::new("scenario_id", DataType::Int32, false),
        Field::new("time_id", DataType::Int32, false),
        Field::new("geography_id", DataType::Int32, false),
        Field::new("from_landuse_id", DataType::Int32, false),
        Field::new("to_landuse_id", DataType::Int32, false),
        Field::new("acres", DataType::Float64, false),
        Field::new("acres_std_dev", DataType::Float64, false),
        Field::new("acres_min", DataType::Float64, false),
        Field::new("acres_max", DataType::Float64, false),
        Field::new("transition_type", DataType::Utf8, false),
    ]))
}

pub fn to_record_batch(rows: &[FactRow]) -> Result<RecordBatch> {
    fn ints(rows: &[FactRow], f: impl Fn(&FactRow) -> i32) -> ArrayRef {
        Arc::new(Int32Array::from_iter_values(rows.iter().map(f)))
    }
    fn floats(rows: &[FactRow], f: impl Fn(&FactRow) -> f64) -> ArrayRef {
        Arc::new(Float64Array::from_iter_values(rows.iter().map(f)))
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.transition_id))),
        ints(rows, |r| r.scenario_id),
        ints(rows, |r| r.time_id),
        ints(rows, |r| r.geography_id),
        ints(rows, |r| r.from_landuse_id),
        ints(rows, |r| r.to_landuse_id),
        floats(rows, |r| r.acres),
        floats(rows, |r| r.acres_std_dev),
        floats(rows, |r| r.acres_min),
        floats(rows, |r| r.acres_max),
        Arc::new(StringArray::from_iter_values(
            rows.iter().map(|r| r.transition_type.as_str()),
        )),
    ];
    Ok(RecordBatch::try_new(fact_schema(), columns)?)
}

fn writer_properties() -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build()
}

/// Write `rows` as a single-row-group Parquet file at `path`.
pub fn write_parquet(path: &Path, rows: &[FactRow]) -> Result<()> {
    let batch = to_record_batch(rows)?;
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(writer_properties()))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

// ── Staged file guard ─────────────────────────────────────────────────────────

/// Deletes its file on drop, whether or not the load succeeded.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "could not remove staged batch"),
        }
    }
}

// ── Sink ──────────────────────────────────────────────────────────────────────

/// [`FactSink`] that stages Parquet files under `dir` and bulk-copies them.
pub struct ParquetCopySink<'c> {
    conn: &'c Connection,
    dir: PathBuf,
    files: u64,
}

impl<'c> ParquetCopySink<'c> {
    pub fn new(conn: &'c Connection, dir: impl Into<PathBuf>) -> Self {
        Self {
            conn,
            dir: dir.into(),
            files: 0,
        }
    }

    pub fn files_staged(&self) -> u64 {
        self.files
    }
}

fn sql_string_literal(path: &Path) -> Result<String> {
    let s = path
        .to_str()
        .ok_or_else(|| ConvertError::malformed(format!("staging path {} is not UTF-8", path.display())))?;
    Ok(format!("'{}'", s.replace('\'', "''")))
}

impl FactSink for ParquetCopySink<'_> {
    fn write_batch(&mut self, batch: Vec<FactRow>) -> Result<()> {
        self.files += 1;
        let staged = StagedFile::new(self.dir.join(format!("fact_batch_{:06}.parquet", self.files)));
        write_parquet(staged.path(), &batch)?;
        drop(batch);

        let resolved = ensure_within(&self.dir, staged.path())?;
        let sql = format!(
            "COPY fact_transition FROM {} (FORMAT PARQUET)",
            sql_string_literal(&resolved)?
        );
        self.conn.execute_batch(&sql)?;
        tracing::trace!(file = %resolved.display(), "copied staged batch");
        Ok(())
    }
}
