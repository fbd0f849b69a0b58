//! Pipeline orchestrator: runs every conversion stage in order.
//!
//! Validated → SchemaCreated → DimensionsLoaded → FactLoaded → ViewsCreated → Done
//!
//! Any failure moves the run to `Failed`. Input is read and aggregated before
//! the store is opened, so malformed input never destroys an existing
//! database. The staging directory is removed exactly once on every exit path.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Instant;

use duckdb::Connection;
use serde::Serialize;
use tempfile::TempDir;

use crate::aggregate::{AggregatedDataset, AggregationStats, EnsembleAggregator};
use crate::config::ConverterConfig;
use crate::dims::Dimensions;
use crate::error::{ConvertError, Result};
use crate::loader::{
    BatchWriter, FactSink, LoadStats, LoadStrategy, ParquetCopySink, RowInsertSink, MAX_BATCH_SIZE,
};
use crate::progress::{ProgressReporter, Stage};
use crate::raw::{read_cells, ProgressReader};
use crate::schema::{create_schema, table_counts, TableCount};
use crate::scenario::OVERALL;
use crate::validate::ValidatedPaths;
use crate::views::create_views;

// ── Run state ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Validated,
    SchemaCreated,
    DimensionsLoaded,
    FactLoaded,
    ViewsCreated,
    Done,
    Failed,
}

/// What a successful run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub input: PathBuf,
    pub output: PathBuf,
    pub strategy: LoadStrategy,
    pub tables: Vec<TableCount>,
    pub output_bytes: u64,
    pub aggregation: AggregationStats,
    pub load: LoadStats,
    pub dimension_rows: u64,
    /// Staging directory used for intermediate batches; removed by the time
    /// the summary is returned.
    pub staging_dir: PathBuf,
    pub elapsed_ms: u64,
}

impl RunSummary {
    pub fn rows(&self, table: &str) -> Option<u64> {
        self.tables.iter().find(|t| t.table == table).map(|t| t.rows)
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Convert any error into a `ConvertError` tagged with its stage.
trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T>;
}

impl<T, E: Into<ConvertError>> AtStage<T> for std::result::Result<T, E> {
    fn at(self, stage: Stage) -> Result<T> {
        self.map_err(|e| e.into().in_stage(stage))
    }
}

/// Process-scoped staging directory, released once.
struct TempWorkspace {
    path: PathBuf,
    dir: Option<TempDir>,
}

impl TempWorkspace {
    fn acquire(root: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("landuse-convert-");
        let dir = match root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        tracing::debug!(dir = %dir.path().display(), "staging directory created");
        Ok(Self {
            path: dir.path().to_path_buf(),
            dir: Some(dir),
        })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn release(&mut self) -> Result<()> {
        match self.dir.take() {
            Some(dir) => {
                dir.close()?;
                tracing::debug!(dir = %self.path.display(), "staging directory removed");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

// ── Converter ─────────────────────────────────────────────────────────────────

/// One parameterized converter for every catalogue and load strategy.
pub struct Converter {
    config: ConverterConfig,
    state: RunState,
}

impl Converter {
    pub fn new(config: ConverterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: RunState::Validated,
        })
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Full rebuild of `paths.output()` from `paths.input()`.
    pub fn run(&mut self, paths: &ValidatedPaths, progress: &dyn ProgressReporter) -> Result<RunSummary> {
        let started = Instant::now();
        self.state = RunState::Validated;

        let mut workspace = match TempWorkspace::acquire(self.config.staging_root.as_deref()) {
            Ok(ws) => ws,
            Err(e) => {
                self.state = RunState::Failed;
                return Err(e.in_stage(Stage::Validate));
            }
        };

        let result = self.execute(paths, workspace.path(), progress);
        let cleanup = workspace.release();
        progress.report(Stage::Cleanup, 1, 1);

        match (result, cleanup) {
            (Ok(mut summary), Ok(())) => {
                summary.elapsed_ms = started.elapsed().as_millis() as u64;
                self.state = RunState::Done;
                tracing::info!(elapsed_ms = summary.elapsed_ms, "conversion finished");
                Ok(summary)
            }
            (Ok(_), Err(e)) => {
                self.state = RunState::Failed;
                Err(e.in_stage(Stage::Cleanup))
            }
            (Err(e), cleanup) => {
                if let Err(c) = cleanup {
                    tracing::warn!(error = %c, "staging cleanup failed after run error");
                }
                self.state = RunState::Failed;
                tracing::error!(error = %e, "conversion failed");
                Err(e)
            }
        }
    }

    fn execute(
        &mut self,
        paths: &ValidatedPaths,
        staging: &Path,
        progress: &dyn ProgressReporter,
    ) -> Result<RunSummary> {
        if paths.input_bytes() > self.config.max_input_bytes {
            return Err(ConvertError::FileTooLarge {
                path: paths.input().to_path_buf(),
                size: paths.input_bytes(),
                limit: self.config.max_input_bytes,
            }
            .in_stage(Stage::Validate));
        }
        progress.report(Stage::Validate, 1, 1);

        // ── Read and aggregate ──
        tracing::info!(input = %paths.input().display(), bytes = paths.input_bytes(), "reading input");
        let file = File::open(paths.input()).at(Stage::ReadInput)?;
        let reader = ProgressReader::new(file, paths.input_bytes(), progress);
        let mut aggregator = EnsembleAggregator::new(&self.config.catalogue);
        let read = read_cells(reader, &mut aggregator).at(Stage::ReadInput)?;
        if read.skips.total() > 0 {
            tracing::warn!(
                unknown_landuse = read.skips.unknown_landuse,
                malformed_fips = read.skips.malformed_fips,
                non_finite = read.skips.non_finite,
                "skipped malformed cells"
            );
        }

        let data = aggregator.finish(read.skips);
        progress.report(Stage::Aggregate, data.fact_count(), data.fact_count());
        tracing::info!(
            raw_scenarios = data.stats.raw_scenarios,
            raw_cells = data.stats.raw_cells,
            facts = data.stats.facts,
            non_positive = data.stats.non_positive,
            "aggregated ensemble"
        );
        let dims = Dimensions::build(&self.config.catalogue, &data).at(Stage::Aggregate)?;

        // ── Store ──
        let mut conn = Connection::open(paths.output()).at(Stage::CreateSchema)?;
        create_schema(&conn).at(Stage::CreateSchema)?;
        self.state = RunState::SchemaCreated;
        progress.report(Stage::CreateSchema, 1, 1);

        let dimension_rows = dims.load(&conn).at(Stage::LoadDimensions)?;
        self.state = RunState::DimensionsLoaded;
        progress.report(Stage::LoadDimensions, dimension_rows, dimension_rows);

        let tx = conn.transaction().at(Stage::LoadFacts)?;
        let load = self
            .load_facts(&tx, &dims, &data, staging, progress)
            .at(Stage::LoadFacts)?;
        tx.commit().at(Stage::LoadFacts)?;
        self.state = RunState::FactLoaded;
        tracing::info!(rows = load.rows, batches = load.batches, "facts loaded");

        let ensemble = self
            .config
            .catalogue
            .ensemble()
            .map_or(OVERALL, |s| s.name.as_str());
        create_views(&conn, ensemble).at(Stage::CreateViews)?;
        self.state = RunState::ViewsCreated;
        progress.report(Stage::CreateViews, 1, 1);

        conn.execute_batch("CHECKPOINT").at(Stage::CreateViews)?;
        let tables = table_counts(&conn).at(Stage::CreateViews)?;
        drop(conn);
        let output_bytes = fs::metadata(paths.output()).at(Stage::CreateViews)?.len();

        Ok(RunSummary {
            input: paths.input().to_path_buf(),
            output: paths.output().to_path_buf(),
            strategy: self.config.load_strategy,
            tables,
            output_bytes,
            aggregation: data.stats,
            load,
            dimension_rows,
            staging_dir: staging.to_path_buf(),
            elapsed_ms: 0,
        })
    }

    fn load_facts(
        &self,
        conn: &Connection,
        dims: &Dimensions,
        data: &AggregatedDataset,
        staging: &Path,
        progress: &dyn ProgressReporter,
    ) -> Result<LoadStats> {
        let sink: Box<dyn FactSink + '_> = match self.config.load_strategy {
            LoadStrategy::BulkCopy => Box::new(ParquetCopySink::new(conn, staging)),
            LoadStrategy::RowInsert => Box::new(RowInsertSink::new(conn)),
        };
        let mut writer = BatchWriter::with_limits(
            sink,
            self.config.batch_size,
            MAX_BATCH_SIZE,
            self.config.max_records,
        );

        let total = data.fact_count();
        for row in dims.fact_rows(data) {
            let before = writer.written();
            writer.push(row?)?;
            if writer.written() != before {
                progress.report(Stage::LoadFacts, writer.written(), total);
            }
        }
        let (stats, _) = writer.finish()?;
        progress.report(Stage::LoadFacts, stats.rows, total);
        Ok(stats)
    }
}
