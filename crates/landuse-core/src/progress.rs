//! Progress reporting for pipeline stages.
//!
//! The orchestrator never writes to the console itself; it calls the injected
//! [`ProgressReporter`]. `LogProgress` forwards to `tracing`, `NoopProgress`
//! discards everything.

use std::fmt;

use serde::Serialize;

/// A unit of work the orchestrator reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validate,
    ReadInput,
    Aggregate,
    CreateSchema,
    LoadDimensions,
    LoadFacts,
    CreateViews,
    Cleanup,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Validate => "validate",
            Stage::ReadInput => "read input",
            Stage::Aggregate => "aggregate",
            Stage::CreateSchema => "create schema",
            Stage::LoadDimensions => "load dimensions",
            Stage::LoadFacts => "load facts",
            Stage::CreateViews => "create views",
            Stage::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Receives `(stage, completed, total)` updates. `total` is 0 when unknown.
pub trait ProgressReporter {
    fn report(&self, stage: Stage, completed: u64, total: u64);
}

/// Discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _stage: Stage, _completed: u64, _total: u64) {}
}

/// Emits each update as a `tracing` event on the `landuse::progress` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn report(&self, stage: Stage, completed: u64, total: u64) {
        if total > 0 {
            let pct = completed as f64 / total as f64 * 100.0;
            tracing::info!(
                target: "landuse::progress",
                stage = stage.name(),
                completed,
                total,
                "{stage}: {completed}/{total} ({pct:.1}%)"
            );
        } else {
            tracing::info!(
                target: "landuse::progress",
                stage = stage.name(),
                completed,
                "{stage}: {completed}"
            );
        }
    }
}

impl<P: ProgressReporter + ?Sized> ProgressReporter for &P {
    fn report(&self, stage: Stage, completed: u64, total: u64) {
        (**self).report(stage, completed, total)
    }
}
