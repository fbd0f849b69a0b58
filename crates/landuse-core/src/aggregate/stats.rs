//! Running ensemble statistics.
//!
//! Welford's online update:
//!   n ← n + 1
//!   δ = x − mean
//!   mean ← mean + δ / n
//!   M2 ← M2 + δ · (x − mean)
//!
//! Sample variance s² = M2 / (n − 1) for n ≥ 2, otherwise 0.

use serde::Serialize;

/// Accumulator for one `(from, to)` cell across ensemble members.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunningStats {
    n: u32,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl Default for RunningStats {
    fn default() -> Self {
        Self {
            n: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, x: f64) {
        self.n += 1;
        let delta = x - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (x - self.mean);
        self.min = self.min.min(x);
        self.max = self.max.max(x);
    }

    pub fn count(&self) -> u32 {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Finalized statistics, or `None` before the first sample.
    pub fn summary(&self) -> Option<EnsembleStats> {
        if self.n == 0 {
            return None;
        }
        let variance = if self.n > 1 {
            self.m2.max(0.0) / (self.n - 1) as f64
        } else {
            0.0
        };
        // All-equal samples collapse to the exact value, free of rounding drift.
        let (mean, std_dev) = if self.min == self.max {
            (self.min, 0.0)
        } else {
            (self.mean.clamp(self.min, self.max), variance.sqrt())
        };
        Some(EnsembleStats {
            mean,
            std_dev,
            min: self.min,
            max: self.max,
            n: self.n,
        })
    }
}

/// Mean and spread of one cell across the models that reported it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnsembleStats {
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    /// Number of contributing values.
    pub n: u32,
}

impl EnsembleStats {
    pub fn from_values(values: &[f64]) -> Option<EnsembleStats> {
        let mut acc = RunningStats::new();
        values.iter().for_each(|&v| acc.push(v));
        acc.summary()
    }
}
