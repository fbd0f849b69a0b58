//! Ensemble aggregation: raw per-model cells → combined-scenario facts.
//!
//! Every raw scenario feeds the catalogue's ensemble entry, plus the single
//! RCP–SSP entry named by its resolved key (if any). Within a group, values
//! for the same `(period, fips, from, to)` are folded into [`RunningStats`];
//! members that lack a cell simply contribute nothing to it. A cell becomes a
//! fact only when its ensemble mean is strictly positive.

pub mod stats;

use std::collections::{BTreeMap, BTreeSet};

#[cfg(feature = "threading")]
use rayon::prelude::*;
use serde::Serialize;

use crate::geography::FipsCode;
use crate::landuse::{LandUse, TransitionType};
use crate::period::TimePeriod;
use crate::raw::{CellSink, RawCell, RawDataset, SkipCounts};
use crate::scenario::{CombinedScenario, ScenarioCatalogue};

pub use stats::{EnsembleStats, RunningStats};

type Accumulators = BTreeMap<(LandUse, LandUse), RunningStats>;
type GroupCells = BTreeMap<TimePeriod, BTreeMap<FipsCode, Accumulators>>;

/// Facts of one combined scenario: time period → geography → transitions.
pub type GroupFacts = BTreeMap<TimePeriod, BTreeMap<FipsCode, Vec<AggregatedTransition>>>;

// ── Output types ──────────────────────────────────────────────────────────────

/// One fact before surrogate keys are attached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregatedTransition {
    pub from: LandUse,
    pub to: LandUse,
    pub stats: EnsembleStats,
}

impl AggregatedTransition {
    pub fn transition_type(&self) -> TransitionType {
        TransitionType::of(self.from, self.to)
    }
}

/// Aggregated facts of one catalogue entry.
#[derive(Debug, Clone)]
pub struct ScenarioGroup {
    pub scenario: CombinedScenario,
    /// Raw scenario ids that contributed, sorted.
    pub members: Vec<String>,
    pub facts: GroupFacts,
}

impl ScenarioGroup {
    pub fn gcm_count(&self) -> usize {
        self.members.len()
    }

    pub fn fact_count(&self) -> u64 {
        self.facts
            .values()
            .flat_map(|g| g.values())
            .map(|t| t.len() as u64)
            .sum()
    }

    /// Facts in `(period, fips, from, to)` order.
    pub fn iter_facts(&self) -> impl Iterator<Item = (TimePeriod, &FipsCode, &AggregatedTransition)> {
        self.facts.iter().flat_map(|(period, geographies)| {
            geographies
                .iter()
                .flat_map(move |(fips, ts)| ts.iter().map(move |t| (*period, fips, t)))
        })
    }
}

/// Counters describing one aggregation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregationStats {
    pub raw_scenarios: usize,
    /// Raw scenarios whose key matched no RCP–SSP entry (ensemble only).
    pub unmatched_scenarios: usize,
    pub raw_cells: u64,
    pub facts: u64,
    /// Cells dropped because their ensemble mean was ≤ 0.
    pub non_positive: u64,
    pub skips: SkipCounts,
}

/// Result of aggregation: populated groups in catalogue order plus the union
/// of every time period and geography seen in the input.
#[derive(Debug, Clone)]
pub struct AggregatedDataset {
    groups: Vec<ScenarioGroup>,
    time_periods: BTreeSet<TimePeriod>,
    geographies: BTreeSet<FipsCode>,
    pub stats: AggregationStats,
}

impl AggregatedDataset {
    pub fn groups(&self) -> &[ScenarioGroup] {
        &self.groups
    }

    pub fn group(&self, name: &str) -> Option<&ScenarioGroup> {
        self.groups.iter().find(|g| g.scenario.name == name)
    }

    pub fn time_periods(&self) -> &BTreeSet<TimePeriod> {
        &self.time_periods
    }

    pub fn geographies(&self) -> &BTreeSet<FipsCode> {
        &self.geographies
    }

    pub fn fact_count(&self) -> u64 {
        self.groups.iter().map(ScenarioGroup::fact_count).sum()
    }
}

// ── Streaming aggregator ──────────────────────────────────────────────────────

/// [`CellSink`] that folds cells into per-group accumulators as they arrive.
///
/// Memory grows with the number of distinct output cells, not with the number
/// of raw values.
pub struct EnsembleAggregator<'c> {
    catalogue: &'c ScenarioCatalogue,
    members: Vec<BTreeSet<String>>,
    cells: Vec<GroupCells>,
    current: Vec<usize>,
    time_periods: BTreeSet<TimePeriod>,
    geographies: BTreeSet<FipsCode>,
    raw_scenarios: usize,
    unmatched_scenarios: usize,
    raw_cells: u64,
}

impl<'c> EnsembleAggregator<'c> {
    pub fn new(catalogue: &'c ScenarioCatalogue) -> Self {
        let n = catalogue.len();
        Self {
            catalogue,
            members: vec![BTreeSet::new(); n],
            cells: vec![GroupCells::new(); n],
            current: Vec::new(),
            time_periods: BTreeSet::new(),
            geographies: BTreeSet::new(),
            raw_scenarios: 0,
            unmatched_scenarios: 0,
            raw_cells: 0,
        }
    }

    fn note_geography(&mut self, fips: &FipsCode) {
        if !self.geographies.contains(fips) {
            self.geographies.insert(fips.clone());
        }
    }

    /// Finalize every accumulator. `skips` is carried into the stats as-is.
    pub fn finish(self, skips: SkipCounts) -> AggregatedDataset {
        let mut stats = AggregationStats {
            raw_scenarios: self.raw_scenarios,
            unmatched_scenarios: self.unmatched_scenarios,
            raw_cells: self.raw_cells,
            skips,
            ..AggregationStats::default()
        };

        let mut groups = Vec::new();
        let parts = self.members.into_iter().zip(self.cells);
        for (scenario, (members, cells)) in self.catalogue.scenarios().iter().zip(parts) {
            if members.is_empty() && !scenario.is_ensemble() {
                continue;
            }
            let (facts, dropped) = finalize_group(cells);
            stats.non_positive += dropped;
            let group = ScenarioGroup {
                scenario: scenario.clone(),
                members: members.into_iter().collect(),
                facts,
            };
            stats.facts += group.fact_count();
            tracing::debug!(
                scenario = %group.scenario.name,
                members = group.gcm_count(),
                facts = group.fact_count(),
                "aggregated scenario group"
            );
            groups.push(group);
        }

        AggregatedDataset {
            groups,
            time_periods: self.time_periods,
            geographies: self.geographies,
            stats,
        }
    }
}

impl CellSink for EnsembleAggregator<'_> {
    fn begin_scenario(&mut self, raw_scenario: &str) {
        self.raw_scenarios += 1;
        self.current = self.catalogue.groups_for(raw_scenario);
        for &idx in &self.current {
            self.members[idx].insert(raw_scenario.to_string());
        }
        let named = self
            .current
            .iter()
            .any(|&idx| !self.catalogue.scenarios()[idx].is_ensemble());
        if !named {
            self.unmatched_scenarios += 1;
            tracing::debug!(raw_scenario, "no RCP-SSP match, ensemble only");
        }
    }

    fn begin_period(&mut self, period: TimePeriod) {
        self.time_periods.insert(period);
    }

    fn begin_geography(&mut self, period: TimePeriod, fips: &FipsCode) {
        self.time_periods.insert(period);
        self.note_geography(fips);
    }

    fn accept(&mut self, period: TimePeriod, fips: &FipsCode, cell: RawCell) {
        self.raw_cells += 1;
        self.time_periods.insert(period);
        self.note_geography(fips);
        for &idx in &self.current {
            let by_fips = self.cells[idx].entry(period).or_default();
            if !by_fips.contains_key(fips) {
                by_fips.insert(fips.clone(), Accumulators::new());
            }
            if let Some(acc) = by_fips.get_mut(fips) {
                acc.entry((cell.from, cell.to)).or_default().push(cell.acres);
            }
        }
    }
}

/// Aggregate a fully materialized dataset. Same result as streaming the
/// input through an [`EnsembleAggregator`].
pub fn aggregate(raw: &RawDataset, catalogue: &ScenarioCatalogue) -> AggregatedDataset {
    let mut aggregator = EnsembleAggregator::new(catalogue);
    raw.replay(&mut aggregator);
    aggregator.finish(SkipCounts::default())
}

// ── Finalization ──────────────────────────────────────────────────────────────

type FinalizedCell = (TimePeriod, FipsCode, Vec<AggregatedTransition>, u64);

fn finalize_cell((period, fips, acc): (TimePeriod, FipsCode, Accumulators)) -> FinalizedCell {
    let mut transitions = Vec::with_capacity(acc.len());
    let mut dropped = 0;
    for ((from, to), running) in acc {
        let Some(stats) = running.summary() else { continue };
        if stats.mean > 0.0 {
            transitions.push(AggregatedTransition { from, to, stats });
        } else {
            dropped += 1;
        }
    }
    (period, fips, transitions, dropped)
}

/// Returns the group's facts and the number of cells dropped for a
/// non-positive mean. Output order is key order regardless of threading.
fn finalize_group(cells: GroupCells) -> (GroupFacts, u64) {
    let flat: Vec<(TimePeriod, FipsCode, Accumulators)> = cells
        .into_iter()
        .flat_map(|(period, by_fips)| by_fips.into_iter().map(move |(f, a)| (period, f, a)))
        .collect();

    #[cfg(feature = "threading")]
    let finalized: Vec<FinalizedCell> = flat.into_par_iter().map(finalize_cell).collect();
    #[cfg(not(feature = "threading"))]
    let finalized: Vec<FinalizedCell> = flat.into_iter().map(finalize_cell).collect();

    let mut facts = GroupFacts::new();
    let mut dropped = 0;
    for (period, fips, transitions, d) in finalized {
        dropped += d;
        if !transitions.is_empty() {
            facts.entry(period).or_default().insert(fips, transitions);
        }
    }
    (facts, dropped)
}
