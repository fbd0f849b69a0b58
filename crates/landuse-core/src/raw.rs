//! Typed, streaming reader for the nested projection JSON.
//!
//! Input shape:
//!
//! ```text
//! { "<raw scenario>": { "<start>-<end>": { "<fips>": [
//!     { "from_landuse": "cr", "cr": 1.0, "ps": 0.2, "rg": 0.0, "fr": 0.1, "ur": 0.4, "t1": 1.7 },
//!     ...
//! ] } } }
//! ```
//!
//! The reader walks the document with serde visitors and hands each
//! `(from, to, acres)` cell to a [`CellSink`] as soon as its record is parsed,
//! so no untyped value tree is ever built. Cell-level problems (unknown land-use
//! code, malformed FIPS key) are counted in [`SkipCounts`]; structural problems
//! (wrong JSON shape, unparseable time period) abort the read.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, BufReader, Read};

use serde::de::{self, DeserializeSeed, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result, SkipReason};
use crate::geography::FipsCode;
use crate::landuse::{LandUse, TOTAL_CODE};
use crate::period::TimePeriod;
use crate::progress::{ProgressReporter, Stage};

/// One acreage value for a `from → to` transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawCell {
    pub from: LandUse,
    pub to: LandUse,
    pub acres: f64,
}

/// Consumer of parsed cells.
///
/// `begin_scenario` is called once per raw scenario, before any of its cells.
/// The period and geography hooks fire for every key, including keys whose
/// records yield no cells.
pub trait CellSink {
    fn begin_scenario(&mut self, raw_scenario: &str);

    fn begin_period(&mut self, _period: TimePeriod) {}

    fn begin_geography(&mut self, _period: TimePeriod, _fips: &FipsCode) {}

    fn accept(&mut self, period: TimePeriod, fips: &FipsCode, cell: RawCell);
}

/// Per-reason counts of skipped cells.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SkipCounts {
    pub unknown_landuse: u64,
    pub malformed_fips: u64,
    pub non_finite: u64,
}

impl SkipCounts {
    pub fn record(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::UnknownLandUse => self.unknown_landuse += 1,
            SkipReason::MalformedFips => self.malformed_fips += 1,
            SkipReason::NonFiniteValue => self.non_finite += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.unknown_landuse + self.malformed_fips + self.non_finite
    }
}

/// What one pass over the input saw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReadStats {
    pub raw_scenarios: usize,
    pub records: u64,
    pub cells: u64,
    pub skips: SkipCounts,
}

/// Stream every cell of `reader` into `sink`.
pub fn read_cells<R, S>(reader: R, sink: &mut S) -> Result<ReadStats>
where
    R: Read,
    S: CellSink + ?Sized,
{
    let mut de = serde_json::Deserializer::from_reader(BufReader::new(reader));
    let mut stats = ReadStats::default();
    DatasetSeed {
        sink,
        stats: &mut stats,
    }
    .deserialize(&mut de)?;
    de.end()?;
    Ok(stats)
}

// ── Record shape ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(alias = "_row")]
    from_landuse: String,
    #[serde(flatten)]
    acres: BTreeMap<String, Option<f64>>,
}

/// `Ok(None)` for the total row/column, which carries no transition.
fn landuse_for(code: &str) -> Result<Option<LandUse>> {
    if code.trim().eq_ignore_ascii_case(TOTAL_CODE) {
        return Ok(None);
    }
    LandUse::from_code(code).map(Some).ok_or_else(|| {
        ConvertError::aggregation(SkipReason::UnknownLandUse, format!("land-use code {code:?}"))
    })
}

fn note_skip(stats: &mut ReadStats, err: ConvertError) {
    if let ConvertError::Aggregation { reason, detail } = &err {
        stats.skips.record(*reason);
        tracing::debug!(%reason, %detail, "skipping cell");
    }
}

fn emit_record<S: CellSink + ?Sized>(
    record: RawRecord,
    period: TimePeriod,
    fips: &FipsCode,
    sink: &mut S,
    stats: &mut ReadStats,
) {
    stats.records += 1;
    let from = match landuse_for(&record.from_landuse) {
        Ok(Some(lu)) => lu,
        Ok(None) => return,
        Err(err) => return note_skip(stats, err),
    };
    for (column, value) in record.acres {
        let to = match landuse_for(&column) {
            Ok(Some(lu)) => lu,
            Ok(None) => continue,
            Err(err) => {
                note_skip(stats, err);
                continue;
            }
        };
        let Some(acres) = value else { continue };
        if !acres.is_finite() {
            note_skip(
                stats,
                ConvertError::aggregation(SkipReason::NonFiniteValue, format!("{from}->{to} in {fips}")),
            );
            continue;
        }
        stats.cells += 1;
        sink.accept(period, fips, RawCell { from, to, acres });
    }
}

// ── Visitors ──────────────────────────────────────────────────────────────────

struct DatasetSeed<'a, S: ?Sized> {
    sink: &'a mut S,
    stats: &'a mut ReadStats,
}

impl<'de, S: CellSink + ?Sized> DeserializeSeed<'de> for DatasetSeed<'_, S> {
    type Value = ();

    fn deserialize<D: de::Deserializer<'de>>(self, d: D) -> std::result::Result<(), D::Error> {
        d.deserialize_map(self)
    }
}

impl<'de, S: CellSink + ?Sized> Visitor<'de> for DatasetSeed<'_, S> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of raw scenario id to time periods")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<(), A::Error> {
        let DatasetSeed { sink, stats } = self;
        while let Some(scenario) = map.next_key::<String>()? {
            sink.begin_scenario(&scenario);
            stats.raw_scenarios += 1;
            map.next_value_seed(ScenarioSeed {
                sink: &mut *sink,
                stats: &mut *stats,
            })?;
        }
        Ok(())
    }
}

struct ScenarioSeed<'a, S: ?Sized> {
    sink: &'a mut S,
    stats: &'a mut ReadStats,
}

impl<'de, S: CellSink + ?Sized> DeserializeSeed<'de> for ScenarioSeed<'_, S> {
    type Value = ();

    fn deserialize<D: de::Deserializer<'de>>(self, d: D) -> std::result::Result<(), D::Error> {
        d.deserialize_map(self)
    }
}

impl<'de, S: CellSink + ?Sized> Visitor<'de> for ScenarioSeed<'_, S> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of time period to geographies")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<(), A::Error> {
        let ScenarioSeed { sink, stats } = self;
        while let Some(key) = map.next_key::<String>()? {
            let period: TimePeriod = key.parse().map_err(de::Error::custom)?;
            sink.begin_period(period);
            map.next_value_seed(PeriodSeed {
                period,
                sink: &mut *sink,
                stats: &mut *stats,
            })?;
        }
        Ok(())
    }
}

struct PeriodSeed<'a, S: ?Sized> {
    period: TimePeriod,
    sink: &'a mut S,
    stats: &'a mut ReadStats,
}

impl<'de, S: CellSink + ?Sized> DeserializeSeed<'de> for PeriodSeed<'_, S> {
    type Value = ();

    fn deserialize<D: de::Deserializer<'de>>(self, d: D) -> std::result::Result<(), D::Error> {
        d.deserialize_map(self)
    }
}

impl<'de, S: CellSink + ?Sized> Visitor<'de> for PeriodSeed<'_, S> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of FIPS code to transition records")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<(), A::Error> {
        let PeriodSeed { period, sink, stats } = self;
        while let Some(key) = map.next_key::<String>()? {
            match FipsCode::parse(&key) {
                Ok(fips) => {
                    sink.begin_geography(period, &fips);
                    map.next_value_seed(GeographySeed {
                        period,
                        fips: &fips,
                        sink: &mut *sink,
                        stats: &mut *stats,
                    })?
                }
                Err(err) => {
                    note_skip(stats, err);
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok(())
    }
}

struct GeographySeed<'a, S: ?Sized> {
    period: TimePeriod,
    fips: &'a FipsCode,
    sink: &'a mut S,
    stats: &'a mut ReadStats,
}

impl<'de, S: CellSink + ?Sized> DeserializeSeed<'de> for GeographySeed<'_, S> {
    type Value = ();

    fn deserialize<D: de::Deserializer<'de>>(self, d: D) -> std::result::Result<(), D::Error> {
        d.deserialize_seq(self)
    }
}

impl<'de, S: CellSink + ?Sized> Visitor<'de> for GeographySeed<'_, S> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a list of transition records")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<(), A::Error> {
        let GeographySeed { period, fips, sink, stats } = self;
        while let Some(record) = seq.next_element::<RawRecord>()? {
            emit_record(record, period, fips, &mut *sink, &mut *stats);
        }
        Ok(())
    }
}

// ── Materialized dataset ──────────────────────────────────────────────────────

/// Cells of one raw scenario: time period → geography → cells.
pub type ScenarioCells = BTreeMap<TimePeriod, BTreeMap<FipsCode, Vec<RawCell>>>;

/// The whole input held in memory, keyed the same way as the JSON.
#[derive(Debug, Clone, Default)]
pub struct RawDataset {
    scenarios: BTreeMap<String, ScenarioCells>,
    current: Option<String>,
}

impl RawDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<(Self, ReadStats)> {
        let mut dataset = Self::new();
        let stats = read_cells(reader, &mut dataset)?;
        dataset.current = None;
        Ok((dataset, stats))
    }

    pub fn insert(&mut self, raw_scenario: &str, period: TimePeriod, fips: FipsCode, cell: RawCell) {
        self.scenarios
            .entry(raw_scenario.to_string())
            .or_default()
            .entry(period)
            .or_default()
            .entry(fips)
            .or_default()
            .push(cell);
    }

    pub fn scenarios(&self) -> impl Iterator<Item = (&str, &ScenarioCells)> {
        self.scenarios.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn scenario_count(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    fn current_cells(&mut self) -> Option<&mut ScenarioCells> {
        let current = self.current.as_ref()?;
        self.scenarios.get_mut(current)
    }

    /// Feed every cell, in key order, into another sink.
    pub fn replay<S: CellSink + ?Sized>(&self, sink: &mut S) {
        for (scenario, periods) in &self.scenarios {
            sink.begin_scenario(scenario);
            for (period, geographies) in periods {
                sink.begin_period(*period);
                for (fips, cells) in geographies {
                    sink.begin_geography(*period, fips);
                    for cell in cells {
                        sink.accept(*period, fips, *cell);
                    }
                }
            }
        }
    }
}

impl CellSink for RawDataset {
    fn begin_scenario(&mut self, raw_scenario: &str) {
        self.scenarios.entry(raw_scenario.to_string()).or_default();
        self.current = Some(raw_scenario.to_string());
    }

    fn begin_period(&mut self, period: TimePeriod) {
        if let Some(periods) = self.current_cells() {
            periods.entry(period).or_default();
        }
    }

    fn begin_geography(&mut self, period: TimePeriod, fips: &FipsCode) {
        if let Some(periods) = self.current_cells() {
            periods.entry(period).or_default().entry(fips.clone()).or_default();
        }
    }

    fn accept(&mut self, period: TimePeriod, fips: &FipsCode, cell: RawCell) {
        if let Some(periods) = self.current_cells() {
            periods
                .entry(period)
                .or_default()
                .entry(fips.clone())
                .or_default()
                .push(cell);
        }
    }
}

// ── Progress ──────────────────────────────────────────────────────────────────

/// Bytes between progress updates while reading.
const REPORT_EVERY_BYTES: u64 = 64 * 1024 * 1024;

/// Reader that reports bytes consumed under [`Stage::ReadInput`].
pub struct ProgressReader<'p, R> {
    inner: R,
    read: u64,
    total: u64,
    next_report: u64,
    progress: &'p dyn ProgressReporter,
}

impl<'p, R: Read> ProgressReader<'p, R> {
    pub fn new(inner: R, total: u64, progress: &'p dyn ProgressReporter) -> Self {
        Self {
            inner,
            read: 0,
            total,
            next_report: REPORT_EVERY_BYTES,
            progress,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.read
    }
}

impl<R: Read> Read for ProgressReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.read += n as u64;
        if n == 0 || self.read >= self.next_report {
            self.progress.report(Stage::ReadInput, self.read, self.total);
            self.next_report = self.read + REPORT_EVERY_BYTES;
        }
        Ok(n)
    }
}
