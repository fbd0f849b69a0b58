//! Dimension rows and surrogate keys.
//!
//! Keys are 1-based and deterministic for a given input:
//!   scenario_id : catalogue order
//!   time_id     : chronological order of the period union
//!   geography_id: lexicographic FIPS order
//!   landuse_id  : fixed `LandUse::ALL` order

use std::collections::BTreeMap;

use duckdb::{params, Connection};

use crate::aggregate::AggregatedDataset;
use crate::error::{ConvertError, Result};
use crate::geography::FipsCode;
use crate::landuse::LandUse;
use crate::loader::FactRow;
use crate::period::TimePeriod;
use crate::scenario::{ScenarioCatalogue, AGGREGATION_METHOD};

// ── Rows ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioRow {
    pub scenario_id: i32,
    pub scenario_name: String,
    pub rcp: Option<String>,
    pub ssp: Option<String>,
    pub description: String,
    pub narrative: String,
    pub aggregation_method: &'static str,
    pub gcm_count: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRow {
    pub time_id: i32,
    pub period: TimePeriod,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeographyRow {
    pub geography_id: i32,
    pub fips: FipsCode,
}

impl GeographyRow {
    pub fn state_name(&self) -> Option<&'static str> {
        self.fips.state().map(|s| s.name)
    }

    pub fn region(&self) -> Option<&'static str> {
        self.fips.state().map(|s| s.region)
    }
}

/// Every dimension row of one run plus the key lookups facts need.
#[derive(Debug, Clone)]
pub struct Dimensions {
    pub scenarios: Vec<ScenarioRow>,
    pub times: Vec<TimeRow>,
    pub geographies: Vec<GeographyRow>,
    scenario_ids: BTreeMap<String, i32>,
    time_ids: BTreeMap<TimePeriod, i32>,
    geography_ids: BTreeMap<FipsCode, i32>,
}

fn key(index: usize) -> Result<i32> {
    i32::try_from(index + 1)
        .map_err(|_| ConvertError::malformed(format!("dimension has more than {} rows", i32::MAX)))
}

impl Dimensions {
    /// All catalogue scenarios are present, including ones with no members
    /// (`gcm_count` 0).
    pub fn build(catalogue: &ScenarioCatalogue, data: &AggregatedDataset) -> Result<Self> {
        let mut scenarios = Vec::with_capacity(catalogue.len());
        let mut scenario_ids = BTreeMap::new();
        for (i, s) in catalogue.scenarios().iter().enumerate() {
            let scenario_id = key(i)?;
            let gcm_count = data.group(&s.name).map_or(0, |g| g.gcm_count());
            scenarios.push(ScenarioRow {
                scenario_id,
                scenario_name: s.name.clone(),
                rcp: s.rcp.clone(),
                ssp: s.ssp.clone(),
                description: s.description.clone(),
                narrative: s.narrative.clone(),
                aggregation_method: AGGREGATION_METHOD,
                gcm_count: i32::try_from(gcm_count).unwrap_or(i32::MAX),
            });
            scenario_ids.insert(s.name.clone(), scenario_id);
        }

        let mut times = Vec::with_capacity(data.time_periods().len());
        let mut time_ids = BTreeMap::new();
        for (i, &period) in data.time_periods().iter().enumerate() {
            let time_id = key(i)?;
            times.push(TimeRow { time_id, period });
            time_ids.insert(period, time_id);
        }

        let mut geographies = Vec::with_capacity(data.geographies().len());
        let mut geography_ids = BTreeMap::new();
        for (i, fips) in data.geographies().iter().enumerate() {
            let geography_id = key(i)?;
            geographies.push(GeographyRow {
                geography_id,
                fips: fips.clone(),
            });
            geography_ids.insert(fips.clone(), geography_id);
        }

        Ok(Self {
            scenarios,
            times,
            geographies,
            scenario_ids,
            time_ids,
            geography_ids,
        })
    }

    pub fn scenario_id(&self, name: &str) -> Option<i32> {
        self.scenario_ids.get(name).copied()
    }

    pub fn time_id(&self, period: TimePeriod) -> Option<i32> {
        self.time_ids.get(&period).copied()
    }

    pub fn geography_id(&self, fips: &FipsCode) -> Option<i32> {
        self.geography_ids.get(fips).copied()
    }

    /// Fact rows in load order: catalogue order, then period, FIPS, from, to.
    /// `transition_id` counts up from 1.
    pub fn fact_rows<'a>(
        &'a self,
        data: &'a AggregatedDataset,
    ) -> impl Iterator<Item = Result<FactRow>> + 'a {
        data.groups()
            .iter()
            .flat_map(move |group| {
                let scenario_id = self.scenario_id(&group.scenario.name);
                group
                    .iter_facts()
                    .map(move |(period, fips, t)| (scenario_id, period, fips, t))
            })
            .zip(1i64..)
            .map(move |((scenario_id, period, fips, t), transition_id)| {
                let missing = |what: &str| ConvertError::malformed(format!("no {what} key for fact {transition_id}"));
                Ok(FactRow {
                    transition_id,
                    scenario_id: scenario_id.ok_or_else(|| missing("scenario"))?,
                    time_id: self.time_id(period).ok_or_else(|| missing("time"))?,
                    geography_id: self.geography_id(fips).ok_or_else(|| missing("geography"))?,
                    from_landuse_id: t.from.id(),
                    to_landuse_id: t.to.id(),
                    acres: t.stats.mean,
                    acres_std_dev: t.stats.std_dev,
                    acres_min: t.stats.min,
                    acres_max: t.stats.max,
                    transition_type: t.transition_type(),
                })
            })
    }

    /// Insert every dimension row with prepared statements. Returns rows written.
    pub fn load(&self, conn: &Connection) -> Result<u64> {
        let mut written = 0u64;

        let mut stmt = conn.prepare(
            "INSERT INTO dim_scenario (scenario_id, scenario_name, rcp, ssp, description,
                                       narrative, aggregation_method, gcm_count)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )?;
        for s in &self.scenarios {
            stmt.execute(params![
                s.scenario_id,
                s.scenario_name,
                s.rcp,
                s.ssp,
                s.description,
                s.narrative,
                s.aggregation_method,
                s.gcm_count,
            ])?;
            written += 1;
        }

        let mut stmt = conn.prepare(
            "INSERT INTO dim_time (time_id, year_range, start_year, end_year, period_length)
             VALUES (?, ?, ?, ?, ?)",
        )?;
        for t in &self.times {
            stmt.execute(params![
                t.time_id,
                t.period.year_range(),
                t.period.start_year,
                t.period.end_year,
                t.period.length(),
            ])?;
            written += 1;
        }

        let mut stmt = conn.prepare(
            "INSERT INTO dim_geography (geography_id, fips_code, county_name, state_code,
                                        state_name, region)
             VALUES (?, ?, NULL, ?, ?, ?)",
        )?;
        for g in &self.geographies {
            stmt.execute(params![
                g.geography_id,
                g.fips.as_str(),
                g.fips.state_code(),
                g.state_name(),
                g.region(),
            ])?;
            written += 1;
        }

        let mut stmt = conn.prepare(
            "INSERT INTO dim_landuse (landuse_id, landuse_code, landuse_name, landuse_category)
             VALUES (?, ?, ?, ?)",
        )?;
        for lu in LandUse::ALL {
            stmt.execute(params![lu.id(), lu.code(), lu.name(), lu.category().as_str()])?;
            written += 1;
        }

        tracing::debug!(
            scenarios = self.scenarios.len(),
            times = self.times.len(),
            geographies = self.geographies.len(),
            "dimensions loaded"
        );
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::raw::{RawCell, RawDataset};
    use crate::scenario::OVERALL;

    fn dataset() -> RawDataset {
        let mut raw = RawDataset::new();
        let p1: TimePeriod = "2020-2030".parse().unwrap();
        let p0: TimePeriod = "2012-2020".parse().unwrap();
        for (scenario, fips) in [("A_rcp85_ssp2", "48201"), ("B_rcp85_ssp2", "1001"), ("C_rcp45_ssp1", "6037")] {
            for p in [p1, p0] {
                raw.insert(
                    scenario,
                    p,
                    FipsCode::parse(fips).unwrap(),
                    RawCell { from: LandUse::Crop, to: LandUse::Urban, acres: 1.5 },
                );
            }
        }
        raw
    }

    #[test]
    fn keys_follow_catalogue_time_and_fips_order() {
        let cat = ScenarioCatalogue::default();
        let agg = aggregate(&dataset(), &cat);
        let dims = Dimensions::build(&cat, &agg).unwrap();

        assert_eq!(dims.scenario_id(OVERALL), Some(1));
        assert_eq!(dims.scenario_id("RCP85_SSP5"), Some(5));
        assert_eq!(dims.times[0].period.year_range(), "2012-2020");
        assert_eq!(dims.times[0].time_id, 1);
        let fips: Vec<&str> = dims.geographies.iter().map(|g| g.fips.as_str()).collect();
        assert_eq!(fips, vec!["01001", "06037", "48201"]);
    }

    #[test]
    fn gcm_count_is_actual_membership() {
        let cat = ScenarioCatalogue::default();
        let agg = aggregate(&dataset(), &cat);
        let dims = Dimensions::build(&cat, &agg).unwrap();
        let count = |name: &str| dims.scenarios.iter().find(|s| s.scenario_name == name).unwrap().gcm_count;
        assert_eq!(count(OVERALL), 3);
        assert_eq!(count("RCP85_SSP2"), 2);
        assert_eq!(count("RCP45_SSP1"), 1);
        assert_eq!(count("RCP85_SSP3"), 0);
    }

    #[test]
    fn fact_rows_are_numbered_and_keyed() {
        let cat = ScenarioCatalogue::default();
        let agg = aggregate(&dataset(), &cat);
        let dims = Dimensions::build(&cat, &agg).unwrap();
        let rows: Vec<FactRow> = dims.fact_rows(&agg).collect::<Result<_>>().unwrap();
        // OVERALL: 3 geographies × 2 periods; SSP1: 1 × 2; SSP2: 2 × 2.
        assert_eq!(rows.len(), 12);
        let ids: Vec<i64> = rows.iter().map(|r| r.transition_id).collect();
        assert_eq!(ids, (1..=12).collect::<Vec<_>>());
        assert!(rows[..6].iter().all(|r| r.scenario_id == 1));
        assert!(rows.iter().all(|r| r.from_landuse_id == 1 && r.to_landuse_id == 5));
    }

    #[test]
    fn loads_into_store_with_state_lookup() {
        let cat = ScenarioCatalogue::default();
        let agg = aggregate(&dataset(), &cat);
        let dims = Dimensions::build(&cat, &agg).unwrap();
        let conn = Connection::open_in_memory().unwrap();
        crate::schema::create_schema(&conn).unwrap();
        let written = dims.load(&conn).unwrap();
        assert_eq!(written, 5 + 2 + 3 + 5);

        let (state, region): (String, String) = conn
            .query_row(
                "SELECT state_name, region FROM dim_geography WHERE fips_code = '48201'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!((state.as_str(), region.as_str()), ("Texas", "South"));
        let overall_rcp: Option<String> = conn
            .query_row("SELECT rcp FROM dim_scenario WHERE scenario_name = 'OVERALL'", [], |r| r.get(0))
            .unwrap();
        assert!(overall_rcp.is_none());
    }
}
