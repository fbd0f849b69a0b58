//! End-to-end conversion into a DuckDB file in a scratch directory.

use std::fs;
use std::path::{Path, PathBuf};

use approx::assert_relative_eq;
use duckdb::Connection;
use landuse_core::{
    validate_paths, ConvertError, Converter, ConverterConfig, LoadStrategy, NoopProgress, RunState,
    Stage, MAX_BATCH_SIZE,
};
use serde_json::{json, Map, Value};

const MODELS: [&str; 5] = ["CNRM_CM5", "HadGEM2_ES365", "IPSL_CM5A_MR", "MRI_CGCM3", "NorESM1_M"];
const PATHWAYS: [&str; 4] = ["rcp45_ssp1", "rcp85_ssp2", "rcp85_ssp3", "rcp85_ssp5"];
const COUNTIES: [&str; 3] = ["1001", "06037", "48201"];
const PERIODS: [&str; 2] = ["2012-2020", "2020-2030"];

/// 20 raw scenarios. Model `m` reports `10 + m` acres of crop → urban and a
/// fixed 500 acres of forest persistence; crop → pasture is always 0.
fn sample_input() -> Value {
    let mut root = Map::new();
    for pathway in PATHWAYS {
        for (m, model) in MODELS.iter().enumerate() {
            let mut periods = Map::new();
            for period in PERIODS {
                let mut counties = Map::new();
                for fips in COUNTIES {
                    counties.insert(
                        fips.to_string(),
                        json!([
                            {"from_landuse": "cr", "cr": 80.0, "ps": 0.0, "ur": 10.0 + m as f64, "t1": 90.0},
                            {"from_landuse": "fr", "fr": 500.0, "rg": null},
                            {"from_landuse": "t1", "cr": 80.0}
                        ]),
                    );
                }
                periods.insert(period.to_string(), Value::Object(counties));
            }
            root.insert(format!("{model}_{pathway}"), Value::Object(periods));
        }
    }
    Value::Object(root)
}

struct Scratch {
    _dir: tempfile::TempDir,
    input: PathBuf,
    output: PathBuf,
    staging: PathBuf,
}

fn scratch(input: &Value) -> Scratch {
    let dir = tempfile::tempdir().unwrap();
    let input_path = dir.path().join("projections.json");
    fs::write(&input_path, serde_json::to_vec(input).unwrap()).unwrap();
    let staging = dir.path().join("staging");
    fs::create_dir(&staging).unwrap();
    Scratch {
        input: input_path,
        output: dir.path().join("analytics.duckdb"),
        staging,
        _dir: dir,
    }
}

fn config(s: &Scratch, strategy: LoadStrategy) -> ConverterConfig {
    ConverterConfig {
        load_strategy: strategy,
        batch_size: 7,
        staging_root: Some(s.staging.clone()),
        ..ConverterConfig::default()
    }
}

fn convert(s: &Scratch, cfg: ConverterConfig) -> landuse_core::RunSummary {
    let paths = validate_paths(&s.input, &s.output).unwrap();
    let mut converter = Converter::new(cfg).unwrap();
    let summary = converter.run(&paths, &NoopProgress).unwrap();
    assert_eq!(converter.state(), RunState::Done);
    summary
}

fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path).unwrap().next().is_none()
}

/// Rows of a single-VARCHAR-column query.
fn dump(conn: &Connection, sql: &str) -> Vec<String> {
    let mut stmt = conn.prepare(sql).unwrap();
    let rows = stmt.query_map([], |r| r.get::<_, String>(0)).unwrap();
    rows.map(|r| r.unwrap()).collect()
}

#[test]
fn bulk_copy_builds_complete_star_schema() {
    let s = scratch(&sample_input());
    let summary = convert(&s, config(&s, LoadStrategy::BulkCopy));

    // Per scenario and (period, county): cr→cr, cr→ur, fr→fr; cr→ps is zero.
    let per_scenario = 3 * (PERIODS.len() * COUNTIES.len()) as u64;
    assert_eq!(summary.rows("fact_transition"), Some(5 * per_scenario));
    assert_eq!(summary.rows("dim_scenario"), Some(5));
    assert_eq!(summary.rows("dim_time"), Some(2));
    assert_eq!(summary.rows("dim_geography"), Some(3));
    assert_eq!(summary.rows("dim_landuse"), Some(5));
    assert_eq!(summary.aggregation.raw_scenarios, 20);
    assert_eq!(summary.aggregation.non_positive, 5 * (PERIODS.len() * COUNTIES.len()) as u64);
    assert!(summary.load.batches > 1);
    assert!(summary.output_bytes > 0);
    assert!(!summary.staging_dir.exists());
    assert!(is_empty_dir(&s.staging));

    let conn = Connection::open(&s.output).unwrap();
    let (mean, std, min, max): (f64, f64, f64, f64) = conn
        .query_row(
            "SELECT acres, acres_std_dev, acres_min, acres_max FROM v_default_transitions
             WHERE fips_code = '01001' AND year_range = '2012-2020'
               AND from_landuse = 'cr' AND to_landuse = 'ur'",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .unwrap();
    // OVERALL: values 10..=14, four times each.
    assert_relative_eq!(mean, 12.0, epsilon = 1e-9);
    assert_eq!((min, max), (10.0, 14.0));
    let expected_std = (40.0f64 / 19.0).sqrt();
    assert_relative_eq!(std, expected_std, epsilon = 1e-9);

    let gcm: Vec<String> = dump(
        &conn,
        "SELECT scenario_name || ':' || CAST(gcm_count AS VARCHAR) FROM dim_scenario ORDER BY scenario_id",
    );
    assert_eq!(
        gcm,
        vec!["OVERALL:20", "RCP45_SSP1:5", "RCP85_SSP2:5", "RCP85_SSP3:5", "RCP85_SSP5:5"]
    );

    let persistence_std: f64 = conn
        .query_row(
            "SELECT MAX(acres_std_dev) FROM fact_transition WHERE transition_type = 'same'
               AND from_landuse_id = 4",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(persistence_std, 0.0);
}

#[test]
fn row_insert_matches_bulk_copy() {
    let input = sample_input();
    let bulk = scratch(&input);
    let rows = scratch(&input);
    convert(&bulk, config(&bulk, LoadStrategy::BulkCopy));
    convert(&rows, config(&rows, LoadStrategy::RowInsert));

    let query = "SELECT concat_ws('|', transition_id, scenario_id, time_id, geography_id,
                                  from_landuse_id, to_landuse_id, acres, acres_std_dev,
                                  transition_type)
                 FROM fact_transition ORDER BY transition_id";
    let a = dump(&Connection::open(&bulk.output).unwrap(), query);
    let b = dump(&Connection::open(&rows.output).unwrap(), query);
    assert!(!a.is_empty());
    assert_eq!(a, b);
}

#[test]
fn rerun_is_deterministic() {
    let s = scratch(&sample_input());
    let first = convert(&s, config(&s, LoadStrategy::BulkCopy));
    let dims_query = "SELECT concat_ws('|', scenario_id, scenario_name, rcp, ssp, gcm_count)
                      FROM dim_scenario ORDER BY scenario_id";
    let geo_query = "SELECT concat_ws('|', geography_id, fips_code, state_code, state_name, region)
                     FROM dim_geography ORDER BY geography_id";
    let time_query = "SELECT concat_ws('|', time_id, year_range, start_year, end_year, period_length)
                      FROM dim_time ORDER BY time_id";
    let before = {
        let conn = Connection::open(&s.output).unwrap();
        (dump(&conn, dims_query), dump(&conn, geo_query), dump(&conn, time_query))
    };

    let second = convert(&s, config(&s, LoadStrategy::BulkCopy));
    let conn = Connection::open(&s.output).unwrap();
    let after = (dump(&conn, dims_query), dump(&conn, geo_query), dump(&conn, time_query));

    assert_eq!(before, after);
    assert_eq!(first.rows("fact_transition"), second.rows("fact_transition"));
}

#[test]
fn views_answer_policy_questions() {
    let s = scratch(&sample_input());
    convert(&s, config(&s, LoadStrategy::BulkCopy));
    let conn = Connection::open(&s.output).unwrap();

    let count = |sql: &str| -> i64 { conn.query_row(sql, [], |r| r.get(0)).unwrap() };
    assert_eq!(count("SELECT COUNT(*) FROM v_scenario_summary"), 5);
    assert_eq!(
        count("SELECT COUNT(*) FROM v_default_transitions"),
        3 * (PERIODS.len() * COUNTIES.len()) as i64
    );
    // Only crop rows touch agriculture: cr→cr and cr→ur.
    assert_eq!(
        count("SELECT COUNT(*) FROM v_agriculture_transitions WHERE scenario_name = 'OVERALL'"),
        2 * (PERIODS.len() * COUNTIES.len()) as i64
    );

    let urban_gain: f64 = conn
        .query_row(
            "SELECT net_change FROM v_net_change
             WHERE scenario_name = 'RCP85_SSP2' AND year_range = '2012-2020' AND landuse_code = 'ur'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    // Three counties, each gaining a mean of 12 acres.
    assert_relative_eq!(urban_gain, 36.0, epsilon = 1e-9);
}

#[test]
fn unmatched_and_malformed_records_are_counted_not_fatal() {
    let mut input = sample_input();
    let root = input.as_object_mut().unwrap();
    root.insert(
        "GFDL_rcp26_ssp4".to_string(),
        json!({"2012-2020": {
            "01001": [{"from_landuse": "cr", "ur": 1000.0}],
            "bogus": [{"from_landuse": "cr", "ur": 1.0}],
            "06037": [{"from_landuse": "xx", "ur": 1.0}]
        }}),
    );
    let s = scratch(&input);
    let summary = convert(&s, config(&s, LoadStrategy::BulkCopy));

    assert_eq!(summary.aggregation.raw_scenarios, 21);
    assert_eq!(summary.aggregation.unmatched_scenarios, 1);
    assert_eq!(summary.aggregation.skips.malformed_fips, 1);
    assert_eq!(summary.aggregation.skips.unknown_landuse, 1);

    let conn = Connection::open(&s.output).unwrap();
    let overall_gcm: i32 = conn
        .query_row("SELECT gcm_count FROM dim_scenario WHERE scenario_name = 'OVERALL'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(overall_gcm, 21);
    // The outlier only moves OVERALL, never a named pathway.
    let ssp1_max: f64 = conn
        .query_row(
            "SELECT MAX(acres_max) FROM fact_transition f JOIN dim_scenario s USING (scenario_id)
             WHERE s.scenario_name = 'RCP45_SSP1'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(ssp1_max, 500.0);
}

#[test]
fn record_ceiling_rolls_back_facts_and_cleans_staging() {
    let s = scratch(&sample_input());
    let cfg = ConverterConfig {
        max_records: 10,
        ..config(&s, LoadStrategy::BulkCopy)
    };
    let paths = validate_paths(&s.input, &s.output).unwrap();
    let mut converter = Converter::new(cfg).unwrap();
    let err = converter.run(&paths, &NoopProgress).unwrap_err();

    assert_eq!(err.stage(), Some(Stage::LoadFacts));
    assert!(matches!(err.root(), ConvertError::RecordLimitExceeded { limit: 10, .. }));
    assert_eq!(converter.state(), RunState::Failed);
    assert!(is_empty_dir(&s.staging));

    let conn = Connection::open(&s.output).unwrap();
    let facts: i64 = conn
        .query_row("SELECT COUNT(*) FROM fact_transition", [], |r| r.get(0))
        .unwrap();
    assert_eq!(facts, 0);
}

#[test]
fn empty_input_yields_empty_overall() {
    let s = scratch(&json!({}));
    let summary = convert(&s, config(&s, LoadStrategy::BulkCopy));
    assert_eq!(summary.rows("fact_transition"), Some(0));
    assert_eq!(summary.rows("dim_scenario"), Some(5));
    assert_eq!(summary.rows("dim_time"), Some(0));
}

#[test]
fn traversal_in_output_is_rejected_before_any_io() {
    let s = scratch(&sample_input());
    let sneaky = s.output.parent().unwrap().join("..").join("escape.duckdb");
    let err = validate_paths(&s.input, &sneaky).unwrap_err();
    assert!(matches!(err, ConvertError::PathTraversal { .. }));
    assert!(err.is_preflight());
    assert!(!s.output.exists());
}

#[test]
fn batch_size_above_ceiling_is_a_config_error() {
    let s = scratch(&sample_input());
    let cfg = ConverterConfig {
        batch_size: MAX_BATCH_SIZE + 1,
        ..config(&s, LoadStrategy::BulkCopy)
    };
    assert!(matches!(Converter::new(cfg), Err(ConvertError::Config { .. })));
}
