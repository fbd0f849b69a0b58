//! Star schema DDL (DuckDB dialect).
//!
//! `create_schema` is a destructive rebuild: views, then the fact table, then
//! dimensions are dropped before everything is created again.

use duckdb::Connection;
use serde::Serialize;

use crate::error::Result;
use crate::views::VIEW_NAMES;

/// Tables in load order. Dimensions precede the fact table.
pub const TABLES: [&str; 5] = [
    "dim_scenario",
    "dim_time",
    "dim_geography",
    "dim_landuse",
    "fact_transition",
];

const CREATE_TABLES: &str = "
CREATE TABLE dim_scenario (
    scenario_id        INTEGER PRIMARY KEY,
    scenario_name      VARCHAR NOT NULL UNIQUE,
    rcp                VARCHAR,
    ssp                VARCHAR,
    description        VARCHAR,
    narrative          VARCHAR,
    aggregation_method VARCHAR NOT NULL,
    gcm_count          INTEGER NOT NULL
);

CREATE TABLE dim_time (
    time_id       INTEGER PRIMARY KEY,
    year_range    VARCHAR NOT NULL UNIQUE,
    start_year    INTEGER NOT NULL,
    end_year      INTEGER NOT NULL,
    period_length INTEGER NOT NULL
);

CREATE TABLE dim_geography (
    geography_id INTEGER PRIMARY KEY,
    fips_code    VARCHAR NOT NULL UNIQUE,
    county_name  VARCHAR,
    state_code   VARCHAR,
    state_name   VARCHAR,
    region       VARCHAR
);

CREATE TABLE dim_landuse (
    landuse_id       INTEGER PRIMARY KEY,
    landuse_code     VARCHAR NOT NULL UNIQUE,
    landuse_name     VARCHAR NOT NULL,
    landuse_category VARCHAR NOT NULL
);

CREATE TABLE fact_transition (
    transition_id   BIGINT PRIMARY KEY,
    scenario_id     INTEGER NOT NULL REFERENCES dim_scenario (scenario_id),
    time_id         INTEGER NOT NULL REFERENCES dim_time (time_id),
    geography_id    INTEGER NOT NULL REFERENCES dim_geography (geography_id),
    from_landuse_id INTEGER NOT NULL REFERENCES dim_landuse (landuse_id),
    to_landuse_id   INTEGER NOT NULL REFERENCES dim_landuse (landuse_id),
    acres           DOUBLE NOT NULL,
    acres_std_dev   DOUBLE NOT NULL,
    acres_min       DOUBLE NOT NULL,
    acres_max       DOUBLE NOT NULL,
    transition_type VARCHAR NOT NULL
);
";

const CREATE_INDEXES: &str = "
CREATE INDEX idx_scenario_name ON dim_scenario (scenario_name);
CREATE INDEX idx_time_range ON dim_time (year_range);
CREATE INDEX idx_geography_fips ON dim_geography (fips_code);
CREATE INDEX idx_landuse_code ON dim_landuse (landuse_code);
CREATE INDEX idx_fact_composite ON fact_transition (scenario_id, time_id, geography_id);
CREATE INDEX idx_fact_landuse ON fact_transition (from_landuse_id, to_landuse_id);
";

/// Drop every schema object and create tables and indexes from scratch.
pub fn create_schema(conn: &Connection) -> Result<()> {
    drop_schema(conn)?;
    conn.execute_batch(CREATE_TABLES)?;
    conn.execute_batch(CREATE_INDEXES)?;
    tracing::debug!("schema created");
    Ok(())
}

pub fn drop_schema(conn: &Connection) -> Result<()> {
    let mut sql = String::new();
    for view in VIEW_NAMES {
        sql.push_str(&format!("DROP VIEW IF EXISTS {view};\n"));
    }
    for table in TABLES.iter().rev() {
        sql.push_str(&format!("DROP TABLE IF EXISTS {table};\n"));
    }
    conn.execute_batch(&sql)?;
    Ok(())
}

/// Row count of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCount {
    pub table: &'static str,
    pub rows: u64,
}

pub fn table_counts(conn: &Connection) -> Result<Vec<TableCount>> {
    TABLES
        .iter()
        .map(|&table| {
            let rows: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?;
            Ok(TableCount {
                table,
                rows: rows.max(0) as u64,
            })
        })
        .collect()
}
