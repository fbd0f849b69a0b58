//! Read-only analytical views over the star schema.

use duckdb::Connection;

use crate::error::Result;

pub const VIEW_NAMES: [&str; 4] = [
    "v_default_transitions",
    "v_scenario_summary",
    "v_agriculture_transitions",
    "v_net_change",
];

/// Facts joined to every dimension, land uses joined twice.
const JOINED_FACTS: &str = "
SELECT
    f.transition_id,
    s.scenario_name,
    s.rcp,
    s.ssp,
    t.year_range,
    t.start_year,
    t.end_year,
    g.fips_code,
    g.county_name,
    g.state_code,
    g.state_name,
    g.region,
    fl.landuse_code     AS from_landuse,
    fl.landuse_name     AS from_landuse_name,
    fl.landuse_category AS from_category,
    tl.landuse_code     AS to_landuse,
    tl.landuse_name     AS to_landuse_name,
    tl.landuse_category AS to_category,
    f.acres,
    f.acres_std_dev,
    f.acres_min,
    f.acres_max,
    f.transition_type
FROM fact_transition f
JOIN dim_scenario  s  ON f.scenario_id = s.scenario_id
JOIN dim_time      t  ON f.time_id = t.time_id
JOIN dim_geography g  ON f.geography_id = g.geography_id
JOIN dim_landuse   fl ON f.from_landuse_id = fl.landuse_id
JOIN dim_landuse   tl ON f.to_landuse_id = tl.landuse_id";

const SCENARIO_SUMMARY: &str = "
CREATE VIEW v_scenario_summary AS
SELECT
    s.scenario_id,
    s.scenario_name,
    s.rcp,
    s.ssp,
    s.description,
    s.narrative,
    s.aggregation_method,
    s.gcm_count,
    COUNT(f.transition_id) AS fact_count,
    COALESCE(SUM(CASE WHEN f.transition_type = 'change' THEN f.acres END), CAST(0 AS DOUBLE)) AS total_change_acres
FROM dim_scenario s
LEFT JOIN fact_transition f ON f.scenario_id = s.scenario_id
GROUP BY ALL;
";

const NET_CHANGE: &str = "
CREATE VIEW v_net_change AS
WITH flows AS (
    SELECT scenario_id, time_id, to_landuse_id AS landuse_id,
           acres AS gained, CAST(0 AS DOUBLE) AS lost
    FROM fact_transition
    WHERE transition_type = 'change'
    UNION ALL
    SELECT scenario_id, time_id, from_landuse_id AS landuse_id,
           CAST(0 AS DOUBLE) AS gained, acres AS lost
    FROM fact_transition
    WHERE transition_type = 'change'
)
SELECT
    s.scenario_name,
    t.year_range,
    l.landuse_code,
    l.landuse_name,
    SUM(x.gained)                 AS acres_gained,
    SUM(x.lost)                   AS acres_lost,
    SUM(x.gained) - SUM(x.lost)   AS net_change
FROM flows x
JOIN dim_scenario s ON x.scenario_id = s.scenario_id
JOIN dim_time     t ON x.time_id = t.time_id
JOIN dim_landuse  l ON x.landuse_id = l.landuse_id
GROUP BY s.scenario_name, t.year_range, l.landuse_code, l.landuse_name;
";

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Create all four views. `ensemble_name` selects the default scenario.
pub fn create_views(conn: &Connection, ensemble_name: &str) -> Result<()> {
    let default_transitions = format!(
        "CREATE VIEW v_default_transitions AS {JOINED_FACTS}\nWHERE s.scenario_name = {};",
        quote(ensemble_name)
    );
    let agriculture = format!(
        "CREATE VIEW v_agriculture_transitions AS {JOINED_FACTS}\n\
         WHERE fl.landuse_category = 'Agriculture' OR tl.landuse_category = 'Agriculture';"
    );
    conn.execute_batch(&default_transitions)?;
    conn.execute_batch(SCENARIO_SUMMARY)?;
    conn.execute_batch(&agriculture)?;
    conn.execute_batch(NET_CHANGE)?;
    tracing::debug!(views = VIEW_NAMES.len(), "views created");
    Ok(())
}
