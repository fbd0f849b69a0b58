//! Row path: one prepared `INSERT` per fact. For stores without bulk copy.

use duckdb::{params, Connection};

use super::{FactRow, FactSink};
use crate::error::Result;

const INSERT_FACT: &str = "INSERT INTO fact_transition (
        transition_id, scenario_id, time_id, geography_id,
        from_landuse_id, to_landuse_id,
        acres, acres_std_dev, acres_min, acres_max, transition_type
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

pub struct RowInsertSink<'c> {
    conn: &'c Connection,
}

impl<'c> RowInsertSink<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl FactSink for RowInsertSink<'_> {
    fn write_batch(&mut self, batch: Vec<FactRow>) -> Result<()> {
        let mut stmt = self.conn.prepare(INSERT_FACT)?;
        for r in &batch {
            stmt.execute(params![
                r.transition_id,
                r.scenario_id,
                r.time_id,
                r.geography_id,
                r.from_landuse_id,
                r.to_landuse_id,
                r.acres,
                r.acres_std_dev,
                r.acres_min,
                r.acres_max,
                r.transition_type.as_str(),
            ])?;
        }
        Ok(())
    }
}
