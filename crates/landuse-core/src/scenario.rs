//! Scenario key resolution and the combined-scenario catalogue.
//!
//! Raw scenario identifiers look like `CNRM_CM5_rcp45_ssp1`: a climate-model
//! tag followed by an RCP token and an SSP token. Each raw scenario feeds the
//! ensemble-wide scenario plus, when its key is catalogued, exactly one
//! RCP–SSP scenario.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};

/// Name of the ensemble-wide combined scenario in the default catalogue.
pub const OVERALL: &str = "OVERALL";

/// Statistic stored in `acres`; the only method the aggregator implements.
pub const AGGREGATION_METHOD: &str = "mean";

// ── Key resolution ────────────────────────────────────────────────────────────

/// Map a raw scenario identifier to its canonical `RCP<code>_SSP<code>` key.
///
/// Tokens are split on any non-alphanumeric character and matched
/// case-insensitively; the code is whatever follows the `rcp`/`ssp` marker in
/// its token. Returns `None` when either pathway token is missing or has no
/// code. Resolving an already-canonical key returns it unchanged.
pub fn resolve_scenario_key(raw: &str) -> Option<String> {
    let mut rcp: Option<String> = None;
    let mut ssp: Option<String> = None;

    for token in raw.split(|c: char| !c.is_ascii_alphanumeric()) {
        let lower = token.to_ascii_lowercase();
        if rcp.is_none() {
            if let Some(code) = pathway_code(&lower, "rcp") {
                rcp = Some(code.to_ascii_uppercase());
                continue;
            }
        }
        if ssp.is_none() {
            if let Some(code) = pathway_code(&lower, "ssp") {
                ssp = Some(code.to_ascii_uppercase());
            }
        }
    }

    Some(format!("RCP{}_SSP{}", rcp?, ssp?))
}

fn pathway_code<'a>(token: &'a str, marker: &str) -> Option<&'a str> {
    let idx = token.find(marker)?;
    let code = &token[idx + marker.len()..];
    (!code.is_empty()).then_some(code)
}

// ── Catalogue ─────────────────────────────────────────────────────────────────

/// One policy-facing scenario in `dim_scenario`.
///
/// An entry with neither `rcp` nor `ssp` is the ensemble-wide scenario and
/// receives every raw scenario. Any other entry receives the raw scenarios
/// whose resolved key equals its `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinedScenario {
    pub name: String,
    #[serde(default)]
    pub rcp: Option<String>,
    #[serde(default)]
    pub ssp: Option<String>,
    pub description: String,
    #[serde(default)]
    pub narrative: String,
}

impl CombinedScenario {
    pub fn is_ensemble(&self) -> bool {
        self.rcp.is_none() && self.ssp.is_none()
    }

    fn pathway(name: &str, rcp: &str, ssp: &str, description: &str, narrative: &str) -> Self {
        Self {
            name: name.to_string(),
            rcp: Some(rcp.to_string()),
            ssp: Some(ssp.to_string()),
            description: description.to_string(),
            narrative: narrative.to_string(),
        }
    }
}

/// Ordered set of combined scenarios. Order fixes `dim_scenario` surrogate keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioCatalogue {
    scenarios: Vec<CombinedScenario>,
}

impl Default for ScenarioCatalogue {
    /// OVERALL plus the four RCP–SSP pathways of the 2020 RPA projections.
    fn default() -> Self {
        Self {
            scenarios: vec![
                CombinedScenario {
                    name: OVERALL.to_string(),
                    rcp: None,
                    ssp: None,
                    description: "Ensemble mean across all climate models and pathways".to_string(),
                    narrative: "Central estimate over every GCM and RCP-SSP combination; \
                                use when no scenario preference is expressed."
                        .to_string(),
                },
                CombinedScenario::pathway(
                    "RCP45_SSP1",
                    "rcp45",
                    "ssp1",
                    "Sustainability: moderate emissions, low population growth",
                    "Lower warming with strong economic growth and a shift toward \
                     sustainable practices; the lowest development pressure on rural land.",
                ),
                CombinedScenario::pathway(
                    "RCP85_SSP2",
                    "rcp85",
                    "ssp2",
                    "Middle of the road: high emissions, moderate growth",
                    "High warming with historical patterns of population and economic \
                     growth continuing.",
                ),
                CombinedScenario::pathway(
                    "RCP85_SSP3",
                    "rcp85",
                    "ssp3",
                    "Regional rivalry: high emissions, slow growth",
                    "High warming with slow economic growth, low population growth and \
                     weak international cooperation.",
                ),
                CombinedScenario::pathway(
                    "RCP85_SSP5",
                    "rcp85",
                    "ssp5",
                    "Fossil-fueled development: high emissions, rapid growth",
                    "High warming with rapid economic and population growth driven by \
                     fossil-fuel use; the highest development pressure.",
                ),
            ],
        }
    }
}

impl ScenarioCatalogue {
    pub fn new(scenarios: Vec<CombinedScenario>) -> Result<Self> {
        let catalogue = Self { scenarios };
        catalogue.validate()?;
        Ok(catalogue)
    }

    pub fn scenarios(&self) -> &[CombinedScenario] {
        &self.scenarios
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&CombinedScenario> {
        self.scenarios.iter().find(|s| s.name == name)
    }

    /// The ensemble-wide entry. Present in every validated catalogue.
    pub fn ensemble(&self) -> Option<&CombinedScenario> {
        self.scenarios.iter().find(|s| s.is_ensemble())
    }

    /// Indices of the entries a raw scenario contributes to.
    pub fn groups_for(&self, raw_scenario: &str) -> Vec<usize> {
        let key = resolve_scenario_key(raw_scenario);
        self.scenarios
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_ensemble() || key.as_deref() == Some(s.name.as_str()))
            .map(|(i, _)| i)
            .collect()
    }

    /// Exactly one ensemble entry, unique names, and every pathway entry named
    /// by its own canonical key with both labels present.
    pub fn validate(&self) -> Result<()> {
        let ensembles = self.scenarios.iter().filter(|s| s.is_ensemble()).count();
        if ensembles != 1 {
            return Err(ConvertError::config(format!(
                "scenario catalogue needs exactly one ensemble entry, found {ensembles}"
            )));
        }
        let mut seen = HashSet::new();
        for s in &self.scenarios {
            if !seen.insert(s.name.as_str()) {
                return Err(ConvertError::config(format!("duplicate scenario {:?}", s.name)));
            }
            if s.is_ensemble() {
                continue;
            }
            if s.rcp.is_none() || s.ssp.is_none() {
                return Err(ConvertError::config(format!(
                    "scenario {:?} needs both rcp and ssp labels",
                    s.name
                )));
            }
            if resolve_scenario_key(&s.name).as_deref() != Some(s.name.as_str()) {
                return Err(ConvertError::config(format!(
                    "scenario name {:?} is not a canonical RCP<code>_SSP<code> key",
                    s.name
                )));
            }
        }
        Ok(())
    }
}
