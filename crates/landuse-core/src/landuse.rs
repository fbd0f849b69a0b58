//! The five land-use classes of the projection dataset and their coarse categories.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse grouping used by the agriculture view and downstream filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LandUseCategory {
    Agriculture,
    Natural,
    Developed,
}

impl LandUseCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            LandUseCategory::Agriculture => "Agriculture",
            LandUseCategory::Natural => "Natural",
            LandUseCategory::Developed => "Developed",
        }
    }
}

/// Land-use class. Ordering follows the dataset's column order and fixes
/// `dim_landuse` surrogate keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LandUse {
    Crop,
    Pasture,
    Rangeland,
    Forest,
    Urban,
}

/// Column key for the row/column total in the source records.
pub const TOTAL_CODE: &str = "t1";

impl LandUse {
    pub const ALL: [LandUse; 5] = [
        LandUse::Crop,
        LandUse::Pasture,
        LandUse::Rangeland,
        LandUse::Forest,
        LandUse::Urban,
    ];

    /// Two-letter code used in the source dataset.
    pub fn code(self) -> &'static str {
        match self {
            LandUse::Crop => "cr",
            LandUse::Pasture => "ps",
            LandUse::Rangeland => "rg",
            LandUse::Forest => "fr",
            LandUse::Urban => "ur",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LandUse::Crop => "Crop",
            LandUse::Pasture => "Pasture",
            LandUse::Rangeland => "Rangeland",
            LandUse::Forest => "Forest",
            LandUse::Urban => "Urban",
        }
    }

    pub fn category(self) -> LandUseCategory {
        match self {
            LandUse::Crop | LandUse::Pasture => LandUseCategory::Agriculture,
            LandUse::Rangeland | LandUse::Forest => LandUseCategory::Natural,
            LandUse::Urban => LandUseCategory::Developed,
        }
    }

    /// Case-insensitive lookup by two-letter code.
    pub fn from_code(code: &str) -> Option<LandUse> {
        let code = code.trim();
        LandUse::ALL
            .into_iter()
            .find(|lu| lu.code().eq_ignore_ascii_case(code))
    }

    /// 1-based surrogate key in `dim_landuse`.
    pub fn id(self) -> i32 {
        self as i32 + 1
    }
}

impl fmt::Display for LandUse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// `"same"` for persistence, `"change"` for a conversion between classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionType {
    Same,
    Change,
}

impl TransitionType {
    pub fn of(from: LandUse, to: LandUse) -> Self {
        if from == to {
            TransitionType::Same
        } else {
            TransitionType::Change
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransitionType::Same => "same",
            TransitionType::Change => "change",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_case_insensitively() {
        for lu in LandUse::ALL {
            assert_eq!(LandUse::from_code(lu.code()), Some(lu));
            assert_eq!(LandUse::from_code(&lu.code().to_uppercase()), Some(lu));
        }
        assert_eq!(LandUse::from_code(TOTAL_CODE), None);
        assert_eq!(LandUse::from_code("xx"), None);
    }

    #[test]
    fn ids_are_dense_and_one_based() {
        let ids: Vec<i32> = LandUse::ALL.iter().map(|lu| lu.id()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn agriculture_is_crop_and_pasture() {
        let ag: Vec<LandUse> = LandUse::ALL
            .into_iter()
            .filter(|lu| lu.category() == LandUseCategory::Agriculture)
            .collect();
        assert_eq!(ag, vec![LandUse::Crop, LandUse::Pasture]);
    }

    #[test]
    fn transition_type_from_pair() {
        assert_eq!(TransitionType::of(LandUse::Forest, LandUse::Forest), TransitionType::Same);
        assert_eq!(TransitionType::of(LandUse::Forest, LandUse::Urban).as_str(), "change");
    }
}
