//! County FIPS codes and the state lookup used to enrich `dim_geography`.

use std::fmt;

use crate::error::{ConvertError, Result, SkipReason};

/// Five-digit county FIPS code. The first two digits are the state code.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FipsCode(String);

impl FipsCode {
    /// Parse and normalize a FIPS key.
    ///
    /// Accepts 1–5 ASCII digits (surrounding whitespace ignored); shorter codes
    /// are left-padded with zeros, so `"1001"` becomes `"01001"`.
    pub fn parse(raw: &str) -> Result<FipsCode> {
        let s = raw.trim();
        if s.is_empty() || s.len() > 5 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ConvertError::aggregation(
                SkipReason::MalformedFips,
                format!("{raw:?} is not a county FIPS code"),
            ));
        }
        Ok(FipsCode(format!("{s:0>5}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn state_code(&self) -> &str {
        &self.0[..2]
    }

    pub fn state(&self) -> Option<&'static State> {
        state_by_code(self.state_code())
    }
}

impl fmt::Display for FipsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── State table ───────────────────────────────────────────────────────────────

/// A state (or DC) with its Census region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct State {
    pub code: &'static str,
    pub name: &'static str,
    pub region: &'static str,
}

const fn st(code: &'static str, name: &'static str, region: &'static str) -> State {
    State { code, name, region }
}

/// Conterminous states, Alaska, Hawaii and DC, sorted by FIPS state code.
pub const STATES: &[State] = &[
    st("01", "Alabama", "South"),
    st("02", "Alaska", "West"),
    st("04", "Arizona", "West"),
    st("05", "Arkansas", "South"),
    st("06", "California", "West"),
    st("08", "Colorado", "West"),
    st("09", "Connecticut", "Northeast"),
    st("10", "Delaware", "South"),
    st("11", "District of Columbia", "South"),
    st("12", "Florida", "South"),
    st("13", "Georgia", "South"),
    st("15", "Hawaii", "West"),
    st("16", "Idaho", "West"),
    st("17", "Illinois", "Midwest"),
    st("18", "Indiana", "Midwest"),
    st("19", "Iowa", "Midwest"),
    st("20", "Kansas", "Midwest"),
    st("21", "Kentucky", "South"),
    st("22", "Louisiana", "South"),
    st("23", "Maine", "Northeast"),
    st("24", "Maryland", "South"),
    st("25", "Massachusetts", "Northeast"),
    st("26", "Michigan", "Midwest"),
    st("27", "Minnesota", "Midwest"),
    st("28", "Mississippi", "South"),
    st("29", "Missouri", "Midwest"),
    st("30", "Montana", "West"),
    st("31", "Nebraska", "Midwest"),
    st("32", "Nevada", "West"),
    st("33", "New Hampshire", "Northeast"),
    st("34", "New Jersey", "Northeast"),
    st("35", "New Mexico", "West"),
    st("36", "New York", "Northeast"),
    st("37", "North Carolina", "South"),
    st("38", "North Dakota", "Midwest"),
    st("39", "Ohio", "Midwest"),
    st("40", "Oklahoma", "South"),
    st("41", "Oregon", "West"),
    st("42", "Pennsylvania", "Northeast"),
    st("44", "Rhode Island", "Northeast"),
    st("45", "South Carolina", "South"),
    st("46", "South Dakota", "Midwest"),
    st("47", "Tennessee", "South"),
    st("48", "Texas", "South"),
    st("49", "Utah", "West"),
    st("50", "Vermont", "Northeast"),
    st("51", "Virginia", "South"),
    st("53", "Washington", "West"),
    st("54", "West Virginia", "South"),
    st("55", "Wisconsin", "Midwest"),
    st("56", "Wyoming", "West"),
];

pub fn state_by_code(code: &str) -> Option<&'static State> {
    STATES
        .binary_search_by(|s| s.code.cmp(code))
        .ok()
        .map(|i| &STATES[i])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_short_numeric_codes() {
        let f = FipsCode::parse("1001").unwrap();
        assert_eq!(f.as_str(), "01001");
        assert_eq!(f.state_code(), "01");
        assert_eq!(f.state().map(|s| s.name), Some("Alabama"));
    }

    #[test]
    fn rejects_non_digit_and_overlong_codes() {
        for bad in ["", "abcde", "123456", "12-45"] {
            let err = FipsCode::parse(bad).unwrap_err();
            assert!(
                matches!(err, ConvertError::Aggregation { reason: SkipReason::MalformedFips, .. }),
                "{bad:?} should be malformed"
            );
        }
    }

    #[test]
    fn unknown_state_prefix_has_no_state() {
        let f = FipsCode::parse("72001").unwrap();
        assert!(f.state().is_none());
    }

    #[test]
    fn state_table_is_sorted_for_binary_search() {
        assert!(STATES.windows(2).all(|w| w[0].code < w[1].code));
        assert_eq!(STATES.len(), 51);
    }
}
