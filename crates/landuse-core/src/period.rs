//! Projection time periods (`"2012-2020"` style year ranges).

use std::fmt;
use std::str::FromStr;

use crate::error::ConvertError;

/// A contiguous year range. Orders by start year, then end year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimePeriod {
    pub start_year: i32,
    pub end_year: i32,
}

impl TimePeriod {
    pub fn new(start_year: i32, end_year: i32) -> Result<Self, ConvertError> {
        if end_year < start_year {
            return Err(ConvertError::malformed(format!(
                "time period {start_year}-{end_year} ends before it starts"
            )));
        }
        Ok(Self { start_year, end_year })
    }

    /// `end_year − start_year`.
    pub fn length(&self) -> i32 {
        self.end_year - self.start_year
    }

    pub fn year_range(&self) -> String {
        self.to_string()
    }
}

impl FromStr for TimePeriod {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ConvertError::malformed(format!("time period {s:?} is not START-END"));
        let (start, end) = s.trim().split_once('-').ok_or_else(malformed)?;
        let start: i32 = start.trim().parse().map_err(|_| malformed())?;
        let end: i32 = end.trim().parse().map_err(|_| malformed())?;
        TimePeriod::new(start, end)
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start_year, self.end_year)
    }
}
