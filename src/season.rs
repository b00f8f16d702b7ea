//! Seasonal slicing of the 8760-hour year by calendar month.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::error::{FlexError, Result};

/// Name of the single slice used when no seasons are configured.
pub const FULL_YEAR: &str = "full_year";

/// Cumulative day-of-year at the end of each month (non-leap).
const MONTH_END_DAY: [u32; 12] = [31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334, 365];

/// A named season covering a set of calendar months.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SeasonSpec {
    pub name: String,
    /// Calendar months (1..=12); need not be contiguous (`[12, 1, 2]`).
    pub months: Vec<u32>,
}

/// Calendar month (1..=12) containing hour-of-year `hour` (1-based).
///
/// ```
/// use demand_flex::season::month_of_hour;
///
/// assert_eq!(month_of_hour(1), 1);
/// assert_eq!(month_of_hour(744), 1);
/// assert_eq!(month_of_hour(745), 2);
/// assert_eq!(month_of_hour(8760), 12);
/// ```
pub fn month_of_hour(hour: u32) -> u32 {
    let day = hour.saturating_sub(1) / 24 + 1;
    MONTH_END_DAY
        .iter()
        .position(|&end| day <= end)
        .map_or(12, |i| i as u32 + 1)
}

/// Checks that season specs partition the twelve months.
///
/// Returns every problem found; empty when valid or when no seasons are given.
pub fn validate_seasons(specs: &[SeasonSpec]) -> Vec<ConfigError> {
    let mut errors = Vec::new();
    if specs.is_empty() {
        return errors;
    }

    let mut owner: [Option<&str>; 12] = [None; 12];
    for (i, spec) in specs.iter().enumerate() {
        let field = format!("seasons[{i}]");
        if spec.name.trim().is_empty() {
            errors.push(ConfigError {
                field: format!("{field}.name"),
                message: "must not be empty".into(),
            });
        }
        if specs[..i].iter().any(|s| s.name == spec.name) {
            errors.push(ConfigError {
                field: format!("{field}.name"),
                message: format!("duplicate season \"{}\"", spec.name),
            });
        }
        if spec.months.is_empty() {
            errors.push(ConfigError {
                field: format!("{field}.months"),
                message: "must list at least one month".into(),
            });
        }
        for &m in &spec.months {
            if !(1..=12).contains(&m) {
                errors.push(ConfigError {
                    field: format!("{field}.months"),
                    message: format!("month {m} outside 1..=12"),
                });
                continue;
            }
            let slot = &mut owner[(m - 1) as usize];
            if let Some(prev) = *slot {
                errors.push(ConfigError {
                    field: format!("{field}.months"),
                    message: format!("month {m} already assigned to season \"{prev}\""),
                });
            } else {
                *slot = Some(spec.name.as_str());
            }
        }
    }

    let missing: Vec<String> = owner
        .iter()
        .enumerate()
        .filter(|(_, o)| o.is_none())
        .map(|(i, _)| (i + 1).to_string())
        .collect();
    if !missing.is_empty() {
        errors.push(ConfigError {
            field: "seasons".into(),
            message: format!("months not covered by any season: {}", missing.join(", ")),
        });
    }
    errors
}

/// Resolved month-to-season lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct SeasonCalendar {
    names: Vec<String>,
    month_to_season: [usize; 12],
}

impl SeasonCalendar {
    /// One slice spanning the whole year.
    pub fn full_year() -> Self {
        Self {
            names: vec![FULL_YEAR.to_string()],
            month_to_season: [0; 12],
        }
    }

    /// Builds a calendar from season specs; no specs means [`Self::full_year`].
    ///
    /// # Errors
    ///
    /// Returns `Config` if the seasons do not partition the twelve months.
    pub fn from_specs(specs: &[SeasonSpec]) -> Result<Self> {
        if specs.is_empty() {
            return Ok(Self::full_year());
        }
        let errors = validate_seasons(specs);
        if !errors.is_empty() {
            let joined: Vec<String> = errors.iter().map(ToString::to_string).collect();
            return Err(FlexError::Config(joined.join("; ")));
        }
        let mut month_to_season = [0; 12];
        for (idx, spec) in specs.iter().enumerate() {
            for &m in &spec.months {
                month_to_season[(m - 1) as usize] = idx;
            }
        }
        Ok(Self {
            names: specs.iter().map(|s| s.name.clone()).collect(),
            month_to_season,
        })
    }

    /// Index of the season containing `hour`.
    pub fn season_of_hour(&self, hour: u32) -> usize {
        self.month_to_season[(month_of_hour(hour) - 1) as usize]
    }

    pub fn name(&self, idx: usize) -> &str {
        &self.names[idx]
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
