//! Hourly building load: records, per-building grouping, and system totals.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{FlexError, Result};
use crate::tariff::PeriodKey;

/// Hours in the non-leap simulation year.
pub const HOURS_PER_YEAR: u32 = 8760;

/// One building, one hour-of-year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyLoadRecord {
    pub building_id: String,
    /// Hour of year, 1..=8760.
    pub hour: u32,
    pub energy_period: String,
    pub tier: u32,
    /// Energy consumption (kWh, >= 0).
    pub kwh: f64,
    /// Customer subclass, when the load table carries one.
    #[serde(default)]
    pub subclass: Option<String>,
}

impl HourlyLoadRecord {
    /// The (period, tier) bucket this hour is billed under.
    pub fn key(&self) -> PeriodKey {
        PeriodKey::new(self.energy_period.clone(), self.tier)
    }
}

/// All hours of one building, sorted by hour.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildingLoad {
    pub building_id: String,
    pub subclass: Option<String>,
    pub hours: Vec<HourlyLoadRecord>,
}

impl BuildingLoad {
    pub fn total_kwh(&self) -> f64 {
        self.hours.iter().map(|h| h.kwh).sum()
    }
}

/// Validated load table grouped by building.
///
/// Buildings are ordered by id and hours within a building by hour, so every
/// downstream stage sees the same deterministic order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadTable {
    buildings: Vec<BuildingLoad>,
}

impl LoadTable {
    /// Validates and groups raw records.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` when an hour is outside 1..=8760, consumption is
    /// negative or not finite, a (building, hour) pair repeats, or a building
    /// carries more than one subclass label.
    pub fn from_records(records: impl IntoIterator<Item = HourlyLoadRecord>) -> Result<Self> {
        let mut grouped: BTreeMap<String, Vec<HourlyLoadRecord>> = BTreeMap::new();
        for r in records {
            if r.hour == 0 || r.hour > HOURS_PER_YEAR {
                return Err(invalid(format!(
                    "building {} hour {} outside 1..={HOURS_PER_YEAR}",
                    r.building_id, r.hour
                )));
            }
            if !r.kwh.is_finite() || r.kwh < 0.0 {
                return Err(invalid(format!(
                    "building {} hour {}: consumption must be finite and >= 0, got {}",
                    r.building_id, r.hour, r.kwh
                )));
            }
            grouped.entry(r.building_id.clone()).or_default().push(r);
        }

        let mut buildings = Vec::with_capacity(grouped.len());
        for (building_id, mut hours) in grouped {
            hours.sort_by_key(|h| h.hour);
            if let Some(pair) = hours.windows(2).find(|w| w[0].hour == w[1].hour) {
                return Err(invalid(format!(
                    "building {building_id} hour {} appears more than once",
                    pair[0].hour
                )));
            }
            let labels: BTreeSet<Option<&str>> =
                hours.iter().map(|h| h.subclass.as_deref()).collect();
            if labels.len() > 1 {
                return Err(invalid(format!(
                    "building {building_id} has inconsistent subclass labels"
                )));
            }
            let subclass = hours.first().and_then(|h| h.subclass.clone());
            buildings.push(BuildingLoad {
                building_id,
                subclass,
                hours,
            });
        }
        Ok(Self { buildings })
    }

    /// Wraps buildings that were produced by a pipeline stage from a
    /// validated table.
    pub(crate) fn from_buildings(buildings: Vec<BuildingLoad>) -> Self {
        Self { buildings }
    }

    pub fn buildings(&self) -> &[BuildingLoad] {
        &self.buildings
    }

    pub fn len(&self) -> usize {
        self.buildings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buildings.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &HourlyLoadRecord> {
        self.buildings.iter().flat_map(|b| b.hours.iter())
    }

    pub fn total_kwh(&self) -> f64 {
        self.buildings.iter().map(BuildingLoad::total_kwh).sum()
    }

    /// Hourly sum across all buildings.
    pub fn system_load(&self) -> SystemLoad {
        SystemLoad::from_records(self.records())
    }
}

fn invalid(message: String) -> FlexError {
    FlexError::InvalidInput {
        table: "load",
        message,
    }
}

/// System-level hourly load (kWh), one slot per hour of year.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemLoad {
    kwh: Vec<f64>,
}

impl SystemLoad {
    /// An all-zero year.
    pub fn zeros() -> Self {
        Self {
            kwh: vec![0.0; HOURS_PER_YEAR as usize],
        }
    }

    /// Sums records hour by hour. Records are assumed to be range-checked.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a HourlyLoadRecord>) -> Self {
        let mut load = Self::zeros();
        for r in records {
            load.kwh[(r.hour - 1) as usize] += r.kwh;
        }
        load
    }

    /// Load at `hour` (1-based); zero outside the year.
    pub fn at(&self, hour: u32) -> f64 {
        hour.checked_sub(1)
            .and_then(|i| self.kwh.get(i as usize))
            .copied()
            .unwrap_or(0.0)
    }

    /// `(hour, kwh)` pairs in hour order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.kwh.iter().enumerate().map(|(i, v)| (i as u32 + 1, *v))
    }

    pub fn total(&self) -> f64 {
        self.kwh.iter().sum()
    }
}
