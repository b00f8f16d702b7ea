//! Precalc period ratios recomputed from the shifted system load.
//!
//! A precalc run calibrates tariff rates to a target revenue requirement using
//! relative values per (period, tier). Rescaling the original ratios after a
//! load shift can move individual period rates the wrong way, so the ratios
//! are re-derived from load-weighted marginal cost instead.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{FlexError, Result};
use crate::load::{HOURS_PER_YEAR, LoadTable};
use crate::season::SeasonCalendar;
use crate::tariff::PeriodKey;

use super::calculator::MarginalCostCurve;

/// One row of the precalc period mapping.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PrecalcMappingRecord {
    pub energy_period: String,
    pub tier: u32,
    pub rel_value: f64,
}

/// Relative value per (period, tier).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrecalcMapping {
    rel_values: BTreeMap<PeriodKey, f64>,
}

impl PrecalcMapping {
    /// # Errors
    ///
    /// Returns `InvalidInput` on duplicate keys or values that are not
    /// finite and positive.
    pub fn from_records(records: impl IntoIterator<Item = PrecalcMappingRecord>) -> Result<Self> {
        let mut rel_values = BTreeMap::new();
        for r in records {
            let key = PeriodKey::new(r.energy_period, r.tier);
            if !(r.rel_value.is_finite() && r.rel_value > 0.0) {
                return Err(FlexError::InvalidInput {
                    table: "precalc_mapping",
                    message: format!("rel_value for {key} must be > 0, got {}", r.rel_value),
                });
            }
            if rel_values.insert(key.clone(), r.rel_value).is_some() {
                return Err(FlexError::InvalidInput {
                    table: "precalc_mapping",
                    message: format!("duplicate entry for {key}"),
                });
            }
        }
        Ok(Self { rel_values })
    }

    pub fn get(&self, key: &PeriodKey) -> Option<f64> {
        self.rel_values.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.rel_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rel_values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PeriodKey, f64)> {
        self.rel_values.iter().map(|(k, v)| (k, *v))
    }

    pub fn to_records(&self) -> Vec<PrecalcMappingRecord> {
        self.iter()
            .map(|(k, v)| PrecalcMappingRecord {
                energy_period: k.energy_period.clone(),
                tier: k.tier,
                rel_value: v,
            })
            .collect()
    }
}

struct PeriodStats {
    load: f64,
    cost: f64,
    season_rows: Vec<usize>,
}

impl PeriodStats {
    fn avg_cost(&self) -> Option<f64> {
        (self.load > 0.0).then(|| self.cost / self.load)
    }

    fn season(&self) -> usize {
        self.season_rows
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))
            .map_or(0, |(i, _)| i)
    }
}

/// Re-derives relative values from the shifted load.
///
/// Each period belongs to the season holding most of its rows. Within a
/// season, every period's load-weighted marginal cost is divided by that of
/// the season's lowest-valued period, and the result is anchored to that
/// period's original value. Periods keep their original value when they carry
/// no load, when the season's marginal cost is zero in every hour, or when the
/// anchor period has no positive cost.
pub fn recompute_period_ratios(
    mapping: &PrecalcMapping,
    shifted: &LoadTable,
    calendar: &SeasonCalendar,
    marginal_costs: &MarginalCostCurve,
) -> PrecalcMapping {
    let mut stats: BTreeMap<PeriodKey, PeriodStats> = BTreeMap::new();
    for r in shifted.records() {
        let s = stats.entry(r.key()).or_insert_with(|| PeriodStats {
            load: 0.0,
            cost: 0.0,
            season_rows: vec![0; calendar.len()],
        });
        s.load += r.kwh;
        s.cost += r.kwh * marginal_costs.at(r.hour);
        s.season_rows[calendar.season_of_hour(r.hour)] += 1;
    }

    let mut season_has_cost = vec![false; calendar.len()];
    for h in 1..=HOURS_PER_YEAR {
        if marginal_costs.at(h) != 0.0 {
            season_has_cost[calendar.season_of_hour(h)] = true;
        }
    }

    let mut members: Vec<Vec<(&PeriodKey, f64)>> = vec![Vec::new(); calendar.len()];
    for (key, orig) in mapping.iter() {
        if let Some(s) = stats.get(key) {
            members[s.season()].push((key, orig));
        }
    }

    let mut updated = mapping.clone();
    for (season, group) in members.iter().enumerate() {
        let name = calendar.name(season);
        if group.is_empty() {
            continue;
        }
        if !season_has_cost[season] {
            info!(season = name, "marginal cost is zero all season; ratios kept");
            continue;
        }
        let Some(&(anchor_key, anchor_orig)) = group.iter().min_by(|a, b| a.1.total_cmp(&b.1))
        else {
            continue;
        };
        let anchor_avg = stats
            .get(anchor_key)
            .and_then(PeriodStats::avg_cost)
            .filter(|avg| *avg > 0.0);
        let Some(anchor_avg) = anchor_avg else {
            warn!(
                season = name,
                anchor = %anchor_key,
                "anchor period has no positive marginal cost; ratios kept"
            );
            continue;
        };
        for &(key, _) in group {
            if let Some(avg) = stats.get(key).and_then(PeriodStats::avg_cost) {
                let value = anchor_orig * avg / anchor_avg;
                updated.rel_values.insert(key.clone(), value);
            }
        }
        info!(
            season = name,
            anchor = %anchor_key,
            periods = group.len(),
            "precalc ratios recomputed"
        );
    }
    updated
}
