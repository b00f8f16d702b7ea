//! Demand-flexibility load shifting.
//!
//! The shift runs in three stages per building and slice (full year or one
//! season):
//!
//! 1. [`aggregate`] collapses hourly rows into (period, tier) totals.
//! 2. [`shift`] computes constant-elasticity targets and balances them through
//!    the single receiver period.
//! 3. [`redistribute`] maps each period delta back onto its hours.
//!
//! [`tracker`] and [`warnings`] observe the result without steering it.
//! Buildings share no mutable state, so stages 1 and 3 run as parallel maps
//! on whatever rayon pool is installed by the caller.

pub mod aggregate;
pub mod redistribute;
pub mod shift;
pub mod tracker;
pub mod warnings;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::FlexConfig;
use crate::error::Result;
use crate::load::{BuildingLoad, HourlyLoadRecord, LoadTable};
use crate::season::SeasonCalendar;
use crate::tariff::{PeriodKey, RateStructure};

use aggregate::{PeriodAggregate, aggregate_periods, flat_equivalent_price};
use redistribute::redistribute;
use shift::{ShiftParams, ShiftTarget, compute_shift};
use tracker::{ElasticityRecord, track};
use warnings::WarningReport;

/// Pricing resolved for one slice before any building is shifted.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceContext {
    pub name: String,
    /// `None` when no participating building has hours in the slice.
    pub params: Option<ShiftParams>,
    /// Participating hourly rows in the slice.
    pub hours: usize,
}

/// Shift targets of one building in one slice.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildingShift {
    pub building_id: String,
    pub slice: String,
    pub targets: Vec<ShiftTarget>,
}

impl BuildingShift {
    /// Energy moved into the receiver (kWh).
    pub fn shifted_kwh(&self) -> f64 {
        self.targets
            .iter()
            .filter(|t| t.is_receiver)
            .map(|t| t.delta)
            .sum()
    }

    pub fn receiver(&self) -> Option<&PeriodKey> {
        self.targets.iter().find(|t| t.is_receiver).map(|t| &t.key)
    }
}

/// Everything the shift produced.
#[derive(Debug, Clone, PartialEq)]
pub struct FlexOutcome {
    /// Complete shifted series, same buildings and hours as the input.
    pub load: LoadTable,
    pub shifts: Vec<BuildingShift>,
    pub tracker: Vec<ElasticityRecord>,
    pub warnings: WarningReport,
    pub slices: Vec<SliceContext>,
}

struct BuildingResult {
    load: BuildingLoad,
    shifts: Vec<BuildingShift>,
    tracker: Vec<ElasticityRecord>,
    warnings: WarningReport,
}

/// Shifts every participating building and merges the seasonal slices back
/// into one series. Non-participating buildings pass through unchanged.
///
/// The flat-equivalent price of each slice is either the configured
/// `equivalent_flat_tariff` or the quantity-weighted average price over all
/// participating buildings in that slice.
///
/// # Errors
///
/// Returns the first structural error encountered (`MissingPeriodAssignment`,
/// `InvalidFlatTariff`, `AmbiguousReceiverPeriod`, `ZeroPeriodTotal`).
/// Plausibility findings are returned in [`FlexOutcome::warnings`].
pub fn apply_demand_flex<F>(
    load: &LoadTable,
    rates: &RateStructure,
    calendar: &SeasonCalendar,
    settings: &FlexConfig,
    participates: F,
) -> Result<FlexOutcome>
where
    F: Fn(&BuildingLoad) -> bool + Sync,
{
    let sliced: Vec<Option<Vec<Vec<HourlyLoadRecord>>>> = load
        .buildings()
        .par_iter()
        .map(|b| participates(b).then(|| split_by_season(b, calendar)))
        .collect();

    let aggregated: Vec<Option<Vec<Vec<PeriodAggregate>>>> = sliced
        .par_iter()
        .map(|seasons| match seasons {
            None => Ok(None),
            Some(seasons) => seasons
                .iter()
                .map(|hours| aggregate_periods(hours, rates))
                .collect::<Result<Vec<_>>>()
                .map(Some),
        })
        .collect::<Result<Vec<_>>>()?;

    let slices = resolve_slices(&sliced, &aggregated, calendar, settings)?;

    let results: Vec<BuildingResult> = load
        .buildings()
        .par_iter()
        .zip(sliced.par_iter())
        .zip(aggregated.par_iter())
        .map(|((building, seasons), aggs)| {
            shift_building(building, seasons.as_deref(), aggs.as_deref(), &slices, settings)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut buildings = Vec::with_capacity(results.len());
    let mut shifts = Vec::new();
    let mut tracker = Vec::new();
    let mut warnings = WarningReport::new();
    for r in results {
        buildings.push(r.load);
        shifts.extend(r.shifts);
        tracker.extend(r.tracker);
        warnings.merge(r.warnings);
    }

    let shifted_kwh: f64 = shifts.iter().map(BuildingShift::shifted_kwh).sum();
    info!(
        buildings = buildings.len(),
        shifted_slices = shifts.len(),
        shifted_kwh,
        warnings = warnings.len(),
        "demand flex applied"
    );

    Ok(FlexOutcome {
        load: LoadTable::from_buildings(buildings),
        shifts,
        tracker,
        warnings,
        slices,
    })
}

fn split_by_season(
    building: &BuildingLoad,
    calendar: &SeasonCalendar,
) -> Vec<Vec<HourlyLoadRecord>> {
    let mut seasons = vec![Vec::new(); calendar.len()];
    for h in &building.hours {
        seasons[calendar.season_of_hour(h.hour)].push(h.clone());
    }
    seasons
}

fn resolve_slices(
    sliced: &[Option<Vec<Vec<HourlyLoadRecord>>>],
    aggregated: &[Option<Vec<Vec<PeriodAggregate>>>],
    calendar: &SeasonCalendar,
    settings: &FlexConfig,
) -> Result<Vec<SliceContext>> {
    (0..calendar.len())
        .map(|s| {
            let name = calendar.name(s).to_string();
            let hours: usize = sliced.iter().flatten().map(|per| per[s].len()).sum();
            if hours == 0 {
                return Ok(SliceContext {
                    name,
                    params: None,
                    hours,
                });
            }
            let p_flat = match settings.equivalent_flat_tariff {
                Some(p) => p,
                None => flat_equivalent_price(aggregated.iter().flatten().flat_map(|per| &per[s]))?,
            };
            let params = ShiftParams::new(p_flat, settings.demand_elasticity)?;
            info!(
                slice = %name,
                p_flat,
                elasticity = params.elasticity,
                hours,
                endogenous = settings.equivalent_flat_tariff.is_none(),
                "slice pricing resolved"
            );
            Ok(SliceContext {
                name,
                params: Some(params),
                hours,
            })
        })
        .collect()
}

fn shift_building(
    building: &BuildingLoad,
    seasons: Option<&[Vec<HourlyLoadRecord>]>,
    aggregates: Option<&[Vec<PeriodAggregate>]>,
    slices: &[SliceContext],
    settings: &FlexConfig,
) -> Result<BuildingResult> {
    let mut result = BuildingResult {
        load: building.clone(),
        shifts: Vec::new(),
        tracker: Vec::new(),
        warnings: WarningReport::new(),
    };
    let (Some(seasons), Some(aggregates)) = (seasons, aggregates) else {
        return Ok(result);
    };

    let id = &building.building_id;
    let mut hours = Vec::with_capacity(building.hours.len());
    for ((ctx, season_hours), season_aggs) in slices.iter().zip(seasons).zip(aggregates) {
        let Some(params) = ctx.params.filter(|_| !season_hours.is_empty()) else {
            continue;
        };
        let targets = compute_shift(id, &ctx.name, season_aggs, params)?;
        let shifted = redistribute(
            id,
            &ctx.name,
            season_hours,
            &targets,
            settings.min_hourly_fraction,
            &mut result.warnings,
        )?;
        result.tracker.extend(track(
            id,
            &ctx.name,
            &targets,
            params,
            settings.elasticity_tolerance,
            &mut result.warnings,
        ));
        let shift = BuildingShift {
            building_id: id.clone(),
            slice: ctx.name.clone(),
            targets,
        };
        debug!(
            building = %id,
            slice = %ctx.name,
            receiver = %shift.receiver().map(ToString::to_string).unwrap_or_default(),
            shifted_kwh = shift.shifted_kwh(),
            "building slice shifted"
        );
        hours.extend(shifted);
        result.shifts.push(shift);
    }
    hours.sort_by_key(|h| h.hour);
    result.load.hours = hours;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlexError;
    use crate::season::SeasonSpec;

    fn settings(elasticity: f64) -> FlexConfig {
        FlexConfig {
            demand_elasticity: elasticity,
            ..FlexConfig::default()
        }
    }

    fn rates() -> RateStructure {
        let mut r = RateStructure::new();
        r.insert(PeriodKey::new("peak", 1), 0.30).ok();
        r.insert(PeriodKey::new("offpeak", 1), 0.10).ok();
        r
    }

    fn rec(building: &str, hour: u32, period: &str, kwh: f64) -> HourlyLoadRecord {
        HourlyLoadRecord {
            building_id: building.into(),
            hour,
            energy_period: period.into(),
            tier: 1,
            kwh,
            subclass: None,
        }
    }

    /// Hours 1..=24 of January and of July, peak 17..=20 each day.
    fn two_season_table() -> LoadTable {
        let mut records = Vec::new();
        for b in ["b1", "b2"] {
            for start in [0, 181 * 24] {
                for h in 1..=24 {
                    let period = if (17..=20).contains(&h) { "peak" } else { "offpeak" };
                    let kwh = if b == "b1" { 1.0 + h as f64 * 0.1 } else { 2.0 };
                    records.push(rec(b, start + h, period, kwh));
                }
            }
        }
        LoadTable::from_records(records).unwrap_or_default()
    }

    #[test]
    fn full_year_shift_conserves_each_building() {
        let table = two_season_table();
        let out = apply_demand_flex(
            &table,
            &rates(),
            &SeasonCalendar::full_year(),
            &settings(-0.2),
            |_| true,
        )
        .expect("shift succeeds");
        for (before, after) in table.buildings().iter().zip(out.load.buildings()) {
            assert_eq!(before.hours.len(), after.hours.len());
            assert!((before.total_kwh() - after.total_kwh()).abs() < 1e-9);
        }
        assert_eq!(out.slices.len(), 1);
        assert_eq!(out.shifts.len(), 2);
        assert!(out.shifts.iter().all(|s| s.shifted_kwh() > 0.0));
    }

    #[test]
    fn seasonal_shift_conserves_each_season_and_merges() {
        let table = two_season_table();
        let calendar = SeasonCalendar::from_specs(&[
            SeasonSpec {
                name: "summer".into(),
                months: vec![6, 7, 8],
            },
            SeasonSpec {
                name: "rest".into(),
                months: vec![1, 2, 3, 4, 5, 9, 10, 11, 12],
            },
        ])
        .expect("valid seasons");
        let out = apply_demand_flex(&table, &rates(), &calendar, &settings(-0.15), |_| true)
            .expect("shift succeeds");
        assert_eq!(out.shifts.len(), 4);

        for (before, after) in table.buildings().iter().zip(out.load.buildings()) {
            let hours: Vec<u32> = after.hours.iter().map(|h| h.hour).collect();
            let expected: Vec<u32> = before.hours.iter().map(|h| h.hour).collect();
            assert_eq!(hours, expected);
            for season in 0..calendar.len() {
                let sum = |b: &BuildingLoad| -> f64 {
                    b.hours
                        .iter()
                        .filter(|h| calendar.season_of_hour(h.hour) == season)
                        .map(|h| h.kwh)
                        .sum()
                };
                assert!((sum(before) - sum(after)).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn non_participants_pass_through() {
        let table = two_season_table();
        let out = apply_demand_flex(
            &table,
            &rates(),
            &SeasonCalendar::full_year(),
            &settings(-0.2),
            |b| b.building_id == "b1",
        )
        .expect("shift succeeds");
        assert_eq!(out.load.buildings()[1], table.buildings()[1]);
        assert_ne!(out.load.buildings()[0], table.buildings()[0]);
        assert!(out.tracker.iter().all(|r| r.building_id == "b1"));
    }

    #[test]
    fn configured_flat_price_can_make_receiver_ambiguous() {
        let table = two_season_table();
        let cfg = FlexConfig {
            equivalent_flat_tariff: Some(0.5),
            ..settings(-0.2)
        };
        let err = apply_demand_flex(&table, &rates(), &SeasonCalendar::full_year(), &cfg, |_| true);
        assert!(matches!(err, Err(FlexError::AmbiguousReceiverPeriod { .. })));
    }

    #[test]
    fn unpriced_period_is_reported() {
        let table =
            LoadTable::from_records(vec![rec("b1", 1, "critical", 1.0)]).unwrap_or_default();
        let err = apply_demand_flex(
            &table,
            &rates(),
            &SeasonCalendar::full_year(),
            &settings(-0.2),
            |_| true,
        );
        assert!(matches!(err, Err(FlexError::MissingPeriodAssignment { .. })));
    }
}
