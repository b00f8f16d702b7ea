//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use demand_flex::config::FlexConfig;
use demand_flex::load::{HourlyLoadRecord, LoadTable};
use demand_flex::revenue::{MarginalCostCalculator, MarginalCostCurve};
use demand_flex::tariff::{PeriodKey, RateStructure};

pub const PEAK_PRICE: f64 = 0.30;
pub const OFFPEAK_PRICE: f64 = 0.10;

/// Two-period rate structure (peak 0.30, offpeak 0.10 $/kWh, tier 1).
pub fn two_period_rates() -> RateStructure {
    let mut rates = RateStructure::new();
    rates.insert(PeriodKey::new("peak", 1), PEAK_PRICE).ok();
    rates.insert(PeriodKey::new("offpeak", 1), OFFPEAK_PRICE).ok();
    rates
}

pub fn record(building: &str, hour: u32, period: &str, kwh: f64) -> HourlyLoadRecord {
    HourlyLoadRecord {
        building_id: building.into(),
        hour,
        energy_period: period.into(),
        tier: 1,
        kwh,
        subclass: None,
    }
}

/// One building's rows: `peak` hours first, then `offpeak` hours, numbered
/// consecutively from hour 1.
pub fn building_records(building: &str, peak: &[f64], offpeak: &[f64]) -> Vec<HourlyLoadRecord> {
    let peak_rows = peak.iter().map(|&kwh| ("peak", kwh));
    let offpeak_rows = offpeak.iter().map(|&kwh| ("offpeak", kwh));
    peak_rows
        .chain(offpeak_rows)
        .enumerate()
        .map(|(i, (period, kwh))| record(building, i as u32 + 1, period, kwh))
        .collect()
}

/// Single building with 1000 kWh on peak (4 hours) and 2000 kWh off-peak
/// (8 hours), as in the reference worked example.
pub fn worked_example_table() -> LoadTable {
    LoadTable::from_records(building_records("b1", &[250.0; 4], &[250.0; 8])).unwrap_or_default()
}

/// Flex settings with the given elasticity and defaults otherwise.
pub fn flex_settings(elasticity: f64) -> FlexConfig {
    FlexConfig {
        demand_elasticity: elasticity,
        ..FlexConfig::default()
    }
}

/// Marginal costs of 0.12 $/kWh in hours 1..=4 and 0.02 elsewhere.
pub fn peak_heavy_calculator() -> MarginalCostCalculator {
    let values = (1..=12).map(|h| if h <= 4 { 0.12 } else { 0.02 });
    MarginalCostCalculator::new(MarginalCostCurve::from_values(values), None)
}
