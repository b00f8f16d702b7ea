//! Receiver-period selection and structural error reporting.

mod common;

use demand_flex::config::FlexConfig;
use demand_flex::error::FlexError;
use demand_flex::flex::apply_demand_flex;
use demand_flex::load::LoadTable;
use demand_flex::season::SeasonCalendar;
use demand_flex::tariff::{PeriodKey, RateStructure};

fn three_period_table() -> LoadTable {
    let mut records = common::building_records("b1", &[100.0; 2], &[100.0; 2]);
    records.push(common::record("b1", 5, "shoulder", 100.0));
    records.push(common::record("b1", 6, "shoulder", 100.0));
    LoadTable::from_records(records).unwrap_or_default()
}

fn run(table: &LoadTable, rates: &RateStructure, settings: &FlexConfig) -> Result<(), FlexError> {
    apply_demand_flex(table, rates, &SeasonCalendar::full_year(), settings, |_| true).map(|_| ())
}

#[test]
fn two_periods_below_flat_price_are_ambiguous() {
    let mut rates = common::two_period_rates();
    rates.insert(PeriodKey::new("shoulder", 1), 0.12).ok();
    // P_flat = (0.30 + 0.10 + 0.12) / 3 ~ 0.173; offpeak and shoulder both below
    let err = run(&three_period_table(), &rates, &common::flex_settings(-0.2));
    match err {
        Err(FlexError::AmbiguousReceiverPeriod {
            building_id,
            candidates,
            ..
        }) => {
            assert_eq!(building_id, "b1");
            assert_eq!(candidates.len(), 2);
        }
        other => panic!("expected ambiguous receiver, got {other:?}"),
    }
}

#[test]
fn no_period_below_flat_price_is_ambiguous() {
    let settings = FlexConfig {
        equivalent_flat_tariff: Some(0.05),
        ..common::flex_settings(-0.2)
    };
    let err = run(&common::worked_example_table(), &common::two_period_rates(), &settings);
    match err {
        Err(FlexError::AmbiguousReceiverPeriod { candidates, .. }) => {
            assert!(candidates.is_empty())
        }
        other => panic!("expected ambiguous receiver, got {other:?}"),
    }
}

#[test]
fn single_cheap_period_with_shoulder_above_flat_price() {
    let mut rates = common::two_period_rates();
    rates.insert(PeriodKey::new("shoulder", 1), 0.25).ok();
    let out = apply_demand_flex(
        &three_period_table(),
        &rates,
        &SeasonCalendar::full_year(),
        &common::flex_settings(-0.2),
        |_| true,
    )
    .expect("one receiver");
    assert_eq!(out.shifts[0].receiver(), Some(&PeriodKey::new("offpeak", 1)));
    assert!((out.load.total_kwh() - 600.0).abs() < 1e-9);
}

#[test]
fn zero_receiver_total_with_nonzero_shift_is_fatal() {
    let records = common::building_records("b1", &[100.0, 100.0], &[0.0, 0.0]);
    let table = LoadTable::from_records(records).unwrap_or_default();
    let settings = FlexConfig {
        equivalent_flat_tariff: Some(0.2),
        ..common::flex_settings(-0.2)
    };
    let err = run(&table, &common::two_period_rates(), &settings);
    match err {
        Err(FlexError::ZeroPeriodTotal { energy_period, .. }) => {
            assert_eq!(energy_period, "offpeak")
        }
        other => panic!("expected zero period total, got {other:?}"),
    }
}

#[test]
fn empty_period_without_shift_is_not_fatal() {
    let records = common::building_records("b1", &[0.0, 0.0], &[100.0, 100.0]);
    let table = LoadTable::from_records(records).unwrap_or_default();
    let settings = FlexConfig {
        equivalent_flat_tariff: Some(0.2),
        ..common::flex_settings(-0.2)
    };
    // peak has no load, so its delta is zero and nothing divides by zero
    assert!(run(&table, &common::two_period_rates(), &settings).is_ok());
}

#[test]
fn invalid_flat_tariff_is_rejected() {
    let settings = FlexConfig {
        equivalent_flat_tariff: Some(0.0),
        ..common::flex_settings(-0.2)
    };
    let err = run(&common::worked_example_table(), &common::two_period_rates(), &settings);
    assert!(matches!(err, Err(FlexError::InvalidFlatTariff(_))));
}
