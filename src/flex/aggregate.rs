//! Period aggregation: hourly rows collapsed into (period, tier) totals.

use std::collections::BTreeMap;

use crate::error::{FlexError, Result};
use crate::load::HourlyLoadRecord;
use crate::tariff::{PeriodKey, RateStructure};

/// Baseline consumption of one building in one (period, tier), with its price.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodAggregate {
    pub key: PeriodKey,
    /// Summed baseline consumption `Q_orig` (kWh).
    pub q_orig: f64,
    /// Joined unit price `P_period` ($/kWh).
    pub price: f64,
}

/// Sums one building's hours per (period, tier) and joins the tariff price.
///
/// # Errors
///
/// Returns `MissingPeriodAssignment` for the first hour whose bucket has no
/// rate, or whose period label is blank.
pub fn aggregate_periods<'a>(
    hours: impl IntoIterator<Item = &'a HourlyLoadRecord>,
    rates: &RateStructure,
) -> Result<Vec<PeriodAggregate>> {
    let mut totals: BTreeMap<PeriodKey, (f64, f64)> = BTreeMap::new();
    for h in hours {
        let key = h.key();
        let price = rates
            .rate(&key)
            .filter(|_| !h.energy_period.trim().is_empty())
            .ok_or_else(|| FlexError::MissingPeriodAssignment {
                building_id: h.building_id.clone(),
                hour: h.hour,
                energy_period: h.energy_period.clone(),
                tier: h.tier,
            })?;
        totals.entry(key).or_insert((0.0, price)).0 += h.kwh;
    }
    Ok(totals
        .into_iter()
        .map(|(key, (q_orig, price))| PeriodAggregate { key, q_orig, price })
        .collect())
}

/// Quantity-weighted average price `sum(Q*P) / sum(Q)` across aggregates.
///
/// # Errors
///
/// Returns `InvalidFlatTariff` when the result is not strictly positive,
/// which includes a slice with no consumption at all.
pub fn flat_equivalent_price<'a>(
    aggregates: impl IntoIterator<Item = &'a PeriodAggregate>,
) -> Result<f64> {
    let (cost, energy) = aggregates
        .into_iter()
        .fold((0.0, 0.0), |(c, q), a| (c + a.q_orig * a.price, q + a.q_orig));
    let p_flat = cost / energy;
    if p_flat.is_finite() && p_flat > 0.0 {
        Ok(p_flat)
    } else {
        Err(FlexError::InvalidFlatTariff(p_flat))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rates() -> RateStructure {
        let mut r = RateStructure::new();
        r.insert(PeriodKey::new("peak", 1), 0.30).ok();
        r.insert(PeriodKey::new("offpeak", 1), 0.10).ok();
        r
    }

    fn hour(h: u32, period: &str, kwh: f64) -> HourlyLoadRecord {
        HourlyLoadRecord {
            building_id: "b1".into(),
            hour: h,
            energy_period: period.into(),
            tier: 1,
            kwh,
            subclass: None,
        }
    }

    #[test]
    fn sums_per_period_and_joins_price() {
        let hours = vec![
            hour(1, "offpeak", 1.0),
            hour(2, "peak", 2.0),
            hour(3, "offpeak", 3.0),
        ];
        let aggs = aggregate_periods(&hours, &rates()).expect("all hours priced");
        assert_eq!(aggs.len(), 2);
        let off = aggs.iter().find(|a| a.key.energy_period == "offpeak");
        assert_eq!(off.map(|a| a.q_orig), Some(4.0));
        assert_eq!(off.map(|a| a.price), Some(0.10));
    }

    #[test]
    fn unresolved_hour_is_an_error() {
        let hours = vec![hour(1, "offpeak", 1.0), hour(7, "shoulder", 2.0)];
        match aggregate_periods(&hours, &rates()) {
            Err(FlexError::MissingPeriodAssignment {
                hour, energy_period, ..
            }) => {
                assert_eq!(hour, 7);
                assert_eq!(energy_period, "shoulder");
            }
            other => panic!("expected MissingPeriodAssignment, got {other:?}"),
        }
    }

    #[test]
    fn flat_price_is_quantity_weighted() {
        let aggs = vec![
            PeriodAggregate {
                key: PeriodKey::new("peak", 1),
                q_orig: 1000.0,
                price: 0.30,
            },
            PeriodAggregate {
                key: PeriodKey::new("offpeak", 1),
                q_orig: 2000.0,
                price: 0.10,
            },
        ];
        let p = flat_equivalent_price(&aggs).expect("positive price");
        assert!((p - 0.5 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn flat_price_of_empty_slice_is_invalid() {
        let aggs: Vec<PeriodAggregate> = Vec::new();
        assert!(matches!(
            flat_equivalent_price(&aggs),
            Err(FlexError::InvalidFlatTariff(_))
        ));
    }
}
