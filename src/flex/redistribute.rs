//! Hourly redistribution of period-level shifts.

use std::collections::BTreeMap;

use crate::error::{FlexError, Result};
use crate::load::HourlyLoadRecord;
use crate::tariff::PeriodKey;

use super::shift::ShiftTarget;
use super::warnings::{PlausibilityWarning, WarningKind, WarningReport};

/// Spreads each period's delta over its hours in proportion to baseline use:
/// `Q'_h = Q_h + Delta_p * Q_h / Q_p`.
///
/// Hours whose shifted load drops below `min_hourly_fraction` of the original
/// are recorded in `warnings`; they are not clamped.
///
/// # Errors
///
/// Returns `MissingPeriodAssignment` if an hour's bucket has no target, and
/// `ZeroPeriodTotal` if a period with a non-zero delta has no baseline
/// consumption to weight by.
pub fn redistribute(
    building_id: &str,
    slice: &str,
    hours: &[HourlyLoadRecord],
    targets: &[ShiftTarget],
    min_hourly_fraction: f64,
    warnings: &mut WarningReport,
) -> Result<Vec<HourlyLoadRecord>> {
    let by_key: BTreeMap<&PeriodKey, &ShiftTarget> = targets.iter().map(|t| (&t.key, t)).collect();

    let mut shifted = Vec::with_capacity(hours.len());
    for h in hours {
        let key = h.key();
        let target = by_key
            .get(&key)
            .ok_or_else(|| FlexError::MissingPeriodAssignment {
                building_id: building_id.to_string(),
                hour: h.hour,
                energy_period: h.energy_period.clone(),
                tier: h.tier,
            })?;

        let mut out = h.clone();
        if target.delta != 0.0 {
            if target.q_orig <= 0.0 {
                return Err(FlexError::ZeroPeriodTotal {
                    building_id: building_id.to_string(),
                    slice: slice.to_string(),
                    energy_period: key.energy_period,
                    tier: key.tier,
                    delta: target.delta,
                });
            }
            let weight = h.kwh / target.q_orig;
            out.kwh = h.kwh + target.delta * weight;
        }

        let floor = min_hourly_fraction * h.kwh;
        if h.kwh > 0.0 && out.kwh < floor {
            warnings.push(PlausibilityWarning {
                kind: WarningKind::HourlyFloor,
                building_id: building_id.to_string(),
                slice: slice.to_string(),
                energy_period: h.energy_period.clone(),
                tier: h.tier,
                hour: Some(h.hour),
                excess: (floor - out.kwh) / h.kwh,
                detail: format!(
                    "shifted {:.4} kWh is below {:.0}% of original {:.4} kWh",
                    out.kwh,
                    min_hourly_fraction * 100.0,
                    h.kwh
                ),
            });
        }
        shifted.push(out);
    }
    Ok(shifted)
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn target(period: &str, q_orig: f64, delta: f64, is_receiver: bool) -> ShiftTarget {
        ShiftTarget {
            key: PeriodKey::new(period, 1),
            q_orig,
            price: 0.0,
            q_target: q_orig + delta,
            delta,
            is_receiver,
        }
    }

    #[test]
    fn spreads_delta_by_baseline_share() {
        let hours = vec![hour(1, "peak", 1.0), hour(2, "peak", 3.0), hour(3, "offpeak", 6.0)];
        let targets = vec![target("peak", 4.0, -0.4, false), target("offpeak", 6.0, 0.4, true)];
        let mut warnings = WarningReport::new();
        let out = redistribute("b1", "full_year", &hours, &targets, 0.1, &mut warnings)
            .expect("redistribution succeeds");
        assert!((out[0].kwh - 0.9).abs() < 1e-12);
        assert!((out[1].kwh - 2.7).abs() < 1e-12);
        assert!((out[2].kwh - 6.4).abs() < 1e-12);
        let before: f64 = hours.iter().map(|h| h.kwh).sum();
        let after: f64 = out.iter().map(|h| h.kwh).sum();
        assert!((before - after).abs() < 1e-12);
        assert!(warnings.is_empty());
    }

    #[test]
    fn zero_period_total_with_delta_fails() {
        let hours = vec![hour(1, "offpeak", 0.0), hour(2, "peak", 5.0)];
        let targets = vec![target("offpeak", 0.0, 0.5, true), target("peak", 5.0, -0.5, false)];
        let mut warnings = WarningReport::new();
        let err = redistribute("b1", "full_year", &hours, &targets, 0.1, &mut warnings);
        assert!(matches!(err, Err(FlexError::ZeroPeriodTotal { .. })));
    }

    #[test]
    fn zero_period_total_without_delta_passes_through() {
        let hours = vec![hour(1, "peak", 0.0), hour(2, "peak", 0.0)];
        let targets = vec![target("peak", 0.0, 0.0, false)];
        let mut warnings = WarningReport::new();
        let out = redistribute("b1", "full_year", &hours, &targets, 0.1, &mut warnings)
            .expect("nothing to divide");
        assert!(out.iter().all(|h| h.kwh == 0.0));
    }

    #[test]
    fn deep_cut_records_floor_warning() {
        let hours = vec![hour(1, "peak", 10.0), hour(2, "peak", 10.0)];
        let targets = vec![target("peak", 20.0, -19.0, false)];
        let mut warnings = WarningReport::new();
        let out = redistribute("b1", "full_year", &hours, &targets, 0.1, &mut warnings)
            .expect("warnings are non-fatal");
        assert!((out[0].kwh - 0.5).abs() < 1e-12);
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().all(|w| w.kind == WarningKind::HourlyFloor));
    }

    #[test]
    fn unknown_bucket_is_missing_assignment() {
        let hours = vec![hour(1, "shoulder", 1.0)];
        let targets = vec![target("peak", 1.0, 0.0, false)];
        let mut warnings = WarningReport::new();
        let err = redistribute("b1", "full_year", &hours, &targets, 0.1, &mut warnings);
        assert!(matches!(err, Err(FlexError::MissingPeriodAssignment { .. })));
    }
}
