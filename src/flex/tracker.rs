//! Realized-elasticity diagnostics.

use serde::Serialize;

use super::shift::{ShiftParams, ShiftTarget};
use super::warnings::{PlausibilityWarning, WarningKind, WarningReport};

/// Realized response of one (building, slice, period, tier).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElasticityRecord {
    pub building_id: String,
    pub slice: String,
    pub energy_period: String,
    pub tier: u32,
    pub q_orig: f64,
    pub q_new: f64,
    pub price: f64,
    pub p_flat: f64,
    pub target_elasticity: f64,
    /// Empty when the ratio is undefined (zero load or price equal to flat).
    pub realized_elasticity: Option<f64>,
    pub is_receiver: bool,
}

/// `log(Q_new / Q_orig) / log(P_new / P_orig)`, or `None` when undefined.
///
/// ```
/// use demand_flex::flex::tracker::realized_elasticity;
///
/// let e = realized_elasticity(1000.0, 1000.0 * 2.0_f64.powf(-0.2), 0.1, 0.2).unwrap();
/// assert!((e + 0.2).abs() < 1e-12);
/// assert_eq!(realized_elasticity(0.0, 1.0, 0.1, 0.2), None);
/// ```
pub fn realized_elasticity(q_orig: f64, q_new: f64, p_orig: f64, p_new: f64) -> Option<f64> {
    if q_orig <= 0.0 || q_new <= 0.0 || p_orig <= 0.0 || p_new <= 0.0 {
        return None;
    }
    let price_log = (p_new / p_orig).ln();
    if price_log == 0.0 {
        return None;
    }
    let e = (q_new / q_orig).ln() / price_log;
    e.is_finite().then_some(e)
}

/// Builds tracker rows for one building slice and flags drift beyond
/// `tolerance`.
///
/// The receiver's quantity follows from conservation rather than the demand
/// curve, so only non-receiver rows are compared against the target.
pub fn track(
    building_id: &str,
    slice: &str,
    targets: &[ShiftTarget],
    params: ShiftParams,
    tolerance: f64,
    warnings: &mut WarningReport,
) -> Vec<ElasticityRecord> {
    targets
        .iter()
        .map(|t| {
            let realized = realized_elasticity(t.q_orig, t.q_target, params.p_flat, t.price);
            if let Some(e) = realized.filter(|_| !t.is_receiver) {
                let drift = (e - params.elasticity).abs();
                if drift > tolerance {
                    warnings.push(PlausibilityWarning {
                        kind: WarningKind::ElasticityDrift,
                        building_id: building_id.to_string(),
                        slice: slice.to_string(),
                        energy_period: t.key.energy_period.clone(),
                        tier: t.key.tier,
                        hour: None,
                        excess: drift - tolerance,
                        detail: format!(
                            "realized elasticity {e:.4} vs target {:.4}",
                            params.elasticity
                        ),
                    });
                }
            }
            ElasticityRecord {
                building_id: building_id.to_string(),
                slice: slice.to_string(),
                energy_period: t.key.energy_period.clone(),
                tier: t.key.tier,
                q_orig: t.q_orig,
                q_new: t.q_target,
                price: t.price,
                p_flat: params.p_flat,
                target_elasticity: params.elasticity,
                realized_elasticity: realized,
                is_receiver: t.is_receiver,
            }
        })
        .collect()
}
