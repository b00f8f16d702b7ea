//! Constant-elasticity shift targets with a single receiver period.

use crate::error::{FlexError, Result};
use crate::tariff::PeriodKey;

use super::aggregate::PeriodAggregate;

/// Per-slice shifting parameters, resolved once before any building shifts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShiftParams {
    /// Flat-equivalent baseline price ($/kWh, > 0).
    pub p_flat: f64,
    /// Constant price elasticity of demand (typically negative).
    pub elasticity: f64,
}

impl ShiftParams {
    /// # Errors
    ///
    /// Returns `InvalidFlatTariff` unless `p_flat` is finite and > 0, and
    /// `Config` if the elasticity is not finite.
    pub fn new(p_flat: f64, elasticity: f64) -> Result<Self> {
        if !(p_flat.is_finite() && p_flat > 0.0) {
            return Err(FlexError::InvalidFlatTariff(p_flat));
        }
        if !elasticity.is_finite() {
            return Err(FlexError::Config(format!(
                "demand elasticity must be finite, got {elasticity}"
            )));
        }
        Ok(Self { p_flat, elasticity })
    }
}

/// Target consumption and shift for one (period, tier) of one building.
#[derive(Debug, Clone, PartialEq)]
pub struct ShiftTarget {
    pub key: PeriodKey,
    pub q_orig: f64,
    pub price: f64,
    /// `Q_orig + delta`.
    pub q_target: f64,
    pub delta: f64,
    /// Whether this row absorbs the offsetting shift.
    pub is_receiver: bool,
}

/// Locates the unique row priced below `p_flat`.
///
/// # Errors
///
/// Returns `AmbiguousReceiverPeriod` when zero or several rows qualify.
pub fn find_receiver(
    building_id: &str,
    slice: &str,
    aggregates: &[PeriodAggregate],
    p_flat: f64,
) -> Result<usize> {
    let candidates: Vec<usize> = aggregates
        .iter()
        .enumerate()
        .filter(|(_, a)| a.price < p_flat)
        .map(|(i, _)| i)
        .collect();
    match candidates.as_slice() {
        [only] => Ok(*only),
        _ => Err(FlexError::AmbiguousReceiverPeriod {
            building_id: building_id.to_string(),
            slice: slice.to_string(),
            p_flat,
            candidates: candidates
                .iter()
                .map(|&i| aggregates[i].key.to_string())
                .collect(),
        }),
    }
}

/// Computes `Q_target = Q_orig * (P / P_flat)^epsilon` for every row except
/// the receiver, which takes the negated sum of the other deltas so the
/// building's total consumption is unchanged.
///
/// # Errors
///
/// Propagates [`find_receiver`] failures.
pub fn compute_shift(
    building_id: &str,
    slice: &str,
    aggregates: &[PeriodAggregate],
    params: ShiftParams,
) -> Result<Vec<ShiftTarget>> {
    let receiver = find_receiver(building_id, slice, aggregates, params.p_flat)?;

    let mut targets: Vec<ShiftTarget> = aggregates
        .iter()
        .enumerate()
        .map(|(i, a)| {
            let q_target = if i == receiver {
                a.q_orig
            } else {
                a.q_orig * (a.price / params.p_flat).powf(params.elasticity)
            };
            ShiftTarget {
                key: a.key.clone(),
                q_orig: a.q_orig,
                price: a.price,
                q_target,
                delta: q_target - a.q_orig,
                is_receiver: i == receiver,
            }
        })
        .collect();

    let others: f64 = targets
        .iter()
        .filter(|t| !t.is_receiver)
        .map(|t| t.delta)
        .sum();
    let sink = &mut targets[receiver];
    sink.delta = -others;
    sink.q_target = sink.q_orig + sink.delta;
    Ok(targets)
}
