//! Subclass revenue-requirement allocation after a flex run.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{FlexError, Result};

/// A customer subclass and its pre-flex share of the revenue requirement.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SubclassSpec {
    pub name: String,
    /// Baseline share of the system revenue requirement (> 0).
    pub rr_ratio: f64,
    /// Whether buildings in this subclass respond to price.
    #[serde(default)]
    pub shifts: bool,
}

/// Final revenue requirement of one subclass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubclassRr {
    pub subclass: String,
    pub participating: bool,
    /// `rr_ratio * full_rr_orig`.
    pub baseline_rr: f64,
    pub revenue_requirement: f64,
}

/// Splits `revenue_requirement_raw` across subclasses.
///
/// Non-participating subclasses keep their baseline; participating ones absorb
/// the whole system-wide change, split by baseline share. The last
/// participating subclass takes the remainder so the parts add back to the
/// total.
///
/// # Errors
///
/// Returns `Config` when no subclass shifts or a ratio is not positive.
pub fn allocate_subclass_rr(
    subclasses: &[SubclassSpec],
    full_rr_orig: f64,
    revenue_requirement_raw: f64,
) -> Result<Vec<SubclassRr>> {
    if let Some(bad) = subclasses
        .iter()
        .find(|s| !(s.rr_ratio.is_finite() && s.rr_ratio > 0.0))
    {
        return Err(FlexError::Config(format!(
            "subclass \"{}\" rr_ratio must be > 0, got {}",
            bad.name, bad.rr_ratio
        )));
    }
    let shifting_ratio: f64 = subclasses.iter().filter(|s| s.shifts).map(|s| s.rr_ratio).sum();
    let Some(last_shifting) = subclasses.iter().rposition(|s| s.shifts) else {
        return Err(FlexError::Config(
            "at least one subclass must have shifts = true".into(),
        ));
    };

    let non_participating: f64 = subclasses
        .iter()
        .filter(|s| !s.shifts)
        .map(|s| s.rr_ratio * full_rr_orig)
        .sum();
    let rr_shifting = revenue_requirement_raw - non_participating;

    let mut assigned = 0.0;
    let allocations: Vec<SubclassRr> = subclasses
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let baseline_rr = s.rr_ratio * full_rr_orig;
            let revenue_requirement = if !s.shifts {
                baseline_rr
            } else if i == last_shifting {
                rr_shifting - assigned
            } else {
                let part = rr_shifting * s.rr_ratio / shifting_ratio;
                assigned += part;
                part
            };
            SubclassRr {
                subclass: s.name.clone(),
                participating: s.shifts,
                baseline_rr,
                revenue_requirement,
            }
        })
        .collect();

    info!(
        subclasses = allocations.len(),
        rr_shifting,
        rr_non_participating = non_participating,
        "subclass revenue requirements allocated"
    );
    Ok(allocations)
}
