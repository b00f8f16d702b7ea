//! Revenue-requirement recalibration around a demand-flex run.

pub mod calculator;
pub mod precalc;
pub mod recalibrate;
pub mod subclass;

pub use calculator::{
    CostComponents, CostScope, CostsByType, MarginalCostCalculator, MarginalCostCurve,
    RevenueBasis, RevenueCalculator,
};
pub use recalibrate::{OriginalRrFrozen, RevenueOutcome, ShiftedRrComputed, SubclassAllocated};
pub use subclass::{SubclassRr, SubclassSpec};
