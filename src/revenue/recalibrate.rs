//! Two-pass revenue-requirement recalibration.
//!
//! The passes are modelled as consuming state transitions so a phase cannot
//! run before the one it depends on:
//!
//! ```text
//! OriginalRrFrozen --recompute--> ShiftedRrComputed --allocate--> SubclassAllocated
//! ```
//!
//! Residual (embedded) costs are frozen from the unshifted load; only the
//! marginal-cost portion responds to the shifted load.

use tracing::info;

use crate::error::{FlexError, Result};
use crate::load::SystemLoad;

use super::calculator::{CostComponents, CostScope, CostsByType, RevenueBasis, RevenueCalculator};
use super::subclass::{SubclassRr, SubclassSpec, allocate_subclass_rr};

fn run_calculator<C: RevenueCalculator + ?Sized>(
    calculator: &C,
    load: &SystemLoad,
    basis: RevenueBasis,
    scope: CostScope,
) -> Result<CostsByType> {
    calculator
        .costs_by_type(load, basis, scope)
        .map_err(FlexError::Calculator)
}

/// Phase 1a: the target RR priced against the original load, residual frozen.
#[derive(Debug, Clone, PartialEq)]
pub struct OriginalRrFrozen {
    pub costs_orig: CostsByType,
    /// `total` is `full_rr_orig`, `marginal` is `total_mc_orig`.
    pub components: CostComponents,
    /// `components.total - components.marginal`.
    pub frozen_residual: f64,
    pub scope: CostScope,
}

impl OriginalRrFrozen {
    pub fn full_rr_orig(&self) -> f64 {
        self.components.total
    }

    /// # Errors
    ///
    /// Propagates calculator failures and missing line items.
    pub fn freeze<C: RevenueCalculator + ?Sized>(
        calculator: &C,
        original: &SystemLoad,
        target_rr: f64,
        scope: CostScope,
    ) -> Result<Self> {
        let costs_orig = run_calculator(
            calculator,
            original,
            RevenueBasis::TargetRevenueRequirement(target_rr),
            scope,
        )?;
        let components = CostComponents::from_costs(&costs_orig)?;
        let frozen_residual = components.total - components.marginal;
        info!(
            full_rr_orig = components.total,
            total_mc_orig = components.marginal,
            frozen_residual,
            "original revenue requirement frozen"
        );
        Ok(Self {
            costs_orig,
            components,
            frozen_residual,
            scope,
        })
    }

    /// Phase 2: marginal costs re-derived from the shifted load.
    ///
    /// # Errors
    ///
    /// Propagates calculator failures and missing line items.
    pub fn recompute<C: RevenueCalculator + ?Sized>(
        self,
        calculator: &C,
        shifted: &SystemLoad,
    ) -> Result<ShiftedRrComputed> {
        let costs_by_type = run_calculator(
            calculator,
            shifted,
            RevenueBasis::FrozenResidual(self.frozen_residual),
            self.scope,
        )?;
        let components = CostComponents::from_costs(&costs_by_type)?;
        let revenue_requirement_raw = components.total;
        info!(
            mc_shifted = components.marginal,
            revenue_requirement_raw,
            rr_delta = revenue_requirement_raw - self.full_rr_orig(),
            "shifted revenue requirement computed"
        );
        Ok(ShiftedRrComputed {
            frozen: self,
            costs_by_type,
            components,
            revenue_requirement_raw,
        })
    }
}

/// Phase 2 result.
#[derive(Debug, Clone, PartialEq)]
pub struct ShiftedRrComputed {
    pub frozen: OriginalRrFrozen,
    pub costs_by_type: CostsByType,
    /// Marginal and residual dollars against the shifted load.
    pub components: CostComponents,
    /// Equals `costs_by_type["Total System Costs ($)"]`.
    pub revenue_requirement_raw: f64,
}

impl ShiftedRrComputed {
    /// Phase 2.5: participating subclasses absorb the system-wide change.
    ///
    /// # Errors
    ///
    /// Returns `Config` for an invalid subclass partition.
    pub fn allocate(self, subclasses: &[SubclassSpec]) -> Result<SubclassAllocated> {
        let allocations = allocate_subclass_rr(
            subclasses,
            self.frozen.full_rr_orig(),
            self.revenue_requirement_raw,
        )?;
        Ok(SubclassAllocated {
            shifted: self,
            allocations,
        })
    }
}

/// Phase 2.5 result.
#[derive(Debug, Clone, PartialEq)]
pub struct SubclassAllocated {
    pub shifted: ShiftedRrComputed,
    pub allocations: Vec<SubclassRr>,
}

/// Where a run's revenue requirement came from.
#[derive(Debug, Clone, PartialEq)]
pub enum RevenueOutcome {
    /// Flex disabled: one pass with the target RR against the original load.
    NoFlex {
        costs_by_type: CostsByType,
        revenue_requirement_raw: f64,
    },
    Recalibrated(ShiftedRrComputed),
    Allocated(SubclassAllocated),
}

impl RevenueOutcome {
    /// The fast path used when flex is off.
    ///
    /// # Errors
    ///
    /// Propagates calculator failures and missing line items.
    pub fn no_flex<C: RevenueCalculator + ?Sized>(
        calculator: &C,
        original: &SystemLoad,
        target_rr: f64,
        scope: CostScope,
    ) -> Result<Self> {
        let costs_by_type = run_calculator(
            calculator,
            original,
            RevenueBasis::TargetRevenueRequirement(target_rr),
            scope,
        )?;
        let revenue_requirement_raw = CostComponents::from_costs(&costs_by_type)?.total;
        info!(revenue_requirement_raw, "single-pass revenue requirement");
        Ok(Self::NoFlex {
            costs_by_type,
            revenue_requirement_raw,
        })
    }

    pub fn costs_by_type(&self) -> &CostsByType {
        match self {
            Self::NoFlex { costs_by_type, .. } => costs_by_type,
            Self::Recalibrated(s) => &s.costs_by_type,
            Self::Allocated(a) => &a.shifted.costs_by_type,
        }
    }

    pub fn revenue_requirement_raw(&self) -> f64 {
        match self {
            Self::NoFlex {
                revenue_requirement_raw,
                ..
            } => *revenue_requirement_raw,
            Self::Recalibrated(s) => s.revenue_requirement_raw,
            Self::Allocated(a) => a.shifted.revenue_requirement_raw,
        }
    }

    /// Revenue requirement before flex; equals the raw RR on the fast path.
    pub fn original_revenue_requirement(&self) -> f64 {
        match self {
            Self::NoFlex {
                revenue_requirement_raw,
                ..
            } => *revenue_requirement_raw,
            Self::Recalibrated(s) => s.frozen.full_rr_orig(),
            Self::Allocated(a) => a.shifted.frozen.full_rr_orig(),
        }
    }

    pub fn subclass_rr(&self) -> &[SubclassRr] {
        match self {
            Self::Allocated(a) => &a.allocations,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CalculatorError;
    use crate::load::HourlyLoadRecord;
    use crate::revenue::calculator::{
        MarginalCostCalculator, MarginalCostCurve, RESIDUAL_COSTS, TOTAL_SYSTEM_COSTS,
    };

    fn system(values: &[f64]) -> SystemLoad {
        let records: Vec<HourlyLoadRecord> = values
            .iter()
            .enumerate()
            .map(|(i, &kwh)| HourlyLoadRecord {
                building_id: "b".into(),
                hour: i as u32 + 1,
                energy_period: "p".into(),
                tier: 1,
                kwh,
                subclass: None,
            })
            .collect();
        SystemLoad::from_records(&records)
    }

    fn calculator() -> MarginalCostCalculator {
        MarginalCostCalculator::new(MarginalCostCurve::from_values([0.5, 0.1]), None)
    }

    struct Failing;

    impl RevenueCalculator for Failing {
        fn costs_by_type(
            &self,
            _load: &SystemLoad,
            _basis: RevenueBasis,
            _scope: CostScope,
        ) -> std::result::Result<CostsByType, CalculatorError> {
            Err("calculator offline".into())
        }
    }

    struct NoResidual;

    impl RevenueCalculator for NoResidual {
        fn costs_by_type(
            &self,
            _load: &SystemLoad,
            _basis: RevenueBasis,
            _scope: CostScope,
        ) -> std::result::Result<CostsByType, CalculatorError> {
            let mut costs = CostsByType::new();
            costs.insert(crate::revenue::calculator::TOTAL_MARGINAL_COSTS, 10.0);
            costs.insert(TOTAL_SYSTEM_COSTS, 100.0);
            Ok(costs)
        }
    }

    #[test]
    fn freeze_requires_every_cost_component() {
        let err =
            OriginalRrFrozen::freeze(&NoResidual, &system(&[1.0]), 100.0, CostScope::Delivery);
        match err {
            Err(FlexError::Calculator(inner)) => {
                assert!(inner.to_string().contains(RESIDUAL_COSTS));
            }
            other => panic!("expected missing line item, got {other:?}"),
        }
    }

    #[test]
    fn freeze_then_recompute_keeps_residual() {
        let calc = calculator();
        let frozen =
            OriginalRrFrozen::freeze(&calc, &system(&[100.0, 100.0]), 1000.0, CostScope::Delivery)
                .expect("freeze succeeds");
        assert!((frozen.components.marginal - 60.0).abs() < 1e-9);
        assert!((frozen.full_rr_orig() - 1000.0).abs() < 1e-9);
        assert_eq!(
            frozen.frozen_residual,
            frozen.components.total - frozen.components.marginal
        );

        // move 50 kWh from the expensive hour to the cheap one
        let shifted = frozen
            .recompute(&calc, &system(&[50.0, 150.0]))
            .expect("recompute succeeds");
        assert!((shifted.components.marginal - 40.0).abs() < 1e-9);
        assert_eq!(shifted.components.residual, shifted.frozen.frozen_residual);
        assert_eq!(
            shifted.revenue_requirement_raw,
            shifted.components.marginal + shifted.frozen.frozen_residual
        );
        assert_eq!(
            shifted.costs_by_type.get(TOTAL_SYSTEM_COSTS),
            Some(shifted.revenue_requirement_raw)
        );
        assert_eq!(
            shifted.costs_by_type.get(RESIDUAL_COSTS),
            Some(shifted.frozen.frozen_residual)
        );
    }

    #[test]
    fn allocation_sums_to_raw() {
        let calc = calculator();
        let allocated =
            OriginalRrFrozen::freeze(&calc, &system(&[100.0, 100.0]), 1000.0, CostScope::Delivery)
                .and_then(|f| f.recompute(&calc, &system(&[50.0, 150.0])))
                .and_then(|s| {
                    s.allocate(&[
                        SubclassSpec {
                            name: "tou".into(),
                            rr_ratio: 0.25,
                            shifts: true,
                        },
                        SubclassSpec {
                            name: "flat".into(),
                            rr_ratio: 0.75,
                            shifts: false,
                        },
                    ])
                })
                .expect("pipeline succeeds");
        let outcome = RevenueOutcome::Allocated(allocated);
        let total: f64 = outcome
            .subclass_rr()
            .iter()
            .map(|s| s.revenue_requirement)
            .sum();
        assert!((total - outcome.revenue_requirement_raw()).abs() < 1e-9);
        assert!((outcome.original_revenue_requirement() - 1000.0).abs() < 1e-9);
        assert!((outcome.subclass_rr()[1].revenue_requirement - 750.0).abs() < 1e-9);
    }

    #[test]
    fn no_flex_hits_target() {
        let outcome = RevenueOutcome::no_flex(
            &calculator(),
            &system(&[100.0, 100.0]),
            1000.0,
            CostScope::Delivery,
        )
        .expect("single pass");
        assert!((outcome.revenue_requirement_raw() - 1000.0).abs() < 1e-9);
        assert!(outcome.subclass_rr().is_empty());
    }

    #[test]
    fn calculator_failure_propagates() {
        let err = OriginalRrFrozen::freeze(&Failing, &system(&[1.0]), 10.0, CostScope::Delivery);
        match err {
            Err(FlexError::Calculator(inner)) => {
                assert_eq!(inner.to_string(), "calculator offline");
            }
            other => panic!("expected calculator error, got {other:?}"),
        }
    }
}
