//! Revenue-requirement calculator seam and the marginal-cost implementation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CalculatorError, FlexError, Result};
use crate::load::{HOURS_PER_YEAR, SystemLoad};

pub const MARGINAL_DELIVERY_COSTS: &str = "Marginal Delivery Costs ($)";
pub const MARGINAL_SUPPLY_COSTS: &str = "Marginal Supply Costs ($)";
pub const TOTAL_MARGINAL_COSTS: &str = "Total Marginal Costs ($)";
pub const RESIDUAL_COSTS: &str = "Residual Costs ($)";
pub const TOTAL_SYSTEM_COSTS: &str = "Total System Costs ($)";

/// Which marginal costs count toward the revenue requirement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CostScope {
    #[default]
    Delivery,
    DeliveryAndSupply,
}

/// What the calculator should hit: a total target, or a residual to add
/// verbatim on top of marginal costs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RevenueBasis {
    TargetRevenueRequirement(f64),
    FrozenResidual(f64),
}

/// Cost decomposition keyed by line-item label.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CostsByType(BTreeMap<String, f64>);

impl CostsByType {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, item: impl Into<String>, dollars: f64) {
        self.0.insert(item.into(), dollars);
    }

    pub fn get(&self, item: &str) -> Option<f64> {
        self.0.get(item).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Value of a line item the pipeline cannot do without.
    ///
    /// # Errors
    ///
    /// Returns `Calculator` when the calculator omitted the item.
    pub fn require(&self, item: &str) -> Result<f64> {
        self.get(item).ok_or_else(|| {
            FlexError::Calculator(format!("costs_by_type is missing \"{item}\"").into())
        })
    }
}

/// Marginal and residual dollars of one calculator pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostComponents {
    pub marginal: f64,
    pub residual: f64,
    pub total: f64,
}

impl CostComponents {
    /// # Errors
    ///
    /// Returns `Calculator` when a required line item is missing.
    pub fn from_costs(costs: &CostsByType) -> Result<Self> {
        Ok(Self {
            marginal: costs.require(TOTAL_MARGINAL_COSTS)?,
            residual: costs.require(RESIDUAL_COSTS)?,
            total: costs.require(TOTAL_SYSTEM_COSTS)?,
        })
    }
}

/// Computes a revenue-requirement decomposition for a system load shape.
pub trait RevenueCalculator {
    /// Returns at least [`TOTAL_MARGINAL_COSTS`], [`RESIDUAL_COSTS`] and
    /// [`TOTAL_SYSTEM_COSTS`].
    fn costs_by_type(
        &self,
        load: &SystemLoad,
        basis: RevenueBasis,
        scope: CostScope,
    ) -> std::result::Result<CostsByType, CalculatorError>;
}

/// One row of a marginal-cost table.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MarginalCostRecord {
    pub hour: u32,
    /// Marginal cost ($/kWh).
    pub marginal_cost: f64,
}

/// Hourly marginal cost over the year; hours not given cost nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct MarginalCostCurve {
    per_kwh: Vec<f64>,
}

impl MarginalCostCurve {
    pub fn zeros() -> Self {
        Self {
            per_kwh: vec![0.0; HOURS_PER_YEAR as usize],
        }
    }

    /// Builds a curve from `hour -> $/kWh` values in hour order (hour 1 first).
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Self {
        let mut curve = Self::zeros();
        for (slot, v) in curve.per_kwh.iter_mut().zip(values) {
            *slot = v;
        }
        curve
    }

    /// # Errors
    ///
    /// Returns `InvalidInput` for hours outside 1..=8760, repeated hours, or
    /// non-finite costs.
    pub fn from_records(
        table: &'static str,
        records: impl IntoIterator<Item = MarginalCostRecord>,
    ) -> Result<Self> {
        let mut curve = Self::zeros();
        let mut seen = vec![false; HOURS_PER_YEAR as usize];
        for r in records {
            if r.hour == 0 || r.hour > HOURS_PER_YEAR {
                return Err(FlexError::InvalidInput {
                    table,
                    message: format!("hour {} outside 1..={HOURS_PER_YEAR}", r.hour),
                });
            }
            if !r.marginal_cost.is_finite() {
                return Err(FlexError::InvalidInput {
                    table,
                    message: format!("hour {}: marginal cost must be finite", r.hour),
                });
            }
            let idx = (r.hour - 1) as usize;
            if std::mem::replace(&mut seen[idx], true) {
                return Err(FlexError::InvalidInput {
                    table,
                    message: format!("hour {} appears more than once", r.hour),
                });
            }
            curve.per_kwh[idx] = r.marginal_cost;
        }
        Ok(curve)
    }

    /// Cost at `hour` (1-based).
    pub fn at(&self, hour: u32) -> f64 {
        hour.checked_sub(1)
            .and_then(|i| self.per_kwh.get(i as usize))
            .copied()
            .unwrap_or(0.0)
    }

    /// Dollars incurred serving `load`.
    pub fn cost_of(&self, load: &SystemLoad) -> f64 {
        load.iter().map(|(h, kwh)| kwh * self.at(h)).sum()
    }

    fn plus(&self, other: &Self) -> Self {
        Self {
            per_kwh: self
                .per_kwh
                .iter()
                .zip(&other.per_kwh)
                .map(|(a, b)| a + b)
                .collect(),
        }
    }
}

/// Prices system load at hourly marginal costs and fills the rest of the
/// revenue requirement with a residual.
#[derive(Debug, Clone, PartialEq)]
pub struct MarginalCostCalculator {
    delivery: MarginalCostCurve,
    supply: Option<MarginalCostCurve>,
}

impl MarginalCostCalculator {
    pub fn new(delivery: MarginalCostCurve, supply: Option<MarginalCostCurve>) -> Self {
        Self { delivery, supply }
    }

    /// Combined hourly marginal cost under `scope`.
    ///
    /// # Errors
    ///
    /// Returns `Config` if supply costs are requested but none were loaded.
    pub fn combined_curve(&self, scope: CostScope) -> Result<MarginalCostCurve> {
        match scope {
            CostScope::Delivery => Ok(self.delivery.clone()),
            CostScope::DeliveryAndSupply => self
                .supply
                .as_ref()
                .map(|s| self.delivery.plus(s))
                .ok_or_else(|| FlexError::Config(missing_supply().to_string())),
        }
    }
}

fn missing_supply() -> &'static str {
    "delivery_and_supply scope requires a supply marginal-cost table"
}

impl RevenueCalculator for MarginalCostCalculator {
    fn costs_by_type(
        &self,
        load: &SystemLoad,
        basis: RevenueBasis,
        scope: CostScope,
    ) -> std::result::Result<CostsByType, CalculatorError> {
        let mut costs = CostsByType::new();
        let delivery = self.delivery.cost_of(load);
        costs.insert(MARGINAL_DELIVERY_COSTS, delivery);

        let marginal = match scope {
            CostScope::Delivery => delivery,
            CostScope::DeliveryAndSupply => {
                let supply = self.supply.as_ref().ok_or(missing_supply())?.cost_of(load);
                costs.insert(MARGINAL_SUPPLY_COSTS, supply);
                delivery + supply
            }
        };
        let residual = match basis {
            RevenueBasis::TargetRevenueRequirement(rr) => rr - marginal,
            RevenueBasis::FrozenResidual(residual) => residual,
        };
        costs.insert(TOTAL_MARGINAL_COSTS, marginal);
        costs.insert(RESIDUAL_COSTS, residual);
        costs.insert(TOTAL_SYSTEM_COSTS, marginal + residual);
        Ok(costs)
    }
}
