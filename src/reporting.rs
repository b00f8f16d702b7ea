//! Post-run summary of a demand-flex run.

use std::fmt;

use crate::flex::BuildingShift;
use crate::flex::warnings::WarningReport;
use crate::load::LoadTable;
use crate::revenue::RevenueOutcome;

/// Aggregate figures derived from a complete run.
///
/// Computed post-hoc from the run outputs so the printed numbers always agree
/// with the files written next to them.
#[derive(Debug, Clone, PartialEq)]
pub struct FlexSummary {
    /// Buildings in the load table.
    pub buildings: usize,
    /// Buildings that received at least one shift.
    pub shifted_buildings: usize,
    /// Total consumption before shifting (kWh).
    pub kwh_before: f64,
    /// Total consumption after shifting (kWh).
    pub kwh_after: f64,
    /// Energy moved into receiver periods (kWh).
    pub shifted_kwh: f64,
    /// (building, slice) pairs with a receiver period.
    pub receivers: usize,
    pub warnings: usize,
    /// Revenue requirement against the original load ($).
    pub rr_before: f64,
    /// Revenue requirement after recalibration ($).
    pub rr_after: f64,
    /// `false` when the single-pass path ran.
    pub flex_active: bool,
}

impl FlexSummary {
    pub fn from_run(
        original: &LoadTable,
        shifted: &LoadTable,
        shifts: &[BuildingShift],
        warnings: &WarningReport,
        revenue: &RevenueOutcome,
    ) -> Self {
        let mut shifted_ids: Vec<&str> = shifts.iter().map(|s| s.building_id.as_str()).collect();
        shifted_ids.dedup();
        Self {
            buildings: original.len(),
            shifted_buildings: shifted_ids.len(),
            kwh_before: original.total_kwh(),
            kwh_after: shifted.total_kwh(),
            shifted_kwh: shifts.iter().map(BuildingShift::shifted_kwh).sum(),
            receivers: shifts.iter().filter(|s| s.receiver().is_some()).count(),
            warnings: warnings.len(),
            rr_before: revenue.original_revenue_requirement(),
            rr_after: revenue.revenue_requirement_raw(),
            flex_active: !matches!(revenue, RevenueOutcome::NoFlex { .. }),
        }
    }

    /// Relative change of the revenue requirement (%).
    pub fn rr_change_pct(&self) -> f64 {
        if self.rr_before != 0.0 {
            100.0 * (self.rr_after - self.rr_before) / self.rr_before
        } else {
            0.0
        }
    }
}

impl fmt::Display for FlexSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Demand Flex Summary ---")?;
        if !self.flex_active {
            writeln!(f, "Demand flex:           disabled (single pass)")?;
        }
        writeln!(
            f,
            "Buildings:             {} ({} shifted)",
            self.buildings, self.shifted_buildings
        )?;
        writeln!(f, "Consumption before:    {:.2} kWh", self.kwh_before)?;
        writeln!(f, "Consumption after:     {:.2} kWh", self.kwh_after)?;
        writeln!(
            f,
            "Shifted to receivers:  {:.2} kWh ({} receivers)",
            self.shifted_kwh, self.receivers
        )?;
        writeln!(f, "Plausibility warnings: {}", self.warnings)?;
        writeln!(f, "Revenue req. before:   ${:.2}", self.rr_before)?;
        write!(
            f,
            "Revenue req. after:    ${:.2} ({:+.3}%)",
            self.rr_after,
            self.rr_change_pct()
        )
    }
}
