//! Plausibility warnings collected during a run and reported once at the end.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{FlexError, Result};

/// How plausibility findings affect the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Record and report; the run continues.
    #[default]
    Warn,
    /// Any finding fails the run after the shift completes.
    Error,
}

/// Category of a plausibility finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WarningKind {
    /// Shifted hourly load fell below the configured fraction of the original.
    HourlyFloor,
    /// Realized elasticity is further from the target than the tolerance.
    ElasticityDrift,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HourlyFloor => f.write_str("hourly_floor"),
            Self::ElasticityDrift => f.write_str("elasticity_drift"),
        }
    }
}

/// One plausibility finding.
#[derive(Debug, Clone, PartialEq)]
pub struct PlausibilityWarning {
    pub kind: WarningKind,
    pub building_id: String,
    pub slice: String,
    pub energy_period: String,
    pub tier: u32,
    /// Set for hour-level findings.
    pub hour: Option<u32>,
    /// How far past the threshold the finding is; larger is worse.
    pub excess: f64,
    pub detail: String,
}

impl fmt::Display for PlausibilityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] building {} ({}) {}/{}",
            self.kind, self.building_id, self.slice, self.energy_period, self.tier
        )?;
        if let Some(h) = self.hour {
            write!(f, " hour {h}")?;
        }
        write!(f, ": {}", self.detail)
    }
}

/// Aggregated plausibility findings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WarningReport {
    warnings: Vec<PlausibilityWarning>,
}

impl WarningReport {
    /// Worst offenders listed per kind in summaries.
    pub const WORST_SHOWN: usize = 3;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, warning: PlausibilityWarning) {
        self.warnings.push(warning);
    }

    pub fn merge(&mut self, other: WarningReport) {
        self.warnings.extend(other.warnings);
    }

    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlausibilityWarning> {
        self.warnings.iter()
    }

    /// Findings per kind.
    pub fn counts(&self) -> BTreeMap<WarningKind, usize> {
        let mut counts = BTreeMap::new();
        for w in &self.warnings {
            *counts.entry(w.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Up to `n` findings of `kind`, worst first.
    pub fn worst(&self, kind: WarningKind, n: usize) -> Vec<&PlausibilityWarning> {
        let mut of_kind: Vec<&PlausibilityWarning> =
            self.warnings.iter().filter(|w| w.kind == kind).collect();
        of_kind.sort_by(|a, b| b.excess.total_cmp(&a.excess));
        of_kind.truncate(n);
        of_kind
    }

    /// Emits one summary event per kind.
    pub fn log_summary(&self) {
        for (kind, count) in self.counts() {
            let worst: Vec<String> = self
                .worst(kind, Self::WORST_SHOWN)
                .iter()
                .map(ToString::to_string)
                .collect();
            warn!(%kind, count, worst = %worst.join(" | "), "plausibility warnings");
        }
    }

    /// Fails when `severity` escalates findings and any were recorded.
    ///
    /// # Errors
    ///
    /// Returns `Plausibility` carrying the summary text.
    pub fn enforce(&self, severity: Severity) -> Result<()> {
        if severity == Severity::Error && !self.is_empty() {
            return Err(FlexError::Plausibility {
                count: self.len(),
                summary: self.to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for WarningReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("no plausibility warnings");
        }
        let mut first = true;
        for (kind, count) in self.counts() {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{kind}: {count}")?;
            if let Some(w) = self.worst(kind, 1).first() {
                write!(f, " (worst: {w})")?;
            }
        }
        Ok(())
    }
}
