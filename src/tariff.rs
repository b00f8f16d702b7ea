//! Tariff rate structure: unit prices keyed by (energy period, tier).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FlexError, Result};

/// Identifies one priced bucket of a tariff.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeriodKey {
    /// Time-of-use period label (e.g. `"peak"`).
    pub energy_period: String,
    /// Consumption block tier, orthogonal to the period.
    pub tier: u32,
}

impl PeriodKey {
    pub fn new(energy_period: impl Into<String>, tier: u32) -> Self {
        Self {
            energy_period: energy_period.into(),
            tier,
        }
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.energy_period, self.tier)
    }
}

/// One row of the rate table as read from CSV.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RateRecord {
    pub energy_period: String,
    pub tier: u32,
    /// Unit price ($/kWh).
    pub rate: f64,
}

/// Mapping from (period, tier) to unit price with unique keys.
///
/// # Examples
///
/// ```
/// use demand_flex::tariff::{PeriodKey, RateStructure};
///
/// let mut rates = RateStructure::new();
/// rates.insert(PeriodKey::new("peak", 1), 0.30).unwrap();
/// rates.insert(PeriodKey::new("offpeak", 1), 0.10).unwrap();
/// assert_eq!(rates.rate(&PeriodKey::new("peak", 1)), Some(0.30));
/// assert!(rates.insert(PeriodKey::new("peak", 1), 0.31).is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateStructure {
    rates: BTreeMap<PeriodKey, f64>,
}

impl RateStructure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a rate structure from CSV records.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` on a duplicate key or a negative/non-finite rate.
    pub fn from_records(records: impl IntoIterator<Item = RateRecord>) -> Result<Self> {
        let mut rates = Self::new();
        for r in records {
            rates.insert(PeriodKey::new(r.energy_period, r.tier), r.rate)?;
        }
        Ok(rates)
    }

    /// Adds one priced bucket.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the key already exists or the rate is
    /// negative or not finite.
    pub fn insert(&mut self, key: PeriodKey, rate: f64) -> Result<()> {
        if !rate.is_finite() || rate < 0.0 {
            return Err(FlexError::InvalidInput {
                table: "rates",
                message: format!("rate for {key} must be finite and >= 0, got {rate}"),
            });
        }
        if self.rates.contains_key(&key) {
            return Err(FlexError::InvalidInput {
                table: "rates",
                message: format!("duplicate rate for {key}"),
            });
        }
        self.rates.insert(key, rate);
        Ok(())
    }

    /// Unit price for `key`, if priced.
    pub fn rate(&self, key: &PeriodKey) -> Option<f64> {
        self.rates.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PeriodKey, f64)> {
        self.rates.iter().map(|(k, v)| (k, *v))
    }
}
