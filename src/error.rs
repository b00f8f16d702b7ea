//! Error type shared by every stage of the demand-flex pipeline.
//!
//! Variants follow the failure classes of a run: configuration problems are
//! rejected before any computation, structural problems abort the stage that
//! detects them, and calculator failures are passed through untouched.

use thiserror::Error;

/// Boxed error returned by an external revenue-requirement calculator.
pub type CalculatorError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while loading inputs, shifting load, or recalibrating revenue.
#[derive(Debug, Error)]
pub enum FlexError {
    /// The flat-equivalent price is zero, negative, or not finite.
    #[error("equivalent flat tariff must be a finite value > 0, got {0}")]
    InvalidFlatTariff(f64),

    /// An input table lacks a column the pipeline depends on.
    #[error("{table} table is missing required column `{column}`")]
    MissingColumn {
        table: &'static str,
        column: &'static str,
    },

    /// Row-level input violation (negative kWh, duplicate key, bad hour, ...).
    #[error("invalid {table} input: {message}")]
    InvalidInput {
        table: &'static str,
        message: String,
    },

    /// An hourly row does not resolve to a priced (period, tier).
    #[error(
        "building {building_id} hour {hour}: no rate for period `{energy_period}` tier {tier}"
    )]
    MissingPeriodAssignment {
        building_id: String,
        hour: u32,
        energy_period: String,
        tier: u32,
    },

    /// Zero or several (period, tier) rows are priced below the flat price.
    #[error(
        "building {building_id} ({slice}): expected exactly one receiver period priced below \
         {p_flat:.6}, found {} [{}]",
        .candidates.len(),
        .candidates.join(", ")
    )]
    AmbiguousReceiverPeriod {
        building_id: String,
        slice: String,
        p_flat: f64,
        candidates: Vec<String>,
    },

    /// A period with a non-zero shift has no baseline consumption to weight by.
    #[error(
        "building {building_id} ({slice}): period `{energy_period}` tier {tier} has zero \
         baseline consumption but a shift of {delta:.6} kWh"
    )]
    ZeroPeriodTotal {
        building_id: String,
        slice: String,
        energy_period: String,
        tier: u32,
        delta: f64,
    },

    /// Plausibility warnings escalated to a failure by configuration.
    #[error("{count} plausibility check(s) failed: {summary}")]
    Plausibility { count: usize, summary: String },

    /// Failure inside the revenue-requirement calculator.
    #[error("revenue requirement calculator failed: {0}")]
    Calculator(#[source] CalculatorError),

    /// Invalid run configuration.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("worker pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FlexError>;
