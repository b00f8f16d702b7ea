//! Price-responsive load shifting with revenue-requirement recalibration.
//!
//! A run shifts hourly building load away from expensive tariff periods under
//! a constant price elasticity, then re-derives the utility revenue
//! requirement from the shifted load while holding embedded costs fixed.
//! [`runner::run`] drives the whole pipeline from a [`config::RunConfig`].

pub mod cli;
pub mod config;
pub mod error;
/// Aggregation, shifting, redistribution, and diagnostics.
pub mod flex;
pub mod io;
pub mod load;
pub mod reporting;
/// Revenue calculator seam, recalibration phases, and precalc ratios.
pub mod revenue;
pub mod runner;
pub mod season;
pub mod synth;
pub mod tariff;
pub mod telemetry;

pub use error::{FlexError, Result};
