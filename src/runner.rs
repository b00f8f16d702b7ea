//! End-to-end run: inputs, demand flex, and revenue recalibration.
//!
//! Phase order with flex active:
//!
//! 1. freeze the residual against the original load;
//! 2. shift every participating building on a bounded worker pool;
//! 3. summarize (and optionally enforce) plausibility warnings;
//! 4. recompute precalc period ratios (precalc runs only);
//! 5. recompute the revenue requirement from the shifted load;
//! 6. allocate it across subclasses (when configured).
//!
//! With flex inactive a single calculator pass replaces all of the above.

use std::collections::BTreeSet;

use rayon::ThreadPoolBuilder;
use tracing::info;

use crate::config::{RunConfig, RunType};
use crate::error::{FlexError, Result};
use crate::flex::tracker::ElasticityRecord;
use crate::flex::warnings::WarningReport;
use crate::flex::{BuildingShift, apply_demand_flex};
use crate::io::import;
use crate::load::LoadTable;
use crate::reporting::FlexSummary;
use crate::revenue::precalc::{PrecalcMapping, recompute_period_ratios};
use crate::revenue::{MarginalCostCalculator, OriginalRrFrozen, RevenueCalculator, RevenueOutcome};
use crate::season::SeasonCalendar;
use crate::synth;
use crate::tariff::RateStructure;

/// Tables a run reads.
#[derive(Debug, Clone)]
pub struct RunInputs {
    pub load: LoadTable,
    pub rates: RateStructure,
    pub marginal_costs: MarginalCostCalculator,
    pub precalc_mapping: Option<PrecalcMapping>,
}

impl RunInputs {
    /// Reads the configured tables, or generates them when `[synthetic]` is
    /// set.
    ///
    /// # Errors
    ///
    /// Returns `Config` when a required path is absent, otherwise any
    /// import error.
    pub fn load(config: &RunConfig, calendar: &SeasonCalendar) -> Result<Self> {
        if let Some(synthetic) = &config.synthetic {
            let s = synth::generate(synthetic, calendar, &config.subclasses)?;
            return Ok(Self {
                load: s.load,
                rates: s.rates,
                marginal_costs: MarginalCostCalculator::new(
                    s.delivery_marginal_cost,
                    Some(s.supply_marginal_cost),
                ),
                precalc_mapping: Some(s.precalc_mapping),
            });
        }

        let i = &config.inputs;
        let required = |field: &str, path: &Option<std::path::PathBuf>| {
            path.clone()
                .ok_or_else(|| FlexError::Config(format!("inputs.{field} is required")))
        };
        let load = import::read_load_table_path(&required("load", &i.load)?)?;
        let rates = import::read_rate_structure_path(&required("rates", &i.rates)?)?;
        let delivery = import::read_marginal_costs_path(
            "delivery_marginal_cost",
            &required("delivery_marginal_cost", &i.delivery_marginal_cost)?,
        )?;
        let supply = i
            .supply_marginal_cost
            .as_deref()
            .map(|p| import::read_marginal_costs_path("supply_marginal_cost", p))
            .transpose()?;
        let precalc_mapping = i
            .precalc_mapping
            .as_deref()
            .map(import::read_precalc_mapping_path)
            .transpose()?;
        Ok(Self {
            load,
            rates,
            marginal_costs: MarginalCostCalculator::new(delivery, supply),
            precalc_mapping,
        })
    }
}

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub shifted_load: LoadTable,
    pub shifts: Vec<BuildingShift>,
    pub tracker: Vec<ElasticityRecord>,
    pub warnings: WarningReport,
    pub revenue: RevenueOutcome,
    /// Recomputed ratios; `Some` only when the precalc phase ran.
    pub precalc_mapping: Option<PrecalcMapping>,
    pub summary: FlexSummary,
}

/// Worker threads for the per-building stages.
///
/// The configured count is capped at the number of physical cores; `None`
/// uses all of them.
pub fn effective_workers(configured: Option<usize>) -> usize {
    let physical = num_cpus::get_physical().max(1);
    configured.map_or(physical, |n| n.min(physical)).max(1)
}

/// Builds the season calendar; no seasons means one full-year slice.
///
/// # Errors
///
/// Returns `Config` when the seasons do not partition the year.
pub fn calendar(config: &RunConfig) -> Result<SeasonCalendar> {
    SeasonCalendar::from_specs(&config.seasons)
}

/// Validates `config`, loads its inputs, and runs with the marginal-cost
/// calculator.
///
/// # Errors
///
/// Returns `Config` for an invalid configuration, otherwise the first error
/// of any phase.
pub fn run(config: &RunConfig) -> Result<RunResult> {
    let errors = config.validate();
    if !errors.is_empty() {
        let joined: Vec<String> = errors.iter().map(ToString::to_string).collect();
        return Err(FlexError::Config(joined.join("; ")));
    }
    let calendar = calendar(config)?;
    let inputs = RunInputs::load(config, &calendar)?;
    let calculator = inputs.marginal_costs.clone();
    run_with(config, &calendar, inputs, &calculator)
}

/// Runs every phase against an arbitrary revenue calculator.
///
/// # Errors
///
/// Returns the first error of any phase; calculator failures surface as
/// `Calculator`.
pub fn run_with<C>(
    config: &RunConfig,
    calendar: &SeasonCalendar,
    inputs: RunInputs,
    calculator: &C,
) -> Result<RunResult>
where
    C: RevenueCalculator + ?Sized,
{
    let target = config.revenue.target_revenue_requirement;
    let scope = config.run.cost_scope;
    let original_system = inputs.load.system_load();

    if !config.flex.is_active() {
        info!("demand flex inactive; single-pass revenue requirement");
        let revenue = RevenueOutcome::no_flex(calculator, &original_system, target, scope)?;
        let warnings = WarningReport::new();
        let summary = FlexSummary::from_run(&inputs.load, &inputs.load, &[], &warnings, &revenue);
        return Ok(RunResult {
            shifted_load: inputs.load,
            shifts: Vec::new(),
            tracker: Vec::new(),
            warnings,
            revenue,
            precalc_mapping: None,
            summary,
        });
    }

    let shifting = shifting_subclasses(config, &inputs.load)?;
    let frozen = OriginalRrFrozen::freeze(calculator, &original_system, target, scope)?;

    let workers = effective_workers(config.run.workers);
    let pool = ThreadPoolBuilder::new().num_threads(workers).build()?;
    info!(workers, buildings = inputs.load.len(), "shifting load");
    let outcome = pool.install(|| {
        apply_demand_flex(
            &inputs.load,
            &inputs.rates,
            calendar,
            &config.flex,
            |b| match &shifting {
                None => true,
                Some(names) => b.subclass.as_ref().is_some_and(|s| names.contains(s)),
            },
        )
    })?;

    outcome.warnings.log_summary();
    outcome.warnings.enforce(config.flex.plausibility_severity)?;

    let precalc_mapping = if config.run.run_type == RunType::Precalc {
        let mapping = inputs.precalc_mapping.as_ref().ok_or_else(|| {
            FlexError::Config("precalc run requires inputs.precalc_mapping".into())
        })?;
        let curve = inputs.marginal_costs.combined_curve(scope)?;
        Some(recompute_period_ratios(mapping, &outcome.load, calendar, &curve))
    } else {
        None
    };

    let shifted = frozen.recompute(calculator, &outcome.load.system_load())?;
    let revenue = if config.subclasses.is_empty() {
        RevenueOutcome::Recalibrated(shifted)
    } else {
        RevenueOutcome::Allocated(shifted.allocate(&config.subclasses)?)
    };

    let summary = FlexSummary::from_run(
        &inputs.load,
        &outcome.load,
        &outcome.shifts,
        &outcome.warnings,
        &revenue,
    );
    Ok(RunResult {
        shifted_load: outcome.load,
        shifts: outcome.shifts,
        tracker: outcome.tracker,
        warnings: outcome.warnings,
        revenue,
        precalc_mapping,
        summary,
    })
}

/// Names of shifting subclasses, or `None` when every building shifts.
///
/// With subclasses configured every building must carry a known label.
fn shifting_subclasses(config: &RunConfig, load: &LoadTable) -> Result<Option<BTreeSet<String>>> {
    if config.subclasses.is_empty() {
        return Ok(None);
    }
    let known: BTreeSet<&str> = config.subclasses.iter().map(|s| s.name.as_str()).collect();
    for b in load.buildings() {
        match b.subclass.as_deref() {
            Some(s) if known.contains(s) => {}
            Some(s) => {
                return Err(FlexError::InvalidInput {
                    table: "load",
                    message: format!("building {} has unknown subclass \"{s}\"", b.building_id),
                });
            }
            None => {
                return Err(FlexError::InvalidInput {
                    table: "load",
                    message: format!(
                        "building {} has no subclass but subclasses are configured",
                        b.building_id
                    ),
                });
            }
        }
    }
    Ok(Some(
        config
            .subclasses
            .iter()
            .filter(|s| s.shifts)
            .map(|s| s.name.clone())
            .collect(),
    ))
}
