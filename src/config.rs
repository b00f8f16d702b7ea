//! TOML-based run configuration and preset definitions.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::flex::warnings::Severity;
use crate::revenue::{CostScope, SubclassSpec};
use crate::season::{SeasonSpec, validate_seasons};

/// Tolerance on the sum of subclass `rr_ratio` values.
const RR_RATIO_SUM_TOLERANCE: f64 = 1e-6;

/// Top-level run configuration parsed from TOML.
///
/// Every section has defaults. Load from TOML with
/// [`RunConfig::from_toml_file`] or use [`RunConfig::from_preset`] for a
/// built-in synthetic run.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Price-response parameters.
    #[serde(default)]
    pub flex: FlexConfig,
    /// Run mode and execution parameters.
    #[serde(default)]
    pub run: RunSection,
    /// Revenue-requirement target.
    #[serde(default)]
    pub revenue: RevenueConfig,
    /// Seasonal slices; empty means one full-year slice.
    #[serde(default)]
    pub seasons: Vec<SeasonSpec>,
    /// Customer subclasses; empty means every building shifts.
    #[serde(default)]
    pub subclasses: Vec<SubclassSpec>,
    /// Input table locations.
    #[serde(default)]
    pub inputs: InputsConfig,
    /// Synthetic inputs, used when no load table is given.
    #[serde(default)]
    pub synthetic: Option<SyntheticConfig>,
    /// Output location.
    #[serde(default)]
    pub outputs: OutputsConfig,
}

/// Price-response parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlexConfig {
    /// Master switch for load shifting.
    pub enabled: bool,
    /// Constant price elasticity of demand (typically -0.1 to -0.3).
    pub demand_elasticity: f64,
    /// Flat-equivalent price ($/kWh); computed per slice when absent.
    pub equivalent_flat_tariff: Option<f64>,
    /// Shifted hourly load below this fraction of the original is flagged.
    pub min_hourly_fraction: f64,
    /// Allowed gap between realized and target elasticity.
    pub elasticity_tolerance: f64,
    /// Whether plausibility findings fail the run.
    pub plausibility_severity: Severity,
}

impl Default for FlexConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            demand_elasticity: -0.1,
            equivalent_flat_tariff: None,
            min_hourly_fraction: 0.1,
            elasticity_tolerance: 0.1,
            plausibility_severity: Severity::Warn,
        }
    }
}

impl FlexConfig {
    /// `false` selects the single-pass revenue path.
    pub fn is_active(&self) -> bool {
        self.enabled && self.demand_elasticity != 0.0
    }
}

/// Simulation run mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunType {
    /// Run against an already-calibrated tariff.
    #[default]
    Standard,
    /// Calibrate the tariff to the revenue target; recomputes period ratios.
    Precalc,
}

/// Run mode and execution parameters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunSection {
    pub run_type: RunType,
    pub cost_scope: CostScope,
    /// Worker threads for the per-building stages; capped at physical cores.
    pub workers: Option<usize>,
}

/// Revenue-requirement target.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RevenueConfig {
    /// Target system revenue requirement ($).
    pub target_revenue_requirement: f64,
}

impl Default for RevenueConfig {
    fn default() -> Self {
        Self {
            target_revenue_requirement: 1_000_000.0,
        }
    }
}

/// Input table paths.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputsConfig {
    pub load: Option<PathBuf>,
    pub rates: Option<PathBuf>,
    pub delivery_marginal_cost: Option<PathBuf>,
    pub supply_marginal_cost: Option<PathBuf>,
    pub precalc_mapping: Option<PathBuf>,
}

/// Synthetic building population.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyntheticConfig {
    pub buildings: usize,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            buildings: 20,
            seed: 42,
        }
    }
}

/// Output location.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputsConfig {
    pub dir: PathBuf,
}

impl Default for OutputsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("out"),
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"flex.demand_elasticity"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}: {}", self.field, self.message)
    }
}

impl RunConfig {
    /// Synthetic full-year run with every building shifting.
    pub fn demo() -> Self {
        Self {
            flex: FlexConfig {
                demand_elasticity: -0.2,
                ..FlexConfig::default()
            },
            revenue: RevenueConfig {
                target_revenue_requirement: 250_000.0,
            },
            synthetic: Some(SyntheticConfig::default()),
            ..Self::default()
        }
    }

    /// Synthetic precalc run with summer/winter seasons and two subclasses.
    pub fn demo_seasonal() -> Self {
        Self {
            flex: FlexConfig {
                demand_elasticity: -0.15,
                ..FlexConfig::default()
            },
            run: RunSection {
                run_type: RunType::Precalc,
                cost_scope: CostScope::DeliveryAndSupply,
                workers: None,
            },
            revenue: RevenueConfig {
                target_revenue_requirement: 250_000.0,
            },
            seasons: vec![
                SeasonSpec {
                    name: "summer".into(),
                    months: vec![6, 7, 8, 9],
                },
                SeasonSpec {
                    name: "winter".into(),
                    months: vec![10, 11, 12, 1, 2, 3, 4, 5],
                },
            ],
            subclasses: vec![
                SubclassSpec {
                    name: "tou".into(),
                    rr_ratio: 0.4,
                    shifts: true,
                },
                SubclassSpec {
                    name: "flat".into(),
                    rr_ratio: 0.6,
                    shifts: false,
                },
            ],
            synthetic: Some(SyntheticConfig::default()),
            ..Self::default()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["demo", "demo_seasonal"];

    /// Loads a run from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "demo" => Ok(Self::demo()),
            "demo_seasonal" => Ok(Self::demo_seasonal()),
            _ => Err(ConfigError {
                field: "preset".to_string(),
                message: format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            }),
        }
    }

    /// Parses a run configuration from a TOML file.
    ///
    /// Relative input and output paths are resolved against the file's
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "config".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        let mut cfg = Self::from_toml_str(&content)?;
        if let Some(base) = path.parent() {
            cfg.resolve_paths(base);
        }
        Ok(cfg)
    }

    /// Parses a run configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".to_string(),
            message: e.to_string(),
        })
    }

    fn resolve_paths(&mut self, base: &Path) {
        let i = &mut self.inputs;
        for p in [
            &mut i.load,
            &mut i.rates,
            &mut i.delivery_marginal_cost,
            &mut i.supply_marginal_cost,
            &mut i.precalc_mapping,
        ]
        .into_iter()
        .flatten()
        {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        }
        if self.outputs.dir.is_relative() {
            self.outputs.dir = base.join(&self.outputs.dir);
        }
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let fl = &self.flex;

        if !fl.demand_elasticity.is_finite() {
            errors.push(ConfigError {
                field: "flex.demand_elasticity".into(),
                message: "must be finite".into(),
            });
        }
        if let Some(p) = fl.equivalent_flat_tariff {
            if !(p.is_finite() && p > 0.0) {
                errors.push(ConfigError {
                    field: "flex.equivalent_flat_tariff".into(),
                    message: format!("must be > 0, got {p}"),
                });
            }
        }
        if !(0.0..1.0).contains(&fl.min_hourly_fraction) {
            errors.push(ConfigError {
                field: "flex.min_hourly_fraction".into(),
                message: "must be in [0.0, 1.0)".into(),
            });
        }
        if !(fl.elasticity_tolerance.is_finite() && fl.elasticity_tolerance >= 0.0) {
            errors.push(ConfigError {
                field: "flex.elasticity_tolerance".into(),
                message: "must be >= 0".into(),
            });
        }

        if self.run.workers == Some(0) {
            errors.push(ConfigError {
                field: "run.workers".into(),
                message: "must be > 0 when set".into(),
            });
        }
        if !self.revenue.target_revenue_requirement.is_finite() {
            errors.push(ConfigError {
                field: "revenue.target_revenue_requirement".into(),
                message: "must be finite".into(),
            });
        }

        errors.extend(validate_seasons(&self.seasons));
        self.validate_subclasses(&mut errors);
        self.validate_inputs(&mut errors);
        errors
    }

    fn validate_subclasses(&self, errors: &mut Vec<ConfigError>) {
        let subs = &self.subclasses;
        if subs.is_empty() {
            return;
        }
        for (i, s) in subs.iter().enumerate() {
            if !(s.rr_ratio.is_finite() && s.rr_ratio > 0.0) {
                errors.push(ConfigError {
                    field: format!("subclasses[{i}].rr_ratio"),
                    message: format!("must be > 0, got {}", s.rr_ratio),
                });
            }
            if subs[..i].iter().any(|o| o.name == s.name) {
                errors.push(ConfigError {
                    field: format!("subclasses[{i}].name"),
                    message: format!("duplicate subclass \"{}\"", s.name),
                });
            }
        }
        if !subs.iter().any(|s| s.shifts) {
            errors.push(ConfigError {
                field: "subclasses".into(),
                message: "at least one subclass must have shifts = true".into(),
            });
        }
        let sum: f64 = subs.iter().map(|s| s.rr_ratio).sum();
        if (sum - 1.0).abs() > RR_RATIO_SUM_TOLERANCE {
            errors.push(ConfigError {
                field: "subclasses".into(),
                message: format!("rr_ratio values must sum to 1.0, got {sum}"),
            });
        }
    }

    fn validate_inputs(&self, errors: &mut Vec<ConfigError>) {
        if let Some(s) = &self.synthetic {
            if s.buildings == 0 {
                errors.push(ConfigError {
                    field: "synthetic.buildings".into(),
                    message: "must be > 0".into(),
                });
            }
            return;
        }

        let i = &self.inputs;
        for (field, value) in [
            ("inputs.load", &i.load),
            ("inputs.rates", &i.rates),
            ("inputs.delivery_marginal_cost", &i.delivery_marginal_cost),
        ] {
            if value.is_none() {
                errors.push(ConfigError {
                    field: field.into(),
                    message: "required unless [synthetic] is set".into(),
                });
            }
        }
        if self.run.cost_scope == CostScope::DeliveryAndSupply && i.supply_marginal_cost.is_none() {
            errors.push(ConfigError {
                field: "inputs.supply_marginal_cost".into(),
                message: "required when run.cost_scope = \"delivery_and_supply\"".into(),
            });
        }
        if self.run.run_type == RunType::Precalc && i.precalc_mapping.is_none() {
            errors.push(ConfigError {
                field: "inputs.precalc_mapping".into(),
                message: "required when run.run_type = \"precalc\"".into(),
            });
        }
    }
}
