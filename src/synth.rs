//! Seeded synthetic inputs for demo runs and tests.

use std::f64::consts::PI;

use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::info;

use crate::config::SyntheticConfig;
use crate::error::Result;
use crate::load::{HOURS_PER_YEAR, HourlyLoadRecord, LoadTable};
use crate::revenue::SubclassSpec;
use crate::revenue::calculator::MarginalCostCurve;
use crate::revenue::precalc::{PrecalcMapping, PrecalcMappingRecord};
use crate::season::SeasonCalendar;
use crate::tariff::{PeriodKey, RateStructure};

/// Hour-of-day (0-based) range billed at the peak rate.
pub const PEAK_HOURS: std::ops::RangeInclusive<u32> = 16..=20;

const PEAK_RATE: f64 = 0.28;
const OFFPEAK_RATE: f64 = 0.09;
/// Rate step between consecutive seasons.
const SEASON_RATE_STEP: f64 = 0.02;

/// A daily consumption profile: sinusoid around a baseline plus Gaussian noise.
///
/// # Examples
///
/// ```
/// use demand_flex::synth::BaseLoad;
///
/// let mut load = BaseLoad::new(1.0, 0.5, 0.0, 0.05, 42);
/// let kwh = load.demand_kwh(12);
/// assert!(kwh >= 0.0);
/// ```
#[derive(Debug, Clone)]
pub struct BaseLoad {
    /// Mean hourly consumption (kWh).
    pub base_kwh: f64,
    /// Amplitude of the daily swing (kWh).
    pub amp_kwh: f64,
    /// Phase offset in radians.
    pub phase_rad: f64,
    /// Standard deviation of the noise (kWh).
    pub noise_std: f64,
    rng: StdRng,
}

impl BaseLoad {
    pub fn new(base_kwh: f64, amp_kwh: f64, phase_rad: f64, noise_std: f64, seed: u64) -> Self {
        Self {
            base_kwh,
            amp_kwh,
            phase_rad,
            noise_std,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Consumption in hour-of-year `hour` (1-based); never negative.
    pub fn demand_kwh(&mut self, hour: u32) -> f64 {
        let day_pos = f64::from((hour.saturating_sub(1)) % 24) / 24.0;
        let angle = 2.0 * PI * day_pos + self.phase_rad;

        let noise = if self.noise_std > 0.0 {
            // Box-Muller
            let u1: f64 = self.rng.random::<f64>().clamp(1e-9, 1.0);
            let u2: f64 = self.rng.random::<f64>();
            let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
            z0 * self.noise_std
        } else {
            0.0
        };

        (self.base_kwh + self.amp_kwh * angle.sin() + noise).max(0.0)
    }
}

/// Everything a run needs, generated from a seed.
#[derive(Debug, Clone)]
pub struct SyntheticInputs {
    pub load: LoadTable,
    pub rates: RateStructure,
    pub delivery_marginal_cost: MarginalCostCurve,
    pub supply_marginal_cost: MarginalCostCurve,
    pub precalc_mapping: PrecalcMapping,
}

/// Whether hour-of-year `hour` falls in the daily peak window.
pub fn is_peak(hour: u32) -> bool {
    PEAK_HOURS.contains(&(hour.saturating_sub(1) % 24))
}

/// `peak`/`offpeak`, prefixed with the season name when there are several.
pub fn period_label(calendar: &SeasonCalendar, hour: u32) -> String {
    let base = if is_peak(hour) { "peak" } else { "offpeak" };
    if calendar.len() > 1 {
        format!("{}_{base}", calendar.name(calendar.season_of_hour(hour)))
    } else {
        base.to_string()
    }
}

fn labels(calendar: &SeasonCalendar, season: usize) -> [String; 2] {
    if calendar.len() > 1 {
        let name = calendar.name(season);
        [format!("{name}_peak"), format!("{name}_offpeak")]
    } else {
        ["peak".into(), "offpeak".into()]
    }
}

/// Generates a full year of hourly load for `config.buildings` buildings.
///
/// Buildings are assigned to `subclasses` round-robin; with no subclasses
/// the `subclass` column stays empty.
///
/// # Errors
///
/// Propagates `InvalidInput` from table validation.
pub fn generate(
    config: &SyntheticConfig,
    calendar: &SeasonCalendar,
    subclasses: &[SubclassSpec],
) -> Result<SyntheticInputs> {
    let labels_by_hour: Vec<String> = (1..=HOURS_PER_YEAR)
        .map(|h| period_label(calendar, h))
        .collect();

    let mut records = Vec::with_capacity(config.buildings * HOURS_PER_YEAR as usize);
    for b in 0..config.buildings {
        let scale = 0.6 + 0.2 * (b % 5) as f64;
        // evening maximum around hour-of-day 18
        let mut profile = BaseLoad::new(
            scale,
            0.5 * scale,
            -PI,
            0.05 * scale,
            config.seed.wrapping_add(b as u64),
        );
        let subclass =
            (!subclasses.is_empty()).then(|| subclasses[b % subclasses.len()].name.clone());
        let building_id = format!("bldg_{b:04}");
        for (hour, label) in (1..=HOURS_PER_YEAR).zip(&labels_by_hour) {
            records.push(HourlyLoadRecord {
                building_id: building_id.clone(),
                hour,
                energy_period: label.clone(),
                tier: 1,
                kwh: profile.demand_kwh(hour),
                subclass: subclass.clone(),
            });
        }
    }
    let load = LoadTable::from_records(records)?;

    let mut rates = RateStructure::new();
    let mut mapping = Vec::new();
    for season in 0..calendar.len() {
        let step = SEASON_RATE_STEP * season as f64;
        let [peak, offpeak] = labels(calendar, season);
        rates.insert(PeriodKey::new(peak.clone(), 1), PEAK_RATE + step)?;
        rates.insert(PeriodKey::new(offpeak.clone(), 1), OFFPEAK_RATE + step)?;
        mapping.push(PrecalcMappingRecord {
            energy_period: peak,
            tier: 1,
            rel_value: (PEAK_RATE + step) / (OFFPEAK_RATE + step),
        });
        mapping.push(PrecalcMappingRecord {
            energy_period: offpeak,
            tier: 1,
            rel_value: 1.0,
        });
    }

    let delivery = MarginalCostCurve::from_values(
        (1..=HOURS_PER_YEAR).map(|h| if is_peak(h) { 0.12 } else { 0.02 }),
    );
    let supply = MarginalCostCurve::from_values((1..=HOURS_PER_YEAR).map(|h| {
        let day_pos = f64::from((h - 1) % 24) / 24.0;
        0.05 + 0.03 * (2.0 * PI * day_pos - PI).sin().max(0.0)
    }));

    info!(
        buildings = config.buildings,
        seed = config.seed,
        seasons = calendar.len(),
        "synthetic inputs generated"
    );
    Ok(SyntheticInputs {
        load,
        rates,
        delivery_marginal_cost: delivery,
        supply_marginal_cost: supply,
        precalc_mapping: PrecalcMapping::from_records(mapping)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::season::SeasonSpec;

    fn small() -> SyntheticConfig {
        SyntheticConfig {
            buildings: 3,
            seed: 7,
        }
    }

    #[test]
    fn demand_is_non_negative_and_seeded() {
        let mut a = BaseLoad::new(0.2, 1.0, 0.0, 0.5, 1);
        let mut b = BaseLoad::new(0.2, 1.0, 0.0, 0.5, 1);
        for h in 1..=48 {
            let (x, y) = (a.demand_kwh(h), b.demand_kwh(h));
            assert!(x >= 0.0);
            assert_eq!(x, y);
        }
    }

    #[test]
    fn full_year_labels_are_plain() {
        let cal = SeasonCalendar::full_year();
        assert_eq!(period_label(&cal, 18), "peak");
        assert_eq!(period_label(&cal, 1), "offpeak");
    }

    #[test]
    fn generates_every_hour_with_priced_periods() {
        let cal = SeasonCalendar::full_year();
        let inputs = generate(&small(), &cal, &[]).expect("synthetic inputs");
        assert_eq!(inputs.load.len(), 3);
        for b in inputs.load.buildings() {
            assert_eq!(b.hours.len(), HOURS_PER_YEAR as usize);
            assert!(b.hours.iter().all(|h| inputs.rates.rate(&h.key()).is_some()));
            assert_eq!(b.subclass, None);
        }
        assert_eq!(inputs.precalc_mapping.len(), 2);
    }

    #[test]
    fn seasonal_labels_and_round_robin_subclasses() {
        let cal = SeasonCalendar::from_specs(&[
            SeasonSpec {
                name: "summer".into(),
                months: vec![6, 7, 8, 9],
            },
            SeasonSpec {
                name: "winter".into(),
                months: vec![1, 2, 3, 4, 5, 10, 11, 12],
            },
        ])
        .expect("valid seasons");
        let subs = vec![
            SubclassSpec {
                name: "tou".into(),
                rr_ratio: 0.5,
                shifts: true,
            },
            SubclassSpec {
                name: "flat".into(),
                rr_ratio: 0.5,
                shifts: false,
            },
        ];
        let inputs = generate(&small(), &cal, &subs).expect("synthetic inputs");
        assert_eq!(inputs.rates.len(), 4);
        let first = &inputs.load.buildings()[0];
        assert_eq!(first.hours[0].energy_period, "winter_offpeak");
        let classes: Vec<Option<&str>> = inputs
            .load
            .buildings()
            .iter()
            .map(|b| b.subclass.as_deref())
            .collect();
        assert_eq!(classes, vec![Some("tou"), Some("flat"), Some("tou")]);
    }

    #[test]
    fn same_seed_same_table() {
        let cal = SeasonCalendar::full_year();
        let a = generate(&small(), &cal, &[]).map(|i| i.load).ok();
        let b = generate(&small(), &cal, &[]).map(|i| i.load).ok();
        assert!(a.is_some());
        assert_eq!(a, b);
    }
}
