//! Runs driven by CSV inputs and a TOML file on disk.

use std::fs;
use std::path::Path;

use demand_flex::config::RunConfig;
use demand_flex::error::FlexError;
use demand_flex::io::export::{
    COSTS_FILE, SHIFTED_LOAD_FILE, SUBCLASS_RR_FILE, TRACKER_FILE, write_outputs,
};
use demand_flex::io::import::read_load_table_path;
use demand_flex::runner;

fn write_inputs(dir: &Path) {
    let mut load = String::from("building_id,hour,energy_period,tier,kwh,subclass\n");
    for (b, class) in [("b1", "tou"), ("b2", "flat")] {
        for h in 1..=12u32 {
            let period = if h <= 4 { "peak" } else { "offpeak" };
            load.push_str(&format!("{b},{h},{period},1,250,{class}\n"));
        }
    }
    fs::write(dir.join("load.csv"), load).expect("write load");
    fs::write(
        dir.join("rates.csv"),
        "energy_period,tier,rate\npeak,1,0.30\noffpeak,1,0.10\n",
    )
    .expect("write rates");
    let mut mc = String::from("hour,marginal_cost\n");
    for h in 1..=12u32 {
        mc.push_str(&format!("{h},{}\n", if h <= 4 { 0.12 } else { 0.02 }));
    }
    fs::write(dir.join("dmc.csv"), mc).expect("write marginal costs");
}

const CONFIG: &str = r#"
[flex]
demand_elasticity = -0.2

[revenue]
target_revenue_requirement = 10000.0

[[subclasses]]
name = "tou"
rr_ratio = 0.5
shifts = true

[[subclasses]]
name = "flat"
rr_ratio = 0.5

[inputs]
load = "load.csv"
rates = "rates.csv"
delivery_marginal_cost = "dmc.csv"

[outputs]
dir = "out"
"#;

#[test]
fn toml_run_shifts_only_participating_subclass() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_inputs(dir.path());
    let config_path = dir.path().join("run.toml");
    fs::write(&config_path, CONFIG).expect("write config");

    let config = RunConfig::from_toml_file(&config_path).expect("config parses");
    assert!(config.validate().is_empty());
    let result = runner::run(&config).expect("run succeeds");

    let buildings = result.shifted_load.buildings();
    assert_ne!(buildings[0].hours[0].kwh, 250.0);
    assert!(buildings[1].hours.iter().all(|h| h.kwh == 250.0));
    assert_eq!(result.summary.shifted_buildings, 1);

    let rr = result.revenue.subclass_rr();
    assert_eq!(rr.len(), 2);
    assert!((rr[1].revenue_requirement - 5_000.0).abs() < 1e-9);
    let total: f64 = rr.iter().map(|s| s.revenue_requirement).sum();
    assert!((total - result.revenue.revenue_requirement_raw()).abs() < 1e-9);

    let written = write_outputs(&config.outputs.dir, &result).expect("outputs written");
    assert_eq!(written.len(), 4);
    for name in [SHIFTED_LOAD_FILE, TRACKER_FILE, COSTS_FILE, SUBCLASS_RR_FILE] {
        assert!(dir.path().join("out").join(name).exists(), "{name} missing");
    }

    let reread = read_load_table_path(&dir.path().join("out").join(SHIFTED_LOAD_FILE))
        .expect("shifted load reads back");
    assert!((reread.total_kwh() - 6_000.0).abs() < 1e-6);
}

#[test]
fn missing_rate_column_fails_before_shifting() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_inputs(dir.path());
    fs::write(dir.path().join("rates.csv"), "energy_period,tier\npeak,1\n").expect("write rates");
    let config_path = dir.path().join("run.toml");
    fs::write(&config_path, CONFIG).expect("write config");

    let config = RunConfig::from_toml_file(&config_path).expect("config parses");
    let err = runner::run(&config);
    assert!(matches!(
        err,
        Err(FlexError::MissingColumn {
            table: "rates",
            column: "rate"
        })
    ));
}
