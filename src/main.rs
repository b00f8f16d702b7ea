//! demand-flex entry point: CLI wiring, run, and output export.

use std::process;

use tracing::error;

use demand_flex::cli::{parse_args, print_usage};
use demand_flex::config::RunConfig;
use demand_flex::io::export::write_outputs;
use demand_flex::runner;
use demand_flex::telemetry::init_tracing;

fn main() {
    let cli = match parse_args() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("error: {e}");
            print_usage();
            process::exit(2);
        }
    };
    if cli.help {
        print_usage();
        return;
    }
    init_tracing(cli.json_logs);

    // --config takes priority, then --preset (parse_args defaults it to demo)
    let loaded = if let Some(ref path) = cli.config {
        RunConfig::from_toml_file(path)
    } else {
        RunConfig::from_preset(cli.preset.as_deref().unwrap_or("demo"))
    };
    let mut config = match loaded {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    if let Some(elasticity) = cli.elasticity {
        config.flex.demand_elasticity = elasticity;
    }
    if let Some(workers) = cli.workers {
        config.run.workers = Some(workers);
    }
    if let Some(out) = cli.out {
        config.outputs.dir = out;
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }

    let result = match runner::run(&config) {
        Ok(result) => result,
        Err(e) => {
            error!(error = %e, "run failed");
            eprintln!("error: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = write_outputs(&config.outputs.dir, &result) {
        eprintln!("error: failed to write outputs: {e}");
        process::exit(1);
    }

    println!("{}", result.summary);
    eprintln!("Outputs written to {}", config.outputs.dir.display());
}
