use std::env;
use std::path::PathBuf;

pub struct CliOptions {
    pub config: Option<PathBuf>,
    pub preset: Option<String>,
    pub elasticity: Option<f64>,
    pub workers: Option<usize>,
    pub out: Option<PathBuf>,
    pub json_logs: bool,
    pub help: bool,
}

pub fn parse_args() -> Result<CliOptions, String> {
    let args: Vec<String> = env::args().skip(1).collect();
    parse_args_from(args)
}

pub fn parse_args_from(args: Vec<String>) -> Result<CliOptions, String> {
    parse_options(&args)
}

fn parse_options(args: &[String]) -> Result<CliOptions, String> {
    let mut i = 0usize;
    let mut config = None;
    let mut preset = None;
    let mut elasticity = None;
    let mut workers = None;
    let mut out = None;
    let mut json_logs = false;
    let mut help = false;

    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                let path =
                    args.next_or_err(i, "missing value for --config (expected a TOML file path)")?;
                if config.replace(PathBuf::from(path)).is_some() {
                    return Err("--config provided more than once".to_string());
                }
            }
            "--preset" => {
                i += 1;
                let name =
                    args.next_or_err(i, "missing value for --preset (expected a preset name)")?;
                if preset.replace(name.to_string()).is_some() {
                    return Err("--preset provided more than once".to_string());
                }
            }
            "--elasticity" => {
                i += 1;
                let raw =
                    args.next_or_err(i, "missing value for --elasticity (expected a number)")?;
                let value = raw
                    .parse::<f64>()
                    .map_err(|_| format!("--elasticity value \"{raw}\" is not a valid number"))?;
                elasticity = Some(value);
            }
            "--workers" => {
                i += 1;
                let raw = args.next_or_err(
                    i,
                    "missing value for --workers (expected a positive integer)",
                )?;
                let value = raw
                    .parse::<usize>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| format!("--workers value \"{raw}\" is not a positive integer"))?;
                workers = Some(value);
            }
            "--out" => {
                i += 1;
                let path = args.next_or_err(i, "missing value for --out (expected a directory)")?;
                out = Some(PathBuf::from(path));
            }
            "--json-logs" => json_logs = true,
            "--help" | "-h" => help = true,
            other => return Err(format!("unknown argument: {other}")),
        }
        i += 1;
    }

    if config.is_some() && preset.is_some() {
        return Err(
            "arguments `--config` and `--preset` are mutually exclusive; choose one source"
                .to_string(),
        );
    }

    if config.is_none() && preset.is_none() {
        preset = Some("demo".to_string());
    }

    Ok(CliOptions {
        config,
        preset,
        elasticity,
        workers,
        out,
        json_logs,
        help,
    })
}

trait SliceArgExt {
    fn next_or_err(&self, index: usize, err: &str) -> Result<&str, String>;
}

impl SliceArgExt for [String] {
    fn next_or_err(&self, index: usize, err: &str) -> Result<&str, String> {
        self.get(index)
            .map(String::as_str)
            .ok_or_else(|| err.to_string())
    }
}

pub fn print_usage() {
    eprintln!("demand-flex: price-responsive load shifting and revenue recalibration");
    eprintln!();
    eprintln!("Usage: demand-flex [--config <path> | --preset <name>] [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <path>      Load run configuration from a TOML file");
    eprintln!("  --preset <name>      Use a built-in preset (demo, demo_seasonal)");
    eprintln!("  --elasticity <f64>   Override flex.demand_elasticity");
    eprintln!("  --workers <n>        Override run.workers (capped at physical cores)");
    eprintln!("  --out <dir>          Override outputs.dir");
    eprintln!("  --json-logs          Emit logs as JSON lines on stderr");
    eprintln!("  --help               Show this help message");
    eprintln!();
    eprintln!("If neither --config nor --preset is given, the demo preset is used.");
}

#[cfg(test)]
mod tests {
    use super::parse_args_from;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn supports_config_cli() {
        let opts = parse_args_from(args(&["--config", "run.toml"])).expect("parse should succeed");
        assert_eq!(
            opts.config.as_deref().and_then(|p| p.to_str()),
            Some("run.toml")
        );
        assert!(opts.preset.is_none());
    }

    #[test]
    fn defaults_to_demo_preset() {
        let opts = parse_args_from(Vec::new()).expect("parse should succeed");
        assert_eq!(opts.preset.as_deref(), Some("demo"));
        assert!(!opts.json_logs);
        assert!(!opts.help);
    }

    #[test]
    fn parses_overrides() {
        let opts = parse_args_from(args(&[
            "--preset",
            "demo_seasonal",
            "--elasticity",
            "-0.25",
            "--workers",
            "2",
            "--out",
            "results",
            "--json-logs",
        ]))
        .expect("parse should succeed");
        assert_eq!(opts.preset.as_deref(), Some("demo_seasonal"));
        assert_eq!(opts.elasticity, Some(-0.25));
        assert_eq!(opts.workers, Some(2));
        assert_eq!(opts.out.as_deref().and_then(|p| p.to_str()), Some("results"));
        assert!(opts.json_logs);
    }

    #[test]
    fn rejects_config_with_preset() {
        assert!(parse_args_from(args(&["--config", "a.toml", "--preset", "demo"])).is_err());
    }

    #[test]
    fn rejects_zero_workers() {
        assert!(parse_args_from(args(&["--workers", "0"])).is_err());
    }

    #[test]
    fn rejects_unknown_argument() {
        let err = parse_args_from(args(&["--bogus"])).err();
        assert_eq!(err.as_deref(), Some("unknown argument: --bogus"));
    }
}
