//! grid-sim entry point: CLI wiring and config-driven simulation runs.

use std::path::Path;
use std::process;

use grid_sim::config::ScenarioConfig;
use grid_sim::io::export::export_csv;
use grid_sim::logging::{LogFormat, init_tracing};
use grid_sim::sim::kpi::KpiReport;
use grid_sim::sim::ticker::shared;
use grid_sim::sim::Ticker;
use tracing::{debug, info};

/// Parsed CLI arguments.
struct CliArgs {
    scenario_path: Option<String>,
    preset: Option<String>,
    seed_override: Option<u64>,
    ticks_override: Option<u64>,
    telemetry_out: Option<String>,
    log_format: LogFormat,
    quiet: bool,
    #[cfg(feature = "api")]
    serve: bool,
    #[cfg(feature = "api")]
    port: u16,
}

fn print_help() {
    eprintln!("grid-sim: city power-grid co-simulation with V2G emergency dispatch");
    eprintln!();
    eprintln!("Usage: grid-sim [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --scenario <path>        Load scenario from TOML config file");
    eprintln!(
        "  --preset <name>          Use a built-in preset ({})",
        ScenarioConfig::PRESETS.join(", ")
    );
    eprintln!("  --seed <u64>             Override random seed");
    eprintln!("  --ticks <u64>            Override the number of ticks to run");
    eprintln!("  --telemetry-out <path>   Export per-substation tick rows to CSV");
    eprintln!("  --log-format <fmt>       Log output: compact (default) or json");
    eprintln!("  --quiet                  Do not print per-tick summary lines");
    #[cfg(feature = "api")]
    {
        eprintln!("  --serve                  Keep ticking in real time and serve the REST API");
        eprintln!("  --port <u16>             API server port (default: 3000)");
    }
    eprintln!("  --help                   Show this help message");
    eprintln!();
    eprintln!("If no --scenario or --preset is given, the baseline preset is used.");
    eprintln!("Log filtering follows GRID_SIM_LOG, then RUST_LOG (default: info).");
}

/// Returns the value following flag `args[*i]`, exiting if it is missing.
fn flag_value<'a>(args: &'a [String], i: &mut usize, what: &str) -> &'a str {
    let flag = &args[*i];
    *i += 1;
    match args.get(*i) {
        Some(v) => v.as_str(),
        None => {
            eprintln!("error: {flag} requires {what} argument");
            process::exit(1);
        }
    }
}

fn parse_or_exit<T: std::str::FromStr>(flag: &str, value: &str, what: &str) -> T {
    value.parse::<T>().unwrap_or_else(|_| {
        eprintln!("error: {flag} value \"{value}\" is not a valid {what}");
        process::exit(1);
    })
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        scenario_path: None,
        preset: None,
        seed_override: None,
        ticks_override: None,
        telemetry_out: None,
        log_format: LogFormat::default(),
        quiet: false,
        #[cfg(feature = "api")]
        serve: false,
        #[cfg(feature = "api")]
        port: 3000,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--scenario" => {
                cli.scenario_path = Some(flag_value(&args, &mut i, "a path").to_string());
            }
            "--preset" => {
                cli.preset = Some(flag_value(&args, &mut i, "a name").to_string());
            }
            "--seed" => {
                let v = flag_value(&args, &mut i, "a u64");
                cli.seed_override = Some(parse_or_exit("--seed", v, "u64"));
            }
            "--ticks" => {
                let v = flag_value(&args, &mut i, "a u64");
                cli.ticks_override = Some(parse_or_exit("--ticks", v, "u64"));
            }
            "--telemetry-out" => {
                cli.telemetry_out = Some(flag_value(&args, &mut i, "a path").to_string());
            }
            "--log-format" => {
                let v = flag_value(&args, &mut i, "a format");
                cli.log_format = v.parse().unwrap_or_else(|e| {
                    eprintln!("error: {e}");
                    process::exit(1);
                });
            }
            "--quiet" | "-q" => {
                cli.quiet = true;
            }
            #[cfg(feature = "api")]
            "--serve" => {
                cli.serve = true;
            }
            #[cfg(feature = "api")]
            "--port" => {
                let v = flag_value(&args, &mut i, "a u16");
                cli.port = parse_or_exit("--port", v, "u16");
            }
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn main() {
    let cli = parse_args();
    init_tracing(cli.log_format);

    // --scenario takes priority, then --preset, then the baseline default
    let mut scenario = if let Some(ref path) = cli.scenario_path {
        match ScenarioConfig::from_toml_file(Path::new(path)) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        }
    } else if let Some(ref name) = cli.preset {
        match ScenarioConfig::from_preset(name) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        }
    } else {
        ScenarioConfig::baseline()
    };

    if let Some(seed) = cli.seed_override {
        scenario.simulation.seed = seed;
    }
    if let Some(ticks) = cli.ticks_override {
        scenario.simulation.ticks = ticks;
    }

    let errors = scenario.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }

    let ticker = Ticker::new(shared(scenario.build()));
    let simulated_s = ticker.simulation().lock().config().total_duration().as_secs_f64();
    info!(
        substations = scenario.substations.len(),
        vehicles = scenario.fleet.vehicles,
        ticks = scenario.simulation.ticks,
        simulated_s,
        seed = scenario.simulation.seed,
        "simulation built"
    );

    let mut snapshots = Vec::new();
    for completed in 0..scenario.simulation.ticks {
        scenario.apply_scheduled(&mut ticker.simulation().lock(), completed);
        let snap = ticker.step();
        if !cli.quiet {
            println!("{snap}");
        }
        debug!(tick = snap.tick, total_load_mw = snap.total_load_mw, "tick");
        snapshots.push(snap);
    }

    let manual_failures = ticker.simulation().lock().manual_failures();
    let kpi = KpiReport::from_snapshots(&snapshots, manual_failures);
    println!("\n{kpi}");

    if let Some(ref path) = cli.telemetry_out {
        if let Err(e) = export_csv(&snapshots, Path::new(path)) {
            eprintln!("error: failed to write CSV: {e}");
            process::exit(1);
        }
        info!(path = %path, rows = snapshots.len(), "telemetry written");
    }

    #[cfg(feature = "api")]
    if cli.serve {
        use std::net::SocketAddr;

        let period = ticker.simulation().lock().config().tick;
        let sim = ticker.simulation().clone();
        let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
        let rt = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
            eprintln!("error: failed to create tokio runtime: {e}");
            process::exit(1);
        });
        let served = rt.block_on(async move {
            let background = ticker.spawn(period);
            let served = grid_sim::api::serve(sim, addr).await;
            background.abort();
            served
        });
        if let Err(e) = served {
            eprintln!("error: API server failed: {e}");
            process::exit(1);
        }
    }
}
