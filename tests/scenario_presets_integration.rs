use std::path::Path;
use std::process::Command;

use grid_sim::config::ScenarioConfig;

#[derive(Debug)]
struct Failures {
    trips: u64,
    manual: u64,
    cascade: u64,
}

#[test]
fn presets_run_via_cli_and_produce_distinct_dynamics() {
    let baseline = run_and_parse_failures(&["--preset", "baseline", "--ticks", "120"]);
    let heatwave = run_and_parse_failures(&["--preset", "heatwave", "--ticks", "120"]);
    let blackout = run_and_parse_failures(&["--preset", "blackout"]);

    assert_eq!(baseline.trips + baseline.cascade, 0, "baseline: {baseline:?}");
    assert!(heatwave.trips > 0, "expected heatwave trips: {heatwave:?}");
    assert_eq!(heatwave.cascade, 0);
    // eight substations in the order, the medical center survives
    assert_eq!(blackout.cascade, 7, "blackout: {blackout:?}");
    assert_eq!(blackout.manual, 0);
}

#[test]
fn bundled_scenario_files_are_valid() {
    for name in ["baseline", "heatwave", "blackout", "v2g_demo"] {
        let path = format!("scenarios/{name}.toml");
        let cfg = ScenarioConfig::from_toml_file(Path::new(&path));
        assert!(cfg.is_ok(), "{path} should parse: {:?}", cfg.err());
        let errors = cfg.map(|c| c.validate()).unwrap_or_default();
        assert!(errors.is_empty(), "{path} should be valid: {errors:?}");
    }
}

#[test]
fn invalid_preset_exits_with_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_grid-sim"))
        .args(["--preset", "tornado"])
        .output()
        .expect("grid-sim process should run");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown preset"));
}

fn run_and_parse_failures(args: &[&str]) -> Failures {
    let output = Command::new(env!("CARGO_BIN_EXE_grid-sim"))
        .args(args)
        .arg("--quiet")
        .env("GRID_SIM_LOG", "error")
        .output()
        .expect("grid-sim process should run");

    assert!(
        output.status.success(),
        "run failed for {args:?}: stderr={} ",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8(output.stdout).expect("stdout should be valid UTF-8");
    parse_failures(&stdout)
}

/// Parses `Failures: N trips, M manual, K cascade` from the KPI report.
fn parse_failures(stdout: &str) -> Failures {
    let line = stdout
        .lines()
        .find(|line| line.trim_start().starts_with("Failures:"))
        .unwrap_or_else(|| panic!("missing Failures line in output: {stdout}"));
    let counts: Vec<u64> = line
        .split_once(':')
        .map(|(_, right)| right)
        .unwrap_or_default()
        .split(',')
        .map(|part| {
            part.split_whitespace()
                .next()
                .and_then(|n| n.parse().ok())
                .unwrap_or_else(|| panic!("invalid Failures line `{line}`"))
        })
        .collect();
    assert_eq!(counts.len(), 3, "invalid Failures line `{line}`");
    Failures {
        trips: counts[0],
        manual: counts[1],
        cascade: counts[2],
    }
}
