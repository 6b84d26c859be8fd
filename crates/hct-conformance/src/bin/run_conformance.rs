#![forbid(unsafe_code)]

use hct_conformance::logging::init_logging;
use hct_conformance::{
    HarnessConfig, RunSelection, SuiteReport, build_registry, pin_coverage_level,
    run_conformance, set_case_log_path,
};
use hct_types::CoverageLevel;
use serde::Serialize;
use std::path::PathBuf;

const USAGE: &str = "Usage: cargo run -p hct-conformance --bin run_conformance -- \
[--filter <substr>]... [--list] [--full] [--device-profile <path>] \
[--report-path <path>] [--log-path <path>] [--json-log <path>] [-v|--verbose]";

#[derive(Debug, Serialize)]
struct SuiteSummary {
    suite: String,
    case_count: usize,
    pass_count: usize,
    skip_count: usize,
    failures: Vec<String>,
}

#[derive(Debug, Serialize)]
struct RunSummary {
    status: &'static str,
    platform: String,
    coverage: &'static str,
    digest: String,
    case_count: usize,
    pass_count: usize,
    fail_count: usize,
    skip_count: usize,
    report_path: Option<String>,
    suites: Vec<SuiteSummary>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("run_conformance failed: {err}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32, String> {
    let mut filters: Vec<String> = Vec::new();
    let mut list_only = false;
    let mut full = false;
    let mut device_profile: Option<PathBuf> = None;
    let mut report_path: Option<PathBuf> = None;
    let mut case_log_path: Option<PathBuf> = None;
    let mut json_log_path: Option<PathBuf> = None;
    let mut verbose = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--filter" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--filter requires a value".to_string())?;
                filters.push(value);
            }
            "--list" => list_only = true,
            "--full" => full = true,
            "--device-profile" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--device-profile requires a value".to_string())?;
                device_profile = Some(PathBuf::from(value));
            }
            "--report-path" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--report-path requires a value".to_string())?;
                report_path = Some(PathBuf::from(value));
            }
            "--log-path" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--log-path requires a value".to_string())?;
                case_log_path = Some(PathBuf::from(value));
            }
            "--json-log" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--json-log requires a value".to_string())?;
                json_log_path = Some(PathBuf::from(value));
            }
            "--verbose" | "-v" => verbose = true,
            "--help" | "-h" => {
                println!("{USAGE}");
                return Ok(0);
            }
            unknown => return Err(format!("unknown argument: {unknown}")),
        }
    }

    init_logging(json_log_path.as_deref(), verbose)?;
    if full {
        pin_coverage_level(CoverageLevel::Full).map_err(|err| err.to_string())?;
    }

    let mut config = HarnessConfig::default_paths();
    if let Some(path) = device_profile {
        config.device_profile = path;
    }
    if !filters.is_empty() {
        config.selection = RunSelection::NameFilter(filters);
    }
    config.report_path = report_path;

    if list_only {
        let registry = build_registry(config.coverage).map_err(|err| err.to_string())?;
        for name in registry
            .names()
            .into_iter()
            .filter(|name| config.selection.selects(name))
        {
            println!("{name}");
        }
        return Ok(0);
    }

    if case_log_path.is_some() {
        set_case_log_path(case_log_path);
    }

    let report = run_conformance(&config).map_err(|err| err.to_string())?;
    for line in report.summary_lines() {
        eprintln!("{line}");
    }
    if let Some(path) = &config.report_path {
        report.write_json(path)?;
    }

    let summary = RunSummary {
        status: if report.has_failures() { "fail" } else { "pass" },
        platform: report.platform().to_string(),
        coverage: report.coverage().as_str(),
        digest: report.digest(),
        case_count: report.cases().len(),
        pass_count: report.pass_count(),
        fail_count: report.fail_count(),
        skip_count: report.skip_count(),
        report_path: config
            .report_path
            .as_ref()
            .map(|path| path.display().to_string()),
        suites: report
            .suite_reports()
            .into_iter()
            .map(summarize_suite)
            .collect(),
    };
    let summary_json = serde_json::to_string_pretty(&summary)
        .map_err(|err| format!("failed serializing summary: {err}"))?;
    println!("{summary_json}");

    Ok(report.exit_code())
}

fn summarize_suite(report: SuiteReport) -> SuiteSummary {
    SuiteSummary {
        suite: report.suite,
        case_count: report.case_count,
        pass_count: report.pass_count,
        skip_count: report.skip_count,
        failures: report.failures,
    }
}
