#![forbid(unsafe_code)]

pub mod builtin;
pub mod error;
pub mod kernel_bundle;
pub mod kernels;
pub mod logging;
pub mod multi_ptr;
pub mod outcome;
pub mod probe;
pub mod registry;
pub mod report;
pub mod restrictions;
pub mod usm_alloc;

pub use builtin::register_builtin_cases;
pub use error::ConfigError;
pub use outcome::{CaseContext, CaseError, CaseRecord, CaseResult, CaseStatus, Outcome};
pub use registry::{Registry, RunSelection, TestCase};
pub use report::RunReport;

use crate::kernels::runtime_kernel_defs;
use hct_runtime::{DeviceProfile, SimulatedRuntime};
use hct_types::CoverageLevel;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

pub const FULL_CONFORMANCE_ENV: &str = "HCT_FULL_CONFORMANCE";
pub const CASE_LOG_PATH_ENV: &str = "HCT_CASE_LOG_PATH";

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub fixture_root: PathBuf,
    pub device_profile: PathBuf,
    pub coverage: CoverageLevel,
    pub selection: RunSelection,
    pub report_path: Option<PathBuf>,
}

impl HarnessConfig {
    #[must_use]
    pub fn default_paths() -> Self {
        let fixture_root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures");
        Self {
            device_profile: fixture_root.join("device_profile.json"),
            fixture_root,
            coverage: coverage_level(),
            selection: RunSelection::All,
            report_path: None,
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::default_paths()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteReport {
    pub suite: String,
    pub case_count: usize,
    pub pass_count: usize,
    pub skip_count: usize,
    pub failures: Vec<String>,
}

impl SuiteReport {
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.case_count == self.pass_count + self.skip_count && self.failures.is_empty()
    }
}

static COVERAGE_LEVEL: OnceLock<CoverageLevel> = OnceLock::new();
static CASE_LOG_PATH: OnceLock<Mutex<Option<PathBuf>>> = OnceLock::new();

/// Process-wide coverage level, read from `HCT_FULL_CONFORMANCE` on first
/// use and fixed from then on.
pub fn coverage_level() -> CoverageLevel {
    *COVERAGE_LEVEL.get_or_init(|| {
        let Some(raw) = std::env::var_os(FULL_CONFORMANCE_ENV) else {
            return CoverageLevel::Minimal;
        };
        let raw = raw.to_string_lossy();
        CoverageLevel::from_wire(&raw).unwrap_or_else(|| {
            tracing::warn!(value = %raw, "unrecognized {FULL_CONFORMANCE_ENV}, using minimal coverage");
            CoverageLevel::Minimal
        })
    })
}

/// Fixes the coverage level before anything reads it. Pinning the level
/// that is already in force is a no-op.
pub fn pin_coverage_level(level: CoverageLevel) -> Result<CoverageLevel, ConfigError> {
    let pinned = *COVERAGE_LEVEL.get_or_init(|| level);
    if pinned == level {
        Ok(level)
    } else {
        Err(ConfigError::CoverageLevelAlreadySet {
            pinned,
            requested: level,
        })
    }
}

pub fn set_case_log_path(path: Option<PathBuf>) {
    let cell = CASE_LOG_PATH.get_or_init(|| Mutex::new(None));
    if let Ok(mut slot) = cell.lock() {
        *slot = path;
    }
}

/// One JSON line per finished case.
#[derive(Debug, Serialize)]
pub(crate) struct CaseLogEntry<'a> {
    pub case: &'a str,
    pub suite: &'a str,
    pub platform: &'a str,
    pub coverage: &'static str,
    pub status: &'static str,
    pub outcome: &'a Outcome,
    pub assertions: usize,
    pub elapsed_ms: f64,
}

pub(crate) fn maybe_append_case_log(entry: &CaseLogEntry<'_>) -> Result<(), String> {
    let configured = CASE_LOG_PATH
        .get()
        .and_then(|cell| cell.lock().ok())
        .and_then(|slot| slot.clone());
    let from_env = std::env::var_os(CASE_LOG_PATH_ENV).map(PathBuf::from);
    let Some(path) = configured.or(from_env) else {
        return Ok(());
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| format!("failed creating {}: {err}", parent.display()))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|err| format!("failed opening {}: {err}", path.display()))?;
    let line = serde_json::to_string(entry)
        .map_err(|err| format!("failed serializing case log entry: {err}"))?;
    let mut payload = line.into_bytes();
    payload.push(b'\n');
    file.write_all(&payload)
        .map_err(|err| format!("failed appending case log {}: {err}", path.display()))
}

/// Registry holding every built-in case at `level`.
pub fn build_registry(level: CoverageLevel) -> Result<Registry, ConfigError> {
    let mut registry = Registry::new(level);
    register_builtin_cases(&mut registry)?;
    Ok(registry)
}

/// Simulated runtime for `config.device_profile`, knowing the kernel catalog.
pub fn load_runtime(config: &HarnessConfig) -> Result<SimulatedRuntime, ConfigError> {
    let profile = DeviceProfile::load(&config.device_profile).map_err(ConfigError::Profile)?;
    SimulatedRuntime::from_profile(profile, runtime_kernel_defs())
        .map_err(|err| ConfigError::Profile(err.to_string()))
}

/// Registers the built-ins, loads the profile and runs the selected cases.
pub fn run_conformance(config: &HarnessConfig) -> Result<RunReport, ConfigError> {
    let registry = build_registry(config.coverage)?;
    let runtime = load_runtime(config)?;
    Ok(registry.run_filtered(&runtime, &config.selection))
}

#[cfg(test)]
mod tests {
    use super::{
        ConfigError, HarnessConfig, SuiteReport, build_registry, coverage_level, load_runtime,
        pin_coverage_level,
    };
    use hct_runtime::ComputeRuntime;
    use hct_types::CoverageLevel;

    #[test]
    fn default_paths_point_at_fixtures() {
        let cfg = HarnessConfig::default_paths();
        assert!(cfg.fixture_root.is_dir());
        assert!(cfg.device_profile.is_file());
        assert!(cfg.report_path.is_none());
    }

    #[test]
    fn coverage_level_is_fixed_once_read() {
        let current = coverage_level();
        assert_eq!(pin_coverage_level(current), Ok(current));
        let other = if current.is_full() {
            CoverageLevel::Minimal
        } else {
            CoverageLevel::Full
        };
        assert_eq!(
            pin_coverage_level(other),
            Err(ConfigError::CoverageLevelAlreadySet {
                pinned: current,
                requested: other,
            })
        );
    }

    #[test]
    fn missing_profile_is_a_config_error() {
        let mut cfg = HarnessConfig::default_paths();
        cfg.device_profile = cfg.fixture_root.join("does_not_exist.json");
        let err = load_runtime(&cfg).expect_err("missing profile");
        assert!(matches!(err, ConfigError::Profile(msg) if msg.contains("failed reading")));
    }

    #[test]
    fn fixture_profile_knows_the_kernel_catalog() {
        let runtime = load_runtime(&HarnessConfig::default_paths()).expect("fixture profile");
        assert_eq!(runtime.kernel_ids().len(), crate::kernels::catalog().len());
        assert!(!build_registry(CoverageLevel::Full).expect("registry").is_empty());
    }

    #[test]
    fn suite_report_counts_skips_as_clean() {
        let report = SuiteReport {
            suite: "usm".to_string(),
            case_count: 3,
            pass_count: 2,
            skip_count: 1,
            failures: Vec::new(),
        };
        assert!(report.all_passed());
    }
}
