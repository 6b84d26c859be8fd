#![forbid(unsafe_code)]

use crate::SuiteReport;
use crate::outcome::{CaseRecord, CaseStatus, Outcome};
use hct_types::CoverageLevel;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Aggregate of one run, in execution order.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    platform: String,
    coverage: CoverageLevel,
    generated_at_unix_ms: u64,
    cases: Vec<CaseRecord>,
}

#[derive(Serialize)]
struct DigestBody<'a> {
    platform: &'a str,
    coverage: CoverageLevel,
    outcomes: Vec<(&'a str, Outcome)>,
}

impl RunReport {
    #[must_use]
    pub fn new(platform: &str, coverage: CoverageLevel, cases: Vec<CaseRecord>) -> Self {
        let generated_at_unix_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
        Self {
            platform: platform.to_string(),
            coverage,
            generated_at_unix_ms,
            cases,
        }
    }

    #[must_use]
    pub fn platform(&self) -> &str {
        &self.platform
    }

    #[must_use]
    pub fn coverage(&self) -> CoverageLevel {
        self.coverage
    }

    #[must_use]
    pub fn cases(&self) -> &[CaseRecord] {
        &self.cases
    }

    /// `(case name, outcome)` pairs in execution order.
    #[must_use]
    pub fn outcomes(&self) -> Vec<(&str, Outcome)> {
        self.cases
            .iter()
            .map(|case| (case.name(), case.outcome()))
            .collect()
    }

    fn count(&self, status: CaseStatus) -> usize {
        self.cases.iter().filter(|c| c.status() == status).count()
    }

    #[must_use]
    pub fn pass_count(&self) -> usize {
        self.count(CaseStatus::Passed)
    }

    #[must_use]
    pub fn fail_count(&self) -> usize {
        self.count(CaseStatus::Failed)
    }

    #[must_use]
    pub fn skip_count(&self) -> usize {
        self.count(CaseStatus::Skipped)
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.fail_count() > 0
    }

    /// 0 when no case failed, 2 otherwise.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.has_failures() { 2 } else { 0 }
    }

    /// Groups cases by suite, in order of first appearance.
    #[must_use]
    pub fn suite_reports(&self) -> Vec<SuiteReport> {
        let mut reports: Vec<SuiteReport> = Vec::new();
        for case in &self.cases {
            let idx = match reports.iter().position(|r| r.suite == case.suite()) {
                Some(idx) => idx,
                None => {
                    reports.push(SuiteReport {
                        suite: case.suite().to_string(),
                        case_count: 0,
                        pass_count: 0,
                        skip_count: 0,
                        failures: Vec::new(),
                    });
                    reports.len() - 1
                }
            };
            let report = &mut reports[idx];
            report.case_count += 1;
            match case.outcome() {
                Outcome::Fail { message, location } => report
                    .failures
                    .push(format!("{}: {message} ({location})", case.name())),
                Outcome::Skip { .. } => report.skip_count += 1,
                Outcome::Pass | Outcome::Note { .. } => report.pass_count += 1,
            }
        }
        reports
    }

    /// SHA-256 of platform, coverage and outcomes. Timing is excluded so
    /// identical runs hash identically.
    #[must_use]
    pub fn digest(&self) -> String {
        let body = DigestBody {
            platform: &self.platform,
            coverage: self.coverage,
            outcomes: self.outcomes(),
        };
        let bytes = serde_json::to_vec(&body).unwrap_or_default();
        sha256_hex(&bytes)
    }

    #[must_use]
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = self
            .cases
            .iter()
            .map(|case| match case.outcome() {
                Outcome::Fail { message, location } => {
                    format!("FAIL {}: {message} ({location})", case.name())
                }
                Outcome::Skip { reason } => format!("SKIP {}: {reason}", case.name()),
                Outcome::Pass | Outcome::Note { .. } => format!("PASS {}", case.name()),
            })
            .collect::<Vec<_>>();
        lines.push(format!(
            "{} cases on {} ({} coverage): {} passed, {} failed, {} skipped",
            self.cases.len(),
            self.platform,
            self.coverage.as_str(),
            self.pass_count(),
            self.fail_count(),
            self.skip_count()
        ));
        lines
    }

    pub fn to_json(&self) -> Result<String, String> {
        serde_json::to_string_pretty(self).map_err(|err| format!("failed serializing report: {err}"))
    }

    pub fn write_json(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| format!("failed creating {}: {err}", parent.display()))?;
        }
        let payload = self.to_json()?;
        fs::write(path, payload).map_err(|err| format!("failed writing {}: {err}", path.display()))
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(&mut out, "{byte:02x}");
    }
    out
}
