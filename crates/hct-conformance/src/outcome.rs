#![forbid(unsafe_code)]

use crate::probe::{CapabilityProbe, RuntimeProbe, Scenario};
use hct_runtime::{ComputeRuntime, DeviceId, RuntimeError};
use hct_types::CoverageLevel;
use serde::Serialize;
use std::fmt;
use std::panic::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    pub file: &'static str,
    pub line: u32,
}

impl SourceLocation {
    #[track_caller]
    #[must_use]
    pub fn caller() -> Self {
        let location = Location::caller();
        Self {
            file: location.file(),
            line: location.line(),
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Pass,
    Fail {
        message: String,
        location: SourceLocation,
    },
    Skip {
        reason: String,
    },
    Note {
        message: String,
    },
}

impl Outcome {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail { .. } => "fail",
            Self::Skip { .. } => "skip",
            Self::Note { .. } => "note",
        }
    }

    /// Message or reason text, empty for `Pass`.
    #[must_use]
    pub fn detail(&self) -> &str {
        match self {
            Self::Pass => "",
            Self::Fail { message, .. } | Self::Note { message } => message,
            Self::Skip { reason } => reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub message: String,
    pub location: SourceLocation,
}

/// Why a case body stopped early.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaseError {
    #[error("{}: {}", .0.location, .0.message)]
    Assertion(Failure),
    #[error("unexpected fault: {0}")]
    Fault(String),
}

impl From<RuntimeError> for CaseError {
    fn from(err: RuntimeError) -> Self {
        Self::Fault(err.to_string())
    }
}

pub type CaseResult = Result<(), CaseError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Registered,
    Running,
    Passed,
    Failed,
    Skipped,
}

impl CaseStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Passed | Self::Failed | Self::Skipped)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Running => "running",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// `Registered -> Running -> {Passed | Failed | Skipped}`; anything else
    /// is refused.
    #[must_use]
    pub const fn advance(self, next: Self) -> Option<Self> {
        match (self, next) {
            (Self::Registered, Self::Running)
            | (Self::Running, Self::Passed | Self::Failed | Self::Skipped) => Some(next),
            _ => None,
        }
    }
}

/// Recorded result of one executed case.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseRecord {
    name: String,
    suite: String,
    location: SourceLocation,
    status: CaseStatus,
    assertions: usize,
    elapsed_ms: f64,
    outcomes: Vec<Outcome>,
}

impl CaseRecord {
    pub(crate) fn new(
        name: &str,
        suite: &str,
        location: SourceLocation,
        status: CaseStatus,
        assertions: usize,
        elapsed_ms: f64,
        outcomes: Vec<Outcome>,
    ) -> Self {
        Self {
            name: name.to_string(),
            suite: suite.to_string(),
            location,
            status,
            assertions,
            elapsed_ms,
            outcomes,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn suite(&self) -> &str {
        &self.suite
    }

    #[must_use]
    pub fn location(&self) -> SourceLocation {
        self.location
    }

    #[must_use]
    pub fn status(&self) -> CaseStatus {
        self.status
    }

    #[must_use]
    pub fn assertions(&self) -> usize {
        self.assertions
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_ms
    }

    /// Every outcome in the order it was recorded.
    #[must_use]
    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    /// The single outcome that classifies this case.
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        match self.status {
            CaseStatus::Failed => self
                .outcomes
                .iter()
                .rev()
                .find(|outcome| matches!(outcome, Outcome::Fail { .. }))
                .cloned()
                .unwrap_or(Outcome::Fail {
                    message: "case failed without a recorded message".to_string(),
                    location: self.location,
                }),
            CaseStatus::Skipped => self
                .outcomes
                .iter()
                .find(|outcome| matches!(outcome, Outcome::Skip { .. }))
                .cloned()
                .unwrap_or(Outcome::Skip {
                    reason: "skipped".to_string(),
                }),
            CaseStatus::Registered | CaseStatus::Running | CaseStatus::Passed => Outcome::Pass,
        }
    }
}

/// Assertion and reporting sink handed to every case body.
pub struct CaseContext<'a> {
    runtime: &'a dyn ComputeRuntime,
    coverage: CoverageLevel,
    outcomes: Vec<Outcome>,
    assertions: usize,
    skips: usize,
}

impl<'a> CaseContext<'a> {
    pub(crate) fn new(runtime: &'a dyn ComputeRuntime, coverage: CoverageLevel) -> Self {
        Self {
            runtime,
            coverage,
            outcomes: Vec::new(),
            assertions: 0,
            skips: 0,
        }
    }

    /// The subject under test, borrowed for this case only.
    #[must_use]
    pub fn runtime(&self) -> &'a dyn ComputeRuntime {
        self.runtime
    }

    #[must_use]
    pub fn coverage(&self) -> CoverageLevel {
        self.coverage
    }

    #[must_use]
    pub fn assertions(&self) -> usize {
        self.assertions
    }

    /// Builds the error that ends the case; return it right away.
    #[track_caller]
    #[must_use]
    pub fn fail(&self, message: impl Into<String>) -> CaseError {
        CaseError::Assertion(Failure {
            message: message.into(),
            location: SourceLocation::caller(),
        })
    }

    #[track_caller]
    pub fn ensure(&mut self, passed: bool, message: impl Into<String>) -> CaseResult {
        if passed {
            self.assertions += 1;
            Ok(())
        } else {
            Err(self.fail(message))
        }
    }

    pub fn note(&mut self, message: impl Into<String>) {
        self.outcomes.push(Outcome::Note {
            message: message.into(),
        });
    }

    pub fn skip(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::info!(reason = %reason, "scenario skipped");
        self.skips += 1;
        self.outcomes.push(Outcome::Skip { reason });
    }

    /// Pre-flight probe. Records a skip and returns `false` when `target`
    /// lacks what `scenario` needs; the caller must not run the operation.
    pub fn require(&mut self, target: DeviceId, scenario: &Scenario, what: &str) -> bool {
        self.require_with(&RuntimeProbe::new(self.runtime), target, scenario, what)
    }

    pub fn require_with(
        &mut self,
        probe: &dyn CapabilityProbe,
        target: DeviceId,
        scenario: &Scenario,
        what: &str,
    ) -> bool {
        if probe.supports(target, scenario) {
            return true;
        }
        self.skip(format!(
            "{what}: {scenario} unsupported on {target}, skipped; not a conformance failure"
        ));
        false
    }

    /// Final status and outcome log once the body has returned.
    pub(crate) fn finish(
        mut self,
        result: CaseResult,
        case_location: SourceLocation,
    ) -> (CaseStatus, usize, Vec<Outcome>) {
        let status = match result {
            Ok(()) if self.assertions == 0 && self.skips > 0 => CaseStatus::Skipped,
            Ok(()) => CaseStatus::Passed,
            Err(CaseError::Assertion(failure)) => {
                self.outcomes.push(Outcome::Fail {
                    message: failure.message,
                    location: failure.location,
                });
                CaseStatus::Failed
            }
            Err(CaseError::Fault(message)) => {
                self.outcomes.push(Outcome::Fail {
                    message: format!("unexpected fault: {message}"),
                    location: case_location,
                });
                CaseStatus::Failed
            }
        };
        (status, self.assertions, self.outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::{CaseStatus, Outcome, SourceLocation};

    #[test]
    fn status_transitions_follow_lifecycle() {
        let running = CaseStatus::Registered
            .advance(CaseStatus::Running)
            .expect("registered cases start running");
        assert_eq!(running.advance(CaseStatus::Skipped), Some(CaseStatus::Skipped));
        assert_eq!(CaseStatus::Registered.advance(CaseStatus::Passed), None);
    }

    #[test]
    fn terminal_states_are_immutable() {
        for terminal in [CaseStatus::Passed, CaseStatus::Failed, CaseStatus::Skipped] {
            assert!(terminal.is_terminal());
            for next in [
                CaseStatus::Registered,
                CaseStatus::Running,
                CaseStatus::Passed,
                CaseStatus::Failed,
                CaseStatus::Skipped,
            ] {
                assert_eq!(terminal.advance(next), None, "{terminal:?} -> {next:?}");
            }
        }
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let outcome = Outcome::Fail {
            message: "boom".to_string(),
            location: SourceLocation {
                file: "cases.rs",
                line: 12,
            },
        };
        let json = serde_json::to_value(&outcome).expect("serializable");
        assert_eq!(json["status"], "fail");
        assert_eq!(json["location"]["line"], 12);
        assert_eq!(outcome.detail(), "boom");
    }
}
