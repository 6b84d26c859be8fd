#![forbid(unsafe_code)]

use crate::error::ConfigError;
use crate::outcome::{CaseContext, CaseError, CaseRecord, CaseResult, CaseStatus, SourceLocation};
use crate::report::RunReport;
use crate::{CaseLogEntry, maybe_append_case_log};
use hct_runtime::ComputeRuntime;
use hct_types::CoverageLevel;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

pub type CaseBody = Box<dyn Fn(&mut CaseContext<'_>) -> CaseResult>;

/// A named check. Immutable once handed to the [`Registry`].
pub struct TestCase {
    name: String,
    suite: String,
    location: SourceLocation,
    body: CaseBody,
}

impl TestCase {
    /// The suite defaults to the name's first `_`-separated segment.
    #[track_caller]
    pub fn new(
        name: impl Into<String>,
        body: impl Fn(&mut CaseContext<'_>) -> CaseResult + 'static,
    ) -> Self {
        let name = name.into();
        let suite = name.split('_').next().unwrap_or_default().to_string();
        Self {
            name,
            suite,
            location: SourceLocation::caller(),
            body: Box::new(body),
        }
    }

    #[must_use]
    pub fn in_suite(mut self, suite: &str) -> Self {
        self.suite = suite.to_string();
        self
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
}

impl std::fmt::Debug for TestCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("suite", &self.suite)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RunSelection {
    #[default]
    All,
    /// Runs cases whose name contains any of the substrings.
    NameFilter(Vec<String>),
}

impl RunSelection {
    #[must_use]
    pub fn selects(&self, name: &str) -> bool {
        match self {
            Self::All => true,
            Self::NameFilter(patterns) => patterns.iter().any(|p| name.contains(p.as_str())),
        }
    }
}

/// Ordered set of uniquely named cases for one coverage level.
#[derive(Debug, Default)]
pub struct Registry {
    coverage: CoverageLevel,
    cases: Vec<TestCase>,
}

impl Registry {
    #[must_use]
    pub fn new(coverage: CoverageLevel) -> Self {
        Self {
            coverage,
            cases: Vec::new(),
        }
    }

    pub fn register(&mut self, case: TestCase) -> Result<(), ConfigError> {
        if let Some(existing) = self.cases.iter().find(|c| c.name == case.name) {
            return Err(ConfigError::DuplicateName {
                name: case.name,
                first: existing.location,
                second: case.location,
            });
        }
        tracing::trace!(case = %case.name, suite = %case.suite, "case registered");
        self.cases.push(case);
        Ok(())
    }

    #[must_use]
    pub fn coverage(&self) -> CoverageLevel {
        self.coverage
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TestCase> {
        self.cases.iter()
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.cases.iter().map(TestCase::name).collect()
    }

    pub fn run_all(&self, runtime: &dyn ComputeRuntime) -> RunReport {
        self.run_filtered(runtime, &RunSelection::All)
    }

    /// Runs the selected cases in registration order, each exactly once.
    pub fn run_filtered(&self, runtime: &dyn ComputeRuntime, selection: &RunSelection) -> RunReport {
        let selected = self
            .cases
            .iter()
            .filter(|case| selection.selects(&case.name))
            .collect::<Vec<_>>();
        tracing::info!(
            platform = runtime.platform_name(),
            coverage = self.coverage.as_str(),
            selected = selected.len(),
            registered = self.cases.len(),
            "conformance run started"
        );

        let records = selected
            .iter()
            .map(|case| self.run_case(runtime, case))
            .collect::<Vec<_>>();

        let report = RunReport::new(runtime.platform_name(), self.coverage, records);
        tracing::info!(
            passed = report.pass_count(),
            failed = report.fail_count(),
            skipped = report.skip_count(),
            "conformance run finished"
        );
        report
    }

    fn run_case(&self, runtime: &dyn ComputeRuntime, case: &TestCase) -> CaseRecord {
        let span = tracing::info_span!("case", name = %case.name, suite = %case.suite);
        let _entered = span.enter();
        tracing::debug!("case started");

        let started = Instant::now();
        let mut ctx = CaseContext::new(runtime, self.coverage);
        let result = panic::catch_unwind(AssertUnwindSafe(|| (case.body)(&mut ctx)))
            .unwrap_or_else(|payload| {
                Err(CaseError::Fault(format!("panic: {}", panic_message(&*payload))))
            });
        let (terminal, assertions, outcomes) = ctx.finish(result, case.location);
        let status = CaseStatus::Registered
            .advance(CaseStatus::Running)
            .and_then(|running| running.advance(terminal))
            .unwrap_or(CaseStatus::Failed);
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        let record = CaseRecord::new(
            &case.name,
            &case.suite,
            case.location,
            status,
            assertions,
            elapsed_ms,
            outcomes,
        );
        let outcome = record.outcome();
        if status == CaseStatus::Failed {
            tracing::warn!(
                assertions,
                elapsed_ms,
                message = outcome.detail(),
                "case failed"
            );
        } else {
            tracing::info!(
                status = status.as_str(),
                assertions,
                elapsed_ms,
                "case finished"
            );
        }

        let entry = CaseLogEntry {
            case: record.name(),
            suite: record.suite(),
            platform: runtime.platform_name(),
            coverage: self.coverage.as_str(),
            status: status.as_str(),
            outcome: &outcome,
            assertions,
            elapsed_ms,
        };
        if let Err(err) = maybe_append_case_log(&entry) {
            tracing::warn!(error = %err, "case log append failed");
        }
        record
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|msg| (*msg).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
