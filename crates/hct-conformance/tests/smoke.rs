use hct_conformance::logging::init_test_logging;
use hct_conformance::{
    CaseStatus, HarnessConfig, RunSelection, build_registry, load_runtime, run_conformance,
};
use hct_types::CoverageLevel;

#[test]
fn reference_profile_passes_every_builtin_suite() {
    init_test_logging();
    let cfg = HarnessConfig::default_paths();
    let report = run_conformance(&cfg).expect("conformance run should start");

    assert_eq!(report.platform(), "simulated-reference");
    assert_eq!(report.exit_code(), 0, "{:#?}", report.summary_lines());
    for suite in report.suite_reports() {
        assert!(
            suite.all_passed(),
            "suite {} failed with {:?}",
            suite.suite,
            suite.failures
        );
    }
}

#[test]
fn outcome_count_matches_registered_cases() {
    init_test_logging();
    let cfg = HarnessConfig::default_paths();
    let registry = build_registry(CoverageLevel::Minimal).expect("built-ins register");
    let runtime = load_runtime(&cfg).expect("fixture profile");
    let report = registry.run_all(&runtime);

    assert_eq!(report.outcomes().len(), registry.len());
    let names = report
        .outcomes()
        .into_iter()
        .map(|(name, _)| name.to_string())
        .collect::<Vec<_>>();
    assert_eq!(
        names,
        registry
            .names()
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>()
    );
}

#[test]
fn offline_profile_skips_instead_of_failing() {
    init_test_logging();
    let mut cfg = HarnessConfig::default_paths();
    cfg.device_profile = cfg.fixture_root.join("offline_device_profile.json");
    let report = run_conformance(&cfg).expect("conformance run should start");

    assert_eq!(report.fail_count(), 0, "{:#?}", report.summary_lines());
    assert_eq!(report.exit_code(), 0);
    for case in report.cases() {
        if case.name().starts_with("kernel_bundle") || case.name().starts_with("usm") {
            assert_eq!(case.status(), CaseStatus::Skipped, "{}", case.name());
            assert!(
                case.outcome()
                    .detail()
                    .contains("not a conformance failure")
            );
        }
    }
    assert_eq!(report.skip_count(), 10);
}

#[test]
fn full_coverage_runs_clean_on_reference_profile() {
    init_test_logging();
    let cfg = HarnessConfig::default_paths();
    let registry = build_registry(CoverageLevel::Full).expect("built-ins register");
    let runtime = load_runtime(&cfg).expect("fixture profile");
    let selection = RunSelection::NameFilter(vec!["multi_ptr".to_string(), "usm_malloc".to_string()]);
    let report = registry.run_filtered(&runtime, &selection);

    assert_eq!(report.cases().len(), 6);
    assert!(!report.has_failures(), "{:#?}", report.summary_lines());
    let composite = report
        .cases()
        .iter()
        .find(|case| case.name() == "multi_ptr_composite_types")
        .expect("composite case selected");
    assert!(
        composite
            .outcomes()
            .iter()
            .any(|outcome| outcome.detail() == "no_def_cnstr: non_default_constructible")
    );
}
