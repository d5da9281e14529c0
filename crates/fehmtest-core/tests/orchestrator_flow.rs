use fehmtest_core::domain::{ComparisonParameters, FailureReason, FileKind, SubCase, TestCase};
use fehmtest_core::harness::orchestrator::{Orchestrator, OrchestratorConfig};
use fehmtest_core::harness::report::{CheckStatus, SkipReason};
use fehmtest_core::harness::runner::{RunOutcome, RunnerError, SimulatorRunner, read_error_log};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const STAGED_DIR: &str = "staged";

/// Stands in for the simulator: copies pre-made output from `staged/` into
/// the case directory and reports completion as configured.
struct StagingRunner {
    completes: bool,
}

impl SimulatorRunner for StagingRunner {
    fn run(&self, case_dir: &Path, subcase: &SubCase) -> Result<RunOutcome, RunnerError> {
        let staged = case_dir.join(STAGED_DIR);
        if let Ok(entries) = fs::read_dir(&staged) {
            for entry in entries.flatten() {
                fs::copy(entry.path(), case_dir.join(entry.file_name()))
                    .expect("staged file should be copied");
            }
        }
        let error_path = case_dir.join("fehmn.err");
        Ok(RunOutcome {
            completed: self.completes,
            error_log: read_error_log(&error_path),
            output_path: Some(case_dir.join(format!("{}.out", subcase.name()))),
            error_path,
            timed_out: false,
        })
    }
}

fn theis_case() -> TestCase {
    TestCase::new(
        "theis",
        "Pressure transient analysis",
        ComparisonParameters::default()
            .with_times([2.0])
            .with_variables(["P"]),
    )
}

fn contour_avs(pressure_at_node_3: f64) -> String {
    format!(
        "# time = 2.0\n1 1\nP, (MPa)\n1 1.0\n2 1.0\n3 {pressure_at_node_3}\n4 1.0\n"
    )
}

fn stage_theis(root: &Path, pressure_at_node_3: f64) -> PathBuf {
    let case_dir = root.join("theis");
    write_file(&case_dir, "input/control/fehmn.files", "outp: theis.out\n");
    write_file(&case_dir, "compare/theis.00002_sca_node.avs", &contour_avs(1.0));
    write_file(
        &case_dir,
        "staged/theis.00002_sca_node.avs",
        &contour_avs(pressure_at_node_3),
    );
    case_dir
}

fn orchestrator(root: &Path, completes: bool) -> Orchestrator<StagingRunner> {
    Orchestrator::new(
        StagingRunner { completes },
        OrchestratorConfig {
            cases_root: root.to_path_buf(),
            ..OrchestratorConfig::default()
        },
    )
}

#[test]
fn theis_passes_when_pressure_drift_is_below_maxerr() {
    let temp = TempDir::new().expect("tempdir should be created");
    let case_dir = stage_theis(temp.path(), 1.0 + 5.0e-5);

    let case = theis_case();
    let report = orchestrator(temp.path(), true).run_suite([&case]);

    assert!(report.passed, "report: {report:?}");
    let checks = &report.cases[0].subcases[0].checks;
    assert_eq!(checks.len(), 1);
    assert_eq!(checks[0].file_kind, FileKind::ContourAvs);
    assert_eq!(checks[0].status, CheckStatus::Checked);
    assert_eq!(checks[0].checked_coordinates, 1);

    assert!(!case_dir.join("theis.00002_sca_node.avs").exists());
    assert!(case_dir.join("compare/theis.00002_sca_node.avs").exists());
}

#[test]
fn theis_fails_naming_variable_and_time_when_drift_exceeds_maxerr() {
    let temp = TempDir::new().expect("tempdir should be created");
    stage_theis(temp.path(), 1.0 + 2.0e-4);

    let case = theis_case();
    let report = orchestrator(temp.path(), true).run_suite([&case]);

    assert!(!report.passed);
    let failures = report.failures().collect::<Vec<_>>();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].reason, FailureReason::ThresholdExceeded);
    assert_eq!(failures[0].variable.as_deref(), Some("P"));
    assert_eq!(failures[0].time, Some(2.0));
    assert_eq!(failures[0].node, None);
    assert_eq!(
        failures[0].fail_log_line(),
        "Failed at subcase: filetype:*.avs variable:P time:2.0"
    );
}

#[test]
fn reference_kinds_without_new_output_are_skipped_not_failed() {
    let temp = TempDir::new().expect("tempdir should be created");
    let case_dir = stage_theis(temp.path(), 1.0);
    write_file(&case_dir, "compare/theis.his", "time,P:1\n0.0,1.0\n");

    let case = theis_case();
    let report = orchestrator(temp.path(), true).run_suite([&case]);

    assert!(report.passed);
    let checks = &report.cases[0].subcases[0].checks;
    let kinds = checks.iter().map(|check| check.file_kind).collect::<Vec<_>>();
    assert_eq!(kinds, vec![FileKind::ContourAvs, FileKind::History]);
    assert_eq!(checks[1].status, CheckStatus::Skipped);
    assert_eq!(checks[1].skip_reason, Some(SkipReason::NoNewOutput));
}

#[test]
fn incomplete_run_fails_with_verbatim_error_log_and_skips_comparisons() {
    let temp = TempDir::new().expect("tempdir should be created");
    let case_dir = stage_theis(temp.path(), 1.0);
    write_file(&case_dir, "staged/fehmn.err", "ERROR: zone 3 undefined\n");

    let case = theis_case();
    let report = orchestrator(temp.path(), false).run_suite([&case]);

    assert!(!report.passed);
    let subcase = &report.cases[0].subcases[0];
    assert!(!subcase.run.completed);
    assert_eq!(subcase.run.error_log, "ERROR: zone 3 undefined\n");
    assert!(subcase.checks.is_empty());
    assert!(!case_dir.join("fehmn.err").exists());
}

#[test]
fn named_subcases_compare_their_own_files() {
    let temp = TempDir::new().expect("tempdir should be created");
    let case_dir = temp.path().join("multi_solute");
    write_file(&case_dir, "input/control/run1.files", "outp: run1.out\n");
    write_file(&case_dir, "input/control/run2.files", "outp: run2.out\n");
    write_file(&case_dir, "compare/multi_run1.trc", "time,Np:1\n0.0,0.0\n1.0,0.5\n");
    write_file(&case_dir, "compare/multi_run2.trc", "time,Np:1\n0.0,0.0\n1.0,0.5\n");
    write_file(&case_dir, "staged/multi_run1.trc", "time,Np:1\n0.0,0.0\n1.0,0.5\n");
    write_file(&case_dir, "staged/multi_run2.trc", "time,Np:1\n0.0,0.0\n1.0,0.9\n");

    let case = TestCase::new("multi_solute", "", ComparisonParameters::default());
    let report = orchestrator(temp.path(), true).run_suite([&case]);

    let subcases = &report.cases[0].subcases;
    assert_eq!(subcases.len(), 2);
    assert!(subcases[0].passed());
    assert!(!subcases[1].passed());
    let failures = report.failures().collect::<Vec<_>>();
    assert_eq!(
        failures[0].fail_log_line(),
        "Failed at subcase:run2 filetype:*.trc variable:Np node:1"
    );
}

#[test]
fn malformed_output_errors_the_case_and_suite_continues() {
    let temp = TempDir::new().expect("tempdir should be created");
    let theis_dir = stage_theis(temp.path(), 1.0);
    write_file(&theis_dir, "staged/theis.00002_sca_node.avs", "1 1\nP, (MPa)\n1 1.0\n");

    let head_dir = temp.path().join("head");
    write_file(&head_dir, "input/control/fehmn.files", "outp: head.out\n");

    let theis = theis_case();
    let head = TestCase::new("head", "", ComparisonParameters::default());
    let report = orchestrator(temp.path(), true).run_suite([&theis, &head]);

    assert_eq!(report.case_count, 2);
    assert!(!report.cases[0].passed);
    let error = report.cases[0].error.as_deref().expect("theis should error");
    assert!(error.contains("does not declare a snapshot time"), "{error}");
    assert!(!theis_dir.join("theis.00002_sca_node.avs").exists());
    assert!(report.cases[1].passed);
}

#[test]
fn missing_case_directory_is_reported_as_error() {
    let temp = TempDir::new().expect("tempdir should be created");
    let case = theis_case();
    let report = orchestrator(temp.path(), true).run_suite([&case]);

    assert!(!report.passed);
    let error = report.cases[0].error.as_deref().expect("case should error");
    assert!(error.contains("INPUT.CASE_DIRECTORY"));
}

#[test]
fn simulator_pressure_label_is_compared_as_p() {
    let temp = TempDir::new().expect("tempdir should be created");
    let case_dir = temp.path().join("theis");
    write_file(&case_dir, "input/control/fehmn.files", "outp: theis.out\n");
    let avs = |pressure: f64| {
        format!("# time = 2.0\n1 1\nLiquid Pressure (MPa), (MPa)\n1 1.0\n2 {pressure}\n")
    };
    write_file(&case_dir, "compare/theis.00002_sca_node.avs", &avs(1.0));
    write_file(&case_dir, "staged/theis.00002_sca_node.avs", &avs(9.0));

    let case = theis_case();
    let report = orchestrator(temp.path(), true).run_suite([&case]);

    assert!(!report.passed);
    let failures = report.failures().collect::<Vec<_>>();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].reason, FailureReason::ThresholdExceeded);
    assert_eq!(failures[0].variable.as_deref(), Some("P"));
}

#[test]
fn requested_variable_missing_from_contour_output_fails() {
    let temp = TempDir::new().expect("tempdir should be created");
    let case_dir = temp.path().join("theis");
    write_file(&case_dir, "input/control/fehmn.files", "outp: theis.out\n");
    let avs = "# time = 2.0\n1 1\nHydraulic Head (m), (m)\n1 10.0\n";
    write_file(&case_dir, "compare/theis.00002_sca_node.avs", avs);
    write_file(&case_dir, "staged/theis.00002_sca_node.avs", avs);

    let case = theis_case();
    let report = orchestrator(temp.path(), true).run_suite([&case]);

    assert!(!report.passed);
    let check = &report.cases[0].subcases[0].checks[0];
    assert_eq!(check.checked_coordinates, 0);
    assert_eq!(check.failures[0].reason, FailureReason::MissingCoordinate);
    assert_eq!(check.failures[0].variable.as_deref(), Some("P"));
}

#[test]
fn tabular_output_compares_first_file_of_each_side() {
    let temp = TempDir::new().expect("tempdir should be created");
    let case_dir = temp.path().join("saltvcon");
    write_file(&case_dir, "input/control/fehmn.files", "outp: run.log\n");
    let table =
        |kx: f64| format!("FEHM\ncomponent,node,Kx,n\nwater,4,{kx},0.1\nwater,7,2.0,0.1\n");
    write_file(&case_dir, "compare/a_saltvcon.out", &table(2.0));
    write_file(&case_dir, "compare/b_saltvcon.out", &table(2.0));
    write_file(&case_dir, "staged/a_saltvcon.out", &table(2.5));
    write_file(&case_dir, "staged/b_saltvcon.out", &table(80.0));

    let case = TestCase::new(
        "saltvcon",
        "Salt thermal conductivity",
        ComparisonParameters::default()
            .with_components(["water"])
            .with_variables(["Kx"]),
    );
    let report = orchestrator(temp.path(), true).run_suite([&case]);

    assert!(!report.passed);
    let check = &report.cases[0].subcases[0].checks[0];
    assert_eq!(check.file_kind, FileKind::Output);
    assert_eq!(check.reference_files.len(), 1);
    assert!(check.reference_files[0].ends_with("a_saltvcon.out"));
    assert_eq!(check.checked_coordinates, 2);
    assert_eq!(check.failures.len(), 1);
    assert_eq!(
        check.failures[0].fail_log_line(),
        "Failed at subcase: filetype:*.out component:water node:4 variable:Kx"
    );
    let measured = check.failures[0].measured.expect("measured value recorded");
    assert!((measured - 0.5).abs() < 1.0e-12);
}

#[test]
fn case_directory_outside_the_cases_root_is_refused_before_cleanup() {
    let temp = TempDir::new().expect("tempdir should be created");
    write_file(temp.path(), "notes.txt", "keep me\n");
    write_file(temp.path(), "input/control/fehmn.files", "outp: run.out\n");

    let case = TestCase::new("plume", "", ComparisonParameters::default()).in_directory("");
    let report = orchestrator(temp.path(), true).run_suite([&case]);

    assert!(!report.passed);
    let error = report.cases[0].error.as_deref().expect("case should error");
    assert!(error.contains("INPUT.CASE_DIRECTORY"), "{error}");
    assert!(temp.path().join("notes.txt").exists());
}

fn write_file(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("parent dir should be created");
    }
    fs::write(path, content).expect("file should be written");
}
