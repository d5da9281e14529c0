use super::{Cli, CliError};
use anyhow::Context;
use fehmtest_core::domain::HarnessError;
use fehmtest_core::harness::report::{DEFAULT_FAIL_LOG, write_fail_log, write_report_file};
use fehmtest_core::harness::{
    Catalogue, CaseRunner, Orchestrator, OrchestratorConfig, RunnerConfig, SuiteMode,
    render_human_summary,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

pub(super) fn run_suite_command(cli: Cli, mode: SuiteMode) -> Result<i32, CliError> {
    let executable = std::path::absolute(&cli.exe)
        .with_context(|| format!("failed to resolve executable path '{}'", cli.exe.display()))?;
    let cases_root = std::path::absolute(&cli.cases_root)
        .with_context(|| format!("failed to resolve cases root '{}'", cli.cases_root.display()))?;

    let catalogue = match &cli.manifest {
        Some(path) => Catalogue::from_manifest_path(path).map_err(HarnessError::from)?,
        None => Catalogue::builtin(),
    };
    let cases = catalogue.select(&mode).map_err(HarnessError::from)?;
    info!(
        executable = %executable.display(),
        cases_root = %cases_root.display(),
        ?mode,
        cases = cases.len(),
        "starting test suite"
    );

    let runner = CaseRunner::new(
        RunnerConfig::new(executable)
            .with_timeout(cli.timeout_seconds.map(Duration::from_secs)),
    );
    let orchestrator = Orchestrator::new(
        runner,
        OrchestratorConfig {
            cases_root,
            ..OrchestratorConfig::default()
        },
    );
    let report = orchestrator.run_suite(cases);

    println!("{}", render_human_summary(&report));

    if let Some(fail_log) = fail_log_path(&cli) {
        let lines = write_fail_log(&fail_log, &report).map_err(HarnessError::from)?;
        println!("Failure log: {} ({} lines)", fail_log.display(), lines);
    }
    if let Some(report_path) = &cli.report {
        write_report_file(report_path, &report).map_err(HarnessError::from)?;
        println!("JSON report: {}", report_path.display());
    }

    if report.passed { Ok(0) } else { Ok(1) }
}

fn fail_log_path(cli: &Cli) -> Option<PathBuf> {
    match (&cli.fail_log, cli.log) {
        (Some(path), _) => Some(path.clone()),
        (None, true) => Some(PathBuf::from(DEFAULT_FAIL_LOG)),
        (None, false) => None,
    }
}
