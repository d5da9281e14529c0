//! Drives test cases: sub-case discovery, simulator runs, and the per-kind
//! load/diff/evaluate sweep.

use super::comparison::evaluate;
use super::differencer::diff;
use super::report::{CaseReport, KindCheckReport, SkipReason, SubCaseReport, SuiteReport};
use super::runner::SimulatorRunner;
use crate::dataset::load_files;
use crate::domain::{FileKind, HarnessError, HarnessResult, SubCase, TestCase};
use crate::workspace::{CaseWorkspace, DEFAULT_CLEANUP_PATTERNS, WorkspaceError, glob_files};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const REFERENCE_DIR: &str = "compare";
const CONTROL_DIR: &str = "input/control";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub cases_root: PathBuf,
    pub cleanup_patterns: Vec<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cases_root: PathBuf::from("."),
            cleanup_patterns: DEFAULT_CLEANUP_PATTERNS
                .iter()
                .map(|pattern| pattern.to_string())
                .collect(),
        }
    }
}

pub struct Orchestrator<R> {
    runner: R,
    config: OrchestratorConfig,
}

impl<R: SimulatorRunner> Orchestrator<R> {
    pub fn new(runner: R, config: OrchestratorConfig) -> Self {
        Self { runner, config }
    }

    /// Runs each case in order. A failing or erroring case never stops the
    /// cases after it.
    pub fn run_suite<'a>(&self, cases: impl IntoIterator<Item = &'a TestCase>) -> SuiteReport {
        let reports = cases
            .into_iter()
            .map(|case| self.run_case(case))
            .collect::<Vec<_>>();
        SuiteReport::from_cases(reports)
    }

    pub fn run_case(&self, case: &TestCase) -> CaseReport {
        let case_dir = case.directory(&self.config.cases_root);
        info!(case = %case.name, directory = %case_dir.display(), "starting test case");

        let mut subcases = Vec::new();
        let report = match self.sweep_case(case, &case_dir, &mut subcases) {
            Ok(()) => CaseReport::new(&case.name, &case_dir, subcases),
            Err(error) => {
                warn!(case = %case.name, error = %error, "test case aborted");
                CaseReport::errored(&case.name, &case_dir, subcases, &error)
            }
        };

        let status = if report.passed { "PASS" } else { "FAIL" };
        info!(
            case = %case.name,
            status,
            failures = report.failures().count(),
            "finished test case"
        );
        report
    }

    fn sweep_case(
        &self,
        case: &TestCase,
        case_dir: &Path,
        subcases: &mut Vec<SubCaseReport>,
    ) -> HarnessResult<()> {
        case.parameters.validate()?;
        if !case.has_nested_directory() {
            return Err(HarnessError::input_validation(
                "INPUT.CASE_DIRECTORY",
                format!(
                    "test case directory '{}' is not a folder below the cases root",
                    case.directory
                ),
            ));
        }
        if !case_dir.is_dir() {
            return Err(HarnessError::input_validation(
                "INPUT.CASE_DIRECTORY",
                format!("test case directory '{}' does not exist", case_dir.display()),
            ));
        }

        let discovered = discover_subcases(case_dir)?;
        if discovered.is_empty() {
            return Err(HarnessError::input_validation(
                "INPUT.CONTROL_FILE",
                format!(
                    "no control files match '{}/*.files' in '{}'",
                    CONTROL_DIR,
                    case_dir.display()
                ),
            ));
        }

        // Scratch files are removed when this guard drops, including on `?`.
        let workspace = CaseWorkspace::enter(case_dir, &self.config.cleanup_patterns)?;
        for subcase in &discovered {
            subcases.push(self.run_subcase(&workspace, case, subcase)?);
        }
        Ok(())
    }

    fn run_subcase(
        &self,
        workspace: &CaseWorkspace,
        case: &TestCase,
        subcase: &SubCase,
    ) -> HarnessResult<SubCaseReport> {
        info!(case = %case.name, subcase = %subcase, "running sub-case");
        let run = self.runner.run(workspace.root(), subcase)?;
        if !run.completed {
            warn!(
                case = %case.name,
                subcase = %subcase,
                error_log = %run.error_log,
                "simulator did not reach completion; skipping comparisons"
            );
            return Ok(SubCaseReport {
                name: subcase.name().to_string(),
                run,
                checks: Vec::new(),
            });
        }

        let mut checks = Vec::new();
        for kind in FileKind::ALL {
            if let Some(check) = self.check_kind(workspace.root(), case, subcase, kind)? {
                checks.push(check);
            }
        }

        Ok(SubCaseReport {
            name: subcase.name().to_string(),
            run,
            checks,
        })
    }

    /// `None` when the reference directory holds no file of this kind.
    fn check_kind(
        &self,
        case_dir: &Path,
        case: &TestCase,
        subcase: &SubCase,
        kind: FileKind,
    ) -> HarnessResult<Option<KindCheckReport>> {
        let pattern = kind.glob_for_subcase(subcase);
        let mut reference_files = glob_files(&case_dir.join(REFERENCE_DIR), &pattern)?;
        if reference_files.is_empty() {
            return Ok(None);
        }

        let mut new_files = glob_files(case_dir, &pattern)?;
        if new_files.is_empty() {
            warn!(
                case = %case.name,
                subcase = %subcase,
                %pattern,
                "reference output exists but the simulator produced none; skipping"
            );
            return Ok(Some(KindCheckReport::skipped(
                kind,
                &reference_files,
                SkipReason::NoNewOutput,
            )));
        }

        if kind == FileKind::Output {
            if reference_files.len() > 1 || new_files.len() > 1 {
                warn!(
                    case = %case.name,
                    subcase = %subcase,
                    %pattern,
                    reference = reference_files.len(),
                    new = new_files.len(),
                    "several tabular outputs match; comparing the first of each"
                );
            }
            reference_files.truncate(1);
            new_files.truncate(1);
        }

        let old = load_files(kind, &reference_files)?;
        let new = load_files(kind, &new_files)?;
        let difference = diff(&new, &old)?;
        let check = evaluate(kind, subcase, &difference, &case.parameters);
        info!(
            case = %case.name,
            subcase = %subcase,
            kind = %kind,
            checked = check.checked_coordinates,
            failures = check.failures.len(),
            "compared output"
        );

        Ok(Some(KindCheckReport::checked(
            kind,
            &reference_files,
            &new_files,
            check,
        )))
    }
}

/// Sub-cases of a test case, from `input/control/*.files`. A `fehmn.files`
/// control file means the case has exactly one implicit sub-case.
pub fn discover_subcases(case_dir: &Path) -> Result<Vec<SubCase>, WorkspaceError> {
    let control_files = glob_files(&case_dir.join(CONTROL_DIR), "*.files")?;
    let stems = control_files
        .iter()
        .filter_map(|path| path.file_stem()?.to_str())
        .collect::<Vec<_>>();

    if stems.contains(&SubCase::IMPLICIT_CONTROL_STEM) {
        return Ok(vec![SubCase::implicit()]);
    }
    Ok(stems.into_iter().map(SubCase::named).collect())
}
