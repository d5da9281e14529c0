use super::comparison::KindCheck;
use super::runner::RunOutcome;
use crate::domain::{FailureRecord, FileKind, HarnessError};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const DEFAULT_FAIL_LOG: &str = "fail_log.txt";

#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub generated_at_unix_seconds: u64,
    pub passed: bool,
    pub case_count: usize,
    pub passed_case_count: usize,
    pub failed_case_count: usize,
    pub failure_count: usize,
    pub cases: Vec<CaseReport>,
}

impl SuiteReport {
    pub fn from_cases(cases: Vec<CaseReport>) -> Self {
        let case_count = cases.len();
        let passed_case_count = cases.iter().filter(|case| case.passed).count();
        let failure_count = cases.iter().map(|case| case.failures().count()).sum();
        Self {
            generated_at_unix_seconds: current_unix_timestamp_seconds(),
            passed: passed_case_count == case_count,
            case_count,
            passed_case_count,
            failed_case_count: case_count.saturating_sub(passed_case_count),
            failure_count,
            cases,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &FailureRecord> {
        self.cases.iter().flat_map(CaseReport::failures)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
    pub name: String,
    pub directory: String,
    pub passed: bool,
    /// Set when the case stopped on an unrecoverable error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub subcases: Vec<SubCaseReport>,
}

impl CaseReport {
    pub fn new(name: impl Into<String>, directory: &Path, subcases: Vec<SubCaseReport>) -> Self {
        let passed = subcases.iter().all(SubCaseReport::passed);
        Self {
            name: name.into(),
            directory: normalize_path(directory),
            passed,
            error: None,
            subcases,
        }
    }

    pub fn errored(
        name: impl Into<String>,
        directory: &Path,
        subcases: Vec<SubCaseReport>,
        error: &HarnessError,
    ) -> Self {
        Self {
            error: Some(error.to_string()),
            passed: false,
            ..Self::new(name, directory, subcases)
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &FailureRecord> {
        self.subcases
            .iter()
            .flat_map(|subcase| subcase.checks.iter())
            .flat_map(|check| check.failures.iter())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubCaseReport {
    pub name: String,
    pub run: RunOutcome,
    pub checks: Vec<KindCheckReport>,
}

impl SubCaseReport {
    pub fn passed(&self) -> bool {
        self.run.completed && self.checks.iter().all(KindCheckReport::passed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Checked,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoNewOutput,
}

#[derive(Debug, Clone, Serialize)]
pub struct KindCheckReport {
    pub file_kind: FileKind,
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    pub reference_files: Vec<String>,
    pub new_files: Vec<String>,
    pub checked_coordinates: usize,
    pub failures: Vec<FailureRecord>,
}

impl KindCheckReport {
    pub fn checked(
        file_kind: FileKind,
        reference_files: &[PathBuf],
        new_files: &[PathBuf],
        check: KindCheck,
    ) -> Self {
        Self {
            file_kind,
            status: CheckStatus::Checked,
            skip_reason: None,
            reference_files: reference_files.iter().map(|path| normalize_path(path)).collect(),
            new_files: new_files.iter().map(|path| normalize_path(path)).collect(),
            checked_coordinates: check.checked_coordinates,
            failures: check.failures,
        }
    }

    pub fn skipped(file_kind: FileKind, reference_files: &[PathBuf], reason: SkipReason) -> Self {
        Self {
            file_kind,
            status: CheckStatus::Skipped,
            skip_reason: Some(reason),
            reference_files: reference_files.iter().map(|path| normalize_path(path)).collect(),
            new_files: Vec::new(),
            checked_coordinates: 0,
            failures: Vec::new(),
        }
    }

    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to create report directory '{}': {source}", path.display())]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize report '{}': {source}", path.display())]
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl From<ReportError> for HarnessError {
    fn from(error: ReportError) -> Self {
        HarnessError::io_system("IO.REPORT_WRITE", error.to_string())
    }
}

pub fn render_human_summary(report: &SuiteReport) -> String {
    let mut lines = Vec::new();
    let status = if report.passed { "PASS" } else { "FAIL" };
    lines.push(format!("Suite status: {}", status));
    lines.push(format!(
        "Cases: {} total ({} passed, {} failed)",
        report.case_count, report.passed_case_count, report.failed_case_count
    ));

    for case in &report.cases {
        let case_status = if case.passed { "PASS" } else { "FAIL" };
        let checked = case
            .subcases
            .iter()
            .flat_map(|subcase| subcase.checks.iter())
            .filter(|check| check.status == CheckStatus::Checked)
            .count();
        lines.push(format!(
            "Case {}: {} ({} sub-cases, {} file checks, {} failures)",
            case.name,
            case_status,
            case.subcases.len(),
            checked,
            case.failures().count()
        ));

        if let Some(error) = &case.error {
            lines.push(format!("  error: {}", error));
        }
        for subcase in &case.subcases {
            if !subcase.run.completed {
                lines.push(format!(
                    "  sub-case {}: {}",
                    display_subcase(&subcase.name),
                    subcase.run.failure_message().trim_end()
                ));
            }
            for check in &subcase.checks {
                if check.skip_reason == Some(SkipReason::NoNewOutput) {
                    lines.push(format!(
                        "  sub-case {}: skipped {} (no new output)",
                        display_subcase(&subcase.name),
                        check.file_kind
                    ));
                }
                for failure in &check.failures {
                    lines.push(format!("  {}", failure.message()));
                }
            }
        }
    }

    lines.join("\n")
}

fn display_subcase(name: &str) -> &str {
    if name.is_empty() { "<default>" } else { name }
}

/// Writes one line per failed coordinate check. Returns the number of lines.
pub fn write_fail_log(path: &Path, report: &SuiteReport) -> Result<usize, ReportError> {
    let lines = report
        .failures()
        .map(FailureRecord::fail_log_line)
        .collect::<Vec<_>>();
    let mut content = lines.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    ensure_parent_dir(path)?;
    fs::write(path, content).map_err(|source| ReportError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(lines.len())
}

pub fn write_report_file(path: &Path, report: &SuiteReport) -> Result<(), ReportError> {
    ensure_parent_dir(path)?;
    let report_json =
        serde_json::to_string_pretty(report).map_err(|source| ReportError::Serialize {
            path: path.to_path_buf(),
            source,
        })?;
    fs::write(path, report_json).map_err(|source| ReportError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn ensure_parent_dir(path: &Path) -> Result<(), ReportError> {
    if let Some(parent_dir) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent_dir).map_err(|source| ReportError::CreateDirectory {
            path: parent_dir.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

fn current_unix_timestamp_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
