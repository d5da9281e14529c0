use super::control::{ControlFile, ControlFileError};
use crate::domain::{HarnessError, SubCase};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Line fragment the simulator writes to its output log on normal termination.
pub const COMPLETION_MARKER: &str = "End Date";

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    pub executable: PathBuf,
    pub timeout: Option<Duration>,
}

impl RunnerConfig {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    pub completed: bool,
    pub error_log: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    pub error_path: PathBuf,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub timed_out: bool,
}

impl RunOutcome {
    /// Failure text shown for an incomplete run.
    pub fn failure_message(&self) -> String {
        let reason = if self.timed_out {
            "Simulator timed out"
        } else {
            "Unsuccessful fehm simulation"
        };
        format!(
            "{reason}\nContents of {}:\n\n{}",
            self.error_path.display(),
            self.error_log
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error(transparent)]
    Control(#[from] ControlFileError),
    #[error("failed to launch simulator '{}': {source}", executable.display())]
    Spawn {
        executable: PathBuf,
        source: std::io::Error,
    },
    #[error("failed while waiting for simulator '{}': {source}", executable.display())]
    Wait {
        executable: PathBuf,
        source: std::io::Error,
    },
}

impl From<RunnerError> for HarnessError {
    fn from(error: RunnerError) -> Self {
        match error {
            RunnerError::Control(source) => source.into(),
            RunnerError::Spawn { .. } | RunnerError::Wait { .. } => {
                HarnessError::io_system("IO.SIMULATOR_EXEC", error.to_string())
            }
        }
    }
}

/// Executes one sub-case of a test case. The orchestrator only sees this
/// seam, so tests can substitute a runner that stages files directly.
pub trait SimulatorRunner {
    fn run(&self, case_dir: &Path, subcase: &SubCase) -> Result<RunOutcome, RunnerError>;
}

/// Runs the real simulator binary as `<executable> <control-file>` inside
/// the test-case directory.
#[derive(Debug, Clone)]
pub struct CaseRunner {
    config: RunnerConfig,
}

impl CaseRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    fn wait(&self, child: &mut Child) -> Result<Option<ExitStatus>, RunnerError> {
        let wait_error = |source| RunnerError::Wait {
            executable: self.config.executable.clone(),
            source,
        };

        let Some(timeout) = self.config.timeout else {
            return child.wait().map(Some).map_err(wait_error);
        };

        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait().map_err(wait_error)? {
                return Ok(Some(status));
            }
            if started.elapsed() >= timeout {
                warn!(
                    executable = %self.config.executable.display(),
                    timeout_seconds = timeout.as_secs_f64(),
                    "simulator exceeded timeout; killing"
                );
                if let Err(error) = child.kill() {
                    warn!(%error, "failed to kill simulator");
                }
                child.wait().map_err(wait_error)?;
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl SimulatorRunner for CaseRunner {
    fn run(&self, case_dir: &Path, subcase: &SubCase) -> Result<RunOutcome, RunnerError> {
        let control_relative = subcase.control_file();
        let control = ControlFile::read(&case_dir.join(&control_relative))?;
        let resolved = control.resolve(case_dir);

        info!(
            case_dir = %case_dir.display(),
            subcase = %subcase,
            "running simulator"
        );
        let mut child = Command::new(&self.config.executable)
            .arg(&control_relative)
            .current_dir(case_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                executable: self.config.executable.clone(),
                source,
            })?;

        let status = self.wait(&mut child)?;
        let timed_out = status.is_none();
        if let Some(status) = status {
            debug!(subcase = %subcase, %status, "simulator exited");
        }

        let completed = !timed_out
            && resolved
                .output_path
                .as_deref()
                .is_some_and(output_log_completed);
        let error_log = read_error_log(&resolved.error_path);

        Ok(RunOutcome {
            completed,
            error_log,
            output_path: resolved.output_path,
            error_path: resolved.error_path,
            timed_out,
        })
    }
}

/// Scans the output log from its last line backwards for the completion
/// marker. A missing or unreadable log counts as incomplete.
pub fn output_log_completed(path: &Path) -> bool {
    match fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes)
            .lines()
            .rev()
            .any(|line| line.contains(COMPLETION_MARKER)),
        Err(error) => {
            debug!(path = %path.display(), %error, "output log unreadable");
            false
        }
    }
}

/// Verbatim error-log contents, or an empty string when there is none.
pub fn read_error_log(path: &Path) -> String {
    fs::read(path)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}
