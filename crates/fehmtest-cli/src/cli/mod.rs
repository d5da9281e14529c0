mod commands;

use clap::{CommandFactory, Parser};
use fehmtest_core::domain::HarnessError;
use fehmtest_core::harness::SuiteMode;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

pub fn run_from_env() -> i32 {
    init_tracing();
    match run(std::env::args().skip(1)) {
        Ok(code) => code,
        Err(error) => {
            let harness_error = error.as_harness_error();
            eprintln!("{}", harness_error.diagnostic_line());
            if matches!(error, CliError::Usage(_)) {
                eprintln!("{}", Cli::command().render_help());
            }
            harness_error.exit_code()
        }
    }
}

pub fn run<I, S>(args: I) -> Result<i32, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let full_args = std::iter::once("fehmtest".to_string())
        .chain(args.into_iter().map(Into::into))
        .collect::<Vec<_>>();

    match Cli::try_parse_from(&full_args) {
        Ok(cli) => {
            let mode = cli.suite_mode()?;
            commands::run_suite_command(cli, mode)
        }
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{}", err);
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A subscriber may already be installed when embedded in tests.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser)]
#[command(name = "fehmtest", version, about = "FEHM regression test suite")]
#[command(group(clap::ArgGroup::new("mode").args(["admin", "dev", "solo"])))]
struct Cli {
    /// Run the entire test suite
    #[arg(short, long)]
    admin: bool,

    /// Run a reduced, faster portion of the test suite
    #[arg(short, long)]
    dev: bool,

    /// Run a single test case
    #[arg(short, long)]
    solo: bool,

    /// Write a failure log with one line per failed check
    #[arg(short, long)]
    log: bool,

    /// Directory holding one folder per test case
    #[arg(long, default_value = ".")]
    cases_root: PathBuf,

    /// JSON case manifest replacing the built-in catalogue
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Write a JSON report to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Failure log path (implies --log)
    #[arg(long)]
    fail_log: Option<PathBuf>,

    /// Kill a simulator run that takes longer than this
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    timeout_seconds: Option<u64>,

    /// Path to the FEHM executable
    exe: PathBuf,

    /// Single test case to run
    testcase: Option<String>,
}

impl Cli {
    fn suite_mode(&self) -> Result<SuiteMode, CliError> {
        match (&self.testcase, self.solo, self.admin || self.dev) {
            (Some(name), true, _) | (Some(name), false, false) => Ok(SuiteMode::Solo(name.clone())),
            (None, true, _) => Err(CliError::Usage(
                "--solo requires a TESTCASE argument".to_string(),
            )),
            (Some(name), false, true) => Err(CliError::Usage(format!(
                "TESTCASE '{name}' cannot be combined with --admin or --dev"
            ))),
            (None, false, _) if self.dev => Ok(SuiteMode::Developer),
            (None, false, _) => Ok(SuiteMode::All),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Harness(HarnessError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CliError {
    fn as_harness_error(&self) -> HarnessError {
        match self {
            Self::Usage(message) => {
                HarnessError::input_validation("INPUT.CLI_USAGE", message.clone())
            }
            Self::Harness(error) => error.clone(),
            Self::Internal(error) => HarnessError::io_system("IO.CLI", format!("{error:#}")),
        }
    }
}

impl From<HarnessError> for CliError {
    fn from(error: HarnessError) -> Self {
        Self::Harness(error)
    }
}

#[cfg(test)]
mod tests {
    use super::{Cli, CliError};
    use clap::Parser;
    use fehmtest_core::harness::SuiteMode;

    fn mode(args: &[&str]) -> Result<SuiteMode, CliError> {
        let cli = Cli::try_parse_from(std::iter::once("fehmtest").chain(args.iter().copied()))
            .expect("arguments should parse");
        cli.suite_mode()
    }

    #[test]
    fn mode_defaults_to_all_cases() {
        assert_eq!(mode(&["/opt/fehm/xfehm"]).ok(), Some(SuiteMode::All));
        assert_eq!(mode(&["-a", "/opt/fehm/xfehm"]).ok(), Some(SuiteMode::All));
        assert_eq!(mode(&["--dev", "/opt/fehm/xfehm"]).ok(), Some(SuiteMode::Developer));
    }

    #[test]
    fn testcase_alone_implies_solo() {
        assert_eq!(
            mode(&["/opt/fehm/xfehm", "theis"]).ok(),
            Some(SuiteMode::Solo("theis".to_string()))
        );
        assert_eq!(
            mode(&["-s", "/opt/fehm/xfehm", "ramey"]).ok(),
            Some(SuiteMode::Solo("ramey".to_string()))
        );
    }

    #[test]
    fn conflicting_mode_requests_are_usage_errors() {
        assert!(matches!(mode(&["-s", "/opt/fehm/xfehm"]), Err(CliError::Usage(_))));
        assert!(matches!(
            mode(&["-d", "/opt/fehm/xfehm", "theis"]),
            Err(CliError::Usage(_))
        ));
        assert!(Cli::try_parse_from(["fehmtest", "-a", "-d", "/opt/fehm/xfehm"]).is_err());
    }
}
