//! Simulator control (`.files`) parsing.
//!
//! Two layouts are accepted. The keyed layout has `key: value` lines where
//! `outp` names the output log and `error` names the error log. The legacy
//! positional layout has no colon on its first line and carries the output
//! log path on line 4.

use crate::domain::HarnessError;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_ERROR_LOG: &str = "fehmn.err";

const OUTPUT_KEY: &str = "outp";
const ERROR_KEY: &str = "error";
const LEGACY_OUTPUT_LINE: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum ControlFileError {
    #[error("failed to read control file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("control file '{}' is empty", path.display())]
    Empty { path: PathBuf },
    #[error("legacy control file '{}' has no output path on line 4", path.display())]
    MissingLegacyOutputLine { path: PathBuf },
}

impl From<ControlFileError> for HarnessError {
    fn from(error: ControlFileError) -> Self {
        let message = error.to_string();
        match error {
            ControlFileError::Read { .. } => HarnessError::io_system("IO.CONTROL_FILE", message),
            ControlFileError::Empty { .. } | ControlFileError::MissingLegacyOutputLine { .. } => {
                HarnessError::input_validation("INPUT.CONTROL_FILE", message)
            }
        }
    }
}

/// Paths a control file declares, as written (relative paths are relative to
/// the test-case directory).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFile {
    pub output_path: Option<PathBuf>,
    pub error_path: PathBuf,
}

impl ControlFile {
    pub fn read(path: &Path) -> Result<Self, ControlFileError> {
        let bytes = fs::read(path).map_err(|source| ControlFileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &String::from_utf8_lossy(&bytes))
    }

    pub fn parse(path: &Path, content: &str) -> Result<Self, ControlFileError> {
        let lines: Vec<&str> = content.lines().collect();
        let Some(first) = lines.first() else {
            return Err(ControlFileError::Empty {
                path: path.to_path_buf(),
            });
        };

        let mut output_path = None;
        let mut error_path = None;
        for line in &lines {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            let key = key.trim();
            if key.eq_ignore_ascii_case(OUTPUT_KEY) {
                output_path = Some(PathBuf::from(value));
            } else if key.eq_ignore_ascii_case(ERROR_KEY) {
                error_path = Some(PathBuf::from(value));
            }
        }

        if output_path.is_none() && !first.contains(':') {
            let legacy = lines
                .get(LEGACY_OUTPUT_LINE)
                .map(|line| line.trim())
                .filter(|line| !line.is_empty())
                .ok_or_else(|| ControlFileError::MissingLegacyOutputLine {
                    path: path.to_path_buf(),
                })?;
            output_path = Some(PathBuf::from(legacy));
        }

        Ok(Self {
            output_path,
            error_path: error_path.unwrap_or_else(|| PathBuf::from(DEFAULT_ERROR_LOG)),
        })
    }

    pub fn resolve(&self, case_dir: &Path) -> ResolvedControlFile {
        ResolvedControlFile {
            output_path: self.output_path.as_ref().map(|path| case_dir.join(path)),
            error_path: case_dir.join(&self.error_path),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedControlFile {
    pub output_path: Option<PathBuf>,
    pub error_path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::{ControlFile, ControlFileError};
    use std::path::{Path, PathBuf};

    #[test]
    fn keyed_layout_reads_output_and_error_logs() {
        let content = "root: theis\ninput: input/theis.dat\nOUTP: theis.out\nerror: theis.err\ncheck: theis.chk\n";
        let control = ControlFile::parse(Path::new("theis.files"), content).expect("should parse");
        assert_eq!(control.output_path, Some(PathBuf::from("theis.out")));
        assert_eq!(control.error_path, PathBuf::from("theis.err"));
    }

    #[test]
    fn keyed_layout_without_error_defaults_error_log() {
        let content = "outp: run1.out\n";
        let control = ControlFile::parse(Path::new("run1.files"), content).expect("should parse");
        assert_eq!(control.error_path, PathBuf::from("fehmn.err"));
    }

    #[test]
    fn keyed_layout_without_outp_has_no_output_log() {
        let content = "root: head\ninput: input/head.dat\n";
        let control = ControlFile::parse(Path::new("head.files"), content).expect("should parse");
        assert_eq!(control.output_path, None);
    }

    #[test]
    fn legacy_layout_uses_fourth_line() {
        let content = "input/ramey.dat\ninput/ramey.grid\n\nramey.out\nramey.avs\n";
        let control = ControlFile::parse(Path::new("fehmn.files"), content).expect("should parse");
        assert_eq!(control.output_path, Some(PathBuf::from("ramey.out")));
        assert_eq!(control.error_path, PathBuf::from("fehmn.err"));

        let resolved = control.resolve(Path::new("/cases/ramey"));
        assert_eq!(
            resolved.output_path,
            Some(PathBuf::from("/cases/ramey/ramey.out"))
        );
        assert_eq!(resolved.error_path, PathBuf::from("/cases/ramey/fehmn.err"));
    }

    #[test]
    fn short_legacy_layout_is_rejected() {
        let error = ControlFile::parse(Path::new("fehmn.files"), "a.dat\nb.dat\n")
            .expect_err("line 4 is missing");
        assert!(matches!(error, ControlFileError::MissingLegacyOutputLine { .. }));
    }

    #[test]
    fn empty_control_file_is_rejected() {
        let error = ControlFile::parse(Path::new("fehmn.files"), "").expect_err("empty");
        assert!(matches!(error, ControlFileError::Empty { .. }));
    }
}
