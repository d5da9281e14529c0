//! File discovery and scratch-file cleanup inside a test-case directory.

use crate::domain::HarnessError;
use globset::{Glob, GlobMatcher};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Top-level scratch files a simulator run leaves behind in the case root.
pub const DEFAULT_CLEANUP_PATTERNS: [&str; 1] = ["*.*"];

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("invalid glob pattern '{pattern}': {source}")]
    InvalidGlob {
        pattern: String,
        source: globset::Error,
    },
    #[error("failed to list directory '{}': {source}", path.display())]
    ListDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl From<WorkspaceError> for HarnessError {
    fn from(error: WorkspaceError) -> Self {
        let message = error.to_string();
        match error {
            WorkspaceError::InvalidGlob { .. } => {
                HarnessError::input_validation("INPUT.GLOB_PATTERN", message)
            }
            WorkspaceError::ListDirectory { .. } => {
                HarnessError::io_system("IO.CASE_DIRECTORY", message)
            }
        }
    }
}

fn compile(pattern: &str) -> Result<GlobMatcher, WorkspaceError> {
    Glob::new(pattern)
        .map(|glob| glob.compile_matcher())
        .map_err(|source| WorkspaceError::InvalidGlob {
            pattern: pattern.to_string(),
            source,
        })
}

/// Regular files directly inside `directory` whose names match `pattern`,
/// sorted by path. Hidden files are never matched and a missing directory
/// yields no files.
pub fn glob_files(directory: &Path, pattern: &str) -> Result<Vec<PathBuf>, WorkspaceError> {
    let matcher = compile(pattern)?;
    matching_files(directory, std::slice::from_ref(&matcher))
}

fn matching_files(
    directory: &Path,
    matchers: &[GlobMatcher],
) -> Result<Vec<PathBuf>, WorkspaceError> {
    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(source) if source.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(WorkspaceError::ListDirectory {
                path: directory.to_path_buf(),
                source,
            });
        }
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| WorkspaceError::ListDirectory {
            path: directory.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if file_name.starts_with('.') {
            continue;
        }
        if matchers.iter().any(|matcher| matcher.is_match(file_name)) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Scoped view of one test-case directory. Dropping the guard removes every
/// top-level file matching the cleanup patterns, whether the case passed,
/// failed or returned early with an error. Subdirectories are never touched.
#[derive(Debug)]
pub struct CaseWorkspace {
    root: PathBuf,
    cleanup: Vec<GlobMatcher>,
}

impl CaseWorkspace {
    pub fn enter<S: AsRef<str>>(
        root: impl Into<PathBuf>,
        cleanup_patterns: &[S],
    ) -> Result<Self, WorkspaceError> {
        let cleanup = cleanup_patterns
            .iter()
            .map(|pattern| compile(pattern.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        let root = root.into();
        debug!(root = %root.display(), "entering case workspace");
        Ok(Self { root, cleanup })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Removes matching scratch files now and returns how many were deleted.
    pub fn clean(&self) -> usize {
        let files = match matching_files(&self.root, &self.cleanup) {
            Ok(files) => files,
            Err(error) => {
                warn!(root = %self.root.display(), %error, "cleanup could not list case directory");
                return 0;
            }
        };

        let mut removed = 0;
        for file in files {
            match fs::remove_file(&file) {
                Ok(()) => removed += 1,
                Err(error) => {
                    warn!(file = %file.display(), %error, "failed to remove scratch file");
                }
            }
        }
        debug!(root = %self.root.display(), removed, "cleaned case workspace");
        removed
    }
}

impl Drop for CaseWorkspace {
    fn drop(&mut self) {
        self.clean();
    }
}
