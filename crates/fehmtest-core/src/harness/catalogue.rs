//! The library of named regression cases and suite selection.

use crate::domain::{ComparisonParameters, HarnessError, TestCase, TestMeasure};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const DEVELOPER_CASES: [&str; 5] = ["theis", "head", "boun", "saltvcon", "salt_perm_poro"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuiteMode {
    All,
    Developer,
    Solo(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogueError {
    #[error("failed to read case manifest '{}': {source}", path.display())]
    ReadManifest {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse case manifest '{}': {source}", path.display())]
    ParseManifest {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("case manifest '{}' is invalid: {message}", path.display())]
    InvalidManifest { path: PathBuf, message: String },
    #[error("unknown test case '{name}'")]
    UnknownCase { name: String },
}

impl From<CatalogueError> for HarnessError {
    fn from(error: CatalogueError) -> Self {
        let message = error.to_string();
        match error {
            CatalogueError::ReadManifest { .. } => {
                HarnessError::io_system("IO.CASE_MANIFEST", message)
            }
            CatalogueError::ParseManifest { .. } | CatalogueError::InvalidManifest { .. } => {
                HarnessError::input_validation("INPUT.CASE_MANIFEST", message)
            }
            CatalogueError::UnknownCase { .. } => {
                HarnessError::input_validation("INPUT.UNKNOWN_CASE", message)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Catalogue {
    cases: Vec<TestCase>,
    developer: Vec<String>,
}

impl Catalogue {
    pub fn builtin() -> Self {
        let cases = vec![
            TestCase::new(
                "saltvcon",
                "Salt variable thermal conductivity macro",
                ComparisonParameters::default()
                    .with_components(["water"])
                    .with_variables(["Kx"]),
            ),
            TestCase::new(
                "dissolution",
                "One-dimensional calcite dissolution transport",
                ComparisonParameters::default().with_variables(["Np[aq] (Moles/kg H20)"]),
            ),
            TestCase::new(
                "salt_perm_poro",
                "Compacted salt porosity-permeability function",
                ComparisonParameters::default().with_variables(["n", "perm_x"]),
            ),
            TestCase::new(
                "avdonin",
                "Radial heat and mass transfer",
                ComparisonParameters::default()
                    .with_times([2.0])
                    .with_variables(["T"]),
            ),
            TestCase::new(
                "boun",
                "Boundary conditions",
                ComparisonParameters::default()
                    .with_times([2.0])
                    .with_variables(["P", "Hydraulic Head (m)"]),
            )
            .in_directory("boun_test"),
            TestCase::new(
                "cden",
                "Concentration dependent brine density",
                ComparisonParameters::default().with_variables(["density"]),
            )
            .in_directory("cden_test"),
            TestCase::new(
                "doe",
                "DOE code comparison problem 5, case A",
                ComparisonParameters::default()
                    .with_times([3.0])
                    .with_variables(["P", "T", "saturation"]),
            ),
            TestCase::new(
                "head",
                "Head pressure",
                ComparisonParameters::default()
                    .with_times([2.0])
                    .with_variables(["P"]),
            ),
            TestCase::new(
                "ramey",
                "Temperature in a wellbore",
                ComparisonParameters::default()
                    .with_times([2.0])
                    .with_variables(["T"]),
            ),
            TestCase::new(
                "theis",
                "Pressure transient analysis",
                ComparisonParameters::default()
                    .with_times([2.0])
                    .with_variables(["P"]),
            ),
            TestCase::new(
                "dryout",
                "Dry-out of a partially saturated medium",
                ComparisonParameters::default().with_variables(["saturation"]),
            ),
            TestCase::new(
                "multi_solute",
                "Multi-solute transport with chemical reaction",
                ComparisonParameters::default(),
            ),
            TestCase::new(
                "sorption",
                "One-dimensional reactive solute transport",
                ComparisonParameters::default(),
            ),
            TestCase::new(
                "baro_vel",
                "Pore-scale velocity in a homogeneous medium",
                ComparisonParameters::default()
                    .with_test_measure(TestMeasure::RmsDifference)
                    .with_maxerr(0.01)
                    .with_times([3.0, 4.0, 5.0, 6.0]),
            ),
        ];

        Self {
            cases,
            developer: DEVELOPER_CASES.iter().map(|name| name.to_string()).collect(),
        }
    }

    pub fn from_manifest_path(path: &Path) -> Result<Self, CatalogueError> {
        let content = fs::read_to_string(path).map_err(|source| CatalogueError::ReadManifest {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_manifest_json(path, &content)
    }

    pub fn from_manifest_json(path: &Path, content: &str) -> Result<Self, CatalogueError> {
        let manifest: RawManifest =
            serde_json::from_str(content).map_err(|source| CatalogueError::ParseManifest {
                path: path.to_path_buf(),
                source,
            })?;

        let invalid = |message: String| CatalogueError::InvalidManifest {
            path: path.to_path_buf(),
            message,
        };

        let mut cases: Vec<TestCase> = Vec::with_capacity(manifest.cases.len());
        for raw in manifest.cases {
            let name = raw.name.trim().to_string();
            if name.is_empty() {
                return Err(invalid("case name must not be empty".to_string()));
            }
            if cases.iter().any(|case| case.name == name) {
                return Err(invalid(format!("case '{name}' is listed more than once")));
            }
            raw.parameters
                .validate()
                .map_err(|error| invalid(format!("case '{name}': {}", error.message())))?;

            let mut case = TestCase::new(name, raw.description, raw.parameters);
            if let Some(directory) = raw.directory {
                case = case.in_directory(directory);
            }
            if !case.has_nested_directory() {
                return Err(invalid(format!(
                    "case '{}' directory '{}' must be a relative folder below the cases root",
                    case.name, case.directory
                )));
            }
            cases.push(case);
        }

        if let Some(unknown) = manifest
            .developer
            .iter()
            .find(|name| !cases.iter().any(|case| &case.name == *name))
        {
            return Err(invalid(format!(
                "developer subset names unknown case '{unknown}'"
            )));
        }

        Ok(Self {
            cases,
            developer: manifest.developer,
        })
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    pub fn find(&self, requested: &str) -> Option<&TestCase> {
        self.cases.iter().find(|case| case.answers_to(requested))
    }

    /// Cases to run, in catalogue order.
    pub fn select(&self, mode: &SuiteMode) -> Result<Vec<&TestCase>, CatalogueError> {
        match mode {
            SuiteMode::All => Ok(self.cases.iter().collect()),
            SuiteMode::Developer => Ok(self
                .cases
                .iter()
                .filter(|case| self.developer.contains(&case.name))
                .collect()),
            SuiteMode::Solo(name) => {
                self.find(name)
                    .map(|case| vec![case])
                    .ok_or_else(|| CatalogueError::UnknownCase {
                        name: name.to_string(),
                    })
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    cases: Vec<RawCase>,
    #[serde(default)]
    developer: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawCase {
    name: String,
    #[serde(default)]
    directory: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    parameters: ComparisonParameters,
}
