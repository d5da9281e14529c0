//! In-memory form of simulator output artifacts.
//!
//! Each [`FileKind`] loads into one of three dataset families:
//!
//! - contour snapshots: time -> variable -> values indexed by node
//! - history/tracer series: variable -> node -> values indexed by time
//! - tabular output: component -> node -> variable -> values indexed by record
//!
//! All files matched by a glob are merged, in sorted path order, into one
//! dataset.

mod parser;

use crate::domain::{DatasetFamily, FileKind, HarnessError, NodeId};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("failed to read dataset file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed dataset '{}' at line {line}: {message}", path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("'{}' line {line}: '{token}' is not a valid number", path.display())]
    InvalidNumber {
        path: PathBuf,
        line: usize,
        token: String,
    },
    #[error("contour file '{}' does not declare a snapshot time", path.display())]
    MissingTime { path: PathBuf },
    #[error("contour time {time:?} appears in more than one file (second: '{}')", path.display())]
    DuplicateTime { path: PathBuf, time: f64 },
    #[error(
        "series column {variable}:{node} appears in more than one file (second: '{}')",
        path.display()
    )]
    DuplicateColumn {
        path: PathBuf,
        variable: String,
        node: NodeId,
    },
    #[error("series file '{}' does not share the time axis of the files before it", path.display())]
    TimeAxisMismatch { path: PathBuf },
}

impl From<DatasetError> for HarnessError {
    fn from(error: DatasetError) -> Self {
        let message = error.to_string();
        match error {
            DatasetError::Read { .. } => HarnessError::io_system("IO.DATASET_ACCESS", message),
            DatasetError::Malformed { .. }
            | DatasetError::InvalidNumber { .. }
            | DatasetError::MissingTime { .. }
            | DatasetError::DuplicateTime { .. }
            | DatasetError::DuplicateColumn { .. }
            | DatasetError::TimeAxisMismatch { .. } => {
                HarnessError::input_validation("INPUT.DATASET_FORMAT", message)
            }
        }
    }
}

/// Contour snapshot time usable as an ordered map key. `-0.0` folds onto
/// `0.0`; otherwise equality is exact.
#[derive(Debug, Clone, Copy)]
pub struct TimeKey(f64);

impl TimeKey {
    pub fn new(time: f64) -> Self {
        if time == 0.0 { Self(0.0) } else { Self(time) }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl PartialEq for TimeKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TimeKey {}

impl PartialOrd for TimeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContourSnapshot {
    nodes: Vec<NodeId>,
    variables: BTreeMap<String, Vec<f64>>,
}

impl ContourSnapshot {
    pub fn new(nodes: Vec<NodeId>, variables: BTreeMap<String, Vec<f64>>) -> Self {
        Self { nodes, variables }
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }

    pub fn values(&self, variable: &str) -> Option<&[f64]> {
        self.variables.get(variable).map(Vec::as_slice)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.variables
            .iter()
            .map(|(variable, values)| (variable.as_str(), values.as_slice()))
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContourDataset {
    snapshots: BTreeMap<TimeKey, ContourSnapshot>,
}

impl ContourDataset {
    pub fn insert(&mut self, time: f64, snapshot: ContourSnapshot) -> Option<ContourSnapshot> {
        self.snapshots.insert(TimeKey::new(time), snapshot)
    }

    pub fn times(&self) -> Vec<f64> {
        self.snapshots.keys().map(|time| time.value()).collect()
    }

    pub fn snapshot(&self, time: f64) -> Option<&ContourSnapshot> {
        self.snapshots.get(&TimeKey::new(time))
    }

    pub fn snapshots(&self) -> impl Iterator<Item = (f64, &ContourSnapshot)> {
        self.snapshots
            .iter()
            .map(|(time, snapshot)| (time.value(), snapshot))
    }

    /// Every variable present at any time.
    pub fn variables(&self) -> BTreeSet<&str> {
        self.snapshots
            .values()
            .flat_map(ContourSnapshot::variables)
            .collect()
    }

    pub fn value(&self, variable: &str, time: f64, node: NodeId) -> Option<f64> {
        let snapshot = self.snapshot(time)?;
        let index = snapshot.nodes.iter().position(|candidate| *candidate == node)?;
        snapshot.values(variable)?.get(index).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SeriesDataset {
    times: Vec<f64>,
    variables: BTreeMap<String, BTreeMap<NodeId, Vec<f64>>>,
}

impl SeriesDataset {
    pub fn new(times: Vec<f64>) -> Self {
        Self {
            times,
            variables: BTreeMap::new(),
        }
    }

    pub fn insert(
        &mut self,
        variable: impl Into<String>,
        node: NodeId,
        values: Vec<f64>,
    ) -> Option<Vec<f64>> {
        self.variables
            .entry(variable.into())
            .or_default()
            .insert(node, values)
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }

    /// Every node present for any variable.
    pub fn nodes(&self) -> BTreeSet<NodeId> {
        self.variables
            .values()
            .flat_map(|by_node| by_node.keys().copied())
            .collect()
    }

    pub fn nodes_for(&self, variable: &str) -> Option<&BTreeMap<NodeId, Vec<f64>>> {
        self.variables.get(variable)
    }

    pub fn values(&self, variable: &str, node: NodeId) -> Option<&[f64]> {
        self.variables
            .get(variable)?
            .get(&node)
            .map(Vec::as_slice)
    }

    pub fn value(&self, variable: &str, time: f64, node: NodeId) -> Option<f64> {
        let index = self.times.iter().position(|candidate| *candidate == time)?;
        self.values(variable, node)?.get(index).copied()
    }

    pub(crate) fn columns(&self) -> impl Iterator<Item = (&str, NodeId, &[f64])> {
        self.variables.iter().flat_map(|(variable, by_node)| {
            by_node
                .iter()
                .map(move |(node, values)| (variable.as_str(), *node, values.as_slice()))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TabularDataset {
    components: BTreeMap<String, BTreeMap<NodeId, BTreeMap<String, Vec<f64>>>>,
}

impl TabularDataset {
    pub fn insert(
        &mut self,
        component: impl Into<String>,
        node: NodeId,
        variable: impl Into<String>,
        values: Vec<f64>,
    ) -> Option<Vec<f64>> {
        self.components
            .entry(component.into())
            .or_default()
            .entry(node)
            .or_default()
            .insert(variable.into(), values)
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(String::as_str)
    }

    pub fn has_component(&self, component: &str) -> bool {
        self.components.contains_key(component)
    }

    pub fn nodes(&self) -> BTreeSet<NodeId> {
        self.components
            .values()
            .flat_map(|by_node| by_node.keys().copied())
            .collect()
    }

    pub fn variables(&self) -> BTreeSet<&str> {
        self.components
            .values()
            .flat_map(BTreeMap::values)
            .flat_map(|by_variable| by_variable.keys().map(String::as_str))
            .collect()
    }

    pub fn node(&self, component: &str, node: NodeId) -> Option<&BTreeMap<String, Vec<f64>>> {
        self.components.get(component)?.get(&node)
    }

    pub fn values(&self, component: &str, node: NodeId, variable: &str) -> Option<&[f64]> {
        self.node(component, node)?
            .get(variable)
            .map(Vec::as_slice)
    }

    pub(crate) fn cells(&self) -> impl Iterator<Item = (&str, NodeId, &str, &[f64])> {
        self.components.iter().flat_map(|(component, by_node)| {
            by_node.iter().flat_map(move |(node, by_variable)| {
                by_variable.iter().map(move |(variable, values)| {
                    (
                        component.as_str(),
                        *node,
                        variable.as_str(),
                        values.as_slice(),
                    )
                })
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Dataset {
    Contour(ContourDataset),
    Series(SeriesDataset),
    Tabular(TabularDataset),
}

impl Dataset {
    pub fn family(&self) -> DatasetFamily {
        match self {
            Self::Contour(_) => DatasetFamily::Contour,
            Self::Series(_) => DatasetFamily::Series,
            Self::Tabular(_) => DatasetFamily::Tabular,
        }
    }
}


/// Loads the given files, in order, into one dataset of `kind`. Callers
/// pass the sorted matches of a sub-case glob.
pub fn load_files(kind: FileKind, paths: &[PathBuf]) -> Result<Dataset, DatasetError> {
    debug!(kind = %kind, files = paths.len(), "loading dataset");
    match kind {
        FileKind::ContourAvs | FileKind::ContourCsv => {
            let mut dataset = ContourDataset::default();
            for path in paths {
                let content = read_dataset_text(path)?;
                let (time, snapshot) = if kind == FileKind::ContourAvs {
                    parser::parse_contour_avs(path, &content)?
                } else {
                    parser::parse_contour_csv(path, &content)?
                };
                if dataset.insert(time.value(), snapshot).is_some() {
                    return Err(DatasetError::DuplicateTime {
                        path: path.clone(),
                        time: time.value(),
                    });
                }
            }
            Ok(Dataset::Contour(dataset))
        }
        FileKind::History | FileKind::Tracer => {
            let mut dataset: Option<SeriesDataset> = None;
            for path in paths {
                let content = read_dataset_text(path)?;
                let table = parser::parse_series(path, &content)?;
                let dataset =
                    dataset.get_or_insert_with(|| SeriesDataset::new(table.times.clone()));
                if dataset.times != table.times {
                    return Err(DatasetError::TimeAxisMismatch { path: path.clone() });
                }
                for column in table.columns {
                    let variable = column.variable.clone();
                    if dataset.insert(column.variable, column.node, column.values).is_some() {
                        return Err(DatasetError::DuplicateColumn {
                            path: path.clone(),
                            variable,
                            node: column.node,
                        });
                    }
                }
            }
            Ok(Dataset::Series(dataset.unwrap_or_default()))
        }
        FileKind::Output => {
            let mut dataset = TabularDataset::default();
            for path in paths {
                let content = read_dataset_text(path)?;
                for (component, by_node) in parser::parse_tabular(path, &content)? {
                    for (node, by_variable) in by_node {
                        for (variable, values) in by_variable {
                            dataset
                                .components
                                .entry(component.clone())
                                .or_default()
                                .entry(node)
                                .or_default()
                                .entry(variable)
                                .or_default()
                                .extend(values);
                        }
                    }
                }
            }
            Ok(Dataset::Tabular(dataset))
        }
    }
}

fn read_dataset_text(path: &Path) -> Result<String, DatasetError> {
    let bytes = fs::read(path).map_err(|source| DatasetError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
