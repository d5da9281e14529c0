//! Signed elementwise differences between a fresh and a reference dataset.

use crate::dataset::{ContourDataset, ContourSnapshot, Dataset, SeriesDataset, TabularDataset};
use crate::domain::{DatasetFamily, HarnessError, NodeId};
use std::collections::BTreeMap;
use std::ops::Deref;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DifferenceError {
    #[error("cannot difference a {new:?} dataset against a {old:?} dataset")]
    KindMismatch {
        new: DatasetFamily,
        old: DatasetFamily,
    },
    #[error("shape mismatch at {key}: new has {new_len} values, reference has {old_len}")]
    ShapeMismatch {
        key: String,
        new_len: usize,
        old_len: usize,
    },
}

impl From<DifferenceError> for HarnessError {
    fn from(error: DifferenceError) -> Self {
        HarnessError::comparison("RUN.DIFFERENCE", error.to_string())
    }
}

/// `new - old` over the keys both datasets share. Same family and shape as
/// the inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct DifferenceDataset(Dataset);

impl Deref for DifferenceDataset {
    type Target = Dataset;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

pub fn diff(new: &Dataset, old: &Dataset) -> Result<DifferenceDataset, DifferenceError> {
    let difference = match (new, old) {
        (Dataset::Contour(new), Dataset::Contour(old)) => Dataset::Contour(diff_contour(new, old)?),
        (Dataset::Series(new), Dataset::Series(old)) => Dataset::Series(diff_series(new, old)?),
        (Dataset::Tabular(new), Dataset::Tabular(old)) => {
            Dataset::Tabular(diff_tabular(new, old)?)
        }
        _ => {
            return Err(DifferenceError::KindMismatch {
                new: new.family(),
                old: old.family(),
            });
        }
    };
    Ok(DifferenceDataset(difference))
}

fn diff_contour(
    new: &ContourDataset,
    old: &ContourDataset,
) -> Result<ContourDataset, DifferenceError> {
    let mut difference = ContourDataset::default();
    for (time, new_snapshot) in new.snapshots() {
        let Some(old_snapshot) = old.snapshot(time) else {
            continue;
        };
        if new_snapshot.nodes() != old_snapshot.nodes() {
            return Err(DifferenceError::ShapeMismatch {
                key: format!("time {time:?} node list"),
                new_len: new_snapshot.nodes().len(),
                old_len: old_snapshot.nodes().len(),
            });
        }

        let mut variables = BTreeMap::new();
        for (variable, new_values) in new_snapshot.entries() {
            let Some(old_values) = old_snapshot.values(variable) else {
                continue;
            };
            let key = || format!("time {time:?} variable {variable}");
            variables.insert(variable.to_string(), subtract(new_values, old_values, key)?);
        }
        difference.insert(
            time,
            ContourSnapshot::new(new_snapshot.nodes().to_vec(), variables),
        );
    }
    Ok(difference)
}

fn diff_series(new: &SeriesDataset, old: &SeriesDataset) -> Result<SeriesDataset, DifferenceError> {
    let mut difference = SeriesDataset::new(new.times().to_vec());
    for (variable, node, new_values) in new.columns() {
        let Some(old_values) = old.values(variable, node) else {
            continue;
        };
        let key = || format!("variable {variable} node {node}");
        difference.insert(variable, node, subtract(new_values, old_values, key)?);
    }
    Ok(difference)
}

fn diff_tabular(
    new: &TabularDataset,
    old: &TabularDataset,
) -> Result<TabularDataset, DifferenceError> {
    let mut difference = TabularDataset::default();
    for (component, node, variable, new_values) in new.cells() {
        let Some(old_values) = old.values(component, node, variable) else {
            continue;
        };
        let key = || tabular_key(component, node, variable);
        difference.insert(component, node, variable, subtract(new_values, old_values, key)?);
    }
    Ok(difference)
}

fn tabular_key(component: &str, node: NodeId, variable: &str) -> String {
    format!("component {component} node {node} variable {variable}")
}

fn subtract(
    new: &[f64],
    old: &[f64],
    key: impl FnOnce() -> String,
) -> Result<Vec<f64>, DifferenceError> {
    if new.len() != old.len() {
        return Err(DifferenceError::ShapeMismatch {
            key: key(),
            new_len: new.len(),
            old_len: old.len(),
        });
    }
    Ok(new.iter().zip(old).map(|(new, old)| new - old).collect())
}
