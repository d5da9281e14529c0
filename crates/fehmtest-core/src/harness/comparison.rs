//! Per-family threshold checks over a difference dataset.
//!
//! Every violated coordinate becomes a [`FailureRecord`]; evaluation never
//! stops at the first violation.

use super::differencer::DifferenceDataset;
use crate::dataset::{ContourDataset, Dataset, SeriesDataset, TabularDataset};
use crate::domain::{
    ComparisonParameters, FailureReason, FailureRecord, FileKind, NodeId, SubCase, format_value,
};
use crate::numerics::{AggregateError, reduce, within_threshold};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KindCheck {
    pub checked_coordinates: usize,
    pub failures: Vec<FailureRecord>,
}

impl KindCheck {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

struct Evaluation<'a> {
    kind: FileKind,
    subcase: &'a SubCase,
    parameters: &'a ComparisonParameters,
    check: KindCheck,
}

impl Evaluation<'_> {
    fn failure(&self, reason: FailureReason) -> FailureRecord {
        FailureRecord::new(self.subcase, self.kind, reason, self.parameters.maxerr())
    }

    fn missing(&mut self, record: FailureRecord) {
        debug!(kind = %self.kind, location = %record.location(), "requested coordinate missing");
        self.check.failures.push(record);
    }

    /// Reduces one difference array and records a failure when it does not
    /// stay strictly below `maxerr`.
    fn measure(&mut self, values: &[f64], locate: impl Fn(FailureRecord) -> FailureRecord) {
        self.check.checked_coordinates += 1;
        let maxerr = self.parameters.maxerr();
        match reduce(values, self.parameters.test_measure()) {
            Ok(measured) => {
                debug!(
                    kind = %self.kind,
                    location = %locate(self.failure(FailureReason::ThresholdExceeded)).location(),
                    measured = %format_value(measured),
                    maxerr,
                    "checked coordinate"
                );
                if !within_threshold(measured, maxerr) {
                    let record = locate(self.failure(FailureReason::ThresholdExceeded));
                    self.check.failures.push(record.with_measured(measured));
                }
            }
            Err(AggregateError::Empty { .. }) => {
                let record = locate(self.failure(FailureReason::EmptyDifference));
                self.check.failures.push(record);
            }
        }
    }
}

/// Checks every resolved coordinate of `difference` against the case's
/// threshold. Explicit parameter lists select coordinates; empty lists mean
/// every key the difference dataset holds.
pub fn evaluate(
    kind: FileKind,
    subcase: &SubCase,
    difference: &DifferenceDataset,
    parameters: &ComparisonParameters,
) -> KindCheck {
    let mut evaluation = Evaluation {
        kind,
        subcase,
        parameters,
        check: KindCheck::default(),
    };

    match &**difference {
        Dataset::Contour(contour) => evaluate_contour(&mut evaluation, contour),
        Dataset::Series(series) => evaluate_series(&mut evaluation, series),
        Dataset::Tabular(tabular) => evaluate_tabular(&mut evaluation, tabular),
    }

    if evaluation.check.checked_coordinates == 0 && evaluation.check.failures.is_empty() {
        let record = evaluation.failure(FailureReason::NothingCompared);
        evaluation.check.failures.push(record);
    }
    evaluation.check
}

fn evaluate_contour(evaluation: &mut Evaluation<'_>, contour: &ContourDataset) {
    let parameters = evaluation.parameters;
    let times = if parameters.times().is_empty() {
        contour.times()
    } else {
        parameters.times().to_vec()
    };

    let mut unmatched: BTreeSet<&str> =
        parameters.variables().iter().map(String::as_str).collect();
    let mut any_snapshot = false;
    for time in times {
        let Some(snapshot) = contour.snapshot(time) else {
            let record = evaluation.failure(FailureReason::MissingCoordinate).with_time(time);
            evaluation.missing(record);
            continue;
        };
        any_snapshot = true;

        let variables: Vec<&str> = if parameters.variables().is_empty() {
            snapshot.variables().collect()
        } else {
            parameters
                .variables()
                .iter()
                .map(String::as_str)
                .filter(|variable| snapshot.values(variable).is_some())
                .collect()
        };

        for variable in variables {
            let Some(values) = snapshot.values(variable) else {
                continue;
            };
            unmatched.remove(variable);
            evaluation.measure(values, |record| record.with_variable(variable).with_time(time));
        }
    }

    // A requested variable absent from every compared snapshot is reported
    // once, without a time.
    if any_snapshot {
        for variable in unmatched {
            let record = evaluation
                .failure(FailureReason::MissingCoordinate)
                .with_variable(variable);
            evaluation.missing(record);
        }
    }
}

fn evaluate_series(evaluation: &mut Evaluation<'_>, series: &SeriesDataset) {
    let parameters = evaluation.parameters;
    let variables: Vec<&str> = if parameters.variables().is_empty() {
        series.variables().collect()
    } else {
        parameters.variables().iter().map(String::as_str).collect()
    };

    for variable in variables {
        let Some(by_node) = series.nodes_for(variable) else {
            let record = evaluation
                .failure(FailureReason::MissingCoordinate)
                .with_variable(variable);
            evaluation.missing(record);
            continue;
        };

        let nodes: Vec<NodeId> = if parameters.nodes().is_empty() {
            by_node.keys().copied().collect()
        } else {
            parameters
                .nodes()
                .iter()
                .copied()
                .filter(|node| by_node.contains_key(node))
                .collect()
        };

        for node in nodes {
            let Some(values) = by_node.get(&node) else {
                continue;
            };
            evaluation.measure(values, |record| record.with_variable(variable).with_node(node));
        }
    }
}

fn evaluate_tabular(evaluation: &mut Evaluation<'_>, tabular: &TabularDataset) {
    let parameters = evaluation.parameters;
    let components: Vec<&str> = if parameters.components().is_empty() {
        tabular.components().collect()
    } else {
        parameters.components().iter().map(String::as_str).collect()
    };

    for component in components {
        if !tabular.has_component(component) {
            let record = evaluation
                .failure(FailureReason::MissingCoordinate)
                .with_component(component);
            evaluation.missing(record);
            continue;
        }

        let nodes: Vec<NodeId> = if parameters.nodes().is_empty() {
            tabular
                .nodes()
                .into_iter()
                .filter(|node| tabular.node(component, *node).is_some())
                .collect()
        } else {
            parameters.nodes().to_vec()
        };

        for node in nodes {
            let Some(by_variable) = tabular.node(component, node) else {
                let record = evaluation
                    .failure(FailureReason::MissingCoordinate)
                    .with_component(component)
                    .with_node(node);
                evaluation.missing(record);
                continue;
            };

            let variables: Vec<&str> = if parameters.variables().is_empty() {
                by_variable.keys().map(String::as_str).collect()
            } else {
                parameters.variables().iter().map(String::as_str).collect()
            };

            for variable in variables {
                let Some(values) = by_variable.get(variable) else {
                    let record = evaluation
                        .failure(FailureReason::MissingCoordinate)
                        .with_component(component)
                        .with_node(node)
                        .with_variable(variable);
                    evaluation.missing(record);
                    continue;
                };
                evaluation.measure(values, |record| {
                    record
                        .with_component(component)
                        .with_node(node)
                        .with_variable(variable)
                });
            }
        }
    }
}
