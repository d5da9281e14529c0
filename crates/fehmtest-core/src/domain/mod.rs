pub mod errors;

pub use errors::{HarnessError, HarnessErrorCategory, HarnessResult};

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::path::{Component, Path, PathBuf};

pub type NodeId = u64;

pub const DEFAULT_MAXERR: f64 = 1.0e-4;

/// Output artifact kinds, in the order a sub-case checks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    ContourAvs,
    ContourCsv,
    History,
    Output,
    Tracer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetFamily {
    Contour,
    Series,
    Tabular,
}

impl FileKind {
    pub const ALL: [FileKind; 5] = [
        FileKind::ContourAvs,
        FileKind::ContourCsv,
        FileKind::History,
        FileKind::Output,
        FileKind::Tracer,
    ];

    pub const fn extension(self) -> &'static str {
        match self {
            Self::ContourAvs => ".avs",
            Self::ContourCsv => ".csv",
            Self::History => ".his",
            Self::Output => ".out",
            Self::Tracer => ".trc",
        }
    }

    pub const fn family(self) -> DatasetFamily {
        match self {
            Self::ContourAvs | Self::ContourCsv => DatasetFamily::Contour,
            Self::History | Self::Tracer => DatasetFamily::Series,
            Self::Output => DatasetFamily::Tabular,
        }
    }

    /// Glob matching this kind's files for one sub-case, e.g. `*run1.his`.
    pub fn glob_for_subcase(self, subcase: &SubCase) -> String {
        format!("*{}{}", subcase.name(), self.extension())
    }

    /// Label used in failure logs, the wildcard form of the extension.
    pub fn filetype_label(self) -> String {
        format!("*{}", self.extension())
    }
}

impl Display for FileKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SubCase {
    name: String,
}

impl SubCase {
    pub const IMPLICIT_CONTROL_STEM: &'static str = "fehmn";

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn implicit() -> Self {
        Self {
            name: String::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_implicit(&self) -> bool {
        self.name.is_empty()
    }

    /// Control file path relative to the test-case directory.
    pub fn control_file(&self) -> PathBuf {
        let stem = if self.is_implicit() {
            Self::IMPLICIT_CONTROL_STEM
        } else {
            self.name.as_str()
        };
        Path::new("input")
            .join("control")
            .join(format!("{stem}.files"))
    }
}

impl Display for SubCase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_implicit() {
            f.write_str("<default>")
        } else {
            f.write_str(&self.name)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestMeasure {
    #[default]
    #[serde(alias = "max")]
    MaxDifference,
    #[serde(alias = "rms")]
    RmsDifference,
}

impl TestMeasure {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MaxDifference => "max_difference",
            Self::RmsDifference => "rms_difference",
        }
    }
}

impl Display for TestMeasure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-case comparison options. Empty coordinate lists mean "everything the
/// difference dataset contains".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonParameters {
    #[serde(default)]
    variables: Vec<String>,
    #[serde(default)]
    times: Vec<f64>,
    #[serde(default)]
    nodes: Vec<NodeId>,
    #[serde(default)]
    components: Vec<String>,
    #[serde(default = "default_maxerr")]
    maxerr: f64,
    #[serde(rename = "testMeasure", alias = "test_measure", default)]
    test_measure: TestMeasure,
}

impl Default for ComparisonParameters {
    fn default() -> Self {
        Self {
            variables: Vec::new(),
            times: Vec::new(),
            nodes: Vec::new(),
            components: Vec::new(),
            maxerr: DEFAULT_MAXERR,
            test_measure: TestMeasure::MaxDifference,
        }
    }
}

fn default_maxerr() -> f64 {
    DEFAULT_MAXERR
}

impl ComparisonParameters {
    pub fn with_variables<I, S>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variables = variables.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_times(mut self, times: impl IntoIterator<Item = f64>) -> Self {
        self.times = times.into_iter().collect();
        self
    }

    pub fn with_nodes(mut self, nodes: impl IntoIterator<Item = NodeId>) -> Self {
        self.nodes = nodes.into_iter().collect();
        self
    }

    pub fn with_components<I, S>(mut self, components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.components = components.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_maxerr(mut self, maxerr: f64) -> Self {
        self.maxerr = maxerr;
        self
    }

    pub fn with_test_measure(mut self, test_measure: TestMeasure) -> Self {
        self.test_measure = test_measure;
        self
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn maxerr(&self) -> f64 {
        self.maxerr
    }

    pub fn test_measure(&self) -> TestMeasure {
        self.test_measure
    }

    pub fn validate(&self) -> HarnessResult<()> {
        if !self.maxerr.is_finite() || self.maxerr < 0.0 {
            return Err(HarnessError::input_validation(
                "INPUT.COMPARISON_MAXERR",
                format!(
                    "maxerr must be finite and non-negative, got {}",
                    self.maxerr
                ),
            ));
        }
        if let Some(time) = self.times.iter().find(|time| !time.is_finite()) {
            return Err(HarnessError::input_validation(
                "INPUT.COMPARISON_TIMES",
                format!("requested time {time} is not finite"),
            ));
        }
        Ok(())
    }
}

/// A named regression case. `directory` is the folder under the cases root
/// and usually equals `name`.
#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    pub name: String,
    pub directory: String,
    pub description: String,
    pub parameters: ComparisonParameters,
}

impl TestCase {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ComparisonParameters,
    ) -> Self {
        let name = name.into();
        Self {
            directory: name.clone(),
            name,
            description: description.into(),
            parameters,
        }
    }

    pub fn in_directory(mut self, directory: impl Into<String>) -> Self {
        self.directory = directory.into();
        self
    }

    pub fn directory(&self, cases_root: &Path) -> PathBuf {
        cases_root.join(&self.directory)
    }

    /// True when `directory` names a folder strictly below the cases root.
    /// Cleanup runs inside that folder, so `""`, `.`, `..` and absolute
    /// paths are never accepted.
    pub fn has_nested_directory(&self) -> bool {
        let path = Path::new(&self.directory);
        path.components().next().is_some()
            && path
                .components()
                .all(|component| matches!(component, Component::Normal(_)))
    }

    /// Solo-mode lookup accepts the case name, `test_<name>`, or the
    /// directory name.
    pub fn answers_to(&self, requested: &str) -> bool {
        let requested = requested.trim();
        let bare = requested.strip_prefix("test_").unwrap_or(requested);
        self.name == requested || self.name == bare || self.directory == requested
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    ThresholdExceeded,
    EmptyDifference,
    MissingCoordinate,
    NothingCompared,
}

/// One violated coordinate check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    pub subcase: String,
    pub file_kind: FileKind,
    pub reason: FailureReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measured: Option<f64>,
    pub maxerr: f64,
}

impl FailureRecord {
    pub fn new(subcase: &SubCase, file_kind: FileKind, reason: FailureReason, maxerr: f64) -> Self {
        Self {
            subcase: subcase.name().to_string(),
            file_kind,
            reason,
            component: None,
            variable: None,
            node: None,
            time: None,
            measured: None,
            maxerr,
        }
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn with_variable(mut self, variable: impl Into<String>) -> Self {
        self.variable = Some(variable.into());
        self
    }

    pub fn with_node(mut self, node: NodeId) -> Self {
        self.node = Some(node);
        self
    }

    pub fn with_time(mut self, time: f64) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_measured(mut self, measured: f64) -> Self {
        self.measured = Some(measured);
        self
    }

    /// Coordinate identifiers as key/value pairs, in the order each dataset
    /// family indexes them.
    pub fn coordinate_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        let component = self
            .component
            .as_ref()
            .map(|component| ("component", component.clone()));
        let variable = self
            .variable
            .as_ref()
            .map(|variable| ("variable", variable.clone()));
        let node = self.node.map(|node| ("node", node.to_string()));
        let time = self.time.map(|time| ("time", format_time(time)));

        match self.file_kind.family() {
            DatasetFamily::Tabular => pairs.extend([component, node, variable]),
            DatasetFamily::Contour | DatasetFamily::Series => {
                pairs.extend([variable, time, node, component])
            }
        }
        pairs.into_iter().flatten().collect()
    }

    pub fn fail_log_line(&self) -> String {
        let mut line = format!(
            "Failed at subcase:{} filetype:{}",
            self.subcase,
            self.file_kind.filetype_label()
        );
        for (key, value) in self.coordinate_pairs() {
            line.push(' ');
            line.push_str(key);
            line.push(':');
            line.push_str(&value);
        }
        line
    }

    /// Human-readable coordinate, e.g. `variable P, time 2.0`.
    pub fn location(&self) -> String {
        self.coordinate_pairs()
            .into_iter()
            .map(|(key, value)| format!("{key} {value}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn message(&self) -> String {
        let location = self.location();
        match self.reason {
            FailureReason::ThresholdExceeded => format!(
                "Incorrect value at {} ({}: {} >= maxerr {})",
                location,
                self.file_kind,
                self.measured.map_or_else(|| "n/a".to_string(), format_value),
                format_value(self.maxerr)
            ),
            FailureReason::EmptyDifference => format!(
                "No overlapping values to compare at {} ({})",
                location, self.file_kind
            ),
            FailureReason::MissingCoordinate => format!(
                "Requested coordinate missing from output at {} ({})",
                location, self.file_kind
            ),
            FailureReason::NothingCompared => format!(
                "No coordinate of the difference dataset was compared ({})",
                self.file_kind
            ),
        }
    }
}

/// Times print the way the reference logs spell them: `2.0`, not `2`.
pub fn format_time(time: f64) -> String {
    format!("{time:?}")
}

pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    format!("{value:.6E}")
}

#[cfg(test)]
mod tests {
    use super::{
        ComparisonParameters, DatasetFamily, FailureReason, FailureRecord, FileKind, SubCase,
        TestCase, TestMeasure,
    };
    use std::path::{Path, PathBuf};

    #[test]
    fn file_kinds_check_in_fixed_order_and_map_to_families() {
        let extensions = FileKind::ALL.map(FileKind::extension);
        assert_eq!(extensions, [".avs", ".csv", ".his", ".out", ".trc"]);
        assert_eq!(FileKind::Output.filetype_label(), "*.out");

        assert_eq!(FileKind::ContourCsv.family(), DatasetFamily::Contour);
        assert_eq!(FileKind::Tracer.family(), DatasetFamily::Series);
        assert_eq!(FileKind::Output.family(), DatasetFamily::Tabular);
    }

    #[test]
    fn subcase_control_file_and_globs() {
        let implicit = SubCase::implicit();
        assert_eq!(
            implicit.control_file(),
            PathBuf::from("input/control/fehmn.files")
        );
        assert_eq!(FileKind::History.glob_for_subcase(&implicit), "*.his");

        let named = SubCase::named("run2");
        assert_eq!(
            named.control_file(),
            PathBuf::from("input/control/run2.files")
        );
        assert_eq!(FileKind::ContourAvs.glob_for_subcase(&named), "*run2.avs");
    }

    #[test]
    fn comparison_parameters_default_and_json_overrides() {
        let defaults = ComparisonParameters::default();
        assert_eq!(defaults.maxerr(), 1.0e-4);
        assert_eq!(defaults.test_measure(), TestMeasure::MaxDifference);
        assert!(defaults.variables().is_empty());

        let parsed: ComparisonParameters = serde_json::from_str(
            r#"{ "times": [3.0, 4.0], "maxerr": 0.01, "testMeasure": "rms" }"#,
        )
        .expect("parameters should parse");
        assert_eq!(parsed.times(), &[3.0, 4.0]);
        assert_eq!(parsed.maxerr(), 0.01);
        assert_eq!(parsed.test_measure(), TestMeasure::RmsDifference);
        assert!(parsed.nodes().is_empty());
    }

    #[test]
    fn comparison_parameters_reject_negative_maxerr() {
        let parameters = ComparisonParameters::default().with_maxerr(-1.0);
        let error = parameters.validate().expect_err("negative maxerr is invalid");
        assert_eq!(error.placeholder(), "INPUT.COMPARISON_MAXERR");
    }

    #[test]
    fn fail_log_lines_follow_family_key_order() {
        let contour = FailureRecord::new(
            &SubCase::implicit(),
            FileKind::ContourAvs,
            FailureReason::ThresholdExceeded,
            1.0e-4,
        )
        .with_variable("P")
        .with_time(2.0)
        .with_measured(2.0e-4);
        assert_eq!(
            contour.fail_log_line(),
            "Failed at subcase: filetype:*.avs variable:P time:2.0"
        );

        let tabular = FailureRecord::new(
            &SubCase::named("run1"),
            FileKind::Output,
            FailureReason::ThresholdExceeded,
            1.0e-4,
        )
        .with_component("water")
        .with_node(4)
        .with_variable("Kx");
        assert_eq!(
            tabular.fail_log_line(),
            "Failed at subcase:run1 filetype:*.out component:water node:4 variable:Kx"
        );
    }

    #[test]
    fn test_case_resolves_directory_and_solo_names() {
        let case = TestCase::new("boun", "boundary conditions", ComparisonParameters::default())
            .in_directory("boun_test");
        assert_eq!(
            case.directory(Path::new("/cases")),
            PathBuf::from("/cases/boun_test")
        );
        assert!(case.answers_to("boun"));
        assert!(case.answers_to("test_boun"));
        assert!(case.answers_to("boun_test"));
        assert!(!case.answers_to("theis"));
    }

    #[test]
    fn case_directory_must_stay_below_the_cases_root() {
        let case = |directory: &str| {
            TestCase::new("plume", "", ComparisonParameters::default()).in_directory(directory)
        };
        assert!(case("plume_case").has_nested_directory());
        assert!(case("group/plume").has_nested_directory());
        for escaping in ["", ".", "..", "../plume", "group/../..", "/tmp/plume"] {
            assert!(!case(escaping).has_nested_directory(), "{escaping:?}");
        }
    }
}
