use super::{ContourSnapshot, DatasetError, TimeKey};
use crate::domain::NodeId;
use std::collections::BTreeMap;
use std::path::Path;

const FORTRAN_EXPONENT_MARKERS: [(char, char); 2] = [('D', 'E'), ('d', 'e')];

/// Long contour labels FEHM writes, and the short names test cases request.
const CONTOUR_LABEL_ALIASES: [(&str, &str); 12] = [
    ("X coordinate (m)", "x"),
    ("Y coordinate (m)", "y"),
    ("Z coordinate (m)", "z"),
    ("Liquid Pressure (MPa)", "P"),
    ("Vapor Pressure (MPa)", "P_vap"),
    ("Capillary Pressure (MPa)", "P_cap"),
    ("Temperature (deg C)", "T"),
    ("Saturation", "saturation"),
    ("Liquid Density (kg/m**3)", "density"),
    ("X Permeability (log m**2)", "perm_x"),
    ("Y Permeability (log m**2)", "perm_y"),
    ("Z Permeability (log m**2)", "perm_z"),
];

#[derive(Debug)]
pub(super) struct SeriesTable {
    pub(super) times: Vec<f64>,
    pub(super) columns: Vec<SeriesColumn>,
}

#[derive(Debug)]
pub(super) struct SeriesColumn {
    pub(super) variable: String,
    pub(super) node: NodeId,
    pub(super) values: Vec<f64>,
}

pub(super) type TabularRecords = BTreeMap<String, BTreeMap<NodeId, BTreeMap<String, Vec<f64>>>>;

pub(super) fn parse_contour_csv(
    path: &Path,
    content: &str,
) -> Result<(TimeKey, ContourSnapshot), DatasetError> {
    let mut time = None;
    let mut header: Option<Vec<String>> = None;
    let mut snapshot = ContourSnapshot::default();
    let mut columns: Vec<Vec<f64>> = Vec::new();

    for (line_index, raw_line) in content.lines().enumerate() {
        let line_number = line_index + 1;
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(comment) = line.strip_prefix('#') {
            if let Some(value) = time_from_comment(path, line_number, comment)? {
                time = Some(value);
            }
            continue;
        }

        let fields = split_delimited(line);
        let Some(variables) = header.as_ref() else {
            if fields.len() < 2 {
                return Err(malformed(
                    path,
                    line_number,
                    "contour header needs a node column and at least one variable",
                ));
            }
            columns = vec![Vec::new(); fields.len() - 1];
            header = Some(fields[1..].to_vec());
            continue;
        };

        if fields.len() != variables.len() + 1 {
            return Err(malformed(
                path,
                line_number,
                format!(
                    "expected {} fields, found {}",
                    variables.len() + 1,
                    fields.len()
                ),
            ));
        }
        let node = parse_node(path, line_number, &fields[0])?;
        push_contour_row(path, line_number, &mut snapshot, &mut columns, node, &fields[1..])?;
    }

    finish_contour(path, time, header, columns, snapshot)
}

pub(super) fn parse_contour_avs(
    path: &Path,
    content: &str,
) -> Result<(TimeKey, ContourSnapshot), DatasetError> {
    let mut time = None;
    let mut component_sizes: Option<Vec<usize>> = None;
    let mut labels: Vec<String> = Vec::new();
    let mut header: Option<Vec<String>> = None;
    let mut snapshot = ContourSnapshot::default();
    let mut columns: Vec<Vec<f64>> = Vec::new();

    for (line_index, raw_line) in content.lines().enumerate() {
        let line_number = line_index + 1;
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(comment) = line.strip_prefix('#') {
            if let Some(value) = time_from_comment(path, line_number, comment)? {
                time = Some(value);
            }
            continue;
        }

        let Some(sizes) = component_sizes.as_ref() else {
            component_sizes = Some(parse_component_sizes(path, line_number, line)?);
            continue;
        };

        if header.is_none() {
            let name = line.split(',').next().unwrap_or(line).trim();
            labels.push(unquote(name).to_string());
            if labels.len() == sizes.len() {
                let expanded = expand_component_labels(&labels, sizes);
                columns = vec![Vec::new(); expanded.len()];
                header = Some(expanded);
            }
            continue;
        }

        let fields = line.split_whitespace().map(str::to_string).collect::<Vec<_>>();
        if fields.len() != columns.len() + 1 {
            return Err(malformed(
                path,
                line_number,
                format!(
                    "expected node id and {} values, found {} fields",
                    columns.len(),
                    fields.len()
                ),
            ));
        }
        let node = parse_node(path, line_number, &fields[0])?;
        push_contour_row(path, line_number, &mut snapshot, &mut columns, node, &fields[1..])?;
    }

    finish_contour(path, time, header, columns, snapshot)
}

pub(super) fn parse_series(path: &Path, content: &str) -> Result<SeriesTable, DatasetError> {
    let mut table: Option<SeriesTable> = None;

    for (line_index, raw_line) in content.lines().enumerate() {
        let line_number = line_index + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields = split_delimited(line);

        let Some(table) = table.as_mut() else {
            if fields.len() < 2 {
                return Err(malformed(
                    path,
                    line_number,
                    "series header needs a time column and at least one variable:node column",
                ));
            }
            let mut columns = Vec::with_capacity(fields.len() - 1);
            for field in &fields[1..] {
                let (variable, node) = field.rsplit_once(':').ok_or_else(|| {
                    malformed(
                        path,
                        line_number,
                        format!("column '{field}' is not of the form <variable>:<node>"),
                    )
                })?;
                columns.push(SeriesColumn {
                    variable: variable.trim().to_string(),
                    node: parse_node(path, line_number, node.trim())?,
                    values: Vec::new(),
                });
            }
            table = Some(SeriesTable {
                times: Vec::new(),
                columns,
            });
            continue;
        };

        if fields.len() != table.columns.len() + 1 {
            return Err(malformed(
                path,
                line_number,
                format!(
                    "expected {} fields, found {}",
                    table.columns.len() + 1,
                    fields.len()
                ),
            ));
        }
        table.times.push(parse_number(path, line_number, &fields[0])?);
        for (column, field) in table.columns.iter_mut().zip(&fields[1..]) {
            column.values.push(parse_number(path, line_number, field)?);
        }
    }

    table.ok_or_else(|| malformed(path, 0, "series file has no header"))
}

/// Reads every `component,node,...` table embedded in a simulator output
/// file. Text outside the tables is ignored.
pub(super) fn parse_tabular(path: &Path, content: &str) -> Result<TabularRecords, DatasetError> {
    let mut records = TabularRecords::new();
    let mut active_header: Option<Vec<String>> = None;

    for (line_index, raw_line) in content.lines().enumerate() {
        let line_number = line_index + 1;
        let line = raw_line.trim();
        if line.starts_with('#') {
            continue;
        }

        if let Some(variables) = active_header.as_ref() {
            let fields = if line.is_empty() {
                Vec::new()
            } else {
                split_delimited(line)
            };
            // A row whose node field is not a node id ends the table.
            let node = (fields.len() == variables.len() + 2)
                .then(|| parse_node(path, line_number, &fields[1]).ok())
                .flatten();
            if let Some(node) = node {
                let by_variable = records
                    .entry(fields[0].clone())
                    .or_default()
                    .entry(node)
                    .or_default();
                for (variable, field) in variables.iter().zip(&fields[2..]) {
                    let value = parse_number(path, line_number, field)?;
                    by_variable.entry(variable.clone()).or_default().push(value);
                }
                continue;
            }
            active_header = None;
        }

        if line.contains(',') {
            let fields = split_delimited(line);
            if fields.len() >= 3
                && fields[0].eq_ignore_ascii_case("component")
                && fields[1].eq_ignore_ascii_case("node")
            {
                active_header = Some(fields[2..].to_vec());
            }
        }
    }

    Ok(records)
}

pub(super) fn parse_number(path: &Path, line: usize, token: &str) -> Result<f64, DatasetError> {
    let mut normalized = unquote(token.trim()).to_string();
    for (marker, replacement) in FORTRAN_EXPONENT_MARKERS {
        normalized = normalized.replace(marker, &replacement.to_string());
    }
    normalized.parse::<f64>().map_err(|_| DatasetError::InvalidNumber {
        path: path.to_path_buf(),
        line,
        token: token.to_string(),
    })
}

fn parse_node(path: &Path, line: usize, token: &str) -> Result<NodeId, DatasetError> {
    let token = unquote(token.trim());
    if let Ok(node) = token.parse::<NodeId>() {
        return Ok(node);
    }
    let value = parse_number(path, line, token)?;
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 {
        return Ok(value as NodeId);
    }
    Err(malformed(
        path,
        line,
        format!("'{token}' is not a valid node id"),
    ))
}

fn time_from_comment(
    path: &Path,
    line: usize,
    comment: &str,
) -> Result<Option<TimeKey>, DatasetError> {
    let Some(split_at) = comment.find(['=', ':']) else {
        return Ok(None);
    };
    let (key, value) = comment.split_at(split_at);
    if !key.trim().eq_ignore_ascii_case("time") {
        return Ok(None);
    }
    let token = value[1..].split_whitespace().next().unwrap_or_default();
    let time = parse_number(path, line, token)?;
    if !time.is_finite() {
        return Err(malformed(path, line, format!("time '{token}' is not finite")));
    }
    Ok(Some(TimeKey::new(time)))
}

fn parse_component_sizes(path: &Path, line: usize, text: &str) -> Result<Vec<usize>, DatasetError> {
    let values = text
        .split_whitespace()
        .map(|token| {
            token.parse::<usize>().map_err(|_| {
                malformed(
                    path,
                    line,
                    format!("'{token}' is not a valid AVS component count"),
                )
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let Some((&count, sizes)) = values.split_first() else {
        return Err(malformed(path, line, "empty AVS component line"));
    };
    if count == 0 {
        return Err(malformed(path, line, "AVS file declares zero components"));
    }
    if sizes.is_empty() {
        return Ok(vec![1; count]);
    }
    if sizes.len() != count || sizes.contains(&0) {
        return Err(malformed(
            path,
            line,
            format!("AVS component line declares {count} components but lists sizes {sizes:?}"),
        ));
    }
    Ok(sizes.to_vec())
}

fn expand_component_labels(labels: &[String], sizes: &[usize]) -> Vec<String> {
    let mut expanded = Vec::new();
    for (label, &size) in labels.iter().zip(sizes) {
        if size == 1 {
            expanded.push(label.clone());
        } else {
            expanded.extend((1..=size).map(|index| format!("{label}[{index}]")));
        }
    }
    expanded
}

fn push_contour_row(
    path: &Path,
    line: usize,
    snapshot: &mut ContourSnapshot,
    columns: &mut [Vec<f64>],
    node: NodeId,
    fields: &[String],
) -> Result<(), DatasetError> {
    if snapshot.nodes.contains(&node) {
        return Err(malformed(path, line, format!("node {node} listed twice")));
    }
    snapshot.nodes.push(node);
    for (column, field) in columns.iter_mut().zip(fields) {
        column.push(parse_number(path, line, field)?);
    }
    Ok(())
}

fn finish_contour(
    path: &Path,
    time: Option<TimeKey>,
    header: Option<Vec<String>>,
    columns: Vec<Vec<f64>>,
    mut snapshot: ContourSnapshot,
) -> Result<(TimeKey, ContourSnapshot), DatasetError> {
    let time = time.ok_or_else(|| DatasetError::MissingTime {
        path: path.to_path_buf(),
    })?;
    let variables = header.ok_or_else(|| malformed(path, 0, "contour file has no header"))?;
    for (label, values) in variables.into_iter().zip(columns) {
        let variable = contour_variable_name(&label);
        if snapshot.variables.insert(variable.clone(), values).is_some() {
            return Err(malformed(
                path,
                0,
                format!("variable '{variable}' listed twice"),
            ));
        }
    }
    Ok((time, snapshot))
}

fn contour_variable_name(label: &str) -> String {
    let (base, index) = match label.rsplit_once('[') {
        Some((base, rest)) if rest.ends_with(']') => (base, Some(rest)),
        _ => (label, None),
    };
    let short = CONTOUR_LABEL_ALIASES
        .iter()
        .find(|(long, _)| long.eq_ignore_ascii_case(base.trim()))
        .map_or(base, |(_, short)| *short);
    match index {
        Some(rest) => format!("{short}[{rest}"),
        None => short.to_string(),
    }
}

fn split_delimited(line: &str) -> Vec<String> {
    line.split(',')
        .map(|field| unquote(field.trim()).trim().to_string())
        .collect()
}

fn unquote(field: &str) -> &str {
    field
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(field)
}

fn malformed(path: &Path, line: usize, message: impl Into<String>) -> DatasetError {
    DatasetError::Malformed {
        path: path.to_path_buf(),
        line,
        message: message.into(),
    }
}
