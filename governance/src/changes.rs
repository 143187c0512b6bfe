//! Validation and encoding of parameter-change drafts.
//!
//! Draft rows are owned by the caller and passed in as immutable snapshots.
//! Every function here is pure: validation errors come back as data and
//! encoding never fails.

use crate::params::{Parameter, ParameterKind, ParameterRegistry};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::warn;

/// Largest integer magnitude that survives a round-trip through an IEEE double.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// One user-edited row of a parameter-change proposal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftRow {
    #[serde(default)]
    pub parameter: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub is_object_value: bool,
}

impl DraftRow {
    pub fn new(parameter: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            value: value.into(),
            is_object_value: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("row {0} does not exist")]
    OutOfRange(usize),
    #[error("parameter already selected in row {row}")]
    AlreadySelected { row: usize },
    #[error("unknown parameter: {0}")]
    UnknownParameter(String),
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Validate a raw value against a parameter. An empty string means valid.
pub fn validate(parameter: Option<&Parameter>, raw: &str) -> String {
    let Some(parameter) = parameter else {
        return String::new();
    };
    if raw.is_empty() {
        return String::new();
    }
    match &parameter.kind {
        ParameterKind::Number { min, max, .. } => {
            let Some(value) = parse_number(raw) else {
                return "Value must be a number".to_string();
            };
            if let Some(min) = min {
                if value < *min {
                    return format!("Value must be at least {min}");
                }
            }
            if let Some(max) = max {
                if value > *max {
                    return format!("Value must be at most {max}");
                }
            }
            String::new()
        }
        ParameterKind::Text { max_length } => match max_length {
            Some(limit) if raw.chars().count() > *limit => {
                format!("Value must be at most {limit} characters")
            }
            _ => String::new(),
        },
        ParameterKind::Other => String::new(),
    }
}

/// Per-row errors for a whole draft set, index-aligned with `rows`.
pub fn validate_rows(registry: &ParameterRegistry, rows: &[DraftRow]) -> Vec<String> {
    rows.iter()
        .map(|row| validate(registry.get(&row.parameter), &row.value))
        .collect()
}

/// Parameters a given row may pick from, grouped by category.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryOptions<'a> {
    pub name: &'a str,
    pub parameters: Vec<&'a Parameter>,
}

/// Options for the select of `row_index`: parameters chosen by other rows are
/// hidden, the row's own selection stays visible.
pub fn available_parameters<'a>(
    registry: &'a ParameterRegistry,
    rows: &[DraftRow],
    row_index: usize,
) -> Vec<CategoryOptions<'a>> {
    let taken: Vec<&str> = rows
        .iter()
        .enumerate()
        .filter(|(idx, row)| *idx != row_index && !row.parameter.is_empty())
        .map(|(_, row)| row.parameter.as_str())
        .collect();
    registry
        .categories()
        .iter()
        .map(|category| CategoryOptions {
            name: &category.name,
            parameters: category
                .parameters
                .iter()
                .filter(|p| !taken.contains(&p.id.as_str()))
                .collect(),
        })
        .collect()
}

/// Return a copy of `rows` with `parameter` selected in `row_index`.
///
/// Picking a parameter held by another row is refused. Switching to a
/// different parameter clears the row's value; an empty id clears the
/// selection.
pub fn select_parameter(
    registry: &ParameterRegistry,
    rows: &[DraftRow],
    row_index: usize,
    parameter: &str,
) -> Result<Vec<DraftRow>, SelectionError> {
    if row_index >= rows.len() {
        return Err(SelectionError::OutOfRange(row_index));
    }
    if !parameter.is_empty() {
        if registry.get(parameter).is_none() {
            return Err(SelectionError::UnknownParameter(parameter.to_string()));
        }
        if let Some(row) = rows
            .iter()
            .enumerate()
            .position(|(idx, r)| idx != row_index && r.parameter == parameter)
        {
            return Err(SelectionError::AlreadySelected { row });
        }
    }
    let mut next = rows.to_vec();
    let row = &mut next[row_index];
    if row.parameter != parameter {
        *row = DraftRow {
            parameter: parameter.to_string(),
            ..DraftRow::default()
        };
    }
    Ok(next)
}

/// Indices of rows repeating a parameter already chosen by an earlier row.
pub fn duplicate_selections(rows: &[DraftRow]) -> Vec<usize> {
    let mut dups = Vec::new();
    for (idx, row) in rows.iter().enumerate() {
        if row.parameter.is_empty() {
            continue;
        }
        if rows[..idx].iter().any(|r| r.parameter == row.parameter) {
            dups.push(idx);
        }
    }
    dups
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EncodedValue {
    Number(serde_json::Number),
    Text(String),
    Structured(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodedChange {
    pub parameter: String,
    pub value: EncodedValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeWarning {
    /// At least 80% of the limit.
    Approaching { size: usize, max: usize },
    Exceeded { size: usize, max: usize },
}

impl SizeWarning {
    pub fn is_hard(&self) -> bool {
        matches!(self, SizeWarning::Exceeded { .. })
    }
}

impl fmt::Display for SizeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeWarning::Approaching { size, max } => write!(
                f,
                "Payload approaching maximum size ({size} of {max} bytes)"
            ),
            SizeWarning::Exceeded { size, max } => {
                write!(f, "Payload exceeds maximum size ({size} of {max} bytes)")
            }
        }
    }
}

/// Classify a payload size against the configured limit.
pub fn size_warning(size: usize, max: usize) -> Option<SizeWarning> {
    if size >= max {
        Some(SizeWarning::Exceeded { size, max })
    } else if (size as u128) * 5 >= (max as u128) * 4 {
        Some(SizeWarning::Approaching { size, max })
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EncodedPayload {
    /// Indented JSON; empty when no row is eligible.
    pub payload: String,
    pub changes: Vec<EncodedChange>,
    pub warning: Option<SizeWarning>,
    /// Set when values were emitted uncoerced.
    pub fallback: bool,
}

impl EncodedPayload {
    /// True when there was nothing to encode.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

fn is_eligible(row: &DraftRow, error: Option<&String>) -> bool {
    !row.parameter.is_empty() && !row.value.is_empty() && error.map_or(true, |e| e.is_empty())
}

fn coerce(
    parameter: Option<&Parameter>,
    row: &DraftRow,
) -> Result<EncodedValue, serde_json::Error> {
    use serde::de::Error as _;

    let is_number = parameter.map_or(false, |p| p.kind.is_number());
    if is_number {
        let value = parse_number(&row.value)
            .ok_or_else(|| serde_json::Error::custom("value is not a number"))?;
        if value.fract() == 0.0 && value.abs() < MAX_SAFE_INTEGER {
            return Ok(EncodedValue::Number(serde_json::Number::from(value as i64)));
        }
        return serde_json::Number::from_f64(value)
            .map(EncodedValue::Number)
            .ok_or_else(|| serde_json::Error::custom("value is not finite"));
    }
    if row.is_object_value {
        return serde_json::from_str(&row.value).map(EncodedValue::Structured);
    }
    Ok(EncodedValue::Text(row.value.clone()))
}

fn encode_coerced(
    registry: &ParameterRegistry,
    rows: &[&DraftRow],
) -> Result<(Vec<EncodedChange>, String), serde_json::Error> {
    let changes = rows
        .iter()
        .map(|row| {
            Ok(EncodedChange {
                parameter: row.parameter.clone(),
                value: coerce(registry.get(&row.parameter), row)?,
            })
        })
        .collect::<Result<Vec<_>, serde_json::Error>>()?;
    let payload = serde_json::to_string_pretty(&changes)?;
    Ok((changes, payload))
}

fn encode_raw(rows: &[&DraftRow]) -> (Vec<EncodedChange>, String) {
    let changes: Vec<EncodedChange> = rows
        .iter()
        .map(|row| EncodedChange {
            parameter: row.parameter.clone(),
            value: EncodedValue::Text(row.value.clone()),
        })
        .collect();
    let payload = serde_json::to_string_pretty(&changes).unwrap_or_default();
    (changes, payload)
}

/// Encode the eligible rows of a draft set into the change payload.
///
/// `errors` is index-aligned with `rows`; a missing entry counts as valid.
pub fn encode(
    registry: &ParameterRegistry,
    rows: &[DraftRow],
    errors: &[String],
    max_size: usize,
) -> EncodedPayload {
    let eligible: Vec<&DraftRow> = rows
        .iter()
        .enumerate()
        .filter(|(idx, row)| is_eligible(row, errors.get(*idx)))
        .map(|(_, row)| row)
        .collect();
    if eligible.is_empty() {
        return EncodedPayload::default();
    }

    let (changes, payload, fallback) = match encode_coerced(registry, &eligible) {
        Ok((changes, payload)) => (changes, payload, false),
        Err(err) => {
            warn!(error = %err, rows = eligible.len(), "encoding raw change values");
            let (changes, payload) = encode_raw(&eligible);
            (changes, payload, true)
        }
    };
    let warning = size_warning(payload.len(), max_size);
    EncodedPayload {
        payload,
        changes,
        warning,
        fallback,
    }
}

/// Validation and encoding of one draft set in a single pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeReview {
    pub errors: Vec<String>,
    pub encoded: EncodedPayload,
}

impl ChangeReview {
    pub fn new(registry: &ParameterRegistry, rows: &[DraftRow], max_size: usize) -> Self {
        let errors = validate_rows(registry, rows);
        let encoded = encode(registry, rows, &errors, max_size);
        Self { errors, encoded }
    }

    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(|e| !e.is_empty())
    }

    /// Whether the draft can be sent as-is.
    pub fn is_submittable(&self) -> bool {
        !self.has_errors()
            && !self.encoded.is_empty()
            && !self.encoded.warning.map_or(false, |w| w.is_hard())
    }
}
