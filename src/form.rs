use std::collections::BTreeMap;
use std::io;

use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::{Map, Number, Value};
use tracing::{debug, warn};

use crate::schema::{Category, EnabledWhen, EntitySchema, FieldSpec, FieldType};

/// Control names carrying this prefix are collected on submit.
pub const FIELD_VALUE_PREFIX: &str = "fv-";
pub const QUERY_PREFIX: &str = "? ";

/// Largest integer an f64 holds exactly.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

pub type QueryParameters = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormError {
    #[error("field '{field}' of type {field_type} cannot be submitted")]
    UnsupportedFieldType { field: String, field_type: FieldType },
    #[error("'{field}' is not an input field of the {entity} schema")]
    UnknownField { field: String, entity: String },
    #[error("query parameters could not be serialized: {0}")]
    Serialize(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegerOperator {
    Is,
    IsGreaterThan,
    IsNot,
}

impl IntegerOperator {
    pub const ALL: [IntegerOperator; 3] = [
        IntegerOperator::Is,
        IntegerOperator::IsGreaterThan,
        IntegerOperator::IsNot,
    ];

    pub fn value(self) -> &'static str {
        match self {
            IntegerOperator::Is => "is",
            IntegerOperator::IsGreaterThan => "is_greater_than",
            IntegerOperator::IsNot => "is_not",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            IntegerOperator::Is => "is",
            IntegerOperator::IsGreaterThan => "is greater than",
            IntegerOperator::IsNot => "is not",
        }
    }

    pub fn cycled(self, forward: bool) -> Self {
        let idx = Self::ALL.iter().position(|op| *op == self).unwrap_or(0);
        let len = Self::ALL.len();
        let next = if forward {
            (idx + 1) % len
        } else {
            (idx + len - 1) % len
        };
        Self::ALL[next]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlKind {
    OperatorNumber {
        operators: [IntegerOperator; 3],
        min: Option<i64>,
        max: Option<i64>,
    },
    Toggle,
    SingleChoice {
        options: Vec<String>,
    },
    MultiChoice {
        options: Vec<String>,
    },
    SingleLineText,
    MultiLineText,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlDescriptor {
    pub field_name: String,
    pub input_name: String,
    pub field_type: FieldType,
    pub required: bool,
    pub kind: ControlKind,
    pub enabled_when: Option<EnabledWhen>,
}

impl ControlDescriptor {
    /// The removal affordance every control carries.
    pub fn remove_from(&self, active: &mut ActiveFieldSet, category: Category) -> Option<usize> {
        active.remove_field(category, &self.field_name)
    }
}

pub fn field_input_name(field_name: &str) -> String {
    format!("{FIELD_VALUE_PREFIX}{field_name}")
}

pub fn render_field_control(field: &FieldSpec, required: bool) -> ControlDescriptor {
    let kind = match field.field_type {
        FieldType::Integer => ControlKind::OperatorNumber {
            operators: IntegerOperator::ALL,
            min: field.min,
            max: field.max,
        },
        FieldType::Boolean => ControlKind::Toggle,
        FieldType::Categorical => ControlKind::SingleChoice {
            options: field.categories.clone(),
        },
        FieldType::CategoricalMultiple => ControlKind::MultiChoice {
            options: field.categories.clone(),
        },
        FieldType::ShortString => ControlKind::SingleLineText,
        FieldType::LongString => ControlKind::MultiLineText,
    };
    ControlDescriptor {
        field_name: field.name.clone(),
        input_name: field_input_name(&field.name),
        field_type: field.field_type,
        required,
        kind,
        enabled_when: field.enabled_when.clone(),
    }
}

/// One entry per active field, in order; names missing from the schema yield an error entry.
pub fn render_form(
    schema: &EntitySchema,
    active_fields: &[String],
) -> Vec<Result<ControlDescriptor, FormError>> {
    active_fields
        .iter()
        .map(|name| {
            schema
                .input_field(name)
                .map(|field| render_field_control(field, schema.is_required(name)))
                .ok_or_else(|| FormError::UnknownField {
                    field: name.clone(),
                    entity: schema.entity_key.clone(),
                })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveFieldSet {
    fields: BTreeMap<Category, Vec<String>>,
}

impl Default for ActiveFieldSet {
    fn default() -> Self {
        Self {
            fields: Category::ALL
                .into_iter()
                .map(|category| (category, Vec::new()))
                .collect(),
        }
    }
}

impl ActiveFieldSet {
    pub fn fields(&self, category: Category) -> &[String] {
        self.fields
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Appends without deduplicating; returns the new entry's index.
    pub fn add_field(&mut self, category: Category, field_name: &str) -> usize {
        let fields = self.fields.entry(category).or_default();
        fields.push(field_name.to_string());
        fields.len() - 1
    }

    /// Removes the first occurrence; returns the index it occupied.
    pub fn remove_field(&mut self, category: Category, field_name: &str) -> Option<usize> {
        let fields = self.fields.get_mut(&category)?;
        let idx = fields.iter().position(|name| name == field_name)?;
        fields.remove(idx);
        Some(idx)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    Checkbox(bool),
    SelectOne(String),
    Number(String),
    SelectMultiple(Vec<String>),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawControl {
    pub name: String,
    pub value: RawValue,
}

impl RawControl {
    pub fn new(name: impl Into<String>, value: RawValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodedSubmission {
    pub text: String,
    pub parameters: QueryParameters,
    pub skipped: Vec<FormError>,
}

/// Walks the controls in order; a later control with the same field name
/// overwrites the earlier value but keeps its position.
pub fn encode_submission(controls: &[RawControl]) -> Result<EncodedSubmission, FormError> {
    let mut parameters = QueryParameters::new();
    let mut skipped = Vec::new();

    for control in controls {
        let Some(key) = control.name.strip_prefix(FIELD_VALUE_PREFIX) else {
            continue;
        };
        let value = match &control.value {
            RawValue::Checkbox(checked) => Value::Bool(*checked),
            RawValue::SelectOne(raw) | RawValue::Number(raw) => coerce_numeric(raw),
            RawValue::Text(raw) => Value::String(raw.clone()),
            RawValue::SelectMultiple(_) => {
                warn!(field = key, "multi-select values are not supported in queries; skipping");
                skipped.push(FormError::UnsupportedFieldType {
                    field: key.to_string(),
                    field_type: FieldType::CategoricalMultiple,
                });
                continue;
            }
        };
        parameters.insert(key.to_string(), value);
    }

    let text = encode_query_text(&parameters)?;
    debug!(query = %text, "encoded submission");
    Ok(EncodedSubmission {
        text,
        parameters,
        skipped,
    })
}

pub fn encode_query_text(parameters: &QueryParameters) -> Result<String, FormError> {
    let mut buf = Vec::with_capacity(64);
    buf.extend_from_slice(QUERY_PREFIX.as_bytes());
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, QueryFormatter);
    parameters
        .serialize(&mut serializer)
        .map_err(|err| FormError::Serialize(err.to_string()))?;
    String::from_utf8(buf).map_err(|err| FormError::Serialize(err.to_string()))
}

/// Compact json with `", "`/`": "` separators and bare `True`/`False`,
/// the literal format the search backend evaluates.
struct QueryFormatter;

impl Formatter for QueryFormatter {
    fn write_bool<W>(&mut self, writer: &mut W, value: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(if value { b"True" } else { b"False" })
    }

    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

fn coerce_numeric(raw: &str) -> Value {
    leading_number(raw)
        .and_then(json_number)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(raw.to_string()))
}

fn json_number(value: f64) -> Option<Number> {
    if value.fract() == 0.0 && value.abs() < MAX_EXACT_INTEGER {
        Some(Number::from(value as i64))
    } else {
        Number::from_f64(value)
    }
}

/// Longest decimal literal at the start of `raw` (after leading whitespace),
/// so "3 rooms" reads as 3 and "is" reads as nothing.
pub fn leading_number(raw: &str) -> Option<f64> {
    let s = raw.trim_start();
    let bytes = s.as_bytes();
    let digits_from = |mut idx: usize| {
        while bytes.get(idx).is_some_and(u8::is_ascii_digit) {
            idx += 1;
        }
        idx
    };

    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let int_end = digits_from(end);
    let mut digit_count = int_end - end;
    end = int_end;

    if bytes.get(end) == Some(&b'.') {
        let frac_end = digits_from(end + 1);
        let frac_count = frac_end - (end + 1);
        if digit_count + frac_count > 0 {
            end = frac_end;
            digit_count += frac_count;
        }
    }
    if digit_count == 0 {
        return None;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_start = end + 1;
        if matches!(bytes.get(exp_start), Some(b'+' | b'-')) {
            exp_start += 1;
        }
        let exp_end = digits_from(exp_start);
        if exp_end > exp_start {
            end = exp_end;
        }
    }

    s[..end].parse::<f64>().ok()
}

#[cfg(test)]
#[path = "../tests/unit/form_tests.rs"]
mod tests;
