use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::form::{
    ActiveFieldSet, ControlDescriptor, ControlKind, EncodedSubmission, FormError,
    IntegerOperator, RawControl, RawValue, encode_submission, render_field_control, render_form,
};
use crate::schema::{Category, EntitySchema};

/// Editable value behind one rendered control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldInput {
    OperatorNumber {
        operator: IntegerOperator,
        number: String,
    },
    Toggle {
        checked: bool,
    },
    SingleChoice {
        options: Vec<String>,
        selected: usize,
    },
    MultiChoice {
        options: Vec<String>,
        highlighted: usize,
        chosen: BTreeSet<usize>,
    },
    Text {
        value: String,
        multiline: bool,
    },
}

impl FieldInput {
    pub fn for_control(control: &ControlDescriptor) -> Self {
        match &control.kind {
            ControlKind::OperatorNumber { operators, .. } => FieldInput::OperatorNumber {
                operator: operators[0],
                number: String::new(),
            },
            ControlKind::Toggle => FieldInput::Toggle { checked: false },
            ControlKind::SingleChoice { options } => FieldInput::SingleChoice {
                options: options.clone(),
                selected: 0,
            },
            ControlKind::MultiChoice { options } => FieldInput::MultiChoice {
                options: options.clone(),
                highlighted: 0,
                chosen: BTreeSet::new(),
            },
            ControlKind::SingleLineText => FieldInput::Text {
                value: String::new(),
                multiline: false,
            },
            ControlKind::MultiLineText => FieldInput::Text {
                value: String::new(),
                multiline: true,
            },
        }
    }

    /// The integer control submits its operator and its number under the same
    /// name, so the number is what lands in the query.
    pub fn raw_controls(&self, input_name: &str) -> Vec<RawControl> {
        match self {
            FieldInput::OperatorNumber { operator, number } => vec![
                RawControl::new(input_name, RawValue::SelectOne(operator.value().to_string())),
                RawControl::new(input_name, RawValue::Number(number.clone())),
            ],
            FieldInput::Toggle { checked } => {
                vec![RawControl::new(input_name, RawValue::Checkbox(*checked))]
            }
            FieldInput::SingleChoice { options, selected } => options
                .get(*selected)
                .map(|option| RawControl::new(input_name, RawValue::SelectOne(option.clone())))
                .into_iter()
                .collect(),
            FieldInput::MultiChoice {
                options, chosen, ..
            } => vec![RawControl::new(
                input_name,
                RawValue::SelectMultiple(
                    chosen
                        .iter()
                        .filter_map(|idx| options.get(*idx).cloned())
                        .collect(),
                ),
            )],
            FieldInput::Text { value, .. } => {
                vec![RawControl::new(input_name, RawValue::Text(value.clone()))]
            }
        }
    }

    pub fn cycle(&mut self, forward: bool) {
        match self {
            FieldInput::OperatorNumber { operator, .. } => *operator = operator.cycled(forward),
            FieldInput::SingleChoice { options, selected } => {
                *selected = cycled_index(*selected, options.len(), forward);
            }
            FieldInput::MultiChoice {
                options,
                highlighted,
                ..
            } => *highlighted = cycled_index(*highlighted, options.len(), forward),
            FieldInput::Toggle { checked } => *checked = !*checked,
            FieldInput::Text { .. } => {}
        }
    }

    /// Space/Enter on a toggle or a multi-choice entry.
    pub fn activate(&mut self) {
        match self {
            FieldInput::Toggle { checked } => *checked = !*checked,
            FieldInput::MultiChoice {
                options,
                highlighted,
                chosen,
            } => {
                if *highlighted < options.len() && !chosen.remove(&*highlighted) {
                    chosen.insert(*highlighted);
                }
            }
            FieldInput::OperatorNumber { .. }
            | FieldInput::SingleChoice { .. }
            | FieldInput::Text { .. } => {}
        }
    }

    pub fn accepts_text(&self) -> bool {
        matches!(
            self,
            FieldInput::OperatorNumber { .. } | FieldInput::Text { .. }
        )
    }

    pub fn input_char(&mut self, c: char) {
        match self {
            FieldInput::OperatorNumber { number, .. } => {
                if c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E') {
                    number.push(c);
                }
            }
            FieldInput::Text { value, multiline } => {
                if c != '\n' || *multiline {
                    value.push(c);
                }
            }
            FieldInput::Toggle { .. }
            | FieldInput::SingleChoice { .. }
            | FieldInput::MultiChoice { .. } => {}
        }
    }

    pub fn backspace(&mut self) {
        match self {
            FieldInput::OperatorNumber { number: text, .. } | FieldInput::Text { value: text, .. } => {
                text.pop();
            }
            FieldInput::Toggle { .. }
            | FieldInput::SingleChoice { .. }
            | FieldInput::MultiChoice { .. } => {}
        }
    }

    pub fn flag(&self) -> Option<bool> {
        match self {
            FieldInput::Toggle { checked } => Some(*checked),
            _ => None,
        }
    }

    pub fn display_value(&self) -> String {
        match self {
            FieldInput::OperatorNumber { operator, number } => {
                format!("[{}] {}", operator.label(), number)
            }
            FieldInput::Toggle { checked: true } => "[x]".to_string(),
            FieldInput::Toggle { checked: false } => "[ ]".to_string(),
            FieldInput::SingleChoice { options, selected } => {
                format!("< {} >", options.get(*selected).map_or("", String::as_str))
            }
            FieldInput::MultiChoice {
                options,
                highlighted,
                chosen,
            } => options
                .iter()
                .enumerate()
                .map(|(idx, option)| {
                    let mark = if chosen.contains(&idx) { "x" } else { " " };
                    let cursor = if idx == *highlighted { ">" } else { "" };
                    format!("{cursor}[{mark}] {option}")
                })
                .collect::<Vec<_>>()
                .join("  "),
            FieldInput::Text { value, .. } => value.clone(),
        }
    }
}

fn cycled_index(current: usize, len: usize, forward: bool) -> usize {
    if len == 0 {
        return 0;
    }
    if forward {
        (current + 1) % len
    } else {
        (current + len - 1) % len
    }
}

#[derive(Debug)]
pub struct FormRow<'a> {
    pub control: Result<ControlDescriptor, FormError>,
    pub input: Option<&'a FieldInput>,
    pub enabled: bool,
}

/// Per-category form state: the active field list plus the values typed
/// into each control, kept index-aligned with the active list.
#[derive(Debug, Clone, Default)]
pub struct QueryForm {
    active: ActiveFieldSet,
    inputs: BTreeMap<Category, Vec<Option<FieldInput>>>,
    picker: BTreeMap<Category, usize>,
}

impl QueryForm {
    pub fn active_fields(&self) -> &ActiveFieldSet {
        &self.active
    }

    pub fn field_count(&self, category: Category) -> usize {
        self.active.fields(category).len()
    }

    pub fn add_field(&mut self, schema: &EntitySchema, category: Category, field_name: &str) {
        let idx = self.active.add_field(category, field_name);
        let input = schema.input_field(field_name).map(|field| {
            FieldInput::for_control(&render_field_control(
                field,
                schema.is_required(field_name),
            ))
        });
        let inputs = self.inputs.entry(category).or_default();
        inputs.insert(idx.min(inputs.len()), input);
        debug!(category = category.label(), field = field_name, "form field added");
    }

    pub fn remove_field(&mut self, category: Category, field_name: &str) -> Option<usize> {
        let idx = self.active.remove_field(category, field_name)?;
        if let Some(inputs) = self.inputs.get_mut(&category) {
            if idx < inputs.len() {
                inputs.remove(idx);
            }
        }
        debug!(category = category.label(), field = field_name, "form field removed");
        Some(idx)
    }

    pub fn input(&self, category: Category, idx: usize) -> Option<&FieldInput> {
        self.inputs.get(&category)?.get(idx)?.as_ref()
    }

    pub fn input_mut(&mut self, category: Category, idx: usize) -> Option<&mut FieldInput> {
        self.inputs.get_mut(&category)?.get_mut(idx)?.as_mut()
    }

    fn flag(&self, category: Category, field_name: &str) -> Option<bool> {
        self.active
            .fields(category)
            .iter()
            .enumerate()
            .filter(|(_, name)| name.as_str() == field_name)
            .filter_map(|(idx, _)| self.input(category, idx).and_then(FieldInput::flag))
            .last()
    }

    pub fn rows(&self, schema: &EntitySchema, category: Category) -> Vec<FormRow<'_>> {
        render_form(schema, self.active.fields(category))
            .into_iter()
            .enumerate()
            .map(|(idx, control)| {
                let enabled = match &control {
                    Ok(control) => control.enabled_when.as_ref().is_none_or(|condition| {
                        condition.is_satisfied(|name| self.flag(category, name))
                    }),
                    Err(_) => false,
                };
                FormRow {
                    control,
                    input: self.input(category, idx),
                    enabled,
                }
            })
            .collect()
    }

    pub fn raw_controls(&self, schema: &EntitySchema, category: Category) -> Vec<RawControl> {
        self.rows(schema, category)
            .into_iter()
            .filter_map(|row| {
                let control = row.control.ok()?;
                Some(row.input?.raw_controls(&control.input_name))
            })
            .flatten()
            .collect()
    }

    pub fn encode(
        &self,
        schema: &EntitySchema,
        category: Category,
    ) -> Result<EncodedSubmission, FormError> {
        encode_submission(&self.raw_controls(schema, category))
    }

    pub fn picked_field<'s>(&self, schema: &'s EntitySchema, category: Category) -> Option<&'s str> {
        let idx = self.picker.get(&category).copied().unwrap_or(0);
        schema.input_field_names().nth(idx)
    }

    pub fn cycle_picker(&mut self, schema: &EntitySchema, category: Category, forward: bool) {
        let len = schema.input_fields.len();
        let current = self.picker.entry(category).or_insert(0);
        *current = cycled_index(*current, len, forward);
    }

    pub fn add_picked_field(&mut self, schema: &EntitySchema, category: Category) -> Option<String> {
        let name = self.picked_field(schema, category)?.to_string();
        self.add_field(schema, category, &name);
        Some(name)
    }
}

#[cfg(test)]
#[path = "../tests/unit/query_form_tests.rs"]
mod tests;
