// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! JSON views of widget trees
//!
//! A *shape* describes a widget tree: objects are groups, a one-element array is
//! a repeater whose element is the row shape, strings name field types
//! (`"string"`, `"integer"`, ..., or `"any"` for an untyped field) and an object
//! with a `"$union"` member is a union whose cases are that member's entries.
//! Widget values render to JSON in the same layout.

use serde_json::{Map, Value as JsonValue};

use super::value::{Value, ValueType};
use super::widget::{Field, Group, Repeater, Union, Widget};
use crate::error::{BindingError, BindingResult};

const UNION_KEY: &str = "$union";
const CASE_KEY: &str = "$case";

impl Widget {
    /// Build a widget tree from a shape description
    pub fn from_shape(id: &str, shape: &JsonValue) -> BindingResult<Widget> {
        match shape {
            JsonValue::String(type_name) if type_name == "any" => Ok(Field::new(id).into()),
            JsonValue::String(type_name) => {
                let value_type = type_name
                    .parse::<ValueType>()
                    .map_err(|message| BindingError::configuration(message, None))?;
                Ok(Field::typed(id, value_type).into())
            }
            JsonValue::Array(items) => match items.as_slice() {
                [JsonValue::Object(row)] => {
                    let mut widgets = Vec::with_capacity(row.len());
                    for (child_id, child_shape) in row {
                        widgets.push(Widget::from_shape(child_id, child_shape)?);
                    }
                    Ok(Repeater::new(id, widgets).into())
                }
                _ => Err(BindingError::configuration(
                    format!("Repeater shape '{id}' must hold exactly one row object"),
                    None,
                )),
            },
            JsonValue::Object(members) => match members.get(UNION_KEY) {
                Some(JsonValue::Object(cases)) => {
                    let mut union = Union::new(id);
                    for (case_id, case_shape) in cases {
                        union = union.with_case(Widget::from_shape(case_id, case_shape)?);
                    }
                    Ok(union.into())
                }
                Some(_) => Err(BindingError::configuration(
                    format!("Union shape '{id}' must map case ids to shapes"),
                    None,
                )),
                None => {
                    let mut group = Group::new(id);
                    for (child_id, child_shape) in members {
                        group.add(Widget::from_shape(child_id, child_shape)?);
                    }
                    Ok(group.into())
                }
            },
            other => Err(BindingError::configuration(
                format!("Unsupported shape for '{id}': {other}"),
                None,
            )),
        }
    }

    /// Render the widget values as JSON
    pub fn to_json(&self) -> JsonValue {
        match self {
            Widget::Field(field) => field.value().map(Value::to_json).unwrap_or(JsonValue::Null),
            Widget::Group(group) => {
                let members: Map<String, JsonValue> = group
                    .children()
                    .map(|child| (child.id().to_string(), child.to_json()))
                    .collect();
                JsonValue::Object(members)
            }
            Widget::Repeater(repeater) => {
                JsonValue::Array(repeater.rows().map(|row| row.widget().to_json()).collect())
            }
            Widget::Union(union) => {
                let mut members = Map::new();
                members.insert(
                    CASE_KEY.to_string(),
                    union
                        .case()
                        .map(|c| JsonValue::String(c.to_string()))
                        .unwrap_or(JsonValue::Null),
                );
                for case in union.cases() {
                    members.insert(case.id().to_string(), case.to_json());
                }
                JsonValue::Object(members)
            }
        }
    }

    /// Apply user edits given in the JSON value layout.
    ///
    /// Members missing from `values` are left untouched. Repeater arrays replace
    /// the row list: surplus rows are removed from the end, new rows appended, and
    /// the rows that stay keep their load origin.
    pub fn apply_json(&mut self, values: &JsonValue) -> BindingResult<()> {
        match self {
            Widget::Field(field) => {
                let value = json_to_field_value(field.value_type(), values);
                field.set_value(value)
            }
            Widget::Group(group) => {
                let members = expect_object(group.id(), values)?;
                for (child_id, child_values) in members {
                    let child = group
                        .child_mut(child_id)
                        .ok_or_else(|| BindingError::widget_not_found(child_id.clone()))?;
                    child.apply_json(child_values)?;
                }
                Ok(())
            }
            Widget::Repeater(repeater) => {
                let JsonValue::Array(rows) = values else {
                    return Err(BindingError::WrongWidgetKind {
                        id: repeater.id().to_string(),
                        expected: "repeater value array",
                    });
                };
                while repeater.size() > rows.len() {
                    repeater.remove_row(repeater.size() - 1);
                }
                while repeater.size() < rows.len() {
                    repeater.add_row();
                }
                for (index, row_values) in rows.iter().enumerate() {
                    if let Some(row) = repeater.row_mut(index) {
                        row.apply_json(row_values)?;
                    }
                }
                Ok(())
            }
            Widget::Union(union) => {
                let members = expect_object(union.id(), values)?;
                if let Some(case) = members.get(CASE_KEY) {
                    union.set_case(case.as_str().map(str::to_string))?;
                }
                for (case_id, case_values) in members.iter().filter(|(k, _)| *k != CASE_KEY) {
                    let case = union
                        .case_widget_mut(case_id)
                        .ok_or_else(|| BindingError::widget_not_found(case_id.clone()))?;
                    case.apply_json(case_values)?;
                }
                Ok(())
            }
        }
    }
}

fn expect_object<'a>(id: &str, values: &'a JsonValue) -> BindingResult<&'a Map<String, JsonValue>> {
    values.as_object().ok_or_else(|| BindingError::WrongWidgetKind {
        id: id.to_string(),
        expected: "container value object",
    })
}

fn json_to_field_value(value_type: Option<ValueType>, json: &JsonValue) -> Option<Value> {
    let value = Value::from_json(json)?;
    match (value_type, &value) {
        (Some(expected), Value::String(text)) if expected != ValueType::String => {
            expected.parse_canonical(text).or(Some(value))
        }
        (Some(ValueType::Decimal), Value::Integer(i)) => Some(Value::Decimal((*i).into())),
        _ => Some(value),
    }
}
