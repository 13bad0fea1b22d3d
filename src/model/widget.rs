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

//! Widget tree: the UI-side value holders a binding synchronizes
//!
//! Widgets are addressed by id. Groups and unions contain named children,
//! repeaters contain rows built from a row template.

use indexmap::IndexMap;

use super::value::{Value, ValueType};
use crate::error::{BindingError, BindingResult};

/// A node of the widget tree
#[derive(Debug, Clone, PartialEq)]
pub enum Widget {
    /// Scalar value holder
    Field(Field),
    /// Container of named children
    Group(Group),
    /// Ordered list of rows
    Repeater(Repeater),
    /// Variant container with one active case
    Union(Union),
}

/// Scalar value holder with an optional declared type
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    id: String,
    value_type: Option<ValueType>,
    value: Option<Value>,
}

impl Field {
    /// Create an untyped field
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            value_type: None,
            value: None,
        }
    }

    /// Create a field that only accepts values of `value_type`
    pub fn typed(id: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            id: id.into(),
            value_type: Some(value_type),
            value: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn value_type(&self) -> Option<ValueType> {
        self.value_type
    }

    /// Set the value, checking it against the declared type
    pub fn set_value(&mut self, value: Option<Value>) -> BindingResult<()> {
        if let (Some(expected), Some(offered)) = (self.value_type, value.as_ref()) {
            if offered.value_type() != expected {
                return Err(BindingError::TypeMismatch {
                    id: self.id.clone(),
                    expected: expected.to_string(),
                    actual: offered.value_type().to_string(),
                });
            }
        }
        self.value = value;
        Ok(())
    }
}

/// Container of named child widgets, also used for forms and repeater rows
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    id: String,
    children: IndexMap<String, Widget>,
}

impl Group {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            children: IndexMap::new(),
        }
    }

    /// Builder-style child registration
    pub fn with(mut self, child: impl Into<Widget>) -> Self {
        self.add(child);
        self
    }

    /// Add a child, replacing an existing child with the same id
    pub fn add(&mut self, child: impl Into<Widget>) {
        let child = child.into();
        self.children.insert(child.id().to_string(), child);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn child(&self, id: &str) -> Option<&Widget> {
        self.children.get(id)
    }

    pub fn child_mut(&mut self, id: &str) -> Option<&mut Widget> {
        self.children.get_mut(id)
    }

    pub fn children(&self) -> impl Iterator<Item = &Widget> {
        self.children.values()
    }

    pub fn children_mut(&mut self) -> impl Iterator<Item = &mut Widget> {
        self.children.values_mut()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// A repeater row and the model row index it was loaded from
#[derive(Debug, Clone, PartialEq)]
pub struct RepeaterRow {
    widget: Widget,
    origin: Option<usize>,
}

impl RepeaterRow {
    pub fn widget(&self) -> &Widget {
        &self.widget
    }

    /// Index of the model row this row was loaded from, `None` for rows added since
    pub fn origin(&self) -> Option<usize> {
        self.origin
    }
}

/// Ordered list of rows, each a group cloned from the row template
#[derive(Debug, Clone, PartialEq)]
pub struct Repeater {
    id: String,
    template: Group,
    rows: Vec<RepeaterRow>,
}

impl Repeater {
    /// Create an empty repeater whose rows contain `row_widgets`
    pub fn new(id: impl Into<String>, row_widgets: impl IntoIterator<Item = Widget>) -> Self {
        let mut template = Group::new("");
        for widget in row_widgets {
            template.add(widget);
        }
        Self {
            id: id.into(),
            template,
            rows: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn size(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, index: usize) -> Option<&Widget> {
        self.rows.get(index).map(|row| &row.widget)
    }

    pub fn row_mut(&mut self, index: usize) -> Option<&mut Widget> {
        self.rows.get_mut(index).map(|row| &mut row.widget)
    }

    pub fn rows(&self) -> impl Iterator<Item = &RepeaterRow> {
        self.rows.iter()
    }

    /// Append a fresh row built from the template
    pub fn add_row(&mut self) -> &mut Widget {
        self.push_row(None)
    }

    /// Append a fresh row that remembers the model row it mirrors
    pub fn add_loaded_row(&mut self, origin: usize) -> &mut Widget {
        self.push_row(Some(origin))
    }

    fn push_row(&mut self, origin: Option<usize>) -> &mut Widget {
        let mut row = self.template.clone();
        row.id = self.rows.len().to_string();
        self.rows.push(RepeaterRow {
            widget: Widget::Group(row),
            origin,
        });
        let last = self.rows.len() - 1;
        &mut self.rows[last].widget
    }

    /// Remove one row; later rows shift down and are renumbered
    pub fn remove_row(&mut self, index: usize) -> Option<Widget> {
        if index >= self.rows.len() {
            return None;
        }
        let removed = self.rows.remove(index);
        for (position, row) in self.rows.iter_mut().enumerate().skip(index) {
            if let Widget::Group(group) = &mut row.widget {
                group.id = position.to_string();
            }
        }
        Some(removed.widget)
    }

    /// Remove all rows
    pub fn remove_rows(&mut self) {
        self.rows.clear();
    }

    pub fn row_origin(&self, index: usize) -> Option<usize> {
        self.rows.get(index).and_then(|row| row.origin)
    }
}

/// Variant container: one child widget per case, one case active
#[derive(Debug, Clone, PartialEq)]
pub struct Union {
    id: String,
    case: Option<String>,
    cases: IndexMap<String, Widget>,
}

impl Union {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            case: None,
            cases: IndexMap::new(),
        }
    }

    /// Builder-style case registration; the case id is the widget id
    pub fn with_case(mut self, case_widget: impl Into<Widget>) -> Self {
        let widget = case_widget.into();
        self.cases.insert(widget.id().to_string(), widget);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Id of the active case
    pub fn case(&self) -> Option<&str> {
        self.case.as_deref()
    }

    /// Activate a case; unknown case ids are rejected
    pub fn set_case(&mut self, case: Option<String>) -> BindingResult<()> {
        if let Some(id) = &case {
            if !self.cases.contains_key(id) {
                return Err(BindingError::widget_not_found(format!("{}/{}", self.id, id)));
            }
        }
        self.case = case;
        Ok(())
    }

    pub fn case_widget(&self, case: &str) -> Option<&Widget> {
        self.cases.get(case)
    }

    pub fn case_widget_mut(&mut self, case: &str) -> Option<&mut Widget> {
        self.cases.get_mut(case)
    }

    pub fn cases(&self) -> impl Iterator<Item = &Widget> {
        self.cases.values()
    }
}

impl Widget {
    pub fn id(&self) -> &str {
        match self {
            Widget::Field(field) => field.id(),
            Widget::Group(group) => group.id(),
            Widget::Repeater(repeater) => repeater.id(),
            Widget::Union(union) => union.id(),
        }
    }

    /// Human readable kind, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Widget::Field(_) => "field",
            Widget::Group(_) => "group",
            Widget::Repeater(_) => "repeater",
            Widget::Union(_) => "union",
        }
    }

    /// Current value: the field value, or the active case id of a union
    pub fn value(&self) -> Option<Value> {
        match self {
            Widget::Field(field) => field.value().cloned(),
            Widget::Union(union) => union.case().map(Value::from),
            Widget::Group(_) | Widget::Repeater(_) => None,
        }
    }

    /// Set the value of a field, or the active case of a union
    pub fn set_value(&mut self, value: Option<Value>) -> BindingResult<()> {
        match self {
            Widget::Field(field) => field.set_value(value),
            Widget::Union(union) => match value {
                None => union.set_case(None),
                Some(Value::String(case)) if case.is_empty() => union.set_case(None),
                Some(Value::String(case)) => union.set_case(Some(case)),
                Some(other) => Err(BindingError::TypeMismatch {
                    id: union.id().to_string(),
                    expected: ValueType::String.to_string(),
                    actual: other.value_type().to_string(),
                }),
            },
            Widget::Group(_) | Widget::Repeater(_) => Err(BindingError::WrongWidgetKind {
                id: self.id().to_string(),
                expected: "value widget",
            }),
        }
    }

    /// Direct child by id; repeater rows are addressed by their index
    pub fn child(&self, id: &str) -> Option<&Widget> {
        match self {
            Widget::Group(group) => group.child(id),
            Widget::Union(union) => union.case_widget(id),
            Widget::Repeater(repeater) => id.parse::<usize>().ok().and_then(|index| repeater.row(index)),
            Widget::Field(_) => None,
        }
    }

    pub fn child_mut(&mut self, id: &str) -> Option<&mut Widget> {
        match self {
            Widget::Group(group) => group.child_mut(id),
            Widget::Union(union) => union.case_widget_mut(id),
            Widget::Repeater(repeater) => id
                .parse::<usize>()
                .ok()
                .and_then(move |index| repeater.row_mut(index)),
            Widget::Field(_) => None,
        }
    }

    /// Resolve a `/`-separated id path; empty segments and `.` stay in place
    pub fn lookup(&self, path: &str) -> Option<&Widget> {
        let mut current = self;
        for segment in path_segments(path) {
            current = current.child(segment)?;
        }
        Some(current)
    }

    pub fn lookup_mut(&mut self, path: &str) -> Option<&mut Widget> {
        let mut current = self;
        for segment in path_segments(path) {
            current = current.child_mut(segment)?;
        }
        Some(current)
    }

    pub fn as_group(&self) -> Option<&Group> {
        match self {
            Widget::Group(group) => Some(group),
            _ => None,
        }
    }

    pub fn as_group_mut(&mut self) -> Option<&mut Group> {
        match self {
            Widget::Group(group) => Some(group),
            _ => None,
        }
    }

    pub fn as_repeater(&self) -> Option<&Repeater> {
        match self {
            Widget::Repeater(repeater) => Some(repeater),
            _ => None,
        }
    }

    pub fn as_repeater_mut(&mut self) -> Option<&mut Repeater> {
        match self {
            Widget::Repeater(repeater) => Some(repeater),
            _ => None,
        }
    }

    pub fn as_union(&self) -> Option<&Union> {
        match self {
            Widget::Union(union) => Some(union),
            _ => None,
        }
    }

    pub fn as_union_mut(&mut self) -> Option<&mut Union> {
        match self {
            Widget::Union(union) => Some(union),
            _ => None,
        }
    }
}

fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty() && *s != ".")
}

impl From<Field> for Widget {
    fn from(field: Field) -> Self {
        Widget::Field(field)
    }
}

impl From<Group> for Widget {
    fn from(group: Group) -> Self {
        Widget::Group(group)
    }
}

impl From<Repeater> for Widget {
    fn from(repeater: Repeater) -> Self {
        Widget::Repeater(repeater)
    }
}

impl From<Union> for Widget {
    fn from(union: Union) -> Self {
        Widget::Union(union)
    }
}
