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

//! Repeater bindings that rewrite every model row on save

use super::{Binding, BindingRef, CommonAttributes, load_all, save_all, select_widget, select_widget_mut};
use crate::error::{BindingError, BindingResult};
use crate::model::{Repeater, Widget};
use crate::path::{Path, PathContext};

fn repeater<'w>(widget: &'w Widget, id: &str) -> BindingResult<&'w Repeater> {
    select_widget(widget, id)?
        .as_repeater()
        .ok_or_else(|| BindingError::WrongWidgetKind {
            id: id.to_string(),
            expected: "repeater",
        })
}

fn repeater_mut<'w>(widget: &'w mut Widget, id: &str) -> BindingResult<&'w mut Repeater> {
    match select_widget_mut(widget, id)? {
        Widget::Repeater(repeater) => Ok(repeater),
        _ => Err(BindingError::WrongWidgetKind {
            id: id.to_string(),
            expected: "repeater",
        }),
    }
}

/// Rows and paths shared by the simple and temp repeaters
#[derive(Debug)]
struct RowSet {
    repeater_id: String,
    parent_path: Path,
    row_path: Path,
    row_bindings: Vec<BindingRef>,
    clear_before_load: bool,
    delete_parent_if_empty: bool,
}

impl RowSet {
    fn load(&self, widget: &mut Widget, context: &mut PathContext<'_>) -> BindingResult<()> {
        let repeater = repeater_mut(widget, &self.repeater_id)?;
        if self.clear_before_load {
            repeater.remove_rows();
        }
        let Some(parent) = context.pointer(&self.parent_path)? else {
            return Ok(());
        };
        let mut parent_context = context.relative_context(parent);
        for (index, pointer) in parent_context
            .iterate_pointers(&self.row_path)?
            .into_iter()
            .enumerate()
        {
            let row = repeater.add_loaded_row(index);
            let mut row_context = parent_context.relative_context(pointer);
            load_all(&self.row_bindings, row, &mut row_context)?;
        }
        Ok(())
    }

    /// Remove the parent when the repeater is empty and that was asked for.
    /// Returns whether the save is complete.
    fn drop_empty_parent(&self, repeater: &Repeater, context: &mut PathContext<'_>) -> BindingResult<bool> {
        if !self.delete_parent_if_empty || repeater.size() > 0 {
            return Ok(false);
        }
        if context.pointer(&self.parent_path)?.is_some() {
            context.remove_path(&self.parent_path)?;
            log::debug!("Removed empty parent '{}' of '{}'", self.parent_path, self.repeater_id);
        }
        Ok(true)
    }
}

/// Repeater without identity: save replaces all model rows
#[derive(Debug)]
pub struct SimpleRepeaterBinding {
    common: CommonAttributes,
    rows: RowSet,
}

impl SimpleRepeaterBinding {
    pub fn new(
        common: CommonAttributes,
        repeater_id: impl Into<String>,
        parent_path: Path,
        row_path: Path,
        row_bindings: Vec<BindingRef>,
    ) -> Self {
        Self {
            common,
            rows: RowSet {
                repeater_id: repeater_id.into(),
                parent_path,
                row_path,
                row_bindings,
                clear_before_load: true,
                delete_parent_if_empty: false,
            },
        }
    }

    pub fn with_clear_before_load(mut self, clear: bool) -> Self {
        self.rows.clear_before_load = clear;
        self
    }

    pub fn with_delete_parent_if_empty(mut self, delete: bool) -> Self {
        self.rows.delete_parent_if_empty = delete;
        self
    }
}

impl Binding for SimpleRepeaterBinding {
    fn common(&self) -> &CommonAttributes {
        &self.common
    }

    fn do_load(&self, widget: &mut Widget, context: &mut PathContext<'_>) -> BindingResult<()> {
        self.rows.load(widget, context)
    }

    fn do_save(&self, widget: &Widget, context: &mut PathContext<'_>) -> BindingResult<()> {
        let rows = &self.rows;
        let repeater = repeater(widget, &rows.repeater_id)?;
        if rows.drop_empty_parent(repeater, context)? {
            return Ok(());
        }

        let parent = context.create_path(&rows.parent_path)?;
        let mut parent_context = context.relative_context(parent);
        let removed = parent_context.remove_all(&rows.row_path)?;
        log::debug!(
            "Simple repeater '{}': replacing {} rows with {}",
            rows.repeater_id,
            removed,
            repeater.size()
        );

        for (index, row) in repeater.rows().enumerate() {
            let pointer = parent_context.create_path(&rows.row_path.with_position(index + 1))?;
            let mut row_context = parent_context.relative_context(pointer);
            save_all(&rows.row_bindings, row.widget(), &mut row_context)?;
        }
        Ok(())
    }
}

/// Repeater that recreates its rows through an insert hook on every save
#[derive(Debug)]
pub struct TempRepeaterBinding {
    common: CommonAttributes,
    rows: RowSet,
    row_path_insert: Path,
    insert_row: Option<BindingRef>,
}

impl TempRepeaterBinding {
    pub fn new(
        common: CommonAttributes,
        repeater_id: impl Into<String>,
        parent_path: Path,
        row_path: Path,
        row_bindings: Vec<BindingRef>,
    ) -> Self {
        Self {
            common,
            row_path_insert: row_path.clone(),
            rows: RowSet {
                repeater_id: repeater_id.into(),
                parent_path,
                row_path,
                row_bindings,
                clear_before_load: true,
                delete_parent_if_empty: false,
            },
            insert_row: None,
        }
    }

    pub fn with_row_path_insert(mut self, path: Path) -> Self {
        self.row_path_insert = path;
        self
    }

    pub fn with_insert_row(mut self, binding: BindingRef) -> Self {
        self.insert_row = Some(binding);
        self
    }

    pub fn with_clear_before_load(mut self, clear: bool) -> Self {
        self.rows.clear_before_load = clear;
        self
    }

    pub fn with_delete_parent_if_empty(mut self, delete: bool) -> Self {
        self.rows.delete_parent_if_empty = delete;
        self
    }
}

impl Binding for TempRepeaterBinding {
    fn common(&self) -> &CommonAttributes {
        &self.common
    }

    fn do_load(&self, widget: &mut Widget, context: &mut PathContext<'_>) -> BindingResult<()> {
        self.rows.load(widget, context)
    }

    fn do_save(&self, widget: &Widget, context: &mut PathContext<'_>) -> BindingResult<()> {
        let rows = &self.rows;
        let repeater = repeater(widget, &rows.repeater_id)?;
        if rows.drop_empty_parent(repeater, context)? {
            return Ok(());
        }

        let parent = context.create_path(&rows.parent_path)?;
        let mut parent_context = context.relative_context(parent);
        parent_context.remove_all(&rows.row_path)?;

        for (index, row) in repeater.rows().enumerate() {
            if let Some(insert_row) = &self.insert_row {
                insert_row.save(row.widget(), &mut parent_context)?;
            }
            let pointer = parent_context.create_path(&self.row_path_insert.with_position(index + 1))?;
            let mut row_context = parent_context.relative_context(pointer);
            save_all(&rows.row_bindings, row.widget(), &mut row_context)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ElementTemplate, JsonModel, NodeTemplate, XmlDocument};
    use crate::binding::{FieldSpec, InsertNodeBinding, ValueBinding};
    use crate::model::{Field, Group, Value};
    use serde_json::json;
    use std::sync::Arc;

    fn path(text: &str) -> Path {
        Path::parse(text).unwrap()
    }

    fn value(id: &str, at: &str) -> BindingRef {
        Arc::new(ValueBinding::new(CommonAttributes::default(), FieldSpec::new(id, path(at))))
    }

    fn form() -> Widget {
        Group::new("form")
            .with(Repeater::new("tags", [Field::new("tag").into()]))
            .into()
    }

    fn set_tags(form: &mut Widget, tags: &[&str]) {
        let repeater = form.lookup_mut("tags").and_then(Widget::as_repeater_mut).unwrap();
        repeater.remove_rows();
        for tag in tags {
            repeater
                .add_row()
                .lookup_mut("tag")
                .unwrap()
                .set_value(Some(Value::from(*tag)))
                .unwrap();
        }
    }

    #[test]
    fn test_simple_repeater_replaces_rows() {
        let mut model = XmlDocument::parse(
            "m.xml",
            "<doc><tags><t>a</t><t>b</t><t>c</t></tags></doc>",
        )
        .unwrap();
        let binding = SimpleRepeaterBinding::new(
            CommonAttributes::default(),
            "tags",
            path("tags"),
            path("t"),
            vec![value("tag", ".")],
        );
        let mut form = form();
        binding.load_form_from_model(&mut form, &mut model).unwrap();
        assert_eq!(form.lookup("tags").and_then(Widget::as_repeater).map(Repeater::size), Some(3));

        set_tags(&mut form, &["x", "y"]);
        binding.save_form_to_model(&form, &mut model).unwrap();
        assert_eq!(model.to_xml_string(), "<doc><tags><t>x</t><t>y</t></tags></doc>");
    }

    #[test]
    fn test_simple_repeater_drops_empty_parent() {
        let mut model = XmlDocument::parse("m.xml", "<doc><tags><t>a</t></tags></doc>").unwrap();
        let binding = SimpleRepeaterBinding::new(
            CommonAttributes::default(),
            "tags",
            path("tags"),
            path("t"),
            vec![value("tag", ".")],
        )
        .with_delete_parent_if_empty(true);
        binding.save_form_to_model(&form(), &mut model).unwrap();
        assert_eq!(model.to_xml_string(), "<doc/>");
    }

    #[test]
    fn test_load_without_clearing_appends() {
        let mut model = JsonModel::new(json!({"tags": {"t": ["a", "b"]}}));
        let binding = SimpleRepeaterBinding::new(
            CommonAttributes::default(),
            "tags",
            path("tags"),
            path("t"),
            vec![value("tag", ".")],
        )
        .with_clear_before_load(false);
        let mut form = form();
        set_tags(&mut form, &["kept"]);
        binding.load_form_from_model(&mut form, &mut model).unwrap();
        let repeater = form.lookup("tags").and_then(Widget::as_repeater).unwrap();
        assert_eq!(repeater.size(), 3);
        assert_eq!(
            repeater.row(2).and_then(|row| row.lookup("tag")).and_then(Widget::value),
            Some(Value::from("b"))
        );
    }

    #[test]
    fn test_temp_repeater_uses_insert_hook() {
        let mut model = XmlDocument::parse("m.xml", "<doc><item n=\"old\"/></doc>").unwrap();
        let template = ElementTemplate::parse("<item/>").unwrap();
        let binding = TempRepeaterBinding::new(
            CommonAttributes::default(),
            "tags",
            path("."),
            path("item"),
            vec![value("tag", "@n")],
        )
        .with_insert_row(Arc::new(InsertNodeBinding::new(
            CommonAttributes::default(),
            NodeTemplate::Element(template),
        )));
        let mut form = form();
        set_tags(&mut form, &["p", "q"]);
        binding.save_form_to_model(&form, &mut model).unwrap();
        assert_eq!(model.to_xml_string(), r#"<doc><item n="p"/><item n="q"/></doc>"#);
    }
}
