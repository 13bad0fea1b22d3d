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

//! Repeater binding: keeps a list of model rows in step with repeater rows
//!
//! Loading replaces the repeater rows with one row per model row. Saving runs
//! a three-way diff: form rows are matched against model rows, matched model
//! rows are updated, unmatched model rows are deleted and unmatched form rows
//! are inserted. Deletions run before insertions and in reverse document
//! order, so the positional pointers of the rows still to visit stay valid.
//!
//! Rows are matched either by identity values (the default) or by the model
//! row index each form row remembers from the last load.

use super::{Binding, BindingRef, CommonAttributes, FieldSpec, load_all, save_all, select_widget, select_widget_mut};
use crate::error::{BindingError, BindingResult};
use crate::model::{Repeater, Value, Widget, same_value};
use crate::path::{Path, PathContext, Pointer};

/// How form rows find the model row they mirror
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowMatching {
    /// Compare identity values
    #[default]
    Identity,
    /// Use the model row index recorded when the row was loaded
    LoadOrigin,
}

/// Outcome of matching form rows against model rows
#[derive(Debug, Default, PartialEq, Eq)]
struct RowPlan {
    /// `(form row, model row)` pairs to update
    updates: Vec<(usize, usize)>,
    /// Model rows to delete, ascending
    deletes: Vec<usize>,
    /// Form rows to insert, in form order
    inserts: Vec<usize>,
}

/// Identity values of one row
type Identity = Vec<Option<Value>>;

fn is_all_null(identity: &Identity) -> bool {
    identity
        .iter()
        .all(|value| value.as_ref().is_none_or(Value::is_empty_string))
}

fn same_identity(left: &Identity, right: &Identity) -> bool {
    left.len() == right.len()
        && left
            .iter()
            .zip(right)
            .all(|(a, b)| same_value(a.as_ref(), b.as_ref()))
}

/// Binds a repeater widget to the rows below a parent node
#[derive(Debug)]
pub struct RepeaterBinding {
    common: CommonAttributes,
    repeater_id: String,
    parent_path: Path,
    row_path: Path,
    row_path_insert: Path,
    identity: Vec<BindingRef>,
    row_bindings: Vec<BindingRef>,
    insert_row: Option<BindingRef>,
    delete_row: Option<BindingRef>,
    matching: RowMatching,
}

impl RepeaterBinding {
    pub fn new(
        common: CommonAttributes,
        repeater_id: impl Into<String>,
        parent_path: Path,
        row_path: Path,
    ) -> Self {
        Self {
            common,
            repeater_id: repeater_id.into(),
            parent_path,
            row_path_insert: row_path.clone(),
            row_path,
            identity: Vec::new(),
            row_bindings: Vec::new(),
            insert_row: None,
            delete_row: None,
            matching: RowMatching::default(),
        }
    }

    /// Path of newly inserted rows, when it differs from the row path
    pub fn with_row_path_insert(mut self, path: Path) -> Self {
        self.row_path_insert = path;
        self
    }

    /// Value bindings whose values identify a row
    pub fn with_identity(mut self, identity: Vec<BindingRef>) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_row_bindings(mut self, bindings: Vec<BindingRef>) -> Self {
        self.row_bindings = bindings;
        self
    }

    pub fn with_insert_row(mut self, binding: BindingRef) -> Self {
        self.insert_row = Some(binding);
        self
    }

    pub fn with_delete_row(mut self, binding: BindingRef) -> Self {
        self.delete_row = Some(binding);
        self
    }

    pub fn with_matching(mut self, matching: RowMatching) -> Self {
        self.matching = matching;
        self
    }

    pub fn repeater_id(&self) -> &str {
        &self.repeater_id
    }

    fn repeater<'w>(&self, widget: &'w Widget) -> BindingResult<&'w Repeater> {
        select_widget(widget, &self.repeater_id)?
            .as_repeater()
            .ok_or_else(|| self.not_a_repeater())
    }

    fn repeater_mut<'w>(&self, widget: &'w mut Widget) -> BindingResult<&'w mut Repeater> {
        match select_widget_mut(widget, &self.repeater_id)? {
            Widget::Repeater(repeater) => Ok(repeater),
            _ => Err(self.not_a_repeater()),
        }
    }

    fn not_a_repeater(&self) -> BindingError {
        BindingError::WrongWidgetKind {
            id: self.repeater_id.clone(),
            expected: "repeater",
        }
    }

    fn identity_fields(&self) -> BindingResult<Vec<&FieldSpec>> {
        self.identity
            .iter()
            .map(|binding| {
                binding.field_spec().ok_or_else(|| {
                    BindingError::configuration(
                        format!(
                            "Identity of repeater '{}' may only contain value bindings",
                            self.repeater_id
                        ),
                        self.common.location.clone(),
                    )
                })
            })
            .collect()
    }

    fn form_identity(fields: &[&FieldSpec], row: &Widget) -> BindingResult<Identity> {
        fields.iter().map(|field| field.widget_value(row)).collect()
    }

    fn model_identities(
        fields: &[&FieldSpec],
        rows: &[Pointer],
        parent: &mut PathContext<'_>,
    ) -> BindingResult<Vec<Identity>> {
        let mut identities = Vec::with_capacity(rows.len());
        for pointer in rows {
            let row_context = parent.relative_context(pointer.clone());
            let identity = fields
                .iter()
                .map(|field| field.read_optional(&row_context))
                .collect::<BindingResult<Identity>>()?;
            identities.push(identity);
        }
        Ok(identities)
    }

    fn match_by_identity(
        &self,
        repeater: &Repeater,
        rows: &[Pointer],
        parent: &mut PathContext<'_>,
    ) -> BindingResult<RowPlan> {
        let fields = self.identity_fields()?;
        if fields.is_empty() {
            log::warn!(
                "Repeater '{}' has no identity; every row is replaced on save",
                self.repeater_id
            );
        }
        let model_identities = Self::model_identities(&fields, rows, parent)?;

        let mut plan = RowPlan::default();
        let mut claimed = vec![false; rows.len()];
        let mut updated: Vec<Identity> = Vec::new();
        let mut pending: Vec<Identity> = Vec::new();

        for (form_index, row) in repeater.rows().enumerate() {
            let identity = Self::form_identity(&fields, row.widget())?;
            if is_all_null(&identity) {
                plan.inserts.push(form_index);
                continue;
            }
            // Equal identities claim equal model rows in document order
            let candidates: Vec<usize> = model_identities
                .iter()
                .enumerate()
                .filter(|(_, candidate)| same_identity(candidate, &identity))
                .map(|(index, _)| index)
                .collect();
            let found = candidates
                .iter()
                .copied()
                .find(|&index| !claimed[index])
                .or_else(|| candidates.first().copied());
            match found {
                Some(model_index) => {
                    claimed[model_index] = true;
                    plan.updates.push((form_index, model_index));
                    if !updated.iter().any(|other| same_identity(other, &identity)) {
                        updated.push(identity);
                    }
                }
                None if pending.iter().any(|other| same_identity(other, &identity)) => {
                    log::warn!(
                        "Repeater '{}' row {} repeats new identity {:?}; row skipped",
                        self.repeater_id,
                        form_index,
                        identity
                    );
                }
                None => {
                    plan.inserts.push(form_index);
                    pending.push(identity);
                }
            }
        }

        plan.deletes = model_identities
            .iter()
            .enumerate()
            .filter(|(_, identity)| !updated.iter().any(|kept| same_identity(kept, identity)))
            .map(|(index, _)| index)
            .collect();
        Ok(plan)
    }

    fn match_by_origin(&self, repeater: &Repeater, model_rows: usize) -> RowPlan {
        let mut plan = RowPlan::default();
        let mut claimed = vec![false; model_rows];

        for (form_index, row) in repeater.rows().enumerate() {
            match row.origin() {
                Some(origin) if origin < model_rows && !claimed[origin] => {
                    claimed[origin] = true;
                    plan.updates.push((form_index, origin));
                }
                Some(origin) => {
                    log::warn!(
                        "Repeater '{}' row {} came from model row {} which is gone or taken; inserting",
                        self.repeater_id,
                        form_index,
                        origin
                    );
                    plan.inserts.push(form_index);
                }
                None => plan.inserts.push(form_index),
            }
        }

        plan.deletes = unclaimed(&claimed);
        plan
    }

    fn bind_row(&self, row: &Widget, row_context: &mut PathContext<'_>, with_identity: bool) -> BindingResult<()> {
        if with_identity {
            save_all(&self.identity, row, row_context)?;
        }
        save_all(&self.row_bindings, row, row_context)
    }
}

fn unclaimed(claimed: &[bool]) -> Vec<usize> {
    claimed
        .iter()
        .enumerate()
        .filter(|(_, taken)| !**taken)
        .map(|(index, _)| index)
        .collect()
}

impl Binding for RepeaterBinding {
    fn common(&self) -> &CommonAttributes {
        &self.common
    }

    fn do_load(&self, widget: &mut Widget, context: &mut PathContext<'_>) -> BindingResult<()> {
        let repeater = self.repeater_mut(widget)?;
        repeater.remove_rows();

        let Some(parent) = context.pointer(&self.parent_path)? else {
            log::debug!("Repeater '{}': no parent at '{}'", self.repeater_id, self.parent_path);
            return Ok(());
        };
        let mut parent_context = context.relative_context(parent);
        let rows = parent_context.iterate_pointers(&self.row_path)?;

        for (index, pointer) in rows.into_iter().enumerate() {
            let row = repeater.add_loaded_row(index);
            let mut row_context = parent_context.relative_context(pointer);
            load_all(&self.identity, row, &mut row_context)?;
            load_all(&self.row_bindings, row, &mut row_context)?;
        }
        log::debug!("Repeater '{}' loaded {} rows", self.repeater_id, repeater.size());
        Ok(())
    }

    fn do_save(&self, widget: &Widget, context: &mut PathContext<'_>) -> BindingResult<()> {
        let repeater = self.repeater(widget)?;
        let parent = context.create_path(&self.parent_path)?;
        let mut parent_context = context.relative_context(parent);
        let rows = parent_context.iterate_pointers(&self.row_path)?;

        let plan = match self.matching {
            RowMatching::Identity => self.match_by_identity(repeater, &rows, &mut parent_context)?,
            RowMatching::LoadOrigin => self.match_by_origin(repeater, rows.len()),
        };
        log::debug!(
            "Repeater '{}': {} updated, {} deleted, {} inserted",
            self.repeater_id,
            plan.updates.len(),
            plan.deletes.len(),
            plan.inserts.len()
        );

        for &(form_index, model_index) in &plan.updates {
            let Some(row) = repeater.row(form_index) else {
                continue;
            };
            let mut row_context = parent_context.relative_context(rows[model_index].clone());
            self.bind_row(row, &mut row_context, false)?;
        }

        if !plan.deletes.is_empty() {
            match &self.delete_row {
                Some(delete_row) => {
                    for &model_index in plan.deletes.iter().rev() {
                        let mut row_context = parent_context.relative_context(rows[model_index].clone());
                        delete_row.save(widget, &mut row_context)?;
                    }
                }
                None => log::warn!(
                    "Repeater '{}' has {} rows to delete but no on-delete-row binding; rows kept",
                    self.repeater_id,
                    plan.deletes.len()
                ),
            }
        }

        if plan.inserts.is_empty() {
            return Ok(());
        }
        let Some(insert_row) = &self.insert_row else {
            log::warn!(
                "Repeater '{}' has {} rows to insert but no on-insert-row binding; rows skipped",
                self.repeater_id,
                plan.inserts.len()
            );
            return Ok(());
        };

        let existing = parent_context.iterate_pointers(&self.row_path_insert)?.len();
        for (k, &form_index) in plan.inserts.iter().enumerate() {
            let Some(row) = repeater.row(form_index) else {
                continue;
            };
            insert_row.save(row, &mut parent_context)?;
            let position = existing + k + 1;
            let pointer = parent_context.create_path(&self.row_path_insert.with_position(position))?;
            let mut row_context = parent_context.relative_context(pointer);
            self.bind_row(row, &mut row_context, true)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ElementTemplate, NodeTemplate, XmlDocument};
    use crate::binding::{DeleteNodeBinding, InsertNodeBinding, ValueBinding};
    use crate::model::{Field, Group};
    use std::sync::Arc;

    fn path(text: &str) -> Path {
        Path::parse(text).unwrap()
    }

    fn value(id: &str, at: &str) -> BindingRef {
        Arc::new(ValueBinding::new(CommonAttributes::default(), FieldSpec::new(id, path(at))))
    }

    fn binding() -> RepeaterBinding {
        let template = ElementTemplate::parse("<row/>").unwrap();
        RepeaterBinding::new(CommonAttributes::default(), "items", path("."), path("row"))
            .with_identity(vec![value("id", "@id")])
            .with_row_bindings(vec![value("name", "name")])
            .with_insert_row(Arc::new(InsertNodeBinding::new(
                CommonAttributes::default(),
                NodeTemplate::Element(template),
            )))
            .with_delete_row(Arc::new(DeleteNodeBinding::new(CommonAttributes::default())))
    }

    fn form() -> Widget {
        Group::new("form")
            .with(Repeater::new(
                "items",
                [Field::new("id").into(), Field::new("name").into()],
            ))
            .into()
    }

    fn rows(form: &mut Widget) -> &mut Repeater {
        form.lookup_mut("items").and_then(Widget::as_repeater_mut).unwrap()
    }

    fn set(row: &mut Widget, id: &str, value: Option<&str>) {
        row.lookup_mut(id).unwrap().set_value(value.map(Value::from)).unwrap();
    }

    const MODEL: &str = r#"<rows><row id="1"><name>a</name></row><row id="2"><name>b</name></row><row id="3"><name>c</name></row></rows>"#;

    #[test]
    fn test_load_records_origin() {
        let mut model = XmlDocument::parse("m.xml", MODEL).unwrap();
        let mut form = form();
        binding().load_form_from_model(&mut form, &mut model).unwrap();
        let repeater = rows(&mut form);
        assert_eq!(repeater.size(), 3);
        assert_eq!(repeater.row_origin(2), Some(2));
        assert_eq!(
            repeater.row(1).and_then(|r| r.lookup("name")).and_then(Widget::value),
            Some(Value::from("b"))
        );
    }

    #[test]
    fn test_save_updates_deletes_and_inserts() {
        let mut model = XmlDocument::parse("m.xml", MODEL).unwrap();
        let mut form = form();
        let binding = binding();
        binding.load_form_from_model(&mut form, &mut model).unwrap();

        let repeater = rows(&mut form);
        repeater.remove_row(1);
        set(repeater.row_mut(0).unwrap(), "name", Some("A"));
        let fresh = repeater.add_row();
        set(fresh, "id", Some("9"));
        set(fresh, "name", Some("z"));

        binding.save_form_to_model(&form, &mut model).unwrap();
        assert_eq!(
            model.to_xml_string(),
            r#"<rows><row id="1"><name>A</name></row><row id="3"><name>c</name></row><row id="9"><name>z</name></row></rows>"#
        );
    }

    #[test]
    fn test_null_identity_rows_are_inserted() {
        let mut model = XmlDocument::parse("m.xml", "<rows/>").unwrap();
        let mut form = form();
        let repeater = rows(&mut form);
        set(repeater.add_row(), "name", Some("x"));
        let second = repeater.add_row();
        set(second, "id", Some(""));
        set(second, "name", Some("y"));

        binding().save_form_to_model(&form, &mut model).unwrap();
        assert_eq!(
            model.to_xml_string(),
            "<rows><row><name>x</name></row><row><name>y</name></row></rows>"
        );
    }

    #[test]
    fn test_duplicate_form_identity_is_bound_once() {
        let mut model = XmlDocument::parse("m.xml", "<rows/>").unwrap();
        let mut form = form();
        let repeater = rows(&mut form);
        for name in ["first", "second"] {
            let row = repeater.add_row();
            set(row, "id", Some("5"));
            set(row, "name", Some(name));
        }
        binding().save_form_to_model(&form, &mut model).unwrap();
        assert_eq!(
            model.to_xml_string(),
            r#"<rows><row id="5"><name>first</name></row></rows>"#
        );
    }

    #[test]
    fn test_missing_hooks_keep_and_skip_rows() {
        let mut model = XmlDocument::parse("m.xml", MODEL).unwrap();
        let binding = RepeaterBinding::new(CommonAttributes::default(), "items", path("."), path("row"))
            .with_identity(vec![value("id", "@id")])
            .with_row_bindings(vec![value("name", "name")]);
        let mut form = form();
        set(rows(&mut form).add_row(), "id", Some("2"));

        binding.save_form_to_model(&form, &mut model).unwrap();
        assert_eq!(
            model.to_xml_string(),
            r#"<rows><row id="1"><name>a</name></row><row id="2"><name/></row><row id="3"><name>c</name></row></rows>"#
        );
    }

    #[test]
    fn test_match_by_load_origin() {
        let mut model = XmlDocument::parse("m.xml", MODEL).unwrap();
        let binding = binding().with_matching(RowMatching::LoadOrigin);
        let mut form = form();
        binding.load_form_from_model(&mut form, &mut model).unwrap();

        let repeater = rows(&mut form);
        repeater.remove_row(0);
        set(repeater.row_mut(0).unwrap(), "id", Some("20"));
        binding.save_form_to_model(&form, &mut model).unwrap();
        assert_eq!(
            model.to_xml_string(),
            r#"<rows><row id="2"><name>b</name></row><row id="3"><name>c</name></row></rows>"#
        );
    }

    #[test]
    fn test_wrong_widget_kind() {
        let mut model = XmlDocument::parse("m.xml", MODEL).unwrap();
        let binding = RepeaterBinding::new(CommonAttributes::default(), "id", path("."), path("row"));
        let mut form: Widget = Group::new("form").with(Field::new("id")).into();
        let err = binding.load_form_from_model(&mut form, &mut model).unwrap_err();
        assert!(matches!(err, BindingError::WrongWidgetKind { expected: "repeater", .. }));
    }

    #[test]
    fn test_plan_by_identity_keeps_rows_sharing_a_matched_identity() {
        let mut model = XmlDocument::parse("m.xml", r#"<rows><row id="1"/><row id="1"/><row id="2"/></rows>"#).unwrap();
        let binding = binding();
        let mut form = form();
        set(rows(&mut form).add_row(), "id", Some("1"));
        let repeater = form.lookup("items").and_then(Widget::as_repeater).unwrap();

        let mut context = PathContext::new(&mut model);
        let row_pointers = context.iterate_pointers(&path("row")).unwrap();
        let plan = binding
            .match_by_identity(repeater, &row_pointers, &mut context)
            .unwrap();
        assert_eq!(
            plan,
            RowPlan {
                updates: vec![(0, 0)],
                deletes: vec![2],
                inserts: vec![],
            }
        );
    }

    #[test]
    fn test_rows_sharing_an_identity_survive_reload_and_save() {
        let text = r#"<rows><row id="1"><name>a</name></row><row id="1"><name>b</name></row></rows>"#;
        let mut model = XmlDocument::parse("m.xml", text).unwrap();
        let binding = binding();
        let mut form = form();
        binding.load_form_from_model(&mut form, &mut model).unwrap();
        assert_eq!(rows(&mut form).size(), 2);

        binding.save_form_to_model(&form, &mut model).unwrap();
        assert_eq!(model.to_xml_string(), text);
    }
}
