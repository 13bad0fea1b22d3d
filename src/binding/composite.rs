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

//! Container bindings that narrow the widget or model scope for their children

use once_cell::sync::OnceCell;
use std::sync::{Arc, Weak};

use super::{Binding, BindingRef, CommonAttributes, load_all, save_all, select_widget, select_widget_mut};
use crate::error::{BindingError, BindingResult};
use crate::model::Widget;
use crate::path::{Path, PathContext};

/// Ordered list of child bindings run against the same widget and context
#[derive(Debug)]
pub struct ComposedBinding {
    common: CommonAttributes,
    children: Vec<BindingRef>,
}

impl ComposedBinding {
    pub fn new(common: CommonAttributes, children: Vec<BindingRef>) -> Self {
        Self { common, children }
    }

    pub fn children(&self) -> &[BindingRef] {
        &self.children
    }
}

impl Binding for ComposedBinding {
    fn common(&self) -> &CommonAttributes {
        &self.common
    }

    fn do_load(&self, widget: &mut Widget, context: &mut PathContext<'_>) -> BindingResult<()> {
        load_all(&self.children, widget, context)
    }

    fn do_save(&self, widget: &Widget, context: &mut PathContext<'_>) -> BindingResult<()> {
        save_all(&self.children, widget, context)
    }
}

/// Run `children` in the context `path` selects; missing on load skips them
fn load_narrowed(
    path: &Path,
    children: &[BindingRef],
    widget: &mut Widget,
    context: &mut PathContext<'_>,
) -> BindingResult<()> {
    match context.pointer(path)? {
        Some(pointer) => {
            let mut narrowed = context.relative_context(pointer);
            load_all(children, widget, &mut narrowed)
        }
        None => {
            log::debug!("Path '{}' not found from {}, skipping", path, context.context_pointer());
            Ok(())
        }
    }
}

/// Run `children` in the context `path` selects, creating it first
fn save_narrowed(
    path: &Path,
    children: &[BindingRef],
    widget: &Widget,
    context: &mut PathContext<'_>,
) -> BindingResult<()> {
    let pointer = context.create_path(path)?;
    let mut narrowed = context.relative_context(pointer);
    save_all(children, widget, &mut narrowed)
}

/// Narrows the model context to a sub-path
#[derive(Debug)]
pub struct ContextBinding {
    common: CommonAttributes,
    path: Path,
    children: Vec<BindingRef>,
}

impl ContextBinding {
    pub fn new(common: CommonAttributes, path: Path, children: Vec<BindingRef>) -> Self {
        Self {
            common,
            path,
            children,
        }
    }
}

impl Binding for ContextBinding {
    fn common(&self) -> &CommonAttributes {
        &self.common
    }

    fn do_load(&self, widget: &mut Widget, context: &mut PathContext<'_>) -> BindingResult<()> {
        load_narrowed(&self.path, &self.children, widget, context)
    }

    fn do_save(&self, widget: &Widget, context: &mut PathContext<'_>) -> BindingResult<()> {
        save_narrowed(&self.path, &self.children, widget, context)
    }
}

/// Narrows both the widget (to a child container) and the model context
#[derive(Debug)]
pub struct GroupBinding {
    common: CommonAttributes,
    widget_id: String,
    path: Path,
    children: Vec<BindingRef>,
}

impl GroupBinding {
    pub fn new(
        common: CommonAttributes,
        widget_id: impl Into<String>,
        path: Path,
        children: Vec<BindingRef>,
    ) -> Self {
        Self {
            common,
            widget_id: widget_id.into(),
            path,
            children,
        }
    }
}

impl Binding for GroupBinding {
    fn common(&self) -> &CommonAttributes {
        &self.common
    }

    fn do_load(&self, widget: &mut Widget, context: &mut PathContext<'_>) -> BindingResult<()> {
        let group = select_widget_mut(widget, &self.widget_id)?;
        load_narrowed(&self.path, &self.children, group, context)
    }

    fn do_save(&self, widget: &Widget, context: &mut PathContext<'_>) -> BindingResult<()> {
        let group = select_widget(widget, &self.widget_id)?;
        save_narrowed(&self.path, &self.children, group, context)
    }
}

/// Selects a union widget; its case bindings decide which case is bound
#[derive(Debug)]
pub struct UnionBinding {
    common: CommonAttributes,
    widget_id: String,
    path: Path,
    cases: Vec<BindingRef>,
}

impl UnionBinding {
    pub fn new(
        common: CommonAttributes,
        widget_id: impl Into<String>,
        path: Path,
        cases: Vec<BindingRef>,
    ) -> Self {
        Self {
            common,
            widget_id: widget_id.into(),
            path,
            cases,
        }
    }

    fn union_widget<'w>(&self, widget: &'w Widget) -> BindingResult<&'w Widget> {
        let union = select_widget(widget, &self.widget_id)?;
        match union {
            Widget::Union(_) => Ok(union),
            _ => Err(BindingError::WrongWidgetKind {
                id: self.widget_id.clone(),
                expected: "union",
            }),
        }
    }
}

impl Binding for UnionBinding {
    fn common(&self) -> &CommonAttributes {
        &self.common
    }

    fn do_load(&self, widget: &mut Widget, context: &mut PathContext<'_>) -> BindingResult<()> {
        self.union_widget(widget)?;
        let union = select_widget_mut(widget, &self.widget_id)?;
        load_narrowed(&self.path, &self.cases, union, context)
    }

    fn do_save(&self, widget: &Widget, context: &mut PathContext<'_>) -> BindingResult<()> {
        let union = self.union_widget(widget)?;
        save_narrowed(&self.path, &self.cases, union, context)
    }
}

/// Binds the case widget of a union while that case is active
#[derive(Debug)]
pub struct CaseBinding {
    common: CommonAttributes,
    case_id: String,
    children: Vec<BindingRef>,
}

impl CaseBinding {
    pub fn new(common: CommonAttributes, case_id: impl Into<String>, children: Vec<BindingRef>) -> Self {
        Self {
            common,
            case_id: case_id.into(),
            children,
        }
    }

    fn not_a_union(widget: &Widget) -> BindingError {
        BindingError::WrongWidgetKind {
            id: widget.id().to_string(),
            expected: "union",
        }
    }
}

impl Binding for CaseBinding {
    fn common(&self) -> &CommonAttributes {
        &self.common
    }

    fn do_load(&self, widget: &mut Widget, context: &mut PathContext<'_>) -> BindingResult<()> {
        let Some(union) = widget.as_union_mut() else {
            return Err(Self::not_a_union(widget));
        };
        if union.case() != Some(self.case_id.as_str()) {
            return Ok(());
        }
        let case = union
            .case_widget_mut(&self.case_id)
            .ok_or_else(|| BindingError::widget_not_found(self.case_id.clone()))?;
        load_all(&self.children, case, context)
    }

    fn do_save(&self, widget: &Widget, context: &mut PathContext<'_>) -> BindingResult<()> {
        let Some(union) = widget.as_union() else {
            return Err(Self::not_a_union(widget));
        };
        if union.case() != Some(self.case_id.as_str()) {
            return Ok(());
        }
        let case = union
            .case_widget(&self.case_id)
            .ok_or_else(|| BindingError::widget_not_found(self.case_id.clone()))?;
        save_all(&self.children, case, context)
    }
}

/// Named reusable binding definition; walking it does nothing
#[derive(Debug)]
pub struct ClassBinding {
    common: CommonAttributes,
    name: String,
    body: Arc<ComposedBinding>,
}

impl ClassBinding {
    pub fn new(common: CommonAttributes, name: impl Into<String>, body: Arc<ComposedBinding>) -> Self {
        Self {
            common,
            name: name.into(),
            body,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body(&self) -> &Arc<ComposedBinding> {
        &self.body
    }
}

impl Binding for ClassBinding {
    fn common(&self) -> &CommonAttributes {
        &self.common
    }

    fn do_load(&self, _widget: &mut Widget, _context: &mut PathContext<'_>) -> BindingResult<()> {
        Ok(())
    }

    fn do_save(&self, _widget: &Widget, _context: &mut PathContext<'_>) -> BindingResult<()> {
        Ok(())
    }
}

/// Slot filled with a class body once the class is built
pub type ClassSlot = Arc<OnceCell<Weak<ComposedBinding>>>;

/// Runs the bindings of a named class in place
#[derive(Debug)]
pub struct NewBinding {
    common: CommonAttributes,
    class_name: String,
    class: ClassSlot,
}

impl NewBinding {
    pub fn new(common: CommonAttributes, class_name: impl Into<String>, class: ClassSlot) -> Self {
        Self {
            common,
            class_name: class_name.into(),
            class,
        }
    }

    fn body(&self) -> BindingResult<Arc<ComposedBinding>> {
        self.class
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| {
                BindingError::configuration(
                    format!("Class '{}' is not available", self.class_name),
                    self.common.location.clone(),
                )
            })
    }
}

impl Binding for NewBinding {
    fn common(&self) -> &CommonAttributes {
        &self.common
    }

    fn do_load(&self, widget: &mut Widget, context: &mut PathContext<'_>) -> BindingResult<()> {
        self.body()?.load(widget, context)
    }

    fn do_save(&self, widget: &Widget, context: &mut PathContext<'_>) -> BindingResult<()> {
        self.body()?.save(widget, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::XmlDocument;
    use crate::binding::{FieldSpec, ValueBinding};
    use crate::model::{Field, Group, Union, Value};

    fn path(text: &str) -> Path {
        Path::parse(text).unwrap()
    }

    fn value(id: &str, at: &str) -> BindingRef {
        Arc::new(ValueBinding::new(CommonAttributes::default(), FieldSpec::new(id, path(at))))
    }

    #[test]
    fn test_context_skips_missing_path_on_load() {
        let mut model = XmlDocument::parse("m.xml", "<person><name>Ann</name></person>").unwrap();
        let binding = ContextBinding::new(
            CommonAttributes::default(),
            path("address"),
            vec![value("city", "city")],
        );
        let mut form: Widget = Group::new("form").with(Field::new("city")).into();
        binding.load_form_from_model(&mut form, &mut model).unwrap();
        assert_eq!(form.lookup("city").and_then(Widget::value), None);

        form.lookup_mut("city").unwrap().set_value(Some("Gent".into())).unwrap();
        binding.save_form_to_model(&form, &mut model).unwrap();
        assert_eq!(
            model.to_xml_string(),
            "<person><name>Ann</name><address><city>Gent</city></address></person>"
        );
    }

    #[test]
    fn test_group_narrows_widget() {
        let mut model =
            XmlDocument::parse("m.xml", "<person><address><city>Gent</city></address></person>")
                .unwrap();
        let binding = GroupBinding::new(
            CommonAttributes::default(),
            "address",
            path("address"),
            vec![value("city", "city")],
        );
        let mut form: Widget = Group::new("form")
            .with(Group::new("address").with(Field::new("city")))
            .into();
        binding.load_form_from_model(&mut form, &mut model).unwrap();
        assert_eq!(form.lookup("address/city").and_then(Widget::value), Some(Value::from("Gent")));

        let err = GroupBinding::new(CommonAttributes::default(), "nope", path("."), vec![])
            .load_form_from_model(&mut form, &mut model)
            .unwrap_err();
        assert!(matches!(err, BindingError::WidgetNotFound { .. }));
    }

    #[test]
    fn test_union_binds_active_case_only() {
        let mut model = XmlDocument::parse(
            "m.xml",
            r#"<order><payment type="card"><number>4111</number><iban>BE00</iban></payment></order>"#,
        )
        .unwrap();
        let cases: Vec<BindingRef> = vec![
            Arc::new(CaseBinding::new(CommonAttributes::default(), "card", vec![value("number", "number")])),
            Arc::new(CaseBinding::new(CommonAttributes::default(), "transfer", vec![value("iban", "iban")])),
        ];
        let union = UnionBinding::new(CommonAttributes::default(), "payment", path("payment"), cases);
        let composed = ComposedBinding::new(
            CommonAttributes::default(),
            vec![value("payment", "payment/@type"), Arc::new(union)],
        );

        let mut form: Widget = Group::new("form")
            .with(
                Union::new("payment")
                    .with_case(Group::new("card").with(Field::new("number")))
                    .with_case(Group::new("transfer").with(Field::new("iban"))),
            )
            .into();
        composed.load_form_from_model(&mut form, &mut model).unwrap();
        assert_eq!(form.lookup("payment").and_then(Widget::value), Some(Value::from("card")));
        assert_eq!(form.lookup("payment/card/number").and_then(Widget::value), Some(Value::from("4111")));
        assert_eq!(form.lookup("payment/transfer/iban").and_then(Widget::value), None);
    }

    #[test]
    fn test_new_runs_class_body() {
        let body = Arc::new(ComposedBinding::new(
            CommonAttributes::default(),
            vec![value("name", "name")],
        ));
        let slot: ClassSlot = Arc::new(OnceCell::new());
        let new = NewBinding::new(CommonAttributes::default(), "person", slot.clone());
        let mut model = XmlDocument::parse("m.xml", "<p><name>Ann</name></p>").unwrap();
        let mut form: Widget = Group::new("form").with(Field::new("name")).into();

        let err = new.load_form_from_model(&mut form, &mut model).unwrap_err();
        assert!(err.is_configuration());

        let _ = slot.set(Arc::downgrade(&body));
        let class = ClassBinding::new(CommonAttributes::default(), "person", body);
        class.load_form_from_model(&mut form, &mut model).unwrap();
        assert_eq!(form.lookup("name").and_then(Widget::value), None);
        new.load_form_from_model(&mut form, &mut model).unwrap();
        assert_eq!(form.lookup("name").and_then(Widget::value), Some(Value::from("Ann")));
    }
}
