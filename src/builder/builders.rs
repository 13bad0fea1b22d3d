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

//! Builders for the built-in descriptor elements

use std::sync::Arc;

use super::{BindingBuilder, BuildAssistant, is_binding_element};
use crate::backend::{ElementTemplate, NodeTemplate};
use crate::binding::{
    BindingRef, CaseBinding, ChildBindings, ClassBinding, CommonAttributes, ComposedBinding,
    ContextBinding, DeleteNodeBinding, FieldSpec, GroupBinding, InsertBeanBinding,
    InsertNodeBinding, NewBinding, PluginBinding, RepeaterBinding, RowMatching, ScriptBinding,
    SimpleRepeaterBinding, TempRepeaterBinding, UnionBinding, UniqueFieldBinding, ValueBinding,
};
use crate::error::{BindingError, BindingResult};

type Node<'a, 'input> = roxmltree::Node<'a, 'input>;

/// `id`, `path` and optional convertor of a value-like element
fn field_spec(element: Node<'_, '_>, assistant: &BuildAssistant<'_>) -> BindingResult<FieldSpec> {
    let id = assistant.required_attr(element, "id")?;
    let path = assistant.path_attr(element, "path", None)?;
    let field = FieldSpec::new(id, path);
    Ok(match assistant.convertor(element)? {
        Some((convertor, locale)) => field.with_convertor(convertor, locale),
        None => field,
    })
}

/// Children of the `local` wrapper element, or none
fn wrapped_children(
    element: Node<'_, '_>,
    local: &str,
    assistant: &mut BuildAssistant<'_>,
) -> BindingResult<Vec<BindingRef>> {
    match assistant.child_element(element, local) {
        Some(wrapper) => assistant.build_children(wrapper),
        None => Ok(Vec::new()),
    }
}

/// Concatenated text below `node`, CDATA included
fn script_text(node: Node<'_, '_>) -> String {
    node.descendants()
        .filter(|d| d.is_text())
        .filter_map(|d| d.text())
        .collect()
}

/// `<fb:context path="...">`
#[derive(Debug)]
pub struct ContextBuilder;

impl BindingBuilder for ContextBuilder {
    fn build(&self, element: Node<'_, '_>, assistant: &mut BuildAssistant<'_>) -> BindingResult<BindingRef> {
        let common = assistant.common(element)?;
        let path = assistant.path_attr(element, "path", None)?;
        let children = assistant.build_children(element)?;
        Ok(Arc::new(ContextBinding::new(common, path, children)))
    }
}

/// `<fb:value id="..." path="...">` with optional `fd:convertor` and `fb:on-update`
#[derive(Debug)]
pub struct ValueBuilder;

impl BindingBuilder for ValueBuilder {
    fn build(&self, element: Node<'_, '_>, assistant: &mut BuildAssistant<'_>) -> BindingResult<BindingRef> {
        let common = assistant.common(element)?;
        let field = field_spec(element, assistant)?;
        let on_update = wrapped_children(element, "on-update", assistant)?;
        Ok(Arc::new(ValueBinding::new(common, field).with_on_update(on_update)))
    }
}

/// `<fb:unique-field id="..." path="...">`
#[derive(Debug)]
pub struct UniqueFieldBuilder;

impl BindingBuilder for UniqueFieldBuilder {
    fn build(&self, element: Node<'_, '_>, assistant: &mut BuildAssistant<'_>) -> BindingResult<BindingRef> {
        let common = assistant.common(element)?;
        let field = field_spec(element, assistant)?;
        Ok(Arc::new(UniqueFieldBinding::new(common, field)))
    }
}

/// `<fb:group id="..." path="...">`
#[derive(Debug)]
pub struct GroupBuilder;

impl BindingBuilder for GroupBuilder {
    fn build(&self, element: Node<'_, '_>, assistant: &mut BuildAssistant<'_>) -> BindingResult<BindingRef> {
        let common = assistant.common(element)?;
        let id = assistant.required_attr(element, "id")?;
        let path = assistant.path_attr(element, "path", None)?;
        let children = assistant.build_children(element)?;
        Ok(Arc::new(GroupBinding::new(common, id, path, children)))
    }
}

/// `<fb:union id="..." path="...">` holding `fb:case` elements
#[derive(Debug)]
pub struct UnionBuilder;

impl BindingBuilder for UnionBuilder {
    fn build(&self, element: Node<'_, '_>, assistant: &mut BuildAssistant<'_>) -> BindingResult<BindingRef> {
        let common = assistant.common(element)?;
        let id = assistant.required_attr(element, "id")?;
        let path = assistant.path_attr(element, "path", Some("."))?;
        let cases = assistant.build_children(element)?;
        Ok(Arc::new(UnionBinding::new(common, id, path, cases)))
    }
}

/// `<fb:case id="...">`, only directly inside a union
#[derive(Debug)]
pub struct CaseBuilder;

impl BindingBuilder for CaseBuilder {
    fn build(&self, element: Node<'_, '_>, assistant: &mut BuildAssistant<'_>) -> BindingResult<BindingRef> {
        let in_union = element
            .parent_element()
            .is_some_and(|parent| is_binding_element(parent, "union"));
        if !in_union {
            return Err(assistant.error(element, "<case> is only allowed directly inside <union>"));
        }
        let common = assistant.common(element)?;
        let id = assistant.required_attr(element, "id")?;
        let children = assistant.build_children(element)?;
        Ok(Arc::new(CaseBinding::new(common, id, children)))
    }
}

/// `<fb:class id="...">`: a named body for `fb:new`
#[derive(Debug)]
pub struct ClassBuilder;

impl BindingBuilder for ClassBuilder {
    fn build(&self, element: Node<'_, '_>, assistant: &mut BuildAssistant<'_>) -> BindingResult<BindingRef> {
        let common = assistant.common(element)?;
        let name = assistant.required_attr(element, "id")?;
        let children = assistant.build_children(element)?;
        let body = Arc::new(ComposedBinding::new(CommonAttributes::default(), children));

        let slot = assistant
            .class_slot(name)
            .ok_or_else(|| assistant.error(element, format!("Class '{name}' cannot be declared here")))?;
        slot.set(Arc::downgrade(&body))
            .map_err(|_| assistant.error(element, format!("Class '{name}' is declared twice")))?;
        log::debug!("Declared binding class '{}'", name);
        Ok(Arc::new(ClassBinding::new(common, name, body)))
    }
}

/// `<fb:new id="...">`: runs the class of that name
#[derive(Debug)]
pub struct NewBuilder;

impl BindingBuilder for NewBuilder {
    fn build(&self, element: Node<'_, '_>, assistant: &mut BuildAssistant<'_>) -> BindingResult<BindingRef> {
        let common = assistant.common(element)?;
        let name = assistant.required_attr(element, "id")?;
        let slot = assistant
            .class_slot(name)
            .ok_or_else(|| assistant.error(element, format!("No class '{name}' is visible here")))?;
        Ok(Arc::new(NewBinding::new(common, name, slot)))
    }
}

/// `<fb:repeater>` and `<fb:enhanced-repeater>`
#[derive(Debug)]
pub struct RepeaterBuilder {
    matching: RowMatching,
}

impl RepeaterBuilder {
    pub fn new(matching: RowMatching) -> Self {
        Self { matching }
    }

    /// `fb:identity`, legacy `fb:unique-row` and `unique-row-id`/`unique-path`
    fn identity(element: Node<'_, '_>, assistant: &mut BuildAssistant<'_>) -> BindingResult<Vec<BindingRef>> {
        let mut identity = wrapped_children(element, "identity", assistant)?;
        identity.extend(wrapped_children(element, "unique-row", assistant)?);

        if let Some(unique_id) = element.attribute("unique-row-id") {
            let path = assistant.path_attr(element, "unique-path", None)?;
            let mut field = FieldSpec::new(unique_id, path);
            if let Some((convertor, locale)) = assistant.convertor(element)? {
                field = field.with_convertor(convertor, locale);
            }
            identity.push(Arc::new(UniqueFieldBinding::new(CommonAttributes::default(), field)));
        }

        if identity.iter().any(|binding| binding.field_spec().is_none()) {
            return Err(assistant.error(
                element,
                "Row identity may only contain value and unique-field bindings",
            ));
        }
        Ok(identity)
    }
}

impl BindingBuilder for RepeaterBuilder {
    fn build(&self, element: Node<'_, '_>, assistant: &mut BuildAssistant<'_>) -> BindingResult<BindingRef> {
        let common = assistant.common(element)?;
        let id = assistant.required_attr(element, "id")?;
        let parent_path = assistant.path_attr(element, "parent-path", Some("."))?;
        let row_path = assistant.path_attr(element, "row-path", None)?;
        let row_path_insert = match element.attribute("row-path-insert") {
            Some(_) => assistant.path_attr(element, "row-path-insert", None)?,
            None => row_path.clone(),
        };

        let identity = Self::identity(element, assistant)?;
        let row_bindings = wrapped_children(element, "on-bind", assistant)?;
        let mut binding = RepeaterBinding::new(common, id, parent_path, row_path)
            .with_row_path_insert(row_path_insert)
            .with_identity(identity)
            .with_row_bindings(row_bindings)
            .with_matching(self.matching);
        if let Some(insert_row) = assistant.build_hook(element, "on-insert-row")? {
            binding = binding.with_insert_row(insert_row);
        }
        if let Some(delete_row) = assistant.build_hook(element, "on-delete-row")? {
            binding = binding.with_delete_row(delete_row);
        }
        Ok(Arc::new(binding))
    }
}

/// `<fb:simple-repeater>`: row bindings in `fb:on-bind` or directly inside
#[derive(Debug)]
pub struct SimpleRepeaterBuilder;

impl BindingBuilder for SimpleRepeaterBuilder {
    fn build(&self, element: Node<'_, '_>, assistant: &mut BuildAssistant<'_>) -> BindingResult<BindingRef> {
        let common = assistant.common(element)?;
        let id = assistant.required_attr(element, "id")?;
        let parent_path = assistant.path_attr(element, "parent-path", Some("."))?;
        let row_path = assistant.path_attr(element, "row-path", None)?;
        let clear = assistant.bool_attr(element, "clear-before-load", true)?;
        let delete_parent = assistant.bool_attr(element, "delete-parent-if-empty", false)?;
        let row_bindings = match assistant.child_element(element, "on-bind") {
            Some(on_bind) => assistant.build_children(on_bind)?,
            None => assistant.build_children(element)?,
        };
        Ok(Arc::new(
            SimpleRepeaterBinding::new(common, id, parent_path, row_path, row_bindings)
                .with_clear_before_load(clear)
                .with_delete_parent_if_empty(delete_parent),
        ))
    }
}

/// `<fb:temp-repeater>`
#[derive(Debug)]
pub struct TempRepeaterBuilder;

impl BindingBuilder for TempRepeaterBuilder {
    fn build(&self, element: Node<'_, '_>, assistant: &mut BuildAssistant<'_>) -> BindingResult<BindingRef> {
        let common = assistant.common(element)?;
        let id = assistant.required_attr(element, "id")?;
        let parent_path = assistant.path_attr(element, "parent-path", Some("."))?;
        let row_path = assistant.path_attr(element, "row-path", None)?;
        let row_path_insert = match element.attribute("row-path-insert") {
            Some(_) => assistant.path_attr(element, "row-path-insert", None)?,
            None => row_path.clone(),
        };
        let clear = assistant.bool_attr(element, "clear-before-load", true)?;
        let delete_parent = assistant.bool_attr(element, "delete-parent-if-empty", false)?;
        let row_bindings = wrapped_children(element, "on-bind", assistant)?;

        let mut binding = TempRepeaterBinding::new(common, id, parent_path, row_path, row_bindings)
            .with_row_path_insert(row_path_insert)
            .with_clear_before_load(clear)
            .with_delete_parent_if_empty(delete_parent);
        if let Some(insert_row) = assistant.build_hook(element, "on-insert-row")? {
            binding = binding.with_insert_row(insert_row);
        }
        Ok(Arc::new(binding))
    }
}

/// `<fb:custom class="...">` with an optional `fb:config` element
#[derive(Debug)]
pub struct CustomBuilder;

impl BindingBuilder for CustomBuilder {
    fn build(&self, element: Node<'_, '_>, assistant: &mut BuildAssistant<'_>) -> BindingResult<BindingRef> {
        let common = assistant.common(element)?;
        let widget_id = element.attribute("id").map(str::to_string);
        let path = assistant.path_attr(element, "path", Some("."))?;
        let class_name = element
            .attribute("class")
            .or_else(|| element.attribute("builderclass"))
            .ok_or_else(|| assistant.error(element, "<custom> needs a 'class' or 'builderclass' attribute"))?;
        let factory = assistant.custom_factory(class_name).ok_or_else(|| {
            assistant.error(element, format!("No custom binding registered as '{class_name}'"))
        })?;
        let config = assistant
            .child_element(element, "config")
            .map(ElementTemplate::from_node);
        let plugin = factory(config.as_ref()).map_err(|e| {
            assistant.error(element, format!("Custom binding '{class_name}' could not be created: {e}"))
        })?;
        Ok(Arc::new(PluginBinding::new(common, widget_id, path, class_name, plugin)))
    }
}

/// `<fb:javascript>` with `fb:load-form`, `fb:save-form` and `fb:child-binding`
#[derive(Debug)]
pub struct JavaScriptBuilder;

impl BindingBuilder for JavaScriptBuilder {
    fn build(&self, element: Node<'_, '_>, assistant: &mut BuildAssistant<'_>) -> BindingResult<BindingRef> {
        let common = assistant.common(element)?;
        let widget_id = element.attribute("id").map(str::to_string);
        let path = assistant.path_attr(element, "path", Some("."))?;
        let load_form = assistant.child_element(element, "load-form");
        let save_form = assistant.child_element(element, "save-form");

        let mut binding = ScriptBinding::new(common, widget_id, path);
        if load_form.is_some() || save_form.is_some() {
            let engine = assistant.script_engine().ok_or_else(|| {
                assistant.error(element, "Descriptor contains scripts but no script engine is registered")
            })?;
            let compile_error =
                |e: BindingError| assistant.error(element, format!("Script could not be compiled: {e}"));
            if let Some(load_form) = load_form {
                binding = binding.with_load(engine.compile_load(&script_text(load_form)).map_err(&compile_error)?);
            }
            if let Some(save_form) = save_form {
                binding = binding.with_save(engine.compile_save(&script_text(save_form)).map_err(&compile_error)?);
            }
        }

        let mut children = ChildBindings::new();
        for child in element
            .children()
            .filter(|child| is_binding_element(*child, "child-binding"))
        {
            let name = assistant.required_attr(child, "name")?;
            let common = assistant.common(child)?;
            let bindings = assistant.build_children(child)?;
            let composed: BindingRef = Arc::new(ComposedBinding::new(common, bindings));
            children.insert(name.to_string(), composed);
        }
        Ok(Arc::new(binding.with_children(children)))
    }
}

/// `<fb:insert-bean classname="..." addmethod="...">`
#[derive(Debug)]
pub struct InsertBeanBuilder;

impl BindingBuilder for InsertBeanBuilder {
    fn build(&self, element: Node<'_, '_>, assistant: &mut BuildAssistant<'_>) -> BindingResult<BindingRef> {
        let common = assistant.common(element)?;
        let class_name = assistant.required_attr(element, "classname")?;
        let add_method = assistant.required_attr(element, "addmethod")?;
        let factory = assistant.bean_factory(class_name).ok_or_else(|| {
            assistant.error(element, format!("No bean factory registered as '{class_name}'"))
        })?;
        Ok(Arc::new(InsertBeanBinding::new(common, class_name, add_method, factory)))
    }
}

/// `<fb:insert-node>` with inline content or a `src` file
#[derive(Debug)]
pub struct InsertNodeBuilder;

impl InsertNodeBuilder {
    fn external(src: &str, element: Node<'_, '_>, assistant: &BuildAssistant<'_>) -> BindingResult<ElementTemplate> {
        let file = match assistant.base_dir() {
            Some(base) => base.join(src),
            None => std::path::PathBuf::from(src),
        };
        let name = file.display().to_string();
        let text = std::fs::read_to_string(&file).map_err(|cause| BindingError::Io {
            descriptor: name.clone(),
            cause,
        })?;
        ElementTemplate::parse(&text).map_err(|e| {
            assistant.error(element, format!("Fragment '{name}' is not well-formed: {e}"))
        })
    }
}

impl BindingBuilder for InsertNodeBuilder {
    fn build(&self, element: Node<'_, '_>, assistant: &mut BuildAssistant<'_>) -> BindingResult<BindingRef> {
        let common = assistant.common(element)?;
        let template = match element.attribute("src") {
            Some(src) => Self::external(src, element, assistant)?,
            None => element
                .children()
                .find(|child| child.is_element())
                .map(ElementTemplate::from_node)
                .ok_or_else(|| assistant.error(element, "<insert-node> needs content or a 'src' attribute"))?,
        };
        Ok(Arc::new(InsertNodeBinding::new(common, NodeTemplate::Element(template))))
    }
}

/// `<fb:delete-node/>`
#[derive(Debug)]
pub struct DeleteNodeBuilder;

impl BindingBuilder for DeleteNodeBuilder {
    fn build(&self, element: Node<'_, '_>, assistant: &mut BuildAssistant<'_>) -> BindingResult<BindingRef> {
        Ok(Arc::new(DeleteNodeBinding::new(assistant.common(element)?)))
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::XmlDocument;
    use crate::binding::{LoadScript, SaveScript, ScriptLibrary};
    use crate::builder::DescriptorBuilder;
    use crate::error::BindingError;
    use crate::model::{Field, Group, Repeater, Value, Widget};
    use std::sync::Arc;

    fn descriptor(body: &str) -> String {
        format!(
            r#"<fb:context xmlns:fb="http://apache.org/cocoon/forms/1.0#binding"
                          xmlns:fd="http://apache.org/cocoon/forms/1.0#definition" path=".">{body}</fb:context>"#
        )
    }

    fn build(body: &str) -> Result<crate::binding::BindingRef, BindingError> {
        DescriptorBuilder::new().build_from_str("test.xml", &descriptor(body))
    }

    #[test]
    fn test_unknown_element_reports_location() {
        let err = build("\n  <fb:frobnicate/>").unwrap_err();
        let message = err.to_string();
        assert!(err.is_configuration());
        assert!(message.contains("frobnicate"), "{message}");
        assert!(message.contains("test.xml:3:3"), "{message}");
    }

    #[test]
    fn test_value_requires_id_and_valid_path() {
        assert!(build(r#"<fb:value path="name"/>"#).unwrap_err().is_configuration());
        assert!(build(r#"<fb:value id="a" path="name["/>"#).unwrap_err().is_configuration());
        assert!(build(r#"<fb:value id="a" path="a" direction="up"/>"#).unwrap_err().is_configuration());
        assert!(build(r#"<fb:value id="a" path="a" lenient="maybe"/>"#).unwrap_err().is_configuration());
    }

    #[test]
    fn test_convertor_element() {
        let binding = build(
            r#"<fb:value id="born" path="born">
                 <fd:convertor datatype="date"><fd:patterns><fd:pattern>dd/MM/yyyy</fd:pattern></fd:patterns></fd:convertor>
               </fb:value>"#,
        )
        .unwrap();
        let mut model = XmlDocument::parse("m.xml", "<p><born>01/02/2003</born></p>").unwrap();
        let mut form: Widget = Group::new("form").with(Field::new("born")).into();
        binding.load_form_from_model(&mut form, &mut model).unwrap();
        assert_eq!(
            form.lookup("born").and_then(Widget::value).map(|v| v.to_string()),
            Some("2003-02-01".to_string())
        );

        assert!(build(r#"<fb:value id="x" path="x"><fd:convertor datatype="blob"/></fb:value>"#)
            .unwrap_err()
            .is_configuration());
    }

    #[test]
    fn test_case_outside_union_is_rejected() {
        assert!(build(r#"<fb:case id="a"/>"#).unwrap_err().is_configuration());
    }

    #[test]
    fn test_class_scopes() {
        build(
            r#"<fb:new id="later"/>
               <fb:class id="later"><fb:value id="a" path="a"/></fb:class>"#,
        )
        .unwrap();
        let err = build(
            r#"<fb:context path="x"><fb:class id="inner"><fb:value id="a" path="a"/></fb:class></fb:context>
               <fb:new id="inner"/>"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("No class 'inner'"));
        assert!(build(r#"<fb:class id="c"/><fb:class id="c"/>"#).unwrap_err().is_configuration());
    }

    #[test]
    fn test_legacy_unique_row_id() {
        let binding = build(
            r#"<fb:repeater id="items" parent-path="." row-path="row" unique-row-id="id" unique-path="@id">
                 <fb:on-bind><fb:value id="name" path="."/></fb:on-bind>
               </fb:repeater>"#,
        )
        .unwrap();
        let mut model =
            XmlDocument::parse("m.xml", r#"<rows><row id="1">a</row><row id="2">b</row></rows>"#).unwrap();
        let mut form: Widget = Group::new("form")
            .with(Repeater::new("items", [Field::new("id").into(), Field::new("name").into()]))
            .into();
        binding.load_form_from_model(&mut form, &mut model).unwrap();
        let rows = form.lookup("items").and_then(Widget::as_repeater).unwrap();
        assert_eq!(rows.size(), 2);
        assert_eq!(
            rows.row(1).and_then(|r| r.lookup("id")).and_then(Widget::value),
            Some(Value::from("2"))
        );
    }

    #[test]
    fn test_scripts_need_an_engine() {
        let body = r#"<fb:javascript id="name" path=".">
                        <fb:load-form>loadName</fb:load-form>
                      </fb:javascript>"#;
        let err = build(body).unwrap_err();
        assert!(err.to_string().contains("no script engine"));

        let mut library = ScriptLibrary::new();
        let load: LoadScript = Arc::new(|widget: &mut Widget, _context: Option<&mut crate::path::PathContext>, _children: &crate::binding::ChildBindings| -> crate::error::BindingResult<()> {
            widget.set_value(Some(Value::from("scripted")))
        });
        library.register_load("loadName", load);
        let builder = DescriptorBuilder::new().with_script_engine(Arc::new(library.clone()));
        let binding = builder.build_from_str("test.xml", &descriptor(body)).unwrap();
        let mut model = XmlDocument::parse("m.xml", "<p/>").unwrap();
        let mut form: Widget = Group::new("form").with(Field::new("name")).into();
        binding.load_form_from_model(&mut form, &mut model).unwrap();
        assert_eq!(form.lookup("name").and_then(Widget::value), Some(Value::from("scripted")));

        let save: SaveScript = Arc::new(|_: &Widget, _: &mut crate::path::PathContext, _: &crate::binding::ChildBindings| -> crate::error::BindingResult<()> { Ok(()) });
        library.register_save("other", save);
        let missing = r#"<fb:javascript path="."><fb:save-form>unknown</fb:save-form></fb:javascript>"#;
        let err = DescriptorBuilder::new()
            .with_script_engine(Arc::new(library))
            .build_from_str("test.xml", &descriptor(missing))
            .unwrap_err();
        assert!(err.to_string().contains("could not be compiled"));
    }

    #[test]
    fn test_insert_node_needs_content() {
        assert!(build("<fb:insert-node/>").unwrap_err().is_configuration());
        build("<fb:insert-node><row/></fb:insert-node>").unwrap();
        let err = build(r#"<fb:insert-node src="does-not-exist.xml"/>"#).unwrap_err();
        assert!(matches!(err, BindingError::Io { .. }));
    }

    #[test]
    fn test_plugins_must_be_registered() {
        assert!(build(r#"<fb:custom class="com.example.Missing"/>"#).unwrap_err().is_configuration());
        assert!(build(r#"<fb:insert-bean classname="Item" addmethod="items"/>"#)
            .unwrap_err()
            .is_configuration());
    }

    #[test]
    fn test_root_must_be_binding_element() {
        let err = DescriptorBuilder::new()
            .build_from_str("test.xml", r#"<context path="."/>"#)
            .unwrap_err();
        assert!(err.is_configuration());
        let err = DescriptorBuilder::new()
            .build_from_str("test.xml", "<fb:context")
            .unwrap_err();
        assert!(matches!(err, BindingError::Xml { .. }));
    }
}
