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

//! Script bindings: load and save code supplied by the application
//!
//! Descriptors carry script text in `load-form`/`save-form` elements. A
//! [`ScriptEngine`] turns that text into callbacks when the descriptor is
//! built; [`ScriptLibrary`] is an engine that looks up closures registered
//! under the script text or a short name.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

use super::{Binding, BindingRef, CommonAttributes, select_widget, select_widget_mut};
use crate::error::{BindingError, BindingResult};
use crate::model::Widget;
use crate::path::{Path, PathContext};

/// Named bindings a script may run, in declaration order
pub type ChildBindings = IndexMap<String, BindingRef>;

/// Load callback; the context is `None` when the binding path is missing
pub type LoadScript = Arc<
    dyn Fn(&mut Widget, Option<&mut PathContext<'_>>, &ChildBindings) -> BindingResult<()>
        + Send
        + Sync,
>;

/// Save callback, run against the created binding path
pub type SaveScript =
    Arc<dyn Fn(&Widget, &mut PathContext<'_>, &ChildBindings) -> BindingResult<()> + Send + Sync>;

/// Compiles script text from a descriptor into callbacks
pub trait ScriptEngine: fmt::Debug + Send + Sync {
    fn compile_load(&self, source: &str) -> BindingResult<LoadScript>;

    fn compile_save(&self, source: &str) -> BindingResult<SaveScript>;
}

/// Script engine backed by registered closures
///
/// Scripts are looked up by their trimmed source text, so a descriptor may
/// either repeat a registered snippet or just name it.
#[derive(Clone, Default)]
pub struct ScriptLibrary {
    load: FxHashMap<String, LoadScript>,
    save: FxHashMap<String, SaveScript>,
}

impl ScriptLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_load(&mut self, name: impl Into<String>, script: LoadScript) {
        let name = name.into();
        log::debug!("Registering load script '{}'", name);
        self.load.insert(name.trim().to_string(), script);
    }

    pub fn register_save(&mut self, name: impl Into<String>, script: SaveScript) {
        let name = name.into();
        log::debug!("Registering save script '{}'", name);
        self.save.insert(name.trim().to_string(), script);
    }

    pub fn contains(&self, name: &str) -> bool {
        let name = name.trim();
        self.load.contains_key(name) || self.save.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.load.is_empty() && self.save.is_empty()
    }
}

impl fmt::Debug for ScriptLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptLibrary")
            .field("load", &self.load.keys().collect::<Vec<_>>())
            .field("save", &self.save.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ScriptEngine for ScriptLibrary {
    fn compile_load(&self, source: &str) -> BindingResult<LoadScript> {
        self.load
            .get(source.trim())
            .cloned()
            .ok_or_else(|| BindingError::plugin("script", format!("no load script registered as '{}'", source.trim())))
    }

    fn compile_save(&self, source: &str) -> BindingResult<SaveScript> {
        self.save
            .get(source.trim())
            .cloned()
            .ok_or_else(|| BindingError::plugin("script", format!("no save script registered as '{}'", source.trim())))
    }
}

/// Runs script callbacks against a narrowed widget and context
pub struct ScriptBinding {
    common: CommonAttributes,
    widget_id: Option<String>,
    path: Path,
    load_script: Option<LoadScript>,
    save_script: Option<SaveScript>,
    children: ChildBindings,
}

impl fmt::Debug for ScriptBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptBinding")
            .field("widget_id", &self.widget_id)
            .field("path", &self.path)
            .field("load", &self.load_script.is_some())
            .field("save", &self.save_script.is_some())
            .field("children", &self.children.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ScriptBinding {
    pub fn new(common: CommonAttributes, widget_id: Option<String>, path: Path) -> Self {
        Self {
            common,
            widget_id,
            path,
            load_script: None,
            save_script: None,
            children: ChildBindings::new(),
        }
    }

    pub fn with_load(mut self, script: LoadScript) -> Self {
        self.load_script = Some(script);
        self
    }

    pub fn with_save(mut self, script: SaveScript) -> Self {
        self.save_script = Some(script);
        self
    }

    pub fn with_children(mut self, children: ChildBindings) -> Self {
        self.children = children;
        self
    }
}

impl Binding for ScriptBinding {
    fn common(&self) -> &CommonAttributes {
        &self.common
    }

    fn do_load(&self, widget: &mut Widget, context: &mut PathContext<'_>) -> BindingResult<()> {
        let Some(script) = &self.load_script else {
            return Ok(());
        };
        let target = match &self.widget_id {
            Some(id) => select_widget_mut(widget, id)?,
            None => widget,
        };
        match context.pointer(&self.path)? {
            Some(pointer) => {
                let mut narrowed = context.relative_context(pointer);
                script(target, Some(&mut narrowed), &self.children)
            }
            None => script(target, None, &self.children),
        }
    }

    fn do_save(&self, widget: &Widget, context: &mut PathContext<'_>) -> BindingResult<()> {
        let Some(script) = &self.save_script else {
            return Ok(());
        };
        let target = match &self.widget_id {
            Some(id) => select_widget(widget, id)?,
            None => widget,
        };
        let pointer = context.create_path(&self.path)?;
        let mut narrowed = context.relative_context(pointer);
        script(target, &mut narrowed, &self.children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::XmlDocument;
    use crate::binding::{FieldSpec, ValueBinding};
    use crate::model::{Field, Group, Value};

    fn library() -> ScriptLibrary {
        let mut library = ScriptLibrary::new();
        let load: LoadScript = Arc::new(
            |widget: &mut Widget, context: Option<&mut PathContext>, children: &ChildBindings| -> BindingResult<()> {
                match context {
                    Some(context) => children["name"].load(widget, context),
                    None => widget
                        .lookup_mut("name")
                        .ok_or_else(|| BindingError::widget_not_found("name"))?
                        .set_value(Some(Value::from("(none)"))),
                }
            },
        );
        let save: SaveScript = Arc::new(|widget: &Widget, context: &mut PathContext, children: &ChildBindings| -> BindingResult<()> {
            children["name"].save(widget, context)?;
            context.create_path_and_set_value(&Path::parse("@by-script")?, Some(&Value::from("yes")))?;
            Ok(())
        });
        library.register_load("loadPerson", load);
        library.register_save("savePerson", save);
        library
    }

    fn binding(library: &ScriptLibrary, at: &str) -> ScriptBinding {
        let mut children = ChildBindings::new();
        children.insert(
            "name".to_string(),
            Arc::new(ValueBinding::new(
                CommonAttributes::default(),
                FieldSpec::new("name", Path::parse("name").unwrap()),
            )),
        );
        ScriptBinding::new(CommonAttributes::default(), None, Path::parse(at).unwrap())
            .with_load(library.compile_load("  loadPerson\n").unwrap())
            .with_save(library.compile_save("savePerson").unwrap())
            .with_children(children)
    }

    #[test]
    fn test_scripts_receive_children_and_context() {
        let library = library();
        let mut model = XmlDocument::parse("m.xml", "<doc><person><name>Ann</name></person></doc>").unwrap();
        let mut form: Widget = Group::new("form").with(Field::new("name")).into();
        let binding = binding(&library, "person");

        binding.load_form_from_model(&mut form, &mut model).unwrap();
        assert_eq!(form.lookup("name").and_then(Widget::value), Some(Value::from("Ann")));

        form.lookup_mut("name").unwrap().set_value(Some("Bea".into())).unwrap();
        binding.save_form_to_model(&form, &mut model).unwrap();
        assert_eq!(
            model.to_xml_string(),
            r#"<doc><person by-script="yes"><name>Bea</name></person></doc>"#
        );
    }

    #[test]
    fn test_load_script_without_context() {
        let library = library();
        let mut model = XmlDocument::parse("m.xml", "<doc/>").unwrap();
        let mut form: Widget = Group::new("form").with(Field::new("name")).into();
        binding(&library, "person").load_form_from_model(&mut form, &mut model).unwrap();
        assert_eq!(form.lookup("name").and_then(Widget::value), Some(Value::from("(none)")));
    }

    #[test]
    fn test_unknown_script_is_rejected() {
        let library = library();
        assert!(library.contains("loadPerson"));
        assert!(matches!(
            library.compile_load("form.name = 1"),
            Err(BindingError::Plugin { .. })
        ));
    }
}
