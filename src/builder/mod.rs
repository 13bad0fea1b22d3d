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

//! Binding descriptor parsing
//!
//! A descriptor is an XML document in the binding namespace. Each element is
//! turned into a binding node by the [`BindingBuilder`] registered under its
//! local name; [`BuildAssistant`] carries what builders share while one
//! descriptor is processed: common attribute parsing, descriptor locations,
//! class scopes and the application's plugin registries.
//!
//! ```
//! use cforms_binding::builder::DescriptorBuilder;
//!
//! let builder = DescriptorBuilder::new();
//! let binding = builder
//!     .build_from_str(
//!         "person.xml",
//!         r#"<fb:context xmlns:fb="http://apache.org/cocoon/forms/1.0#binding" path=".">
//!              <fb:value id="name" path="name"/>
//!            </fb:context>"#,
//!     )
//!     .unwrap();
//! assert!(format!("{binding:?}").contains("ValueBinding"));
//! ```

pub mod builders;
pub mod registry;

pub use registry::BuilderRegistry;

use rustc_hash::FxHashMap;
use std::fmt;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use crate::backend::xml::declared_namespaces;
use crate::binding::composite::ClassSlot;
use crate::binding::{
    BeanFactory, BindingRef, CommonAttributes, ComposedBinding, CustomBindingFactory, Direction,
    Leniency, ScriptEngine,
};
use crate::convertor::{Convertor, ConvertorConfig, ConvertorRegistry, Locale};
use crate::error::{BindingError, BindingResult, DescriptorLocation};
use crate::path::Path;

/// Namespace of binding descriptor elements
pub const BINDING_NS: &str = "http://apache.org/cocoon/forms/1.0#binding";

/// Namespace of form definition elements (convertors)
pub const DEFINITION_NS: &str = "http://apache.org/cocoon/forms/1.0#definition";

/// Builds one kind of binding node from its descriptor element
pub trait BindingBuilder: fmt::Debug + Send + Sync {
    fn build(
        &self,
        element: roxmltree::Node<'_, '_>,
        assistant: &mut BuildAssistant<'_>,
    ) -> BindingResult<BindingRef>;
}

/// Parses descriptors into binding trees
///
/// Holds the element builders and the registries descriptors refer to by
/// name: convertor datatypes, custom binding classes, bean factories and the
/// script engine.
#[derive(Clone)]
pub struct DescriptorBuilder {
    builders: BuilderRegistry,
    convertors: ConvertorRegistry,
    custom: FxHashMap<String, CustomBindingFactory>,
    beans: FxHashMap<String, BeanFactory>,
    scripts: Option<Arc<dyn ScriptEngine>>,
    default_locale: Locale,
}

impl fmt::Debug for DescriptorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut custom: Vec<&str> = self.custom.keys().map(String::as_str).collect();
        custom.sort_unstable();
        let mut beans: Vec<&str> = self.beans.keys().map(String::as_str).collect();
        beans.sort_unstable();
        f.debug_struct("DescriptorBuilder")
            .field("builders", &self.builders)
            .field("convertors", &self.convertors)
            .field("custom", &custom)
            .field("beans", &beans)
            .field("scripts", &self.scripts)
            .field("default_locale", &self.default_locale)
            .finish()
    }
}

impl Default for DescriptorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptorBuilder {
    /// Builder with all built-in elements and convertors
    pub fn new() -> Self {
        Self {
            builders: BuilderRegistry::with_builtins(),
            convertors: ConvertorRegistry::with_builtins(),
            custom: FxHashMap::default(),
            beans: FxHashMap::default(),
            scripts: None,
            default_locale: Locale::default(),
        }
    }

    pub fn with_convertors(mut self, convertors: ConvertorRegistry) -> Self {
        self.convertors = convertors;
        self
    }

    pub fn with_script_engine(mut self, engine: Arc<dyn ScriptEngine>) -> Self {
        self.scripts = Some(engine);
        self
    }

    /// Locale for convertors that do not name one
    pub fn with_default_locale(mut self, locale: Locale) -> Self {
        self.default_locale = locale;
        self
    }

    /// Register or replace the builder for an element name
    pub fn register_builder(&mut self, element: impl Into<String>, builder: Arc<dyn BindingBuilder>) {
        self.builders.register(element, builder);
    }

    /// Make a custom binding available under its `class` / `builderclass` name
    pub fn register_custom_binding(&mut self, class_name: impl Into<String>, factory: CustomBindingFactory) {
        self.custom.insert(class_name.into(), factory);
    }

    /// Make a bean factory available under its `classname`
    pub fn register_bean_factory(&mut self, class_name: impl Into<String>, factory: BeanFactory) {
        self.beans.insert(class_name.into(), factory);
    }

    pub fn builders(&self) -> &BuilderRegistry {
        &self.builders
    }

    pub fn convertors(&self) -> &ConvertorRegistry {
        &self.convertors
    }

    /// Build the binding tree of an in-memory descriptor
    pub fn build_from_str(&self, name: &str, text: &str) -> BindingResult<BindingRef> {
        self.build(name, text, None)
    }

    /// Read and build a descriptor file; `src` references resolve next to it
    pub fn build_from_file(&self, file: &FsPath) -> BindingResult<BindingRef> {
        let name = file.display().to_string();
        let text = std::fs::read_to_string(file).map_err(|cause| BindingError::Io {
            descriptor: name.clone(),
            cause,
        })?;
        self.build(&name, &text, file.parent().map(FsPath::to_path_buf))
    }

    fn build(&self, name: &str, text: &str, base_dir: Option<PathBuf>) -> BindingResult<BindingRef> {
        let document = roxmltree::Document::parse(text).map_err(|e| BindingError::Xml {
            document: name.to_string(),
            message: e.to_string(),
        })?;
        let root = document.root_element();
        let mut assistant = BuildAssistant {
            builder: self,
            descriptor: name,
            base_dir,
            scopes: Vec::new(),
        };
        if root.tag_name().namespace() != Some(BINDING_NS) {
            return Err(BindingError::configuration(
                format!(
                    "Root element '{}' is not in the binding namespace {}",
                    root.tag_name().name(),
                    BINDING_NS
                ),
                Some(assistant.location(root)),
            ));
        }

        let binding = assistant.build_element(root)?;
        log::debug!("Built binding tree from descriptor '{}'", name);
        Ok(binding)
    }
}

/// Shared state and helpers for the builders of one descriptor
pub struct BuildAssistant<'a> {
    builder: &'a DescriptorBuilder,
    descriptor: &'a str,
    base_dir: Option<PathBuf>,
    /// Class slots visible at the current element, innermost last
    scopes: Vec<FxHashMap<String, ClassSlot>>,
}

impl fmt::Debug for BuildAssistant<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildAssistant")
            .field("descriptor", &self.descriptor)
            .field("base_dir", &self.base_dir)
            .field("scopes", &self.scopes.len())
            .finish()
    }
}

/// Whether `node` is a binding element named `local`
pub fn is_binding_element(node: roxmltree::Node<'_, '_>, local: &str) -> bool {
    node.is_element() && node.tag_name().namespace() == Some(BINDING_NS) && node.tag_name().name() == local
}

fn binding_children<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
) -> impl Iterator<Item = roxmltree::Node<'a, 'input>> {
    node.children()
        .filter(|child| child.is_element() && child.tag_name().namespace() == Some(BINDING_NS))
}

impl<'a> BuildAssistant<'a> {
    pub fn descriptor(&self) -> &str {
        self.descriptor
    }

    /// Directory relative `src` references resolve against
    pub fn base_dir(&self) -> Option<&FsPath> {
        self.base_dir.as_deref()
    }

    pub fn location(&self, node: roxmltree::Node<'_, '_>) -> DescriptorLocation {
        let pos = node.document().text_pos_at(node.range().start);
        DescriptorLocation::new(self.descriptor, pos.row, pos.col)
    }

    /// Configuration error located at `node`
    pub fn error(&self, node: roxmltree::Node<'_, '_>, message: impl Into<String>) -> BindingError {
        BindingError::configuration(message, Some(self.location(node)))
    }

    /// `direction`, `lenient` and local namespace declarations of `node`
    pub fn common(&self, node: roxmltree::Node<'_, '_>) -> BindingResult<CommonAttributes> {
        let direction = match node.attribute("direction") {
            Some(text) => text
                .parse::<Direction>()
                .map_err(|message| self.error(node, message))?,
            None => Direction::default(),
        };
        let leniency = match self.optional_bool(node, "lenient")? {
            Some(true) => Leniency::Lenient,
            Some(false) => Leniency::Strict,
            None => Leniency::Inherit,
        };
        let namespaces = declared_namespaces(node)
            .into_iter()
            .filter_map(|(prefix, uri)| prefix.map(|prefix| (prefix, uri)))
            .collect();
        Ok(CommonAttributes {
            direction,
            leniency,
            namespaces,
            location: Some(self.location(node)),
        })
    }

    pub fn required_attr<'n>(&self, node: roxmltree::Node<'n, '_>, name: &str) -> BindingResult<&'n str> {
        node.attribute(name).ok_or_else(|| {
            self.error(
                node,
                format!("Missing attribute '{}' on <{}>", name, node.tag_name().name()),
            )
        })
    }

    /// Parse the path held by attribute `name`, or `default` when absent
    pub fn path_attr(
        &self,
        node: roxmltree::Node<'_, '_>,
        name: &str,
        default: Option<&str>,
    ) -> BindingResult<Path> {
        let text = match (node.attribute(name), default) {
            (Some(text), _) => text,
            (None, Some(default)) => default,
            (None, None) => self.required_attr(node, name)?,
        };
        text.parse::<Path>()
            .map_err(|e| self.error(node, format!("Invalid path in attribute '{name}': {e}")))
    }

    pub fn optional_bool(&self, node: roxmltree::Node<'_, '_>, name: &str) -> BindingResult<Option<bool>> {
        match node.attribute(name) {
            None => Ok(None),
            Some("true") => Ok(Some(true)),
            Some("false") => Ok(Some(false)),
            Some(other) => Err(self.error(
                node,
                format!("Attribute '{name}' must be 'true' or 'false', got '{other}'"),
            )),
        }
    }

    pub fn bool_attr(&self, node: roxmltree::Node<'_, '_>, name: &str, default: bool) -> BindingResult<bool> {
        Ok(self.optional_bool(node, name)?.unwrap_or(default))
    }

    /// First binding-namespace child named `local`
    pub fn child_element<'n, 'input>(
        &self,
        node: roxmltree::Node<'n, 'input>,
        local: &str,
    ) -> Option<roxmltree::Node<'n, 'input>> {
        node.children().find(|child| is_binding_element(*child, local))
    }

    /// Build `node` with the builder registered for its local name
    pub fn build_element(&mut self, node: roxmltree::Node<'_, '_>) -> BindingResult<BindingRef> {
        let name = node.tag_name().name();
        let builder = self
            .builder
            .builders
            .get(name)
            .cloned()
            .ok_or_else(|| self.error(node, format!("Unknown binding element <{name}>")))?;
        builder.build(node, self)
    }

    /// Build every binding child of `node`, with the classes it defines in scope
    pub fn build_children(&mut self, node: roxmltree::Node<'_, '_>) -> BindingResult<Vec<BindingRef>> {
        self.push_scope(node);
        let result: BindingResult<Vec<BindingRef>> = binding_children(node)
            .map(|child| self.build_element(child))
            .collect();
        self.pop_scope();
        result
    }

    /// The children of the binding child `local`, as one composed binding
    pub fn build_hook(
        &mut self,
        node: roxmltree::Node<'_, '_>,
        local: &str,
    ) -> BindingResult<Option<BindingRef>> {
        let Some(hook) = self.child_element(node, local) else {
            return Ok(None);
        };
        let common = self.common(hook)?;
        let children = self.build_children(hook)?;
        Ok(Some(Arc::new(ComposedBinding::new(common, children))))
    }

    fn push_scope(&mut self, node: roxmltree::Node<'_, '_>) {
        let scope = binding_children(node)
            .filter(|child| child.tag_name().name() == "class")
            .filter_map(|child| child.attribute("id"))
            .map(|name| (name.to_string(), ClassSlot::default()))
            .collect();
        self.scopes.push(scope);
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Slot of the innermost visible class called `name`
    pub fn class_slot(&self, name: &str) -> Option<ClassSlot> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .cloned()
    }

    /// Convertor declared by an `fd:convertor` child of `node`
    pub fn convertor(
        &self,
        node: roxmltree::Node<'_, '_>,
    ) -> BindingResult<Option<(Arc<dyn Convertor>, Locale)>> {
        let Some(element) = node.children().find(|child| {
            child.is_element()
                && child.tag_name().namespace() == Some(DEFINITION_NS)
                && child.tag_name().name() == "convertor"
        }) else {
            return Ok(None);
        };

        let datatype = element
            .attribute("datatype")
            .or_else(|| element.attribute("type"))
            .ok_or_else(|| self.error(element, "Convertor needs a 'datatype' attribute"))?;
        let mut config = ConvertorConfig::new(datatype);
        if let Some(pattern) = element.attribute("pattern") {
            config = config.with_pattern(pattern);
        }
        for patterns in element
            .children()
            .filter(|c| c.is_element() && c.tag_name().name() == "patterns")
        {
            for pattern in patterns
                .children()
                .filter(|c| c.is_element() && c.tag_name().name() == "pattern")
            {
                config = config.with_pattern(pattern.text().unwrap_or_default().trim());
            }
        }

        let locale = match element.attribute("locale") {
            Some(text) => text
                .parse::<Locale>()
                .map_err(|e| self.error(element, e.to_string()))?,
            None => self.builder.default_locale.clone(),
        };
        let convertor = self
            .builder
            .convertors
            .create(&config)
            .map_err(|e| self.error(element, e.to_string()))?;
        Ok(Some((convertor, locale)))
    }

    pub fn custom_factory(&self, class_name: &str) -> Option<CustomBindingFactory> {
        self.builder.custom.get(class_name).cloned()
    }

    pub fn bean_factory(&self, class_name: &str) -> Option<BeanFactory> {
        self.builder.beans.get(class_name).cloned()
    }

    pub fn script_engine(&self) -> Option<Arc<dyn ScriptEngine>> {
        self.builder.scripts.clone()
    }
}
