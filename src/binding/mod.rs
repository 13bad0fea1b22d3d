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

//! Bindings: the load/save contract and its implementations
//!
//! A binding tree is built once from a descriptor and then walked by
//! [`Binding::load`] (model to widgets) and [`Binding::save`] (widgets to
//! model). The provided `load`/`save` methods apply the node's direction,
//! leniency and namespace settings and delegate to `do_load`/`do_save`.

pub mod composite;
pub mod custom;
pub mod node_ops;
pub mod repeater;
pub mod script;
pub mod simple_repeater;
pub mod value;

pub use composite::{
    CaseBinding, ClassBinding, ComposedBinding, ContextBinding, GroupBinding, NewBinding,
    UnionBinding,
};
pub use custom::{CustomBinding, CustomBindingFactory, PluginBinding};
pub use node_ops::{BeanFactory, DeleteNodeBinding, InsertBeanBinding, InsertNodeBinding};
pub use repeater::{RepeaterBinding, RowMatching};
pub use script::{ChildBindings, LoadScript, SaveScript, ScriptBinding, ScriptEngine, ScriptLibrary};
pub use simple_repeater::{SimpleRepeaterBinding, TempRepeaterBinding};
pub use value::{FieldSpec, UniqueFieldBinding, ValueBinding};

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::backend::DataModel;
use crate::error::{BindingError, BindingResult, DescriptorLocation};
use crate::model::Widget;
use crate::path::PathContext;

/// Which walks a binding takes part in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Model to widgets only
    Load,
    /// Widgets to model only
    Save,
    /// Both walks
    #[default]
    Both,
}

impl Direction {
    pub fn loads(&self) -> bool {
        matches!(self, Direction::Load | Direction::Both)
    }

    pub fn saves(&self) -> bool {
        matches!(self, Direction::Save | Direction::Both)
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "load" => Ok(Direction::Load),
            "save" => Ok(Direction::Save),
            "both" => Ok(Direction::Both),
            other => Err(format!(
                "Invalid direction '{other}', expected 'load', 'save' or 'both'"
            )),
        }
    }
}

/// Leniency requested by a binding node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Leniency {
    /// Keep the flag of the surrounding context
    #[default]
    Inherit,
    Lenient,
    Strict,
}

impl Leniency {
    /// Effective flag given the inherited one
    pub fn resolve(&self, inherited: bool) -> bool {
        match self {
            Leniency::Inherit => inherited,
            Leniency::Lenient => true,
            Leniency::Strict => false,
        }
    }
}

/// Settings every binding node carries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommonAttributes {
    pub direction: Direction,
    pub leniency: Leniency,
    /// Namespace prefixes declared on the descriptor element
    pub namespaces: Vec<(String, String)>,
    /// Descriptor element the node was built from
    pub location: Option<DescriptorLocation>,
}

impl CommonAttributes {
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_leniency(mut self, leniency: Leniency) -> Self {
        self.leniency = leniency;
        self
    }

    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.namespaces.push((prefix.into(), uri.into()));
        self
    }

    /// Descriptor location for messages, or `"?"`
    pub fn describe_location(&self) -> String {
        self.location
            .as_ref()
            .map_or_else(|| "?".to_string(), ToString::to_string)
    }
}

/// A node of a binding tree
pub trait Binding: fmt::Debug + Send + Sync {
    /// Direction, leniency and namespace settings of this node
    fn common(&self) -> &CommonAttributes;

    /// Copy model data into `widget`
    fn do_load(&self, widget: &mut Widget, context: &mut PathContext<'_>) -> BindingResult<()>;

    /// Copy widget data into the model
    fn do_save(&self, widget: &Widget, context: &mut PathContext<'_>) -> BindingResult<()>;

    /// Field mapping of value-like bindings, used for row identities
    fn field_spec(&self) -> Option<&FieldSpec> {
        None
    }

    /// Load with this node's settings applied to `context`
    fn load(&self, widget: &mut Widget, context: &mut PathContext<'_>) -> BindingResult<()> {
        let common = self.common();
        let inherited = context.is_lenient();
        context.set_lenient(common.leniency.resolve(inherited));
        register_namespaces(common, context);
        let result = if common.direction.loads() {
            self.do_load(widget, context)
        } else {
            Ok(())
        };
        context.set_lenient(inherited);
        result
    }

    /// Save with this node's settings applied to `context`
    fn save(&self, widget: &Widget, context: &mut PathContext<'_>) -> BindingResult<()> {
        let common = self.common();
        let inherited = context.is_lenient();
        context.set_lenient(common.leniency.resolve(inherited));
        register_namespaces(common, context);
        let result = if common.direction.saves() {
            self.do_save(widget, context)
        } else {
            Ok(())
        };
        context.set_lenient(inherited);
        result
    }

    /// Load a whole form from a model, starting lenient
    fn load_form_from_model(&self, form: &mut Widget, model: &mut dyn DataModel) -> BindingResult<()> {
        let mut context = PathContext::new(model);
        context.set_lenient(true);
        self.load(form, &mut context)
    }

    /// Save a whole form to a model, starting lenient
    fn save_form_to_model(&self, form: &Widget, model: &mut dyn DataModel) -> BindingResult<()> {
        let mut context = PathContext::new(model);
        context.set_lenient(true);
        self.save(form, &mut context)
    }
}

fn register_namespaces(common: &CommonAttributes, context: &mut PathContext<'_>) {
    for (prefix, uri) in &common.namespaces {
        context.register_namespace(prefix.clone(), uri.clone());
    }
}

/// Shared handle to a binding node
pub type BindingRef = Arc<dyn Binding>;

/// Resolve a widget id relative to `widget`
pub fn select_widget<'w>(widget: &'w Widget, id: &str) -> BindingResult<&'w Widget> {
    widget
        .lookup(id)
        .ok_or_else(|| BindingError::widget_not_found(id))
}

/// Resolve a widget id relative to `widget`, mutably
pub fn select_widget_mut<'w>(widget: &'w mut Widget, id: &str) -> BindingResult<&'w mut Widget> {
    widget
        .lookup_mut(id)
        .ok_or_else(|| BindingError::widget_not_found(id))
}

/// Run child bindings in order; the first failure aborts
pub(crate) fn load_all(
    children: &[BindingRef],
    widget: &mut Widget,
    context: &mut PathContext<'_>,
) -> BindingResult<()> {
    for child in children {
        child.load(widget, context)?;
    }
    Ok(())
}

pub(crate) fn save_all(
    children: &[BindingRef],
    widget: &Widget,
    context: &mut PathContext<'_>,
) -> BindingResult<()> {
    for child in children {
        child.save(widget, context)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::XmlDocument;
    use crate::model::{Field, Group, Value};
    use crate::path::Path;

    #[derive(Debug, Default)]
    struct Probe {
        common: CommonAttributes,
    }

    impl Binding for Probe {
        fn common(&self) -> &CommonAttributes {
            &self.common
        }

        fn do_load(&self, widget: &mut Widget, context: &mut PathContext<'_>) -> BindingResult<()> {
            let flag = Value::Boolean(context.is_lenient());
            select_widget_mut(widget, "seen")?.set_value(Some(flag))
        }

        fn do_save(&self, _widget: &Widget, context: &mut PathContext<'_>) -> BindingResult<()> {
            context.value(&Path::parse("missing")?)?;
            Ok(())
        }
    }

    fn form() -> Widget {
        Group::new("form").with(Field::new("seen")).into()
    }

    #[test]
    fn test_leniency_override_and_restore() {
        let mut model = XmlDocument::parse("m.xml", "<root/>").unwrap();
        let mut widget = form();
        let strict = Probe {
            common: CommonAttributes::default().with_leniency(Leniency::Strict),
        };
        let mut context = PathContext::new(&mut model);
        context.set_lenient(true);

        strict.load(&mut widget, &mut context).unwrap();
        assert_eq!(widget.lookup("seen").and_then(Widget::value), Some(Value::Boolean(false)));
        assert!(context.is_lenient());

        assert!(strict.save(&widget, &mut context).is_err());
        assert!(context.is_lenient(), "flag restored after a failure");

        let inherit = Probe::default();
        inherit.load(&mut widget, &mut context).unwrap();
        assert_eq!(widget.lookup("seen").and_then(Widget::value), Some(Value::Boolean(true)));
    }

    #[test]
    fn test_direction_skips_walks() {
        let mut model = XmlDocument::parse("m.xml", "<root/>").unwrap();
        let mut widget = form();
        let save_only = Probe {
            common: CommonAttributes::default()
                .with_direction(Direction::Save)
                .with_leniency(Leniency::Strict),
        };
        save_only.load_form_from_model(&mut widget, &mut model).unwrap();
        assert_eq!(widget.lookup("seen").and_then(Widget::value), None);

        let load_only = Probe {
            common: CommonAttributes::default()
                .with_direction(Direction::Load)
                .with_leniency(Leniency::Strict),
        };
        assert!(load_only.save_form_to_model(&widget, &mut model).is_ok());
    }

    #[test]
    fn test_direction_parsing() {
        assert_eq!("save".parse::<Direction>(), Ok(Direction::Save));
        assert!("sideways".parse::<Direction>().is_err());
        assert!(Direction::Both.loads() && Direction::Both.saves());
    }
}
