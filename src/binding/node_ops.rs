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

//! Structural model operations used by repeater insert and delete hooks
//!
//! These bindings only act on save. They work on the context node: inserts
//! append below it, deletes remove it.

use std::fmt;
use std::sync::Arc;

use super::{Binding, CommonAttributes};
use crate::backend::NodeTemplate;
use crate::error::BindingResult;
use crate::model::Widget;
use crate::path::{Path, PathContext};

/// Appends a copy of a fragment as last child of the context node
#[derive(Debug)]
pub struct InsertNodeBinding {
    common: CommonAttributes,
    template: NodeTemplate,
}

impl InsertNodeBinding {
    pub fn new(common: CommonAttributes, template: NodeTemplate) -> Self {
        Self { common, template }
    }

    pub fn template(&self) -> &NodeTemplate {
        &self.template
    }
}

impl Binding for InsertNodeBinding {
    fn common(&self) -> &CommonAttributes {
        &self.common
    }

    fn do_load(&self, _widget: &mut Widget, _context: &mut PathContext<'_>) -> BindingResult<()> {
        Ok(())
    }

    fn do_save(&self, _widget: &Widget, context: &mut PathContext<'_>) -> BindingResult<()> {
        let pointer = context.append_node(&Path::self_path(), &self.template)?;
        log::debug!("Inserted node {}", pointer);
        Ok(())
    }
}

/// Produces a fresh item for [`InsertBeanBinding`]
pub type BeanFactory = Arc<dyn Fn() -> serde_json::Value + Send + Sync>;

/// Appends a new item built by a registered factory to a named collection
pub struct InsertBeanBinding {
    common: CommonAttributes,
    class_name: String,
    add_method: String,
    factory: BeanFactory,
}

impl fmt::Debug for InsertBeanBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InsertBeanBinding")
            .field("class_name", &self.class_name)
            .field("add_method", &self.add_method)
            .finish_non_exhaustive()
    }
}

impl InsertBeanBinding {
    pub fn new(
        common: CommonAttributes,
        class_name: impl Into<String>,
        add_method: impl Into<String>,
        factory: BeanFactory,
    ) -> Self {
        Self {
            common,
            class_name: class_name.into(),
            add_method: add_method.into(),
            factory,
        }
    }
}

impl Binding for InsertBeanBinding {
    fn common(&self) -> &CommonAttributes {
        &self.common
    }

    fn do_load(&self, _widget: &mut Widget, _context: &mut PathContext<'_>) -> BindingResult<()> {
        Ok(())
    }

    fn do_save(&self, _widget: &Widget, context: &mut PathContext<'_>) -> BindingResult<()> {
        let template = NodeTemplate::Json {
            name: self.add_method.clone(),
            value: (self.factory)(),
        };
        let pointer = context.append_node(&Path::self_path(), &template)?;
        log::debug!("Inserted new '{}' at {}", self.class_name, pointer);
        Ok(())
    }
}

/// Removes the context node
#[derive(Debug)]
pub struct DeleteNodeBinding {
    common: CommonAttributes,
}

impl DeleteNodeBinding {
    pub fn new(common: CommonAttributes) -> Self {
        Self { common }
    }
}

impl Binding for DeleteNodeBinding {
    fn common(&self) -> &CommonAttributes {
        &self.common
    }

    fn do_load(&self, _widget: &mut Widget, _context: &mut PathContext<'_>) -> BindingResult<()> {
        Ok(())
    }

    fn do_save(&self, _widget: &Widget, context: &mut PathContext<'_>) -> BindingResult<()> {
        log::debug!("Removing node {}", context.context_pointer());
        context.remove_path(&Path::self_path())?;
        Ok(())
    }
}
