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

//! Plugin bindings registered by the application

use std::fmt;
use std::sync::Arc;

use super::{Binding, CommonAttributes, select_widget, select_widget_mut};
use crate::backend::ElementTemplate;
use crate::error::BindingResult;
use crate::model::Widget;
use crate::path::{Path, PathContext};

/// Application code bound like any other binding
///
/// The context handed in is already narrowed to the binding's path, and the
/// widget to its `id` when one is configured.
pub trait CustomBinding: fmt::Debug + Send + Sync {
    fn load(&self, widget: &mut Widget, context: &mut PathContext<'_>) -> BindingResult<()>;

    fn save(&self, widget: &Widget, context: &mut PathContext<'_>) -> BindingResult<()>;
}

/// Builds a plugin from the optional `config` element of its descriptor entry
pub type CustomBindingFactory =
    Arc<dyn Fn(Option<&ElementTemplate>) -> BindingResult<Arc<dyn CustomBinding>> + Send + Sync>;

/// Delegates to a registered [`CustomBinding`]
#[derive(Debug)]
pub struct PluginBinding {
    common: CommonAttributes,
    widget_id: Option<String>,
    path: Path,
    class_name: String,
    plugin: Arc<dyn CustomBinding>,
}

impl PluginBinding {
    pub fn new(
        common: CommonAttributes,
        widget_id: Option<String>,
        path: Path,
        class_name: impl Into<String>,
        plugin: Arc<dyn CustomBinding>,
    ) -> Self {
        Self {
            common,
            widget_id,
            path,
            class_name: class_name.into(),
            plugin,
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }
}

impl Binding for PluginBinding {
    fn common(&self) -> &CommonAttributes {
        &self.common
    }

    fn do_load(&self, widget: &mut Widget, context: &mut PathContext<'_>) -> BindingResult<()> {
        let Some(pointer) = context.pointer(&self.path)? else {
            log::debug!("Custom binding '{}': nothing at '{}'", self.class_name, self.path);
            return Ok(());
        };
        let target = match &self.widget_id {
            Some(id) => select_widget_mut(widget, id)?,
            None => widget,
        };
        let mut narrowed = context.relative_context(pointer);
        self.plugin.load(target, &mut narrowed)
    }

    fn do_save(&self, widget: &Widget, context: &mut PathContext<'_>) -> BindingResult<()> {
        let target = match &self.widget_id {
            Some(id) => select_widget(widget, id)?,
            None => widget,
        };
        let pointer = context.create_path(&self.path)?;
        let mut narrowed = context.relative_context(pointer);
        self.plugin.save(target, &mut narrowed)
    }
}
