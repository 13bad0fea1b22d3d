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

//! Value and unique-field bindings

use std::sync::Arc;

use super::{Binding, BindingRef, CommonAttributes, save_all, select_widget, select_widget_mut};
use crate::convertor::{Convertor, Locale};
use crate::error::{BindingError, BindingResult};
use crate::model::{Value, ValueType, Widget, same_value};
use crate::path::{Path, PathContext, Pointer};

/// Mapping of one widget to one model node
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub widget_id: String,
    pub path: Path,
    pub convertor: Option<Arc<dyn Convertor>>,
    pub locale: Locale,
}

impl FieldSpec {
    pub fn new(widget_id: impl Into<String>, path: Path) -> Self {
        Self {
            widget_id: widget_id.into(),
            path,
            convertor: None,
            locale: Locale::default(),
        }
    }

    pub fn with_convertor(mut self, convertor: Arc<dyn Convertor>, locale: Locale) -> Self {
        self.convertor = Some(convertor);
        self.locale = locale;
        self
    }

    /// Read and convert the model value; missing nodes follow the context leniency
    pub fn read(&self, context: &PathContext<'_>) -> BindingResult<Option<Value>> {
        let raw = context.value(&self.path)?;
        Ok(raw.and_then(|value| self.convert_read(value)))
    }

    /// Read and convert the model value at the node the path selects, if any
    pub fn read_optional(&self, context: &PathContext<'_>) -> BindingResult<Option<Value>> {
        let raw = context
            .pointer(&self.path)?
            .and_then(|pointer| context.value_at(&pointer));
        Ok(raw.and_then(|value| self.convert_read(value)))
    }

    fn convert_read(&self, value: Value) -> Option<Value> {
        let Some(convertor) = &self.convertor else {
            return Some(value);
        };
        match value {
            Value::String(text) => match convertor.convert_from_string(&text, &self.locale) {
                Ok(converted) => Some(converted),
                Err(e) => {
                    log::warn!("Value of widget '{}' at '{}' not converted: {}", self.widget_id, self.path, e);
                    None
                }
            },
            other => {
                log::warn!(
                    "Convertor for widget '{}' applied to a non-string {} value at '{}'; value left unconverted",
                    self.widget_id,
                    other.value_type(),
                    self.path
                );
                Some(other)
            }
        }
    }

    /// Value to store in the model for a widget value
    pub fn to_model(&self, value: Option<Value>) -> BindingResult<Option<Value>> {
        match (&self.convertor, value) {
            (Some(convertor), Some(value)) => convertor
                .convert_to_string(&value, &self.locale)
                .map(|text| Some(Value::String(text)))
                .map_err(|cause| BindingError::Conversion {
                    id: self.widget_id.clone(),
                    cause,
                }),
            (_, value) => Ok(value),
        }
    }

    /// Whether the model already holds the widget value.
    ///
    /// `current` is the raw model value and `stored` the value the widget
    /// would write. With a convertor the raw text is also read back, so
    /// padding or an alternative spelling of the same value is kept.
    pub fn holds(&self, current: Option<&Value>, widget: Option<&Value>, stored: Option<&Value>) -> bool {
        if same_value(current, stored) {
            return true;
        }
        match (&self.convertor, current) {
            (Some(convertor), Some(Value::String(text))) => convertor
                .convert_from_string(text, &self.locale)
                .is_ok_and(|read| same_value(Some(&read), widget)),
            _ => false,
        }
    }

    /// Current value of the mapped widget below `widget`
    pub fn widget_value(&self, widget: &Widget) -> BindingResult<Option<Value>> {
        Ok(select_widget(widget, &self.widget_id)?.value())
    }
}

/// Store a model value in a widget, reading canonical text into typed fields
fn store(widget: &mut Widget, value: Option<Value>) -> BindingResult<()> {
    let expected = match &*widget {
        Widget::Field(field) => field.value_type(),
        _ => None,
    };
    let value = match (expected, value) {
        (Some(expected), Some(Value::String(text))) if expected != ValueType::String => {
            match expected.parse_canonical(&text) {
                Some(typed) => Some(typed),
                None if text.trim().is_empty() => None,
                None => Some(Value::String(text)),
            }
        }
        (_, value) => value,
    };
    widget.set_value(value)
}

/// Binds one widget value to one model node
#[derive(Debug)]
pub struct ValueBinding {
    common: CommonAttributes,
    field: FieldSpec,
    on_update: Vec<BindingRef>,
}

impl ValueBinding {
    pub fn new(common: CommonAttributes, field: FieldSpec) -> Self {
        Self {
            common,
            field,
            on_update: Vec::new(),
        }
    }

    /// Bindings run against the written node after a value changed
    pub fn with_on_update(mut self, bindings: Vec<BindingRef>) -> Self {
        self.on_update = bindings;
        self
    }

    pub fn field(&self) -> &FieldSpec {
        &self.field
    }
}

impl Binding for ValueBinding {
    fn common(&self) -> &CommonAttributes {
        &self.common
    }

    fn field_spec(&self) -> Option<&FieldSpec> {
        Some(&self.field)
    }

    fn do_load(&self, widget: &mut Widget, context: &mut PathContext<'_>) -> BindingResult<()> {
        let value = self.field.read(context)?;
        let target = select_widget_mut(widget, &self.field.widget_id)?;
        store(target, value)?;
        log::debug!("Loaded widget '{}' from '{}'", self.field.widget_id, self.field.path);
        Ok(())
    }

    fn do_save(&self, widget: &Widget, context: &mut PathContext<'_>) -> BindingResult<()> {
        let widget_value = self.field.widget_value(widget)?;
        let value = self.field.to_model(widget_value.clone())?;
        let current = existing_value(context, &self.field.path)?;
        if self.field.holds(current.as_ref(), widget_value.as_ref(), value.as_ref()) {
            return Ok(());
        }

        let pointer = context.create_path_and_set_value(&self.field.path, value.as_ref())?;
        log::debug!(
            "Saved widget '{}' to {} ({:?} -> {:?})",
            self.field.widget_id,
            pointer,
            current,
            value
        );

        if !self.on_update.is_empty() && context.exists(&pointer) {
            let mut written = context.relative_context(pointer);
            save_all(&self.on_update, widget, &mut written)?;
        }
        Ok(())
    }
}

fn existing_value(context: &PathContext<'_>, path: &Path) -> BindingResult<Option<Value>> {
    let pointer: Option<Pointer> = context.pointer(path)?;
    Ok(pointer.and_then(|p| context.value_at(&p)))
}

/// Binds an identity field: existing model values are never overwritten
#[derive(Debug)]
pub struct UniqueFieldBinding {
    common: CommonAttributes,
    field: FieldSpec,
}

impl UniqueFieldBinding {
    pub fn new(common: CommonAttributes, field: FieldSpec) -> Self {
        Self { common, field }
    }
}

impl Binding for UniqueFieldBinding {
    fn common(&self) -> &CommonAttributes {
        &self.common
    }

    fn field_spec(&self) -> Option<&FieldSpec> {
        Some(&self.field)
    }

    fn do_load(&self, widget: &mut Widget, context: &mut PathContext<'_>) -> BindingResult<()> {
        let value = self.field.read(context)?;
        store(select_widget_mut(widget, &self.field.widget_id)?, value)
    }

    fn do_save(&self, widget: &Widget, context: &mut PathContext<'_>) -> BindingResult<()> {
        let value = self.field.to_model(self.field.widget_value(widget)?)?;
        let Some(value) = value else {
            return Ok(());
        };
        let pointer = context.pointer(&self.field.path)?;
        let current = pointer.as_ref().and_then(|p| context.value_at(p));

        match current {
            None => {
                context.create_path_and_set_value(&self.field.path, Some(&value))?;
                Ok(())
            }
            Some(existing) if existing.is_empty_string() => {
                context.create_path_and_set_value(&self.field.path, Some(&value))?;
                Ok(())
            }
            Some(existing) if same_value(Some(&existing), Some(&value)) => Ok(()),
            Some(existing) => Err(BindingError::IdentityChange {
                pointer: pointer.map(|p| p.to_string()).unwrap_or_default(),
                current: existing.to_string(),
                requested: value.to_string(),
            }),
        }
    }
}
