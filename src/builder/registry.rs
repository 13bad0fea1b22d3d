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

//! Element builders by local name

use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

use super::BindingBuilder;
use super::builders::{
    CaseBuilder, ClassBuilder, ContextBuilder, CustomBuilder, DeleteNodeBuilder, GroupBuilder,
    InsertBeanBuilder, InsertNodeBuilder, JavaScriptBuilder, NewBuilder, RepeaterBuilder,
    SimpleRepeaterBuilder, TempRepeaterBuilder, UnionBuilder, UniqueFieldBuilder, ValueBuilder,
};
use crate::binding::RowMatching;

/// Registry of [`BindingBuilder`]s keyed by descriptor element name
#[derive(Clone, Default)]
pub struct BuilderRegistry {
    builders: FxHashMap<String, Arc<dyn BindingBuilder>>,
}

impl fmt::Debug for BuilderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.builders.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("BuilderRegistry")
            .field("elements", &names)
            .finish()
    }
}

impl BuilderRegistry {
    /// Registry without builders
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a builder for every built-in descriptor element
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("context", Arc::new(ContextBuilder));
        registry.register("value", Arc::new(ValueBuilder));
        registry.register("unique-field", Arc::new(UniqueFieldBuilder));
        registry.register("group", Arc::new(GroupBuilder));
        registry.register("union", Arc::new(UnionBuilder));
        registry.register("case", Arc::new(CaseBuilder));
        registry.register("class", Arc::new(ClassBuilder));
        registry.register("new", Arc::new(NewBuilder));
        registry.register("repeater", Arc::new(RepeaterBuilder::new(RowMatching::Identity)));
        registry.register(
            "enhanced-repeater",
            Arc::new(RepeaterBuilder::new(RowMatching::LoadOrigin)),
        );
        registry.register("simple-repeater", Arc::new(SimpleRepeaterBuilder));
        registry.register("temp-repeater", Arc::new(TempRepeaterBuilder));
        registry.register("custom", Arc::new(CustomBuilder));
        registry.register("javascript", Arc::new(JavaScriptBuilder));
        registry.register("insert-bean", Arc::new(InsertBeanBuilder));
        registry.register("insert-node", Arc::new(InsertNodeBuilder));
        registry.register("delete-node", Arc::new(DeleteNodeBuilder));
        registry
    }

    /// Register or replace the builder for an element name
    pub fn register(&mut self, element: impl Into<String>, builder: Arc<dyn BindingBuilder>) {
        let element = element.into();
        if self.builders.insert(element.clone(), builder).is_some() {
            log::debug!("Replaced builder for <{}>", element);
        }
    }

    pub fn get(&self, element: &str) -> Option<&Arc<dyn BindingBuilder>> {
        self.builders.get(element)
    }

    pub fn contains(&self, element: &str) -> bool {
        self.builders.contains_key(element)
    }

    pub fn len(&self) -> usize {
        self.builders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_cover_descriptor_elements() {
        let registry = BuilderRegistry::with_builtins();
        for element in [
            "context",
            "value",
            "group",
            "union",
            "case",
            "class",
            "new",
            "repeater",
            "simple-repeater",
            "temp-repeater",
            "enhanced-repeater",
            "custom",
            "javascript",
            "insert-bean",
            "insert-node",
            "delete-node",
            "unique-field",
        ] {
            assert!(registry.contains(element), "missing builder for {element}");
        }
        assert!(!registry.contains("identity"));
        assert!(format!("{registry:?}").contains("\"value\""));
    }
}
