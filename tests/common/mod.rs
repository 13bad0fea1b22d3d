//! Shared helpers for the integration tests

#![allow(dead_code)]

use cforms_binding::backend::{DataModel, NodeTemplate};
use cforms_binding::error::PathResult;
use cforms_binding::model::Value;
use cforms_binding::path::{NodeName, Pointer};
use cforms_binding::{BindingRef, DescriptorBuilder};

pub const BINDING_NS: &str = "http://apache.org/cocoon/forms/1.0#binding";

/// Wrap descriptor elements in a root context with the usual prefixes
pub fn descriptor(body: &str) -> String {
    format!(
        r#"<fb:context xmlns:fb="{BINDING_NS}" xmlns:fd="http://apache.org/cocoon/forms/1.0#definition" path=".">{body}</fb:context>"#
    )
}

pub fn build(body: &str) -> BindingRef {
    DescriptorBuilder::new()
        .build_from_str("test-binding.xml", &descriptor(body))
        .unwrap()
}

/// Model wrapper counting every mutation
pub struct CountingModel<M> {
    pub inner: M,
    pub mutations: usize,
}

impl<M: DataModel> CountingModel<M> {
    pub fn new(inner: M) -> Self {
        Self {
            inner,
            mutations: 0,
        }
    }
}

impl<M: DataModel> DataModel for CountingModel<M> {
    fn context_root(&self) -> Pointer {
        self.inner.context_root()
    }

    fn exists(&self, at: &Pointer) -> bool {
        self.inner.exists(at)
    }

    fn children(&self, at: &Pointer, name: Option<&NodeName>) -> Vec<Pointer> {
        self.inner.children(at, name)
    }

    fn attributes(&self, at: &Pointer, name: Option<&NodeName>) -> Vec<Pointer> {
        self.inner.attributes(at, name)
    }

    fn text(&self, at: &Pointer) -> Option<Pointer> {
        self.inner.text(at)
    }

    fn value(&self, at: &Pointer) -> Option<Value> {
        self.inner.value(at)
    }

    fn set_value(&mut self, at: &Pointer, value: Option<&Value>) -> PathResult<()> {
        self.mutations += 1;
        self.inner.set_value(at, value)
    }

    fn create_child(&mut self, at: &Pointer, name: &NodeName) -> PathResult<Pointer> {
        self.mutations += 1;
        self.inner.create_child(at, name)
    }

    fn create_attribute(&mut self, at: &Pointer, name: &NodeName) -> PathResult<Pointer> {
        self.mutations += 1;
        self.inner.create_attribute(at, name)
    }

    fn create_text(&mut self, at: &Pointer) -> PathResult<Pointer> {
        self.mutations += 1;
        self.inner.create_text(at)
    }

    fn remove(&mut self, at: &Pointer) -> PathResult<()> {
        self.mutations += 1;
        self.inner.remove(at)
    }

    fn append(&mut self, parent: &Pointer, template: &NodeTemplate) -> PathResult<Pointer> {
        self.mutations += 1;
        self.inner.append(parent, template)
    }
}
