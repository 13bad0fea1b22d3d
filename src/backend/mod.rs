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

//! Back-end data models
//!
//! A [`DataModel`] is the mutable graph bindings read from and write to. Nodes
//! are addressed by [`Pointer`]s; path evaluation and creation are layered on
//! top by [`crate::path`]. Two models ship with the crate: [`XmlDocument`] and
//! [`JsonModel`].

pub mod json;
pub mod xml;

pub use json::JsonModel;
pub use xml::XmlDocument;

use crate::error::PathResult;
use crate::model::Value;
use crate::path::{NodeName, Pointer};

/// Mutable node graph navigated by pointers
///
/// Element children are reported in document order. Pointers returned by the
/// model stay valid until the next structural change of the model.
pub trait DataModel: Send {
    /// Node a top-level binding context starts at
    fn context_root(&self) -> Pointer;

    /// Whether the pointer addresses an existing node
    fn exists(&self, at: &Pointer) -> bool;

    /// Child elements of `at`, restricted to `name` when given
    fn children(&self, at: &Pointer, name: Option<&NodeName>) -> Vec<Pointer>;

    /// Attributes of `at`, restricted to `name` when given
    fn attributes(&self, at: &Pointer, name: Option<&NodeName>) -> Vec<Pointer>;

    /// Text node of `at`, if it has one
    fn text(&self, at: &Pointer) -> Option<Pointer>;

    /// Scalar value of a node; containers without scalar content have none
    fn value(&self, at: &Pointer) -> Option<Value>;

    /// Replace the scalar value of a node; `None` clears it
    fn set_value(&mut self, at: &Pointer, value: Option<&Value>) -> PathResult<()>;

    /// Append a new empty child element and return its pointer
    fn create_child(&mut self, at: &Pointer, name: &NodeName) -> PathResult<Pointer>;

    /// Create an empty attribute, or return the existing one
    fn create_attribute(&mut self, at: &Pointer, name: &NodeName) -> PathResult<Pointer>;

    /// Create an empty text node, or return the existing one
    fn create_text(&mut self, at: &Pointer) -> PathResult<Pointer>;

    /// Detach a node and everything below it
    fn remove(&mut self, at: &Pointer) -> PathResult<()>;

    /// Append a copy of `template` as the last child of `parent`
    fn append(&mut self, parent: &Pointer, template: &NodeTemplate) -> PathResult<Pointer>;
}

/// Content inserted by insert operations
#[derive(Debug, Clone, PartialEq)]
pub enum NodeTemplate {
    /// XML fragment
    Element(ElementTemplate),
    /// JSON item appended to the collection named `name`
    Json {
        name: String,
        value: serde_json::Value,
    },
}

/// Attribute of an [`ElementTemplate`]
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeTemplate {
    pub name: NodeName,
    pub prefix: Option<String>,
    pub value: String,
}

/// Child of an [`ElementTemplate`]
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateNode {
    Element(ElementTemplate),
    Text(String),
}

/// Owned copy of an XML element, detached from the document it was read from
#[derive(Debug, Clone, PartialEq)]
pub struct ElementTemplate {
    pub name: NodeName,
    pub prefix: Option<String>,
    /// Namespace declarations needed to serialize the fragment on its own
    pub namespaces: Vec<(Option<String>, String)>,
    pub attributes: Vec<AttributeTemplate>,
    pub children: Vec<TemplateNode>,
}

impl ElementTemplate {
    /// Copy an element out of a parsed document. Whitespace-only text is dropped.
    pub fn from_node(node: roxmltree::Node<'_, '_>) -> ElementTemplate {
        let tag = node.tag_name();
        let name = match tag.namespace() {
            Some(uri) => NodeName::qualified(uri, tag.name()),
            None => NodeName::new(tag.name()),
        };
        let prefix = tag
            .namespace()
            .and_then(|uri| node.lookup_prefix(uri))
            .map(str::to_string);

        let attributes = node
            .attributes()
            .map(|attr| AttributeTemplate {
                name: match attr.namespace() {
                    Some(uri) => NodeName::qualified(uri, attr.name()),
                    None => NodeName::new(attr.name()),
                },
                prefix: attr
                    .namespace()
                    .and_then(|uri| node.lookup_prefix(uri))
                    .map(str::to_string),
                value: attr.value().to_string(),
            })
            .collect();

        let children = node
            .children()
            .filter_map(|child| {
                if child.is_element() {
                    Some(TemplateNode::Element(ElementTemplate::from_node(child)))
                } else if child.is_text() {
                    child
                        .text()
                        .filter(|text| !text.trim().is_empty())
                        .map(|text| TemplateNode::Text(text.to_string()))
                } else {
                    None
                }
            })
            .collect();

        ElementTemplate {
            name,
            prefix,
            namespaces: xml::declared_namespaces(node),
            attributes,
            children,
        }
    }

    /// Parse a standalone XML fragment
    pub fn parse(text: &str) -> Result<ElementTemplate, roxmltree::Error> {
        let document = roxmltree::Document::parse(text)?;
        Ok(ElementTemplate::from_node(document.root_element()))
    }

    /// Attribute value by local name
    pub fn attribute(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.local() == local)
            .map(|a| a.value.as_str())
    }

    /// First child element with the given local name
    pub fn child(&self, local: &str) -> Option<&ElementTemplate> {
        self.elements().find(|e| e.name.local() == local)
    }

    pub fn elements(&self) -> impl Iterator<Item = &ElementTemplate> {
        self.children.iter().filter_map(|c| match c {
            TemplateNode::Element(e) => Some(e),
            TemplateNode::Text(_) => None,
        })
    }

    /// Concatenated direct text content
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|c| match c {
                TemplateNode::Text(t) => Some(t.as_str()),
                TemplateNode::Element(_) => None,
            })
            .collect()
    }

    /// JSON rendering used when the fragment lands in a JSON model.
    ///
    /// Attributes and child elements become members, repeated child names
    /// become arrays, and a leaf element becomes its text.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::{Map, Value as JsonValue};

        if self.attributes.is_empty() && self.elements().next().is_none() {
            let text = self.text();
            return if text.is_empty() {
                JsonValue::Object(Map::new())
            } else {
                JsonValue::String(text)
            };
        }

        let mut members = Map::new();
        for attribute in &self.attributes {
            members.insert(
                attribute.name.local().to_string(),
                JsonValue::String(attribute.value.clone()),
            );
        }
        for element in self.elements() {
            let key = element.name.local().to_string();
            let value = element.to_json();
            match members.get_mut(&key) {
                Some(JsonValue::Array(items)) => items.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = JsonValue::Array(vec![first, value]);
                }
                None => {
                    members.insert(key, value);
                }
            }
        }
        JsonValue::Object(members)
    }
}
