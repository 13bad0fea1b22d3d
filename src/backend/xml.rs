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

//! Mutable XML document model
//!
//! Documents are parsed with `roxmltree` and copied into an arena of owned
//! nodes so that bindings can modify them. Detached nodes stay in the arena
//! but are unreachable from the document node.

use std::fmt::Write as _;

use super::{DataModel, ElementTemplate, NodeTemplate, TemplateNode};
use crate::error::{BindingError, BindingResult, PathError, PathResult};
use crate::model::Value;
use crate::path::{NodeName, Pointer, PointerStep};

type NodeId = usize;

const DOCUMENT: NodeId = 0;
const XML_PREFIX: &str = "xml";

#[derive(Debug, Clone)]
struct Attribute {
    name: NodeName,
    prefix: Option<String>,
    value: String,
}

#[derive(Debug, Clone)]
struct Element {
    name: NodeName,
    prefix: Option<String>,
    attributes: Vec<Attribute>,
    /// Namespace declarations made on this element
    namespaces: Vec<(Option<String>, String)>,
}

#[derive(Debug, Clone)]
enum NodeData {
    Document,
    Element(Element),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
}

/// Where a pointer lands inside the arena
#[derive(Debug, Clone, Copy)]
enum Target {
    Node(NodeId),
    Attribute(NodeId, usize),
    Text(NodeId),
}

/// An XML document that bindings can read and modify
#[derive(Debug, Clone)]
pub struct XmlDocument {
    nodes: Vec<Node>,
    /// Arena slots of removed nodes, reused before the arena grows
    free: Vec<NodeId>,
}

impl Default for XmlDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlDocument {
    /// Empty document without a document element
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                data: NodeData::Document,
            }],
            free: Vec::new(),
        }
    }

    /// Parse XML text; `name` is used in error messages
    pub fn parse(name: &str, text: &str) -> BindingResult<XmlDocument> {
        let parsed = roxmltree::Document::parse(text).map_err(|e| BindingError::Xml {
            document: name.to_string(),
            message: e.to_string(),
        })?;
        let mut document = XmlDocument::new();
        for child in parsed.root().children() {
            document.import(DOCUMENT, child);
        }
        log::debug!("Parsed XML model '{}' ({} nodes)", name, document.nodes.len());
        Ok(document)
    }

    fn import(&mut self, parent: NodeId, node: roxmltree::Node<'_, '_>) {
        let data = if node.is_element() {
            let template = ElementTemplate::from_node(node);
            NodeData::Element(Element {
                name: template.name,
                prefix: template.prefix,
                attributes: template
                    .attributes
                    .into_iter()
                    .map(|a| Attribute {
                        name: a.name,
                        prefix: a.prefix,
                        value: a.value,
                    })
                    .collect(),
                namespaces: template.namespaces,
            })
        } else if node.is_text() {
            NodeData::Text(node.text().unwrap_or_default().to_string())
        } else if node.is_comment() {
            NodeData::Comment(node.text().unwrap_or_default().to_string())
        } else {
            return;
        };
        let id = self.push(parent, data);
        if node.is_element() {
            for child in node.children() {
                self.import(id, child);
            }
        }
    }

    fn push(&mut self, parent: NodeId, data: NodeData) -> NodeId {
        let id = self.alloc(parent, data);
        self.nodes[parent].children.push(id);
        id
    }

    fn alloc(&mut self, parent: NodeId, data: NodeData) -> NodeId {
        let node = Node {
            parent: Some(parent),
            children: Vec::new(),
            data,
        };
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = node;
                id
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    /// Return a detached subtree's slots to the free list
    fn release(&mut self, id: NodeId) {
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            let node = &mut self.nodes[id];
            pending.append(&mut node.children);
            node.parent = None;
            node.data = NodeData::Text(String::new());
            self.free.push(id);
        }
    }

    fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id].data {
            NodeData::Element(element) => Some(element),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[id].data {
            NodeData::Element(element) => Some(element),
            _ => None,
        }
    }

    fn document_element(&self) -> Option<NodeId> {
        self.nodes[DOCUMENT]
            .children
            .iter()
            .copied()
            .find(|&id| self.element(id).is_some())
    }

    fn child_elements<'a>(
        &'a self,
        id: NodeId,
        name: Option<&'a NodeName>,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.nodes[id].children.iter().copied().filter(move |&child| {
            self.element(child)
                .is_some_and(|e| name.is_none_or(|n| &e.name == n))
        })
    }

    fn resolve(&self, pointer: &Pointer) -> Option<Target> {
        let mut current = DOCUMENT;
        let steps = pointer.steps();
        for (index, step) in steps.iter().enumerate() {
            let last = index + 1 == steps.len();
            match step {
                PointerStep::Element { name, position } => {
                    current = self
                        .child_elements(current, Some(name))
                        .nth(position.checked_sub(1)?)?;
                }
                PointerStep::Attribute(name) if last => {
                    let element = self.element(current)?;
                    let slot = element.attributes.iter().position(|a| &a.name == name)?;
                    return Some(Target::Attribute(current, slot));
                }
                PointerStep::Text if last => {
                    self.element(current)?;
                    return self.has_text(current).then_some(Target::Text(current));
                }
                _ => return None,
            }
        }
        Some(Target::Node(current))
    }

    fn resolve_or_err(&self, pointer: &Pointer) -> PathResult<Target> {
        self.resolve(pointer).ok_or_else(|| PathError::NotFound {
            path: pointer.to_string(),
        })
    }

    fn has_text(&self, id: NodeId) -> bool {
        self.nodes[id]
            .children
            .iter()
            .any(|&c| matches!(self.nodes[c].data, NodeData::Text(_)))
    }

    fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        for &child in &self.nodes[id].children {
            match &self.nodes[child].data {
                NodeData::Text(text) => out.push_str(text),
                NodeData::Element(_) => self.collect_text(child, out),
                _ => {}
            }
        }
    }

    fn set_text(&mut self, id: NodeId, text: Option<String>) {
        let nodes = &self.nodes;
        let (dropped, kept): (Vec<NodeId>, Vec<NodeId>) = self.nodes[id]
            .children
            .iter()
            .partition(|&&c| matches!(nodes[c].data, NodeData::Text(_)));
        self.nodes[id].children = kept;
        for text_id in dropped {
            self.release(text_id);
        }
        if let Some(text) = text {
            let text_id = self.alloc(id, NodeData::Text(text));
            self.nodes[id].children.insert(0, text_id);
        }
    }

    fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id].parent.take() {
            self.nodes[parent].children.retain(|&c| c != id);
        }
    }

    /// Position of an element among its same-named siblings
    fn pointer_to(&self, parent_pointer: &Pointer, parent: NodeId, id: NodeId) -> Pointer {
        let name = self
            .element(id)
            .map(|e| e.name.clone())
            .unwrap_or_else(|| NodeName::new(""));
        let position = self
            .child_elements(parent, Some(&name))
            .position(|c| c == id)
            .map_or(1, |p| p + 1);
        parent_pointer.child(name, position)
    }

    /// Prefix bound to `uri` at node `id`; the inner `None` is the default namespace
    fn prefix_in_scope(&self, id: NodeId, uri: &str) -> Option<Option<String>> {
        let mut current = Some(id);
        while let Some(node) = current {
            if let Some(element) = self.element(node) {
                if let Some((prefix, _)) = element.namespaces.iter().find(|(_, u)| u == uri) {
                    return Some(prefix.clone());
                }
            }
            current = self.nodes[node].parent;
        }
        None
    }

    fn default_namespace_in_scope(&self, id: NodeId) -> Option<String> {
        let mut current = Some(id);
        while let Some(node) = current {
            if let Some(element) = self.element(node) {
                if let Some((_, uri)) = element.namespaces.iter().find(|(p, _)| p.is_none()) {
                    return Some(uri.clone());
                }
            }
            current = self.nodes[node].parent;
        }
        None
    }

    fn fresh_prefix(&self) -> String {
        let used: Vec<&str> = self
            .nodes
            .iter()
            .filter_map(|n| match &n.data {
                NodeData::Element(e) => Some(e.namespaces.iter().filter_map(|(p, _)| p.as_deref())),
                _ => None,
            })
            .flatten()
            .collect();
        (1..)
            .map(|n| format!("ns{n}"))
            .find(|candidate| !used.contains(&candidate.as_str()))
            .unwrap_or_else(|| "ns".to_string())
    }

    /// Build an element named `name` under `parent`, declaring its namespace if needed
    fn new_element(&self, parent: NodeId, name: &NodeName) -> Element {
        let mut namespaces = Vec::new();
        let prefix = match name.namespace() {
            Some(uri) => match self.prefix_in_scope(parent, uri) {
                Some(prefix) => prefix,
                None => {
                    let prefix = self.fresh_prefix();
                    namespaces.push((Some(prefix.clone()), uri.to_string()));
                    Some(prefix)
                }
            },
            None => {
                if self
                    .default_namespace_in_scope(parent)
                    .is_some_and(|uri| !uri.is_empty())
                {
                    namespaces.push((None, String::new()));
                }
                None
            }
        };
        Element {
            name: name.clone(),
            prefix,
            attributes: Vec::new(),
            namespaces,
        }
    }

    fn insert_template(&mut self, parent: NodeId, template: &ElementTemplate) -> NodeId {
        let mut namespaces: Vec<(Option<String>, String)> = template
            .namespaces
            .iter()
            .filter(|(prefix, uri)| self.prefix_in_scope(parent, uri).as_ref() != Some(prefix))
            .cloned()
            .collect();
        if let Some(uri) = template.name.namespace() {
            let bound = self.prefix_in_scope(parent, uri) == Some(template.prefix.clone());
            if !bound && !namespaces.iter().any(|(p, u)| p == &template.prefix && u == uri) {
                namespaces.push((template.prefix.clone(), uri.to_string()));
            }
        }
        let element = Element {
            name: template.name.clone(),
            prefix: template.prefix.clone(),
            attributes: template
                .attributes
                .iter()
                .map(|a| Attribute {
                    name: a.name.clone(),
                    prefix: a.prefix.clone(),
                    value: a.value.clone(),
                })
                .collect(),
            namespaces,
        };
        let id = self.push(parent, NodeData::Element(element));
        for child in &template.children {
            match child {
                TemplateNode::Element(e) => {
                    self.insert_template(id, e);
                }
                TemplateNode::Text(text) => {
                    self.push(id, NodeData::Text(text.clone()));
                }
            }
        }
        id
    }

    fn insert_json(&mut self, parent: NodeId, name: &str, value: &serde_json::Value) -> NodeId {
        let element = self.new_element(parent, &NodeName::new(name));
        let id = self.push(parent, NodeData::Element(element));
        match value {
            serde_json::Value::Object(members) => {
                for (key, member) in members {
                    match member {
                        serde_json::Value::Array(items) => {
                            for item in items {
                                self.insert_json(id, key, item);
                            }
                        }
                        other => {
                            self.insert_json(id, key, other);
                        }
                    }
                }
            }
            serde_json::Value::Null => {}
            scalar => {
                let text = Value::from_json(scalar).map(|v| v.to_string()).unwrap_or_default();
                self.push(id, NodeData::Text(text));
            }
        }
        id
    }

    /// Serialize without an XML declaration
    pub fn to_xml_string(&self) -> String {
        let mut out = String::new();
        for &child in &self.nodes[DOCUMENT].children {
            self.write_node(child, &mut out);
        }
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id].data {
            NodeData::Document => {}
            NodeData::Text(text) => escape(text, false, out),
            NodeData::Comment(text) => {
                let _ = write!(out, "<!--{text}-->");
            }
            NodeData::Element(element) => {
                let qname = qualified(element.prefix.as_deref(), element.name.local());
                let _ = write!(out, "<{qname}");
                for (prefix, uri) in &element.namespaces {
                    match prefix {
                        Some(prefix) => {
                            let _ = write!(out, " xmlns:{prefix}=\"");
                        }
                        None => out.push_str(" xmlns=\""),
                    }
                    escape(uri, true, out);
                    out.push('"');
                }
                for attribute in &element.attributes {
                    let _ = write!(
                        out,
                        " {}=\"",
                        qualified(attribute.prefix.as_deref(), attribute.name.local())
                    );
                    escape(&attribute.value, true, out);
                    out.push('"');
                }
                let children = &self.nodes[id].children;
                if children.is_empty() {
                    out.push_str("/>");
                } else {
                    out.push('>');
                    for &child in children {
                        self.write_node(child, out);
                    }
                    let _ = write!(out, "</{qname}>");
                }
            }
        }
    }
}

fn qualified(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}:{local}"),
        None => local.to_string(),
    }
}

fn escape(text: &str, attribute: bool, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
}

/// Namespaces declared on `node` itself, without the implicit `xml` binding
pub(crate) fn declared_namespaces(node: roxmltree::Node<'_, '_>) -> Vec<(Option<String>, String)> {
    let inherited: Vec<(Option<&str>, &str)> = node
        .parent_element()
        .map(|parent| parent.namespaces().map(|ns| (ns.name(), ns.uri())).collect())
        .unwrap_or_default();
    node.namespaces()
        .filter(|ns| ns.name() != Some(XML_PREFIX))
        .filter(|ns| !inherited.contains(&(ns.name(), ns.uri())))
        .map(|ns| (ns.name().map(str::to_string), ns.uri().to_string()))
        .collect()
}

impl DataModel for XmlDocument {
    fn context_root(&self) -> Pointer {
        match self.document_element() {
            Some(id) => self.pointer_to(&Pointer::root(), DOCUMENT, id),
            None => Pointer::root(),
        }
    }

    fn exists(&self, at: &Pointer) -> bool {
        self.resolve(at).is_some()
    }

    fn children(&self, at: &Pointer, name: Option<&NodeName>) -> Vec<Pointer> {
        let Some(Target::Node(id)) = self.resolve(at) else {
            return Vec::new();
        };
        match name {
            Some(name) => self
                .child_elements(id, Some(name))
                .enumerate()
                .map(|(index, _)| at.child(name.clone(), index + 1))
                .collect(),
            None => self
                .child_elements(id, None)
                .map(|child| self.pointer_to(at, id, child))
                .collect(),
        }
    }

    fn attributes(&self, at: &Pointer, name: Option<&NodeName>) -> Vec<Pointer> {
        let Some(Target::Node(id)) = self.resolve(at) else {
            return Vec::new();
        };
        let Some(element) = self.element(id) else {
            return Vec::new();
        };
        element
            .attributes
            .iter()
            .filter(|a| name.is_none_or(|n| &a.name == n))
            .map(|a| at.attribute(a.name.clone()))
            .collect()
    }

    fn text(&self, at: &Pointer) -> Option<Pointer> {
        match self.resolve(at)? {
            Target::Node(id) if self.has_text(id) => Some(at.text()),
            _ => None,
        }
    }

    fn value(&self, at: &Pointer) -> Option<Value> {
        match self.resolve(at)? {
            Target::Node(DOCUMENT) => None,
            Target::Node(id) | Target::Text(id) => Some(Value::String(self.text_content(id))),
            Target::Attribute(id, slot) => self
                .element(id)
                .map(|e| Value::String(e.attributes[slot].value.clone())),
        }
    }

    fn set_value(&mut self, at: &Pointer, value: Option<&Value>) -> PathResult<()> {
        let text = value.map(Value::to_string);
        match self.resolve_or_err(at)? {
            Target::Node(DOCUMENT) => Err(PathError::Unsupported {
                pointer: at.to_string(),
                reason: "the document node has no value".to_string(),
            }),
            Target::Node(id) | Target::Text(id) => {
                self.set_text(id, text);
                Ok(())
            }
            Target::Attribute(id, slot) => {
                if let Some(element) = self.element_mut(id) {
                    match text {
                        Some(text) => element.attributes[slot].value = text,
                        None => {
                            element.attributes.remove(slot);
                        }
                    }
                }
                Ok(())
            }
        }
    }

    fn create_child(&mut self, at: &Pointer, name: &NodeName) -> PathResult<Pointer> {
        let Target::Node(parent) = self.resolve_or_err(at)? else {
            return Err(PathError::Unsupported {
                pointer: at.to_string(),
                reason: "only elements can hold child elements".to_string(),
            });
        };
        if parent == DOCUMENT && self.document_element().is_some() {
            return Err(PathError::Unsupported {
                pointer: at.to_string(),
                reason: "the document already has a document element".to_string(),
            });
        }
        let element = self.new_element(parent, name);
        let id = self.push(parent, NodeData::Element(element));
        Ok(self.pointer_to(at, parent, id))
    }

    fn create_attribute(&mut self, at: &Pointer, name: &NodeName) -> PathResult<Pointer> {
        let Target::Node(id) = self.resolve_or_err(at)? else {
            return Err(PathError::Unsupported {
                pointer: at.to_string(),
                reason: "only elements can hold attributes".to_string(),
            });
        };
        let prefix = match name.namespace() {
            Some(uri) => match self.prefix_in_scope(id, uri).flatten() {
                Some(prefix) => Some(prefix),
                None => {
                    let prefix = self.fresh_prefix();
                    if let Some(element) = self.element_mut(id) {
                        element.namespaces.push((Some(prefix.clone()), uri.to_string()));
                    }
                    Some(prefix)
                }
            },
            None => None,
        };
        let Some(element) = self.element_mut(id) else {
            return Err(PathError::Unsupported {
                pointer: at.to_string(),
                reason: "only elements can hold attributes".to_string(),
            });
        };
        if !element.attributes.iter().any(|a| &a.name == name) {
            element.attributes.push(Attribute {
                name: name.clone(),
                prefix,
                value: String::new(),
            });
        }
        Ok(at.attribute(name.clone()))
    }

    fn create_text(&mut self, at: &Pointer) -> PathResult<Pointer> {
        match self.resolve_or_err(at)? {
            Target::Node(id) if id != DOCUMENT => {
                if !self.has_text(id) {
                    self.set_text(id, Some(String::new()));
                }
                Ok(at.text())
            }
            _ => Err(PathError::Unsupported {
                pointer: at.to_string(),
                reason: "only elements can hold text".to_string(),
            }),
        }
    }

    fn remove(&mut self, at: &Pointer) -> PathResult<()> {
        match self.resolve_or_err(at)? {
            Target::Node(DOCUMENT) => Err(PathError::Unsupported {
                pointer: at.to_string(),
                reason: "the document node cannot be removed".to_string(),
            }),
            Target::Node(id) => {
                self.detach(id);
                self.release(id);
                Ok(())
            }
            Target::Attribute(id, slot) => {
                if let Some(element) = self.element_mut(id) {
                    element.attributes.remove(slot);
                }
                Ok(())
            }
            Target::Text(id) => {
                self.set_text(id, None);
                Ok(())
            }
        }
    }

    fn append(&mut self, parent: &Pointer, template: &NodeTemplate) -> PathResult<Pointer> {
        let Target::Node(parent_id) = self.resolve_or_err(parent)? else {
            return Err(PathError::Unsupported {
                pointer: parent.to_string(),
                reason: "nodes can only be appended to elements".to_string(),
            });
        };
        let id = match template {
            NodeTemplate::Element(element) => self.insert_template(parent_id, element),
            NodeTemplate::Json { name, value } => self.insert_json(parent_id, name, value),
        };
        Ok(self.pointer_to(parent, parent_id, id))
    }
}
