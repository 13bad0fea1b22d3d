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

//! JSON object graph model
//!
//! Object members are addressed as elements (or, with `@name`, as attributes)
//! and arrays fan out into same-named siblings, so `contacts/contact[2]`
//! selects the second item of the `contact` array under `contacts`.

use serde_json::{Map, Value as JsonValue};

use super::{DataModel, NodeTemplate};
use crate::error::{PathError, PathResult};
use crate::model::Value;
use crate::path::{NodeName, Pointer, PointerStep};

/// A `serde_json::Value` document that bindings can read and modify
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonModel {
    root: JsonValue,
}

impl JsonModel {
    pub fn new(root: JsonValue) -> Self {
        Self { root }
    }

    /// Parse JSON text
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(text)?))
    }

    pub fn root(&self) -> &JsonValue {
        &self.root
    }

    pub fn into_inner(self) -> JsonValue {
        self.root
    }

    fn resolve(&self, pointer: &Pointer) -> Option<&JsonValue> {
        let mut current = &self.root;
        for step in pointer.steps() {
            current = match step {
                PointerStep::Element { name, position } => member(current, name, *position)?,
                PointerStep::Attribute(name) => member(current, name, 1)?,
                PointerStep::Text => current,
            };
        }
        Some(current)
    }

    fn resolve_mut(&mut self, pointer: &Pointer) -> Option<&mut JsonValue> {
        let mut current = &mut self.root;
        for step in pointer.steps() {
            current = match step {
                PointerStep::Element { name, position } => member_mut(current, name, *position)?,
                PointerStep::Attribute(name) => member_mut(current, name, 1)?,
                PointerStep::Text => current,
            };
        }
        Some(current)
    }

    fn resolve_mut_or_err(&mut self, pointer: &Pointer) -> PathResult<&mut JsonValue> {
        self.resolve_mut(pointer).ok_or_else(|| PathError::NotFound {
            path: pointer.to_string(),
        })
    }

    /// Object under `at`, turning `null` into an empty object
    fn object_mut(&mut self, at: &Pointer) -> PathResult<&mut Map<String, JsonValue>> {
        let node = self.resolve_mut_or_err(at)?;
        if node.is_null() {
            *node = JsonValue::Object(Map::new());
        }
        match node {
            JsonValue::Object(members) => Ok(members),
            _ => Err(PathError::Unsupported {
                pointer: at.to_string(),
                reason: "only objects can hold members".to_string(),
            }),
        }
    }
}

fn member<'a>(node: &'a JsonValue, name: &NodeName, position: usize) -> Option<&'a JsonValue> {
    if name.namespace().is_some() {
        return None;
    }
    match node.as_object()?.get(name.local())? {
        JsonValue::Array(items) => items.get(position.checked_sub(1)?),
        single if position == 1 => Some(single),
        _ => None,
    }
}

fn member_mut<'a>(
    node: &'a mut JsonValue,
    name: &NodeName,
    position: usize,
) -> Option<&'a mut JsonValue> {
    if name.namespace().is_some() {
        return None;
    }
    match node.as_object_mut()?.get_mut(name.local())? {
        JsonValue::Array(items) => items.get_mut(position.checked_sub(1)?),
        single if position == 1 => Some(single),
        _ => None,
    }
}

fn is_scalar(node: &JsonValue) -> bool {
    !matches!(node, JsonValue::Object(_) | JsonValue::Array(_))
}

/// Append `item` to the collection stored under `key`, returning its position
fn push_member(members: &mut Map<String, JsonValue>, key: &str, item: JsonValue) -> usize {
    match members.get_mut(key) {
        None => {
            members.insert(key.to_string(), item);
            1
        }
        Some(JsonValue::Array(items)) => {
            items.push(item);
            items.len()
        }
        Some(JsonValue::Null) => {
            members.insert(key.to_string(), item);
            1
        }
        Some(existing) => {
            let first = existing.take();
            *existing = JsonValue::Array(vec![first, item]);
            2
        }
    }
}

impl DataModel for JsonModel {
    fn context_root(&self) -> Pointer {
        Pointer::root()
    }

    fn exists(&self, at: &Pointer) -> bool {
        self.resolve(at).is_some()
    }

    fn children(&self, at: &Pointer, name: Option<&NodeName>) -> Vec<Pointer> {
        let Some(JsonValue::Object(members)) = self.resolve(at) else {
            return Vec::new();
        };
        let mut result = Vec::new();
        for (key, value) in members {
            let key_name = NodeName::new(key.as_str());
            if name.is_some_and(|n| n != &key_name) {
                continue;
            }
            match value {
                JsonValue::Array(items) => {
                    for position in 1..=items.len() {
                        result.push(at.child(key_name.clone(), position));
                    }
                }
                _ => result.push(at.child(key_name, 1)),
            }
        }
        result
    }

    fn attributes(&self, at: &Pointer, name: Option<&NodeName>) -> Vec<Pointer> {
        let Some(JsonValue::Object(members)) = self.resolve(at) else {
            return Vec::new();
        };
        members
            .iter()
            .filter(|(_, value)| is_scalar(value))
            .map(|(key, _)| NodeName::new(key.as_str()))
            .filter(|key| name.is_none_or(|n| n == key))
            .map(|key| at.attribute(key))
            .collect()
    }

    fn text(&self, at: &Pointer) -> Option<Pointer> {
        let node = self.resolve(at)?;
        (is_scalar(node) && !node.is_null()).then(|| at.text())
    }

    fn value(&self, at: &Pointer) -> Option<Value> {
        Value::from_json(self.resolve(at)?)
    }

    fn set_value(&mut self, at: &Pointer, value: Option<&Value>) -> PathResult<()> {
        let node = self.resolve_mut_or_err(at)?;
        *node = value.map_or(JsonValue::Null, Value::to_json);
        Ok(())
    }

    fn create_child(&mut self, at: &Pointer, name: &NodeName) -> PathResult<Pointer> {
        if name.namespace().is_some() {
            return Err(PathError::Unsupported {
                pointer: at.to_string(),
                reason: "JSON members have no namespace".to_string(),
            });
        }
        let members = self.object_mut(at)?;
        let position = push_member(members, name.local(), JsonValue::Object(Map::new()));
        Ok(at.child(name.clone(), position))
    }

    fn create_attribute(&mut self, at: &Pointer, name: &NodeName) -> PathResult<Pointer> {
        let members = self.object_mut(at)?;
        members
            .entry(name.local().to_string())
            .or_insert(JsonValue::Null);
        Ok(at.attribute(name.clone()))
    }

    fn create_text(&mut self, at: &Pointer) -> PathResult<Pointer> {
        let node = self.resolve_mut_or_err(at)?;
        if is_scalar(node) {
            if node.is_null() {
                *node = JsonValue::String(String::new());
            }
            Ok(at.text())
        } else {
            Err(PathError::Unsupported {
                pointer: at.to_string(),
                reason: "containers have no text".to_string(),
            })
        }
    }

    fn remove(&mut self, at: &Pointer) -> PathResult<()> {
        let Some(parent) = at.parent() else {
            return Err(PathError::Unsupported {
                pointer: at.to_string(),
                reason: "the root cannot be removed".to_string(),
            });
        };
        match at.last_step() {
            Some(PointerStep::Element { name, position }) => {
                let members = self.object_mut(&parent)?;
                match members.get_mut(name.local()) {
                    Some(JsonValue::Array(items)) if *position <= items.len() && *position > 0 => {
                        items.remove(position - 1);
                        Ok(())
                    }
                    Some(_) if *position == 1 => {
                        members.shift_remove(name.local());
                        Ok(())
                    }
                    _ => Err(PathError::NotFound {
                        path: at.to_string(),
                    }),
                }
            }
            Some(PointerStep::Attribute(name)) => {
                let members = self.object_mut(&parent)?;
                members.shift_remove(name.local()).map(|_| ()).ok_or_else(|| {
                    PathError::NotFound {
                        path: at.to_string(),
                    }
                })
            }
            Some(PointerStep::Text) => self.set_value(&parent, None),
            None => Ok(()),
        }
    }

    fn append(&mut self, parent: &Pointer, template: &NodeTemplate) -> PathResult<Pointer> {
        let (key, item) = match template {
            NodeTemplate::Json { name, value } => (name.clone(), value.clone()),
            NodeTemplate::Element(element) => (element.name.local().to_string(), element.to_json()),
        };
        let members = self.object_mut(parent)?;
        let position = push_member(members, &key, item);
        Ok(parent.child(NodeName::new(key), position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn contacts() -> Pointer {
        Pointer::root().child(NodeName::new("contacts"), 1)
    }

    #[test]
    fn test_arrays_fan_out() {
        let model = JsonModel::new(json!({
            "name": "Alice",
            "contacts": {"contact": [{"id": 1}, {"id": 2}]}
        }));
        let items = model.children(&contacts(), Some(&NodeName::new("contact")));
        assert_eq!(items.len(), 2);
        let id = items[1].attribute(NodeName::new("id"));
        assert_eq!(model.value(&id), Some(Value::Integer(2)));
        assert_eq!(model.children(&Pointer::root(), None).len(), 2);
        assert_eq!(
            model.attributes(&Pointer::root(), None),
            vec![Pointer::root().attribute(NodeName::new("name"))]
        );
    }

    #[test]
    fn test_create_and_remove() {
        let mut model = JsonModel::new(json!({"contacts": null}));
        let contact = NodeName::new("contact");
        let first = model.create_child(&contacts(), &contact).unwrap();
        let second = model.create_child(&contacts(), &contact).unwrap();
        assert_eq!(second.to_string(), "/contacts[1]/contact[2]");
        let email = model.create_child(&first, &NodeName::new("email")).unwrap();
        model.set_value(&email, Some(&Value::from("a@example.org"))).unwrap();
        assert_eq!(
            model.root(),
            &json!({"contacts": {"contact": [{"email": "a@example.org"}, {}]}})
        );

        model.remove(&first).unwrap();
        assert_eq!(model.root(), &json!({"contacts": {"contact": [{}]}}));
    }

    #[test]
    fn test_append_converts_single_member() {
        let mut model = JsonModel::new(json!({"tags": "a"}));
        let template = NodeTemplate::Json {
            name: "tags".into(),
            value: json!("b"),
        };
        let pointer = model.append(&Pointer::root(), &template).unwrap();
        assert_eq!(pointer.to_string(), "/tags[2]");
        assert_eq!(model.root(), &json!({"tags": ["a", "b"]}));
    }
}
