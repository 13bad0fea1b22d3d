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

//! Canonical node locations
//!
//! A [`Pointer`] addresses one node of a data model by the steps leading to it
//! from the model root. Element steps are positional, so removing a node shifts
//! the pointers of its later same-named siblings.

use smallvec::SmallVec;
use std::fmt;

/// Expanded node name: namespace URI plus local part
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeName {
    namespace: Option<String>,
    local: String,
}

impl NodeName {
    /// Name without namespace
    pub fn new(local: impl Into<String>) -> Self {
        Self {
            namespace: None,
            local: local.into(),
        }
    }

    /// Namespaced name
    pub fn qualified(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            local: local.into(),
        }
    }

    pub fn local(&self) -> &str {
        &self.local
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.local)
    }
}

/// One step of a pointer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PointerStep {
    /// Child element; `position` is 1-based among siblings with the same name
    Element { name: NodeName, position: usize },
    /// Attribute of the current element
    Attribute(NodeName),
    /// Text content of the current element
    Text,
}

/// Location of a node from the model root
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Pointer {
    steps: SmallVec<[PointerStep; 6]>,
}

impl Pointer {
    /// The model root
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[PointerStep] {
        &self.steps
    }

    pub fn last_step(&self) -> Option<&PointerStep> {
        self.steps.last()
    }

    /// Whether this pointer addresses an attribute
    pub fn is_attribute(&self) -> bool {
        matches!(self.steps.last(), Some(PointerStep::Attribute(_)))
    }

    /// Pointer to the node holding this one; `None` for the root
    pub fn parent(&self) -> Option<Pointer> {
        if self.steps.is_empty() {
            return None;
        }
        let mut steps = self.steps.clone();
        steps.pop();
        Some(Pointer { steps })
    }

    pub fn child(&self, name: NodeName, position: usize) -> Pointer {
        self.with_step(PointerStep::Element { name, position })
    }

    pub fn attribute(&self, name: NodeName) -> Pointer {
        self.with_step(PointerStep::Attribute(name))
    }

    pub fn text(&self) -> Pointer {
        self.with_step(PointerStep::Text)
    }

    fn with_step(&self, step: PointerStep) -> Pointer {
        let mut steps = self.steps.clone();
        steps.push(step);
        Pointer { steps }
    }

    /// Whether `self` lies at or below `ancestor`
    pub fn starts_with(&self, ancestor: &Pointer) -> bool {
        self.steps.starts_with(&ancestor.steps)
    }

    /// Path form of the pointer, e.g. `/rows[1]/row[2]/@id`
    pub fn as_path(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.steps.is_empty() {
            return f.write_str("/");
        }
        for step in &self.steps {
            match step {
                PointerStep::Element { name, position } => write!(f, "/{name}[{position}]")?,
                PointerStep::Attribute(name) => write!(f, "/@{name}")?,
                PointerStep::Text => f.write_str("/text()")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_rendering() {
        let row = Pointer::root()
            .child(NodeName::new("rows"), 1)
            .child(NodeName::new("row"), 2);
        assert_eq!(row.to_string(), "/rows[1]/row[2]");
        assert_eq!(row.attribute(NodeName::new("id")).as_path(), "/rows[1]/row[2]/@id");
        assert_eq!(Pointer::root().to_string(), "/");
    }

    #[test]
    fn test_pointer_navigation() {
        let rows = Pointer::root().child(NodeName::new("rows"), 1);
        let id = rows
            .child(NodeName::new("row"), 1)
            .attribute(NodeName::new("id"));
        assert!(id.is_attribute());
        assert!(id.starts_with(&rows));
        assert_eq!(id.parent().and_then(|p| p.parent()), Some(rows));
        assert_eq!(Pointer::root().parent(), None);
    }
}
