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

//! Path evaluation context handed to bindings
//!
//! A [`PathContext`] pairs a data model with a current pointer, a leniency flag
//! and namespace prefix registrations. Bindings narrow it with
//! [`PathContext::relative_context`]; the narrowed context borrows the model
//! and inherits the flag and registrations.

use super::evaluator::{self, Namespaces};
use super::parser::Path;
use super::pointer::Pointer;
use crate::backend::{DataModel, NodeTemplate};
use crate::error::{PathError, PathResult};
use crate::model::Value;

/// A pointer into a data model plus evaluation settings
pub struct PathContext<'m> {
    model: &'m mut dyn DataModel,
    pointer: Pointer,
    lenient: bool,
    namespaces: Namespaces,
}

impl std::fmt::Debug for PathContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathContext")
            .field("pointer", &self.pointer)
            .field("lenient", &self.lenient)
            .field("namespaces", &self.namespaces)
            .finish()
    }
}

impl<'m> PathContext<'m> {
    /// Context at the model's context root, strict by default
    pub fn new(model: &'m mut dyn DataModel) -> Self {
        let pointer = model.context_root();
        Self {
            model,
            pointer,
            lenient: false,
            namespaces: Namespaces::default(),
        }
    }

    /// The node this context is positioned on
    pub fn context_pointer(&self) -> &Pointer {
        &self.pointer
    }

    pub fn model(&self) -> &dyn DataModel {
        &*self.model
    }

    pub fn model_mut(&mut self) -> &mut dyn DataModel {
        &mut *self.model
    }

    pub fn is_lenient(&self) -> bool {
        self.lenient
    }

    /// Set whether reads of missing paths yield `None` instead of an error
    pub fn set_lenient(&mut self, lenient: bool) {
        self.lenient = lenient;
    }

    /// Bind a namespace prefix for the paths evaluated on this context
    pub fn register_namespace(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        self.namespaces.insert(prefix.into(), uri.into());
    }

    pub fn namespace_uri(&self, prefix: &str) -> Option<&str> {
        self.namespaces.get(prefix).map(String::as_str)
    }

    /// Whether `pointer` still addresses a node
    pub fn exists(&self, pointer: &Pointer) -> bool {
        self.model.exists(pointer)
    }

    /// First node matched by `path`; absence is never an error
    pub fn pointer(&self, path: &Path) -> PathResult<Option<Pointer>> {
        Ok(self.iterate_pointers(path)?.into_iter().next())
    }

    /// All nodes matched by `path`, in document order
    pub fn iterate_pointers(&self, path: &Path) -> PathResult<Vec<Pointer>> {
        evaluator::select(&*self.model, &self.pointer, path, &self.namespaces)
    }

    /// Value of the first node matched by `path`.
    ///
    /// A path that matches nothing is an error unless the context is lenient.
    pub fn value(&self, path: &Path) -> PathResult<Option<Value>> {
        match self.pointer(path)? {
            Some(pointer) => Ok(self.model.value(&pointer)),
            None if self.lenient => Ok(None),
            None => Err(PathError::NotFound {
                path: path.to_string(),
            }),
        }
    }

    /// Value at a pointer obtained from this context
    pub fn value_at(&self, pointer: &Pointer) -> Option<Value> {
        self.model.value(pointer)
    }

    /// First node matched by `path`, creating missing nodes
    pub fn create_path(&mut self, path: &Path) -> PathResult<Pointer> {
        evaluator::create_path(&mut *self.model, &self.pointer, path, &self.namespaces)
    }

    /// Create `path` if needed and store `value` there
    pub fn create_path_and_set_value(
        &mut self,
        path: &Path,
        value: Option<&Value>,
    ) -> PathResult<Pointer> {
        let pointer = self.create_path(path)?;
        self.model.set_value(&pointer, value)?;
        Ok(pointer)
    }

    /// Store `value` at an existing node
    pub fn set_value_at(&mut self, pointer: &Pointer, value: Option<&Value>) -> PathResult<()> {
        self.model.set_value(pointer, value)
    }

    /// Context positioned on `pointer`, borrowing this context's model
    pub fn relative_context(&mut self, pointer: Pointer) -> PathContext<'_> {
        PathContext {
            model: &mut *self.model,
            pointer,
            lenient: self.lenient,
            namespaces: self.namespaces.clone(),
        }
    }

    /// Remove every node matched by `path`
    pub fn remove_all(&mut self, path: &Path) -> PathResult<usize> {
        let pointers = self.iterate_pointers(path)?;
        for pointer in pointers.iter().rev() {
            self.model.remove(pointer)?;
        }
        Ok(pointers.len())
    }

    /// Remove the first node matched by `path`.
    ///
    /// A path that matches nothing is an error unless the context is lenient.
    pub fn remove_path(&mut self, path: &Path) -> PathResult<()> {
        match self.pointer(path)? {
            Some(pointer) => self.model.remove(&pointer),
            None if self.lenient => Ok(()),
            None => Err(PathError::NotFound {
                path: path.to_string(),
            }),
        }
    }

    /// Append a copy of `template` under the node matched by `path`, creating it if needed
    pub fn append_node(&mut self, path: &Path, template: &NodeTemplate) -> PathResult<Pointer> {
        let parent = self.create_path(path)?;
        self.model.append(&parent, template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ElementTemplate, XmlDocument};

    fn path(text: &str) -> Path {
        Path::parse(text).unwrap()
    }

    fn person() -> XmlDocument {
        XmlDocument::parse("person.xml", "<person><name>Ann</name></person>").unwrap()
    }

    #[test]
    fn test_value_respects_leniency() {
        let mut model = person();
        let mut context = PathContext::new(&mut model);
        assert_eq!(context.value(&path("name")).unwrap(), Some(Value::from("Ann")));

        let err = context.value(&path("age")).unwrap_err();
        assert!(matches!(err, PathError::NotFound { .. }));

        context.set_lenient(true);
        assert_eq!(context.value(&path("age")).unwrap(), None);
        assert!(context.pointer(&path("age")).unwrap().is_none());
    }

    #[test]
    fn test_relative_context_writes_through() {
        let mut model = person();
        {
            let mut context = PathContext::new(&mut model);
            context.set_lenient(true);
            let address = context.create_path(&path("address")).unwrap();
            let mut relative = context.relative_context(address);
            assert!(relative.is_lenient());
            relative
                .create_path_and_set_value(&path("@city"), Some(&Value::from("Gent")))
                .unwrap();
            assert_eq!(relative.value(&path("../name")).unwrap(), Some(Value::from("Ann")));
        }
        assert_eq!(
            model.to_xml_string(),
            r#"<person><name>Ann</name><address city="Gent"/></person>"#
        );
    }

    #[test]
    fn test_remove_all_and_remove_path() {
        let mut model =
            XmlDocument::parse("rows.xml", "<rows><row/><row/><row/><keep/></rows>").unwrap();
        let mut context = PathContext::new(&mut model);
        assert_eq!(context.remove_all(&path("row")).unwrap(), 3);
        assert!(context.remove_path(&path("row")).is_err());
        context.set_lenient(true);
        assert!(context.remove_path(&path("row")).is_ok());
        context.remove_path(&path("keep")).unwrap();
        assert_eq!(model.to_xml_string(), "<rows/>");
    }

    #[test]
    fn test_namespaces_and_append() {
        let mut model = XmlDocument::parse("ns.xml", r#"<a:rows xmlns:a="urn:a"/>"#).unwrap();
        let mut context = PathContext::new(&mut model);
        assert!(context.iterate_pointers(&path("a:row")).is_err());
        context.register_namespace("a", "urn:a");
        assert!(context.iterate_pointers(&path("a:row")).unwrap().is_empty());

        let template = ElementTemplate::parse(r#"<a:row xmlns:a="urn:a"/>"#).unwrap();
        context
            .append_node(&path("."), &NodeTemplate::Element(template))
            .unwrap();
        assert_eq!(context.iterate_pointers(&path("a:row")).unwrap().len(), 1);
    }
}
