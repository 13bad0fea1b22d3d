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

//! Path evaluation and creation against a [`DataModel`]

use indexmap::IndexSet;
use rustc_hash::FxHashMap;

use super::parser::{NameTest, Path, Predicate, Step};
use super::pointer::{NodeName, Pointer};
use crate::backend::DataModel;
use crate::error::{PathError, PathResult};
use crate::model::Value;

/// Prefix to namespace URI registrations
pub type Namespaces = FxHashMap<String, String>;

/// Select the nodes matched by `path` from `origin`, in document order
pub fn select(
    model: &dyn DataModel,
    origin: &Pointer,
    path: &Path,
    namespaces: &Namespaces,
) -> PathResult<Vec<Pointer>> {
    let start = if path.is_absolute() {
        Pointer::root()
    } else {
        origin.clone()
    };
    if !model.exists(&start) {
        return Ok(Vec::new());
    }

    let mut current = vec![start];
    for step in path.steps() {
        let mut next = IndexSet::new();
        for pointer in &current {
            next.extend(apply_step(model, pointer, step, path, namespaces)?);
        }
        current = next.into_iter().collect();
        if current.is_empty() {
            break;
        }
    }
    Ok(current)
}

/// Resolve a path to its first match, creating missing nodes on the way
pub fn create_path(
    model: &mut dyn DataModel,
    origin: &Pointer,
    path: &Path,
    namespaces: &Namespaces,
) -> PathResult<Pointer> {
    if let Some(existing) = select(model, origin, path, namespaces)?.into_iter().next() {
        return Ok(existing);
    }

    let mut current = if path.is_absolute() {
        Pointer::root()
    } else {
        origin.clone()
    };
    if !model.exists(&current) {
        return Err(cannot_create(path, format!("context node {current} does not exist")));
    }

    for step in path.steps() {
        if let Some(found) = apply_step(model, &current, step, path, namespaces)?
            .into_iter()
            .next()
        {
            current = found;
            continue;
        }
        current = create_step(model, &current, step, path, namespaces)?;
    }
    Ok(current)
}

fn apply_step(
    model: &dyn DataModel,
    pointer: &Pointer,
    step: &Step,
    path: &Path,
    namespaces: &Namespaces,
) -> PathResult<Vec<Pointer>> {
    Ok(match step {
        Step::SelfNode => vec![pointer.clone()],
        Step::Parent => pointer.parent().into_iter().collect(),
        Step::Text => model.text(pointer).into_iter().collect(),
        Step::Attribute(test) => {
            let name = resolve_name(test, path, namespaces)?;
            model.attributes(pointer, name.as_ref())
        }
        Step::Child { test, predicates } => {
            let name = resolve_name(test, path, namespaces)?;
            let mut candidates = model.children(pointer, name.as_ref());
            for predicate in predicates {
                candidates = filter(model, candidates, predicate, namespaces)?;
            }
            candidates
        }
    })
}

fn filter(
    model: &dyn DataModel,
    candidates: Vec<Pointer>,
    predicate: &Predicate,
    namespaces: &Namespaces,
) -> PathResult<Vec<Pointer>> {
    Ok(match predicate {
        Predicate::Position(n) => match n.checked_sub(1) {
            Some(index) => candidates.into_iter().nth(index).into_iter().collect(),
            None => Vec::new(),
        },
        Predicate::Last => candidates.into_iter().last().into_iter().collect(),
        Predicate::Exists(sub) => {
            let mut kept = Vec::new();
            for candidate in candidates {
                if !select(model, &candidate, sub, namespaces)?.is_empty() {
                    kept.push(candidate);
                }
            }
            kept
        }
        Predicate::Equals { path: sub, literal } => {
            let mut kept = Vec::new();
            for candidate in candidates {
                let matches = select(model, &candidate, sub, namespaces)?
                    .iter()
                    .filter_map(|p| model.value(p))
                    .any(|value| value.to_string() == *literal);
                if matches {
                    kept.push(candidate);
                }
            }
            kept
        }
    })
}

fn create_step(
    model: &mut dyn DataModel,
    current: &Pointer,
    step: &Step,
    path: &Path,
    namespaces: &Namespaces,
) -> PathResult<Pointer> {
    match step {
        Step::SelfNode => Ok(current.clone()),
        Step::Parent => current
            .parent()
            .ok_or_else(|| cannot_create(path, "the root has no parent")),
        Step::Text => model.create_text(current),
        Step::Attribute(NameTest::Any) | Step::Child { test: NameTest::Any, .. } => {
            Err(cannot_create(path, "wildcard steps cannot be created"))
        }
        Step::Attribute(test) => {
            let name = required_name(test, path, namespaces)?;
            model.create_attribute(current, &name)
        }
        Step::Child { test, predicates } => {
            let name = required_name(test, path, namespaces)?;
            match predicates.as_slice() {
                [] | [Predicate::Last] => model.create_child(current, &name),
                [Predicate::Position(n)] => {
                    let mut count = model.children(current, Some(&name)).len();
                    let mut created = None;
                    while count < *n {
                        created = Some(model.create_child(current, &name)?);
                        count += 1;
                    }
                    created.ok_or_else(|| {
                        cannot_create(path, format!("position {n} of '{test}' is unreachable"))
                    })
                }
                [Predicate::Equals { path: sub, literal }] => {
                    let created = model.create_child(current, &name)?;
                    let key = create_path(model, &created, sub, namespaces)?;
                    model.set_value(&key, Some(&Value::from(literal.as_str())))?;
                    Ok(created)
                }
                [Predicate::Exists(sub)] => {
                    let created = model.create_child(current, &name)?;
                    create_path(model, &created, sub, namespaces)?;
                    Ok(created)
                }
                _ => Err(cannot_create(
                    path,
                    "steps with several predicates cannot be created",
                )),
            }
        }
    }
}

fn resolve_name(
    test: &NameTest,
    path: &Path,
    namespaces: &Namespaces,
) -> PathResult<Option<NodeName>> {
    match test {
        NameTest::Any => Ok(None),
        NameTest::Name { prefix: None, local } => Ok(Some(NodeName::new(local.as_str()))),
        NameTest::Name {
            prefix: Some(prefix),
            local,
        } => namespaces
            .get(prefix)
            .map(|uri| Some(NodeName::qualified(uri.as_str(), local.as_str())))
            .ok_or_else(|| PathError::UnknownPrefix {
                prefix: prefix.clone(),
                path: path.to_string(),
            }),
    }
}

fn required_name(test: &NameTest, path: &Path, namespaces: &Namespaces) -> PathResult<NodeName> {
    resolve_name(test, path, namespaces)?
        .ok_or_else(|| cannot_create(path, "wildcard steps cannot be created"))
}

fn cannot_create(path: &Path, reason: impl Into<String>) -> PathError {
    PathError::CannotCreate {
        path: path.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{JsonModel, XmlDocument};

    fn path(text: &str) -> Path {
        Path::parse(text).unwrap()
    }

    fn people() -> XmlDocument {
        XmlDocument::parse(
            "people.xml",
            r#"<people><person id="1"><name>Ann</name></person><person id="2"><name>Bob</name></person></people>"#,
        )
        .unwrap()
    }

    #[test]
    fn test_select_with_predicates() {
        let model = people();
        let ns = Namespaces::default();
        let root = model.context_root();

        let all = select(&model, &root, &path("person"), &ns).unwrap();
        assert_eq!(all.len(), 2);

        let bob = select(&model, &root, &path("person[@id = '2']/name"), &ns).unwrap();
        assert_eq!(bob.len(), 1);
        assert_eq!(model.value(&bob[0]), Some(Value::from("Bob")));

        let last = select(&model, &root, &path("person[last()]/@id"), &ns).unwrap();
        assert_eq!(model.value(&last[0]), Some(Value::from("2")));

        let absolute = select(&model, &all[1], &path("/people/person[1]/name"), &ns).unwrap();
        assert_eq!(model.value(&absolute[0]), Some(Value::from("Ann")));

        let parent = select(&model, &bob[0], &path("../.."), &ns).unwrap();
        assert_eq!(parent, vec![root]);
    }

    #[test]
    fn test_unknown_prefix() {
        let model = people();
        let err = select(&model, &model.context_root(), &path("x:person"), &Namespaces::default())
            .unwrap_err();
        assert!(matches!(err, PathError::UnknownPrefix { .. }));
    }

    #[test]
    fn test_create_path_variants() {
        let mut model = people();
        let ns = Namespaces::default();
        let root = model.context_root();

        let existing = create_path(&mut model, &root, &path("person/name"), &ns).unwrap();
        assert_eq!(existing.to_string(), "/people[1]/person[1]/name[1]");

        let padded = create_path(&mut model, &root, &path("person[4]/@id"), &ns).unwrap();
        assert_eq!(padded.to_string(), "/people[1]/person[4]/@id");
        assert_eq!(select(&model, &root, &path("person"), &ns).unwrap().len(), 4);

        let keyed = create_path(&mut model, &root, &path("person[@id = '9']/name"), &ns).unwrap();
        assert_eq!(keyed.to_string(), "/people[1]/person[5]/name[1]");
        let id = select(&model, &root, &path("person[5]/@id"), &ns).unwrap();
        assert_eq!(model.value(&id[0]), Some(Value::from("9")));

        let err = create_path(&mut model, &root, &path("*[@id = '7']"), &ns).unwrap_err();
        assert!(matches!(err, PathError::CannotCreate { .. }));
    }

    #[test]
    fn test_json_paths() {
        let mut model = JsonModel::new(serde_json::json!({"person": {"name": "Ann"}}));
        let ns = Namespaces::default();
        let name = select(&model, &Pointer::root(), &path("person/name"), &ns).unwrap();
        assert_eq!(model.value(&name[0]), Some(Value::from("Ann")));

        let city = create_path(&mut model, &Pointer::root(), &path("person/address/city"), &ns)
            .unwrap();
        model.set_value(&city, Some(&Value::from("Gent"))).unwrap();
        assert_eq!(
            model.root(),
            &serde_json::json!({"person": {"name": "Ann", "address": {"city": "Gent"}}})
        );
    }
}
