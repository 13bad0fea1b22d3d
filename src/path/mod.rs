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

//! Path expressions over data models
//!
//! This module provides the small path language used by binding descriptors:
//! a tokenizer, a parser producing [`Path`], canonical node [`Pointer`]s, an
//! evaluator that selects and creates nodes, and the [`PathContext`] bindings
//! work with.

pub mod context;
pub mod evaluator;
pub mod parser;
pub mod pointer;
pub mod tokenizer;

pub use context::PathContext;
pub use evaluator::Namespaces;
pub use parser::{NameTest, Path, Predicate, Step};
pub use pointer::{NodeName, Pointer, PointerStep};
