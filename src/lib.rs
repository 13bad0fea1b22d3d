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

//! Forms data-binding engine
//!
//! Synchronizes a tree of form widgets with an XML or JSON model through
//! relative path expressions. A binding descriptor is built once into a tree of
//! [`Binding`] nodes; loading copies model data into the widgets and saving
//! writes widget values back, diffing repeater rows by identity.

pub mod backend;
pub mod binding;
pub mod builder;
pub mod config;
pub mod convertor;
pub mod error;
pub mod manager;
pub mod model;
pub mod path;

// Re-export main types
pub use backend::{DataModel, JsonModel, XmlDocument};
pub use binding::{Binding, BindingRef};
pub use builder::DescriptorBuilder;
pub use config::BindingConfig;
pub use error::{BindingError, BindingResult, PathError};
pub use manager::{BindingManager, DescriptorSource};
pub use model::{Value, Widget};
pub use path::{Path, PathContext};
