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

//! Binding manager configuration

use serde::{Deserialize, Serialize};
use std::path::Path as FsPath;

use crate::convertor::Locale;
use crate::error::{BindingError, BindingResult};

/// Settings for a [`BindingManager`](crate::manager::BindingManager)
///
/// Every field has a default, so a JSON document only needs to name the
/// settings it changes:
///
/// ```
/// use cforms_binding::config::BindingConfig;
///
/// let config = BindingConfig::from_json(r#"{ "cache_capacity": 8 }"#).unwrap();
/// assert_eq!(config.cache_capacity, 8);
/// assert!(config.lenient_by_default);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    /// Leniency of the context at the start of a load or save walk
    pub lenient_by_default: bool,
    /// Locale for convertors that do not declare one
    pub default_locale: String,
    /// Maximum number of cached binding trees
    pub cache_capacity: usize,
    /// Rebuild cached file descriptors whose modification time changed
    pub check_file_modification: bool,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            lenient_by_default: true,
            default_locale: "en-US".to_string(),
            cache_capacity: 64,
            check_file_modification: true,
        }
    }
}

impl BindingConfig {
    /// Parse a configuration from JSON text
    pub fn from_json(text: &str) -> BindingResult<Self> {
        serde_json::from_str(text).map_err(|e| {
            BindingError::configuration(format!("Invalid binding configuration: {e}"), None)
        })
    }

    /// Read a JSON configuration file
    pub fn from_file(file: &FsPath) -> BindingResult<Self> {
        let text = std::fs::read_to_string(file).map_err(|cause| BindingError::Io {
            descriptor: file.display().to_string(),
            cause,
        })?;
        Self::from_json(&text)
    }

    /// The default locale, parsed
    pub fn locale(&self) -> BindingResult<Locale> {
        self.default_locale.parse().map_err(|e| {
            BindingError::configuration(
                format!("Invalid default locale '{}': {e}", self.default_locale),
                None,
            )
        })
    }
}
