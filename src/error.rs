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

//! Error types for path evaluation, binding execution and descriptor building
//!
//! Everything surfaced by a load or save walk is a [`BindingError`]; lower level
//! path failures travel inside it as [`PathError`].

use std::fmt;
use thiserror::Error;

use crate::convertor::ConversionError;

/// Result type for binding operations
pub type BindingResult<T> = Result<T, BindingError>;

/// Result type for path operations
pub type PathResult<T> = Result<T, PathError>;

/// Position of an element inside a binding descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorLocation {
    /// Descriptor name (file path or inline key)
    pub descriptor: String,
    /// Line number (1-based)
    pub line: u32,
    /// Column number (1-based)
    pub column: u32,
}

impl DescriptorLocation {
    pub fn new(descriptor: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            descriptor: descriptor.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for DescriptorLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.descriptor, self.line, self.column)
    }
}

/// Errors raised while parsing or evaluating path expressions
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PathError {
    /// Malformed path expression
    #[error("Syntax error in path '{path}' at offset {offset}: {message}")]
    Syntax {
        /// Path text
        path: String,
        /// Byte offset of the problem
        offset: usize,
        /// What went wrong
        message: String,
    },

    /// Path selects nothing and the context is not lenient
    #[error("No node found for path '{path}'")]
    NotFound {
        /// Path text
        path: String,
    },

    /// Path could not be created in the model
    #[error("Cannot create path '{path}': {reason}")]
    CannotCreate {
        /// Path text
        path: String,
        /// Reason reported by the model
        reason: String,
    },

    /// Namespace prefix without a registration on the context
    #[error("Unknown namespace prefix '{prefix}' in path '{path}'")]
    UnknownPrefix {
        /// The prefix
        prefix: String,
        /// Path text
        path: String,
    },

    /// The model refused a modification of the node
    #[error("Cannot modify node {pointer}: {reason}")]
    Unsupported {
        /// Rendered pointer
        pointer: String,
        /// Reason reported by the model
        reason: String,
    },
}

/// The single error type surfaced by binding load and save operations
#[derive(Error, Debug)]
pub enum BindingError {
    /// Widget id does not resolve from the current widget
    #[error("Cannot find widget '{id}'")]
    WidgetNotFound {
        /// Widget id or id path
        id: String,
    },

    /// Widget exists but has the wrong kind for the binding
    #[error("Widget '{id}' is not a {expected}")]
    WrongWidgetKind {
        /// Widget id
        id: String,
        /// Expected widget kind
        expected: &'static str,
    },

    /// Value of the wrong type for a typed field
    #[error("Widget '{id}' expects a value of type {expected}, got {actual}")]
    TypeMismatch {
        /// Widget id
        id: String,
        /// Declared value type
        expected: String,
        /// Offered value type
        actual: String,
    },

    /// Attempt to overwrite an existing identity value
    #[error("Identity at {pointer} cannot change from '{current}' to '{requested}'")]
    IdentityChange {
        /// Rendered pointer of the identity node
        pointer: String,
        /// Value found in the model
        current: String,
        /// Value held by the widget
        requested: String,
    },

    /// Value could not be converted for the model
    #[error("Conversion failed for widget '{id}': {cause}")]
    Conversion {
        /// Widget id
        id: String,
        /// Underlying conversion failure
        #[source]
        cause: ConversionError,
    },

    /// Path evaluation or model mutation failure
    #[error("Path error: {0}")]
    Path(#[from] PathError),

    /// Invalid binding descriptor or binding set-up
    #[error(
        "Configuration error{}: {message}",
        location.as_ref().map(|l| format!(" at {l}")).unwrap_or_default()
    )]
    Configuration {
        /// What is wrong
        message: String,
        /// Where in the descriptor, when known
        location: Option<DescriptorLocation>,
    },

    /// Descriptor could not be read
    #[error("Cannot read binding descriptor '{descriptor}': {cause}")]
    Io {
        /// Descriptor name
        descriptor: String,
        /// Underlying I/O failure
        #[source]
        cause: std::io::Error,
    },

    /// Descriptor or data document is not well-formed XML
    #[error("Malformed XML in '{document}': {message}")]
    Xml {
        /// Document name
        document: String,
        /// Parser message
        message: String,
    },

    /// Failure reported by a custom binding or script callback
    #[error("Binding '{name}' failed: {message}")]
    Plugin {
        /// Plugin or script name
        name: String,
        /// Failure message
        message: String,
    },
}

impl BindingError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, location: Option<DescriptorLocation>) -> Self {
        Self::Configuration {
            message: message.into(),
            location,
        }
    }

    /// Create a widget-not-found error
    pub fn widget_not_found(id: impl Into<String>) -> Self {
        Self::WidgetNotFound { id: id.into() }
    }

    /// Create a plugin failure
    pub fn plugin(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Plugin {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Whether this error comes from the descriptor rather than from a model or widget
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::Io { .. } | Self::Xml { .. }
        )
    }
}
