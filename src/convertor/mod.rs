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

//! Locale-aware conversion between strings and typed values
//!
//! Value bindings with a convertor store strings in the model and typed values
//! in the widget. Convertors are created by name from a [`ConvertorRegistry`]
//! so descriptors can configure them with patterns.

pub mod boolean;
pub mod date;
pub mod number;

pub use boolean::{BooleanConvertor, StringConvertor};
pub use date::{DateConvertor, DateTimeConvertor};
pub use number::{DecimalConvertor, IntegerConvertor};

use rustc_hash::FxHashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::model::{Value, ValueType};

/// Result of converting a string into a typed value
pub type ConversionResult = Result<Value, ConversionError>;

/// Conversion failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    /// Text does not match the expected format
    #[error("Cannot convert '{text}' to {target}")]
    Unparsable {
        /// Offending text
        text: String,
        /// Target type
        target: ValueType,
    },

    /// Value handed to a convertor for another type
    #[error("A {target} convertor cannot format a {actual} value")]
    WrongType {
        /// Type of the offered value
        actual: ValueType,
        /// Type the convertor handles
        target: ValueType,
    },

    /// Pattern that cannot be used
    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern {
        /// Pattern text
        pattern: String,
        /// What is wrong with it
        message: String,
    },

    /// No convertor registered for a datatype
    #[error("No convertor registered for datatype '{0}'")]
    UnknownDatatype(String),
}

/// Language and optional country, e.g. `nl-BE`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locale {
    language: String,
    country: Option<String>,
}

impl Locale {
    pub fn new(language: impl Into<String>, country: Option<String>) -> Self {
        Self {
            language: language.into().to_ascii_lowercase(),
            country: country.map(|c| c.to_ascii_uppercase()),
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn country(&self) -> Option<&str> {
        self.country.as_deref()
    }

    /// Decimal separator used when reading and writing numbers
    pub fn decimal_separator(&self) -> char {
        match self.language.as_str() {
            "de" | "nl" | "fr" | "it" | "es" | "pt" | "da" | "sv" | "nb" | "no" | "fi" | "ru"
            | "pl" | "cs" | "tr" => ',',
            _ => '.',
        }
    }

    /// Digit grouping separator
    pub fn grouping_separator(&self) -> char {
        match (self.language.as_str(), self.decimal_separator()) {
            ("fr" | "sv" | "nb" | "no" | "fi" | "ru" | "pl" | "cs", _) => '\u{a0}',
            (_, ',') => '.',
            _ => ',',
        }
    }
}

impl Default for Locale {
    fn default() -> Self {
        Locale::new("en", Some("US".to_string()))
    }
}

impl FromStr for Locale {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split(['-', '_']);
        let language = parts.next().unwrap_or_default();
        let country = parts.next().map(str::to_string);
        let valid = !language.is_empty()
            && language.chars().all(|c| c.is_ascii_alphabetic())
            && country
                .as_deref()
                .is_none_or(|c| !c.is_empty() && c.chars().all(|ch| ch.is_ascii_alphanumeric()));
        if !valid {
            return Err(ConversionError::InvalidPattern {
                pattern: s.to_string(),
                message: "expected a locale like 'en-US' or 'nl_BE'".to_string(),
            });
        }
        Ok(Locale::new(language, country))
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.country {
            Some(country) => write!(f, "{}-{}", self.language, country),
            None => f.write_str(&self.language),
        }
    }
}

/// Bidirectional string conversion for one value type
pub trait Convertor: fmt::Debug + Send + Sync {
    /// Type of the values this convertor produces
    fn value_type(&self) -> ValueType;

    /// Parse model text into a typed value
    fn convert_from_string(&self, text: &str, locale: &Locale) -> ConversionResult;

    /// Format a typed value for the model
    fn convert_to_string(&self, value: &Value, locale: &Locale) -> Result<String, ConversionError>;
}

/// Settings read from an `fd:convertor` element
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConvertorConfig {
    /// Datatype name the convertor is registered under
    pub datatype: String,
    /// Format patterns; the first one is used for formatting
    pub patterns: Vec<String>,
}

impl ConvertorConfig {
    pub fn new(datatype: impl Into<String>) -> Self {
        Self {
            datatype: datatype.into(),
            patterns: Vec::new(),
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into());
        self
    }
}

/// Creates a convertor from its configuration
pub type ConvertorFactory =
    Arc<dyn Fn(&ConvertorConfig) -> Result<Arc<dyn Convertor>, ConversionError> + Send + Sync>;

/// Convertor factories by datatype name
#[derive(Clone)]
pub struct ConvertorRegistry {
    factories: FxHashMap<String, ConvertorFactory>,
}

impl fmt::Debug for ConvertorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("ConvertorRegistry")
            .field("datatypes", &names)
            .finish()
    }
}

impl Default for ConvertorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ConvertorRegistry {
    /// Registry without any datatype
    pub fn empty() -> Self {
        Self {
            factories: FxHashMap::default(),
        }
    }

    /// Registry with the built-in datatypes and their aliases
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register_builtin(&["string"], |_| Ok(Arc::new(StringConvertor)));
        registry.register_builtin(&["integer", "long", "int"], |config| {
            Ok(Arc::new(IntegerConvertor::from_patterns(&config.patterns)?))
        });
        registry.register_builtin(&["decimal", "double", "float"], |config| {
            Ok(Arc::new(DecimalConvertor::from_patterns(&config.patterns)?))
        });
        registry.register_builtin(&["boolean"], |_| Ok(Arc::new(BooleanConvertor)));
        registry.register_builtin(&["date"], |config| {
            Ok(Arc::new(DateConvertor::from_patterns(&config.patterns)?))
        });
        registry.register_builtin(&["date-time", "datetime"], |config| {
            Ok(Arc::new(DateTimeConvertor::from_patterns(&config.patterns)?))
        });
        registry
    }

    fn register_builtin<F>(&mut self, names: &[&str], factory: F)
    where
        F: Fn(&ConvertorConfig) -> Result<Arc<dyn Convertor>, ConversionError>
            + Send
            + Sync
            + 'static,
    {
        let factory: ConvertorFactory = Arc::new(factory);
        for name in names {
            self.factories.insert((*name).to_string(), factory.clone());
        }
    }

    /// Register or replace the factory for a datatype
    pub fn register<F>(&mut self, datatype: impl Into<String>, factory: F)
    where
        F: Fn(&ConvertorConfig) -> Result<Arc<dyn Convertor>, ConversionError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(datatype.into(), Arc::new(factory));
    }

    pub fn contains(&self, datatype: &str) -> bool {
        self.factories.contains_key(datatype)
    }

    /// Build the convertor described by `config`
    pub fn create(&self, config: &ConvertorConfig) -> Result<Arc<dyn Convertor>, ConversionError> {
        let factory = self
            .factories
            .get(&config.datatype)
            .ok_or_else(|| ConversionError::UnknownDatatype(config.datatype.clone()))?;
        factory(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locale_parsing() {
        let locale: Locale = "nl_be".parse().unwrap();
        assert_eq!(locale.language(), "nl");
        assert_eq!(locale.country(), Some("BE"));
        assert_eq!(locale.to_string(), "nl-BE");
        assert_eq!(locale.decimal_separator(), ',');
        assert_eq!(Locale::default().decimal_separator(), '.');
        assert!("".parse::<Locale>().is_err());
        assert!("en-".parse::<Locale>().is_err());
    }

    #[test]
    fn test_registry_creates_by_alias() {
        let registry = ConvertorRegistry::with_builtins();
        let long = registry.create(&ConvertorConfig::new("long")).unwrap();
        assert_eq!(long.value_type(), ValueType::Integer);
        let err = registry.create(&ConvertorConfig::new("money")).unwrap_err();
        assert_eq!(err, ConversionError::UnknownDatatype("money".into()));
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = ConvertorRegistry::empty();
        registry.register("flag", |_| Ok(Arc::new(BooleanConvertor) as Arc<dyn Convertor>));
        assert!(registry.contains("flag"));
        assert!(!registry.contains("string"));
    }
}
