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

//! Boolean and string convertors

use super::{ConversionError, ConversionResult, Convertor, Locale};
use crate::model::{Value, ValueType};

/// `true` / `false`, case-insensitive when parsing
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanConvertor;

impl Convertor for BooleanConvertor {
    fn value_type(&self) -> ValueType {
        ValueType::Boolean
    }

    fn convert_from_string(&self, text: &str, _locale: &Locale) -> ConversionResult {
        match text.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Boolean(true)),
            "false" => Ok(Value::Boolean(false)),
            _ => Err(ConversionError::Unparsable {
                text: text.to_string(),
                target: ValueType::Boolean,
            }),
        }
    }

    fn convert_to_string(&self, value: &Value, _locale: &Locale) -> Result<String, ConversionError> {
        match value {
            Value::Boolean(b) => Ok(b.to_string()),
            other => Err(ConversionError::WrongType {
                actual: other.value_type(),
                target: ValueType::Boolean,
            }),
        }
    }
}

/// Identity conversion; any value formats to its canonical text
#[derive(Debug, Clone, Copy, Default)]
pub struct StringConvertor;

impl Convertor for StringConvertor {
    fn value_type(&self) -> ValueType {
        ValueType::String
    }

    fn convert_from_string(&self, text: &str, _locale: &Locale) -> ConversionResult {
        Ok(Value::String(text.to_string()))
    }

    fn convert_to_string(&self, value: &Value, _locale: &Locale) -> Result<String, ConversionError> {
        Ok(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boolean_conversion() {
        let locale = Locale::default();
        assert_eq!(
            BooleanConvertor.convert_from_string(" TRUE ", &locale).unwrap(),
            Value::Boolean(true)
        );
        assert!(BooleanConvertor.convert_from_string("yes", &locale).is_err());
        assert_eq!(
            BooleanConvertor
                .convert_to_string(&Value::Boolean(false), &locale)
                .unwrap(),
            "false"
        );
    }

    #[test]
    fn test_string_identity() {
        let locale = Locale::default();
        assert_eq!(
            StringConvertor.convert_from_string("a b", &locale).unwrap(),
            Value::from("a b")
        );
        assert_eq!(
            StringConvertor.convert_to_string(&Value::Integer(4), &locale).unwrap(),
            "4"
        );
    }
}
