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

//! Integer and decimal convertors
//!
//! Patterns follow the familiar decimal-format notation: `,` in the integer
//! part enables digit grouping, `0` after the decimal point is a required
//! fraction digit and `#` an optional one (`#,##0.00`).

use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

use super::{ConversionError, ConversionResult, Convertor, Locale};
use crate::model::{Value, ValueType};

/// Parsed number pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NumberFormat {
    grouping: bool,
    min_fraction: u32,
    max_fraction: Option<u32>,
}

impl NumberFormat {
    pub fn parse(pattern: &str) -> Result<Self, ConversionError> {
        let invalid = |message: &str| ConversionError::InvalidPattern {
            pattern: pattern.to_string(),
            message: message.to_string(),
        };
        let (integer, fraction) = match pattern.split_once('.') {
            Some((integer, fraction)) => (integer, Some(fraction)),
            None => (pattern, None),
        };
        if integer.is_empty() || !integer.chars().all(|c| matches!(c, '#' | '0' | ',')) {
            return Err(invalid("integer part may only contain '#', '0' and ','"));
        }
        let mut format = NumberFormat {
            grouping: integer.contains(','),
            ..NumberFormat::default()
        };
        if let Some(fraction) = fraction {
            if !fraction.chars().all(|c| matches!(c, '#' | '0')) {
                return Err(invalid("fraction part may only contain '#' and '0'"));
            }
            let required = fraction.chars().take_while(|&c| c == '0').count();
            if fraction[required..].contains('0') {
                return Err(invalid("required fraction digits must come first"));
            }
            format.min_fraction = required as u32;
            format.max_fraction = Some(fraction.len() as u32);
        }
        Ok(format)
    }

    fn render(&self, value: Decimal, locale: &Locale) -> String {
        let mut value = value;
        if let Some(max) = self.max_fraction {
            value = value.round_dp_with_strategy(max, RoundingStrategy::MidpointAwayFromZero);
        }
        let mut text = value.normalize().to_string();
        let negative = text.starts_with('-');
        if negative {
            text.remove(0);
        }
        let (integer, fraction) = match text.split_once('.') {
            Some((i, f)) => (i.to_string(), f.to_string()),
            None => (text, String::new()),
        };
        let mut fraction = fraction;
        while (fraction.len() as u32) < self.min_fraction {
            fraction.push('0');
        }

        let integer = if self.grouping {
            group_digits(&integer, locale.grouping_separator())
        } else {
            integer
        };
        let mut out = String::new();
        if negative {
            out.push('-');
        }
        out.push_str(&integer);
        if !fraction.is_empty() {
            out.push(locale.decimal_separator());
            out.push_str(&fraction);
        }
        out
    }
}

fn group_digits(digits: &str, separator: char) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, c) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            out.push(separator);
        }
        out.push(c);
    }
    out
}

/// Remove grouping separators and normalize the decimal separator to `.`
fn normalize_number(text: &str, locale: &Locale) -> String {
    let decimal = locale.decimal_separator();
    let grouping = locale.grouping_separator();
    text.trim()
        .chars()
        .filter(|&c| c != grouping && c != ' ' && c != '\u{a0}')
        .map(|c| if c == decimal { '.' } else { c })
        .collect()
}

fn first_format(patterns: &[String]) -> Result<Option<NumberFormat>, ConversionError> {
    patterns.first().map(|p| NumberFormat::parse(p)).transpose()
}

/// Whole numbers
#[derive(Debug, Clone, Default)]
pub struct IntegerConvertor {
    format: Option<NumberFormat>,
}

impl IntegerConvertor {
    pub fn from_patterns(patterns: &[String]) -> Result<Self, ConversionError> {
        Ok(Self {
            format: first_format(patterns)?,
        })
    }
}

impl Convertor for IntegerConvertor {
    fn value_type(&self) -> ValueType {
        ValueType::Integer
    }

    fn convert_from_string(&self, text: &str, locale: &Locale) -> ConversionResult {
        normalize_number(text, locale)
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| ConversionError::Unparsable {
                text: text.to_string(),
                target: ValueType::Integer,
            })
    }

    fn convert_to_string(&self, value: &Value, locale: &Locale) -> Result<String, ConversionError> {
        let Value::Integer(i) = value else {
            return Err(ConversionError::WrongType {
                actual: value.value_type(),
                target: ValueType::Integer,
            });
        };
        Ok(match &self.format {
            Some(format) => format.render(Decimal::from(*i), locale),
            None => i.to_string(),
        })
    }
}

/// Exact decimal numbers
#[derive(Debug, Clone, Default)]
pub struct DecimalConvertor {
    format: Option<NumberFormat>,
}

impl DecimalConvertor {
    pub fn from_patterns(patterns: &[String]) -> Result<Self, ConversionError> {
        Ok(Self {
            format: first_format(patterns)?,
        })
    }
}

impl Convertor for DecimalConvertor {
    fn value_type(&self) -> ValueType {
        ValueType::Decimal
    }

    fn convert_from_string(&self, text: &str, locale: &Locale) -> ConversionResult {
        let normalized = normalize_number(text, locale);
        Decimal::from_str(&normalized)
            .or_else(|_| Decimal::from_scientific(&normalized))
            .map(Value::Decimal)
            .map_err(|_| ConversionError::Unparsable {
                text: text.to_string(),
                target: ValueType::Decimal,
            })
    }

    fn convert_to_string(&self, value: &Value, locale: &Locale) -> Result<String, ConversionError> {
        let decimal = match value {
            Value::Decimal(d) => *d,
            Value::Integer(i) => Decimal::from(*i),
            other => {
                return Err(ConversionError::WrongType {
                    actual: other.value_type(),
                    target: ValueType::Decimal,
                });
            }
        };
        let format = self.format.unwrap_or_default();
        Ok(format.render(decimal, locale))
    }
}
