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

//! Date and date-time convertors
//!
//! Patterns use the letter notation of form definitions (`dd/MM/yyyy`,
//! `yyyy-MM-dd'T'HH:mm`) and are translated to `chrono` format strings once,
//! when the convertor is built. Parsing tries every pattern in order; formatting
//! uses the first.

use chrono::{NaiveDate, NaiveDateTime};

use super::{ConversionError, ConversionResult, Convertor, Locale};
use crate::model::{DATE_FORMAT, DATE_TIME_FORMAT, Value, ValueType};

/// Translate a letter pattern into a `chrono` format string
pub fn translate_pattern(pattern: &str) -> Result<String, ConversionError> {
    let mut out = String::new();
    let chars: Vec<char> = pattern.chars().collect();
    let mut index = 0;

    while index < chars.len() {
        let c = chars[index];
        if c == '\'' {
            index += 1;
            if chars.get(index) == Some(&'\'') {
                out.push('\'');
                index += 1;
                continue;
            }
            loop {
                match chars.get(index) {
                    None => {
                        return Err(ConversionError::InvalidPattern {
                            pattern: pattern.to_string(),
                            message: "unterminated quoted text".to_string(),
                        });
                    }
                    Some('\'') if chars.get(index + 1) == Some(&'\'') => {
                        out.push('\'');
                        index += 2;
                    }
                    Some('\'') => {
                        index += 1;
                        break;
                    }
                    Some('%') => {
                        out.push_str("%%");
                        index += 1;
                    }
                    Some(&literal) => {
                        out.push(literal);
                        index += 1;
                    }
                }
            }
            continue;
        }

        if !c.is_ascii_alphabetic() {
            if c == '%' {
                out.push_str("%%");
            } else {
                out.push(c);
            }
            index += 1;
            continue;
        }

        let run = chars[index..].iter().take_while(|&&x| x == c).count();
        let spec = match (c, run) {
            ('y', 2) => "%y",
            ('y', _) => "%Y",
            ('M', 1) => "%-m",
            ('M', 2) => "%m",
            ('M', 3) => "%b",
            ('M', _) => "%B",
            ('d', 1) => "%-d",
            ('d', _) => "%d",
            ('H', 1) => "%-H",
            ('H', _) => "%H",
            ('h', 1) => "%-I",
            ('h', _) => "%I",
            ('m', 1) => "%-M",
            ('m', _) => "%M",
            ('s', 1) => "%-S",
            ('s', _) => "%S",
            ('S', _) => "%3f",
            ('a', _) => "%p",
            ('E', 1..=3) => "%a",
            ('E', _) => "%A",
            _ => {
                return Err(ConversionError::InvalidPattern {
                    pattern: pattern.to_string(),
                    message: format!("unsupported pattern letter '{c}'"),
                });
            }
        };
        out.push_str(spec);
        index += run;
    }
    Ok(out)
}

fn translate_all(patterns: &[String], default: &str) -> Result<Vec<String>, ConversionError> {
    if patterns.is_empty() {
        return Ok(vec![default.to_string()]);
    }
    patterns.iter().map(|p| translate_pattern(p)).collect()
}

/// Calendar dates
#[derive(Debug, Clone)]
pub struct DateConvertor {
    formats: Vec<String>,
}

impl Default for DateConvertor {
    fn default() -> Self {
        Self {
            formats: vec![DATE_FORMAT.to_string()],
        }
    }
}

impl DateConvertor {
    pub fn from_patterns(patterns: &[String]) -> Result<Self, ConversionError> {
        Ok(Self {
            formats: translate_all(patterns, DATE_FORMAT)?,
        })
    }
}

impl Convertor for DateConvertor {
    fn value_type(&self) -> ValueType {
        ValueType::Date
    }

    fn convert_from_string(&self, text: &str, _locale: &Locale) -> ConversionResult {
        let text = text.trim();
        self.formats
            .iter()
            .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
            .map(Value::Date)
            .ok_or_else(|| ConversionError::Unparsable {
                text: text.to_string(),
                target: ValueType::Date,
            })
    }

    fn convert_to_string(&self, value: &Value, _locale: &Locale) -> Result<String, ConversionError> {
        let format = self.formats.first().map_or(DATE_FORMAT, String::as_str);
        match value {
            Value::Date(date) => Ok(date.format(format).to_string()),
            Value::DateTime(date_time) => Ok(date_time.date().format(format).to_string()),
            other => Err(ConversionError::WrongType {
                actual: other.value_type(),
                target: ValueType::Date,
            }),
        }
    }
}

/// Dates with a time of day
#[derive(Debug, Clone)]
pub struct DateTimeConvertor {
    formats: Vec<String>,
}

impl Default for DateTimeConvertor {
    fn default() -> Self {
        Self {
            formats: vec![DATE_TIME_FORMAT.to_string()],
        }
    }
}

impl DateTimeConvertor {
    pub fn from_patterns(patterns: &[String]) -> Result<Self, ConversionError> {
        Ok(Self {
            formats: translate_all(patterns, DATE_TIME_FORMAT)?,
        })
    }
}

impl Convertor for DateTimeConvertor {
    fn value_type(&self) -> ValueType {
        ValueType::DateTime
    }

    fn convert_from_string(&self, text: &str, _locale: &Locale) -> ConversionResult {
        let text = text.trim();
        self.formats
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
            .map(Value::DateTime)
            .ok_or_else(|| ConversionError::Unparsable {
                text: text.to_string(),
                target: ValueType::DateTime,
            })
    }

    fn convert_to_string(&self, value: &Value, _locale: &Locale) -> Result<String, ConversionError> {
        let format = self.formats.first().map_or(DATE_TIME_FORMAT, String::as_str);
        match value {
            Value::DateTime(date_time) => Ok(date_time.format(format).to_string()),
            other => Err(ConversionError::WrongType {
                actual: other.value_type(),
                target: ValueType::DateTime,
            }),
        }
    }
}
