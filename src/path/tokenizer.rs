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

//! Tokenizer for path expressions

use crate::error::{PathError, PathResult};

/// A value with its byte range in the input
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    /// The value
    pub value: T,
    /// Start position in the input
    pub start: usize,
    /// End position in the input
    pub end: usize,
}

impl<T> Spanned<T> {
    pub fn new(value: T, start: usize, end: usize) -> Self {
        Self { value, start, end }
    }
}

/// Path expression tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'input> {
    Slash,
    Dot,
    DoubleDot,
    At,
    Star,
    Colon,
    Equals,
    LeftBracket,
    RightBracket,
    LeftParen,
    RightParen,
    /// XML-style name (letters, digits, `_`, `-`, `.`)
    Name(&'input str),
    /// Quoted string, without the quotes
    Literal(&'input str),
    /// Unsigned number
    Number(&'input str),
}

/// Check if a character can start a name
pub fn is_name_start(c: char) -> bool {
    unicode_xid::UnicodeXID::is_xid_start(c) || c == '_'
}

/// Check if a character can continue a name
pub fn is_name_continue(c: char) -> bool {
    unicode_xid::UnicodeXID::is_xid_continue(c) || c == '-' || c == '.'
}

/// Split a path expression into tokens
pub fn tokenize(input: &str) -> PathResult<Vec<Spanned<Token<'_>>>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let single = match c {
            '/' => Some(Token::Slash),
            '@' => Some(Token::At),
            '*' => Some(Token::Star),
            ':' => Some(Token::Colon),
            '=' => Some(Token::Equals),
            '[' => Some(Token::LeftBracket),
            ']' => Some(Token::RightBracket),
            '(' => Some(Token::LeftParen),
            ')' => Some(Token::RightParen),
            _ => None,
        };
        if let Some(token) = single {
            chars.next();
            tokens.push(Spanned::new(token, start, start + 1));
            continue;
        }

        match c {
            '.' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '.'))) {
                    chars.next();
                    tokens.push(Spanned::new(Token::DoubleDot, start, start + 2));
                } else {
                    tokens.push(Spanned::new(Token::Dot, start, start + 1));
                }
            }
            '\'' | '"' => {
                chars.next();
                let content_start = start + 1;
                let mut end = None;
                for (i, ch) in chars.by_ref() {
                    if ch == c {
                        end = Some(i);
                        break;
                    }
                }
                let Some(content_end) = end else {
                    return Err(syntax(input, start, "Unterminated string literal"));
                };
                tokens.push(Spanned::new(
                    Token::Literal(&input[content_start..content_end]),
                    start,
                    content_end + 1,
                ));
            }
            c if c.is_ascii_digit() => {
                let mut end = start;
                while let Some(&(i, ch)) = chars.peek() {
                    if ch.is_ascii_digit() || ch == '.' {
                        end = i + ch.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Spanned::new(Token::Number(&input[start..end]), start, end));
            }
            c if is_name_start(c) => {
                let mut end = start;
                while let Some(&(i, ch)) = chars.peek() {
                    if (i == start && is_name_start(ch)) || (i > start && is_name_continue(ch)) {
                        end = i + ch.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Spanned::new(Token::Name(&input[start..end]), start, end));
            }
            other => {
                return Err(syntax(input, start, &format!("Unexpected character '{other}'")));
            }
        }
    }

    Ok(tokens)
}

pub(crate) fn syntax(input: &str, offset: usize, message: &str) -> PathError {
    PathError::Syntax {
        path: input.to_string(),
        offset,
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<Token<'_>> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|t| t.value)
            .collect()
    }

    #[test]
    fn test_tokenize_steps() {
        assert_eq!(
            kinds("../rows/row[@id = '7']"),
            vec![
                Token::DoubleDot,
                Token::Slash,
                Token::Name("rows"),
                Token::Slash,
                Token::Name("row"),
                Token::LeftBracket,
                Token::At,
                Token::Name("id"),
                Token::Equals,
                Token::Literal("7"),
                Token::RightBracket,
            ]
        );
    }

    #[test]
    fn test_names_with_dashes_and_prefixes() {
        assert_eq!(
            kinds("fb:on-bind/first.name"),
            vec![
                Token::Name("fb"),
                Token::Colon,
                Token::Name("on-bind"),
                Token::Slash,
                Token::Name("first.name"),
            ]
        );
        assert_eq!(kinds("row[12]")[2], Token::Number("12"));
    }

    #[test]
    fn test_unterminated_literal() {
        let err = tokenize("row[@id='7]").unwrap_err();
        assert!(matches!(err, PathError::Syntax { offset: 8, .. }));
    }
}
