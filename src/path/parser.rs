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

//! Parser for the path expressions used in binding descriptors
//!
//! Supported grammar:
//!
//! ```text
//! path      := '/' | '/'? step ('/' step)*
//! step      := '.' | '..' | 'text()' | '@' nametest | nametest predicate*
//! nametest  := '*' | NAME | NAME ':' NAME
//! predicate := '[' ( NUMBER | 'last()' | path ( '=' LITERAL )? ) ']'
//! ```

use std::fmt;
use std::str::FromStr;

use super::tokenizer::{Spanned, Token, syntax, tokenize};
use crate::error::{PathError, PathResult};

/// Element or attribute name test
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameTest {
    /// `*`
    Any,
    /// `name` or `prefix:name`
    Name {
        prefix: Option<String>,
        local: String,
    },
}

impl NameTest {
    pub fn named(local: impl Into<String>) -> Self {
        NameTest::Name {
            prefix: None,
            local: local.into(),
        }
    }
}

impl fmt::Display for NameTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameTest::Any => f.write_str("*"),
            NameTest::Name {
                prefix: Some(prefix),
                local,
            } => write!(f, "{prefix}:{local}"),
            NameTest::Name { prefix: None, local } => f.write_str(local),
        }
    }
}

/// Filter applied to the nodes selected by an element step
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `[n]`, 1-based
    Position(usize),
    /// `[last()]`
    Last,
    /// `[path = 'literal']`
    Equals { path: Path, literal: String },
    /// `[path]`
    Exists(Path),
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Position(n) => write!(f, "[{n}]"),
            Predicate::Last => f.write_str("[last()]"),
            Predicate::Equals { path, literal } => write!(f, "[{path} = '{literal}']"),
            Predicate::Exists(path) => write!(f, "[{path}]"),
        }
    }
}

/// One location step
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// `.`
    SelfNode,
    /// `..`
    Parent,
    /// Child elements
    Child {
        test: NameTest,
        predicates: Vec<Predicate>,
    },
    /// `@name`
    Attribute(NameTest),
    /// `text()`
    Text,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::SelfNode => f.write_str("."),
            Step::Parent => f.write_str(".."),
            Step::Child { test, predicates } => {
                write!(f, "{test}")?;
                for predicate in predicates {
                    write!(f, "{predicate}")?;
                }
                Ok(())
            }
            Step::Attribute(test) => write!(f, "@{test}"),
            Step::Text => f.write_str("text()"),
        }
    }
}

/// A parsed path expression
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    absolute: bool,
    steps: Vec<Step>,
}

impl Path {
    /// Parse a path expression
    pub fn parse(input: &str) -> PathResult<Path> {
        let tokens = tokenize(input)?;
        let mut parser = PathParser {
            input,
            tokens: TokenStream::new(tokens),
        };
        let path = parser.parse_path()?;
        if let Some(token) = parser.tokens.peek() {
            return Err(syntax(
                input,
                token.start,
                &format!("Unexpected {:?} after end of path", token.value),
            ));
        }
        Ok(path)
    }

    /// The path `.`
    pub fn self_path() -> Path {
        Path {
            absolute: false,
            steps: vec![Step::SelfNode],
        }
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Whether the path selects the context node itself
    pub fn is_self(&self) -> bool {
        !self.absolute && self.steps.iter().all(|s| matches!(s, Step::SelfNode))
    }

    /// Copy of this path with the last element step narrowed to position `n`.
    ///
    /// Existing position and `last()` predicates on that step are replaced.
    /// Paths that do not end in an element step are returned unchanged.
    pub fn with_position(&self, n: usize) -> Path {
        let mut path = self.clone();
        if let Some(Step::Child { predicates, .. }) = path.steps.last_mut() {
            predicates.retain(|p| !matches!(p, Predicate::Position(_) | Predicate::Last));
            predicates.push(Predicate::Position(n));
        }
        path
    }
}

impl FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Path::parse(s)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.absolute {
            f.write_str("/")?;
        }
        for (index, step) in self.steps.iter().enumerate() {
            if index > 0 {
                f.write_str("/")?;
            }
            write!(f, "{step}")?;
        }
        Ok(())
    }
}

/// Token stream with lookahead
#[derive(Debug)]
struct TokenStream<'input> {
    tokens: Vec<Spanned<Token<'input>>>,
    position: usize,
}

impl<'input> TokenStream<'input> {
    fn new(tokens: Vec<Spanned<Token<'input>>>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    fn peek(&self) -> Option<&Spanned<Token<'input>>> {
        self.tokens.get(self.position)
    }

    fn peek_ahead(&self, n: usize) -> Option<&Spanned<Token<'input>>> {
        self.tokens.get(self.position + n)
    }

    fn next(&mut self) -> Option<Spanned<Token<'input>>> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn consume_if(&mut self, expected: Token<'input>) -> bool {
        if self.peek().is_some_and(|t| t.value == expected) {
            self.position += 1;
            true
        } else {
            false
        }
    }
}

struct PathParser<'input> {
    input: &'input str,
    tokens: TokenStream<'input>,
}

impl<'input> PathParser<'input> {
    fn parse_path(&mut self) -> PathResult<Path> {
        let absolute = self.tokens.consume_if(Token::Slash);
        let mut steps = Vec::new();

        if absolute && !self.at_step_start() {
            return Ok(Path { absolute, steps });
        }

        steps.push(self.parse_step()?);
        while self.tokens.consume_if(Token::Slash) {
            steps.push(self.parse_step()?);
        }
        Ok(Path { absolute, steps })
    }

    fn at_step_start(&self) -> bool {
        matches!(
            self.tokens.peek().map(|t| t.value),
            Some(Token::Dot | Token::DoubleDot | Token::At | Token::Star | Token::Name(_))
        )
    }

    fn parse_step(&mut self) -> PathResult<Step> {
        let Some(token) = self.tokens.next() else {
            return Err(self.error_at_end("Expected a path step"));
        };
        match token.value {
            Token::Dot => Ok(Step::SelfNode),
            Token::DoubleDot => Ok(Step::Parent),
            Token::At => Ok(Step::Attribute(self.parse_name_test()?)),
            Token::Name("text")
                if self.tokens.peek().map(|t| t.value) == Some(Token::LeftParen) =>
            {
                self.expect(Token::LeftParen)?;
                self.expect(Token::RightParen)?;
                Ok(Step::Text)
            }
            Token::Star | Token::Name(_) => {
                let test = self.name_test_from(token)?;
                let mut predicates = Vec::new();
                while self.tokens.consume_if(Token::LeftBracket) {
                    predicates.push(self.parse_predicate()?);
                    self.expect(Token::RightBracket)?;
                }
                Ok(Step::Child { test, predicates })
            }
            other => Err(syntax(
                self.input,
                token.start,
                &format!("Unexpected {other:?}, expected a path step"),
            )),
        }
    }

    fn parse_name_test(&mut self) -> PathResult<NameTest> {
        let Some(token) = self.tokens.next() else {
            return Err(self.error_at_end("Expected a name"));
        };
        self.name_test_from(token)
    }

    fn name_test_from(&mut self, token: Spanned<Token<'input>>) -> PathResult<NameTest> {
        match token.value {
            Token::Star => Ok(NameTest::Any),
            Token::Name(first) => {
                let qualified = self.tokens.peek().map(|t| t.value) == Some(Token::Colon)
                    && matches!(
                        self.tokens.peek_ahead(1).map(|t| t.value),
                        Some(Token::Name(_))
                    );
                if qualified {
                    self.tokens.next();
                    if let Some(Spanned {
                        value: Token::Name(local),
                        ..
                    }) = self.tokens.next()
                    {
                        return Ok(NameTest::Name {
                            prefix: Some(first.to_string()),
                            local: local.to_string(),
                        });
                    }
                }
                Ok(NameTest::named(first))
            }
            other => Err(syntax(
                self.input,
                token.start,
                &format!("Unexpected {other:?}, expected a name"),
            )),
        }
    }

    fn parse_predicate(&mut self) -> PathResult<Predicate> {
        let Some(token) = self.tokens.peek().cloned() else {
            return Err(self.error_at_end("Unterminated predicate"));
        };
        match token.value {
            Token::Number(text) => {
                self.tokens.next();
                match text.parse::<usize>() {
                    Ok(n) if n > 0 => Ok(Predicate::Position(n)),
                    _ => Err(syntax(
                        self.input,
                        token.start,
                        &format!("Invalid position '{text}'"),
                    )),
                }
            }
            Token::Name("last")
                if self.tokens.peek_ahead(1).map(|t| t.value) == Some(Token::LeftParen) =>
            {
                self.tokens.next();
                self.expect(Token::LeftParen)?;
                self.expect(Token::RightParen)?;
                Ok(Predicate::Last)
            }
            _ => {
                let path = self.parse_path()?;
                if !self.tokens.consume_if(Token::Equals) {
                    return Ok(Predicate::Exists(path));
                }
                match self.tokens.next() {
                    Some(Spanned {
                        value: Token::Literal(text) | Token::Number(text),
                        ..
                    }) => Ok(Predicate::Equals {
                        path,
                        literal: text.to_string(),
                    }),
                    Some(other) => Err(syntax(
                        self.input,
                        other.start,
                        "Expected a literal after '='",
                    )),
                    None => Err(self.error_at_end("Expected a literal after '='")),
                }
            }
        }
    }

    fn expect(&mut self, expected: Token<'input>) -> PathResult<()> {
        match self.tokens.next() {
            Some(token) if token.value == expected => Ok(()),
            Some(token) => Err(syntax(
                self.input,
                token.start,
                &format!("Expected {expected:?}, found {:?}", token.value),
            )),
            None => Err(self.error_at_end(&format!("Expected {expected:?}"))),
        }
    }

    fn error_at_end(&self, message: &str) -> PathError {
        syntax(self.input, self.input.len(), message)
    }
}
