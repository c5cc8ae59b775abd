//! Path expressions addressing nodes of a [`Tree`].
//!
//! A small JSONPath subset: `$.a.b`, bare `a.b`, `."quoted.key"`, `['key']`,
//! `[0]` / `[-1]`, `.*` / `[*]`, `..key` and `[?(@.key == 'value')]` filters.
//! Aliases are never followed.

use crate::yaml::errors::PatchError;
use crate::yaml::node::{NodeId, NodeKind, Tree};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Value of a mapping entry with this key
    Child(String),
    /// Sequence item, negative counts from the end
    Index(i64),
    /// Every mapping value or sequence item
    Wildcard,
    /// Every descendant mapping value with this key
    Recursive(String),
    Filter(Filter),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub key: String,
    pub op: FilterOp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOp {
    Exists,
    Eq(String),
    Ne(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    input: String,
    segments: Vec<Segment>,
}

impl PathExpr {
    pub fn parse(input: &str) -> Result<Self, PatchError> {
        let segments = PathParser::new(input).parse()?;
        Ok(Self {
            input: input.to_string(),
            segments,
        })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn as_str(&self) -> &str {
        &self.input
    }

    /// Every node matched by this expression, in document order.
    pub fn find(&self, tree: &Tree) -> Vec<NodeId> {
        let mut current = vec![tree.root()];
        for segment in &self.segments {
            let mut next = Vec::new();
            for id in current {
                step(tree, id, segment, &mut next);
            }
            current = next;
        }
        current
    }
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.input)
    }
}

fn step(tree: &Tree, id: NodeId, segment: &Segment, out: &mut Vec<NodeId>) {
    match segment {
        Segment::Child(key) => {
            if let Some(mapping) = tree.node(id).as_mapping() {
                out.extend(
                    mapping
                        .pairs()
                        .filter(|(k, _)| tree.scalar_value(*k) == Some(key.as_str()))
                        .map(|(_, v)| v),
                );
            }
        }
        Segment::Index(index) => {
            if let Some(sequence) = tree.node(id).as_sequence() {
                let len = sequence.items.len() as i64;
                let index = if *index < 0 { len + index } else { *index };
                if (0..len).contains(&index) {
                    out.push(sequence.items[index as usize]);
                }
            }
        }
        Segment::Wildcard => out.extend(children(tree, id)),
        Segment::Recursive(key) => descend(tree, id, key, out),
        Segment::Filter(filter) => {
            out.extend(
                children(tree, id)
                    .into_iter()
                    .filter(|candidate| filter.matches(tree, *candidate)),
            );
        }
    }
}

fn children(tree: &Tree, id: NodeId) -> Vec<NodeId> {
    match &tree.node(id).kind {
        NodeKind::Mapping(mapping) => mapping.pairs().map(|(_, v)| v).collect(),
        NodeKind::Sequence(sequence) => sequence.items.clone(),
        _ => Vec::new(),
    }
}

fn descend(tree: &Tree, id: NodeId, key: &str, out: &mut Vec<NodeId>) {
    match &tree.node(id).kind {
        NodeKind::Mapping(mapping) => {
            for (k, v) in mapping.pairs() {
                if tree.scalar_value(k) == Some(key) {
                    out.push(v);
                }
                descend(tree, v, key, out);
            }
        }
        NodeKind::Sequence(sequence) => {
            for item in &sequence.items {
                descend(tree, *item, key, out);
            }
        }
        _ => {}
    }
}

impl Filter {
    fn matches(&self, tree: &Tree, candidate: NodeId) -> bool {
        let Some(child) = tree.mapping_get(candidate, &self.key) else {
            return false;
        };
        match &self.op {
            FilterOp::Exists => true,
            FilterOp::Eq(literal) => tree.scalar_value(child) == Some(literal.as_str()),
            FilterOp::Ne(literal) => tree
                .scalar_value(child)
                .is_some_and(|value| value != literal),
        }
    }
}

struct PathParser<'a> {
    input: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> PathParser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T, PatchError> {
        Err(PatchError::InvalidPath {
            input: self.input.to_string(),
            message: message.into(),
        })
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn eat(&mut self, ch: char) -> bool {
        if self.peek() == Some(ch) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ch: char) -> Result<(), PatchError> {
        if self.eat(ch) {
            Ok(())
        } else {
            self.error(format!("expected '{ch}' at position {}", self.pos))
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn parse(mut self) -> Result<Vec<Segment>, PatchError> {
        if self.input.trim().is_empty() {
            return self.error("empty path");
        }

        let mut segments = Vec::new();
        if !self.eat('$') && !matches!(self.peek(), Some('.' | '[')) {
            // bare first key: `a.b.c`
            segments.push(Segment::Child(self.name()?));
        }

        while let Some(ch) = self.peek() {
            match ch {
                '.' if self.peek_at(1) == Some('.') => {
                    self.pos += 2;
                    let key = match self.peek() {
                        Some('"' | '\'') => self.quoted()?,
                        _ => self.name()?,
                    };
                    segments.push(Segment::Recursive(key));
                }
                '.' => {
                    self.pos += 1;
                    match self.peek() {
                        Some('*') => {
                            self.pos += 1;
                            segments.push(Segment::Wildcard);
                        }
                        Some('"' | '\'') => segments.push(Segment::Child(self.quoted()?)),
                        _ => segments.push(Segment::Child(self.name()?)),
                    }
                }
                '[' => {
                    self.pos += 1;
                    segments.push(self.bracket()?);
                    self.expect(']')?;
                }
                other => return self.error(format!("unexpected '{other}' at position {}", self.pos)),
            }
        }

        Ok(segments)
    }

    fn bracket(&mut self) -> Result<Segment, PatchError> {
        self.skip_ws();
        let segment = match self.peek() {
            Some('*') => {
                self.pos += 1;
                Segment::Wildcard
            }
            Some('"' | '\'') => Segment::Child(self.quoted()?),
            Some('?') => {
                self.pos += 1;
                self.expect('(')?;
                let filter = self.filter()?;
                self.expect(')')?;
                Segment::Filter(filter)
            }
            Some(c) if c == '-' || c.is_ascii_digit() => {
                let text = self.take_while(|c| c == '-' || c.is_ascii_digit());
                match text.parse::<i64>() {
                    Ok(index) => Segment::Index(index),
                    Err(_) => return self.error(format!("invalid index '{text}'")),
                }
            }
            _ => return self.error(format!("unsupported bracket expression at position {}", self.pos)),
        };
        self.skip_ws();
        Ok(segment)
    }

    fn filter(&mut self) -> Result<Filter, PatchError> {
        self.skip_ws();
        self.expect('@')?;
        self.expect('.')?;
        let key = match self.peek() {
            Some('"' | '\'') => self.quoted()?,
            _ => self.filter_name()?,
        };
        self.skip_ws();

        let op = match (self.peek(), self.peek_at(1)) {
            (Some('='), Some('=')) | (Some('!'), Some('=')) => {
                let negate = self.peek() == Some('!');
                self.pos += 2;
                self.skip_ws();
                let literal = match self.peek() {
                    Some('"' | '\'') => self.quoted()?,
                    Some(c) if c == '-' || c == '.' || c.is_ascii_digit() => {
                        self.take_while(|c| c == '-' || c == '+' || c == '.' || c.is_ascii_alphanumeric())
                    }
                    _ => return self.error("filter literal must be a quoted string or a number"),
                };
                if negate {
                    FilterOp::Ne(literal)
                } else {
                    FilterOp::Eq(literal)
                }
            }
            _ => FilterOp::Exists,
        };
        self.skip_ws();
        Ok(Filter { key, op })
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn name(&mut self) -> Result<String, PatchError> {
        let name = self.take_while(|c| !matches!(c, '.' | '[' | ']') && !c.is_whitespace());
        if name.is_empty() {
            return self.error(format!("empty path segment at position {}", self.pos));
        }
        Ok(name)
    }

    fn filter_name(&mut self) -> Result<String, PatchError> {
        let name = self.take_while(|c| !matches!(c, '.' | '[' | ']' | '(' | ')' | '=' | '!') && !c.is_whitespace());
        if name.is_empty() {
            return self.error("empty key in filter");
        }
        Ok(name)
    }

    fn quoted(&mut self) -> Result<String, PatchError> {
        let Some(quote) = self.peek() else {
            return self.error("expected a quoted key");
        };
        self.pos += 1;

        let mut value = String::new();
        loop {
            let Some(ch) = self.peek() else {
                return self.error("unterminated quoted key");
            };
            self.pos += 1;
            if ch == quote {
                return Ok(value);
            }
            if ch == '\\' {
                if let Some(next) = self.peek() {
                    self.pos += 1;
                    value.push(match next {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        other => other,
                    });
                    continue;
                }
            }
            value.push(ch);
        }
    }
}
