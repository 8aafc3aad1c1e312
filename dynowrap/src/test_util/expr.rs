/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Parser and evaluator for the store's expression language, as far as the in-memory
//! store needs it.

use std::cmp::Ordering;
use std::collections::HashMap;

use dynowrap_core::{AttributeMap, AttributeValue, Number};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Name(String),
    Value(String),
    Word(String),
    Int(usize),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Comma,
    Cmp(CmpOp),
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let word = |start: usize| {
        let mut end = start;
        while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
            end += 1;
        }
        (chars[start..end].iter().collect::<String>(), end)
    };
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Cmp(CmpOp::Eq));
                i += 1;
            }
            '<' => match chars.get(i + 1) {
                Some('>') => {
                    tokens.push(Token::Cmp(CmpOp::Ne));
                    i += 2;
                }
                Some('=') => {
                    tokens.push(Token::Cmp(CmpOp::Le));
                    i += 2;
                }
                _ => {
                    tokens.push(Token::Cmp(CmpOp::Lt));
                    i += 1;
                }
            },
            '>' => match chars.get(i + 1) {
                Some('=') => {
                    tokens.push(Token::Cmp(CmpOp::Ge));
                    i += 2;
                }
                _ => {
                    tokens.push(Token::Cmp(CmpOp::Gt));
                    i += 1;
                }
            },
            '#' | ':' => {
                let (name, end) = word(i + 1);
                if name.is_empty() {
                    return Err(format!("invalid placeholder at offset {i}"));
                }
                let placeholder = format!("{c}{name}");
                tokens.push(if c == '#' {
                    Token::Name(placeholder)
                } else {
                    Token::Value(placeholder)
                });
                i = end;
            }
            c if c.is_ascii_digit() => {
                let (digits, end) = word(i);
                let index = digits
                    .parse()
                    .map_err(|_| format!("invalid list index '{digits}'"))?;
                tokens.push(Token::Int(index));
                i = end;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let (name, end) = word(i);
                tokens.push(Token::Word(name));
                i = end;
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    Ok(tokens)
}

/// One step of a document path.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Seg {
    Key(String),
    Index(usize),
}

pub(crate) type Path = Vec<Seg>;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Operand {
    Path(Path),
    Value(AttributeValue),
    Size(Path),
    IfNotExists(Path, Box<Operand>),
    ListAppend(Box<Operand>, Box<Operand>),
    Plus(Box<Operand>, Box<Operand>),
    Minus(Box<Operand>, Box<Operand>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Cond {
    Cmp(Operand, CmpOp, Operand),
    Between(Operand, Operand, Operand),
    In(Operand, Vec<Operand>),
    Exists(Path),
    NotExists(Path),
    AttributeType(Path, Operand),
    BeginsWith(Operand, Operand),
    Contains(Operand, Operand),
    And(Box<Cond>, Box<Cond>),
    Or(Box<Cond>, Box<Cond>),
    Not(Box<Cond>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum UpdateOp {
    Set(Path, Operand),
    Remove(Path),
    Add(Path, AttributeValue),
    Delete(Path, AttributeValue),
}

/// Placeholder bindings of one request.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Bindings<'a> {
    pub(crate) names: Option<&'a HashMap<String, String>>,
    pub(crate) values: Option<&'a AttributeMap>,
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    bindings: Bindings<'a>,
}

fn is_keyword(token: Option<&Token>, keyword: &str) -> bool {
    matches!(token, Some(Token::Word(word)) if word.eq_ignore_ascii_case(keyword))
}

impl<'a> Parser<'a> {
    fn new(input: &str, bindings: Bindings<'a>) -> Result<Self, String> {
        Ok(Self {
            tokens: tokenize(input)?,
            pos: 0,
            bindings,
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            other => Err(format!("expected {expected:?}, found {other:?}")),
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if is_keyword(self.peek(), keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn finish(&self) -> Result<(), String> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(format!("unexpected trailing token {token:?}")),
        }
    }

    fn resolve_name(&self, placeholder: &str) -> Result<String, String> {
        self.bindings
            .names
            .and_then(|names| names.get(placeholder))
            .cloned()
            .ok_or_else(|| format!("undefined attribute name placeholder {placeholder}"))
    }

    fn resolve_value(&self, placeholder: &str) -> Result<AttributeValue, String> {
        self.bindings
            .values
            .and_then(|values| values.get(placeholder))
            .cloned()
            .ok_or_else(|| format!("undefined attribute value placeholder {placeholder}"))
    }

    fn path(&mut self) -> Result<Path, String> {
        let mut path = vec![Seg::Key(self.path_name()?)];
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    path.push(Seg::Key(self.path_name()?));
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    match self.next() {
                        Some(Token::Int(index)) => path.push(Seg::Index(index)),
                        other => return Err(format!("expected list index, found {other:?}")),
                    }
                    self.expect(Token::RBracket)?;
                }
                _ => return Ok(path),
            }
        }
    }

    fn path_name(&mut self) -> Result<String, String> {
        match self.next() {
            Some(Token::Name(placeholder)) => self.resolve_name(&placeholder),
            Some(Token::Word(word)) => Ok(word),
            other => Err(format!("expected attribute name, found {other:?}")),
        }
    }

    fn value(&mut self) -> Result<AttributeValue, String> {
        match self.next() {
            Some(Token::Value(placeholder)) => self.resolve_value(&placeholder),
            other => Err(format!("expected value placeholder, found {other:?}")),
        }
    }

    fn is_call(&self, name: &str) -> bool {
        is_keyword(self.peek(), name) && self.peek_at(1) == Some(&Token::LParen)
    }

    fn term(&mut self) -> Result<Operand, String> {
        if self.is_call("size") {
            self.pos += 2;
            let path = self.path()?;
            self.expect(Token::RParen)?;
            return Ok(Operand::Size(path));
        }
        if self.is_call("if_not_exists") {
            self.pos += 2;
            let path = self.path()?;
            self.expect(Token::Comma)?;
            let fallback = self.operand()?;
            self.expect(Token::RParen)?;
            return Ok(Operand::IfNotExists(path, Box::new(fallback)));
        }
        if self.is_call("list_append") {
            self.pos += 2;
            let first = self.operand()?;
            self.expect(Token::Comma)?;
            let second = self.operand()?;
            self.expect(Token::RParen)?;
            return Ok(Operand::ListAppend(Box::new(first), Box::new(second)));
        }
        match self.peek() {
            Some(Token::Value(_)) => Ok(Operand::Value(self.value()?)),
            _ => Ok(Operand::Path(self.path()?)),
        }
    }

    fn operand(&mut self) -> Result<Operand, String> {
        let first = self.term()?;
        match self.peek() {
            Some(Token::Plus) => {
                self.pos += 1;
                Ok(Operand::Plus(Box::new(first), Box::new(self.term()?)))
            }
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(Operand::Minus(Box::new(first), Box::new(self.term()?)))
            }
            _ => Ok(first),
        }
    }

    fn condition(&mut self) -> Result<Cond, String> {
        let mut left = self.and_condition()?;
        while self.eat_keyword("OR") {
            let right = self.and_condition()?;
            left = Cond::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_condition(&mut self) -> Result<Cond, String> {
        let mut left = self.not_condition()?;
        while self.eat_keyword("AND") {
            let right = self.not_condition()?;
            left = Cond::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_condition(&mut self) -> Result<Cond, String> {
        if self.eat_keyword("NOT") {
            return Ok(Cond::Not(Box::new(self.not_condition()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Cond, String> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.condition()?;
            self.expect(Token::RParen)?;
            return Ok(inner);
        }
        for (name, arity) in [
            ("attribute_exists", 1),
            ("attribute_not_exists", 1),
            ("attribute_type", 2),
            ("begins_with", 2),
            ("contains", 2),
        ] {
            if !self.is_call(name) {
                continue;
            }
            self.pos += 2;
            let cond = match (name, arity) {
                ("attribute_exists", _) => Cond::Exists(self.path()?),
                ("attribute_not_exists", _) => Cond::NotExists(self.path()?),
                ("attribute_type", _) => {
                    let path = self.path()?;
                    self.expect(Token::Comma)?;
                    Cond::AttributeType(path, self.operand()?)
                }
                ("begins_with", _) => {
                    let target = self.operand()?;
                    self.expect(Token::Comma)?;
                    Cond::BeginsWith(target, self.operand()?)
                }
                _ => {
                    let target = self.operand()?;
                    self.expect(Token::Comma)?;
                    Cond::Contains(target, self.operand()?)
                }
            };
            self.expect(Token::RParen)?;
            return Ok(cond);
        }

        let left = self.operand()?;
        if let Some(Token::Cmp(op)) = self.peek() {
            let op = *op;
            self.pos += 1;
            return Ok(Cond::Cmp(left, op, self.operand()?));
        }
        if self.eat_keyword("BETWEEN") {
            let low = self.operand()?;
            if !self.eat_keyword("AND") {
                return Err("expected AND in BETWEEN".to_string());
            }
            return Ok(Cond::Between(left, low, self.operand()?));
        }
        if self.eat_keyword("IN") {
            self.expect(Token::LParen)?;
            let mut candidates = vec![self.operand()?];
            while self.peek() == Some(&Token::Comma) {
                self.pos += 1;
                candidates.push(self.operand()?);
            }
            self.expect(Token::RParen)?;
            return Ok(Cond::In(left, candidates));
        }
        Err(format!("expected a comparison, found {:?}", self.peek()))
    }

    fn update(&mut self) -> Result<Vec<UpdateOp>, String> {
        let mut ops = Vec::new();
        while self.peek().is_some() {
            let clause = match self.next() {
                Some(Token::Word(word)) => word.to_ascii_uppercase(),
                other => return Err(format!("expected SET, REMOVE, ADD or DELETE, found {other:?}")),
            };
            loop {
                let path = self.path()?;
                let op = match clause.as_str() {
                    "SET" => {
                        self.expect(Token::Cmp(CmpOp::Eq))?;
                        UpdateOp::Set(path, self.operand()?)
                    }
                    "REMOVE" => UpdateOp::Remove(path),
                    "ADD" => UpdateOp::Add(path, self.value()?),
                    "DELETE" => UpdateOp::Delete(path, self.value()?),
                    other => return Err(format!("unknown update clause {other}")),
                };
                ops.push(op);
                if self.peek() == Some(&Token::Comma) {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }
        if ops.is_empty() {
            return Err("empty update expression".to_string());
        }
        Ok(ops)
    }

    fn projection(&mut self) -> Result<Vec<Path>, String> {
        let mut paths = vec![self.path()?];
        while self.peek() == Some(&Token::Comma) {
            self.pos += 1;
            paths.push(self.path()?);
        }
        Ok(paths)
    }
}

pub(crate) fn parse_condition(input: &str, bindings: Bindings<'_>) -> Result<Cond, String> {
    let mut parser = Parser::new(input, bindings)?;
    let cond = parser.condition()?;
    parser.finish()?;
    Ok(cond)
}

pub(crate) fn parse_update(input: &str, bindings: Bindings<'_>) -> Result<Vec<UpdateOp>, String> {
    let mut parser = Parser::new(input, bindings)?;
    parser.update()
}

pub(crate) fn parse_projection(input: &str, bindings: Bindings<'_>) -> Result<Vec<Path>, String> {
    let mut parser = Parser::new(input, bindings)?;
    let paths = parser.projection()?;
    parser.finish()?;
    Ok(paths)
}

pub(crate) fn resolve<'v>(item: &'v AttributeMap, path: &[Seg]) -> Option<&'v AttributeValue> {
    let (first, rest) = path.split_first()?;
    let mut current = match first {
        Seg::Key(name) => item.get(name)?,
        Seg::Index(_) => return None,
    };
    for seg in rest {
        current = match (seg, current) {
            (Seg::Key(name), AttributeValue::M(map)) => map.get(name)?,
            (Seg::Index(index), AttributeValue::L(list)) => list.get(*index)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Orders scalars of the same type; `None` for anything else.
pub(crate) fn compare(a: &AttributeValue, b: &AttributeValue) -> Option<Ordering> {
    match (a, b) {
        (AttributeValue::N(a), AttributeValue::N(b)) => Some(a.numeric_cmp(b)),
        (AttributeValue::S(a), AttributeValue::S(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
        (AttributeValue::B(a), AttributeValue::B(b)) => Some(a.as_ref().cmp(b.as_ref())),
        _ => None,
    }
}

pub(crate) fn equals(a: &AttributeValue, b: &AttributeValue) -> bool {
    match (a, b) {
        (AttributeValue::N(a), AttributeValue::N(b)) => a.numeric_cmp(b) == Ordering::Equal,
        (AttributeValue::Ns(a), AttributeValue::Ns(b)) => {
            a.len() == b.len()
                && a.iter().all(|x| b.iter().any(|y| x.numeric_cmp(y) == Ordering::Equal))
        }
        (AttributeValue::Ss(a), AttributeValue::Ss(b)) => {
            a.len() == b.len() && a.iter().all(|x| b.contains(x))
        }
        (AttributeValue::Bs(a), AttributeValue::Bs(b)) => {
            a.len() == b.len() && a.iter().all(|x| b.contains(x))
        }
        (AttributeValue::L(a), AttributeValue::L(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| equals(x, y))
        }
        (AttributeValue::M(a), AttributeValue::M(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, x)| b.get(key).map_or(false, |y| equals(x, y)))
        }
        _ => a == b,
    }
}

fn add_numbers(a: &Number, b: &Number, negate: bool) -> Result<Number, String> {
    if let (Some(a), Some(b)) = (a.to_i64(), b.to_i64()) {
        let result = if negate {
            a.checked_sub(b)
        } else {
            a.checked_add(b)
        };
        if let Some(result) = result {
            return Ok(Number::from(result));
        }
    }
    let (a, b) = (a.to_f64_lossy(), b.to_f64_lossy());
    Number::try_from(if negate { a - b } else { a + b }).map_err(|err| err.to_string())
}

pub(crate) fn eval_operand(item: &AttributeMap, operand: &Operand) -> Result<Option<AttributeValue>, String> {
    Ok(match operand {
        Operand::Path(path) => resolve(item, path).cloned(),
        Operand::Value(value) => Some(value.clone()),
        Operand::Size(path) => resolve(item, path).and_then(|value| {
            let size = match value {
                AttributeValue::S(s) => s.len(),
                AttributeValue::B(b) => b.as_ref().len(),
                AttributeValue::Ss(set) => set.len(),
                AttributeValue::Ns(set) => set.len(),
                AttributeValue::Bs(set) => set.len(),
                AttributeValue::L(list) => list.len(),
                AttributeValue::M(map) => map.len(),
                _ => return None,
            };
            Some(AttributeValue::N(Number::from(size as u64)))
        }),
        Operand::IfNotExists(path, fallback) => match resolve(item, path) {
            Some(existing) => Some(existing.clone()),
            None => eval_operand(item, fallback)?,
        },
        Operand::ListAppend(first, second) => {
            match (eval_operand(item, first)?, eval_operand(item, second)?) {
                (Some(AttributeValue::L(mut first)), Some(AttributeValue::L(second))) => {
                    first.extend(second);
                    Some(AttributeValue::L(first))
                }
                _ => return Err("list_append needs two lists".to_string()),
            }
        }
        Operand::Plus(a, b) | Operand::Minus(a, b) => {
            let negate = matches!(operand, Operand::Minus(..));
            match (eval_operand(item, a)?, eval_operand(item, b)?) {
                (Some(AttributeValue::N(a)), Some(AttributeValue::N(b))) => {
                    Some(AttributeValue::N(add_numbers(&a, &b, negate)?))
                }
                _ => return Err("arithmetic needs two numbers".to_string()),
            }
        }
    })
}

fn contains(haystack: &AttributeValue, needle: &AttributeValue) -> bool {
    match (haystack, needle) {
        (AttributeValue::S(s), AttributeValue::S(sub)) => s.contains(sub.as_str()),
        (AttributeValue::B(b), AttributeValue::B(sub)) => {
            let (b, sub) = (b.as_ref(), sub.as_ref());
            sub.is_empty() || b.windows(sub.len()).any(|window| window == sub)
        }
        (AttributeValue::Ss(set), AttributeValue::S(member)) => set.contains(member),
        (AttributeValue::Ns(set), AttributeValue::N(member)) => {
            set.iter().any(|n| n.numeric_cmp(member) == Ordering::Equal)
        }
        (AttributeValue::Bs(set), AttributeValue::B(member)) => set.contains(member),
        (AttributeValue::L(list), needle) => list.iter().any(|value| equals(value, needle)),
        _ => false,
    }
}

pub(crate) fn evaluate(item: &AttributeMap, cond: &Cond) -> Result<bool, String> {
    Ok(match cond {
        Cond::Cmp(left, op, right) => {
            let (left, right) = (eval_operand(item, left)?, eval_operand(item, right)?);
            match (left, right) {
                (Some(left), Some(right)) => match op {
                    CmpOp::Eq => equals(&left, &right),
                    CmpOp::Ne => !equals(&left, &right),
                    CmpOp::Lt => compare(&left, &right) == Some(Ordering::Less),
                    CmpOp::Le => matches!(compare(&left, &right), Some(Ordering::Less | Ordering::Equal)),
                    CmpOp::Gt => compare(&left, &right) == Some(Ordering::Greater),
                    CmpOp::Ge => matches!(compare(&left, &right), Some(Ordering::Greater | Ordering::Equal)),
                },
                _ => *op == CmpOp::Ne,
            }
        }
        Cond::Between(target, low, high) => {
            match (
                eval_operand(item, target)?,
                eval_operand(item, low)?,
                eval_operand(item, high)?,
            ) {
                (Some(target), Some(low), Some(high)) => {
                    matches!(compare(&target, &low), Some(Ordering::Greater | Ordering::Equal))
                        && matches!(compare(&target, &high), Some(Ordering::Less | Ordering::Equal))
                }
                _ => false,
            }
        }
        Cond::In(target, candidates) => match eval_operand(item, target)? {
            Some(target) => {
                let mut found = false;
                for candidate in candidates {
                    if let Some(candidate) = eval_operand(item, candidate)? {
                        found |= equals(&target, &candidate);
                    }
                }
                found
            }
            None => false,
        },
        Cond::Exists(path) => resolve(item, path).is_some(),
        Cond::NotExists(path) => resolve(item, path).is_none(),
        Cond::AttributeType(path, ty) => match (resolve(item, path), eval_operand(item, ty)?) {
            (Some(value), Some(AttributeValue::S(ty))) => value.tag() == ty,
            _ => false,
        },
        Cond::BeginsWith(target, prefix) => {
            match (eval_operand(item, target)?, eval_operand(item, prefix)?) {
                (Some(AttributeValue::S(s)), Some(AttributeValue::S(prefix))) => s.starts_with(&prefix),
                (Some(AttributeValue::B(b)), Some(AttributeValue::B(prefix))) => {
                    b.as_ref().starts_with(prefix.as_ref())
                }
                _ => false,
            }
        }
        Cond::Contains(target, needle) => {
            match (eval_operand(item, target)?, eval_operand(item, needle)?) {
                (Some(haystack), Some(needle)) => contains(&haystack, &needle),
                _ => false,
            }
        }
        Cond::And(a, b) => evaluate(item, a)? && evaluate(item, b)?,
        Cond::Or(a, b) => evaluate(item, a)? || evaluate(item, b)?,
        Cond::Not(inner) => !evaluate(item, inner)?,
    })
}

fn parent_mut<'v>(item: &'v mut AttributeMap, path: &[Seg]) -> Result<&'v mut AttributeValue, String> {
    let invalid = || "the document path provided in the update expression is invalid for update".to_string();
    let (first, rest) = path.split_first().ok_or_else(invalid)?;
    let mut current = match first {
        Seg::Key(name) => item.get_mut(name).ok_or_else(invalid)?,
        Seg::Index(_) => return Err(invalid()),
    };
    for seg in rest {
        current = match (seg, current) {
            (Seg::Key(name), AttributeValue::M(map)) => map.get_mut(name).ok_or_else(invalid)?,
            (Seg::Index(index), AttributeValue::L(list)) => list.get_mut(*index).ok_or_else(invalid)?,
            _ => return Err(invalid()),
        };
    }
    Ok(current)
}

pub(crate) fn set_path(item: &mut AttributeMap, path: &[Seg], value: AttributeValue) -> Result<(), String> {
    match path {
        [Seg::Key(name)] => {
            item.insert(name.clone(), value);
            Ok(())
        }
        [parent @ .., last] => match (parent_mut(item, parent)?, last) {
            (AttributeValue::M(map), Seg::Key(name)) => {
                map.insert(name.clone(), value);
                Ok(())
            }
            (AttributeValue::L(list), Seg::Index(index)) => {
                if *index < list.len() {
                    list[*index] = value;
                } else {
                    list.push(value);
                }
                Ok(())
            }
            _ => Err("the document path provided in the update expression is invalid for update".to_string()),
        },
        [] => Err("empty path".to_string()),
    }
}

pub(crate) fn remove_path(item: &mut AttributeMap, path: &[Seg]) {
    match path {
        [Seg::Key(name)] => {
            item.remove(name);
        }
        [parent @ .., last] => {
            if let Ok(parent) = parent_mut(item, parent) {
                match (parent, last) {
                    (AttributeValue::M(map), Seg::Key(name)) => {
                        map.remove(name);
                    }
                    (AttributeValue::L(list), Seg::Index(index)) if *index < list.len() => {
                        list.remove(*index);
                    }
                    _ => {}
                }
            }
        }
        [] => {}
    }
}

/// Applies `ops` to `item`. Returns the top-level attributes touched.
pub(crate) fn apply_update(item: &mut AttributeMap, ops: &[UpdateOp]) -> Result<Vec<String>, String> {
    let snapshot = item.clone();
    let mut touched = Vec::new();
    for op in ops {
        let path = match op {
            UpdateOp::Set(path, _) | UpdateOp::Remove(path) | UpdateOp::Add(path, _) | UpdateOp::Delete(path, _) => path,
        };
        if let Some(Seg::Key(root)) = path.first() {
            if !touched.contains(root) {
                touched.push(root.clone());
            }
        }
        match op {
            UpdateOp::Set(path, operand) => {
                // operands see the item as it was before the update
                let value = eval_operand(&snapshot, operand)?
                    .ok_or_else(|| "an operand in the update expression does not exist".to_string())?;
                set_path(item, path, value)?;
            }
            UpdateOp::Remove(path) => remove_path(item, path),
            UpdateOp::Add(path, value) => {
                let updated = match (resolve(item, path), value) {
                    (None, value) => value.clone(),
                    (Some(AttributeValue::N(current)), AttributeValue::N(delta)) => {
                        AttributeValue::N(add_numbers(current, delta, false)?)
                    }
                    (Some(AttributeValue::Ss(current)), AttributeValue::Ss(more)) => {
                        let mut set = current.clone();
                        set.extend(more.iter().filter(|m| !current.contains(m)).cloned());
                        AttributeValue::Ss(set)
                    }
                    (Some(AttributeValue::Ns(current)), AttributeValue::Ns(more)) => {
                        let mut set = current.clone();
                        for member in more {
                            if !current.iter().any(|n| n.numeric_cmp(member) == Ordering::Equal) {
                                set.push(member.clone());
                            }
                        }
                        AttributeValue::Ns(set)
                    }
                    (Some(AttributeValue::Bs(current)), AttributeValue::Bs(more)) => {
                        let mut set = current.clone();
                        set.extend(more.iter().filter(|m| !current.contains(m)).cloned());
                        AttributeValue::Bs(set)
                    }
                    _ => return Err("an operand in the update expression has an incorrect data type".to_string()),
                };
                set_path(item, path, updated)?;
            }
            UpdateOp::Delete(path, value) => {
                let remaining = match (resolve(item, path), value) {
                    (None, _) => continue,
                    (Some(AttributeValue::Ss(current)), AttributeValue::Ss(gone)) => {
                        let set: Vec<_> = current.iter().filter(|m| !gone.contains(m)).cloned().collect();
                        (!set.is_empty()).then_some(AttributeValue::Ss(set))
                    }
                    (Some(AttributeValue::Ns(current)), AttributeValue::Ns(gone)) => {
                        let set: Vec<_> = current
                            .iter()
                            .filter(|m| !gone.iter().any(|g| g.numeric_cmp(m) == Ordering::Equal))
                            .cloned()
                            .collect();
                        (!set.is_empty()).then_some(AttributeValue::Ns(set))
                    }
                    (Some(AttributeValue::Bs(current)), AttributeValue::Bs(gone)) => {
                        let set: Vec<_> = current.iter().filter(|m| !gone.contains(m)).cloned().collect();
                        (!set.is_empty()).then_some(AttributeValue::Bs(set))
                    }
                    _ => return Err("an operand in the update expression has an incorrect data type".to_string()),
                };
                match remaining {
                    Some(set) => set_path(item, path, set)?,
                    None => remove_path(item, path),
                }
            }
        }
    }
    Ok(touched)
}

/// Copies the attributes at `paths` out of `item`.
pub(crate) fn project(item: &AttributeMap, paths: &[Path]) -> AttributeMap {
    let mut out = AttributeMap::new();
    for path in paths {
        if let Some(value) = resolve(item, path) {
            insert_projected(&mut out, path, value.clone());
        }
    }
    out
}

fn insert_projected(out: &mut AttributeMap, path: &[Seg], value: AttributeValue) {
    let Some((Seg::Key(first), rest)) = path.split_first() else {
        return;
    };
    if rest.is_empty() {
        out.insert(first.clone(), value);
        return;
    }
    let slot = out.entry(first.clone()).or_insert_with(|| match rest[0] {
        Seg::Key(_) => AttributeValue::M(HashMap::new()),
        Seg::Index(_) => AttributeValue::L(Vec::new()),
    });
    insert_nested(slot, rest, value);
}

fn insert_nested(slot: &mut AttributeValue, path: &[Seg], value: AttributeValue) {
    let Some((seg, rest)) = path.split_first() else {
        return;
    };
    match (slot, seg) {
        (AttributeValue::M(map), Seg::Key(name)) => {
            if rest.is_empty() {
                map.insert(name.clone(), value);
            } else {
                let child = map.entry(name.clone()).or_insert_with(|| match rest[0] {
                    Seg::Key(_) => AttributeValue::M(HashMap::new()),
                    Seg::Index(_) => AttributeValue::L(Vec::new()),
                });
                insert_nested(child, rest, value);
            }
        }
        // projected list elements are compacted, in the order they are requested
        (AttributeValue::L(list), Seg::Index(_)) => {
            if rest.is_empty() {
                list.push(value);
            } else {
                let mut child = match rest[0] {
                    Seg::Key(_) => AttributeValue::M(HashMap::new()),
                    Seg::Index(_) => AttributeValue::L(Vec::new()),
                };
                insert_nested(&mut child, rest, value);
                list.push(child);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn bindings() -> (HashMap<String, String>, AttributeMap) {
        let mut names = HashMap::new();
        names.insert("#age".to_string(), "age".to_string());
        names.insert("#tags".to_string(), "tags".to_string());
        names.insert("#name".to_string(), "name".to_string());
        let mut values = AttributeMap::new();
        values.insert(":age".to_string(), AttributeValue::N(18i64.into()));
        values.insert(":age_2".to_string(), AttributeValue::N(65i64.into()));
        values.insert(":tag".to_string(), AttributeValue::S("admin".into()));
        values.insert(":prefix".to_string(), AttributeValue::S("Ad".into()));
        (names, values)
    }

    fn person(age: i64) -> AttributeMap {
        let mut item = AttributeMap::new();
        item.insert("name".into(), AttributeValue::S("Ada".into()));
        item.insert("age".into(), AttributeValue::N(age.into()));
        item.insert("tags".into(), AttributeValue::Ss(vec!["admin".into(), "dev".into()]));
        item
    }

    fn check(expression: &str, item: &AttributeMap) -> bool {
        let (names, values) = bindings();
        let bindings = Bindings {
            names: Some(&names),
            values: Some(&values),
        };
        let cond = parse_condition(expression, bindings).unwrap();
        evaluate(item, &cond).unwrap()
    }

    #[test]
    fn evaluates_conditions() {
        let adult = person(30);
        assert!(check("#age BETWEEN :age AND :age_2", &adult));
        assert!(check("#age > :age AND contains(#tags, :tag)", &adult));
        assert!(check("NOT (#age < :age) AND begins_with(#name, :prefix)", &adult));
        assert!(check("#age IN (:age, :age_2) OR attribute_exists(#name)", &adult));
        assert!(!check("attribute_not_exists(#name)", &adult));
        assert!(!check("#age <= :age", &adult));
        assert!(check("size(#tags) > :age OR #age >= :age", &adult));
    }

    #[test]
    fn undefined_placeholders_are_errors() {
        let err = parse_condition("#missing = :age", Bindings::default()).unwrap_err();
        assert!(err.contains("#missing"));
    }

    #[test]
    fn applies_updates() {
        let (mut names, mut values) = bindings();
        names.insert("#gone".into(), "gone".into());
        values.insert(":tagset".into(), AttributeValue::Ss(vec!["ops".into()]));
        let ops = parse_update(
            "SET #name = if_not_exists(#name, :tag), #age = #age + :age ADD #tags :tagset REMOVE #gone",
            Bindings {
                names: Some(&names),
                values: Some(&values),
            },
        )
        .unwrap();
        let mut item = person(30);
        item.insert("gone".into(), AttributeValue::Bool(true));
        let touched = apply_update(&mut item, &ops).unwrap();
        assert_eq!(touched, ["name", "age", "tags", "gone"]);
        assert_eq!(item["name"], AttributeValue::S("Ada".into()));
        assert_eq!(item["age"], AttributeValue::N(48i64.into()));
        assert_eq!(
            item["tags"],
            AttributeValue::Ss(vec!["admin".into(), "dev".into(), "ops".into()])
        );
        assert!(!item.contains_key("gone"));
    }

    #[test]
    fn projects_nested_paths() {
        let mut inner = HashMap::new();
        inner.insert("city".to_string(), AttributeValue::S("London".into()));
        inner.insert("zip".to_string(), AttributeValue::S("N1".into()));
        let mut item = person(30);
        item.insert("address".into(), AttributeValue::M(inner));
        let paths = parse_projection("#name, address.city", Bindings {
            names: Some(&bindings().0),
            values: None,
        })
        .unwrap();
        let projected = project(&item, &paths);
        assert_eq!(projected.len(), 2);
        match &projected["address"] {
            AttributeValue::M(map) => {
                assert_eq!(map.len(), 1);
                assert_eq!(map["city"], AttributeValue::S("London".into()));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
