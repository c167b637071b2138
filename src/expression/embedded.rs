//! A small, whitelisted expression language for the inside of `eval(...)` and path checks.
//!
//! Supported:
//!
//! * literals: integers, floats, `'single'` and `"double"` quoted strings, `True`/`true`,
//!   `False`/`false`, `None`/`null`
//! * names supplied by a [Scope], e.g. `self` and `results`
//! * indexing `x['key']`, `x[0]` and attribute access `x.key`
//! * arithmetic `+ - * / // %`, unary `-`, string concatenation with `+`
//! * comparisons `== != < <= > >=`, membership `in` / `not in`
//! * boolean `and`, `or`, `not`, short-circuiting and returning an operand like Python does
//! * grouping with parentheses
//!
//! There are no function calls, assignments, or loops.

use crate::error::{ActionError, Result};
use serde_json::{Number, Value};

/// Resolves the free names an expression may reference.
pub trait Scope {
    fn resolve(&self, name: &str) -> Option<Value>;
}

/// Parses and evaluates `code` against `scope`.
pub fn evaluate(code: &str, scope: &dyn Scope) -> Result<Value> {
    let tokens = tokenize(code)?;
    let mut parser = Parser {
        code,
        tokens: &tokens,
        pos: 0,
    };
    let expr = parser.expression()?;
    if let Some(token) = parser.peek() {
        return Err(ActionError::invalid_expression(
            code,
            format!("unexpected {token:?}"),
        ));
    }
    Interpreter { code, scope }.eval(&expr)
}

/// Python-style truthiness: `null`, `false`, `0`, `""`, `[]` and `{}` are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
}

const OPERATORS: [&str; 18] = [
    "==", "!=", "<=", ">=", "//", "<", ">", "+", "-", "*", "/", "%", "(", ")", "[", "]", ".",
    ",",
];

fn tokenize(code: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = code.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '_') {
                i += 1;
            }
            let is_float = i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit();
            if is_float {
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let text: String = chars[start..i].iter().filter(|c| **c != '_').collect();
            let token = if is_float {
                text.parse().map(Token::Float).ok()
            } else {
                text.parse().map(Token::Int).ok()
            };
            tokens.push(token.ok_or_else(|| {
                ActionError::invalid_expression(code, format!("bad number literal {text}"))
            })?);
        } else if c == '\'' || c == '"' {
            let quote = c;
            let mut text = String::new();
            i += 1;
            loop {
                match chars.get(i) {
                    None => {
                        return Err(ActionError::invalid_expression(
                            code,
                            "unterminated string literal",
                        ))
                    }
                    Some('\\') => {
                        let escaped = chars.get(i + 1).copied().ok_or_else(|| {
                            ActionError::invalid_expression(code, "unterminated string literal")
                        })?;
                        text.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            other => other,
                        });
                        i += 2;
                    }
                    Some(ch) if *ch == quote => {
                        i += 1;
                        break;
                    }
                    Some(ch) => {
                        text.push(*ch);
                        i += 1;
                    }
                }
            }
            tokens.push(Token::Str(text));
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else {
            let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
            let op = OPERATORS
                .iter()
                .find(|op| rest.starts_with(**op))
                .ok_or_else(|| {
                    ActionError::invalid_expression(code, format!("unexpected character '{c}'"))
                })?;
            tokens.push(Token::Op(*op));
            i += op.len();
        }
    }
    Ok(tokens)
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Arith {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Compare {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

#[derive(Clone, Debug, PartialEq)]
enum Expr {
    Literal(Value),
    Name(String),
    Index(Box<Expr>, Box<Expr>),
    Attr(Box<Expr>, String),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Arith(Arith, Box<Expr>, Box<Expr>),
    Compare(Compare, Box<Expr>, Box<Expr>),
}

struct Parser<'a> {
    code: &'a str,
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    // Whether the token after the current one is the identifier `word`.
    fn next_is(&self, word: &str) -> bool {
        matches!(self.tokens.get(self.pos + 1), Some(Token::Ident(n)) if n == word)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn error(&self, reason: impl Into<String>) -> ActionError {
        ActionError::invalid_expression(self.code, reason)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Some(Token::Op(o)) if *o == op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(i)) if i == keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{op}'")))
        }
    }

    fn expression(&mut self) -> Result<Expr> {
        self.or()
    }

    fn or(&mut self) -> Result<Expr> {
        let mut left = self.and()?;
        while self.eat_keyword("or") {
            left = Expr::Or(Box::new(left), Box::new(self.and()?));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr> {
        let mut left = self.not()?;
        while self.eat_keyword("and") {
            left = Expr::And(Box::new(left), Box::new(self.not()?));
        }
        Ok(left)
    }

    fn not(&mut self) -> Result<Expr> {
        if self.eat_keyword("not") {
            return Ok(Expr::Not(Box::new(self.not()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr> {
        let left = self.sum()?;
        let op = match self.peek() {
            Some(Token::Op("==")) => Compare::Eq,
            Some(Token::Op("!=")) => Compare::Ne,
            Some(Token::Op("<")) => Compare::Lt,
            Some(Token::Op("<=")) => Compare::Le,
            Some(Token::Op(">")) => Compare::Gt,
            Some(Token::Op(">=")) => Compare::Ge,
            Some(Token::Ident(i)) if i == "in" => Compare::In,
            Some(Token::Ident(i)) if i == "not" && self.next_is("in") => {
                self.pos += 1;
                Compare::NotIn
            }
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.sum()?;
        Ok(Expr::Compare(op, Box::new(left), Box::new(right)))
    }

    fn sum(&mut self) -> Result<Expr> {
        let mut left = self.term()?;
        loop {
            let op = if self.eat_op("+") {
                Arith::Add
            } else if self.eat_op("-") {
                Arith::Sub
            } else {
                return Ok(left);
            };
            left = Expr::Arith(op, Box::new(left), Box::new(self.term()?));
        }
    }

    fn term(&mut self) -> Result<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = if self.eat_op("*") {
                Arith::Mul
            } else if self.eat_op("//") {
                Arith::FloorDiv
            } else if self.eat_op("/") {
                Arith::Div
            } else if self.eat_op("%") {
                Arith::Mod
            } else {
                return Ok(left);
            };
            left = Expr::Arith(op, Box::new(left), Box::new(self.unary()?));
        }
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.eat_op("-") {
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        if self.eat_op("+") {
            return self.unary();
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.eat_op("[") {
                let key = self.expression()?;
                self.expect_op("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(key));
            } else if self.eat_op(".") {
                match self.next() {
                    Some(Token::Ident(name)) => expr = Expr::Attr(Box::new(expr), name.clone()),
                    _ => return Err(self.error("expected attribute name after '.'")),
                }
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::Int(i)) => Ok(Expr::Literal(Value::from(*i))),
            Some(Token::Float(f)) => Ok(Expr::Literal(float(*f).ok_or_else(|| {
                self.error(format!("unrepresentable number {f}"))
            })?)),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s.clone()))),
            Some(Token::Ident(name)) => Ok(match name.as_str() {
                "True" | "true" => Expr::Literal(Value::Bool(true)),
                "False" | "false" => Expr::Literal(Value::Bool(false)),
                "None" | "null" => Expr::Literal(Value::Null),
                "and" | "or" | "not" | "in" => {
                    return Err(self.error(format!("unexpected keyword '{name}'")))
                }
                _ => Expr::Name(name.clone()),
            }),
            Some(Token::Op("(")) => {
                let expr = self.expression()?;
                self.expect_op(")")?;
                Ok(expr)
            }
            Some(token) => Err(self.error(format!("unexpected {token:?}"))),
            None => Err(self.error("unexpected end of expression")),
        }
    }
}

fn float(f: f64) -> Option<Value> {
    Number::from_f64(f).map(Value::Number)
}

#[derive(Clone, Copy, Debug)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn of(value: &Value) -> Option<Num> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .map(Num::Int)
                .or_else(|| n.as_f64().map(Num::Float)),
            Value::Bool(b) => Some(Num::Int(*b as i64)),
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

struct Interpreter<'a> {
    code: &'a str,
    scope: &'a dyn Scope,
}

impl<'a> Interpreter<'a> {
    fn error(&self, reason: impl Into<String>) -> ActionError {
        ActionError::invalid_expression(self.code, reason)
    }

    fn eval(&self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Name(name) => self
                .scope
                .resolve(name)
                .ok_or_else(|| self.error(format!("name '{name}' is not defined"))),
            Expr::Index(target, key) => {
                let target = self.eval(target)?;
                let key = self.eval(key)?;
                self.index(target, &key)
            }
            Expr::Attr(target, name) => {
                let target = self.eval(target)?;
                self.index(target, &Value::String(name.clone()))
            }
            Expr::Not(inner) => Ok(Value::Bool(!is_truthy(&self.eval(inner)?))),
            Expr::Neg(inner) => match Num::of(&self.eval(inner)?) {
                Some(Num::Int(i)) => i
                    .checked_neg()
                    .map(Value::from)
                    .ok_or_else(|| self.error("integer overflow")),
                Some(Num::Float(f)) => float(-f).ok_or_else(|| self.error("bad number")),
                None => Err(self.error("bad operand type for unary -")),
            },
            Expr::And(left, right) => {
                let left = self.eval(left)?;
                if is_truthy(&left) {
                    self.eval(right)
                } else {
                    Ok(left)
                }
            }
            Expr::Or(left, right) => {
                let left = self.eval(left)?;
                if is_truthy(&left) {
                    Ok(left)
                } else {
                    self.eval(right)
                }
            }
            Expr::Arith(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                self.arith(*op, &left, &right)
            }
            Expr::Compare(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                self.compare(*op, &left, &right).map(Value::Bool)
            }
        }
    }

    fn index(&self, target: Value, key: &Value) -> Result<Value> {
        match (target, key) {
            (Value::Object(mut map), Value::String(k)) => map
                .remove(k)
                .ok_or_else(|| ActionError::KeyNotFound(k.clone())),
            (Value::Array(items), key) => {
                let index = self.position(items.len(), key)?;
                Ok(items.into_iter().nth(index).unwrap_or(Value::Null))
            }
            (Value::String(s), key) => {
                let chars: Vec<char> = s.chars().collect();
                let index = self.position(chars.len(), key)?;
                Ok(Value::String(chars[index].to_string()))
            }
            (target, key) => Err(self.error(format!("cannot index {target} with {key}"))),
        }
    }

    // Resolves a possibly negative index into a sequence of length `len`.
    fn position(&self, len: usize, key: &Value) -> Result<usize> {
        let index = key
            .as_i64()
            .ok_or_else(|| self.error(format!("sequence index must be an integer, not {key}")))?;
        let resolved = if index < 0 { len as i64 + index } else { index };
        if resolved < 0 || resolved as usize >= len {
            return Err(self.error(format!("index {index} out of range")));
        }
        Ok(resolved as usize)
    }

    fn arith(&self, op: Arith, left: &Value, right: &Value) -> Result<Value> {
        if let (Arith::Add, Value::String(l), Value::String(r)) = (op, left, right) {
            return Ok(Value::String(format!("{l}{r}")));
        }

        let (Some(l), Some(r)) = (Num::of(left), Num::of(right)) else {
            return Err(self.error(format!("unsupported operand types: {left} and {right}")));
        };

        let overflow = || self.error("integer overflow");
        let by_zero = || self.error("division by zero");

        let result = match (op, l, r) {
            (Arith::Add, Num::Int(a), Num::Int(b)) => {
                Value::from(a.checked_add(b).ok_or_else(overflow)?)
            }
            (Arith::Sub, Num::Int(a), Num::Int(b)) => {
                Value::from(a.checked_sub(b).ok_or_else(overflow)?)
            }
            (Arith::Mul, Num::Int(a), Num::Int(b)) => {
                Value::from(a.checked_mul(b).ok_or_else(overflow)?)
            }
            (Arith::FloorDiv, Num::Int(_), Num::Int(0))
            | (Arith::Mod, Num::Int(_), Num::Int(0)) => return Err(by_zero()),
            (Arith::FloorDiv, Num::Int(a), Num::Int(b)) => {
                let q = a.checked_div(b).ok_or_else(overflow)?;
                let r = a.checked_rem(b).ok_or_else(overflow)?;
                Value::from(if r != 0 && (r < 0) != (b < 0) { q - 1 } else { q })
            }
            (Arith::Mod, Num::Int(a), Num::Int(b)) => {
                let r = a.checked_rem(b).ok_or_else(overflow)?;
                Value::from(if r != 0 && (r < 0) != (b < 0) { r + b } else { r })
            }
            (op, l, r) => {
                let (a, b) = (l.as_f64(), r.as_f64());
                let f = match op {
                    Arith::Add => a + b,
                    Arith::Sub => a - b,
                    Arith::Mul => a * b,
                    _ if b == 0.0 => return Err(by_zero()),
                    Arith::Div => a / b,
                    Arith::FloorDiv => (a / b).floor(),
                    Arith::Mod => a - b * (a / b).floor(),
                };
                float(f).ok_or_else(|| self.error("result is not a finite number"))?
            }
        };
        Ok(result)
    }

    fn compare(&self, op: Compare, left: &Value, right: &Value) -> Result<bool> {
        match op {
            Compare::Eq => Ok(equals(left, right)),
            Compare::Ne => Ok(!equals(left, right)),
            Compare::In => self.contains(right, left),
            Compare::NotIn => self.contains(right, left).map(|found| !found),
            Compare::Lt | Compare::Le | Compare::Gt | Compare::Ge => {
                let ordering = match (left, right) {
                    (Value::String(l), Value::String(r)) => l.partial_cmp(r),
                    _ => match (Num::of(left), Num::of(right)) {
                        (Some(l), Some(r)) => l.as_f64().partial_cmp(&r.as_f64()),
                        _ => None,
                    },
                }
                .ok_or_else(|| self.error(format!("cannot order {left} and {right}")))?;
                Ok(match op {
                    Compare::Lt => ordering.is_lt(),
                    Compare::Le => ordering.is_le(),
                    Compare::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                })
            }
        }
    }

    fn contains(&self, haystack: &Value, needle: &Value) -> Result<bool> {
        match (haystack, needle) {
            (Value::String(h), Value::String(n)) => Ok(h.contains(n.as_str())),
            (Value::Array(items), needle) => Ok(items.iter().any(|item| equals(item, needle))),
            (Value::Object(map), Value::String(key)) => Ok(map.contains_key(key)),
            _ => Err(self.error(format!("cannot test membership of {needle} in {haystack}"))),
        }
    }
}

// Equality that treats 1 and 1.0 as equal.
fn equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(_), Value::Number(_)) => match (Num::of(left), Num::of(right)) {
            (Some(Num::Int(a)), Some(Num::Int(b))) => a == b,
            (Some(a), Some(b)) => a.as_f64() == b.as_f64(),
            _ => false,
        },
        _ => left == right,
    }
}
