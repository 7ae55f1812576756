//! Restricted expression language for custom per-item policies.
//!
//! A script is a list of assignments to the two policy outputs:
//!
//! ```text
//! # slow down stimulus items, fail every tenth forwarded item
//! processing_time_ms = item.kind == "stimulus" ? params.processing_time_ms * 2 : 50
//! failed = item.seq % 10 == 0
//! ```
//!
//! Statements are separated by `;` or newlines (newlines inside parentheses
//! are whitespace) and `#` starts a comment. Targets may be written with a
//! `result.` prefix. Outputs that are never assigned keep their defaults:
//! `failed = false` and `processing_time_ms = params.processing_time_ms`.
//!
//! `item.seq` is the producer's sequence number: the upstream block's item
//! number for forwarded items, the ordinal among stimuli offered to the
//! block for stimuli.
//!
//! Names are resolved when the script is compiled, so a misspelt variable is
//! reported before the first item. Nesting deeper than 128 levels is also a
//! compile error. Type errors and division by zero are reported per
//! evaluation.

use std::fmt;

use crate::{error::ScriptError, item::Item, model::BlockParams, sim::SimRng};

use super::PolicyDecision;

/// A runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Number.
    Num(f64),
    /// String.
    Str(String),
}

impl Value {
    fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Num(_) => "number",
            Value::Str(_) => "string",
        }
    }

    fn as_num(&self, what: &str) -> Result<f64, ScriptError> {
        match self {
            Value::Num(n) => Ok(*n),
            other => Err(ScriptError::Type(format!(
                "{what} expects a number, got {}",
                other.type_name()
            ))),
        }
    }

    fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => n.as_f64().map_or(Value::Null, Value::Num),
            serde_json::Value::String(s) => Value::Str(s.clone()),
            other => Value::Str(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Num(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// Inputs visible to a script evaluation.
pub struct ScriptContext<'a> {
    /// Item being processed.
    pub item: &'a Item,
    /// Block parameters.
    pub params: &'a BlockParams,
    /// Current simulated time in milliseconds.
    pub now_ms: f64,
    /// Run-scoped generator backing `random()`.
    pub rng: &'a mut SimRng,
}

// ---------------------------------------------------------------------------
// Lexer

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(f64),
    Str(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
    Question,
    Colon,
    LParen,
    RParen,
    Comma,
    Dot,
    Assign,
    Separator,
    Eof,
}

impl fmt::Display for Tok {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tok::Num(n) => return write!(f, "number {n}"),
            Tok::Str(s) => return write!(f, "string {s:?}"),
            Tok::Ident(name) => return write!(f, "`{name}`"),
            Tok::Plus => "`+`",
            Tok::Minus => "`-`",
            Tok::Star => "`*`",
            Tok::Slash => "`/`",
            Tok::Percent => "`%`",
            Tok::EqEq => "`==`",
            Tok::NotEq => "`!=`",
            Tok::Lt => "`<`",
            Tok::Le => "`<=`",
            Tok::Gt => "`>`",
            Tok::Ge => "`>=`",
            Tok::AndAnd => "`&&`",
            Tok::OrOr => "`||`",
            Tok::Bang => "`!`",
            Tok::Question => "`?`",
            Tok::Colon => "`:`",
            Tok::LParen => "`(`",
            Tok::RParen => "`)`",
            Tok::Comma => "`,`",
            Tok::Dot => "`.`",
            Tok::Assign => "`=`",
            Tok::Separator => "end of statement",
            Tok::Eof => "end of script",
        };
        f.write_str(s)
    }
}

fn syntax(offset: usize, message: impl Into<String>) -> ScriptError {
    ScriptError::Syntax {
        offset,
        message: message.into(),
    }
}

fn lex(src: &str) -> Result<Vec<(usize, Tok)>, ScriptError> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut depth = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        let start = i;
        let c = bytes[i];
        match c {
            b' ' | b'\t' | b'\r' => i += 1,
            b'\n' => {
                if depth == 0 {
                    tokens.push((start, Tok::Separator));
                }
                i += 1;
            }
            b';' => {
                tokens.push((start, Tok::Separator));
                i += 1;
            }
            b'#' => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'0'..=b'9' => {
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                if i + 1 < bytes.len() && bytes[i] == b'.' && bytes[i + 1].is_ascii_digit() {
                    i += 1;
                    while i < bytes.len() && bytes[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
                    let mut j = i + 1;
                    if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
                        j += 1;
                    }
                    if j < bytes.len() && bytes[j].is_ascii_digit() {
                        i = j;
                        while i < bytes.len() && bytes[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text = &src[start..i];
                let n = text
                    .parse::<f64>()
                    .map_err(|_| syntax(start, format!("invalid number `{text}`")))?;
                tokens.push((start, Tok::Num(n)));
            }
            b'"' | b'\'' => {
                let quote = c;
                let mut out = String::new();
                i += 1;
                loop {
                    let Some(&b) = bytes.get(i) else {
                        return Err(syntax(start, "unterminated string"));
                    };
                    match b {
                        b'\\' => {
                            let escaped = match bytes.get(i + 1) {
                                Some(b'n') => '\n',
                                Some(b't') => '\t',
                                Some(b'\\') => '\\',
                                Some(b'"') => '"',
                                Some(b'\'') => '\'',
                                _ => return Err(syntax(i, "invalid escape")),
                            };
                            out.push(escaped);
                            i += 2;
                        }
                        b if b == quote => {
                            i += 1;
                            break;
                        }
                        _ => {
                            // Copy one full UTF-8 character
                            let ch = src[i..]
                                .chars()
                                .next()
                                .ok_or_else(|| syntax(i, "invalid text"))?;
                            out.push(ch);
                            i += ch.len_utf8();
                        }
                    }
                }
                tokens.push((start, Tok::Str(out)));
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                tokens.push((start, Tok::Ident(src[start..i].to_string())));
            }
            _ => {
                let next = bytes.get(i + 1).copied();
                let (tok, len) = match (c, next) {
                    (b'=', Some(b'=')) => (Tok::EqEq, 2),
                    (b'!', Some(b'=')) => (Tok::NotEq, 2),
                    (b'<', Some(b'=')) => (Tok::Le, 2),
                    (b'>', Some(b'=')) => (Tok::Ge, 2),
                    (b'&', Some(b'&')) => (Tok::AndAnd, 2),
                    (b'|', Some(b'|')) => (Tok::OrOr, 2),
                    (b'=', _) => (Tok::Assign, 1),
                    (b'!', _) => (Tok::Bang, 1),
                    (b'<', _) => (Tok::Lt, 1),
                    (b'>', _) => (Tok::Gt, 1),
                    (b'+', _) => (Tok::Plus, 1),
                    (b'-', _) => (Tok::Minus, 1),
                    (b'*', _) => (Tok::Star, 1),
                    (b'/', _) => (Tok::Slash, 1),
                    (b'%', _) => (Tok::Percent, 1),
                    (b'?', _) => (Tok::Question, 1),
                    (b':', _) => (Tok::Colon, 1),
                    (b',', _) => (Tok::Comma, 1),
                    (b'.', _) => (Tok::Dot, 1),
                    (b'(', _) => {
                        depth += 1;
                        (Tok::LParen, 1)
                    }
                    (b')', _) => {
                        depth = depth.saturating_sub(1);
                        (Tok::RParen, 1)
                    }
                    _ => {
                        let ch = src[i..].chars().next().unwrap_or('?');
                        return Err(syntax(i, format!("unexpected character `{ch}`")));
                    }
                };
                tokens.push((start, tok));
                i += len;
            }
        }
    }
    tokens.push((src.len(), Tok::Eof));
    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Syntax tree

#[derive(Debug, Clone, Copy, PartialEq)]
enum Output {
    Failed,
    ProcessingTime,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Var {
    Now,
    ItemSeq,
    ItemValue,
    ItemSignal,
    ItemKind,
    ItemSource,
    ProcessingTime,
    FailureRate,
    QueueCapacity,
    Throughput,
}

impl Var {
    fn resolve(path: &str) -> Option<Self> {
        Some(match path {
            "now" | "env_now" => Var::Now,
            "item.seq" => Var::ItemSeq,
            "item.value" => Var::ItemValue,
            "item.signal" | "item.signal_type" => Var::ItemSignal,
            "item.kind" => Var::ItemKind,
            "item.source" => Var::ItemSource,
            "params.processing_time_ms" => Var::ProcessingTime,
            "params.failure_rate" => Var::FailureRate,
            "params.queue_capacity" => Var::QueueCapacity,
            "params.throughput_per_sec" => Var::Throughput,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Func {
    Min,
    Max,
    Abs,
    Floor,
    Ceil,
    Random,
}

impl Func {
    fn resolve(name: &str) -> Option<Self> {
        Some(match name {
            "min" => Func::Min,
            "max" => Func::Max,
            "abs" => Func::Abs,
            "floor" => Func::Floor,
            "ceil" => Func::Ceil,
            "random" => Func::Random,
            _ => return None,
        })
    }

    fn check_arity(self, name: &str, argc: usize) -> Result<(), ScriptError> {
        let ok = match self {
            Func::Min | Func::Max => argc >= 1,
            Func::Abs | Func::Floor | Func::Ceil => argc == 1,
            Func::Random => argc == 0,
        };
        if ok {
            Ok(())
        } else {
            Err(ScriptError::Type(format!(
                "{name}() does not take {argc} argument(s)"
            )))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Lit(Value),
    Var(Var),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Cond(Box<Expr>, Box<Expr>, Box<Expr>),
    Call(Func, Vec<Expr>),
}

// ---------------------------------------------------------------------------
// Parser

fn literal(word: &str) -> Option<Value> {
    match word {
        "true" | "True" => Some(Value::Bool(true)),
        "false" | "False" => Some(Value::Bool(false)),
        "null" | "None" => Some(Value::Null),
        _ => None,
    }
}

/// Deepest expression tree a script may build. Chained operators count one
/// level per link, so evaluating and dropping a compiled tree stays shallow.
const MAX_DEPTH: usize = 128;

struct Parser {
    tokens: Vec<(usize, Tok)>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<(usize, Tok)>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn descend(&mut self) -> Result<(), ScriptError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(syntax(self.offset(), "expression nested too deeply"));
        }
        Ok(())
    }

    fn nested(
        &mut self,
        parse: fn(&mut Self) -> Result<Expr, ScriptError>,
    ) -> Result<Expr, ScriptError> {
        let base = self.depth;
        self.descend()?;
        let expr = parse(self)?;
        self.depth = base;
        Ok(expr)
    }

    fn peek(&self) -> &Tok {
        self.tokens.get(self.pos).map_or(&Tok::Eof, |(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(0, |(o, _)| *o)
    }

    fn bump(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == tok {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Tok::Ident(w) if w == word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok) -> Result<(), ScriptError> {
        if self.eat(&tok) {
            Ok(())
        } else {
            Err(syntax(
                self.offset(),
                format!("expected {tok}, found {}", self.peek()),
            ))
        }
    }

    fn program(&mut self) -> Result<Vec<(Output, Expr)>, ScriptError> {
        let mut statements = Vec::new();
        loop {
            while self.eat(&Tok::Separator) {}
            if self.eat(&Tok::Eof) {
                return Ok(statements);
            }
            statements.push(self.statement()?);
            match self.peek() {
                Tok::Separator | Tok::Eof => {}
                other => {
                    return Err(syntax(
                        self.offset(),
                        format!("expected end of statement, found {other}"),
                    ));
                }
            }
        }
    }

    fn statement(&mut self) -> Result<(Output, Expr), ScriptError> {
        let offset = self.offset();
        let path = match self.bump() {
            Tok::Ident(first) => self.dotted(first)?,
            other => return Err(syntax(offset, format!("expected an assignment, found {other}"))),
        };
        let target = match path.as_str() {
            "failed" | "result.failed" => Output::Failed,
            "processing_time_ms" | "result.processing_time_ms" => Output::ProcessingTime,
            _ => return Err(ScriptError::InvalidTarget(path)),
        };
        self.expect(Tok::Assign)?;
        Ok((target, self.expr()?))
    }

    fn dotted(&mut self, first: String) -> Result<String, ScriptError> {
        let mut path = first;
        while self.eat(&Tok::Dot) {
            match self.bump() {
                Tok::Ident(part) => {
                    path.push('.');
                    path.push_str(&part);
                }
                other => {
                    return Err(syntax(
                        self.offset(),
                        format!("expected a name after `.`, found {other}"),
                    ));
                }
            }
        }
        Ok(path)
    }

    fn expr(&mut self) -> Result<Expr, ScriptError> {
        self.nested(Self::conditional)
    }

    fn conditional(&mut self) -> Result<Expr, ScriptError> {
        let cond = self.or()?;
        if self.eat(&Tok::Question) {
            let then = self.expr()?;
            self.expect(Tok::Colon)?;
            let otherwise = self.expr()?;
            return Ok(Expr::Cond(Box::new(cond), Box::new(then), Box::new(otherwise)));
        }
        Ok(cond)
    }

    fn or(&mut self) -> Result<Expr, ScriptError> {
        let base = self.depth;
        let mut lhs = self.and()?;
        while self.eat(&Tok::OrOr) || self.eat_word("or") {
            self.descend()?;
            let rhs = self.and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        self.depth = base;
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, ScriptError> {
        let base = self.depth;
        let mut lhs = self.equality()?;
        while self.eat(&Tok::AndAnd) || self.eat_word("and") {
            self.descend()?;
            let rhs = self.equality()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        self.depth = base;
        Ok(lhs)
    }

    /// Parses a left-associative chain of `operand`s joined by the operators
    /// `op_of` recognizes.
    fn chain(
        &mut self,
        operand: fn(&mut Self) -> Result<Expr, ScriptError>,
        op_of: fn(&Tok) -> Option<BinOp>,
    ) -> Result<Expr, ScriptError> {
        let base = self.depth;
        let mut lhs = operand(self)?;
        while let Some(op) = op_of(self.peek()) {
            self.pos += 1;
            self.descend()?;
            let rhs = operand(self)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        self.depth = base;
        Ok(lhs)
    }

    fn equality(&mut self) -> Result<Expr, ScriptError> {
        self.chain(Self::comparison, |tok| match tok {
            Tok::EqEq => Some(BinOp::Eq),
            Tok::NotEq => Some(BinOp::Ne),
            _ => None,
        })
    }

    fn comparison(&mut self) -> Result<Expr, ScriptError> {
        self.chain(Self::additive, |tok| match tok {
            Tok::Lt => Some(BinOp::Lt),
            Tok::Le => Some(BinOp::Le),
            Tok::Gt => Some(BinOp::Gt),
            Tok::Ge => Some(BinOp::Ge),
            _ => None,
        })
    }

    fn additive(&mut self) -> Result<Expr, ScriptError> {
        self.chain(Self::multiplicative, |tok| match tok {
            Tok::Plus => Some(BinOp::Add),
            Tok::Minus => Some(BinOp::Sub),
            _ => None,
        })
    }

    fn multiplicative(&mut self) -> Result<Expr, ScriptError> {
        self.chain(Self::unary, |tok| match tok {
            Tok::Star => Some(BinOp::Mul),
            Tok::Slash => Some(BinOp::Div),
            Tok::Percent => Some(BinOp::Rem),
            _ => None,
        })
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        if self.eat(&Tok::Minus) {
            return Ok(Expr::Neg(Box::new(self.nested(Self::unary)?)));
        }
        if self.eat(&Tok::Bang) || self.eat_word("not") {
            return Ok(Expr::Not(Box::new(self.nested(Self::unary)?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        let offset = self.offset();
        match self.bump() {
            Tok::Num(n) => Ok(Expr::Lit(Value::Num(n))),
            Tok::Str(s) => Ok(Expr::Lit(Value::Str(s))),
            Tok::LParen => {
                let inner = self.expr()?;
                self.expect(Tok::RParen)?;
                Ok(inner)
            }
            Tok::Ident(word) => {
                if let Some(lit) = literal(&word) {
                    return Ok(Expr::Lit(lit));
                }
                if !self.eat(&Tok::LParen) {
                    let path = self.dotted(word)?;
                    return Var::resolve(&path)
                        .map(Expr::Var)
                        .ok_or(ScriptError::UnknownName(path));
                }
                let func =
                    Func::resolve(&word).ok_or_else(|| ScriptError::UnknownName(word.clone()))?;
                let mut args = Vec::new();
                if !self.eat(&Tok::RParen) {
                    loop {
                        args.push(self.expr()?);
                        if self.eat(&Tok::RParen) {
                            break;
                        }
                        self.expect(Tok::Comma)?;
                    }
                }
                func.check_arity(&word, args.len())?;
                Ok(Expr::Call(func, args))
            }
            other => Err(syntax(offset, format!("expected an expression, found {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation

fn read_var(var: Var, ctx: &ScriptContext<'_>) -> Value {
    match (var, ctx.item) {
        (Var::Now, _) => Value::Num(ctx.now_ms),
        (Var::ItemSeq, item) => Value::Num(item.seq() as f64),
        (Var::ItemValue, Item::Stimulus { value, .. }) => Value::from_json(value),
        (Var::ItemSignal, Item::Stimulus { signal_type, .. }) => Value::Str(signal_type.clone()),
        (Var::ItemSource, Item::Forwarded { source, .. }) => Value::Str(source.clone()),
        (Var::ItemKind, item) => Value::Str(item.kind().to_string()),
        (Var::ItemValue | Var::ItemSignal | Var::ItemSource, _) => Value::Null,
        (Var::ProcessingTime, _) => Value::Num(ctx.params.processing_time_ms),
        (Var::FailureRate, _) => Value::Num(ctx.params.failure_rate),
        (Var::QueueCapacity, _) => Value::Num(ctx.params.queue_capacity as f64),
        (Var::Throughput, _) => ctx.params.throughput_per_sec.map_or(Value::Null, Value::Num),
    }
}

fn binary(op: BinOp, lhs: Value, rhs: Value) -> Result<Value, ScriptError> {
    use BinOp::*;
    Ok(match (op, &lhs, &rhs) {
        (Eq, _, _) => Value::Bool(lhs == rhs),
        (Ne, _, _) => Value::Bool(lhs != rhs),
        (Add, Value::Str(a), Value::Str(b)) => Value::Str(format!("{a}{b}")),
        (Lt | Le | Gt | Ge, Value::Str(a), Value::Str(b)) => Value::Bool(match op {
            Lt => a < b,
            Le => a <= b,
            Gt => a > b,
            _ => a >= b,
        }),
        (_, Value::Num(a), Value::Num(b)) => {
            let (a, b) = (*a, *b);
            match op {
                Add => Value::Num(a + b),
                Sub => Value::Num(a - b),
                Mul => Value::Num(a * b),
                Div | Rem if b == 0.0 => return Err(ScriptError::DivisionByZero),
                Div => Value::Num(a / b),
                Rem => Value::Num(a % b),
                Lt => Value::Bool(a < b),
                Le => Value::Bool(a <= b),
                Gt => Value::Bool(a > b),
                Ge => Value::Bool(a >= b),
                Eq => Value::Bool(a == b),
                Ne => Value::Bool(a != b),
            }
        }
        _ => {
            return Err(ScriptError::Type(format!(
                "cannot apply {op:?} to {} and {}",
                lhs.type_name(),
                rhs.type_name()
            )));
        }
    })
}

fn eval(expr: &Expr, ctx: &mut ScriptContext<'_>) -> Result<Value, ScriptError> {
    Ok(match expr {
        Expr::Lit(v) => v.clone(),
        Expr::Var(var) => read_var(*var, ctx),
        Expr::Neg(inner) => Value::Num(-eval(inner, ctx)?.as_num("unary `-`")?),
        Expr::Not(inner) => Value::Bool(!eval(inner, ctx)?.truthy()),
        Expr::Binary(op, lhs, rhs) => {
            let lhs = eval(lhs, ctx)?;
            let rhs = eval(rhs, ctx)?;
            binary(*op, lhs, rhs)?
        }
        Expr::And(lhs, rhs) => Value::Bool(eval(lhs, ctx)?.truthy() && eval(rhs, ctx)?.truthy()),
        Expr::Or(lhs, rhs) => Value::Bool(eval(lhs, ctx)?.truthy() || eval(rhs, ctx)?.truthy()),
        Expr::Cond(cond, then, otherwise) => {
            if eval(cond, ctx)?.truthy() {
                eval(then, ctx)?
            } else {
                eval(otherwise, ctx)?
            }
        }
        Expr::Call(func, args) => {
            let mut nums = Vec::with_capacity(args.len());
            for arg in args {
                nums.push(eval(arg, ctx)?.as_num(&format!("{func:?}"))?);
            }
            match func {
                Func::Min => Value::Num(nums.iter().copied().fold(f64::INFINITY, f64::min)),
                Func::Max => Value::Num(nums.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
                Func::Abs => Value::Num(nums.first().copied().unwrap_or_default().abs()),
                Func::Floor => Value::Num(nums.first().copied().unwrap_or_default().floor()),
                Func::Ceil => Value::Num(nums.first().copied().unwrap_or_default().ceil()),
                Func::Random => Value::Num(ctx.rng.random_f64()),
            }
        }
    })
}

/// A compiled policy script.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    statements: Vec<(Output, Expr)>,
}

impl Program {
    /// Parses `src` and resolves every name it uses.
    pub fn compile(src: &str) -> Result<Self, ScriptError> {
        let tokens = lex(src)?;
        let statements = Parser::new(tokens).program()?;
        Ok(Self { statements })
    }

    /// Number of assignments in the script.
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Returns `true` for a script without assignments.
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Runs the assignments in order and returns the resulting decision.
    pub fn evaluate(&self, ctx: &mut ScriptContext<'_>) -> Result<PolicyDecision, ScriptError> {
        let mut decision = PolicyDecision {
            failed: false,
            processing_time_ms: ctx.params.processing_time_ms,
        };
        for (target, expr) in &self.statements {
            let value = eval(expr, ctx)?;
            match target {
                Output::Failed => decision.failed = value.truthy(),
                Output::ProcessingTime => {
                    decision.processing_time_ms = value.as_num("processing_time_ms")?;
                }
            }
        }
        Ok(decision)
    }
}
