//! Expression lexer, AST, parser, and evaluator.
//!
//! Operator precedence (lowest → highest):
//!   ternary  →  or  →  and  →  equality  →  relational  →
//!   additive  →  multiplicative  →  unary  →  postfix  →  primary
//!
//! Postfix covers calls `f(...)`, member access `.name` and indexing `[e]`.
//! Calls accept positional arguments followed by `name = expr` named ones.

use std::collections::BTreeSet;

use super::error::{DirectiveError, Result};
use super::function::NamedArgs;
use super::location::Location;
use super::value::{Number, Object, Value};

/// Parser recursion bound for nested expressions.
pub const MAX_NESTING: usize = 64;

/// Bound on binary, ternary, member and index operators in one expression.
/// Operator chains build left-leaning trees that are evaluated recursively.
pub const MAX_OPERATORS: usize = 256;

// ── EvalContext ───────────────────────────────────────────────────────────────

/// Dependency-injection interface used by the evaluator and by plain-line
/// expansion.  The execution context implements it over the current memory.
pub trait EvalContext {
    /// Look up a variable (innermost scope first, then global).
    fn get_var(&self, name: &str) -> Option<Value>;

    /// Whether a user-defined function or procedure named `name` exists.
    fn has_user_function(&self, name: &str) -> bool;

    /// Invoke a function in expression context.
    fn call_fn(&mut self, name: &str, args: Vec<Value>, named: NamedArgs, location: Location) -> Result<Value>;

    /// Location of the directive being evaluated, for errors that arise
    /// outside any call site.
    fn location(&self) -> Location;
}

// ── Token ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(Number),
    Str(String),
    /// Identifier, including a leading `$` when present.
    Ident(String),
    /// Built-in function name, including the leading `%`.
    Builtin(String),

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,

    Eq, // ==
    Ne, // !=
    Lt,
    Le,
    Gt,
    Ge,
    And, // &&
    Or,  // ||
    Assign,

    Question,
    Colon,
    Comma,
    Dot,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    /// A string literal with no closing quote.
    Unterminated,
    /// Unrecognised input character, reported as a diagnostic.
    Unknown(char),
    Eof,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("number {n}"),
            Token::Str(s) => format!("string {s:?}"),
            Token::Ident(s) | Token::Builtin(s) => format!("'{s}'"),
            Token::Unknown(c) => format!("'{c}'"),
            Token::Eof => "end of expression".into(),
            other => format!("{other:?}"),
        }
    }
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    start: usize,
    end: usize,
}

pub(crate) fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

pub(crate) fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

// ── Lexer ─────────────────────────────────────────────────────────────────────

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Lexer { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t')) {
            self.pos += 1;
        }
    }

    fn eat_digits(&mut self) {
        while matches!(self.peek(), Some('0'..='9')) {
            self.pos += 1;
        }
    }

    fn read_number(&mut self, start: usize) -> Token {
        self.eat_digits();
        let b = self.rest().as_bytes();
        if b.first() == Some(&b'.') && b.get(1).is_some_and(u8::is_ascii_digit) {
            self.pos += 1;
            self.eat_digits();
        }
        let b = self.rest().as_bytes();
        if matches!(b.first(), Some(b'e' | b'E')) {
            let digit_at = if matches!(b.get(1), Some(b'+' | b'-')) { 2 } else { 1 };
            if b.get(digit_at).is_some_and(u8::is_ascii_digit) {
                self.pos += digit_at;
                self.eat_digits();
            }
        }
        // Only digit runs too long for an f64 fail to parse.
        let text = &self.src[start..self.pos];
        Number::parse(text).map_or(Token::Unknown('0'), Token::Number)
    }

    fn read_string(&mut self, quote: char) -> Token {
        let mut s = String::new();
        loop {
            match self.advance() {
                None => return Token::Unterminated,
                Some('\\') => match self.advance() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('r') => s.push('\r'),
                    Some(c) => s.push(c),
                    None => return Token::Unterminated,
                },
                Some(c) if c == quote => return Token::Str(s),
                Some(c) => s.push(c),
            }
        }
    }

    fn read_name(&mut self, start: usize) -> &'a str {
        while self.peek().is_some_and(is_ident_char) {
            self.pos += 1;
        }
        &self.src[start..self.pos]
    }

    fn next_token(&mut self) -> Spanned {
        self.skip_ws();
        let start = self.pos;
        let token = match self.advance() {
            None => Token::Eof,
            Some(c) => self.token_from(c, start),
        };
        Spanned { token, start, end: self.pos }
    }

    fn token_from(&mut self, c: char, start: usize) -> Token {
        match c {
            '0'..='9' => self.read_number(start),
            '"' | '\'' => self.read_string(c),
            c if is_ident_start(c) => Token::Ident(self.read_name(start).to_owned()),
            '$' if self.peek().is_some_and(is_ident_start) => Token::Ident(self.read_name(start).to_owned()),
            '%' if self.peek().is_some_and(is_ident_start) => Token::Builtin(self.read_name(start).to_owned()),
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '!' if self.eat('=') => Token::Ne,
            '!' => Token::Bang,
            '=' if self.eat('=') => Token::Eq,
            '=' => Token::Assign,
            '<' if self.eat('=') => Token::Le,
            '<' => Token::Lt,
            '>' if self.eat('=') => Token::Ge,
            '>' => Token::Gt,
            '&' if self.eat('&') => Token::And,
            '|' if self.eat('|') => Token::Or,
            '?' => Token::Question,
            ':' => Token::Colon,
            ',' => Token::Comma,
            '.' => Token::Dot,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            other => Token::Unknown(other),
        }
    }
}

// ── AST ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
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
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Positional(Expr),
    Named(String, Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(String),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Call { name: String, args: Vec<Arg>, location: Location },
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
}

// ── Parser ────────────────────────────────────────────────────────────────────

/// Tokens are pulled from the lexer on demand so a reference embedded in
/// free text is parsed without lexing the rest of the line.
struct Parser<'a> {
    lexer: Lexer<'a>,
    tokens: Vec<Spanned>,
    pos: usize,
    last_end: usize,
    base: Location,
    depth: usize,
    operators: usize,
    /// Postfix operators must touch the previous token (plain-text mode).
    adjacent_postfix: bool,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str, base: Location) -> Self {
        Parser {
            lexer: Lexer::new(src),
            tokens: Vec::new(),
            pos: 0,
            last_end: 0,
            base,
            depth: 0,
            operators: 0,
            adjacent_postfix: false,
        }
    }

    fn fill(&mut self, ahead: usize) {
        while self.tokens.len() <= self.pos + ahead {
            let t = self.lexer.next_token();
            self.tokens.push(t);
        }
    }

    fn peek_at(&mut self, ahead: usize) -> &Spanned {
        self.fill(ahead);
        &self.tokens[self.pos + ahead]
    }

    fn peek(&mut self) -> &Token {
        &self.peek_at(0).token
    }

    fn advance(&mut self) -> Spanned {
        self.fill(0);
        let t = self.tokens[self.pos].clone();
        self.pos += 1;
        self.last_end = t.end;
        t
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Whether the next token starts where the previous one ended.
    fn touches(&mut self) -> bool {
        let last = self.last_end;
        self.peek_at(0).start == last
    }

    fn location_of(&self, offset: usize) -> Location {
        let chars = self.lexer.src.get(..offset).map_or(0, |s| s.chars().count());
        self.base.shifted(chars)
    }

    fn error_here(&mut self, message: impl Into<String>) -> DirectiveError {
        let start = self.peek_at(0).start;
        DirectiveError::syntax(message, self.location_of(start))
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<()> {
        if self.eat(&expected) {
            Ok(())
        } else {
            let found = self.peek().describe();
            Err(self.error_here(format!("expected {what}, found {found}")))
        }
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= MAX_NESTING {
            return Err(self.error_here(format!("expression nested deeper than {MAX_NESTING} levels")));
        }
        self.depth += 1;
        let r = f(self);
        self.depth -= 1;
        r
    }

    /// Count one operator node against [`MAX_OPERATORS`].
    fn operator(&mut self) -> Result<()> {
        if self.operators >= MAX_OPERATORS {
            return Err(self.error_here(format!("expression has more than {MAX_OPERATORS} operators")));
        }
        self.operators += 1;
        Ok(())
    }

    // ── Grammar ───────────────────────────────────────────────────────────────

    fn parse_expr(&mut self) -> Result<Expr> {
        self.nested(Self::parse_ternary)
    }

    fn parse_ternary(&mut self) -> Result<Expr> {
        let cond = self.parse_or()?;
        if matches!(self.peek(), Token::Question) {
            self.operator()?;
            self.advance();
            let then = self.parse_expr()?;
            self.expect(Token::Colon, "':' in conditional expression")?;
            let else_ = self.parse_expr()?;
            Ok(Expr::Ternary(Box::new(cond), Box::new(then), Box::new(else_)))
        } else {
            Ok(cond)
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek(), Token::Or) {
            self.operator()?;
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_equality()?;
        while matches!(self.peek(), Token::And) {
            self.operator()?;
            self.advance();
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Token::Eq => BinOp::Eq,
                Token::Ne => BinOp::Ne,
                _ => break,
            };
            self.operator()?;
            self.advance();
            let rhs = self.parse_relational()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinOp::Lt,
                Token::Le => BinOp::Le,
                Token::Gt => BinOp::Gt,
                Token::Ge => BinOp::Ge,
                _ => break,
            };
            self.operator()?;
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.operator()?;
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Rem,
                _ => break,
            };
            self.operator()?;
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let op = match self.peek() {
            Token::Minus => UnaryOp::Neg,
            Token::Bang => UnaryOp::Not,
            _ => return self.parse_postfix(),
        };
        self.advance();
        let inner = self.nested(Self::parse_unary)?;
        Ok(Expr::Unary(op, Box::new(inner)))
    }

    fn postfix_allowed(&mut self) -> bool {
        !self.adjacent_postfix || self.touches()
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Token::Dot => {
                    if !self.postfix_allowed() {
                        break;
                    }
                    self.fill(1);
                    let (dot, next) = (&self.tokens[self.pos], &self.tokens[self.pos + 1]);
                    let member = match &next.token {
                        Token::Ident(name)
                            if !name.starts_with('$') && (!self.adjacent_postfix || next.start == dot.end) =>
                        {
                            Some(name.clone())
                        }
                        _ => None,
                    };
                    let Some(member) = member else {
                        if self.adjacent_postfix {
                            break;
                        }
                        self.advance();
                        return Err(self.error_here("expected member name after '.'"));
                    };
                    self.operator()?;
                    self.advance();
                    self.advance();
                    expr = Expr::Member(Box::new(expr), member);
                }
                Token::LBracket => {
                    if !self.postfix_allowed() {
                        break;
                    }
                    self.operator()?;
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(Token::RBracket, "']'")?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let tok = self.advance();
        match tok.token {
            Token::Number(n) => Ok(Expr::Literal(Value::Number(n))),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Ident(name) => {
                if matches!(self.peek(), Token::LParen) && self.postfix_allowed() {
                    return self.parse_call(name, tok.start);
                }
                Ok(match name.as_str() {
                    "true" => Expr::Literal(Value::Boolean(true)),
                    "false" => Expr::Literal(Value::Boolean(false)),
                    "null" => Expr::Literal(Value::Null),
                    _ => Expr::Var(name),
                })
            }
            Token::Builtin(name) => {
                if matches!(self.peek(), Token::LParen) && self.postfix_allowed() {
                    self.parse_call(name, tok.start)
                } else {
                    Err(self.error_here(format!("expected '(' after {name}")))
                }
            }
            Token::LParen => {
                let inner = self.parse_expr()?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::LBracket => self.parse_array(),
            Token::LBrace => self.parse_object(),
            Token::Unterminated => Err(DirectiveError::syntax(
                "unterminated string literal",
                self.location_of(tok.start),
            )),
            other => Err(DirectiveError::syntax(
                format!("unexpected {}", other.describe()),
                self.location_of(tok.start),
            )),
        }
    }

    fn parse_call(&mut self, name: String, start: usize) -> Result<Expr> {
        let location = self.location_of(start);
        self.advance(); // '('
        let mut args = Vec::new();
        let mut named = BTreeSet::new();
        if self.eat(&Token::RParen) {
            return Ok(Expr::Call { name, args, location });
        }
        let saved = self.adjacent_postfix;
        self.adjacent_postfix = false;
        let result = self.parse_call_args(&name, &mut args, &mut named);
        self.adjacent_postfix = saved;
        result?;
        Ok(Expr::Call { name, args, location })
    }

    fn parse_call_args(&mut self, name: &str, args: &mut Vec<Arg>, named: &mut BTreeSet<String>) -> Result<()> {
        loop {
            self.fill(1);
            let key = match (&self.tokens[self.pos].token, &self.tokens[self.pos + 1].token) {
                (Token::Ident(key), Token::Assign) => Some(key.clone()),
                _ => None,
            };
            match key {
                Some(key) => {
                    if !named.insert(key.clone()) {
                        return Err(self.error_here(format!("duplicate named argument {key} in call to {name}")));
                    }
                    self.advance();
                    self.advance();
                    args.push(Arg::Named(key, self.parse_expr()?));
                }
                None if !named.is_empty() => {
                    return Err(self.error_here(format!("positional argument after named arguments in call to {name}")));
                }
                None => args.push(Arg::Positional(self.parse_expr()?)),
            }
            if self.eat(&Token::Comma) {
                continue;
            }
            return self.expect(Token::RParen, &format!("',' or ')' in call to {name}"));
        }
    }

    fn parse_array(&mut self) -> Result<Expr> {
        let mut items = Vec::new();
        if self.eat(&Token::RBracket) {
            return Ok(Expr::Array(items));
        }
        loop {
            items.push(self.parse_expr()?);
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(Token::RBracket, "',' or ']' in array literal")?;
            return Ok(Expr::Array(items));
        }
    }

    fn parse_object(&mut self) -> Result<Expr> {
        let mut entries = Vec::new();
        if self.eat(&Token::RBrace) {
            return Ok(Expr::Object(entries));
        }
        loop {
            let key = match self.peek().clone() {
                Token::Str(s) | Token::Ident(s) => s,
                other => return Err(self.error_here(format!("expected object key, found {}", other.describe()))),
            };
            self.advance();
            self.expect(Token::Colon, "':' after object key")?;
            entries.push((key, self.parse_expr()?));
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(Token::RBrace, "',' or '}' in object literal")?;
            return Ok(Expr::Object(entries));
        }
    }
}

/// Parse a complete expression.  `base` is the location of `src`'s first
/// character; errors point into the original line.
pub fn parse_expr(src: &str, base: Location) -> Result<Expr> {
    let mut parser = Parser::new(src, base);
    let expr = parser.parse_expr()?;
    if !matches!(parser.peek(), Token::Eof) {
        let found = parser.peek().describe();
        return Err(parser.error_here(format!("unexpected {found} after expression")));
    }
    Ok(expr)
}

/// Parse a reference at the start of free text: a name, optionally called,
/// followed by any `.member` / `[index]` chain touching it.  Returns the
/// expression and the number of bytes it spans.
pub fn parse_reference(src: &str, base: Location) -> Result<(Expr, usize)> {
    let mut parser = Parser::new(src, base);
    parser.adjacent_postfix = true;
    let expr = parser.parse_postfix()?;
    Ok((expr, parser.last_end))
}

// ── Evaluator ─────────────────────────────────────────────────────────────────

/// Evaluate call arguments left to right.
pub fn eval_args(args: &[Arg], ctx: &mut dyn EvalContext) -> Result<(Vec<Value>, NamedArgs)> {
    let mut positional = Vec::with_capacity(args.len());
    let mut named = NamedArgs::new();
    for arg in args {
        match arg {
            Arg::Positional(e) => positional.push(eval_expr(e, ctx)?),
            Arg::Named(key, e) => {
                let v = eval_expr(e, ctx)?;
                named.insert(key.clone(), v);
            }
        }
    }
    Ok((positional, named))
}

/// Evaluate an [`Expr`] AST node against the given context.
pub fn eval_expr(expr: &Expr, ctx: &mut dyn EvalContext) -> Result<Value> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),

        Expr::Var(name) => Ok(ctx.get_var(name).unwrap_or_default()),

        Expr::Array(items) => items
            .iter()
            .map(|e| eval_expr(e, ctx))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),

        Expr::Object(entries) => {
            let mut obj = Object::new();
            for (key, e) in entries {
                let v = eval_expr(e, ctx)?;
                obj.insert(key.clone(), v);
            }
            Ok(Value::Object(obj))
        }

        Expr::Unary(op, inner) => {
            let v = eval_expr(inner, ctx)?;
            match op {
                UnaryOp::Neg => v.neg().map_err(|e| DirectiveError::from_value(e, ctx.location())),
                UnaryOp::Not => Ok(Value::Boolean(!v.is_truthy())),
            }
        }

        Expr::Binary(op, lhs, rhs) => {
            // Short-circuit for && and ||
            match op {
                BinOp::And => {
                    let l = eval_expr(lhs, ctx)?;
                    if !l.is_truthy() {
                        return Ok(Value::Boolean(false));
                    }
                    return Ok(Value::Boolean(eval_expr(rhs, ctx)?.is_truthy()));
                }
                BinOp::Or => {
                    let l = eval_expr(lhs, ctx)?;
                    if l.is_truthy() {
                        return Ok(Value::Boolean(true));
                    }
                    return Ok(Value::Boolean(eval_expr(rhs, ctx)?.is_truthy()));
                }
                _ => {}
            }
            let l = eval_expr(lhs, ctx)?;
            let r = eval_expr(rhs, ctx)?;
            eval_binop(*op, &l, &r).map_err(|e| DirectiveError::from_value(e, ctx.location()))
        }

        Expr::Ternary(cond, then, else_) => {
            if eval_expr(cond, ctx)?.is_truthy() {
                eval_expr(then, ctx)
            } else {
                eval_expr(else_, ctx)
            }
        }

        Expr::Call { name, args, location } => {
            let (positional, named) = eval_args(args, ctx)?;
            ctx.call_fn(name, positional, named, *location)
        }

        Expr::Member(base, member) => Ok(match eval_expr(base, ctx)? {
            Value::Object(obj) => obj.get(member).cloned().unwrap_or_default(),
            _ => Value::Null,
        }),

        Expr::Index(base, index) => {
            let base = eval_expr(base, ctx)?;
            let index = eval_expr(index, ctx)?;
            Ok(index_value(&base, &index))
        }
    }
}

fn index_value(base: &Value, index: &Value) -> Value {
    match (base, index) {
        (Value::Array(items), Value::Number(n)) if n.is_integral() => usize::try_from(n.as_i64())
            .ok()
            .and_then(|i| items.get(i))
            .cloned()
            .unwrap_or_default(),
        (Value::Object(obj), key) if !key.is_null() => obj.get(&key.to_string()).cloned().unwrap_or_default(),
        _ => Value::Null,
    }
}

fn eval_binop(op: BinOp, l: &Value, r: &Value) -> std::result::Result<Value, super::value::ValueError> {
    use std::cmp::Ordering;
    Ok(match op {
        BinOp::Add => l.add(r)?,
        BinOp::Sub => l.sub(r)?,
        BinOp::Mul => l.mul(r)?,
        BinOp::Div => l.div(r)?,
        BinOp::Rem => l.rem(r)?,
        BinOp::Eq => Value::Boolean(l == r),
        BinOp::Ne => Value::Boolean(l != r),
        BinOp::Lt => Value::Boolean(l.compare(r)? == Ordering::Less),
        BinOp::Le => Value::Boolean(l.compare(r)? != Ordering::Greater),
        BinOp::Gt => Value::Boolean(l.compare(r)? == Ordering::Greater),
        BinOp::Ge => Value::Boolean(l.compare(r)? != Ordering::Less),
        BinOp::And | BinOp::Or => unreachable!("short-circuited in eval_expr"),
    })
}

/// Convenience: parse and evaluate an expression at the context's location.
pub fn eval_str(src: &str, ctx: &mut dyn EvalContext) -> Result<Value> {
    let expr = parse_expr(src, ctx.location())?;
    eval_expr(&expr, ctx)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
