//! Directive AST and document-level parser.
//!
//! A document is a sequence of lines.  A line whose first non-blank character
//! is `!` is a directive; every other line is plain text that is expanded and
//! emitted.  Block directives (`!if`, `!while`, `!foreach`) nest and must be
//! closed explicitly.  Function and procedure bodies are captured verbatim
//! and parsed when first called.

use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use regex::Regex;

use super::error::{DirectiveError, Result};
use super::expr::{is_ident_char, parse_expr, Expr};
use super::function::{FunctionKind, Param, UserFunction};
use super::location::{LocatedLine, Location};

/// Test applied by `!if`, `!ifdef` and `!ifndef`.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Expr(Expr),
    Defined(String),
    NotDefined(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignScope {
    /// Current scope: the call scope inside a function, global at top level.
    Current,
    Local,
    Global,
}

/// A parsed directive.
#[derive(Debug, Clone)]
pub enum Directive {
    /// `![local|global] name = expr` or `!name ?= expr`
    Assign {
        name: String,
        scope: AssignScope,
        only_if_undefined: bool,
        value: Expr,
        location: Location,
    },
    /// `!if` / `!ifdef` / `!ifndef` … `[!elseif …] [!else] !endif`
    If {
        cond: Condition,
        then_block: Vec<Directive>,
        else_block: Vec<Directive>,
        location: Location,
    },
    /// `!while expr` … `!endwhile`
    While { cond: Expr, body: Vec<Directive>, location: Location },
    /// `!foreach name in expr` … `!endfor`
    Foreach { var: String, iterable: Expr, body: Vec<Directive>, location: Location },
    /// `!name(args)` as a statement
    Call { call: Expr, location: Location },
    /// `!function` / `!procedure` definition
    Define { function: Arc<UserFunction>, location: Location },
    /// `!return [expr]`
    Return { value: Option<Expr>, location: Location },
    /// `!break`
    Break { location: Location },
    /// `!exit`
    Exit { location: Location },
    /// `!undef name`
    Undef { name: String, location: Location },
    /// `!log text`
    Log { text: LocatedLine },
    /// `!assert expr [: message]`
    Assert { cond: Expr, source: String, message: Option<Expr>, location: Location },
    /// `!dump_memory`
    DumpMemory { location: Location },
    /// A plain text line.
    Plain(LocatedLine),
}

// ── Patterns ──────────────────────────────────────────────────────────────────

fn assign_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:(local|global)\s+)?(\$?[A-Za-z_][A-Za-z0-9_]*)\s*(\?=|=)")
            .expect("assignment pattern is valid")
    })
}

fn foreach_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\$?[A-Za-z_][A-Za-z0-9_]*)\s+in\s+").expect("foreach pattern is valid")
    })
}

fn header_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\$?[A-Za-z_][A-Za-z0-9_]*)\s*\(").expect("definition header pattern is valid")
    })
}

fn is_name(s: &str) -> bool {
    let s = s.strip_prefix('$').unwrap_or(s);
    let mut chars = s.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_') && chars.all(is_ident_char)
}

// ── Line classification ───────────────────────────────────────────────────────

/// The part of a directive line after `!`, with its byte offset in the line.
struct Head<'a> {
    line: &'a LocatedLine,
    body: &'a str,
    offset: usize,
}

impl<'a> Head<'a> {
    fn of(line: &'a LocatedLine) -> Option<Self> {
        let after = line.text.trim_start().strip_prefix('!')?;
        let body = after.trim_start();
        let offset = line.text.len() - body.len();
        Some(Head { line, body: body.trim_end(), offset })
    }

    fn location(&self) -> Location {
        let bang = self.line.text.len() - self.line.text.trim_start().len();
        self.line.location_at(bang)
    }

    fn at(&self, rel: usize) -> Location {
        self.line.location_at(self.offset + rel)
    }

    /// Leading keyword and the rest of the line, when the body starts with
    /// a bare word.
    fn keyword(&self) -> Option<(&'a str, &'a str, usize)> {
        let end = self
            .body
            .find(|c: char| !is_ident_char(c))
            .unwrap_or(self.body.len());
        let word = &self.body[..end];
        if word.is_empty() || word.starts_with(|c: char| c.is_ascii_digit()) {
            return None;
        }
        let rest = self.body[end..].trim_start();
        let rest_off = self.body.len() - rest.len();
        Some((word, rest, rest_off))
    }
}

/// Bound on nested `!if`/`!elseif`/`!while`/`!foreach` blocks.  Blocks are
/// parsed and executed recursively.
pub const MAX_BLOCK_DEPTH: usize = 128;

const TERMINATORS: &[&str] = &["elseif", "else", "endif", "endwhile", "endfor", "endfunction", "endprocedure"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Document,
    Body(FunctionKind),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Parse a whole document.
pub fn parse_document(lines: &[LocatedLine]) -> Result<Vec<Directive>> {
    DirectiveParser::new(lines, Mode::Document).parse_all()
}

/// Parse the captured body of a function or procedure.
pub fn parse_body(lines: &[LocatedLine], kind: FunctionKind) -> Result<Vec<Directive>> {
    DirectiveParser::new(lines, Mode::Body(kind)).parse_all()
}

// ── Parser ────────────────────────────────────────────────────────────────────

struct DirectiveParser<'a> {
    lines: &'a [LocatedLine],
    pos: usize,
    mode: Mode,
    loops: usize,
    blocks: usize,
}

impl<'a> DirectiveParser<'a> {
    fn new(lines: &'a [LocatedLine], mode: Mode) -> Self {
        Self { lines, pos: 0, mode, loops: 0, blocks: 0 }
    }

    fn parse_all(&mut self) -> Result<Vec<Directive>> {
        self.parse_block_until(&[])
    }

    /// Parse directives until one of the `stops` keywords (left unconsumed)
    /// or end of input.
    fn parse_block_until(&mut self, stops: &[&str]) -> Result<Vec<Directive>> {
        let mut block = Vec::new();
        while let Some(line) = self.lines.get(self.pos) {
            if let Some(head) = Head::of(line) {
                if let Some((word, _, _)) = head.keyword() {
                    if stops.contains(&word) {
                        break;
                    }
                    if TERMINATORS.contains(&word) {
                        return Err(DirectiveError::syntax(format!("unexpected !{word}"), head.location()));
                    }
                }
            }
            self.pos += 1;
            if let Some(d) = self.parse_line(line)? {
                block.push(d);
            }
        }
        Ok(block)
    }

    /// Consume the terminator that ended a block, if any.
    fn next_terminator(&mut self) -> Option<(&'a str, Head<'a>)> {
        let line = self.lines.get(self.pos)?;
        let head = Head::of(line)?;
        let (word, _, _) = head.keyword()?;
        self.pos += 1;
        Some((word, head))
    }

    fn parse_line(&mut self, line: &'a LocatedLine) -> Result<Option<Directive>> {
        let Some(head) = Head::of(line) else {
            return match self.mode {
                Mode::Body(FunctionKind::Function) if line.text.trim().is_empty() => Ok(None),
                Mode::Body(FunctionKind::Function) => Err(DirectiveError::syntax(
                    "function bodies cannot emit text; use !procedure",
                    line.location,
                )),
                _ => Ok(Some(Directive::Plain(line.clone()))),
            };
        };
        let location = head.location();

        if let Some(caps) = assign_pattern().captures(head.body) {
            let whole = caps.get(0).map_or(0, |m| m.end());
            if !head.body[whole..].starts_with('=') {
                let scope = match caps.get(1).map(|m| m.as_str()) {
                    Some("local") => AssignScope::Local,
                    Some("global") => AssignScope::Global,
                    _ => AssignScope::Current,
                };
                let name = caps.get(2).map_or("", |m| m.as_str()).to_owned();
                let only_if_undefined = caps.get(3).is_some_and(|m| m.as_str() == "?=");
                let value = self.expr(&head, whole)?;
                return Ok(Some(Directive::Assign { name, scope, only_if_undefined, value, location }));
            }
        }

        let Some((word, rest, rest_off)) = head.keyword() else {
            return self.parse_call(&head).map(Some);
        };

        let directive = match word {
            "if" => {
                let cond = Condition::Expr(self.expr(&head, rest_off)?);
                self.parse_if(cond, location)?
            }
            "ifdef" | "ifndef" => {
                if !is_name(rest) {
                    return Err(DirectiveError::syntax(format!("!{word} expects a variable name"), location));
                }
                let cond = if word == "ifdef" {
                    Condition::Defined(rest.to_owned())
                } else {
                    Condition::NotDefined(rest.to_owned())
                };
                self.parse_if(cond, location)?
            }
            "while" => {
                let cond = self.expr(&head, rest_off)?;
                let body = self.parse_loop_body("endwhile", "!while", location)?;
                Directive::While { cond, body, location }
            }
            "foreach" => {
                let Some(caps) = foreach_pattern().captures(rest) else {
                    return Err(DirectiveError::syntax("expected !foreach name in expression", location));
                };
                let var = caps.get(1).map_or("", |m| m.as_str()).to_owned();
                let expr_off = rest_off + caps.get(0).map_or(0, |m| m.end());
                let iterable = self.expr(&head, expr_off)?;
                let body = self.parse_loop_body("endfor", "!foreach", location)?;
                Directive::Foreach { var, iterable, body, location }
            }
            "break" => {
                self.no_arguments(word, rest, location)?;
                if self.loops == 0 {
                    return Err(DirectiveError::syntax("!break outside of a loop", location));
                }
                Directive::Break { location }
            }
            "exit" => {
                self.no_arguments(word, rest, location)?;
                Directive::Exit { location }
            }
            "dump_memory" => {
                self.no_arguments(word, rest, location)?;
                Directive::DumpMemory { location }
            }
            "return" => {
                let value = if rest.is_empty() { None } else { Some(self.expr(&head, rest_off)?) };
                match (self.mode, &value) {
                    (Mode::Document, _) => {
                        return Err(DirectiveError::syntax("!return outside of a function", location));
                    }
                    (Mode::Body(FunctionKind::Procedure), Some(_)) => {
                        return Err(DirectiveError::syntax("procedures cannot return a value", location));
                    }
                    _ => {}
                }
                Directive::Return { value, location }
            }
            "undef" => {
                if !is_name(rest) {
                    return Err(DirectiveError::syntax("!undef expects a variable name", location));
                }
                Directive::Undef { name: rest.to_owned(), location }
            }
            "log" => Directive::Log { text: LocatedLine::new(rest, head.at(rest_off)) },
            "assert" => self.parse_assert(&head, rest, rest_off)?,
            "function" | "procedure" => {
                let kind = if word == "function" { FunctionKind::Function } else { FunctionKind::Procedure };
                self.parse_definition(&head, kind, rest, rest_off)?
            }
            _ => self.parse_call(&head)?,
        };
        Ok(Some(directive))
    }

    fn expr(&self, head: &Head<'_>, rel: usize) -> Result<Expr> {
        let src = &head.body[rel..];
        if src.trim().is_empty() {
            return Err(DirectiveError::syntax("missing expression", head.at(rel)));
        }
        parse_expr(src, head.at(rel))
    }

    fn no_arguments(&self, word: &str, rest: &str, location: Location) -> Result<()> {
        if rest.is_empty() {
            Ok(())
        } else {
            Err(DirectiveError::syntax(format!("!{word} takes no arguments"), location))
        }
    }

    fn parse_call(&self, head: &Head<'_>) -> Result<Directive> {
        let location = head.location();
        let word = head
            .body
            .split(|c: char| c.is_whitespace() || c == '(')
            .next()
            .unwrap_or("");
        let unknown = || DirectiveError::syntax(format!("unknown directive !{word}"), location);
        if !head.body[word.len()..].trim_start().starts_with('(') {
            return Err(unknown());
        }
        match self.expr(head, 0)? {
            call @ Expr::Call { .. } => Ok(Directive::Call { call, location }),
            _ => Err(unknown()),
        }
    }

    /// Run `f` one block level deeper, failing at the opener that goes past
    /// [`MAX_BLOCK_DEPTH`].
    fn in_block<T>(&mut self, location: Location, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.blocks >= MAX_BLOCK_DEPTH {
            return Err(DirectiveError::syntax(
                format!("blocks nested deeper than {MAX_BLOCK_DEPTH} levels"),
                location,
            ));
        }
        self.blocks += 1;
        let r = f(self);
        self.blocks -= 1;
        r
    }

    fn parse_if(&mut self, cond: Condition, location: Location) -> Result<Directive> {
        self.in_block(location, |p| p.parse_if_chain(cond, location))
    }

    fn parse_if_chain(&mut self, cond: Condition, location: Location) -> Result<Directive> {
        let then_block = self.parse_block_until(&["elseif", "else", "endif"])?;
        let Some((word, head)) = self.next_terminator() else {
            return Err(DirectiveError::syntax(
                format!("missing !endif for !if opened at line {}", location.line),
                location,
            ));
        };
        let else_block = match word {
            "else" => {
                let block = self.parse_block_until(&["endif"])?;
                if self.next_terminator().is_none() {
                    return Err(DirectiveError::syntax(
                        format!("missing !endif for !if opened at line {}", location.line),
                        location,
                    ));
                }
                block
            }
            "elseif" => {
                let (_, _, rest_off) = head.keyword().unwrap_or(("", "", head.body.len()));
                let cond = Condition::Expr(self.expr(&head, rest_off)?);
                vec![self.parse_if(cond, head.location())?]
            }
            _ => Vec::new(),
        };
        Ok(Directive::If { cond, then_block, else_block, location })
    }

    fn parse_loop_body(&mut self, end: &str, opener: &str, location: Location) -> Result<Vec<Directive>> {
        self.loops += 1;
        let body = self.in_block(location, |p| p.parse_block_until(&[end]));
        self.loops -= 1;
        let body = body?;
        if self.next_terminator().is_none() {
            return Err(DirectiveError::syntax(
                format!("missing !{end} for {opener} opened at line {}", location.line),
                location,
            ));
        }
        Ok(body)
    }

    /// `!assert expr` or `!assert expr : message`.  The split point is the
    /// rightmost top-level `:` that leaves two valid expressions.
    fn parse_assert(&self, head: &Head<'_>, rest: &str, rest_off: usize) -> Result<Directive> {
        let location = head.location();
        for colon in top_level_positions(rest, ':').into_iter().rev() {
            let (left, right) = (&rest[..colon], &rest[colon + 1..]);
            if left.trim().is_empty() || right.trim().is_empty() {
                continue;
            }
            let parsed_left = parse_expr(left, head.at(rest_off));
            let parsed_right = parse_expr(right, head.at(rest_off + colon + 1));
            if let (Ok(cond), Ok(message)) = (parsed_left, parsed_right) {
                return Ok(Directive::Assert {
                    cond,
                    source: left.trim().to_owned(),
                    message: Some(message),
                    location,
                });
            }
        }
        let cond = self.expr(head, rest_off)?;
        Ok(Directive::Assert { cond, source: rest.to_owned(), message: None, location })
    }

    fn parse_definition(&mut self, head: &Head<'a>, kind: FunctionKind, rest: &'a str, rest_off: usize) -> Result<Directive> {
        let location = head.location();
        let keyword = if kind == FunctionKind::Function { "function" } else { "procedure" };
        let Some(caps) = header_pattern().captures(rest) else {
            return Err(DirectiveError::syntax(format!("expected !{keyword} name(parameters)"), location));
        };
        let name = caps.get(1).map_or("", |m| m.as_str()).to_owned();
        let open = caps.get(0).map_or(0, |m| m.end()) - 1;
        let Some(close) = matching_paren(rest, open) else {
            return Err(DirectiveError::syntax(format!("unclosed parameter list for {name}"), location));
        };
        let params = parse_params(&rest[open + 1..close], head.at(rest_off + open + 1))?;
        let trailing = rest[close + 1..].trim_start();
        let trailing_off = rest_off + (rest.len() - trailing.len());

        let body = if trailing.is_empty() {
            self.capture_body(kind, &name, location)?
        } else if kind == FunctionKind::Function && trailing.starts_with("!return") {
            vec![LocatedLine::new(trailing, head.at(trailing_off))]
        } else {
            return Err(DirectiveError::syntax(
                format!("unexpected text after !{keyword} header"),
                head.at(trailing_off),
            ));
        };

        let function = UserFunction::new(name, kind, params, body, location);
        Ok(Directive::Define { function: Arc::new(function), location })
    }

    /// Collect raw body lines up to the matching end directive.
    fn capture_body(&mut self, kind: FunctionKind, name: &str, location: Location) -> Result<Vec<LocatedLine>> {
        let end = if kind == FunctionKind::Function { "endfunction" } else { "endprocedure" };
        let mut body = Vec::new();
        while let Some(line) = self.lines.get(self.pos) {
            self.pos += 1;
            if let Some(head) = Head::of(line) {
                match head.keyword().map(|(w, _, _)| w) {
                    Some(w) if w == end => return Ok(body),
                    Some(w @ ("function" | "procedure")) => {
                        return Err(DirectiveError::syntax(
                            format!("nested !{w} inside definition of {name}"),
                            head.location(),
                        ));
                    }
                    Some(w @ ("endfunction" | "endprocedure")) => {
                        return Err(DirectiveError::syntax(format!("unexpected !{w} in {name}"), head.location()));
                    }
                    _ => {}
                }
            }
            body.push(line.clone());
        }
        Err(DirectiveError::syntax(
            format!("missing !{end} for {name} opened at line {}", location.line),
            location,
        ))
    }
}

// ── Small utilities ───────────────────────────────────────────────────────────

/// Byte positions of `target` outside quotes and brackets.
fn top_level_positions(s: &str, target: char) -> Vec<usize> {
    let mut found = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, ch) in s.char_indices() {
        if let Some(q) = quote {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                c if c == q => quote = None,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            c if c == target && depth == 0 => found.push(i),
            _ => {}
        }
    }
    found
}

/// Index of the `)` matching the `(` at `open`, skipping quoted text.
fn matching_paren(s: &str, open: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, ch) in s[open..].char_indices() {
        if let Some(q) = quote {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                c if c == q => quote = None,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse `a, $b, c = default` into parameters.
fn parse_params(src: &str, base: Location) -> Result<Vec<Param>> {
    if src.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut params: Vec<Param> = Vec::new();
    let mut seen = BTreeSet::new();
    let mut start = 0;
    let mut bounds = top_level_positions(src, ',');
    bounds.push(src.len());
    for end in bounds {
        let piece = &src[start..end];
        let piece_loc = base.shifted(src[..start].chars().count());
        let (name, default) = match piece.split_once('=') {
            Some((name, default)) => {
                let default_off = start + name.len() + 1;
                let loc = base.shifted(src[..default_off].chars().count());
                (name.trim(), Some(parse_expr(default, loc)?))
            }
            None => (piece.trim(), None),
        };
        if !is_name(name) {
            return Err(DirectiveError::syntax(format!("invalid parameter name {name:?}"), piece_loc));
        }
        if !seen.insert(name.to_owned()) {
            return Err(DirectiveError::syntax(format!("duplicate parameter {name}"), piece_loc));
        }
        if default.is_none() && params.last().is_some_and(|p| p.default.is_some()) {
            return Err(DirectiveError::syntax(
                format!("required parameter {name} follows a parameter with a default"),
                piece_loc,
            ));
        }
        params.push(Param { name: name.to_owned(), default });
        start = end + 1;
    }
    Ok(params)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::error::ErrorKind;
    use crate::script::function::Function;
    use crate::script::location::split_lines;
    use crate::script::value::Value;

    fn parse(src: &str) -> Vec<Directive> {
        parse_document(&split_lines(src)).expect("parse failed")
    }

    fn parse_err(src: &str) -> DirectiveError {
        parse_document(&split_lines(src)).expect_err("expected parse error")
    }

    #[test]
    fn plain_lines_pass_through() {
        let ds = parse("Alice -> Bob\n  note left: hi");
        assert_eq!(ds.len(), 2);
        assert!(matches!(&ds[1], Directive::Plain(l) if l.text == "  note left: hi"));
    }

    #[test]
    fn assignments() {
        let ds = parse("!$x = 1\n!local y = \"a\"\n!global z ?= [1]\n  ! w=2");
        let shapes: Vec<(String, AssignScope, bool)> = ds
            .iter()
            .map(|d| match d {
                Directive::Assign { name, scope, only_if_undefined, .. } => (name.clone(), *scope, *only_if_undefined),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(
            shapes,
            vec![
                ("$x".into(), AssignScope::Current, false),
                ("y".into(), AssignScope::Local, false),
                ("z".into(), AssignScope::Global, true),
                ("w".into(), AssignScope::Current, false),
            ]
        );
    }

    #[test]
    fn assignment_expression_location() {
        let err = parse_err("!x = 1 +");
        assert_eq!(err.kind, ErrorKind::Syntax);
        assert_eq!(err.location.line, 1);
        assert!(err.location.column > 5);
    }

    #[test]
    fn if_elseif_else() {
        let ds = parse("!if x > 0\npos\n!elseif x < 0\nneg\n!else\nzero\n!endif");
        let Directive::If { then_block, else_block, .. } = &ds[0] else { panic!("expected if") };
        assert_eq!(then_block.len(), 1);
        let Directive::If { else_block: inner_else, .. } = &else_block[0] else { panic!("expected nested if") };
        assert_eq!(inner_else.len(), 1);
    }

    #[test]
    fn ifdef() {
        let ds = parse("!ifdef $x\nyes\n!endif");
        assert!(matches!(&ds[0], Directive::If { cond: Condition::Defined(n), .. } if n == "$x"));
    }

    #[test]
    fn unterminated_blocks() {
        assert!(parse_err("!if true\nx").message.contains("missing !endif"));
        assert!(parse_err("!while true").message.contains("missing !endwhile"));
        assert!(parse_err("!foreach i in [1]\n").message.contains("missing !endfor"));
        assert!(parse_err("!function f()\n!return 1").message.contains("missing !endfunction"));
    }

    #[test]
    fn block_depth_limit() {
        let depth = 20_000;
        let src = format!("{}x\n{}", "!if true\n".repeat(depth), "!endif\n".repeat(depth));
        let err = parse_err(&src);
        assert_eq!(err.kind, ErrorKind::Syntax);
        assert_eq!(err.location, Location::new(MAX_BLOCK_DEPTH + 1, 1));
        assert!(err.message.contains("nested deeper"));

        let src = format!("{}x\n{}", "!while true\n".repeat(MAX_BLOCK_DEPTH + 1), "!endwhile\n".repeat(MAX_BLOCK_DEPTH + 1));
        assert!(parse_err(&src).message.contains("nested deeper"));

        let src = format!("{}x\n{}", "!if true\n".repeat(MAX_BLOCK_DEPTH), "!endif\n".repeat(MAX_BLOCK_DEPTH));
        assert_eq!(parse(&src).len(), 1);
    }

    #[test]
    fn stray_terminators() {
        let err = parse_err("a\n!endif");
        assert_eq!(err.message, "unexpected !endif");
        assert_eq!(err.location, Location::new(2, 1));
        assert!(parse_err("!if true\n!endwhile\n!endif").message.contains("unexpected !endwhile"));
    }

    #[test]
    fn foreach() {
        let ds = parse("!foreach $item in [1, 2]\n$item\n!endfor");
        assert!(matches!(&ds[0], Directive::Foreach { var, body, .. } if var == "$item" && body.len() == 1));
        assert!(parse_err("!foreach item [1]\n!endfor").message.contains("expected !foreach"));
    }

    #[test]
    fn break_requires_loop() {
        assert!(parse_err("!break").message.contains("outside of a loop"));
        parse("!while true\n!if true\n!break\n!endif\n!endwhile");
    }

    #[test]
    fn return_outside_function() {
        assert!(parse_err("!return 1").message.contains("outside of a function"));
    }

    #[test]
    fn function_definition() {
        let ds = parse("!function $add($a, $b = 1)\n!return $a + $b\n!endfunction");
        let Directive::Define { function, .. } = &ds[0] else { panic!("expected define") };
        assert_eq!(function.signature().name(), "$add");
        assert_eq!(function.signature().min_args(), 1);
        assert_eq!(function.params()[1].default, Some(Expr::Literal(Value::from(1))));
    }

    #[test]
    fn single_line_function() {
        let ds = parse("!function twice(n) !return n * 2\nafter");
        assert!(matches!(&ds[0], Directive::Define { .. }));
        assert!(matches!(&ds[1], Directive::Plain(_)));
    }

    #[test]
    fn definition_errors() {
        assert!(parse_err("!function f(a, a)\n!endfunction").message.contains("duplicate parameter"));
        assert!(parse_err("!function f(a = 1, b)\n!endfunction").message.contains("follows a parameter"));
        assert!(parse_err("!function f(\n!endfunction").message.contains("unclosed"));
        assert!(parse_err("!function f()\n!function g()\n!endfunction").message.contains("nested"));
        assert!(parse_err("!procedure p()\n!endfunction").message.contains("unexpected !endfunction"));
    }

    #[test]
    fn function_body_rules() {
        let body = split_lines("text");
        let err = parse_body(&body, FunctionKind::Function).unwrap_err();
        assert!(err.message.contains("cannot emit text"));
        assert!(parse_body(&body, FunctionKind::Procedure).is_ok());
        let ret = split_lines("!return 1");
        assert!(parse_body(&ret, FunctionKind::Procedure).unwrap_err().message.contains("cannot return a value"));
        assert!(parse_body(&split_lines("!return"), FunctionKind::Procedure).is_ok());
    }

    #[test]
    fn call_statement() {
        let ds = parse("!%set_variable_value(\"x\", 1)\n!draw(1, label = \"a\")");
        assert!(matches!(&ds[0], Directive::Call { .. }));
        assert!(matches!(&ds[1], Directive::Call { .. }));
        assert!(parse_err("!frobnicate now").message.contains("unknown directive !frobnicate"));
    }

    #[test]
    fn assert_with_message() {
        let ds = parse("!assert x > 0 ? true : false : \"x must be positive\"");
        let Directive::Assert { message, source, .. } = &ds[0] else { panic!("expected assert") };
        assert_eq!(message, &Some(Expr::Literal(Value::from("x must be positive"))));
        assert_eq!(source, "x > 0 ? true : false");
        let ds = parse("!assert a == 1");
        assert!(matches!(&ds[0], Directive::Assert { message: None, .. }));
    }

    #[test]
    fn keywords_need_word_boundary() {
        let ds = parse("!if_count = 3");
        assert!(matches!(&ds[0], Directive::Assign { name, .. } if name == "if_count"));
    }

    #[test]
    fn equality_is_not_assignment() {
        // `!x == 1` is neither an assignment nor a call.
        assert_eq!(parse_err("!x == 1").kind, ErrorKind::Syntax);
    }
}
