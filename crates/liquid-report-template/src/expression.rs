//! Expression parsing and evaluation.
//!
//! Tag markup and output contents are scanned into [`Lexeme`]s and parsed by
//! an [`ExprParser`] into [`Expression`]s (literals, variable paths, ranges),
//! [`FilterCall`] chains, and [`Condition`]s. Evaluation happens against a
//! [`Context`] at render time.

use std::borrow::Cow;
use std::fmt;

use liquid_report_core::error::ReportError;
use thiserror::Error;

use crate::binding::Binding;
use crate::context::Context;
use crate::filters::{self, FilterError};

/// Upper bound on the number of elements a `(a..b)` range may produce.
const MAX_RANGE_LEN: i64 = 100_000;

/// An error raised while evaluating an expression at render time.
#[derive(Debug, Error)]
pub enum EvalError {
    /// A variable or member was not bound and strict variables are enabled.
    #[error("Undefined variable '{0}'")]
    UndefinedVariable(String),

    /// A range's bounds were not integers or spanned too many elements.
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// A filter rejected its input or arguments.
    #[error(transparent)]
    Filter(#[from] FilterError),
}

// ============================================================
// Lexemes
// ============================================================

/// A lexical unit of tag markup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lexeme {
    /// An identifier or keyword (`user`, `first-name`, `empty?`, `and`).
    Ident(String),
    /// A quoted string literal, without its quotes.
    Str(String),
    /// An integer literal.
    Int(i64),
    /// A float literal.
    Float(f64),
    /// `.`
    Dot,
    /// `..`
    DotDot,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `|`
    Pipe,
    /// `:`
    Colon,
    /// `,`
    Comma,
    /// `=`
    Assign,
    /// A comparison operator.
    Op(Operator),
}

/// A comparison operator usable in conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `==`
    Eq,
    /// `!=` or `<>`
    Ne,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    Le,
    /// `>=`
    Ge,
    /// `contains`
    Contains,
}

/// Scans markup into lexemes.
///
/// # Errors
///
/// Returns an error message for unterminated strings and unexpected characters.
pub fn scan(markup: &str) -> Result<Vec<Lexeme>, String> {
    let chars: Vec<char> = markup.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => i += 1,
            '\'' | '"' => {
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|&ch| ch == c)
                    .map(|p| start + p)
                    .ok_or_else(|| format!("Unterminated string literal in '{markup}'"))?;
                out.push(Lexeme::Str(chars[start..end].iter().collect()));
                i = end + 1;
            }
            '.' if next == Some('.') => {
                out.push(Lexeme::DotDot);
                i += 2;
            }
            '.' => {
                out.push(Lexeme::Dot);
                i += 1;
            }
            '[' => {
                out.push(Lexeme::LBracket);
                i += 1;
            }
            ']' => {
                out.push(Lexeme::RBracket);
                i += 1;
            }
            '(' => {
                out.push(Lexeme::LParen);
                i += 1;
            }
            ')' => {
                out.push(Lexeme::RParen);
                i += 1;
            }
            '|' => {
                out.push(Lexeme::Pipe);
                i += 1;
            }
            ':' => {
                out.push(Lexeme::Colon);
                i += 1;
            }
            ',' => {
                out.push(Lexeme::Comma);
                i += 1;
            }
            '=' if next == Some('=') => {
                out.push(Lexeme::Op(Operator::Eq));
                i += 2;
            }
            '=' => {
                out.push(Lexeme::Assign);
                i += 1;
            }
            '!' if next == Some('=') => {
                out.push(Lexeme::Op(Operator::Ne));
                i += 2;
            }
            '<' if next == Some('>') => {
                out.push(Lexeme::Op(Operator::Ne));
                i += 2;
            }
            '<' | '>' => {
                let op = match (c, next == Some('=')) {
                    ('<', true) => Operator::Le,
                    ('<', false) => Operator::Lt,
                    (_, true) => Operator::Ge,
                    (_, false) => Operator::Gt,
                };
                out.push(Lexeme::Op(op));
                i += if next == Some('=') { 2 } else { 1 };
            }
            c if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let is_float = chars.get(i) == Some(&'.')
                    && chars.get(i + 1).is_some_and(char::is_ascii_digit);
                if is_float {
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                if is_float {
                    let f = text
                        .parse::<f64>()
                        .map_err(|e| format!("Invalid number '{text}': {e}"))?;
                    out.push(Lexeme::Float(f));
                } else {
                    let n = text
                        .parse::<i64>()
                        .map_err(|e| format!("Invalid number '{text}': {e}"))?;
                    out.push(Lexeme::Int(n));
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | '-' | '?'))
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                if word == "contains" {
                    out.push(Lexeme::Op(Operator::Contains));
                } else {
                    out.push(Lexeme::Ident(word));
                }
            }
            other => return Err(format!("Unexpected character '{other}' in '{markup}'")),
        }
    }

    Ok(out)
}

// ============================================================
// Expressions
// ============================================================

/// One step of a variable path after its root name.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// `.name`
    Member(String),
    /// `[expression]`
    Index(Expression),
}

/// A variable reference such as `User.FirstName` or `items[0].title`.
#[derive(Debug, Clone, PartialEq)]
pub struct VariablePath {
    /// The top-level variable name.
    pub root: String,
    /// Member and index lookups applied in order.
    pub lookups: Vec<Lookup>,
}

impl fmt::Display for VariablePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.root)?;
        for lookup in &self.lookups {
            match lookup {
                Lookup::Member(name) => write!(f, ".{name}")?,
                Lookup::Index(Expression::Literal(Binding::String(s))) => write!(f, "[\"{s}\"]")?,
                Lookup::Index(Expression::Literal(b)) => write!(f, "[{b}]")?,
                Lookup::Index(_) => f.write_str("[...]")?,
            }
        }
        Ok(())
    }
}

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A literal value (string, number, boolean, `nil`).
    Literal(Binding),
    /// A variable path.
    Variable(VariablePath),
    /// An inclusive integer range: `(1..5)`.
    Range(Box<Expression>, Box<Expression>),
    /// The `empty` keyword, only meaningful in comparisons.
    Empty,
    /// The `blank` keyword, only meaningful in comparisons.
    Blank,
}

impl Expression {
    /// Evaluates this expression against a context.
    ///
    /// # Errors
    ///
    /// Returns `UndefinedVariable` for unbound variables when strict variables
    /// are enabled, and `InvalidRange` for ranges with non-integer bounds.
    pub fn evaluate(&self, context: &Context) -> Result<Binding, EvalError> {
        match self {
            Self::Literal(b) => Ok(b.clone()),
            Self::Variable(path) => evaluate_path(path, context),
            Self::Range(start, end) => {
                let start_value = start.evaluate(context)?;
                let end_value = end.evaluate(context)?;
                let (Some(s), Some(e)) = (start_value.as_integer(), end_value.as_integer()) else {
                    return Err(EvalError::InvalidRange(format!(
                        "bounds must be integers, got '{start_value}' and '{end_value}'"
                    )));
                };
                if e.saturating_sub(s) >= MAX_RANGE_LEN {
                    return Err(EvalError::InvalidRange(format!(
                        "({s}..{e}) exceeds {MAX_RANGE_LEN} elements"
                    )));
                }
                Ok(Binding::Array((s..=e).map(Binding::Integer).collect()))
            }
            Self::Empty | Self::Blank => Ok(Binding::String(String::new())),
        }
    }
}

/// Walks a variable path by reference and clones only the value it ends on.
fn evaluate_path(path: &VariablePath, context: &Context) -> Result<Binding, EvalError> {
    let mut value = context.lookup(&path.root);

    for lookup in &path.lookups {
        let Some(current) = value.take() else {
            break;
        };
        value = match lookup {
            Lookup::Member(name) => match current {
                Cow::Borrowed(b) => b.member(name),
                Cow::Owned(b) => b.member(name).map(|v| Cow::Owned(v.into_owned())),
            },
            Lookup::Index(expr) => {
                let key = expr.evaluate(context)?;
                match current {
                    Cow::Borrowed(b) => b.lookup_by(&key),
                    Cow::Owned(b) => b.lookup_by(&key).map(|v| Cow::Owned(v.into_owned())),
                }
            }
        };
    }

    match value {
        Some(value) => Ok(value.into_owned()),
        None if context.strict_variables() => Err(EvalError::UndefinedVariable(path.to_string())),
        None => Ok(Binding::Nil),
    }
}

/// A filter invocation: `name: arg1, arg2`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCall {
    /// The filter name (e.g. `append`, `slice`).
    pub name: String,
    /// Positional arguments.
    pub args: Vec<Expression>,
}

/// An expression followed by a filter chain, as found in `{{ }}` and `assign`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredExpression {
    /// The base expression.
    pub expression: Expression,
    /// Filters to apply in order.
    pub filters: Vec<FilterCall>,
}

impl FilteredExpression {
    /// Evaluates the base expression and runs it through the filter chain.
    ///
    /// # Errors
    ///
    /// Propagates evaluation errors and filter failures.
    pub fn evaluate(&self, context: &Context) -> Result<Binding, EvalError> {
        let registry = filters::default_registry();
        let mut value = self.expression.evaluate(context)?;
        for filter in &self.filters {
            let args = filter
                .args
                .iter()
                .map(|a| a.evaluate(context))
                .collect::<Result<Vec<_>, _>>()?;
            value = registry.apply(&filter.name, &value, &args)?;
        }
        Ok(value)
    }
}

// ============================================================
// Conditions
// ============================================================

/// A condition in an `if`, `unless`, or `elsif` tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// A truthiness test.
    Test(Expression),
    /// A comparison.
    Compare(Expression, Operator, Expression),
    /// Logical AND; binds to everything on its right.
    And(Box<Condition>, Box<Condition>),
    /// Logical OR; binds to everything on its right.
    Or(Box<Condition>, Box<Condition>),
}

impl Condition {
    /// Evaluates this condition against a context.
    ///
    /// # Errors
    ///
    /// Propagates expression evaluation errors.
    pub fn evaluate(&self, context: &Context) -> Result<bool, EvalError> {
        match self {
            Self::Test(expr) => Ok(expr.evaluate(context)?.is_truthy()),
            Self::Compare(left, op, right) => compare(left, *op, right, context),
            Self::And(left, right) => Ok(left.evaluate(context)? && right.evaluate(context)?),
            Self::Or(left, right) => Ok(left.evaluate(context)? || right.evaluate(context)?),
        }
    }
}

fn compare(
    left: &Expression,
    op: Operator,
    right: &Expression,
    context: &Context,
) -> Result<bool, EvalError> {
    // `x == empty` and `x == blank` test the other side rather than compare values
    let keyword_test = match (left, right) {
        (Expression::Empty, other) | (other, Expression::Empty) => {
            Some(other.evaluate(context)?.is_empty_value())
        }
        (Expression::Blank, other) | (other, Expression::Blank) => {
            Some(other.evaluate(context)?.is_blank())
        }
        _ => None,
    };
    if let Some(result) = keyword_test {
        return Ok(match op {
            Operator::Eq => result,
            Operator::Ne => !result,
            _ => false,
        });
    }

    let l = left.evaluate(context)?;
    let r = right.evaluate(context)?;
    Ok(compare_values(&l, op, &r))
}

/// Compares two bindings with the given operator.
pub fn compare_values(left: &Binding, op: Operator, right: &Binding) -> bool {
    match op {
        Operator::Eq => left == right,
        Operator::Ne => left != right,
        Operator::Contains => match (left, right) {
            (Binding::String(haystack), needle) => haystack.contains(&needle.to_output()),
            (Binding::Array(items), needle) => items.iter().any(|item| item == needle),
            (Binding::Object(map), Binding::String(key)) => map.contains_key(key),
            _ => false,
        },
        Operator::Lt | Operator::Gt | Operator::Le | Operator::Ge => {
            let ordering = match (left, right) {
                (l, r) if l.is_number() && r.is_number() => {
                    l.as_float().zip(r.as_float()).and_then(|(a, b)| a.partial_cmp(&b))
                }
                (Binding::String(a), Binding::String(b)) => Some(a.cmp(b)),
                _ => None,
            };
            ordering.is_some_and(|o| match op {
                Operator::Lt => o.is_lt(),
                Operator::Gt => o.is_gt(),
                Operator::Le => o.is_le(),
                _ => o.is_ge(),
            })
        }
    }
}

// ============================================================
// Parser
// ============================================================

/// A cursor over scanned markup that reports errors against a template and line.
pub struct ExprParser<'a> {
    lexemes: Vec<Lexeme>,
    pos: usize,
    template: &'a str,
    line: usize,
}

impl<'a> ExprParser<'a> {
    /// Scans `markup` and creates a parser over it.
    ///
    /// # Errors
    ///
    /// Returns a `TemplateSyntaxError` if the markup cannot be scanned.
    pub fn new(markup: &str, template: &'a str, line: usize) -> Result<Self, ReportError> {
        let lexemes = scan(markup).map_err(|m| ReportError::syntax(template, Some(line), m))?;
        Ok(Self {
            lexemes,
            pos: 0,
            template,
            line,
        })
    }

    /// Builds a syntax error at this parser's template and line.
    pub fn error(&self, message: impl Into<String>) -> ReportError {
        ReportError::syntax(self.template, Some(self.line), message)
    }

    /// Returns the next lexeme without consuming it.
    pub fn peek(&self) -> Option<&Lexeme> {
        self.lexemes.get(self.pos)
    }

    /// Returns `true` once every lexeme has been consumed.
    pub fn is_at_end(&self) -> bool {
        self.pos >= self.lexemes.len()
    }

    /// Consumes the next lexeme.
    pub fn advance(&mut self) -> Option<Lexeme> {
        let lexeme = self.lexemes.get(self.pos).cloned();
        if lexeme.is_some() {
            self.pos += 1;
        }
        lexeme
    }

    /// Consumes the next lexeme if it equals `expected`.
    pub fn eat(&mut self, expected: &Lexeme) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consumes the next lexeme if it is the identifier `word`.
    pub fn eat_keyword(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Some(Lexeme::Ident(w)) if w == word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consumes an identifier and returns it.
    ///
    /// # Errors
    ///
    /// Returns a syntax error naming `what` if the next lexeme is not an identifier.
    pub fn expect_ident(&mut self, what: &str) -> Result<String, ReportError> {
        match self.advance() {
            Some(Lexeme::Ident(name)) => Ok(name),
            other => Err(self.error(format!("Expected {what}, found {}", describe(other.as_ref())))),
        }
    }

    /// Consumes `expected` or fails.
    ///
    /// # Errors
    ///
    /// Returns a syntax error if the next lexeme differs.
    pub fn expect(&mut self, expected: &Lexeme) -> Result<(), ReportError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(format!(
                "Expected {}, found {}",
                describe(Some(expected)),
                describe(self.peek())
            )))
        }
    }

    /// Fails if any lexemes remain.
    ///
    /// # Errors
    ///
    /// Returns a syntax error describing the first unexpected lexeme.
    pub fn expect_end(&self) -> Result<(), ReportError> {
        if self.is_at_end() {
            Ok(())
        } else {
            Err(self.error(format!("Unexpected {}", describe(self.peek()))))
        }
    }

    /// Parses a single expression (literal, variable path, or range).
    ///
    /// # Errors
    ///
    /// Returns a syntax error for malformed expressions.
    pub fn parse_expression(&mut self) -> Result<Expression, ReportError> {
        match self.advance() {
            Some(Lexeme::Str(s)) => Ok(Expression::Literal(Binding::String(s))),
            Some(Lexeme::Int(n)) => Ok(Expression::Literal(Binding::Integer(n))),
            Some(Lexeme::Float(f)) => Ok(Expression::Literal(Binding::Float(f))),
            Some(Lexeme::LParen) => {
                let start = self.parse_expression()?;
                self.expect(&Lexeme::DotDot)?;
                let end = self.parse_expression()?;
                self.expect(&Lexeme::RParen)?;
                Ok(Expression::Range(Box::new(start), Box::new(end)))
            }
            Some(Lexeme::Ident(word)) => match word.as_str() {
                "true" => Ok(Expression::Literal(Binding::Bool(true))),
                "false" => Ok(Expression::Literal(Binding::Bool(false))),
                "nil" | "null" => Ok(Expression::Literal(Binding::Nil)),
                "empty" => Ok(Expression::Empty),
                "blank" => Ok(Expression::Blank),
                _ => self.parse_path(word).map(Expression::Variable),
            },
            other => Err(self.error(format!(
                "Expected an expression, found {}",
                describe(other.as_ref())
            ))),
        }
    }

    fn parse_path(&mut self, root: String) -> Result<VariablePath, ReportError> {
        let mut lookups = Vec::new();
        loop {
            if self.eat(&Lexeme::Dot) {
                let name = self.expect_ident("a member name after '.'")?;
                lookups.push(Lookup::Member(name));
            } else if self.eat(&Lexeme::LBracket) {
                let index = self.parse_expression()?;
                self.expect(&Lexeme::RBracket)?;
                lookups.push(Lookup::Index(index));
            } else {
                break;
            }
        }
        Ok(VariablePath { root, lookups })
    }

    /// Parses an expression followed by `| filter: args` calls.
    ///
    /// Unknown filter names are rejected here, before anything is rendered.
    ///
    /// # Errors
    ///
    /// Returns a syntax error for malformed filters or unknown filter names.
    pub fn parse_filtered(&mut self) -> Result<FilteredExpression, ReportError> {
        let expression = self.parse_expression()?;
        let mut filters = Vec::new();

        while self.eat(&Lexeme::Pipe) {
            let name = self.expect_ident("a filter name after '|'")?;
            if !filters::default_registry().contains(&name) {
                return Err(self.error(format!("Unknown filter: '{name}'")));
            }
            let mut args = Vec::new();
            if self.eat(&Lexeme::Colon) {
                args.push(self.parse_expression()?);
                while self.eat(&Lexeme::Comma) {
                    args.push(self.parse_expression()?);
                }
            }
            filters.push(FilterCall { name, args });
        }

        Ok(FilteredExpression {
            expression,
            filters,
        })
    }

    /// Parses a condition: comparisons joined by `and` / `or`.
    ///
    /// Operators bind to everything on their right, so `a and b or c`
    /// means `a and (b or c)`.
    ///
    /// # Errors
    ///
    /// Returns a syntax error for malformed conditions.
    pub fn parse_condition(&mut self) -> Result<Condition, ReportError> {
        let left = self.parse_comparison()?;
        if self.eat_keyword("and") {
            let right = self.parse_condition()?;
            Ok(Condition::And(Box::new(left), Box::new(right)))
        } else if self.eat_keyword("or") {
            let right = self.parse_condition()?;
            Ok(Condition::Or(Box::new(left), Box::new(right)))
        } else {
            Ok(left)
        }
    }

    fn parse_comparison(&mut self) -> Result<Condition, ReportError> {
        let left = self.parse_expression()?;
        if let Some(Lexeme::Op(op)) = self.peek().cloned() {
            self.pos += 1;
            let right = self.parse_expression()?;
            Ok(Condition::Compare(left, op, right))
        } else {
            Ok(Condition::Test(left))
        }
    }
}

fn describe(lexeme: Option<&Lexeme>) -> String {
    match lexeme {
        None => "end of tag".to_string(),
        Some(Lexeme::Ident(s)) => format!("'{s}'"),
        Some(Lexeme::Str(s)) => format!("string '{s}'"),
        Some(Lexeme::Int(n)) => format!("number {n}"),
        Some(Lexeme::Float(f)) => format!("number {f}"),
        Some(Lexeme::Dot) => "'.'".to_string(),
        Some(Lexeme::DotDot) => "'..'".to_string(),
        Some(Lexeme::LBracket) => "'['".to_string(),
        Some(Lexeme::RBracket) => "']'".to_string(),
        Some(Lexeme::LParen) => "'('".to_string(),
        Some(Lexeme::RParen) => "')'".to_string(),
        Some(Lexeme::Pipe) => "'|'".to_string(),
        Some(Lexeme::Colon) => "':'".to_string(),
        Some(Lexeme::Comma) => "','".to_string(),
        Some(Lexeme::Assign) => "'='".to_string(),
        Some(Lexeme::Op(op)) => format!("operator {op:?}"),
    }
}
