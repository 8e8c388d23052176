//! Template parser and renderer.
//!
//! Turns the lexer's token stream into a tree of [`Node`]s and renders that
//! tree against a [`Context`]. `include` tags are resolved while parsing
//! through the [`IncludeResolver`], so a [`CompiledTemplate`] already holds
//! every template it includes.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;

use liquid_report_core::error::ReportError;

use crate::binding::Binding;
use crate::context::{Context, Interrupt};
use crate::expression::{
    compare_values, Condition, ExprParser, Expression, FilteredExpression, Lexeme, Operator,
};
use crate::include::IncludeResolver;
use crate::lexer::{self, Spanned, Token};

/// One `if`/`elsif` (or `unless`) arm.
#[derive(Debug)]
pub struct Branch {
    /// The condition guarding this arm.
    pub condition: Condition,
    /// `true` for the opening arm of an `unless`.
    pub negate: bool,
    /// The nodes rendered when the arm is taken.
    pub body: Vec<Node>,
}

/// One `when` arm of a `case`.
#[derive(Debug)]
pub struct When {
    /// Values compared against the case subject.
    pub values: Vec<Expression>,
    /// The nodes rendered on a match.
    pub body: Vec<Node>,
}

/// A `for` loop.
#[derive(Debug)]
pub struct ForLoop {
    /// The loop variable name.
    pub variable: String,
    /// The collection being iterated.
    pub iterable: Expression,
    /// `limit:` attribute.
    pub limit: Option<Expression>,
    /// `offset:` attribute.
    pub offset: Option<Expression>,
    /// `reversed` attribute.
    pub reversed: bool,
    /// Rendered once per item.
    pub body: Vec<Node>,
    /// Rendered when the collection is empty.
    pub else_body: Vec<Node>,
    /// Line of the `for` tag.
    pub line: usize,
}

/// A node in the parsed template tree.
#[derive(Debug)]
pub enum Node {
    /// Literal text.
    Text(String),
    /// `{{ expression | filters }}`
    Output {
        expression: FilteredExpression,
        line: usize,
    },
    /// `{% assign name = expression %}`
    Assign {
        name: String,
        value: FilteredExpression,
        line: usize,
    },
    /// `{% capture name %}...{% endcapture %}`
    Capture { name: String, body: Vec<Node> },
    /// `{% if %}` or `{% unless %}` with optional `elsif` and `else` arms.
    If {
        branches: Vec<Branch>,
        else_body: Vec<Node>,
        line: usize,
    },
    /// `{% case %}...{% endcase %}`
    Case {
        subject: Expression,
        whens: Vec<When>,
        else_body: Vec<Node>,
        line: usize,
    },
    /// `{% for %}...{% endfor %}`
    For(Box<ForLoop>),
    /// `{% break %}`
    Break,
    /// `{% continue %}`
    Continue,
    /// `{% include Name %}`, already compiled.
    Include {
        template: Arc<CompiledTemplate>,
        with: Option<Expression>,
        params: Vec<(String, Expression)>,
        line: usize,
    },
}

/// A parsed template with all of its includes resolved.
#[derive(Debug)]
pub struct CompiledTemplate {
    name: String,
    nodes: Vec<Node>,
}

impl CompiledTemplate {
    pub(crate) fn new(name: &str, nodes: Vec<Node>) -> Self {
        Self {
            name: name.to_string(),
            nodes,
        }
    }

    /// The template name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The top-level nodes.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Names of the templates this template includes directly, in source order.
    pub fn included_templates(&self) -> Vec<&str> {
        let mut names = Vec::new();
        collect_includes(&self.nodes, &mut names);
        names
    }

    /// Renders the template against a context.
    ///
    /// # Errors
    ///
    /// Returns `TemplateExecutionError` naming the template (this one or an
    /// included one) in which evaluation failed.
    pub fn render(&self, context: &mut Context) -> Result<String, ReportError> {
        let output = render_nodes(&self.nodes, context, &self.name);
        // A stray break/continue outside any loop ends rendering early.
        context.take_interrupt();
        output
    }
}

fn collect_includes<'a>(nodes: &'a [Node], names: &mut Vec<&'a str>) {
    for node in nodes {
        match node {
            Node::Include { template, .. } => names.push(template.name()),
            Node::Capture { body, .. } => collect_includes(body, names),
            Node::If {
                branches,
                else_body,
                ..
            } => {
                for branch in branches {
                    collect_includes(&branch.body, names);
                }
                collect_includes(else_body, names);
            }
            Node::Case {
                whens, else_body, ..
            } => {
                for when in whens {
                    collect_includes(&when.body, names);
                }
                collect_includes(else_body, names);
            }
            Node::For(for_loop) => {
                collect_includes(&for_loop.body, names);
                collect_includes(&for_loop.else_body, names);
            }
            _ => {}
        }
    }
}

// ============================================================
// Parsing
// ============================================================

/// Parses template source into nodes, compiling includes via `resolver`.
///
/// # Errors
///
/// Returns `TemplateSyntaxError` for malformed templates, plus any error the
/// resolver raises for included templates.
pub(crate) fn parse(
    name: &str,
    source: &str,
    resolver: &mut IncludeResolver<'_>,
) -> Result<Vec<Node>, ReportError> {
    let tokens = lexer::tokenize(name, source)?;
    let mut parser = ParserState {
        template: name,
        tokens,
        pos: 0,
        depth: 0,
        max_depth: resolver.max_nesting(),
        resolver,
    };
    let (nodes, _) = parser.parse_nodes(&[])?;
    Ok(nodes)
}

/// The closing or intermediate tag that ended a `parse_nodes` call.
struct EndTag {
    name: String,
    markup: String,
    line: usize,
}

struct ParserState<'p, 'r> {
    template: &'p str,
    tokens: Vec<Spanned>,
    pos: usize,
    /// Block tags currently open around the parse position.
    depth: usize,
    max_depth: usize,
    resolver: &'p mut IncludeResolver<'r>,
}

impl<'p> ParserState<'p, '_> {
    fn syntax(&self, line: usize, message: impl Into<String>) -> ReportError {
        ReportError::syntax(self.template, Some(line), message)
    }

    fn markup_parser(&self, markup: &str, line: usize) -> Result<ExprParser<'p>, ReportError> {
        ExprParser::new(markup, self.template, line)
    }

    /// Parses nodes until one of `end_tags` (returned) or the end of input.
    fn parse_nodes(&mut self, end_tags: &[&str]) -> Result<(Vec<Node>, Option<EndTag>), ReportError> {
        let mut nodes = Vec::new();

        while self.pos < self.tokens.len() {
            let Spanned { token, line } = self.tokens[self.pos].clone();
            self.pos += 1;

            match token {
                Token::Text(text) => nodes.push(Node::Text(text)),
                Token::Output(markup) => {
                    if markup.is_empty() {
                        continue;
                    }
                    let mut p = self.markup_parser(&markup, line)?;
                    let expression = p.parse_filtered()?;
                    p.expect_end()?;
                    nodes.push(Node::Output { expression, line });
                }
                Token::Tag(name, markup) => {
                    if end_tags.contains(&name.as_str()) {
                        return Ok((nodes, Some(EndTag { name, markup, line })));
                    }
                    nodes.push(self.parse_tag(&name, &markup, line)?);
                }
            }
        }

        Ok((nodes, None))
    }

    fn expect_closed(&self, end: Option<EndTag>, opener: &str, line: usize) -> Result<EndTag, ReportError> {
        end.ok_or_else(|| self.syntax(line, format!("'{opener}' tag was never closed")))
    }

    fn parse_tag(&mut self, name: &str, markup: &str, line: usize) -> Result<Node, ReportError> {
        match name {
            "assign" => self.parse_assign(markup, line),
            "capture" | "if" | "unless" | "case" | "for" => self.parse_block(name, markup, line),
            "break" | "continue" => {
                if !markup.is_empty() {
                    return Err(self.syntax(line, format!("'{name}' takes no arguments")));
                }
                Ok(if name == "break" {
                    Node::Break
                } else {
                    Node::Continue
                })
            }
            "include" => self.parse_include(markup, line),
            "elsif" | "else" | "when" => {
                Err(self.syntax(line, format!("Unexpected '{name}' outside of a block")))
            }
            _ if name.starts_with("end") => Err(self.syntax(line, format!("Unexpected '{name}'"))),
            _ => Err(self.syntax(line, format!("Unknown tag: '{name}'"))),
        }
    }

    fn parse_block(&mut self, name: &str, markup: &str, line: usize) -> Result<Node, ReportError> {
        if self.depth >= self.max_depth {
            return Err(self.syntax(
                line,
                format!("'{name}' nested more than {} blocks deep", self.max_depth),
            ));
        }
        self.depth += 1;
        let node = match name {
            "capture" => self.parse_capture(markup, line),
            "if" => self.parse_if(markup, line, false),
            "unless" => self.parse_if(markup, line, true),
            "case" => self.parse_case(markup, line),
            _ => self.parse_for(markup, line),
        };
        self.depth -= 1;
        node
    }

    fn parse_assign(&self, markup: &str, line: usize) -> Result<Node, ReportError> {
        let mut p = self.markup_parser(markup, line)?;
        let name = p.expect_ident("a variable name after 'assign'")?;
        p.expect(&Lexeme::Assign)?;
        let value = p.parse_filtered()?;
        p.expect_end()?;
        Ok(Node::Assign { name, value, line })
    }

    fn parse_capture(&mut self, markup: &str, line: usize) -> Result<Node, ReportError> {
        let name = {
            let mut p = self.markup_parser(markup, line)?;
            let name = match p.advance() {
                Some(Lexeme::Ident(name) | Lexeme::Str(name)) => name,
                _ => return Err(p.error("'capture' requires a variable name")),
            };
            p.expect_end()?;
            name
        };
        let (body, end) = self.parse_nodes(&["endcapture"])?;
        self.expect_closed(end, "capture", line)?;
        Ok(Node::Capture { name, body })
    }

    fn parse_condition(&self, markup: &str, line: usize) -> Result<Condition, ReportError> {
        let mut p = self.markup_parser(markup, line)?;
        let condition = p.parse_condition()?;
        p.expect_end()?;
        Ok(condition)
    }

    fn parse_if(&mut self, markup: &str, line: usize, negate: bool) -> Result<Node, ReportError> {
        let (opener, closer) = if negate {
            ("unless", "endunless")
        } else {
            ("if", "endif")
        };
        let mut branches = Vec::new();
        let mut condition = self.parse_condition(markup, line)?;

        loop {
            let (body, end) = self.parse_nodes(&["elsif", "else", closer])?;
            let end = self.expect_closed(end, opener, line)?;
            let negate_first = negate && branches.is_empty();
            branches.push(Branch {
                condition,
                negate: negate_first,
                body,
            });

            match end.name.as_str() {
                "elsif" => condition = self.parse_condition(&end.markup, end.line)?,
                "else" => {
                    let (else_body, end) = self.parse_nodes(&[closer])?;
                    self.expect_closed(end, opener, line)?;
                    return Ok(Node::If {
                        branches,
                        else_body,
                        line,
                    });
                }
                _ => {
                    return Ok(Node::If {
                        branches,
                        else_body: Vec::new(),
                        line,
                    })
                }
            }
        }
    }

    fn parse_case(&mut self, markup: &str, line: usize) -> Result<Node, ReportError> {
        let subject = {
            let mut p = self.markup_parser(markup, line)?;
            let subject = p.parse_expression()?;
            p.expect_end()?;
            subject
        };

        // Anything between `case` and the first `when` is discarded.
        let (_, mut end) = self.parse_nodes(&["when", "else", "endcase"])?;
        let mut whens = Vec::new();
        let mut else_body = Vec::new();

        loop {
            let tag = self.expect_closed(end, "case", line)?;
            match tag.name.as_str() {
                "when" => {
                    let values = self.parse_when_values(&tag.markup, tag.line)?;
                    let (body, next) = self.parse_nodes(&["when", "else", "endcase"])?;
                    whens.push(When { values, body });
                    end = next;
                }
                "else" => {
                    let (body, next) = self.parse_nodes(&["endcase"])?;
                    else_body = body;
                    end = next;
                }
                _ => break,
            }
        }

        Ok(Node::Case {
            subject,
            whens,
            else_body,
            line,
        })
    }

    fn parse_when_values(&self, markup: &str, line: usize) -> Result<Vec<Expression>, ReportError> {
        let mut p = self.markup_parser(markup, line)?;
        let mut values = vec![p.parse_expression()?];
        while p.eat(&Lexeme::Comma) || p.eat_keyword("or") {
            values.push(p.parse_expression()?);
        }
        p.expect_end()?;
        Ok(values)
    }

    fn parse_for(&mut self, markup: &str, line: usize) -> Result<Node, ReportError> {
        let mut p = self.markup_parser(markup, line)?;
        let variable = p.expect_ident("a loop variable after 'for'")?;
        if !p.eat_keyword("in") {
            return Err(p.error("Expected 'in' after the loop variable"));
        }
        let iterable = p.parse_expression()?;

        let (mut limit, mut offset, mut reversed) = (None, None, false);
        while !p.is_at_end() {
            p.eat(&Lexeme::Comma);
            let attribute = p.expect_ident("'limit', 'offset' or 'reversed'")?;
            match attribute.as_str() {
                "reversed" => reversed = true,
                "limit" => {
                    p.expect(&Lexeme::Colon)?;
                    limit = Some(p.parse_expression()?);
                }
                "offset" => {
                    p.expect(&Lexeme::Colon)?;
                    offset = Some(p.parse_expression()?);
                }
                other => return Err(p.error(format!("Unknown 'for' attribute '{other}'"))),
            }
        }

        let (body, end) = self.parse_nodes(&["else", "endfor"])?;
        let end = self.expect_closed(end, "for", line)?;
        let else_body = if end.name == "else" {
            let (else_body, end) = self.parse_nodes(&["endfor"])?;
            self.expect_closed(end, "for", line)?;
            else_body
        } else {
            Vec::new()
        };

        Ok(Node::For(Box::new(ForLoop {
            variable,
            iterable,
            limit,
            offset,
            reversed,
            body,
            else_body,
            line,
        })))
    }

    fn parse_include(&mut self, markup: &str, line: usize) -> Result<Node, ReportError> {
        let (name, rest) = split_include_name(markup)
            .ok_or_else(|| self.syntax(line, "'include' requires a template name"))?;

        let (with, params) = {
            let mut p = self.markup_parser(rest, line)?;
            let with = if p.eat_keyword("with") {
                Some(p.parse_expression()?)
            } else {
                None
            };
            let mut params = Vec::new();
            while !p.is_at_end() {
                p.eat(&Lexeme::Comma);
                let key = p.expect_ident("a parameter name")?;
                p.expect(&Lexeme::Colon)?;
                params.push((key, p.parse_expression()?));
            }
            (with, params)
        };

        let template = self.resolver.compile(&name)?;
        Ok(Node::Include {
            template,
            with,
            params,
            line,
        })
    }
}

/// Splits `include` markup into the template name and the remaining markup.
/// The name is either quoted or runs up to the first space or comma.
fn split_include_name(markup: &str) -> Option<(String, &str)> {
    let markup = markup.trim_start();
    match markup.chars().next()? {
        quote @ ('\'' | '"') => {
            let close = markup[1..].find(quote)? + 1;
            let name = &markup[1..close];
            (!name.is_empty()).then(|| (name.to_string(), &markup[close + 1..]))
        }
        _ => {
            let end = markup
                .find(|c: char| c.is_whitespace() || c == ',')
                .unwrap_or(markup.len());
            Some((markup[..end].to_string(), &markup[end..]))
        }
    }
}

// ============================================================
// Rendering
// ============================================================

fn execution_error(template: &str, line: usize, err: impl Display) -> ReportError {
    ReportError::execution(template, format!("line {line}: {err}"))
}

/// Renders a node tree to a string.
///
/// Stops early when a `break` or `continue` is pending so the enclosing loop
/// can handle it.
///
/// # Errors
///
/// Returns `TemplateExecutionError` if any node fails to render.
pub fn render_nodes(nodes: &[Node], context: &mut Context, template: &str) -> Result<String, ReportError> {
    let mut output = String::new();

    for node in nodes {
        if context.has_interrupt() {
            break;
        }
        output.push_str(&render_node(node, context, template)?);
    }

    Ok(output)
}

/// Renders a single node to a string.
fn render_node(node: &Node, context: &mut Context, template: &str) -> Result<String, ReportError> {
    match node {
        Node::Text(text) => Ok(text.clone()),
        Node::Output { expression, line } => {
            let value = expression
                .evaluate(context)
                .map_err(|e| execution_error(template, *line, e))?;
            Ok(value.to_output())
        }
        Node::Assign { name, value, line } => {
            let value = value
                .evaluate(context)
                .map_err(|e| execution_error(template, *line, e))?;
            context.set_global(name.clone(), value);
            Ok(String::new())
        }
        Node::Capture { name, body } => {
            let captured = render_nodes(body, context, template)?;
            context.set_global(name.clone(), Binding::String(captured));
            Ok(String::new())
        }
        Node::If {
            branches,
            else_body,
            line,
        } => {
            for branch in branches {
                let holds = branch
                    .condition
                    .evaluate(context)
                    .map_err(|e| execution_error(template, *line, e))?;
                if holds != branch.negate {
                    return render_nodes(&branch.body, context, template);
                }
            }
            render_nodes(else_body, context, template)
        }
        Node::Case {
            subject,
            whens,
            else_body,
            line,
        } => {
            let value = subject
                .evaluate(context)
                .map_err(|e| execution_error(template, *line, e))?;
            let mut output = String::new();
            let mut matched = false;
            // Every matching `when` renders; `else` only if none did.
            for when in whens {
                for candidate in &when.values {
                    let candidate = candidate
                        .evaluate(context)
                        .map_err(|e| execution_error(template, *line, e))?;
                    if compare_values(&value, Operator::Eq, &candidate) {
                        matched = true;
                        output.push_str(&render_nodes(&when.body, context, template)?);
                        break;
                    }
                }
            }
            if !matched {
                output = render_nodes(else_body, context, template)?;
            }
            Ok(output)
        }
        Node::For(for_loop) => render_for(for_loop, context, template),
        Node::Break => {
            context.set_interrupt(Interrupt::Break);
            Ok(String::new())
        }
        Node::Continue => {
            context.set_interrupt(Interrupt::Continue);
            Ok(String::new())
        }
        Node::Include {
            template: included,
            with,
            params,
            line,
        } => {
            let with_value = with
                .as_ref()
                .map(|e| e.evaluate(context))
                .transpose()
                .map_err(|e| execution_error(template, *line, e))?;
            let mut locals = Vec::with_capacity(params.len());
            for (key, expr) in params {
                let value = expr
                    .evaluate(context)
                    .map_err(|e| execution_error(template, *line, e))?;
                locals.push((key.clone(), value));
            }

            context.push();
            if let Some(value) = with_value {
                context.set_local(included.name(), value);
            }
            for (key, value) in locals {
                context.set_local(key, value);
            }
            let result = render_nodes(&included.nodes, context, included.name());
            context.pop();
            result
        }
    }
}

fn render_for(for_loop: &ForLoop, context: &mut Context, template: &str) -> Result<String, ReportError> {
    let line = for_loop.line;
    let iterable = for_loop
        .iterable
        .evaluate(context)
        .map_err(|e| execution_error(template, line, e))?;

    let mut items: Vec<Binding> = match iterable {
        Binding::Array(items) => items,
        // Objects iterate as [key, value] pairs in key order.
        Binding::Object(map) => map
            .into_iter()
            .map(|(k, v)| Binding::Array(vec![Binding::String(k), v]))
            .collect(),
        Binding::Nil => Vec::new(),
        Binding::String(s) if s.is_empty() => Vec::new(),
        other => vec![other],
    };

    if let Some(offset) = loop_bound(for_loop.offset.as_ref(), "offset", context, template, line)? {
        items.drain(..offset.min(items.len()));
    }
    if let Some(limit) = loop_bound(for_loop.limit.as_ref(), "limit", context, template, line)? {
        items.truncate(limit);
    }
    if for_loop.reversed {
        items.reverse();
    }

    if items.is_empty() {
        return render_nodes(&for_loop.else_body, context, template);
    }

    let parent_loop = context.get("forloop");
    let length = items.len();
    let mut output = String::new();

    context.push();
    for (index, item) in items.into_iter().enumerate() {
        context.set_local(for_loop.variable.clone(), item);
        context.set_local("forloop", forloop_object(index, length, parent_loop.clone()));

        match render_nodes(&for_loop.body, context, template) {
            Ok(rendered) => output.push_str(&rendered),
            Err(e) => {
                context.pop();
                return Err(e);
            }
        }

        if context.take_interrupt() == Some(Interrupt::Break) {
            break;
        }
    }
    context.pop();

    Ok(output)
}

fn loop_bound(
    expr: Option<&Expression>,
    attribute: &str,
    context: &Context,
    template: &str,
    line: usize,
) -> Result<Option<usize>, ReportError> {
    let Some(expr) = expr else {
        return Ok(None);
    };
    let value = expr
        .evaluate(context)
        .map_err(|e| execution_error(template, line, e))?;
    if value.is_nil() {
        return Ok(None);
    }
    let n = value.as_integer().ok_or_else(|| {
        execution_error(
            template,
            line,
            format!("'for' {attribute} must be an integer, got '{value}'"),
        )
    })?;
    Ok(Some(usize::try_from(n).unwrap_or(0)))
}

fn forloop_object(index: usize, length: usize, parent: Option<Binding>) -> Binding {
    let mut forloop = BTreeMap::new();
    forloop.insert("index".to_string(), Binding::from(index + 1));
    forloop.insert("index0".to_string(), Binding::from(index));
    forloop.insert("rindex".to_string(), Binding::from(length - index));
    forloop.insert("rindex0".to_string(), Binding::from(length - index - 1));
    forloop.insert("first".to_string(), Binding::Bool(index == 0));
    forloop.insert("last".to_string(), Binding::Bool(index + 1 == length));
    forloop.insert("length".to_string(), Binding::from(length));
    if let Some(parent) = parent {
        forloop.insert("parentloop".to_string(), parent);
    }
    Binding::Object(forloop)
}
