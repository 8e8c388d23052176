//! Template lexer (tokenizer).
//!
//! Converts raw template source text into a stream of [`Token`]s: literal
//! text, output expressions (`{{ }}`), and tags (`{% %}`). Each token records
//! the 1-based line it starts on so that syntax errors can point at it.
//!
//! Whitespace control is resolved here: a `-` just inside a delimiter
//! (`{{-`, `-}}`, `{%-`, `-%}`) strips all whitespace from the neighbouring
//! text on that side. `{% raw %}` and `{% comment %}` bodies are consumed by
//! the lexer itself, so their contents are never tokenized.

use std::sync::OnceLock;

use liquid_report_core::error::ReportError;
use regex::Regex;

/// A token produced by the template lexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A literal text segment.
    Text(String),
    /// An output expression: `{{ expression }}`.
    Output(String),
    /// A tag: `{% name markup %}`. Holds the tag name and the rest of its markup.
    Tag(String, String),
}

/// A token together with the line it starts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned {
    /// The token.
    pub token: Token,
    /// The 1-based source line.
    pub line: usize,
}

#[derive(Debug, Clone, Copy)]
enum Delimiter {
    Output, // {{
    Tag,    // {%
}

impl Delimiter {
    const fn closer(self) -> &'static str {
        match self {
            Self::Output => "}}",
            Self::Tag => "%}",
        }
    }
}

/// Tokenizes a template source string into a sequence of [`Spanned`] tokens.
///
/// `template` is the template name, used only for error reporting.
///
/// # Errors
///
/// Returns a `TemplateSyntaxError` if an output, tag, `raw` block, or
/// `comment` block is opened but never closed, or if a tag has no name.
pub fn tokenize(template: &str, source: &str) -> Result<Vec<Spanned>, ReportError> {
    let mut tokens = Vec::new();
    let mut rest = source;
    let mut line = 1;
    let mut trim_next = false;

    loop {
        let Some((pos, delimiter)) = find_next_open(rest) else {
            push_text(&mut tokens, rest, line, trim_next, false);
            break;
        };

        let mut after = &rest[pos + 2..];
        let trim_left = after.starts_with('-');
        if trim_left {
            after = &after[1..];
        }

        push_text(&mut tokens, &rest[..pos], line, trim_next, trim_left);
        line += count_lines(&rest[..pos]);
        let tag_line = line;

        let end = after.find(delimiter.closer()).ok_or_else(|| {
            let message = match delimiter {
                Delimiter::Output => "Unclosed output tag: expected '}}'",
                Delimiter::Tag => "Unclosed tag: expected '%}'",
            };
            ReportError::syntax(template, Some(tag_line), message)
        })?;

        let mut inner = &after[..end];
        let trim_right = inner.ends_with('-');
        if trim_right {
            inner = &inner[..inner.len() - 1];
        }
        line += count_lines(inner);
        let inner = inner.trim();
        rest = &after[end + 2..];
        trim_next = trim_right;

        match delimiter {
            Delimiter::Output => tokens.push(Spanned {
                token: Token::Output(inner.to_string()),
                line: tag_line,
            }),
            Delimiter::Tag => {
                let (name, markup) = split_tag(inner);
                if name.is_empty() {
                    return Err(ReportError::syntax(template, Some(tag_line), "Empty tag"));
                }
                match name {
                    // Inline comment: `{% # note %}`
                    _ if name.starts_with('#') => {}
                    "raw" | "comment" => {
                        let block = find_block_end(rest, name).ok_or_else(|| {
                            ReportError::syntax(
                                template,
                                Some(tag_line),
                                format!("Unclosed '{name}' block: expected 'end{name}'"),
                            )
                        })?;
                        if name == "raw" {
                            push_text(
                                &mut tokens,
                                &rest[..block.start],
                                line,
                                trim_next,
                                block.trim_before,
                            );
                        }
                        line += count_lines(&rest[..block.end]);
                        rest = &rest[block.end..];
                        trim_next = block.trim_after;
                    }
                    _ => tokens.push(Spanned {
                        token: Token::Tag(name.to_string(), markup.to_string()),
                        line: tag_line,
                    }),
                }
            }
        }
    }

    Ok(tokens)
}

/// Pushes a text token after applying pending whitespace trimming.
fn push_text(tokens: &mut Vec<Spanned>, text: &str, line: usize, trim_start: bool, trim_end: bool) {
    let mut text = text;
    if trim_start {
        text = text.trim_start();
    }
    if trim_end {
        text = text.trim_end();
    }
    if !text.is_empty() {
        tokens.push(Spanned {
            token: Token::Text(text.to_string()),
            line,
        });
    }
}

fn count_lines(s: &str) -> usize {
    s.bytes().filter(|&b| b == b'\n').count()
}

/// Finds the next `{{` or `{%` in the source.
fn find_next_open(s: &str) -> Option<(usize, Delimiter)> {
    let output = s.find("{{").map(|pos| (pos, Delimiter::Output));
    let tag = s.find("{%").map(|pos| (pos, Delimiter::Tag));
    match (output, tag) {
        (Some(o), Some(t)) => Some(if o.0 < t.0 { o } else { t }),
        (o, t) => o.or(t),
    }
}

/// Splits tag content into its name and the remaining markup.
fn split_tag(inner: &str) -> (&str, &str) {
    // `{% #note %}` has no space after the hash
    if let Some(comment) = inner.strip_prefix('#') {
        return ("#", comment);
    }
    match inner.find(char::is_whitespace) {
        Some(idx) => (&inner[..idx], inner[idx..].trim()),
        None => (inner, ""),
    }
}

/// The location of the closing tag of a `raw` or `comment` block.
struct BlockEnd {
    /// Byte offset where the closing tag starts.
    start: usize,
    /// Byte offset just past the closing tag.
    end: usize,
    /// The closing tag opens with `{%-`.
    trim_before: bool,
    /// The closing tag ends with `-%}`.
    trim_after: bool,
}

fn find_block_end(rest: &str, name: &str) -> Option<BlockEnd> {
    static RAW_END: OnceLock<Regex> = OnceLock::new();
    static COMMENT_END: OnceLock<Regex> = OnceLock::new();

    let re = if name == "raw" {
        RAW_END.get_or_init(|| Regex::new(r"\{%(-?)\s*endraw\s*(-?)%\}").expect("valid regex"))
    } else {
        COMMENT_END
            .get_or_init(|| Regex::new(r"\{%(-?)\s*endcomment\s*(-?)%\}").expect("valid regex"))
    };

    let caps = re.captures(rest)?;
    let whole = caps.get(0)?;
    Some(BlockEnd {
        start: whole.start(),
        end: whole.end(),
        trim_before: caps.get(1).is_some_and(|m| !m.as_str().is_empty()),
        trim_after: caps.get(2).is_some_and(|m| !m.as_str().is_empty()),
    })
}
