//! Built-in template filters.
//!
//! Implements the standard Liquid filter set. Each filter is a unit struct
//! implementing [`Filter`], registered by name in a [`FilterRegistry`].
//! Filter names are checked when a template is compiled, so a typo in a
//! filter name is a syntax error rather than a render-time surprise.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use thiserror::Error;

use crate::binding::Binding;

/// An error raised by a filter at render time.
#[derive(Debug, Error)]
pub enum FilterError {
    /// The filter was called with the wrong number of arguments.
    #[error("Filter '{filter}' expects {expected} argument(s), got {got}")]
    Arity {
        /// The filter name.
        filter: &'static str,
        /// A description of the accepted argument count.
        expected: String,
        /// The number of arguments supplied.
        got: usize,
    },

    /// The filter could not operate on its input or arguments.
    #[error("Filter '{filter}': {message}")]
    InvalidArgument {
        /// The filter name.
        filter: &'static str,
        /// What went wrong.
        message: String,
    },

    /// No filter is registered under this name.
    #[error("Unknown filter: '{0}'")]
    Unknown(String),
}

/// A template filter.
///
/// Takes the piped value and positional arguments, and returns a new value.
pub trait Filter: Send + Sync {
    /// Returns the filter name.
    fn name(&self) -> &'static str;

    /// Applies the filter to a value with the given arguments.
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError>;
}

/// A registry of available template filters.
pub struct FilterRegistry {
    filters: HashMap<String, Box<dyn Filter>>,
}

impl FilterRegistry {
    /// Creates a new empty filter registry.
    pub fn new() -> Self {
        Self {
            filters: HashMap::new(),
        }
    }

    /// Registers a filter.
    pub fn register(&mut self, filter: Box<dyn Filter>) {
        self.filters.insert(filter.name().to_string(), filter);
    }

    /// Returns `true` if a filter with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    /// Returns the registered filter names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.filters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Applies a named filter to a value.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::Unknown`] for unregistered names, or whatever
    /// error the filter itself raises.
    pub fn apply(&self, name: &str, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        let filter = self
            .filters
            .get(name)
            .ok_or_else(|| FilterError::Unknown(name.to_string()))?;
        filter.apply(value, args)
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the default filter registry with all built-in filters.
pub fn default_registry() -> &'static FilterRegistry {
    static REGISTRY: OnceLock<FilterRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut r = FilterRegistry::new();
        register_all(&mut r);
        r
    })
}

/// Registers all built-in filters.
fn register_all(r: &mut FilterRegistry) {
    // String filters
    r.register(Box::new(AppendFilter));
    r.register(Box::new(PrependFilter));
    r.register(Box::new(UpcaseFilter));
    r.register(Box::new(DowncaseFilter));
    r.register(Box::new(CapitalizeFilter));
    r.register(Box::new(StripFilter));
    r.register(Box::new(LstripFilter));
    r.register(Box::new(RstripFilter));
    r.register(Box::new(StripNewlinesFilter));
    r.register(Box::new(NewlineToBrFilter));
    r.register(Box::new(StripHtmlFilter));
    r.register(Box::new(EscapeFilter));
    r.register(Box::new(EscapeOnceFilter));
    r.register(Box::new(UrlEncodeFilter));
    r.register(Box::new(UrlDecodeFilter));
    r.register(Box::new(ReplaceFilter));
    r.register(Box::new(ReplaceFirstFilter));
    r.register(Box::new(RemoveFilter));
    r.register(Box::new(RemoveFirstFilter));
    r.register(Box::new(SplitFilter));
    r.register(Box::new(TruncateFilter));
    r.register(Box::new(TruncatewordsFilter));

    // Array filters
    r.register(Box::new(JoinFilter));
    r.register(Box::new(FirstFilter));
    r.register(Box::new(LastFilter));
    r.register(Box::new(SizeFilter));
    r.register(Box::new(SliceFilter));
    r.register(Box::new(ReverseFilter));
    r.register(Box::new(SortFilter));
    r.register(Box::new(SortNaturalFilter));
    r.register(Box::new(UniqFilter));
    r.register(Box::new(CompactFilter));
    r.register(Box::new(MapFilter));
    r.register(Box::new(WhereFilter));
    r.register(Box::new(ConcatFilter));

    // Math filters
    r.register(Box::new(PlusFilter));
    r.register(Box::new(MinusFilter));
    r.register(Box::new(TimesFilter));
    r.register(Box::new(DividedByFilter));
    r.register(Box::new(ModuloFilter));
    r.register(Box::new(AbsFilter));
    r.register(Box::new(CeilFilter));
    r.register(Box::new(FloorFilter));
    r.register(Box::new(RoundFilter));
    r.register(Box::new(AtLeastFilter));
    r.register(Box::new(AtMostFilter));

    // Misc
    r.register(Box::new(DefaultFilter));
    r.register(Box::new(DateFilter));
}

// ============================================================
// Helpers
// ============================================================

fn check_args(
    filter: &'static str,
    args: &[Binding],
    min: usize,
    max: usize,
) -> Result<(), FilterError> {
    if (min..=max).contains(&args.len()) {
        return Ok(());
    }
    let expected = if min == max {
        min.to_string()
    } else {
        format!("{min} to {max}")
    };
    Err(FilterError::Arity {
        filter,
        expected,
        got: args.len(),
    })
}

fn string_arg(args: &[Binding], index: usize) -> String {
    args.get(index).map(Binding::to_output).unwrap_or_default()
}

fn integer_arg(
    filter: &'static str,
    args: &[Binding],
    index: usize,
    default: i64,
) -> Result<i64, FilterError> {
    match args.get(index) {
        None => Ok(default),
        Some(arg) => arg.as_integer().ok_or_else(|| FilterError::InvalidArgument {
            filter,
            message: format!("expected an integer argument, got '{arg}'"),
        }),
    }
}

/// Treats a value as a list: arrays as themselves, `Nil` as empty, anything
/// else as a single element.
fn to_list(value: &Binding) -> Vec<Binding> {
    match value {
        Binding::Array(items) => items.clone(),
        Binding::Nil => Vec::new(),
        other => vec![other.clone()],
    }
}

fn property_of(item: &Binding, property: Option<&str>) -> Binding {
    match property {
        Some(p) => item.get_member(p).unwrap_or(Binding::Nil),
        None => item.clone(),
    }
}

/// Orders values for `sort`: numbers numerically, strings lexically, `Nil`
/// last, and mixed types by their rendered text.
fn compare_for_sort(a: &Binding, b: &Binding) -> Ordering {
    match (a, b) {
        (Binding::Nil, Binding::Nil) => Ordering::Equal,
        (Binding::Nil, _) => Ordering::Greater,
        (_, Binding::Nil) => Ordering::Less,
        (x, y) if x.is_number() && y.is_number() => {
            let (fx, fy) = (x.as_float().unwrap_or(0.0), y.as_float().unwrap_or(0.0));
            fx.partial_cmp(&fy).unwrap_or(Ordering::Equal)
        }
        (Binding::String(x), Binding::String(y)) => x.cmp(y),
        (x, y) => x.to_output().cmp(&y.to_output()),
    }
}

/// Resolves a Ruby-style `(offset, length)` window over `len` elements.
fn slice_window(len: usize, offset: i64, length: i64) -> Option<(usize, usize)> {
    let len_i = i64::try_from(len).ok()?;
    let start = if offset < 0 { len_i + offset } else { offset };
    if start < 0 || start >= len_i || length <= 0 {
        return None;
    }
    let end = start.saturating_add(length).min(len_i);
    Some((usize::try_from(start).ok()?, usize::try_from(end).ok()?))
}

fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

// ============================================================
// String filters
// ============================================================

struct AppendFilter;
impl Filter for AppendFilter {
    fn name(&self) -> &'static str {
        "append"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 1, 1)?;
        Ok(Binding::String(value.to_output() + &string_arg(args, 0)))
    }
}

struct PrependFilter;
impl Filter for PrependFilter {
    fn name(&self) -> &'static str {
        "prepend"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 1, 1)?;
        Ok(Binding::String(string_arg(args, 0) + &value.to_output()))
    }
}

struct UpcaseFilter;
impl Filter for UpcaseFilter {
    fn name(&self) -> &'static str {
        "upcase"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 0, 0)?;
        Ok(Binding::String(value.to_output().to_uppercase()))
    }
}

struct DowncaseFilter;
impl Filter for DowncaseFilter {
    fn name(&self) -> &'static str {
        "downcase"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 0, 0)?;
        Ok(Binding::String(value.to_output().to_lowercase()))
    }
}

struct CapitalizeFilter;
impl Filter for CapitalizeFilter {
    fn name(&self) -> &'static str {
        "capitalize"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 0, 0)?;
        let s = value.to_output();
        let mut chars = s.chars();
        let result = match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
            None => String::new(),
        };
        Ok(Binding::String(result))
    }
}

struct StripFilter;
impl Filter for StripFilter {
    fn name(&self) -> &'static str {
        "strip"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 0, 0)?;
        Ok(Binding::String(value.to_output().trim().to_string()))
    }
}

struct LstripFilter;
impl Filter for LstripFilter {
    fn name(&self) -> &'static str {
        "lstrip"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 0, 0)?;
        Ok(Binding::String(value.to_output().trim_start().to_string()))
    }
}

struct RstripFilter;
impl Filter for RstripFilter {
    fn name(&self) -> &'static str {
        "rstrip"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 0, 0)?;
        Ok(Binding::String(value.to_output().trim_end().to_string()))
    }
}

struct StripNewlinesFilter;
impl Filter for StripNewlinesFilter {
    fn name(&self) -> &'static str {
        "strip_newlines"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 0, 0)?;
        Ok(Binding::String(value.to_output().replace("\r\n", "").replace('\n', "")))
    }
}

struct NewlineToBrFilter;
impl Filter for NewlineToBrFilter {
    fn name(&self) -> &'static str {
        "newline_to_br"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 0, 0)?;
        let s = value.to_output().replace("\r\n", "\n");
        Ok(Binding::String(s.replace('\n', "<br />\n")))
    }
}

struct StripHtmlFilter;
impl Filter for StripHtmlFilter {
    fn name(&self) -> &'static str {
        "strip_html"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        static BLOCKS: OnceLock<Regex> = OnceLock::new();
        static TAGS: OnceLock<Regex> = OnceLock::new();
        check_args(self.name(), args, 0, 0)?;
        let blocks = BLOCKS.get_or_init(|| {
            Regex::new(r"(?is)<script.*?</script>|<!--.*?-->|<style.*?</style>").expect("valid regex")
        });
        let tags = TAGS.get_or_init(|| Regex::new(r"(?s)<.*?>").expect("valid regex"));
        let s = value.to_output();
        let without_blocks = blocks.replace_all(&s, "");
        Ok(Binding::String(tags.replace_all(&without_blocks, "").into_owned()))
    }
}

struct EscapeFilter;
impl Filter for EscapeFilter {
    fn name(&self) -> &'static str {
        "escape"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 0, 0)?;
        Ok(Binding::String(html_escape(&value.to_output())))
    }
}

struct EscapeOnceFilter;
impl Filter for EscapeOnceFilter {
    fn name(&self) -> &'static str {
        "escape_once"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        check_args(self.name(), args, 0, 0)?;
        // Existing entities match the first alternative and are kept as-is.
        let re = PATTERN.get_or_init(|| {
            Regex::new(r#"&(?:[a-zA-Z][a-zA-Z0-9]*|#[0-9]+|#[xX][0-9a-fA-F]+);|[&<>"']"#)
                .expect("valid regex")
        });
        let s = value.to_output();
        let escaped = re.replace_all(&s, |caps: &regex::Captures<'_>| {
            let m = &caps[0];
            if m.len() > 1 {
                m.to_string()
            } else {
                html_escape(m)
            }
        });
        Ok(Binding::String(escaped.into_owned()))
    }
}

/// Characters left unescaped by `url_encode`, matching form encoding.
const URL_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'*')
    .remove(b'-')
    .remove(b'.')
    .remove(b'_');

struct UrlEncodeFilter;
impl Filter for UrlEncodeFilter {
    fn name(&self) -> &'static str {
        "url_encode"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 0, 0)?;
        let s = value.to_output();
        let encoded = utf8_percent_encode(&s, URL_ENCODE_SET).to_string();
        Ok(Binding::String(encoded.replace("%20", "+")))
    }
}

struct UrlDecodeFilter;
impl Filter for UrlDecodeFilter {
    fn name(&self) -> &'static str {
        "url_decode"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 0, 0)?;
        let s = value.to_output().replace('+', " ");
        Ok(Binding::String(
            percent_decode_str(&s).decode_utf8_lossy().into_owned(),
        ))
    }
}

struct ReplaceFilter;
impl Filter for ReplaceFilter {
    fn name(&self) -> &'static str {
        "replace"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 1, 2)?;
        let s = value.to_output();
        Ok(Binding::String(
            s.replace(&string_arg(args, 0), &string_arg(args, 1)),
        ))
    }
}

struct ReplaceFirstFilter;
impl Filter for ReplaceFirstFilter {
    fn name(&self) -> &'static str {
        "replace_first"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 1, 2)?;
        let s = value.to_output();
        Ok(Binding::String(
            s.replacen(&string_arg(args, 0), &string_arg(args, 1), 1),
        ))
    }
}

struct RemoveFilter;
impl Filter for RemoveFilter {
    fn name(&self) -> &'static str {
        "remove"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 1, 1)?;
        Ok(Binding::String(value.to_output().replace(&string_arg(args, 0), "")))
    }
}

struct RemoveFirstFilter;
impl Filter for RemoveFirstFilter {
    fn name(&self) -> &'static str {
        "remove_first"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 1, 1)?;
        Ok(Binding::String(
            value.to_output().replacen(&string_arg(args, 0), "", 1),
        ))
    }
}

struct SplitFilter;
impl Filter for SplitFilter {
    fn name(&self) -> &'static str {
        "split"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 1, 1)?;
        let s = value.to_output();
        let separator = string_arg(args, 0);
        let mut parts: Vec<String> = match separator.as_str() {
            "" => s.chars().map(String::from).collect(),
            " " => s.split_whitespace().map(String::from).collect(),
            sep => s.split(sep).map(String::from).collect(),
        };
        while parts.last().is_some_and(String::is_empty) {
            parts.pop();
        }
        Ok(Binding::from(parts))
    }
}

struct TruncateFilter;
impl Filter for TruncateFilter {
    fn name(&self) -> &'static str {
        "truncate"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 0, 2)?;
        let s = value.to_output();
        let max_len = usize::try_from(integer_arg(self.name(), args, 0, 50)?).unwrap_or(0);
        let ellipsis = args.get(1).map_or_else(|| "...".to_string(), Binding::to_output);
        if s.chars().count() <= max_len {
            return Ok(Binding::String(s));
        }
        let keep = max_len.saturating_sub(ellipsis.chars().count());
        let truncated: String = s.chars().take(keep).collect();
        Ok(Binding::String(truncated + &ellipsis))
    }
}

struct TruncatewordsFilter;
impl Filter for TruncatewordsFilter {
    fn name(&self) -> &'static str {
        "truncatewords"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 0, 2)?;
        let s = value.to_output();
        let max_words = usize::try_from(integer_arg(self.name(), args, 0, 15)?)
            .unwrap_or(1)
            .max(1);
        let ellipsis = args.get(1).map_or_else(|| "...".to_string(), Binding::to_output);
        let words: Vec<&str> = s.split_whitespace().collect();
        if words.len() <= max_words {
            return Ok(Binding::String(s));
        }
        Ok(Binding::String(words[..max_words].join(" ") + &ellipsis))
    }
}

// ============================================================
// Array filters
// ============================================================

struct JoinFilter;
impl Filter for JoinFilter {
    fn name(&self) -> &'static str {
        "join"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 0, 1)?;
        let separator = args.first().map_or_else(|| " ".to_string(), Binding::to_output);
        let joined = to_list(value)
            .iter()
            .map(Binding::to_output)
            .collect::<Vec<_>>()
            .join(&separator);
        Ok(Binding::String(joined))
    }
}

struct FirstFilter;
impl Filter for FirstFilter {
    fn name(&self) -> &'static str {
        "first"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 0, 0)?;
        Ok(match value {
            Binding::Array(items) => items.first().cloned().unwrap_or(Binding::Nil),
            Binding::String(s) => s.chars().next().map_or(Binding::Nil, |c| Binding::from(c.to_string())),
            _ => Binding::Nil,
        })
    }
}

struct LastFilter;
impl Filter for LastFilter {
    fn name(&self) -> &'static str {
        "last"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 0, 0)?;
        Ok(match value {
            Binding::Array(items) => items.last().cloned().unwrap_or(Binding::Nil),
            Binding::String(s) => s.chars().last().map_or(Binding::Nil, |c| Binding::from(c.to_string())),
            _ => Binding::Nil,
        })
    }
}

struct SizeFilter;
impl Filter for SizeFilter {
    fn name(&self) -> &'static str {
        "size"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 0, 0)?;
        Ok(Binding::from(value.len().unwrap_or(0)))
    }
}

struct SliceFilter;
impl Filter for SliceFilter {
    fn name(&self) -> &'static str {
        "slice"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 1, 2)?;
        let offset = integer_arg(self.name(), args, 0, 0)?;
        let length = integer_arg(self.name(), args, 1, 1)?;
        Ok(match value {
            Binding::Array(items) => Binding::Array(
                slice_window(items.len(), offset, length)
                    .map(|(start, end)| items[start..end].to_vec())
                    .unwrap_or_default(),
            ),
            other => {
                let chars: Vec<char> = other.to_output().chars().collect();
                Binding::String(
                    slice_window(chars.len(), offset, length)
                        .map(|(start, end)| chars[start..end].iter().collect())
                        .unwrap_or_default(),
                )
            }
        })
    }
}

struct ReverseFilter;
impl Filter for ReverseFilter {
    fn name(&self) -> &'static str {
        "reverse"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 0, 0)?;
        let mut items = to_list(value);
        items.reverse();
        Ok(Binding::Array(items))
    }
}

struct SortFilter;
impl Filter for SortFilter {
    fn name(&self) -> &'static str {
        "sort"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 0, 1)?;
        let property = args.first().map(Binding::to_output);
        let mut items = to_list(value);
        items.sort_by(|a, b| {
            compare_for_sort(
                &property_of(a, property.as_deref()),
                &property_of(b, property.as_deref()),
            )
        });
        Ok(Binding::Array(items))
    }
}

struct SortNaturalFilter;
impl Filter for SortNaturalFilter {
    fn name(&self) -> &'static str {
        "sort_natural"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 0, 1)?;
        let property = args.first().map(Binding::to_output);
        let mut items = to_list(value);
        items.sort_by_cached_key(|item| {
            let key = property_of(item, property.as_deref());
            (key.is_nil(), key.to_output().to_lowercase())
        });
        Ok(Binding::Array(items))
    }
}

struct UniqFilter;
impl Filter for UniqFilter {
    fn name(&self) -> &'static str {
        "uniq"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 0, 1)?;
        let property = args.first().map(Binding::to_output);
        let mut seen: Vec<Binding> = Vec::new();
        let mut unique = Vec::new();
        for item in to_list(value) {
            let key = property_of(&item, property.as_deref());
            if !seen.contains(&key) {
                seen.push(key);
                unique.push(item);
            }
        }
        Ok(Binding::Array(unique))
    }
}

struct CompactFilter;
impl Filter for CompactFilter {
    fn name(&self) -> &'static str {
        "compact"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 0, 1)?;
        let property = args.first().map(Binding::to_output);
        let items = to_list(value)
            .into_iter()
            .filter(|item| !property_of(item, property.as_deref()).is_nil())
            .collect();
        Ok(Binding::Array(items))
    }
}

struct MapFilter;
impl Filter for MapFilter {
    fn name(&self) -> &'static str {
        "map"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 1, 1)?;
        let property = string_arg(args, 0);
        let items = to_list(value)
            .iter()
            .map(|item| property_of(item, Some(property.as_str())))
            .collect();
        Ok(Binding::Array(items))
    }
}

struct WhereFilter;
impl Filter for WhereFilter {
    fn name(&self) -> &'static str {
        "where"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 1, 2)?;
        let property = string_arg(args, 0);
        let items = to_list(value)
            .into_iter()
            .filter(|item| {
                let member = property_of(item, Some(property.as_str()));
                match args.get(1) {
                    Some(expected) => &member == expected,
                    None => member.is_truthy(),
                }
            })
            .collect();
        Ok(Binding::Array(items))
    }
}

struct ConcatFilter;
impl Filter for ConcatFilter {
    fn name(&self) -> &'static str {
        "concat"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 1, 1)?;
        let Some(extra) = args[0].as_array() else {
            return Err(FilterError::InvalidArgument {
                filter: self.name(),
                message: format!("expected an array argument, got '{}'", args[0]),
            });
        };
        let mut items = to_list(value);
        items.extend_from_slice(extra);
        Ok(Binding::Array(items))
    }
}

// ============================================================
// Math filters
// ============================================================

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    /// Coerces a binding to a number. Non-numeric values count as zero.
    fn of(value: &Binding) -> Self {
        match value {
            Binding::Integer(i) => Self::Int(*i),
            Binding::Float(f) => Self::Float(*f),
            Binding::String(s) => {
                let t = s.trim();
                t.parse::<i64>()
                    .map(Self::Int)
                    .or_else(|_| t.parse::<f64>().map(Self::Float))
                    .unwrap_or(Self::Int(0))
            }
            _ => Self::Int(0),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
        }
    }

    fn is_zero(self) -> bool {
        match self {
            Self::Int(i) => i == 0,
            Self::Float(f) => f == 0.0,
        }
    }

    fn into_binding(self) -> Binding {
        match self {
            Self::Int(i) => Binding::Integer(i),
            Self::Float(f) => Binding::Float(f),
        }
    }
}

/// Applies a binary operation, staying in integers when both operands are
/// integers and switching to floats otherwise.
fn arithmetic(
    filter: &'static str,
    value: &Binding,
    args: &[Binding],
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Binding, FilterError> {
    check_args(filter, args, 1, 1)?;
    let (left, right) = (Number::of(value), Number::of(&args[0]));
    let result = match (left, right) {
        (Number::Int(a), Number::Int(b)) => {
            Number::Int(int_op(a, b).ok_or_else(|| FilterError::InvalidArgument {
                filter,
                message: format!("integer overflow computing {a} {filter} {b}"),
            })?)
        }
        (a, b) => Number::Float(float_op(a.as_f64(), b.as_f64())),
    };
    Ok(result.into_binding())
}

fn reject_zero_divisor(filter: &'static str, args: &[Binding]) -> Result<(), FilterError> {
    if args.first().is_some_and(|a| Number::of(a).is_zero()) {
        return Err(FilterError::InvalidArgument {
            filter,
            message: "divided by 0".to_string(),
        });
    }
    Ok(())
}

/// Integer division rounding toward negative infinity.
fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

/// Remainder taking the sign of the divisor.
fn floor_mod(a: i64, b: i64) -> Option<i64> {
    let r = a.checked_rem(b)?;
    if r != 0 && ((r < 0) != (b < 0)) {
        r.checked_add(b)
    } else {
        Some(r)
    }
}

struct PlusFilter;
impl Filter for PlusFilter {
    fn name(&self) -> &'static str {
        "plus"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        arithmetic(self.name(), value, args, i64::checked_add, |a, b| a + b)
    }
}

struct MinusFilter;
impl Filter for MinusFilter {
    fn name(&self) -> &'static str {
        "minus"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        arithmetic(self.name(), value, args, i64::checked_sub, |a, b| a - b)
    }
}

struct TimesFilter;
impl Filter for TimesFilter {
    fn name(&self) -> &'static str {
        "times"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        arithmetic(self.name(), value, args, i64::checked_mul, |a, b| a * b)
    }
}

struct DividedByFilter;
impl Filter for DividedByFilter {
    fn name(&self) -> &'static str {
        "divided_by"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        reject_zero_divisor(self.name(), args)?;
        arithmetic(self.name(), value, args, floor_div, |a, b| a / b)
    }
}

struct ModuloFilter;
impl Filter for ModuloFilter {
    fn name(&self) -> &'static str {
        "modulo"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        reject_zero_divisor(self.name(), args)?;
        arithmetic(self.name(), value, args, floor_mod, |a, b| a - b * (a / b).floor())
    }
}

struct AbsFilter;
impl Filter for AbsFilter {
    fn name(&self) -> &'static str {
        "abs"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 0, 0)?;
        Ok(match Number::of(value) {
            Number::Int(i) => Binding::Integer(i.checked_abs().unwrap_or(i64::MAX)),
            Number::Float(f) => Binding::Float(f.abs()),
        })
    }
}

#[allow(clippy::cast_possible_truncation)]
fn float_to_integer(f: f64) -> Binding {
    Binding::Integer(f as i64)
}

struct CeilFilter;
impl Filter for CeilFilter {
    fn name(&self) -> &'static str {
        "ceil"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 0, 0)?;
        Ok(match Number::of(value) {
            Number::Int(i) => Binding::Integer(i),
            Number::Float(f) => float_to_integer(f.ceil()),
        })
    }
}

struct FloorFilter;
impl Filter for FloorFilter {
    fn name(&self) -> &'static str {
        "floor"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 0, 0)?;
        Ok(match Number::of(value) {
            Number::Int(i) => Binding::Integer(i),
            Number::Float(f) => float_to_integer(f.floor()),
        })
    }
}

struct RoundFilter;
impl Filter for RoundFilter {
    fn name(&self) -> &'static str {
        "round"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 0, 1)?;
        let digits = integer_arg(self.name(), args, 0, 0)?;
        Ok(match Number::of(value) {
            Number::Int(i) => Binding::Integer(i),
            Number::Float(f) if digits <= 0 => float_to_integer(f.round()),
            Number::Float(f) => {
                let factor = 10f64.powi(i32::try_from(digits.min(15)).unwrap_or(15));
                Binding::Float((f * factor).round() / factor)
            }
        })
    }
}

struct AtLeastFilter;
impl Filter for AtLeastFilter {
    fn name(&self) -> &'static str {
        "at_least"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 1, 1)?;
        let (v, floor) = (Number::of(value), Number::of(&args[0]));
        Ok(if v.as_f64() < floor.as_f64() { floor } else { v }.into_binding())
    }
}

struct AtMostFilter;
impl Filter for AtMostFilter {
    fn name(&self) -> &'static str {
        "at_most"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 1, 1)?;
        let (v, ceiling) = (Number::of(value), Number::of(&args[0]));
        Ok(if v.as_f64() > ceiling.as_f64() { ceiling } else { v }.into_binding())
    }
}

// ============================================================
// Misc filters
// ============================================================

struct DefaultFilter;
impl Filter for DefaultFilter {
    fn name(&self) -> &'static str {
        "default"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 1, 1)?;
        if value.is_truthy() && !value.is_empty_value() {
            Ok(value.clone())
        } else {
            Ok(args[0].clone())
        }
    }
}

/// Parses the inputs `date` understands: `now`/`today`, Unix timestamps,
/// RFC 3339, and `YYYY-MM-DD[ HH:MM:SS]`.
fn parse_date(value: &Binding) -> Option<DateTime<FixedOffset>> {
    let utc = FixedOffset::east_opt(0)?;
    let from_timestamp = |secs: i64| utc.timestamp_opt(secs, 0).single();
    match value {
        Binding::Integer(secs) => from_timestamp(*secs),
        Binding::String(s) => {
            let s = s.trim();
            match s {
                "now" | "today" => Some(Utc::now().with_timezone(&utc)),
                _ => s
                    .parse::<i64>()
                    .ok()
                    .and_then(from_timestamp)
                    .or_else(|| DateTime::parse_from_rfc3339(s).ok())
                    .or_else(|| {
                        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                            .ok()
                            .map(|dt| utc.from_utc_datetime(&dt))
                    })
                    .or_else(|| {
                        NaiveDate::parse_from_str(s, "%Y-%m-%d")
                            .ok()
                            .and_then(|d| d.and_hms_opt(0, 0, 0))
                            .map(|dt| utc.from_utc_datetime(&dt))
                    }),
            }
        }
        _ => None,
    }
}

struct DateFilter;
impl Filter for DateFilter {
    fn name(&self) -> &'static str {
        "date"
    }
    fn apply(&self, value: &Binding, args: &[Binding]) -> Result<Binding, FilterError> {
        check_args(self.name(), args, 1, 1)?;
        let format = string_arg(args, 0);
        if format.is_empty() {
            return Ok(value.clone());
        }
        // Unparseable input passes through unchanged.
        let Some(dt) = parse_date(value) else {
            return Ok(value.clone());
        };
        let mut out = String::new();
        write!(out, "{}", dt.format(&format)).map_err(|_| FilterError::InvalidArgument {
            filter: self.name(),
            message: format!("invalid date format '{format}'"),
        })?;
        Ok(Binding::String(out))
    }
}
