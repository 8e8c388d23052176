//! Data bindings for template rendering.
//!
//! A [`Binding`] is the recursive value a template is evaluated against. It
//! is produced from a decoded JSON document by [`convert`] (or the equivalent
//! `From<serde_json::Value>` impl) and keeps the full shape of the document:
//! objects stay objects, arrays keep their order, and numbers and booleans
//! keep their type.
//!
//! JSON `null` becomes the explicit [`Binding::Nil`] sentinel, which renders
//! as an empty string and is falsy in conditions.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

/// A dynamic value bound into a template.
#[derive(Debug, Clone)]
pub enum Binding {
    /// The absence of a value (JSON `null`).
    Nil,
    /// A boolean value.
    Bool(bool),
    /// A 64-bit integer.
    Integer(i64),
    /// A 64-bit floating point number.
    Float(f64),
    /// A string value.
    String(String),
    /// An ordered sequence of values.
    Array(Vec<Binding>),
    /// A mapping from member name to value.
    Object(BTreeMap<String, Binding>),
}

/// Converts a decoded JSON document into a [`Binding`] tree.
///
/// # Examples
///
/// ```
/// use liquid_report_template::binding::{convert, Binding};
///
/// let doc = serde_json::json!({"User": {"FirstName": "Dean"}});
/// let binding = convert(&doc);
/// let user = binding.get_member("User").unwrap();
/// assert_eq!(user.get_member("FirstName").unwrap().to_output(), "Dean");
/// ```
pub fn convert(document: &serde_json::Value) -> Binding {
    match document {
        serde_json::Value::Null => Binding::Nil,
        serde_json::Value::Bool(b) => Binding::Bool(*b),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(Binding::Integer)
            .or_else(|| n.as_f64().map(Binding::Float))
            .unwrap_or(Binding::Nil),
        serde_json::Value::String(s) => Binding::String(s.clone()),
        serde_json::Value::Array(items) => Binding::Array(items.iter().map(convert).collect()),
        serde_json::Value::Object(map) => Binding::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), convert(v)))
                .collect(),
        ),
    }
}

impl Binding {
    /// Creates an empty object binding.
    pub fn object() -> Self {
        Self::Object(BTreeMap::new())
    }

    /// Returns `true` if this value is truthy in a condition.
    ///
    /// Only `Nil` and `Bool(false)` are falsy; empty strings, zero and empty
    /// collections are all truthy.
    pub const fn is_truthy(&self) -> bool {
        !matches!(self, Self::Nil | Self::Bool(false))
    }

    /// Returns `true` for `Nil`.
    pub const fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Returns `true` for `Nil`, empty strings, and empty collections.
    pub fn is_empty_value(&self) -> bool {
        match self {
            Self::Nil => true,
            Self::String(s) => s.is_empty(),
            Self::Array(a) => a.is_empty(),
            Self::Object(o) => o.is_empty(),
            _ => false,
        }
    }

    /// Returns `true` for values that are empty or whitespace-only strings,
    /// `Nil`, `false`, or empty collections.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::String(s) => s.trim().is_empty(),
            Self::Bool(b) => !b,
            other => other.is_empty_value(),
        }
    }

    /// Converts this value to the text written into the rendered output.
    ///
    /// Arrays are rendered by concatenating their elements; objects are
    /// rendered as compact JSON.
    pub fn to_output(&self) -> String {
        match self {
            Self::Nil => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => format_float(*f),
            Self::String(s) => s.clone(),
            Self::Array(items) => items.iter().map(Self::to_output).collect(),
            Self::Object(_) => self.to_json().to_string(),
        }
    }

    /// Converts this value back into a `serde_json::Value`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Nil => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Integer(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Array(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Looks up a member by name without copying it.
    ///
    /// Objects resolve their own keys first. The special properties `size`,
    /// `first` and `last` are available on arrays, and `size` on strings and
    /// objects that have no `size` key of their own. Only `size` is
    /// synthesized; everything else borrows from `self`.
    pub fn member(&self, name: &str) -> Option<Cow<'_, Self>> {
        match self {
            Self::Object(map) => map
                .get(name)
                .map(Cow::Borrowed)
                .or_else(|| (name == "size").then(|| Cow::Owned(Self::from(map.len())))),
            Self::Array(items) => match name {
                "size" => Some(Cow::Owned(Self::from(items.len()))),
                "first" => items.first().map(Cow::Borrowed),
                "last" => items.last().map(Cow::Borrowed),
                _ => None,
            },
            Self::String(s) if name == "size" => Some(Cow::Owned(Self::from(s.chars().count()))),
            _ => None,
        }
    }

    /// Looks up an array element by index without copying it. Negative
    /// indexes count from the end.
    pub fn index(&self, index: i64) -> Option<&Self> {
        let Self::Array(items) = self else {
            return None;
        };
        let len = i64::try_from(items.len()).ok()?;
        let idx = if index < 0 { len + index } else { index };
        usize::try_from(idx).ok().and_then(|i| items.get(i))
    }

    /// Looks up a member using another binding as the key: integers index
    /// arrays, strings name object members.
    pub fn lookup_by(&self, key: &Self) -> Option<Cow<'_, Self>> {
        match key {
            Self::Integer(i) => self.index(*i).map(Cow::Borrowed),
            Self::Float(f) if f.fract() == 0.0 => self.index(*f as i64).map(Cow::Borrowed),
            Self::String(s) => self.member(s),
            _ => None,
        }
    }

    /// Owned form of [`member`](Self::member).
    pub fn get_member(&self, name: &str) -> Option<Self> {
        self.member(name).map(Cow::into_owned)
    }

    /// Owned form of [`index`](Self::index).
    pub fn get_index(&self, index: i64) -> Option<Self> {
        self.index(index).cloned()
    }

    /// Owned form of [`lookup_by`](Self::lookup_by).
    pub fn get_by(&self, key: &Self) -> Option<Self> {
        self.lookup_by(key).map(Cow::into_owned)
    }

    /// Attempts to interpret this value as an integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Float(f) => Some(*f as i64),
            Self::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Attempts to interpret this value as a float.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Integer(i) => Some(*i as f64),
            Self::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Returns the string contents if this is a `String`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the elements if this is an `Array`.
    pub fn as_array(&self) -> Option<&[Self]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the number of elements, characters, or members, if applicable.
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::String(s) => Some(s.chars().count()),
            Self::Array(items) => Some(items.len()),
            Self::Object(map) => Some(map.len()),
            _ => None,
        }
    }

    /// Returns `true` if this is a number.
    pub const fn is_number(&self) -> bool {
        matches!(self, Self::Integer(_) | Self::Float(_))
    }
}

/// Formats a float the way templates print it: integral values keep one
/// decimal place (`3.0`), others use the shortest representation.
fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 {
        format!("{f:.1}")
    } else {
        f.to_string()
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_output())
    }
}

impl PartialEq for Binding {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Integer(a), Self::Float(b)) | (Self::Float(b), Self::Integer(a)) => {
                (*a as f64) == *b
            }
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            _ => false,
        }
    }
}

// -- From implementations --

impl From<serde_json::Value> for Binding {
    fn from(v: serde_json::Value) -> Self {
        convert(&v)
    }
}

impl From<&str> for Binding {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Binding {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Binding {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<i32> for Binding {
    fn from(i: i32) -> Self {
        Self::Integer(i64::from(i))
    }
}

impl From<usize> for Binding {
    fn from(i: usize) -> Self {
        Self::Integer(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Binding {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for Binding {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl<T: Into<Binding>> From<Vec<T>> for Binding {
    fn from(v: Vec<T>) -> Self {
        Self::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Binding>> From<Option<T>> for Binding {
    fn from(o: Option<T>) -> Self {
        o.map_or(Self::Nil, Into::into)
    }
}
