//! Template context for variable resolution during rendering.
//!
//! A [`Context`] wraps the root [`Binding`] of a render call together with a
//! stack of scopes. `assign` and `capture` write to the global scope so their
//! values stay visible after the block that set them (including across
//! `include` boundaries); `for` loops and include parameters push a local
//! scope that is discarded when the block finishes.

use std::borrow::Cow;
use std::collections::HashMap;

use crate::binding::Binding;

/// A pending `break` or `continue` raised inside a `for` loop body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// Stop the innermost loop.
    Break,
    /// Skip to the next iteration of the innermost loop.
    Continue,
}

/// The variable environment of one render call.
///
/// # Examples
///
/// ```
/// use liquid_report_template::binding::Binding;
/// use liquid_report_template::context::Context;
///
/// let root = Binding::from(serde_json::json!({"name": "Ann"}));
/// let mut ctx = Context::new(root);
/// assert_eq!(ctx.get("name").unwrap().to_output(), "Ann");
///
/// ctx.push();
/// ctx.set_local("name", Binding::from("Bob"));
/// assert_eq!(ctx.get("name").unwrap().to_output(), "Bob");
///
/// ctx.pop();
/// assert_eq!(ctx.get("name").unwrap().to_output(), "Ann");
/// ```
pub struct Context {
    root: Binding,
    /// `stack[0]` is the global scope for `assign`/`capture`.
    stack: Vec<HashMap<String, Binding>>,
    interrupt: Option<Interrupt>,
    strict_variables: bool,
}

impl Context {
    /// Creates a context over the given root binding.
    pub fn new(root: Binding) -> Self {
        Self {
            root,
            stack: vec![HashMap::new()],
            interrupt: None,
            strict_variables: false,
        }
    }

    /// Sets whether undefined variables are an error.
    #[must_use]
    pub const fn with_strict_variables(mut self, strict: bool) -> Self {
        self.strict_variables = strict;
        self
    }

    /// Returns `true` if undefined variables are an error.
    pub const fn strict_variables(&self) -> bool {
        self.strict_variables
    }

    /// Pushes a new local scope.
    pub fn push(&mut self) {
        self.stack.push(HashMap::new());
    }

    /// Pops the innermost local scope. The global scope is never popped.
    pub fn pop(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }

    /// Sets a variable in the global scope (`assign`, `capture`).
    pub fn set_global(&mut self, key: impl Into<String>, value: Binding) {
        self.stack[0].insert(key.into(), value);
    }

    /// Sets a variable in the innermost scope.
    pub fn set_local(&mut self, key: impl Into<String>, value: Binding) {
        if let Some(top) = self.stack.last_mut() {
            top.insert(key.into(), value);
        }
    }

    /// Looks up a top-level variable: scopes from innermost to global, then
    /// the members of the root binding. Stored values are borrowed.
    pub fn lookup(&self, name: &str) -> Option<Cow<'_, Binding>> {
        self.stack
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).map(Cow::Borrowed))
            .or_else(|| self.root.member(name))
    }

    /// Owned form of [`lookup`](Self::lookup).
    pub fn get(&self, name: &str) -> Option<Binding> {
        self.lookup(name).map(Cow::into_owned)
    }

    /// Records a `break` or `continue`.
    pub fn set_interrupt(&mut self, interrupt: Interrupt) {
        self.interrupt = Some(interrupt);
    }

    /// Returns `true` while a `break` or `continue` is pending.
    pub const fn has_interrupt(&self) -> bool {
        self.interrupt.is_some()
    }

    /// Takes the pending interrupt, clearing it.
    pub fn take_interrupt(&mut self) -> Option<Interrupt> {
        self.interrupt.take()
    }
}
