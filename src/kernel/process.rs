//! Deferred calls: inert records of "invoke method M on entity O with
//! arguments A", decoupling scheduling from the called code.
//!
//! The owner is either a live entity handle or a *name* resolved against the
//! timeline's registry exactly once, at schedule time. Name owners let
//! collaborators build events before the target object exists.

use std::collections::BTreeMap;
use std::fmt;

use smallvec::SmallVec;

use crate::kernel::entity::EntityRef;

/// One argument of a deferred call. The set is closed over what collaborator
/// models pass: numbers, flags, names, and quantum state keys.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    /// A quantum state manager key.
    Key(u64),
}

impl ArgValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ArgValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ArgValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ArgValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_key(&self) -> Option<u64> {
        match self {
            ArgValue::Key(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<i64> for ArgValue {
    fn from(v: i64) -> Self {
        ArgValue::Int(v)
    }
}

impl From<f64> for ArgValue {
    fn from(v: f64) -> Self {
        ArgValue::Float(v)
    }
}

impl From<bool> for ArgValue {
    fn from(v: bool) -> Self {
        ArgValue::Bool(v)
    }
}

impl From<&str> for ArgValue {
    fn from(v: &str) -> Self {
        ArgValue::Str(v.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(v: String) -> Self {
        ArgValue::Str(v)
    }
}

impl From<u64> for ArgValue {
    fn from(v: u64) -> Self {
        ArgValue::Key(v)
    }
}

/// Ordered positional arguments plus keyword arguments. Keyword storage is a
/// `BTreeMap` so iteration order never depends on hashing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    positional: SmallVec<[ArgValue; 4]>,
    keyword: BTreeMap<String, ArgValue>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<ArgValue>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Insert a keyword argument.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.keyword.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, index: usize) -> Option<&ArgValue> {
        self.positional.get(index)
    }

    pub fn keyword(&self, name: &str) -> Option<&ArgValue> {
        self.keyword.get(name)
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }
}

/// The target of a deferred call: a live entity, or a name the timeline
/// resolves against its registry at schedule time.
#[derive(Clone)]
pub enum Owner {
    Named(String),
    Resolved(EntityRef),
}

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Owner::Resolved(rc) => match rc.try_borrow() {
                Ok(entity) => f.debug_tuple("Resolved").field(&entity.name()).finish(),
                Err(_) => f.write_str("Resolved(<borrowed>)"),
            },
        }
    }
}

impl From<&str> for Owner {
    fn from(name: &str) -> Self {
        Owner::Named(name.to_string())
    }
}

impl From<String> for Owner {
    fn from(name: String) -> Self {
        Owner::Named(name)
    }
}

impl From<EntityRef> for Owner {
    fn from(entity: EntityRef) -> Self {
        Owner::Resolved(entity)
    }
}

/// A recorded, not-yet-executed method invocation. Immutable once created;
/// the only mutation is the one-time owner resolution performed by
/// `Timeline::schedule`.
#[derive(Debug, Clone)]
pub struct DeferredCall {
    pub owner: Owner,
    pub method: String,
    pub args: CallArgs,
}

impl DeferredCall {
    pub fn new(owner: impl Into<Owner>, method: impl Into<String>, args: CallArgs) -> Self {
        Self {
            owner: owner.into(),
            method: method.into(),
            args,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_and_keyword_arguments() {
        let args = CallArgs::new()
            .arg(3_i64)
            .arg(2.5)
            .kwarg("flag", true)
            .kwarg("who", "alice");
        assert_eq!(args.len(), 2);
        assert_eq!(args.get(0).and_then(ArgValue::as_int), Some(3));
        assert_eq!(args.get(1).and_then(ArgValue::as_float), Some(2.5));
        assert_eq!(args.keyword("flag").and_then(ArgValue::as_bool), Some(true));
        assert_eq!(args.keyword("who").and_then(ArgValue::as_str), Some("alice"));
        assert!(args.keyword("missing").is_none());
    }

    #[test]
    fn key_arguments_are_distinct_from_ints() {
        let args = CallArgs::new().arg(7_u64).arg(7_i64);
        assert_eq!(args.get(0).and_then(ArgValue::as_key), Some(7));
        assert!(args.get(0).and_then(ArgValue::as_int).is_none());
        assert_eq!(args.get(1).and_then(ArgValue::as_int), Some(7));
    }

    #[test]
    fn named_owner_debug_does_not_require_registry() {
        let call = DeferredCall::new("detector-0", "detect", CallArgs::new());
        let text = format!("{call:?}");
        assert!(text.contains("detector-0"));
        assert!(text.contains("detect"));
    }
}
