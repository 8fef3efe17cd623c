//! The state store shared by a compiled program and its runtime.
//!
//! One ordered namespace holds both caller-visible bindings (`event`, extra
//! bindings passed to `compile_with`) and the hidden state the translator
//! introduces (`count$3`, `chainBuffer$7`, ...). After compilation the
//! environment is frozen into an original snapshot; a match restores that
//! snapshot except for the carry-over bindings.

use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::value::Value;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    bindings: IndexMap<String, Value>,
    original: Option<IndexMap<String, Value>>,
    carry_over: BTreeSet<String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.bindings.get_mut(name)
    }

    /// Insert or overwrite a binding. New names keep insertion order.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Binding names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Exempt `name` from [`reset`](Self::reset).
    pub fn mark_carry_over(&mut self, name: impl Into<String>) {
        self.carry_over.insert(name.into());
    }

    pub fn carry_over(&self) -> impl Iterator<Item = &str> {
        self.carry_over.iter().map(String::as_str)
    }

    pub fn is_carry_over(&self, name: &str) -> bool {
        self.carry_over.contains(name)
    }

    /// Freeze the current bindings as the original state.
    pub fn snapshot(&mut self) {
        self.original = Some(self.bindings.clone());
    }

    pub fn has_snapshot(&self) -> bool {
        self.original.is_some()
    }

    /// Restore the original snapshot, keeping carry-over bindings verbatim.
    ///
    /// Without a snapshot this is a no-op.
    pub fn reset(&mut self) {
        let Some(original) = &self.original else {
            return;
        };
        let mut restored = original.clone();
        for name in &self.carry_over {
            if let Some(current) = self.bindings.get(name) {
                restored.insert(name.clone(), current.clone());
            }
        }
        self.bindings = restored;
    }
}
