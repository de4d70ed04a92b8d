//! Scoped variable store.
//!
//! One global scope plus a stack of call scopes.  Reads see the innermost
//! call scope and then the global scope; the scopes of callers are never
//! visible, so a function body cannot observe its caller's locals.

use std::collections::BTreeMap;

use super::value::{Object, Value};

pub type Scope = BTreeMap<String, Value>;

#[derive(Debug, Default, Clone)]
pub struct Memory {
    global: Scope,
    frames: Vec<Scope>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a call: subsequent local writes land in a fresh scope.
    pub fn push_scope(&mut self) {
        self.frames.push(Scope::new());
    }

    pub fn pop_scope(&mut self) -> Option<Scope> {
        self.frames.pop()
    }

    /// Number of active call scopes; 0 at top level.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Drop call scopes until `depth` remain.
    pub fn unwind_to(&mut self, depth: usize) {
        self.frames.truncate(depth);
    }

    pub fn is_top_level(&self) -> bool {
        self.frames.is_empty()
    }

    /// Innermost visible binding of `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.frames
            .last()
            .and_then(|scope| scope.get(name))
            .or_else(|| self.global.get(name))
    }

    /// Value of `name`, or `Null` when it is not bound anywhere visible.
    pub fn value(&self, name: &str) -> Value {
        self.get(name).cloned().unwrap_or_default()
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Bind in the current scope (the global scope at top level).
    pub fn set_local(&mut self, name: impl Into<String>, value: Value) {
        let scope = self.frames.last_mut().unwrap_or(&mut self.global);
        scope.insert(name.into(), value);
    }

    pub fn set_global(&mut self, name: impl Into<String>, value: Value) {
        self.global.insert(name.into(), value);
    }

    /// Remove the innermost visible binding.  Returns `true` if one existed.
    pub fn remove(&mut self, name: &str) -> bool {
        if let Some(scope) = self.frames.last_mut() {
            if scope.remove(name).is_some() {
                return true;
            }
        }
        self.global.remove(name).is_some()
    }

    /// Every visible binding, locals shadowing globals, as one object.
    pub fn snapshot(&self) -> Object {
        let mut merged: BTreeMap<&str, &Value> = self.global.iter().map(|(k, v)| (k.as_str(), v)).collect();
        if let Some(scope) = self.frames.last() {
            merged.extend(scope.iter().map(|(k, v)| (k.as_str(), v)));
        }
        merged.into_iter().map(|(k, v)| (k, v.clone())).collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
