//! Lexical scopes with writable variable handles.
//!
//! A scope carries its locally-declared bindings, the owning entity whose
//! attribute table serves as the innermost lookup layer (`has_obj`), and the
//! entities whose ability tables are searched for unqualified ability names.
//! Scopes form a stack on the interpreter; lookups walk top-down.

use indexmap::IndexMap;

use crate::{graph::EntityId, value::Value};

/// The implicit agent bindings inherited into nested ability scopes.
pub const AGENT_REFS: [&str; 2] = ["here", "visitor"];

/// One frame of the scope chain.
#[derive(Debug, Default)]
pub struct Scope {
    /// The owning entity; its context is the innermost lookup layer.
    pub has_obj: Option<EntityId>,
    locals: IndexMap<String, Value>,
    /// Entities contributing ability tables for unqualified ability lookup.
    pub action_tables: Vec<EntityId>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scope owned by `entity`, with that entity's ability tables in play.
    pub fn for_entity(entity: EntityId) -> Self {
        Self {
            has_obj: Some(entity),
            locals: IndexMap::new(),
            action_tables: vec![entity],
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.locals.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.locals.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.locals.contains_key(name)
    }

    /// Copies the implicit `here` / `visitor` bindings from a caller scope.
    pub fn inherit_agent_refs(&mut self, from: &Self) {
        for name in AGENT_REFS {
            if let Some(value) = from.get(name) {
                self.set(name, value.clone());
            }
        }
    }
}

/// The interpreter's scope stack. Index 0 is the outermost scope.
#[derive(Debug, Default)]
pub struct Scopes {
    stack: Vec<Scope>,
}

impl Scopes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, scope: Scope) {
        self.stack.push(scope);
    }

    pub fn pop(&mut self) -> Option<Scope> {
        self.stack.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn top(&self) -> Option<&Scope> {
        self.stack.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut Scope> {
        self.stack.last_mut()
    }

    /// Scopes from innermost to outermost, paired with their stack depth.
    pub fn iter_top_down(&self) -> impl Iterator<Item = (usize, &Scope)> {
        self.stack.iter().enumerate().rev()
    }

    /// Writes a binding at an exact depth. The binding must exist or the
    /// depth must be the top of the stack (where assignment creates it).
    pub fn set_at(&mut self, depth: usize, name: &str, value: Value) -> bool {
        match self.stack.get_mut(depth) {
            Some(scope) => {
                scope.set(name, value);
                true
            }
            None => false,
        }
    }

    pub fn get_at(&self, depth: usize, name: &str) -> Option<&Value> {
        self.stack.get(depth).and_then(|scope| scope.get(name))
    }
}
