//! The Place abstraction: every sub-expression evaluates to one.
//!
//! A Place carries a value and, optionally, a back-reference sufficient to
//! write a new value to its origin. Assignment, compound assignment, and
//! copy assignment all treat the left-hand side uniformly through this type,
//! so the grammar needs no separate l-value form.

use crate::{
    diag::{RtError, RtErrorKind, RtResult},
    graph::{EntityId, GraphStore},
    heap::{Heap, HeapId},
    scope::Scopes,
    value::Value,
};

/// Where a Place's value came from, precise enough to write back to.
#[derive(Debug, Clone)]
pub enum Binding {
    /// A scope variable: stack depth plus name.
    ScopeVar { depth: usize, name: String },
    /// An attribute slot in an entity's context.
    CtxSlot { entity: EntityId, key: String },
    /// A key slot in a heap map; writing creates the key if missing.
    MapSlot { map: HeapId, key: String },
    /// An index slot in a heap list; writes must stay in range.
    ListSlot { list: HeapId, index: usize },
}

/// An expression result that may be written back to its origin.
#[derive(Debug, Clone)]
pub struct Place {
    pub value: Value,
    pub binding: Option<Binding>,
}

impl Place {
    /// A pure r-value with no origin.
    pub fn rvalue(value: Value) -> Self {
        Self { value, binding: None }
    }

    pub fn bound(value: Value, binding: Binding) -> Self {
        Self {
            value,
            binding: Some(binding),
        }
    }

    /// Propagates the Place's current value back along its binding.
    ///
    /// Unbound Places are not assignable; a list slot that fell out of range
    /// since it was read is an `IndexError`.
    pub fn write(&self, scopes: &mut Scopes, heap: &mut Heap, graph: &mut GraphStore) -> RtResult<()> {
        let Some(binding) = &self.binding else {
            return Err(RtError::new(
                RtErrorKind::NotAssignable,
                "expression result is not assignable",
            ));
        };
        match binding {
            Binding::ScopeVar { depth, name } => {
                if scopes.set_at(*depth, name, self.value.clone()) {
                    Ok(())
                } else {
                    Err(RtError::new(
                        RtErrorKind::NotAssignable,
                        format!("scope for variable '{name}' no longer exists"),
                    ))
                }
            }
            Binding::CtxSlot { entity, key } => match graph.get_mut(*entity) {
                Some(e) => {
                    e.context.insert(key.clone(), self.value.clone());
                    Ok(())
                }
                None => Err(RtError::new(
                    RtErrorKind::NotAssignable,
                    "entity no longer exists",
                )),
            },
            Binding::MapSlot { map, key } => {
                heap.map_mut(*map).insert(key.clone(), self.value.clone());
                Ok(())
            }
            Binding::ListSlot { list, index } => {
                let items = heap.list_mut(*list);
                match items.get_mut(*index) {
                    Some(slot) => {
                        *slot = self.value.clone();
                        Ok(())
                    }
                    None => Err(RtError::new(
                        RtErrorKind::IndexError,
                        format!("list index {index} out of range"),
                    )),
                }
            }
        }
    }

    /// Re-reads the value at the binding's origin.
    ///
    /// Immediately after a successful [`write`](Self::write) this returns the
    /// written value; `None` for unbound Places or vanished origins.
    pub fn read_back(&self, scopes: &Scopes, heap: &Heap, graph: &GraphStore) -> Option<Value> {
        match self.binding.as_ref()? {
            Binding::ScopeVar { depth, name } => scopes.get_at(*depth, name).cloned(),
            Binding::CtxSlot { entity, key } => graph.get(*entity).and_then(|e| e.context.get(key)).cloned(),
            Binding::MapSlot { map, key } => heap.map(*map).get(key).cloned(),
            Binding::ListSlot { list, index } => heap.list(*list).get(*index).cloned(),
        }
    }
}
