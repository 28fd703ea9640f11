//! Abilities and builtin actions attached to entities.

use strum::{Display, EnumString, IntoStaticStr};

use crate::{ast::Ir, diag::RtResult, heap::Heap, value::Value};

/// Signature of a host-provided builtin action.
///
/// Builtins receive their evaluated arguments and may allocate result
/// containers on the machine heap.
pub type BuiltinAction = fn(&[Value], &mut Heap) -> RtResult<Value>;

/// When an ability fires relative to a walker visiting its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Trigger {
    Entry,
    Exit,
    Activity,
}

/// The executable part of an action record.
#[derive(Debug, Clone)]
pub enum ActionBody {
    /// A stored code block, kept in IR form inside the entity.
    Code(Ir),
    /// A resolved host builtin.
    Builtin(BuiltinAction),
}

/// A named, entity-attached action: either a stored code block (an ability)
/// or a registered builtin.
#[derive(Debug, Clone)]
pub struct Action {
    pub name: String,
    pub body: ActionBody,
    /// Preset input/output fragment, stored uninterpreted.
    pub preset_in_out: Option<Ir>,
    /// Declared access list from the event clause. Stored and surfaced, not
    /// enforced.
    pub access_list: Vec<String>,
}

impl Action {
    pub fn new(name: impl Into<String>, body: ActionBody) -> Self {
        Self {
            name: name.into(),
            body,
            preset_in_out: None,
            access_list: vec![],
        }
    }
}

/// Finds an action by name in a table, last declaration wins.
pub fn find_action<'a>(table: &'a [Action], name: &str) -> Option<&'a Action> {
    table.iter().rev().find(|a| a.name == name)
}
