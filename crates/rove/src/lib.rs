#![doc = include_str!("../../../README.md")]
#![expect(clippy::cast_possible_truncation, reason = "numeric narrowing is checked")]
#![expect(clippy::cast_sign_loss, reason = "sign-changing casts are range-checked")]
#![expect(clippy::cast_possible_wrap, reason = "container lengths fit in i64")]
#![expect(clippy::too_many_arguments, reason = "ability execution threads shared machine state")]

mod action;
mod ast;
mod diag;
mod graph;
mod heap;
mod host;
mod interp;
mod machine;
mod place;
mod runtime;
mod scope;
mod value;

pub use crate::{
    action::{find_action, Action, ActionBody, BuiltinAction, Trigger},
    ast::{ast_to_ir, ir_to_ast, Ast, AstKind, Ir},
    diag::{CollectDiags, DiagSink, RtError, RtErrorKind, RtResult, StderrDiags},
    graph::{Entity, EntityId, EntityKind, EntitySet, GraphStore, Jid},
    heap::{Heap, HeapData, HeapId},
    host::Host,
    interp::{Interp, StopReason},
    machine::Machine,
    place::{Binding, Place},
    runtime::{BasicRuntime, DEFAULT_LOOP_LIMIT},
    scope::{Scope, Scopes, AGENT_REFS},
    value::{json_to_value, value_to_json, Value},
};
