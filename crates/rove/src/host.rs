//! The host boundary the interpreter core calls across.
//!
//! The architype registry, the walker scheduler, and the builtin-action
//! table are external collaborators; the core reaches them through this
//! trait so hosts can swap in their own scheduling and action dispatch.
//! [`crate::runtime::BasicRuntime`] is the in-repo implementation.

use crate::{
    action::BuiltinAction,
    diag::DiagSink,
    graph::{EntityId, EntityKind, GraphStore},
    heap::Heap,
};

pub trait Host {
    /// Materializes a fresh entity (or subgraph root, for graphs) from a
    /// named template. `None` means the registry refused the name.
    fn run_architype(
        &mut self,
        name: &str,
        kind: EntityKind,
        graph: &mut GraphStore,
        heap: &mut Heap,
        sink: &mut dyn DiagSink,
    ) -> Option<EntityId>;

    /// Creates a walker of the named architype.
    fn spawn_walker(
        &mut self,
        name: &str,
        graph: &mut GraphStore,
        heap: &mut Heap,
        sink: &mut dyn DiagSink,
    ) -> Option<EntityId>;

    /// Records where a walker will start.
    fn prime(&mut self, walker: EntityId, node: EntityId);

    /// Drives a primed walker to completion.
    fn run(&mut self, walker: EntityId, graph: &mut GraphStore, heap: &mut Heap, sink: &mut dyn DiagSink);

    /// Drains the reports a walker accumulated while running.
    fn take_report(&mut self, walker: EntityId) -> Vec<serde_json::Value>;

    /// Disposes of a walker and its scheduling state.
    fn destroy(&mut self, walker: EntityId, graph: &mut GraphStore);

    /// Resolves a dotted name (e.g. `std.log`) to a callable host action.
    fn get_builtin_action(&self, dotted_name: &str) -> Option<BuiltinAction>;
}
