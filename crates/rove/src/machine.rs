//! A machine bundles everything one interpreter run needs.
//!
//! The graph store and heap live together for the machine's lifetime
//! (entity contexts hold heap ids), the runtime provides the host boundary,
//! and diagnostics collect for inspection. This is the primary entry point
//! for drivers and tests.

use uuid::Uuid;

use crate::{
    ast::Ast,
    diag::CollectDiags,
    graph::{EntityId, EntityKind, GraphStore},
    heap::Heap,
    interp::Interp,
    runtime::{BasicRuntime, DEFAULT_LOOP_LIMIT},
    scope::Scope,
    value::Value,
};

pub struct Machine {
    pub graph: GraphStore,
    pub heap: Heap,
    pub runtime: BasicRuntime,
    pub diags: CollectDiags,
    m_id: Uuid,
    loop_limit: usize,
}

impl Machine {
    pub fn new() -> Self {
        Self::with_loop_limit(DEFAULT_LOOP_LIMIT)
    }

    pub fn with_loop_limit(loop_limit: usize) -> Self {
        Self {
            graph: GraphStore::new(),
            heap: Heap::new(),
            runtime: BasicRuntime::with_loop_limit(loop_limit),
            diags: CollectDiags::new(),
            m_id: Uuid::new_v4(),
            loop_limit,
        }
    }

    pub fn machine_id(&self) -> Uuid {
        self.m_id
    }

    pub fn spawn_node(&mut self, name: impl Into<String>) -> EntityId {
        self.graph.create(EntityKind::Node, name)
    }

    /// An interpreter borrowing this machine's graph, heap, runtime, and
    /// diagnostics. The caller seeds scopes and submits AST subtrees.
    pub fn interp(&mut self) -> Interp<'_> {
        Interp::new(
            self.m_id,
            &mut self.graph,
            &mut self.heap,
            &mut self.runtime,
            &mut self.diags,
            self.loop_limit,
        )
    }

    /// Runs a code block at a node with a throwaway walker as the owning
    /// entity, returning the accumulated reports. This is the shape of a
    /// single walker activation driven by hand.
    pub fn run_at(&mut self, code: &Ast, node: EntityId) -> Vec<serde_json::Value> {
        let walker = self.graph.create(EntityKind::Walker, "anonymous");
        let report = self.run_on(code, walker, Some(node));
        self.graph.destroy(walker);
        report
    }

    /// Runs a code block with an explicit owning entity and optional current
    /// node, returning the accumulated reports.
    pub fn run_on(&mut self, code: &Ast, has_obj: EntityId, node: Option<EntityId>) -> Vec<serde_json::Value> {
        log::debug!("run_on has_obj={has_obj:?} node={node:?}");
        let mut interp = self.interp();
        interp.current_node = node;
        let mut scope = Scope::for_entity(has_obj);
        if let Some(n) = node {
            scope.set("here", Value::Entity(n));
        }
        scope.set("visitor", Value::Entity(has_obj));
        interp.push_scope(scope);
        interp.run_code_block(code);
        std::mem::take(&mut interp.report)
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}
