//! The in-repo host: architype registry, walker scheduler, builtin actions.
//!
//! A walker activation is single-stop: at the primed node the runtime runs
//! the node's entry abilities, the walker's activity abilities (with `here`
//! bound to the node and `visitor` to the walker), then the node's exit
//! abilities, each through a fresh interpreter. A `skip` raised by any
//! ability ends the activation.

use ahash::AHashMap;
use uuid::Uuid;

use crate::{
    action::{Action, ActionBody, BuiltinAction},
    ast::{ast_to_ir, ir_to_ast, Ast, Ir},
    diag::{DiagSink, RtResult},
    graph::{EntityId, EntityKind, GraphStore},
    heap::Heap,
    host::Host,
    interp::Interp,
    scope::Scope,
    value::Value,
};

/// Default per-machine bound on loop iterations.
pub const DEFAULT_LOOP_LIMIT: usize = 10_000;

fn std_log(args: &[Value], _heap: &mut Heap) -> RtResult<Value> {
    log::info!("std.log: {args:?}");
    Ok(Value::Null)
}

fn std_echo(args: &[Value], _heap: &mut Heap) -> RtResult<Value> {
    Ok(args.first().cloned().unwrap_or(Value::Null))
}

/// Concrete [`Host`] implementation.
///
/// Architype templates are stored declaration blocks (`has` / `can`
/// statements, and for graphs arbitrary spawning code) executed against each
/// freshly materialized entity. Unregistered names yield a plain entity of
/// that architype name.
pub struct BasicRuntime {
    m_id: Uuid,
    loop_limit: usize,
    architypes: AHashMap<(EntityKind, String), Ir>,
    builtins: AHashMap<String, BuiltinAction>,
    primed: AHashMap<EntityId, EntityId>,
    reports: AHashMap<EntityId, Vec<serde_json::Value>>,
}

impl BasicRuntime {
    pub fn new() -> Self {
        Self::with_loop_limit(DEFAULT_LOOP_LIMIT)
    }

    pub fn with_loop_limit(loop_limit: usize) -> Self {
        let mut builtins: AHashMap<String, BuiltinAction> = AHashMap::new();
        builtins.insert("std.log".to_owned(), std_log);
        builtins.insert("std.echo".to_owned(), std_echo);
        Self {
            m_id: Uuid::new_v4(),
            loop_limit,
            architypes: AHashMap::new(),
            builtins,
            primed: AHashMap::new(),
            reports: AHashMap::new(),
        }
    }

    pub fn machine_id(&self) -> Uuid {
        self.m_id
    }

    /// Registers a named template whose body runs against each fresh entity.
    pub fn register_architype(&mut self, kind: EntityKind, name: impl Into<String>, body: &Ast) {
        self.architypes.insert((kind, name.into()), ast_to_ir(body));
    }

    /// Registers a host action reachable by dotted name from `can`
    /// declarations and call expressions.
    pub fn register_action(&mut self, name: impl Into<String>, func: BuiltinAction) {
        self.builtins.insert(name.into(), func);
    }

    /// Runs a stored template body with the entity as the owning scope.
    fn exec_template(
        &mut self,
        body: &Ir,
        entity: EntityId,
        graph: &mut GraphStore,
        heap: &mut Heap,
        sink: &mut dyn DiagSink,
    ) {
        let body = ir_to_ast(body);
        let is_located = graph
            .get(entity)
            .is_some_and(|e| matches!(e.kind, EntityKind::Node));
        let (m_id, loop_limit) = (self.m_id, self.loop_limit);
        let mut interp = Interp::new(m_id, graph, heap, self, sink, loop_limit);
        if is_located {
            interp.current_node = Some(entity);
        }
        let mut scope = Scope::for_entity(entity);
        scope.set("here", Value::Entity(entity));
        interp.push_scope(scope);
        interp.run_code_block(&body);
    }

    /// Executes one ability for a walker activation. Returns whether the
    /// activation should stop.
    fn exec_ability(
        &mut self,
        owner: EntityId,
        action: &Action,
        here: EntityId,
        visitor: EntityId,
        graph: &mut GraphStore,
        heap: &mut Heap,
        sink: &mut dyn DiagSink,
        reports: &mut Vec<serde_json::Value>,
    ) -> bool {
        match &action.body {
            ActionBody::Code(ir) => {
                let body = ir_to_ast(ir);
                let (m_id, loop_limit) = (self.m_id, self.loop_limit);
                let mut interp = Interp::new(m_id, graph, heap, self, sink, loop_limit);
                interp.current_node = Some(here);
                let mut scope = Scope::for_entity(owner);
                scope.set("here", Value::Entity(here));
                scope.set("visitor", Value::Entity(visitor));
                interp.push_scope(scope);
                interp.run_code_block(&body);
                reports.append(&mut interp.report);
                interp.stopped()
            }
            ActionBody::Builtin(func) => {
                let _ = func(&[], heap);
                false
            }
        }
    }
}

impl Default for BasicRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for BasicRuntime {
    fn run_architype(
        &mut self,
        name: &str,
        kind: EntityKind,
        graph: &mut GraphStore,
        heap: &mut Heap,
        sink: &mut dyn DiagSink,
    ) -> Option<EntityId> {
        // a graph architype materializes around a root node
        let entity_kind = match kind {
            EntityKind::Graph => EntityKind::Node,
            other => other,
        };
        let entity = graph.create(entity_kind, name);
        if let Some(body) = self.architypes.get(&(kind, name.to_owned())).cloned() {
            self.exec_template(&body, entity, graph, heap, sink);
        }
        Some(entity)
    }

    fn spawn_walker(
        &mut self,
        name: &str,
        graph: &mut GraphStore,
        heap: &mut Heap,
        sink: &mut dyn DiagSink,
    ) -> Option<EntityId> {
        self.run_architype(name, EntityKind::Walker, graph, heap, sink)
    }

    fn prime(&mut self, walker: EntityId, node: EntityId) {
        self.primed.insert(walker, node);
    }

    fn run(&mut self, walker: EntityId, graph: &mut GraphStore, heap: &mut Heap, sink: &mut dyn DiagSink) {
        let Some(&node) = self.primed.get(&walker) else {
            return;
        };
        log::debug!("walker activation at node {node:?}");
        let node_entry = graph.get(node).map(|e| e.entry_actions.clone()).unwrap_or_default();
        let walker_activity = graph
            .get(walker)
            .map(|e| e.activity_actions.clone())
            .unwrap_or_default();
        let node_exit = graph.get(node).map(|e| e.exit_actions.clone()).unwrap_or_default();

        let mut reports = vec![];
        let mut stopped = false;
        let phases: [(EntityId, &[Action]); 3] = [
            (node, &node_entry),
            (walker, &walker_activity),
            (node, &node_exit),
        ];
        'phases: for (owner, actions) in phases {
            for action in actions {
                if stopped {
                    break 'phases;
                }
                stopped = self.exec_ability(owner, action, node, walker, graph, heap, sink, &mut reports);
            }
        }
        self.reports.entry(walker).or_default().append(&mut reports);
    }

    fn take_report(&mut self, walker: EntityId) -> Vec<serde_json::Value> {
        self.reports.remove(&walker).unwrap_or_default()
    }

    fn destroy(&mut self, walker: EntityId, graph: &mut GraphStore) {
        self.primed.remove(&walker);
        self.reports.remove(&walker);
        graph.destroy(walker);
    }

    fn get_builtin_action(&self, dotted_name: &str) -> Option<BuiltinAction> {
        self.builtins.get(dotted_name).copied()
    }
}
