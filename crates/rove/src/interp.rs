//! The interpreter core: a recursive AST walker.
//!
//! Every sub-expression evaluates to a [`Place`] so assignment flavors can
//! treat the left-hand side uniformly. The interpreter is stateless with
//! respect to scopes (they are pushed by the driver) and carries the
//! per-execution flags: `stopped`, `loop_ctrl`, `assign_mode`, the loop
//! iteration limit, the current node, and the report buffer.
//!
//! All runtime errors are recoverable: they are reported through the
//! [`DiagSink`] and evaluation continues with a well-defined fallback.
//! Only `skip` (or the host) stops a walker.

use uuid::Uuid;

use crate::{
    action::{find_action, Action, ActionBody, Trigger},
    ast::{ast_to_ir, ir_to_ast, Ast, AstKind},
    diag::{DiagSink, RtError, RtErrorKind, RtResult},
    graph::{EntityId, EntityKind, EntitySet, GraphStore, Jid},
    heap::Heap,
    host::Host,
    place::{Binding, Place},
    scope::{Scope, Scopes},
    value::{json_to_value, value_to_json, Value},
};

/// Why the interpreter stopped executing statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The `skip` statement: the current activation ends until the driver
    /// resets the flag.
    Skip,
    /// The host asked the walker to stop.
    Host,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopCtrl {
    Break,
    Continue,
}

enum IndexKey {
    Int(i64),
    Str(String),
}

/// One interpreter instance.
///
/// Ability invocation creates a fresh nested instance sharing the parent's
/// machine identity, graph, heap, host, and sink; scopes and the report
/// buffer stay per-instance and the nested report is concatenated onto the
/// caller's afterwards.
pub struct Interp<'a> {
    m_id: Uuid,
    graph: &'a mut GraphStore,
    heap: &'a mut Heap,
    host: &'a mut dyn Host,
    sink: &'a mut dyn DiagSink,
    scopes: Scopes,
    /// Deep-serialized report values accumulated by `report` statements.
    pub report: Vec<serde_json::Value>,
    stopped: Option<StopReason>,
    loop_ctrl: Option<LoopCtrl>,
    assign_mode: bool,
    loop_limit: usize,
    /// The node a walker is currently standing on; edge references and
    /// viable-node queries are relative to it.
    pub current_node: Option<EntityId>,
}

impl<'a> Interp<'a> {
    pub fn new(
        m_id: Uuid,
        graph: &'a mut GraphStore,
        heap: &'a mut Heap,
        host: &'a mut dyn Host,
        sink: &'a mut dyn DiagSink,
        loop_limit: usize,
    ) -> Self {
        Self {
            m_id,
            graph,
            heap,
            host,
            sink,
            scopes: Scopes::new(),
            report: vec![],
            stopped: None,
            loop_ctrl: None,
            assign_mode: false,
            loop_limit,
            current_node: None,
        }
    }

    pub fn machine_id(&self) -> Uuid {
        self.m_id
    }

    pub fn push_scope(&mut self, scope: Scope) {
        self.scopes.push(scope);
    }

    pub fn pop_scope(&mut self) -> Option<Scope> {
        self.scopes.pop()
    }

    /// Whether execution has been stopped (`skip` or host request).
    pub fn stopped(&self) -> bool {
        self.stopped.is_some()
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stopped
    }

    /// Clears the stopped flag; called by the scheduler between activations.
    pub fn reset_stopped(&mut self) {
        self.stopped = None;
    }

    /// Host-requested cancellation.
    pub fn request_stop(&mut self) {
        self.stopped = Some(StopReason::Host);
    }

    // ---- statements ----------------------------------------------------

    pub fn run_code_block(&mut self, ast: &Ast) {
        for kid in &ast.kids {
            if self.loop_ctrl.is_some() || self.stopped.is_some() {
                return;
            }
            self.run_statement(kid);
        }
    }

    pub fn run_statement(&mut self, ast: &Ast) {
        if self.stopped.is_some() {
            return;
        }
        match ast.kind {
            AstKind::CodeBlock => self.run_code_block(ast),
            AstKind::NodeCtxBlock => self.run_node_ctx_block(ast),
            AstKind::Expression => {
                self.run_expression(ast);
            }
            AstKind::IfStmt => self.run_if_stmt(ast),
            AstKind::ForStmt => self.run_for_stmt(ast),
            AstKind::WhileStmt => self.run_while_stmt(ast),
            AstKind::Break => self.loop_ctrl = Some(LoopCtrl::Break),
            AstKind::Continue => self.loop_ctrl = Some(LoopCtrl::Continue),
            AstKind::Skip => self.stopped = Some(StopReason::Skip),
            AstKind::ReportAction => self.run_report_action(ast),
            AstKind::HasStmt | AstKind::CanStmt => match self.scopes.top().and_then(|s| s.has_obj) {
                Some(obj) => {
                    if ast.kind == AstKind::HasStmt {
                        self.run_has_stmt(ast, obj);
                    } else {
                        self.run_can_stmt(ast, obj);
                    }
                }
                None => self.rt_error(
                    RtError::new(
                        RtErrorKind::ForbiddenContext,
                        "declarations require an owning entity",
                    ),
                    ast,
                ),
            },
            _ => self.rt_error(
                RtError::new(
                    RtErrorKind::UnsupportedOperation,
                    format!("this scope cannot execute a statement of type {}", ast.kind),
                ),
                ast,
            ),
        }
    }

    fn run_node_ctx_block(&mut self, ast: &Ast) {
        let names = ast.kids[0].name_list();
        let Some(current) = self.current_node else { return };
        let Some(name) = self.graph.get(current).map(|e| e.name.clone()) else {
            return;
        };
        if names.iter().any(|n| *n == name) {
            self.run_code_block(&ast.kids[1]);
        }
    }

    fn run_if_stmt(&mut self, ast: &Ast) {
        let cond = self.run_expression(&ast.kids[0]).value;
        if cond.truthy(self.heap) {
            self.run_code_block(&ast.kids[1]);
            return;
        }
        for kid in &ast.kids[2..] {
            match kid.kind {
                AstKind::ElifStmt => {
                    let cond = self.run_expression(&kid.kids[0]).value;
                    if cond.truthy(self.heap) {
                        self.run_code_block(&kid.kids[1]);
                        return;
                    }
                }
                AstKind::ElseStmt => {
                    self.run_code_block(&kid.kids[0]);
                    return;
                }
                _ => {}
            }
        }
    }

    fn run_for_stmt(&mut self, ast: &Ast) {
        if ast.kids[0].kind == AstKind::Name {
            self.run_for_in(ast);
        } else {
            self.run_for_to_by(ast);
        }
    }

    /// `for NAME in expr block` - iteration is over lists only.
    fn run_for_in(&mut self, ast: &Ast) {
        let name = ast.kids[0].token_text().to_owned();
        let var = self.get_live_var(&name, true, &ast.kids[0]);
        let iterable = self.run_expression(&ast.kids[1]).value;
        let Value::List(list_id) = iterable else {
            self.rt_error(RtError::type_error("not a list for iteration"), &ast.kids[1]);
            return;
        };
        let items = self.heap.list(list_id).clone();
        for (i, item) in items.into_iter().enumerate() {
            if self.stopped.is_some() {
                break;
            }
            if i >= self.loop_limit {
                self.rt_warn("hit loop limit, breaking", ast);
                break;
            }
            let mut slot = var.clone();
            slot.value = item;
            self.write_place(&slot, ast);
            self.run_code_block(&ast.kids[2]);
            if let Some(LoopCtrl::Break) = self.loop_ctrl.take() {
                break;
            }
        }
    }

    /// `for expr1 to expr2 by expr3 block`.
    fn run_for_to_by(&mut self, ast: &Ast) {
        self.run_expression(&ast.kids[0]);
        let mut loops = 0;
        loop {
            if self.stopped.is_some() {
                break;
            }
            let cond = self.run_expression(&ast.kids[1]).value;
            if !cond.truthy(self.heap) {
                break;
            }
            if loops >= self.loop_limit {
                self.rt_warn("hit loop limit, breaking", ast);
                break;
            }
            self.run_code_block(&ast.kids[3]);
            loops += 1;
            if let Some(LoopCtrl::Break) = self.loop_ctrl.take() {
                break;
            }
            self.run_expression(&ast.kids[2]);
        }
    }

    fn run_while_stmt(&mut self, ast: &Ast) {
        let mut loops = 0;
        loop {
            if self.stopped.is_some() {
                break;
            }
            let cond = self.run_expression(&ast.kids[0]).value;
            if !cond.truthy(self.heap) {
                break;
            }
            if loops >= self.loop_limit {
                self.rt_warn("hit loop limit, breaking", ast);
                break;
            }
            self.run_code_block(&ast.kids[1]);
            loops += 1;
            if let Some(LoopCtrl::Break) = self.loop_ctrl.take() {
                break;
            }
        }
    }

    fn run_report_action(&mut self, ast: &Ast) {
        let value = self.run_expression(&ast.kids[0]).value;
        match self.report_deep_serialize(&value) {
            Ok(doc) => self.report.push(doc),
            Err(err) => self.rt_error(err, ast),
        }
    }

    // ---- declarations --------------------------------------------------

    fn run_has_stmt(&mut self, ast: &Ast, obj: EntityId) {
        let mut is_private = false;
        let mut is_anchor = false;
        for kid in &ast.kids {
            match kid.kind {
                AstKind::Private => is_private = true,
                AstKind::Anchor => is_anchor = true,
                AstKind::HasAssign => {
                    self.run_has_assign(kid, obj, is_private, is_anchor);
                    is_private = false;
                    is_anchor = false;
                }
                _ => {}
            }
        }
    }

    fn run_has_assign(&mut self, ast: &Ast, obj: EntityId, is_private: bool, is_anchor: bool) {
        let name = ast.kids[0].token_text().to_owned();
        let default = if ast.kids.len() > 1 {
            self.run_expression(&ast.kids[1]).value
        } else {
            Value::Str(String::new())
        };
        if is_anchor {
            match self.graph.get_mut(obj) {
                Some(e) if e.kind.supports_anchor() => {
                    // once set, the anchor is immutable
                    if e.anchor.is_none() {
                        e.anchor = Some(name.clone());
                    }
                }
                _ => self.rt_error(
                    RtError::new(RtErrorKind::UnsupportedOperation, "anchors not allowed for this type"),
                    &ast.kids[0],
                ),
            }
        }
        if name == "_private" {
            self.rt_error(
                RtError::new(
                    RtErrorKind::ForbiddenContext,
                    "has variable name of '_private' not allowed",
                ),
                &ast.kids[0],
            );
            return;
        }
        if let Some(e) = self.graph.get_mut(obj) {
            // the default is written only once; later declarations keep the
            // existing value
            if !e.context.contains_key(&name) {
                e.context.insert(name.clone(), default);
            }
        }
        if is_private {
            self.mark_private(obj, &name);
        }
    }

    fn mark_private(&mut self, obj: EntityId, name: &str) {
        let existing = self
            .graph
            .get(obj)
            .and_then(|e| e.context.get("_private"))
            .cloned();
        match existing {
            Some(Value::List(list_id)) => {
                let already = self
                    .heap
                    .list(list_id)
                    .iter()
                    .any(|v| matches!(v, Value::Str(s) if s == name));
                if !already {
                    self.heap.list_mut(list_id).push(Value::Str(name.to_owned()));
                }
            }
            _ => {
                let list_id = self.heap.alloc_list(vec![Value::Str(name.to_owned())]);
                if let Some(e) = self.graph.get_mut(obj) {
                    e.context.insert("_private".to_owned(), Value::List(list_id));
                }
            }
        }
    }

    fn run_can_stmt(&mut self, ast: &Ast, obj: EntityId) {
        let kids = &ast.kids;
        let mut i = 0;
        while i < kids.len() {
            let action_name = match kids[i].kind {
                AstKind::Name => kids[i].token_text().to_owned(),
                AstKind::DottedName => kids[i].dotted_text(),
                _ => {
                    i += 1;
                    continue;
                }
            };
            let name_ast_index = i;
            i += 1;
            let mut preset = None;
            let mut trigger = Trigger::Activity;
            let mut access = vec![];
            if i < kids.len() && kids[i].kind == AstKind::PresetInOut {
                preset = Some(ast_to_ir(&kids[i]));
                i += 1;
            }
            if i < kids.len() && kids[i].kind == AstKind::EventClause {
                (trigger, access) = run_event_clause(&kids[i]);
                i += 1;
            }
            let obj_kind = self.graph.get(obj).map(|e| e.kind);
            if obj_kind != Some(EntityKind::Node) && trigger != Trigger::Activity {
                self.rt_warn("only nodes can have on entry/exit, treating as activity", &kids[name_ast_index]);
                trigger = Trigger::Activity;
            }
            if i < kids.len() && kids[i].kind == AstKind::CodeBlock {
                let action = Action {
                    name: action_name,
                    body: ActionBody::Code(ast_to_ir(&kids[i])),
                    preset_in_out: preset,
                    access_list: access,
                };
                self.add_action(obj, trigger, action);
                break;
            }
            match self.host.get_builtin_action(&action_name) {
                Some(func) => {
                    let action = Action {
                        name: action_name,
                        body: ActionBody::Builtin(func),
                        preset_in_out: preset,
                        access_list: access,
                    };
                    self.add_action(obj, trigger, action);
                }
                None => self.rt_error(
                    RtError::new(
                        RtErrorKind::MissingAbility,
                        format!("builtin action '{action_name}' not found"),
                    ),
                    &kids[name_ast_index],
                ),
            }
        }
    }

    fn add_action(&mut self, obj: EntityId, trigger: Trigger, action: Action) {
        if let Some(e) = self.graph.get_mut(obj) {
            let table = match trigger {
                Trigger::Entry => &mut e.entry_actions,
                Trigger::Exit => &mut e.exit_actions,
                Trigger::Activity => &mut e.activity_actions,
            };
            table.push(action);
        }
    }

    // ---- expressions ---------------------------------------------------

    pub fn run_expression(&mut self, ast: &Ast) -> Place {
        let kids = &ast.kids;
        if kids.len() > 1 {
            match kids[1].kind {
                AstKind::Assignment => {
                    let saved = std::mem::replace(&mut self.assign_mode, true);
                    let dest = self.run_connect(&kids[0]);
                    self.assign_mode = saved;
                    self.run_assignment(&kids[1], dest)
                }
                AstKind::CopyAssign => {
                    let dest = self.run_connect(&kids[0]);
                    self.run_copy_assign(&kids[1], dest)
                }
                AstKind::IncAssign => {
                    let dest = self.run_connect(&kids[0]);
                    self.run_inc_assign(&kids[1], dest)
                }
                _ => self.run_connect(&kids[0]),
            }
        } else {
            self.run_connect(&kids[0])
        }
    }

    fn run_assignment(&mut self, ast: &Ast, mut dest: Place) -> Place {
        let result = self.run_expression(&ast.kids[0]);
        dest.value = result.value;
        self.write_place(&dest, ast);
        dest
    }

    /// `:=` copies each attribute present in both contexts from source to
    /// destination; both sides must be nodes or edges of the same architype.
    fn run_copy_assign(&mut self, ast: &Ast, dest: Place) -> Place {
        let src = self.run_expression(&ast.kids[0]);
        if !self.rt_check_type(&dest.value, &["node", "edge"], ast)
            || !self.rt_check_type(&src.value, &["node", "edge"], &ast.kids[0])
        {
            self.rt_error(
                RtError::type_error("':=' only applies to nodes and edges"),
                ast,
            );
            return dest;
        }
        let (d, s) = (dest.value.as_entity().unwrap(), src.value.as_entity().unwrap());
        let (dest_name, src_name) = (
            self.graph.get(d).map(|e| e.name.clone()).unwrap_or_default(),
            self.graph.get(s).map(|e| e.name.clone()).unwrap_or_default(),
        );
        if dest_name != src_name {
            self.rt_error(
                RtError::new(
                    RtErrorKind::ArchetypeMismatch,
                    format!("architype '{dest_name}' does not match '{src_name}'"),
                ),
                &ast.kids[0],
            );
            return dest;
        }
        let src_ctx = self.graph.get(s).map(|e| e.context.clone()).unwrap_or_default();
        if let Some(e) = self.graph.get_mut(d) {
            for (key, value) in src_ctx {
                if e.context.contains_key(&key) {
                    e.context.insert(key, value);
                }
            }
        }
        dest
    }

    fn run_inc_assign(&mut self, ast: &Ast, mut dest: Place) -> Place {
        let rhs = self.run_expression(&ast.kids[1]).value;
        let computed = match ast.kids[0].kind {
            AstKind::AddEq => dest.value.add(&rhs, self.heap),
            AstKind::SubEq => dest.value.sub(&rhs),
            AstKind::MulEq => dest.value.mul(&rhs),
            AstKind::DivEq => dest.value.div(&rhs),
            _ => Err(RtError::new(RtErrorKind::UnsupportedOperation, "unknown compound assignment")),
        };
        match computed {
            Ok(value) => {
                dest.value = value;
                self.write_place(&dest, ast);
            }
            Err(err) => self.rt_error(err, ast),
        }
        dest
    }

    /// Connect: `A <edge_op> B` attaches fresh edges pairwise; with a leading
    /// `NOT` it detaches matching edges pairwise instead.
    fn run_connect(&mut self, ast: &Ast) -> Place {
        let kids = &ast.kids;
        if kids.len() < 2 {
            return self.run_logical(&kids[0]);
        }
        let bret = self.run_logical(&kids[0]);
        let Some(edge_ast) = kids
            .iter()
            .find(|k| matches!(k.kind, AstKind::EdgeTo | AstKind::EdgeFrom | AstKind::EdgeAny))
        else {
            return bret;
        };
        let detach = kids.iter().any(|k| k.kind == AstKind::Not);
        let tret = self.run_expression(kids.last().expect("connect has a target"));
        self.rt_check_type(&bret.value, &["node", "set"], &kids[0]);
        self.rt_check_type(&tret.value, &["node", "set"], ast);
        let base = self.as_node_set(&bret.value);
        let target = self.as_node_set(&tret.value);
        if detach {
            let name_filter = edge_name_filter(edge_ast);
            for b in base.iter() {
                for t in target.iter() {
                    let candidates = self.edges_by_direction(b, edge_ast.kind, name_filter.as_deref());
                    let removed = self.graph.detach_edges(b, t, &candidates);
                    log::trace!("detached {removed} edge(s)");
                }
            }
            return bret;
        }
        for t in target.iter() {
            for b in base.iter() {
                let edge = self.spawn_edge(edge_ast);
                match edge_ast.kind {
                    AstKind::EdgeFrom => self.graph.attach_inbound(b, t, edge),
                    AstKind::EdgeTo => self.graph.attach_outbound(b, t, edge),
                    _ => self.graph.attach_bidirected(b, t, edge),
                }
            }
        }
        tret
    }

    fn as_node_set(&self, value: &Value) -> EntitySet {
        match value {
            Value::Entity(id) if self.graph.get(*id).is_some_and(|e| e.kind == EntityKind::Node) => {
                EntitySet::single(*id)
            }
            Value::Set(set) => set.clone(),
            _ => EntitySet::new(),
        }
    }

    /// Edges incident to `node` in the direction an edge reference names,
    /// optionally filtered by edge architype name.
    fn edges_by_direction(&self, node: EntityId, direction: AstKind, name: Option<&str>) -> Vec<EntityId> {
        let mut edges = match direction {
            AstKind::EdgeTo => {
                let mut e = self.graph.outbound_edges(node);
                e.extend(self.graph.bidirected_edges(node));
                e
            }
            AstKind::EdgeFrom => {
                let mut e = self.graph.inbound_edges(node);
                e.extend(self.graph.bidirected_edges(node));
                e
            }
            _ => self.graph.attached_edges(node),
        };
        if let Some(name) = name {
            edges.retain(|id| self.graph.get(*id).is_some_and(|e| e.name == name));
        }
        edges
    }

    fn run_logical(&mut self, ast: &Ast) -> Place {
        let kids = &ast.kids;
        let mut result = self.run_compare(&kids[0]);
        let mut i = 1;
        while let Some(rhs_ast) = kids.get(i + 1) {
            match kids[i].kind {
                AstKind::And => {
                    // short-circuit: the right operand runs only when the
                    // left is truthy; the result is the determining operand
                    if result.value.truthy(self.heap) {
                        let rhs = self.run_compare(rhs_ast);
                        result = Place::rvalue(rhs.value);
                    }
                }
                AstKind::Or => {
                    if !result.value.truthy(self.heap) {
                        let rhs = self.run_compare(rhs_ast);
                        result = Place::rvalue(rhs.value);
                    }
                }
                _ => {}
            }
            i += 2;
        }
        result
    }

    fn run_compare(&mut self, ast: &Ast) -> Place {
        let kids = &ast.kids;
        if kids[0].kind == AstKind::Not {
            let operand = self.run_compare(&kids[1]);
            let negated = !operand.value.truthy(self.heap);
            return Place::rvalue(Value::Bool(negated));
        }
        let mut result = self.run_arithmetic(&kids[0]);
        let mut i = 1;
        // chained comparisons left-fold: `a < b < c` is `(a < b) < c`
        while let Some(rhs_ast) = kids.get(i + 1) {
            let rhs = self.run_arithmetic(rhs_ast);
            let value = self.eval_cmp_op(&kids[i], &result.value, &rhs.value);
            result = Place::rvalue(value);
            i += 2;
        }
        result
    }

    fn eval_cmp_op(&mut self, op_ast: &Ast, left: &Value, right: &Value) -> Value {
        use std::cmp::Ordering;
        let op = op_ast.kids.first().map_or(op_ast.kind, |k| k.kind);
        let ordering = |this: &mut Self, test: fn(Ordering) -> bool| match left.partial_cmp_value(right, this.heap) {
            Some(ord) => Value::Bool(test(ord)),
            None => {
                let msg = format!(
                    "cannot compare {} and {}",
                    left.type_name(this.graph),
                    right.type_name(this.graph)
                );
                this.rt_error(RtError::type_error(msg), op_ast);
                Value::Bool(false)
            }
        };
        match op {
            AstKind::CmpEq => Value::Bool(left.eq_value(right, self.heap)),
            AstKind::CmpNe => Value::Bool(!left.eq_value(right, self.heap)),
            AstKind::CmpLt => ordering(self, Ordering::is_lt),
            AstKind::CmpGt => ordering(self, Ordering::is_gt),
            AstKind::CmpLte => ordering(self, Ordering::is_le),
            AstKind::CmpGte => ordering(self, Ordering::is_ge),
            AstKind::CmpIn => self.eval_membership(left, right, false, op_ast),
            AstKind::CmpNin => self.eval_membership(left, right, true, op_ast),
            _ => {
                self.rt_error(
                    RtError::new(RtErrorKind::UnsupportedOperation, "unknown comparison operator"),
                    op_ast,
                );
                Value::Bool(false)
            }
        }
    }

    fn eval_membership(&mut self, needle: &Value, haystack: &Value, negate: bool, at: &Ast) -> Value {
        match haystack.contains(needle, self.heap) {
            Ok(found) => Value::Bool(found != negate),
            Err(err) => {
                self.rt_error(err, at);
                Value::Bool(false)
            }
        }
    }

    fn run_arithmetic(&mut self, ast: &Ast) -> Place {
        let kids = &ast.kids;
        let mut result = self.run_term(&kids[0]);
        let mut i = 1;
        while let Some(rhs_ast) = kids.get(i + 1) {
            let rhs = self.run_term(rhs_ast);
            let computed = match kids[i].kind {
                AstKind::Add => result.value.add(&rhs.value, self.heap),
                AstKind::Sub => result.value.sub(&rhs.value),
                _ => Err(RtError::new(RtErrorKind::UnsupportedOperation, "unknown operator")),
            };
            result = self.fold_result(computed, ast);
            i += 2;
        }
        result
    }

    fn run_term(&mut self, ast: &Ast) -> Place {
        let kids = &ast.kids;
        let mut result = self.run_factor(&kids[0]);
        let mut i = 1;
        while let Some(rhs_ast) = kids.get(i + 1) {
            let rhs = self.run_factor(rhs_ast);
            let computed = match kids[i].kind {
                AstKind::Mul => result.value.mul(&rhs.value),
                AstKind::Div => result.value.div(&rhs.value),
                AstKind::Mod => result.value.modulo(&rhs.value),
                _ => Err(RtError::new(RtErrorKind::UnsupportedOperation, "unknown operator")),
            };
            result = self.fold_result(computed, ast);
            i += 2;
        }
        result
    }

    fn run_factor(&mut self, ast: &Ast) -> Place {
        let kids = &ast.kids;
        match kids[0].kind {
            AstKind::Sub => {
                let operand = self.run_factor(&kids[1]);
                let computed = operand.value.neg();
                self.fold_result(computed, ast)
            }
            // unary plus passes the operand through unchanged
            AstKind::Add => self.run_factor(&kids[1]),
            _ => self.run_power(&kids[0]),
        }
    }

    fn run_power(&mut self, ast: &Ast) -> Place {
        let kids = &ast.kids;
        let mut result = self.run_func_call(&kids[0]);
        let mut i = 1;
        while let Some(rhs_ast) = kids.get(i + 1) {
            let rhs = self.run_factor(rhs_ast);
            let computed = result.value.pow(&rhs.value);
            result = self.fold_result(computed, ast);
            i += 2;
        }
        result
    }

    fn fold_result(&mut self, computed: RtResult<Value>, at: &Ast) -> Place {
        match computed {
            Ok(value) => Place::rvalue(value),
            Err(err) => {
                self.rt_error(err, at);
                Place::rvalue(Value::Null)
            }
        }
    }

    fn run_func_call(&mut self, ast: &Ast) -> Place {
        let kids = &ast.kids;
        let mut next = 0;
        let atom_res = if kids.first().is_some_and(|k| k.kind == AstKind::Atom) {
            next = 1;
            self.run_atom(&kids[0])
        } else {
            // a bare `::name` call targets the owning entity
            let has_obj = self.scopes.top().and_then(|s| s.has_obj);
            Place::rvalue(has_obj.map_or(Value::Null, Value::Entity))
        };
        let Some(call) = kids.get(next) else {
            return atom_res;
        };
        match call.kind {
            AstKind::AbilityCall => {
                let name = call.kids[0].token_text().to_owned();
                let Some(entity) = atom_res.value.as_entity() else {
                    self.rt_error(
                        RtError::type_error("ability call target is not an entity"),
                        call,
                    );
                    return Place::rvalue(Value::Null);
                };
                if let Some(ctx) = call.kids.iter().find(|k| k.kind == AstKind::SpawnCtx) {
                    self.run_spawn_ctx(ctx, entity);
                }
                self.call_ability(entity, &name, call);
                atom_res
            }
            AstKind::ParenCall => {
                let args = match call.kids.first() {
                    Some(list) if list.kind == AstKind::ExprList => self.run_expr_list(list),
                    _ => vec![],
                };
                match &atom_res.value {
                    Value::Action(action) => {
                        let action = action.clone();
                        self.trigger_action(&action, &args, call)
                    }
                    other => {
                        let msg = format!("unable to execute a {} as an action", other.type_name(self.graph));
                        self.rt_error(RtError::type_error(msg), call);
                        Place::rvalue(Value::Null)
                    }
                }
            }
            _ => atom_res,
        }
    }

    fn trigger_action(&mut self, action: &Action, args: &[Value], at: &Ast) -> Place {
        match &action.body {
            ActionBody::Builtin(func) => match func(args, self.heap) {
                Ok(value) => Place::rvalue(value),
                Err(err) => {
                    self.rt_error(err, at);
                    Place::rvalue(Value::Null)
                }
            },
            ActionBody::Code(_) => {
                self.rt_error(
                    RtError::new(
                        RtErrorKind::UnsupportedOperation,
                        format!("ability '{}' is invoked with '::', not '()'", action.name),
                    ),
                    at,
                );
                Place::rvalue(Value::Null)
            }
        }
    }

    fn run_atom(&mut self, ast: &Ast) -> Place {
        let kids = &ast.kids;
        match kids[0].kind {
            AstKind::Int => match kids[0].token_text().parse::<i64>() {
                Ok(i) => Place::rvalue(Value::Int(i)),
                Err(_) => {
                    self.rt_error(RtError::type_error("invalid integer literal"), &kids[0]);
                    Place::rvalue(Value::Null)
                }
            },
            AstKind::Float => match kids[0].token_text().parse::<f64>() {
                Ok(f) => Place::rvalue(Value::Float(f)),
                Err(_) => {
                    self.rt_error(RtError::type_error("invalid float literal"), &kids[0]);
                    Place::rvalue(Value::Null)
                }
            },
            AstKind::Str => Place::rvalue(Value::Str(kids[0].token_text().to_owned())),
            AstKind::Bool => Place::rvalue(Value::Bool(kids[0].token_text() == "true")),
            AstKind::DottedName => {
                let name = kids[0].dotted_text();
                self.get_live_var(&name, self.assign_mode, &kids[0])
            }
            AstKind::Expression => self.run_expression(&kids[0]),
            AstKind::ListVal => self.run_list_val(&kids[0]),
            AstKind::DictVal => self.run_dict_val(&kids[0]),
            AstKind::NodeEdgeRef => self.run_node_edge_ref(&kids[0]),
            AstKind::Spawn => self.run_spawn(&kids[0]),
            AstKind::Deref => {
                let result = self.run_expression(&kids[1]);
                if let Some(entity) = result.value.as_entity() {
                    if let Some(e) = self.graph.get(entity) {
                        return Place::rvalue(Value::Str(e.jid.to_string()));
                    }
                }
                self.rt_error(RtError::type_error("'&' applies to graph entities"), &kids[1]);
                result
            }
            AstKind::Atom => {
                let base = self.run_atom(&kids[0]);
                match kids[1].kind {
                    AstKind::FuncBuiltIn => self.run_func_built_in(base, &kids[1]),
                    AstKind::Index => {
                        let mut place = base;
                        for idx_ast in &kids[1..] {
                            if idx_ast.kind != AstKind::Index {
                                continue;
                            }
                            match self.index_place(place, idx_ast) {
                                Some(next) => place = next,
                                None => return Place::rvalue(Value::Null),
                            }
                        }
                        place.value = self.reference_to_value(place.value);
                        place
                    }
                    _ => base,
                }
            }
            _ => {
                self.rt_error(
                    RtError::new(
                        RtErrorKind::UnsupportedOperation,
                        format!("cannot evaluate an atom of type {}", kids[0].kind),
                    ),
                    ast,
                );
                Place::rvalue(Value::Null)
            }
        }
    }

    fn run_index(&mut self, ast: &Ast) -> Option<IndexKey> {
        let value = self.run_expression(&ast.kids[0]).value;
        match value {
            Value::Int(i) => Some(IndexKey::Int(i)),
            Value::Bool(b) => Some(IndexKey::Int(i64::from(b))),
            Value::Str(s) => Some(IndexKey::Str(s)),
            other => {
                let msg = format!(
                    "index of type {} not valid, indices must be an integer or string",
                    other.type_name(self.graph)
                );
                self.rt_error(RtError::type_error(msg), ast);
                None
            }
        }
    }

    /// Each applied index yields a fresh Place bound to the container slot.
    fn index_place(&mut self, base: Place, idx_ast: &Ast) -> Option<Place> {
        let key = self.run_index(idx_ast)?;
        match (&base.value, key) {
            (Value::List(list_id), IndexKey::Int(raw)) => {
                let items = self.heap.list(*list_id);
                let len = items.len() as i64;
                let actual = if raw < 0 { len + raw } else { raw };
                if actual < 0 || actual >= len {
                    self.rt_error(
                        RtError::new(RtErrorKind::IndexError, format!("list index {raw} out of range")),
                        idx_ast,
                    );
                    return None;
                }
                let index = actual as usize;
                let value = items[index].clone();
                Some(Place::bound(value, Binding::ListSlot { list: *list_id, index }))
            }
            (Value::Map(map_id), IndexKey::Str(key)) => {
                let value = self.heap.map(*map_id).get(&key).cloned().unwrap_or(Value::Null);
                Some(Place::bound(value, Binding::MapSlot { map: *map_id, key }))
            }
            (Value::List(_), IndexKey::Str(_)) => {
                self.rt_error(RtError::type_error("list indices must be integers"), idx_ast);
                None
            }
            (Value::Map(_), IndexKey::Int(_)) => {
                self.rt_error(RtError::type_error("map keys must be strings"), idx_ast);
                None
            }
            (other, _) => {
                let msg = format!("cannot index into a {}", other.type_name(self.graph));
                self.rt_error(RtError::type_error(msg), idx_ast);
                None
            }
        }
    }

    fn run_func_built_in(&mut self, atom_res: Place, ast: &Ast) -> Place {
        let kids = &ast.kids;
        match kids[0].kind {
            AstKind::Length => match &atom_res.value {
                Value::List(id) => Place::rvalue(Value::Int(self.heap.list(*id).len() as i64)),
                other => {
                    let msg = format!("cannot get length of a {}, not a list", other.type_name(self.graph));
                    self.rt_error(RtError::type_error(msg), ast);
                    Place::rvalue(Value::Int(0))
                }
            },
            AstKind::Keys => match &atom_res.value {
                Value::Map(id) => {
                    let keys: Vec<Value> = self.heap.map(*id).keys().map(|k| Value::Str(k.clone())).collect();
                    Place::rvalue(Value::List(self.heap.alloc_list(keys)))
                }
                other => {
                    let msg = format!("cannot get keys of a {}, not a map", other.type_name(self.graph));
                    self.rt_error(RtError::type_error(msg), ast);
                    Place::rvalue(Value::List(self.heap.alloc_list(vec![])))
                }
            },
            AstKind::Edge => self.project_edges(atom_res, ast),
            AstKind::Node => self.project_nodes(atom_res, ast),
            AstKind::Context => {
                if self.rt_check_type(&atom_res.value, &["node", "edge", "walker"], ast) {
                    let entity = atom_res.value.as_entity().unwrap();
                    let ctx = self
                        .graph
                        .get(entity)
                        .map(|e| e.context.clone())
                        .unwrap_or_default();
                    Place::rvalue(Value::Map(self.heap.alloc_map(ctx)))
                } else {
                    atom_res
                }
            }
            AstKind::Info => self.serialize_entity(atom_res, false, ast),
            AstKind::Details => self.serialize_entity(atom_res, true, ast),
            AstKind::Destroy => {
                let index = self.run_expression(&kids[1]).value;
                match (&atom_res.value, &index) {
                    (Value::List(list_id), Value::Int(raw)) => {
                        let len = self.heap.list(*list_id).len() as i64;
                        let actual = if *raw < 0 { len + raw } else { *raw };
                        if actual < 0 || actual >= len {
                            self.rt_error(
                                RtError::new(RtErrorKind::IndexError, format!("list index {raw} out of range")),
                                ast,
                            );
                        } else {
                            self.heap.list_mut(*list_id).remove(actual as usize);
                        }
                        atom_res
                    }
                    _ => {
                        self.rt_error(
                            RtError::type_error("destroy removes an integer index from a list"),
                            ast,
                        );
                        atom_res
                    }
                }
            }
            _ => atom_res,
        }
    }

    /// `x.edge` projects to edges: a node yields the edges between it and the
    /// current node, an edge passes through, a set projects element-wise.
    fn project_edges(&mut self, atom_res: Place, at: &Ast) -> Place {
        let entity_kind = |this: &Self, id: EntityId| this.graph.get(id).map(|e| e.kind);
        match &atom_res.value {
            Value::Entity(id) => match entity_kind(self, *id) {
                Some(EntityKind::Edge) => atom_res,
                Some(EntityKind::Node) => match self.current_node {
                    Some(current) => {
                        let set: EntitySet = self.graph.attached_edges_between(current, *id).into_iter().collect();
                        Place::rvalue(Value::Set(set))
                    }
                    None => {
                        self.rt_error(
                            RtError::new(RtErrorKind::UnsupportedOperation, "no current node"),
                            at,
                        );
                        Place::rvalue(Value::Set(EntitySet::new()))
                    }
                },
                _ => {
                    self.rt_error(RtError::type_error("cannot get edges from this value"), at);
                    atom_res
                }
            },
            Value::Set(set) => {
                let members: Vec<EntityId> = set.iter().collect();
                let mut out = EntitySet::new();
                for id in members {
                    match entity_kind(self, id) {
                        Some(EntityKind::Edge) => {
                            out.add(id);
                        }
                        Some(EntityKind::Node) => {
                            if let Some(current) = self.current_node {
                                for e in self.graph.attached_edges_between(current, id) {
                                    out.add(e);
                                }
                            }
                        }
                        _ => {}
                    }
                }
                Place::rvalue(Value::Set(out))
            }
            other => {
                let msg = format!("cannot get edges from a {}", other.type_name(self.graph));
                self.rt_error(RtError::type_error(msg), at);
                atom_res
            }
        }
    }

    /// `x.node` projects to nodes: an edge yields both endpoints, a node
    /// passes through, a set projects element-wise.
    fn project_nodes(&mut self, atom_res: Place, at: &Ast) -> Place {
        let endpoints = |this: &Self, edge: EntityId| -> Vec<EntityId> {
            this.graph
                .get(edge)
                .map(|e| [e.from_node, e.to_node].into_iter().flatten().collect())
                .unwrap_or_default()
        };
        match &atom_res.value {
            Value::Entity(id) => match self.graph.get(*id).map(|e| e.kind) {
                Some(EntityKind::Node) => atom_res,
                Some(EntityKind::Edge) => {
                    let set: EntitySet = endpoints(self, *id).into_iter().collect();
                    Place::rvalue(Value::Set(set))
                }
                _ => {
                    self.rt_error(RtError::type_error("cannot get nodes from this value"), at);
                    atom_res
                }
            },
            Value::Set(set) => {
                let members: Vec<EntityId> = set.iter().collect();
                let mut out = EntitySet::new();
                for id in members {
                    match self.graph.get(id).map(|e| e.kind) {
                        Some(EntityKind::Node) => {
                            out.add(id);
                        }
                        Some(EntityKind::Edge) => {
                            for n in endpoints(self, id) {
                                out.add(n);
                            }
                        }
                        _ => {}
                    }
                }
                Place::rvalue(Value::Set(out))
            }
            other => {
                let msg = format!("cannot get nodes from a {}", other.type_name(self.graph));
                self.rt_error(RtError::type_error(msg), at);
                atom_res
            }
        }
    }

    fn serialize_entity(&mut self, atom_res: Place, detailed: bool, at: &Ast) -> Place {
        if !self.rt_check_type(&atom_res.value, &["node", "edge", "walker"], at) {
            return atom_res;
        }
        let entity = atom_res.value.as_entity().unwrap();
        match self.graph.entity_doc(entity, detailed, self.heap) {
            Ok(doc) => Place::rvalue(json_to_value(&doc, self.heap)),
            Err(err) => {
                self.rt_error(err, at);
                Place::rvalue(Value::Null)
            }
        }
    }

    fn run_list_val(&mut self, ast: &Ast) -> Place {
        let values = match ast.kids.first() {
            Some(list) if list.kind == AstKind::ExprList => self.run_expr_list(list),
            _ => vec![],
        };
        Place::rvalue(Value::List(self.heap.alloc_list(values)))
    }

    fn run_dict_val(&mut self, ast: &Ast) -> Place {
        let mut map = indexmap::IndexMap::new();
        for kid in &ast.kids {
            if kid.kind == AstKind::KvPair {
                let key = kid.kids[0].token_text().to_owned();
                let value = self.run_expression(&kid.kids[1]).value;
                map.insert(key, value);
            }
        }
        Place::rvalue(Value::Map(self.heap.alloc_map(map)))
    }

    fn run_expr_list(&mut self, ast: &Ast) -> Vec<Value> {
        ast.kids
            .iter()
            .filter(|k| k.kind == AstKind::Expression)
            .map(|k| self.run_expression(k).value)
            .collect::<Vec<_>>()
    }

    // ---- graph references ----------------------------------------------

    fn run_node_edge_ref(&mut self, ast: &Ast) -> Place {
        let kids = &ast.kids;
        match kids[0].kind {
            AstKind::NodeRef => {
                let mut result = self.query_node_ref(&kids[0]);
                if let Some(filter) = kids.get(1).filter(|k| k.kind == AstKind::FilterCtx) {
                    result = self.run_filter_ctx(filter, &result);
                }
                Place::rvalue(Value::Set(result))
            }
            AstKind::EdgeTo | AstKind::EdgeFrom | AstKind::EdgeAny => {
                let edges = self.query_edge_ref(&kids[0]);
                let mut result = self.edge_set_to_nodes(&edges);
                if let Some(node_ref) = kids.get(1).filter(|k| k.kind == AstKind::NodeRef) {
                    let mut nres = self.query_node_ref(node_ref);
                    if let Some(filter) = kids.get(2).filter(|k| k.kind == AstKind::FilterCtx) {
                        nres = self.run_filter_ctx(filter, &nres);
                    }
                    result = result.intersect(&nres);
                }
                Place::rvalue(Value::Set(result))
            }
            _ => Place::rvalue(Value::Set(EntitySet::new())),
        }
    }

    /// The set of nodes the walker may currently consider: everything one
    /// outbound or bidirected hop away from the node it is standing on.
    fn viable_nodes(&self) -> EntitySet {
        let Some(current) = self.current_node else {
            return EntitySet::new();
        };
        let mut set = EntitySet::new();
        let mut edges = self.graph.outbound_edges(current);
        edges.extend(self.graph.bidirected_edges(current));
        for edge in edges {
            for node in self.graph.far_end(edge, current) {
                set.add(node);
            }
        }
        set
    }

    /// `node::Name` in query position filters the viable node set.
    fn query_node_ref(&mut self, ast: &Ast) -> EntitySet {
        let viable = self.viable_nodes();
        match ast.kids.first().filter(|k| k.kind == AstKind::Name) {
            Some(name_kid) => {
                let name = name_kid.token_text();
                viable
                    .iter()
                    .filter(|id| self.graph.get(*id).is_some_and(|e| e.name == name))
                    .collect()
            }
            None => viable,
        }
    }

    /// Evaluates an edge reference in query position: the matching edges
    /// incident to the current node.
    fn query_edge_ref(&mut self, ast: &Ast) -> EntitySet {
        if self.current_node.is_none() {
            self.rt_error(
                RtError::new(RtErrorKind::UnsupportedOperation, "no current node for edge reference"),
                ast,
            );
            return EntitySet::new();
        }
        let current = self.current_node.unwrap();
        let name = edge_name_filter(ast);
        let edges = self.edges_by_direction(current, ast.kind, name.as_deref());
        let mut set: EntitySet = edges.into_iter().collect();
        if let Some(filter) = ast.kids.iter().find(|k| k.kind == AstKind::FilterCtx) {
            set = self.run_filter_ctx(filter, &set);
        }
        if ast.kids.iter().any(|k| k.kind == AstKind::SpawnCtx) {
            self.rt_error(
                RtError::new(RtErrorKind::ForbiddenContext, "assigning values not allowed here"),
                ast,
            );
        }
        set
    }

    /// Projects an edge set to the endpoints reachable across those edges,
    /// relative to the current node.
    fn edge_set_to_nodes(&self, edges: &EntitySet) -> EntitySet {
        let mut out = EntitySet::new();
        for edge in edges.iter() {
            match self.current_node {
                Some(current) => {
                    for node in self.graph.far_end(edge, current) {
                        out.add(node);
                    }
                }
                None => {
                    if let Some(e) = self.graph.get(edge) {
                        for node in [e.from_node, e.to_node].into_iter().flatten() {
                            out.add(node);
                        }
                    }
                }
            }
        }
        out
    }

    /// A filter context retains members where any listed comparison matches.
    fn run_filter_ctx(&mut self, ast: &Ast, obj: &EntitySet) -> EntitySet {
        let mut ret = EntitySet::new();
        let members: Vec<EntityId> = obj.iter().collect();
        for id in members {
            for kid in &ast.kids {
                if kid.kind == AstKind::FilterCompare && self.run_filter_compare(kid, id) {
                    ret.add(id);
                }
            }
        }
        ret
    }

    fn run_filter_compare(&mut self, ast: &Ast, id: EntityId) -> bool {
        let name = ast.kids[0].token_text().to_owned();
        let Some(value) = self.graph.get(id).and_then(|e| e.context.get(&name)).cloned() else {
            self.rt_error(RtError::undefined(&name), &ast.kids[0]);
            return false;
        };
        let rhs = self.run_expression(&ast.kids[2]).value;
        let result = self.eval_cmp_op(&ast.kids[1], &value, &rhs);
        result.truthy(self.heap)
    }

    // ---- spawning ------------------------------------------------------

    fn run_spawn(&mut self, ast: &Ast) -> Place {
        let kids = &ast.kids;
        if kids[0].kind == AstKind::Expression {
            let location = self.run_expression(&kids[0]).value;
            match &location {
                Value::Entity(id) if self.graph.get(*id).is_some_and(|e| e.kind == EntityKind::Node) => {
                    self.run_spawn_object(&kids[1], Some(*id))
                }
                Value::Set(set) => {
                    // broadcast element-wise, collecting per-element results
                    let members: Vec<EntityId> = set.iter().collect();
                    let mut results = vec![];
                    for id in members {
                        results.push(self.run_spawn_object(&kids[1], Some(id)).value);
                    }
                    Place::rvalue(Value::List(self.heap.alloc_list(results)))
                }
                other => {
                    let msg = format!("spawn cannot occur on a {}", other.type_name(self.graph));
                    self.rt_error(RtError::new(RtErrorKind::UnsupportedOperation, msg), &kids[0]);
                    Place::rvalue(Value::Null)
                }
            }
        } else {
            self.run_spawn_object(&kids[0], None)
        }
    }

    fn run_spawn_object(&mut self, ast: &Ast, location: Option<EntityId>) -> Place {
        match ast.kind {
            AstKind::NodeSpawn => self.run_node_spawn(ast, location),
            AstKind::WalkerSpawn => self.run_walker_spawn(ast, location),
            AstKind::GraphSpawn => self.run_graph_spawn(ast, location),
            _ => {
                self.rt_error(
                    RtError::new(RtErrorKind::UnsupportedOperation, "unknown spawn object"),
                    ast,
                );
                Place::rvalue(Value::Null)
            }
        }
    }

    fn run_node_spawn(&mut self, ast: &Ast, location: Option<EntityId>) -> Place {
        let kids = &ast.kids;
        let (edge_ast, node_ref_index) = if matches!(kids[0].kind, AstKind::EdgeTo | AstKind::EdgeFrom | AstKind::EdgeAny)
        {
            (Some(&kids[0]), 1)
        } else {
            (None, 0)
        };
        let new_node = self.spawn_node_ref(&kids[node_ref_index]);
        if let Some(edge_ast) = edge_ast {
            match location {
                Some(loc) => {
                    let edge = self.spawn_edge(edge_ast);
                    match edge_ast.kind {
                        AstKind::EdgeFrom => self.graph.attach_inbound(loc, new_node, edge),
                        AstKind::EdgeTo => self.graph.attach_outbound(loc, new_node, edge),
                        _ => self.graph.attach_bidirected(loc, new_node, edge),
                    }
                }
                None => self.rt_error(
                    RtError::new(RtErrorKind::UnsupportedOperation, "no location to attach the spawned node to"),
                    edge_ast,
                ),
            }
        }
        if let Some(ctx) = kids.last().filter(|k| k.kind == AstKind::SpawnCtx) {
            self.run_spawn_ctx(ctx, new_node);
        }
        Place::rvalue(Value::Entity(new_node))
    }

    /// `node::Name` in spawn position instantiates a fresh node.
    fn spawn_node_ref(&mut self, ast: &Ast) -> EntityId {
        match ast.kids.first().filter(|k| k.kind == AstKind::Name) {
            Some(name_kid) => {
                let name = name_kid.token_text().to_owned();
                match self
                    .host
                    .run_architype(&name, EntityKind::Node, self.graph, self.heap, self.sink)
                {
                    Some(id) => id,
                    None => {
                        self.rt_error(
                            RtError::new(
                                RtErrorKind::MissingAbility,
                                format!("node architype '{name}' not available"),
                            ),
                            ast,
                        );
                        self.graph.create(EntityKind::Node, name)
                    }
                }
            }
            None => self.graph.create(EntityKind::Node, "generic"),
        }
    }

    /// Evaluates an edge reference in spawn position: a fresh edge entity.
    fn spawn_edge(&mut self, ast: &Ast) -> EntityId {
        match ast.kids.first().filter(|k| k.kind == AstKind::Name) {
            Some(name_kid) => {
                let name = name_kid.token_text().to_owned();
                let edge = match self
                    .host
                    .run_architype(&name, EntityKind::Edge, self.graph, self.heap, self.sink)
                {
                    Some(id) => id,
                    None => {
                        self.rt_error(
                            RtError::new(
                                RtErrorKind::MissingAbility,
                                format!("edge architype '{name}' not available"),
                            ),
                            ast,
                        );
                        self.graph.create(EntityKind::Edge, name)
                    }
                };
                for kid in &ast.kids[1..] {
                    match kid.kind {
                        AstKind::SpawnCtx => self.run_spawn_ctx(kid, edge),
                        AstKind::FilterCtx => self.rt_error(
                            RtError::new(RtErrorKind::ForbiddenContext, "filtering not allowed here"),
                            kid,
                        ),
                        _ => {}
                    }
                }
                edge
            }
            None => self.graph.create(EntityKind::Edge, "generic"),
        }
    }

    fn run_walker_spawn(&mut self, ast: &Ast, location: Option<EntityId>) -> Place {
        let kids = &ast.kids;
        let name = kids[0].kids[0].token_text().to_owned();
        let Some(walker) = self
            .host
            .spawn_walker(&name, self.graph, self.heap, self.sink)
        else {
            self.rt_error(
                RtError::new(
                    RtErrorKind::MissingAbility,
                    format!("walker architype '{name}' not available"),
                ),
                &kids[0],
            );
            return Place::rvalue(Value::Null);
        };
        let Some(loc) = location else {
            self.rt_error(
                RtError::new(RtErrorKind::UnsupportedOperation, "walker spawn requires a node location"),
                ast,
            );
            self.host.destroy(walker, self.graph);
            return Place::rvalue(Value::Null);
        };
        self.host.prime(walker, loc);
        if let Some(ctx) = kids.get(1).filter(|k| k.kind == AstKind::SpawnCtx) {
            self.run_spawn_ctx(ctx, walker);
        }
        self.host.run(walker, self.graph, self.heap, self.sink);
        let anchor = self.reference_to_value(self.graph.anchor_value(walker));
        let mut reports = self.host.take_report(walker);
        self.report.append(&mut reports);
        self.host.destroy(walker, self.graph);
        Place::rvalue(anchor)
    }

    fn run_graph_spawn(&mut self, ast: &Ast, location: Option<EntityId>) -> Place {
        let kids = &ast.kids;
        let edge = self.spawn_edge(&kids[0]);
        let name = kids[1].kids[0].token_text().to_owned();
        let Some(root) = self
            .host
            .run_architype(&name, EntityKind::Graph, self.graph, self.heap, self.sink)
        else {
            self.rt_error(
                RtError::new(
                    RtErrorKind::MissingAbility,
                    format!("graph architype '{name}' not available"),
                ),
                &kids[1],
            );
            return Place::rvalue(Value::Null);
        };
        match location {
            Some(loc) => match kids[0].kind {
                AstKind::EdgeFrom => self.graph.attach_inbound(loc, root, edge),
                AstKind::EdgeTo => self.graph.attach_outbound(loc, root, edge),
                _ => self.graph.attach_bidirected(loc, root, edge),
            },
            None => self.rt_error(
                RtError::new(RtErrorKind::UnsupportedOperation, "no location to attach the spawned graph to"),
                ast,
            ),
        }
        Place::rvalue(Value::Entity(root))
    }

    /// Applies a spawn context's assignments to a fresh entity's context.
    pub fn run_spawn_ctx(&mut self, ast: &Ast, obj: EntityId) {
        for kid in &ast.kids {
            if kid.kind == AstKind::SpawnAssign {
                self.run_spawn_assign(kid, obj);
            }
        }
    }

    fn run_spawn_assign(&mut self, ast: &Ast, obj: EntityId) {
        let name = ast.kids[0].token_text().to_owned();
        let allowed = self
            .graph
            .get(obj)
            .is_some_and(|e| e.context.contains_key(&name) || e.kind == EntityKind::Walker);
        if allowed {
            let value = self.run_expression(&ast.kids[1]).value;
            if let Some(e) = self.graph.get_mut(obj) {
                e.context.insert(name, value);
            }
        } else {
            self.rt_error(
                RtError::new(RtErrorKind::UndefinedName, format!("'{name}' not present in object")),
                &ast.kids[0],
            );
        }
    }

    // ---- variables and abilities ---------------------------------------

    /// Constructs or reads a Place for a dotted name against the current
    /// scope chain: locals, then owning-entity contexts, then ability
    /// tables, then host builtin actions. In create mode a missing name
    /// becomes a fresh binding in the innermost scope.
    pub fn get_live_var(&mut self, name: &str, create: bool, at: &Ast) -> Place {
        let mut local_hit = None;
        for (depth, scope) in self.scopes.iter_top_down() {
            if let Some(value) = scope.get(name) {
                local_hit = Some((depth, value.clone()));
                break;
            }
        }
        if let Some((depth, value)) = local_hit {
            let value = self.reference_to_value(value);
            return Place::bound(
                value,
                Binding::ScopeVar {
                    depth,
                    name: name.to_owned(),
                },
            );
        }

        let mut ctx_hit = None;
        for (_, scope) in self.scopes.iter_top_down() {
            if let Some(obj) = scope.has_obj {
                if let Some(value) = self.graph.get(obj).and_then(|e| e.context.get(name)) {
                    ctx_hit = Some((obj, value.clone()));
                    break;
                }
            }
        }
        if let Some((entity, value)) = ctx_hit {
            let value = self.reference_to_value(value);
            return Place::bound(
                value,
                Binding::CtxSlot {
                    entity,
                    key: name.to_owned(),
                },
            );
        }

        let mut action_hit = None;
        'outer: for (_, scope) in self.scopes.iter_top_down() {
            for table_entity in &scope.action_tables {
                let found = self
                    .graph
                    .get(*table_entity)
                    .and_then(|e| find_action(&e.activity_actions, name));
                if let Some(action) = found {
                    action_hit = Some(action.clone());
                    break 'outer;
                }
            }
        }
        if let Some(action) = action_hit {
            return Place::rvalue(Value::Action(Box::new(action)));
        }

        if let Some(func) = self.host.get_builtin_action(name) {
            return Place::rvalue(Value::Action(Box::new(Action::new(name, ActionBody::Builtin(func)))));
        }

        if create {
            if let Some(top) = self.scopes.top_mut() {
                top.set(name, Value::Null);
                let depth = self.scopes.iter_top_down().next().map_or(0, |(d, _)| d);
                return Place::bound(
                    Value::Null,
                    Binding::ScopeVar {
                        depth,
                        name: name.to_owned(),
                    },
                );
            }
        }
        self.rt_error(RtError::undefined(name), at);
        Place::rvalue(Value::Null)
    }

    /// Resolves entity-handle values before they surface to an operator:
    /// stale handles become `Null`, jid strings naming live entities are
    /// upgraded back to handles.
    pub fn reference_to_value(&self, value: Value) -> Value {
        match value {
            Value::Entity(id) => {
                if self.graph.get(id).is_some() {
                    Value::Entity(id)
                } else {
                    Value::Null
                }
            }
            Value::Str(s) => {
                if let Ok(jid) = s.parse::<Jid>() {
                    if let Some(id) = self.graph.lookup_jid(&jid) {
                        return Value::Entity(id);
                    }
                }
                Value::Str(s)
            }
            other => other,
        }
    }

    /// Invokes a named ability on an entity through a fresh nested
    /// interpreter sharing this machine's identity and graph handle.
    pub fn call_ability(&mut self, nd: EntityId, name: &str, at: &Ast) {
        let Some(action) = self
            .graph
            .get(nd)
            .and_then(|e| find_action(&e.activity_actions, name))
            .cloned()
        else {
            self.rt_error(
                RtError::new(RtErrorKind::MissingAbility, format!("ability '{name}' not found")),
                at,
            );
            return;
        };
        match &action.body {
            ActionBody::Code(ir) => {
                log::debug!("invoking ability '{name}'");
                let body = ir_to_ast(ir);
                let mut scope = Scope::for_entity(nd);
                if let Some(top) = self.scopes.top() {
                    scope.inherit_agent_refs(top);
                }
                let mut sub = Interp::new(
                    self.m_id,
                    &mut *self.graph,
                    &mut *self.heap,
                    &mut *self.host,
                    &mut *self.sink,
                    self.loop_limit,
                );
                sub.current_node = self.current_node;
                sub.push_scope(scope);
                sub.run_code_block(&body);
                let mut sub_report = std::mem::take(&mut sub.report);
                drop(sub);
                self.report.append(&mut sub_report);
            }
            ActionBody::Builtin(func) => {
                if let Err(err) = func(&[], self.heap) {
                    self.rt_error(err, at);
                }
            }
        }
    }

    // ---- reporting and diagnostics -------------------------------------

    /// Walks lists, entity sets, maps, and entities recursively, replacing
    /// each entity with its serialized document.
    pub fn report_deep_serialize(&self, value: &Value) -> RtResult<serde_json::Value> {
        match value {
            Value::Entity(id) => self.graph.entity_doc(*id, false, self.heap),
            Value::Set(set) => set
                .iter()
                .map(|id| self.graph.entity_doc(id, false, self.heap))
                .collect::<RtResult<Vec<_>>>()
                .map(serde_json::Value::Array),
            Value::List(id) => {
                let items = self.heap.list(*id).clone();
                items
                    .iter()
                    .map(|item| self.report_deep_serialize(item))
                    .collect::<RtResult<Vec<_>>>()
                    .map(serde_json::Value::Array)
            }
            Value::Map(id) => {
                let map = self.heap.map(*id).clone();
                let mut out = serde_json::Map::new();
                for (key, item) in &map {
                    out.insert(key.clone(), self.report_deep_serialize(item)?);
                }
                Ok(serde_json::Value::Object(out))
            }
            other => value_to_json(other, self.heap, self.graph),
        }
    }

    /// Logs a type failure and reports whether the value was acceptable.
    pub fn rt_check_type(&mut self, value: &Value, accepted: &[&str], at: &Ast) -> bool {
        let name = value.type_name(self.graph);
        if accepted.contains(&name) {
            true
        } else {
            self.rt_error(
                RtError::type_error(format!("expected one of {accepted:?}, got {name}")),
                at,
            );
            false
        }
    }

    /// Re-reads a Place's value at its binding's origin, for consistency
    /// checks and host inspection.
    pub fn read_back(&self, place: &Place) -> Option<Value> {
        place.read_back(&self.scopes, self.heap, self.graph)
    }

    pub fn rt_error(&mut self, err: RtError, at: &Ast) {
        log::debug!("runtime error: {err}");
        self.sink.error(&err, at);
    }

    pub fn rt_warn(&mut self, msg: &str, at: &Ast) {
        log::debug!("runtime warning: {msg}");
        self.sink.warn(msg, at);
    }

    fn write_place(&mut self, place: &Place, at: &Ast) {
        if let Err(err) = place.write(&mut self.scopes, self.heap, self.graph) {
            self.rt_error(err, at);
        }
    }
}

/// Parses an event clause into its trigger kind and access list.
fn run_event_clause(ast: &Ast) -> (Trigger, Vec<String>) {
    let mut access = vec![];
    let mut trigger = Trigger::Activity;
    for kid in &ast.kids {
        match kid.kind {
            AstKind::NameList => access = kid.name_list(),
            AstKind::Entry => trigger = Trigger::Entry,
            AstKind::Exit => trigger = Trigger::Exit,
            AstKind::Activity => trigger = Trigger::Activity,
            _ => {}
        }
    }
    (trigger, access)
}

/// The optional edge-architype name carried by an edge reference.
fn edge_name_filter(ast: &Ast) -> Option<String> {
    ast.kids
        .iter()
        .find(|k| k.kind == AstKind::Name)
        .map(|k| k.token_text().to_owned())
}
