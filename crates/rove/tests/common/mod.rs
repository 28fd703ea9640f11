//! AST builders shared by the integration tests.
//!
//! The parser is an external collaborator, so tests construct trees by hand.
//! Builders return nodes at the grammar level their name suggests; `expr`
//! wraps an atom through the full precedence ladder
//! (expression -> connect -> logical -> compare -> arithmetic -> term ->
//! factor -> power -> func_call -> atom).

#![allow(dead_code)]

use rove::{Ast, AstKind, EntityId, EntityKind, Machine, Scope, Value};

/// Runs a code block at `node` like `Machine::run_at`, but with extra
/// variables seeded into the scope (handy for handing entities to programs).
pub fn run_with_vars(
    m: &mut Machine,
    code: &Ast,
    node: EntityId,
    vars: Vec<(&str, Value)>,
) -> Vec<serde_json::Value> {
    let walker = m.graph.create(EntityKind::Walker, "anonymous");
    let mut interp = m.interp();
    interp.current_node = Some(node);
    let mut scope = Scope::for_entity(walker);
    scope.set("here", Value::Entity(node));
    scope.set("visitor", Value::Entity(walker));
    for (k, v) in vars {
        scope.set(k, v);
    }
    interp.push_scope(scope);
    interp.run_code_block(code);
    std::mem::take(&mut interp.report)
}

// ---- ladder wrappers ---------------------------------------------------

pub fn atom(kid: Ast) -> Ast {
    Ast::node(AstKind::Atom, vec![kid])
}

pub fn func_call(atom: Ast) -> Ast {
    Ast::node(AstKind::FuncCall, vec![atom])
}

pub fn power(fc: Ast) -> Ast {
    Ast::node(AstKind::Power, vec![fc])
}

pub fn factor(p: Ast) -> Ast {
    Ast::node(AstKind::Factor, vec![p])
}

pub fn term(f: Ast) -> Ast {
    Ast::node(AstKind::Term, vec![f])
}

pub fn arith(t: Ast) -> Ast {
    Ast::node(AstKind::Arithmetic, vec![t])
}

pub fn compare(a: Ast) -> Ast {
    Ast::node(AstKind::Compare, vec![a])
}

pub fn logical(c: Ast) -> Ast {
    Ast::node(AstKind::Logical, vec![c])
}

pub fn connect(l: Ast) -> Ast {
    Ast::node(AstKind::Connect, vec![l])
}

pub fn expression(c: Ast) -> Ast {
    Ast::node(AstKind::Expression, vec![c])
}

/// Wraps an `Atom` node through the whole ladder into an `Expression`.
pub fn expr(atom_node: Ast) -> Ast {
    expression(connect(logical(compare(arith(term(factor(power(func_call(atom_node)))))))))
}

/// Wraps a `FuncCall` node up into an `Expression`.
pub fn expr_fc(fc: Ast) -> Ast {
    expression(connect(logical(compare(arith(term(factor(power(fc))))))))
}

/// Wraps a `Compare` node up into an `Expression`.
pub fn expr_cmp(cmp: Ast) -> Ast {
    expression(connect(logical(cmp)))
}

/// Wraps a `Logical` node up into an `Expression`.
pub fn expr_logical(l: Ast) -> Ast {
    expression(connect(l))
}

// ---- atoms -------------------------------------------------------------

pub fn int(v: i64) -> Ast {
    atom(Ast::leaf(AstKind::Int, v.to_string()))
}

pub fn float(v: f64) -> Ast {
    atom(Ast::leaf(AstKind::Float, v.to_string()))
}

pub fn string(s: &str) -> Ast {
    atom(Ast::leaf(AstKind::Str, s))
}

pub fn boolean(b: bool) -> Ast {
    atom(Ast::leaf(AstKind::Bool, if b { "true" } else { "false" }))
}

pub fn name(n: &str) -> Ast {
    atom(Ast::node(AstKind::DottedName, vec![Ast::leaf(AstKind::Name, n)]))
}

pub fn dotted(parts: &[&str]) -> Ast {
    atom(Ast::node(
        AstKind::DottedName,
        parts.iter().map(|p| Ast::leaf(AstKind::Name, *p)).collect(),
    ))
}

/// `[e1, e2, ...]` - items are `Expression` nodes.
pub fn list(items: Vec<Ast>) -> Ast {
    atom(Ast::node(
        AstKind::ListVal,
        vec![Ast::node(AstKind::ExprList, items)],
    ))
}

/// `{"k": e, ...}` - values are `Expression` nodes.
pub fn dict(pairs: Vec<(&str, Ast)>) -> Ast {
    atom(Ast::node(
        AstKind::DictVal,
        pairs
            .into_iter()
            .map(|(k, v)| Ast::node(AstKind::KvPair, vec![Ast::leaf(AstKind::Str, k), v]))
            .collect(),
    ))
}

/// `(expr)` - parenthesized expression as an atom.
pub fn paren(e: Ast) -> Ast {
    atom(e)
}

/// `&expr` - deref to jid string.
pub fn deref(e: Ast) -> Ast {
    atom_of_kids(vec![Ast::marker(AstKind::Deref), e])
}

fn atom_of_kids(kids: Vec<Ast>) -> Ast {
    Ast::node(AstKind::Atom, kids)
}

/// `a[i]` - atoms compose, each index is an `Expression`.
pub fn index(base_atom: Ast, idx: Ast) -> Ast {
    Ast::node(AstKind::Atom, vec![base_atom, Ast::node(AstKind::Index, vec![idx])])
}

/// `a.<builtin>` for the argumentless dot built-ins.
pub fn dot_builtin(base_atom: Ast, builtin: AstKind) -> Ast {
    Ast::node(
        AstKind::Atom,
        vec![base_atom, Ast::node(AstKind::FuncBuiltIn, vec![Ast::marker(builtin)])],
    )
}

/// `a.destroy(i)`.
pub fn dot_destroy(base_atom: Ast, idx: Ast) -> Ast {
    Ast::node(
        AstKind::Atom,
        vec![
            base_atom,
            Ast::node(AstKind::FuncBuiltIn, vec![Ast::marker(AstKind::Destroy), idx]),
        ],
    )
}

// ---- operators ---------------------------------------------------------

fn wrap_term(a: Ast) -> Ast {
    term(factor(power(func_call(a))))
}

fn wrap_factor(a: Ast) -> Ast {
    factor(power(func_call(a)))
}

fn wrap_arith(a: Ast) -> Ast {
    arith(wrap_term(a))
}

/// `a + b` / `a - b` over atoms; `op` is `Add` or `Sub`.
pub fn bin_arith(a: Ast, op: AstKind, b: Ast) -> Ast {
    expr_cmp(compare(Ast::node(
        AstKind::Arithmetic,
        vec![wrap_term(a), Ast::marker(op), wrap_term(b)],
    )))
}

/// `a * b` / `a / b` / `a % b` over atoms.
pub fn bin_term(a: Ast, op: AstKind, b: Ast) -> Ast {
    expr_cmp(compare(arith(Ast::node(
        AstKind::Term,
        vec![wrap_factor(a), Ast::marker(op), wrap_factor(b)],
    ))))
}

/// `a ** b` over atoms.
pub fn bin_pow(a: Ast, b: Ast) -> Ast {
    expr_cmp(compare(arith(term(factor(Ast::node(
        AstKind::Power,
        vec![func_call(a), Ast::marker(AstKind::Pow), factor(power(func_call(b)))],
    ))))))
}

/// `-a` over an atom.
pub fn neg(a: Ast) -> Ast {
    expr_cmp(compare(arith(term(Ast::node(
        AstKind::Factor,
        vec![Ast::marker(AstKind::Sub), factor(power(func_call(a)))],
    )))))
}

fn cmp_op(kind: AstKind) -> Ast {
    Ast::node(AstKind::CmpOp, vec![Ast::marker(kind)])
}

/// `a <op> b` over atoms; `op` is one of the `Cmp*` kinds.
pub fn bin_cmp(a: Ast, op: AstKind, b: Ast) -> Ast {
    expr_cmp(Ast::node(
        AstKind::Compare,
        vec![wrap_arith(a), cmp_op(op), wrap_arith(b)],
    ))
}

/// Chained comparison over atoms: `a op1 b op2 c ...`.
pub fn cmp_chain(first: Ast, rest: Vec<(AstKind, Ast)>) -> Ast {
    let mut kids = vec![wrap_arith(first)];
    for (op, operand) in rest {
        kids.push(cmp_op(op));
        kids.push(wrap_arith(operand));
    }
    expr_cmp(Ast::node(AstKind::Compare, kids))
}

/// `not a` where `a` is a `Compare` node.
pub fn not_cmp(a: Ast) -> Ast {
    expr_cmp(Ast::node(AstKind::Compare, vec![Ast::marker(AstKind::Not), a]))
}

/// `a and b` / `a or b` where operands are `Compare` nodes (see
/// [`compare_of`] to lift an atom or expression).
pub fn bin_logic(a: Ast, op: AstKind, b: Ast) -> Ast {
    expr_logical(Ast::node(AstKind::Logical, vec![a, Ast::marker(op), b]))
}

/// Lifts an atom to a `Compare` node for use in logical chains.
pub fn compare_of(atom_node: Ast) -> Ast {
    compare(wrap_arith(atom_node))
}

// ---- assignment --------------------------------------------------------

/// `target = rhs` where `target` is an `Atom` and `rhs` an `Expression`.
pub fn assign_to(target_atom: Ast, rhs: Ast) -> Ast {
    Ast::node(
        AstKind::Expression,
        vec![
            connect(logical(compare(wrap_arith(target_atom)))),
            Ast::node(AstKind::Assignment, vec![rhs]),
        ],
    )
}

/// `name = rhs`.
pub fn assign(n: &str, rhs: Ast) -> Ast {
    assign_to(name(n), rhs)
}

/// `target := rhs`.
pub fn copy_assign_to(target_atom: Ast, rhs: Ast) -> Ast {
    Ast::node(
        AstKind::Expression,
        vec![
            connect(logical(compare(wrap_arith(target_atom)))),
            Ast::node(AstKind::CopyAssign, vec![rhs]),
        ],
    )
}

/// `target += rhs` and friends; `op` is `AddEq`/`SubEq`/`MulEq`/`DivEq`.
pub fn inc_to(target_atom: Ast, op: AstKind, rhs: Ast) -> Ast {
    Ast::node(
        AstKind::Expression,
        vec![
            connect(logical(compare(wrap_arith(target_atom)))),
            Ast::node(AstKind::IncAssign, vec![Ast::marker(op), rhs]),
        ],
    )
}

pub fn inc(n: &str, op: AstKind, rhs: Ast) -> Ast {
    inc_to(name(n), op, rhs)
}

// ---- statements --------------------------------------------------------

pub fn block(stmts: Vec<Ast>) -> Ast {
    Ast::node(AstKind::CodeBlock, stmts)
}

pub fn report(e: Ast) -> Ast {
    Ast::node(AstKind::ReportAction, vec![e])
}

fn has_assign(n: &str, default: Option<Ast>) -> Ast {
    let mut kids = vec![Ast::leaf(AstKind::Name, n)];
    if let Some(d) = default {
        kids.push(d);
    }
    Ast::node(AstKind::HasAssign, kids)
}

/// `has name = default;`
pub fn has(n: &str, default: Option<Ast>) -> Ast {
    Ast::node(AstKind::HasStmt, vec![has_assign(n, default)])
}

/// `has private name = default;`
pub fn has_private(n: &str, default: Option<Ast>) -> Ast {
    Ast::node(
        AstKind::HasStmt,
        vec![Ast::marker(AstKind::Private), has_assign(n, default)],
    )
}

/// `has anchor name = default;`
pub fn has_anchor(n: &str, default: Option<Ast>) -> Ast {
    Ast::node(
        AstKind::HasStmt,
        vec![Ast::marker(AstKind::Anchor), has_assign(n, default)],
    )
}

/// `can name { body }` (activity ability with a stored code block).
pub fn can_code(n: &str, body: Ast) -> Ast {
    Ast::node(AstKind::CanStmt, vec![Ast::leaf(AstKind::Name, n), body])
}

/// `can name with entry/exit/activity { body }`.
pub fn can_code_on(n: &str, trigger: AstKind, body: Ast) -> Ast {
    Ast::node(
        AstKind::CanStmt,
        vec![
            Ast::leaf(AstKind::Name, n),
            Ast::node(AstKind::EventClause, vec![Ast::marker(trigger)]),
            body,
        ],
    )
}

/// `can a.b.c;` - registers a builtin action by dotted name.
pub fn can_builtin(parts: &[&str]) -> Ast {
    Ast::node(
        AstKind::CanStmt,
        vec![Ast::node(
            AstKind::DottedName,
            parts.iter().map(|p| Ast::leaf(AstKind::Name, *p)).collect(),
        )],
    )
}

/// `name_list { body }` - runs the block only on matching node architypes.
pub fn node_ctx(names: &[&str], body: Ast) -> Ast {
    Ast::node(
        AstKind::NodeCtxBlock,
        vec![
            Ast::node(
                AstKind::NameList,
                names.iter().map(|n| Ast::leaf(AstKind::Name, *n)).collect(),
            ),
            body,
        ],
    )
}

/// `if cond { then } else { otherwise }`.
pub fn if_else(cond: Ast, then: Ast, otherwise: Option<Ast>) -> Ast {
    let mut kids = vec![cond, then];
    if let Some(e) = otherwise {
        kids.push(Ast::node(AstKind::ElseStmt, vec![e]));
    }
    Ast::node(AstKind::IfStmt, kids)
}

/// `if cond { then } elif c2 { b2 } ... else { otherwise }`.
pub fn if_elif_else(cond: Ast, then: Ast, elifs: Vec<(Ast, Ast)>, otherwise: Option<Ast>) -> Ast {
    let mut kids = vec![cond, then];
    for (c, b) in elifs {
        kids.push(Ast::node(AstKind::ElifStmt, vec![c, b]));
    }
    if let Some(e) = otherwise {
        kids.push(Ast::node(AstKind::ElseStmt, vec![e]));
    }
    Ast::node(AstKind::IfStmt, kids)
}

/// `for NAME in expr { body }`.
pub fn for_in(var: &str, iterable: Ast, body: Ast) -> Ast {
    Ast::node(AstKind::ForStmt, vec![Ast::leaf(AstKind::Name, var), iterable, body])
}

/// `for init to cond by step { body }`.
pub fn for_to_by(init: Ast, cond: Ast, step: Ast, body: Ast) -> Ast {
    Ast::node(AstKind::ForStmt, vec![init, cond, step, body])
}

pub fn while_stmt(cond: Ast, body: Ast) -> Ast {
    Ast::node(AstKind::WhileStmt, vec![cond, body])
}

pub fn brk() -> Ast {
    Ast::marker(AstKind::Break)
}

pub fn cont() -> Ast {
    Ast::marker(AstKind::Continue)
}

pub fn skip() -> Ast {
    Ast::marker(AstKind::Skip)
}

// ---- graph sublanguage -------------------------------------------------

/// `-->` / `-[Name]->` edge reference (direction `EdgeTo`, `EdgeFrom`, or
/// `EdgeAny`), optionally named and optionally carrying a filter or spawn
/// context.
pub fn edge_ref(direction: AstKind, edge_name: Option<&str>, ctx: Option<Ast>) -> Ast {
    let mut kids = vec![];
    if let Some(n) = edge_name {
        kids.push(Ast::leaf(AstKind::Name, n));
    }
    if let Some(c) = ctx {
        kids.push(c);
    }
    Ast::node(direction, kids)
}

/// `node::Name` reference.
pub fn node_ref(node_name: Option<&str>) -> Ast {
    let kids = node_name.map(|n| Ast::leaf(AstKind::Name, n)).into_iter().collect();
    Ast::node(AstKind::NodeRef, kids)
}

/// A `node_edge_ref` atom from an edge reference, optionally composed with
/// a node reference and filter.
pub fn edge_nodes(edge: Ast, nref: Option<Ast>, filter: Option<Ast>) -> Ast {
    let mut kids = vec![edge];
    if let Some(n) = nref {
        kids.push(n);
    }
    if let Some(f) = filter {
        kids.push(f);
    }
    atom(Ast::node(AstKind::NodeEdgeRef, kids))
}

/// A `node_edge_ref` atom from a node reference with an optional filter.
pub fn node_query(nref: Ast, filter: Option<Ast>) -> Ast {
    let mut kids = vec![nref];
    if let Some(f) = filter {
        kids.push(f);
    }
    atom(Ast::node(AstKind::NodeEdgeRef, kids))
}

/// `(attr op value, ...)` filter context.
pub fn filter_ctx(compares: Vec<(&str, AstKind, Ast)>) -> Ast {
    Ast::node(
        AstKind::FilterCtx,
        compares
            .into_iter()
            .map(|(n, op, e)| {
                Ast::node(
                    AstKind::FilterCompare,
                    vec![Ast::leaf(AstKind::Name, n), cmp_op(op), e],
                )
            })
            .collect(),
    )
}

/// `(attr = value, ...)` spawn context.
pub fn spawn_ctx(assigns: Vec<(&str, Ast)>) -> Ast {
    Ast::node(
        AstKind::SpawnCtx,
        assigns
            .into_iter()
            .map(|(n, e)| Ast::node(AstKind::SpawnAssign, vec![Ast::leaf(AstKind::Name, n), e]))
            .collect(),
    )
}

/// `A <edge> B` connect expression over a left atom and right expression.
pub fn connect_op(left_atom: Ast, edge: Ast, right: Ast) -> Ast {
    expression(Ast::node(
        AstKind::Connect,
        vec![logical(compare(wrap_arith(left_atom))), edge, right],
    ))
}

/// `A NOT <edge> B` - detach matching edges pairwise.
pub fn disconnect_op(left_atom: Ast, edge: Ast, right: Ast) -> Ast {
    expression(Ast::node(
        AstKind::Connect,
        vec![
            logical(compare(wrap_arith(left_atom))),
            Ast::marker(AstKind::Not),
            edge,
            right,
        ],
    ))
}

/// `spawn location <spawn-object>` as an atom.
fn spawn_atom(location: Option<Ast>, object: Ast) -> Ast {
    let mut kids = vec![];
    if let Some(l) = location {
        kids.push(l);
    }
    kids.push(object);
    atom(Ast::node(AstKind::Spawn, kids))
}

/// `spawn location <edge> node::Name (ctx)`.
pub fn spawn_node(location: Option<Ast>, edge: Option<Ast>, node_name: Option<&str>, ctx: Option<Ast>) -> Ast {
    let mut kids = vec![];
    if let Some(e) = edge {
        kids.push(e);
    }
    kids.push(node_ref(node_name));
    if let Some(c) = ctx {
        kids.push(c);
    }
    spawn_atom(location, Ast::node(AstKind::NodeSpawn, kids))
}

/// `spawn location walker::Name (ctx)`.
pub fn spawn_walker(location: Option<Ast>, walker_name: &str, ctx: Option<Ast>) -> Ast {
    let mut kids = vec![Ast::node(
        AstKind::WalkerRef,
        vec![Ast::leaf(AstKind::Name, walker_name)],
    )];
    if let Some(c) = ctx {
        kids.push(c);
    }
    spawn_atom(location, Ast::node(AstKind::WalkerSpawn, kids))
}

/// `spawn location <edge> graph::Name`.
pub fn spawn_graph(location: Option<Ast>, edge: Ast, graph_name: &str) -> Ast {
    spawn_atom(
        location,
        Ast::node(
            AstKind::GraphSpawn,
            vec![
                edge,
                Ast::node(AstKind::GraphRef, vec![Ast::leaf(AstKind::Name, graph_name)]),
            ],
        ),
    )
}

// ---- calls -------------------------------------------------------------

/// `target::name (ctx)` ability call; `target` is an `Atom` or `None` for
/// the owning entity.
pub fn ability_call(target: Option<Ast>, ability: &str, ctx: Option<Ast>) -> Ast {
    let mut call_kids = vec![Ast::leaf(AstKind::Name, ability)];
    if let Some(c) = ctx {
        call_kids.push(c);
    }
    let mut kids = vec![];
    if let Some(t) = target {
        kids.push(t);
    }
    kids.push(Ast::node(AstKind::AbilityCall, call_kids));
    expr_fc(Ast::node(AstKind::FuncCall, kids))
}

/// `callee(args)` action invocation; `callee` is an `Atom`.
pub fn paren_call(callee: Ast, args: Vec<Ast>) -> Ast {
    expr_fc(Ast::node(
        AstKind::FuncCall,
        vec![
            callee,
            Ast::node(AstKind::ParenCall, vec![Ast::node(AstKind::ExprList, args)]),
        ],
    ))
}
