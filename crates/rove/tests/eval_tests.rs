//! Evaluator tests: operators, places, assignment flavors, control flow.
//!
//! Programs are built with the AST helpers in `common` and run through a
//! `Machine` at a scratch node; assertions go through the report buffer
//! (deep-serialized JSON) and the collected diagnostics.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use rove::{AstKind, EntityKind, Machine, Scope, Value};
use serde_json::json;

/// `has x = 2; x += 3; report x;` reports `[5]`.
#[test]
fn arithmetic_assignment() {
    let prog = block(vec![
        has("x", Some(expr(int(2)))),
        inc("x", AstKind::AddEq, expr(int(3))),
        report(expr(name("x"))),
    ]);
    let mut m = Machine::new();
    let n = m.spawn_node("root");
    assert_eq!(m.run_at(&prog, n), vec![json!(5)]);
    assert!(!m.diags.has_errors(), "{:?}", m.diags.errors);
}

/// `has r = []; for i in [1,2,3] { r += [i*i]; } report r;` reports `[[1,4,9]]`.
#[test]
fn list_iteration() {
    let prog = block(vec![
        has("r", Some(expr(list(vec![])))),
        for_in(
            "i",
            expr(list(vec![expr(int(1)), expr(int(2)), expr(int(3))])),
            block(vec![inc(
                "r",
                AstKind::AddEq,
                expr(list(vec![bin_term(name("i"), AstKind::Mul, name("i"))])),
            )]),
        ),
        report(expr(name("r"))),
    ]);
    let mut m = Machine::new();
    let n = m.spawn_node("root");
    assert_eq!(m.run_at(&prog, n), vec![json!([1, 4, 9])]);
}

/// `has x = 0; (false and (x=1)); report x;` reports `[0]`: the right
/// operand of a falsy `and` never runs.
#[test]
fn logical_short_circuit_skips_side_effect() {
    let prog = block(vec![
        has("x", Some(expr(int(0)))),
        bin_logic(
            compare_of(boolean(false)),
            AstKind::And,
            compare_of(paren(assign("x", expr(int(1))))),
        ),
        report(expr(name("x"))),
    ]);
    let mut m = Machine::new();
    let n = m.spawn_node("root");
    assert_eq!(m.run_at(&prog, n), vec![json!(0)]);
}

/// Chained comparisons left-fold: `1 < 2 < 3` is true, and so is
/// `3 < 2 < 1` because `false < 1` holds numerically.
#[test]
fn chained_comparison_left_folds() {
    let prog = block(vec![
        report(cmp_chain(
            int(1),
            vec![(AstKind::CmpLt, int(2)), (AstKind::CmpLt, int(3))],
        )),
        report(cmp_chain(
            int(3),
            vec![(AstKind::CmpLt, int(2)), (AstKind::CmpLt, int(1))],
        )),
    ]);
    let mut m = Machine::new();
    let n = m.spawn_node("root");
    assert_eq!(m.run_at(&prog, n), vec![json!(true), json!(true)]);
}

/// After `x = v`, evaluating `x` yields `v` and the Place's back-reference
/// reads the same value (Place consistency).
#[test]
fn assignment_round_trip_and_place_consistency() {
    let mut m = Machine::new();
    let w = m.graph.create(EntityKind::Walker, "w");
    let mut interp = m.interp();
    interp.push_scope(Scope::for_entity(w));
    interp.run_statement(&assign("x", expr(int(42))));
    let place = interp.run_expression(&expr(name("x")));
    assert!(matches!(place.value, Value::Int(42)));
    assert!(matches!(interp.read_back(&place), Some(Value::Int(42))));
}

/// Arithmetic over mixed numeric types and string concatenation.
#[test]
fn arithmetic_operators() {
    let prog = block(vec![
        report(bin_arith(int(2), AstKind::Add, paren(bin_term(int(3), AstKind::Mul, int(4))))),
        report(bin_term(int(7), AstKind::Div, int(2))),
        report(bin_term(int(7), AstKind::Div, float(2.0))),
        report(bin_term(int(7), AstKind::Mod, int(4))),
        report(bin_pow(int(2), int(10))),
        report(neg(int(5))),
        report(bin_arith(string("ab"), AstKind::Add, string("cd"))),
    ]);
    let mut m = Machine::new();
    let n = m.spawn_node("root");
    assert_eq!(
        m.run_at(&prog, n),
        vec![
            json!(14),
            json!(3),
            json!(3.5),
            json!(3),
            json!(1024),
            json!(-5),
            json!("abcd"),
        ]
    );
    assert!(!m.diags.has_errors());
}

/// Division by zero is a recoverable runtime error with a null fallback.
#[test]
fn division_by_zero_recovers() {
    let prog = block(vec![report(bin_term(int(1), AstKind::Div, int(0)))]);
    let mut m = Machine::new();
    let n = m.spawn_node("root");
    assert_eq!(m.run_at(&prog, n), vec![json!(null)]);
    assert!(m.diags.errors.iter().any(|e| e.contains("UnsupportedOperation")));
}

/// `and` / `or` evaluate to the determining operand's value, not a coerced
/// boolean.
#[test]
fn logical_returns_determining_operand() {
    let prog = block(vec![
        report(bin_logic(compare_of(int(0)), AstKind::Or, compare_of(string("x")))),
        report(bin_logic(compare_of(int(1)), AstKind::And, compare_of(int(2)))),
        report(bin_logic(compare_of(int(0)), AstKind::And, compare_of(int(2)))),
    ]);
    let mut m = Machine::new();
    let n = m.spawn_node("root");
    assert_eq!(m.run_at(&prog, n), vec![json!("x"), json!(2), json!(0)]);
}

/// Comparison operators, unary `not`, and membership tests.
#[test]
fn comparisons_and_membership() {
    let two_el = expr(list(vec![expr(int(1)), expr(int(2))]));
    let prog = block(vec![
        report(bin_cmp(int(1), AstKind::CmpEq, int(1))),
        report(bin_cmp(int(1), AstKind::CmpNe, int(2))),
        report(bin_cmp(float(1.5), AstKind::CmpLte, int(2))),
        report(not_cmp(compare_of(boolean(false)))),
        report(bin_cmp(int(2), AstKind::CmpIn, paren(two_el.clone()))),
        report(bin_cmp(int(3), AstKind::CmpNin, paren(two_el))),
        report(bin_cmp(string("ell"), AstKind::CmpIn, string("hello"))),
    ]);
    let mut m = Machine::new();
    let n = m.spawn_node("root");
    assert_eq!(
        m.run_at(&prog, n),
        vec![json!(true); 7]
    );
}

/// First truthy branch wins; exactly one branch executes.
#[test]
fn if_elif_else_branches() {
    let prog = block(vec![
        has("x", Some(expr(int(2)))),
        if_elif_else(
            bin_cmp(name("x"), AstKind::CmpEq, int(1)),
            block(vec![report(expr(string("one")))]),
            vec![(
                bin_cmp(name("x"), AstKind::CmpEq, int(2)),
                block(vec![report(expr(string("two")))]),
            )],
            Some(block(vec![report(expr(string("other")))])),
        ),
    ]);
    let mut m = Machine::new();
    let n = m.spawn_node("root");
    assert_eq!(m.run_at(&prog, n), vec![json!("two")]);
}

/// `while` with `break` and `continue`: even numbers under the break point.
#[test]
fn while_break_continue() {
    // has i = 0; has r = [];
    // while true { i += 1; if i > 5 { break; } if i % 2 == 1 { continue; } r += [i]; }
    // report r;
    let prog = block(vec![
        has("i", Some(expr(int(0)))),
        has("r", Some(expr(list(vec![])))),
        while_stmt(
            expr(boolean(true)),
            block(vec![
                inc("i", AstKind::AddEq, expr(int(1))),
                if_else(
                    bin_cmp(name("i"), AstKind::CmpGt, int(5)),
                    block(vec![brk()]),
                    None,
                ),
                if_else(
                    bin_cmp(paren(bin_term(name("i"), AstKind::Mod, int(2))), AstKind::CmpEq, int(1)),
                    block(vec![cont()]),
                    None,
                ),
                inc("r", AstKind::AddEq, expr(list(vec![expr(name("i"))]))),
            ]),
        ),
        report(expr(name("r"))),
    ]);
    let mut m = Machine::new();
    let n = m.spawn_node("root");
    assert_eq!(m.run_at(&prog, n), vec![json!([2, 4])]);
}

/// `for expr1 to expr2 by expr3` runs init once, checks the condition, and
/// steps after each body.
#[test]
fn for_to_by_counts() {
    let prog = block(vec![
        has("total", Some(expr(int(0)))),
        for_to_by(
            assign("i", expr(int(1))),
            bin_cmp(name("i"), AstKind::CmpLte, int(4)),
            inc("i", AstKind::AddEq, expr(int(1))),
            block(vec![inc("total", AstKind::AddEq, expr(name("i")))]),
        ),
        report(expr(name("total"))),
    ]);
    let mut m = Machine::new();
    let n = m.spawn_node("root");
    assert_eq!(m.run_at(&prog, n), vec![json!(10)]);
}

/// A `for ... in` body runs exactly `min(n, loop_limit)` times, with a
/// warning on overshoot.
#[test]
fn for_in_respects_loop_limit() {
    let items: Vec<_> = (1..=5).map(|i| expr(int(i))).collect();
    let prog = block(vec![
        has("count", Some(expr(int(0)))),
        for_in(
            "i",
            expr(list(items)),
            block(vec![inc("count", AstKind::AddEq, expr(int(1)))]),
        ),
        report(expr(name("count"))),
    ]);
    let mut m = Machine::with_loop_limit(3);
    let n = m.spawn_node("root");
    assert_eq!(m.run_at(&prog, n), vec![json!(3)]);
    assert!(m.diags.warnings.iter().any(|w| w.contains("loop limit")));
}

/// A loop that fits inside the limit does not warn.
#[test]
fn loop_within_limit_is_silent() {
    let items: Vec<_> = (1..=3).map(|i| expr(int(i))).collect();
    let prog = block(vec![for_in("i", expr(list(items)), block(vec![]))]);
    let mut m = Machine::with_loop_limit(3);
    let n = m.spawn_node("root");
    m.run_at(&prog, n);
    assert!(m.diags.warnings.is_empty(), "{:?}", m.diags.warnings);
}

/// A `while` loop hits the limit instead of spinning forever.
#[test]
fn while_respects_loop_limit() {
    let prog = block(vec![
        has("count", Some(expr(int(0)))),
        while_stmt(
            expr(boolean(true)),
            block(vec![inc("count", AstKind::AddEq, expr(int(1)))]),
        ),
        report(expr(name("count"))),
    ]);
    let mut m = Machine::with_loop_limit(7);
    let n = m.spawn_node("root");
    assert_eq!(m.run_at(&prog, n), vec![json!(7)]);
    assert!(m.diags.warnings.iter().any(|w| w.contains("loop limit")));
}

/// `skip` ends the activation: later statements and loop iterations no-op.
#[test]
fn skip_stops_the_walk() {
    let prog = block(vec![
        report(expr(int(1))),
        for_in(
            "i",
            expr(list(vec![expr(int(1)), expr(int(2)), expr(int(3))])),
            block(vec![
                report(expr(name("i"))),
                if_else(bin_cmp(name("i"), AstKind::CmpEq, int(2)), block(vec![skip()]), None),
            ]),
        ),
        report(expr(int(99))),
    ]);
    let mut m = Machine::new();
    let n = m.spawn_node("root");
    assert_eq!(m.run_at(&prog, n), vec![json!(1), json!(1), json!(2)]);
}

/// `for ... in` over a non-list is rejected before the body runs.
#[test]
fn for_in_requires_a_list() {
    let prog = block(vec![
        has("hits", Some(expr(int(0)))),
        for_in("i", expr(int(7)), block(vec![inc("hits", AstKind::AddEq, expr(int(1)))])),
        report(expr(name("hits"))),
    ]);
    let mut m = Machine::new();
    let n = m.spawn_node("root");
    assert_eq!(m.run_at(&prog, n), vec![json!(0)]);
    assert!(m.diags.errors.iter().any(|e| e.contains("TypeError")));
}

/// Indexing yields writable container slots; negative indices count from
/// the end; a missing map key is created on write.
#[test]
fn indexing_reads_and_writes() {
    let prog = block(vec![
        has("xs", Some(expr(list(vec![expr(int(10)), expr(int(20)), expr(int(30))])))),
        has("d", Some(expr(dict(vec![("a", expr(int(1)))])))),
        assign_to(index(name("xs"), expr(int(1))), expr(int(99))),
        assign_to(index(name("d"), expr(string("b"))), expr(int(2))),
        report(expr(index(name("xs"), expr(int(1))))),
        report(expr(index(name("xs"), neg(int(1))))),
        report(expr(index(name("d"), expr(string("b"))))),
        report(expr(name("d"))),
    ]);
    let mut m = Machine::new();
    let n = m.spawn_node("root");
    assert_eq!(
        m.run_at(&prog, n),
        vec![json!(99), json!(30), json!(2), json!({"a": 1, "b": 2})]
    );
    assert!(!m.diags.has_errors(), "{:?}", m.diags.errors);
}

/// An out-of-range list read is an `IndexError` with a null fallback.
#[test]
fn index_out_of_range_recovers() {
    let prog = block(vec![
        has("xs", Some(expr(list(vec![expr(int(1))])))),
        report(expr(index(name("xs"), expr(int(5))))),
    ]);
    let mut m = Machine::new();
    let n = m.spawn_node("root");
    assert_eq!(m.run_at(&prog, n), vec![json!(null)]);
    assert!(m.diags.errors.iter().any(|e| e.contains("IndexError")));
}

/// `x.length`, `x.keys`, and `x.destroy(i)` over their typed domains.
#[test]
fn dot_builtins_on_containers() {
    let prog = block(vec![
        has("xs", Some(expr(list(vec![expr(int(1)), expr(int(2)), expr(int(3))])))),
        has("d", Some(expr(dict(vec![("a", expr(int(1))), ("b", expr(int(2)))])))),
        report(expr(dot_builtin(name("xs"), AstKind::Length))),
        report(expr(dot_builtin(name("d"), AstKind::Keys))),
        expr(dot_destroy(name("xs"), expr(int(0)))),
        report(expr(name("xs"))),
    ]);
    let mut m = Machine::new();
    let n = m.spawn_node("root");
    assert_eq!(
        m.run_at(&prog, n),
        vec![json!(3), json!(["a", "b"]), json!([2, 3])]
    );
}

/// `length` on a non-list logs a `TypeError` and falls back to zero.
#[test]
fn length_outside_domain() {
    let prog = block(vec![report(expr(dot_builtin(int(5), AstKind::Length)))]);
    let mut m = Machine::new();
    let n = m.spawn_node("root");
    assert_eq!(m.run_at(&prog, n), vec![json!(0)]);
    assert!(m.diags.errors.iter().any(|e| e.contains("TypeError")));
}

/// Reading an undefined name is recoverable and reports `UndefinedName`.
#[test]
fn undefined_name_recovers() {
    let prog = block(vec![report(expr(name("nope")))]);
    let mut m = Machine::new();
    let n = m.spawn_node("root");
    assert_eq!(m.run_at(&prog, n), vec![json!(null)]);
    assert!(m.diags.errors.iter().any(|e| e.contains("UndefinedName")));
}

/// Comparing unrelated types is a `TypeError` with a falsy fallback.
#[test]
fn incomparable_types_recover_falsy() {
    let prog = block(vec![report(bin_cmp(string("a"), AstKind::CmpLt, int(1)))]);
    let mut m = Machine::new();
    let n = m.spawn_node("root");
    assert_eq!(m.run_at(&prog, n), vec![json!(false)]);
    assert!(m.diags.errors.iter().any(|e| e.contains("TypeError")));
}

/// A `has` declaration writes its default only when the attribute is absent.
#[test]
fn has_default_written_once() {
    let prog = block(vec![
        has("x", Some(expr(int(2)))),
        assign("x", expr(int(5))),
        has("x", Some(expr(int(7)))),
        report(expr(name("x"))),
    ]);
    let mut m = Machine::new();
    let n = m.spawn_node("root");
    assert_eq!(m.run_at(&prog, n), vec![json!(5)]);
}
