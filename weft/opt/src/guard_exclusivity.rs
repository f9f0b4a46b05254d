//! Static guard-exclusivity analysis.
//!
//! Every signal driven by multiple guarded alternatives must be provably
//! mutually exclusive: at most one guard true at a time. This is checked at
//! compile time over the lowered netlist by proving each pairwise
//! conjunction unsatisfiable — through BDD simplification plus
//! port-equality contradiction facts — and never deferred to a runtime
//! assertion. A runtime evaluator is kept below strictly as a debug-mode
//! safety net during simulation.

use crate::lower_control::Lowered;
use crate::Named;
use boolean_expression::Expr;
use itertools::Itertools;
use linked_hash_map::LinkedHashMap;
use weft_ir::{Assignment, CellType, Component, Guard, PortRef};
use weft_utils::{Error, WeftResult};

/// The pass.
pub struct GuardExclusivity;

impl Named for GuardExclusivity {
    fn name() -> &'static str {
        "guard-exclusivity"
    }

    fn description() -> &'static str {
        "Prove that multiply-driven signals have pairwise mutually exclusive guards"
    }
}

impl GuardExclusivity {
    /// Check a lowered netlist.
    pub fn run(lowered: &Lowered) -> WeftResult<()> {
        check_static(&lowered.comp, &lowered.assignments)
    }
}

/// A guard terminal for BDD analysis: a one-bit port read as a truth value,
/// or a port compared against a constant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Literal {
    Port(PortRef),
    Eq(PortRef, u64),
}

/// Maximum depth for inlining handshake wires into guard expressions.
const INLINE_DEPTH: usize = 32;

/// Prove that no signal with multiple guarded drivers can ever be driven by
/// two of them at once.
pub fn check_static(comp: &Component, assignments: &[Assignment]) -> WeftResult<()> {
    let wires = wire_definitions(comp, assignments);

    let mut by_dst: LinkedHashMap<PortRef, Vec<&Assignment>> = LinkedHashMap::new();
    for assign in assignments {
        by_dst
            .entry(assign.dst)
            .or_insert_with(Vec::new)
            .push(assign);
    }

    for (dst, assigns) in by_dst.iter() {
        for (a, b) in assigns.iter().tuple_combinations() {
            if !provably_exclusive(&a.guard, &b.guard, &wires) {
                return Err(Error::MultipleDrivers {
                    signal: comp.canonical(*dst).to_string(),
                    first: a.guard.to_string(),
                    second: b.guard.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// The guards under which each generated handshake wire is driven high.
/// Only wires exclusively driven high by constant one qualify; anything
/// else stays opaque to the analysis.
fn wire_definitions<'a>(
    comp: &Component,
    assignments: &'a [Assignment],
) -> LinkedHashMap<PortRef, Vec<&'a Guard>> {
    let mut defs: LinkedHashMap<PortRef, Option<Vec<&'a Guard>>> = LinkedHashMap::new();
    for assign in assignments {
        let dst_cell = assign.dst.instance;
        if dst_cell.is_this() || assign.dst.port.as_str() != "in" {
            continue;
        }
        let is_wire = matches!(
            &comp.cell(dst_cell).prototype,
            CellType::Primitive { name, .. } if name.as_str() == "std_wire"
        );
        if !is_wire {
            continue;
        }
        let out = PortRef::new(dst_cell, "out");
        let src_is_one = !assign.src.instance.is_this()
            && matches!(
                &comp.cell(assign.src.instance).prototype,
                CellType::Constant { val: 1, width: 1 }
            );
        let entry = defs.entry(out).or_insert_with(|| Some(Vec::new()));
        match (entry, src_is_one) {
            (Some(guards), true) => guards.push(&assign.guard),
            (entry, _) => *entry = None,
        }
    }
    defs.into_iter()
        .filter_map(|(port, guards)| guards.map(|g| (port, g)))
        .collect()
}

fn provably_exclusive(
    a: &Guard,
    b: &Guard,
    wires: &LinkedHashMap<PortRef, Vec<&Guard>>,
) -> bool {
    let conj = Expr::and(
        to_expr(a, wires, INLINE_DEPTH),
        to_expr(b, wires, INLINE_DEPTH),
    );
    unsatisfiable(conj.simplify_via_bdd())
}

/// Convert a guard into a BDD expression, inlining handshake wires so
/// relationships like "done implies the condition was computed" become
/// visible to the solver.
fn to_expr(
    guard: &Guard,
    wires: &LinkedHashMap<PortRef, Vec<&Guard>>,
    depth: usize,
) -> Expr<Literal> {
    match guard {
        Guard::True => Expr::Const(true),
        Guard::And(l, r) => Expr::and(
            to_expr(l, wires, depth),
            to_expr(r, wires, depth),
        ),
        Guard::Or(l, r) => Expr::or(
            to_expr(l, wires, depth),
            to_expr(r, wires, depth),
        ),
        Guard::Not(g) => Expr::not(to_expr(g, wires, depth)),
        Guard::Eq(p, v) => Expr::Terminal(Literal::Eq(*p, *v)),
        Guard::Port(p) => match wires.get(p) {
            Some(guards) if depth > 0 => guards
                .iter()
                .map(|g| to_expr(g, wires, depth - 1))
                .fold(Expr::Const(false), Expr::or),
            _ => Expr::Terminal(Literal::Port(*p)),
        },
    }
}

/// True when the expression can never evaluate to true. The BDD pass has
/// already collapsed boolean contradictions; what remains is the
/// port-equality fact that one port cannot equal two different constants.
fn unsatisfiable(expr: Expr<Literal>) -> bool {
    let mut disjuncts = Vec::new();
    extract_dnf(expr, &mut disjuncts);
    disjuncts.into_iter().all(disjunct_unsatisfiable)
}

fn disjunct_unsatisfiable(disjunct: Expr<Literal>) -> bool {
    let mut conjuncts = Vec::new();
    extract_cnf(disjunct, &mut conjuncts);
    let mut eqs: Vec<(PortRef, u64)> = Vec::new();
    for c in &conjuncts {
        match c {
            Expr::Const(false) => return true,
            Expr::Terminal(Literal::Eq(p, v)) => {
                if eqs.iter().any(|(q, w)| q == p && w != v) {
                    return true;
                }
                eqs.push((*p, *v));
            }
            _ => {}
        }
    }
    false
}

fn extract_dnf(expr: Expr<Literal>, acc: &mut Vec<Expr<Literal>>) {
    match expr {
        Expr::Or(l, r) => {
            extract_dnf(*l, acc);
            extract_dnf(*r, acc);
        }
        e => acc.push(e),
    }
}

fn extract_cnf(expr: Expr<Literal>, acc: &mut Vec<Expr<Literal>>) {
    match expr {
        Expr::And(l, r) => {
            extract_cnf(*l, acc);
            extract_cnf(*r, acc);
        }
        e => acc.push(e),
    }
}

/// Evaluate a guard against concrete port values.
pub fn eval_guard<F>(guard: &Guard, read: &F) -> bool
where
    F: Fn(PortRef) -> u64,
{
    match guard {
        Guard::True => true,
        Guard::Port(p) => read(*p) != 0,
        Guard::Eq(p, v) => read(*p) == *v,
        Guard::Not(g) => !eval_guard(g, read),
        Guard::And(l, r) => eval_guard(l, read) && eval_guard(r, read),
        Guard::Or(l, r) => eval_guard(l, read) || eval_guard(r, read),
    }
}

/// Debug-mode safety net: with concrete port values in hand, assert that at
/// most one driver of each signal is live. The static analysis makes this
/// redundant; it exists to cross-check the lowering during simulation.
pub fn check_dynamic<F>(comp: &Component, assignments: &[Assignment], read: &F) -> WeftResult<()>
where
    F: Fn(PortRef) -> u64,
{
    let mut live: LinkedHashMap<PortRef, &Assignment> = LinkedHashMap::new();
    for assign in assignments {
        if !eval_guard(&assign.guard, read) {
            continue;
        }
        if let Some(first) = live.get(&assign.dst) {
            return Err(Error::MultipleDrivers {
                signal: comp.canonical(assign.dst).to_string(),
                first: first.guard.to_string(),
                second: assign.guard.to_string(),
            });
        }
        live.insert(assign.dst, assign);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_ir::{Direction, Id, PortDef};

    fn fixture() -> (Component, PortRef, PortRef, PortRef) {
        let mut comp = Component::new("top");
        let fsm = comp.instantiate(
            "fsm",
            CellType::Primitive {
                name: Id::new("std_reg"),
                param_binding: [(Id::new("WIDTH"), 2)].into_iter().collect(),
                is_comb: false,
            },
            [
                PortDef::new("in", 2, Direction::Input),
                PortDef::new("write_en", 1, Direction::Input),
                PortDef::new("out", 2, Direction::Output),
                PortDef::new("done", 1, Direction::Output),
            ],
        );
        let sink = comp.instantiate(
            "sink",
            CellType::Primitive {
                name: Id::new("std_reg"),
                param_binding: [(Id::new("WIDTH"), 1)].into_iter().collect(),
                is_comb: false,
            },
            [
                PortDef::new("in", 1, Direction::Input),
                PortDef::new("write_en", 1, Direction::Input),
                PortDef::new("out", 1, Direction::Output),
                PortDef::new("done", 1, Direction::Output),
            ],
        );
        let one = comp.add_constant(1, 1);
        (
            comp,
            PortRef::new(fsm, "out"),
            PortRef::new(sink, "in"),
            PortRef::new(one, "out"),
        )
    }

    #[test]
    fn distinct_fsm_states_are_exclusive() {
        let (comp, fsm_out, sink_in, one) = fixture();
        let assigns = vec![
            Assignment::new(sink_in, one, Guard::eq(fsm_out, 0)),
            Assignment::new(sink_in, one, Guard::eq(fsm_out, 1)),
        ];
        check_static(&comp, &assigns).unwrap();
    }

    #[test]
    fn complementary_guards_are_exclusive() {
        let (comp, fsm_out, sink_in, one) = fixture();
        let p = Guard::port(fsm_out);
        let assigns = vec![
            Assignment::new(sink_in, one, p.clone()),
            Assignment::new(sink_in, one, !p),
        ];
        check_static(&comp, &assigns).unwrap();
    }

    #[test]
    fn overlapping_guards_are_rejected() {
        let (comp, fsm_out, sink_in, one) = fixture();
        let assigns = vec![
            Assignment::new(sink_in, one, Guard::port(fsm_out)),
            Assignment::new(sink_in, one, Guard::True),
        ];
        let err = check_static(&comp, &assigns).unwrap_err();
        match err {
            Error::MultipleDrivers { signal, .. } => assert_eq!(signal, "sink.in"),
            e => panic!("expected multiple drivers, got {}", e),
        }
    }

    #[test]
    fn single_drivers_are_never_flagged() {
        let (comp, _, sink_in, one) = fixture();
        let assigns = vec![Assignment::new(sink_in, one, Guard::True)];
        check_static(&comp, &assigns).unwrap();
    }

    #[test]
    fn dynamic_check_catches_a_live_pair() {
        let (comp, fsm_out, sink_in, one) = fixture();
        let assigns = vec![
            Assignment::new(sink_in, one, Guard::port(fsm_out)),
            Assignment::new(sink_in, one, Guard::True),
        ];
        // fsm.out is high: both guards are live
        let read = |_: PortRef| 1u64;
        assert!(check_dynamic(&comp, &assigns, &read).is_err());
        // fsm.out low: only the constant guard is live
        let read = |p: PortRef| if p == fsm_out { 0 } else { 1 };
        check_dynamic(&comp, &assigns, &read).unwrap();
    }
}
