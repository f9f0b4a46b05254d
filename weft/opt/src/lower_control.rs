//! Compiles a control program into a clocked netlist of guarded assignments
//! with explicit start/finish handshakes.
//!
//! Every control node gets a go/done pair realized as one-bit wires. A `seq`
//! becomes one state register whose values enumerate the children 1:1,
//! advancing on each child's done and wrapping to the initial state at the
//! end. A `par` becomes a broadcast go plus one completion latch per child,
//! with the AND of the latches as the node's done. `if` and `while` latch
//! the condition's combinational value into a dedicated register before
//! branching so it stays stable for the branch's full duration.
//!
//! Clock and reset are implicit at this level: the netlist names only data,
//! control, and handshake signals, and the emission backend attaches the
//! clock tree.

use crate::guard_exclusivity::check_static;
use crate::Named;
use linked_hash_map::LinkedHashMap;
use weft_ir::{
    Assignment, CellType, Component, Control, Direction, Guard, Id, InstanceIdx, PortDef, PortRef,
};
use weft_utils::{bits_needed_for, Error, WeftResult};

/// The start/finish pair of one compiled control node. `go_in`/`done_in` are
/// the driven ends of the handshake wires; `go`/`done` are the readable
/// ends.
#[derive(Debug, Clone, Copy)]
pub struct Handshake {
    pub go: PortRef,
    pub go_in: PortRef,
    pub done: PortRef,
    pub done_in: PortRef,
}

/// The result of lowering: the component extended with the generated
/// control cells, the guarded assignments, and the root handshake. External
/// logic drives `go` and observes `done`.
#[derive(Debug, Clone)]
pub struct Lowered {
    pub comp: Component,
    pub assignments: Vec<Assignment>,
    pub go: PortRef,
    pub done: PortRef,
}

/// The lowering pass.
pub struct LowerControl;

impl Named for LowerControl {
    fn name() -> &'static str {
        "lower-control"
    }

    fn description() -> &'static str {
        "Compile the control program into guarded structure with go/done handshakes"
    }
}

impl LowerControl {
    /// Run the pass.
    pub fn run(comp: &Component) -> WeftResult<Lowered> {
        lower(comp)
    }
}

/// Lower a component's control program. Runs the static guard-exclusivity
/// analysis on the generated netlist before returning: a netlist that could
/// double-drive a signal is a compile-time [Error::MultipleDrivers], never a
/// runtime surprise.
pub fn lower(comp: &Component) -> WeftResult<Lowered> {
    let mut lw = Lowering::new(comp.clone());
    let control = comp.control.clone();
    let hs = lw.compile(&control)?;
    lw.finish(hs)
}

struct Lowering {
    comp: Component,
    assigns: Vec<Assignment>,
    /// Accumulated write-enable guards, one OR-folded assignment per
    /// generated register so write enables never have multiple drivers.
    reg_write_en: LinkedHashMap<InstanceIdx, Guard>,
    /// The instances of the original component, fixed before generated
    /// cells are added; `disable` complements against this set.
    original: Vec<InstanceIdx>,
    one: InstanceIdx,
    zero: InstanceIdx,
    counter: u64,
}

impl Lowering {
    fn new(mut comp: Component) -> Self {
        let original = comp.cell_indices().collect();
        let one = comp.add_constant(1, 1);
        let zero = comp.add_constant(0, 1);
        Self {
            comp,
            assigns: Vec::new(),
            reg_write_en: LinkedHashMap::new(),
            original,
            one,
            zero,
            counter: 0,
        }
    }

    fn fresh(&mut self, prefix: &str) -> Id {
        let id = Id::new(format!("{}{}", prefix, self.counter));
        self.counter += 1;
        id
    }

    fn one_out(&self) -> PortRef {
        PortRef::new(self.one, "out")
    }

    fn zero_out(&self) -> PortRef {
        PortRef::new(self.zero, "out")
    }

    /// A one-bit pass-through wire cell.
    fn add_wire(&mut self, prefix: &str) -> InstanceIdx {
        let name = self.fresh(prefix);
        self.comp.instantiate(
            name,
            CellType::Primitive {
                name: Id::new("std_wire"),
                param_binding: [(Id::new("WIDTH"), 1)].into_iter().collect(),
                is_comb: true,
            },
            [
                PortDef::new("in", 1, Direction::Input),
                PortDef::new("out", 1, Direction::Output),
            ],
        )
    }

    /// A generated state register.
    fn add_register(&mut self, prefix: &str, width: u64) -> InstanceIdx {
        let name = self.fresh(prefix);
        self.comp.instantiate(
            name,
            CellType::Primitive {
                name: Id::new("std_reg"),
                param_binding: [(Id::new("WIDTH"), width)].into_iter().collect(),
                is_comb: false,
            },
            [
                PortDef::new("in", width, Direction::Input),
                PortDef::new("write_en", 1, Direction::Input),
                PortDef::new("out", width, Direction::Output),
                PortDef::new("done", 1, Direction::Output),
            ],
        )
    }

    fn handshake(&mut self, prefix: &str) -> Handshake {
        let go = self.add_wire(&format!("{}_go", prefix));
        let done = self.add_wire(&format!("{}_done", prefix));
        Handshake {
            go: PortRef::new(go, "out"),
            go_in: PortRef::new(go, "in"),
            done: PortRef::new(done, "out"),
            done_in: PortRef::new(done, "in"),
        }
    }

    fn assign(&mut self, dst: PortRef, src: PortRef, guard: Guard) {
        self.assigns.push(Assignment::new(dst, src, guard));
    }

    /// Drive a one-bit signal high under `guard`.
    fn assign_one(&mut self, dst: PortRef, guard: Guard) {
        let one = self.one_out();
        self.assign(dst, one, guard);
    }

    /// A guarded register write: the data assignment is emitted now; the
    /// write enable accumulates into a single OR-folded assignment.
    fn write_reg(&mut self, reg: InstanceIdx, src: PortRef, guard: Guard) {
        self.assign(PortRef::new(reg, "in"), src, guard.clone());
        let merged = match self.reg_write_en.get(&reg) {
            Some(g) => g.clone().or(guard),
            None => guard,
        };
        self.reg_write_en.insert(reg, merged);
    }

    fn compile(&mut self, node: &Control) -> WeftResult<Handshake> {
        match node {
            Control::Empty => {
                let hs = self.handshake("empty");
                self.assign_one(hs.done_in, Guard::port(hs.go));
                Ok(hs)
            }
            Control::Enable(e) => self.compile_enable(&e.instances, "enable"),
            Control::Disable(d) => {
                let complement: Vec<InstanceIdx> = self
                    .original
                    .iter()
                    .copied()
                    .filter(|idx| !d.instances.contains(idx))
                    .collect();
                self.compile_enable(&complement, "disable")
            }
            Control::Seq(seq) => self.compile_seq(&seq.stmts),
            Control::Par(par) => self.compile_par(&par.stmts),
            Control::If(i) => self.compile_branch(i.port, &i.tbranch, &i.fbranch, "if"),
            // the hardware view has no disabled values: the condition port
            // of an `ifen` is its valid rail, latched exactly like `if`
            Control::IfEn(i) => self.compile_branch(i.port, &i.tbranch, &i.fbranch, "ifen"),
            Control::While(w) => self.compile_while(w.port, &w.body),
        }
    }

    /// One guarded block: broadcast go into every listed instance's start
    /// port, and finish when every instance with a done output has raised
    /// it.
    fn compile_enable(&mut self, instances: &[InstanceIdx], prefix: &str) -> WeftResult<Handshake> {
        let hs = self.handshake(prefix);
        let go = Guard::port(hs.go);

        let mut info = Vec::new();
        for &idx in instances {
            let cell = self.comp.cell(idx);
            let start = ["go", "write_en"].iter().find_map(|n| {
                cell.get_port(Id::new(n))
                    .filter(|p| p.direction == Direction::Input)
                    .map(|p| p.name)
            });
            let done = cell
                .get_port(Id::new("done"))
                .filter(|p| p.direction == Direction::Output)
                .map(|p| p.name);
            info.push((idx, start, done));
        }

        let mut all_done = Guard::True;
        for (idx, start, done) in info {
            let done_guard = done.map(|d| Guard::port(PortRef::new(idx, d)));
            if let Some(start) = start {
                let hold = match &done_guard {
                    Some(d) => go.clone() & !d.clone(),
                    None => go.clone(),
                };
                self.assign_one(PortRef::new(idx, start), hold);
            }
            if let Some(d) = done_guard {
                all_done = all_done.and(d);
            }
        }
        self.assign_one(hs.done_in, go.and(all_done));
        Ok(hs)
    }

    /// One state register enumerating the children 1:1: state `i` holds
    /// while child `i` runs, advances to `i + 1` exactly when child `i`'s
    /// done fires, and wraps to the initial state from the final value.
    fn compile_seq(&mut self, stmts: &[Control]) -> WeftResult<Handshake> {
        let hs = self.handshake("seq");
        let go = Guard::port(hs.go);
        let n = stmts.len() as u64;
        let width = bits_needed_for(n + 1);
        let fsm = self.add_register("fsm", width);
        let fsm_out = PortRef::new(fsm, "out");

        for (i, child) in stmts.iter().enumerate() {
            let child_hs = self.compile(child)?;
            let at_i = Guard::eq(fsm_out, i as u64);
            self.assign_one(
                child_hs.go_in,
                go.clone() & at_i.clone() & !Guard::port(child_hs.done),
            );
            let next = self.comp.add_constant(i as u64 + 1, width);
            self.write_reg(
                fsm,
                PortRef::new(next, "out"),
                at_i & Guard::port(child_hs.done),
            );
        }

        let at_end = Guard::eq(fsm_out, n);
        self.assign_one(hs.done_in, at_end.clone());
        // wrap to the initial state one cycle after finishing
        let reset_val = self.comp.add_constant(0, width);
        self.write_reg(fsm, PortRef::new(reset_val, "out"), at_end);
        Ok(hs)
    }

    /// Broadcast go, one completion latch per child; the AND of all latches
    /// is the node's done.
    fn compile_par(&mut self, stmts: &[Control]) -> WeftResult<Handshake> {
        let hs = self.handshake("par");
        let go = Guard::port(hs.go);
        let reset = self.add_register("par_reset", 1);
        let reset_out = Guard::port(PortRef::new(reset, "out"));

        let mut all_done = Guard::True;
        for child in stmts {
            let child_hs = self.compile(child)?;
            let latch = self.add_register("pd", 1);
            let latch_out = Guard::port(PortRef::new(latch, "out"));

            self.assign_one(
                child_hs.go_in,
                go.clone() & !latch_out.clone() & !Guard::port(child_hs.done),
            );
            let one = self.one_out();
            let zero = self.zero_out();
            self.write_reg(
                latch,
                one,
                Guard::port(child_hs.done) & !reset_out.clone(),
            );
            self.write_reg(latch, zero, reset_out.clone());
            all_done = all_done.and(latch_out);
        }

        let one = self.one_out();
        let zero = self.zero_out();
        self.write_reg(
            reset,
            one,
            go.clone() & all_done.clone() & !reset_out.clone(),
        );
        self.write_reg(reset, zero, reset_out.clone());
        self.assign_one(hs.done_in, reset_out);
        Ok(hs)
    }

    /// Latch the condition into a dedicated register before branching so it
    /// stays stable for the branch's full duration, then run exactly one
    /// branch.
    fn compile_branch(
        &mut self,
        port: PortRef,
        tbranch: &Control,
        fbranch: &Control,
        prefix: &str,
    ) -> WeftResult<Handshake> {
        self.require_one_bit(port)?;
        let hs = self.handshake(prefix);
        let go = Guard::port(hs.go);
        let computed = self.add_register("cond_computed", 1);
        let stored = self.add_register("cond_stored", 1);
        let computed_out = Guard::port(PortRef::new(computed, "out"));
        let stored_out = Guard::port(PortRef::new(stored, "out"));

        let latch_guard = go.clone() & !computed_out.clone();
        self.write_reg(stored, port, latch_guard.clone());
        let one = self.one_out();
        self.write_reg(computed, one, latch_guard);

        let t_hs = self.compile(tbranch)?;
        let f_hs = self.compile(fbranch)?;
        self.assign_one(
            t_hs.go_in,
            go.clone() & computed_out.clone() & stored_out.clone() & !Guard::port(t_hs.done),
        );
        self.assign_one(
            f_hs.go_in,
            go.clone() & computed_out.clone() & !stored_out.clone() & !Guard::port(f_hs.done),
        );

        let done_guard = (computed_out.clone() & stored_out.clone() & Guard::port(t_hs.done))
            | (computed_out & !stored_out & Guard::port(f_hs.done));
        self.assign_one(hs.done_in, done_guard);
        // forget the latched condition one cycle after finishing
        let zero = self.zero_out();
        self.write_reg(computed, zero, Guard::port(hs.done));
        Ok(hs)
    }

    /// Latch the condition, run the body while it holds, and re-latch after
    /// every body run.
    fn compile_while(&mut self, port: PortRef, body: &Control) -> WeftResult<Handshake> {
        self.require_one_bit(port)?;
        let hs = self.handshake("while");
        let go = Guard::port(hs.go);
        let computed = self.add_register("cond_computed", 1);
        let stored = self.add_register("cond_stored", 1);
        let computed_out = Guard::port(PortRef::new(computed, "out"));
        let stored_out = Guard::port(PortRef::new(stored, "out"));

        let cond_go = go.clone() & !computed_out.clone();
        self.write_reg(stored, port, cond_go.clone());
        let one = self.one_out();
        self.write_reg(computed, one, cond_go);

        let body_hs = self.compile(body)?;
        self.assign_one(
            body_hs.go_in,
            go.clone() & computed_out.clone() & stored_out.clone() & !Guard::port(body_hs.done),
        );

        // recompute the condition after every body run
        let zero = self.zero_out();
        self.write_reg(
            computed,
            zero,
            computed_out.clone() & stored_out.clone() & Guard::port(body_hs.done),
        );

        let exit = computed_out & !stored_out;
        self.assign_one(hs.done_in, exit);
        let zero = self.zero_out();
        self.write_reg(computed, zero, Guard::port(hs.done));
        Ok(hs)
    }

    fn require_one_bit(&self, port: PortRef) -> WeftResult<()> {
        let width = self.comp.port_width(port)?;
        if width != 1 {
            return Err(Error::misc(format!(
                "condition port {} must be one bit wide for lowering, found {}",
                self.comp.canonical(port),
                width
            )));
        }
        Ok(())
    }

    fn finish(mut self, hs: Handshake) -> WeftResult<Lowered> {
        let writes: Vec<(InstanceIdx, Guard)> = self
            .reg_write_en
            .iter()
            .map(|(reg, guard)| (*reg, guard.clone()))
            .collect();
        for (reg, guard) in writes {
            let one = self.one_out();
            self.assign(PortRef::new(reg, "write_en"), one, guard);
        }
        check_static(&self.comp, &self.assigns)?;
        Ok(Lowered {
            comp: self.comp,
            assignments: self.assigns,
            go: hs.go_in,
            done: hs.done,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_ir::CellType;

    fn reg_cell(comp: &mut Component, name: &str, width: u64) -> InstanceIdx {
        comp.instantiate(
            name,
            CellType::Primitive {
                name: Id::new("std_reg"),
                param_binding: [(Id::new("WIDTH"), width)].into_iter().collect(),
                is_comb: false,
            },
            [
                PortDef::new("in", width, Direction::Input),
                PortDef::new("write_en", 1, Direction::Input),
                PortDef::new("out", width, Direction::Output),
                PortDef::new("done", 1, Direction::Output),
            ],
        )
    }

    fn count_cells_named(lowered: &Lowered, prefix: &str) -> usize {
        lowered
            .comp
            .cells()
            .filter(|(_, c)| c.name().as_str().starts_with(prefix))
            .count()
    }

    #[test]
    fn seq_gets_one_fsm_register_and_wrap() {
        let mut comp = Component::new("top");
        let a = reg_cell(&mut comp, "a", 8);
        let b = reg_cell(&mut comp, "b", 8);
        let c = reg_cell(&mut comp, "c", 8);
        comp.set_control(Control::seq(vec![
            Control::enable(vec![a]),
            Control::enable(vec![b]),
            Control::enable(vec![c]),
        ]));

        let lowered = lower(&comp).unwrap();
        assert_eq!(count_cells_named(&lowered, "fsm"), 1);

        // the fsm takes states 0..=3: three children plus the final state
        let (fsm, _) = lowered
            .comp
            .cells()
            .find(|(_, c)| c.name().as_str().starts_with("fsm"))
            .unwrap();
        let fsm_in = PortRef::new(fsm, "in");
        let advances: Vec<_> = lowered
            .assignments
            .iter()
            .filter(|a| a.dst == fsm_in)
            .collect();
        // three advances plus the wrap back to zero
        assert_eq!(advances.len(), 4);
    }

    #[test]
    fn par_gets_one_latch_per_child() {
        let mut comp = Component::new("top");
        let a = reg_cell(&mut comp, "a", 8);
        let b = reg_cell(&mut comp, "b", 8);
        comp.set_control(Control::par(vec![
            Control::enable(vec![a]),
            Control::enable(vec![b]),
        ]));

        let lowered = lower(&comp).unwrap();
        assert_eq!(count_cells_named(&lowered, "pd"), 2);
        assert_eq!(count_cells_named(&lowered, "par_reset"), 1);
    }

    #[test]
    fn branch_latches_its_condition() {
        let mut comp = Component::new("top");
        let flag = reg_cell(&mut comp, "flag", 1);
        let a = reg_cell(&mut comp, "a", 8);
        let b = reg_cell(&mut comp, "b", 8);
        comp.set_control(Control::if_(
            PortRef::new(flag, "out"),
            Control::enable(vec![a]),
            Control::enable(vec![b]),
        ));

        let lowered = lower(&comp).unwrap();
        assert_eq!(count_cells_named(&lowered, "cond_computed"), 1);
        assert_eq!(count_cells_named(&lowered, "cond_stored"), 1);
    }

    #[test]
    fn wide_conditions_are_rejected() {
        let mut comp = Component::new("top");
        let wide = reg_cell(&mut comp, "wide", 8);
        comp.set_control(Control::while_(
            PortRef::new(wide, "out"),
            Control::enable(vec![wide]),
        ));
        assert!(lower(&comp).is_err());
    }

    #[test]
    fn every_lowered_netlist_passes_the_exclusivity_check() {
        // nested control: seq of par, if, while
        let mut comp = Component::new("top");
        let flag = reg_cell(&mut comp, "flag", 1);
        let a = reg_cell(&mut comp, "a", 8);
        let b = reg_cell(&mut comp, "b", 8);
        comp.set_control(Control::seq(vec![
            Control::par(vec![Control::enable(vec![a]), Control::enable(vec![b])]),
            Control::if_(
                PortRef::new(flag, "out"),
                Control::enable(vec![a]),
                Control::empty(),
            ),
            Control::while_(PortRef::new(flag, "out"), Control::enable(vec![b])),
        ]));
        // lower() runs the static analysis internally; failure would error
        lower(&comp).unwrap();
    }
}
