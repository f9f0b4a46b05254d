//! The scheduler: drives logical steps from the control program.

use crate::environment::Environment;
use crate::logging::{debug, new_sublogger};
use crate::primitives;
use crate::stabilizer::{ActiveSet, Pass, PrimitiveMap, Stabilizer};
use crate::stamped::StampedValue;
use crate::values::Value;
use ahash::AHashSet;
use itertools::Itertools;
use slog::Logger;
use weft_ir::{CellType, Component, Context, Control, Direction, Id, InstanceIdx, PortRef};
use weft_utils::{Error, WeftResult};

/// Interprets one component: steps its structure to fixpoints under control
/// of its control program.
pub struct Simulator<'a> {
    ctx: &'a Context,
    comp: &'a Component,
    prims: PrimitiveMap,
    logger: Logger,
}

impl<'a> Simulator<'a> {
    /// Build a simulator for a component, resolving every primitive instance
    /// to its implementation.
    pub fn new(ctx: &'a Context, comp: &'a Component) -> WeftResult<Simulator<'a>> {
        let mut prims = PrimitiveMap::default();
        for (idx, cell) in comp.cells() {
            if let CellType::Primitive {
                name,
                param_binding,
                ..
            } = &cell.prototype
            {
                prims.insert(
                    idx,
                    primitives::make_primitive(*name, param_binding, cell.name())?,
                );
            }
        }
        Ok(Self {
            ctx,
            comp,
            prims,
            logger: new_sublogger("scheduler"),
        })
    }

    /// The top-level entry point: run the component's control program over
    /// a fresh state seeded with the given input values, and read back the
    /// enabled boundary outputs.
    pub fn compute(&self, inputs: &[(Id, u64)]) -> WeftResult<Vec<(Id, u64)>> {
        let mut env = Environment::new();
        for (name, v) in inputs {
            let width = self.comp.port_width(PortRef::this(*name))?;
            env.set_input(*name, Value::from(*v, width));
        }
        let env = self.run(env)?;
        let mut outs = Vec::new();
        for pd in self.comp.boundary_ports(Direction::Output) {
            let sv = self.read_port(&env, PortRef::this(pd.name))?;
            if sv.enabled {
                outs.push((pd.name, sv.value.as_u64()));
            }
        }
        Ok(outs)
    }

    /// Run the component's control program against an existing state.
    pub fn run(&self, env: Environment) -> WeftResult<Environment> {
        self.simulate(env, &self.comp.control, 0)
    }

    /// Drive one control node at the given (scope-local) timestamp.
    pub fn simulate(&self, env: Environment, node: &Control, ts: u64) -> WeftResult<Environment> {
        match node {
            Control::Empty => Ok(env),
            Control::Enable(e) => {
                debug!(self.logger, "enable"; "ts" => ts, "instances" => e.instances.len());
                let active = ActiveSet::from_instances(e.instances.iter().copied());
                self.step(env, &active)
            }
            Control::Disable(d) => {
                debug!(self.logger, "disable"; "ts" => ts, "instances" => d.instances.len());
                let active = ActiveSet::complement(self.comp, d.instances.iter().copied());
                self.step(env, &active)
            }
            Control::Seq(seq) => {
                // each child opens the next slot of a nested time scope
                let mut env = env;
                for (i, stmt) in seq.stmts.iter().enumerate() {
                    env = self.simulate(env, stmt, i as u64)?;
                }
                Ok(env)
            }
            Control::Par(par) => {
                // every child runs against the same starting state at the
                // same timestamp; the merger recombines them
                let base = env;
                let mut branches = Vec::with_capacity(par.stmts.len());
                for stmt in &par.stmts {
                    branches.push(self.simulate(base.clone(), stmt, ts)?);
                }
                Environment::merge_many(self.comp, base, branches)
            }
            Control::If(i) => {
                // the branch is selected exactly once at entry
                if self.cond_value(&env, i.port)? {
                    self.simulate(env, &i.tbranch, ts)
                } else {
                    self.simulate(env, &i.fbranch, ts)
                }
            }
            Control::IfEn(i) => {
                if self.cond_enabled(&env, i.port)? {
                    self.simulate(env, &i.tbranch, ts)
                } else {
                    self.simulate(env, &i.fbranch, ts)
                }
            }
            Control::While(w) => {
                let mut env = env;
                let mut ts = ts;
                while self.cond_value(&env, w.port)? {
                    env = self.simulate(env, &w.body, ts)?;
                    ts += 1;
                }
                Ok(env)
            }
        }
    }

    /// One logical timestep: every instance is stabilized (or disabled) and
    /// the worklist is re-derived from changed wires until nothing changes.
    pub fn step(&self, env: Environment, active: &ActiveSet) -> WeftResult<Environment> {
        let worklist: Vec<InstanceIdx> = self.comp.cell_indices().collect();
        self.step_with_worklist(env, worklist, active)
    }

    /// [Simulator::step] with an explicit initial worklist.
    pub fn step_with_worklist(
        &self,
        env: Environment,
        worklist: Vec<InstanceIdx>,
        active: &ActiveSet,
    ) -> WeftResult<Environment> {
        let start = env.clone();
        let stab = Stabilizer::new(self.ctx, self.comp, &self.prims, &start);
        let mut env = env;
        let mut worklist = worklist;
        let mut passes = 0u64;
        while !worklist.is_empty() {
            let base = env;
            let mut branches = Vec::with_capacity(worklist.len());
            let mut changed: Vec<PortRef> = Vec::new();
            for idx in worklist {
                let mut branch = base.clone();
                let mut pass = Pass::new();
                stab.evaluate_instance(&mut branch, active, idx, &mut pass)?;
                changed.extend(pass.changed);
                branches.push(branch);
            }
            env = Environment::merge_many(self.comp, base, branches)?;
            worklist = self.affected_instances(&changed);
            passes += 1;
        }
        self.settle_boundary(&mut env)?;
        debug!(self.logger, "step settled";
            "component" => self.comp.name.as_str(), "passes" => passes, "clk" => env.clk);
        env.clk += 1;
        Ok(env)
    }

    /// The next worklist: every instance consuming a wire whose settled
    /// value changed.
    fn affected_instances(&self, changed: &[PortRef]) -> Vec<InstanceIdx> {
        if changed.is_empty() {
            return Vec::new();
        }
        let changed: AHashSet<PortRef> = changed.iter().copied().collect();
        self.comp
            .wires()
            .iter()
            .filter(|wire| {
                changed.contains(&wire.src)
                    || self
                        .comp
                        .split_of(wire.src)
                        .map_or(false, |s| changed.contains(&s.parent))
            })
            .map(|wire| wire.dst.instance)
            .filter(|dst| !dst.is_this())
            .unique()
            .sorted()
            .collect()
    }

    /// Resolve the boundary outputs from the settled wires, merging multiple
    /// drivers per port. Runs at the end of each step so a conflict between
    /// two enabled drivers aborts that step.
    fn settle_boundary(&self, env: &mut Environment) -> WeftResult<()> {
        for pd in self.comp.boundary_ports(Direction::Output) {
            let dst = PortRef::this(pd.name);
            let mut resolved: Option<StampedValue> = None;
            for src in self.comp.drivers_of(dst) {
                let sv = self.read_port(env, *src)?;
                resolved = Some(match resolved {
                    None => sv,
                    Some(prev) => {
                        StampedValue::merge(&prev, &sv).map_err(|(left, right)| {
                            Error::WriteConflict {
                                port: self.comp.canonical(dst).to_string(),
                                left: left.to_string(),
                                right: right.to_string(),
                            }
                        })?
                    }
                });
            }
            if let Some(sv) = resolved {
                env.set(dst, sv);
            }
        }
        Ok(())
    }

    /// Read a settled port from the environment without re-evaluating
    /// anything. Split sub-ports read through their parent.
    pub fn read_port(&self, env: &Environment, port: PortRef) -> WeftResult<StampedValue> {
        if let Some(split) = self.comp.split_of(port) {
            let sv = self.read_port(env, split.parent)?;
            return Ok(StampedValue {
                value: sv.value.slice(split.lsb, split.width),
                ..sv
            });
        }
        match env.get(port) {
            Some(sv) => Ok(*sv),
            None => {
                let width = self.comp.port_width(port)?;
                Ok(StampedValue::disabled(width, env.clk))
            }
        }
    }

    /// A condition port's truth value: nonzero is true; a disabled or
    /// missing value uniformly reads as false.
    fn cond_value(&self, env: &Environment, port: PortRef) -> WeftResult<bool> {
        let sv = self.read_port(env, port)?;
        Ok(sv.enabled && !sv.value.is_zero())
    }

    /// Whether a condition port currently carries an enabled value.
    fn cond_enabled(&self, env: &Environment, port: PortRef) -> WeftResult<bool> {
        let sv = self.read_port(env, port)?;
        Ok(sv.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::add_primitive;

    /// out = add(a, 1) with both the adder and its constant enabled.
    fn add1() -> (Context, Id) {
        let mut comp = Component::new("add1");
        comp.declare_port("a", 32, Direction::Input);
        comp.declare_port("out", 32, Direction::Output);
        let add = add_primitive(&mut comp, "add", "std_add", &[("WIDTH", 32)]).unwrap();
        let one = comp.add_constant(1, 32);
        comp.connect(PortRef::this("a"), PortRef::new(add, "left"))
            .unwrap();
        comp.connect(PortRef::new(one, "out"), PortRef::new(add, "right"))
            .unwrap();
        comp.connect(PortRef::new(add, "out"), PortRef::this("out"))
            .unwrap();
        comp.set_control(Control::enable(vec![add, one]));
        let name = comp.name;
        let mut ctx = Context::new();
        ctx.add_component(comp);
        (ctx, name)
    }

    #[test]
    fn compute_runs_the_control_program() {
        let (ctx, name) = add1();
        let comp = ctx.get(name).unwrap();
        let sim = Simulator::new(&ctx, comp).unwrap();
        let outs = sim.compute(&[(Id::new("a"), 10)]).unwrap();
        assert_eq!(outs, vec![(Id::new("out"), 11)]);
    }

    #[test]
    fn disabled_instances_produce_no_enabled_values() {
        let (ctx, name) = add1();
        let comp = ctx.get(name).unwrap();
        let sim = Simulator::new(&ctx, comp).unwrap();

        // enable only the adder: its constant operand stays disabled, so the
        // sum is disabled too
        let add = comp.find_cell(Id::new("add")).unwrap();
        let mut env = Environment::new();
        env.set_input("a", Value::from(10, 32));
        let env = sim
            .step(env, &ActiveSet::from_instances([add]))
            .unwrap();
        let out = sim.read_port(&env, PortRef::this("out")).unwrap();
        assert!(!out.enabled);
    }

    #[test]
    fn ifen_branches_on_enabledness_not_value() {
        // the condition wire carries an enabled zero: `if` would take the
        // false branch, `ifen` takes the true branch
        let mut comp = Component::new("sel_en");
        comp.declare_port("flag", 1, Direction::Input);
        comp.declare_port("out", 8, Direction::Output);
        let cval = comp.add_constant(9, 8);
        comp.connect(PortRef::new(cval, "out"), PortRef::this("out"))
            .unwrap();
        comp.set_control(Control::if_en(
            PortRef::this("flag"),
            Control::enable(vec![cval]),
            Control::empty(),
        ));
        let mut ctx = Context::new();
        let name = comp.name;
        ctx.add_component(comp);
        let comp = ctx.get(name).unwrap();
        let sim = Simulator::new(&ctx, comp).unwrap();

        let outs = sim.compute(&[(Id::new("flag"), 0)]).unwrap();
        assert_eq!(outs, vec![(Id::new("out"), 9)]);

        // without the input the condition is disabled and nothing runs
        let outs = sim.compute(&[]).unwrap();
        assert!(outs.is_empty());
    }

    #[test]
    fn if_with_disabled_condition_takes_the_false_branch() {
        // the condition port belongs to an instance that never ran, so its
        // value is disabled and the false branch must be selected
        let mut comp = Component::new("sel");
        comp.declare_port("out", 8, Direction::Output);
        let cflag = comp.add_constant(1, 1);
        let cval = comp.add_constant(7, 8);
        comp.connect(PortRef::new(cval, "out"), PortRef::this("out"))
            .unwrap();
        comp.set_control(Control::if_(
            PortRef::new(cflag, "out"),
            Control::empty(),
            Control::enable(vec![cval]),
        ));
        let mut ctx = Context::new();
        let name = comp.name;
        ctx.add_component(comp);
        let comp = ctx.get(name).unwrap();
        let sim = Simulator::new(&ctx, comp).unwrap();
        let outs = sim.compute(&[]).unwrap();
        assert_eq!(outs, vec![(Id::new("out"), 7)]);
    }
}
