//! The fixpoint evaluator: resolves the settled value of every wire for a
//! given active set.

use crate::environment::{Environment, PrimitiveState};
use crate::primitives::{IdlePolicy, Primitive};
use crate::scheduler::Simulator;
use crate::stamped::StampedValue;
use crate::values::Value;
use ahash::{AHashMap, AHashSet};
use weft_ir::{Cell, CellType, Component, Context, Id, InstanceIdx, PortRef};
use weft_utils::{Error, WeftResult};

/// Implementations of every primitive instance of a component, keyed by
/// arena index.
pub type PrimitiveMap = AHashMap<InstanceIdx, Box<dyn Primitive>>;

/// The set of instances whose functions may run during one step.
#[derive(Debug, Clone)]
pub struct ActiveSet {
    set: AHashSet<InstanceIdx>,
}

impl ActiveSet {
    /// The active set containing exactly the given instances.
    pub fn from_instances(instances: impl IntoIterator<Item = InstanceIdx>) -> Self {
        Self {
            set: instances.into_iter().collect(),
        }
    }

    /// The complement-selecting constructor: every instance of `comp` except
    /// the given ones.
    pub fn complement(comp: &Component, instances: impl IntoIterator<Item = InstanceIdx>) -> Self {
        let excluded: AHashSet<InstanceIdx> = instances.into_iter().collect();
        Self {
            set: comp
                .cell_indices()
                .filter(|idx| !excluded.contains(idx))
                .collect(),
        }
    }

    pub fn contains(&self, idx: InstanceIdx) -> bool {
        self.set.contains(&idx)
    }
}

/// Book-keeping for one resolution pass: which instances have already run,
/// and which output stamps changed.
#[derive(Debug, Default)]
pub struct Pass {
    memo: AHashSet<InstanceIdx>,
    /// Output ports whose settled stamp changed during this pass.
    pub changed: Vec<PortRef>,
}

impl Pass {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Resolves port values for one component within one step.
///
/// Resolution is demand-driven over the statically declared reverse wiring:
/// to settle an output, the producing instance's declared inputs are settled
/// first, then its function runs, memoized so it runs at most once per
/// resolution even when several of its outputs are requested. An instance
/// outside the active set never has its function invoked.
///
/// `start` is the environment at the beginning of the step. Stateful
/// producers present their start-of-step outputs to in-step consumers, which
/// is what lets a value cycle through a stateful boundary settle; a cycle
/// *not* broken by a stateful boundary is a documented precondition
/// violation and diverges.
pub struct Stabilizer<'a> {
    ctx: &'a Context,
    comp: &'a Component,
    prims: &'a PrimitiveMap,
    start: &'a Environment,
}

impl<'a> Stabilizer<'a> {
    pub fn new(
        ctx: &'a Context,
        comp: &'a Component,
        prims: &'a PrimitiveMap,
        start: &'a Environment,
    ) -> Self {
        Self {
            ctx,
            comp,
            prims,
            start,
        }
    }

    /// Resolve the settled value of one requested port under the given
    /// active set, evaluating producers on demand.
    pub fn stabilize(
        &self,
        env: &mut Environment,
        active: &ActiveSet,
        port: PortRef,
    ) -> WeftResult<StampedValue> {
        let mut pass = Pass::new();
        self.resolve_source(env, active, port, &mut pass)
    }

    /// Run one instance's function (at most once per resolution, tracked by
    /// the pass) and record its outputs in `env`. Changed output ports are
    /// collected on the pass for the scheduler's worklist.
    pub fn evaluate_instance(
        &self,
        env: &mut Environment,
        active: &ActiveSet,
        idx: InstanceIdx,
        pass: &mut Pass,
    ) -> WeftResult<()> {
        if pass.memo.contains(&idx) {
            return Ok(());
        }
        pass.memo.insert(idx);
        let cell = self.comp.cell(idx);
        let outs: Vec<(Id, Value)> = match &cell.prototype {
            CellType::Constant { val, width } => {
                if active.contains(idx) {
                    vec![(Id::new("out"), Value::from(*val, *width))]
                } else {
                    Vec::new()
                }
            }
            CellType::Primitive { .. } => self.run_primitive(env, active, idx, cell, pass)?,
            CellType::Component { name } => {
                self.run_subcomponent(env, active, idx, cell, *name, pass)?
            }
        };
        self.apply_outputs(env, idx, cell, outs, pass);
        Ok(())
    }

    fn run_primitive(
        &self,
        env: &mut Environment,
        active: &ActiveSet,
        idx: InstanceIdx,
        cell: &Cell,
        pass: &mut Pass,
    ) -> WeftResult<Vec<(Id, Value)>> {
        let prim = self
            .prims
            .get(&idx)
            .ok_or_else(|| Error::MissingPrimitive(cell.name()))?;
        let state0 = self
            .start
            .state_of(idx)
            .cloned()
            .unwrap_or_else(|| prim.initial_state());

        if !active.contains(idx) {
            // the function is never invoked; outputs follow the idle policy
            return Ok(match prim.idle_policy() {
                IdlePolicy::Disabled => Vec::new(),
                IdlePolicy::EchoLast => prim.idle_outputs(&state0),
            });
        }

        let (inputs, any_disabled) = self.gather_inputs(env, active, idx, cell, pass)?;
        if prim.is_comb() && any_disabled {
            // a disabled operand absorbs the whole result
            return Ok(Vec::new());
        }

        let mut state = state0;
        let outs = prim.validate_and_execute(&inputs, &mut state)?;
        if !prim.is_comb() {
            env.set_state(idx, state);
        }
        Ok(outs)
    }

    fn run_subcomponent(
        &self,
        env: &mut Environment,
        active: &ActiveSet,
        idx: InstanceIdx,
        cell: &Cell,
        name: Id,
        pass: &mut Pass,
    ) -> WeftResult<Vec<(Id, Value)>> {
        if !active.contains(idx) {
            return Ok(Vec::new());
        }
        let sub = self
            .ctx
            .get(name)
            .ok_or_else(|| Error::misc(format!("no component named {}", name)))?;

        let mut nested = match self.start.state_of(idx) {
            Some(PrimitiveState::Nested(e)) => (**e).clone(),
            _ => Environment::new(),
        };
        // seed the sub-component's boundary inputs from this graph's wiring
        for pd in cell.input_ports() {
            let dst = PortRef::new(idx, pd.name);
            if let Some(sv) = self.resolve_input(env, active, dst, pass)? {
                if sv.enabled {
                    let clk = nested.clk;
                    nested.set(PortRef::this(pd.name), StampedValue::new(sv.value, clk));
                } else {
                    nested.unset(PortRef::this(pd.name));
                }
            }
        }

        let sim = Simulator::new(self.ctx, sub)?;
        let nested = sim.simulate(nested, &sub.control, 0)?;

        let mut outs = Vec::new();
        for pd in cell.output_ports() {
            if let Some(sv) = nested.get(PortRef::this(pd.name)) {
                if sv.enabled {
                    outs.push((pd.name, sv.value));
                }
            }
        }
        env.set_state(idx, PrimitiveState::Nested(Box::new(nested)));
        Ok(outs)
    }

    /// Settle every declared input of an instance. Returns the gathered
    /// enabled inputs and whether any input was disabled or undriven.
    fn gather_inputs(
        &self,
        env: &mut Environment,
        active: &ActiveSet,
        idx: InstanceIdx,
        cell: &Cell,
        pass: &mut Pass,
    ) -> WeftResult<(Vec<(Id, Value)>, bool)> {
        let mut inputs = Vec::new();
        let mut any_disabled = false;
        for pd in cell.input_ports() {
            let dst = PortRef::new(idx, pd.name);
            match self.resolve_input(env, active, dst, pass)? {
                Some(sv) if sv.enabled => inputs.push((pd.name, sv.value)),
                _ => any_disabled = true,
            }
        }
        Ok((inputs, any_disabled))
    }

    /// Resolve the value arriving at a destination port: settle every driver
    /// and combine them with the per-wire merge rule. Two enabled drivers
    /// that disagree are a [Error::WriteConflict] naming the wire.
    fn resolve_input(
        &self,
        env: &mut Environment,
        active: &ActiveSet,
        dst: PortRef,
        pass: &mut Pass,
    ) -> WeftResult<Option<StampedValue>> {
        let mut resolved: Option<StampedValue> = None;
        for src in self.comp.drivers_of(dst) {
            let sv = self.resolve_source(env, active, *src, pass)?;
            resolved = Some(match resolved {
                None => sv,
                Some(prev) => StampedValue::merge(&prev, &sv).map_err(|(left, right)| {
                    Error::WriteConflict {
                        port: self.comp.canonical(dst).to_string(),
                        left: left.to_string(),
                        right: right.to_string(),
                    }
                })?,
            });
        }
        Ok(resolved)
    }

    /// Resolve the settled value of a source port.
    fn resolve_source(
        &self,
        env: &mut Environment,
        active: &ActiveSet,
        src: PortRef,
        pass: &mut Pass,
    ) -> WeftResult<StampedValue> {
        // a split sub-port is a bit slice of its parent
        if let Some(split) = self.comp.split_of(src) {
            let (parent, lsb, width) = (split.parent, split.lsb, split.width);
            let sv = self.resolve_source(env, active, parent, pass)?;
            let sliced = StampedValue {
                value: sv.value.slice(lsb, width),
                ..sv
            };
            env.set(src, sliced);
            return Ok(sliced);
        }

        // a graph-level input returns the externally supplied value
        if src.instance.is_this() {
            if let Some(sv) = env.get(src) {
                return Ok(*sv);
            }
            let width = self.comp.port_width(src)?;
            return Ok(StampedValue::disabled(width, env.clk));
        }

        // a stateful producer presents its committed, start-of-step outputs
        // to in-step consumers; this is the stateful boundary
        if let Some(prim) = self.prims.get(&src.instance) {
            if !prim.is_comb() {
                return Ok(self.stateful_presentation(src, prim.as_ref()));
            }
        }

        // combinational producers settle in-step, on demand
        self.evaluate_instance(env, active, src.instance, pass)?;
        match env.get(src) {
            Some(sv) => Ok(*sv),
            None => {
                let width = self.comp.port_width(src)?;
                Ok(StampedValue::disabled(width, env.clk))
            }
        }
    }

    /// The value a stateful instance's output shows to consumers within a
    /// step: the stamp it settled to last step, or its idle presentation
    /// when it has never run.
    fn stateful_presentation(&self, src: PortRef, prim: &dyn Primitive) -> StampedValue {
        if let Some(sv) = self.start.get(src) {
            return *sv;
        }
        let state = self
            .start
            .state_of(src.instance)
            .cloned()
            .unwrap_or_else(|| prim.initial_state());
        let idle = match prim.idle_policy() {
            IdlePolicy::Disabled => Vec::new(),
            IdlePolicy::EchoLast => prim.idle_outputs(&state),
        };
        let found = idle.into_iter().find(|(name, _)| *name == src.port);
        match found {
            Some((_, value)) => StampedValue::new(value, self.start.clk),
            None => {
                let width = self
                    .comp
                    .port_width(src)
                    .expect("stateful output port must be declared");
                StampedValue::disabled(width, self.start.clk)
            }
        }
    }

    /// Stamp the declared outputs of an instance into the environment;
    /// outputs missing from `outs` read as disabled. Ports whose stamps
    /// changed are recorded on the pass.
    fn apply_outputs(
        &self,
        env: &mut Environment,
        idx: InstanceIdx,
        cell: &Cell,
        outs: Vec<(Id, Value)>,
        pass: &mut Pass,
    ) {
        for pd in cell.output_ports() {
            let port = PortRef::new(idx, pd.name);
            let stamp = match outs.iter().find(|(name, _)| *name == pd.name) {
                Some((_, value)) => StampedValue::new(*value, env.clk),
                None => StampedValue::disabled(pd.width, env.clk),
            };
            let prev = env.get(port).copied();
            if prev.map(|p| (p.value, p.enabled)) != Some((stamp.value, stamp.enabled)) {
                pass.changed.push(port);
            }
            env.set(port, stamp);
        }
    }
}
