//! Lowering of the control language onto a synthesizable clocked netlist,
//! plus the static analyses the lowering must pass before it may be emitted.

mod guard_exclusivity;
mod lower_control;

pub use guard_exclusivity::{check_dynamic, check_static, eval_guard, GuardExclusivity};
pub use lower_control::{lower, Handshake, LowerControl, Lowered};

/// A pass with a name and a human-readable description.
pub trait Named {
    /// The name of the pass.
    fn name() -> &'static str;
    /// A short description of what the pass does.
    fn description() -> &'static str;
}
