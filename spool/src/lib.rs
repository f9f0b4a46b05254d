//! The reference interpreter for weft components.
//!
//! A component's structure and control are elaborated once (see `weft-ir`);
//! this crate gives them behavior. The [scheduler::Simulator] drives logical
//! steps from the control program; each step runs the
//! [stabilizer::Stabilizer] to a fixpoint over a worklist of instances, and
//! parallel branches are recombined by the merge rules in [environment] and
//! [stamped]. Stateful leaf primitives keep their memory in the
//! [environment::Environment], so state survives across steps and forks by
//! value.
//!
//! The model is logically, not physically, concurrent: there is exactly one
//! thread, and "parallel" composition means same-timestep evaluation of
//! independent branches followed by an explicit merge.

pub mod configuration;
pub mod environment;
pub mod logging;
mod macros;
pub mod primitives;
pub mod scheduler;
pub mod serialization;
pub mod stabilizer;
pub mod stamped;
pub mod values;

pub use environment::{Environment, PrimitiveState};
pub use scheduler::Simulator;
pub use stabilizer::ActiveSet;
pub use stamped::StampedValue;
pub use values::Value;
