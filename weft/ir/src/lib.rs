//! The weft intermediate representation: static structure (ports, cells,
//! wires), the hierarchical control language, and guarded assignments for the
//! lowered hardware view.
//!
//! A [Component] owns every instance it contains through a stable-id arena;
//! instances are addressed by [InstanceIdx] and ports by [PortRef]. The
//! structure is immutable once elaboration finishes: the simulator and the
//! lowering passes only ever read it.

mod component;
mod control;
mod guard;
mod structure;

pub use component::{Component, Context, SplitPort};
pub use control::{Control, Disable, Enable, If, IfEn, Par, Seq, While};
pub use guard::Guard;
pub use structure::{
    Assignment, Binding, Canonical, Cell, CellType, Direction, InstanceIdx, PortDef, PortRef, Wire,
};
pub use weft_utils::Id;
