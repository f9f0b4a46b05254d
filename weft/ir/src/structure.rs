//! Representation for structure (wires and cells) in a weft component.

use crate::guard::Guard;
use itertools::Itertools;
use smallvec::SmallVec;
use weft_utils::Id;

/// Direction of a port as seen from outside its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    /// The opposite direction.
    pub fn reverse(&self) -> Self {
        match self {
            Direction::Input => Direction::Output,
            Direction::Output => Direction::Input,
        }
    }
}

/// A port declaration: name, bit width, direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDef {
    pub name: Id,
    pub width: u64,
    pub direction: Direction,
}

impl PortDef {
    pub fn new(name: impl Into<Id>, width: u64, direction: Direction) -> Self {
        Self {
            name: name.into(),
            width,
            direction,
        }
    }
}

/// Stable index of an instance inside a [crate::Component]'s arena.
///
/// The reserved value [InstanceIdx::THIS] addresses the enclosing component's
/// own boundary ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceIdx(u32);

impl InstanceIdx {
    /// Pseudo-instance for the enclosing component's boundary.
    pub const THIS: InstanceIdx = InstanceIdx(u32::MAX);

    pub fn new(idx: usize) -> Self {
        debug_assert!(idx < u32::MAX as usize);
        InstanceIdx(idx as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn is_this(self) -> bool {
        self == Self::THIS
    }
}

impl std::fmt::Display for InstanceIdx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_this() {
            write!(f, "this")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Reference to one port of one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortRef {
    pub instance: InstanceIdx,
    pub port: Id,
}

impl PortRef {
    pub fn new(instance: InstanceIdx, port: impl Into<Id>) -> Self {
        Self {
            instance,
            port: port.into(),
        }
    }

    /// A reference to a boundary port of the enclosing component.
    pub fn this(port: impl Into<Id>) -> Self {
        Self::new(InstanceIdx::THIS, port)
    }
}

/// Canonical `instance.port` name of a port, used in diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Canonical {
    pub cell: Id,
    pub port: Id,
}

impl Canonical {
    pub const fn new(cell: Id, port: Id) -> Self {
        Self { cell, port }
    }
}

impl std::fmt::Display for Canonical {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.cell, self.port)
    }
}

/// Alias for parameter bindings of a primitive instantiation.
pub type Binding = SmallVec<[(Id, u64); 4]>;

/// The prototype backing an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellType {
    /// Leaf primitive. The simulator resolves the name to an implementation;
    /// the structure only records the signature-level facts.
    Primitive {
        /// Name of the primitive used to instantiate this cell.
        name: Id,
        /// Bindings for the parameters. Ordered to retain the input order.
        param_binding: Binding,
        /// True iff this is a combinational primitive.
        is_comb: bool,
    },
    /// Cell constructed from another weft component.
    Component {
        /// Name of the component used to instantiate this cell.
        name: Id,
    },
    /// Cell representing a constant source.
    Constant {
        /// Value of this constant.
        val: u64,
        /// Width of this constant.
        width: u64,
    },
}

impl CellType {
    /// Return the prototype name, if present.
    pub fn get_name(&self) -> Option<Id> {
        match self {
            CellType::Primitive { name, .. } | CellType::Component { name } => Some(*name),
            CellType::Constant { .. } => None,
        }
    }

    /// Generate string representation of CellType appropriate for error
    /// messages.
    pub fn surface_name(&self) -> Option<String> {
        match self {
            CellType::Primitive {
                name,
                param_binding,
                ..
            } => Some(format!(
                "{}({})",
                name,
                param_binding.iter().map(|(_, v)| v.to_string()).join(", ")
            )),
            CellType::Component { name } => Some(name.to_string()),
            CellType::Constant { .. } => None,
        }
    }
}

/// An instantiated cell: a named sub-instance of a component.
#[derive(Debug, Clone)]
pub struct Cell {
    /// Name of this cell.
    name: Id,
    /// Ports on this cell, in declaration order.
    pub ports: SmallVec<[PortDef; 8]>,
    /// Underlying prototype for this cell.
    pub prototype: CellType,
}

impl Cell {
    pub fn new(name: Id, prototype: CellType, ports: impl IntoIterator<Item = PortDef>) -> Self {
        Self {
            name,
            ports: ports.into_iter().collect(),
            prototype,
        }
    }

    pub fn name(&self) -> Id {
        self.name
    }

    /// Find a port on this cell by name.
    pub fn get_port(&self, name: Id) -> Option<&PortDef> {
        self.ports.iter().find(|p| p.name == name)
    }

    /// All input ports of this cell, in declaration order.
    pub fn input_ports(&self) -> impl Iterator<Item = &PortDef> {
        self.ports
            .iter()
            .filter(|p| p.direction == Direction::Input)
    }

    /// All output ports of this cell, in declaration order.
    pub fn output_ports(&self) -> impl Iterator<Item = &PortDef> {
        self.ports
            .iter()
            .filter(|p| p.direction == Direction::Output)
    }

    /// True iff this cell is a combinational leaf.
    pub fn is_comb_cell(&self) -> bool {
        matches!(
            self.prototype,
            CellType::Primitive { is_comb: true, .. } | CellType::Constant { .. }
        )
    }
}

/// A directed wire between two ports. Endpoint widths match exactly; this is
/// checked when the wire is added to a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wire {
    pub src: PortRef,
    pub dst: PortRef,
}

/// A guarded assignment in the lowered hardware view: `dst = guard ? src`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// The destination for the assignment.
    pub dst: PortRef,
    /// The source for the assignment.
    pub src: PortRef,
    /// The guard for the assignment.
    pub guard: Guard,
}

impl Assignment {
    pub fn new(dst: PortRef, src: PortRef, guard: Guard) -> Self {
        Self { dst, src, guard }
    }
}
