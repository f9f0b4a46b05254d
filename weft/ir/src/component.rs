//! A component: boundary ports, sub-instances, wires, and a control program.

use crate::control::Control;
use crate::structure::{
    Canonical, Cell, CellType, Direction, InstanceIdx, PortDef, PortRef, Wire,
};
use linked_hash_map::LinkedHashMap;
use smallvec::SmallVec;
use weft_utils::{Error, Id, WeftResult};

/// A contiguous slice of a parent port, produced by `split_port`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitPort {
    /// The port this sub-port was sliced out of.
    pub parent: PortRef,
    /// Least significant bit of the slice within the parent.
    pub lsb: u64,
    /// Width of the slice.
    pub width: u64,
}

/// A single component: an interface of boundary ports, an arena of
/// sub-instances, a directed wire graph over `(instance, port)` pairs, and one
/// control program. Immutable after elaboration.
#[derive(Debug, Clone)]
pub struct Component {
    /// Name of the component.
    pub name: Id,
    /// Boundary ports, in declaration order.
    signature: SmallVec<[PortDef; 8]>,
    /// The instance arena. [InstanceIdx] values index into this vector.
    cells: Vec<Cell>,
    /// The wires, in insertion order.
    wires: Vec<Wire>,
    /// Statically-built reverse wiring: destination port to its drivers.
    /// Built at `connect` time so a missing producer is a build-time error,
    /// never a simulation-time graph inversion. A port may carry several
    /// wires; at most one may be enabled in any step, which the simulator's
    /// merge rule enforces.
    drivers: LinkedHashMap<PortRef, Vec<PortRef>>,
    /// Sub-ports registered by `split_port`.
    splits: LinkedHashMap<PortRef, SplitPort>,
    /// The control program. [Control::Empty] until attached.
    pub control: Control,
}

impl Component {
    pub fn new(name: impl Into<Id>) -> Self {
        Self {
            name: name.into(),
            signature: SmallVec::new(),
            cells: Vec::new(),
            wires: Vec::new(),
            drivers: LinkedHashMap::new(),
            splits: LinkedHashMap::new(),
            control: Control::Empty,
        }
    }

    /// Declare a boundary port on this component.
    pub fn declare_port(&mut self, name: impl Into<Id>, width: u64, direction: Direction) {
        self.signature.push(PortDef::new(name, width, direction));
    }

    /// Add a named sub-instance and return its stable index.
    pub fn instantiate(
        &mut self,
        name: impl Into<Id>,
        prototype: CellType,
        ports: impl IntoIterator<Item = PortDef>,
    ) -> InstanceIdx {
        let idx = InstanceIdx::new(self.cells.len());
        self.cells.push(Cell::new(name.into(), prototype, ports));
        idx
    }

    /// Add a constant source cell, reusing an existing one of the same value
    /// and width when present. The cell exposes a single `out` port.
    pub fn add_constant(&mut self, val: u64, width: u64) -> InstanceIdx {
        let existing = self.cells.iter().position(
            |c| matches!(c.prototype, CellType::Constant { val: v, width: w } if v == val && w == width),
        );
        if let Some(idx) = existing {
            return InstanceIdx::new(idx);
        }
        let name = Id::new(format!("_{}_{}", val, width));
        self.instantiate(
            name,
            CellType::Constant { val, width },
            [PortDef::new("out", width, Direction::Output)],
        )
    }

    /// Connect `src` to `dst` with a new wire.
    ///
    /// Fails with [Error::PortNotFound] if either endpoint is undeclared and
    /// [Error::WidthMismatch] if the endpoint widths differ; there is no
    /// silent truncation. Each wire has exactly one static producer, but a
    /// destination port may collect wires from several producers: the step
    /// semantics require at most one of them to be enabled at a time.
    pub fn connect(&mut self, src: PortRef, dst: PortRef) -> WeftResult<()> {
        let src_width = self.port_width(src)?;
        let dst_width = self.port_width(dst)?;
        if src_width != dst_width {
            return Err(Error::WidthMismatch {
                src: self.canonical(src).to_string(),
                dst: self.canonical(dst).to_string(),
                src_width,
                dst_width,
            });
        }
        self.drivers.entry(dst).or_insert_with(Vec::new).push(src);
        self.wires.push(Wire { src, dst });
        Ok(())
    }

    /// Slice `port` into two contiguous sub-ports named `lo_name` (bits
    /// `[0, split_point)`) and `hi_name` (bits `[split_point, width)`).
    ///
    /// Fails with [Error::InvalidSplitPoint] unless `split_point` lies
    /// strictly between 0 and the port width, and [Error::PortNotFound] if
    /// the port does not exist. The sub-ports act as source taps: their
    /// values are bit slices of the parent's value.
    pub fn split_port(
        &mut self,
        port: PortRef,
        split_point: u64,
        lo_name: impl Into<Id>,
        hi_name: impl Into<Id>,
    ) -> WeftResult<(PortRef, PortRef)> {
        let width = self.port_width(port)?;
        if split_point == 0 || split_point >= width {
            return Err(Error::InvalidSplitPoint {
                port: port.port,
                split_point,
                width,
            });
        }
        let lo = PortRef::new(port.instance, lo_name);
        let hi = PortRef::new(port.instance, hi_name);
        self.splits.insert(
            lo,
            SplitPort {
                parent: port,
                lsb: 0,
                width: split_point,
            },
        );
        self.splits.insert(
            hi,
            SplitPort {
                parent: port,
                lsb: split_point,
                width: width - split_point,
            },
        );
        Ok((lo, hi))
    }

    /// Attach the control program.
    pub fn set_control(&mut self, control: Control) {
        self.control = control;
    }

    /// The declared width of a port, looking through boundary ports, cell
    /// ports, and registered split sub-ports.
    pub fn port_width(&self, port: PortRef) -> WeftResult<u64> {
        if let Some(split) = self.splits.get(&port) {
            return Ok(split.width);
        }
        if port.instance.is_this() {
            return self
                .signature
                .iter()
                .find(|p| p.name == port.port)
                .map(|p| p.width)
                .ok_or(Error::PortNotFound {
                    instance: self.name,
                    port: port.port,
                });
        }
        let cell = self
            .cells
            .get(port.instance.index())
            .ok_or(Error::PortNotFound {
                instance: self.name,
                port: port.port,
            })?;
        cell.get_port(port.port)
            .map(|p| p.width)
            .ok_or(Error::PortNotFound {
                instance: cell.name(),
                port: port.port,
            })
    }

    /// The canonical `instance.port` name of a port reference.
    pub fn canonical(&self, port: PortRef) -> Canonical {
        let cell = if port.instance.is_this() {
            self.name
        } else {
            self.cells
                .get(port.instance.index())
                .map(|c| c.name())
                .unwrap_or(self.name)
        };
        Canonical::new(cell, port.port)
    }

    /// The static drivers of `dst`, in connection order.
    pub fn drivers_of(&self, dst: PortRef) -> &[PortRef] {
        self.drivers.get(&dst).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The split record for a sub-port, if `port` was produced by
    /// `split_port`.
    pub fn split_of(&self, port: PortRef) -> Option<&SplitPort> {
        self.splits.get(&port)
    }

    /// The cell at the given arena index.
    pub fn cell(&self, idx: InstanceIdx) -> &Cell {
        &self.cells[idx.index()]
    }

    /// Find an instance by name.
    pub fn find_cell(&self, name: Id) -> Option<InstanceIdx> {
        self.cells
            .iter()
            .position(|c| c.name() == name)
            .map(InstanceIdx::new)
    }

    /// All instances, in arena order.
    pub fn cells(&self) -> impl Iterator<Item = (InstanceIdx, &Cell)> {
        self.cells
            .iter()
            .enumerate()
            .map(|(i, c)| (InstanceIdx::new(i), c))
    }

    /// Arena indices of all instances, in order.
    pub fn cell_indices(&self) -> impl Iterator<Item = InstanceIdx> {
        (0..self.cells.len()).map(InstanceIdx::new)
    }

    /// All wires, in insertion order.
    pub fn wires(&self) -> &[Wire] {
        &self.wires
    }

    /// The boundary ports, in declaration order.
    pub fn signature(&self) -> &[PortDef] {
        &self.signature
    }

    /// Boundary ports of the given direction, in declaration order.
    pub fn boundary_ports(&self, direction: Direction) -> impl Iterator<Item = &PortDef> {
        self.signature
            .iter()
            .filter(move |p| p.direction == direction)
    }
}

/// The elaborated context: every component definition, addressable by name.
/// Component cells reference their definitions through this table.
#[derive(Debug, Clone, Default)]
pub struct Context {
    components: Vec<Component>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_component(&mut self, comp: Component) {
        self.components.push(comp);
    }

    pub fn get(&self, name: Id) -> Option<&Component> {
        self.components.iter().find(|c| c.name == name)
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_port_cell(width_a: u64, width_b: u64) -> impl IntoIterator<Item = PortDef> {
        [
            PortDef::new("in", width_a, Direction::Input),
            PortDef::new("out", width_b, Direction::Output),
        ]
    }

    #[test]
    fn connect_rejects_width_mismatch() {
        let mut comp = Component::new("top");
        let wide = comp.instantiate(
            "wide",
            CellType::Constant { val: 0, width: 32 },
            two_port_cell(32, 32),
        );
        let narrow = comp.instantiate(
            "narrow",
            CellType::Constant { val: 0, width: 16 },
            two_port_cell(16, 16),
        );
        let err = comp
            .connect(PortRef::new(wide, "out"), PortRef::new(narrow, "in"))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::WidthMismatch {
                src_width: 32,
                dst_width: 16,
                ..
            }
        ));
    }

    #[test]
    fn connect_rejects_unknown_ports() {
        let mut comp = Component::new("top");
        let c = comp.instantiate(
            "c",
            CellType::Constant { val: 0, width: 8 },
            two_port_cell(8, 8),
        );
        let err = comp
            .connect(PortRef::new(c, "nope"), PortRef::new(c, "in"))
            .unwrap_err();
        assert!(matches!(err, Error::PortNotFound { .. }));
    }

    #[test]
    fn connect_records_every_driver_in_order() {
        let mut comp = Component::new("top");
        let a = comp.instantiate(
            "a",
            CellType::Constant { val: 1, width: 8 },
            two_port_cell(8, 8),
        );
        let b = comp.instantiate(
            "b",
            CellType::Constant { val: 2, width: 8 },
            two_port_cell(8, 8),
        );
        let sink = comp.instantiate(
            "sink",
            CellType::Constant { val: 0, width: 8 },
            two_port_cell(8, 8),
        );
        let dst = PortRef::new(sink, "in");
        comp.connect(PortRef::new(a, "out"), dst).unwrap();
        comp.connect(PortRef::new(b, "out"), dst).unwrap();
        assert_eq!(
            comp.drivers_of(dst),
            &[PortRef::new(a, "out"), PortRef::new(b, "out")]
        );
    }

    #[test]
    fn split_point_must_be_interior() {
        let mut comp = Component::new("top");
        comp.declare_port("word", 16, Direction::Input);
        for bad in [0, 16, 17] {
            let err = comp
                .split_port(PortRef::this("word"), bad, "lo", "hi")
                .unwrap_err();
            assert!(matches!(err, Error::InvalidSplitPoint { .. }));
        }
        let (lo, hi) = comp
            .split_port(PortRef::this("word"), 10, "lo", "hi")
            .unwrap();
        assert_eq!(comp.port_width(lo).unwrap(), 10);
        assert_eq!(comp.port_width(hi).unwrap(), 6);
    }

    #[test]
    fn constants_are_reused() {
        let mut comp = Component::new("top");
        let a = comp.add_constant(1, 32);
        let b = comp.add_constant(1, 32);
        let c = comp.add_constant(2, 32);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
