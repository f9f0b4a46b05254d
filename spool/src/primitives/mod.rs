pub mod combinational;
pub mod prim_utils;
mod primitive;
pub mod stateful;
pub mod sync;

pub use primitive::{IdlePolicy, Named, Primitive};

use crate::logging::{new_sublogger, warn};
use weft_ir::{Binding, CellType, Component, Direction, Id, InstanceIdx, PortDef};
use weft_utils::{Error, WeftResult};

/// Construct the implementation of a leaf primitive from its name and
/// parameter binding. This is the catalog boundary: the structure only
/// records primitive names; behavior is resolved here.
pub fn make_primitive(
    prim_name: Id,
    params: &Binding,
    cell_name: Id,
) -> WeftResult<Box<dyn Primitive>> {
    Ok(match prim_name.as_str() {
        // unsigned arith
        "std_add" => Box::new(combinational::StdAdd::new(params, cell_name)),
        "std_sub" => Box::new(combinational::StdSub::new(params, cell_name)),
        // logic
        "std_and" => Box::new(combinational::StdAnd::new(params, cell_name)),
        "std_or" => Box::new(combinational::StdOr::new(params, cell_name)),
        "std_not" => Box::new(combinational::StdNot::new(params, cell_name)),
        "std_slice" => Box::new(combinational::StdSlice::new(params, cell_name)),
        // comparators
        "std_gt" => Box::new(combinational::StdGt::new(params, cell_name)),
        "std_lt" => Box::new(combinational::StdLt::new(params, cell_name)),
        "std_eq" => Box::new(combinational::StdEq::new(params, cell_name)),
        "std_neq" => Box::new(combinational::StdNeq::new(params, cell_name)),
        "std_ge" => Box::new(combinational::StdGe::new(params, cell_name)),
        "std_le" => Box::new(combinational::StdLe::new(params, cell_name)),
        // stateful
        "std_reg" => Box::new(stateful::StdReg::new(params, cell_name)),
        "std_mem" => Box::new(stateful::StdMem::new(params, cell_name)),
        "std_sync" => Box::new(sync::StdSync::new(params, cell_name)),
        _ => return Err(Error::MissingPrimitive(prim_name)),
    })
}

/// The port signature of a leaf primitive for the given parameter binding.
pub fn signature_of(prim_name: Id, params: &Binding) -> WeftResult<Vec<PortDef>> {
    let prim = make_primitive(prim_name, params, prim_name)?;
    Ok(prim.ports().to_vec())
}

/// Instantiate a leaf primitive on a component, deriving its port signature
/// from the catalog.
pub fn add_primitive(
    comp: &mut Component,
    name: &str,
    prim: &str,
    params: &[(&str, u64)],
) -> WeftResult<InstanceIdx> {
    let binding: Binding = params.iter().map(|(k, v)| (Id::new(k), *v)).collect();
    let prim_name = Id::new(prim);
    let implementation = make_primitive(prim_name, &binding, Id::new(name)).map_err(|e| {
        let prototype = CellType::Primitive {
            name: prim_name,
            param_binding: binding.clone(),
            is_comb: false,
        };
        warn!(
            new_sublogger("primitives"),
            "failed to instantiate {}",
            prototype.surface_name().unwrap_or_default()
        );
        e
    })?;
    let ports = implementation.ports().to_vec();
    let is_comb = implementation.is_comb();
    Ok(comp.instantiate(
        Id::new(name),
        CellType::Primitive {
            name: prim_name,
            param_binding: binding,
            is_comb,
        },
        ports,
    ))
}

/// Instantiate a compound sub-component on `comp`, mirroring `sub`'s
/// boundary signature onto the new cell's ports.
pub fn add_subcomponent(comp: &mut Component, name: &str, sub: &Component) -> InstanceIdx {
    let ports: Vec<PortDef> = sub
        .boundary_ports(Direction::Input)
        .chain(sub.boundary_ports(Direction::Output))
        .cloned()
        .collect();
    comp.instantiate(Id::new(name), CellType::Component { name: sub.name }, ports)
}
