//! Combinational leaf primitives.

use super::{Named, Primitive};
use crate::configuration::SETTINGS;
use crate::environment::PrimitiveState;
use crate::values::Value;
use crate::{comb_predicate, comb_primitive};
use weft_ir::{Binding, Direction, PortDef};
use weft_utils::{Error, Id, WeftResult};

// ===================== Unsigned binary operations ======================

/// Unsigned adder. Wraps at the output width unless the
/// `error_on_overflow` setting is on.
//
// Hand-written rather than via `comb_primitive!` because the body needs
// access to `self` (for `full_name`), which a `macro_rules!` body cannot
// reach across macro hygiene. The generated shape is otherwise identical.
#[derive(Debug)]
#[allow(non_snake_case)]
pub struct StdAdd {
    WIDTH: u64,
    full_name: Id,
    ports: Vec<PortDef>,
}

impl StdAdd {
    pub fn new(params: &Binding, full_name: Id) -> Self {
        let WIDTH = super::prim_utils::get_param(params, "WIDTH")
            .unwrap_or_else(|| panic!("Missing `WIDTH` param from StdAdd binding"));
        let ports = vec![
            PortDef::new("left", WIDTH, Direction::Input),
            PortDef::new("right", WIDTH, Direction::Input),
            PortDef::new("out", WIDTH, Direction::Output),
        ];
        Self {
            WIDTH,
            full_name,
            ports,
        }
    }
}

impl Named for StdAdd {
    fn get_full_name(&self) -> Id {
        self.full_name
    }
}

impl Primitive for StdAdd {
    fn is_comb(&self) -> bool {
        true
    }

    fn ports(&self) -> &[PortDef] {
        &self.ports
    }

    fn validate(&self, inputs: &[(Id, Value)]) -> WeftResult<()> {
        for (id, v) in inputs {
            match id.as_str() {
                "left" | "right" => {
                    if v.width() != self.WIDTH {
                        return Err(Error::Misc(format!(
                            "{}: input {} has width {} but expects {}",
                            self.full_name,
                            id,
                            v.width(),
                            self.WIDTH
                        )));
                    }
                }
                p => {
                    return Err(Error::PortNotFound {
                        instance: self.full_name,
                        port: Id::new(p),
                    })
                }
            }
        }
        Ok(())
    }

    #[allow(non_snake_case)]
    fn execute(
        &self,
        inputs: &[(Id, Value)],
        _state: &mut PrimitiveState,
    ) -> WeftResult<Vec<(Id, Value)>> {
        let left: Value = super::prim_utils::get_input(inputs, "left")
            .ok_or_else(|| Error::Misc(format!("{}: no value for port left", self.full_name)))?;
        let right: Value = super::prim_utils::get_input(inputs, "right")
            .ok_or_else(|| Error::Misc(format!("{}: no value for port right", self.full_name)))?;
        let WIDTH: u64 = self.WIDTH;
        let out: Value = {
            let sum = left.as_u64().wrapping_add(right.as_u64());
            let (out, overflow) = Value::from_checked(sum, WIDTH);
            if overflow && SETTINGS.read().unwrap().error_on_overflow {
                Err(Error::Overflow(self.full_name))
            } else {
                Ok(out)
            }
        }?;
        Ok(vec![(Id::new("out"), out)])
    }
}

comb_primitive!(
    /// Truncating subtractor over naturals: the result never goes below
    /// zero.
    StdSub[WIDTH](left: WIDTH, right: WIDTH) -> (out: WIDTH) {
    Ok(Value::from(left.as_u64().saturating_sub(right.as_u64()), WIDTH))
});

// ===================== Logic ======================
comb_primitive!(StdAnd[WIDTH](left: WIDTH, right: WIDTH) -> (out: WIDTH) {
    Ok(Value::from(left.as_u64() & right.as_u64(), WIDTH))
});

comb_primitive!(StdOr[WIDTH](left: WIDTH, right: WIDTH) -> (out: WIDTH) {
    Ok(Value::from(left.as_u64() | right.as_u64(), WIDTH))
});

// ===================== Unsigned comparisons ======================
comb_predicate!(StdGt[WIDTH](left: WIDTH, right: WIDTH) {
    Ok(left.as_u64() > right.as_u64())
});

comb_predicate!(StdLt[WIDTH](left: WIDTH, right: WIDTH) {
    Ok(left.as_u64() < right.as_u64())
});

comb_predicate!(StdEq[WIDTH](left: WIDTH, right: WIDTH) {
    Ok(left == right)
});

comb_predicate!(StdNeq[WIDTH](left: WIDTH, right: WIDTH) {
    Ok(left != right)
});

comb_predicate!(StdGe[WIDTH](left: WIDTH, right: WIDTH) {
    Ok(left.as_u64() >= right.as_u64())
});

comb_predicate!(StdLe[WIDTH](left: WIDTH, right: WIDTH) {
    Ok(left.as_u64() <= right.as_u64())
});

// ===================== Unary operations ======================

/// Bitwise complement.
#[derive(Debug)]
pub struct StdNot {
    width: u64,
    full_name: Id,
    ports: Vec<PortDef>,
}

impl StdNot {
    pub fn new(params: &Binding, full_name: Id) -> Self {
        let width = super::prim_utils::get_param(params, "WIDTH")
            .expect("Missing `WIDTH` param from std_not binding");
        Self {
            width,
            full_name,
            ports: vec![
                PortDef::new("in", width, Direction::Input),
                PortDef::new("out", width, Direction::Output),
            ],
        }
    }
}

impl Named for StdNot {
    fn get_full_name(&self) -> Id {
        self.full_name
    }
}

impl Primitive for StdNot {
    fn is_comb(&self) -> bool {
        true
    }

    fn ports(&self) -> &[PortDef] {
        &self.ports
    }

    fn validate(&self, inputs: &[(Id, Value)]) -> WeftResult<()> {
        for (id, v) in inputs {
            if id.as_str() == "in" && v.width() != self.width {
                return Err(Error::Misc(format!(
                    "{}: input {} has width {} but expects {}",
                    self.full_name,
                    id,
                    v.width(),
                    self.width
                )));
            }
        }
        Ok(())
    }

    fn execute(
        &self,
        inputs: &[(Id, Value)],
        _state: &mut PrimitiveState,
    ) -> WeftResult<Vec<(Id, Value)>> {
        let input = super::prim_utils::get_input(inputs, "in").ok_or_else(|| {
            Error::Misc(format!("{}: no value for port in", self.full_name))
        })?;
        Ok(vec![(
            Id::new("out"),
            Value::from(!input.as_u64(), self.width),
        )])
    }
}

/// Bit slice: truncates the input to the (narrower) output width.
#[derive(Debug)]
pub struct StdSlice {
    in_width: u64,
    out_width: u64,
    full_name: Id,
    ports: Vec<PortDef>,
}

impl StdSlice {
    pub fn new(params: &Binding, full_name: Id) -> Self {
        let in_width = super::prim_utils::get_param(params, "IN_WIDTH")
            .expect("Missing `IN_WIDTH` param from std_slice binding");
        let out_width = super::prim_utils::get_param(params, "OUT_WIDTH")
            .expect("Missing `OUT_WIDTH` param from std_slice binding");
        Self {
            in_width,
            out_width,
            full_name,
            ports: vec![
                PortDef::new("in", in_width, Direction::Input),
                PortDef::new("out", out_width, Direction::Output),
            ],
        }
    }
}

impl Named for StdSlice {
    fn get_full_name(&self) -> Id {
        self.full_name
    }
}

impl Primitive for StdSlice {
    fn is_comb(&self) -> bool {
        true
    }

    fn ports(&self) -> &[PortDef] {
        &self.ports
    }

    fn validate(&self, inputs: &[(Id, Value)]) -> WeftResult<()> {
        for (id, v) in inputs {
            if id.as_str() == "in" && v.width() != self.in_width {
                return Err(Error::Misc(format!(
                    "{}: input {} has width {} but expects {}",
                    self.full_name,
                    id,
                    v.width(),
                    self.in_width
                )));
            }
        }
        Ok(())
    }

    fn execute(
        &self,
        inputs: &[(Id, Value)],
        _state: &mut PrimitiveState,
    ) -> WeftResult<Vec<(Id, Value)>> {
        let input = super::prim_utils::get_input(inputs, "in").ok_or_else(|| {
            Error::Misc(format!("{}: no value for port in", self.full_name))
        })?;
        Ok(vec![(Id::new("out"), input.truncate(self.out_width))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn binding(width: u64) -> Binding {
        smallvec![(Id::new("WIDTH"), width)]
    }

    fn run(prim: &dyn Primitive, inputs: &[(Id, Value)]) -> Value {
        let mut state = PrimitiveState::Empty;
        let outs = prim.validate_and_execute(inputs, &mut state).unwrap();
        outs[0].1
    }

    #[test]
    fn add_wraps_at_width() {
        let add = StdAdd::new(&binding(4), Id::new("add0"));
        let out = run(
            &add,
            &[
                (Id::new("left"), Value::from(9, 4)),
                (Id::new("right"), Value::from(9, 4)),
            ],
        );
        assert_eq!(out.as_u64(), 2);
    }

    #[test]
    fn sub_truncates_at_zero() {
        let sub = StdSub::new(&binding(8), Id::new("sub0"));
        let out = run(
            &sub,
            &[
                (Id::new("left"), Value::from(3, 8)),
                (Id::new("right"), Value::from(7, 8)),
            ],
        );
        assert_eq!(out.as_u64(), 0);
    }

    #[test]
    fn comparator_out_is_one_bit() {
        let gt = StdGt::new(&binding(8), Id::new("gt0"));
        let out = run(
            &gt,
            &[
                (Id::new("left"), Value::from(5, 8)),
                (Id::new("right"), Value::from(2, 8)),
            ],
        );
        assert_eq!(out.width(), 1);
        assert!(out.as_bool());
    }

    #[test]
    fn validate_rejects_wrong_widths() {
        let add = StdAdd::new(&binding(8), Id::new("add0"));
        let err = add
            .validate(&[(Id::new("left"), Value::from(1, 4))])
            .unwrap_err();
        assert!(matches!(err, Error::Misc(_)));
    }
}
