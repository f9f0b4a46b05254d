//! Stateful leaf primitives: registers and indexed memories.

use super::prim_utils::{get_input, get_input_or_low, get_param};
use super::{IdlePolicy, Named, Primitive};
use crate::environment::PrimitiveState;
use crate::values::Value;
use weft_ir::{Binding, Direction, PortDef};
use weft_utils::{bits_needed_for, Error, Id, WeftResult};

/// A register.
///
/// On a step where it is active and `write_en` is asserted it commits `in`
/// to memory, outputs the newly committed value, and asserts `done` for
/// exactly that step. This register documents the echo-last-value contract:
/// on non-committing and inactive steps, `out` carries the last committed
/// value while `done` stays low.
#[derive(Debug)]
pub struct StdReg {
    pub width: u64,
    full_name: Id,
    ports: Vec<PortDef>,
}

impl StdReg {
    pub fn new(params: &Binding, full_name: Id) -> Self {
        let width = get_param(params, "WIDTH")
            .expect("Missing `WIDTH` param from std_reg binding");
        StdReg {
            width,
            full_name,
            ports: vec![
                PortDef::new("in", width, Direction::Input),
                PortDef::new("write_en", 1, Direction::Input),
                PortDef::new("out", width, Direction::Output),
                PortDef::new("done", 1, Direction::Output),
            ],
        }
    }
}

impl Named for StdReg {
    fn get_full_name(&self) -> Id {
        self.full_name
    }
}

impl Primitive for StdReg {
    fn is_comb(&self) -> bool {
        false
    }

    fn ports(&self) -> &[PortDef] {
        &self.ports
    }

    fn idle_policy(&self) -> IdlePolicy {
        IdlePolicy::EchoLast
    }

    fn initial_state(&self) -> PrimitiveState {
        PrimitiveState::Register {
            data: Value::zeroes(self.width),
        }
    }

    fn validate(&self, inputs: &[(Id, Value)]) -> WeftResult<()> {
        for (id, v) in inputs {
            let expected = match id.as_str() {
                "in" => self.width,
                "write_en" => 1,
                _ => continue,
            };
            if v.width() != expected {
                return Err(Error::Misc(format!(
                    "{}: input {} has width {} but expects {}",
                    self.full_name,
                    id,
                    v.width(),
                    expected
                )));
            }
        }
        Ok(())
    }

    fn execute(
        &self,
        inputs: &[(Id, Value)],
        state: &mut PrimitiveState,
    ) -> WeftResult<Vec<(Id, Value)>> {
        let PrimitiveState::Register { data } = state else {
            return Err(Error::Misc(format!(
                "{}: register state is missing",
                self.full_name
            )));
        };
        let write_en = get_input_or_low(inputs, "write_en").as_bool();
        // a disabled data input cannot commit
        match (write_en, get_input(inputs, "in")) {
            (true, Some(input)) => {
                *data = input;
                Ok(vec![
                    (Id::new("out"), input),
                    (Id::new("done"), Value::bit_high()),
                ])
            }
            _ => Ok(vec![
                (Id::new("out"), *data),
                (Id::new("done"), Value::bit_low()),
            ]),
        }
    }

    fn idle_outputs(&self, state: &PrimitiveState) -> Vec<(Id, Value)> {
        match state {
            PrimitiveState::Register { data } => vec![(Id::new("out"), *data)],
            _ => Vec::new(),
        }
    }
}

/// A bounds-checked, address-indexed memory.
///
/// Reads are combinational at `addr` on any active step; writes follow the
/// register contract (`write_en` commits, `done` pulses for the commit
/// step). Addressing beyond the declared size is a fatal
/// [Error::OutOfBoundsAccess]. When inactive the memory presents disabled
/// outputs.
#[derive(Debug)]
pub struct StdMem {
    pub width: u64,
    pub size: u64,
    full_name: Id,
    ports: Vec<PortDef>,
}

impl StdMem {
    pub fn new(params: &Binding, full_name: Id) -> Self {
        let width = get_param(params, "WIDTH")
            .expect("Missing `WIDTH` param from std_mem binding");
        let size = get_param(params, "SIZE")
            .expect("Missing `SIZE` param from std_mem binding");
        let idx_width = bits_needed_for(size);
        StdMem {
            width,
            size,
            full_name,
            ports: vec![
                PortDef::new("addr", idx_width, Direction::Input),
                PortDef::new("write_data", width, Direction::Input),
                PortDef::new("write_en", 1, Direction::Input),
                PortDef::new("read_data", width, Direction::Output),
                PortDef::new("done", 1, Direction::Output),
            ],
        }
    }
}

impl Named for StdMem {
    fn get_full_name(&self) -> Id {
        self.full_name
    }
}

impl Primitive for StdMem {
    fn is_comb(&self) -> bool {
        false
    }

    fn ports(&self) -> &[PortDef] {
        &self.ports
    }

    fn initial_state(&self) -> PrimitiveState {
        PrimitiveState::Memory {
            data: vec![Value::zeroes(self.width); self.size as usize],
        }
    }

    fn validate(&self, inputs: &[(Id, Value)]) -> WeftResult<()> {
        for (id, v) in inputs {
            let expected = match id.as_str() {
                "addr" => bits_needed_for(self.size),
                "write_data" => self.width,
                "write_en" => 1,
                _ => continue,
            };
            if v.width() != expected {
                return Err(Error::Misc(format!(
                    "{}: input {} has width {} but expects {}",
                    self.full_name,
                    id,
                    v.width(),
                    expected
                )));
            }
        }
        Ok(())
    }

    fn execute(
        &self,
        inputs: &[(Id, Value)],
        state: &mut PrimitiveState,
    ) -> WeftResult<Vec<(Id, Value)>> {
        let PrimitiveState::Memory { data } = state else {
            return Err(Error::Misc(format!(
                "{}: memory state is missing",
                self.full_name
            )));
        };
        let Some(addr) = get_input(inputs, "addr").map(|v| v.as_u64()) else {
            // no address settled yet: nothing to read
            return Ok(vec![(Id::new("done"), Value::bit_low())]);
        };
        if addr >= self.size {
            return Err(Error::OutOfBoundsAccess {
                instance: self.full_name,
                addr,
                size: self.size,
            });
        }
        let write_en = get_input_or_low(inputs, "write_en").as_bool();
        match (write_en, get_input(inputs, "write_data")) {
            (true, Some(input)) => {
                data[addr as usize] = input;
                Ok(vec![
                    (Id::new("read_data"), input),
                    (Id::new("done"), Value::bit_high()),
                ])
            }
            _ => Ok(vec![
                (Id::new("read_data"), data[addr as usize]),
                (Id::new("done"), Value::bit_low()),
            ]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn register_commits_and_echoes() {
        let reg = StdReg::new(&smallvec![(Id::new("WIDTH"), 8)], Id::new("r0"));
        let mut state = reg.initial_state();

        let outs = reg
            .execute(
                &[
                    (Id::new("in"), Value::from(5, 8)),
                    (Id::new("write_en"), Value::bit_high()),
                ],
                &mut state,
            )
            .unwrap();
        assert!(outs.contains(&(Id::new("out"), Value::from(5, 8))));
        assert!(outs.contains(&(Id::new("done"), Value::bit_high())));

        // write_en low: echo the committed value, done stays low
        let outs = reg
            .execute(
                &[
                    (Id::new("in"), Value::from(9, 8)),
                    (Id::new("write_en"), Value::bit_low()),
                ],
                &mut state,
            )
            .unwrap();
        assert!(outs.contains(&(Id::new("out"), Value::from(5, 8))));
        assert!(outs.contains(&(Id::new("done"), Value::bit_low())));
    }

    #[test]
    fn memory_bounds_are_checked() {
        let mem = StdMem::new(
            &smallvec![(Id::new("WIDTH"), 8), (Id::new("SIZE"), 3)],
            Id::new("m0"),
        );
        let mut state = mem.initial_state();
        let err = mem
            .execute(&[(Id::new("addr"), Value::from(3, 2))], &mut state)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::OutOfBoundsAccess { addr: 3, size: 3, .. }
        ));
    }

    #[test]
    fn memory_reads_back_writes() {
        let mem = StdMem::new(
            &smallvec![(Id::new("WIDTH"), 8), (Id::new("SIZE"), 4)],
            Id::new("m0"),
        );
        let mut state = mem.initial_state();
        mem.execute(
            &[
                (Id::new("addr"), Value::from(2, 2)),
                (Id::new("write_data"), Value::from(7, 8)),
                (Id::new("write_en"), Value::bit_high()),
            ],
            &mut state,
        )
        .unwrap();
        let outs = mem
            .execute(&[(Id::new("addr"), Value::from(2, 2))], &mut state)
            .unwrap();
        assert!(outs.contains(&(Id::new("read_data"), Value::from(7, 8))));
    }
}
