//! The synchronization leaf primitive: a single-slot, two-writer/two-reader
//! blocking store with round-robin arbitration.

use super::prim_utils::{get_input, get_input_or_low, get_param};
use super::{IdlePolicy, Named, Primitive};
use crate::environment::PrimitiveState;
use crate::values::Value;
use weft_ir::{Binding, Direction, PortDef};
use weft_utils::{Error, Id, WeftResult};

/// A two-writer/two-reader single-slot synchronizer.
///
/// The slot is either full or empty. A write blocks (its done stays low)
/// while the slot is full; a read blocks while it is empty. Within one step,
/// reads resolve against the incoming slot first and writes may then fill
/// the freed slot, so a full slot can turn over in a single step.
/// Simultaneous double-writes (and double-reads) are resolved by a
/// round-robin arbiter whose priority alternates across repeated conflicting
/// steps, so neither side is starved. The non-consuming `peek` output
/// carries the last committed value at all times, including while the
/// instance is inactive.
#[derive(Debug)]
pub struct StdSync {
    pub width: u64,
    full_name: Id,
    ports: Vec<PortDef>,
}

impl StdSync {
    pub fn new(params: &Binding, full_name: Id) -> Self {
        let width = get_param(params, "WIDTH")
            .expect("Missing `WIDTH` param from std_sync binding");
        StdSync {
            width,
            full_name,
            ports: vec![
                PortDef::new("write_0_data", width, Direction::Input),
                PortDef::new("write_0_en", 1, Direction::Input),
                PortDef::new("write_1_data", width, Direction::Input),
                PortDef::new("write_1_en", 1, Direction::Input),
                PortDef::new("read_0_en", 1, Direction::Input),
                PortDef::new("read_1_en", 1, Direction::Input),
                PortDef::new("write_0_done", 1, Direction::Output),
                PortDef::new("write_1_done", 1, Direction::Output),
                PortDef::new("read_0_data", width, Direction::Output),
                PortDef::new("read_0_done", 1, Direction::Output),
                PortDef::new("read_1_data", width, Direction::Output),
                PortDef::new("read_1_done", 1, Direction::Output),
                PortDef::new("peek", width, Direction::Output),
            ],
        }
    }
}

impl Named for StdSync {
    fn get_full_name(&self) -> Id {
        self.full_name
    }
}

impl Primitive for StdSync {
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
        PrimitiveState::Sync {
            slot: None,
            last: Value::zeroes(self.width),
            write_turn: false,
            read_turn: false,
        }
    }

    fn validate(&self, inputs: &[(Id, Value)]) -> WeftResult<()> {
        for (id, v) in inputs {
            let expected = match id.as_str() {
                "write_0_data" | "write_1_data" => self.width,
                "write_0_en" | "write_1_en" | "read_0_en" | "read_1_en" => 1,
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
        let PrimitiveState::Sync {
            slot,
            last,
            write_turn,
            read_turn,
        } = state
        else {
            return Err(Error::Misc(format!(
                "{}: synchronizer state is missing",
                self.full_name
            )));
        };

        let r0 = get_input_or_low(inputs, "read_0_en").as_bool();
        let r1 = get_input_or_low(inputs, "read_1_en").as_bool();
        let w0 = get_input_or_low(inputs, "write_0_en").as_bool();
        let w1 = get_input_or_low(inputs, "write_1_en").as_bool();

        let mut outs: Vec<(Id, Value)> = Vec::new();

        // Reads resolve against the incoming slot.
        let mut read_winner = None;
        if slot.is_some() && (r0 || r1) {
            let winner_is_zero = if r0 && r1 {
                // contended: the turn decides, then alternates
                let w = !*read_turn;
                *read_turn = !*read_turn;
                w
            } else {
                r0
            };
            let value = slot.take().unwrap();
            read_winner = Some((winner_is_zero, value));
        }
        match read_winner {
            Some((true, value)) => {
                outs.push((Id::new("read_0_data"), value));
                outs.push((Id::new("read_0_done"), Value::bit_high()));
                outs.push((Id::new("read_1_done"), Value::bit_low()));
            }
            Some((false, value)) => {
                outs.push((Id::new("read_1_data"), value));
                outs.push((Id::new("read_1_done"), Value::bit_high()));
                outs.push((Id::new("read_0_done"), Value::bit_low()));
            }
            None => {
                outs.push((Id::new("read_0_done"), Value::bit_low()));
                outs.push((Id::new("read_1_done"), Value::bit_low()));
            }
        }

        // Writes fill the (possibly just freed) slot.
        let mut w0_done = false;
        let mut w1_done = false;
        if slot.is_none() && (w0 || w1) {
            let winner_is_zero = if w0 && w1 {
                let w = !*write_turn;
                *write_turn = !*write_turn;
                w
            } else {
                w0
            };
            let data = if winner_is_zero {
                get_input(inputs, "write_0_data")
            } else {
                get_input(inputs, "write_1_data")
            };
            // a write without settled data stays blocked
            if let Some(data) = data {
                *slot = Some(data);
                *last = data;
                if winner_is_zero {
                    w0_done = true;
                } else {
                    w1_done = true;
                }
            }
        }
        outs.push((Id::new("write_0_done"), Value::from(w0_done as u64, 1)));
        outs.push((Id::new("write_1_done"), Value::from(w1_done as u64, 1)));

        outs.push((Id::new("peek"), *last));
        Ok(outs)
    }

    fn idle_outputs(&self, state: &PrimitiveState) -> Vec<(Id, Value)> {
        match state {
            PrimitiveState::Sync { last, .. } => vec![(Id::new("peek"), *last)],
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn sync() -> StdSync {
        StdSync::new(&smallvec![(Id::new("WIDTH"), 8)], Id::new("chan"))
    }

    fn done(outs: &[(Id, Value)], port: &str) -> bool {
        outs.iter()
            .find(|(id, _)| id.as_str() == port)
            .map(|(_, v)| v.as_bool())
            .unwrap_or(false)
    }

    #[test]
    fn double_write_is_arbitrated_round_robin() {
        let chan = sync();
        let mut state = chan.initial_state();
        let both_write = [
            (Id::new("write_0_data"), Value::from(1, 8)),
            (Id::new("write_0_en"), Value::bit_high()),
            (Id::new("write_1_data"), Value::from(2, 8)),
            (Id::new("write_1_en"), Value::bit_high()),
            (Id::new("read_0_en"), Value::bit_high()),
        ];

        // writer 0 has first priority; the reader drains the slot each step
        let outs = chan.execute(&both_write, &mut state).unwrap();
        assert!(done(&outs, "write_0_done"));
        assert!(!done(&outs, "write_1_done"));

        let outs = chan.execute(&both_write, &mut state).unwrap();
        assert!(done(&outs, "read_0_done"));
        assert!(!done(&outs, "write_0_done"));
        assert!(done(&outs, "write_1_done"));

        let outs = chan.execute(&both_write, &mut state).unwrap();
        assert!(done(&outs, "write_0_done"));
    }

    #[test]
    fn writes_block_while_full_and_reads_while_empty() {
        let chan = sync();
        let mut state = chan.initial_state();

        // read on empty blocks
        let outs = chan
            .execute(&[(Id::new("read_0_en"), Value::bit_high())], &mut state)
            .unwrap();
        assert!(!done(&outs, "read_0_done"));

        // first write lands
        let outs = chan
            .execute(
                &[
                    (Id::new("write_0_data"), Value::from(7, 8)),
                    (Id::new("write_0_en"), Value::bit_high()),
                ],
                &mut state,
            )
            .unwrap();
        assert!(done(&outs, "write_0_done"));

        // second write blocks while full
        let outs = chan
            .execute(
                &[
                    (Id::new("write_0_data"), Value::from(9, 8)),
                    (Id::new("write_0_en"), Value::bit_high()),
                ],
                &mut state,
            )
            .unwrap();
        assert!(!done(&outs, "write_0_done"));

        // peek is non-consuming and shows the last committed value
        let outs = chan.execute(&[], &mut state).unwrap();
        let peek = outs
            .iter()
            .find(|(id, _)| id.as_str() == "peek")
            .unwrap()
            .1;
        assert_eq!(peek.as_u64(), 7);
        let outs = chan
            .execute(&[(Id::new("read_0_en"), Value::bit_high())], &mut state)
            .unwrap();
        assert!(done(&outs, "read_0_done"));
    }
}
