//! Environment for the interpreter: the state threaded through a run.

use crate::stamped::StampedValue;
use crate::values::Value;
use ahash::AHashMap;
use weft_ir::{Component, InstanceIdx, PortRef};
use weft_utils::{Error, WeftResult};

/// Persistent memory carried by a stateful instance. Lives in the
/// [Environment] so that parallel forks copy it by value and the merge can
/// compare branch states structurally. Memory is the only thing that may
/// outlive a single top-level invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveState {
    /// Combinational instances carry no state.
    Empty,
    /// A single committed word.
    Register { data: Value },
    /// An address-indexed word store.
    Memory { data: Vec<Value> },
    /// The synchronizer's slot, arbitration turns, and last committed value.
    Sync {
        slot: Option<Value>,
        last: Value,
        write_turn: bool,
        read_turn: bool,
    },
    /// The persistent environment of a compound sub-instance.
    Nested(Box<Environment>),
}

/// The state threaded through a run: a mapping from every `(instance, port)`
/// to its current [StampedValue], plus persistent memory per stateful
/// instance. Created fresh per top-level invocation and threaded
/// functionally; parallel branches fork it with [Clone] and are recombined
/// with [Environment::merge_many].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Environment {
    /// Count of logical steps this environment has advanced through.
    pub clk: u64,
    port_map: AHashMap<PortRef, StampedValue>,
    state_map: AHashMap<InstanceIdx, PrimitiveState>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current stamp on a port, if any.
    pub fn get(&self, port: PortRef) -> Option<&StampedValue> {
        self.port_map.get(&port)
    }

    /// Bind a stamp to a port.
    pub fn set(&mut self, port: PortRef, value: StampedValue) {
        self.port_map.insert(port, value);
    }

    /// Seed a graph-level input with an externally supplied value.
    pub fn set_input(&mut self, port: impl Into<weft_utils::Id>, value: Value) {
        let clk = self.clk;
        self.set(PortRef::this(port), StampedValue::new(value, clk));
    }

    /// Remove a binding, returning the port to "no value".
    pub fn unset(&mut self, port: PortRef) {
        self.port_map.remove(&port);
    }

    /// The persistent state of an instance, if any has been committed.
    pub fn state_of(&self, idx: InstanceIdx) -> Option<&PrimitiveState> {
        self.state_map.get(&idx)
    }

    /// Commit the persistent state of an instance.
    pub fn set_state(&mut self, idx: InstanceIdx, state: PrimitiveState) {
        self.state_map.insert(idx, state);
    }

    /// All port bindings, in no particular order.
    pub fn ports(&self) -> impl Iterator<Item = (&PortRef, &StampedValue)> {
        self.port_map.iter()
    }

    /// Combine the results of parallel branches forked from `base`.
    ///
    /// Port bindings follow the per-wire rule in [StampedValue::merge];
    /// persistent state uses the same shape relative to the fork point: a
    /// branch that left an entry at its base value yields to one that
    /// changed it, agreeing changes collapse, and disagreeing changes are a
    /// [Error::WriteConflict]. The fold is commutative and associative, so
    /// branch order never matters.
    pub fn merge_many(
        comp: &Component,
        base: Environment,
        branches: Vec<Environment>,
    ) -> WeftResult<Environment> {
        let mut merged = base.clone();
        for branch in branches {
            let Environment {
                clk,
                port_map,
                state_map,
            } = branch;
            merged.clk = merged.clk.max(clk);

            for (port, val) in port_map {
                if base.port_map.get(&port) == Some(&val) {
                    // unchanged relative to the fork point
                    continue;
                }
                let base_val = base.port_map.get(&port).copied();
                let existing = merged.port_map.get(&port).copied();
                if existing == base_val {
                    // first branch to touch this wire
                    merged.port_map.insert(port, val);
                } else if let Some(cur) = existing {
                    match StampedValue::merge(&cur, &val) {
                        Ok(resolved) => {
                            merged.port_map.insert(port, resolved);
                        }
                        Err((left, right)) => {
                            return Err(Error::WriteConflict {
                                port: comp.canonical(port).to_string(),
                                left: left.to_string(),
                                right: right.to_string(),
                            });
                        }
                    }
                } else {
                    merged.port_map.insert(port, val);
                }
            }

            for (idx, st) in state_map {
                if base.state_map.get(&idx) == Some(&st) {
                    continue;
                }
                let existing_is_base = merged.state_map.get(&idx) == base.state_map.get(&idx);
                if existing_is_base {
                    merged.state_map.insert(idx, st);
                } else if merged.state_map.get(&idx) == Some(&st) {
                    // agreeing branches
                } else {
                    return Err(Error::WriteConflict {
                        port: comp.cell(idx).name().to_string(),
                        left: format!("{:?}", merged.state_map.get(&idx)),
                        right: format!("{:?}", st),
                    });
                }
            }
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_ir::{CellType, Direction, PortDef};

    fn comp_with_cell() -> (Component, InstanceIdx) {
        let mut comp = Component::new("top");
        let idx = comp.instantiate(
            "r0",
            CellType::Constant { val: 0, width: 8 },
            [PortDef::new("out", 8, Direction::Output)],
        );
        (comp, idx)
    }

    fn stamp(val: u64) -> StampedValue {
        StampedValue::new(Value::from(val, 8), 0)
    }

    #[test]
    fn merge_takes_the_single_writer() {
        let (comp, idx) = comp_with_cell();
        let base = Environment::new();
        let port = PortRef::new(idx, "out");

        let mut b1 = base.clone();
        b1.set(port, stamp(7));
        let b2 = base.clone();

        let merged = Environment::merge_many(&comp, base, vec![b1, b2]).unwrap();
        assert_eq!(merged.get(port), Some(&stamp(7)));
    }

    #[test]
    fn merge_detects_disagreeing_branches() {
        let (comp, idx) = comp_with_cell();
        let base = Environment::new();
        let port = PortRef::new(idx, "out");

        let mut b1 = base.clone();
        b1.set(port, stamp(1));
        let mut b2 = base.clone();
        b2.set(port, stamp(2));

        let err = Environment::merge_many(&comp, base, vec![b1, b2]).unwrap_err();
        match err {
            Error::WriteConflict { port, .. } => assert_eq!(port, "r0.out"),
            e => panic!("expected a write conflict, got {}", e),
        }
    }

    #[test]
    fn merge_accepts_agreeing_branches() {
        let (comp, idx) = comp_with_cell();
        let base = Environment::new();
        let port = PortRef::new(idx, "out");

        let mut b1 = base.clone();
        b1.set(port, stamp(3));
        let mut b2 = base.clone();
        b2.set(port, stamp(3));

        let merged = Environment::merge_many(&comp, base, vec![b1, b2]).unwrap();
        assert_eq!(merged.get(port), Some(&stamp(3)));
    }

    #[test]
    fn merge_combines_disjoint_state_writes() {
        let (comp, idx) = comp_with_cell();
        let mut base = Environment::new();
        base.set_state(
            idx,
            PrimitiveState::Register {
                data: Value::zeroes(8),
            },
        );

        let mut b1 = base.clone();
        b1.set_state(
            idx,
            PrimitiveState::Register {
                data: Value::from(9, 8),
            },
        );
        let b2 = base.clone();

        let merged = Environment::merge_many(&comp, base, vec![b2, b1]).unwrap();
        assert_eq!(
            merged.state_of(idx),
            Some(&PrimitiveState::Register {
                data: Value::from(9, 8)
            })
        );
    }

    #[test]
    fn merge_rejects_disagreeing_state_writes() {
        let (comp, idx) = comp_with_cell();
        let base = Environment::new();

        let mut b1 = base.clone();
        b1.set_state(
            idx,
            PrimitiveState::Register {
                data: Value::from(1, 8),
            },
        );
        let mut b2 = base.clone();
        b2.set_state(
            idx,
            PrimitiveState::Register {
                data: Value::from(2, 8),
            },
        );

        assert!(Environment::merge_many(&comp, base, vec![b1, b2]).is_err());
    }
}
