use crate::environment::PrimitiveState;
use crate::values::Value;
use weft_ir::{Direction, PortDef};
use weft_utils::{Id, WeftResult};

/// A trait indicating that the thing has a name.
pub trait Named {
    fn get_full_name(&self) -> Id;
}

/// What an inactive (or non-committing) stateful instance presents on its
/// outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdlePolicy {
    /// Outputs are the disabled stamp.
    Disabled,
    /// Outputs echo the last committed memory value.
    EchoLast,
}

/// A leaf primitive of the interpreter.
///
/// A primitive is a pure function from its current inputs to its outputs
/// within one step; stateful primitives additionally read and write the
/// [PrimitiveState] passed to [Primitive::execute], which is the only memory
/// they have. Implementations never hold mutable state of their own, so
/// parallel forks of the environment can merge primitive state by value.
pub trait Primitive: Named {
    /// Returns true if this primitive is combinational.
    fn is_comb(&self) -> bool;

    /// The primitive's ports. The inputs are the statically declared
    /// required-input list the stabilizer resolves before execution.
    fn ports(&self) -> &[PortDef];

    /// The input ports, in declaration order.
    fn input_ports(&self) -> Vec<Id> {
        self.ports()
            .iter()
            .filter(|p| p.direction == Direction::Input)
            .map(|p| p.name)
            .collect()
    }

    /// Idle-output policy for steps where the instance is inactive.
    fn idle_policy(&self) -> IdlePolicy {
        IdlePolicy::Disabled
    }

    /// Fresh persistent state for an instance of this primitive.
    fn initial_state(&self) -> PrimitiveState {
        PrimitiveState::Empty
    }

    /// Validate inputs to the primitive.
    fn validate(&self, inputs: &[(Id, Value)]) -> WeftResult<()>;

    /// Execute the primitive against the gathered (enabled) inputs.
    fn execute(
        &self,
        inputs: &[(Id, Value)],
        state: &mut PrimitiveState,
    ) -> WeftResult<Vec<(Id, Value)>>;

    /// Validate and then execute the primitive.
    fn validate_and_execute(
        &self,
        inputs: &[(Id, Value)],
        state: &mut PrimitiveState,
    ) -> WeftResult<Vec<(Id, Value)>> {
        self.validate(inputs)?;
        self.execute(inputs, state)
    }

    /// Outputs presented while idle under [IdlePolicy::EchoLast]. Ports
    /// omitted from the result read as disabled.
    fn idle_outputs(&self, _state: &PrimitiveState) -> Vec<(Id, Value)> {
        Vec::new()
    }
}
