use crate::values::Value;
use weft_ir::Binding;
use weft_utils::Id;

/// Look up a parameter in a binding by name.
pub fn get_param<S>(params: &Binding, target: S) -> Option<u64>
where
    S: AsRef<str>,
{
    params.iter().find_map(|(id, x)| {
        if id.as_str() == target.as_ref() {
            Some(*x)
        } else {
            None
        }
    })
}

/// Look up an input value by port name.
pub fn get_input<S>(inputs: &[(Id, Value)], target: S) -> Option<Value>
where
    S: AsRef<str>,
{
    inputs.iter().find_map(|(id, v)| {
        if id.as_str() == target.as_ref() {
            Some(*v)
        } else {
            None
        }
    })
}

/// Look up a one-bit control input, treating a missing or disabled input as
/// low.
pub fn get_input_or_low<S>(inputs: &[(Id, Value)], target: S) -> Value
where
    S: AsRef<str>,
{
    get_input(inputs, target).unwrap_or_else(Value::bit_low)
}
