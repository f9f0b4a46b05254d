//! Bulk load and dump of indexed-memory contents, for test fixtures and
//! external drivers.

use crate::environment::{Environment, PrimitiveState};
use crate::primitives::prim_utils::get_param;
use crate::values::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use weft_ir::{CellType, Component, Id};
use weft_utils::{Error, WeftResult};

/// An external memory image: memory instance name to word values. Ordered so
/// dumps are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryImage(pub BTreeMap<String, Vec<u64>>);

impl MemoryImage {
    /// Parse an image from its JSON form.
    pub fn from_json(json: &str) -> WeftResult<Self> {
        serde_json::from_str(json).map_err(|e| Error::misc(format!("invalid memory image: {}", e)))
    }

    /// Render the image as JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("memory image serialization cannot fail")
    }
}

/// Load an initial image into the memories it names.
pub fn load_image(env: &mut Environment, comp: &Component, image: &MemoryImage) -> WeftResult<()> {
    for (name, words) in &image.0 {
        let idx = comp.find_cell(Id::new(name)).ok_or(Error::PortNotFound {
            instance: comp.name,
            port: Id::new(name),
        })?;
        let cell = comp.cell(idx);
        let CellType::Primitive { param_binding, .. } = &cell.prototype else {
            return Err(Error::misc(format!("{} is not a memory instance", name)));
        };
        let width = get_param(param_binding, "WIDTH")
            .ok_or_else(|| Error::misc(format!("{} is not a memory instance", name)))?;
        let size = get_param(param_binding, "SIZE")
            .ok_or_else(|| Error::misc(format!("{} is not a memory instance", name)))?;
        if words.len() as u64 != size {
            return Err(Error::misc(format!(
                "memory {} expects {} entries, but the image supplies {}",
                name,
                size,
                words.len()
            )));
        }
        env.set_state(
            idx,
            PrimitiveState::Memory {
                data: words.iter().map(|w| Value::from(*w, width)).collect(),
            },
        );
    }
    Ok(())
}

/// Dump the final contents of every memory instance in the component.
pub fn dump_image(env: &Environment, comp: &Component) -> MemoryImage {
    let mut image = BTreeMap::new();
    for (idx, cell) in comp.cells() {
        if let Some(PrimitiveState::Memory { data }) = env.state_of(idx) {
            image.insert(
                cell.name().to_string(),
                data.iter().map(Value::as_u64).collect(),
            );
        }
    }
    MemoryImage(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::add_primitive;

    #[test]
    fn image_round_trips_through_the_environment() {
        let mut comp = Component::new("top");
        add_primitive(&mut comp, "m0", "std_mem", &[("WIDTH", 8), ("SIZE", 4)]).unwrap();

        let image = MemoryImage::from_json(r#"{"m0": [1, 2, 3, 4]}"#).unwrap();
        let mut env = Environment::new();
        load_image(&mut env, &comp, &image).unwrap();

        assert_eq!(dump_image(&env, &comp), image);
    }

    #[test]
    fn image_size_must_match() {
        let mut comp = Component::new("top");
        add_primitive(&mut comp, "m0", "std_mem", &[("WIDTH", 8), ("SIZE", 4)]).unwrap();

        let image = MemoryImage::from_json(r#"{"m0": [1, 2]}"#).unwrap();
        let mut env = Environment::new();
        assert!(load_image(&mut env, &comp, &image).is_err());
    }
}
