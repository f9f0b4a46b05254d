//! Timestamped port values and the per-wire merge rule.

use crate::values::Value;

/// The value attached to one port at one logical step. `enabled = false` is
/// the absorbing "no value" marker, distinct from a zero value; a disabled
/// stamp still carries a width so downstream width reasoning stays intact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StampedValue {
    pub value: Value,
    pub timestamp: u64,
    pub enabled: bool,
}

impl StampedValue {
    /// An enabled stamp.
    pub fn new(value: Value, timestamp: u64) -> Self {
        Self {
            value,
            timestamp,
            enabled: true,
        }
    }

    /// The disabled stamp of the given width.
    pub fn disabled(width: u64, timestamp: u64) -> Self {
        Self {
            value: Value::zeroes(width),
            timestamp,
            enabled: false,
        }
    }

    pub fn width(&self) -> u64 {
        self.value.width()
    }

    /// The per-wire combination rule for independently computed states:
    ///
    /// * disabled ⊕ a = a, and symmetrically;
    /// * a ⊕ a = a;
    /// * a ⊕ b with both enabled and unequal values is a conflict, reported
    ///   to the caller as the two offending stamps.
    ///
    /// Commutative and associative, so fold order never matters.
    pub fn merge(a: &Self, b: &Self) -> Result<Self, (Self, Self)> {
        let timestamp = a.timestamp.max(b.timestamp);
        match (a.enabled, b.enabled) {
            (false, false) => Ok(StampedValue {
                timestamp,
                ..*a
            }),
            (true, false) => Ok(*a),
            (false, true) => Ok(*b),
            (true, true) if a.value == b.value => Ok(StampedValue {
                timestamp,
                ..*a
            }),
            (true, true) => Err((*a, *b)),
        }
    }
}

impl std::fmt::Display for StampedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.enabled {
            write!(f, "{} @ {}", self.value, self.timestamp)
        } else {
            write!(f, "disabled @ {}", self.timestamp)
        }
    }
}
