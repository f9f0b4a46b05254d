//! The error taxonomy shared by graph construction, simulation, and lowering.

use crate::Id;
use thiserror::Error;

/// Utility result type used across the weft crates.
pub type WeftResult<T> = Result<T, Error>;

/// Errors raised by the weft crates. Every variant is fatal for the enclosing
/// construction or run; diagnostics carry the original instance/port names.
#[derive(Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// A wire connects two ports of unequal width. Raised at graph-build time.
    #[error(
        "width mismatch on wire {src} -> {dst}: source is {src_width} bits but destination is {dst_width} bits"
    )]
    WidthMismatch {
        src: String,
        dst: String,
        src_width: u64,
        dst_width: u64,
    },

    /// A referenced port does not exist on the named instance.
    #[error("port not found: {instance}.{port}")]
    PortNotFound { instance: Id, port: Id },

    /// A `split_port` request whose split point is not strictly inside the
    /// port's width.
    #[error(
        "invalid split point {split_point} for port {port}: must lie strictly between 0 and {width}"
    )]
    InvalidSplitPoint {
        port: Id,
        split_point: u64,
        width: u64,
    },

    /// Two enabled parallel branches disagree on the value of one wire.
    #[error(
        "write conflict on {port}:
     1. {left}
     2. {right}"
    )]
    WriteConflict {
        port: String,
        left: String,
        right: String,
    },

    /// An indexed memory was addressed beyond its declared size.
    #[error("out of bounds access on {instance}: address {addr} exceeds size {size}")]
    OutOfBoundsAccess { instance: Id, addr: u64, size: u64 },

    /// More than one driver of a signal can be live at the same time. Raised
    /// by build-time wiring checks and by the static guard-exclusivity
    /// analysis over lowered netlists.
    #[error(
        "multiple drivers for signal {signal}:
     1. {first}
     2. {second}"
    )]
    MultipleDrivers {
        signal: String,
        first: String,
        second: String,
    },

    /// No implementation is registered for the named leaf primitive.
    #[error("no primitive implementation named {0}")]
    MissingPrimitive(Id),

    /// A computation exceeded the width of its output port.
    #[error("computation overflowed its width in {0}")]
    Overflow(Id),

    /// A nonspecific error, used for arbitrary messages.
    #[error("{0}")]
    Misc(String),
}

// needed to make the program print something sensible when returning
// a result from `main`
impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self, f)
    }
}

impl Error {
    pub fn misc(msg: impl ToString) -> Self {
        Error::Misc(msg.to_string())
    }
}
