use thiserror::Error;

/// The single error type shared by every component of the compiler, the
/// memory image builder and the golden model.
#[derive(Error, Debug)]
pub enum AccelError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    #[error("unsupported graph: {0}")]
    UnsupportedGraph(String),

    #[error("image overflow: {region} needs {needed} bytes but only {available} are available before the next region")]
    ImageOverflow {
        region: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("padding violation: row {row} of tensor {tensor:?} has a non-zero byte at padded offset {offset}")]
    PaddingViolation {
        tensor: String,
        row: usize,
        offset: usize,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed hex image: {0}")]
    MalformedImage(String),

    /// Only raised when the simulator is configured to treat unknown
    /// opcodes as fatal; the hardware-faithful default is to log and
    /// continue (see [`crate::simulator::Simulator`]).
    #[error("unknown opcode 0x{0:02X}")]
    UnknownOpcode(u8),
}

pub type AccelResult<T> = Result<T, AccelError>;
