use parse_display::Display;
use thiserror::Error;

use super::memory::MemoryError;
use crate::constants as C;
use crate::program::Opcode;

/// A signaled condition.
///
/// Raising one sets a bit in the flags register; execution continues and the
/// dispatch step decides what to do with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Interrupt {
    #[display("division by zero")]
    DivisionByZero,

    #[display("invalid argument")]
    InvalidArgument,

    #[display("floating point error")]
    FpuError,

    #[display("I/O interrupt")]
    Io,
}

impl Interrupt {
    /// Bit index of the cause in the flags register.
    #[must_use]
    pub const fn index(self) -> u8 {
        match self {
            Self::DivisionByZero => 0,
            Self::InvalidArgument => 1,
            Self::FpuError => 2,
            Self::Io => 3,
        }
    }
}

/// Capability to signal an interrupt without owning the processor.
///
/// Handed to the coprocessor at execution time in place of a back reference
/// to the integer unit.
pub trait InterruptSink {
    fn raise(&mut self, cause: Interrupt);
}

/// A fatal condition. Each one immediately stops execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("unknown or unsupported opcode {0}")]
    UnknownOpcode(Opcode),

    #[error("invalid register index {index}")]
    InvalidRegister { index: u8 },

    #[error("invalid float register index {index}")]
    InvalidFloatRegister { index: u8 },

    #[error("unknown system routine {selector}")]
    UnknownSyscall { selector: C::Word },

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("float memory access outside the device range at address {address}")]
    FloatAccess { address: C::Word },

    #[error("string read past the end of memory without a terminator")]
    UnterminatedString,

    #[error("program exited with code {code}")]
    Exit { code: C::Word },
}

/// A fatal error together with the position of the instruction that caused
/// it. This is the stop reason reported when a run ends abnormally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} (instruction {position})")]
pub struct RunError {
    pub position: C::Word,
    pub kind: Fault,
}
