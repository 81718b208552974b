pub type Word = u64;
pub type Address = u64;

/// Total size of the machine memory, in bytes
pub const MEMORY_SIZE: Address = 4096;

/// Everything below this address belongs to the system
pub const SYSTEM_RESERVED: Address = 128;

/// First of the eight word-sized memory-mapped I/O ports
pub const IO_PORTS_START: Address = 128;

/// Number of word-sized I/O ports
pub const IO_PORT_COUNT: u32 = 8;

/// Start of the circular I/O buffer
pub const IO_BUFFER_START: Address = 192;

/// Number of word slots in the circular I/O buffer
pub const IO_BUFFER_WORDS: u64 = 7;

/// Word-sized port whose write triggers an I/O interrupt
pub const IO_INTERRUPT_PORT: Address = 248;

/// Start of program-owned memory; the data segment is copied here at load
pub const DATA_START: Address = 256;

/// Initial value of the stack pointer
pub const STACK_INIT: Address = MEMORY_SIZE - 1;

/// Number of causes in the interrupt flags register
pub const INTERRUPT_COUNT: u8 = 8;
