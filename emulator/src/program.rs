//! Compiled program representation.
//!
//! The assembler produces a [`Program`]: an immutable instruction sequence,
//! the static data segment and the jump table. The processor's loader is the
//! only consumer.

use parse_display::{Display, FromStr};

use crate::constants as C;

/// Execution unit an opcode is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    /// Executed by the integer unit
    Integer,

    /// Delegated to the floating point coprocessor
    Float,
}

/// Operation selector of an instruction.
///
/// Mnemonics are the upper-case variant names; the assembler folds case
/// before parsing them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, FromStr)]
#[display(style = "UPPERCASE")]
pub enum Opcode {
    Nop,
    Add,
    Sub,
    Addi,
    Subi,
    Mul,
    Mult,
    Multi,
    Div,
    Divi,
    Mod,
    Modi,
    And,
    Andi,
    Or,
    Ori,
    Xor,
    Xori,
    Not,
    Lsb,
    Rsb,
    Mov,
    Movi,
    Seq,
    Snq,
    Slt,
    Sgt,
    Chk,
    Clf,
    Beq,
    Bnq,
    Bgt,
    Blt,
    Jmp,
    Jr,
    Jal,
    Jst,
    Rst,
    Lw,
    Sw,
    Push,
    Pop,
    Mfh,
    Mfl,
    Sir,
    Syscall,
    Break,
    Halt,
    Addf,
    Subf,
    Mulf,
    Divf,
    Addfi,
    Subfi,
    Mulfi,
    Divfi,
    Sqrf,
    Powf,
    Cosf,
    Senf,
    Tanf,
    Invf,
    Expf,
    Seqf,
    Snqf,
    Sltf,
    Sgtf,
    Snan,
    Movf,
    Movfi,
    Lfm,
    Sfm,
}

impl Opcode {
    /// The unit that executes this opcode.
    ///
    /// The tag is an explicit property of each opcode, not a property of the
    /// variant order.
    #[must_use]
    pub const fn unit(self) -> Unit {
        match self {
            Self::Addf
            | Self::Subf
            | Self::Mulf
            | Self::Divf
            | Self::Addfi
            | Self::Subfi
            | Self::Mulfi
            | Self::Divfi
            | Self::Sqrf
            | Self::Powf
            | Self::Cosf
            | Self::Senf
            | Self::Tanf
            | Self::Invf
            | Self::Expf
            | Self::Seqf
            | Self::Snqf
            | Self::Sltf
            | Self::Sgtf
            | Self::Snan
            | Self::Movf
            | Self::Movfi
            | Self::Lfm
            | Self::Sfm => Unit::Float,
            _ => Unit::Integer,
        }
    }
}

/// A fixed-width machine instruction: one opcode and seven operand bytes.
///
/// The encoding is the same for every opcode; the executing unit decides
/// what the bytes mean. `b2`..`b4` carry register indices, `b5`..`b8` hold
/// a 32-bit big-endian immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub b2: u8,
    pub b3: u8,
    pub b4: u8,
    pub b5: u8,
    pub b6: u8,
    pub b7: u8,
    pub b8: u8,
}

impl Instruction {
    #[must_use]
    pub const fn new(opcode: Opcode, operands: [u8; 7]) -> Self {
        Self {
            opcode,
            b2: operands[0],
            b3: operands[1],
            b4: operands[2],
            b5: operands[3],
            b6: operands[4],
            b7: operands[5],
            b8: operands[6],
        }
    }

    /// The immediate field, as a signed value.
    #[must_use]
    pub const fn imm(&self) -> i32 {
        i32::from_be_bytes([self.b5, self.b6, self.b7, self.b8])
    }

    /// The immediate field, zero extended.
    #[must_use]
    pub const fn imm_unsigned(&self) -> u32 {
        u32::from_be_bytes([self.b5, self.b6, self.b7, self.b8])
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:<7} {},{},{},{}",
            self.opcode.to_string(),
            self.b2,
            self.b3,
            self.b4,
            self.imm()
        )
    }
}

/// Entry points of a compiled program: the main entry position plus one
/// optional handler position per interrupt cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpTable {
    entry: u32,
    handlers: [Option<u32>; C::INTERRUPT_COUNT as usize],
}

impl Default for JumpTable {
    fn default() -> Self {
        Self {
            entry: 0,
            handlers: [None; C::INTERRUPT_COUNT as usize],
        }
    }
}

impl JumpTable {
    /// Position of the program entry point. Defaults to the first
    /// instruction when no `main:` label was given.
    #[must_use]
    pub const fn entry(&self) -> u32 {
        self.entry
    }

    /// Position of the service routine installed for a cause, if any.
    #[must_use]
    pub fn handler(&self, cause: u8) -> Option<u32> {
        self.handlers.get(usize::from(cause)).copied().flatten()
    }

    pub(crate) fn set_entry(&mut self, position: u32) {
        self.entry = position;
    }

    pub(crate) fn set_handler(&mut self, cause: u8, position: u32) {
        if let Some(slot) = self.handlers.get_mut(usize::from(cause)) {
            *slot = Some(position);
        }
    }
}

/// The immutable result of a successful assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    instructions: Vec<Instruction>,
    data: Vec<u8>,
    jump_table: JumpTable,
}

impl Program {
    pub(crate) fn new(instructions: Vec<Instruction>, data: Vec<u8>, jump_table: JumpTable) -> Self {
        Self {
            instructions,
            data,
            jump_table,
        }
    }

    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// The data segment, copied to [`crate::constants::DATA_START`] at load.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn jump_table(&self) -> &JumpTable {
        &self.jump_table
    }
}

impl std::fmt::Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "program, {} instructions", self.instructions.len())?;
        writeln!(f, "----------------")?;
        for (position, instruction) in self.instructions.iter().enumerate() {
            writeln!(f, "{position:>4}: {instruction}")?;
        }
        write!(f, "----------------")
    }
}
