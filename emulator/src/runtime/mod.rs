//! Instruction execution engine.
//!
//! The [`Processor`] is the integer unit: it owns the register file, the
//! memory, the coprocessor and the loaded program, and drives the
//! fetch/execute/dispatch loop. Everything is exclusively owned; there is
//! one execution context and no shared state.

use tracing::{debug, info};

use crate::constants as C;
use crate::program::{Instruction, JumpTable, Program, Unit};
use crate::terminal::Terminal;

mod coprocessor;
mod exception;
mod instructions;
mod memory;
mod registers;
mod syscall;

pub use self::coprocessor::Coprocessor;
pub use self::exception::{Fault, Interrupt, InterruptSink, RunError};
pub use self::memory::{Memory, MemoryError};
pub use self::registers::{Flags, FloatReg, Reg, RegisterParseError, Registers};
pub use self::syscall::Syscall;

/// Outcome of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Halt,
}

pub struct Processor {
    pub registers: Registers,
    pub memory: Memory,
    coprocessor: Coprocessor,

    /// Instruction pointer, in instruction positions
    pub ip: C::Word,

    /// Data pointer: boundary between static data and the dynamic heap
    pub dp: C::Word,

    /// High and low halves of the last widening multiply
    pub hi: C::Word,
    pub lo: C::Word,

    pub flags: Flags,

    /// xoshiro256** generator state
    rng: [u64; 4],

    instructions: Vec<Instruction>,
    jump_table: JumpTable,
    heap_start: C::Word,
    executing: bool,
    dispatch_enabled: bool,

    terminal: Box<dyn Terminal>,
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("ip", &self.ip)
            .field("dp", &self.dp)
            .field("flags", &self.flags)
            .field("registers", &self.registers)
            .finish_non_exhaustive()
    }
}

impl Processor {
    #[must_use]
    pub fn new(terminal: Box<dyn Terminal>) -> Self {
        Self {
            registers: Registers::default(),
            memory: Memory::default(),
            coprocessor: Coprocessor::default(),
            ip: 0,
            dp: C::DATA_START,
            hi: 0,
            lo: 0,
            flags: Flags::empty(),
            rng: [0; 4],
            instructions: Vec::new(),
            jump_table: JumpTable::default(),
            heap_start: C::DATA_START,
            executing: false,
            dispatch_enabled: false,
            terminal,
        }
    }

    #[must_use]
    pub fn coprocessor(&self) -> &Coprocessor {
        &self.coprocessor
    }

    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    #[must_use]
    pub fn jump_table(&self) -> &JumpTable {
        &self.jump_table
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.executing
    }

    /// Reset every register and the generator state. Memory is left alone;
    /// the session layer decides when to clear it.
    pub fn reset(&mut self) {
        self.registers.reset();
        self.coprocessor.reset();
        self.flags = Flags::empty();
        self.ip = 0;
        self.dp = C::DATA_START;
        self.hi = 0;
        self.lo = 0;
        self.rng = [0; 4];
        self.executing = false;
        self.dispatch_enabled = false;
    }

    /// Install a program: reset the integer state, copy the data segment to
    /// [`crate::constants::DATA_START`], point `dp` just past it and leave
    /// the machine ready to step from the entry point.
    ///
    /// # Errors
    ///
    /// Fails if the data segment does not fit in memory.
    pub fn load(&mut self, program: &Program) -> Result<(), MemoryError> {
        self.reset();
        self.instructions = program.instructions().to_vec();
        self.jump_table = *program.jump_table();
        self.memory.load_data(program.data(), C::DATA_START)?;
        self.dp = C::DATA_START + program.data().len() as C::Word;
        self.heap_start = self.dp;
        self.ip = C::Word::from(self.jump_table.entry());
        self.executing = true;
        self.dispatch_enabled = true;
        info!(
            instructions = self.instructions.len(),
            data = program.data().len(),
            "program loaded"
        );
        Ok(())
    }

    /// Run from the entry point until the program halts or the instruction
    /// pointer leaves the program.
    ///
    /// # Errors
    ///
    /// Stops at the first fatal condition; the error carries the position of
    /// the failing instruction.
    #[tracing::instrument(skip(self))]
    pub fn run(&mut self) -> Result<(), RunError> {
        self.executing = true;
        self.dispatch_enabled = true;
        self.ip = C::Word::from(self.jump_table.entry());
        self.flags = Flags::empty();
        while self.executing && self.in_range() {
            self.step()?;
        }
        Ok(())
    }

    fn in_range(&self) -> bool {
        usize::try_from(self.ip).is_ok_and(|position| position < self.instructions.len())
    }

    /// Fetch, execute, then check for pending interrupts. Strictly in that
    /// order: dispatch never runs mid-instruction.
    ///
    /// # Errors
    ///
    /// Returns the fatal condition that stopped execution, if any.
    pub fn step(&mut self) -> Result<Step, RunError> {
        let position = self.ip;
        let Some(current) = usize::try_from(position)
            .ok()
            .and_then(|index| self.instructions.get(index))
            .copied()
        else {
            return Ok(Step::Halt);
        };
        self.ip += 1;
        debug!(position, instruction = %current, "executing");

        let result = match current.opcode.unit() {
            Unit::Integer => self.execute(&current),
            Unit::Float => {
                let Self {
                    coprocessor,
                    memory,
                    registers,
                    flags,
                    ..
                } = self;
                coprocessor
                    .execute(&current, memory, registers, flags)
                    .map(|()| Step::Continue)
            }
        };
        let step = result.map_err(|kind| {
            self.executing = false;
            RunError { position, kind }
        })?;

        self.dispatch_interrupts().map_err(|kind| {
            self.executing = false;
            RunError { position, kind }
        })?;
        Ok(step)
    }

    /// Serve the highest pending interrupt, if dispatch is enabled and a
    /// handler is installed. Unhandled causes stay pending and are retried
    /// on the next step.
    fn dispatch_interrupts(&mut self) -> Result<(), Fault> {
        if !self.dispatch_enabled {
            return Ok(());
        }
        let Some(cause) = self.flags.highest_pending() else {
            return Ok(());
        };
        if let Some(handler) = self.jump_table.handler(cause) {
            debug!(cause, handler, "dispatching interrupt");
            self.push_word(self.ip)?;
            self.ip = C::Word::from(handler);
            self.flags.clear_index(cause);
        }
        Ok(())
    }
}
