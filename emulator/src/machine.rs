//! Session layer around a single processor.
//!
//! Keeps the registry of assembled programs, drives load/run/step, does the
//! pointer bookkeeping for the memory-mapped I/O region and exposes the
//! register and memory snapshots an outer interface displays.

use std::collections::HashMap;

use thiserror::Error;
use tracing::info;

use crate::assembler::{self, AssemblyError};
use crate::constants as C;
use crate::program::Program;
use crate::runtime::{Interrupt, InterruptSink as _, Processor, RunError, Step};
use crate::terminal::{Console, Terminal};

#[derive(Debug, Error)]
pub enum MachineError {
    #[error("no program named {0}")]
    UnknownProgram(String),

    #[error("no program loaded")]
    NothingLoaded,

    #[error("I/O port {0} does not exist")]
    InvalidPort(u32),

    #[error(transparent)]
    Memory(#[from] crate::runtime::MemoryError),

    #[error(transparent)]
    Run(#[from] RunError),
}

pub struct Machine {
    processor: Processor,
    programs: HashMap<String, Program>,
    loaded: Option<String>,
    write_pointer: u64,
    read_pointer: u64,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new(Box::new(Console))
    }
}

impl Machine {
    #[must_use]
    pub fn new(terminal: Box<dyn Terminal>) -> Self {
        Self {
            processor: Processor::new(terminal),
            programs: HashMap::new(),
            loaded: None,
            write_pointer: 0,
            read_pointer: 0,
        }
    }

    /// Assemble a source and register the program under a name.
    ///
    /// # Errors
    ///
    /// Returns every diagnostic when the source does not assemble; nothing
    /// is registered in that case.
    pub fn assemble(&mut self, name: &str, source: &str) -> Result<(), Vec<AssemblyError>> {
        let program = assembler::assemble(source)?;
        info!(
            name,
            instructions = program.instructions().len(),
            "program assembled"
        );
        self.programs.insert(name.to_string(), program);
        Ok(())
    }

    #[must_use]
    pub fn program(&self, name: &str) -> Option<&Program> {
        self.programs.get(name)
    }

    #[must_use]
    pub fn processor(&self) -> &Processor {
        &self.processor
    }

    #[must_use]
    pub fn loaded(&self) -> Option<&str> {
        self.loaded.as_deref()
    }

    /// Load a registered program, clearing whatever the previous one left
    /// behind.
    ///
    /// # Errors
    ///
    /// Fails on an unknown name or a data segment that does not fit.
    pub fn load(&mut self, name: &str) -> Result<(), MachineError> {
        let program = self
            .programs
            .get(name)
            .cloned()
            .ok_or_else(|| MachineError::UnknownProgram(name.to_string()))?;
        if self.loaded.take().is_some() {
            self.processor.memory.reset();
            self.write_pointer = 0;
            self.read_pointer = 0;
        }
        self.processor.load(&program)?;
        self.loaded = Some(name.to_string());
        Ok(())
    }

    /// Load and run a registered program to completion.
    ///
    /// # Errors
    ///
    /// Propagates load failures and the fatal condition that stopped the
    /// run, if any.
    pub fn run(&mut self, name: &str) -> Result<(), MachineError> {
        self.load(name)?;
        self.processor.run()?;
        Ok(())
    }

    /// Execute a single instruction of the loaded program.
    ///
    /// # Errors
    ///
    /// Fails when nothing is loaded, or with the fatal condition that
    /// stopped execution.
    pub fn step(&mut self) -> Result<Step, MachineError> {
        if self.loaded.is_none() {
            return Err(MachineError::NothingLoaded);
        }
        Ok(self.processor.step()?)
    }

    /// Write a word to an I/O port.
    ///
    /// Ports 0 to 7 are the fixed word ports; port 9 appends to the
    /// circular buffer; port 10 is the interrupt-triggering port.
    ///
    /// # Errors
    ///
    /// Fails on any other port number.
    pub fn write_port(&mut self, port: u32, word: C::Word) -> Result<(), MachineError> {
        match port {
            _ if port < C::IO_PORT_COUNT => {
                let address = C::IO_PORTS_START + C::Address::from(port) * 8;
                self.processor.memory.write_word(address, word)?;
            }
            9 => {
                let slot = self.write_pointer % C::IO_BUFFER_WORDS;
                self.processor
                    .memory
                    .write_word(C::IO_BUFFER_START + slot * 8, word)?;
                self.write_pointer += 1;
            }
            10 => {
                self.processor.memory.write_word(C::IO_INTERRUPT_PORT, word)?;
                self.processor.flags.raise(Interrupt::Io);
            }
            _ => return Err(MachineError::InvalidPort(port)),
        }
        Ok(())
    }

    /// Read a word back from an I/O port, advancing the buffer's read
    /// pointer for port 9.
    ///
    /// # Errors
    ///
    /// Fails on a port number outside the mapped region.
    pub fn read_port(&mut self, port: u32) -> Result<C::Word, MachineError> {
        match port {
            _ if port < C::IO_PORT_COUNT => {
                let address = C::IO_PORTS_START + C::Address::from(port) * 8;
                Ok(self.processor.memory.read_word(address)?)
            }
            9 => {
                let slot = self.read_pointer % C::IO_BUFFER_WORDS;
                self.read_pointer += 1;
                Ok(self
                    .processor
                    .memory
                    .read_word(C::IO_BUFFER_START + slot * 8)?)
            }
            10 => Ok(self.processor.memory.read_word(C::IO_INTERRUPT_PORT)?),
            _ => Err(MachineError::InvalidPort(port)),
        }
    }

    /// Snapshot a run of memory words.
    ///
    /// # Errors
    ///
    /// Fails if the run leaves memory.
    pub fn read_memory(&self, address: C::Address, words: usize) -> Result<Vec<C::Word>, MachineError> {
        Ok(self.processor.memory.read_words(address, words)?)
    }

    /// Snapshot a run of memory words reinterpreted as doubles.
    ///
    /// # Errors
    ///
    /// Fails if the run leaves memory.
    pub fn read_memory_doubles(
        &self,
        address: C::Address,
        words: usize,
    ) -> Result<Vec<f64>, MachineError> {
        Ok(self.processor.memory.read_doubles(address, words)?)
    }

    /// Forget every registered program.
    pub fn clear_programs(&mut self) {
        self.programs.clear();
    }

    /// Reset the whole machine: processor, memory and I/O pointers. The
    /// program registry is kept.
    pub fn reset(&mut self) {
        self.processor.reset();
        self.processor.memory.reset();
        self.loaded = None;
        self.write_pointer = 0;
        self.read_pointer = 0;
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::runtime::{Flags, Reg};

    #[test]
    fn registry_test() {
        let mut machine = Machine::default();
        machine.assemble("answer", "main:\nmovi $g0,42\nhalt\n").unwrap();

        assert!(machine.program("answer").is_some());
        assert!(matches!(
            machine.run("missing"),
            Err(MachineError::UnknownProgram(_))
        ));

        machine.run("answer").unwrap();
        assert_eq!(machine.processor().registers.get(Reg::G0), 42);
    }

    #[test]
    fn step_requires_loaded_program_test() {
        let mut machine = Machine::default();
        assert!(matches!(machine.step(), Err(MachineError::NothingLoaded)));

        machine.assemble("p", "main:\nnop\nhalt\n").unwrap();
        machine.load("p").unwrap();
        assert_eq!(machine.step().unwrap(), Step::Continue);
        assert_eq!(machine.step().unwrap(), Step::Halt);
    }

    #[test]
    fn word_ports_test() {
        let mut machine = Machine::default();
        machine.write_port(0, 11).unwrap();
        machine.write_port(7, 77).unwrap();

        assert_eq!(machine.read_port(0).unwrap(), 11);
        assert_eq!(machine.read_port(7).unwrap(), 77);
        assert_eq!(
            machine.processor().memory.read_word(C::IO_PORTS_START + 56).unwrap(),
            77
        );
        assert!(matches!(
            machine.write_port(8, 1),
            Err(MachineError::InvalidPort(8))
        ));
        assert!(matches!(
            machine.read_port(11),
            Err(MachineError::InvalidPort(11))
        ));
    }

    #[test]
    fn circular_buffer_test() {
        let mut machine = Machine::default();
        for value in 0..9 {
            machine.write_port(9, 100 + value).unwrap();
        }
        // Eight and nine wrapped around over slot 0 and 1
        assert_eq!(machine.read_port(9).unwrap(), 107);
        assert_eq!(machine.read_port(9).unwrap(), 108);
        assert_eq!(machine.read_port(9).unwrap(), 102);
    }

    #[test]
    fn interrupt_port_test() {
        let mut machine = Machine::default();
        machine.write_port(10, 5).unwrap();

        assert_eq!(machine.processor().flags, Flags::IO);
        assert_eq!(machine.read_port(10).unwrap(), 5);
    }

    #[test]
    fn interrupt_port_drives_isr_test() {
        let mut machine = Machine::default();
        machine
            .assemble(
                "isr",
                "main:\nnop\nnop\nhalt\nisr_3:\nmovi $g5,1\nhalt\n",
            )
            .unwrap();
        machine.load("isr").unwrap();

        machine.write_port(10, 1).unwrap();
        machine.step().unwrap();
        machine.step().unwrap();
        assert_eq!(machine.processor().registers.get(Reg::G5), 1);
        assert!(machine.processor().flags.is_empty());
    }

    #[test]
    fn reload_clears_memory_test() {
        let mut machine = Machine::default();
        machine
            .assemble("data", ".data\nvalue: .word 7\n.code\nmain:\nhalt\n")
            .unwrap();
        machine.assemble("empty", "main:\nhalt\n").unwrap();

        machine.run("data").unwrap();
        assert_eq!(machine.read_memory(C::DATA_START, 1).unwrap(), vec![7]);

        machine.load("empty").unwrap();
        assert_eq!(machine.read_memory(C::DATA_START, 1).unwrap(), vec![0]);
    }

    #[test]
    fn reset_test() {
        let mut machine = Machine::default();
        machine.assemble("p", "main:\nmovi $g0,1\nhalt\n").unwrap();
        machine.run("p").unwrap();
        machine.write_port(9, 1).unwrap();

        machine.reset();
        assert_eq!(machine.loaded(), None);
        assert_eq!(machine.processor().registers.get(Reg::G0), 0);
        assert!(machine.program("p").is_some());
        assert!(matches!(machine.step(), Err(MachineError::NothingLoaded)));
    }
}
