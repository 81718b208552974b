//! System call layer.
//!
//! One opcode, sixteen routines. The selector is read from `$a0`, the value
//! or address operand from `$a1` and, where needed, a byte count or result
//! slot from `$a2`.

use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parse_display::Display;
use tracing::debug;

use super::exception::Fault;
use super::registers::{FloatReg, Reg};
use super::{Processor, Step};
use crate::constants as C;

/// System routine selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[display(style = "SNAKE_CASE")]
pub enum Syscall {
    PrintInt,
    PrintUint,
    PrintWord,
    PrintDouble,
    PrintChar,
    PrintString,
    ReadInt,
    ReadDouble,
    ReadChar,
    ReadString,
    Alloc,
    Exit,
    Random,
    RandomSeed,
    Timestamp,
    Sleep,
}

impl Syscall {
    fn from_selector(selector: C::Word) -> Option<Self> {
        match selector {
            1 => Some(Self::PrintInt),
            2 => Some(Self::PrintUint),
            3 => Some(Self::PrintWord),
            4 => Some(Self::PrintDouble),
            5 => Some(Self::PrintChar),
            6 => Some(Self::PrintString),
            7 => Some(Self::ReadInt),
            8 => Some(Self::ReadDouble),
            9 => Some(Self::ReadChar),
            10 => Some(Self::ReadString),
            11 => Some(Self::Alloc),
            12 => Some(Self::Exit),
            13 => Some(Self::Random),
            14 => Some(Self::RandomSeed),
            15 => Some(Self::Timestamp),
            16 => Some(Self::Sleep),
            _ => None,
        }
    }
}

impl Processor {
    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    pub(super) fn system_call(&mut self) -> Result<Step, Fault> {
        let selector = self.registers.get(Reg::A0);
        let routine =
            Syscall::from_selector(selector).ok_or(Fault::UnknownSyscall { selector })?;
        debug!(%routine, "system call");

        match routine {
            Syscall::PrintInt => {
                let value = self.registers.get(Reg::A1) as i64;
                self.terminal.write(&value.to_string());
            }
            Syscall::PrintUint => {
                let value = self.registers.get(Reg::A1);
                self.terminal.write(&value.to_string());
            }
            Syscall::PrintWord => {
                let address = self.registers.get(Reg::A1);
                if address.checked_add(8).map_or(true, |end| end > C::MEMORY_SIZE) {
                    return Err(Fault::Memory(super::MemoryError::OutOfBounds(address)));
                }
                for index in 0..8 {
                    let byte = self.memory.byte(address + index).unwrap_or(u8::MAX);
                    self.terminal.write(&format!("B{index}: {byte} "));
                }
                self.terminal.write("\n");
            }
            Syscall::PrintDouble => {
                let value = self.coprocessor.get(FloatReg::D0);
                self.terminal.write(&value.to_string());
            }
            Syscall::PrintChar => {
                let unit = self.registers.get(Reg::A1) as u16;
                let character =
                    char::from_u32(u32::from(unit)).unwrap_or(char::REPLACEMENT_CHARACTER);
                self.terminal.write(&character.to_string());
            }
            Syscall::PrintString => {
                let text = self.read_string_from_memory()?;
                self.terminal.write(&text);
            }
            Syscall::ReadInt => {
                let value = self.terminal.read_int();
                self.registers.set(Reg::A1, value as C::Word);
            }
            Syscall::ReadDouble => {
                let value = self.terminal.read_double();
                self.coprocessor.set(FloatReg::D0, value);
            }
            Syscall::ReadChar => {
                let value = self.terminal.read_char();
                self.registers.set(Reg::A1, C::Word::from(u32::from(value)));
            }
            Syscall::ReadString => {
                let input = self.terminal.read_string();
                let address = self.registers.get(Reg::A1);
                let capacity = usize::try_from(self.registers.get(Reg::A2)).unwrap_or(usize::MAX);
                let bytes: Vec<u8> = input
                    .encode_utf16()
                    .flat_map(|unit| unit.to_be_bytes())
                    .take(capacity)
                    .collect();
                for (index, byte) in bytes.into_iter().enumerate() {
                    let target = address.wrapping_add(index as C::Address);
                    if !self.memory.set_byte(target, byte) {
                        return Err(Fault::Memory(super::MemoryError::OutOfBounds(target)));
                    }
                }
            }
            Syscall::Alloc => self.alloc(),
            Syscall::Exit => {
                self.executing = false;
                return Err(Fault::Exit {
                    code: self.registers.get(Reg::A1),
                });
            }
            Syscall::Random => {
                let value = self.next_random();
                self.registers.set(Reg::A1, value);
            }
            Syscall::RandomSeed => {
                let seed = self.registers.get(Reg::A1);
                self.rng = [0, seed << 32, seed >> 32, 0];
            }
            Syscall::Timestamp => {
                let millis = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|elapsed| elapsed.as_millis())
                    .unwrap_or_default();
                #[allow(clippy::cast_possible_truncation)]
                self.registers.set(Reg::A1, millis as C::Word);
            }
            Syscall::Sleep => {
                let millis = self.registers.get(Reg::A1);
                if millis > 0 {
                    thread::sleep(Duration::from_millis(millis));
                }
            }
        }
        Ok(Step::Continue)
    }

    /// Read a null-terminated two-byte-per-character string starting at the
    /// address in `$a1`, decoding `\n`, `\r`, `\t` and `\0` escapes.
    fn read_string_from_memory(&mut self) -> Result<String, Fault> {
        const BACKSLASH: u16 = b'\\' as u16;
        const ESCAPE_N: u16 = b'n' as u16;
        const ESCAPE_R: u16 = b'r' as u16;
        const ESCAPE_T: u16 = b't' as u16;
        const ESCAPE_0: u16 = b'0' as u16;

        let mut address = self.registers.get(Reg::A1);
        let mut text = String::new();
        loop {
            if address + 2 > C::MEMORY_SIZE {
                return Err(Fault::UnterminatedString);
            }
            let unit = self.memory.read_char(address)?;
            address += 2;
            if unit == 0 {
                break;
            }
            if unit == BACKSLASH {
                if address + 2 > C::MEMORY_SIZE {
                    return Err(Fault::UnterminatedString);
                }
                let escape = self.memory.read_char(address)?;
                match escape {
                    ESCAPE_N => {
                        text.push('\n');
                        address += 2;
                    }
                    ESCAPE_R => {
                        text.push('\r');
                        address += 2;
                    }
                    ESCAPE_T => {
                        text.push('\t');
                        address += 2;
                    }
                    // An escaped null terminates the string
                    ESCAPE_0 => return Ok(text),
                    // Unknown escape: the backslash is dropped
                    _ => {}
                }
            } else {
                let character =
                    char::from_u32(u32::from(unit)).unwrap_or(char::REPLACEMENT_CHARACTER);
                text.push(character);
            }
        }
        Ok(text)
    }

    /// The heap allocation routine: a first-fit scan for a run of zero bytes
    /// at least as long as the request in `$a1`, starting from the last
    /// allocation point and wrapping once to the heap start. The run's start
    /// address, or an all-ones sentinel, is left in `$a2`.
    ///
    /// "Free" means "byte is zero": zeroed live data reads as free. Programs
    /// written for this machine depend on that, so no allocation tracking is
    /// added here.
    fn alloc(&mut self) {
        let requested = self.registers.get(Reg::A1);
        let sp = self.registers.sp;
        let mut start = self.dp;
        if self.dp >= sp {
            self.dp = self.heap_start;
            start = self.dp;
        }
        while self.dp < sp {
            let mut run = 0;
            while run < requested {
                let content = self.memory.byte(self.dp).unwrap_or(u8::MAX);
                self.dp += 1;
                if content == 0 {
                    run += 1;
                } else {
                    break;
                }
            }
            if run == requested {
                break;
            }
            start = self.dp;
        }
        let result = if self.dp < sp { start } else { C::Word::MAX };
        debug!(requested, result, "heap allocation");
        self.registers.set(Reg::A2, result);
    }

    /// xoshiro256** step over the four-word generator state.
    fn next_random(&mut self) -> C::Word {
        let result = self.rng[1].wrapping_mul(5).rotate_left(7).wrapping_mul(9);
        let t = self.rng[1] << 17;

        self.rng[2] ^= self.rng[0];
        self.rng[3] ^= self.rng[1];
        self.rng[1] ^= self.rng[2];
        self.rng[0] ^= self.rng[3];

        self.rng[2] ^= t;
        self.rng[3] = self.rng[3].rotate_left(45);
        result
    }
}
