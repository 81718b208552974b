use bitflags::bitflags;
use parse_display::Display;
use thiserror::Error;

use super::exception::{Interrupt, InterruptSink};
use crate::constants as C;

bitflags! {
    /// The interrupt flags register, one bit per pending cause.
    ///
    /// Bits 4 to 7 are reserved but can still be raised and dispatched.
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u8 {
        const DIV_BY_ZERO      = 1 << 0;
        const INVALID_ARGUMENT = 1 << 1;
        const FPU_ERROR        = 1 << 2;
        const IO               = 1 << 3;
    }
}

impl std::fmt::Debug for Flags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#010b}", self.bits())
    }
}

impl Flags {
    /// Index of the highest pending cause, if any. Dispatch serves causes
    /// highest index first.
    #[must_use]
    pub fn highest_pending(&self) -> Option<u8> {
        if self.is_empty() {
            None
        } else {
            #[allow(clippy::cast_possible_truncation)]
            Some(7 - self.bits().leading_zeros() as u8)
        }
    }

    /// Raise a cause by bit index. Indexes outside the register are ignored.
    pub fn raise_index(&mut self, index: i32) {
        if (0..i32::from(C::INTERRUPT_COUNT)).contains(&index) {
            *self = Self::from_bits_retain(self.bits() | 1_u8 << index);
        }
    }

    pub(crate) fn clear_index(&mut self, index: u8) {
        if index < C::INTERRUPT_COUNT {
            *self = Self::from_bits_retain(self.bits() & !(1_u8 << index));
        }
    }

    #[must_use]
    pub(crate) fn test_index(&self, index: u8) -> bool {
        index < C::INTERRUPT_COUNT && self.bits() & (1_u8 << index) != 0
    }
}

impl InterruptSink for Flags {
    fn raise(&mut self, cause: Interrupt) {
        self.raise_index(i32::from(cause.index()));
    }
}

/// Names of the integer register file.
///
/// `Zero` is the reserved index 255: it reads as zero and ignores writes,
/// and doubles as the "no base register" marker in address operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[display("${}", style = "lowercase")]
pub enum Reg {
    G0,
    G1,
    G2,
    G3,
    G4,
    G5,
    G6,
    G7,
    A0,
    A1,
    A2,
    A3,
    S0,
    S1,
    S2,
    S3,
    Sp,
    Fp,
    Ra,
    Ac,
    Zero,
}

impl Reg {
    /// Decode a register operand byte.
    #[must_use]
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::G0),
            1 => Some(Self::G1),
            2 => Some(Self::G2),
            3 => Some(Self::G3),
            4 => Some(Self::G4),
            5 => Some(Self::G5),
            6 => Some(Self::G6),
            7 => Some(Self::G7),
            8 => Some(Self::A0),
            9 => Some(Self::A1),
            10 => Some(Self::A2),
            11 => Some(Self::A3),
            12 => Some(Self::S0),
            13 => Some(Self::S1),
            14 => Some(Self::S2),
            15 => Some(Self::S3),
            16 => Some(Self::Sp),
            17 => Some(Self::Fp),
            18 => Some(Self::Ra),
            19 => Some(Self::Ac),
            255 => Some(Self::Zero),
            _ => None,
        }
    }

    /// The operand byte this register encodes to.
    #[must_use]
    pub const fn index(self) -> u8 {
        match self {
            Self::G0 => 0,
            Self::G1 => 1,
            Self::G2 => 2,
            Self::G3 => 3,
            Self::G4 => 4,
            Self::G5 => 5,
            Self::G6 => 6,
            Self::G7 => 7,
            Self::A0 => 8,
            Self::A1 => 9,
            Self::A2 => 10,
            Self::A3 => 11,
            Self::S0 => 12,
            Self::S1 => 13,
            Self::S2 => 14,
            Self::S3 => 15,
            Self::Sp => 16,
            Self::Fp => 17,
            Self::Ra => 18,
            Self::Ac => 19,
            Self::Zero => 255,
        }
    }
}

#[derive(Error, Debug)]
#[error("could not parse register")]
pub struct RegisterParseError;

impl std::str::FromStr for Reg {
    type Err = RegisterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "$g0" | "g0" => Ok(Self::G0),
            "$g1" | "g1" => Ok(Self::G1),
            "$g2" | "g2" => Ok(Self::G2),
            "$g3" | "g3" => Ok(Self::G3),
            "$g4" | "g4" => Ok(Self::G4),
            "$g5" | "g5" => Ok(Self::G5),
            "$g6" | "g6" => Ok(Self::G6),
            "$g7" | "g7" => Ok(Self::G7),
            "$a0" | "a0" => Ok(Self::A0),
            "$a1" | "a1" => Ok(Self::A1),
            "$a2" | "a2" => Ok(Self::A2),
            "$a3" | "a3" => Ok(Self::A3),
            "$s0" | "s0" => Ok(Self::S0),
            "$s1" | "s1" => Ok(Self::S1),
            "$s2" | "s2" => Ok(Self::S2),
            "$s3" | "s3" => Ok(Self::S3),
            "$sp" | "sp" => Ok(Self::Sp),
            "$fp" | "fp" => Ok(Self::Fp),
            "$ra" | "ra" => Ok(Self::Ra),
            "$ac" | "ac" => Ok(Self::Ac),
            "$zero" | "zero" => Ok(Self::Zero),
            _ => Err(RegisterParseError),
        }
    }
}

/// Names of the coprocessor register file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[display("${}", style = "lowercase")]
pub enum FloatReg {
    D0,
    D1,
    D2,
    D3,
    D4,
    D5,
    D6,
    D7,
    D8,
    D9,
    D10,
    D11,
}

impl FloatReg {
    /// Decode a float register operand byte.
    #[must_use]
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::D0),
            1 => Some(Self::D1),
            2 => Some(Self::D2),
            3 => Some(Self::D3),
            4 => Some(Self::D4),
            5 => Some(Self::D5),
            6 => Some(Self::D6),
            7 => Some(Self::D7),
            8 => Some(Self::D8),
            9 => Some(Self::D9),
            10 => Some(Self::D10),
            11 => Some(Self::D11),
            _ => None,
        }
    }

    /// The operand byte this register encodes to.
    #[must_use]
    pub const fn index(self) -> u8 {
        self as u8
    }
}

impl std::str::FromStr for FloatReg {
    type Err = RegisterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.to_lowercase();
        let index = name
            .strip_prefix("$d")
            .or_else(|| name.strip_prefix('d'))
            .ok_or(RegisterParseError)?;
        let index: u8 = index.parse().map_err(|_| RegisterParseError)?;
        Self::from_index(index).ok_or(RegisterParseError)
    }
}

/// The integer register file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registers {
    pub general: [C::Word; 8],
    pub argument: [C::Word; 4],
    pub saved: [C::Word; 4],
    pub sp: C::Word,
    pub fp: C::Word,
    pub ra: C::Word,
    pub ac: C::Word,
}

impl Default for Registers {
    fn default() -> Self {
        Self {
            general: [0; 8],
            argument: [0; 4],
            saved: [0; 4],
            sp: C::STACK_INIT,
            fp: 0,
            ra: 0,
            ac: 0,
        }
    }
}

impl Registers {
    #[must_use]
    pub fn get(&self, reg: Reg) -> C::Word {
        match reg {
            Reg::G0 => self.general[0],
            Reg::G1 => self.general[1],
            Reg::G2 => self.general[2],
            Reg::G3 => self.general[3],
            Reg::G4 => self.general[4],
            Reg::G5 => self.general[5],
            Reg::G6 => self.general[6],
            Reg::G7 => self.general[7],
            Reg::A0 => self.argument[0],
            Reg::A1 => self.argument[1],
            Reg::A2 => self.argument[2],
            Reg::A3 => self.argument[3],
            Reg::S0 => self.saved[0],
            Reg::S1 => self.saved[1],
            Reg::S2 => self.saved[2],
            Reg::S3 => self.saved[3],
            Reg::Sp => self.sp,
            Reg::Fp => self.fp,
            Reg::Ra => self.ra,
            Reg::Ac => self.ac,
            Reg::Zero => 0,
        }
    }

    pub fn set(&mut self, reg: Reg, value: C::Word) {
        match reg {
            Reg::G0 => self.general[0] = value,
            Reg::G1 => self.general[1] = value,
            Reg::G2 => self.general[2] = value,
            Reg::G3 => self.general[3] = value,
            Reg::G4 => self.general[4] = value,
            Reg::G5 => self.general[5] = value,
            Reg::G6 => self.general[6] = value,
            Reg::G7 => self.general[7] = value,
            Reg::A0 => self.argument[0] = value,
            Reg::A1 => self.argument[1] = value,
            Reg::A2 => self.argument[2] = value,
            Reg::A3 => self.argument[3] = value,
            Reg::S0 => self.saved[0] = value,
            Reg::S1 => self.saved[1] = value,
            Reg::S2 => self.saved[2] = value,
            Reg::S3 => self.saved[3] = value,
            Reg::Sp => self.sp = value,
            Reg::Fp => self.fp = value,
            Reg::Ra => self.ra = value,
            Reg::Ac => self.ac = value,
            Reg::Zero => {}
        }
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}

impl std::fmt::Display for Registers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        #[allow(clippy::cast_possible_wrap)]
        for (index, value) in self.general.iter().enumerate() {
            writeln!(f, "g{index}: {value} ({})", *value as i64)?;
        }
        #[allow(clippy::cast_possible_wrap)]
        for (index, value) in self.argument.iter().enumerate() {
            writeln!(f, "a{index}: {value} ({})", *value as i64)?;
        }
        #[allow(clippy::cast_possible_wrap)]
        for (index, value) in self.saved.iter().enumerate() {
            writeln!(f, "s{index}: {value} ({})", *value as i64)?;
        }
        writeln!(f, "sp: {}", self.sp)?;
        writeln!(f, "fp: {}", self.fp)?;
        writeln!(f, "ra: {}", self.ra)?;
        write!(f, "ac: {}", self.ac)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn flags_priority_test() {
        let mut flags = Flags::empty();
        assert_eq!(flags.highest_pending(), None);

        flags.raise(Interrupt::InvalidArgument);
        flags.raise(Interrupt::Io);
        assert_eq!(flags.highest_pending(), Some(3));

        flags.clear_index(3);
        assert_eq!(flags.highest_pending(), Some(1));
        assert!(flags.test_index(1));
        assert!(!flags.test_index(3));
    }

    #[test]
    fn flags_reserved_bits_test() {
        let mut flags = Flags::empty();
        flags.raise_index(7);
        assert_eq!(flags.highest_pending(), Some(7));

        // Out of range indexes are ignored
        flags.raise_index(8);
        flags.raise_index(-1);
        assert_eq!(flags.bits(), 1 << 7);
    }

    #[test]
    fn register_index_roundtrip_test() {
        for index in 0..20 {
            let reg = Reg::from_index(index).unwrap();
            assert_eq!(reg.index(), index);
        }
        assert_eq!(Reg::from_index(255), Some(Reg::Zero));
        assert_eq!(Reg::from_index(20), None);
    }

    #[test]
    fn register_alias_test() {
        assert_eq!(Reg::from_str("$g0").unwrap(), Reg::G0);
        assert_eq!(Reg::from_str("$AC").unwrap(), Reg::Ac);
        assert_eq!(Reg::from_str("sp").unwrap(), Reg::Sp);
        assert_eq!(Reg::from_str("$zero").unwrap(), Reg::Zero);
        assert!(Reg::from_str("$g8").is_err());

        assert_eq!(FloatReg::from_str("$d11").unwrap(), FloatReg::D11);
        assert!(FloatReg::from_str("$d12").is_err());
    }

    #[test]
    fn zero_register_test() {
        let mut registers = Registers::default();
        registers.set(Reg::Zero, 42);
        assert_eq!(registers.get(Reg::Zero), 0);
    }

    #[test]
    fn default_stack_pointer_test() {
        let registers = Registers::default();
        assert_eq!(registers.sp, C::STACK_INIT);
    }
}
