use tracing::debug;

use super::exception::{Fault, Interrupt, InterruptSink};
use super::memory::Memory;
use super::registers::{FloatReg, Reg, Registers};
use crate::constants as C;
use crate::program::{Instruction, Opcode};

/// The floating point coprocessor.
///
/// Owns the twelve double-precision registers and executes every opcode
/// tagged [`crate::program::Unit::Float`]. Domain errors are signaled
/// through the injected [`InterruptSink`] and produce NaN instead of
/// stopping the run; only invalid memory accesses are fatal.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Coprocessor {
    registers: [f64; 12],
}

impl Coprocessor {
    #[must_use]
    pub fn get(&self, reg: FloatReg) -> f64 {
        self.registers[usize::from(reg.index())]
    }

    pub fn set(&mut self, reg: FloatReg, value: f64) {
        self.registers[usize::from(reg.index())] = value;
    }

    #[must_use]
    pub fn registers(&self) -> &[f64; 12] {
        &self.registers
    }

    pub(crate) fn reset(&mut self) {
        self.registers = [0.0; 12];
    }

    fn reg(index: u8) -> Result<FloatReg, Fault> {
        FloatReg::from_index(index).ok_or(Fault::InvalidFloatRegister { index })
    }

    fn value(&self, index: u8) -> Result<f64, Fault> {
        Ok(self.get(Self::reg(index)?))
    }

    /// Execute one floating opcode.
    ///
    /// `registers` provides the integer register file for address operands;
    /// `interrupts` is the capability used to signal domain errors.
    pub(crate) fn execute(
        &mut self,
        current: &Instruction,
        memory: &mut Memory,
        registers: &Registers,
        interrupts: &mut impl InterruptSink,
    ) -> Result<(), Fault> {
        match current.opcode {
            Opcode::Addf => {
                let result = self.value(current.b2)? + self.value(current.b3)?;
                self.set(Self::reg(current.b4)?, result);
            }
            Opcode::Subf => {
                let result = self.value(current.b2)? - self.value(current.b3)?;
                self.set(Self::reg(current.b4)?, result);
            }
            Opcode::Mulf => {
                let result = self.value(current.b2)? * self.value(current.b3)?;
                self.set(Self::reg(current.b4)?, result);
            }
            Opcode::Divf => {
                let divisor = self.value(current.b3)?;
                let dest = Self::reg(current.b4)?;
                if divisor == 0.0 {
                    interrupts.raise(Interrupt::DivisionByZero);
                    self.set(dest, f64::NAN);
                } else {
                    let result = self.value(current.b2)? / divisor;
                    self.set(dest, result);
                }
            }
            Opcode::Addfi => {
                let result = self.value(current.b2)? + float_imm(current);
                self.set(Self::reg(current.b3)?, result);
            }
            Opcode::Subfi => {
                let result = self.value(current.b2)? - float_imm(current);
                self.set(Self::reg(current.b3)?, result);
            }
            Opcode::Mulfi => {
                let result = self.value(current.b2)? * float_imm(current);
                self.set(Self::reg(current.b3)?, result);
            }
            Opcode::Divfi => {
                let divisor = float_imm(current);
                let dest = Self::reg(current.b3)?;
                if divisor == 0.0 {
                    interrupts.raise(Interrupt::FpuError);
                    self.set(dest, f64::NAN);
                } else {
                    let result = self.value(current.b2)? / divisor;
                    self.set(dest, result);
                }
            }
            Opcode::Sqrf => {
                let value = self.value(current.b2)?;
                let dest = Self::reg(current.b3)?;
                if value < 0.0 {
                    interrupts.raise(Interrupt::FpuError);
                    self.set(dest, f64::NAN);
                } else {
                    self.set(dest, value.sqrt());
                }
            }
            Opcode::Powf => {
                let result = self.value(current.b2)?.powf(self.value(current.b3)?);
                self.set(Self::reg(current.b4)?, result);
            }
            Opcode::Cosf => {
                let result = self.value(current.b2)?.cos();
                self.set(Self::reg(current.b3)?, result);
            }
            Opcode::Senf => {
                let result = self.value(current.b2)?.sin();
                self.set(Self::reg(current.b3)?, result);
            }
            Opcode::Tanf => {
                let result = self.value(current.b2)?.tan();
                self.set(Self::reg(current.b3)?, result);
            }
            Opcode::Invf => {
                let value = self.value(current.b2)?;
                let dest = Self::reg(current.b3)?;
                if value == 0.0 {
                    interrupts.raise(Interrupt::FpuError);
                    self.set(dest, f64::NAN);
                } else {
                    self.set(dest, 1.0 / value);
                }
            }
            Opcode::Expf => {
                let result = self.value(current.b2)?.exp();
                self.set(Self::reg(current.b3)?, result);
            }
            Opcode::Seqf => {
                let result = self.value(current.b2)? == self.value(current.b3)?;
                self.set(Self::reg(current.b4)?, f64::from(u8::from(result)));
            }
            Opcode::Snqf => {
                let result = self.value(current.b2)? != self.value(current.b3)?;
                self.set(Self::reg(current.b4)?, f64::from(u8::from(result)));
            }
            Opcode::Sltf => {
                let result = self.value(current.b2)? < self.value(current.b3)?;
                self.set(Self::reg(current.b4)?, f64::from(u8::from(result)));
            }
            Opcode::Sgtf => {
                let result = self.value(current.b2)? > self.value(current.b3)?;
                self.set(Self::reg(current.b4)?, f64::from(u8::from(result)));
            }
            Opcode::Snan => {
                let result = self.value(current.b2)?.is_nan();
                self.set(Self::reg(current.b3)?, f64::from(u8::from(result)));
            }
            Opcode::Movf => {
                let value = self.value(current.b2)?;
                self.set(Self::reg(current.b3)?, value);
            }
            Opcode::Movfi => {
                self.set(Self::reg(current.b2)?, float_imm(current));
            }
            Opcode::Lfm => {
                let dest = Self::reg(current.b2)?;
                let address = data_address(current, registers)?;
                debug!(address, "float load");
                self.set(dest, memory.read_double(address)?);
            }
            Opcode::Sfm => {
                let value = self.value(current.b2)?;
                let address = data_address(current, registers)?;
                debug!(address, "float store");
                memory.write_double(address, value)?;
            }
            other => return Err(Fault::UnknownOpcode(other)),
        }
        Ok(())
    }
}

/// Reconstitute a floating immediate.
///
/// Only the low 32 bits of the IEEE-754 pattern survive assembly; the
/// sign-extended reconstruction reproduces the reference encoding and its
/// precision loss.
fn float_imm(current: &Instruction) -> f64 {
    #[allow(clippy::cast_sign_loss)]
    f64::from_bits(i64::from(current.imm()) as u64)
}

/// Resolve an `offset($base)` operand against the integer register file.
///
/// Float loads and stores may only touch addresses at or above the
/// memory-mapped I/O region.
fn data_address(current: &Instruction, registers: &Registers) -> Result<C::Address, Fault> {
    let base = Reg::from_index(current.b3).ok_or(Fault::InvalidRegister { index: current.b3 })?;
    let address = registers
        .get(base)
        .wrapping_add_signed(i64::from(current.imm()));
    if address < C::SYSTEM_RESERVED {
        return Err(Fault::FloatAccess { address });
    }
    Ok(address)
}

#[cfg(test)]
mod tests {
    use super::super::registers::Flags;
    use super::*;

    fn exec(
        coprocessor: &mut Coprocessor,
        memory: &mut Memory,
        flags: &mut Flags,
        instruction: Instruction,
    ) -> Result<(), Fault> {
        let registers = Registers::default();
        coprocessor.execute(&instruction, memory, &registers, flags)
    }

    #[test]
    fn arithmetic_test() {
        let mut coprocessor = Coprocessor::default();
        let mut memory = Memory::default();
        let mut flags = Flags::empty();

        coprocessor.set(FloatReg::D0, 1.5);
        coprocessor.set(FloatReg::D1, 2.0);

        let add = Instruction::new(Opcode::Addf, [0, 1, 2, 0, 0, 0, 0]);
        exec(&mut coprocessor, &mut memory, &mut flags, add).unwrap();
        assert_eq!(coprocessor.get(FloatReg::D2), 3.5);

        let mul = Instruction::new(Opcode::Mulf, [0, 1, 3, 0, 0, 0, 0]);
        exec(&mut coprocessor, &mut memory, &mut flags, mul).unwrap();
        assert_eq!(coprocessor.get(FloatReg::D3), 3.0);
        assert!(flags.is_empty());
    }

    #[test]
    fn division_by_zero_test() {
        let mut coprocessor = Coprocessor::default();
        let mut memory = Memory::default();
        let mut flags = Flags::empty();

        coprocessor.set(FloatReg::D0, 4.0);
        let div = Instruction::new(Opcode::Divf, [0, 1, 2, 0, 0, 0, 0]);
        exec(&mut coprocessor, &mut memory, &mut flags, div).unwrap();

        assert!(coprocessor.get(FloatReg::D2).is_nan());
        assert_eq!(flags, Flags::DIV_BY_ZERO);
    }

    #[test]
    fn reciprocal_of_zero_test() {
        let mut coprocessor = Coprocessor::default();
        let mut memory = Memory::default();
        let mut flags = Flags::empty();

        let inv = Instruction::new(Opcode::Invf, [0, 1, 0, 0, 0, 0, 0]);
        exec(&mut coprocessor, &mut memory, &mut flags, inv).unwrap();

        assert!(coprocessor.get(FloatReg::D1).is_nan());
        assert_eq!(flags, Flags::FPU_ERROR);
    }

    #[test]
    fn negative_square_root_test() {
        let mut coprocessor = Coprocessor::default();
        let mut memory = Memory::default();
        let mut flags = Flags::empty();

        coprocessor.set(FloatReg::D0, -1.0);
        let sqrt = Instruction::new(Opcode::Sqrf, [0, 1, 0, 0, 0, 0, 0]);
        exec(&mut coprocessor, &mut memory, &mut flags, sqrt).unwrap();

        assert!(coprocessor.get(FloatReg::D1).is_nan());
        assert_eq!(flags, Flags::FPU_ERROR);
    }

    #[test]
    fn nan_test_test() {
        let mut coprocessor = Coprocessor::default();
        let mut memory = Memory::default();
        let mut flags = Flags::empty();

        coprocessor.set(FloatReg::D0, f64::NAN);
        let snan = Instruction::new(Opcode::Snan, [0, 1, 0, 0, 0, 0, 0]);
        exec(&mut coprocessor, &mut memory, &mut flags, snan).unwrap();
        assert_eq!(coprocessor.get(FloatReg::D1), 1.0);

        let snan = Instruction::new(Opcode::Snan, [1, 2, 0, 0, 0, 0, 0]);
        exec(&mut coprocessor, &mut memory, &mut flags, snan).unwrap();
        assert_eq!(coprocessor.get(FloatReg::D2), 0.0);
    }

    #[test]
    fn truncated_immediate_test() {
        // The 4-byte immediate keeps only the low half of the bit pattern:
        // 2.5 loses all of its significant bits.
        let mut coprocessor = Coprocessor::default();
        let mut memory = Memory::default();
        let mut flags = Flags::empty();

        let bits = 2.5_f64.to_bits();
        #[allow(clippy::cast_possible_truncation)]
        let low = (bits as u32).to_be_bytes();
        let movfi = Instruction::new(Opcode::Movfi, [0, 0, 0, low[0], low[1], low[2], low[3]]);
        exec(&mut coprocessor, &mut memory, &mut flags, movfi).unwrap();
        assert_eq!(coprocessor.get(FloatReg::D0), 0.0);
    }

    #[test]
    fn memory_roundtrip_test() {
        let mut coprocessor = Coprocessor::default();
        let mut memory = Memory::default();
        let mut flags = Flags::empty();
        let mut registers = Registers::default();
        registers.set(Reg::G0, 512);

        coprocessor.set(FloatReg::D0, 6.25);
        // sfm $d0, 8($g0)
        let sfm = Instruction::new(Opcode::Sfm, [0, 0, 0, 0, 0, 0, 8]);
        coprocessor
            .execute(&sfm, &mut memory, &registers, &mut flags)
            .unwrap();
        assert_eq!(memory.read_double(520).unwrap(), 6.25);

        // lfm $d1, 520($zero)
        let lfm = Instruction::new(Opcode::Lfm, [1, 255, 0, 0, 0, 2, 8]);
        coprocessor
            .execute(&lfm, &mut memory, &registers, &mut flags)
            .unwrap();
        assert_eq!(coprocessor.get(FloatReg::D1), 6.25);
    }

    #[test]
    fn reserved_address_test() {
        let mut coprocessor = Coprocessor::default();
        let mut memory = Memory::default();
        let mut flags = Flags::empty();

        // lfm $d0, 64($zero) touches the reserved region
        let lfm = Instruction::new(Opcode::Lfm, [0, 255, 0, 0, 0, 0, 64]);
        let result = exec(&mut coprocessor, &mut memory, &mut flags, lfm);
        assert_eq!(result, Err(Fault::FloatAccess { address: 64 }));

        // lfm $d0, 4090($zero) runs past the end of memory
        let lfm = Instruction::new(Opcode::Lfm, [0, 255, 0, 0, 0, 0x0F, 0xFA]);
        let result = exec(&mut coprocessor, &mut memory, &mut flags, lfm);
        assert!(matches!(result, Err(Fault::Memory(_))));
    }
}
