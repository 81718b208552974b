//! Integer and control instruction semantics.
//!
//! All arithmetic wraps on 64-bit overflow; the widening multiply is the
//! only operation that keeps the full product, split across the `hi`/`lo`
//! registers. Branch offsets are signed distances in instruction positions.

use tracing::debug;

use super::exception::{Fault, Interrupt, InterruptSink};
use super::registers::Reg;
use super::{Processor, Step};
use crate::constants as C;
use crate::program::{Instruction, Opcode};

#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
impl Processor {
    fn reg(index: u8) -> Result<Reg, Fault> {
        Reg::from_index(index).ok_or(Fault::InvalidRegister { index })
    }

    fn reg_word(&self, index: u8) -> Result<C::Word, Fault> {
        Ok(self.registers.get(Self::reg(index)?))
    }

    fn set_reg(&mut self, index: u8, value: C::Word) -> Result<(), Fault> {
        self.registers.set(Self::reg(index)?, value);
        Ok(())
    }

    pub(super) fn push_word(&mut self, value: C::Word) -> Result<(), Fault> {
        self.registers.sp = self.registers.sp.wrapping_sub(8);
        self.memory.write_word(self.registers.sp, value)?;
        Ok(())
    }

    fn pop_word(&mut self) -> Result<C::Word, Fault> {
        let value = self.memory.read_word(self.registers.sp)?;
        self.registers.sp = self.registers.sp.wrapping_add(8);
        Ok(value)
    }

    /// Resolve an `offset($base)` operand. Base index 255 means no base.
    fn data_address(&self, base: u8, offset: i32) -> Result<C::Address, Fault> {
        let base = self.reg_word(base)?;
        Ok(base.wrapping_add_signed(i64::from(offset)))
    }

    fn branch(&mut self, taken: bool, offset: i32) {
        if taken {
            self.ip = self.ip.wrapping_add_signed(i64::from(offset));
        }
    }

    /// Execute one integer or control opcode.
    pub(super) fn execute(&mut self, current: &Instruction) -> Result<Step, Fault> {
        match current.opcode {
            Opcode::Nop => {}
            Opcode::Add => {
                let result = self.reg_word(current.b2)?.wrapping_add(self.reg_word(current.b3)?);
                self.set_reg(current.b4, result)?;
            }
            Opcode::Addi => {
                let result = (self.reg_word(current.b2)? as i64).wrapping_add(i64::from(current.imm()));
                self.set_reg(current.b3, result as C::Word)?;
            }
            Opcode::Sub => {
                let result = self.reg_word(current.b2)?.wrapping_sub(self.reg_word(current.b3)?);
                self.set_reg(current.b4, result)?;
            }
            Opcode::Subi => {
                let result = (self.reg_word(current.b2)? as i64).wrapping_sub(i64::from(current.imm()));
                self.set_reg(current.b3, result as C::Word)?;
            }
            Opcode::Mul => {
                let result = self.reg_word(current.b2)?.wrapping_mul(self.reg_word(current.b3)?);
                self.set_reg(current.b4, result)?;
            }
            Opcode::Mult => {
                let product =
                    u128::from(self.reg_word(current.b2)?) * u128::from(self.reg_word(current.b3)?);
                #[allow(clippy::cast_possible_truncation)]
                {
                    self.hi = (product >> 64) as C::Word;
                    self.lo = product as C::Word;
                }
            }
            Opcode::Multi => {
                let result = (self.reg_word(current.b2)? as i64).wrapping_mul(i64::from(current.imm()));
                self.set_reg(current.b3, result as C::Word)?;
            }
            Opcode::Div => {
                let divisor = self.reg_word(current.b3)?;
                if divisor == 0 {
                    self.flags.raise(Interrupt::DivisionByZero);
                } else {
                    let result = self.reg_word(current.b2)? / divisor;
                    self.set_reg(current.b4, result)?;
                }
            }
            Opcode::Divi => {
                let divisor = i64::from(current.imm());
                if divisor == 0 {
                    self.flags.raise(Interrupt::DivisionByZero);
                } else {
                    let result = (self.reg_word(current.b2)? as i64).wrapping_div(divisor);
                    self.set_reg(current.b3, result as C::Word)?;
                }
            }
            Opcode::Mod => {
                let divisor = self.reg_word(current.b3)?;
                if divisor == 0 {
                    self.flags.raise(Interrupt::DivisionByZero);
                } else {
                    let result = self.reg_word(current.b2)? % divisor;
                    self.set_reg(current.b4, result)?;
                }
            }
            Opcode::Modi => {
                let divisor = i64::from(current.imm());
                if divisor == 0 {
                    self.flags.raise(Interrupt::DivisionByZero);
                } else {
                    let result = self.reg_word(current.b2)? % (divisor as C::Word);
                    self.set_reg(current.b3, result)?;
                }
            }
            Opcode::Mov => {
                let value = self.reg_word(current.b2)?;
                self.set_reg(current.b3, value)?;
            }
            Opcode::Movi => {
                self.set_reg(current.b2, i64::from(current.imm()) as C::Word)?;
            }
            Opcode::And => {
                let result = self.reg_word(current.b2)? & self.reg_word(current.b3)?;
                self.set_reg(current.b4, result)?;
            }
            Opcode::Andi => {
                let result = self.reg_word(current.b2)? & C::Word::from(current.imm_unsigned());
                self.set_reg(current.b3, result)?;
            }
            Opcode::Or => {
                let result = self.reg_word(current.b2)? | self.reg_word(current.b3)?;
                self.set_reg(current.b4, result)?;
            }
            Opcode::Ori => {
                let result = self.reg_word(current.b2)? | C::Word::from(current.imm_unsigned());
                self.set_reg(current.b3, result)?;
            }
            Opcode::Xor => {
                let result = self.reg_word(current.b2)? ^ self.reg_word(current.b3)?;
                self.set_reg(current.b4, result)?;
            }
            Opcode::Xori => {
                let result = self.reg_word(current.b2)? ^ C::Word::from(current.imm_unsigned());
                self.set_reg(current.b3, result)?;
            }
            Opcode::Not => {
                let result = !self.reg_word(current.b2)?;
                self.set_reg(current.b3, result)?;
            }
            Opcode::Lsb => {
                let result = self.reg_word(current.b2)?.wrapping_shl(current.imm_unsigned());
                self.set_reg(current.b3, result)?;
            }
            Opcode::Rsb => {
                let result = self.reg_word(current.b2)?.wrapping_shr(current.imm_unsigned());
                self.set_reg(current.b3, result)?;
            }
            Opcode::Seq => {
                let result = self.reg_word(current.b2)? == self.reg_word(current.b3)?;
                self.set_reg(current.b4, C::Word::from(result))?;
            }
            Opcode::Snq => {
                let result = self.reg_word(current.b2)? != self.reg_word(current.b3)?;
                self.set_reg(current.b4, C::Word::from(result))?;
            }
            Opcode::Slt => {
                let result = self.reg_word(current.b2)? < self.reg_word(current.b3)?;
                self.set_reg(current.b4, C::Word::from(result))?;
            }
            Opcode::Sgt => {
                let result = self.reg_word(current.b2)? > self.reg_word(current.b3)?;
                self.set_reg(current.b4, C::Word::from(result))?;
            }
            Opcode::Chk => {
                let flag = current.b3;
                if flag >= C::INTERRUPT_COUNT {
                    self.flags.raise(Interrupt::InvalidArgument);
                } else {
                    let set = self.flags.test_index(flag);
                    self.set_reg(current.b2, C::Word::from(set))?;
                }
            }
            Opcode::Clf => {
                let flag = current.imm();
                if (0..i32::from(C::INTERRUPT_COUNT)).contains(&flag) {
                    self.flags.clear_index(flag as u8);
                } else {
                    self.flags.raise(Interrupt::InvalidArgument);
                }
            }
            Opcode::Beq => {
                let taken = self.reg_word(current.b2)? == self.reg_word(current.b3)?;
                self.branch(taken, current.imm());
            }
            Opcode::Bnq => {
                let taken = self.reg_word(current.b2)? != self.reg_word(current.b3)?;
                self.branch(taken, current.imm());
            }
            Opcode::Bgt => {
                let taken = self.reg_word(current.b2)? > self.reg_word(current.b3)?;
                self.branch(taken, current.imm());
            }
            Opcode::Blt => {
                let taken = self.reg_word(current.b2)? < self.reg_word(current.b3)?;
                self.branch(taken, current.imm());
            }
            Opcode::Jmp => {
                self.branch(true, current.imm());
            }
            Opcode::Jr => {
                self.ip = self.reg_word(current.b2)?;
            }
            Opcode::Jal => {
                self.registers.ra = self.ip;
                self.branch(true, current.imm());
            }
            Opcode::Jst => {
                self.push_word(self.ip)?;
                self.branch(true, current.imm());
            }
            Opcode::Rst => {
                self.ip = self.pop_word()?;
            }
            Opcode::Lw => {
                let address = self.data_address(current.b3, current.imm())?;
                let value = self.memory.read_word(address)?;
                self.set_reg(current.b2, value)?;
            }
            Opcode::Sw => {
                let address = self.data_address(current.b3, current.imm())?;
                let value = self.reg_word(current.b2)?;
                self.memory.write_word(address, value)?;
            }
            Opcode::Push => {
                let value = self.reg_word(current.b2)?;
                self.push_word(value)?;
            }
            Opcode::Pop => {
                let value = self.pop_word()?;
                self.set_reg(current.b2, value)?;
            }
            Opcode::Mfh => {
                self.set_reg(current.b2, self.hi)?;
            }
            Opcode::Mfl => {
                self.set_reg(current.b2, self.lo)?;
            }
            Opcode::Sir => {
                self.dispatch_enabled = current.imm() != 0;
                debug!(enabled = self.dispatch_enabled, "interrupt dispatch toggled");
            }
            Opcode::Syscall => return self.system_call(),
            Opcode::Break => {
                self.flags.raise_index(current.imm());
            }
            Opcode::Halt => {
                self.executing = false;
                return Ok(Step::Halt);
            }
            // Floating opcodes never reach the integer unit
            other => return Err(Fault::UnknownOpcode(other)),
        }
        Ok(Step::Continue)
    }
}
