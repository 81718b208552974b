//! Code passes.
//!
//! Sub-pass A walks the section once to compute label positions and fill
//! the jump table; sub-pass B re-walks it to encode instructions. Labels
//! resolve to the position of the instruction that follows them, and branch
//! operands encode the signed distance from the position after the branch.

use std::collections::HashMap;
use std::str::FromStr;

use super::diagnostic::Diagnostics;
use super::{is_identifier, operand, SourceLine};
use crate::constants as C;
use crate::program::{Instruction, JumpTable, Opcode};

pub(crate) struct CodeSegment {
    pub instructions: Vec<Instruction>,
    pub jump_table: JumpTable,
}

fn strip_comment(text: &str) -> &str {
    text.find('#').map_or(text, |index| &text[..index])
}

fn label_name(text: &str) -> Option<&str> {
    text.strip_suffix(':').map(str::trim)
}

fn instruction(opcode: Opcode, b2: u8, b3: u8, b4: u8, imm: u32) -> Instruction {
    let bytes = imm.to_be_bytes();
    Instruction::new(opcode, [b2, b3, b4, bytes[0], bytes[1], bytes[2], bytes[3]])
}

pub(crate) fn assemble_code(
    lines: &[SourceLine<'_>],
    data_labels: &HashMap<String, C::Address>,
    diagnostics: &mut Diagnostics,
) -> CodeSegment {
    let mut jump_table = JumpTable::default();
    let labels = collect_labels(lines, &mut jump_table, diagnostics);

    let mut encoder = Encoder {
        labels: &labels,
        data_labels,
        diagnostics,
        position: 0,
    };
    let mut instructions = Vec::new();

    for line in lines {
        let text = strip_comment(line.text).trim();
        if text.is_empty() || label_name(text).is_some() {
            continue;
        }
        let tokens: Vec<&str> = text
            .split([',', ' ', '\t'])
            .filter(|token| !token.is_empty())
            .collect();
        let mnemonic = tokens[0].to_uppercase();

        // The two pseudo-instructions only exist at this layer
        let encoded = match mnemonic.as_str() {
            "LAD" => encoder.encode_lad(line, &tokens),
            "ACC" => encoder.encode_acc(line, &tokens),
            _ => match Opcode::from_str(&mnemonic) {
                Ok(opcode) => encoder.encode(line, opcode, &tokens),
                Err(_) => {
                    encoder
                        .diagnostics
                        .report(line, format!("unknown or unsupported mnemonic {}", tokens[0]));
                    instruction(Opcode::Nop, 0, 0, 0, 0)
                }
            },
        };
        instructions.push(encoded);
        encoder.position += 1;
    }

    CodeSegment {
        instructions,
        jump_table,
    }
}

/// Sub-pass A: count instruction positions and record each label at the
/// position that follows it. The reserved `main:` and `isr_0:`..`isr_7:`
/// spellings additionally fill the jump table.
fn collect_labels(
    lines: &[SourceLine<'_>],
    jump_table: &mut JumpTable,
    diagnostics: &mut Diagnostics,
) -> HashMap<String, u32> {
    let mut labels = HashMap::new();
    let mut position: u32 = 0;

    for line in lines {
        let text = strip_comment(line.text).trim();
        if text.is_empty() {
            continue;
        }
        let Some(name) = label_name(text) else {
            position += 1;
            continue;
        };
        if !is_identifier(name) {
            diagnostics.report(line, format!("invalid label name {name}"));
            continue;
        }

        let lower = name.to_lowercase();
        if lower == "main" {
            jump_table.set_entry(position);
        } else if let Some(digit) = lower.strip_prefix("isr_") {
            if digit.len() == 1 {
                if let Ok(cause) = digit.parse::<u8>() {
                    jump_table.set_handler(cause, position);
                }
            }
        }

        if labels.insert(name.to_string(), position).is_some() {
            diagnostics.report(line, format!("duplicate label {name}"));
        }
    }

    labels
}

/// Sub-pass B state: resolves operands and reports one diagnostic per
/// malformed token, emitting best-effort bytes so positions stay aligned.
struct Encoder<'a, 'd> {
    labels: &'a HashMap<String, u32>,
    data_labels: &'a HashMap<String, C::Address>,
    diagnostics: &'d mut Diagnostics,
    position: u32,
}

#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
impl Encoder<'_, '_> {
    fn expect_args(&mut self, line: &SourceLine<'_>, tokens: &[&str], count: usize, usage: &str) -> bool {
        if tokens.len() == count + 1 {
            true
        } else {
            self.diagnostics
                .report(line, format!("incorrect instruction format, expected {usage}"));
            false
        }
    }

    fn reg(&mut self, line: &SourceLine<'_>, token: &str) -> u8 {
        operand::integer_register(token).unwrap_or_else(|| {
            self.diagnostics
                .report(line, format!("unknown register {token}"));
            0
        })
    }

    fn freg(&mut self, line: &SourceLine<'_>, token: &str) -> u8 {
        operand::float_register(token).unwrap_or_else(|| {
            self.diagnostics
                .report(line, format!("unknown float register {token}"));
            0
        })
    }

    fn imm_i32(&mut self, line: &SourceLine<'_>, token: &str) -> i32 {
        operand::number::<i32>(token).unwrap_or_else(|| {
            self.diagnostics
                .report(line, format!("expected a number literal, got {token}"));
            0
        })
    }

    fn imm_u32(&mut self, line: &SourceLine<'_>, token: &str) -> u32 {
        operand::number::<u32>(token).unwrap_or_else(|| {
            self.diagnostics
                .report(line, format!("expected an unsigned literal, got {token}"));
            0
        })
    }

    /// Encode a floating immediate: only the low 32 bits of the IEEE-754
    /// pattern fit in the field.
    fn float_bits(&mut self, line: &SourceLine<'_>, token: &str) -> u32 {
        operand::float_number(token).map_or_else(
            || {
                self.diagnostics
                    .report(line, format!("expected a floating point literal, got {token}"));
                0
            },
            |value| value.to_bits() as u32,
        )
    }

    /// A branch target: a literal offset, or a label resolved to the signed
    /// distance from the position after this instruction.
    fn branch_target(&mut self, line: &SourceLine<'_>, token: &str) -> i32 {
        if let Some(offset) = operand::number::<i32>(token) {
            return offset;
        }
        match self.labels.get(token) {
            Some(&target) => (i64::from(target) - i64::from(self.position) - 1) as i32,
            None => {
                self.diagnostics
                    .report(line, format!("unknown label {token}"));
                0
            }
        }
    }

    fn address(&mut self, line: &SourceLine<'_>, token: &str) -> (i32, u8) {
        operand::address_operand(token).unwrap_or_else(|| {
            self.diagnostics
                .report(line, format!("invalid address operand {token}"));
            (0, 255)
        })
    }

    fn encode(&mut self, line: &SourceLine<'_>, opcode: Opcode, tokens: &[&str]) -> Instruction {
        use Opcode as Op;

        match opcode {
            Op::Nop | Op::Halt | Op::Rst | Op::Syscall => {
                self.expect_args(line, tokens, 0, "a bare opcode");
                instruction(opcode, 0, 0, 0, 0)
            }

            Op::Mov | Op::Not | Op::Mult => {
                if !self.expect_args(line, tokens, 2, "opc reg1,reg2") {
                    return instruction(opcode, 0, 0, 0, 0);
                }
                let b2 = self.reg(line, tokens[1]);
                let b3 = self.reg(line, tokens[2]);
                instruction(opcode, b2, b3, 0, 0)
            }

            Op::Add
            | Op::Sub
            | Op::Mul
            | Op::Div
            | Op::Mod
            | Op::And
            | Op::Or
            | Op::Xor
            | Op::Seq
            | Op::Snq
            | Op::Slt
            | Op::Sgt => {
                if !self.expect_args(line, tokens, 3, "opc reg1,reg2,rdest") {
                    return instruction(opcode, 0, 0, 0, 0);
                }
                let b2 = self.reg(line, tokens[1]);
                let b3 = self.reg(line, tokens[2]);
                let b4 = self.reg(line, tokens[3]);
                instruction(opcode, b2, b3, b4, 0)
            }

            Op::Chk => {
                if !self.expect_args(line, tokens, 2, "opc reg,flag") {
                    return instruction(opcode, 0, 0, 0, 0);
                }
                let b2 = self.reg(line, tokens[1]);
                let flag = operand::number::<u8>(tokens[2]).unwrap_or_else(|| {
                    self.diagnostics
                        .report(line, "expected a flag index between 0 and 7");
                    0
                });
                instruction(opcode, b2, flag, 0, 0)
            }

            Op::Addi | Op::Subi | Op::Multi | Op::Divi | Op::Modi => {
                if !self.expect_args(line, tokens, 3, "opc rorg,rdest,immediate") {
                    return instruction(opcode, 0, 0, 0, 0);
                }
                let b2 = self.reg(line, tokens[1]);
                let b3 = self.reg(line, tokens[2]);
                let imm = self.imm_i32(line, tokens[3]);
                instruction(opcode, b2, b3, 0, imm as u32)
            }

            Op::Andi | Op::Ori | Op::Xori | Op::Lsb | Op::Rsb => {
                if !self.expect_args(line, tokens, 3, "opc rorg,rdest,immediate") {
                    return instruction(opcode, 0, 0, 0, 0);
                }
                let b2 = self.reg(line, tokens[1]);
                let b3 = self.reg(line, tokens[2]);
                let imm = self.imm_u32(line, tokens[3]);
                instruction(opcode, b2, b3, 0, imm)
            }

            Op::Beq | Op::Bnq | Op::Bgt | Op::Blt => {
                if !self.expect_args(line, tokens, 3, "opc reg1,reg2,offset or label") {
                    return instruction(opcode, 0, 0, 0, 0);
                }
                let b2 = self.reg(line, tokens[1]);
                let b3 = self.reg(line, tokens[2]);
                let offset = self.branch_target(line, tokens[3]);
                instruction(opcode, b2, b3, 0, offset as u32)
            }

            Op::Movi => {
                if !self.expect_args(line, tokens, 2, "opc rdest,immediate") {
                    return instruction(opcode, 0, 0, 0, 0);
                }
                let b2 = self.reg(line, tokens[1]);
                let imm = self.imm_i32(line, tokens[2]);
                instruction(opcode, b2, 0, 0, imm as u32)
            }

            Op::Jmp | Op::Jal | Op::Jst => {
                if !self.expect_args(line, tokens, 1, "opc offset or label") {
                    return instruction(opcode, 0, 0, 0, 0);
                }
                let offset = self.branch_target(line, tokens[1]);
                instruction(opcode, 0, 0, 0, offset as u32)
            }

            Op::Jr => {
                if !self.expect_args(line, tokens, 1, "opc register") {
                    return instruction(opcode, 0, 0, 0, 0);
                }
                let b2 = self.reg(line, tokens[1]);
                instruction(opcode, b2, 0, 0, 0)
            }

            Op::Lw | Op::Sw => {
                if !self.expect_args(line, tokens, 2, "opc register,offset(base)") {
                    return instruction(opcode, 0, 0, 0, 0);
                }
                let b2 = self.reg(line, tokens[1]);
                let (offset, base) = self.address(line, tokens[2]);
                instruction(opcode, b2, base, 0, offset as u32)
            }

            Op::Push | Op::Pop | Op::Mfh | Op::Mfl => {
                if !self.expect_args(line, tokens, 1, "opc register") {
                    return instruction(opcode, 0, 0, 0, 0);
                }
                let b2 = self.reg(line, tokens[1]);
                instruction(opcode, b2, 0, 0, 0)
            }

            Op::Sir | Op::Clf | Op::Break => {
                if !self.expect_args(line, tokens, 1, "opc immediate") {
                    return instruction(opcode, 0, 0, 0, 0);
                }
                let imm = self.imm_i32(line, tokens[1]);
                instruction(opcode, 0, 0, 0, imm as u32)
            }

            Op::Addf
            | Op::Subf
            | Op::Mulf
            | Op::Divf
            | Op::Powf
            | Op::Seqf
            | Op::Snqf
            | Op::Sltf
            | Op::Sgtf => {
                if !self.expect_args(line, tokens, 3, "opc reg1,reg2,rdest") {
                    return instruction(opcode, 0, 0, 0, 0);
                }
                let b2 = self.freg(line, tokens[1]);
                let b3 = self.freg(line, tokens[2]);
                let b4 = self.freg(line, tokens[3]);
                instruction(opcode, b2, b3, b4, 0)
            }

            Op::Addfi | Op::Subfi | Op::Mulfi | Op::Divfi => {
                if !self.expect_args(line, tokens, 3, "opc rorg,rdest,immediate") {
                    return instruction(opcode, 0, 0, 0, 0);
                }
                let b2 = self.freg(line, tokens[1]);
                let b3 = self.freg(line, tokens[2]);
                let imm = self.float_bits(line, tokens[3]);
                instruction(opcode, b2, b3, 0, imm)
            }

            Op::Sqrf | Op::Cosf | Op::Senf | Op::Tanf | Op::Invf | Op::Expf | Op::Snan
            | Op::Movf => {
                if !self.expect_args(line, tokens, 2, "opc rorg,rdest") {
                    return instruction(opcode, 0, 0, 0, 0);
                }
                let b2 = self.freg(line, tokens[1]);
                let b3 = self.freg(line, tokens[2]);
                instruction(opcode, b2, b3, 0, 0)
            }

            Op::Movfi => {
                if !self.expect_args(line, tokens, 2, "opc rdest,immediate") {
                    return instruction(opcode, 0, 0, 0, 0);
                }
                let b2 = self.freg(line, tokens[1]);
                let imm = self.float_bits(line, tokens[2]);
                instruction(opcode, b2, 0, 0, imm)
            }

            Op::Lfm | Op::Sfm => {
                if !self.expect_args(line, tokens, 2, "opc register,offset(base)") {
                    return instruction(opcode, 0, 0, 0, 0);
                }
                let b2 = self.freg(line, tokens[1]);
                let (offset, base) = self.address(line, tokens[2]);
                instruction(opcode, b2, base, 0, offset as u32)
            }
        }
    }

    /// The address-load pseudo-instruction: a `MOVI` of whichever label
    /// table holds the name. Data labels take precedence over code labels.
    fn encode_lad(&mut self, line: &SourceLine<'_>, tokens: &[&str]) -> Instruction {
        if !self.expect_args(line, tokens, 2, "LAD register,label") {
            return instruction(Opcode::Movi, 0, 0, 0, 0);
        }
        let b2 = self.reg(line, tokens[1]);
        let value = if let Some(&address) = self.data_labels.get(tokens[2]) {
            i32::try_from(address).unwrap_or_default()
        } else if let Some(&position) = self.labels.get(tokens[2]) {
            i32::try_from(position).unwrap_or_default()
        } else {
            self.diagnostics
                .report(line, format!("unknown label {}", tokens[2]));
            -1
        };
        instruction(Opcode::Movi, b2, 0, 0, value as u32)
    }

    /// The accumulator-increment pseudo-instruction: an add-immediate
    /// against `$ac`.
    fn encode_acc(&mut self, line: &SourceLine<'_>, tokens: &[&str]) -> Instruction {
        if !self.expect_args(line, tokens, 1, "ACC immediate") {
            return instruction(Opcode::Addi, 19, 19, 0, 0);
        }
        let imm = self.imm_i32(line, tokens[1]);
        instruction(Opcode::Addi, 19, 19, 0, imm as u32)
    }
}
