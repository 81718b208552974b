//! Two-pass assembler for the Vesna-64 text format.
//!
//! The source is line oriented: `#` starts a comment, `.data` and `.code`
//! mark the sections, `label:` prefixes a directive or names an instruction
//! position. The data pass builds the static segment; the code pass first
//! computes label positions, then encodes every instruction. Neither pass
//! stops at the first problem: diagnostics accumulate, and a program is
//! only produced when there are none.

use tracing::debug;

mod code;
mod data;
mod diagnostic;
mod operand;

pub use self::diagnostic::AssemblyError;
use self::diagnostic::Diagnostics;
use crate::program::Program;

/// A source line with enough context to report diagnostics about it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SourceLine<'a> {
    /// 1-based line number in the source
    number: usize,
    /// Byte offset of the line start
    offset: usize,
    text: &'a str,
}

fn split_lines(source: &str) -> Vec<SourceLine<'_>> {
    let mut lines = Vec::new();
    let mut offset = 0;
    for (index, raw) in source.split('\n').enumerate() {
        let text = raw.strip_suffix('\r').unwrap_or(raw);
        lines.push(SourceLine {
            number: index + 1,
            offset,
            text,
        });
        offset += raw.len() + 1;
    }
    lines
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first == '_' || first.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

struct Sections<'a, 'l> {
    data: &'l [SourceLine<'a>],
    code: &'l [SourceLine<'a>],
}

/// Locate the optional `.data` and `.code` markers.
///
/// A program without either marker is all code; a data section without an
/// explicit code marker is rejected.
fn split_sections<'a, 'l>(lines: &'l [SourceLine<'a>]) -> Result<Sections<'a, 'l>, AssemblyError> {
    let data_marker = lines.iter().position(|line| line.text.starts_with(".data"));
    let code_marker = lines.iter().position(|line| line.text.starts_with(".code"));

    match (data_marker, code_marker) {
        (None, None) => Ok(Sections {
            data: &[],
            code: lines,
        }),
        (None, Some(code)) => Ok(Sections {
            data: &[],
            code: &lines[code + 1..],
        }),
        (Some(data), None) => {
            let line = &lines[data];
            Err(AssemblyError {
                line: line.number,
                message: "a program with a data section must mark the start of code with .code"
                    .into(),
                text: line.text.to_string(),
                span: (line.offset, line.text.len()).into(),
            })
        }
        (Some(data), Some(code)) if data < code => Ok(Sections {
            data: &lines[data + 1..code],
            code: &lines[code + 1..],
        }),
        (Some(data), Some(code)) => Ok(Sections {
            code: &lines[code + 1..data],
            data: &lines[data + 1..],
        }),
    }
}

/// Assemble source text into a program.
///
/// Both passes always run to completion; the result is either a clean
/// program or every diagnostic that was found.
///
/// # Errors
///
/// Returns the accumulated diagnostics when at least one line failed to
/// assemble. No partial program is exposed in that case.
#[tracing::instrument(skip(source))]
pub fn assemble(source: &str) -> Result<Program, Vec<AssemblyError>> {
    let lines = split_lines(source);
    let sections = match split_sections(&lines) {
        Ok(sections) => sections,
        Err(error) => return Err(vec![error]),
    };

    let mut diagnostics = Diagnostics::default();
    let mut data_labels = data::predefined_labels();
    let data_bytes = data::assemble_data(sections.data, &mut data_labels, &mut diagnostics);
    let code = code::assemble_code(sections.code, &data_labels, &mut diagnostics);

    if diagnostics.is_empty() {
        debug!(
            instructions = code.instructions.len(),
            data = data_bytes.len(),
            "assembly clean"
        );
        Ok(Program::new(code.instructions, data_bytes, code.jump_table))
    } else {
        Err(diagnostics.into_errors())
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::constants as C;
    use crate::program::{Instruction, Opcode};

    fn ok(source: &str) -> Program {
        assemble(source).expect("program must assemble")
    }

    fn errors(source: &str) -> Vec<AssemblyError> {
        assemble(source).expect_err("assembly must fail")
    }

    #[test]
    fn sections_test() {
        // No markers: the whole source is code
        let program = ok("movi $g0,1\nhalt\n");
        assert_eq!(program.instructions().len(), 2);

        // Data without a code marker is rejected
        let errors = errors(".data\nvalue: .word 1\n");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line, 1);

        // Code before data works too
        let program = ok(indoc! {"
            .code
            main:
            lad $g0,value
            halt
            .data
            value: .word 7
        "});
        assert_eq!(program.instructions().len(), 2);
        assert_eq!(program.data(), 7_i64.to_be_bytes());
    }

    #[test]
    fn register_encoding_test() {
        let program = ok("add $g1,$g2,$a0\n");
        assert_eq!(
            program.instructions()[0],
            Instruction::new(Opcode::Add, [1, 2, 8, 0, 0, 0, 0])
        );
    }

    #[test]
    fn immediate_encoding_test() {
        let program = ok("movi $g3,-2\n");
        assert_eq!(
            program.instructions()[0],
            Instruction::new(Opcode::Movi, [3, 0, 0, 0xFF, 0xFF, 0xFF, 0xFE])
        );
    }

    #[test]
    fn address_operand_test() {
        let program = ok("lw $g0,-8($sp)\nsw $g1,256\n");
        let lw = program.instructions()[0];
        assert_eq!(lw.opcode, Opcode::Lw);
        assert_eq!((lw.b2, lw.b3), (0, 16));
        assert_eq!(lw.imm(), -8);

        // No base register encodes the reserved index
        let sw = program.instructions()[1];
        assert_eq!((sw.b2, sw.b3), (1, 255));
        assert_eq!(sw.imm(), 256);
    }

    #[test]
    fn branch_label_test() {
        let program = ok(indoc! {"
            main:
            movi $g0,1
            beq $g0,$g0,done
            nop
            nop
            done:
            halt
        "});
        // The branch at position 1 targets position 4
        assert_eq!(program.instructions()[1].imm(), 2);

        // Backward: jmp at position 5 to position 0
        let program = ok(indoc! {"
            start:
            nop
            nop
            nop
            nop
            nop
            jmp start
        "});
        assert_eq!(program.instructions()[5].imm(), -6);
    }

    #[test]
    fn numeric_branch_offset_test() {
        let program = ok("bnq $g0,$g1,-3\n");
        assert_eq!(program.instructions()[0].imm(), -3);
    }

    #[test]
    fn jump_table_test() {
        let program = ok(indoc! {"
            nop
            main:
            nop
            isr_0:
            nop
            isr_7:
            halt
        "});
        let table = program.jump_table();
        assert_eq!(table.entry(), 1);
        assert_eq!(table.handler(0), Some(2));
        assert_eq!(table.handler(7), Some(3));
        assert_eq!(table.handler(1), None);
    }

    #[test]
    fn lad_resolves_data_label_test() {
        let program = ok(indoc! {"
            .data
            first: .word 1
            second: .word 2
            .code
            main:
            lad $g0,second
            halt
        "});
        let movi = program.instructions()[0];
        assert_eq!(movi.opcode, Opcode::Movi);
        assert_eq!(movi.imm(), 264);
    }

    #[test]
    fn lad_data_precedence_test() {
        // The same name in both tables resolves to the data address
        let program = ok(indoc! {"
            .data
            here: .word 1
            .code
            main:
            lad $g0,here
            halt
            here:
            halt
        "});
        assert_eq!(program.instructions()[0].imm(), 256);

        // A pure code label resolves to its position
        let program = ok(indoc! {"
            main:
            lad $g0,there
            halt
            there:
            halt
        "});
        assert_eq!(program.instructions()[0].imm(), 2);
    }

    #[test]
    fn io_labels_test() {
        let program = ok("lad $g0,IO_INT\nhalt\n");
        assert_eq!(program.instructions()[0].imm(), 248);
    }

    #[test]
    fn acc_expands_to_addi_test() {
        let program = ok("acc 5\n");
        assert_eq!(
            program.instructions()[0],
            Instruction::new(Opcode::Addi, [19, 19, 0, 0, 0, 0, 5])
        );
    }

    #[test]
    fn data_directives_test() {
        let program = ok(indoc! {"
            .data
            bytes: .byte 1,2,3
            half: .half -1
            word: .word 258
            .code
            main:
            halt
        "});
        let mut expected = vec![1, 2, 3];
        expected.extend_from_slice(&(-1_i32).to_be_bytes());
        expected.extend_from_slice(&258_i64.to_be_bytes());
        assert_eq!(program.data(), expected.as_slice());
    }

    #[test]
    fn string_directives_test() {
        let program = ok(indoc! {r#"
            .data
            plain: .string "ab"
            ended: .stringz "c"
            .code
            main:
            halt
        "#});
        assert_eq!(program.data(), [0, b'a', 0, b'b', 0, b'c', 0, 0]);
    }

    #[test]
    fn block_and_align_test() {
        let program = ok(indoc! {"
            .data
            gap: .block 3
            aligned: .word 1
            .code
            main:
            lad $g0,aligned
            halt
        "});
        // .block only reserves: no alignment happens by itself
        assert_eq!(program.instructions()[0].imm(), 259);

        let program = ok(indoc! {"
            .data
            gap: .block 3
            pad: .align 3
            aligned: .word 1
            .code
            main:
            lad $g0,aligned
            halt
        "});
        // 259 rounds up to the next multiple of 8
        assert_eq!(program.instructions()[0].imm(), 264);
        assert_eq!(program.data().len(), 16);
    }

    #[test]
    fn double_directive_test() {
        let program = ok(indoc! {"
            .data
            value: .double 2.5
            .code
            main:
            halt
        "});
        assert_eq!(program.data(), 2.5_f64.to_bits().to_be_bytes());
    }

    #[test]
    fn float_immediate_truncation_test() {
        let program = ok("movfi $d2,2.5\n");
        let movfi = program.instructions()[0];
        assert_eq!(movfi.opcode, Opcode::Movfi);
        assert_eq!(movfi.b2, 2);
        #[allow(clippy::cast_possible_truncation)]
        let expected = 2.5_f64.to_bits() as u32;
        assert_eq!(movfi.imm_unsigned(), expected);
    }

    #[test]
    fn comment_handling_test() {
        let program = ok(indoc! {"
            # full line comment
            main:
            movi $g0,1 # inline comment
            halt
        "});
        assert_eq!(program.instructions().len(), 2);
        assert_eq!(program.instructions()[0].imm(), 1);
    }

    #[test]
    fn diagnostics_accumulate_test() {
        let result = errors(indoc! {"
            main:
            frobnicate $g0
            movi $g9,1
            beq $g0,$g1,nowhere
            halt
        "});
        assert_eq!(result.len(), 3);
        assert_eq!(result[0].line, 2);
        assert!(result[0].message.contains("frobnicate"));
        assert_eq!(result[1].line, 3);
        assert!(result[1].message.contains("$g9"));
        assert_eq!(result[2].line, 4);
        assert!(result[2].message.contains("nowhere"));
    }

    #[test]
    fn data_diagnostics_test() {
        let result = errors(indoc! {"
            .data
            bad: .word x
            worse: .float 1.0
            .code
            main:
            halt
        "});
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].line, 2);
        assert_eq!(result[1].line, 3);
    }

    #[test]
    fn argument_count_test() {
        let result = errors("add $g0,$g1\n");
        assert_eq!(result.len(), 1);
        assert!(result[0].message.contains("incorrect instruction format"));
    }

    #[test]
    fn duplicate_label_test() {
        let result = errors(indoc! {"
            here:
            nop
            here:
            halt
        "});
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].line, 3);
    }

    #[test]
    fn assembly_is_idempotent_test() {
        let source = indoc! {"
            .data
            value: .word 9
            .code
            main:
            lad $g0,value
            lw $g1,0($g0)
            beq $g1,$zero,main
            halt
        "};
        assert_eq!(ok(source), ok(source));

        let bad = "movi $g9,1\n";
        let first: Vec<_> = errors(bad).iter().map(ToString::to_string).collect();
        let second: Vec<_> = errors(bad).iter().map(ToString::to_string).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn case_insensitive_mnemonics_test() {
        let program = ok("MOVI $G0,1\nHaLt\n");
        assert_eq!(program.instructions()[0].opcode, Opcode::Movi);
        assert_eq!(program.instructions()[1].opcode, Opcode::Halt);
    }

    #[test]
    fn line_numbers_after_data_section_test() {
        let result = errors(indoc! {"
            .data
            value: .word 1
            .code
            main:
            frobnicate
        "});
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].line, 5);
    }

    #[test]
    fn data_bound_test() {
        // The directive after the oversized block reports the overflow
        let source = format!(
            ".data\nbig: .block {}\ntail: .byte 1\n.code\nmain:\nhalt\n",
            C::MEMORY_SIZE
        );
        let result = assemble(&source).expect_err("assembly must fail");
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].line, 3);
        assert!(result[0].message.contains("exceeds"));
    }
}
