//! Data segment pass.
//!
//! Walks the `.data` section once, building the byte buffer that the loader
//! copies to [`crate::constants::DATA_START`] and recording each label at
//! its write offset. Overrunning the memory bound is a diagnostic, not a
//! stop: later directives still get processed.

use std::collections::HashMap;

use super::diagnostic::Diagnostics;
use super::{is_identifier, operand, SourceLine};
use crate::constants as C;

/// Labels every program can use to reach the memory-mapped I/O region.
const IO_LABELS: [(&str, C::Address); 10] = [
    ("IO_1", 128),
    ("IO_2", 136),
    ("IO_3", 144),
    ("IO_4", 152),
    ("IO_5", 160),
    ("IO_6", 168),
    ("IO_7", 176),
    ("IO_8", 184),
    ("IO_C", 192),
    ("IO_INT", 248),
];

pub(crate) fn predefined_labels() -> HashMap<String, C::Address> {
    IO_LABELS
        .iter()
        .map(|&(name, address)| (name.to_string(), address))
        .collect()
}

/// Split an optional `label:` prefix off a data line.
fn split_label(text: &str) -> Option<(&str, &str)> {
    let (label, rest) = text.split_once(':')?;
    let label = label.trim();
    is_identifier(label).then_some((label, rest))
}

fn split_values(arguments: &str) -> impl Iterator<Item = &str> {
    arguments
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

pub(crate) fn assemble_data(
    lines: &[SourceLine<'_>],
    labels: &mut HashMap<String, C::Address>,
    diagnostics: &mut Diagnostics,
) -> Vec<u8> {
    let mut bytes = Vec::new();
    let mut offset = C::DATA_START;

    for line in lines {
        let text = line.text.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }
        if offset > C::MEMORY_SIZE {
            diagnostics.report(
                line,
                format!("data segment exceeds the {} byte memory", C::MEMORY_SIZE),
            );
        }

        let directive_text = match split_label(text) {
            Some((label, rest)) => {
                if labels.insert(label.to_string(), offset).is_some() {
                    diagnostics.report(line, format!("duplicate data label {label}"));
                }
                rest.trim()
            }
            None => text,
        };

        let Some((directive, arguments)) = directive_text.split_once(char::is_whitespace) else {
            diagnostics.report(line, "expected a directive and its values");
            continue;
        };
        let arguments = arguments.trim();

        match directive.to_lowercase().as_str() {
            ".byte" => {
                for value in split_values(arguments) {
                    if let Some(byte) = operand::number::<u8>(value) {
                        bytes.push(byte);
                        offset += 1;
                    } else {
                        diagnostics.report(line, "expected a byte literal");
                    }
                }
            }
            ".half" => {
                for value in split_values(arguments) {
                    if let Some(half) = operand::number::<i32>(value) {
                        bytes.extend_from_slice(&half.to_be_bytes());
                        offset += 4;
                    } else {
                        diagnostics.report(line, "expected a 32-bit signed literal");
                    }
                }
            }
            ".word" => {
                for value in split_values(arguments) {
                    if let Some(word) = operand::number::<i64>(value) {
                        bytes.extend_from_slice(&word.to_be_bytes());
                        offset += 8;
                    } else {
                        diagnostics.report(line, "expected a 64-bit signed literal");
                    }
                }
            }
            ".double" => {
                for value in split_values(arguments) {
                    if let Some(double) = operand::float_number(value) {
                        bytes.extend_from_slice(&double.to_bits().to_be_bytes());
                        offset += 8;
                    } else {
                        diagnostics.report(line, "expected a floating point literal");
                    }
                }
            }
            ".string" | ".stringz" => {
                let Some(literal) = operand::string_literal(arguments) else {
                    diagnostics.report(line, "string must be enclosed in double quotes");
                    continue;
                };
                for unit in literal.encode_utf16() {
                    bytes.extend_from_slice(&unit.to_be_bytes());
                    offset += 2;
                }
                if directive.eq_ignore_ascii_case(".stringz") {
                    bytes.extend_from_slice(&[0, 0]);
                    offset += 2;
                }
            }
            ".block" => {
                let values: Vec<_> = split_values(arguments).collect();
                match values.as_slice() {
                    [value] => {
                        if let Some(count) = operand::number::<u32>(*value) {
                            bytes.resize(bytes.len() + count as usize, 0);
                            offset += C::Address::from(count);
                        } else {
                            diagnostics.report(line, "expected a positive byte count");
                        }
                    }
                    _ => diagnostics.report(line, "expected a single byte count"),
                }
            }
            ".align" => {
                let values: Vec<_> = split_values(arguments).collect();
                match values.as_slice() {
                    [value] => match operand::number::<u32>(*value)
                        .and_then(|shift| 1_u64.checked_shl(shift))
                    {
                        Some(alignment) => {
                            // Pad with zeroes up to the next multiple of 2^n
                            let padding = (alignment - offset % alignment) % alignment;
                            bytes.resize(bytes.len() + padding as usize, 0);
                            offset += padding;
                        }
                        None => diagnostics.report(line, "expected an alignment exponent"),
                    },
                    _ => diagnostics.report(line, "expected a single alignment exponent"),
                }
            }
            _ => diagnostics.report(line, format!("unknown data directive {directive}")),
        }
    }

    bytes
}
