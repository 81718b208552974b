//! Operand-level parsers shared by the data and code passes.
//!
//! Number literals are base 10 or base 16 (prefixed by `0x`). Register
//! operands accept a bare index or an alias.

use std::str::FromStr;

use nom::branch::alt;
use nom::bytes::complete::{tag_no_case, take_while1};
use nom::character::complete::{char, digit1, hex_digit1};
use nom::combinator::{all_consuming, map_res, opt, recognize};
use nom::sequence::{delimited, pair, preceded};
use nom::IResult;

use crate::runtime::{FloatReg, Reg};

/// Parse a hexadecimal literal
fn hexadecimal(input: &str) -> IResult<&str, i64> {
    map_res(preceded(tag_no_case("0x"), hex_digit1), |digits| {
        i64::from_str_radix(digits, 16)
    })(input)
}

/// Parse a decimal literal, optionally negative
fn decimal(input: &str) -> IResult<&str, i64> {
    map_res(recognize(pair(opt(char('-')), digit1)), i64::from_str)(input)
}

fn literal(input: &str) -> IResult<&str, i64> {
    alt((hexadecimal, decimal))(input)
}

/// Parse a whole token as a number literal, narrowed to the target width.
pub(crate) fn number<T: TryFrom<i64>>(token: &str) -> Option<T> {
    let (_, value) = all_consuming(literal)(token).ok()?;
    T::try_from(value).ok()
}

/// Parse a whole token as a floating point literal.
pub(crate) fn float_number(token: &str) -> Option<f64> {
    token.parse().ok()
}

/// Resolve an integer register operand.
///
/// Valid indexes are the twenty registers plus the reserved zero/absent
/// index 255.
pub(crate) fn integer_register(token: &str) -> Option<u8> {
    if let Some(index) = number::<u8>(token) {
        return (index < 20 || index == 255).then_some(index);
    }
    Reg::from_str(token).ok().map(Reg::index)
}

/// Resolve a float register operand.
pub(crate) fn float_register(token: &str) -> Option<u8> {
    if let Some(index) = number::<u8>(token) {
        return (index < 12).then_some(index);
    }
    FloatReg::from_str(token).ok().map(FloatReg::index)
}

fn address(input: &str) -> IResult<&str, (i64, Option<&str>)> {
    pair(
        literal,
        opt(delimited(char('('), take_while1(|c| c != ')'), char(')'))),
    )(input)
}

/// Parse a load/store address operand: `offset` or `offset($base)`.
///
/// Without a base register the reserved index 255 is encoded.
pub(crate) fn address_operand(token: &str) -> Option<(i32, u8)> {
    let (_, (offset, base)) = all_consuming(address)(token).ok()?;
    let offset = i32::try_from(offset).ok()?;
    let base = match base {
        Some(name) => integer_register(name)?,
        None => 255,
    };
    Some((offset, base))
}

/// Strip the quotes around a string literal.
///
/// Escapes are kept verbatim: the print syscall decodes them at run time.
pub(crate) fn string_literal(token: &str) -> Option<&str> {
    token.strip_prefix('"')?.strip_suffix('"')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_test() {
        assert_eq!(number::<i32>("42"), Some(42));
        assert_eq!(number::<i32>("-7"), Some(-7));
        assert_eq!(number::<i32>("0x10"), Some(16));
        assert_eq!(number::<i32>("0X1f"), Some(31));
        assert_eq!(number::<u8>("255"), Some(255));
        assert_eq!(number::<u8>("256"), None);
        assert_eq!(number::<u8>("-1"), None);
        assert_eq!(number::<i32>("12abc"), None);
        assert_eq!(number::<i32>(""), None);
    }

    #[test]
    fn float_number_test() {
        assert_eq!(float_number("2.5"), Some(2.5));
        assert_eq!(float_number("-1"), Some(-1.0));
        assert_eq!(float_number("1e3"), Some(1000.0));
        assert_eq!(float_number("x"), None);
    }

    #[test]
    fn integer_register_test() {
        assert_eq!(integer_register("$g0"), Some(0));
        assert_eq!(integer_register("$a1"), Some(9));
        assert_eq!(integer_register("$sp"), Some(16));
        assert_eq!(integer_register("$zero"), Some(255));
        assert_eq!(integer_register("19"), Some(19));
        assert_eq!(integer_register("20"), None);
        assert_eq!(integer_register("$d0"), None);
    }

    #[test]
    fn float_register_test() {
        assert_eq!(float_register("$d0"), Some(0));
        assert_eq!(float_register("$d11"), Some(11));
        assert_eq!(float_register("11"), Some(11));
        assert_eq!(float_register("12"), None);
        assert_eq!(float_register("$g0"), None);
    }

    #[test]
    fn address_operand_test() {
        assert_eq!(address_operand("8"), Some((8, 255)));
        assert_eq!(address_operand("-8($sp)"), Some((-8, 16)));
        assert_eq!(address_operand("0($g3)"), Some((0, 3)));
        assert_eq!(address_operand("0x100($zero)"), Some((256, 255)));
        assert_eq!(address_operand("($g3)"), None);
        assert_eq!(address_operand("8($g9)"), None);
        assert_eq!(address_operand("8("), None);
    }

    #[test]
    fn string_literal_test() {
        assert_eq!(string_literal("\"hello\""), Some("hello"));
        assert_eq!(string_literal("\"\""), Some(""));
        // Escapes stay verbatim
        assert_eq!(string_literal("\"a\\n\""), Some("a\\n"));
        assert_eq!(string_literal("\"open"), None);
        assert_eq!(string_literal("bare"), None);
    }
}
