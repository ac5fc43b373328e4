//! Evaluation of `#if` and `#elif` conditions.
//!
//! The condition is first rewritten to replace `defined X` and `defined(X)`, then macro expanded,
//! and finally parsed into a small expression tree that is evaluated in 64-bit arithmetic.
//! Identifiers that survive expansion evaluate to 0.

use crate::directive::{identifier, ws};
use crate::lexeme::{tokenize, untokenize, PpToken, PpTokenKind};
use crate::macros::{Expander, MacroTable};
use nom::branch::alt;
use nom::bytes::complete::{escaped, tag};
use nom::character::complete::{anychar, char, digit1, none_of, space0};
use nom::combinator::{map, map_res, opt, recognize};
use nom::multi::many0_count;
use nom::sequence::{delimited, pair, tuple};
use nom::IResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnaryOp {
    Plus,
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Constant(i64),
    Unary(UnaryOp, Box<Condition>),
    Binary(BinaryOp, Box<Condition>, Box<Condition>),
    Conditional(Box<Condition>, Box<Condition>, Box<Condition>),
}

impl Condition {
    fn evaluate(&self) -> Result<i64, String> {
        match self {
            Condition::Constant(value) => Ok(*value),
            Condition::Unary(op, operand) => {
                let value = operand.evaluate()?;
                Ok(match op {
                    UnaryOp::Plus => value,
                    UnaryOp::Neg => value.wrapping_neg(),
                    UnaryOp::Not => i64::from(value == 0),
                    UnaryOp::BitNot => !value,
                })
            }
            Condition::Binary(op, lhs, rhs) => {
                let a = lhs.evaluate()?;
                match op {
                    BinaryOp::And if a == 0 => return Ok(0),
                    BinaryOp::Or if a != 0 => return Ok(1),
                    BinaryOp::And | BinaryOp::Or => return Ok(i64::from(rhs.evaluate()? != 0)),
                    _ => {}
                }
                let b = rhs.evaluate()?;
                let shift = (b & 63) as u32;
                Ok(match op {
                    BinaryOp::Mul => a.wrapping_mul(b),
                    BinaryOp::Div | BinaryOp::Rem if b == 0 => {
                        return Err("division by zero in preprocessor expression".to_string())
                    }
                    BinaryOp::Div => a.wrapping_div(b),
                    BinaryOp::Rem => a.wrapping_rem(b),
                    BinaryOp::Add => a.wrapping_add(b),
                    BinaryOp::Sub => a.wrapping_sub(b),
                    BinaryOp::Shl => a.wrapping_shl(shift),
                    BinaryOp::Shr => a.wrapping_shr(shift),
                    BinaryOp::Lt => i64::from(a < b),
                    BinaryOp::Gt => i64::from(a > b),
                    BinaryOp::Le => i64::from(a <= b),
                    BinaryOp::Ge => i64::from(a >= b),
                    BinaryOp::Eq => i64::from(a == b),
                    BinaryOp::Ne => i64::from(a != b),
                    BinaryOp::BitAnd => a & b,
                    BinaryOp::BitXor => a ^ b,
                    BinaryOp::BitOr => a | b,
                    BinaryOp::And | BinaryOp::Or => i64::from(a != 0 && b != 0),
                })
            }
            Condition::Conditional(test, then, otherwise) => {
                if test.evaluate()? != 0 {
                    then.evaluate()
                } else {
                    otherwise.evaluate()
                }
            }
        }
    }
}

/// Operators that must not be split into a shorter operator followed by another character.
const COMPOUND_OPERATORS: &[&str] = &["<<", ">>", "<=", ">=", "==", "!=", "&&", "||"];

fn operator<T: Copy + 'static>(
    candidates: &'static [(&'static str, T)],
) -> impl FnMut(&str) -> IResult<&str, T> {
    move |input: &str| {
        for (text, op) in candidates {
            if let Some(rest) = input.strip_prefix(text) {
                let longer = rest
                    .chars()
                    .next()
                    .map(|next| format!("{text}{next}"))
                    .is_some_and(|longer| COMPOUND_OPERATORS.contains(&longer.as_str()));
                if !longer {
                    return Ok((rest, *op));
                }
            }
        }
        Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Tag,
        )))
    }
}

fn binary_level<'a>(
    input: &'a str,
    candidates: &'static [(&'static str, BinaryOp)],
    next: fn(&'a str) -> IResult<&'a str, Condition>,
) -> IResult<&'a str, Condition> {
    let (mut input, mut lhs) = next(input)?;
    loop {
        match pair(ws(operator(candidates)), next)(input) {
            Ok((rest, (op, rhs))) => {
                lhs = Condition::Binary(op, Box::new(lhs), Box::new(rhs));
                input = rest;
            }
            Err(nom::Err::Error(_)) => return Ok((input, lhs)),
            Err(e) => return Err(e),
        }
    }
}

fn conditional(input: &str) -> IResult<&str, Condition> {
    let (input, test) = logical_or(input)?;
    let branches = tuple((ws(char('?')), conditional, ws(char(':')), conditional));
    let (input, branches) = opt(branches)(input)?;
    Ok(match branches {
        Some((_, then, _, otherwise)) => (
            input,
            Condition::Conditional(Box::new(test), Box::new(then), Box::new(otherwise)),
        ),
        None => (input, test),
    })
}

fn logical_or(input: &str) -> IResult<&str, Condition> {
    binary_level(input, &[("||", BinaryOp::Or)], logical_and)
}

fn logical_and(input: &str) -> IResult<&str, Condition> {
    binary_level(input, &[("&&", BinaryOp::And)], bit_or)
}

fn bit_or(input: &str) -> IResult<&str, Condition> {
    binary_level(input, &[("|", BinaryOp::BitOr)], bit_xor)
}

fn bit_xor(input: &str) -> IResult<&str, Condition> {
    binary_level(input, &[("^", BinaryOp::BitXor)], bit_and)
}

fn bit_and(input: &str) -> IResult<&str, Condition> {
    binary_level(input, &[("&", BinaryOp::BitAnd)], equality)
}

fn equality(input: &str) -> IResult<&str, Condition> {
    binary_level(input, &[("==", BinaryOp::Eq), ("!=", BinaryOp::Ne)], relational)
}

fn relational(input: &str) -> IResult<&str, Condition> {
    const OPS: &[(&str, BinaryOp)] = &[
        ("<=", BinaryOp::Le),
        (">=", BinaryOp::Ge),
        ("<", BinaryOp::Lt),
        (">", BinaryOp::Gt),
    ];
    binary_level(input, OPS, shift)
}

fn shift(input: &str) -> IResult<&str, Condition> {
    binary_level(input, &[("<<", BinaryOp::Shl), (">>", BinaryOp::Shr)], additive)
}

fn additive(input: &str) -> IResult<&str, Condition> {
    binary_level(input, &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)], multiplicative)
}

fn multiplicative(input: &str) -> IResult<&str, Condition> {
    const OPS: &[(&str, BinaryOp)] = &[
        ("*", BinaryOp::Mul),
        ("/", BinaryOp::Div),
        ("%", BinaryOp::Rem),
    ];
    binary_level(input, OPS, unary)
}

fn unary(input: &str) -> IResult<&str, Condition> {
    const OPS: &[(&str, UnaryOp)] = &[
        ("+", UnaryOp::Plus),
        ("-", UnaryOp::Neg),
        ("!", UnaryOp::Not),
        ("~", UnaryOp::BitNot),
    ];
    alt((
        map(pair(ws(operator(OPS)), unary), |(op, operand)| {
            Condition::Unary(op, Box::new(operand))
        }),
        primary,
    ))(input)
}

fn primary(input: &str) -> IResult<&str, Condition> {
    ws(alt((
        delimited(char('('), conditional, ws(char(')'))),
        map(integer, Condition::Constant),
        map(character, Condition::Constant),
        map(identifier, |_| Condition::Constant(0)),
    )))(input)
}

fn integer(input: &str) -> IResult<&str, i64> {
    let literal = recognize(pair(
        digit1,
        many0_count(alt((nom::character::complete::alphanumeric1, tag("_")))),
    ));
    map_res(literal, parse_integer)(input)
}

fn parse_integer(literal: &str) -> Result<i64, std::num::ParseIntError> {
    let digits = literal.trim_end_matches(['u', 'U', 'l', 'L']);
    let value = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16)?
    } else if digits.len() > 1 && digits.starts_with('0') {
        u64::from_str_radix(&digits[1..], 8)?
    } else {
        digits.parse::<u64>()?
    };
    Ok(value as i64)
}

fn character(input: &str) -> IResult<&str, i64> {
    let body = escaped(none_of("\\'"), '\\', anychar);
    map(delimited(char('\''), body, char('\'')), decode_character)(input)
}

fn decode_character(body: &str) -> i64 {
    let Some(escape) = body.strip_prefix('\\') else {
        return body.chars().next().map_or(0, |c| c as i64);
    };
    let simple = match escape {
        "n" => Some(10),
        "t" => Some(9),
        "r" => Some(13),
        "a" => Some(7),
        "b" => Some(8),
        "f" => Some(12),
        "v" => Some(11),
        "e" => Some(27),
        "\\" | "'" | "\"" | "?" => escape.chars().next().map(|c| c as i64),
        _ => None,
    };
    if let Some(value) = simple {
        return value;
    }
    if let Some(hex) = escape.strip_prefix('x') {
        return i64::from_str_radix(hex, 16).map_or(0, |v| v as u8 as i8 as i64);
    }
    i64::from_str_radix(escape, 8).map_or(0, |v| v as u8 as i8 as i64)
}

/// Replace every `defined NAME` and `defined(NAME)` by `1` or `0`.
fn replace_defined(tokens: &[PpToken], table: &MacroTable) -> Result<Vec<PpToken>, String> {
    let significant = |from: usize| (from..tokens.len()).find(|&i| !tokens[i].is_whitespace());
    let mut output = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];
        if token.kind != PpTokenKind::Identifier || token.text != "defined" {
            output.push(token.clone());
            i += 1;
            continue;
        }
        let malformed = || "operator 'defined' requires an identifier".to_string();
        let next = significant(i + 1).ok_or_else(malformed)?;
        let (name, end) = if tokens[next].is_punct("(") {
            let name = significant(next + 1).ok_or_else(malformed)?;
            let close = significant(name + 1).ok_or_else(malformed)?;
            if !tokens[close].is_punct(")") {
                return Err("missing ')' after 'defined'".to_string());
            }
            (name, close)
        } else {
            (next, next)
        };
        if tokens[name].kind != PpTokenKind::Identifier {
            return Err(malformed());
        }
        let value = if table.is_defined(&tokens[name].text) {
            "1"
        } else {
            "0"
        };
        output.push(PpToken::new(PpTokenKind::Number, value));
        i = end + 1;
    }
    Ok(output)
}

/// Evaluate the condition of an `#if` or `#elif` directive.
pub fn evaluate_condition(condition: &str, table: &MacroTable) -> Result<bool, String> {
    if condition.trim().is_empty() {
        return Err("#if with no expression".to_string());
    }
    let tokens = replace_defined(&tokenize(condition), table)?;
    let expanded = Expander::new(table).expand(&tokens)?;
    let text = untokenize(&expanded);
    let parsed = pair(conditional, space0)(text.as_str());
    match parsed {
        Ok(("", (expression, _))) => Ok(expression.evaluate()? != 0),
        Ok((rest, _)) => Err(format!("unexpected '{}' in preprocessor expression", rest.trim())),
        Err(_) => Err(format!("invalid preprocessor expression '{}'", text.trim())),
    }
}

#[cfg(test)]
mod tests {
    use crate::condition::evaluate_condition;
    use crate::macros::{MacroDefinition, MacroTable};
    use cwasm_macros::{assert_err, assert_ok};

    fn eval(condition: &str) -> bool {
        let mut table = MacroTable::new();
        let definition = MacroDefinition::Object {
            body: "3".to_string(),
        };
        assert_ok!(table.define("THREE", definition));
        assert_ok!(evaluate_condition(condition, &table))
    }

    #[test]
    fn test_arithmetic_and_precedence() {
        assert!(eval("1 + 2 * 3 == 7"));
        assert!(eval("(1 + 2) * 3 == 9"));
        assert!(eval("1 << 4 == 16 && 17 >> 1 == 8"));
        assert!(eval("-1 < 0"));
        assert!(eval("~0 == -1"));
        assert!(eval("0x10 == 16 && 010 == 8 && 10UL == 10"));
        assert!(eval("'a' == 97 && '\\n' == 10"));
        assert!(eval("1 ? 2 : 0"));
        assert!(!eval("0 ? 2 : 0"));
        assert!(eval("5 & 4 && (5 | 2) == 7 && (5 ^ 1) == 4"));
    }

    #[test]
    fn test_defined_and_macros() {
        assert!(eval("defined THREE"));
        assert!(eval("defined(THREE) && THREE > 2"));
        assert!(!eval("defined(FOUR)"));
        assert!(eval("!FOUR"));
    }

    #[test]
    fn test_short_circuit_skips_division_by_zero() {
        assert!(!eval("0 && 1 / 0"));
        let table = MacroTable::new();
        let err = assert_err!(evaluate_condition("1 / 0", &table));
        assert!(err.contains("division by zero"));
    }

    #[test]
    fn test_malformed_conditions() {
        let table = MacroTable::new();
        assert_err!(evaluate_condition("", &table));
        assert_err!(evaluate_condition("1 +", &table));
        assert_err!(evaluate_condition("(1", &table));
        assert_err!(evaluate_condition("defined(", &table));
    }
}
