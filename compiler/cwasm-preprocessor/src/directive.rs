//! Parsing of directive lines.

use nom::branch::alt;
use nom::bytes::complete::{tag, take_till};
use nom::character::complete::{alpha1, alphanumeric1, char, space0};
use nom::combinator::{all_consuming, map, opt, recognize};
use nom::multi::{many0_count, separated_list0};
use nom::sequence::{delimited, pair, preceded, terminated, tuple};
use nom::IResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive<'a> {
    Define {
        name: &'a str,
        /// `None` for object-like macros, otherwise the parameter names and whether the list ends
        /// in `...`.
        params: Option<(Vec<&'a str>, bool)>,
        body: &'a str,
    },
    Undef(&'a str),
    Include {
        name: &'a str,
        system: bool,
    },
    If(&'a str),
    Ifdef(&'a str),
    Ifndef(&'a str),
    Elif(&'a str),
    Else,
    Endif,
    Error(&'a str),
    Pragma(&'a str),
    Empty,
}

impl Directive<'_> {
    /// Conditional directives are interpreted even inside regions that are not taken.
    pub fn is_conditional(&self) -> bool {
        matches!(
            self,
            Directive::If(_)
                | Directive::Ifdef(_)
                | Directive::Ifndef(_)
                | Directive::Elif(_)
                | Directive::Else
                | Directive::Endif
        )
    }
}

pub(crate) fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(space0, inner, space0)
}

pub(crate) fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0_count(alt((alphanumeric1, tag("_")))),
    ))(input)
}

fn introducer(input: &str) -> IResult<&str, Option<&str>> {
    preceded(tuple((space0, char('#'), space0)), opt(identifier))(input)
}

fn parameter_list(input: &str) -> IResult<&str, (Vec<&str>, bool)> {
    let (input, params) = separated_list0(ws(char(',')), ws(identifier))(input)?;
    // separated_list0 leaves a trailing `, ...` unconsumed.
    let (input, variadic) = opt(preceded(opt(ws(char(','))), ws(tag("..."))))(input)?;
    Ok((input, (params, variadic.is_some())))
}

fn define(input: &str) -> IResult<&str, Directive<'_>> {
    let (input, name) = preceded(space0, identifier)(input)?;
    let (input, params) = opt(delimited(char('('), parameter_list, char(')')))(input)?;
    Ok((
        "",
        Directive::Define {
            name,
            params,
            body: input.trim(),
        },
    ))
}

fn single_identifier(input: &str) -> IResult<&str, &str> {
    all_consuming(ws(identifier))(input)
}

fn include(input: &str) -> IResult<&str, Directive<'_>> {
    let quoted = map(
        delimited(char('"'), take_till(|c| c == '"'), char('"')),
        |name| Directive::Include {
            name,
            system: false,
        },
    );
    let angled = map(
        delimited(char('<'), take_till(|c| c == '>'), char('>')),
        |name| Directive::Include { name, system: true },
    );
    all_consuming(terminated(preceded(space0, alt((quoted, angled))), space0))(input)
}

/// Parse a line as a directive.
///
/// Returns `Ok(None)` for lines that are not directives and `Err` with a message for malformed
/// or unknown directives.
pub fn parse_directive(line: &str) -> Result<Option<Directive<'_>>, String> {
    let Ok((rest, name)) = introducer(line) else {
        return Ok(None);
    };
    let malformed = |what: &str| format!("malformed #{what} directive");
    let directive = match name {
        None if rest.trim().is_empty() => Directive::Empty,
        None => return Err(format!("invalid preprocessing directive '{}'", line.trim())),
        Some("define") => define(rest).map_err(|_| malformed("define"))?.1,
        Some("undef") => Directive::Undef(single_identifier(rest).map_err(|_| malformed("undef"))?.1),
        Some("include") => include(rest).map_err(|_| malformed("include"))?.1,
        Some("if") => Directive::If(rest.trim()),
        Some("elif") => Directive::Elif(rest.trim()),
        Some("ifdef") => Directive::Ifdef(single_identifier(rest).map_err(|_| malformed("ifdef"))?.1),
        Some("ifndef") => {
            Directive::Ifndef(single_identifier(rest).map_err(|_| malformed("ifndef"))?.1)
        }
        Some("else") => Directive::Else,
        Some("endif") => Directive::Endif,
        Some("error") => Directive::Error(rest.trim()),
        Some("pragma") => Directive::Pragma(rest.trim()),
        Some(other) => return Err(format!("unknown preprocessor directive '#{other}'")),
    };
    Ok(Some(directive))
}

#[cfg(test)]
mod tests {
    use crate::directive::{parse_directive, Directive};
    use cwasm_macros::{assert_err, assert_ok};

    #[test]
    fn test_text_lines_are_not_directives() {
        assert_eq!(assert_ok!(parse_directive("int x = 1;")), None);
        assert_eq!(assert_ok!(parse_directive("  a # b")), None);
    }

    #[test]
    fn test_parse_define_forms() {
        assert_eq!(
            assert_ok!(parse_directive("#define N 42")),
            Some(Directive::Define {
                name: "N",
                params: None,
                body: "42"
            })
        );
        // A space before the parenthesis makes an object-like macro.
        assert_eq!(
            assert_ok!(parse_directive("#define P (1)")),
            Some(Directive::Define {
                name: "P",
                params: None,
                body: "(1)"
            })
        );
        assert_eq!(
            assert_ok!(parse_directive("  #  define min(X, Y) ((X) < (Y))")),
            Some(Directive::Define {
                name: "min",
                params: Some((vec!["X", "Y"], false)),
                body: "((X) < (Y))"
            })
        );
        assert_eq!(
            assert_ok!(parse_directive("#define log(fmt, ...) printf(fmt, __VA_ARGS__)")),
            Some(Directive::Define {
                name: "log",
                params: Some((vec!["fmt"], true)),
                body: "printf(fmt, __VA_ARGS__)"
            })
        );
        assert_eq!(
            assert_ok!(parse_directive("#define none() 0")),
            Some(Directive::Define {
                name: "none",
                params: Some((vec![], false)),
                body: "0"
            })
        );
    }

    #[test]
    fn test_parse_include_and_conditionals() {
        assert_eq!(
            assert_ok!(parse_directive("#include \"util.h\"")),
            Some(Directive::Include {
                name: "util.h",
                system: false
            })
        );
        assert_eq!(
            assert_ok!(parse_directive("#include <stdio.h>")),
            Some(Directive::Include {
                name: "stdio.h",
                system: true
            })
        );
        assert_eq!(assert_ok!(parse_directive("#ifdef FOO")), Some(Directive::Ifdef("FOO")));
        assert_eq!(assert_ok!(parse_directive("#if A > 1")), Some(Directive::If("A > 1")));
        assert_eq!(assert_ok!(parse_directive("#endif")), Some(Directive::Endif));
        assert_eq!(assert_ok!(parse_directive("#")), Some(Directive::Empty));
    }

    #[test]
    fn test_malformed_directives() {
        assert_err!(parse_directive("#foo"));
        assert_err!(parse_directive("#include stdio.h"));
        assert_err!(parse_directive("#undef A B"));
        assert_err!(parse_directive("#ifdef"));
    }
}
