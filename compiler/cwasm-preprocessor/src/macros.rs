//! The macro table and macro expansion.

use crate::lexeme::{tokenize, PpToken, PpTokenKind};
use std::collections::BTreeMap;

/// A single `#define`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacroDefinition {
    Object {
        body: String,
    },
    Function {
        params: Vec<String>,
        variadic: bool,
        body: String,
    },
}

impl MacroDefinition {
    fn body(&self) -> &str {
        match self {
            MacroDefinition::Object { body } => body,
            MacroDefinition::Function { body, .. } => body,
        }
    }

    /// Two definitions are identical when they agree on their parameters and their replacement
    /// lists are equal up to whitespace.
    pub fn is_identical(&self, other: &MacroDefinition) -> bool {
        let normalize = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ");
        let same_shape = match (self, other) {
            (MacroDefinition::Object { .. }, MacroDefinition::Object { .. }) => true,
            (
                MacroDefinition::Function {
                    params: a,
                    variadic: va,
                    ..
                },
                MacroDefinition::Function {
                    params: b,
                    variadic: vb,
                    ..
                },
            ) => a == b && va == vb,
            _ => false,
        };
        same_shape && normalize(self.body()) == normalize(other.body())
    }
}

#[derive(Debug, Default, Clone)]
pub struct MacroTable {
    definitions: BTreeMap<String, MacroDefinition>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a definition. Redefining a macro is only allowed with an identical definition.
    pub fn define(&mut self, name: &str, definition: MacroDefinition) -> Result<(), String> {
        // Expansion is paste-free.
        if tokenize(definition.body()).iter().any(|t| t.is_punct("##")) {
            return Err(format!("token pasting with '##' in macro '{name}' is not supported"));
        }
        match self.definitions.get(name) {
            Some(existing) if !existing.is_identical(&definition) => {
                Err(format!("macro '{name}' redefined with a different body"))
            }
            _ => {
                self.definitions.insert(name.to_string(), definition);
                Ok(())
            }
        }
    }

    pub fn undefine(&mut self, name: &str) {
        self.definitions.remove(name);
    }

    pub fn get(&self, name: &str) -> Option<&MacroDefinition> {
        self.definitions.get(name)
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }
}

/// Expands macros in token sequences against a table.
///
/// `disabled` holds the names of the macros currently being expanded; they are not expanded again
/// while their own replacement is rescanned.
pub struct Expander<'t> {
    table: &'t MacroTable,
    disabled: Vec<String>,
}

impl<'t> Expander<'t> {
    pub fn new(table: &'t MacroTable) -> Self {
        Self {
            table,
            disabled: Vec::new(),
        }
    }

    pub fn expand_text(&mut self, text: &str) -> Result<String, String> {
        let tokens = tokenize(text);
        let expanded = self.expand(&tokens)?;
        Ok(expanded.iter().map(|t| t.text.as_str()).collect())
    }

    pub fn expand(&mut self, tokens: &[PpToken]) -> Result<Vec<PpToken>, String> {
        let mut output = Vec::with_capacity(tokens.len());
        let mut i = 0;
        while i < tokens.len() {
            let token = &tokens[i];
            let definition = match token.kind {
                PpTokenKind::Identifier if !self.disabled.contains(&token.text) => {
                    self.table.get(&token.text)
                }
                _ => None,
            };
            match definition {
                Some(MacroDefinition::Object { body }) => {
                    let replacement = tokenize(body);
                    output.extend(self.rescan(&token.text, &replacement)?);
                    i += 1;
                }
                Some(MacroDefinition::Function {
                    params,
                    variadic,
                    body,
                }) => {
                    let open = next_significant(tokens, i + 1);
                    match open {
                        Some(open) if tokens[open].is_punct("(") => {
                            let (arguments, close) = collect_arguments(tokens, open)
                                .ok_or_else(|| {
                                    format!("unterminated invocation of macro '{}'", token.text)
                                })?;
                            let arguments =
                                bind_arguments(&token.text, params, *variadic, arguments)?;
                            let mut expanded = Vec::with_capacity(arguments.len());
                            for argument in &arguments {
                                expanded.push(self.expand(argument)?);
                            }
                            let replacement =
                                substitute(&tokenize(body), params, *variadic, &arguments, &expanded);
                            output.extend(self.rescan(&token.text, &replacement)?);
                            i = close + 1;
                        }
                        _ => {
                            output.push(token.clone());
                            i += 1;
                        }
                    }
                }
                None => {
                    output.push(token.clone());
                    i += 1;
                }
            }
        }
        Ok(output)
    }

    fn rescan(&mut self, name: &str, replacement: &[PpToken]) -> Result<Vec<PpToken>, String> {
        self.disabled.push(name.to_string());
        let result = self.expand(replacement);
        self.disabled.pop();
        result
    }
}

fn next_significant(tokens: &[PpToken], from: usize) -> Option<usize> {
    (from..tokens.len()).find(|&i| !tokens[i].is_whitespace())
}

fn previous_significant(tokens: &[PpToken], before: usize) -> Option<usize> {
    (0..before).rev().find(|&i| !tokens[i].is_whitespace())
}

/// Split the arguments of an invocation starting at the opening parenthesis `open`.
///
/// Returns the raw argument token lists and the index of the closing parenthesis.
fn collect_arguments(tokens: &[PpToken], open: usize) -> Option<(Vec<Vec<PpToken>>, usize)> {
    let mut arguments = vec![Vec::new()];
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(open + 1) {
        if token.is_punct("(") {
            depth += 1;
        } else if token.is_punct(")") {
            if depth == 0 {
                return Some((arguments, i));
            }
            depth -= 1;
        } else if token.is_punct(",") && depth == 0 {
            arguments.push(Vec::new());
            continue;
        }
        if let Some(current) = arguments.last_mut() {
            current.push(token.clone());
        }
    }
    None
}

fn trim(tokens: &[PpToken]) -> Vec<PpToken> {
    let start = tokens.iter().position(|t| !t.is_whitespace());
    let end = tokens.iter().rposition(|t| !t.is_whitespace());
    match (start, end) {
        (Some(start), Some(end)) => tokens[start..=end].to_vec(),
        _ => Vec::new(),
    }
}

/// Match invocation arguments against the parameter list, folding the variadic tail.
fn bind_arguments(
    name: &str,
    params: &[String],
    variadic: bool,
    arguments: Vec<Vec<PpToken>>,
) -> Result<Vec<Vec<PpToken>>, String> {
    let mut arguments = arguments.iter().map(|a| trim(a)).collect::<Vec<_>>();
    // `f()` passes one empty argument, which is zero arguments for a macro without parameters.
    if params.is_empty() && arguments.len() == 1 && arguments[0].is_empty() {
        arguments.clear();
    }
    if variadic {
        if arguments.len() < params.len() {
            return Err(format!(
                "macro '{name}' requires at least {} arguments, but {} were given",
                params.len(),
                arguments.len()
            ));
        }
        let rest = arguments.split_off(params.len());
        let mut joined = Vec::new();
        for (i, argument) in rest.into_iter().enumerate() {
            if i > 0 {
                joined.push(PpToken::new(PpTokenKind::Punct, ","));
                joined.push(PpToken::new(PpTokenKind::Space, " "));
            }
            joined.extend(argument);
        }
        arguments.push(joined);
    } else if arguments.len() != params.len() {
        return Err(format!(
            "macro '{name}' requires {} arguments, but {} were given",
            params.len(),
            arguments.len()
        ));
    }
    Ok(arguments)
}

fn parameter_index(name: &str, params: &[String], variadic: bool) -> Option<usize> {
    match params.iter().position(|p| p == name) {
        Some(index) => Some(index),
        None if variadic && name == "__VA_ARGS__" => Some(params.len()),
        None => None,
    }
}

/// Produce the replacement list of a function-like macro.
///
/// An argument made of more than one token is wrapped in parentheses unless the occurrence is
/// already delimited in the body: the sole content of a parenthesized group, or a whole element
/// of a parenthesized comma list. Arguments never hold a top-level comma, so a list element
/// binds the same either way, and type names passed through stay type names.
fn substitute(
    body: &[PpToken],
    params: &[String],
    variadic: bool,
    raw: &[Vec<PpToken>],
    expanded: &[Vec<PpToken>],
) -> Vec<PpToken> {
    let mut output = Vec::with_capacity(body.len());
    let mut i = 0;
    while i < body.len() {
        let token = &body[i];
        if token.is_punct("#") {
            if let Some(next) = next_significant(body, i + 1) {
                if let Some(index) = parameter_index(&body[next].text, params, variadic) {
                    output.push(stringize(&raw[index]));
                    i = next + 1;
                    continue;
                }
            }
        }
        let index = match token.kind {
            PpTokenKind::Identifier => parameter_index(&token.text, params, variadic),
            _ => None,
        };
        match index {
            Some(index) => {
                let argument = &expanded[index];
                let significant = argument.iter().filter(|t| !t.is_whitespace()).count();
                let enclosed = previous_significant(body, i)
                    .is_some_and(|p| body[p].is_punct("(") || body[p].is_punct(","))
                    && next_significant(body, i + 1)
                        .is_some_and(|n| body[n].is_punct(")") || body[n].is_punct(","));
                let is_variadic_tail = variadic && index == params.len();
                if significant > 1 && !enclosed && !is_variadic_tail {
                    output.push(PpToken::new(PpTokenKind::Punct, "("));
                    output.extend(argument.iter().cloned());
                    output.push(PpToken::new(PpTokenKind::Punct, ")"));
                } else {
                    output.extend(argument.iter().cloned());
                }
            }
            None => output.push(token.clone()),
        }
        i += 1;
    }
    output
}

fn stringize(argument: &[PpToken]) -> PpToken {
    let mut text = String::from("\"");
    let mut last_was_space = false;
    for token in argument {
        if token.is_whitespace() {
            if !last_was_space {
                text.push(' ');
            }
            last_was_space = true;
            continue;
        }
        last_was_space = false;
        for ch in token.text.chars() {
            if token.kind == PpTokenKind::Literal && (ch == '"' || ch == '\\') {
                text.push('\\');
            }
            text.push(ch);
        }
    }
    text.push('"');
    PpToken::new(PpTokenKind::Literal, text)
}

#[cfg(test)]
mod tests {
    use crate::macros::{Expander, MacroDefinition, MacroTable};
    use cwasm_macros::{assert_err, assert_ok};

    fn function(params: &[&str], body: &str) -> MacroDefinition {
        MacroDefinition::Function {
            params: params.iter().map(|p| p.to_string()).collect(),
            variadic: false,
            body: body.to_string(),
        }
    }

    fn object(body: &str) -> MacroDefinition {
        MacroDefinition::Object {
            body: body.to_string(),
        }
    }

    #[test]
    fn test_function_macro_keeps_existing_parentheses() {
        let mut table = MacroTable::new();
        assert_ok!(table.define("min", function(&["X", "Y"], "((X) < (Y) ? (X) : (Y))")));
        let mut expander = Expander::new(&table);
        let output = assert_ok!(expander.expand_text("min(1 + 2, 5)"));
        assert_eq!(output, "((1 + 2) < (5) ? (1 + 2) : (5))");
    }

    #[test]
    fn test_function_macro_parenthesizes_compound_arguments() {
        let mut table = MacroTable::new();
        assert_ok!(table.define("SQ", function(&["x"], "x * x")));
        let mut expander = Expander::new(&table);
        assert_eq!(assert_ok!(expander.expand_text("SQ(1 + 2)")), "(1 + 2) * (1 + 2)");
        assert_eq!(assert_ok!(expander.expand_text("SQ(3)")), "3 * 3");
    }

    #[test]
    fn test_list_elements_are_not_parenthesized() {
        let mut table = MacroTable::new();
        assert_ok!(table.define("va_arg", function(&["ap", "type"], "__builtin_va_arg(ap, type)")));
        assert_ok!(table.define("pair", function(&["a", "b"], "f(a, b, a - b)")));
        let mut expander = Expander::new(&table);
        assert_eq!(
            assert_ok!(expander.expand_text("va_arg(ap, unsigned int)")),
            "__builtin_va_arg(ap, unsigned int)"
        );
        assert_eq!(
            assert_ok!(expander.expand_text("va_arg(ap, char *)")),
            "__builtin_va_arg(ap, char *)"
        );
        assert_eq!(
            assert_ok!(expander.expand_text("pair(x + 1, y)")),
            "f(x + 1, y, (x + 1) - y)"
        );
    }

    #[test]
    fn test_self_reference_does_not_loop() {
        let mut table = MacroTable::new();
        assert_ok!(table.define("foo", object("foo + 1")));
        assert_ok!(table.define("bar", object("baz")));
        assert_ok!(table.define("baz", object("bar")));
        let mut expander = Expander::new(&table);
        assert_eq!(assert_ok!(expander.expand_text("foo")), "foo + 1");
        assert_eq!(assert_ok!(expander.expand_text("bar")), "bar");
    }

    #[test]
    fn test_function_name_without_parentheses_is_untouched() {
        let mut table = MacroTable::new();
        assert_ok!(table.define("f", function(&["a"], "a")));
        let mut expander = Expander::new(&table);
        assert_eq!(assert_ok!(expander.expand_text("int (*p)() = f;")), "int (*p)() = f;");
    }

    #[test]
    fn test_arity_mismatch_is_error() {
        let mut table = MacroTable::new();
        assert_ok!(table.define("two", function(&["a", "b"], "a b")));
        let mut expander = Expander::new(&table);
        let err = assert_err!(expander.expand_text("two(1)"));
        assert!(err.contains("requires 2 arguments"));
    }

    #[test]
    fn test_token_pasting_is_rejected() {
        let mut table = MacroTable::new();
        let err = assert_err!(table.define("cat", function(&["a", "b"], "a ## b")));
        assert!(err.contains("'##'"));
        assert_err!(table.define("glue", object("x##y")));
        assert!(!table.is_defined("cat"));
        assert_ok!(table.define("quote", object("\"##\"")));
    }

    #[test]
    fn test_redefinition_must_be_identical() {
        let mut table = MacroTable::new();
        assert_ok!(table.define("N", object("1  +  2")));
        assert_ok!(table.define("N", object("1 + 2")));
        assert_err!(table.define("N", object("3")));
    }

    #[test]
    fn test_variadic_and_stringize() {
        let mut table = MacroTable::new();
        let definition = MacroDefinition::Function {
            params: vec!["fmt".to_string()],
            variadic: true,
            body: "printf(fmt, __VA_ARGS__)".to_string(),
        };
        assert_ok!(table.define("log", definition));
        assert_ok!(table.define("str", function(&["x"], "#x")));
        let mut expander = Expander::new(&table);
        assert_eq!(
            assert_ok!(expander.expand_text("log(\"%d %d\", a, b)")),
            "printf(\"%d %d\", a, b)"
        );
        assert_eq!(assert_ok!(expander.expand_text("str(a  + \"b\")")), "\"a + \\\"b\\\"\"");
    }
}
