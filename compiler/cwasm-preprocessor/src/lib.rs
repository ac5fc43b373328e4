//! The C preprocessor.
//!
//! Processing is line based. Text lines of taken regions are collected into chunks that are macro
//! expanded as a whole, so function-like macro invocations may span several lines. Directive lines
//! and lines of regions that are not taken are replaced by empty lines, which keeps line numbers
//! stable and makes processing the output a second time a no-op.

use crate::condition::evaluate_condition;
use crate::directive::{parse_directive, Directive};
use crate::macros::{Expander, MacroDefinition, MacroTable};
use crate::source::{splice_lines, strip_comments};
use std::collections::{BTreeMap, BTreeSet};

mod condition;
mod directive;
mod error;
mod lexeme;
mod macros;
mod source;

pub use error::*;

/// Includes nested deeper than this are considered runaway recursion.
pub const MAX_INCLUDE_DEPTH: usize = 64;

/// Source of files for `#include`.
pub trait IncludeResolver {
    fn resolve(&self, name: &str) -> Option<&str>;
}

impl IncludeResolver for BTreeMap<String, String> {
    fn resolve(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

impl<T: IncludeResolver + ?Sized> IncludeResolver for &T {
    fn resolve(&self, name: &str) -> Option<&str> {
        (**self).resolve(name)
    }
}

/// Resolve from the first resolver, falling back to the second.
impl<A: IncludeResolver, B: IncludeResolver> IncludeResolver for (A, B) {
    fn resolve(&self, name: &str) -> Option<&str> {
        self.0.resolve(name).or_else(|| self.1.resolve(name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegionState {
    /// The current branch is being emitted.
    Active,
    /// No branch has been taken yet.
    Pending,
    /// A branch was already taken, or the enclosing region is not taken.
    Finished,
}

#[derive(Debug)]
struct Region {
    state: RegionState,
    seen_else: bool,
    line: usize,
}

pub struct Preprocessor<'r> {
    resolver: &'r dyn IncludeResolver,
    macros: MacroTable,
    once: BTreeSet<String>,
    depth: usize,
}

impl<'r> Preprocessor<'r> {
    pub fn new(resolver: &'r dyn IncludeResolver) -> Self {
        Self {
            resolver,
            macros: MacroTable::new(),
            once: BTreeSet::new(),
            depth: 0,
        }
    }

    /// Predefine an object-like macro, as `-D NAME=VALUE` does.
    pub fn define(&mut self, name: &str, value: &str) -> PreprocessResult<()> {
        let definition = MacroDefinition::Object {
            body: value.to_string(),
        };
        self.macros
            .define(name, definition)
            .map_err(|message| MacroError::new("<command line>", 0, message).into())
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.macros.is_defined(name)
    }

    /// Preprocess the contents of `file`.
    pub fn process(&mut self, file: &str, source: &str) -> PreprocessResult<String> {
        tracing::debug!(file, depth = self.depth, "preprocessing file");
        let text = strip_comments(&splice_lines(source));
        let mut chunks: Vec<String> = Vec::new();
        let mut pending: Vec<&str> = Vec::new();
        let mut regions: Vec<Region> = Vec::new();

        for (index, line) in text.split('\n').enumerate() {
            let line_number = index + 1;
            let taken = regions.iter().all(|r| r.state == RegionState::Active);
            let directive = match parse_directive(line) {
                Ok(directive) => directive,
                // Malformed directives only matter when they would be interpreted.
                Err(message) if taken => return Err(MacroError::new(file, line_number, message).into()),
                Err(_) => {
                    chunks.push(String::new());
                    continue;
                }
            };
            let Some(directive) = directive else {
                if taken {
                    pending.push(line);
                } else {
                    chunks.push(String::new());
                }
                continue;
            };
            if !pending.is_empty() {
                chunks.push(self.expand(file, line_number - pending.len(), &pending)?);
                pending.clear();
            }
            if directive.is_conditional() {
                self.conditional(file, line_number, directive, &mut regions)?;
                chunks.push(String::new());
            } else if taken {
                chunks.push(self.directive(file, line_number, directive)?);
            } else {
                chunks.push(String::new());
            }
        }
        if !pending.is_empty() {
            let first_line = text.split('\n').count() - pending.len() + 1;
            chunks.push(self.expand(file, first_line, &pending)?);
        }
        if let Some(region) = regions.last() {
            let message = "unterminated conditional directive";
            return Err(MacroError::new(file, region.line, message).into());
        }
        Ok(chunks.join("\n"))
    }

    fn expand(&self, file: &str, line: usize, lines: &[&str]) -> PreprocessResult<String> {
        Expander::new(&self.macros)
            .expand_text(&lines.join("\n"))
            .map_err(|message| MacroError::new(file, line, message).into())
    }

    fn conditional(
        &self,
        file: &str,
        line: usize,
        directive: Directive,
        regions: &mut Vec<Region>,
    ) -> PreprocessResult<()> {
        let error = |message: &str| -> PreprocessError { MacroError::new(file, line, message).into() };
        let taken = regions.iter().all(|r| r.state == RegionState::Active);
        let evaluate = |condition: &str| {
            evaluate_condition(condition, &self.macros)
                .map_err(|message| MacroError::new(file, line, message))
        };
        let open = |condition: bool| Region {
            state: match (taken, condition) {
                (false, _) => RegionState::Finished,
                (true, true) => RegionState::Active,
                (true, false) => RegionState::Pending,
            },
            seen_else: false,
            line,
        };
        match directive {
            Directive::If(condition) => {
                let value = taken && evaluate(condition)?;
                regions.push(open(value));
            }
            Directive::Ifdef(name) => regions.push(open(self.macros.is_defined(name))),
            Directive::Ifndef(name) => regions.push(open(!self.macros.is_defined(name))),
            Directive::Elif(condition) => {
                let region = regions.last_mut().ok_or_else(|| error("#elif without #if"))?;
                if region.seen_else {
                    return Err(error("#elif after #else"));
                }
                region.state = match region.state {
                    RegionState::Active | RegionState::Finished => RegionState::Finished,
                    RegionState::Pending if evaluate(condition)? => RegionState::Active,
                    RegionState::Pending => RegionState::Pending,
                };
            }
            Directive::Else => {
                let region = regions.last_mut().ok_or_else(|| error("#else without #if"))?;
                if region.seen_else {
                    return Err(error("#else after #else"));
                }
                region.seen_else = true;
                region.state = match region.state {
                    RegionState::Pending => RegionState::Active,
                    _ => RegionState::Finished,
                };
            }
            Directive::Endif => {
                regions.pop().ok_or_else(|| error("#endif without #if"))?;
            }
            _ => cwasm_diagnostics::ice!("not a conditional directive"),
        }
        Ok(())
    }

    /// Interpret a non-conditional directive, returning the text that replaces it.
    fn directive(&mut self, file: &str, line: usize, directive: Directive) -> PreprocessResult<String> {
        let error = |message: String| -> PreprocessError { MacroError::new(file, line, message).into() };
        match directive {
            Directive::Define { name, params, body } => {
                let definition = match params {
                    None => MacroDefinition::Object {
                        body: body.to_string(),
                    },
                    Some((params, variadic)) => MacroDefinition::Function {
                        params: params.into_iter().map(str::to_string).collect(),
                        variadic,
                        body: body.to_string(),
                    },
                };
                tracing::trace!(file, line, name, "define macro");
                self.macros.define(name, definition).map_err(error)?;
            }
            Directive::Undef(name) => self.macros.undefine(name),
            Directive::Include { name, system } => {
                tracing::trace!(file, line, name, system, "include");
                return self.include(file, line, name);
            }
            Directive::Error(message) => return Err(error(format!("#error {message}"))),
            Directive::Pragma(pragma) if pragma == "once" => {
                self.once.insert(file.to_string());
            }
            Directive::Pragma(pragma) => tracing::trace!(file, line, pragma, "ignored pragma"),
            Directive::Empty => {}
            _ => cwasm_diagnostics::ice!("conditional directive reached the directive interpreter"),
        }
        Ok(String::new())
    }

    fn include(&mut self, file: &str, line: usize, name: &str) -> PreprocessResult<String> {
        let error = |reason: &str| -> PreprocessError {
            IncludeError {
                file: file.to_string(),
                line,
                name: name.to_string(),
                reason: reason.to_string(),
            }
            .into()
        };
        if self.once.contains(name) {
            return Ok(String::new());
        }
        if self.depth >= MAX_INCLUDE_DEPTH {
            return Err(error("includes nested too deeply"));
        }
        let resolver = self.resolver;
        let source = resolver.resolve(name).ok_or_else(|| error("file not found"))?;
        self.depth += 1;
        let result = self.process(name, source);
        self.depth -= 1;
        result
    }
}

/// Preprocess a single self-contained source text.
pub fn process(source: &str) -> PreprocessResult<String> {
    let files = BTreeMap::new();
    Preprocessor::new(&files).process("<input>", source)
}
