// File: src/errors.rs
//
// Error handling and reporting for the Monkey programming language.
// Provides structured error types with source location information
// and pretty-printed error messages for the lexer/parser front end,
// plus lightweight message-carrying errors for the compiler and VM.

use colored::Colorize;
use std::fmt;

/// Source location information for tracking where code appears in a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    pub fn unknown() -> Self {
        Self { line: 0, column: 0 }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A parser error, carrying the location of the offending token.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub location: SourceLocation,
}

impl ParseError {
    pub fn new(message: impl Into<String>, location: SourceLocation) -> Self {
        Self { message: message.into(), location }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.location)
    }
}

impl std::error::Error for ParseError {}

/// A compile-time error: unknown operator, undefined variable. Compilation
/// aborts on the first one; no partial bytecode is released.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileError(pub String);

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for CompileError {}

/// A runtime error raised by the VM: type mismatches, arity mismatches,
/// calling a non-function, bad hash keys, or stack overflow. Execution
/// halts at the first one.
#[derive(Debug, Clone, PartialEq)]
pub struct VmError(pub String);

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for VmError {}

/// Prints a list of parser errors the way the REPL/CLI displays them.
pub fn print_parse_errors(errors: &[ParseError]) {
    eprintln!("{}", "parser errors:".red().bold());
    for err in errors {
        eprintln!("\t{}", err.to_string().red());
    }
}

/// Formats a `Woops!`-prefixed failure message for the REPL/CLI.
pub fn woops(stage: &str, message: impl fmt::Display) -> String {
    format!("{} {}:\n {}", "Woops!".red().bold(), stage, message)
}
