// File: src/errors.rs
//
// Error handling and reporting for the Slate compiler. Provides the closed
// set of compile-time error kinds, source spans, and pretty-printed error
// messages. The VM has no user-visible errors; anything that goes wrong at
// runtime is a compiler bug and panics.

use colored::Colorize;
use std::fmt;

/// A source region, as byte offsets plus 1-based line / column positions.
/// `stop` is exclusive so `text[start..stop]` is the offending excerpt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub start_line: usize,
    pub start_column: usize,
    pub stop: usize,
    pub stop_line: usize,
    pub stop_column: usize,
}

impl Span {
    pub fn new(
        start: usize,
        start_line: usize,
        start_column: usize,
        stop: usize,
        stop_line: usize,
        stop_column: usize,
    ) -> Self {
        Self { start, start_line, start_column, stop, stop_line, stop_column }
    }

    /// Smallest span covering both inputs.
    pub fn join(self, other: Span) -> Span {
        let (start, start_line, start_column) = if self.start <= other.start {
            (self.start, self.start_line, self.start_column)
        } else {
            (other.start, other.start_line, other.start_column)
        };

        let (stop, stop_line, stop_column) = if self.stop >= other.stop {
            (self.stop, self.stop_line, self.stop_column)
        } else {
            (other.stop, other.stop_line, other.stop_column)
        };

        Span::new(start, start_line, start_column, stop, stop_line, stop_column)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.start_line, self.start_column)
    }
}

/// Compile-time errors visible to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorKind {
    ParseError,
    TypeMismatch,
    NonVoidFunctionMissingReturn,
    FunctionCalledWithWrongNumberOfArgs,
    IdentifierNotDeclared,
    IdentifierAlreadyDeclared,
    MathOperationOnString,
}

impl fmt::Display for CompileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            CompileErrorKind::ParseError => "PARSE_ERROR",
            CompileErrorKind::TypeMismatch => "TYPE_MISMATCH",
            CompileErrorKind::NonVoidFunctionMissingReturn => "NON_VOID_FUNCTION_MISSING_RETURN",
            CompileErrorKind::FunctionCalledWithWrongNumberOfArgs => {
                "FUNCTION_CALLED_WITH_WRONG_NUMBER_OF_ARGS"
            }
            CompileErrorKind::IdentifierNotDeclared => "IDENTIFIER_NOT_DECLARED",
            CompileErrorKind::IdentifierAlreadyDeclared => "IDENTIFIER_ALREADY_DECLARED",
            CompileErrorKind::MathOperationOnString => "MATH_OPERATION_ON_STRING",
        };
        write!(f, "{}", name)
    }
}

/// A structured compile error with the offending source span. The excerpt
/// is filled in by the compilation driver, which owns the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub span: Span,
    pub message: String,
    pub excerpt: Option<String>,
}

impl CompileError {
    pub fn new(kind: CompileErrorKind, span: Span, message: impl Into<String>) -> Self {
        Self { kind, span, message: message.into(), excerpt: None }
    }

    pub fn parse(span: Span, message: impl Into<String>) -> Self {
        Self::new(CompileErrorKind::ParseError, span, message)
    }

    pub fn with_excerpt(mut self, source: &str) -> Self {
        let start = self.span.start.min(source.len());
        let stop = self.span.stop.clamp(start, source.len());
        if start < stop {
            self.excerpt = Some(source[start..stop].to_string());
        }
        self
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = format!("{}", self.kind);
        writeln!(f, "{}: {}", kind.red().bold(), self.message.bold())?;

        let location = format!(
            "  --> {}:{} to {}:{}",
            self.span.start_line, self.span.start_column, self.span.stop_line, self.span.stop_column
        );
        writeln!(f, "{}", location.bright_blue())?;

        if let Some(ref excerpt) = self.excerpt {
            writeln!(f, "   {}", "|".bright_blue())?;
            for line in excerpt.lines() {
                writeln!(f, "   {} {}", "|".bright_blue(), line)?;
            }
            writeln!(f, "   {}", "|".bright_blue())?;
        }

        Ok(())
    }
}

impl std::error::Error for CompileError {}
