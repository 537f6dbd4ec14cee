//! Parse error types.

use std::fmt;

use hwasm_lexer::{Token, TokenKind};

/// Parse error with source location and context.
#[derive(Debug)]
pub struct ParseError {
    /// Kind of parse error
    pub kind: ParseErrorKind,
    /// Retained-line index where the error occurred
    pub line: usize,
    /// Human-readable error message
    pub message: String,
}

/// Category of parse error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// A specific token was expected and something else was found.
    UnexpectedToken,

    /// The token stream ended while a construct was incomplete.
    UnexpectedEof,

    /// A section declaration violates the `define`/`macro`/`code` ordering
    /// rules, or a construct is illegal in the current section.
    InvalidSection,

    /// A macro declaration or invocation is malformed (missing body, wrong
    /// argument count).
    InvalidMacro,

    /// A numeric literal failed to parse as an unsigned 32-bit operand.
    InvalidNumber,

    /// A mnemonic with no implemented instruction form (including the
    /// reserved `bpt`, `swp`, `rvt`) or an unknown bare word in instruction
    /// position.
    UnknownInstruction,

    /// The interpreter sink rejected a definition pushed during parsing
    /// (duplicate label, lifecycle violation).
    State,
}

impl ParseError {
    /// Create an "expected token" error.
    pub fn expected(what: impl fmt::Display, found: &Token) -> Self {
        let kind = if found.kind() == TokenKind::Eof {
            ParseErrorKind::UnexpectedEof
        } else {
            ParseErrorKind::UnexpectedToken
        };
        Self {
            kind,
            line: found.line(),
            message: format!("expected {}, found {}", what, found),
        }
    }

    /// Create an "unexpected token" error.
    pub fn unexpected(found: &Token) -> Self {
        Self {
            kind: ParseErrorKind::UnexpectedToken,
            line: found.line(),
            message: format!("unexpected token: {}", found),
        }
    }

    /// Create an "unexpected end of input" error.
    pub fn eof(context: &str, line: usize) -> Self {
        Self {
            kind: ParseErrorKind::UnexpectedEof,
            line,
            message: format!("unexpected end of input {}", context),
        }
    }

    /// Create a section-rule violation error.
    pub fn invalid_section(message: impl Into<String>, line: usize) -> Self {
        Self {
            kind: ParseErrorKind::InvalidSection,
            line,
            message: message.into(),
        }
    }

    /// Create a malformed-macro error.
    pub fn invalid_macro(message: impl Into<String>, line: usize) -> Self {
        Self {
            kind: ParseErrorKind::InvalidMacro,
            line,
            message: message.into(),
        }
    }

    /// Create an invalid-literal error.
    pub fn invalid_number(text: &str, line: usize) -> Self {
        Self {
            kind: ParseErrorKind::InvalidNumber,
            line,
            message: format!("'{}' is not a valid 32-bit operand", text),
        }
    }

    /// Create an unimplemented-instruction error.
    pub fn unknown_instruction(name: &str, line: usize) -> Self {
        Self {
            kind: ParseErrorKind::UnknownInstruction,
            line,
            message: format!("instruction '{}' is not implemented", name),
        }
    }

    /// Wrap an interpreter error raised while pushing parsed state.
    pub fn state(err: hwasm_runtime::Error, line: usize) -> Self {
        Self {
            kind: ParseErrorKind::State,
            line,
            message: err.to_string(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at line {}", self.message, self.line)
    }
}

impl std::error::Error for ParseError {}
