// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Lexical analysis for hwasm source programs.
//!
//! The language is line-oriented: a line whose first character is `;` is a
//! comment, a line that is blank after trimming is skipped, and every other
//! line yields tokens in source order. Token positions are the index of
//! their line within the *retained* line sequence; the parser's label
//! arithmetic depends on that numbering, so it is part of the contract here.
//!
//! # Design
//!
//! - `Token`: either a bare terminal (punctuation, end marker) or an
//!   identifier/literal carrying its text
//! - Classification order within a line: instruction mnemonic, then numeric
//!   literal, then punctuation, then bare word
//! - Comments and blank lines are stripped before lexing (not tokens)
//!
//! # Examples
//!
//! ```
//! use hwasm_lexer::{tokenize, TokenKind};
//! let tokens = tokenize("mov rf, 0x1A");
//! assert_eq!(tokens[0].kind(), TokenKind::Instruction);
//! assert_eq!(tokens.last().unwrap().kind(), TokenKind::Eof);
//! ```

use logos::Logos;
use std::fmt;
use std::rc::Rc;

/// The fixed instruction set, sorted for binary search.
///
/// `bpt`, `swp` and `rvt` are reserved: they classify as instructions here
/// but the parser rejects them as unimplemented.
const MNEMONICS: &[&str] = &[
    "arr", "bpt", "cal", "clr", "clu", "dup", "ext", "jeq", "jmp", "jnq", "jxt", "mov", "pln",
    "pop", "psh", "reg", "req", "ret", "rst", "run", "rvr", "rvt", "seu", "swp", "upd", "usr",
];

/// Check whether a word is one of the fixed instruction mnemonics.
pub fn is_mnemonic(word: &str) -> bool {
    MNEMONICS.binary_search(&word).is_ok()
}

/// Lexical category of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// One of the fixed instruction mnemonics
    Instruction,
    /// A bare identifier
    Word,
    /// A numeric literal (decimal, `0x` hex, or `0b` binary)
    Number,
    /// `,`
    Comma,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `@`
    At,
    /// `.`
    Dot,
    /// `#`
    Sharp,
    /// End-of-input marker, always the final token
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenKind::Instruction => "instruction",
            TokenKind::Word => "word",
            TokenKind::Number => "number",
            TokenKind::Comma => "','",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::At => "'@'",
            TokenKind::Dot => "'.'",
            TokenKind::Sharp => "'#'",
            TokenKind::Eof => "end of file",
        };
        write!(f, "{}", s)
    }
}

/// A single lexical token.
///
/// Terminals carry only their kind; identifiers and literals also carry
/// their text. `line` is the index of the originating line in the retained
/// (comment- and blank-filtered) line sequence. Tokens are immutable once
/// produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Bare terminal: punctuation or the end marker.
    Term {
        /// Retained-line index
        line: usize,
        /// Lexical category
        kind: TokenKind,
    },
    /// Identifier or literal with its source text.
    Id {
        /// Retained-line index
        line: usize,
        /// Source text of the identifier/literal
        text: Rc<str>,
        /// Lexical category
        kind: TokenKind,
    },
}

impl Token {
    /// Construct a bare terminal.
    pub fn term(line: usize, kind: TokenKind) -> Self {
        Token::Term { line, kind }
    }

    /// Construct an identifier/literal token.
    pub fn id(line: usize, text: &str, kind: TokenKind) -> Self {
        Token::Id {
            line,
            text: Rc::from(text),
            kind,
        }
    }

    /// Lexical category of this token.
    pub fn kind(&self) -> TokenKind {
        match self {
            Token::Term { kind, .. } | Token::Id { kind, .. } => *kind,
        }
    }

    /// Retained-line index this token came from.
    pub fn line(&self) -> usize {
        match self {
            Token::Term { line, .. } | Token::Id { line, .. } => *line,
        }
    }

    /// Text of an identifier/literal, `None` for terminals.
    pub fn text(&self) -> Option<&str> {
        match self {
            Token::Id { text, .. } => Some(text),
            Token::Term { .. } => None,
        }
    }

    /// True for bare-identifier tokens.
    pub fn is_word(&self) -> bool {
        self.kind() == TokenKind::Word
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Id { text, .. } => write!(f, "'{}'", text),
            Token::Term { kind, .. } => write!(f, "{}", kind),
        }
    }
}

/// Raw per-line token shapes.
///
/// Punctuation glued to an identifier splits into its own token; everything
/// that is neither punctuation nor a number is a word, classified afterwards
/// against the mnemonic table.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r]+")]
enum RawToken {
    #[token(",")]
    Comma,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("@")]
    At,
    #[token(".")]
    Dot,
    #[token("#")]
    Sharp,
    #[regex(r"0x[0-9a-fA-F]+|0b[01]+|[0-9]+", priority = 3)]
    Number,
    #[regex(r"[^ \t\r,\[\]@.#]+", priority = 2)]
    Word,
}

/// Tokenize a source document.
///
/// Produces an ordered, finite token sequence terminated by exactly one
/// [`TokenKind::Eof`] token. Never fails: anything unrecognized is a word.
/// The builder holds no state across calls.
pub fn tokenize(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut line_no = 0;

    for line in source.lines() {
        if line.starts_with(';') || line.trim().is_empty() {
            continue;
        }

        let mut lex = RawToken::lexer(line);
        while let Some(raw) = lex.next() {
            let token = match raw {
                Ok(RawToken::Comma) => Token::term(line_no, TokenKind::Comma),
                Ok(RawToken::LBracket) => Token::term(line_no, TokenKind::LBracket),
                Ok(RawToken::RBracket) => Token::term(line_no, TokenKind::RBracket),
                Ok(RawToken::At) => Token::term(line_no, TokenKind::At),
                Ok(RawToken::Dot) => Token::term(line_no, TokenKind::Dot),
                Ok(RawToken::Sharp) => Token::term(line_no, TokenKind::Sharp),
                Ok(RawToken::Number) => Token::id(line_no, lex.slice(), TokenKind::Number),
                Ok(RawToken::Word) => classify_word(line_no, lex.slice()),
                // Unreachable with the patterns above; tokenizing must not
                // fail, so stray text still classifies as a word.
                Err(()) => Token::id(line_no, lex.slice(), TokenKind::Word),
            };
            tokens.push(token);
        }

        line_no += 1;
    }

    tokens.push(Token::term(line_no, TokenKind::Eof));
    tokens
}

fn classify_word(line: usize, word: &str) -> Token {
    if is_mnemonic(word) {
        Token::id(line, word, TokenKind::Instruction)
    } else {
        Token::id(line, word, TokenKind::Word)
    }
}
