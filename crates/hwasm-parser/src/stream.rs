//! Token stream wrapper for the hand-written parser.
//!
//! Owns the token vector (macro expansion splices tokens in place) and
//! provides lookahead, consumption, and literal parsing for the parser.

use hwasm_lexer::{Token, TokenKind};
use hwasm_runtime::Operand;

use crate::error::ParseError;

/// Parse a numeric literal: decimal, `0x` hex, or `0b` binary.
pub fn parse_literal(text: &str) -> Option<Operand> {
    if let Some(hex) = text.strip_prefix("0x") {
        Operand::from_str_radix(hex, 16).ok()
    } else if let Some(bin) = text.strip_prefix("0b") {
        Operand::from_str_radix(bin, 2).ok()
    } else {
        text.parse().ok()
    }
}

/// Token stream with lookahead, position tracking, and in-place splicing.
///
/// The tokenizer guarantees a trailing [`TokenKind::Eof`] token; the cursor
/// never moves past it.
pub struct TokenStream {
    tokens: Vec<Token>,
    pos: usize,
}

impl TokenStream {
    /// Create a stream over a tokenized document. The end marker is
    /// appended if the input lacks one, so the cursor always has a token.
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().map(Token::kind) != Some(TokenKind::Eof) {
            let line = tokens.last().map(Token::line).unwrap_or(0);
            tokens.push(Token::term(line, TokenKind::Eof));
        }
        TokenStream { tokens, pos: 0 }
    }

    /// Peek at the current token without consuming it.
    pub fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    /// Kind of the current token.
    pub fn peek_kind(&self) -> TokenKind {
        self.peek().kind()
    }

    /// Retained-line index of the current token.
    pub fn line(&self) -> usize {
        self.peek().line()
    }

    /// Current cursor position.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Consume and return the current token. At the end marker the cursor
    /// stays put and the marker is returned again.
    pub fn next(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind() != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    /// Check the current token's kind.
    pub fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    /// Advance over the current token if it has the given kind.
    pub fn match_kind(&mut self, kind: TokenKind) -> bool {
        let matched = self.check(kind);
        if matched {
            self.pos += 1;
        }
        matched
    }

    /// Advance over the current token if it matches; no error otherwise.
    pub fn skip(&mut self, kind: TokenKind) {
        let _ = self.match_kind(kind);
    }

    /// Expect a specific token kind and advance over it.
    pub fn expect(&mut self, kind: TokenKind) -> Result<(), ParseError> {
        if self.match_kind(kind) {
            Ok(())
        } else {
            Err(ParseError::expected(kind, self.peek()))
        }
    }

    /// Three-token lookahead on kinds, for disambiguating operand shapes.
    pub fn pattern(&self, first: TokenKind, second: TokenKind, third: TokenKind) -> bool {
        let kind_at = |offset: usize| {
            self.tokens
                .get(self.pos + offset)
                .map(Token::kind)
                .unwrap_or(TokenKind::Eof)
        };
        kind_at(0) == first && kind_at(1) == second && kind_at(2) == third
    }

    /// Consume an identifier/literal token and return it whole.
    pub fn next_id(&mut self) -> Result<Token, ParseError> {
        if self.peek().text().is_none() {
            return Err(ParseError::expected("identifier", self.peek()));
        }
        Ok(self.next())
    }

    /// Consume an identifier/literal token and return its text.
    pub fn next_word(&mut self) -> Result<String, ParseError> {
        Ok(self
            .next_id()?
            .text()
            .map(str::to_string)
            .unwrap_or_default())
    }

    /// Consume a number token and parse it as an operand.
    pub fn next_number(&mut self) -> Result<Operand, ParseError> {
        if !self.check(TokenKind::Number) {
            return Err(ParseError::expected("number", self.peek()));
        }
        let token = self.next();
        let text = token.text().unwrap_or_default();
        parse_literal(text).ok_or_else(|| ParseError::invalid_number(text, token.line()))
    }

    /// Replace the tokens from `start` up to the cursor with `replacement`
    /// and move the cursor back to `start`. Macro expansion only.
    pub fn splice(&mut self, start: usize, replacement: Vec<Token>) {
        self.tokens.splice(start..self.pos, replacement);
        self.pos = start;
    }
}
