// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Parser for hwasm source programs.
//!
//! Operates over the tokenized stream with a single read cursor under the
//! three-section grammar (`define`, `macro`, `code`). Definitions,
//! instructions, and labels are pushed into the interpreter as they are
//! parsed; macro invocations are expanded by lexical token substitution and
//! the splice point is reparsed in place.
//!
//! ## Architecture
//!
//! - `stream`: owned token cursor with lookahead and in-place splicing
//! - `error`: `ParseError` and its categories
//! - `parser`: section rules, label bookkeeping, macro table, and the
//!   per-mnemonic instruction grammars

mod error;
mod parser;
mod stream;

pub use error::{ParseError, ParseErrorKind};
pub use parser::parse;
pub use stream::parse_literal;
