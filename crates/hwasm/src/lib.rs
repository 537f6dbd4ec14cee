//! hwasm: a small assembly language for reactive hardware models.
//!
//! Named registers and arrays whose value changes trigger subscriber
//! callbacks, driven by a stack-machine program with labels, calls,
//! conditional jumps, and macros.
//!
//! The pipeline runs tokens → parser → interpreter: the tokenizer splits
//! source lines into classified tokens, the parser expands macros and pushes
//! typed instruction descriptors into the interpreter, and invocation binds
//! every symbolic name to a live register, array, or label offset before the
//! first instruction executes.
//!
//! # Example
//!
//! ```
//! use hwasm::{run_with, Interpreter, RuntimeResult};
//!
//! let mut hardware = |state: &mut Interpreter| -> RuntimeResult<()> {
//!     state.define_reg("out", None)?;
//!     Ok(())
//! };
//!
//! let program = run_with(&mut hardware, || ".code\nmov out, 7".to_string()).unwrap();
//! assert_eq!(program.lookup_reg("out").unwrap().get(), Some(7));
//! ```

use thiserror::Error as ThisError;

pub use hwasm_lexer::{is_mnemonic, tokenize, Token, TokenKind};
pub use hwasm_parser::{parse, parse_literal, ParseError, ParseErrorKind};
pub use hwasm_runtime::{
    value_of, Arr, ArrItem, Cell, Direction, ExecutionContext, Hardware, Interpreter, Lit, Op,
    Operand, OperandStack, Reg, Subscriber,
};
pub use hwasm_runtime::{Error as RuntimeError, Result as RuntimeResult};

/// Result type for whole-program invocation.
pub type Result<T> = std::result::Result<T, Error>;

/// Anything that can go wrong between source text and completed execution.
#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Run a program against a hardware instance.
///
/// Tokenizes and parses the supplied source into a fresh interpreter, then
/// invokes it: the host's [`Hardware::wire`] runs first, every name binds,
/// and the main context executes synchronously to completion or an explicit
/// termination instruction.
///
/// Returns the finished interpreter so the host can inspect registers and
/// arrays after the run. Fire-and-forget frames spawned by the program may
/// still be executing when this returns.
pub fn run_with<H>(hardware: &mut H, source: impl FnOnce() -> String) -> Result<Interpreter>
where
    H: Hardware + ?Sized,
{
    let mut state = Interpreter::new();
    parse(tokenize(&source()), &mut state)?;
    state.invoke(hardware)?;
    Ok(state)
}
