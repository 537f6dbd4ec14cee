// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! hwasm runtime
//!
//! The reactive register/array model and the state engine that executes
//! bound programs: per-context operand stacks and instruction pointers,
//! explicit jump/call/return control flow, and fire-and-forget frames on a
//! shared worker pool.
//!
//! The parser feeds an [`Interpreter`] with definitions and instruction
//! descriptors; [`Interpreter::invoke`] then runs the host's wiring, binds
//! every symbolic name to a live reference, and drives the main execution
//! context to completion.

pub mod arr;
pub mod cell;
pub mod context;
pub mod error;
pub mod hardware;
pub mod interp;
mod machine;
pub mod op;
pub mod reg;
pub mod stack;

pub use arr::{Arr, Direction};
pub use cell::{value_of, Cell, Lit};
pub use context::ExecutionContext;
pub use error::{Error, Result};
pub use hardware::Hardware;
pub use interp::Interpreter;
pub use machine::ExternalFn;
pub use op::{ArrItem, Op};
pub use reg::{Reg, Subscriber};
pub use stack::{Operand, OperandStack};
