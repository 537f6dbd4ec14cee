//! Bound program and drive loop
//!
//! The bind pass turns parsed descriptors into `BoundOp`s holding live
//! references; a `Machine` owns the resolved sequence and drives execution.
//! Control flow is an explicit per-instruction outcome (`Flow`) interpreted
//! by the loop: continue, jump to an offset, or unwind the current call.

use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, trace};

use crate::arr::Arr;
use crate::cell::{value_of, Cell};
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::reg::Reg;
use crate::stack::Operand;

/// Host-registered external call frame: a single-instruction frame executed
/// in place of a call, with full access to the calling frame's context.
pub type ExternalFn = Arc<dyn Fn(&mut ExecutionContext) -> Result<()> + Send + Sync>;

/// Resolved call destination.
///
/// Label offsets are a single integer space at parse time; the bind pass
/// splits them into an explicit tag: non-negative offsets become
/// `Internal`, negative ones index the external-call table.
#[derive(Clone)]
pub(crate) enum CallTarget {
    /// Index into the instruction sequence
    Internal(usize),
    /// Out-of-band frame registered by the host
    External(ExternalFn),
}

/// Where a spawned frame's initial stack value comes from.
#[derive(Clone)]
pub(crate) enum SpawnSeed {
    /// Snapshot of the spawning context's top-of-stack, if any
    CallerTop,
    /// A literal from source
    Value(Operand),
    /// A cell, read inside the spawned frame
    Cell(Arc<dyn Cell>),
}

/// What to push onto a fresh frame's stack before the call.
enum FramePrime {
    Nothing,
    Push(Operand),
    FromCell(Arc<dyn Cell>),
}

/// Per-instruction control-flow outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Jump(usize),
    Return,
}

/// Fully bound instruction, parallel to one parsed descriptor.
pub(crate) enum BoundOp {
    /// Definition-flavored forms act at bind time and execute as no-ops
    Nop,

    MovPop { reg: Arc<Reg> },
    MovCell { reg: Arc<Reg>, cell: Arc<dyn Cell> },
    MovValue { reg: Arc<Reg>, value: Operand },

    PushValue { value: Operand },
    PushCell { cell: Arc<dyn Cell> },
    Drop,
    DropCell { cell: Arc<dyn Cell> },
    Dup,
    DupCell { cell: Arc<dyn Cell> },

    Update { reg: Arc<Reg> },
    Clear { reg: Arc<Reg> },
    Reset { reg: Arc<Reg> },
    EnableUpdates,
    DisableUpdates,

    Jump { target: usize },
    JumpEqValue { value: Operand, target: usize },
    JumpEqCell { cell: Arc<dyn Cell>, target: usize },
    JumpNeValue { value: Operand, target: usize },
    JumpNeCell { cell: Arc<dyn Cell>, target: usize },
    IterJump { arr: Arc<Arr>, target: usize },
    Reverse { arr: Arc<Arr> },

    Call { target: CallTarget },
    Return,
    ReturnCell { cell: Arc<dyn Cell> },

    Spawn { target: CallTarget, seed: SpawnSeed },

    PrintPop,
    PrintValue { value: Operand },
    PrintCell { cell: Arc<dyn Cell> },

    ExitPop,
    ExitCell { cell: Arc<dyn Cell> },
}

/// The bound program: resolved instruction sequence plus the shared
/// updates gate. Immutable once built; shared by every execution context.
pub(crate) struct Machine {
    ops: Vec<BoundOp>,
    updates_enabled: Arc<AtomicBool>,
}

impl Machine {
    pub(crate) fn new(ops: Vec<BoundOp>, updates_enabled: Arc<AtomicBool>) -> Self {
        Machine {
            ops,
            updates_enabled,
        }
    }

    /// Drive `ctx` from its current pointer to completion or `Return`.
    pub(crate) fn run(self: &Arc<Self>, ctx: &mut ExecutionContext) -> Result<()> {
        while let Some(op) = self.ops.get(ctx.pointer) {
            match op.execute(self, ctx)? {
                Flow::Continue => ctx.pointer += 1,
                Flow::Jump(target) => {
                    trace!(from = ctx.pointer, to = target, "jump");
                    ctx.pointer = target;
                }
                Flow::Return => break,
            }
        }
        Ok(())
    }

    /// Perform a call against `ctx`.
    ///
    /// Internal calls save the pointer, run the loop from the callee offset
    /// until it unwinds, then restore the pointer: synchronous, nested,
    /// sharing the instruction sequence. External calls execute the
    /// registered frame in place with no pointer movement.
    pub(crate) fn call(self: &Arc<Self>, target: &CallTarget, ctx: &mut ExecutionContext) -> Result<()> {
        match target {
            CallTarget::Internal(offset) => {
                let return_to = ctx.pointer;
                ctx.pointer = *offset;
                self.run(ctx)?;
                ctx.pointer = return_to;
                Ok(())
            }
            CallTarget::External(frame) => frame(ctx),
        }
    }

    /// Spawn a fire-and-forget frame on the shared worker pool.
    ///
    /// The frame gets a fresh context, optionally seeded, and its completion
    /// is not awaited; failures are logged because nothing can receive them.
    fn spawn(self: &Arc<Self>, prime: FramePrime, target: CallTarget) {
        debug!("spawning fire-and-forget frame");
        let machine = Arc::clone(self);
        rayon::spawn(move || {
            let mut ctx = ExecutionContext::new();
            match prime {
                FramePrime::Nothing => {}
                FramePrime::Push(value) => ctx.stack.push(value),
                FramePrime::FromCell(cell) => cell.apply(&mut |value| ctx.stack.push(value)),
            }
            if let Err(err) = machine.call(&target, &mut ctx) {
                error!(%err, "fire-and-forget frame failed");
            }
        });
    }
}

impl BoundOp {
    fn execute(&self, machine: &Arc<Machine>, ctx: &mut ExecutionContext) -> Result<Flow> {
        match self {
            BoundOp::Nop => Ok(Flow::Continue),

            BoundOp::MovPop { reg } => {
                let value = ctx.stack.pop()?;
                reg.set(value);
                Ok(Flow::Continue)
            }
            BoundOp::MovCell { reg, cell } => {
                if let Some(value) = value_of(cell.as_ref()) {
                    reg.set(value);
                }
                Ok(Flow::Continue)
            }
            BoundOp::MovValue { reg, value } => {
                reg.set(*value);
                Ok(Flow::Continue)
            }

            BoundOp::PushValue { value } => {
                ctx.stack.push(*value);
                Ok(Flow::Continue)
            }
            BoundOp::PushCell { cell } => {
                if let Some(value) = value_of(cell.as_ref()) {
                    ctx.stack.push(value);
                }
                Ok(Flow::Continue)
            }
            BoundOp::Drop => {
                ctx.stack.drop_times(1)?;
                Ok(Flow::Continue)
            }
            BoundOp::DropCell { cell } => {
                if let Some(count) = value_of(cell.as_ref()) {
                    ctx.stack.drop_times(count)?;
                }
                Ok(Flow::Continue)
            }
            BoundOp::Dup => {
                ctx.stack.dup_times(1)?;
                Ok(Flow::Continue)
            }
            BoundOp::DupCell { cell } => {
                if let Some(times) = value_of(cell.as_ref()) {
                    ctx.stack.dup_times(times)?;
                }
                Ok(Flow::Continue)
            }

            BoundOp::Update { reg } => {
                reg.notify();
                Ok(Flow::Continue)
            }
            BoundOp::Clear { reg } => {
                reg.clear();
                Ok(Flow::Continue)
            }
            BoundOp::Reset { reg } => {
                reg.reset();
                Ok(Flow::Continue)
            }
            BoundOp::EnableUpdates => {
                let _ = machine.updates_enabled.compare_exchange(
                    false,
                    true,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
                Ok(Flow::Continue)
            }
            BoundOp::DisableUpdates => {
                let _ = machine.updates_enabled.compare_exchange(
                    true,
                    false,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
                Ok(Flow::Continue)
            }

            BoundOp::Jump { target } => Ok(Flow::Jump(*target)),
            BoundOp::JumpEqValue { value, target } => {
                if ctx.stack.pop()? == *value {
                    Ok(Flow::Jump(*target))
                } else {
                    Ok(Flow::Continue)
                }
            }
            BoundOp::JumpEqCell { cell, target } => {
                let taken = match value_of(cell.as_ref()) {
                    Some(value) => ctx.stack.pop()? == value,
                    None => false,
                };
                Ok(if taken { Flow::Jump(*target) } else { Flow::Continue })
            }
            BoundOp::JumpNeValue { value, target } => {
                if ctx.stack.pop()? != *value {
                    Ok(Flow::Jump(*target))
                } else {
                    Ok(Flow::Continue)
                }
            }
            BoundOp::JumpNeCell { cell, target } => {
                let taken = match value_of(cell.as_ref()) {
                    Some(value) => ctx.stack.pop()? != value,
                    None => false,
                };
                Ok(if taken { Flow::Jump(*target) } else { Flow::Continue })
            }
            BoundOp::IterJump { arr, target } => {
                if arr.has_next() {
                    Ok(Flow::Jump(*target))
                } else {
                    Ok(Flow::Continue)
                }
            }
            BoundOp::Reverse { arr } => {
                arr.reverse();
                Ok(Flow::Continue)
            }

            BoundOp::Call { target } => {
                machine.call(target, ctx)?;
                Ok(Flow::Continue)
            }
            BoundOp::Return => Ok(Flow::Return),
            BoundOp::ReturnCell { cell } => {
                if let Some(value) = value_of(cell.as_ref()) {
                    ctx.stack.push(value);
                }
                Ok(Flow::Continue)
            }

            BoundOp::Spawn { target, seed } => {
                let prime = match seed {
                    SpawnSeed::CallerTop => match ctx.stack.peek() {
                        Ok(value) => FramePrime::Push(value),
                        Err(_) => FramePrime::Nothing,
                    },
                    SpawnSeed::Value(value) => FramePrime::Push(*value),
                    SpawnSeed::Cell(cell) => FramePrime::FromCell(Arc::clone(cell)),
                };
                machine.spawn(prime, target.clone());
                Ok(Flow::Continue)
            }

            BoundOp::PrintPop => {
                println!("{}", ctx.stack.pop()?);
                Ok(Flow::Continue)
            }
            BoundOp::PrintValue { value } => {
                println!("{}", value);
                Ok(Flow::Continue)
            }
            BoundOp::PrintCell { cell } => {
                cell.apply(&mut |value| println!("{}", value));
                Ok(Flow::Continue)
            }

            BoundOp::ExitPop => {
                let code = ctx.stack.pop()?;
                process::exit(code as i32);
            }
            BoundOp::ExitCell { cell } => {
                if let Some(code) = value_of(cell.as_ref()) {
                    process::exit(code as i32);
                }
                Ok(Flow::Continue)
            }
        }
    }
}
