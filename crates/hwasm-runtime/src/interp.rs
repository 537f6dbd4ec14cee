//! Interpreter state
//!
//! Holds every definition and the instruction sequence, enforces the
//! configure-then-run lifecycle, and performs the one-time bind pass that
//! resolves symbolic names into live references before execution.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, error, trace};

use crate::arr::Arr;
use crate::cell::{Cell, Lit};
use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::hardware::Hardware;
use crate::machine::{BoundOp, CallTarget, ExternalFn, Machine, SpawnSeed};
use crate::op::{ArrItem, Op};
use crate::reg::Reg;
use crate::stack::Operand;

/// The program state engine.
///
/// The parser pushes definitions, labels, and instructions in as it reads
/// them; `invoke` then wires the hardware, binds, and executes. Structural
/// mutation after the start transition is a lifecycle violation.
///
/// Label offsets share one integer space: non-negative offsets index the
/// instruction sequence, negative ones key the external-call table and are
/// assigned by decrementing a counter initialized to -1.
pub struct Interpreter {
    started: AtomicBool,
    updates_enabled: Arc<AtomicBool>,
    regs: IndexMap<String, Arc<Reg>>,
    arrs: IndexMap<String, Arc<Arr>>,
    labels: IndexMap<String, i32>,
    ops: Vec<Op>,
    externals: IndexMap<i32, ExternalFn>,
    external_index: i32,
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("started", &self.started)
            .field("updates_enabled", &self.updates_enabled)
            .field("regs", &self.regs.keys().collect::<Vec<_>>())
            .field("arrs", &self.arrs.keys().collect::<Vec<_>>())
            .field("labels", &self.labels)
            .field("ops", &self.ops)
            .field("externals", &self.externals.keys().collect::<Vec<_>>())
            .field("external_index", &self.external_index)
            .finish()
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Interpreter::new()
    }
}

impl Interpreter {
    /// Empty interpreter, ready for configuration.
    pub fn new() -> Self {
        Interpreter {
            started: AtomicBool::new(false),
            updates_enabled: Arc::new(AtomicBool::new(false)),
            regs: IndexMap::new(),
            arrs: IndexMap::new(),
            labels: IndexMap::new(),
            ops: Vec::new(),
            externals: IndexMap::new(),
            external_index: -1,
        }
    }

    /// Whether the start transition has happened.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Number of instructions recorded so far.
    pub fn instruction_count(&self) -> usize {
        self.ops.len()
    }

    fn ensure_not_started(&self, action: impl FnOnce() -> String) -> Result<()> {
        if self.is_started() {
            Err(Error::after_start(action()))
        } else {
            Ok(())
        }
    }

    /// Define a register. Fails once started or when the name is taken.
    pub fn define_reg(&mut self, name: &str, initial: Option<Operand>) -> Result<Arc<Reg>> {
        self.ensure_not_started(|| format!("define reg '{}'", name))?;
        if self.regs.contains_key(name) {
            return Err(Error::RegAlreadyDefined(name.to_string()));
        }
        let reg = Arc::new(Reg::new(initial, Arc::clone(&self.updates_enabled)));
        self.regs.insert(name.to_string(), Arc::clone(&reg));
        trace!(name, "reg defined");
        Ok(reg)
    }

    /// Define an array over already-built cells. Fails once started or when
    /// the name is taken.
    pub fn define_arr(&mut self, name: &str, cells: Vec<Arc<dyn Cell>>) -> Result<Arc<Arr>> {
        self.ensure_not_started(|| format!("define arr '{}'", name))?;
        if self.arrs.contains_key(name) {
            return Err(Error::ArrAlreadyDefined(name.to_string()));
        }
        let arr = Arc::new(Arr::new(cells));
        self.arrs.insert(name.to_string(), Arc::clone(&arr));
        trace!(name, "arr defined");
        Ok(arr)
    }

    /// Look up a register by name.
    pub fn lookup_reg(&self, name: &str) -> Result<Arc<Reg>> {
        self.regs
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Undefined(name.to_string()))
    }

    /// Look up an array by name.
    pub fn lookup_arr(&self, name: &str) -> Result<Arc<Arr>> {
        self.arrs
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Undefined(name.to_string()))
    }

    /// Look up a cell by name: registers first, then arrays.
    pub fn lookup_cell(&self, name: &str) -> Result<Arc<dyn Cell>> {
        if let Some(reg) = self.regs.get(name) {
            return Ok(Arc::clone(reg) as Arc<dyn Cell>);
        }
        if let Some(arr) = self.arrs.get(name) {
            return Ok(Arc::clone(arr) as Arc<dyn Cell>);
        }
        Err(Error::Undefined(name.to_string()))
    }

    /// Look up a label's offset (negative = external-call table key).
    pub fn lookup_label(&self, name: &str) -> Result<i32> {
        self.labels
            .get(name)
            .copied()
            .ok_or_else(|| Error::Undefined(name.to_string()))
    }

    /// Subscribe a host callback to a register by name.
    pub fn subscribe<F>(&self, reg: &str, callback: F) -> Result<()>
    where
        F: Fn(Option<Operand>) + Send + Sync + 'static,
    {
        let reg = self.lookup_reg(reg)?;
        reg.subscribe(Arc::new(callback));
        Ok(())
    }

    /// Append a parsed instruction. Fails once started.
    pub fn add_instruction(&mut self, op: Op) -> Result<()> {
        self.ensure_not_started(|| "define instruction".to_string())?;
        self.ops.push(op);
        Ok(())
    }

    /// Register a label at an instruction-sequence offset. Fails once
    /// started; names are unique.
    pub fn add_label(&mut self, name: &str, offset: i32) -> Result<()> {
        self.ensure_not_started(|| format!("define label '{}'", name))?;
        if self.labels.contains_key(name) {
            return Err(Error::LabelAlreadyDefined(name.to_string()));
        }
        self.labels.insert(name.to_string(), offset);
        trace!(name, offset, "label recorded");
        Ok(())
    }

    /// Register an out-of-band call frame reachable through `cal`, `run`,
    /// and `usr`. The label gets the next (decrementing) negative offset.
    pub fn add_external_call<F>(&mut self, label: &str, frame: F) -> Result<()>
    where
        F: Fn(&mut ExecutionContext) -> Result<()> + Send + Sync + 'static,
    {
        self.ensure_not_started(|| format!("define external call for label '{}'", label))?;
        if self.labels.contains_key(label) {
            return Err(Error::LabelAlreadyDefined(label.to_string()));
        }
        self.external_index -= 1;
        self.labels.insert(label.to_string(), self.external_index);
        self.externals.insert(self.external_index, Arc::new(frame));
        debug!(label, index = self.external_index, "external call registered");
        Ok(())
    }

    /// Enable register-update notification (compare-and-set).
    pub fn enable_updates(&self) -> Result<()> {
        if !self.is_started() {
            return Err(Error::NotStarted);
        }
        let _ = self
            .updates_enabled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire);
        Ok(())
    }

    /// Disable register-update notification (compare-and-set).
    pub fn disable_updates(&self) -> Result<()> {
        if !self.is_started() {
            return Err(Error::NotStarted);
        }
        let _ = self
            .updates_enabled
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire);
        Ok(())
    }

    /// Invoke the program against a hardware instance.
    ///
    /// Runs the host's wiring callback, binds every instruction in recorded
    /// order, flips the start gate, and executes the main context from the
    /// top of the sequence to completion. Single-shot: a second invocation
    /// fails.
    pub fn invoke<H>(&mut self, hardware: &mut H) -> Result<()>
    where
        H: Hardware + ?Sized,
    {
        if self.is_started() {
            return Err(Error::AlreadyStarted);
        }

        hardware.wire(self)?;
        let machine = self.bind()?;

        self.started.store(true, Ordering::Release);
        debug!("interpreter started");

        let mut ctx = ExecutionContext::new();
        machine.run(&mut ctx)
    }

    /// The one-time bind pass: resolve every descriptor into a live
    /// instruction, then wire program-label subscriptions against the
    /// finished machine.
    fn bind(&mut self) -> Result<Arc<Machine>> {
        debug!(instructions = self.ops.len(), "binding program");

        let ops = std::mem::take(&mut self.ops);
        let mut bound = Vec::with_capacity(ops.len());
        let mut subscriptions = Vec::new();
        for op in ops {
            bound.push(self.resolve(op, &mut subscriptions)?);
        }

        let machine = Arc::new(Machine::new(bound, Arc::clone(&self.updates_enabled)));

        // `usr` subscriptions need the finished machine: each notification
        // spawns a fresh frame that calls the subscribed label.
        for (reg, target) in subscriptions {
            let frame_machine = Arc::clone(&machine);
            reg.subscribe(Arc::new(move |value| {
                let mut ctx = ExecutionContext::new();
                if let Some(value) = value {
                    ctx.stack.push(value);
                }
                if let Err(err) = frame_machine.call(&target, &mut ctx) {
                    error!(%err, "register subscriber frame failed");
                }
            }));
        }

        Ok(machine)
    }

    fn resolve(&mut self, op: Op, subscriptions: &mut Vec<(Arc<Reg>, CallTarget)>) -> Result<BoundOp> {
        Ok(match op {
            Op::DefineReg { name, initial } => {
                self.define_reg(&name, initial)?;
                BoundOp::Nop
            }
            Op::DefineArr { name, items } => {
                let mut cells: Vec<Arc<dyn Cell>> = Vec::with_capacity(items.len());
                for item in items {
                    cells.push(match item {
                        ArrItem::Value(value) => Arc::new(Lit(value)),
                        ArrItem::Ref(name) => self.lookup_cell(&name)?,
                    });
                }
                self.define_arr(&name, cells)?;
                BoundOp::Nop
            }
            Op::Require { cells } => {
                for name in &cells {
                    self.lookup_cell(name)?;
                }
                BoundOp::Nop
            }
            Op::Subscribe { reg, label } => {
                let reg = self.lookup_reg(&reg)?;
                let target = self.call_target(&label)?;
                subscriptions.push((reg, target));
                BoundOp::Nop
            }

            Op::MovPop { reg } => BoundOp::MovPop {
                reg: self.lookup_reg(&reg)?,
            },
            Op::MovCell { reg, cell } => BoundOp::MovCell {
                reg: self.lookup_reg(&reg)?,
                cell: self.lookup_cell(&cell)?,
            },
            Op::MovValue { reg, value } => BoundOp::MovValue {
                reg: self.lookup_reg(&reg)?,
                value,
            },

            Op::PushValue { value } => BoundOp::PushValue { value },
            Op::PushCell { cell } => BoundOp::PushCell {
                cell: self.lookup_cell(&cell)?,
            },
            Op::Drop => BoundOp::Drop,
            Op::DropCell { cell } => BoundOp::DropCell {
                cell: self.lookup_cell(&cell)?,
            },
            Op::Dup => BoundOp::Dup,
            Op::DupCell { cell } => BoundOp::DupCell {
                cell: self.lookup_cell(&cell)?,
            },

            Op::Update { reg } => BoundOp::Update {
                reg: self.lookup_reg(&reg)?,
            },
            Op::Clear { reg } => BoundOp::Clear {
                reg: self.lookup_reg(&reg)?,
            },
            Op::Reset { reg } => BoundOp::Reset {
                reg: self.lookup_reg(&reg)?,
            },
            Op::EnableUpdates => BoundOp::EnableUpdates,
            Op::DisableUpdates => BoundOp::DisableUpdates,

            Op::Jump { label } => BoundOp::Jump {
                target: self.jump_target(&label)?,
            },
            Op::JumpEqValue { value, label } => BoundOp::JumpEqValue {
                value,
                target: self.jump_target(&label)?,
            },
            Op::JumpEqCell { cell, label } => BoundOp::JumpEqCell {
                cell: self.lookup_cell(&cell)?,
                target: self.jump_target(&label)?,
            },
            Op::JumpNeValue { value, label } => BoundOp::JumpNeValue {
                value,
                target: self.jump_target(&label)?,
            },
            Op::JumpNeCell { cell, label } => BoundOp::JumpNeCell {
                cell: self.lookup_cell(&cell)?,
                target: self.jump_target(&label)?,
            },
            Op::IterJump { arr, label } => BoundOp::IterJump {
                arr: self.lookup_arr(&arr)?,
                target: self.jump_target(&label)?,
            },
            Op::Reverse { arr } => BoundOp::Reverse {
                arr: self.lookup_arr(&arr)?,
            },

            Op::Call { label } => BoundOp::Call {
                target: self.call_target(&label)?,
            },
            Op::Return => BoundOp::Return,
            Op::ReturnCell { cell } => BoundOp::ReturnCell {
                cell: self.lookup_cell(&cell)?,
            },

            Op::Spawn { label } => BoundOp::Spawn {
                target: self.call_target(&label)?,
                seed: SpawnSeed::CallerTop,
            },
            Op::SpawnValue { value, label } => BoundOp::Spawn {
                target: self.call_target(&label)?,
                seed: SpawnSeed::Value(value),
            },
            Op::SpawnCell { cell, label } => BoundOp::Spawn {
                target: self.call_target(&label)?,
                seed: SpawnSeed::Cell(self.lookup_cell(&cell)?),
            },

            Op::PrintPop => BoundOp::PrintPop,
            Op::PrintValue { value } => BoundOp::PrintValue { value },
            Op::PrintCell { cell } => BoundOp::PrintCell {
                cell: self.lookup_cell(&cell)?,
            },

            Op::ExitPop => BoundOp::ExitPop,
            Op::ExitCell { cell } => BoundOp::ExitCell {
                cell: self.lookup_cell(&cell)?,
            },
        })
    }

    /// Resolve a label for a jump: only internal offsets are legal targets.
    fn jump_target(&self, label: &str) -> Result<usize> {
        let offset = self.lookup_label(label)?;
        if offset < 0 {
            return Err(Error::JumpToExternal {
                label: label.to_string(),
            });
        }
        Ok(offset as usize)
    }

    /// Resolve a label for a call: the offset's sign picks the tag.
    fn call_target(&self, label: &str) -> Result<CallTarget> {
        let offset = self.lookup_label(label)?;
        if offset < 0 {
            let frame = self
                .externals
                .get(&offset)
                .cloned()
                .ok_or(Error::ExternalNotDefined(offset))?;
            Ok(CallTarget::External(frame))
        } else {
            Ok(CallTarget::Internal(offset as usize))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bare;

    impl Hardware for Bare {
        fn wire(&mut self, _state: &mut Interpreter) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_define_and_lookup() {
        let mut interp = Interpreter::new();
        interp.define_reg("rf", Some(1)).unwrap();
        assert_eq!(interp.lookup_reg("rf").unwrap().get(), Some(1));
        assert!(interp.lookup_cell("rf").is_ok());
        assert!(matches!(
            interp.lookup_reg("nosuch"),
            Err(Error::Undefined(_))
        ));
    }

    #[test]
    fn test_duplicate_definitions_are_rejected() {
        let mut interp = Interpreter::new();
        interp.define_reg("r", None).unwrap();
        assert!(matches!(
            interp.define_reg("r", None),
            Err(Error::RegAlreadyDefined(_))
        ));
        interp.define_arr("a", Vec::new()).unwrap();
        assert!(matches!(
            interp.define_arr("a", Vec::new()),
            Err(Error::ArrAlreadyDefined(_))
        ));
        interp.add_label("l", 0).unwrap();
        assert!(matches!(
            interp.add_label("l", 1),
            Err(Error::LabelAlreadyDefined(_))
        ));
    }

    #[test]
    fn test_external_indices_decrement_from_minus_one() {
        let mut interp = Interpreter::new();
        interp.add_external_call("first", |_ctx| Ok(())).unwrap();
        interp.add_external_call("second", |_ctx| Ok(())).unwrap();
        assert_eq!(interp.lookup_label("first").unwrap(), -2);
        assert_eq!(interp.lookup_label("second").unwrap(), -3);
    }

    #[test]
    fn test_configuration_after_start_is_rejected() {
        let mut interp = Interpreter::new();
        interp.invoke(&mut Bare).unwrap();

        assert!(matches!(
            interp.define_reg("r", None),
            Err(Error::AfterStart { .. })
        ));
        assert!(matches!(
            interp.define_arr("a", Vec::new()),
            Err(Error::AfterStart { .. })
        ));
        assert!(matches!(
            interp.add_instruction(Op::Drop),
            Err(Error::AfterStart { .. })
        ));
        assert!(matches!(
            interp.add_label("l", 0),
            Err(Error::AfterStart { .. })
        ));
        assert!(matches!(
            interp.add_external_call("x", |_| Ok(())),
            Err(Error::AfterStart { .. })
        ));
    }

    #[test]
    fn test_second_invocation_is_rejected() {
        let mut interp = Interpreter::new();
        interp.invoke(&mut Bare).unwrap();
        assert!(matches!(interp.invoke(&mut Bare), Err(Error::AlreadyStarted)));
    }

    #[test]
    fn test_update_toggles_require_start() {
        let interp = Interpreter::new();
        assert!(matches!(interp.enable_updates(), Err(Error::NotStarted)));
        assert!(matches!(interp.disable_updates(), Err(Error::NotStarted)));
    }

    #[test]
    fn test_undefined_symbol_fails_at_bind() {
        let mut interp = Interpreter::new();
        interp
            .add_instruction(Op::MovCell {
                reg: "nosuch".to_string(),
                cell: "rs".to_string(),
            })
            .unwrap();
        let err = interp.invoke(&mut Bare).unwrap_err();
        assert!(matches!(err, Error::Undefined(name) if name == "nosuch"));
        // Binding failed before the start transition.
        assert!(!interp.is_started());
    }

    #[test]
    fn test_jump_to_external_label_fails_at_bind() {
        let mut interp = Interpreter::new();
        interp.add_external_call("out", |_| Ok(())).unwrap();
        interp
            .add_instruction(Op::Jump {
                label: "out".to_string(),
            })
            .unwrap();
        assert!(matches!(
            interp.invoke(&mut Bare),
            Err(Error::JumpToExternal { .. })
        ));
    }
}
