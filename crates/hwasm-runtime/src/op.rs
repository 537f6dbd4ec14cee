//! Instruction descriptors
//!
//! Parse-time products: plain data carrying only the symbolic names and
//! literals read from source. A separate bind pass resolves them into live
//! references (see the machine module); descriptors themselves never change
//! after parsing.

use crate::stack::Operand;

/// One element of an `arr` definition: a literal operand or a reference to
/// a previously defined cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrItem {
    Value(Operand),
    Ref(String),
}

/// Parsed instruction, one variant per source form.
///
/// Definition-flavored variants (`DefineReg`, `DefineArr`, `Require`,
/// `Subscribe`) act entirely at bind time and execute as no-ops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// `reg <name>[, <number>]`
    DefineReg {
        name: String,
        initial: Option<Operand>,
    },
    /// `arr <name> [<item>, ...]`
    DefineArr { name: String, items: Vec<ArrItem> },
    /// `req <name>[, <name>...]`: assert the named cells exist at bind time
    Require { cells: Vec<String> },
    /// `usr <reg>, <label>`: subscribe a program label to a register
    Subscribe { reg: String, label: String },

    /// `mov <reg>`: pop into the register
    MovPop { reg: String },
    /// `mov <reg>, <cell>`
    MovCell { reg: String, cell: String },
    /// `mov <reg>, <number>`
    MovValue { reg: String, value: Operand },

    /// `psh <number>`
    PushValue { value: Operand },
    /// `psh <cell>`
    PushCell { cell: String },
    /// `pop`
    Drop,
    /// `pop <cell>`: drop N operands where N is the cell's value
    DropCell { cell: String },
    /// `dup`
    Dup,
    /// `dup <cell>`: duplicate the top N times where N is the cell's value
    DupCell { cell: String },

    /// `upd <reg>`
    Update { reg: String },
    /// `clr <reg>`
    Clear { reg: String },
    /// `rst <reg>`
    Reset { reg: String },
    /// `seu`
    EnableUpdates,
    /// `clu`
    DisableUpdates,

    /// `jmp <label>`
    Jump { label: String },
    /// `jeq <number>, <label>`
    JumpEqValue { value: Operand, label: String },
    /// `jeq <cell>, <label>`
    JumpEqCell { cell: String, label: String },
    /// `jnq <number>, <label>`
    JumpNeValue { value: Operand, label: String },
    /// `jnq <cell>, <label>`
    JumpNeCell { cell: String, label: String },
    /// `jxt <arr>, <label>`: jump while the array iterator has elements
    IterJump { arr: String, label: String },
    /// `rvr <arr>`
    Reverse { arr: String },

    /// `cal <label>`
    Call { label: String },
    /// `ret`
    Return,
    /// `ret <cell>`: push the cell's value for the caller and continue
    ReturnCell { cell: String },

    /// `run <label>`: spawn, seeding with the spawner's top-of-stack if any
    Spawn { label: String },
    /// `run <number>, <label>`
    SpawnValue { value: Operand, label: String },
    /// `run <cell>, <label>`: seed read inside the spawned frame
    SpawnCell { cell: String, label: String },

    /// `pln`
    PrintPop,
    /// `pln <number>`
    PrintValue { value: Operand },
    /// `pln <cell>`
    PrintCell { cell: String },

    /// `ext`
    ExitPop,
    /// `ext <cell>`
    ExitCell { cell: String },
}
