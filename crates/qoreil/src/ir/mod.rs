//! IR instructions & containers (C3).
//!
//! Plain algebraic data, as recommended by the design note in spec.md §9:
//! one enum-of-variants for instructions rather than a class hierarchy
//! with visitors, and blocks referencing each other by index into the
//! owning function's block vector rather than by owning pointer. The
//! printer lives in [`printer`] and implements the dump grammar from
//! spec.md §6 exactly (it is part of the testable surface).
//!
//! Grounded directly on `original_source/include/qore/as/as.h`, which
//! enumerates this exact instruction set.

pub mod printer;

use crate::conv::ConversionDescriptor;
use crate::op::BinaryOperatorDescriptor;

macro_rules! dense_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            #[must_use]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

dense_id!(TempId);
dense_id!(LocalId);
dense_id!(GlobalId);
dense_id!(BlockId);
dense_id!(StringId);

/// Interns string literals during analysis, deduplicating repeats the
/// way the original's string table (`Context::getStringTable`) does.
/// An `IndexMap` gives both dedup lookup and the stable insertion order
/// the script's `strings` vector needs for deterministic dumps in one
/// structure, the same role it plays for `ouros::object::DictPairs`.
#[derive(Debug, Default)]
pub struct StringTable {
    index: indexmap::IndexMap<String, StringId>,
}

impl StringTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, value: &str) -> StringId {
        if let Some(id) = self.index.get(value) {
            return *id;
        }
        let id = StringId(self.index.len().try_into().expect("too many string literals"));
        self.index.insert(value.to_owned(), id);
        id
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<String> {
        self.index.into_keys().collect()
    }
}

/// A non-branching IR instruction. Every block is a sequence of these
/// terminated by exactly one [`Terminator`] (spec.md §3).
///
/// Every variant that may raise during execution carries an `lpad`: the
/// landing-pad block entered if *this* instruction raises. Pure
/// instructions (`IntConstant`, `GetLocal`, locks, ...) carry none.
#[derive(Debug, Clone)]
pub enum Instruction {
    IntConstant { dest: TempId, value: i64 },
    GetLocal { dest: TempId, slot: LocalId },
    SetLocal { slot: LocalId, src: TempId },
    LoadString { dest: TempId, string: StringId },
    RefInc { temp: TempId },
    RefDec { temp: TempId, lpad: Option<BlockId> },
    RefDecNoexcept { temp: TempId, exception: TempId },
    ReadLockGlobal { global: GlobalId },
    ReadUnlockGlobal { global: GlobalId },
    WriteLockGlobal { global: GlobalId },
    WriteUnlockGlobal { global: GlobalId },
    GetGlobal { dest: TempId, global: GlobalId },
    SetGlobal { global: GlobalId, src: TempId },
    MakeGlobal { global: GlobalId, src: TempId },
    FreeGlobal { global: GlobalId },
    LandingPad { dest: TempId },
    /// Re-arms the in-flight exception from `exception` so the `catch`
    /// block being jumped into can bind it with its own `LandingPad`.
    /// Emitted only by the builder's own cleanup-pad construction when a
    /// `try` region is active (spec.md §4.7's catch-jump is this core's
    /// own addition; the original's `Cleanup::getLandingPad` never needs
    /// this since it only ever rethrows once).
    Reraise { exception: TempId },
    BinaryOperator { dest: TempId, desc: BinaryOperatorDescriptor, left: TempId, right: TempId, lpad: Option<BlockId> },
    Conversion { dest: TempId, desc: ConversionDescriptor, arg: TempId, lpad: Option<BlockId> },
}

/// The single branch/exit instruction every block ends with.
#[derive(Debug, Clone)]
pub enum Terminator {
    Jump { target: BlockId },
    CondJump { cond: TempId, then_block: BlockId, else_block: BlockId },
    Rethrow { exception: TempId },
    RetVoid,
}

/// A maximal straight-line sequence of instructions ending in one
/// terminator. Landing-pad blocks are ordinary blocks whose first
/// instruction is `LandingPad` (spec.md §3 invariant).
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub instructions: Vec<Instruction>,
    pub terminator: Option<Terminator>,
}

impl Block {
    #[must_use]
    pub fn terminator(&self) -> &Terminator {
        self.terminator.as_ref().expect("block read before being terminated")
    }
}

/// A name, a local/temp slot count, and an ordered set of basic blocks
/// with block 0 as entry. Slot and temp indices are small integers
/// assigned during analysis; temps are reusable once their last consumer
/// has run (spec.md §3).
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub local_count: u32,
    pub temp_count: u32,
    pub blocks: Vec<Block>,
}

impl Function {
    pub const ENTRY: BlockId = BlockId(0);

    #[must_use]
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }
}

/// A complete compiled unit: the string-literal table, the global count,
/// and the functions the analyzer produced — including the three
/// distinguished ones named in spec.md §3.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub strings: Vec<String>,
    pub global_count: u32,
    pub functions: Vec<Function>,
}

impl Script {
    #[must_use]
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Executes global initializers, then the script body, then global
    /// teardown, in that order — the `qinit` / `qmain` / `qdone`
    /// convenience named as an ambient addition in SPEC_FULL.md (spec.md
    /// §3 names the three functions but does not wire a single entry
    /// point calling all three).
    pub fn run(
        &self,
        heap: &mut crate::value::Heap,
        globals: &mut crate::interp::Globals,
        out: &mut dyn std::io::Write,
    ) -> Result<(), crate::error::Raised> {
        crate::interp::Interpreter::new(self, heap, globals, out).run_named("qinit")?;
        crate::interp::Interpreter::new(self, heap, globals, out).run_named("qmain")?;
        crate::interp::Interpreter::new(self, heap, globals, out).run_named("qdone")?;
        Ok(())
    }
}
