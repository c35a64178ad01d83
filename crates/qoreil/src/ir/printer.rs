//! Textual IR dump (spec.md §6).
//!
//! Tests and tooling depend on this format being stable: the same
//! [`crate::ir::Script`] always prints to the same bytes (spec.md §8,
//! invariant 4 / scenario S6). Every mnemonic listed in spec.md §6 is
//! reproduced verbatim; this module only decides how operands are laid
//! out around each mnemonic, since the spec gives the vocabulary, not a
//! byte-for-byte grammar.

use std::fmt::Write as _;

use crate::ir::{Block, Function, Instruction, Script, Terminator};

fn lpad(lpad: Option<crate::ir::BlockId>) -> String {
    match lpad {
        Some(b) => format!("lpad BB.{}", b.0),
        None => "no lpad".to_owned(),
    }
}

fn write_instruction(out: &mut String, instr: &Instruction) {
    match instr {
        Instruction::IntConstant { dest, value } => {
            write!(out, "temp.{} = int constant {value}", dest.0).unwrap();
        }
        Instruction::GetLocal { dest, slot } => {
            write!(out, "temp.{} = get local.{}", dest.0, slot.0).unwrap();
        }
        Instruction::SetLocal { slot, src } => {
            write!(out, "set local.{} = temp.{}", slot.0, src.0).unwrap();
        }
        Instruction::LoadString { dest, string } => {
            write!(out, "temp.{} = load string str.{}", dest.0, string.0).unwrap();
        }
        Instruction::RefInc { temp } => {
            write!(out, "ref inc temp.{}", temp.0).unwrap();
        }
        Instruction::RefDec { temp, lpad: l } => {
            write!(out, "ref dec temp.{} [{}]", temp.0, lpad(*l)).unwrap();
        }
        Instruction::RefDecNoexcept { temp, exception } => {
            write!(out, "ref dec noexcept temp.{} [combine temp.{}]", temp.0, exception.0).unwrap();
        }
        Instruction::ReadLockGlobal { global } => write!(out, "read lock global.{}", global.0).unwrap(),
        Instruction::ReadUnlockGlobal { global } => write!(out, "read unlock global.{}", global.0).unwrap(),
        Instruction::WriteLockGlobal { global } => write!(out, "write lock global.{}", global.0).unwrap(),
        Instruction::WriteUnlockGlobal { global } => write!(out, "write unlock global.{}", global.0).unwrap(),
        Instruction::GetGlobal { dest, global } => {
            write!(out, "temp.{} = get global.{}", dest.0, global.0).unwrap();
        }
        Instruction::SetGlobal { global, src } => {
            write!(out, "set global.{} = temp.{}", global.0, src.0).unwrap();
        }
        Instruction::MakeGlobal { global, src } => {
            write!(out, "make global.{} = temp.{}", global.0, src.0).unwrap();
        }
        Instruction::FreeGlobal { global } => write!(out, "free global.{}", global.0).unwrap(),
        Instruction::LandingPad { dest } => write!(out, "temp.{} = landing pad", dest.0).unwrap(),
        Instruction::Reraise { exception } => write!(out, "reraise temp.{}", exception.0).unwrap(),
        Instruction::BinaryOperator { dest, desc, left, right, lpad: l } => {
            write!(
                out,
                "temp.{} = binary operator {} temp.{}, temp.{} [{}]",
                dest.0,
                desc.kind,
                left.0,
                right.0,
                lpad(*l)
            )
            .unwrap();
        }
        Instruction::Conversion { dest, desc, arg, lpad: l } => {
            write!(out, "temp.{} = conversion {} temp.{} [{}]", dest.0, desc.kind, arg.0, lpad(*l)).unwrap();
        }
    }
}

fn write_terminator(out: &mut String, term: &Terminator) {
    match term {
        Terminator::Jump { target } => write!(out, "jump BB.{}", target.0).unwrap(),
        Terminator::CondJump { cond, then_block, else_block } => {
            write!(out, "cond jump temp.{}, BB.{}, BB.{}", cond.0, then_block.0, else_block.0).unwrap();
        }
        Terminator::Rethrow { exception } => write!(out, "rethrow temp.{}", exception.0).unwrap(),
        Terminator::RetVoid => out.push_str("ret void"),
    }
}

fn dump_block(out: &mut String, id: usize, block: &Block) {
    writeln!(out, "BB.{id}").unwrap();
    let mut k = 0usize;
    for instr in &block.instructions {
        write!(out, "  {k}: ").unwrap();
        write_instruction(out, instr);
        out.push('\n');
        k += 1;
    }
    write!(out, "  {k}: ").unwrap();
    write_terminator(out, block.terminator());
    out.push('\n');
}

/// Dumps a single function in the §6 grammar.
#[must_use]
pub fn dump_function(f: &Function) -> String {
    let mut out = String::new();
    writeln!(out, "function {} (locals={} temps={})", f.name, f.local_count, f.temp_count).unwrap();
    for (id, block) in f.blocks.iter().enumerate() {
        dump_block(&mut out, id, block);
    }
    out
}

/// Dumps an entire script: the string table followed by every function,
/// in declaration order.
#[must_use]
pub fn dump_script(s: &Script) -> String {
    let mut out = String::new();
    writeln!(out, "script (globals={})", s.global_count).unwrap();
    for (id, string) in s.strings.iter().enumerate() {
        writeln!(out, "str.{id} = {string:?}").unwrap();
    }
    for f in &s.functions {
        out.push_str(&dump_function(f));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Block, Function, Instruction, Script, TempId, Terminator};

    #[test]
    fn dump_is_deterministic() {
        let f = Function {
            name: "f".to_owned(),
            local_count: 0,
            temp_count: 1,
            blocks: vec![Block {
                instructions: vec![Instruction::IntConstant { dest: TempId(0), value: 5 }],
                terminator: Some(Terminator::RetVoid),
            }],
        };
        let script = Script { strings: vec![], global_count: 0, functions: vec![f] };
        let first = dump_script(&script);
        let second = dump_script(&script);
        assert_eq!(first, second);
        assert!(first.contains("temp.0 = int constant 5"));
        assert!(first.contains("ret void"));
    }
}
