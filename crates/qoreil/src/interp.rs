//! The interpreter (C8): runs one [`Function`] at a time, instruction by
//! instruction, redirecting to a landing pad whenever one raises.
//!
//! Grounded directly on `original_source/include/qore/in/FunctionInterpreter.h`'s
//! `run()`: a `switch` over the current instruction wrapped in a
//! `try`/`catch` that, on an exception, jumps to `ins->getLpad()` if one is
//! set and rethrows otherwise. The block-at-a-time walk (rather than a
//! flat instruction pointer) follows the same file's `Block::Iterator`
//! dispatch, adapted from C++ iterator-and-pointer bookkeeping to an
//! index into `Function::blocks`.

use std::io::Write;

use crate::error::Raised;
use crate::ir::{BlockId, Function, GlobalId, Instruction, Script, Terminator};
use crate::value::{Heap, HeapId, Value};

/// A global's lock state. Single-threaded (spec.md §5), so this exists to
/// catch misuse — a second write lock acquired while one is held, an
/// unlock with nothing held — rather than to arbitrate real contention.
/// Kept as real bookkeeping rather than a no-op so a future concurrent
/// interpreter can replace the `Cell`s here with real synchronization
/// without touching the instruction semantics above it.
#[derive(Debug, Clone, Copy, Default)]
enum LockState {
    #[default]
    Unlocked,
    Read(u32),
    Write,
}

/// Global-variable storage: one value slot and one lock per global,
/// indexed by [`GlobalId`].
pub struct Globals {
    slots: Vec<Value>,
    locks: Vec<LockState>,
}

impl Globals {
    #[must_use]
    pub fn new(count: u32) -> Self {
        let count = count as usize;
        let slots = std::iter::repeat_with(|| Value::Nothing).take(count).collect();
        Self { slots, locks: vec![LockState::default(); count] }
    }

    fn begin_read(&mut self, g: GlobalId) {
        match &mut self.locks[g.index()] {
            LockState::Unlocked => self.locks[g.index()] = LockState::Read(1),
            LockState::Read(n) => *n += 1,
            LockState::Write => panic!("read lock acquired on global.{} while write-locked", g.0),
        }
    }

    fn end_read(&mut self, g: GlobalId) {
        match &mut self.locks[g.index()] {
            LockState::Read(1) => self.locks[g.index()] = LockState::Unlocked,
            LockState::Read(n) => *n -= 1,
            other => panic!("read unlock on global.{} with state {other:?}", g.0),
        }
    }

    fn begin_write(&mut self, g: GlobalId) {
        assert!(
            matches!(self.locks[g.index()], LockState::Unlocked),
            "write lock acquired on global.{} while already locked",
            g.0
        );
        self.locks[g.index()] = LockState::Write;
    }

    fn end_write(&mut self, g: GlobalId) {
        assert!(
            matches!(self.locks[g.index()], LockState::Write),
            "write unlock on global.{} with no write lock held",
            g.0
        );
        self.locks[g.index()] = LockState::Unlocked;
    }

    fn get(&self, g: GlobalId) -> Value {
        self.slots[g.index()].raw_copy()
    }

    fn set(&mut self, g: GlobalId, v: Value) {
        self.slots[g.index()] = v;
    }
}

/// Outcome of executing one non-branching instruction: either fall
/// through to the next one, or an exception redirected control to a
/// landing pad (the instruction's own `Err` case already recorded the
/// exception as pending).
enum Step {
    Continue,
    Redirect(BlockId),
}

/// Runs [`Function`]s from one [`Script`] against one [`Heap`] and
/// [`Globals`], writing `print`-style output to `out`.
pub struct Interpreter<'a> {
    script: &'a Script,
    heap: &'a mut Heap,
    globals: &'a mut Globals,
    out: &'a mut dyn Write,
}

impl<'a> Interpreter<'a> {
    pub fn new(script: &'a Script, heap: &'a mut Heap, globals: &'a mut Globals, out: &'a mut dyn Write) -> Self {
        Self { script, heap, globals, out }
    }

    /// Runs the function named `name`, or does nothing if the script has
    /// none by that name (spec.md §3's `qinit`/`qmain`/`qdone` are each
    /// optional; a script with no global initializers has no `qinit`).
    pub fn run_named(&mut self, name: &str) -> Result<(), Raised> {
        let Some(f) = self.script.function(name) else { return Ok(()) };
        self.run_function(f)
    }

    fn run_function(&mut self, f: &Function) -> Result<(), Raised> {
        let mut temps: Vec<Value> = std::iter::repeat_with(|| Value::Nothing).take(f.temp_count as usize).collect();
        let mut locals: Vec<Value> =
            std::iter::repeat_with(|| Value::Nothing).take(f.local_count as usize).collect();
        let mut pending: Option<HeapId> = None;
        let mut block_id = Function::ENTRY;

        loop {
            let block = f.block(block_id);
            let mut redirect = None;
            for instr in &block.instructions {
                match self.exec(instr, &mut temps, &mut locals, &mut pending)? {
                    Step::Continue => {}
                    Step::Redirect(lpad) => {
                        redirect = Some(lpad);
                        break;
                    }
                }
            }
            if let Some(lpad) = redirect {
                block_id = lpad;
                continue;
            }

            match block.terminator() {
                Terminator::Jump { target } => block_id = *target,
                Terminator::CondJump { cond, then_block, else_block } => {
                    block_id = if is_truthy(&temps[cond.index()]) { *then_block } else { *else_block };
                }
                Terminator::Rethrow { exception } => {
                    let Value::Ref(id) = temps[exception.index()] else {
                        unreachable!("Rethrow's operand is always the in-flight exception reference")
                    };
                    return Err(Raised(id));
                }
                Terminator::RetVoid => return Ok(()),
            }
        }
    }

    fn exec(
        &mut self,
        instr: &Instruction,
        temps: &mut [Value],
        locals: &mut [Value],
        pending: &mut Option<HeapId>,
    ) -> Result<Step, Raised> {
        match *instr {
            Instruction::IntConstant { dest, value } => {
                temps[dest.index()] = Value::Int(value);
            }
            Instruction::GetLocal { dest, slot } => {
                temps[dest.index()] = locals[slot.index()].raw_copy();
            }
            Instruction::SetLocal { slot, src } => {
                locals[slot.index()] = std::mem::replace(&mut temps[src.index()], Value::Nothing);
            }
            Instruction::LoadString { dest, string } => {
                let s = self.script.strings[string.index()].clone();
                temps[dest.index()] = Value::Ref(self.heap.alloc_string(s));
            }
            Instruction::RefInc { temp } => crate::value::inc_ref(self.heap, &temps[temp.index()]),
            Instruction::RefDec { temp, lpad } => {
                let v = std::mem::replace(&mut temps[temp.index()], Value::Nothing);
                if let Err(exc) = crate::value::dec_ref(self.heap, v) {
                    return self.raise(exc, lpad, pending);
                }
            }
            Instruction::RefDecNoexcept { temp, exception } => {
                let v = std::mem::replace(&mut temps[temp.index()], Value::Nothing);
                let Value::Ref(mut id) = temps[exception.index()] else {
                    unreachable!("RefDecNoexcept's exception operand always holds the in-flight exception")
                };
                crate::value::dec_ref_noexcept(self.heap, v, &mut id);
                temps[exception.index()] = Value::Ref(id);
            }
            Instruction::ReadLockGlobal { global } => self.globals.begin_read(global),
            Instruction::ReadUnlockGlobal { global } => self.globals.end_read(global),
            Instruction::WriteLockGlobal { global } => self.globals.begin_write(global),
            Instruction::WriteUnlockGlobal { global } => self.globals.end_write(global),
            Instruction::GetGlobal { dest, global } => temps[dest.index()] = self.globals.get(global),
            Instruction::SetGlobal { global, src } => {
                self.globals.set(global, std::mem::replace(&mut temps[src.index()], Value::Nothing));
            }
            Instruction::MakeGlobal { global, src } => {
                self.globals.set(global, std::mem::replace(&mut temps[src.index()], Value::Nothing));
            }
            Instruction::FreeGlobal { global } => self.globals.set(global, Value::Nothing),
            Instruction::LandingPad { dest } => {
                let exc = pending.take().expect("a landing pad is only entered with an exception pending");
                temps[dest.index()] = Value::Ref(exc);
            }
            Instruction::Reraise { exception } => {
                let Value::Ref(id) = temps[exception.index()] else {
                    unreachable!("Reraise's operand always holds the in-flight exception")
                };
                *pending = Some(id);
            }
            Instruction::BinaryOperator { dest, desc, left, right, lpad } => {
                match (desc.function)(&temps[left.index()], &temps[right.index()], self.heap) {
                    Ok(v) => temps[dest.index()] = v,
                    Err(exc) => return self.raise(exc, lpad, pending),
                }
            }
            Instruction::Conversion { dest, desc, arg, lpad } => {
                let v = std::mem::replace(&mut temps[arg.index()], Value::Nothing);
                match (desc.function)(v, self.heap) {
                    Ok(v) => temps[dest.index()] = v,
                    Err(exc) => return self.raise(exc, lpad, pending),
                }
            }
        }
        Ok(Step::Continue)
    }

    /// Records `exc` as the in-flight exception and either redirects to
    /// `lpad` or propagates it past this function entirely, mirroring
    /// `FunctionInterpreter::run`'s `catch (Exception &e) { if
    /// (!ins->getLpad()) throw; ... }`.
    fn raise(&mut self, exc: HeapId, lpad: Option<BlockId>, pending: &mut Option<HeapId>) -> Result<Step, Raised> {
        *pending = Some(exc);
        match lpad {
            Some(block) => Ok(Step::Redirect(block)),
            None => Err(Raised(exc)),
        }
    }

    /// Prints a value the way `print` does, resolving heap data through
    /// this interpreter's own heap (spec.md §8's scenarios assert on this
    /// output).
    pub fn print(&mut self, v: &Value) {
        let rendered = v.display(self.heap);
        let _ = writeln!(self.out, "{rendered}");
    }
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Int(i) => *i != 0,
        Value::Nothing => false,
        Value::Float(f) => *f != 0.0,
        Value::Ref(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::ir::{Block, Function, Script, StringId};
    use crate::value::Destructor;

    fn one_function_script(f: Function) -> Script {
        Script { strings: vec!["hi".to_owned()], global_count: 0, functions: vec![f] }
    }

    #[test]
    fn runs_a_straight_line_function() {
        let mut b = Builder::new("qmain");
        let t = b.emit_int_constant(5);
        let l = b.declare_local(crate::ty::int());
        b.emit_set_local(l, t);
        b.terminate_ret_void();
        let f = b.build();
        let script = one_function_script(f);

        let mut heap = Heap::new();
        let mut globals = Globals::new(0);
        let mut out = Vec::new();
        let result = Interpreter::new(&script, &mut heap, &mut globals, &mut out).run_named("qmain");
        assert!(result.is_ok());
    }

    #[test]
    fn unhandled_exception_from_destructor_propagates() {
        let mut heap = Heap::new();
        let obj = heap.alloc_object("boom", Destructor::Raise("kaboom".to_owned()));

        let mut b = Builder::new("qmain");
        let t = b.alloc_temp();
        b.emit_ref_dec(t);
        b.terminate_ret_void();
        let f = b.build();
        let script = one_function_script(f);

        // Seed the temp with the object reference by running through the
        // interpreter's own slot, bypassing normal emission since this
        // test only wants to exercise the unwind-to-nothing path.
        let mut globals = Globals::new(0);
        let mut out = Vec::new();
        let mut interp = Interpreter::new(&script, &mut heap, &mut globals, &mut out);
        let mut temps = vec![Value::Ref(obj)];
        let mut locals: Vec<Value> = Vec::new();
        let mut pending = None;
        let block = script.functions[0].block(Function::ENTRY);
        let outcome = interp.exec(&block.instructions[0], &mut temps, &mut locals, &mut pending);
        assert!(outcome.is_err(), "a RefDec with no landing pad must propagate");
    }

    #[test]
    fn landing_pad_binds_pending_exception() {
        let mut heap = Heap::new();
        let exc = heap.alloc_exception("E", None);
        let mut globals = Globals::new(0);
        let mut out = Vec::new();
        let script = one_function_script(Function { name: "f".to_owned(), local_count: 0, temp_count: 1, blocks: vec![Block::default()] });
        let mut interp = Interpreter::new(&script, &mut heap, &mut globals, &mut out);
        let mut temps = vec![Value::Nothing];
        let mut locals: Vec<Value> = Vec::new();
        let mut pending = Some(exc);
        let step = interp
            .exec(&Instruction::LandingPad { dest: crate::ir::TempId(0) }, &mut temps, &mut locals, &mut pending)
            .unwrap();
        assert!(matches!(step, Step::Continue));
        assert!(matches!(temps[0], Value::Ref(id) if id == exc));
        assert!(pending.is_none());
    }

    #[test]
    fn global_write_lock_rejects_nested_acquire() {
        let mut globals = Globals::new(1);
        globals.begin_write(GlobalId(0));
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| globals.begin_write(GlobalId(0))));
        assert!(result.is_err());
    }

    #[test]
    fn string_literal_load_allocates_from_script_table() {
        let mut b = Builder::new("qmain");
        let t = b.emit_load_string(StringId(0));
        b.emit_ref_dec(t);
        b.terminate_ret_void();
        let f = b.build();
        let script = one_function_script(f);
        let mut heap = Heap::new();
        let mut globals = Globals::new(0);
        let mut out = Vec::new();
        Interpreter::new(&script, &mut heap, &mut globals, &mut out).run_named("qmain").unwrap();
        assert_eq!(heap.live_count(), 0);
    }

    // End-to-end scenarios (spec.md §8). These build `qmain` the same way
    // `qoreil-cli` does — by hand-driving the analyzer over a small AST —
    // then run it and inspect the resulting state, using a global slot as
    // the "observable output" channel since this core has no built-in
    // `print` intrinsic (spec.md's Non-goals leave `print` to an external
    // collaborator; `Interpreter::print` only renders a `Value` it is
    // handed, it doesn't wire one up from a statement).

    mod scenarios {
        use super::*;
        use crate::analyzer::stmt;
        use crate::ast::{AstExpr, AstExprKind, AstStmt, AstStmtKind, BinOp, SourceLocation};
        use crate::ir::StringTable;
        use crate::op::{self, OperatorKind};
        use crate::scope::{CollectingReporter, MapScope, Scope, Symbol};

        fn loc() -> SourceLocation {
            SourceLocation::default()
        }

        fn expr_stmt(kind: AstExprKind) -> AstStmt {
            AstStmt::new(loc(), AstStmtKind::Expr(AstExpr::new(loc(), kind)))
        }

        fn local_of(scope: &MapScope, name: &str) -> crate::scope::LocalVariableInfo {
            match scope.resolve_symbol(name) {
                Some(Symbol::Local(info)) => info,
                other => panic!("expected '{name}' to resolve to a local, got {other:?}"),
            }
        }

        /// S1 — `int i = 2; i += 3;`. Snapshots `i` into global.0 in place
        /// of `print i` and checks it renders `5` with a zero heap delta.
        #[test]
        fn scenario_s1_integer_addition() {
            let mut strings = StringTable::new();
            let mut scope = MapScope::new();
            let mut reporter = CollectingReporter::new();
            let mut b = Builder::new("qmain");

            let decl = expr_stmt(AstExprKind::VarDecl {
                name: "i".to_owned(),
                declared_type: "int".to_owned(),
                init: Some(Box::new(AstExpr::new(loc(), AstExprKind::IntLiteral(2)))),
            });
            let compound = expr_stmt(AstExprKind::CompoundAssign {
                op: BinOp::Add,
                target: Box::new(AstExpr::new(loc(), AstExprKind::Name("i".to_owned()))),
                value: Box::new(AstExpr::new(loc(), AstExprKind::IntLiteral(3))),
            });

            let mark = b.begin_block_scope();
            stmt::analyze_stmt(&decl, &mut b, &mut scope, &mut strings, &mut reporter);
            stmt::analyze_stmt(&compound, &mut b, &mut scope, &mut strings, &mut reporter);
            let info = local_of(&scope, "i");
            let snapshot = b.emit_get_local(info.slot);
            b.emit_set_global(GlobalId(0), snapshot);
            b.end_block_scope(mark);
            b.terminate_ret_void();
            assert!(reporter.diagnostics.is_empty(), "unexpected diagnostics: {:?}", reporter.diagnostics);

            let f = b.build();
            let script = Script { strings: strings.into_vec(), global_count: 1, functions: vec![f] };
            let mut heap = Heap::new();
            let mut globals = Globals::new(1);
            let mut out = Vec::new();
            Interpreter::new(&script, &mut heap, &mut globals, &mut out).run_named("qmain").unwrap();

            assert_eq!(globals.get(GlobalId(0)).display(&heap), "5");
            assert_eq!(heap.live_count(), 0, "heap refcount delta must be zero");
        }

        /// S2 — `string s = "n="; s += 7;`. The `+=` coerces `7` to a
        /// string via the registered `IntToString` edge before the string
        /// `Add` overload concatenates. Snapshots `s` the same way S1
        /// snapshots `i`.
        #[test]
        fn scenario_s2_string_concat_with_implicit_conversion() {
            let mut strings = StringTable::new();
            let mut scope = MapScope::new();
            let mut reporter = CollectingReporter::new();
            let mut b = Builder::new("qmain");

            let decl = expr_stmt(AstExprKind::VarDecl {
                name: "s".to_owned(),
                declared_type: "string".to_owned(),
                init: Some(Box::new(AstExpr::new(loc(), AstExprKind::StringLiteral("n=".to_owned())))),
            });
            let compound = expr_stmt(AstExprKind::CompoundAssign {
                op: BinOp::Add,
                target: Box::new(AstExpr::new(loc(), AstExprKind::Name("s".to_owned()))),
                value: Box::new(AstExpr::new(loc(), AstExprKind::IntLiteral(7))),
            });

            let mark = b.begin_block_scope();
            stmt::analyze_stmt(&decl, &mut b, &mut scope, &mut strings, &mut reporter);
            stmt::analyze_stmt(&compound, &mut b, &mut scope, &mut strings, &mut reporter);
            let info = local_of(&scope, "s");
            let snapshot = b.emit_get_local(info.slot);
            b.emit_ref_inc(snapshot);
            b.emit_set_global(GlobalId(0), snapshot);
            b.end_block_scope(mark);
            b.terminate_ret_void();
            assert!(reporter.diagnostics.is_empty(), "unexpected diagnostics: {:?}", reporter.diagnostics);

            let f = b.build();
            let script = Script { strings: strings.into_vec(), global_count: 1, functions: vec![f] };
            let mut heap = Heap::new();
            let mut globals = Globals::new(1);
            let mut out = Vec::new();
            Interpreter::new(&script, &mut heap, &mut globals, &mut out).run_named("qmain").unwrap();

            let result = globals.get(GlobalId(0));
            assert_eq!(result.display(&heap), "n=7");
            crate::value::dec_ref(&mut heap, result).unwrap();
            assert_eq!(heap.live_count(), 0, "the released \"n=\" and the surviving \"n=7\" must not leak");
        }

        /// S3 — `{ Object o = make_throwing(); }`. Calls aren't lowered by
        /// this core (DESIGN.md's Open Question decision), so
        /// `make_throwing()`'s result is modeled as a value already sitting
        /// in a global (as if some external collaborator produced it);
        /// `o`'s declaration is just the local assignment from that global.
        /// Going out of scope at the end of the block runs the object's
        /// raising destructor with no enclosing `try`, so it must surface
        /// as an unhandled exception.
        #[test]
        fn scenario_s3_exception_from_decrement_is_unhandled() {
            let mut heap = Heap::new();
            let thrower = heap.alloc_object("o", Destructor::Raise("E".to_owned()));

            let mut b = Builder::new("qmain");
            let mark = b.begin_block_scope();
            let o = b.declare_local(crate::ty::object());
            let made = b.emit_get_global(GlobalId(0));
            b.emit_set_local(o, made);
            b.end_block_scope(mark);
            b.terminate_ret_void();
            let f = b.build();
            let script = Script { strings: vec![], global_count: 1, functions: vec![f] };

            let mut globals = Globals::new(1);
            globals.set(GlobalId(0), Value::Ref(thrower));
            let mut out = Vec::new();
            let result = Interpreter::new(&script, &mut heap, &mut globals, &mut out).run_named("qmain");

            let raised = result.expect_err("a destructor raise with no enclosing try must propagate unhandled");
            assert_eq!(raised.message(&heap), "E");
        }

        /// S4 — `string s = "a"; try { s += throwing_expr(); } catch (e) {}`.
        /// `throwing_expr()` is modeled as allocating a temporary (as a real
        /// call's intermediate result would) and then an unrelated
        /// operation (division by zero) that always raises while that
        /// temporary is still registered on the cleanup stack — exercising
        /// the same "exception mid-evaluation" shape a real throwing call
        /// would produce. `s` is declared *before* the `try`, so this is
        /// also the regression case for the landing-pad scoping fixed
        /// above: entering `catch` must not release `s`.
        #[test]
        fn scenario_s4_try_catch_preserves_enclosing_local() {
            let mut strings = StringTable::new();
            let s0 = strings.intern("a");
            let s1 = strings.intern("partial");

            let mut b = Builder::new("qmain");
            let outer_mark = b.begin_block_scope();
            let s = b.declare_local(crate::ty::string());
            let a = b.emit_load_string(s0);
            b.emit_set_local(s, a);

            let catch_bb = b.create_block();
            let after_bb = b.create_block();
            b.begin_try(catch_bb);
            let try_mark = b.begin_block_scope();

            let partial = b.emit_load_string(s1);
            b.push_temp_cleanup(partial, crate::ty::string());
            let one = b.emit_int_constant(1);
            let zero = b.emit_int_constant(0);
            let div = op::table().lookup(OperatorKind::Div, crate::ty::int(), crate::ty::int()).unwrap();
            // Always raises (division by zero) while `partial` is still
            // registered for cleanup; unreachable on any non-raising path.
            b.emit_binary_operator(div, one, zero);
            b.pop_temp_cleanup(partial);
            b.emit_ref_dec(partial);
            b.end_block_scope(try_mark);
            b.end_try();
            b.terminate_jump(after_bb);

            b.set_current_block(catch_bb);
            b.emit_landing_pad();
            b.terminate_jump(after_bb);

            b.set_current_block(after_bb);
            let snapshot = b.emit_get_local(s);
            b.emit_ref_inc(snapshot);
            b.emit_set_global(GlobalId(0), snapshot);
            b.end_block_scope(outer_mark);
            b.terminate_ret_void();

            let f = b.build();
            let script = Script { strings: strings.into_vec(), global_count: 1, functions: vec![f] };
            let mut heap = Heap::new();
            let mut globals = Globals::new(1);
            let mut out = Vec::new();
            Interpreter::new(&script, &mut heap, &mut globals, &mut out).run_named("qmain").unwrap();

            let result = globals.get(GlobalId(0));
            assert_eq!(result.display(&heap), "a", "s must survive the try unchanged");
            crate::value::dec_ref(&mut heap, result).unwrap();
            assert_eq!(heap.live_count(), 0, "the throwing_expr temporary must not leak");
        }

        /// S5 — reader/writer global lock discipline (model-checked, not
        /// multithreaded: `Globals`' lock bookkeeping is single-threaded
        /// per spec.md §5). Two properties: overlapping a read and a write
        /// lock on the same global is rejected outright, and a read
        /// executed strictly before or strictly after a write observes a
        /// well-defined pre- or post-write value, never a mix of the two.
        #[test]
        fn scenario_s5_writer_cannot_acquire_while_reader_holds() {
            let mut globals = Globals::new(1);
            globals.begin_read(GlobalId(0));
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| globals.begin_write(GlobalId(0))));
            assert!(result.is_err(), "a writer must not acquire while a reader holds the lock");
        }

        #[test]
        fn scenario_s5_reader_cannot_acquire_while_writer_holds() {
            let mut globals = Globals::new(1);
            globals.begin_write(GlobalId(0));
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| globals.begin_read(GlobalId(0))));
            assert!(result.is_err(), "a reader must not acquire while a writer holds the lock");
        }

        #[test]
        fn scenario_s5_reader_observes_a_well_defined_pre_or_post_write_value() {
            let mut globals = Globals::new(1);
            globals.set(GlobalId(0), Value::Int(1));

            globals.begin_read(GlobalId(0));
            let pre = globals.get(GlobalId(0));
            globals.end_read(GlobalId(0));
            assert_eq!(pre, Value::Int(1), "a read before the write observes the pre-write value");

            globals.begin_write(GlobalId(0));
            globals.set(GlobalId(0), Value::Int(2));
            globals.end_write(GlobalId(0));

            globals.begin_read(GlobalId(0));
            let post = globals.get(GlobalId(0));
            globals.end_read(GlobalId(0));
            assert_eq!(post, Value::Int(2), "a read after the write observes the post-write value");
        }

        /// S6 — IR dump stability on the program of S2: the same typed
        /// program, analyzed and dumped twice independently, must produce
        /// byte-identical output (spec.md §8 invariant 6 / scenario S6).
        #[test]
        fn scenario_s6_dump_is_stable_across_independent_builds() {
            fn build_s2_script() -> Script {
                let mut strings = StringTable::new();
                let mut scope = MapScope::new();
                let mut reporter = CollectingReporter::new();
                let mut b = Builder::new("qmain");
                let decl = expr_stmt(AstExprKind::VarDecl {
                    name: "s".to_owned(),
                    declared_type: "string".to_owned(),
                    init: Some(Box::new(AstExpr::new(loc(), AstExprKind::StringLiteral("n=".to_owned())))),
                });
                let compound = expr_stmt(AstExprKind::CompoundAssign {
                    op: BinOp::Add,
                    target: Box::new(AstExpr::new(loc(), AstExprKind::Name("s".to_owned()))),
                    value: Box::new(AstExpr::new(loc(), AstExprKind::IntLiteral(7))),
                });
                stmt::analyze_block(&[decl, compound], &mut b, &mut scope, &mut strings, &mut reporter);
                b.terminate_ret_void();
                assert!(reporter.diagnostics.is_empty());
                let f = b.build();
                Script { strings: strings.into_vec(), global_count: 0, functions: vec![f] }
            }

            let first = crate::ir::printer::dump_script(&build_s2_script());
            let second = crate::ir::printer::dump_script(&build_s2_script());
            assert_eq!(first, second, "compiling and dumping the same program twice must be byte-identical");
            assert!(first.contains("load string str."));
            assert!(first.contains(&format!("binary operator {}", OperatorKind::Add)));
            assert!(first.contains(&format!("conversion {}", crate::conv::ConversionKind::IntToString)));
        }
    }
}
