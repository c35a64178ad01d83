//! Expression analyzer pass 2 (C6) — emission. Lowers a typed expression
//! tree into IR via the [`crate::builder::Builder`]; this is "the heart of
//! the core" (spec.md §2's own description of C6's weight in the system).
//!
//! The three entry shapes and the reference-count discipline below are
//! spec.md §4.6 transcribed close to verbatim; the per-kind functions are
//! grounded on `original_source/include/qore/comp/sem/expr/*.h`
//! (`AssignmentExpression.h`, `InvokeBinaryOperatorExpression.h`,
//! `InvokeConversionExpression.h`, `LocalVariableInitExpression.h`) for
//! which node kind does which sequence of emissions.

use crate::ast::SourceLocation;
use crate::builder::Builder;
use crate::ir::{GlobalId, TempId};
use crate::op::BinaryOperatorDescriptor;
use crate::scope::DiagnosticId;
use crate::scope::DiagnosticReporter;
use crate::typed::{TypedExpr, TypedExprKind};

/// An acquired lvalue lock (spec.md §4.6). `None` for a local — locals
/// need no lock, only globals do. Dropping this without calling
/// [`LValueHandle::release`] is a contract violation: it would leave a
/// global locked forever, so `release` is the only way to consume it.
#[must_use]
pub struct LValueHandle(Option<GlobalId>);

impl LValueHandle {
    fn acquire(b: &mut Builder, target: &TypedExpr) -> Self {
        match &target.kind {
            TypedExprKind::GlobalRef(info) => {
                b.begin_write_lock(info.slot);
                Self(Some(info.slot))
            }
            TypedExprKind::LocalRef(_) => Self(None),
            _ => unreachable!("evalLValue called on a non-lvalue; pass 1 guarantees lvalue targets"),
        }
    }

    fn release(self, b: &mut Builder) {
        if self.0.is_some() {
            b.end_write_lock();
        }
    }
}

fn get_current(b: &mut Builder, target: &TypedExpr) -> TempId {
    match &target.kind {
        TypedExprKind::LocalRef(info) => b.emit_get_local(info.slot),
        TypedExprKind::GlobalRef(info) => b.emit_get_global(info.slot),
        _ => unreachable!("get_current called on a non-lvalue"),
    }
}

fn set_current(b: &mut Builder, target: &TypedExpr, src: TempId) {
    match &target.kind {
        TypedExprKind::LocalRef(info) => b.emit_set_local(info.slot, src),
        TypedExprKind::GlobalRef(info) => b.emit_set_global(info.slot, src),
        _ => unreachable!("set_current called on a non-lvalue"),
    }
}

/// `eval(dest, e)`: evaluates `e`, leaving its value in the returned temp.
/// The caller owns the `+1` reference on exit (spec.md §4.6).
pub fn eval(b: &mut Builder, e: &TypedExpr) -> TempId {
    match &e.kind {
        TypedExprKind::IntLiteral(v) => b.emit_int_constant(*v),
        TypedExprKind::StringLiteral(id) => b.emit_load_string(*id),
        // The IR has no dedicated "nothing constant" mnemonic (spec.md §6's
        // dump grammar lists none); `0` stands in as the placeholder
        // immediate. See DESIGN.md's Open Question decisions.
        TypedExprKind::Nothing => b.emit_int_constant(0),
        TypedExprKind::LocalRef(info) => {
            let t = b.emit_get_local(info.slot);
            if info.ty.is_ref_counted() {
                b.emit_ref_inc(t);
            }
            t
        }
        TypedExprKind::GlobalRef(info) => {
            b.emit_read_lock_global(info.slot);
            let t = b.emit_get_global(info.slot);
            if info.ty.is_ref_counted() {
                b.emit_ref_inc(t);
            }
            b.emit_read_unlock_global(info.slot);
            t
        }
        TypedExprKind::FunctionGroupRef(_) => {
            unreachable!("a bare function-group reference is not an evaluable value; only Call consumes it")
        }
        TypedExprKind::LocalVariableInit { info, init } => {
            b.register_local(info.slot, info.ty);
            let t_init = eval(b, init);
            if info.ty.is_ref_counted() {
                b.push_temp_cleanup(t_init, info.ty);
            }
            b.emit_set_local(info.slot, t_init);
            if info.ty.is_ref_counted() {
                b.pop_temp_cleanup(t_init); // ownership transferred into the local slot, no dec.
            }
            b.free_temp(t_init);
            let result = b.emit_get_local(info.slot);
            if info.ty.is_ref_counted() {
                b.emit_ref_inc(result);
            }
            result
        }
        TypedExprKind::InvokeBinaryOperator { desc, left, right } => eval_binary(b, *desc, left, right),
        TypedExprKind::InvokeConversion { desc, arg } => eval_conversion(b, *desc, arg),
        TypedExprKind::Assign { target, value } => eval_assign(b, target, value),
        TypedExprKind::CompoundAssign { desc, target, value } => eval_compound_assign(b, *desc, target, value),
        TypedExprKind::Call { .. } => {
            unimplemented!("calls are AST/typed-tree-recognized but not lowered by this core (spec.md §1 Non-goals)")
        }
        TypedExprKind::Error => unreachable!("Error-typed expressions must never reach pass 2"),
    }
}

fn eval_binary(b: &mut Builder, desc: BinaryOperatorDescriptor, left: &TypedExpr, right: &TypedExpr) -> TempId {
    let t_left = eval(b, left);
    if left.ty.is_ref_counted() {
        b.push_temp_cleanup(t_left, left.ty);
    }
    let t_right = eval(b, right);
    if right.ty.is_ref_counted() {
        b.push_temp_cleanup(t_right, right.ty);
    }
    let dest = b.emit_binary_operator(desc, t_left, t_right);
    if left.ty.is_ref_counted() {
        b.pop_temp_cleanup(t_left);
        b.emit_ref_dec(t_left);
    }
    if right.ty.is_ref_counted() {
        b.pop_temp_cleanup(t_right);
        b.emit_ref_dec(t_right);
    }
    b.free_temp(t_left);
    b.free_temp(t_right);
    dest
}

fn eval_conversion(b: &mut Builder, desc: crate::conv::ConversionDescriptor, arg: &TypedExpr) -> TempId {
    let t_arg = eval(b, arg);
    if arg.ty.is_ref_counted() {
        b.push_temp_cleanup(t_arg, arg.ty);
    }
    let dest = b.emit_conversion(desc, t_arg);
    if arg.ty.is_ref_counted() {
        b.pop_temp_cleanup(t_arg);
        b.emit_ref_dec(t_arg);
    }
    b.free_temp(t_arg);
    dest
}

/// `x = rhs` (spec.md §4.6's seven-step sequence, transcribed literally).
fn eval_assign(b: &mut Builder, target: &TypedExpr, value: &TypedExpr) -> TempId {
    let t_rhs = eval(b, value);
    let rhs_rc = value.ty.is_ref_counted();
    if rhs_rc {
        b.push_temp_cleanup(t_rhs, value.ty);
    }
    let handle = LValueHandle::acquire(b, target);
    let t_old = get_current(b, target);
    let target_rc = target.ty.is_ref_counted();
    if target_rc {
        b.push_temp_cleanup(t_old, target.ty);
    }
    set_current(b, target, t_rhs);
    if rhs_rc {
        b.pop_temp_cleanup(t_rhs); // ownership transferred into storage, no dec.
    }
    b.free_temp(t_rhs);
    handle.release(b);
    if target_rc {
        b.pop_temp_cleanup(t_old);
        b.emit_ref_dec(t_old);
    }
    b.free_temp(t_old);
    let result = get_current(b, target);
    if target_rc {
        b.emit_ref_inc(result);
    }
    result
}

/// `x += rhs` (spec.md §4.6).
fn eval_compound_assign(
    b: &mut Builder,
    desc: BinaryOperatorDescriptor,
    target: &TypedExpr,
    value: &TypedExpr,
) -> TempId {
    let t_rhs = eval(b, value);
    let rhs_rc = value.ty.is_ref_counted();
    if rhs_rc {
        b.push_temp_cleanup(t_rhs, value.ty);
    }
    let handle = LValueHandle::acquire(b, target);
    let t_old = get_current(b, target);
    let target_rc = target.ty.is_ref_counted();
    if target_rc {
        b.push_temp_cleanup(t_old, target.ty);
    }
    let t_new = b.emit_binary_operator(desc, t_old, t_rhs);
    set_current(b, target, t_new);
    handle.release(b);
    if target_rc {
        b.pop_temp_cleanup(t_old);
        b.emit_ref_dec(t_old);
    }
    b.free_temp(t_old);
    if rhs_rc {
        b.pop_temp_cleanup(t_rhs);
        b.emit_ref_dec(t_rhs);
    }
    b.free_temp(t_rhs);
    b.free_temp(t_new);
    let result = get_current(b, target);
    if target_rc {
        b.emit_ref_inc(result);
    }
    result
}

fn has_side_effect(kind: &TypedExprKind) -> bool {
    matches!(
        kind,
        TypedExprKind::Assign { .. }
            | TypedExprKind::CompoundAssign { .. }
            | TypedExprKind::Call { .. }
            | TypedExprKind::LocalVariableInit { .. }
    )
}

/// `eval(e)`: evaluates `e` discarding the result; reports
/// `SemaStatementHasNoEffect` instead of emitting anything if `e` has no
/// side effect (spec.md §4.6).
pub fn eval_discard(b: &mut Builder, e: &TypedExpr, loc: SourceLocation, reporter: &mut dyn DiagnosticReporter) {
    if e.is_error() {
        return;
    }
    if !has_side_effect(&e.kind) {
        reporter.report(DiagnosticId::SemaStatementHasNoEffect, loc, "statement has no effect".to_owned());
        return;
    }
    let t = eval(b, e);
    if e.ty.is_ref_counted() {
        b.emit_ref_dec(t);
    }
    b.free_temp(t);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::printer::dump_function;
    use crate::scope::{CollectingReporter, LocalVariableInfo, MapScope, Scope};

    #[test]
    fn int_literal_emits_one_instruction() {
        let mut b = Builder::new("f");
        let e = TypedExpr { ty: crate::ty::int(), kind: TypedExprKind::IntLiteral(5) };
        let t = eval(&mut b, &e);
        b.terminate_ret_void();
        let f = b.build();
        assert!(dump_function(&f).contains(&format!("temp.{} = int constant 5", t.0)));
    }

    #[test]
    fn assign_to_refcounted_local_round_trips_refcounts() {
        let mut scope = MapScope::new();
        let info: LocalVariableInfo = scope.declare_local("s", crate::ty::string());
        let mut b = Builder::new("f");
        b.register_local(info.slot, info.ty);
        let target = TypedExpr { ty: info.ty, kind: TypedExprKind::LocalRef(info) };
        let value = TypedExpr {
            ty: crate::ty::string(),
            kind: TypedExprKind::StringLiteral(crate::ir::StringId(0)),
        };
        let mut reporter = CollectingReporter::new();
        let assign = TypedExpr {
            ty: info.ty,
            kind: TypedExprKind::Assign { target: Box::new(target), value: Box::new(value) },
        };
        eval_discard(&mut b, &assign, SourceLocation::default(), &mut reporter);
        b.terminate_ret_void();
        let f = b.build();
        let dump = dump_function(&f);
        assert!(dump.contains("set local.0"));
        assert!(dump.contains("ref dec"));
        assert!(reporter.diagnostics.is_empty());
    }

    #[test]
    fn bare_literal_statement_has_no_effect() {
        let mut b = Builder::new("f");
        let mut reporter = CollectingReporter::new();
        let e = TypedExpr { ty: crate::ty::int(), kind: TypedExprKind::IntLiteral(1) };
        eval_discard(&mut b, &e, SourceLocation::default(), &mut reporter);
        assert_eq!(reporter.diagnostics[0].0, DiagnosticId::SemaStatementHasNoEffect);
    }
}
