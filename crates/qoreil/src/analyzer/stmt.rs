//! Statement analyzer (C7): AST statement → IR. Straight-line statements
//! delegate their expression to pass 2 (C6); control statements create
//! the basic blocks and manage the block-scope/try-catch bookkeeping
//! themselves (spec.md §4.7, transcribed close to verbatim below).
//!
//! Grounded on `original_source/include/qore/ir/stmt` (via `_INDEX.md`:
//! `ExpressionStatement`/`EmptyStatement`/conditional & loop statement
//! shapes) for which AST node maps to which block layout.

use crate::analyzer::{pass1, pass2};
use crate::ast::{AstExpr, AstStmt, AstStmtKind};
use crate::builder::{Builder, ScopeMark};
use crate::ir::StringTable;
use crate::scope::{DiagnosticReporter, Scope};

/// Analyzes a sequence of statements that share one block scope: records
/// the cleanup-stack high-water-mark on entry, unwinds back to it on
/// exit (spec.md §4.7's "Block scope" rule).
pub fn analyze_block(
    stmts: &[AstStmt],
    b: &mut Builder,
    scope: &mut dyn Scope,
    strings: &mut StringTable,
    reporter: &mut dyn DiagnosticReporter,
) {
    let mark = b.begin_block_scope();
    for stmt in stmts {
        analyze_stmt(stmt, b, scope, strings, reporter);
    }
    b.end_block_scope(mark);
}

fn analyze_expr(
    e: &AstExpr,
    b: &mut Builder,
    scope: &mut dyn Scope,
    strings: &mut StringTable,
    reporter: &mut dyn DiagnosticReporter,
) -> crate::typed::TypedExpr {
    pass1::analyze_expr(e, scope, strings, reporter)
}

pub fn analyze_stmt(
    stmt: &AstStmt,
    b: &mut Builder,
    scope: &mut dyn Scope,
    strings: &mut StringTable,
    reporter: &mut dyn DiagnosticReporter,
) {
    match &stmt.kind {
        AstStmtKind::Expr(e) => {
            let typed = analyze_expr(e, b, scope, strings, reporter);
            pass2::eval_discard(b, &typed, stmt.location, reporter);
        }
        AstStmtKind::Block(inner) => analyze_block(inner, b, scope, strings, reporter),
        AstStmtKind::If { cond, then_block, else_block } => {
            analyze_if(cond, then_block, else_block.as_deref(), b, scope, strings, reporter);
        }
        AstStmtKind::While { cond, body } => analyze_while(cond, body, b, scope, strings, reporter),
        AstStmtKind::Try { body, catch_var, catch_body } => {
            analyze_try(body, catch_var, catch_body, b, scope, strings, reporter);
        }
        AstStmtKind::Return(value) => analyze_return(value.as_ref(), b, scope, strings, reporter),
    }
}

fn analyze_if(
    cond: &AstExpr,
    then_block: &[AstStmt],
    else_block: Option<&[AstStmt]>,
    b: &mut Builder,
    scope: &mut dyn Scope,
    strings: &mut StringTable,
    reporter: &mut dyn DiagnosticReporter,
) {
    let cond_typed = analyze_expr(cond, b, scope, strings, reporter);
    let cond_temp = pass2::eval(b, &cond_typed);

    let then_bb = b.create_block();
    let else_bb = b.create_block();
    let merge_bb = b.create_block();
    b.terminate_cond_jump(cond_temp, then_bb, else_bb);

    b.set_current_block(then_bb);
    analyze_block(then_block, b, scope, strings, reporter);
    b.terminate_jump(merge_bb);

    b.set_current_block(else_bb);
    if let Some(else_stmts) = else_block {
        analyze_block(else_stmts, b, scope, strings, reporter);
    }
    b.terminate_jump(merge_bb);

    b.set_current_block(merge_bb);
}

fn analyze_while(
    cond: &AstExpr,
    body: &[AstStmt],
    b: &mut Builder,
    scope: &mut dyn Scope,
    strings: &mut StringTable,
    reporter: &mut dyn DiagnosticReporter,
) {
    let head_bb = b.create_block();
    let body_bb = b.create_block();
    let exit_bb = b.create_block();

    b.terminate_jump(head_bb);

    b.set_current_block(head_bb);
    let cond_typed = analyze_expr(cond, b, scope, strings, reporter);
    let cond_temp = pass2::eval(b, &cond_typed);
    b.terminate_cond_jump(cond_temp, body_bb, exit_bb);

    b.set_current_block(body_bb);
    analyze_block(body, b, scope, strings, reporter);
    b.terminate_jump(head_bb);

    b.set_current_block(exit_bb);
}

fn analyze_try(
    body: &[AstStmt],
    catch_var: &str,
    catch_body: &[AstStmt],
    b: &mut Builder,
    scope: &mut dyn Scope,
    strings: &mut StringTable,
    reporter: &mut dyn DiagnosticReporter,
) {
    let catch_bb = b.create_block();
    let after_bb = b.create_block();

    b.begin_try(catch_bb);
    let mark: ScopeMark = b.begin_block_scope();
    for s in body {
        analyze_stmt(s, b, scope, strings, reporter);
    }
    b.end_block_scope(mark);
    b.end_try();
    b.terminate_jump(after_bb);

    // The catch block's entry is itself a landing pad: it binds the
    // in-flight exception to the user's catch variable (spec.md §4.7:
    // "jumps to the catch's `LandingPad` entry which binds the exception
    // temp to the user's catch variable").
    b.set_current_block(catch_bb);
    let exception_ty = crate::ty::object();
    let exception_local = scope.declare_local(catch_var, exception_ty);
    b.register_local(exception_local.slot, exception_ty);
    let exception_temp = b.emit_landing_pad();
    b.emit_set_local(exception_local.slot, exception_temp);
    b.free_temp(exception_temp);
    analyze_block(catch_body, b, scope, strings, reporter);
    b.terminate_jump(after_bb);

    b.set_current_block(after_bb);
}

fn analyze_return(
    value: Option<&AstExpr>,
    b: &mut Builder,
    scope: &mut dyn Scope,
    strings: &mut StringTable,
    reporter: &mut dyn DiagnosticReporter,
) {
    // Cleanup for enclosing block scopes is emitted by each scope's own
    // `end_block_scope` as control unwinds back out to the function's
    // top level; here we only need to evaluate the value (if any,
    // currently unused beyond side effects since this core has no
    // return-value plumbing) and terminate.
    if let Some(v) = value {
        let typed = analyze_expr(v, b, scope, strings, reporter);
        if !typed.is_error() {
            let t = pass2::eval(b, &typed);
            if typed.ty.is_ref_counted() {
                b.emit_ref_dec(t);
            }
            b.free_temp(t);
        }
    }
    b.terminate_ret_void();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AstExprKind, SourceLocation};
    use crate::ir::printer::dump_function;
    use crate::scope::{CollectingReporter, MapScope};

    fn loc() -> SourceLocation {
        SourceLocation::default()
    }

    #[test]
    fn if_without_else_still_has_three_blocks() {
        let mut scope = MapScope::new();
        let mut strings = StringTable::new();
        let mut reporter = CollectingReporter::new();
        let mut b = Builder::new("f");
        let cond = AstExpr::new(loc(), AstExprKind::IntLiteral(1));
        analyze_if(&cond, &[], None, &mut b, &mut scope, &mut strings, &mut reporter);
        b.terminate_ret_void();
        let f = b.build();
        assert_eq!(f.blocks.len(), 4); // entry + then + else + merge
    }

    #[test]
    fn while_loop_jumps_back_to_head() {
        let mut scope = MapScope::new();
        let mut strings = StringTable::new();
        let mut reporter = CollectingReporter::new();
        let mut b = Builder::new("f");
        let cond = AstExpr::new(loc(), AstExprKind::IntLiteral(0));
        analyze_while(&cond, &[], &mut b, &mut scope, &mut strings, &mut reporter);
        b.terminate_ret_void();
        let f = b.build();
        let dump = dump_function(&f);
        assert!(dump.contains("cond jump"));
    }

    #[test]
    fn try_catch_binds_exception_to_catch_variable() {
        let mut scope = MapScope::new();
        let mut strings = StringTable::new();
        let mut reporter = CollectingReporter::new();
        let mut b = Builder::new("f");
        let throwing = AstStmt::new(
            loc(),
            AstStmtKind::Expr(AstExpr::new(
                loc(),
                AstExprKind::VarDecl { name: "z".to_owned(), declared_type: "int".to_owned(), init: None },
            )),
        );
        analyze_try(&[throwing], "e", &[], &mut b, &mut scope, &mut strings, &mut reporter);
        b.terminate_ret_void();
        let f = b.build();
        assert!(dump_function(&f).contains("landing pad"));
    }

    #[test]
    fn block_scope_exit_pops_its_own_locals_only() {
        let mut scope = MapScope::new();
        let mut strings = StringTable::new();
        let mut reporter = CollectingReporter::new();
        let mut b = Builder::new("f");
        let decl = AstStmt::new(
            loc(),
            AstStmtKind::Expr(AstExpr::new(
                loc(),
                AstExprKind::VarDecl {
                    name: "s".to_owned(),
                    declared_type: "string".to_owned(),
                    init: Some(Box::new(AstExpr::new(loc(), AstExprKind::StringLiteral("a".to_owned())))),
                },
            )),
        );
        analyze_block(std::slice::from_ref(&decl), &mut b, &mut scope, &mut strings, &mut reporter);
        b.terminate_ret_void();
        assert!(!reporter.diagnostics.iter().any(|(id, ..)| *id == crate::scope::DiagnosticId::SemaStatementHasNoEffect));
    }
}
