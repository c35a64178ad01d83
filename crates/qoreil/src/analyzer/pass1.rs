//! Expression analyzer pass 1 (C5): AST expression → typed expression
//! tree, inserting implicit conversions and resolving names/operators/calls.
//!
//! Grounded on spec.md §4.5 verbatim for the resolution rules, and on
//! `original_source/lib/comp/sem/ExpressionAnalyzerPass1.cpp` /
//! `include/qore/analyzer/ExpressionAnalyzer.h` for the overall per-node
//! shape (one function per AST node kind, falling through to `Type::error()`
//! on any unresolvable name/operator/conversion rather than throwing).

use crate::ast::{AstExpr, AstExprKind, BinOp, SourceLocation};
use crate::conv::ConversionDescriptor;
use crate::ir::StringTable;
use crate::op::OperatorKind;
use crate::scope::{DiagnosticId, DiagnosticReporter, Scope, Symbol};
use crate::ty::Type;
use crate::typed::{FunctionRef, TypedExpr, TypedExprKind};

fn op_kind(op: BinOp) -> OperatorKind {
    match op {
        BinOp::Add => OperatorKind::Add,
        BinOp::Sub => OperatorKind::Sub,
        BinOp::Mul => OperatorKind::Mul,
        BinOp::Div => OperatorKind::Div,
        BinOp::Eq => OperatorKind::Eq,
        BinOp::Lt => OperatorKind::Lt,
    }
}

/// The type's natural zero value, used when a `VarDecl` has no initializer
/// (spec.md §4.5: "the initializer... or the type's default value").
fn default_value(ty: &'static Type, strings: &mut StringTable) -> TypedExpr {
    use crate::ty::TypeKind;
    match ty.kind() {
        TypeKind::Int | TypeKind::SoftInt => TypedExpr { ty, kind: TypedExprKind::IntLiteral(0) },
        TypeKind::String | TypeKind::SoftString => {
            TypedExpr { ty, kind: TypedExprKind::StringLiteral(strings.intern("")) }
        }
        _ if ty.accepts_nothing() => TypedExpr { ty, kind: TypedExprKind::Nothing },
        _ => TypedExpr::error(),
    }
}

/// Converts `expr` to `target`, inserting an `InvokeConversion` node if a
/// registered edge exists and isn't the identity, reporting
/// `SemaNoConversion` and substituting `Error` if none does. Widening to
/// `Any` is always free: `Any` shares the runtime `Value` representation
/// with every other type, so there is nothing to convert.
fn coerce(
    expr: TypedExpr,
    target: &'static Type,
    loc: SourceLocation,
    reporter: &mut dyn DiagnosticReporter,
) -> TypedExpr {
    if expr.is_error() || expr.ty == target || target == crate::ty::any() {
        return TypedExpr { ty: target, kind: expr.kind };
    }
    match crate::conv::table().lookup(expr.ty, target) {
        Some(desc) if desc.kind == crate::conv::ConversionKind::Identity => TypedExpr { ty: target, kind: expr.kind },
        Some(desc) => wrap_conversion(desc, expr),
        None => {
            reporter.report(
                DiagnosticId::SemaNoConversion,
                loc,
                format!("no conversion from '{}' to '{}'", expr.ty, target),
            );
            TypedExpr::error()
        }
    }
}

fn wrap_conversion(desc: ConversionDescriptor, arg: TypedExpr) -> TypedExpr {
    TypedExpr { ty: desc.to, kind: TypedExprKind::InvokeConversion { desc, arg: Box::new(arg) } }
}

/// Analyzes one AST expression node into its typed form.
pub fn analyze_expr(
    ast: &AstExpr,
    scope: &mut dyn Scope,
    strings: &mut StringTable,
    reporter: &mut dyn DiagnosticReporter,
) -> TypedExpr {
    match &ast.kind {
        AstExprKind::IntLiteral(v) => TypedExpr { ty: crate::ty::int(), kind: TypedExprKind::IntLiteral(*v) },
        AstExprKind::StringLiteral(s) => {
            TypedExpr { ty: crate::ty::string(), kind: TypedExprKind::StringLiteral(strings.intern(s)) }
        }
        AstExprKind::NothingLiteral => TypedExpr { ty: crate::ty::nothing(), kind: TypedExprKind::Nothing },
        AstExprKind::Name(name) => analyze_name(name, ast.location, scope, reporter),
        AstExprKind::VarDecl { name, declared_type, init } => {
            analyze_var_decl(name, declared_type, init.as_deref(), ast.location, scope, strings, reporter)
        }
        AstExprKind::Binary { op, left, right } => analyze_binary(*op, left, right, ast.location, scope, strings, reporter),
        AstExprKind::Assign { target, value } => analyze_assign(target, value, ast.location, scope, strings, reporter),
        AstExprKind::CompoundAssign { op, target, value } => {
            analyze_compound_assign(*op, target, value, ast.location, scope, strings, reporter)
        }
        AstExprKind::Call { callee, args } => analyze_call(callee, args, ast.location, scope, strings, reporter),
    }
}

fn analyze_name(
    name: &str,
    loc: SourceLocation,
    scope: &mut dyn Scope,
    reporter: &mut dyn DiagnosticReporter,
) -> TypedExpr {
    match scope.resolve_symbol(name) {
        Some(Symbol::Local(info)) => TypedExpr { ty: info.ty, kind: TypedExprKind::LocalRef(info) },
        Some(Symbol::Global(info)) => TypedExpr { ty: info.ty, kind: TypedExprKind::GlobalRef(info) },
        Some(Symbol::FunctionGroup(group)) => {
            TypedExpr { ty: crate::ty::function_group(), kind: TypedExprKind::FunctionGroupRef(group) }
        }
        None => {
            reporter.report(DiagnosticId::SemaUndeclaredIdentifier, loc, format!("undeclared identifier '{name}'"));
            TypedExpr::error()
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn analyze_var_decl(
    name: &str,
    declared_type: &str,
    init: Option<&AstExpr>,
    loc: SourceLocation,
    scope: &mut dyn Scope,
    strings: &mut StringTable,
    reporter: &mut dyn DiagnosticReporter,
) -> TypedExpr {
    let ty = scope.resolve_type(declared_type);
    let init_typed = match init {
        Some(e) => analyze_expr(e, scope, strings, reporter),
        None => default_value(ty, strings),
    };
    let init_coerced = coerce(init_typed, ty, loc, reporter);
    let info = scope.declare_local(name, ty);
    TypedExpr { ty, kind: TypedExprKind::LocalVariableInit { info, init: Box::new(init_coerced) } }
}

#[allow(clippy::too_many_arguments)]
fn analyze_binary(
    op: BinOp,
    left: &AstExpr,
    right: &AstExpr,
    loc: SourceLocation,
    scope: &mut dyn Scope,
    strings: &mut StringTable,
    reporter: &mut dyn DiagnosticReporter,
) -> TypedExpr {
    let l = analyze_expr(left, scope, strings, reporter);
    let r = analyze_expr(right, scope, strings, reporter);
    if l.is_error() || r.is_error() {
        return TypedExpr::error();
    }
    let kind = op_kind(op);
    match crate::op::table().lookup(kind, l.ty, r.ty) {
        Some(desc) => {
            let left_coerced = coerce(l, desc.left_type, loc, reporter);
            let right_coerced = coerce(r, desc.right_type, loc, reporter);
            TypedExpr {
                ty: desc.return_type,
                kind: TypedExprKind::InvokeBinaryOperator {
                    desc,
                    left: Box::new(left_coerced),
                    right: Box::new(right_coerced),
                },
            }
        }
        None => {
            reporter.report(
                DiagnosticId::SemaNoMatchingOperator,
                loc,
                format!("no matching operator for '{}' and '{}'", l.ty, r.ty),
            );
            TypedExpr::error()
        }
    }
}

fn analyze_assign(
    target: &AstExpr,
    value: &AstExpr,
    loc: SourceLocation,
    scope: &mut dyn Scope,
    strings: &mut StringTable,
    reporter: &mut dyn DiagnosticReporter,
) -> TypedExpr {
    let target_typed = analyze_expr(target, scope, strings, reporter);
    if !is_lvalue(&target_typed) {
        if !target_typed.is_error() {
            reporter.report(DiagnosticId::SemaInvalidAssignmentTarget, loc, "assignment target is not an lvalue".to_owned());
        }
        return TypedExpr::error();
    }
    let value_typed = analyze_expr(value, scope, strings, reporter);
    if value_typed.is_error() {
        return TypedExpr::error();
    }
    let value_coerced = coerce(value_typed, target_typed.ty, loc, reporter);
    let ty = target_typed.ty;
    TypedExpr { ty, kind: TypedExprKind::Assign { target: Box::new(target_typed), value: Box::new(value_coerced) } }
}

#[allow(clippy::too_many_arguments)]
fn analyze_compound_assign(
    op: BinOp,
    target: &AstExpr,
    value: &AstExpr,
    loc: SourceLocation,
    scope: &mut dyn Scope,
    strings: &mut StringTable,
    reporter: &mut dyn DiagnosticReporter,
) -> TypedExpr {
    let target_typed = analyze_expr(target, scope, strings, reporter);
    if !is_lvalue(&target_typed) {
        if !target_typed.is_error() {
            reporter.report(DiagnosticId::SemaInvalidAssignmentTarget, loc, "assignment target is not an lvalue".to_owned());
        }
        return TypedExpr::error();
    }
    let value_typed = analyze_expr(value, scope, strings, reporter);
    if value_typed.is_error() {
        return TypedExpr::error();
    }
    let kind = op_kind(op);
    match crate::op::table().lookup(kind, target_typed.ty, target_typed.ty) {
        Some(desc) => {
            let value_coerced = coerce(value_typed, desc.right_type, loc, reporter);
            TypedExpr {
                ty: desc.return_type,
                kind: TypedExprKind::CompoundAssign {
                    desc,
                    target: Box::new(target_typed),
                    value: Box::new(value_coerced),
                },
            }
        }
        None => {
            reporter.report(
                DiagnosticId::SemaNoMatchingOperator,
                loc,
                format!("no matching operator for '{}' and '{}'", target_typed.ty, target_typed.ty),
            );
            TypedExpr::error()
        }
    }
}

fn is_lvalue(e: &TypedExpr) -> bool {
    matches!(e.kind, TypedExprKind::LocalRef(_) | TypedExprKind::GlobalRef(_))
}

fn analyze_call(
    callee: &AstExpr,
    args: &[AstExpr],
    loc: SourceLocation,
    scope: &mut dyn Scope,
    strings: &mut StringTable,
    reporter: &mut dyn DiagnosticReporter,
) -> TypedExpr {
    let callee_typed = analyze_expr(callee, scope, strings, reporter);
    let args_typed: Vec<TypedExpr> = args.iter().map(|a| analyze_expr(a, scope, strings, reporter)).collect();
    if callee_typed.is_error() || args_typed.iter().any(TypedExpr::is_error) {
        return TypedExpr::error();
    }
    match &callee_typed.kind {
        TypedExprKind::FunctionGroupRef(group) => {
            let arg_types: Vec<&'static Type> = args_typed.iter().map(|a| a.ty).collect();
            match group.resolve_overload(&arg_types) {
                Some(overload) => {
                    let converted: Vec<TypedExpr> = args_typed
                        .into_iter()
                        .zip(overload.param_types.iter())
                        .map(|(a, p)| coerce(a, p, loc, reporter))
                        .collect();
                    TypedExpr {
                        ty: overload.return_type,
                        kind: TypedExprKind::Call {
                            function: FunctionRef::Overload { return_type: overload.return_type },
                            args: converted,
                        },
                    }
                }
                None => {
                    reporter.report(DiagnosticId::SemaNoMatchingOperator, loc, "no matching overload for call".to_owned());
                    TypedExpr::error()
                }
            }
        }
        _ if callee_typed.ty == crate::ty::any() => TypedExpr {
            ty: crate::ty::any(),
            kind: TypedExprKind::Call { function: FunctionRef::Dynamic, args: args_typed },
        },
        _ => {
            reporter.report(DiagnosticId::SemaNotCallable, loc, format!("'{}' is not callable", callee_typed.ty));
            TypedExpr::error()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AstExpr, AstExprKind};
    use crate::scope::{CollectingReporter, MapScope};

    fn loc() -> SourceLocation {
        SourceLocation::default()
    }

    #[test]
    fn int_literal_is_typed_int() {
        let mut scope = MapScope::new();
        let mut strings = StringTable::new();
        let mut reporter = CollectingReporter::new();
        let ast = AstExpr::new(loc(), AstExprKind::IntLiteral(5));
        let typed = analyze_expr(&ast, &mut scope, &mut strings, &mut reporter);
        assert_eq!(typed.ty, crate::ty::int());
        assert!(reporter.diagnostics.is_empty());
    }

    #[test]
    fn undeclared_name_reports_and_errors() {
        let mut scope = MapScope::new();
        let mut strings = StringTable::new();
        let mut reporter = CollectingReporter::new();
        let ast = AstExpr::new(loc(), AstExprKind::Name("missing".to_owned()));
        let typed = analyze_expr(&ast, &mut scope, &mut strings, &mut reporter);
        assert!(typed.is_error());
        assert_eq!(reporter.diagnostics[0].0, DiagnosticId::SemaUndeclaredIdentifier);
    }

    #[test]
    fn var_decl_without_init_gets_default_value() {
        let mut scope = MapScope::new();
        let mut strings = StringTable::new();
        let mut reporter = CollectingReporter::new();
        let ast = AstExpr::new(loc(), AstExprKind::VarDecl { name: "n".to_owned(), declared_type: "int".to_owned(), init: None });
        let typed = analyze_expr(&ast, &mut scope, &mut strings, &mut reporter);
        match typed.kind {
            TypedExprKind::LocalVariableInit { init, .. } => {
                assert!(matches!(init.kind, TypedExprKind::IntLiteral(0)));
            }
            _ => panic!("expected LocalVariableInit"),
        }
    }

    #[test]
    fn binary_add_resolves_int_operator() {
        let mut scope = MapScope::new();
        let mut strings = StringTable::new();
        let mut reporter = CollectingReporter::new();
        let ast = AstExpr::new(
            loc(),
            AstExprKind::Binary {
                op: BinOp::Add,
                left: Box::new(AstExpr::new(loc(), AstExprKind::IntLiteral(2))),
                right: Box::new(AstExpr::new(loc(), AstExprKind::IntLiteral(3))),
            },
        );
        let typed = analyze_expr(&ast, &mut scope, &mut strings, &mut reporter);
        assert_eq!(typed.ty, crate::ty::int());
        assert!(reporter.diagnostics.is_empty());
    }

    #[test]
    fn binary_no_matching_operator_reports() {
        let mut scope = MapScope::new();
        let mut strings = StringTable::new();
        let mut reporter = CollectingReporter::new();
        let ast = AstExpr::new(
            loc(),
            AstExprKind::Binary {
                op: BinOp::Add,
                left: Box::new(AstExpr::new(loc(), AstExprKind::VarDecl {
                    name: "o".to_owned(),
                    declared_type: "object".to_owned(),
                    init: None,
                })),
                right: Box::new(AstExpr::new(loc(), AstExprKind::IntLiteral(1))),
            },
        );
        let typed = analyze_expr(&ast, &mut scope, &mut strings, &mut reporter);
        assert!(typed.is_error());
        assert_eq!(reporter.diagnostics[0].0, DiagnosticId::SemaNoMatchingOperator);
    }

    #[test]
    fn assign_to_non_lvalue_reports() {
        let mut scope = MapScope::new();
        let mut strings = StringTable::new();
        let mut reporter = CollectingReporter::new();
        let ast = AstExpr::new(
            loc(),
            AstExprKind::Assign {
                target: Box::new(AstExpr::new(loc(), AstExprKind::IntLiteral(1))),
                value: Box::new(AstExpr::new(loc(), AstExprKind::IntLiteral(2))),
            },
        );
        let typed = analyze_expr(&ast, &mut scope, &mut strings, &mut reporter);
        assert!(typed.is_error());
        assert_eq!(reporter.diagnostics[0].0, DiagnosticId::SemaInvalidAssignmentTarget);
    }
}
