//! Pass 1's output (C5): a typed expression tree where every node
//! carries its resolved [`Type`] and implicit conversions have already
//! been made explicit as `Conversion` nodes (spec.md §4.5).
//!
//! Collapses the `original_source/include/qore/comp/sem/expr/*.h` family (one
//! header per node kind under a C++ class hierarchy —
//! `IntLiteralExpression`, `LocalVariableRefExpression`,
//! `InvokeBinaryOperatorExpression`, `InvokeConversionExpression`, ...)
//! into one enum, per the design note in spec.md §9.

use crate::conv::ConversionDescriptor;
use crate::op::BinaryOperatorDescriptor;
use crate::ty::Type;

#[derive(Debug, Clone)]
pub struct TypedExpr {
    pub ty: &'static Type,
    pub kind: TypedExprKind,
}

#[derive(Debug, Clone)]
pub enum TypedExprKind {
    IntLiteral(i64),
    /// Interned at parse/resolve time; pass 2 turns this into a
    /// `LoadString` of the given id.
    StringLiteral(crate::ir::StringId),
    Nothing,
    LocalRef(crate::scope::LocalVariableInfo),
    GlobalRef(crate::scope::GlobalVariableInfo),
    FunctionGroupRef(std::rc::Rc<dyn crate::scope::FunctionGroup>),
    /// `name` introduces a local of `info.ty`; `init` is the resolved
    /// initializer, already defaulted if the source omitted one
    /// (spec.md §4.5: "the initializer... or the type's default value").
    LocalVariableInit { info: crate::scope::LocalVariableInfo, init: Box<TypedExpr> },
    InvokeBinaryOperator { desc: BinaryOperatorDescriptor, left: Box<TypedExpr>, right: Box<TypedExpr> },
    InvokeConversion { desc: ConversionDescriptor, arg: Box<TypedExpr> },
    Assign { target: Box<TypedExpr>, value: Box<TypedExpr> },
    CompoundAssign { desc: BinaryOperatorDescriptor, target: Box<TypedExpr>, value: Box<TypedExpr> },
    Call { function: FunctionRef, args: Vec<TypedExpr> },
    /// An already-diagnosed expression; type is always `Type::error()`.
    /// Accepted silently everywhere downstream (spec.md §7).
    Error,
}

/// What a resolved call invokes. Runtime-dispatched calls (through `Any`
/// or a reference-to-function value) are noted but not lowered further —
/// spec.md §4.5 explicitly defers that case ("not detailed here").
///
/// Neither variant is lowered to IR by pass 2: spec.md §6's dump grammar
/// enumerates every instruction this core's IR has, and none of them is a
/// call/invoke. Calls are analyzed (type-checked, overload-resolved) for
/// completeness but — like closures, classes, and modules per spec.md §1's
/// Non-goals — are AST/typed-tree-recognized without being lowered
/// further; see DESIGN.md's Open Question decisions.
#[derive(Debug, Clone)]
pub enum FunctionRef {
    Overload { return_type: &'static Type },
    Dynamic,
}

impl TypedExpr {
    #[must_use]
    pub fn error() -> Self {
        Self { ty: crate::ty::error(), kind: TypedExprKind::Error }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.ty == crate::ty::error()
    }
}
