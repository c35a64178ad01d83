//! The AST contract (C9): the shape of tree the external parser hands to
//! the analyzer. This crate does not parse source text — nothing here
//! constructs an `Ast*` from a token stream; the parser is an external
//! collaborator (spec.md §1) and this module is only the interface it is
//! expected to conform to.
//!
//! Scope, per the design note in spec.md §9, uses one enum-of-structs
//! rather than a `Node` base class with a `Kind` tag and a visitor:
//! location lives on the outer struct, variant-specific payload on the
//! `Kind` enum.
//!
//! Grounded on `original_source/include/qore/comp/ast/Expression.h`'s
//! `Expression::Kind` list for which node shapes matter to analysis, cut
//! down to the subset spec.md §4.5-§4.7 actually lower (no lists, hashes,
//! casts, closures, `new`, `instanceof` — those are AST-recognized in the
//! full language but out of scope for this core per spec.md §1).

/// A position in source text. The scanner/parser own the real
/// line/column bookkeeping; the core only threads this through to
/// `DiagnosticReporter::report`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Lt,
}

#[derive(Debug, Clone)]
pub struct AstExpr {
    pub location: SourceLocation,
    pub kind: AstExprKind,
}

#[derive(Debug, Clone)]
pub enum AstExprKind {
    IntLiteral(i64),
    StringLiteral(String),
    NothingLiteral,
    /// A bare name reference; pass 1 asks the `Scope` what it resolves to.
    Name(String),
    /// `<type-name> <name> [= init]`, the declaration-with-optional-initializer
    /// form spec.md §4.5 lowers to a `LocalVariableInit` node.
    VarDecl { name: String, declared_type: String, init: Option<Box<AstExpr>> },
    Binary { op: BinOp, left: Box<AstExpr>, right: Box<AstExpr> },
    Assign { target: Box<AstExpr>, value: Box<AstExpr> },
    CompoundAssign { op: BinOp, target: Box<AstExpr>, value: Box<AstExpr> },
    Call { callee: Box<AstExpr>, args: Vec<AstExpr> },
}

#[derive(Debug, Clone)]
pub struct AstStmt {
    pub location: SourceLocation,
    pub kind: AstStmtKind,
}

#[derive(Debug, Clone)]
pub enum AstStmtKind {
    Expr(AstExpr),
    If { cond: AstExpr, then_block: Vec<AstStmt>, else_block: Option<Vec<AstStmt>> },
    While { cond: AstExpr, body: Vec<AstStmt> },
    Block(Vec<AstStmt>),
    Try { body: Vec<AstStmt>, catch_var: String, catch_body: Vec<AstStmt> },
    Return(Option<AstExpr>),
}

impl AstExpr {
    #[must_use]
    pub fn new(location: SourceLocation, kind: AstExprKind) -> Self {
        Self { location, kind }
    }
}

impl AstStmt {
    #[must_use]
    pub fn new(location: SourceLocation, kind: AstStmtKind) -> Self {
        Self { location, kind }
    }
}
