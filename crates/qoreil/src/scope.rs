//! External-interface contracts consumed by the core (C9, spec.md §4.9):
//! `Scope`, `FunctionGroup`, and `DiagnosticReporter`. The real
//! implementations (name resolution, a diagnostic sink writing to a
//! terminal or an IDE) live outside this crate; what's here is the trait
//! boundary plus a minimal concrete implementation of each, the way
//! `ouros`'s `resource.rs` ships `ResourceTracker` alongside
//! `NoLimitTracker`.
//!
//! Grounded on `original_source/include/qore/comp/sem/Scope.h`
//! (`Scope::resolve`, `BlockScope::declareLocalVariable`),
//! `FunctionGroupInfo.h`, and `DiagManager.h`.

use ahash::AHashMap;

use crate::ast::SourceLocation;
use crate::ty::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalVariableInfo {
    pub slot: crate::ir::LocalId,
    pub ty: &'static Type,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalVariableInfo {
    pub slot: crate::ir::GlobalId,
    pub ty: &'static Type,
}

/// What a name resolves to (spec.md §4.5: "local, global, or function-group").
/// The function-group payload is the overload set itself (spec.md §4.9's
/// `Symbol {kind, payload}`), not just an id, so pass 1 can resolve a call
/// directly off a resolved name without a second scope lookup.
#[derive(Clone)]
pub enum Symbol {
    Local(LocalVariableInfo),
    Global(GlobalVariableInfo),
    FunctionGroup(std::rc::Rc<dyn FunctionGroup>),
}

impl std::fmt::Debug for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(l) => f.debug_tuple("Local").field(l).finish(),
            Self::Global(g) => f.debug_tuple("Global").field(g).finish(),
            Self::FunctionGroup(_) => f.write_str("FunctionGroup(..)"),
        }
    }
}

/// A resolved overload: the chosen function's parameter types (used to
/// build per-argument conversions) and its return type.
#[derive(Debug, Clone)]
pub struct Overload {
    pub param_types: Vec<&'static Type>,
    pub return_type: &'static Type,
}

/// `FunctionGroup::resolveOverload` (spec.md §4.9): picks the best-match
/// overload for a call's argument types, or fails with a diagnostic.
pub trait FunctionGroup {
    fn resolve_overload(&self, arg_types: &[&'static Type]) -> Option<Overload>;
}

/// `Scope::resolveType` / `resolveSymbol` / `declareLocal` (spec.md §4.9).
/// A `Scope` also owns the block-scope nesting the statement analyzer (C7)
/// walks into and back out of.
pub trait Scope {
    fn resolve_type(&self, name: &str) -> &'static Type;
    fn resolve_symbol(&self, name: &str) -> Option<Symbol>;
    /// Mints a fresh `LocalId` and records `name` as resolving to it from
    /// this point on (spec.md §4.9: `declareLocal(name, type) ->
    /// LocalVariableInfo&`). Pass 2 later tells the `Builder` about the
    /// same id via `Builder::register_local` so the cleanup stack and the
    /// function's local count agree with what pass 1 allocated.
    fn declare_local(&mut self, name: &str, ty: &'static Type) -> LocalVariableInfo;
}

/// Stable, renderable identifiers the analyzer reports by (spec.md §6's
/// partial list). `strum::Display` gives each variant its own name as a
/// string, matching `ExcType`'s pattern in the teacher's
/// `exception_private.rs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum DiagnosticId {
    ParserUnexpectedToken,
    ScannerInvalidCharacter,
    PdpUnknownDirective,
    PdpMissingArgument,
    SemaStatementHasNoEffect,
    SemaUndeclaredIdentifier,
    SemaNoMatchingOperator,
    SemaNoConversion,
    /// Not in spec.md §6's partial list; added for assignment to a
    /// non-lvalue expression, which that list doesn't name a diagnostic
    /// for. The list is explicitly partial ("a partial list").
    SemaInvalidAssignmentTarget,
    /// Likewise supplemental: a call whose callee resolves to neither a
    /// function group nor a dynamically-dispatchable value.
    SemaNotCallable,
}

/// `DiagnosticReporter::report` (spec.md §4.9). User-facing errors go
/// through here rather than `Result`/panic (spec.md §7: "the analyzer
/// never throws for user errors").
pub trait DiagnosticReporter {
    fn report(&mut self, id: DiagnosticId, location: SourceLocation, message: String);
}

/// A flat, single-block-scope `Scope` good enough for the test corpus and
/// the CLI demo: no nested lexical scoping, no real name-table namespace
/// layering. Real scoping is the namespace resolver's job (an external
/// collaborator per spec.md §1), not this core's.
#[derive(Debug, Default)]
pub struct MapScope {
    names: AHashMap<String, Symbol>,
    next_local: u32,
}

impl MapScope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, symbol: Symbol) {
        self.names.insert(name.into(), symbol);
    }
}

impl Scope for MapScope {
    fn resolve_type(&self, name: &str) -> &'static Type {
        match name {
            "int" => crate::ty::int(),
            "string" => crate::ty::string(),
            "bool" => crate::ty::bool_(),
            "any" => crate::ty::any(),
            "object" => crate::ty::object(),
            _ => crate::ty::error(),
        }
    }

    fn resolve_symbol(&self, name: &str) -> Option<Symbol> {
        self.names.get(name).cloned()
    }

    fn declare_local(&mut self, name: &str, ty: &'static Type) -> LocalVariableInfo {
        let info = LocalVariableInfo { slot: crate::ir::LocalId(self.next_local), ty };
        self.next_local += 1;
        self.names.insert(name.to_owned(), Symbol::Local(info));
        info
    }
}

/// Collects diagnostics in memory instead of printing them, for tests
/// that assert on exactly which diagnostics a program produces.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    pub diagnostics: Vec<(DiagnosticId, SourceLocation, String)>,
}

impl CollectingReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DiagnosticReporter for CollectingReporter {
    fn report(&mut self, id: DiagnosticId, location: SourceLocation, message: String) {
        self.diagnostics.push((id, location, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_scope_resolves_declared_locals() {
        let mut scope = MapScope::new();
        let info = scope.declare_local("n", crate::ty::int());
        match scope.resolve_symbol("n") {
            Some(Symbol::Local(l)) => assert_eq!(l.slot, info.slot),
            _ => panic!("expected a local symbol"),
        }
    }

    #[test]
    fn map_scope_mints_distinct_slots() {
        let mut scope = MapScope::new();
        let a = scope.declare_local("a", crate::ty::int());
        let b = scope.declare_local("b", crate::ty::int());
        assert_ne!(a.slot, b.slot);
    }

    #[test]
    fn unresolved_type_name_is_error() {
        let scope = MapScope::new();
        assert_eq!(scope.resolve_type("bogus"), crate::ty::error());
    }

    #[test]
    fn collecting_reporter_records_in_order() {
        let mut reporter = CollectingReporter::new();
        reporter.report(DiagnosticId::SemaUndeclaredIdentifier, SourceLocation::default(), "x".to_owned());
        reporter.report(DiagnosticId::SemaNoMatchingOperator, SourceLocation::default(), "y".to_owned());
        assert_eq!(reporter.diagnostics.len(), 2);
        assert_eq!(reporter.diagnostics[0].0, DiagnosticId::SemaUndeclaredIdentifier);
    }
}
