//! Type descriptors (C1).
//!
//! A [`Type`] is a shared, identity-equal descriptor: the same logical type
//! (say, `Int`) is always the same `&'static Type`, so comparing types is a
//! pointer comparison. This mirrors the source language's singleton type
//! objects (see `original_source/include/qore/core/Type.h`) and the design
//! note in spec.md §9 to model such singletons as immutable, process-wide
//! tables initialized once rather than thread-local state.

use std::fmt;
use std::sync::OnceLock;

/// The kind tag carried by every [`Type`].
///
/// `Error` is a sentinel used by analysis to suppress cascading
/// diagnostics: once an expression's type is `Error`, every operator and
/// conversion lookup involving it silently yields `Error` again instead of
/// reporting a second diagnostic (see spec.md §4.2 and the Open Question
/// decision recorded in DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum TypeKind {
    Error,
    Any,
    Nothing,
    Bool,
    SoftBool,
    Int,
    IntOpt,
    SoftInt,
    String,
    StringOpt,
    SoftString,
    Object,
    ObjectOpt,
    FunctionGroup,
}

/// A shared type descriptor. Equality is identity (`ptr::eq` on the name),
/// never structural — two `Type` values with the same `kind` are only the
/// same type if they are the same singleton instance.
#[derive(Debug)]
pub struct Type {
    name: &'static str,
    kind: TypeKind,
}

impl Type {
    #[must_use]
    pub const fn kind(&self) -> TypeKind {
        self.kind
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// True unless this type is a non-refcounted primitive or `Nothing`.
    ///
    /// Drives whether the builder (C4) registers a value of this type on
    /// the cleanup stack and whether pass 2 (C6) emits `RefInc`/`RefDec`
    /// around it.
    #[must_use]
    pub const fn is_ref_counted(&self) -> bool {
        !matches!(
            self.kind,
            TypeKind::Nothing
                | TypeKind::Bool
                | TypeKind::SoftBool
                | TypeKind::Int
                | TypeKind::SoftInt
                | TypeKind::Error
                | TypeKind::Any
        )
    }

    /// True for `Any`, `Nothing`, the `*T` optional forms, and `Error`.
    #[must_use]
    pub const fn accepts_nothing(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Any
                | TypeKind::Nothing
                | TypeKind::IntOpt
                | TypeKind::StringOpt
                | TypeKind::ObjectOpt
                | TypeKind::Error
        )
    }

    /// "Soft" types (`SoftInt`, `SoftString`, `SoftBool`) are parameter-only
    /// conversion targets: they trigger an implicit conversion from a
    /// compatible scalar but must never be the inferred type of an
    /// expression (spec.md §9).
    #[must_use]
    pub const fn is_soft(&self) -> bool {
        matches!(self.kind, TypeKind::SoftBool | TypeKind::SoftInt | TypeKind::SoftString)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}
impl Eq for Type {}

macro_rules! singleton {
    ($fn_name:ident, $cell:ident, $name:literal, $kind:expr) => {
        #[must_use]
        pub fn $fn_name() -> &'static Type {
            static $cell: OnceLock<Type> = OnceLock::new();
            $cell.get_or_init(|| Type { name: $name, kind: $kind })
        }
    };
}

singleton!(error, ERROR, "error", TypeKind::Error);
singleton!(any, ANY, "any", TypeKind::Any);
singleton!(nothing, NOTHING, "nothing", TypeKind::Nothing);
singleton!(bool_, BOOL, "bool", TypeKind::Bool);
singleton!(soft_bool, SOFT_BOOL, "softbool", TypeKind::SoftBool);
singleton!(int, INT, "int", TypeKind::Int);
singleton!(int_opt, INT_OPT, "*int", TypeKind::IntOpt);
singleton!(soft_int, SOFT_INT, "softint", TypeKind::SoftInt);
singleton!(string, STRING, "string", TypeKind::String);
singleton!(string_opt, STRING_OPT, "*string", TypeKind::StringOpt);
singleton!(soft_string, SOFT_STRING, "softstring", TypeKind::SoftString);
singleton!(object, OBJECT, "object", TypeKind::Object);
singleton!(object_opt, OBJECT_OPT, "*object", TypeKind::ObjectOpt);
singleton!(function_group, FUNCTION_GROUP, "function-group", TypeKind::FunctionGroup);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_equality() {
        assert_eq!(int(), int());
        assert_ne!(int() as *const _, string() as *const _);
    }

    #[test]
    fn ref_counted_predicate() {
        assert!(!int().is_ref_counted());
        assert!(!bool_().is_ref_counted());
        assert!(!nothing().is_ref_counted());
        assert!(!any().is_ref_counted());
        assert!(string().is_ref_counted());
        assert!(object().is_ref_counted());
    }

    #[test]
    fn accepts_nothing_predicate() {
        assert!(any().accepts_nothing());
        assert!(nothing().accepts_nothing());
        assert!(int_opt().accepts_nothing());
        assert!(error().accepts_nothing());
        assert!(!int().accepts_nothing());
        assert!(!string().accepts_nothing());
    }

    #[test]
    fn soft_types_are_never_inferred_targets_only() {
        assert!(soft_int().is_soft());
        assert!(soft_string().is_soft());
        assert!(soft_bool().is_soft());
        assert!(!int().is_soft());
    }
}
