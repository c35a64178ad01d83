//! Binary-operator registry (C2).
//!
//! Operators are selected in two phases (spec.md §4.2):
//!
//! 1. **Primitive-exact** — both operand types are concrete primitives
//!    listed in the table; return the direct descriptor.
//! 2. **Promotion** — either operand is `Any`; return the generic "any"
//!    operator, which dispatches at runtime.
//!
//! Ties are not allowed: the source language resolves them by inserting a
//! conversion during pass 1 rather than by operator-table precedence
//! (spec.md §4.2). If either operand type is already `Error`, lookup
//! returns `None` and the caller treats that as "already diagnosed, stay
//! silent" rather than reporting `SemaNoMatchingOperator` again (the Open
//! Question decision recorded in DESIGN.md).

use std::sync::OnceLock;

use ahash::AHashMap;

use crate::ty::Type;
use crate::value::{Heap, HeapId, Value};

/// Tags a [`BinaryOperatorDescriptor`] for the printer's
/// `binary operator <desc-id>` mnemonic and for table lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum OperatorKind {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Lt,
}

type BinaryFn = fn(&Value, &Value, &mut Heap) -> Result<Value, HeapId>;

#[derive(Clone, Copy)]
pub struct BinaryOperatorDescriptor {
    pub kind: OperatorKind,
    pub return_type: &'static Type,
    pub left_type: &'static Type,
    pub right_type: &'static Type,
    pub function: BinaryFn,
}

fn type_key(t: &'static Type) -> usize {
    std::ptr::from_ref(t) as usize
}

fn int_add(l: &Value, r: &Value, _heap: &mut Heap) -> Result<Value, HeapId> {
    let (Value::Int(l), Value::Int(r)) = (l, r) else { unreachable!() };
    Ok(Value::Int(l.wrapping_add(*r)))
}
fn int_sub(l: &Value, r: &Value, _heap: &mut Heap) -> Result<Value, HeapId> {
    let (Value::Int(l), Value::Int(r)) = (l, r) else { unreachable!() };
    Ok(Value::Int(l.wrapping_sub(*r)))
}
fn int_mul(l: &Value, r: &Value, _heap: &mut Heap) -> Result<Value, HeapId> {
    let (Value::Int(l), Value::Int(r)) = (l, r) else { unreachable!() };
    Ok(Value::Int(l.wrapping_mul(*r)))
}
fn int_div(l: &Value, r: &Value, heap: &mut Heap) -> Result<Value, HeapId> {
    let (Value::Int(l), Value::Int(r)) = (l, r) else { unreachable!() };
    if *r == 0 {
        return Err(heap.alloc_exception("division by zero", None));
    }
    Ok(Value::Int(l.wrapping_div(*r)))
}
fn int_eq(l: &Value, r: &Value, _heap: &mut Heap) -> Result<Value, HeapId> {
    let (Value::Int(l), Value::Int(r)) = (l, r) else { unreachable!() };
    Ok(Value::Bool(l == r))
}
fn int_lt(l: &Value, r: &Value, _heap: &mut Heap) -> Result<Value, HeapId> {
    let (Value::Int(l), Value::Int(r)) = (l, r) else { unreachable!() };
    Ok(Value::Bool(l < r))
}

fn string_concat(l: &Value, r: &Value, heap: &mut Heap) -> Result<Value, HeapId> {
    let (Value::Ref(l), Value::Ref(r)) = (l, r) else { unreachable!() };
    let crate::value::HeapData::Str(ls) = heap.data(*l) else { unreachable!() };
    let crate::value::HeapData::Str(rs) = heap.data(*r) else { unreachable!() };
    let mut out = ls.clone();
    out.push_str(rs);
    Ok(Value::Ref(heap.alloc_string(out)))
}

fn string_eq(l: &Value, r: &Value, heap: &mut Heap) -> Result<Value, HeapId> {
    let (Value::Ref(l), Value::Ref(r)) = (l, r) else { unreachable!() };
    let crate::value::HeapData::Str(ls) = heap.data(*l) else { unreachable!() };
    let crate::value::HeapData::Str(rs) = heap.data(*r) else { unreachable!() };
    Ok(Value::Bool(ls == rs))
}

/// Generic runtime-dispatch operator used when either operand has type
/// `Any`: it inspects the live values and falls back to a `TypeError`-like
/// exception when neither side is a type this registry knows how to add.
fn any_add(l: &Value, r: &Value, heap: &mut Heap) -> Result<Value, HeapId> {
    match (l, r) {
        (Value::Int(_), Value::Int(_)) => int_add(l, r, heap),
        (Value::Ref(a), Value::Ref(b))
            if matches!(heap.data(*a), crate::value::HeapData::Str(_))
                && matches!(heap.data(*b), crate::value::HeapData::Str(_)) =>
        {
            string_concat(l, r, heap)
        }
        _ => Err(heap.alloc_exception("unsupported operand types for +", None)),
    }
}

pub struct OperatorTable {
    exact: AHashMap<(OperatorKind, usize, usize), BinaryOperatorDescriptor>,
    any: AHashMap<OperatorKind, BinaryOperatorDescriptor>,
}

impl OperatorTable {
    fn new() -> Self {
        Self { exact: AHashMap::default(), any: AHashMap::default() }
    }

    fn register(&mut self, kind: OperatorKind, left: &'static Type, right: &'static Type, ret: &'static Type, function: BinaryFn) {
        self.exact.insert(
            (kind, type_key(left), type_key(right)),
            BinaryOperatorDescriptor { kind, return_type: ret, left_type: left, right_type: right, function },
        );
    }

    fn register_any(&mut self, kind: OperatorKind, function: BinaryFn) {
        self.any.insert(
            kind,
            BinaryOperatorDescriptor {
                kind,
                return_type: crate::ty::any(),
                left_type: crate::ty::any(),
                right_type: crate::ty::any(),
                function,
            },
        );
    }

    /// Implements the two-phase lookup from spec.md §4.2. Returns `None`
    /// when either operand is `Error` (propagate silently) or when no
    /// primitive-exact or promoted match exists (the caller reports
    /// `SemaNoMatchingOperator`).
    #[must_use]
    pub fn lookup(
        &self,
        kind: OperatorKind,
        left: &'static Type,
        right: &'static Type,
    ) -> Option<BinaryOperatorDescriptor> {
        if left == crate::ty::error() || right == crate::ty::error() {
            return None;
        }
        if let Some(d) = self.exact.get(&(kind, type_key(left), type_key(right))) {
            return Some(*d);
        }
        if left == crate::ty::any() || right == crate::ty::any() {
            return self.any.get(&kind).copied();
        }
        None
    }
}

#[must_use]
pub fn table() -> &'static OperatorTable {
    static TABLE: OnceLock<OperatorTable> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut t = OperatorTable::new();
        let int = crate::ty::int();
        let string = crate::ty::string();
        let bool_ = crate::ty::bool_();
        t.register(OperatorKind::Add, int, int, int, int_add);
        t.register(OperatorKind::Sub, int, int, int, int_sub);
        t.register(OperatorKind::Mul, int, int, int, int_mul);
        t.register(OperatorKind::Div, int, int, int, int_div);
        t.register(OperatorKind::Eq, int, int, bool_, int_eq);
        t.register(OperatorKind::Lt, int, int, bool_, int_lt);
        t.register(OperatorKind::Add, string, string, string, string_concat);
        t.register(OperatorKind::Eq, string, string, bool_, string_eq);
        t.register_any(OperatorKind::Add, any_add);
        t
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_wins_over_any() {
        let d = table().lookup(OperatorKind::Add, crate::ty::int(), crate::ty::int()).unwrap();
        assert_eq!(d.return_type, crate::ty::int());
    }

    #[test]
    fn any_promotion_dispatches_at_runtime() {
        let mut heap = Heap::new();
        let d = table().lookup(OperatorKind::Add, crate::ty::any(), crate::ty::int()).unwrap();
        let v = (d.function)(&Value::Int(2), &Value::Int(3), &mut heap).unwrap();
        assert_eq!(v, Value::Int(5));
    }

    #[test]
    fn error_type_suppresses_lookup() {
        assert!(table().lookup(OperatorKind::Add, crate::ty::error(), crate::ty::int()).is_none());
    }

    #[test]
    fn no_match_is_none() {
        assert!(table().lookup(OperatorKind::Add, crate::ty::object(), crate::ty::int()).is_none());
    }

    #[test]
    fn string_concat_allocates_new_string() {
        let mut heap = Heap::new();
        let a = Value::Ref(heap.alloc_string("a"));
        let b = Value::Ref(heap.alloc_string("b"));
        let d = table().lookup(OperatorKind::Add, crate::ty::string(), crate::ty::string()).unwrap();
        let v = (d.function)(&a, &b, &mut heap).unwrap();
        assert_eq!(v.display(&heap), "ab");
    }
}
