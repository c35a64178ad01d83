//! Conversion registry (C2).
//!
//! Conversions form a small directed graph with [`ConversionKind::Identity`]
//! as the reflexive edge on every type. The analyzer never chains
//! conversions: if no direct edge exists between two types, pass 1 (C5)
//! reports `SemaNoConversion` and substitutes `Type::error()` rather than
//! searching for an intermediate type (spec.md §4.2).
//!
//! Grounded on the process-wide-singleton-table design note in spec.md §9;
//! the table itself is populated once, the same way the original's
//! `qore/rt/Meta.h` registers conversion functions at startup.

use std::sync::OnceLock;

use ahash::AHashMap;

use crate::ty::Type;
use crate::value::{Heap, HeapId, Value};

/// Tags a [`ConversionDescriptor`] for the printer's `conversion <kind>`
/// mnemonic (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ConversionKind {
    Identity,
    IntToString,
    StringToInt,
    IntToSoftString,
    StringToSoftInt,
}

type ConvertFn = fn(Value, &mut Heap) -> Result<Value, HeapId>;

/// A single conversion edge: `function` maps a value of `from` to a value
/// of `to`. May raise (e.g. `"abc"` to `int` in a stricter dialect); this
/// registry's conversions never do, but [`crate::ir::Instruction::Conversion`]
/// still carries an optional landing pad for dialects that add one.
#[derive(Clone, Copy)]
pub struct ConversionDescriptor {
    pub kind: ConversionKind,
    pub from: &'static Type,
    pub to: &'static Type,
    pub function: ConvertFn,
}

fn type_key(t: &'static Type) -> usize {
    std::ptr::from_ref(t) as usize
}

fn identity_fn(v: Value, _heap: &mut Heap) -> Result<Value, HeapId> {
    Ok(v)
}

fn int_to_string(v: Value, heap: &mut Heap) -> Result<Value, HeapId> {
    let Value::Int(i) = v else { unreachable!("registered only for Int sources") };
    Ok(Value::Ref(heap.alloc_string(i.to_string())))
}

fn string_to_int(v: Value, heap: &mut Heap) -> Result<Value, HeapId> {
    let Value::Ref(id) = v else { unreachable!("registered only for String sources") };
    let crate::value::HeapData::Str(s) = heap.data(id) else {
        unreachable!("String-typed value always points at Str heap data")
    };
    // Qore's soft-int coercion parses a numeric prefix and defaults to 0,
    // it never raises; this mirrors that rather than Rust's strict `parse`.
    let parsed = s
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '-' || *c == '+')
        .collect::<String>()
        .parse::<i64>()
        .unwrap_or(0);
    dec_ref_owned(heap, id);
    Ok(Value::Int(parsed))
}

fn dec_ref_owned(heap: &mut Heap, id: HeapId) {
    crate::value::dec_ref(heap, Value::Ref(id)).expect("string destructors never raise");
}

/// Maps `(from, to)` identity-pointer pairs to the registered conversion.
pub struct ConversionTable {
    edges: AHashMap<(usize, usize), ConversionDescriptor>,
}

impl ConversionTable {
    fn new() -> Self {
        Self { edges: AHashMap::default() }
    }

    fn register(&mut self, kind: ConversionKind, from: &'static Type, to: &'static Type, function: ConvertFn) {
        self.edges
            .insert((type_key(from), type_key(to)), ConversionDescriptor { kind, from, to, function });
    }

    /// Direct-edge lookup only; never chains through an intermediate type.
    #[must_use]
    pub fn lookup(&self, from: &'static Type, to: &'static Type) -> Option<ConversionDescriptor> {
        if from == to {
            return Some(ConversionDescriptor { kind: ConversionKind::Identity, from, to, function: identity_fn });
        }
        self.edges.get(&(type_key(from), type_key(to))).copied()
    }
}

/// The process-wide conversion table, built once on first use.
#[must_use]
pub fn table() -> &'static ConversionTable {
    static TABLE: OnceLock<ConversionTable> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut t = ConversionTable::new();
        t.register(ConversionKind::IntToString, crate::ty::int(), crate::ty::string(), int_to_string);
        t.register(ConversionKind::IntToSoftString, crate::ty::int(), crate::ty::soft_string(), int_to_string);
        t.register(ConversionKind::StringToInt, crate::ty::string(), crate::ty::int(), string_to_int);
        t.register(ConversionKind::StringToSoftInt, crate::ty::string(), crate::ty::soft_int(), string_to_int);
        t
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_always_available() {
        let d = table().lookup(crate::ty::int(), crate::ty::int()).unwrap();
        assert_eq!(d.kind, ConversionKind::Identity);
    }

    #[test]
    fn int_to_string_allocates() {
        let mut heap = Heap::new();
        let d = table().lookup(crate::ty::int(), crate::ty::string()).unwrap();
        let v = (d.function)(Value::Int(7), &mut heap).unwrap();
        assert_eq!(v.display(&heap), "7");
    }

    #[test]
    fn no_edge_returns_none() {
        assert!(table().lookup(crate::ty::object(), crate::ty::int()).is_none());
    }

    #[test]
    fn never_chains_through_intermediate() {
        // Object -> String has no direct edge even though nothing stops a
        // hypothetical Object -> Int -> String chain; the registry must
        // not synthesize one.
        assert!(table().lookup(crate::ty::object(), crate::ty::string()).is_none());
    }
}
