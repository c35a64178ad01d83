//! Runtime value representation and a minimal reference-counted heap (C1).
//!
//! spec.md §3 describes the value and refcount *protocol* but, being a
//! middle-end spec, does not mandate a concrete heap — the scanner/parser/
//! resolver layers and a real object system are external collaborators
//! (spec.md §1). The interpreter (C8) and the end-to-end scenarios in
//! spec.md §8 still need *something* runnable behind `Value::Ref`, so this
//! module provides the smallest heap that can host those scenarios: a
//! refcounted string (S2/S4/S6) and a refcounted "object" whose destructor
//! can be configured to raise (S3).
//!
//! Grounded on `ouros/src/heap.rs`'s `inc_ref`/`dec_ref` (free-list slot
//! reuse, refcount stored inline with the entry) and `ouros/src/value.rs`'s
//! tagged-enum-with-inline-immediates design. Unlike the teacher, this heap
//! uses a plain `Cell<u32>` rather than an atomic: spec.md §5 is explicit
//! that compilation and this interpreter are single-threaded, so there is
//! nothing to synchronize against.

use std::cell::Cell;
use std::fmt;

use smallvec::SmallVec;

/// A machine word: one of a boolean, a 64-bit signed integer, a 64-bit
/// float, `Nothing`, or a pointer to a heap object.
///
/// `Clone` is intentionally not derived for the same reason the teacher's
/// `Value` doesn't derive it: cloning a `Ref` must go through
/// [`inc_ref`] or it silently creates an unbalanced reference. Use
/// [`Value::clone_immediate`] for the non-pointer variants or
/// [`inc_ref`] to create an owned duplicate of a `Ref`.
#[derive(Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Nothing,
    Ref(HeapId),
}

impl Value {
    #[must_use]
    pub const fn is_ref(&self) -> bool {
        matches!(self, Self::Ref(_))
    }

    /// Clones a non-pointer value. Panics on `Ref` — use [`inc_ref`] there.
    #[must_use]
    pub fn clone_immediate(&self) -> Self {
        match self {
            Self::Bool(b) => Self::Bool(*b),
            Self::Int(i) => Self::Int(*i),
            Self::Float(f) => Self::Float(*f),
            Self::Nothing => Self::Nothing,
            Self::Ref(_) => panic!("clone_immediate called on a heap reference"),
        }
    }

    /// Duplicates the machine word this value occupies, including the
    /// pointer bits of a `Ref`, without touching any refcount.
    ///
    /// This is what `GetLocal`/`GetGlobal` model: a slot read is just a
    /// load of the word sitting there, the way a register machine would
    /// read a register. Whether that read needs a `+1` is a separate
    /// decision the IR always expresses as its own explicit `RefInc`
    /// instruction (spec.md §3) — never fold it into this.
    #[must_use]
    pub const fn raw_copy(&self) -> Self {
        match self {
            Self::Bool(b) => Self::Bool(*b),
            Self::Int(i) => Self::Int(*i),
            Self::Float(f) => Self::Float(*f),
            Self::Nothing => Self::Nothing,
            Self::Ref(id) => Self::Ref(*id),
        }
    }

    /// Renders this value for `print`, resolving heap data through `heap`.
    #[must_use]
    pub fn display(&self, heap: &Heap) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Nothing => "NOTHING".to_owned(),
            Self::Ref(id) => match heap.data(*id) {
                HeapData::Str(s) => s.clone(),
                HeapData::Object(o) => format!("<object {}>", o.label),
                HeapData::Exception(e) => format!("<exception {}>", e.message),
            },
        }
    }
}

/// Identifier for a heap-allocated object. Dense within a single [`Heap`];
/// freed slots are recycled, so an id is only meaningful while the object
/// it named is still live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapId(u32);

impl HeapId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// What happens when an object's refcount hits zero.
#[derive(Debug, Clone)]
pub enum Destructor {
    /// Ordinary teardown: never raises.
    Noop,
    /// Simulates a user-defined destructor that raises on release (S3).
    Raise(String),
}

#[derive(Debug)]
pub struct ObjectData {
    pub label: String,
    destructor: Destructor,
}

#[derive(Debug)]
pub struct ExceptionData {
    pub message: String,
    /// The exception that was in flight when this one was raised while
    /// unwinding, if any (the "combine" chaining from spec.md §7).
    pub cause: Option<HeapId>,
}

#[derive(Debug)]
pub enum HeapData {
    Str(String),
    Object(ObjectData),
    Exception(ExceptionData),
}

impl HeapData {
    /// Heap ids this object keeps alive, walked by `dec_ref` when the
    /// object itself is freed so child references are released too.
    fn child_ids(&self) -> SmallVec<[HeapId; 1]> {
        match self {
            Self::Exception(e) => e.cause.into_iter().collect(),
            Self::Str(_) | Self::Object(_) => SmallVec::new(),
        }
    }
}

struct HeapEntry {
    refcount: Cell<u32>,
    data: HeapData,
}

/// A single-threaded, reference-counted object arena.
///
/// Slots freed by [`dec_ref`] are pushed onto a free list and reused by the
/// next allocation, the same discipline as `ouros::heap::Heap`.
#[derive(Default)]
pub struct Heap {
    entries: Vec<Option<HeapEntry>>,
    free_list: Vec<HeapId>,
}

impl Heap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self, data: HeapData) -> HeapId {
        let entry = HeapEntry { refcount: Cell::new(1), data };
        if let Some(id) = self.free_list.pop() {
            self.entries[id.index()] = Some(entry);
            id
        } else {
            let id = HeapId(self.entries.len().try_into().expect("heap overflow"));
            self.entries.push(Some(entry));
            id
        }
    }

    #[must_use]
    pub fn alloc_string(&mut self, s: impl Into<String>) -> HeapId {
        self.alloc(HeapData::Str(s.into()))
    }

    #[must_use]
    pub fn alloc_object(&mut self, label: impl Into<String>, destructor: Destructor) -> HeapId {
        self.alloc(HeapData::Object(ObjectData { label: label.into(), destructor }))
    }

    #[must_use]
    pub fn alloc_exception(&mut self, message: impl Into<String>, cause: Option<HeapId>) -> HeapId {
        self.alloc(HeapData::Exception(ExceptionData { message: message.into(), cause }))
    }

    fn entry(&self, id: HeapId) -> &HeapEntry {
        self.entries[id.index()].as_ref().expect("Heap: slot already freed")
    }

    #[must_use]
    pub fn data(&self, id: HeapId) -> &HeapData {
        &self.entry(id).data
    }

    /// Current refcount of a live object. Used by tests asserting the
    /// testable properties in spec.md §8.
    #[must_use]
    pub fn refcount(&self, id: HeapId) -> u32 {
        self.entry(id).refcount.get()
    }

    #[must_use]
    pub fn is_live(&self, id: HeapId) -> bool {
        self.entries.get(id.index()).is_some_and(Option::is_some)
    }

    /// Number of slots never freed — used by tests to assert a zero heap
    /// delta at the end of a scenario (spec.md §8, invariant 3).
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }
}

/// `incRef`: noexcept, no-op on a non-pointer value, increments the
/// counter otherwise.
pub fn inc_ref(heap: &Heap, v: &Value) {
    if let Value::Ref(id) = v {
        let entry = heap.entry(*id);
        entry.refcount.set(entry.refcount.get() + 1);
    }
}

/// `decRef`: may raise. On raise, the object is nonetheless considered
/// released — the error is returned as the id of a freshly allocated
/// exception object, already owned by the caller.
pub fn dec_ref(heap: &mut Heap, v: Value) -> Result<(), HeapId> {
    let Value::Ref(id) = v else { return Ok(()) };
    dec_ref_id(heap, id)
}

fn dec_ref_id(heap: &mut Heap, id: HeapId) -> Result<(), HeapId> {
    let count = heap.entry(id).refcount.get();
    if count > 1 {
        heap.entry(id).refcount.set(count - 1);
        return Ok(());
    }

    let entry = heap.entries[id.index()].take().expect("Heap::dec_ref: slot already freed");
    heap.free_list.push(id);
    let children = entry.data.child_ids();
    let raised = match &entry.data {
        HeapData::Object(o) => match &o.destructor {
            Destructor::Noop => None,
            Destructor::Raise(msg) => Some(msg.clone()),
        },
        HeapData::Str(_) | HeapData::Exception(_) => None,
    };

    for child in children {
        // A child raising during this teardown would itself need to be
        // combined; this heap only needs Exception->cause chains, which
        // never raise when released, so this path keeps it simple.
        dec_ref_id(heap, child).ok();
    }

    match raised {
        Some(msg) => Err(heap.alloc_exception(msg, None)),
        None => Ok(()),
    }
}

/// `decRefNoexcept`: if the decrement raises, merges the new exception
/// into `pending` (the in-flight exception) rather than propagating a
/// second one. The merge makes the new exception's `cause` the exception
/// that was already pending, so a later `Rethrow` still surfaces both
/// (spec.md §7).
pub fn dec_ref_noexcept(heap: &mut Heap, v: Value, pending: &mut HeapId) {
    let Value::Ref(id) = v else { return };
    if let Err(new_exc) = dec_ref_id(heap, id) {
        let combined = heap.alloc_exception(exception_message(heap, new_exc), Some(*pending));
        *pending = combined;
    }
}

fn exception_message(heap: &Heap, id: HeapId) -> String {
    match heap.data(id) {
        HeapData::Exception(e) => e.message.clone(),
        _ => unreachable!("exception ids always point at Exception data"),
    }
}

impl fmt::Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap").field("live_count", &self.live_count()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inc_dec_balances() {
        let mut heap = Heap::new();
        let id = heap.alloc_string("hi");
        inc_ref(&heap, &Value::Ref(id));
        assert_eq!(heap.refcount(id), 2);
        dec_ref(&mut heap, Value::Ref(id)).unwrap();
        assert_eq!(heap.refcount(id), 1);
        dec_ref(&mut heap, Value::Ref(id)).unwrap();
        assert!(!heap.is_live(id));
        assert_eq!(heap.live_count(), 0);
    }

    #[test]
    fn destructor_raise_still_releases() {
        let mut heap = Heap::new();
        let id = heap.alloc_object("boom", Destructor::Raise("E".to_owned()));
        let err = dec_ref(&mut heap, Value::Ref(id)).unwrap_err();
        assert!(!heap.is_live(id));
        assert!(matches!(heap.data(err), HeapData::Exception(e) if e.message == "E"));
    }

    #[test]
    fn noexcept_combine_chains_cause() {
        let mut heap = Heap::new();
        let mut pending = heap.alloc_exception("first", None);
        let boom = heap.alloc_object("boom", Destructor::Raise("second".to_owned()));
        dec_ref_noexcept(&mut heap, Value::Ref(boom), &mut pending);
        let HeapData::Exception(e) = heap.data(pending) else { panic!("expected exception") };
        assert_eq!(e.message, "second");
        let cause = e.cause.expect("combined exception keeps the prior one as cause");
        assert!(matches!(heap.data(cause), HeapData::Exception(e) if e.message == "first"));
    }

    #[test]
    fn immediate_values_are_noop_for_refcounting() {
        let mut heap = Heap::new();
        inc_ref(&heap, &Value::Int(1));
        dec_ref(&mut heap, Value::Bool(true)).unwrap();
        assert_eq!(heap.live_count(), 0);
    }
}
