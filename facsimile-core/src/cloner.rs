use log::{debug, trace};
use std::collections::HashMap;
use std::fmt;

use crate::config::{CloneOptions, Policy};
use crate::convert::{coerce, CoerceError};
use crate::structure::{RecordType, Structure};
use crate::value::{new_slot, Aggregate, Indirection, MapValue, Opaque, Sequence, Shape, Slot, Value};

/// Destination of a value inside the clone, used in error reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Place {
    Root,
    Element(usize),
    Field(String),
    MapKey,
    MapValue,
    Referent,
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Place::Root => write!(f, "root"),
            Place::Element(index) => write!(f, "element {}", index),
            Place::Field(name) => write!(f, "field `{}`", name),
            Place::MapKey => write!(f, "map key"),
            Place::MapValue => write!(f, "map value"),
            Place::Referent => write!(f, "referent"),
        }
    }
}

/// Error type for clone operations.
///
/// Only surfaced by the strict entry points; the lenient ones turn every
/// one of these into a zero value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CloneError {
    #[error("nothing to clone")]
    Invalid,
    #[error("expected {expected} input, found {found}")]
    ShapeMismatch { expected: Shape, found: Shape },
    #[error("{place}: {source}")]
    Unconvertible { place: Place, source: CoerceError },
    #[error("cannot clone {0}")]
    Unsupported(String),
    #[error("clone does not fit the requested type: {0}")]
    Reify(CoerceError),
}

/// Deep-clones value graphs.
///
/// A cloner holds the visited-table of one clone operation: for every source
/// slot it has reached, keyed by the declared pointee type and the slot's
/// address, the slot it allocated in the copy. A slot is allocated and
/// recorded before its referent is cloned, so shared references stay shared
/// and cycles close on the copy instead of recursing forever.
///
/// Use one cloner per top-level clone. It is not meant to be shared between
/// threads or reused across unrelated calls.
pub struct Cloner {
    visited: HashMap<Structure, HashMap<usize, Slot>>,
    policy: Policy,
    first_error: Option<CloneError>,
    degraded: usize,
}

impl Cloner {
    /// Creates a lenient cloner.
    pub fn new() -> Self {
        Cloner::with_options(CloneOptions::default())
    }

    pub fn with_options(options: CloneOptions) -> Self {
        Cloner {
            visited: HashMap::new(),
            policy: options.policy,
            first_error: None,
            degraded: 0,
        }
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Number of values replaced by a zero value so far.
    pub fn degraded(&self) -> usize {
        self.degraded
    }

    /// Number of distinct storage locations copied so far.
    pub fn allocated(&self) -> usize {
        self.visited.values().map(HashMap::len).sum()
    }

    pub fn first_error(&self) -> Option<&CloneError> {
        self.first_error.as_ref()
    }

    /// Ends the operation. Under the strict policy, reports the first degradation.
    pub fn finish(self) -> Result<(), CloneError> {
        match (self.policy, self.first_error) {
            (Policy::Strict, Some(error)) => Err(error),
            _ => Ok(()),
        }
    }

    /// Clones any value.
    pub fn clone_value(&mut self, value: &Value) -> Value {
        match value {
            Value::Invalid => Value::Invalid,
            Value::Scalar(scalar) => Value::Scalar(scalar.clone()),
            Value::Sequence(seq) => Value::Sequence(self.clone_sequence(seq)),
            Value::Map(map) => Value::Map(self.clone_map(map)),
            Value::Indirection(ind) => Value::Indirection(self.clone_indirection(ind)),
            Value::Aggregate(agg) => Value::Aggregate(self.clone_aggregate(agg)),
            // Passed through by reference, never duplicated.
            Value::Callable(callable) => Value::Callable(callable.clone()),
            Value::Boxed(inner) => self.clone_value(inner),
            Value::Opaque(opaque) if opaque.is_null() => Value::Opaque(opaque.clone()),
            Value::Opaque(opaque) => {
                self.degrade(CloneError::Unsupported(format!("opaque {}", opaque.name())));
                Value::Opaque(Opaque::null(opaque.name()))
            }
        }
    }

    /// Clones `value` and fits the result into a slot declared as `target`.
    ///
    /// The destination type is followed all the way down: every element,
    /// map value and field is fitted into the destination's own element,
    /// value or field type, so one that does not fit is zeroed on its own
    /// rather than taking the whole container with it.
    pub fn clone_into(&mut self, value: &Value, target: &Structure) -> Value {
        let cloned = self.clone_toward(value, target);
        self.assign(cloned, target, || Place::Root)
            .unwrap_or_else(|| target.zero())
    }

    /// Clones `value`, rebuilding composites with the layout of `target`
    /// where the shapes line up.
    fn clone_toward(&mut self, value: &Value, target: &Structure) -> Value {
        match (value, target) {
            (_, Structure::Dynamic) => self.clone_value(value),
            (Value::Boxed(inner), _) => self.clone_toward(inner, target),
            (Value::Sequence(seq), Structure::Sequence(element)) => {
                Value::Sequence(self.rebuild_sequence(seq, element, false))
            }
            (Value::Sequence(seq), Structure::Array { element, len })
                if !seq.is_null() && seq.len() == *len =>
            {
                Value::Sequence(self.rebuild_sequence(seq, element, true))
            }
            (Value::Map(map), Structure::Map { key, value }) => {
                Value::Map(self.rebuild_map(map, key, value))
            }
            (Value::Indirection(ind), Structure::Pointer(pointee)) => {
                Value::Indirection(self.rebuild_indirection(ind, pointee))
            }
            (Value::Aggregate(agg), Structure::Record(record))
                if agg.record().is_layout_compatible(record) =>
            {
                Value::Aggregate(self.rebuild_aggregate(agg, record))
            }
            _ => self.clone_value(value),
        }
    }

    /// Clones a sequence element by element.
    ///
    /// Length and order are preserved. An element that clones to nothing, or
    /// to something that does not fit the element type, leaves its slot at
    /// the zero value.
    pub fn clone_sequence(&mut self, seq: &Sequence) -> Sequence {
        self.rebuild_sequence(seq, seq.element(), seq.is_fixed())
    }

    fn rebuild_sequence(&mut self, seq: &Sequence, element: &Structure, fixed: bool) -> Sequence {
        let Some(items) = seq.items() else {
            return Sequence::null(element.clone());
        };

        let mut out: Vec<Value> = items.iter().map(|_| element.zero()).collect();
        for (index, item) in items.iter().enumerate() {
            let cloned = self.clone_toward(item, element);
            if let Some(value) = self.assign(cloned, element, || Place::Element(index)) {
                out[index] = value;
            }
        }

        if fixed {
            Sequence::array(element.clone(), out)
        } else {
            Sequence::new(element.clone(), out)
        }
    }

    /// Clones a map entry by entry.
    ///
    /// Keys and values are cloned independently. A value that does not fit
    /// is stored as the zero value; an entry whose key does not fit is
    /// dropped, since there is nothing to store it under.
    pub fn clone_map(&mut self, map: &MapValue) -> MapValue {
        self.rebuild_map(map, map.key_structure(), map.value_structure())
    }

    fn rebuild_map(&mut self, map: &MapValue, key_type: &Structure, value_type: &Structure) -> MapValue {
        let Some(entries) = map.entries() else {
            return MapValue::null(key_type.clone(), value_type.clone());
        };

        let mut out = MapValue::new(key_type.clone(), value_type.clone());
        for (key, value) in entries {
            let key = self.clone_toward(key, key_type);
            let value = self.clone_toward(value, value_type);

            let key = match settle(key, key_type) {
                Ok(key) => key,
                Err(source) => {
                    self.degrade(CloneError::Unconvertible {
                        place: Place::MapKey,
                        source,
                    });
                    continue;
                }
            };
            let value = self
                .assign(value, value_type, || Place::MapValue)
                .unwrap_or_else(|| value_type.zero());
            out.insert(key, value);
        }
        out
    }

    /// Clones a reference, preserving sharing and cycles.
    pub fn clone_indirection(&mut self, ind: &Indirection) -> Indirection {
        self.rebuild_indirection(ind, ind.pointee())
    }

    fn rebuild_indirection(&mut self, ind: &Indirection, pointee: &Structure) -> Indirection {
        let (Some(source), Some(address)) = (ind.target(), ind.address()) else {
            return Indirection::null(pointee.clone());
        };

        if let Some(slot) = self.lookup(pointee, address) {
            trace!("reusing copy of {} at {:#x}", pointee, address);
            return Indirection::to(pointee.clone(), slot);
        }

        // Registered before descending so that the referent can reach itself.
        let slot = new_slot(pointee.zero());
        self.remember(pointee, address, &slot);

        let referent = match source.try_borrow() {
            Ok(referent) => self.clone_toward(&referent, pointee),
            Err(_) => {
                self.degrade(CloneError::Unconvertible {
                    place: Place::Referent,
                    source: CoerceError::Borrowed,
                });
                return Indirection::to(pointee.clone(), slot);
            }
        };

        if let Some(value) = self.assign(referent, pointee, || Place::Referent) {
            if let Ok(mut copy) = slot.try_borrow_mut() {
                *copy = value;
            }
        }
        Indirection::to(pointee.clone(), slot)
    }

    /// Clones a record instance field by field.
    ///
    /// Only settable fields are copied; the rest stay at their zero value.
    /// When the instance lives behind a reference, that reference's copy is
    /// already recorded, so fields pointing back at the instance resolve to
    /// the copy.
    pub fn clone_aggregate(&mut self, agg: &Aggregate) -> Aggregate {
        self.rebuild_aggregate(agg, agg.record())
    }

    fn rebuild_aggregate(&mut self, agg: &Aggregate, record: &RecordType) -> Aggregate {
        let mut out = Aggregate::zeroed(record.clone());

        for (index, (field, value)) in record.fields().iter().zip(agg.values()).enumerate() {
            if !field.is_settable() {
                continue;
            }
            let cloned = self.clone_toward(value, field.structure());
            let place = || Place::Field(field.name().to_string());
            if let Some(value) = self.assign(cloned, field.structure(), place) {
                if let Some(slot) = out.values_mut().get_mut(index) {
                    *slot = value;
                }
            }
        }
        out
    }

    /// Fits a cloned value into a destination slot.
    ///
    /// Returns `None` when the slot should keep its zero value. Nothing to
    /// assign is not an error; a value that does not fit is.
    fn assign(
        &mut self,
        value: Value,
        target: &Structure,
        place: impl FnOnce() -> Place,
    ) -> Option<Value> {
        match settle(value, target) {
            Ok(value) => Some(value),
            Err(CoerceError::Invalid) => None,
            Err(source) => {
                self.degrade(CloneError::Unconvertible {
                    place: place(),
                    source,
                });
                None
            }
        }
    }

    fn degrade(&mut self, error: CloneError) {
        debug!("substituting zero value: {}", error);
        self.degraded += 1;
        if self.first_error.is_none() {
            self.first_error = Some(error);
        }
    }

    fn lookup(&self, pointee: &Structure, address: usize) -> Option<Slot> {
        self.visited.get(pointee)?.get(&address).cloned()
    }

    fn remember(&mut self, pointee: &Structure, address: usize, slot: &Slot) {
        self.visited
            .entry(pointee.clone())
            .or_default()
            .insert(address, slot.clone());
    }
}

impl Default for Cloner {
    fn default() -> Self {
        Self::new()
    }
}

fn settle(value: Value, target: &Structure) -> Result<Value, CoerceError> {
    if value.is_invalid() && *target != Structure::Dynamic {
        return Err(CoerceError::Invalid);
    }
    coerce(value, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::{Field, FloatType, IntType, RecordType};
    use crate::value::{Callable, Complex, Scalar};
    use std::rc::Rc;

    fn int32() -> Structure {
        Structure::Int(IntType::I32)
    }

    fn linked_node() -> RecordType {
        let node = RecordType::declare("Node");
        node.define([
            Field::public("name", Structure::Unicode),
            Field::public("next", Structure::pointer(Structure::Record(node.clone()))),
        ])
        .unwrap();
        node
    }

    fn deref(value: &Value) -> Value {
        value.as_indirection().and_then(Indirection::load).unwrap()
    }

    #[test]
    fn scalars_keep_width_and_sign() {
        let mut cloner = Cloner::new();
        for value in [
            Value::from(u8::MAX),
            Value::from(i8::MIN),
            Value::from(u64::MAX),
            Value::from(-1i64),
            Value::from(f32::MIN_POSITIVE),
            Value::from(Complex::new(1.0f64, -2.0)),
            Value::from("text"),
        ] {
            let cloned = cloner.clone_value(&value);
            assert_eq!(cloned, value);
            assert_eq!(cloned.structure(), value.structure());
        }
    }

    #[test]
    fn sequence_copy_is_independent() {
        let src = Value::sequence(int32(), [Value::from(1i32), Value::from(2i32), Value::from(3i32)]);
        let mut cloned = Cloner::new().clone_value(&src);

        cloned.as_sequence_mut().unwrap().items_mut().unwrap()[0] = Value::from(99i32);

        let original: Vec<_> = src.as_sequence().unwrap().items().unwrap().to_vec();
        assert_eq!(original, vec![Value::from(1i32), Value::from(2i32), Value::from(3i32)]);
        assert_eq!(cloned.as_sequence().unwrap().get(0), Some(&Value::from(99i32)));
    }

    #[test]
    fn null_sequence_and_map_stay_null() {
        let mut cloner = Cloner::new();
        let seq = Value::Sequence(Sequence::null(Structure::Bool));
        let map = Value::Map(MapValue::null(Structure::Unicode, Structure::Bool));

        let seq_clone = cloner.clone_value(&seq);
        let map_clone = cloner.clone_value(&map);
        assert!(seq_clone.is_null());
        assert_eq!(seq_clone.structure(), seq.structure());
        assert!(map_clone.is_null());
        assert_eq!(map_clone.structure(), map.structure());
    }

    #[test]
    fn ill_typed_element_keeps_zero_and_length() {
        let src = Value::sequence(int32(), [Value::from(1i32), Value::from("bad"), Value::from(3i32)]);
        let mut cloner = Cloner::with_options(CloneOptions::strict());
        let cloned = cloner.clone_value(&src);

        let items = cloned.as_sequence().unwrap().items().unwrap();
        assert_eq!(items, &[Value::from(1i32), Value::from(0i32), Value::from(3i32)]);
        assert_eq!(cloner.degraded(), 1);
        assert!(matches!(
            cloner.finish(),
            Err(CloneError::Unconvertible { place: Place::Element(1), .. })
        ));
    }

    #[test]
    fn lenient_policy_finishes_ok_after_degrading() {
        let src = Value::sequence(int32(), [Value::from("bad")]);
        let mut cloner = Cloner::new();
        cloner.clone_value(&src);
        assert_eq!(cloner.degraded(), 1);
        assert!(cloner.first_error().is_some());
        assert!(cloner.finish().is_ok());
    }

    #[test]
    fn map_values_widen_into_destination() {
        let src = Value::Map(MapValue::from_entries(
            Structure::Unicode,
            int32(),
            [
                (Value::from("a"), Value::from(1i32)),
                (Value::from("b"), Value::from(2i32)),
            ],
        ));
        let target = Structure::map(Structure::Unicode, Structure::Int(IntType::I64));
        let out = Cloner::new().clone_into(&src, &target);

        let map = out.as_map().unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&Value::from("a")), Some(&Value::from(1i64)));
        assert_eq!(map.get(&Value::from("b")), Some(&Value::from(2i64)));
    }

    #[test]
    fn clone_into_zeroes_only_the_element_that_does_not_fit() {
        let src = Value::sequence(
            Structure::Dynamic,
            [Value::from(1i32), Value::from("x"), Value::from(3i32)],
        );
        let target = Structure::sequence(Structure::Int(IntType::I64));
        let mut cloner = Cloner::with_options(CloneOptions::strict());
        let out = cloner.clone_into(&src, &target);

        assert_eq!(out.structure(), target);
        let items = out.as_sequence().unwrap().items().unwrap();
        assert_eq!(items, &[Value::from(1i64), Value::from(0i64), Value::from(3i64)]);
        assert!(matches!(
            cloner.finish(),
            Err(CloneError::Unconvertible { place: Place::Element(1), .. })
        ));
    }

    #[test]
    fn clone_into_keeps_map_entry_with_zero_value() {
        let src = Value::Map(MapValue::from_entries(
            Structure::Unicode,
            Structure::Dynamic,
            [
                (Value::from("a"), Value::from(1i32)),
                (Value::from("b"), Value::from("oops")),
            ],
        ));
        let target = Structure::map(Structure::Unicode, Structure::Int(IntType::I64));
        let out = Cloner::new().clone_into(&src, &target);

        let map = out.as_map().unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&Value::from("a")), Some(&Value::from(1i64)));
        assert_eq!(map.get(&Value::from("b")), Some(&Value::from(0i64)));
    }

    #[test]
    fn clone_into_converts_record_fields_one_by_one() {
        let loose = RecordType::new(
            "Loose",
            [
                Field::public("value", Structure::Dynamic),
                Field::public("unit", Structure::Unicode),
            ],
        );
        let strict = RecordType::new(
            "Reading",
            [
                Field::public("value", Structure::Float(FloatType::F64)),
                Field::public("unit", Structure::Unicode),
            ],
        );
        let src = Aggregate::zeroed(loose)
            .with("value", "n/a")
            .unwrap()
            .with("unit", "C")
            .unwrap();

        let out = Cloner::new().clone_into(&Value::Aggregate(src), &Structure::Record(strict));
        let agg = out.as_aggregate().unwrap();
        assert_eq!(agg.get("value"), Some(&Value::from(0.0f64)));
        assert_eq!(agg.get("unit"), Some(&Value::from("C")));
    }

    #[test]
    fn clone_into_follows_pointee_type() {
        let shared = Value::pointer(int32(), Value::from(7i32));
        let src = Value::sequence(Structure::pointer(int32()), [shared.clone(), shared]);
        let wide = Structure::pointer(Structure::Int(IntType::I64));
        let out = Cloner::new().clone_into(&src, &Structure::sequence(wide.clone()));

        let items = out.as_sequence().unwrap().items().unwrap();
        assert_eq!(items[0].structure(), wide);
        assert!(items[0].as_indirection().unwrap().same_target(items[1].as_indirection().unwrap()));
        assert_eq!(deref(&items[0]), Value::from(7i64));
    }

    #[test]
    fn cloned_map_is_independent() {
        let src = Value::Map(MapValue::from_entries(
            Structure::Unicode,
            Structure::sequence(int32()),
            [(Value::from("a"), Value::sequence(int32(), [Value::from(1i32)]))],
        ));
        let mut out = Cloner::new().clone_value(&src);

        let map = out.as_map_mut().unwrap();
        map.get_mut(&Value::from("a"))
            .and_then(Value::as_sequence_mut)
            .and_then(Sequence::items_mut)
            .unwrap()[0] = Value::from(2i32);
        map.insert(Value::from("b"), Value::sequence(int32(), []));

        let original = src.as_map().unwrap();
        assert_eq!(original.len(), 1);
        assert_eq!(
            original.get(&Value::from("a")),
            Some(&Value::sequence(int32(), [Value::from(1i32)]))
        );
    }

    #[test]
    fn map_value_that_does_not_fit_becomes_zero() {
        let src = Value::Map(MapValue::from_entries(
            Structure::Unicode,
            int32(),
            [(Value::from("a"), Value::from("oops"))],
        ));
        let out = Cloner::new().clone_value(&src);
        assert_eq!(out.as_map().unwrap().get(&Value::from("a")), Some(&Value::from(0i32)));
    }

    #[test]
    fn map_key_that_does_not_fit_drops_entry() {
        let src = Value::Map(MapValue::from_entries(
            Structure::Unicode,
            int32(),
            [
                (Value::from(1i32), Value::from(1i32)),
                (Value::from("ok"), Value::from(2i32)),
            ],
        ));
        let mut cloner = Cloner::with_options(CloneOptions::strict());
        let out = cloner.clone_value(&src);
        assert_eq!(out.as_map().unwrap().len(), 1);
        assert!(matches!(
            cloner.finish(),
            Err(CloneError::Unconvertible { place: Place::MapKey, .. })
        ));
    }

    #[test]
    fn dynamic_map_keeps_absent_key() {
        let src = Value::Map(MapValue::from_entries(
            Structure::Dynamic,
            Structure::Dynamic,
            [(Value::Invalid, Value::from(1u8))],
        ));
        let out = Cloner::new().clone_value(&src);
        assert_eq!(out.as_map().unwrap().get(&Value::Invalid), Some(&Value::from(1u8)));
    }

    #[test]
    fn null_pointer_keeps_declared_type() {
        let src = Value::null_pointer(Structure::Record(linked_node()));
        let out = Cloner::new().clone_value(&src);
        assert!(out.is_null());
        assert_eq!(out.structure(), src.structure());
    }

    #[test]
    fn shared_references_stay_shared() {
        let shared = Value::pointer(int32(), Value::from(5i32));
        let src = Value::sequence(Structure::pointer(int32()), [shared.clone(), shared.clone()]);

        let mut cloner = Cloner::new();
        let out = cloner.clone_value(&src);
        let items = out.as_sequence().unwrap().items().unwrap();
        let (a, b) = (items[0].as_indirection().unwrap(), items[1].as_indirection().unwrap());

        assert!(a.same_target(b));
        assert!(!a.same_target(shared.as_indirection().unwrap()));
        assert_eq!(cloner.allocated(), 1);

        a.store(Value::from(6i32));
        assert_eq!(deref(&items[1]), Value::from(6i32));
        assert_eq!(deref(&shared), Value::from(5i32));
    }

    #[test]
    fn self_reference_closes_on_copy() {
        let node = linked_node();
        let ptr = Value::pointer(Structure::Record(node.clone()), Value::Invalid);
        let record = Aggregate::zeroed(node.clone())
            .with("name", "a")
            .unwrap()
            .with("next", ptr.clone())
            .unwrap();
        ptr.as_indirection().unwrap().store(Value::Aggregate(record));

        let out = Cloner::new().clone_value(&ptr);
        let copy = out.as_indirection().unwrap();
        assert!(!copy.same_target(ptr.as_indirection().unwrap()));

        let inner = copy.load().unwrap();
        let agg = inner.as_aggregate().unwrap();
        assert_eq!(agg.get("name"), Some(&Value::from("a")));
        let next = agg.get("next").unwrap().as_indirection().unwrap();
        assert!(next.same_target(copy));
    }

    #[test]
    fn mutual_references_keep_topology() {
        let node = linked_node();
        let ty = Structure::Record(node.clone());
        let a = Value::pointer(ty.clone(), Value::Invalid);
        let b = Value::pointer(ty.clone(), Value::Invalid);
        a.as_indirection().unwrap().store(Value::Aggregate(
            Aggregate::zeroed(node.clone()).with("name", "a").unwrap().with("next", b.clone()).unwrap(),
        ));
        b.as_indirection().unwrap().store(Value::Aggregate(
            Aggregate::zeroed(node.clone()).with("name", "b").unwrap().with("next", a.clone()).unwrap(),
        ));

        let a2 = Cloner::new().clone_value(&a);
        let b2 = deref(&a2).as_aggregate().unwrap().get("next").unwrap().clone();
        let back = deref(&b2).as_aggregate().unwrap().get("next").unwrap().clone();

        assert_eq!(deref(&b2).as_aggregate().unwrap().get("name"), Some(&Value::from("b")));
        assert!(back.as_indirection().unwrap().same_target(a2.as_indirection().unwrap()));
        assert!(!b2.as_indirection().unwrap().same_target(b.as_indirection().unwrap()));
    }

    #[test]
    fn distinct_pointee_types_are_not_unified() {
        let slot = new_slot(Value::from(1i32));
        let as_int = Value::Indirection(Indirection::to(int32(), slot.clone()));
        let as_any = Value::Indirection(Indirection::to(Structure::Dynamic, slot));
        let src = Value::sequence(Structure::Dynamic, [as_int, as_any]);

        let mut cloner = Cloner::new();
        let out = cloner.clone_value(&src);
        let items = out.as_sequence().unwrap().items().unwrap();
        assert!(!items[0].as_indirection().unwrap().same_target(items[1].as_indirection().unwrap()));
        assert_eq!(cloner.allocated(), 2);
    }

    #[test]
    fn private_fields_are_left_zero() {
        let record = RecordType::new(
            "Account",
            [
                Field::public("owner", Structure::Unicode),
                Field::private("balance", Structure::Int(IntType::I64)),
            ],
        );
        let mut agg = Aggregate::zeroed(record);
        agg.set("owner", Value::from("ann")).unwrap();
        agg.set("balance", Value::from(100i64)).unwrap();

        let out = Cloner::new().clone_aggregate(&agg);
        assert_eq!(out.get("owner"), Some(&Value::from("ann")));
        assert_eq!(out.get("balance"), Some(&Value::from(0i64)));
    }

    #[test]
    fn callables_are_shared() {
        let f = Callable::new(|_| Value::from(1u8));
        let out = Cloner::new().clone_value(&Value::Callable(f.clone()));
        assert!(out.as_callable().unwrap().same_as(&f));
    }

    #[test]
    fn boxed_values_are_unwrapped() {
        let src = Value::boxed(Value::sequence(Structure::Bool, [Value::from(true)]));
        let out = Cloner::new().clone_value(&src);
        assert_eq!(out.shape(), Shape::Sequence);
    }

    #[test]
    fn opaque_values_degrade() {
        let src = Value::Opaque(Opaque::new("channel", 7u32));
        let mut cloner = Cloner::with_options(CloneOptions::strict());
        let out = cloner.clone_value(&src);
        assert!(out.is_null());
        assert_eq!(out.structure(), Structure::opaque("channel"));
        assert_eq!(cloner.finish(), Err(CloneError::Unsupported("opaque channel".to_string())));
    }

    #[test]
    fn borrowed_source_slot_degrades() {
        let ptr = Value::pointer(int32(), Value::from(1i32));
        let slot = Rc::clone(ptr.as_indirection().unwrap().target().unwrap());
        let _guard = slot.borrow_mut();

        let mut cloner = Cloner::new();
        let out = cloner.clone_value(&ptr);
        assert_eq!(cloner.degraded(), 1);
        assert_eq!(deref(&out), Value::from(0i32));
    }

    #[test]
    fn arrays_stay_fixed() {
        let src = Value::Sequence(Sequence::array(
            Structure::Float(FloatType::F32),
            vec![Value::from(1.0f32), Value::from(2.0f32)],
        ));
        let out = Cloner::new().clone_value(&src);
        assert!(out.as_sequence().unwrap().is_fixed());
        assert_eq!(out, src);
        assert_eq!(out.as_sequence().unwrap().get(1), Some(&Value::Scalar(Scalar::F32(2.0))));
    }
}
