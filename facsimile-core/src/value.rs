use indexmap::IndexMap;
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::convert::{coerce, CoerceError};
use crate::structure::{FloatType, IntType, RecordType, Structure};

/// Shared storage behind an indirection.
///
/// The address of the `Rc` allocation is the storage identity the cloner
/// tracks; it is stable for as long as any handle to the slot is alive.
pub type Slot = Rc<RefCell<Value>>;

/// Allocates a new slot holding `value`.
pub fn new_slot(value: Value) -> Slot {
    Rc::new(RefCell::new(value))
}

fn slot_address(slot: &Slot) -> usize {
    Rc::as_ptr(slot) as *const () as usize
}

/// A complex number with components of type `T`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Complex<T> {
    pub re: T,
    pub im: T,
}

impl<T> Complex<T> {
    pub fn new(re: T, im: T) -> Self {
        Complex { re, im }
    }
}

/// The runtime category of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Invalid,
    Scalar,
    Sequence,
    Map,
    Indirection,
    Aggregate,
    Callable,
    Boxed,
    Opaque,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Shape::Invalid => "invalid",
            Shape::Scalar => "scalar",
            Shape::Sequence => "sequence",
            Shape::Map => "map",
            Shape::Indirection => "indirection",
            Shape::Aggregate => "aggregate",
            Shape::Callable => "callable",
            Shape::Boxed => "boxed",
            Shape::Opaque => "opaque",
        };
        f.write_str(name)
    }
}

/// A scalar keeps its exact width and signedness.
#[derive(Debug, Clone)]
pub enum Scalar {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    C64(Complex<f32>),
    C128(Complex<f64>),
    Str(String),
}

impl Scalar {
    pub fn zero_int(int: IntType) -> Self {
        match int {
            IntType::U8 => Scalar::U8(0),
            IntType::U16 => Scalar::U16(0),
            IntType::U32 => Scalar::U32(0),
            IntType::U64 => Scalar::U64(0),
            IntType::I8 => Scalar::I8(0),
            IntType::I16 => Scalar::I16(0),
            IntType::I32 => Scalar::I32(0),
            IntType::I64 => Scalar::I64(0),
        }
    }

    pub fn zero_float(float: FloatType) -> Self {
        match float {
            FloatType::F32 => Scalar::F32(0.0),
            FloatType::F64 => Scalar::F64(0.0),
        }
    }

    pub fn zero_complex(float: FloatType) -> Self {
        match float {
            FloatType::F32 => Scalar::C64(Complex::default()),
            FloatType::F64 => Scalar::C128(Complex::default()),
        }
    }

    /// Returns the declared type of this scalar.
    pub fn structure(&self) -> Structure {
        match self {
            Scalar::Bool(_) => Structure::Bool,
            Scalar::U8(_) => Structure::Int(IntType::U8),
            Scalar::U16(_) => Structure::Int(IntType::U16),
            Scalar::U32(_) => Structure::Int(IntType::U32),
            Scalar::U64(_) => Structure::Int(IntType::U64),
            Scalar::I8(_) => Structure::Int(IntType::I8),
            Scalar::I16(_) => Structure::Int(IntType::I16),
            Scalar::I32(_) => Structure::Int(IntType::I32),
            Scalar::I64(_) => Structure::Int(IntType::I64),
            Scalar::F32(_) => Structure::Float(FloatType::F32),
            Scalar::F64(_) => Structure::Float(FloatType::F64),
            Scalar::C64(_) => Structure::Complex(FloatType::F32),
            Scalar::C128(_) => Structure::Complex(FloatType::F64),
            Scalar::Str(_) => Structure::Unicode,
        }
    }
}

// Floats compare by bit pattern so that scalars can key a map.
impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Scalar::Bool(a), Scalar::Bool(b)) => a == b,
            (Scalar::U8(a), Scalar::U8(b)) => a == b,
            (Scalar::U16(a), Scalar::U16(b)) => a == b,
            (Scalar::U32(a), Scalar::U32(b)) => a == b,
            (Scalar::U64(a), Scalar::U64(b)) => a == b,
            (Scalar::I8(a), Scalar::I8(b)) => a == b,
            (Scalar::I16(a), Scalar::I16(b)) => a == b,
            (Scalar::I32(a), Scalar::I32(b)) => a == b,
            (Scalar::I64(a), Scalar::I64(b)) => a == b,
            (Scalar::F32(a), Scalar::F32(b)) => a.to_bits() == b.to_bits(),
            (Scalar::F64(a), Scalar::F64(b)) => a.to_bits() == b.to_bits(),
            (Scalar::C64(a), Scalar::C64(b)) => {
                a.re.to_bits() == b.re.to_bits() && a.im.to_bits() == b.im.to_bits()
            }
            (Scalar::C128(a), Scalar::C128(b)) => {
                a.re.to_bits() == b.re.to_bits() && a.im.to_bits() == b.im.to_bits()
            }
            (Scalar::Str(a), Scalar::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Scalar {}

impl Hash for Scalar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Scalar::Bool(v) => v.hash(state),
            Scalar::U8(v) => v.hash(state),
            Scalar::U16(v) => v.hash(state),
            Scalar::U32(v) => v.hash(state),
            Scalar::U64(v) => v.hash(state),
            Scalar::I8(v) => v.hash(state),
            Scalar::I16(v) => v.hash(state),
            Scalar::I32(v) => v.hash(state),
            Scalar::I64(v) => v.hash(state),
            Scalar::F32(v) => v.to_bits().hash(state),
            Scalar::F64(v) => v.to_bits().hash(state),
            Scalar::C64(v) => (v.re.to_bits(), v.im.to_bits()).hash(state),
            Scalar::C128(v) => (v.re.to_bits(), v.im.to_bits()).hash(state),
            Scalar::Str(v) => v.hash(state),
        }
    }
}

/// An ordered collection of values of one declared element type.
///
/// Variable-length sequences may be null; fixed-length arrays never are.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sequence {
    element: Structure,
    fixed: bool,
    items: Option<Vec<Value>>,
}

impl Sequence {
    /// Creates a variable-length sequence.
    pub fn new(element: Structure, items: Vec<Value>) -> Self {
        Sequence {
            element,
            fixed: false,
            items: Some(items),
        }
    }

    /// Creates a null variable-length sequence.
    pub fn null(element: Structure) -> Self {
        Sequence {
            element,
            fixed: false,
            items: None,
        }
    }

    /// Creates a fixed-length array.
    pub fn array(element: Structure, items: Vec<Value>) -> Self {
        Sequence {
            element,
            fixed: true,
            items: Some(items),
        }
    }

    pub fn element(&self) -> &Structure {
        &self.element
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    pub fn is_null(&self) -> bool {
        self.items.is_none()
    }

    pub fn len(&self) -> usize {
        self.items.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn items(&self) -> Option<&[Value]> {
        self.items.as_deref()
    }

    pub fn items_mut(&mut self) -> Option<&mut [Value]> {
        self.items.as_deref_mut()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.as_ref().and_then(|items| items.get(index))
    }

    pub fn into_items(self) -> Option<Vec<Value>> {
        self.items
    }

    /// Returns the declared type of this sequence.
    pub fn structure(&self) -> Structure {
        if self.fixed {
            Structure::array(self.element.clone(), self.len())
        } else {
            Structure::sequence(self.element.clone())
        }
    }
}

/// An unordered collection of key/value pairs with declared key and value types.
#[derive(Debug, Clone)]
pub struct MapValue {
    key: Structure,
    value: Structure,
    entries: Option<IndexMap<Value, Value>>,
}

impl MapValue {
    /// Creates an empty, non-null map.
    pub fn new(key: Structure, value: Structure) -> Self {
        MapValue {
            key,
            value,
            entries: Some(IndexMap::new()),
        }
    }

    /// Creates a null map.
    pub fn null(key: Structure, value: Structure) -> Self {
        MapValue {
            key,
            value,
            entries: None,
        }
    }

    pub fn from_entries(
        key: Structure,
        value: Structure,
        entries: impl IntoIterator<Item = (Value, Value)>,
    ) -> Self {
        MapValue {
            key,
            value,
            entries: Some(entries.into_iter().collect()),
        }
    }

    pub fn key_structure(&self) -> &Structure {
        &self.key
    }

    pub fn value_structure(&self) -> &Structure {
        &self.value
    }

    pub fn is_null(&self) -> bool {
        self.entries.is_none()
    }

    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, IndexMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entries(&self) -> Option<&IndexMap<Value, Value>> {
        self.entries.as_ref()
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries.as_ref().and_then(|entries| entries.get(key))
    }

    pub fn get_mut(&mut self, key: &Value) -> Option<&mut Value> {
        self.entries.as_mut().and_then(|entries| entries.get_mut(key))
    }

    /// Inserts an entry, turning a null map into an empty one first.
    pub fn insert(&mut self, key: Value, value: Value) -> Option<Value> {
        self.entries.get_or_insert_with(IndexMap::new).insert(key, value)
    }

    pub fn into_entries(self) -> Option<IndexMap<Value, Value>> {
        self.entries
    }

    /// Returns the declared type of this map.
    pub fn structure(&self) -> Structure {
        Structure::map(self.key.clone(), self.value.clone())
    }
}

impl PartialEq for MapValue {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.value == other.value && self.entries == other.entries
    }
}

impl Eq for MapValue {}

impl Hash for MapValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Entry order is not significant, so only order-independent parts are hashed.
        self.key.hash(state);
        self.value.hash(state);
        self.entries.as_ref().map(IndexMap::len).hash(state);
    }
}

/// A nullable reference to a shared [`Slot`].
#[derive(Clone)]
pub struct Indirection {
    pointee: Structure,
    target: Option<Slot>,
}

impl Indirection {
    /// Allocates a new slot holding `value` and points at it.
    pub fn new(pointee: Structure, value: Value) -> Self {
        Indirection::to(pointee, new_slot(value))
    }

    /// Points at an existing slot.
    pub fn to(pointee: Structure, slot: Slot) -> Self {
        Indirection {
            pointee,
            target: Some(slot),
        }
    }

    pub fn null(pointee: Structure) -> Self {
        Indirection {
            pointee,
            target: None,
        }
    }

    pub fn pointee(&self) -> &Structure {
        &self.pointee
    }

    pub fn target(&self) -> Option<&Slot> {
        self.target.as_ref()
    }

    pub fn is_null(&self) -> bool {
        self.target.is_none()
    }

    /// Storage identity of the referent, if any.
    pub fn address(&self) -> Option<usize> {
        self.target.as_ref().map(slot_address)
    }

    /// Returns true if both refer to the same storage (or are both null).
    pub fn same_target(&self, other: &Indirection) -> bool {
        match (&self.target, &other.target) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    /// Reads the referent. Nested slots are shared, not copied.
    pub fn load(&self) -> Option<Value> {
        let slot = self.target.as_ref()?;
        let referent = slot.try_borrow().ok()?;
        Some(referent.clone())
    }

    /// Replaces the referent. Returns false for a null reference or a borrowed slot.
    pub fn store(&self, value: Value) -> bool {
        let Some(slot) = &self.target else {
            return false;
        };
        match slot.try_borrow_mut() {
            Ok(mut referent) => {
                *referent = value;
                true
            }
            Err(_) => false,
        }
    }

    /// Returns the declared type of this indirection.
    pub fn structure(&self) -> Structure {
        Structure::pointer(self.pointee.clone())
    }
}

impl fmt::Debug for Indirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The referent is not printed; the graph may be cyclic.
        f.debug_struct("Indirection")
            .field("pointee", &self.pointee)
            .field("address", &self.address())
            .finish()
    }
}

impl PartialEq for Indirection {
    fn eq(&self, other: &Self) -> bool {
        self.pointee == other.pointee && self.same_target(other)
    }
}

impl Eq for Indirection {}

impl Hash for Indirection {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.pointee.hash(state);
        self.address().hash(state);
    }
}

/// An instance of a record type. Field values are kept in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Aggregate {
    record: RecordType,
    values: Vec<Value>,
}

impl Aggregate {
    /// Creates an instance with every field at its zero value.
    pub fn zeroed(record: RecordType) -> Self {
        let values = record.fields().iter().map(|f| f.structure().zero()).collect();
        Aggregate { record, values }
    }

    /// Creates an instance from field values in declaration order.
    pub fn from_values(record: RecordType, values: Vec<Value>) -> Result<Self, CoerceError> {
        let expected = record.fields().len();
        if values.len() != expected {
            return Err(CoerceError::Length {
                expected,
                found: values.len(),
            });
        }
        Ok(Aggregate { record, values })
    }

    pub fn record(&self) -> &RecordType {
        &self.record
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub(crate) fn values_mut(&mut self) -> &mut [Value] {
        &mut self.values
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        let (index, _) = self.record.field(name)?;
        self.values.get(index)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        let (index, _) = self.record.field(name)?;
        self.values.get_mut(index)
    }

    /// Assigns a field, coercing the value to the field's declared type.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), CoerceError> {
        let (index, field) = self.record.field(name).ok_or_else(|| CoerceError::Mismatch {
            from: value.structure(),
            to: Structure::Record(self.record.clone()),
        })?;
        let value = coerce(value, field.structure())?;
        // An instance made before its record was defined has no storage for the field.
        let found = self.values.len();
        let slot = self.values.get_mut(index).ok_or(CoerceError::Length {
            expected: self.record.fields().len(),
            found,
        })?;
        *slot = value;
        Ok(())
    }

    /// Builder form of [`Aggregate::set`].
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Result<Self, CoerceError> {
        self.set(name, value.into())?;
        Ok(self)
    }

    pub fn structure(&self) -> Structure {
        Structure::Record(self.record.clone())
    }
}

type Function = dyn Fn(&[Value]) -> Value;

/// An executable value. Clones share the same function.
#[derive(Clone, Default)]
pub struct Callable(Option<Rc<Function>>);

impl Callable {
    pub fn new(f: impl Fn(&[Value]) -> Value + 'static) -> Self {
        Callable(Some(Rc::new(f)))
    }

    pub fn null() -> Self {
        Callable(None)
    }

    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    /// Invokes the function. A null callable yields [`Value::Invalid`].
    pub fn call(&self, args: &[Value]) -> Value {
        match &self.0 {
            Some(f) => f(args),
            None => Value::Invalid,
        }
    }

    fn address(&self) -> Option<usize> {
        self.0.as_ref().map(|f| Rc::as_ptr(f) as *const () as usize)
    }

    pub fn same_as(&self, other: &Callable) -> bool {
        self.address() == other.address()
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Callable").field(&self.address()).finish()
    }
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Eq for Callable {}

impl Hash for Callable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address().hash(state);
    }
}

/// A handle of a kind the engine cannot decompose (a channel, an OS resource).
#[derive(Clone)]
pub struct Opaque {
    name: String,
    handle: Option<Rc<dyn Any>>,
}

impl Opaque {
    pub fn new(name: impl Into<String>, handle: impl Any) -> Self {
        Opaque {
            name: name.into(),
            handle: Some(Rc::new(handle)),
        }
    }

    pub fn null(name: impl Into<String>) -> Self {
        Opaque {
            name: name.into(),
            handle: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> Option<&Rc<dyn Any>> {
        self.handle.as_ref()
    }

    pub fn is_null(&self) -> bool {
        self.handle.is_none()
    }

    fn address(&self) -> Option<usize> {
        self.handle.as_ref().map(|h| Rc::as_ptr(h) as *const () as usize)
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Opaque")
            .field("name", &self.name)
            .field("address", &self.address())
            .finish()
    }
}

impl PartialEq for Opaque {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.address() == other.address()
    }
}

impl Eq for Opaque {}

impl Hash for Opaque {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.address().hash(state);
    }
}

/// A dynamically-typed datum.
///
/// `Clone` on a `Value` is shallow with respect to storage: indirections in
/// the copy still point at the original slots. Use the cloner for an
/// independent copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Value {
    /// Absence of a value.
    #[default]
    Invalid,
    Scalar(Scalar),
    Sequence(Sequence),
    Map(MapValue),
    Indirection(Indirection),
    Aggregate(Aggregate),
    Callable(Callable),
    /// A value behind one layer of type erasure.
    Boxed(Box<Value>),
    Opaque(Opaque),
}

impl Value {
    /// Allocates `value` in a new slot and returns a reference to it.
    pub fn pointer(pointee: Structure, value: Value) -> Self {
        Value::Indirection(Indirection::new(pointee, value))
    }

    pub fn null_pointer(pointee: Structure) -> Self {
        Value::Indirection(Indirection::null(pointee))
    }

    pub fn sequence(element: Structure, items: impl IntoIterator<Item = Value>) -> Self {
        Value::Sequence(Sequence::new(element, items.into_iter().collect()))
    }

    pub fn bytes(data: &[u8]) -> Self {
        Value::sequence(
            Structure::Int(IntType::U8),
            data.iter().map(|b| Value::Scalar(Scalar::U8(*b))),
        )
    }

    pub fn boxed(inner: Value) -> Self {
        Value::Boxed(Box::new(inner))
    }

    pub fn shape(&self) -> Shape {
        match self {
            Value::Invalid => Shape::Invalid,
            Value::Scalar(_) => Shape::Scalar,
            Value::Sequence(_) => Shape::Sequence,
            Value::Map(_) => Shape::Map,
            Value::Indirection(_) => Shape::Indirection,
            Value::Aggregate(_) => Shape::Aggregate,
            Value::Callable(_) => Shape::Callable,
            Value::Boxed(_) => Shape::Boxed,
            Value::Opaque(_) => Shape::Opaque,
        }
    }

    /// Returns the declared type of this value. Erased values report `Dynamic`.
    pub fn structure(&self) -> Structure {
        match self {
            Value::Invalid | Value::Boxed(_) => Structure::Dynamic,
            Value::Scalar(s) => s.structure(),
            Value::Sequence(s) => s.structure(),
            Value::Map(m) => m.structure(),
            Value::Indirection(i) => i.structure(),
            Value::Aggregate(a) => a.structure(),
            Value::Callable(_) => Structure::Callable,
            Value::Opaque(o) => Structure::Opaque(o.name.clone()),
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Value::Invalid)
    }

    /// Returns true for the null form of a nullable kind.
    pub fn is_null(&self) -> bool {
        match self {
            Value::Sequence(s) => s.is_null(),
            Value::Map(m) => m.is_null(),
            Value::Indirection(i) => i.is_null(),
            Value::Callable(c) => c.is_null(),
            Value::Opaque(o) => o.is_null(),
            _ => false,
        }
    }

    /// Strips every layer of boxing.
    pub fn unboxed(&self) -> &Value {
        let mut value = self;
        while let Value::Boxed(inner) = value {
            value = inner;
        }
        value
    }

    pub fn into_unboxed(self) -> Value {
        let mut value = self;
        while let Value::Boxed(inner) = value {
            value = *inner;
        }
        value
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Scalar(Scalar::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&Sequence> {
        match self {
            Value::Sequence(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sequence_mut(&mut self) -> Option<&mut Sequence> {
        match self {
            Value::Sequence(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MapValue> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut MapValue> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_indirection(&self) -> Option<&Indirection> {
        match self {
            Value::Indirection(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_aggregate(&self) -> Option<&Aggregate> {
        match self {
            Value::Aggregate(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_aggregate_mut(&mut self) -> Option<&mut Aggregate> {
        match self {
            Value::Aggregate(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_callable(&self) -> Option<&Callable> {
        match self {
            Value::Callable(c) => Some(c),
            _ => None,
        }
    }
}

macro_rules! impl_from_scalar {
    ($t:ty, $variant:ident) => {
        impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Scalar(Scalar::$variant(v))
            }
        }
    };
}

impl_from_scalar!(bool, Bool);
impl_from_scalar!(u8, U8);
impl_from_scalar!(u16, U16);
impl_from_scalar!(u32, U32);
impl_from_scalar!(u64, U64);
impl_from_scalar!(i8, I8);
impl_from_scalar!(i16, I16);
impl_from_scalar!(i32, I32);
impl_from_scalar!(i64, I64);
impl_from_scalar!(f32, F32);
impl_from_scalar!(f64, F64);
impl_from_scalar!(Complex<f32>, C64);
impl_from_scalar!(Complex<f64>, C128);
impl_from_scalar!(String, Str);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Scalar(Scalar::Str(v.to_string()))
    }
}

impl From<Scalar> for Value {
    fn from(v: Scalar) -> Self {
        Value::Scalar(v)
    }
}

impl From<Sequence> for Value {
    fn from(v: Sequence) -> Self {
        Value::Sequence(v)
    }
}

impl From<MapValue> for Value {
    fn from(v: MapValue) -> Self {
        Value::Map(v)
    }
}

impl From<Aggregate> for Value {
    fn from(v: Aggregate) -> Self {
        Value::Aggregate(v)
    }
}

impl From<Indirection> for Value {
    fn from(v: Indirection) -> Self {
        Value::Indirection(v)
    }
}

impl From<Callable> for Value {
    fn from(v: Callable) -> Self {
        Value::Callable(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::Field;

    #[test]
    fn scalar_structure_keeps_width() {
        assert_eq!(Value::from(7u8).structure(), Structure::Int(IntType::U8));
        assert_eq!(Value::from(-7i16).structure(), Structure::Int(IntType::I16));
        assert_eq!(
            Value::from(Complex::new(1.0f32, 2.0)).structure(),
            Structure::Complex(FloatType::F32)
        );
    }

    #[test]
    fn floats_compare_by_bits() {
        assert_eq!(Value::from(f64::NAN), Value::from(f64::NAN));
        assert_ne!(Value::from(0.0f64), Value::from(-0.0f64));
        assert_ne!(Value::from(1u32), Value::from(1u64));
    }

    #[test]
    fn indirections_compare_by_identity() {
        let slot = new_slot(Value::from(1i32));
        let a = Indirection::to(Structure::Int(IntType::I32), slot.clone());
        let b = Indirection::to(Structure::Int(IntType::I32), slot);
        let c = Indirection::new(Structure::Int(IntType::I32), Value::from(1i32));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.load(), c.load());
    }

    #[test]
    fn map_insert_on_null_creates_entries() {
        let mut map = MapValue::null(Structure::Unicode, Structure::Int(IntType::I32));
        assert!(map.is_null());
        map.insert(Value::from("a"), Value::from(1i32));
        assert!(!map.is_null());
        assert_eq!(map.get(&Value::from("a")), Some(&Value::from(1i32)));
    }

    #[test]
    fn aggregate_set_coerces_to_field_type() {
        let record = RecordType::new("Counter", [Field::public("count", Structure::Int(IntType::I64))]);
        let mut agg = Aggregate::zeroed(record);
        agg.set("count", Value::from(5i8)).unwrap();
        assert_eq!(agg.get("count"), Some(&Value::from(5i64)));
        assert!(agg.set("missing", Value::from(1i8)).is_err());
    }

    #[test]
    fn aggregate_made_before_definition_rejects_set() {
        let record = RecordType::declare("Late");
        let mut agg = Aggregate::zeroed(record.clone());
        record
            .define([Field::public("on", Structure::Bool)])
            .unwrap();

        assert_eq!(
            agg.set("on", Value::from(true)),
            Err(CoerceError::Length { expected: 1, found: 0 })
        );
        assert_eq!(agg.get("on"), None);
    }

    #[test]
    fn aggregate_from_values_checks_length() {
        let record = RecordType::new("Pair", [
            Field::public("a", Structure::Bool),
            Field::public("b", Structure::Bool),
        ]);
        let err = Aggregate::from_values(record, vec![Value::from(true)]).unwrap_err();
        assert!(matches!(err, CoerceError::Length { expected: 2, found: 1 }));
    }

    #[test]
    fn unboxed_strips_all_layers() {
        let v = Value::boxed(Value::boxed(Value::from("x")));
        assert_eq!(v.shape(), Shape::Boxed);
        assert_eq!(v.unboxed().as_str(), Some("x"));
        assert_eq!(v.into_unboxed().shape(), Shape::Scalar);
    }

    #[test]
    fn callable_identity_and_call() {
        let double = Callable::new(|args| match args.first() {
            Some(Value::Scalar(Scalar::I32(n))) => Value::from(n * 2),
            _ => Value::Invalid,
        });
        let shared = double.clone();
        assert_eq!(double, shared);
        assert_eq!(shared.call(&[Value::from(21i32)]), Value::from(42i32));
        assert!(Callable::null().call(&[]).is_invalid());
    }

    #[test]
    fn bytes_are_u8_sequences() {
        let v = Value::bytes(b"hi");
        assert_eq!(v.structure(), Structure::bytes());
        assert_eq!(v.as_sequence().unwrap().get(1), Some(&Value::from(b'i')));
    }
}
