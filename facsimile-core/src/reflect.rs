//! Typed access to the clone engine.
//!
//! [`Reflect`] describes how a Rust type maps onto the engine's dynamic
//! [`Value`] model and back. Shared, mutable storage is expressed as
//! `Rc<RefCell<T>>`; the [`Reflector`] and [`Reifier`] keep a table of the
//! allocations they have seen so that two handles to one `RefCell` come out
//! as two handles to one slot, and the other way round, even when the
//! handles form a cycle.

use log::debug;
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::convert::{coerce, CoerceError};
use crate::structure::{FloatType, IntType, RecordType, Structure};
use crate::value::{
    new_slot, Aggregate, Callable, Complex, Indirection, MapValue, Scalar, Sequence, Slot, Value,
};

/// A Rust type with a dynamic representation.
///
/// Usually derived with `#[derive(Reflect)]` for records; implemented here
/// for scalars, strings, standard containers and shared cells.
pub trait Reflect: Sized + 'static {
    /// The declared type of every value of `Self`.
    fn structure() -> Structure;

    /// Builds the dynamic representation of `self`.
    fn reflect(&self, reflector: &mut Reflector) -> Value;

    /// Rebuilds a `Self` from a dynamic value, converting where needed.
    fn reify(value: Value, reifier: &mut Reifier) -> Result<Self, CoerceError>;

    fn to_value(&self) -> Value {
        self.reflect(&mut Reflector::new())
    }

    fn from_value(value: Value) -> Result<Self, CoerceError> {
        Self::reify(value, &mut Reifier::new())
    }
}

/// Memo table for [`Reflect::reflect`].
#[derive(Default)]
pub struct Reflector {
    slots: HashMap<(TypeId, usize), Slot>,
    first_error: Option<CoerceError>,
}

impl Reflector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first cell that could not be read, if any.
    pub fn first_error(&self) -> Option<&CoerceError> {
        self.first_error.as_ref()
    }

    pub fn into_error(self) -> Option<CoerceError> {
        self.first_error
    }

    /// Reflects a shared cell as an indirection, reusing the slot of any
    /// handle to the same cell seen before.
    pub fn reference<T: Reflect>(&mut self, cell: &Rc<RefCell<T>>) -> Value {
        let key = (TypeId::of::<T>(), Rc::as_ptr(cell) as *const () as usize);
        if let Some(slot) = self.slots.get(&key) {
            return Value::Indirection(Indirection::to(T::structure(), slot.clone()));
        }

        let slot = new_slot(Value::Invalid);
        self.slots.insert(key, slot.clone());

        let referent = match cell.try_borrow() {
            Ok(inner) => inner.reflect(self),
            Err(_) => {
                debug!("cell of {} is mutably borrowed, reflecting it as empty", T::structure());
                self.first_error.get_or_insert(CoerceError::Borrowed);
                Value::Invalid
            }
        };
        if let Ok(mut contents) = slot.try_borrow_mut() {
            *contents = referent;
        }
        Value::Indirection(Indirection::to(T::structure(), slot))
    }
}

/// Memo table for [`Reflect::reify`].
#[derive(Default)]
pub struct Reifier {
    cells: HashMap<(TypeId, usize), Rc<dyn Any>>,
}

impl Reifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Turns an indirection into a shared cell, returning the same cell for
    /// every indirection to the same slot.
    ///
    /// The cell is allocated holding `T::default()` and registered before the
    /// referent is reified, so a referent that reaches its own slot gets a
    /// handle to the cell being built.
    pub fn dereference<T: Reflect + Default>(
        &mut self,
        ind: &Indirection,
    ) -> Result<Rc<RefCell<T>>, CoerceError> {
        let (Some(slot), Some(address)) = (ind.target(), ind.address()) else {
            return Err(CoerceError::Null);
        };
        let key = (TypeId::of::<T>(), address);
        if let Some(existing) = self.cells.get(&key) {
            if let Ok(cell) = Rc::clone(existing).downcast::<RefCell<T>>() {
                return Ok(cell);
            }
        }

        let cell = Rc::new(RefCell::new(T::default()));
        self.cells.insert(key, cell.clone() as Rc<dyn Any>);

        let referent = slot
            .try_borrow()
            .map_err(|_| CoerceError::Borrowed)?
            .clone();
        let inner = T::reify(referent, self)?;
        *cell.try_borrow_mut().map_err(|_| CoerceError::Borrowed)? = inner;
        Ok(cell)
    }
}

fn mismatch(value: &Value, to: Structure) -> CoerceError {
    match value {
        Value::Invalid => CoerceError::Invalid,
        other => CoerceError::Mismatch {
            from: other.structure(),
            to,
        },
    }
}

/// Builds the value of a record instance from its field values.
///
/// Used by derived implementations; `values` must hold one value per field.
pub fn record_value(record: &RecordType, values: Vec<Value>) -> Value {
    match Aggregate::from_values(record.clone(), values) {
        Ok(agg) => Value::Aggregate(agg),
        Err(err) => {
            debug!("reflecting {} with zero fields: {}", record.name(), err);
            Value::Aggregate(Aggregate::zeroed(record.clone()))
        }
    }
}

/// Converts `value` to an instance of `record` and returns its field values
/// in declaration order.
///
/// Used by derived implementations.
pub fn record_values(
    value: Value,
    record: &RecordType,
) -> Result<std::vec::IntoIter<Value>, CoerceError> {
    let target = Structure::Record(record.clone());
    match coerce(value, &target)? {
        Value::Aggregate(agg) => Ok(agg.into_values().into_iter()),
        other => Err(mismatch(&other, target)),
    }
}

macro_rules! reflect_scalar {
    ($t:ty, $variant:ident, $structure:expr) => {
        impl Reflect for $t {
            fn structure() -> Structure {
                $structure
            }

            fn reflect(&self, _: &mut Reflector) -> Value {
                Value::Scalar(Scalar::$variant(*self as _))
            }

            fn reify(value: Value, _: &mut Reifier) -> Result<Self, CoerceError> {
                match coerce(value, &Self::structure())? {
                    Value::Scalar(Scalar::$variant(v)) => Ok(v as $t),
                    other => Err(mismatch(&other, Self::structure())),
                }
            }
        }
    };
}

reflect_scalar!(bool, Bool, Structure::Bool);
reflect_scalar!(u8, U8, Structure::Int(IntType::U8));
reflect_scalar!(u16, U16, Structure::Int(IntType::U16));
reflect_scalar!(u32, U32, Structure::Int(IntType::U32));
reflect_scalar!(u64, U64, Structure::Int(IntType::U64));
reflect_scalar!(usize, U64, Structure::Int(IntType::U64));
reflect_scalar!(i8, I8, Structure::Int(IntType::I8));
reflect_scalar!(i16, I16, Structure::Int(IntType::I16));
reflect_scalar!(i32, I32, Structure::Int(IntType::I32));
reflect_scalar!(i64, I64, Structure::Int(IntType::I64));
reflect_scalar!(isize, I64, Structure::Int(IntType::I64));
reflect_scalar!(f32, F32, Structure::Float(FloatType::F32));
reflect_scalar!(f64, F64, Structure::Float(FloatType::F64));
reflect_scalar!(Complex<f32>, C64, Structure::Complex(FloatType::F32));
reflect_scalar!(Complex<f64>, C128, Structure::Complex(FloatType::F64));

impl Reflect for String {
    fn structure() -> Structure {
        Structure::Unicode
    }

    fn reflect(&self, _: &mut Reflector) -> Value {
        Value::from(self.as_str())
    }

    fn reify(value: Value, _: &mut Reifier) -> Result<Self, CoerceError> {
        match coerce(value, &Structure::Unicode)? {
            Value::Scalar(Scalar::Str(s)) => Ok(s),
            other => Err(mismatch(&other, Structure::Unicode)),
        }
    }
}

// The unit type is an empty record.
impl Reflect for () {
    fn structure() -> Structure {
        static UNIT: std::sync::OnceLock<RecordType> = std::sync::OnceLock::new();
        Structure::Record(UNIT.get_or_init(|| RecordType::new("()", [])).clone())
    }

    fn reflect(&self, _: &mut Reflector) -> Value {
        Self::structure().zero()
    }

    fn reify(value: Value, _: &mut Reifier) -> Result<Self, CoerceError> {
        coerce(value, &Self::structure()).map(|_| ())
    }
}

impl Reflect for Value {
    fn structure() -> Structure {
        Structure::Dynamic
    }

    fn reflect(&self, _: &mut Reflector) -> Value {
        self.clone()
    }

    fn reify(value: Value, _: &mut Reifier) -> Result<Self, CoerceError> {
        Ok(value)
    }
}

impl Reflect for Callable {
    fn structure() -> Structure {
        Structure::Callable
    }

    fn reflect(&self, _: &mut Reflector) -> Value {
        Value::Callable(self.clone())
    }

    fn reify(value: Value, _: &mut Reifier) -> Result<Self, CoerceError> {
        match value.into_unboxed() {
            Value::Callable(callable) => Ok(callable),
            other => Err(mismatch(&other, Structure::Callable)),
        }
    }
}

fn sequence_items(value: Value, target: Structure) -> Result<Vec<Value>, CoerceError> {
    match coerce(value, &target)? {
        Value::Sequence(seq) => Ok(seq.into_items().unwrap_or_default()),
        other => Err(mismatch(&other, target)),
    }
}

impl<T: Reflect> Reflect for Vec<T> {
    fn structure() -> Structure {
        Structure::sequence(T::structure())
    }

    fn reflect(&self, reflector: &mut Reflector) -> Value {
        let items = self.iter().map(|item| item.reflect(reflector)).collect();
        Value::Sequence(Sequence::new(T::structure(), items))
    }

    fn reify(value: Value, reifier: &mut Reifier) -> Result<Self, CoerceError> {
        sequence_items(value, Self::structure())?
            .into_iter()
            .map(|item| T::reify(item, reifier))
            .collect()
    }
}

impl<T: Reflect, const N: usize> Reflect for [T; N] {
    fn structure() -> Structure {
        Structure::array(T::structure(), N)
    }

    fn reflect(&self, reflector: &mut Reflector) -> Value {
        let items = self.iter().map(|item| item.reflect(reflector)).collect();
        Value::Sequence(Sequence::array(T::structure(), items))
    }

    fn reify(value: Value, reifier: &mut Reifier) -> Result<Self, CoerceError> {
        let items = sequence_items(value, Self::structure())?
            .into_iter()
            .map(|item| T::reify(item, reifier))
            .collect::<Result<Vec<_>, _>>()?;
        <[T; N]>::try_from(items).map_err(|items: Vec<T>| CoerceError::Length {
            expected: N,
            found: items.len(),
        })
    }
}

fn map_entries(value: Value, target: Structure) -> Result<IndexMap<Value, Value>, CoerceError> {
    match coerce(value, &target)? {
        Value::Map(map) => Ok(map.into_entries().unwrap_or_default()),
        other => Err(mismatch(&other, target)),
    }
}

macro_rules! reflect_map {
    ($map:ident, $($bound:path),+) => {
        impl<K: Reflect $(+ $bound)+, V: Reflect> Reflect for $map<K, V> {
            fn structure() -> Structure {
                Structure::map(K::structure(), V::structure())
            }

            fn reflect(&self, reflector: &mut Reflector) -> Value {
                let entries: Vec<_> = self
                    .iter()
                    .map(|(k, v)| (k.reflect(reflector), v.reflect(reflector)))
                    .collect();
                Value::Map(MapValue::from_entries(K::structure(), V::structure(), entries))
            }

            fn reify(value: Value, reifier: &mut Reifier) -> Result<Self, CoerceError> {
                map_entries(value, Self::structure())?
                    .into_iter()
                    .map(|(k, v)| -> Result<(K, V), CoerceError> {
                        Ok((K::reify(k, reifier)?, V::reify(v, reifier)?))
                    })
                    .collect()
            }
        }
    };
}

reflect_map!(HashMap, Eq, Hash);
reflect_map!(BTreeMap, Ord);
reflect_map!(IndexMap, Eq, Hash);

/// A shared cell is an indirection to its contents.
impl<T: Reflect + Default> Reflect for Rc<RefCell<T>> {
    fn structure() -> Structure {
        Structure::pointer(T::structure())
    }

    fn reflect(&self, reflector: &mut Reflector) -> Value {
        reflector.reference(self)
    }

    fn reify(value: Value, reifier: &mut Reifier) -> Result<Self, CoerceError> {
        match value.into_unboxed() {
            Value::Indirection(ind) => reifier.dereference(&ind),
            other => Err(mismatch(&other, Self::structure())),
        }
    }
}

/// `None` is a null indirection.
///
/// When `T` is itself a reference (e.g. `Option<Rc<RefCell<U>>>`) the option
/// shares its declared type; otherwise each `Some` gets storage of its own.
impl<T: Reflect> Reflect for Option<T> {
    fn structure() -> Structure {
        match T::structure() {
            pointer @ Structure::Pointer(_) => pointer,
            other => Structure::pointer(other),
        }
    }

    fn reflect(&self, reflector: &mut Reflector) -> Value {
        let pointee = match Self::structure() {
            Structure::Pointer(pointee) => *pointee,
            other => other,
        };
        match self {
            None => Value::null_pointer(pointee),
            Some(inner) if matches!(T::structure(), Structure::Pointer(_)) => {
                inner.reflect(reflector)
            }
            Some(inner) => Value::pointer(pointee, inner.reflect(reflector)),
        }
    }

    fn reify(value: Value, reifier: &mut Reifier) -> Result<Self, CoerceError> {
        let ind = match value.into_unboxed() {
            Value::Invalid => return Ok(None),
            Value::Indirection(ind) if ind.is_null() => return Ok(None),
            Value::Indirection(ind) => ind,
            other => return Err(mismatch(&other, Self::structure())),
        };
        if matches!(T::structure(), Structure::Pointer(_)) {
            return T::reify(Value::Indirection(ind), reifier).map(Some);
        }
        let referent = ind.load().ok_or(CoerceError::Borrowed)?;
        T::reify(referent, reifier).map(Some)
    }
}

/// A box is transparent.
impl<T: Reflect> Reflect for Box<T> {
    fn structure() -> Structure {
        T::structure()
    }

    fn reflect(&self, reflector: &mut Reflector) -> Value {
        (**self).reflect(reflector)
    }

    fn reify(value: Value, reifier: &mut Reifier) -> Result<Self, CoerceError> {
        T::reify(value, reifier).map(Box::new)
    }
}
