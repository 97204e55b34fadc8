use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::value::{Aggregate, Callable, Indirection, MapValue, Opaque, Scalar, Sequence, Value};

/// Integer type variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
}

impl IntType {
    /// Returns all variant names in order.
    pub fn variant_names() -> &'static [&'static str] {
        &["U8", "U16", "U32", "U64", "I8", "I16", "I32", "I64"]
    }

    pub fn is_signed(self) -> bool {
        matches!(self, IntType::I8 | IntType::I16 | IntType::I32 | IntType::I64)
    }

    pub fn bits(self) -> u32 {
        match self {
            IntType::U8 | IntType::I8 => 8,
            IntType::U16 | IntType::I16 => 16,
            IntType::U32 | IntType::I32 => 32,
            IntType::U64 | IntType::I64 => 64,
        }
    }
}

/// Floating-point type variants. Also used for the component width of complex numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FloatType {
    F32,
    F64,
}

impl FloatType {
    /// Returns all variant names in order.
    pub fn variant_names() -> &'static [&'static str] {
        &["F32", "F64"]
    }
}

/// Declared type of a value.
///
/// A `Structure` is what the engine consults when it needs to allocate a zero
/// value, decide whether a cloned value fits a destination slot, or key the
/// visited-table. Records are nominal: two record types are the same only if
/// they come from the same declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Structure {
    // Scalars
    /// Boolean value.
    Bool,
    /// Integer of a fixed width and signedness.
    Int(IntType),
    /// Floating-point number.
    Float(FloatType),
    /// Complex number; the payload is the width of each component.
    Complex(FloatType),
    /// UTF-8 text string.
    Unicode,

    // Composites
    /// Variable-length, nullable sequence.
    Sequence(Box<Structure>),
    /// Fixed-length sequence. Never null.
    Array { element: Box<Structure>, len: usize },
    /// Unordered, nullable map.
    Map {
        key: Box<Structure>,
        value: Box<Structure>,
    },
    /// Nullable reference to separately allocated storage.
    Pointer(Box<Structure>),
    /// Record with ordered named fields.
    Record(RecordType),

    // Pass-through and erased kinds
    /// Executable value. Never decomposed.
    Callable,
    /// Type-erased slot that accepts any value (including none).
    Dynamic,
    /// A kind the engine does not know how to decompose, identified by name.
    Opaque(String),
}

impl Structure {
    /// Creates a variable-length sequence type.
    pub fn sequence(element: Structure) -> Self {
        Structure::Sequence(Box::new(element))
    }

    /// Creates a fixed-length sequence type.
    pub fn array(element: Structure, len: usize) -> Self {
        Structure::Array {
            element: Box::new(element),
            len,
        }
    }

    /// Creates a raw byte sequence type.
    pub fn bytes() -> Self {
        Structure::sequence(Structure::Int(IntType::U8))
    }

    /// Creates a map type.
    pub fn map(key: Structure, value: Structure) -> Self {
        Structure::Map {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    /// Creates a pointer type.
    pub fn pointer(pointee: Structure) -> Self {
        Structure::Pointer(Box::new(pointee))
    }

    /// Creates an opaque type.
    pub fn opaque(name: impl Into<String>) -> Self {
        Structure::Opaque(name.into())
    }

    /// Returns the record declaration if this is a record type.
    pub fn as_record(&self) -> Option<&RecordType> {
        match self {
            Structure::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Returns true for types whose zero value is a null reference.
    pub fn is_nullable(&self) -> bool {
        matches!(
            self,
            Structure::Sequence(_)
                | Structure::Map { .. }
                | Structure::Pointer(_)
                | Structure::Callable
                | Structure::Dynamic
                | Structure::Opaque(_)
        )
    }

    /// Builds the zero value of this type.
    ///
    /// Nullable kinds produce their null form; arrays and records are
    /// populated with the zero values of their elements and fields.
    /// [`RecordType::define`] refuses records that contain themselves by
    /// value, so this always terminates for defined records.
    pub fn zero(&self) -> Value {
        match self {
            Structure::Bool => Value::Scalar(Scalar::Bool(false)),
            Structure::Int(int) => Value::Scalar(Scalar::zero_int(*int)),
            Structure::Float(float) => Value::Scalar(Scalar::zero_float(*float)),
            Structure::Complex(float) => Value::Scalar(Scalar::zero_complex(*float)),
            Structure::Unicode => Value::Scalar(Scalar::Str(String::new())),
            Structure::Sequence(element) => Value::Sequence(Sequence::null((**element).clone())),
            Structure::Array { element, len } => {
                let items = (0..*len).map(|_| element.zero()).collect();
                Value::Sequence(Sequence::array((**element).clone(), items))
            }
            Structure::Map { key, value } => {
                Value::Map(MapValue::null((**key).clone(), (**value).clone()))
            }
            Structure::Pointer(pointee) => Value::Indirection(Indirection::null((**pointee).clone())),
            Structure::Record(record) => Value::Aggregate(Aggregate::zeroed(record.clone())),
            Structure::Callable => Value::Callable(Callable::null()),
            Structure::Dynamic => Value::Invalid,
            Structure::Opaque(name) => Value::Opaque(Opaque::null(name.clone())),
        }
    }
}

impl fmt::Display for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Structure::Bool => write!(f, "bool"),
            Structure::Int(int) => {
                let sign = if int.is_signed() { 'i' } else { 'u' };
                write!(f, "{}{}", sign, int.bits())
            }
            Structure::Float(FloatType::F32) => write!(f, "f32"),
            Structure::Float(FloatType::F64) => write!(f, "f64"),
            Structure::Complex(FloatType::F32) => write!(f, "complex64"),
            Structure::Complex(FloatType::F64) => write!(f, "complex128"),
            Structure::Unicode => write!(f, "string"),
            Structure::Sequence(element) => write!(f, "seq<{}>", element),
            Structure::Array { element, len } => write!(f, "[{}; {}]", element, len),
            Structure::Map { key, value } => write!(f, "map<{}, {}>", key, value),
            Structure::Pointer(pointee) => write!(f, "ptr<{}>", pointee),
            Structure::Record(record) => write!(f, "{}", record.name()),
            Structure::Callable => write!(f, "callable"),
            Structure::Dynamic => write!(f, "dynamic"),
            Structure::Opaque(name) => write!(f, "opaque {}", name),
        }
    }
}

/// A field of a record declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    name: String,
    structure: Structure,
    settable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, structure: Structure, settable: bool) -> Self {
        Field {
            name: name.into(),
            structure,
            settable,
        }
    }

    /// Creates an externally settable field.
    pub fn public(name: impl Into<String>, structure: Structure) -> Self {
        Field::new(name, structure, true)
    }

    /// Creates a field that clones leave at its zero value.
    pub fn private(name: impl Into<String>, structure: Structure) -> Self {
        Field::new(name, structure, false)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn structure(&self) -> &Structure {
        &self.structure
    }

    pub fn is_settable(&self) -> bool {
        self.settable
    }
}

struct RecordDef {
    name: String,
    fields: OnceLock<Vec<Field>>,
    deferred: Option<fn() -> Vec<Field>>,
}

/// A nominal record declaration.
///
/// Cloning a `RecordType` is cheap and yields the same declaration. Field
/// lists can be supplied up front, lazily through a builder function, or
/// later through [`RecordType::define`]; the latter two let a record name
/// itself in its own fields (e.g. a `next` pointer).
///
/// A record that refers to itself keeps itself alive; declarations are
/// meant to live as long as the values that use them, usually for the whole
/// program.
#[derive(Clone)]
pub struct RecordType(Arc<RecordDef>);

impl RecordType {
    /// Declares a record with a known field list.
    pub fn new(name: impl Into<String>, fields: impl IntoIterator<Item = Field>) -> Self {
        let record = RecordType::declare(name);
        let _ = record.0.fields.set(fields.into_iter().collect());
        record
    }

    /// Declares a record whose field list is built on first use.
    pub fn deferred(name: impl Into<String>, build: fn() -> Vec<Field>) -> Self {
        RecordType(Arc::new(RecordDef {
            name: name.into(),
            fields: OnceLock::new(),
            deferred: Some(build),
        }))
    }

    /// Declares a record without fields. Complete it with [`RecordType::define`].
    pub fn declare(name: impl Into<String>) -> Self {
        RecordType(Arc::new(RecordDef {
            name: name.into(),
            fields: OnceLock::new(),
            deferred: None,
        }))
    }

    /// Supplies the field list of a declared record.
    ///
    /// Returns the fields back if the record already has them, or if a field
    /// would hold the record itself by value (directly, through an array or
    /// through another record). Such a record has no finite zero value; refer
    /// to it through a pointer instead.
    pub fn define(&self, fields: impl IntoIterator<Item = Field>) -> Result<(), Vec<Field>> {
        let fields: Vec<Field> = fields.into_iter().collect();
        if self.0.deferred.is_some() {
            return Err(fields);
        }
        let mut seen = Vec::new();
        if fields
            .iter()
            .any(|f| holds_by_value(f.structure(), self, &mut seen))
        {
            return Err(fields);
        }
        self.0.fields.set(fields)
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Returns the fields in declaration order.
    pub fn fields(&self) -> &[Field] {
        if let Some(fields) = self.0.fields.get() {
            return fields;
        }
        match self.0.deferred {
            Some(build) => self.0.fields.get_or_init(build),
            None => &[],
        }
    }

    /// Finds a field and its position by name.
    pub fn field(&self, name: &str) -> Option<(usize, &Field)> {
        self.fields().iter().enumerate().find(|(_, f)| f.name == name)
    }

    /// Returns true if both handles refer to the same declaration.
    pub fn same_as(&self, other: &RecordType) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Returns true if both records have the same field names, in the same order.
    pub fn is_layout_compatible(&self, other: &RecordType) -> bool {
        let (ours, theirs) = (self.fields(), other.fields());
        ours.len() == theirs.len() && ours.iter().zip(theirs).all(|(a, b)| a.name == b.name)
    }
}

/// Returns true if a value of `structure` embeds an instance of `record`
/// without an indirection in between.
fn holds_by_value(structure: &Structure, record: &RecordType, seen: &mut Vec<RecordType>) -> bool {
    match structure {
        Structure::Array { element, .. } => holds_by_value(element, record, seen),
        Structure::Record(other) if other.same_as(record) => true,
        Structure::Record(other) => {
            if seen.iter().any(|r| r.same_as(other)) {
                return false;
            }
            seen.push(other.clone());
            other
                .fields()
                .iter()
                .any(|f| holds_by_value(f.structure(), record, seen))
        }
        _ => false,
    }
}

impl PartialEq for RecordType {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Eq for RecordType {}

impl Hash for RecordType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}

impl fmt::Debug for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Field types may refer back to this record, so only the name is printed.
        f.debug_tuple("RecordType").field(&self.0.name).finish()
    }
}
