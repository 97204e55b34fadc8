//! Value coercion.
//!
//! [`coerce`] fits a value into a slot of a declared [`Structure`]. The cloner
//! calls it whenever a cloned element, field, key or value is assigned into
//! its destination, and the typed layer calls it when turning values back
//! into Rust types.
//!
//! The `to_*` helpers convert between primitive representations, parsing
//! strings where a number or boolean is asked for.

use indexmap::IndexMap;
use thiserror::Error;

use crate::structure::{FloatType, IntType, Structure};
use crate::value::{Aggregate, Complex, Indirection, MapValue, Scalar, Sequence, Value};

/// Error returned when a value does not fit a destination type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoerceError {
    #[error("no value to convert")]
    Invalid,

    #[error("null reference where a value is required")]
    Null,

    #[error("cannot convert {from} to {to}")]
    Mismatch { from: Structure, to: Structure },

    #[error("expected {expected} elements, found {found}")]
    Length { expected: usize, found: usize },

    #[error("cannot parse {input:?} as {target}")]
    Parse { input: String, target: &'static str },

    #[error("storage is mutably borrowed")]
    Borrowed,
}

/// Converts `value` so that it fits a slot declared as `target`.
///
/// Numeric conversions between integer and float widths follow `as` cast
/// semantics. Containers are converted element by element, a pointer only
/// converts to a pointer with the same pointee, and a record converts to
/// another record with the same field names in the same order. `Dynamic`
/// accepts anything as is, including `Invalid`.
pub fn coerce(value: Value, target: &Structure) -> Result<Value, CoerceError> {
    if let Structure::Dynamic = target {
        return Ok(value);
    }

    let value = value.into_unboxed();
    if value.is_invalid() {
        return Err(CoerceError::Invalid);
    }

    let from = value.structure();
    if from == *target {
        return Ok(value);
    }
    let mismatch = || CoerceError::Mismatch {
        from: from.clone(),
        to: target.clone(),
    };

    match (value, target) {
        (Value::Scalar(Scalar::Str(s)), Structure::Sequence(element))
            if **element == Structure::Int(IntType::U8) =>
        {
            Ok(Value::bytes(s.as_bytes()))
        }
        (Value::Sequence(seq), Structure::Unicode) => {
            let bytes = byte_items(&seq).ok_or_else(mismatch)?;
            String::from_utf8(bytes)
                .map(Value::from)
                .map_err(|e| CoerceError::Parse {
                    input: String::from_utf8_lossy(e.as_bytes()).into_owned(),
                    target: "string",
                })
        }
        (Value::Scalar(scalar), _) => coerce_scalar(scalar, target).ok_or_else(mismatch),
        (Value::Sequence(seq), Structure::Sequence(element)) => {
            let Some(items) = seq.into_items() else {
                return Ok(Value::Sequence(Sequence::null((**element).clone())));
            };
            let items = coerce_all(items, element)?;
            Ok(Value::Sequence(Sequence::new((**element).clone(), items)))
        }
        (Value::Sequence(seq), Structure::Array { element, len }) => {
            let items = seq.into_items().ok_or(CoerceError::Null)?;
            if items.len() != *len {
                return Err(CoerceError::Length {
                    expected: *len,
                    found: items.len(),
                });
            }
            let items = coerce_all(items, element)?;
            Ok(Value::Sequence(Sequence::array((**element).clone(), items)))
        }
        (Value::Map(map), Structure::Map { key, value }) => {
            let Some(entries) = map.into_entries() else {
                return Ok(Value::Map(MapValue::null((**key).clone(), (**value).clone())));
            };
            let mut out = IndexMap::with_capacity(entries.len());
            for (k, v) in entries {
                out.insert(coerce(k, key)?, coerce(v, value)?);
            }
            Ok(Value::Map(MapValue::from_entries(
                (**key).clone(),
                (**value).clone(),
                out,
            )))
        }
        (Value::Indirection(ind), Structure::Pointer(pointee)) if ind.is_null() => {
            Ok(Value::Indirection(Indirection::null((**pointee).clone())))
        }
        (Value::Aggregate(agg), Structure::Record(record)) => {
            if !agg.record().is_layout_compatible(record) {
                return Err(mismatch());
            }
            let values = agg
                .into_values()
                .into_iter()
                .zip(record.fields())
                .map(|(v, field)| coerce(v, field.structure()))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Aggregate(Aggregate::from_values(record.clone(), values)?))
        }
        _ => Err(mismatch()),
    }
}

fn coerce_all(items: Vec<Value>, element: &Structure) -> Result<Vec<Value>, CoerceError> {
    items.into_iter().map(|item| coerce(item, element)).collect()
}

fn byte_items(seq: &Sequence) -> Option<Vec<u8>> {
    seq.items()?
        .iter()
        .map(|item| match item {
            Value::Scalar(Scalar::U8(b)) => Some(*b),
            _ => None,
        })
        .collect()
}

fn integer_of(scalar: &Scalar) -> Option<i128> {
    match scalar {
        Scalar::U8(v) => Some(*v as i128),
        Scalar::U16(v) => Some(*v as i128),
        Scalar::U32(v) => Some(*v as i128),
        Scalar::U64(v) => Some(*v as i128),
        Scalar::I8(v) => Some(*v as i128),
        Scalar::I16(v) => Some(*v as i128),
        Scalar::I32(v) => Some(*v as i128),
        Scalar::I64(v) => Some(*v as i128),
        _ => None,
    }
}

fn float_of(scalar: &Scalar) -> Option<f64> {
    match scalar {
        Scalar::F32(v) => Some(*v as f64),
        Scalar::F64(v) => Some(*v),
        _ => None,
    }
}

macro_rules! cast_int {
    ($n:expr, $int:expr) => {
        match $int {
            IntType::U8 => Scalar::U8($n as u8),
            IntType::U16 => Scalar::U16($n as u16),
            IntType::U32 => Scalar::U32($n as u32),
            IntType::U64 => Scalar::U64($n as u64),
            IntType::I8 => Scalar::I8($n as i8),
            IntType::I16 => Scalar::I16($n as i16),
            IntType::I32 => Scalar::I32($n as i32),
            IntType::I64 => Scalar::I64($n as i64),
        }
    };
}

fn coerce_scalar(scalar: Scalar, target: &Structure) -> Option<Value> {
    let out = match target {
        Structure::Int(int) => match (integer_of(&scalar), float_of(&scalar)) {
            (Some(n), _) => cast_int!(n, *int),
            (_, Some(f)) => cast_int!(f, *int),
            _ => return None,
        },
        Structure::Float(float) => {
            let f = match (integer_of(&scalar), float_of(&scalar)) {
                (Some(n), _) => n as f64,
                (_, Some(f)) => f,
                _ => return None,
            };
            match float {
                FloatType::F32 => Scalar::F32(f as f32),
                FloatType::F64 => Scalar::F64(f),
            }
        }
        Structure::Complex(float) => {
            let (re, im) = match scalar {
                Scalar::C64(c) => (c.re as f64, c.im as f64),
                Scalar::C128(c) => (c.re, c.im),
                _ => return None,
            };
            match float {
                FloatType::F32 => Scalar::C64(Complex::new(re as f32, im as f32)),
                FloatType::F64 => Scalar::C128(Complex::new(re, im)),
            }
        }
        _ => return None,
    };
    Some(Value::Scalar(out))
}

fn parse_error(input: &str, target: &'static str) -> CoerceError {
    CoerceError::Parse {
        input: input.to_string(),
        target,
    }
}

fn parse_bool(s: &str) -> Result<bool, CoerceError> {
    match s {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        _ => Err(parse_error(s, "bool")),
    }
}

fn primitive_mismatch(value: &Value, to: Structure) -> CoerceError {
    match value {
        Value::Invalid => CoerceError::Invalid,
        other => CoerceError::Mismatch {
            from: other.structure(),
            to,
        },
    }
}

/// Converts a boolean, number or string to a boolean.
///
/// Numbers and strings are read through their text form, so only `1`/`0`
/// and the usual spellings of true and false are accepted.
pub fn to_bool(value: &Value) -> Result<bool, CoerceError> {
    match value.unboxed() {
        Value::Scalar(Scalar::Bool(b)) => Ok(*b),
        Value::Scalar(Scalar::Str(s)) => parse_bool(s),
        Value::Scalar(scalar) => match (integer_of(scalar), float_of(scalar)) {
            (Some(n), _) => parse_bool(&n.to_string()),
            (_, Some(f)) => parse_bool(&f.to_string()),
            _ => Err(primitive_mismatch(value, Structure::Bool)),
        },
        other => Err(primitive_mismatch(other, Structure::Bool)),
    }
}

/// Converts a number or numeric string to `i64`. Floats are truncated.
pub fn to_int(value: &Value) -> Result<i64, CoerceError> {
    match value.unboxed() {
        Value::Scalar(Scalar::Str(s)) => s.trim().parse().map_err(|_| parse_error(s, "i64")),
        Value::Scalar(scalar) => match (integer_of(scalar), float_of(scalar)) {
            (Some(n), _) => Ok(n as i64),
            (_, Some(f)) => Ok(f as i64),
            _ => Err(primitive_mismatch(value, Structure::Int(IntType::I64))),
        },
        other => Err(primitive_mismatch(other, Structure::Int(IntType::I64))),
    }
}

/// Converts a number or numeric string to `u64`. Floats are truncated.
pub fn to_uint(value: &Value) -> Result<u64, CoerceError> {
    match value.unboxed() {
        Value::Scalar(Scalar::Str(s)) => s.trim().parse().map_err(|_| parse_error(s, "u64")),
        Value::Scalar(scalar) => match (integer_of(scalar), float_of(scalar)) {
            (Some(n), _) => Ok(n as u64),
            (_, Some(f)) => Ok(f as u64),
            _ => Err(primitive_mismatch(value, Structure::Int(IntType::U64))),
        },
        other => Err(primitive_mismatch(other, Structure::Int(IntType::U64))),
    }
}

/// Converts a number or numeric string to `f64`.
pub fn to_float(value: &Value) -> Result<f64, CoerceError> {
    match value.unboxed() {
        Value::Scalar(Scalar::Str(s)) => s.trim().parse().map_err(|_| parse_error(s, "f64")),
        Value::Scalar(scalar) => match (integer_of(scalar), float_of(scalar)) {
            (Some(n), _) => Ok(n as f64),
            (_, Some(f)) => Ok(f),
            _ => Err(primitive_mismatch(value, Structure::Float(FloatType::F64))),
        },
        other => Err(primitive_mismatch(other, Structure::Float(FloatType::F64))),
    }
}

/// Renders a scalar as text. Byte sequences are decoded as UTF-8, lossily.
pub fn to_string(value: &Value) -> Result<String, CoerceError> {
    match value.unboxed() {
        Value::Scalar(Scalar::Str(s)) => Ok(s.clone()),
        Value::Scalar(Scalar::Bool(b)) => Ok(b.to_string()),
        Value::Scalar(scalar) => match (integer_of(scalar), float_of(scalar)) {
            (Some(n), _) => Ok(n.to_string()),
            (_, Some(f)) => Ok(f.to_string()),
            _ => Err(primitive_mismatch(value, Structure::Unicode)),
        },
        Value::Sequence(seq) => byte_items(seq)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .ok_or_else(|| primitive_mismatch(value, Structure::Unicode)),
        other => Err(primitive_mismatch(other, Structure::Unicode)),
    }
}

/// Encodes a scalar as bytes.
///
/// Integers become eight big-endian bytes (signed as `i64`, unsigned as
/// `u64`), floats their big-endian IEEE-754 bits at their own width,
/// booleans the text `true`/`false`, strings their UTF-8 bytes. A byte
/// sequence is returned as is.
pub fn to_bytes(value: &Value) -> Result<Vec<u8>, CoerceError> {
    match value.unboxed() {
        Value::Scalar(scalar) => match scalar {
            Scalar::U8(_) | Scalar::U16(_) | Scalar::U32(_) | Scalar::U64(_) => {
                let n = integer_of(scalar).unwrap_or_default() as u64;
                Ok(n.to_be_bytes().to_vec())
            }
            Scalar::I8(_) | Scalar::I16(_) | Scalar::I32(_) | Scalar::I64(_) => {
                let n = integer_of(scalar).unwrap_or_default() as i64;
                Ok(n.to_be_bytes().to_vec())
            }
            Scalar::F32(f) => Ok(f.to_bits().to_be_bytes().to_vec()),
            Scalar::F64(f) => Ok(f.to_bits().to_be_bytes().to_vec()),
            Scalar::Bool(b) => Ok(b.to_string().into_bytes()),
            Scalar::Str(s) => Ok(s.as_bytes().to_vec()),
            Scalar::C64(_) | Scalar::C128(_) => Err(primitive_mismatch(value, Structure::bytes())),
        },
        Value::Sequence(seq) => {
            byte_items(seq).ok_or_else(|| primitive_mismatch(value, Structure::bytes()))
        }
        other => Err(primitive_mismatch(other, Structure::bytes())),
    }
}
