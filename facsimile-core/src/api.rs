//! Entry points.
//!
//! Every operation comes in two forms. The plain form is best-effort: a
//! value that cannot be copied faithfully is replaced by its zero value and
//! an unusable input yields the destination's default. The `try_` form runs
//! the same clone under [`Policy::Strict`] and reports the first problem.

use log::{debug, trace};

use crate::cloner::{CloneError, Cloner, Place};
use crate::config::{CloneOptions, Policy};
use crate::reflect::{Reflect, Reflector};
use crate::structure::Structure;
use crate::value::{Shape, Value};

/// Deep-clones a value of any supported type.
pub fn clone_any<T: Reflect + Default>(source: &T) -> T {
    lenient(run_typed(source, None, Policy::Lenient))
}

pub fn try_clone_any<T: Reflect>(source: &T) -> Result<T, CloneError> {
    run_typed(source, None, Policy::Strict)
}

/// Deep-clones a record, given either as an instance or as a reference to one.
///
/// `T` may be the record type itself or a shared cell holding it.
pub fn clone_aggregate<T: Reflect + Default>(source: &Value) -> T {
    lenient(run(source, Some(Shape::Aggregate), Policy::Lenient))
}

pub fn try_clone_aggregate<T: Reflect>(source: &Value) -> Result<T, CloneError> {
    run(source, Some(Shape::Aggregate), Policy::Strict)
}

/// Deep-clones a sequence. Anything else yields `T::default()`.
pub fn clone_sequence<T: Reflect + Default>(source: &T) -> T {
    lenient(run_typed(source, Some(Shape::Sequence), Policy::Lenient))
}

pub fn try_clone_sequence<T: Reflect>(source: &T) -> Result<T, CloneError> {
    run_typed(source, Some(Shape::Sequence), Policy::Strict)
}

/// Deep-clones a map. Anything else yields `T::default()`.
pub fn clone_map<T: Reflect + Default>(source: &T) -> T {
    lenient(run_typed(source, Some(Shape::Map), Policy::Lenient))
}

pub fn try_clone_map<T: Reflect>(source: &T) -> Result<T, CloneError> {
    run_typed(source, Some(Shape::Map), Policy::Strict)
}

/// Deep-clones `source` into a different but compatible type, e.g. a
/// `Vec<i32>` into a `Vec<i64>` or one record into another with the same
/// field names.
pub fn clone_as<S: Reflect, T: Reflect + Default>(source: &S) -> T {
    lenient(run_typed(source, None, Policy::Lenient))
}

pub fn try_clone_as<S: Reflect, T: Reflect>(source: &S) -> Result<T, CloneError> {
    run_typed(source, None, Policy::Strict)
}

/// Deep-clones a dynamic value. Erased layers are unwrapped in the result.
pub fn deep_clone(source: &Value) -> Value {
    deep_clone_into(source, &Structure::Dynamic)
}

pub fn try_deep_clone(source: &Value) -> Result<Value, CloneError> {
    try_deep_clone_into(source, &Structure::Dynamic)
}

/// Deep-clones a dynamic value into a slot declared as `target`.
pub fn deep_clone_into(source: &Value, target: &Structure) -> Value {
    clone_checked(source, target, None, Policy::Lenient).unwrap_or_else(|error| {
        debug!("clone fell back to the zero value: {}", error);
        target.zero()
    })
}

pub fn try_deep_clone_into(source: &Value, target: &Structure) -> Result<Value, CloneError> {
    clone_checked(source, target, None, Policy::Strict)
}

fn lenient<T: Default>(result: Result<T, CloneError>) -> T {
    result.unwrap_or_else(|error| {
        debug!("clone fell back to the default value: {}", error);
        T::default()
    })
}

/// Reflects a typed source. Under the strict policy, storage that could not
/// be read is an error rather than an empty value.
fn run_typed<S: Reflect, T: Reflect>(
    source: &S,
    expected: Option<Shape>,
    policy: Policy,
) -> Result<T, CloneError> {
    let mut reflector = Reflector::new();
    let value = source.reflect(&mut reflector);
    if let (Policy::Strict, Some(error)) = (policy, reflector.into_error()) {
        return Err(CloneError::Unconvertible {
            place: Place::Referent,
            source: error,
        });
    }
    run(&value, expected, policy)
}

fn run<T: Reflect>(
    source: &Value,
    expected: Option<Shape>,
    policy: Policy,
) -> Result<T, CloneError> {
    let cloned = clone_checked(source, &T::structure(), expected, policy)?;
    T::from_value(cloned).map_err(CloneError::Reify)
}

fn clone_checked(
    source: &Value,
    target: &Structure,
    expected: Option<Shape>,
    policy: Policy,
) -> Result<Value, CloneError> {
    let source = source.unboxed();
    if source.is_invalid() {
        return Err(CloneError::Invalid);
    }
    if let Some(expected) = expected {
        check_shape(source, expected)?;
    }

    // A record asked for by value is cloned from behind its reference.
    let referent;
    let source = match (source, target) {
        (Value::Indirection(ind), Structure::Record(_)) => {
            referent = ind.load().ok_or(CloneError::Invalid)?;
            &referent
        }
        _ => source,
    };

    trace!("cloning {} into {}", source.shape(), target);
    let mut cloner = Cloner::with_options(CloneOptions { policy });
    let cloned = cloner.clone_into(source, target);
    trace!(
        "clone done: {} storage locations, {} degraded",
        cloner.allocated(),
        cloner.degraded()
    );
    cloner.finish()?;
    Ok(cloned)
}

fn check_shape(value: &Value, expected: Shape) -> Result<(), CloneError> {
    let found = value.shape();
    let fits = match (expected, value) {
        (Shape::Aggregate, Value::Indirection(ind)) => ind.pointee().as_record().is_some(),
        _ => found == expected,
    };
    if fits {
        Ok(())
    } else {
        Err(CloneError::ShapeMismatch { expected, found })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::IntType;
    use std::collections::HashMap;

    #[test]
    fn invalid_input_yields_nothing() {
        assert!(deep_clone(&Value::Invalid).is_invalid());
        assert_eq!(try_deep_clone(&Value::Invalid), Err(CloneError::Invalid));
    }

    #[test]
    fn shape_mismatch_yields_default() {
        assert_eq!(clone_sequence(&5i32), 0);
        assert_eq!(
            try_clone_sequence(&5i32),
            Err(CloneError::ShapeMismatch {
                expected: Shape::Sequence,
                found: Shape::Scalar
            })
        );
        assert_eq!(clone_map(&vec![1u8]), Vec::<u8>::new());
        assert_eq!(clone_aggregate::<i32>(&Value::from(1i32)), 0);
    }

    #[test]
    fn clone_as_converts_element_types() {
        let src = vec![1i32, -2, 3];
        let out: Vec<i64> = clone_as(&src);
        assert_eq!(out, vec![1, -2, 3]);
    }

    #[test]
    fn clone_as_incompatible_is_reported() {
        let out: Vec<bool> = clone_as(&vec![1i32]);
        assert_eq!(out, vec![false]);
        assert!(matches!(
            try_clone_as::<_, Vec<bool>>(&vec![1i32]),
            Err(CloneError::Unconvertible { place: Place::Element(0), .. })
        ));
        assert!(try_clone_as::<_, HashMap<String, i32>>(&5u8).is_err());
    }

    #[test]
    fn clone_as_zeroes_single_elements() {
        let src = vec![Value::from(1i32), Value::from("x"), Value::from(3i32)];
        let out: Vec<i64> = clone_as(&src);
        assert_eq!(out, vec![1, 0, 3]);
        assert!(matches!(
            try_clone_as::<_, Vec<i64>>(&src),
            Err(CloneError::Unconvertible { place: Place::Element(1), .. })
        ));
    }

    #[test]
    fn clone_as_zeroes_single_map_values() {
        let mut src = HashMap::new();
        src.insert("a".to_string(), Value::from(1i32));
        src.insert("b".to_string(), Value::from("oops"));

        let out: HashMap<String, i64> = clone_as(&src);
        assert_eq!(out.len(), 2);
        assert_eq!(out["a"], 1);
        assert_eq!(out["b"], 0);
    }

    #[test]
    fn deep_clone_into_zeroes_single_elements() {
        let src = Value::sequence(Structure::Dynamic, [Value::from(2u8), Value::from(true)]);
        let target = Structure::sequence(Structure::Int(IntType::U16));
        let out = deep_clone_into(&src, &target);
        assert_eq!(
            out.as_sequence().unwrap().items().unwrap(),
            &[Value::from(2u16), Value::from(0u16)]
        );
    }

    #[test]
    fn invalid_input_into_declared_type_is_zero() {
        let out = deep_clone_into(&Value::Invalid, &Structure::Int(IntType::U16));
        assert_eq!(out, Value::from(0u16));
        assert_eq!(
            try_deep_clone_into(&Value::Invalid, &Structure::Int(IntType::U16)),
            Err(CloneError::Invalid)
        );
    }

    #[test]
    fn null_reference_to_record_is_zero_record() {
        let record = crate::structure::RecordType::new(
            "Flag",
            [crate::structure::Field::public("on", Structure::Bool)],
        );
        let target = Structure::Record(record);
        let out = deep_clone_into(&Value::null_pointer(target.clone()), &target);
        assert_eq!(out, target.zero());
    }

    #[test]
    fn strict_clone_reports_borrowed_cell() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let cell = Rc::new(RefCell::new(5i32));
        let guard = cell.borrow_mut();
        assert_eq!(
            try_clone_any(&cell).err(),
            Some(CloneError::Unconvertible {
                place: Place::Referent,
                source: crate::convert::CoerceError::Borrowed,
            })
        );
        assert_eq!(*clone_any(&cell).borrow(), 0);
        drop(guard);
        assert_eq!(*clone_any(&cell).borrow(), 5);
    }

    #[test]
    fn deep_clone_into_zeroes_on_mismatch() {
        let out = deep_clone_into(&Value::from("x"), &Structure::Int(IntType::U16));
        assert_eq!(out, Value::from(0u16));
    }

    #[test]
    fn boxed_input_is_unwrapped() {
        let src = Value::boxed(Value::sequence(Structure::Bool, [Value::from(true)]));
        let out = deep_clone(&src);
        assert_eq!(out.shape(), Shape::Sequence);
    }
}
