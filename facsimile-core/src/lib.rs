//! Facsimile is a generic deep-clone engine.
//!
//! Core concepts:
//! - **Value**: A dynamically-typed datum (scalar, sequence, map, indirection, record, ...)
//! - **Structure**: The declared type of a value, consulted for zero values and conversions
//! - **Cloner**: Rebuilds a value graph, keeping shared storage shared and cycles closed
//! - **Reflect**: Maps Rust types onto values and back; derivable for structs
//!
//! # Example
//!
//! ```
//! use facsimile_core::{clone_any, clone_as};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let shared = Rc::new(RefCell::new(1i32));
//! let pair = vec![shared.clone(), shared];
//!
//! let copy = clone_any(&pair);
//! assert!(Rc::ptr_eq(&copy[0], &copy[1]));
//! assert!(!Rc::ptr_eq(&copy[0], &pair[0]));
//!
//! let wide: Vec<i64> = clone_as(&vec![1i32, 2, 3]);
//! assert_eq!(wide, vec![1, 2, 3]);
//! ```
//!
//! # Degradation
//!
//! Cloning is best-effort. A value that cannot be reproduced (an opaque
//! handle, an element that does not fit its destination) is replaced by the
//! zero value of its declared type and the clone carries on. The `try_`
//! entry points, or a [`Cloner`] built with [`Policy::Strict`], report the
//! first such replacement as a [`CloneError`].

mod api;
mod cloner;
mod config;
pub mod convert;
pub mod reflect;
mod structure;
mod value;

pub use api::{
    clone_aggregate, clone_any, clone_as, clone_map, clone_sequence, deep_clone, deep_clone_into,
    try_clone_aggregate, try_clone_any, try_clone_as, try_clone_map, try_clone_sequence,
    try_deep_clone, try_deep_clone_into,
};
pub use cloner::{CloneError, Cloner, Place};
pub use config::{CloneOptions, Policy};
pub use convert::{coerce, CoerceError};
pub use reflect::{Reflect, Reflector, Reifier};
pub use structure::{Field, FloatType, IntType, RecordType, Structure};
pub use value::{
    new_slot, Aggregate, Callable, Complex, Indirection, MapValue, Opaque, Scalar, Sequence, Shape,
    Slot, Value,
};

#[cfg(feature = "derive")]
pub use facsimile_derive::Reflect;
