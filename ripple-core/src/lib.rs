//! Ripple Core
//!
//! This crate provides an incremental computation engine: values that depend
//! on other values recompute automatically, lazily, and at most once per
//! relevant change.
//! It implements:
//!
//! - Versioned state cells (constants, signals, variables)
//! - Source and derived nodes with memoized lazy evaluation
//! - A short-circuiting invalidation cascade over a generational arena
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: cells, values, functions and the node handles
//! - `graph`: the node arena and the invalidation cascade
//! - `error`: the error taxonomy
//!
//! # Example
//!
//! ```rust
//! use ripple_core::{construct, construct_derived, Func, Reactive, Value};
//!
//! let a = construct(3)?;
//! let b = construct(4)?;
//! let hypot = Func::new("hypot", |args| {
//!     let (x, y) = (args[0].as_float().unwrap_or(0.0), args[1].as_float().unwrap_or(0.0));
//!     Ok(Value::Float((x * x + y * y).sqrt()))
//! });
//! let c = construct_derived(hypot, [&a, &b])?;
//! assert_eq!(c.get_value()?, Value::Float(5.0));
//!
//! a.set(5)?;
//! b.set(12)?;
//! assert_eq!(c.get_value()?, Value::Float(13.0));
//! # Ok::<(), ripple_core::Error>(())
//! ```

pub mod error;
pub mod graph;
pub mod reactive;

pub use error::{ComputeError, Error, Result};
pub use graph::{NodeId, NodeKind};
pub use reactive::{
    construct, construct_derived, construct_named, ops, Arg, Cached, DerivedNode, Func,
    NodeHandle, Reactive, Runtime, SourceNode, StateCell, Tick, Value,
};
