//! Reactive Primitives
//!
//! This module implements the user-facing side of the engine: cells, values,
//! functions, and the node handles built on top of the graph.
//!
//! # Concepts
//!
//! ## State cells
//!
//! A [`StateCell`] is a `(tick, value)` pair whose tick advances once per
//! real change. Nodes store their own value and their view of each argument
//! in cells.
//!
//! ## Source nodes
//!
//! A [`SourceNode`] holds a value written from outside. Setting it to a
//! different value clears the caches of everything computed from it.
//!
//! ## Derived nodes
//!
//! A [`DerivedNode`] applies a [`Func`] to parent nodes and constants. It
//! caches its result and recomputes only when read after one of its inputs
//! changed.
//!
//! # Implementation Notes
//!
//! Dependencies are declared explicitly when a derived node is constructed,
//! rather than discovered by tracking reads. Each derived node keeps a
//! private copy (mirror) of every argument, which is what lets the cascade
//! stop as soon as an update no longer changes anything.

mod cell;
mod func;
pub mod ops;
mod runtime;
mod value;

pub use cell::{Cached, Kinded, SignalFn, StateCell, Tick, CONSTANT_TICK};
pub use func::{expect_arity, ComputeResult, Func, Notation};
pub use runtime::{
    construct, construct_derived, construct_named, Arg, DerivedNode, NodeHandle, Reactive,
    Runtime, SourceNode,
};
pub use value::Value;
