//! Dependency Graph
//!
//! This module implements the dependency graph that connects source nodes to
//! the derived nodes computed from them.
//!
//! # Overview
//!
//! The dependency graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes are source values or derived computations
//! - Edges run from a parent to each dependent that reads it, labelled with
//!   the argument positions (slots) the parent feeds
//!
//! When a source changes, the new value is pushed along the edges until it
//! stops making a difference. Derived nodes reached this way only have their
//! caches cleared; they recompute when next read.
//!
//! # Design Decisions
//!
//! 1. Nodes live in a generational arena rather than behind individual
//!    reference-counted pointers:
//!    - Fan-out entries are plain ids, so a parent never keeps a dependent
//!      alive
//!    - A released dependent is detected by its stale generation and pruned
//!
//! 2. A parent passed at several argument positions gets one mirror cell on
//!    the dependent, while the parent's fan-out entry lists every slot.
//!
//! 3. Ownership only points upstream: a derived node keeps its parents alive,
//!    nothing keeps a derived node alive except its own handles and its
//!    dependents.

mod arena;
mod node;

pub use node::{NodeId, NodeKind};

pub(crate) use arena::{Arena, Plan};
pub(crate) use node::{Input, Node, Owner, Param, Slots};
