//! Graph Nodes
//!
//! This module defines the node records that live in the arena.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::reactive::{Cached, Func, SignalFn, StateCell, Value};

/// Handle of a node in the arena.
///
/// The generation changes every time a slot is reused, so a handle kept
/// after its node was released never resolves to a newer node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index in the arena.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A writable leaf; it has dependents but no inputs.
    Source,

    /// A memoized function of its arguments.
    Derived,
}

/// Opaque keep-alive token for a parent node.
pub(crate) type Owner = Rc<dyn Any>;

/// Where one argument position of a derived node gets its value.
pub(crate) enum Param {
    Parent { id: NodeId, _owner: Owner },
    Constant,
    Signal,
}

impl Param {
    pub(crate) fn parent(&self) -> Option<NodeId> {
        match self {
            Param::Parent { id, .. } => Some(*id),
            _ => None,
        }
    }
}

/// Mirror-slot indices on one dependent.
pub(crate) type Slots = SmallVec<[usize; 2]>;

/// Dependents of a node, keyed by handle, each with the slots it is read
/// through. Entries are not owning; released dependents are pruned lazily.
pub(crate) type FanOut = IndexMap<NodeId, Slots>;

/// How one argument of a recomputation will be obtained.
pub(crate) enum Input {
    /// The mirror is in sync.
    Ready(Value),
    /// The mirror is unset; read the parent.
    Pull(NodeId),
    /// Sample a signal.
    Sample(SignalFn<Value>),
}

/// A node in the dependency graph.
pub(crate) struct Node {
    pub(crate) kind: NodeKind,

    /// Display name of a source node.
    pub(crate) label: Option<String>,

    /// The function of a derived node.
    pub(crate) func: Option<Func>,

    /// Provenance of each argument position.
    pub(crate) params: Vec<Param>,

    /// Argument position -> index into `mirrors`. A parent passed at several
    /// positions maps all of them to the same mirror.
    pub(crate) bases: Vec<usize>,

    pub(crate) mirrors: Vec<StateCell<Value>>,

    /// The node's own value.
    pub(crate) cache: StateCell<Value>,

    pub(crate) out: FanOut,
}

impl Node {
    pub(crate) fn source(label: Option<String>, value: Value) -> Self {
        Self {
            kind: NodeKind::Source,
            label,
            func: None,
            params: Vec::new(),
            bases: Vec::new(),
            mirrors: Vec::new(),
            cache: StateCell::var(value),
            out: FanOut::new(),
        }
    }

    /// A derived node whose cache has not been computed yet.
    pub(crate) fn derived(
        func: Func,
        params: Vec<Param>,
        bases: Vec<usize>,
        mirrors: Vec<StateCell<Value>>,
    ) -> Self {
        Self {
            kind: NodeKind::Derived,
            label: None,
            func: Some(func),
            params,
            bases,
            mirrors,
            cache: StateCell::unset(),
            out: FanOut::new(),
        }
    }

    pub(crate) fn arity(&self) -> usize {
        self.bases.len()
    }

    pub(crate) fn mirror(&self, slot: usize) -> Result<&StateCell<Value>> {
        self.bases
            .get(slot)
            .and_then(|&index| self.mirrors.get(index))
            .ok_or_else(|| Error::violation(format!("no mirror for slot {slot}")))
    }

    pub(crate) fn mirror_mut(&mut self, slot: usize) -> Result<&mut StateCell<Value>> {
        let index = *self
            .bases
            .get(slot)
            .ok_or_else(|| Error::violation(format!("no mirror for slot {slot}")))?;
        self.mirrors
            .get_mut(index)
            .ok_or_else(|| Error::violation(format!("slot {slot} maps past the mirrors")))
    }

    pub(crate) fn has_unset_mirror(&self) -> bool {
        self.mirrors.iter().any(StateCell::is_unset)
    }

    /// Decide how the argument at `slot` will be read for a recomputation.
    pub(crate) fn input(&self, slot: usize) -> Result<Input> {
        let mirror = self.mirror(slot)?;
        if let Some(func) = mirror.signal_fn() {
            return Ok(Input::Sample(func));
        }
        match mirror.get() {
            Cached::Ready(value) => Ok(Input::Ready(value)),
            Cached::Unset => self
                .params
                .get(slot)
                .and_then(Param::parent)
                .map(Input::Pull)
                .ok_or_else(|| {
                    Error::violation(format!("unset mirror at slot {slot} has no parent"))
                }),
        }
    }

    /// Record that `child` reads this node through `slots`.
    pub(crate) fn adopt(&mut self, child: NodeId, slots: impl IntoIterator<Item = usize>) {
        let entry = self.out.entry(child).or_default();
        for slot in slots {
            if !entry.contains(&slot) {
                entry.push(slot);
            }
        }
    }

    /// Binding strength used when this node is rendered as an operand.
    pub(crate) fn precedence(&self) -> Option<u8> {
        self.func.as_ref().and_then(|func| func.notation().precedence())
    }
}
