//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects source and derived
//! nodes. It owns the node arena and exposes the four boundary operations:
//! [`construct`], [`construct_derived`], [`Reactive::get_value`] and
//! [`Reactive::set_value`].
//!
//! # How It Works
//!
//! 1. Constructing a node inserts it into the arena and hands back an owning
//!    handle. Dropping the last clone of that handle releases the node.
//!
//! 2. A derived node computes its first value eagerly, then registers with
//!    each parent's fan-out table.
//!
//! 3. Setting a source cascades through the arena, clearing the caches of
//!    the affected dependents (see [`crate::graph`]).
//!
//! 4. Reading a cleared derived node pulls fresh values for its stale
//!    arguments and calls its function once.
//!
//! # Thread Safety
//!
//! There is one runtime per thread, and handles are `!Send`, so every node
//! of a graph is mutated from a single thread. User functions are called
//! with the arena unborrowed, so they may freely read other nodes.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use smallvec::smallvec;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::graph::{Arena, Input, Node, NodeId, Owner, Param, Plan, Slots};

use super::cell::{SignalFn, StateCell, Tick};
use super::func::Func;
use super::value::Value;

thread_local! {
    static ARENA: RefCell<Arena> = RefCell::new(Arena::default());
    static RELEASES: RefCell<Releases> = RefCell::new(Releases::default());
}

/// Nodes waiting to be taken out of the arena.
///
/// Dropping a node can drop the last owner of its parent, so releases are
/// queued and drained in a loop instead of nesting one drop per level.
#[derive(Default)]
struct Releases {
    draining: bool,
    queue: Vec<NodeId>,
}

/// A derived node being recomputed while it waits on a parent.
struct Frame {
    id: NodeId,
    func: Func,
    inputs: std::vec::IntoIter<Input>,
    args: Vec<Value>,
}

enum Step {
    /// The next argument has to be read from this parent first.
    Pull(NodeId),
    Done(Value),
}

impl Frame {
    /// Collect arguments until one needs a parent read, or call the function
    /// once all are in.
    fn advance(&mut self) -> Result<Step> {
        for input in self.inputs.by_ref() {
            match input {
                Input::Ready(value) => self.args.push(value),
                Input::Sample(sample) => self.args.push(sample()),
                Input::Pull(parent) => return Ok(Step::Pull(parent)),
            }
        }

        debug!(node = %self.id, func = self.func.name(), "recomputing");
        match self.func.call(&self.args) {
            Ok(value) => {
                Runtime::with(|arena| arena.commit(self.id, value.clone()))?;
                Ok(Step::Done(value))
            }
            Err(source) => {
                let expr = Runtime::with(|arena| Ok(arena.describe(self.id)))?;
                debug!(%expr, error = %source, "recomputation failed");
                Err(Error::Compute { expr, source })
            }
        }
    }

    /// Accept the value of the parent this frame asked for.
    fn resume(&mut self, value: Value) -> Result<Step> {
        let slot = self.args.len();
        Runtime::with(|arena| arena.resync(self.id, slot, &value))?;
        self.args.push(value);
        self.advance()
    }
}

/// Releases its node when the last owner goes away.
struct NodeGuard {
    id: NodeId,
}

impl Drop for NodeGuard {
    fn drop(&mut self) {
        Runtime::release(self.id);
    }
}

/// Operations shared by every node handle.
pub trait Reactive {
    /// The node's arena handle.
    fn id(&self) -> NodeId;

    /// The node's current value, recomputing it first if needed.
    fn get_value(&self) -> Result<Value> {
        Runtime::value(self.id())
    }

    /// Replace the node's value. Returns whether anything changed.
    fn set_value(&self, value: Value) -> Result<bool>;

    /// Version of the node's own value.
    fn tick(&self) -> Result<Tick> {
        Runtime::tick(self.id())
    }

    /// Number of dependents in the node's fan-out table.
    fn dependent_count(&self) -> usize {
        Runtime::dependent_count(self.id())
    }

    /// The node rendered as an expression.
    fn describe(&self) -> String {
        Runtime::describe(self.id())
    }
}

/// A writable leaf node.
#[derive(Clone)]
pub struct SourceNode {
    guard: Rc<NodeGuard>,
}

/// A memoized function of other nodes and constants.
#[derive(Clone)]
pub struct DerivedNode {
    guard: Rc<NodeGuard>,
}

/// One positional argument of a derived node.
#[derive(Clone)]
pub enum Arg {
    /// Another node; becomes a parent edge.
    Node(NodeHandle),
    /// A plain value, wrapped as a constant.
    Value(Value),
    /// A time-varying external source, sampled on every recomputation.
    Signal(SignalFn<Value>),
}

/// An owning reference to a node of either kind.
#[derive(Clone)]
pub struct NodeHandle {
    guard: Rc<NodeGuard>,
}

impl NodeHandle {
    pub fn id(&self) -> NodeId {
        self.guard.id
    }
}

impl Arg {
    pub fn signal<F>(func: F) -> Self
    where
        F: Fn() -> Value + 'static,
    {
        Arg::Signal(Rc::new(func))
    }
}

/// Create a source node holding `value`.
pub fn construct(value: impl Into<Value>) -> Result<SourceNode> {
    Runtime::source(None, value.into())
}

/// Create a source node that describes itself as `label`.
pub fn construct_named(label: impl Into<String>, value: impl Into<Value>) -> Result<SourceNode> {
    Runtime::source(Some(label.into()), value.into())
}

/// Create a derived node computing `func` over `args`.
///
/// The first value is computed immediately; a failure is returned as
/// [`Error::Compute`] and no node is created.
pub fn construct_derived<I>(func: Func, args: I) -> Result<DerivedNode>
where
    I: IntoIterator,
    I::Item: Into<Arg>,
{
    Runtime::derive(func, args.into_iter().map(Into::into).collect())
}

/// Refuse values whose changes the graph could not observe.
fn admit(value: &Value) -> Result<()> {
    let reason = match value {
        Value::Nil => "nil is not a value",
        Value::List(_) => "mutable container kinds are not supported",
        other if !other.is_hashable() => "unhashable values are not supported",
        _ => return Ok(()),
    };
    Err(Error::ValueRejected {
        reason: reason.to_owned(),
    })
}

/// The per-thread reactive runtime.
pub struct Runtime;

impl Runtime {
    fn with<R>(f: impl FnOnce(&mut Arena) -> Result<R>) -> Result<R> {
        ARENA.with(|arena| {
            let mut arena = arena
                .try_borrow_mut()
                .map_err(|_| Error::violation("runtime re-entered while the arena is borrowed"))?;
            f(&mut arena)
        })
    }

    fn release(id: NodeId) {
        let drain = RELEASES.try_with(|releases| {
            let mut releases = releases.borrow_mut();
            releases.queue.push(id);
            !std::mem::replace(&mut releases.draining, true)
        });

        match drain {
            // an outer release is already draining the queue
            Ok(false) => {}
            Ok(true) => {
                while let Some(id) = Self::next_release() {
                    Self::remove(id);
                }
            }
            Err(_) => Self::remove(id),
        }
    }

    fn next_release() -> Option<NodeId> {
        RELEASES
            .try_with(|releases| {
                let mut releases = releases.borrow_mut();
                let next = releases.queue.pop();
                if next.is_none() {
                    releases.draining = false;
                }
                next
            })
            .ok()
            .flatten()
    }

    fn remove(id: NodeId) {
        let removed = ARENA.try_with(|arena| match arena.try_borrow_mut() {
            Ok(mut arena) => arena.remove(id),
            Err(_) => {
                warn!(node = %id, "arena busy, node leaked");
                None
            }
        });
        // dropped here, unborrowed: the node may hold the last owner of a parent
        if let Ok(Some(node)) = removed {
            debug!(node = %id, "node released");
            drop(node);
        }
    }

    /// Number of live nodes on this thread.
    pub fn node_count() -> usize {
        Self::with(|arena| Ok(arena.len())).unwrap_or(0)
    }

    /// Whether `id` still refers to a live node.
    pub fn is_live(id: NodeId) -> bool {
        Self::with(|arena| Ok(arena.is_live(id))).unwrap_or(false)
    }

    fn source(label: Option<String>, value: Value) -> Result<SourceNode> {
        admit(&value)?;
        let id = Self::with(|arena| Ok(arena.insert(Node::source(label, value))))?;
        debug!(node = %id, "source created");
        Ok(SourceNode {
            guard: Rc::new(NodeGuard { id }),
        })
    }

    fn derive(func: Func, args: Vec<Arg>) -> Result<DerivedNode> {
        let mut params = Vec::with_capacity(args.len());
        let mut bases = Vec::with_capacity(args.len());
        let mut mirrors: Vec<StateCell<Value>> = Vec::new();
        // parent -> (mirror index, slots it feeds)
        let mut parents: IndexMap<NodeId, (usize, Slots)> = IndexMap::new();

        for (slot, arg) in args.into_iter().enumerate() {
            match arg {
                Arg::Node(handle) => {
                    let id = handle.id();
                    let mirror = match parents.get_mut(&id) {
                        Some((mirror, slots)) => {
                            slots.push(slot);
                            *mirror
                        }
                        None => {
                            let value = Self::value(id)?;
                            mirrors.push(StateCell::var(value));
                            let mirror = mirrors.len() - 1;
                            parents.insert(id, (mirror, smallvec![slot]));
                            mirror
                        }
                    };
                    let owner: Owner = handle.guard;
                    params.push(Param::Parent { id, _owner: owner });
                    bases.push(mirror);
                }
                Arg::Value(value) => {
                    mirrors.push(StateCell::constant(value));
                    params.push(Param::Constant);
                    bases.push(mirrors.len() - 1);
                }
                Arg::Signal(func) => {
                    mirrors.push(StateCell::from_signal_fn(func));
                    params.push(Param::Signal);
                    bases.push(mirrors.len() - 1);
                }
            }
        }

        let values = bases
            .iter()
            .map(|&mirror| mirrors[mirror].get().into_ready())
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| Error::violation("fresh mirror is unset"))?;

        let mut node = Node::derived(func.clone(), params, bases, mirrors);
        let value = match func.call(&values) {
            Ok(value) => value,
            Err(source) => {
                let expr = Self::with(|arena| Ok(arena.describe_node(&node)))?;
                debug!(%expr, error = %source, "initial computation failed");
                return Err(Error::Compute { expr, source });
            }
        };
        node.cache = StateCell::var(value);

        let id = Self::with(|arena| {
            let id = arena.insert(node);
            for (parent, (_, slots)) in parents {
                arena.adopt(parent, id, slots);
            }
            Ok(id)
        })?;
        debug!(node = %id, func = func.name(), "derived node created");

        Ok(DerivedNode {
            guard: Rc::new(NodeGuard { id }),
        })
    }

    /// Read a node, recomputing it if its cache is clear.
    ///
    /// Stale ancestors are recomputed from an explicit stack of frames, one
    /// per node waiting on a parent, so deep graphs do not grow the thread's
    /// stack.
    fn value(id: NodeId) -> Result<Value> {
        let mut frames: Vec<Frame> = Vec::new();
        let mut target = id;

        loop {
            let mut step = match Self::with(|arena| arena.plan(target))? {
                Plan::Cached(value) => Step::Done(value),
                Plan::Recompute { func, inputs } => {
                    let mut frame = Frame {
                        id: target,
                        func,
                        inputs: inputs.into_iter(),
                        args: Vec::new(),
                    };
                    let step = frame.advance()?;
                    if let Step::Pull(_) = step {
                        frames.push(frame);
                    }
                    step
                }
            };

            // hand finished values to the frames waiting on them
            loop {
                match step {
                    Step::Pull(parent) => {
                        target = parent;
                        break;
                    }
                    Step::Done(value) => {
                        let Some(frame) = frames.last_mut() else {
                            return Ok(value);
                        };
                        step = frame.resume(value)?;
                        if let Step::Done(_) = step {
                            frames.pop();
                        }
                    }
                }
            }
        }
    }

    fn set(id: NodeId, value: Value) -> Result<bool> {
        admit(&value)?;
        Self::with(|arena| arena.set_source(id, value))
    }

    fn tick(id: NodeId) -> Result<Tick> {
        Self::with(|arena| Ok(arena.node(id)?.cache.tick()))
    }

    fn dependent_count(id: NodeId) -> usize {
        Self::with(|arena| Ok(arena.node(id)?.out.len())).unwrap_or(0)
    }

    fn describe(id: NodeId) -> String {
        Self::with(|arena| Ok(arena.describe(id))).unwrap_or_else(|_| format!("<busy {id}>"))
    }
}

impl SourceNode {
    /// Replace the value; see [`Reactive::set_value`].
    pub fn set(&self, value: impl Into<Value>) -> Result<bool> {
        Runtime::set(self.id(), value.into())
    }

    /// Replace the value with a function of the current one.
    pub fn update<F>(&self, f: F) -> Result<bool>
    where
        F: FnOnce(&Value) -> Value,
    {
        let current = self.get_value()?;
        self.set(f(&current))
    }
}

impl Reactive for SourceNode {
    fn id(&self) -> NodeId {
        self.guard.id
    }

    fn set_value(&self, value: Value) -> Result<bool> {
        self.set(value)
    }
}

impl DerivedNode {
    /// Whether the memoized value is currently valid.
    pub fn is_cached(&self) -> bool {
        Runtime::with(|arena| Ok(!arena.node(self.id())?.cache.is_unset())).unwrap_or(false)
    }

    /// Number of distinct mirror cells; a parent passed twice has one.
    pub fn mirror_count(&self) -> usize {
        Runtime::with(|arena| Ok(arena.node(self.id())?.mirrors.len())).unwrap_or(0)
    }
}

impl Reactive for DerivedNode {
    fn id(&self) -> NodeId {
        self.guard.id
    }

    fn set_value(&self, _value: Value) -> Result<bool> {
        Err(Error::Immutability {
            what: "derived node",
        })
    }
}

macro_rules! impl_node_traits {
    ($($ty:ident),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.describe())
                }
            }

            impl fmt::Debug for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.debug_struct(stringify!($ty))
                        .field("id", &self.id())
                        .field("expr", &self.describe())
                        .finish()
                }
            }

            impl From<&$ty> for NodeHandle {
                fn from(node: &$ty) -> Self {
                    NodeHandle { guard: Rc::clone(&node.guard) }
                }
            }

            impl From<$ty> for NodeHandle {
                fn from(node: $ty) -> Self {
                    NodeHandle { guard: node.guard }
                }
            }

            impl From<&$ty> for Arg {
                fn from(node: &$ty) -> Self {
                    Arg::Node(node.into())
                }
            }

            impl From<$ty> for Arg {
                fn from(node: $ty) -> Self {
                    Arg::Node(node.into())
                }
            }
        )*
    };
}

impl_node_traits!(SourceNode, DerivedNode);

impl From<NodeHandle> for Arg {
    fn from(handle: NodeHandle) -> Self {
        Arg::Node(handle)
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Arg::Value(value)
    }
}

macro_rules! impl_arg_from_value {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Arg {
                fn from(value: $ty) -> Self {
                    Arg::Value(value.into())
                }
            }
        )*
    };
}

impl_arg_from_value!(bool, i32, i64, u32, f64, &str, String);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::ops;
    use std::cell::Cell;

    fn counting(name: &'static str, calls: &Rc<Cell<usize>>) -> Func {
        let calls = Rc::clone(calls);
        Func::new(name, move |args| {
            calls.set(calls.get() + 1);
            ops::add_values(&args[0], &args[1])
        })
    }

    #[test]
    fn construct_rejects_unobservable_values() {
        for value in [Value::Nil, Value::list([1]), Value::tuple([Value::list([1])])] {
            assert!(matches!(construct(value), Err(Error::ValueRejected { .. })));
        }
        assert_eq!(Runtime::node_count(), 0);
    }

    #[test]
    fn source_set_reports_change() {
        let a = construct(1).unwrap();

        assert!(a.set(2).unwrap());
        assert!(!a.set(2).unwrap());
        assert_eq!(a.get_value().unwrap(), Value::from(2));
        assert_eq!(a.tick().unwrap(), 1);
    }

    #[test]
    fn rejected_set_leaves_source_untouched() {
        let a = construct(1).unwrap();

        assert!(matches!(a.set("x"), Err(Error::TypeMismatch { .. })));
        assert!(matches!(a.set(Value::Nil), Err(Error::ValueRejected { .. })));
        assert_eq!(a.get_value().unwrap(), Value::from(1));
        assert_eq!(a.tick().unwrap(), 0);
    }

    #[test]
    fn derived_computes_eagerly_then_lazily() {
        let calls = Rc::new(Cell::new(0));
        let a = construct(1).unwrap();
        let b = construct(2).unwrap();
        let sum = construct_derived(counting("sum", &calls), [&a, &b]).unwrap();
        assert_eq!(calls.get(), 1);
        assert!(sum.is_cached());

        a.set(10).unwrap();
        b.set(20).unwrap();
        assert_eq!(calls.get(), 1);
        assert!(!sum.is_cached());

        assert_eq!(sum.get_value().unwrap(), Value::from(30));
        assert_eq!(sum.get_value().unwrap(), Value::from(30));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn constants_and_nodes_mix() {
        let a = construct(4).unwrap();
        let scaled = construct_derived(ops::mul(), [Arg::from(&a), Arg::from(3)]).unwrap();

        assert_eq!(scaled.get_value().unwrap(), Value::from(12));
        assert_eq!(scaled.to_string(), "rx(4) * 3");
        assert_eq!(a.dependent_count(), 1);
    }

    #[test]
    fn derived_nodes_are_read_only() {
        let a = construct(1).unwrap();
        let b = construct_derived(ops::neg(), [&a]).unwrap();

        assert!(matches!(
            b.set_value(Value::from(5)),
            Err(Error::Immutability { what: "derived node" })
        ));
        assert_eq!(b.get_value().unwrap(), Value::from(-1));
    }

    #[test]
    fn signal_arguments_are_sampled_on_recompute() {
        let reading = Rc::new(Cell::new(1i64));
        let sensor = Rc::clone(&reading);
        let a = construct(10).unwrap();
        let total = construct_derived(
            ops::add(),
            [Arg::from(&a), Arg::signal(move || Value::from(sensor.get()))],
        )
        .unwrap();
        assert_eq!(total.get_value().unwrap(), Value::from(11));
        assert_eq!(total.to_string(), "rx(10) + <signal>");

        // the signal alone does not invalidate the cache
        reading.set(5);
        assert_eq!(total.get_value().unwrap(), Value::from(11));

        a.set(20).unwrap();
        assert_eq!(total.get_value().unwrap(), Value::from(25));
    }

    #[test]
    fn intermediate_nodes_live_as_long_as_their_dependents() {
        let a = construct(1).unwrap();
        let doubled = construct_derived(
            ops::mul(),
            [Arg::from(construct_derived(ops::neg(), [&a]).unwrap()), Arg::from(2)],
        )
        .unwrap();
        assert_eq!(Runtime::node_count(), 3);

        a.set(3).unwrap();
        assert_eq!(doubled.get_value().unwrap(), Value::from(-6));

        drop(doubled);
        assert_eq!(Runtime::node_count(), 1);
    }

    #[test]
    fn update_applies_function_to_current_value() {
        let a = construct(3).unwrap();
        assert!(a.update(|v| Value::from(v.as_int().unwrap_or(0) * 2)).unwrap());
        assert_eq!(a.get_value().unwrap(), Value::from(6));
    }

    #[test]
    fn functions_may_read_other_nodes() {
        let a = construct(2).unwrap();
        let side = construct(40).unwrap();
        let reader = side.clone();
        let f = Func::new("plus_side", move |args| {
            let side = reader.get_value().map_err(|e| e.to_string())?;
            ops::add_values(&args[0], &side)
        });
        let b = construct_derived(f, [&a]).unwrap();

        assert_eq!(b.get_value().unwrap(), Value::from(42));
    }
}
