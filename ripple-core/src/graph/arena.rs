//! Node Arena and Invalidation Cascade
//!
//! The arena owns every node of a runtime and addresses them by
//! [`NodeId`]. Parents record their dependents by id only, so a dependent is
//! never kept alive by its parents. Removing a node unlinks it from its
//! parents' fan-out tables; its slot gets a new generation and old ids stop
//! resolving, which the cascade also checks before following an edge.
//!
//! # Algorithm
//!
//! When a source changes, the new value is pushed one edge at a time:
//!
//! 1. For each `(dependent, slot)` in the fan-out table, store the value in
//!    the dependent's mirror for that slot.
//! 2. If the mirror did not change, stop on this branch.
//! 3. Otherwise clear the dependent's cache. If it was already clear, stop.
//! 4. Otherwise repeat from step 1 for the dependent's own dependents, this
//!    time pushing "unset" since the dependent has not been recomputed.
//!
//! Nothing is recomputed here; recomputation happens when a cleared node is
//! next read. A node reached along several paths is only cleared once, and
//! subgraphs whose mirrors do not change are never visited.

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::reactive::{Cached, Func, Value};

use super::node::{FanOut, Input, Node, NodeId, NodeKind, Param};

/// Nesting level past which parents are rendered as `...`.
const MAX_DESCRIBE_DEPTH: usize = 32;

/// What a read of a node needs to do.
pub(crate) enum Plan {
    /// The cache is valid.
    Cached(Value),
    /// The cache is clear; call `func` over `inputs`.
    Recompute { func: Func, inputs: Vec<Input> },
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Generational arena holding all nodes of one runtime.
#[derive(Default)]
pub(crate) struct Arena {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl Arena {
    pub(crate) fn insert(&mut self, node: Node) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId::new(index, slot.generation);
        }

        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId::new(index, 0)
    }

    /// Take a node out of the arena, retire its id and unlink it from the
    /// fan-out tables of its parents.
    pub(crate) fn remove(&mut self, id: NodeId) -> Option<Node> {
        let slot = self.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index());

        for parent in node.params.iter().filter_map(Param::parent) {
            if let Some(parent_node) = self.get_mut(parent) {
                if parent_node.out.shift_remove(&id).is_some() {
                    trace!(node = %parent, dependent = %id, "unlinked released dependent");
                }
            }
        }
        Some(node)
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.node.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.node.as_mut())
    }

    pub(crate) fn is_live(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live nodes.
    pub(crate) fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub(crate) fn node(&self, id: NodeId) -> Result<&Node> {
        self.get(id)
            .ok_or_else(|| Error::violation(format!("node {id} is not live")))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.get_mut(id)
            .ok_or_else(|| Error::violation(format!("node {id} is not live")))
    }

    /// Register that `child` reads `parent` through `slots`.
    pub(crate) fn adopt(
        &mut self,
        parent: NodeId,
        child: NodeId,
        slots: impl IntoIterator<Item = usize>,
    ) {
        match self.get_mut(parent) {
            Some(node) => node.adopt(child, slots),
            None => debug!(%parent, %child, "adopting under a released parent"),
        }
    }

    /// Decide how to read `id`.
    pub(crate) fn plan(&self, id: NodeId) -> Result<Plan> {
        let node = self.node(id)?;

        if let Cached::Ready(value) = node.cache.get() {
            if node.has_unset_mirror() {
                return Err(Error::violation(format!(
                    "node {id} is cached while one of its mirrors is unset"
                )));
            }
            return Ok(Plan::Cached(value));
        }

        let func = node
            .func
            .clone()
            .ok_or_else(|| Error::violation(format!("source node {id} has no value")))?;
        let inputs = (0..node.arity())
            .map(|slot| node.input(slot))
            .collect::<Result<Vec<_>>>()?;
        Ok(Plan::Recompute { func, inputs })
    }

    /// Refill an unset mirror with a value read straight from its parent.
    ///
    /// Nothing is propagated: the mirror is private to `id`, whose cache is
    /// already clear.
    pub(crate) fn resync(&mut self, id: NodeId, slot: usize, value: &Value) -> Result<()> {
        let mirror = self.node_mut(id)?.mirror_mut(slot)?;
        if mirror.is_unset() {
            mirror.set(Cached::Ready(value.clone()))?;
            trace!(node = %id, slot, "mirror resynced from parent");
        }
        Ok(())
    }

    /// Write a new value into a source node and cascade it.
    pub(crate) fn set_source(&mut self, id: NodeId, value: Value) -> Result<bool> {
        if self.node(id)?.kind != NodeKind::Source {
            return Err(Error::Immutability { what: "derived node" });
        }
        self.commit(id, value)
    }

    /// Store `value` as the node's own value; if it changed, push it to
    /// every dependent.
    pub(crate) fn commit(&mut self, id: NodeId, value: Value) -> Result<bool> {
        let (tick, changed) = self.node_mut(id)?.cache.set(Cached::Ready(value.clone()))?;
        if changed {
            trace!(node = %id, tick, "value committed");
            self.propagate(id, Cached::Ready(value))?;
        }
        Ok(changed)
    }

    /// Notify `child` through one edge that the value at `slot` is now
    /// `value`. Returns whether that cleared a valid cache, in which case the
    /// child's own dependents must hear about it.
    fn invalidate(
        &mut self,
        child: NodeId,
        slot: usize,
        value: Cached<Value>,
    ) -> Result<bool> {
        let Some(node) = self.get_mut(child) else {
            return Ok(false);
        };

        let (_, changed) = node.mirror_mut(slot)?.set(value)?;
        if !changed {
            return Ok(false);
        }
        let (_, cleared) = node.cache.set(Cached::Unset)?;
        if cleared {
            trace!(node = %child, slot, "cache cleared");
        }
        Ok(cleared)
    }

    /// Push `value`, the new value of `id`, through the graph.
    ///
    /// Work is kept on an explicit stack, so the depth of the graph is not
    /// bounded by the thread's stack. A node is cleared at most once per
    /// cascade, so it is queued at most once.
    fn propagate(&mut self, id: NodeId, value: Cached<Value>) -> Result<()> {
        let mut pending = vec![(id, value)];

        while let Some((id, value)) = pending.pop() {
            for (child, slot) in self.edges(id) {
                if self.invalidate(child, slot, value.clone())? {
                    pending.push((child, Cached::Unset));
                }
            }
        }
        Ok(())
    }

    /// Every `(dependent, slot)` edge leaving `id`, after dropping entries
    /// for dependents that are no longer live.
    fn edges(&mut self, id: NodeId) -> Vec<(NodeId, usize)> {
        let Some(node) = self.get_mut(id) else {
            return Vec::new();
        };
        let mut out: FanOut = std::mem::take(&mut node.out);

        out.retain(|child, _| {
            let live = self.is_live(*child);
            if !live {
                trace!(node = %id, dependent = %child, "pruned released dependent");
            }
            live
        });

        let edges = out
            .iter()
            .flat_map(|(child, slots)| slots.iter().map(move |&slot| (*child, slot)))
            .collect();

        if let Some(node) = self.get_mut(id) {
            node.out = out;
        }
        edges
    }

    /// Render a node as an expression.
    pub(crate) fn describe(&self, id: NodeId) -> String {
        match self.get(id) {
            Some(node) => self.describe_node(node),
            None => format!("<released {id}>"),
        }
    }

    /// Render a node, which need not be in the arena yet.
    pub(crate) fn describe_node(&self, node: &Node) -> String {
        self.render(node, 0)
    }

    fn render(&self, node: &Node, depth: usize) -> String {
        let Some(func) = &node.func else {
            return match &node.label {
                Some(label) => label.clone(),
                None => match node.cache.get() {
                    Cached::Ready(value) => format!("rx({value})"),
                    Cached::Unset => "rx(...)".to_owned(),
                },
            };
        };

        let operands: Vec<(String, Option<u8>)> = node
            .params
            .iter()
            .enumerate()
            .map(|(slot, param)| match param {
                Param::Parent { .. } if depth >= MAX_DESCRIBE_DEPTH => ("...".to_owned(), None),
                Param::Parent { id, .. } => match self.get(*id) {
                    Some(parent) => (self.render(parent, depth + 1), parent.precedence()),
                    None => (format!("<released {id}>"), None),
                },
                Param::Constant => match node.mirror(slot).map(|mirror| mirror.get()) {
                    Ok(Cached::Ready(value)) => (value.to_string(), None),
                    _ => ("...".to_owned(), None),
                },
                Param::Signal => ("<signal>".to_owned(), None),
            })
            .collect();

        func.render(&operands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{ops, StateCell};
    use std::rc::Rc;

    fn source(arena: &mut Arena, label: &str, value: i64) -> NodeId {
        arena.insert(Node::source(Some(label.into()), Value::from(value)))
    }

    /// Insert a cached derived node reading `parents` in order.
    fn derived(arena: &mut Arena, func: Func, parents: &[NodeId], value: i64) -> NodeId {
        let mut params = Vec::new();
        let mut bases = Vec::new();
        let mut mirrors = Vec::new();
        for (slot, parent) in parents.iter().enumerate() {
            let current = arena.node(*parent).unwrap().cache.get().into_ready().unwrap();
            params.push(Param::Parent { id: *parent, _owner: Rc::new(()) });
            bases.push(slot);
            mirrors.push(StateCell::var(current));
        }
        let mut node = Node::derived(func, params, bases, mirrors);
        node.cache = StateCell::var(Value::from(value));
        let id = arena.insert(node);
        for (slot, parent) in parents.iter().enumerate() {
            arena.adopt(*parent, id, [slot]);
        }
        id
    }

    fn is_cleared(arena: &Arena, id: NodeId) -> bool {
        arena.node(id).unwrap().cache.is_unset()
    }

    #[test]
    fn insert_and_remove_nodes() {
        let mut arena = Arena::default();

        let a = source(&mut arena, "a", 1);
        let b = source(&mut arena, "b", 2);
        assert_eq!(arena.len(), 2);

        assert!(arena.remove(a).is_some());
        assert_eq!(arena.len(), 1);
        assert!(!arena.is_live(a));
        assert!(arena.is_live(b));
        assert!(arena.remove(a).is_none());
    }

    #[test]
    fn reused_slots_get_a_new_generation() {
        let mut arena = Arena::default();

        let a = source(&mut arena, "a", 1);
        arena.remove(a);
        let c = source(&mut arena, "c", 3);

        assert_eq!(a.index(), c.index());
        assert_ne!(a, c);
        assert!(arena.get(a).is_none());
        assert_eq!(arena.describe(c), "c");
    }

    #[test]
    fn source_change_clears_transitive_dependents() {
        let mut arena = Arena::default();

        // a -> b -> c, and an unrelated d
        let a = source(&mut arena, "a", 1);
        let b = derived(&mut arena, ops::neg(), &[a], -1);
        let c = derived(&mut arena, ops::neg(), &[b], 1);
        let d = source(&mut arena, "d", 9);

        assert!(arena.set_source(a, Value::from(5)).unwrap());

        assert!(is_cleared(&arena, b));
        assert!(is_cleared(&arena, c));
        assert!(arena.node(c).unwrap().mirror(0).unwrap().is_unset());
        assert_eq!(arena.node(b).unwrap().mirror(0).unwrap().get(), Cached::Ready(Value::from(5)));
        assert!(!arena.node(d).unwrap().cache.is_unset());
    }

    #[test]
    fn unchanged_value_does_not_cascade() {
        let mut arena = Arena::default();

        let a = source(&mut arena, "a", 1);
        let b = derived(&mut arena, ops::neg(), &[a], -1);

        assert!(!arena.set_source(a, Value::from(1)).unwrap());
        assert!(!is_cleared(&arena, b));
        assert_eq!(arena.node(a).unwrap().cache.tick(), 0);
    }

    #[test]
    fn removing_a_dependent_unlinks_it_from_its_parents() {
        let mut arena = Arena::default();

        let a = source(&mut arena, "a", 1);
        let b = source(&mut arena, "b", 2);
        let sum = derived(&mut arena, ops::add(), &[a, b], 3);
        let kept = derived(&mut arena, ops::neg(), &[a], -1);
        assert_eq!(arena.node(a).unwrap().out.len(), 2);

        arena.remove(sum);
        assert_eq!(arena.node(a).unwrap().out.len(), 1);
        assert!(arena.node(a).unwrap().out.contains_key(&kept));
        assert!(arena.node(b).unwrap().out.is_empty());

        assert!(arena.set_source(a, Value::from(2)).unwrap());
        assert!(is_cleared(&arena, kept));
    }

    #[test]
    fn cascade_through_a_long_chain() {
        let mut arena = Arena::default();

        let a = source(&mut arena, "a", 1);
        let mut tail = a;
        for i in 0..10_000 {
            let value = if i % 2 == 0 { -1 } else { 1 };
            tail = derived(&mut arena, ops::neg(), &[tail], value);
        }

        assert!(arena.set_source(a, Value::from(2)).unwrap());
        assert!(is_cleared(&arena, tail));
        assert!(arena.node(tail).unwrap().mirror(0).unwrap().is_unset());
    }

    #[test]
    fn deep_descriptions_are_truncated() {
        let mut arena = Arena::default();

        let a = source(&mut arena, "a", 1);
        let mut tail = a;
        for _ in 0..1_000 {
            tail = derived(&mut arena, ops::abs(), &[tail], 1);
        }

        let description = arena.describe(tail);
        assert!(description.starts_with("abs(abs("));
        assert!(description.contains("..."));
        assert!(!description.contains("(a)"));
    }

    #[test]
    fn derived_nodes_cannot_be_set() {
        let mut arena = Arena::default();

        let a = source(&mut arena, "a", 1);
        let b = derived(&mut arena, ops::neg(), &[a], -1);

        assert!(matches!(
            arena.set_source(b, Value::from(3)),
            Err(Error::Immutability { what: "derived node" })
        ));
    }

    #[test]
    fn plan_pulls_unset_mirrors_from_parents() {
        let mut arena = Arena::default();

        let a = source(&mut arena, "a", 1);
        let b = derived(&mut arena, ops::neg(), &[a], -1);
        let c = derived(&mut arena, ops::add(), &[a, b], 0);

        arena.set_source(a, Value::from(2)).unwrap();

        match arena.plan(c).unwrap() {
            Plan::Recompute { inputs, .. } => {
                assert!(matches!(inputs[0], Input::Ready(Value::Int(2))));
                assert!(matches!(inputs[1], Input::Pull(id) if id == b));
            }
            Plan::Cached(_) => panic!("c should need recomputation"),
        }
        assert!(matches!(arena.plan(a).unwrap(), Plan::Cached(Value::Int(2))));
    }

    #[test]
    fn cached_node_with_unset_mirror_is_a_violation() {
        let mut arena = Arena::default();

        let a = source(&mut arena, "a", 1);
        let b = derived(&mut arena, ops::neg(), &[a], -1);
        arena
            .get_mut(b)
            .unwrap()
            .mirror_mut(0)
            .unwrap()
            .set(Cached::Unset)
            .unwrap();

        assert!(matches!(arena.plan(b), Err(Error::ConsistencyViolation(_))));
    }

    #[test]
    fn describe_renders_operator_precedence() {
        let mut arena = Arena::default();

        let a = source(&mut arena, "a", 1);
        let b = source(&mut arena, "b", 2);
        let sum = derived(&mut arena, ops::add(), &[a, b], 3);
        let product = derived(&mut arena, ops::mul(), &[sum, a], 3);

        assert_eq!(arena.describe(sum), "a + b");
        assert_eq!(arena.describe(product), "(a + b) * a");

        let anonymous = arena.insert(Node::source(None, Value::from(4)));
        assert_eq!(arena.describe(anonymous), "rx(4)");
    }
}
