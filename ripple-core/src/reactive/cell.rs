//! State Cells
//!
//! A [`StateCell`] is the smallest unit of versioned state: a `(tick, value)`
//! pair. Every node in the graph stores its own value in one, and a derived
//! node keeps one more per distinct argument (its *mirror* of that argument).
//!
//! # Variants
//!
//! - `Constant`: fixed value, tick is always [`CONSTANT_TICK`].
//! - `Signal`: value sampled on demand from a zero-argument function; the
//!   tick is the number of nanoseconds elapsed since the cell was created.
//! - `Var`: writable; the tick starts at 0 and advances by exactly one per
//!   real change.
//!
//! # Unset
//!
//! A cell may hold [`Cached::Unset`] instead of a value. Unset is a separate
//! tag, so no legitimate payload can ever compare equal to it.

use std::fmt;
use std::rc::Rc;
use std::time::Instant;

use crate::error::{Error, Result};

use super::value::Value;

/// Version counter of a cell.
pub type Tick = i64;

/// Tick reported by constant cells.
pub const CONSTANT_TICK: Tick = -1;

/// A value, or the absence of one.
#[derive(Debug, Clone, PartialEq)]
pub enum Cached<V> {
    Unset,
    Ready(V),
}

impl<V> Cached<V> {
    pub fn is_unset(&self) -> bool {
        matches!(self, Cached::Unset)
    }

    pub fn as_ready(&self) -> Option<&V> {
        match self {
            Cached::Ready(value) => Some(value),
            Cached::Unset => None,
        }
    }

    pub fn into_ready(self) -> Option<V> {
        match self {
            Cached::Ready(value) => Some(value),
            Cached::Unset => None,
        }
    }
}

impl<V> From<Option<V>> for Cached<V> {
    fn from(value: Option<V>) -> Self {
        value.map_or(Cached::Unset, Cached::Ready)
    }
}

/// Types whose concrete kind can be compared at runtime.
///
/// Variable cells use this to keep the kind of their value stable.
pub trait Kinded {
    fn kind_name(&self) -> &'static str;
}

impl Kinded for Value {
    fn kind_name(&self) -> &'static str {
        self.kind()
    }
}

/// Zero-argument function backing a signal cell.
pub type SignalFn<V> = Rc<dyn Fn() -> V>;

fn elapsed_ticks(created: Instant) -> Tick {
    Tick::try_from(created.elapsed().as_nanos()).unwrap_or(Tick::MAX)
}

/// A versioned value holder.
pub enum StateCell<V> {
    Constant(V),
    Signal { func: SignalFn<V>, created: Instant },
    Var { tick: Tick, value: Cached<V> },
}

impl<V> StateCell<V>
where
    V: Clone + PartialEq + Kinded,
{
    pub fn constant(value: V) -> Self {
        StateCell::Constant(value)
    }

    pub fn signal<F>(func: F) -> Self
    where
        F: Fn() -> V + 'static,
    {
        Self::from_signal_fn(Rc::new(func))
    }

    pub fn from_signal_fn(func: SignalFn<V>) -> Self {
        StateCell::Signal {
            func,
            created: Instant::now(),
        }
    }

    /// A variable at tick 0 holding `value`.
    pub fn var(value: V) -> Self {
        StateCell::Var {
            tick: 0,
            value: Cached::Ready(value),
        }
    }

    /// A variable at tick 0 holding nothing yet.
    pub fn unset() -> Self {
        StateCell::Var {
            tick: 0,
            value: Cached::Unset,
        }
    }

    /// Read the `(tick, value)` pair.
    pub fn item(&self) -> (Tick, Cached<V>) {
        match self {
            StateCell::Constant(value) => (CONSTANT_TICK, Cached::Ready(value.clone())),
            StateCell::Signal { func, created } => {
                let value = func();
                (elapsed_ticks(*created), Cached::Ready(value))
            }
            StateCell::Var { tick, value } => (*tick, value.clone()),
        }
    }

    pub fn get(&self) -> Cached<V> {
        self.item().1
    }

    pub fn tick(&self) -> Tick {
        match self {
            StateCell::Constant(_) => CONSTANT_TICK,
            StateCell::Signal { created, .. } => elapsed_ticks(*created),
            StateCell::Var { tick, .. } => *tick,
        }
    }

    /// Whether the cell currently holds nothing.
    ///
    /// Constants and signals always hold a value.
    pub fn is_unset(&self) -> bool {
        matches!(
            self,
            StateCell::Var {
                value: Cached::Unset,
                ..
            }
        )
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, StateCell::Constant(_))
    }

    pub fn is_readonly(&self) -> bool {
        !matches!(self, StateCell::Var { .. })
    }

    /// The backing function of a signal cell.
    pub fn signal_fn(&self) -> Option<SignalFn<V>> {
        match self {
            StateCell::Signal { func, .. } => Some(Rc::clone(func)),
            _ => None,
        }
    }

    /// Store `new`, returning the resulting tick and whether anything changed.
    ///
    /// Storing a value equal to the current one leaves the tick alone. Only
    /// variables accept writes, and a variable holding a value refuses one of
    /// a different kind.
    pub fn set(&mut self, new: Cached<V>) -> Result<(Tick, bool)> {
        match self {
            StateCell::Constant(_) => Err(Error::Immutability { what: "constant" }),
            StateCell::Signal { .. } => Err(Error::Immutability { what: "signal" }),
            StateCell::Var { tick, value } => {
                if let (Cached::Ready(old), Cached::Ready(incoming)) = (&*value, &new) {
                    let (expected, found) = (old.kind_name(), incoming.kind_name());
                    if expected != found {
                        return Err(Error::TypeMismatch { expected, found });
                    }
                }

                if *value == new {
                    return Ok((*tick, false));
                }

                // a tick that cannot advance by exactly one is fatal
                let next = tick
                    .checked_add(1)
                    .ok_or_else(|| Error::violation(format!("tick {tick} cannot advance")))?;
                *value = new;
                *tick = next;
                Ok((next, true))
            }
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for StateCell<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateCell::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            StateCell::Signal { created, .. } => f
                .debug_struct("Signal")
                .field("created", created)
                .finish_non_exhaustive(),
            StateCell::Var { tick, value } => f
                .debug_struct("Var")
                .field("tick", tick)
                .field("value", value)
                .finish(),
        }
    }
}
