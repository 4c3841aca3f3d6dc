//! Core runtime for tokio-lifecycle.
//!
//! [`TransitionTable`] compiles a declarative action table; [`invoke`] drives
//! a [`Stateful`] object through it with at most one transition in flight per
//! instance, coalescing of concurrent callers, per-transition deadlines and
//! preemption.

mod error;
mod machine;
mod table;

pub use error::{BoxError, LifecycleError};
pub use machine::{Stateful, StatefulExt, TransitionContext, invoke};
pub use table::{
    Action, FAILED, StateInfo, Transition, TransitionDef, TransitionTable, TransitionTableBuilder,
};
