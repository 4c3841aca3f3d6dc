//! # tokio-lifecycle
//!
//! Declarative lifecycle state machines for Tokio: a transition table is
//! compiled once, then [`invoke`] drives any number of instances through it,
//! `origin -> during -> target`, with at most one transition in flight per
//! instance, coalescing of concurrent callers, per-transition deadlines and
//! preemption.
//!
//! ## Example
//!
//! ```rust
//! use std::fmt;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use tokio_lifecycle::{
//!     Stateful, StatefulExt, TransitionContext, TransitionDef, TransitionTable, invoke,
//! };
//!
//! struct Service {
//!     lifecycle: TransitionContext,
//! }
//!
//! impl fmt::Display for Service {
//!     fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
//!         f.write_str("service")
//!     }
//! }
//!
//! impl Stateful for Service {
//!     fn transition_context(&self) -> &TransitionContext {
//!         &self.lifecycle
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let table = Arc::new(
//!     TransitionTable::builder()
//!         .transition(
//!             "start",
//!             "stopped",
//!             TransitionDef::new("starting", "running").timeout(Duration::from_millis(200)),
//!         )
//!         .transition("stop", "running", TransitionDef::new("stopping", "stopped"))
//!         .build(),
//! );
//!
//! let service = Arc::new(Service {
//!     lifecycle: TransitionContext::new(table, "stopped"),
//! });
//!
//! invoke(&service, "start").await.unwrap();
//! assert_eq!(service.state().as_ref(), "running");
//! # }
//! ```

#[doc(inline)]
pub use tokio_lifecycle_core::*;
