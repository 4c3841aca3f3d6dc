//! Error taxonomy of the transition executor.

use std::sync::Arc;
use std::time::Duration;

/// Boxed error carried out of transition implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure surfaced by an action invocation.
///
/// A settlement is broadcast to every caller coalesced onto the same
/// in-flight transition, so the type is `Clone`; implementation failures keep
/// their cause behind an `Arc`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LifecycleError {
    /// The table defines no action of this name.
    #[error("no `{action}` action defined")]
    UnknownAction { action: String },

    /// The action has no transition for the instance's current state and the
    /// instance is not mid-flight on a compatible transition.
    #[error("can't {action} {object} in {state} state")]
    IllegalTransition {
        action: String,
        object: String,
        state: String,
    },

    /// The implementation did not settle within the transition deadline. The
    /// instance moved to the transition's rejected state.
    #[error("{name} request not resolved within {}ms", .timeout.as_millis())]
    Timeout { name: String, timeout: Duration },

    /// The transition was displaced by a newer action call; the instance
    /// rolled back to the displaced transition's origin state.
    #[error("terminate {name} to prepare {action}")]
    Preempted { name: String, action: String },

    /// The implementation failed (error or panic). The instance moved to the
    /// transition's rejected state.
    #[error("{name} failed")]
    TransitionFailed {
        name: String,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// The transition driver disappeared before settling. Only observable
    /// while the runtime is shutting down.
    #[error("{action} interrupted before settling")]
    Interrupted { action: String },
}
