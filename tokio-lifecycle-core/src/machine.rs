//! The transition executor: per-instance runtime context, the [`Stateful`]
//! contract and the [`invoke`] entry point.
//!
//! Ordering guarantee: the context is mutated under a sync mutex that is
//! never held across an await, so two near-simultaneous invocations on the
//! same instance always observe a consistent view: the second caller either
//! coalesces onto the in-flight settlement or preempts deterministically.

use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};

use crate::error::{BoxError, LifecycleError};
use crate::table::{Action, Transition, TransitionTable};

type Settlement = Option<Result<(), LifecycleError>>;

struct Active {
    transition: Arc<Transition>,
    epoch: u64,
    outcome: Arc<watch::Sender<Settlement>>,
}

struct Inner {
    current: Arc<str>,
    active: Option<Active>,
    epoch: u64,
}

/// Mutable runtime cell of one stateful instance: the current state plus the
/// transition in flight, if any.
///
/// Owned by the embedding object; the executor reaches it only through
/// [`Stateful::transition_context`].
pub struct TransitionContext {
    table: Arc<TransitionTable>,
    inner: Mutex<Inner>,
    observer: watch::Sender<Arc<str>>,
}

impl TransitionContext {
    pub fn new(table: Arc<TransitionTable>, initial: &str) -> Self {
        let current: Arc<str> = Arc::from(initial);
        Self {
            table,
            observer: watch::channel(current.clone()).0,
            inner: Mutex::new(Inner {
                current,
                active: None,
                epoch: 0,
            }),
        }
    }

    pub fn table(&self) -> &Arc<TransitionTable> {
        &self.table
    }

    /// Current state name.
    pub fn current(&self) -> Arc<str> {
        self.lock().current.clone()
    }

    /// The transition presently executing, if any.
    pub fn active_transition(&self) -> Option<Arc<Transition>> {
        self.lock().active.as_ref().map(|a| a.transition.clone())
    }

    /// Watch the state as it changes.
    pub fn subscribe(&self) -> watch::Receiver<Arc<str>> {
        self.observer.subscribe()
    }

    /// Resolves once the instance is in `state`.
    pub async fn wait_for(&self, state: &str) {
        let mut rx = self.subscribe();
        loop {
            if rx.borrow_and_update().as_ref() == state {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Contract between the executor and a stateful object: where the transition
/// context lives, how transition work is performed, and the policy hooks.
///
/// `state_changed`, `timeout_for` and `transition_name` are called with the
/// transition context locked; overrides must not call [`StatefulExt::state`],
/// [`StatefulExt::set_state`] or [`invoke`] on the same object from inside
/// them. `Display` supplies the object's identity in diagnostics.
pub trait Stateful: Display + Send + Sync + 'static {
    /// Storage contract: the per-instance transition context.
    fn transition_context(&self) -> &TransitionContext;

    /// Implementation slot for the actual transition work; dispatch on
    /// [`Transition::action`]. Defaults to an immediate successful no-op.
    fn perform(
        &self,
        transition: Arc<Transition>,
    ) -> impl Future<Output = Result<(), BoxError>> + Send {
        let _ = transition;
        async { Ok(()) }
    }

    /// Called on every actual state change, before the new state is stored.
    fn state_changed(&self, old_state: &str, new_state: &str) {
        let _ = (old_state, new_state);
    }

    /// Deadline for a transition; zero means unbounded.
    fn timeout_for(&self, transition: &Transition) -> Duration {
        transition.timeout()
    }

    /// Diagnostic name of a transition.
    fn transition_name(&self, transition: &Transition) -> String {
        transition.default_name()
    }

    /// Error surfaced when an action is not legal in the current state.
    fn illegal_transition(&self, action: &Action) -> LifecycleError {
        LifecycleError::IllegalTransition {
            action: action.name().to_string(),
            object: self.to_string(),
            state: self.transition_context().current().to_string(),
        }
    }
}

/// State accessor surface available on every [`Stateful`] object.
pub trait StatefulExt: Stateful {
    /// Current state name.
    fn state(&self) -> Arc<str> {
        self.transition_context().current()
    }

    /// Set the state directly. No transition runs; [`Stateful::state_changed`]
    /// fires if the state actually changes. This is the only way to move an
    /// instance outside of [`invoke`].
    fn set_state(&self, new_state: &str) {
        let ctx = self.transition_context();
        let mut inner = ctx.lock();
        let new_state: Arc<str> = Arc::from(new_state);
        apply_state(self, &mut inner, &new_state);
    }
}

impl<T: Stateful> StatefulExt for T {}

/// Perform `action_name` on `object`, driving it through the compiled
/// transition for its current state.
///
/// Evaluated fresh on every call:
///
/// 1. already in the action's completion state: resolves immediately;
/// 2. current state is an origin of the action: starts the transition,
///    first displacing any other transition in flight (which rolls the
///    instance back to that transition's origin and rejects its waiters);
/// 3. mid-flight on this action: returns the shared in-flight settlement;
/// 4. otherwise: rejects via [`Stateful::illegal_transition`].
pub async fn invoke<T: Stateful>(object: &Arc<T>, action_name: &str) -> Result<(), LifecycleError> {
    let ctx = object.transition_context();
    let Some(action) = ctx.table.action(action_name) else {
        return Err(LifecycleError::UnknownAction {
            action: action_name.to_string(),
        });
    };

    let mut rx = {
        let mut inner = ctx.lock();
        loop {
            if inner.current.as_ref() == action.target() {
                return Ok(());
            }

            if let Some(transition) = action.for_origin(&inner.current) {
                let transition = transition.clone();
                if let Some(active) = inner.active.take() {
                    // A competing transition is in flight: roll the instance
                    // back to where it started and reject its waiters, then
                    // re-evaluate this call from scratch.
                    let displaced = LifecycleError::Preempted {
                        name: object.transition_name(&active.transition),
                        action: action.name().to_string(),
                    };
                    warn!(object = %object, error = %displaced, "transition preempted");
                    active.outcome.send_replace(Some(Err(displaced)));
                    let rollback = active.transition.origin.clone();
                    apply_state(object.as_ref(), &mut inner, &rollback);
                    continue;
                }
                break begin(object, &mut inner, transition);
            }

            if let Some(active) = &inner.active {
                if action.for_during(active.transition.during()).is_some() {
                    // Mid-flight for this action: every caller observes the
                    // single shared settlement.
                    break active.outcome.subscribe();
                }
            }

            drop(inner);
            return Err(object.illegal_transition(action));
        }
    };

    loop {
        {
            let settled = rx.borrow_and_update();
            if let Some(result) = settled.as_ref() {
                return result.clone();
            }
        }
        if rx.changed().await.is_err() {
            return Err(LifecycleError::Interrupted {
                action: action_name.to_string(),
            });
        }
    }
}

/// Activate `transition` and spawn its driver. Called with the context locked.
fn begin<T: Stateful>(
    object: &Arc<T>,
    inner: &mut Inner,
    transition: Arc<Transition>,
) -> watch::Receiver<Settlement> {
    inner.epoch += 1;
    let epoch = inner.epoch;
    let (tx, rx) = watch::channel(None);
    let outcome = Arc::new(tx);

    inner.active = Some(Active {
        transition: transition.clone(),
        epoch,
        outcome: outcome.clone(),
    });
    let during = transition.during.clone();
    apply_state(object.as_ref(), inner, &during);

    let deadline = object.timeout_for(&transition);
    let name = object.transition_name(&transition);
    debug!(object = %object, transition = %name, "transition started");

    let driver = Arc::clone(object);
    tokio::spawn(async move {
        let work = tokio::spawn({
            let object = driver.clone();
            let transition = transition.clone();
            async move { object.perform(transition).await }
        });
        let result = deadline_guard(deadline, &name, work).await;
        settle(&driver, &transition, epoch, &outcome, result);
    });

    rx
}

/// Race `work` against the deadline. Zero awaits unbounded; on expiry the
/// work task is aborted and its eventual settlement ignored. The timer is
/// dropped with the race, so none leaks past settlement.
async fn deadline_guard(
    deadline: Duration,
    name: &str,
    mut work: JoinHandle<Result<(), BoxError>>,
) -> Result<(), LifecycleError> {
    if deadline.is_zero() {
        return finished(name, work.await);
    }
    match tokio::time::timeout(deadline, &mut work).await {
        Ok(joined) => finished(name, joined),
        Err(_) => {
            work.abort();
            warn!(transition = %name, ?deadline, "transition timed out");
            Err(LifecycleError::Timeout {
                name: name.to_string(),
                timeout: deadline,
            })
        }
    }
}

fn finished(
    name: &str,
    joined: Result<Result<(), BoxError>, JoinError>,
) -> Result<(), LifecycleError> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(LifecycleError::TransitionFailed {
            name: name.to_string(),
            source: Arc::from(source),
        }),
        Err(join) => Err(LifecycleError::TransitionFailed {
            name: name.to_string(),
            source: Arc::new(join),
        }),
    }
}

/// Apply the outcome of a transition run: advance to the target or rejected
/// state, clear the active slot and broadcast the settlement. A run displaced
/// in the meantime was already settled by the preempting call and must not
/// touch state.
fn settle<T: Stateful>(
    object: &Arc<T>,
    transition: &Arc<Transition>,
    epoch: u64,
    outcome: &watch::Sender<Settlement>,
    result: Result<(), LifecycleError>,
) {
    let ctx = object.transition_context();
    let mut inner = ctx.lock();

    if inner.active.as_ref().is_none_or(|active| active.epoch != epoch) {
        return;
    }
    inner.active = None;

    let next = match &result {
        Ok(()) => transition.target.clone(),
        Err(_) => transition.rejected.clone(),
    };
    apply_state(object.as_ref(), &mut inner, &next);
    debug!(
        object = %object,
        transition = %transition.default_name(),
        state = %next,
        "transition settled"
    );
    outcome.send_replace(Some(result));
}

fn apply_state<T: Stateful + ?Sized>(object: &T, inner: &mut Inner, new_state: &Arc<str>) {
    if inner.current != *new_state {
        let old = inner.current.clone();
        object.state_changed(&old, new_state);
        inner.current = new_state.clone();
        object
            .transition_context()
            .observer
            .send_replace(new_state.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{TransitionDef, TransitionTable};

    fn table() -> Arc<TransitionTable> {
        Arc::new(
            TransitionTable::builder()
                .transition("start", "stopped", TransitionDef::new("starting", "running"))
                .build(),
        )
    }

    #[test]
    fn context_starts_in_initial_state() {
        let ctx = TransitionContext::new(table(), "stopped");
        assert_eq!(ctx.current().as_ref(), "stopped");
        assert!(ctx.active_transition().is_none());
    }

    #[test]
    fn subscribe_sees_initial_state() {
        let ctx = TransitionContext::new(table(), "stopped");
        let rx = ctx.subscribe();
        assert_eq!(rx.borrow().as_ref(), "stopped");
    }

    struct Probe {
        lifecycle: TransitionContext,
    }

    impl std::fmt::Display for Probe {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("probe")
        }
    }

    impl Stateful for Probe {
        fn transition_context(&self) -> &TransitionContext {
            &self.lifecycle
        }
    }

    #[tokio::test]
    async fn default_implementation_is_noop_success() {
        let probe = Arc::new(Probe {
            lifecycle: TransitionContext::new(table(), "stopped"),
        });

        invoke(&probe, "start").await.unwrap();
        assert_eq!(probe.lifecycle.current().as_ref(), "running");
    }
}
