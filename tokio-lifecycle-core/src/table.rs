//! Compiled transition tables.
//!
//! A table is authored as a flat list of `(action, origin, definition)`
//! entries and compiled into per-action lookups plus a registry of every
//! referenced state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Failure state a transition falls back to when no explicit `rejected`
/// state is declared.
pub const FAILED: &str = "failed";

/// Author input for one edge of an action.
///
/// `during` is the transient state occupied while the transition work runs,
/// `target` the state reached on success. A zero timeout (the default) means
/// the work is awaited unbounded.
#[derive(Debug, Clone)]
pub struct TransitionDef {
    during: String,
    target: String,
    timeout: Duration,
    rejected: Option<String>,
}

impl TransitionDef {
    pub fn new(during: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            during: during.into(),
            target: target.into(),
            timeout: Duration::ZERO,
            rejected: None,
        }
    }

    /// Deadline for the transition work.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// State reached when the transition work fails, instead of [`FAILED`].
    pub fn rejected(mut self, state: impl Into<String>) -> Self {
        self.rejected = Some(state.into());
        self
    }
}

/// One compiled edge of the machine.
///
/// Immutable after compilation and shared between every instance driven by
/// the same table.
#[derive(Debug)]
pub struct Transition {
    pub(crate) action: Arc<str>,
    pub(crate) origin: Arc<str>,
    pub(crate) during: Arc<str>,
    pub(crate) target: Arc<str>,
    pub(crate) rejected: Arc<str>,
    pub(crate) timeout: Duration,
}

impl Transition {
    /// Name of the action this edge belongs to.
    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn during(&self) -> &str {
        &self.during
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn rejected(&self) -> &str {
        &self.rejected
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Diagnostic name, e.g. `start:stopped->running`.
    pub fn default_name(&self) -> String {
        format!("{}:{}->{}", self.action, self.origin, self.target)
    }
}

/// A named verb grouping its transitions by origin and by during state.
#[derive(Debug)]
pub struct Action {
    name: Arc<str>,
    by_origin: HashMap<Arc<str>, Arc<Transition>>,
    by_during: HashMap<Arc<str>, Arc<Transition>>,
    target: Arc<str>,
}

impl Action {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The action's completion state, used for the "already there" short
    /// circuit. With several origin entries the last compiled one wins.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Transition leaving the given origin state, if any.
    pub fn for_origin(&self, state: &str) -> Option<&Arc<Transition>> {
        self.by_origin.get(state)
    }

    /// Transition whose transient marker is the given state, if any.
    pub fn for_during(&self, state: &str) -> Option<&Arc<Transition>> {
        self.by_during.get(state)
    }

    pub fn transitions(&self) -> impl Iterator<Item = &Arc<Transition>> {
        self.by_origin.values()
    }
}

/// Registry entry for one state: the transitions that leave or pass through
/// it, keyed by their origin. Introspection only, never consulted by the
/// executor.
#[derive(Debug)]
pub struct StateInfo {
    name: Arc<str>,
    transitions: HashMap<Arc<str>, Arc<Transition>>,
}

impl StateInfo {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transition_from(&self, origin: &str) -> Option<&Arc<Transition>> {
        self.transitions.get(origin)
    }

    pub fn transitions(&self) -> impl Iterator<Item = &Arc<Transition>> {
        self.transitions.values()
    }
}

/// The compiled pair: actions with their lookups, plus the state registry.
#[derive(Debug, Default)]
pub struct TransitionTable {
    actions: HashMap<Arc<str>, Action>,
    states: HashMap<Arc<str>, StateInfo>,
}

impl TransitionTable {
    pub fn builder() -> TransitionTableBuilder {
        TransitionTableBuilder::default()
    }

    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.get(name)
    }

    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.actions.values()
    }

    pub fn state(&self, name: &str) -> Option<&StateInfo> {
        self.states.get(name)
    }

    pub fn states(&self) -> impl Iterator<Item = &StateInfo> {
        self.states.values()
    }
}

/// Collects `(action, origin, definition)` entries and compiles them.
#[derive(Debug, Default)]
pub struct TransitionTableBuilder {
    entries: Vec<(String, String, TransitionDef)>,
}

impl TransitionTableBuilder {
    /// Declare that `action`, invoked while in `origin`, runs the given edge.
    /// A later entry for the same action and origin replaces the earlier one.
    pub fn transition(
        mut self,
        action: impl Into<String>,
        origin: impl Into<String>,
        def: TransitionDef,
    ) -> Self {
        self.entries.push((action.into(), origin.into(), def));
        self
    }

    pub fn build(self) -> TransitionTable {
        let mut actions: HashMap<Arc<str>, Action> = HashMap::new();
        let mut states: HashMap<Arc<str>, StateInfo> = HashMap::new();

        for (action_name, origin, def) in self.entries {
            let action_name: Arc<str> = Arc::from(action_name.as_str());
            let origin: Arc<str> = Arc::from(origin.as_str());
            let during: Arc<str> = Arc::from(def.during.as_str());
            let target: Arc<str> = Arc::from(def.target.as_str());
            let rejected: Arc<str> = Arc::from(def.rejected.as_deref().unwrap_or(FAILED));

            let transition = Arc::new(Transition {
                action: action_name.clone(),
                origin: origin.clone(),
                during: during.clone(),
                target: target.clone(),
                rejected: rejected.clone(),
                timeout: def.timeout,
            });

            let action = actions.entry(action_name.clone()).or_insert_with(|| Action {
                name: action_name.clone(),
                by_origin: HashMap::new(),
                by_during: HashMap::new(),
                target: target.clone(),
            });
            action.by_origin.insert(origin.clone(), transition.clone());
            action.by_during.insert(during.clone(), transition.clone());
            action.target = target.clone();

            register(&mut states, &origin, Some(&transition));
            register(&mut states, &during, Some(&transition));
            register(&mut states, &target, None);
            register(&mut states, &rejected, None);
        }

        TransitionTable { actions, states }
    }
}

fn register(
    states: &mut HashMap<Arc<str>, StateInfo>,
    name: &Arc<str>,
    transition: Option<&Arc<Transition>>,
) {
    let info = states.entry(name.clone()).or_insert_with(|| StateInfo {
        name: name.clone(),
        transitions: HashMap::new(),
    });
    if let Some(transition) = transition {
        info.transitions
            .insert(transition.origin.clone(), transition.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lifecycle_table() -> TransitionTable {
        TransitionTable::builder()
            .transition(
                "start",
                "stopped",
                TransitionDef::new("starting", "running")
                    .timeout(Duration::from_millis(200))
                    .rejected("failed_special"),
            )
            .transition(
                "stop",
                "running",
                TransitionDef::new("stopping", "stopped").timeout(Duration::from_millis(100)),
            )
            .transition("stop", "starting", TransitionDef::new("stopping", "stopped"))
            .build()
    }

    #[test]
    fn lookup_by_origin_and_during() {
        let table = lifecycle_table();

        let start = table.action("start").unwrap();
        let t = start.for_origin("stopped").unwrap();
        assert_eq!(t.action(), "start");
        assert_eq!(t.during(), "starting");
        assert_eq!(t.target(), "running");
        assert_eq!(t.timeout(), Duration::from_millis(200));
        assert!(start.for_origin("running").is_none());
        assert!(start.for_during("starting").is_some());

        let stop = table.action("stop").unwrap();
        assert!(stop.for_origin("running").is_some());
        assert!(stop.for_origin("starting").is_some());
        assert_eq!(stop.for_during("stopping").unwrap().target(), "stopped");

        assert!(table.action("swim").is_none());
    }

    #[test]
    fn rejected_defaults_to_failed() {
        let table = lifecycle_table();

        let start = table.action("start").unwrap();
        assert_eq!(start.for_origin("stopped").unwrap().rejected(), "failed_special");

        let stop = table.action("stop").unwrap();
        assert_eq!(stop.for_origin("running").unwrap().rejected(), FAILED);
    }

    #[test]
    fn every_referenced_state_is_registered() {
        let table = lifecycle_table();

        for name in [
            "stopped",
            "starting",
            "running",
            "stopping",
            "failed",
            "failed_special",
        ] {
            assert!(table.state(name).is_some(), "missing state {name}");
        }

        // target/rejected states carry no outgoing registration of their own
        let failed = table.state("failed_special").unwrap();
        assert_eq!(failed.transitions().count(), 0);

        // origin and during states record the transitions touching them
        let stopping = table.state("stopping").unwrap();
        assert!(stopping.transition_from("running").is_some());
        assert!(stopping.transition_from("starting").is_some());
    }

    #[test]
    fn last_compiled_target_is_canonical() {
        let table = TransitionTable::builder()
            .transition("drain", "running", TransitionDef::new("draining", "idle"))
            .transition("drain", "idle", TransitionDef::new("draining", "empty"))
            .build();

        assert_eq!(table.action("drain").unwrap().target(), "empty");
    }

    #[test]
    fn duplicate_origin_entry_replaces_earlier() {
        let table = TransitionTable::builder()
            .transition("start", "stopped", TransitionDef::new("starting", "running"))
            .transition("start", "stopped", TransitionDef::new("warming", "hot"))
            .build();

        let start = table.action("start").unwrap();
        assert_eq!(start.for_origin("stopped").unwrap().during(), "warming");
        assert_eq!(start.target(), "hot");
    }

    #[test]
    fn default_name_formats_edge() {
        let table = lifecycle_table();
        let t = table.action("start").unwrap().for_origin("stopped").unwrap();
        assert_eq!(t.default_name(), "start:stopped->running");
    }
}
