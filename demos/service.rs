//! Example: service lifecycle driven through a compiled transition table.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_lifecycle::{
    BoxError, Stateful, StatefulExt, Transition, TransitionContext, TransitionDef,
    TransitionTable, invoke,
};

struct Listener;

impl Listener {
    async fn bind(&self) -> Result<(), BoxError> {
        // Simulate async setup work
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(())
    }

    async fn close(&self) -> Result<(), BoxError> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(())
    }
}

struct Service {
    lifecycle: TransitionContext,
    listener: Listener,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("echo service")
    }
}

impl Stateful for Service {
    fn transition_context(&self) -> &TransitionContext {
        &self.lifecycle
    }

    fn perform(
        &self,
        transition: Arc<Transition>,
    ) -> impl Future<Output = Result<(), BoxError>> + Send {
        async move {
            match transition.action() {
                "start" => self.listener.bind().await,
                "stop" => self.listener.close().await,
                _ => Ok(()),
            }
        }
    }

    fn state_changed(&self, old_state: &str, new_state: &str) {
        println!("{self}: {old_state} -> {new_state}");
    }
}

#[tokio::main]
async fn main() {
    let table = Arc::new(
        TransitionTable::builder()
            .transition(
                "start",
                "stopped",
                TransitionDef::new("starting", "running").timeout(Duration::from_secs(30)),
            )
            .transition(
                "stop",
                "running",
                TransitionDef::new("stopping", "stopped").timeout(Duration::from_secs(10)),
            )
            .transition("stop", "starting", TransitionDef::new("stopping", "stopped"))
            .build(),
    );

    let service = Arc::new(Service {
        lifecycle: TransitionContext::new(table, "stopped"),
        listener: Listener,
    });

    invoke(&service, "start").await.unwrap();
    println!("up, state = {}", service.state());

    // a second start while running is a no-op
    invoke(&service, "start").await.unwrap();

    invoke(&service, "stop").await.unwrap();
    println!("down, state = {}", service.state());
}
