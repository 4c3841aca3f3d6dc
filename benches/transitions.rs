use std::fmt;
use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use tokio::runtime::Runtime;
use tokio_lifecycle::{Stateful, TransitionContext, TransitionDef, TransitionTable, invoke};

struct BenchService {
    lifecycle: TransitionContext,
}

impl fmt::Display for BenchService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("bench service")
    }
}

impl Stateful for BenchService {
    fn transition_context(&self) -> &TransitionContext {
        &self.lifecycle
    }
}

fn lifecycle_table() -> Arc<TransitionTable> {
    Arc::new(
        TransitionTable::builder()
            .transition("start", "stopped", TransitionDef::new("starting", "running"))
            .transition("stop", "running", TransitionDef::new("stopping", "stopped"))
            .build(),
    )
}

fn benchmark_cycle_throughput(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let table = lifecycle_table();

    c.bench_function("lifecycle_1000_cycles", |b| {
        b.to_async(&rt).iter(|| {
            let table = table.clone();
            async move {
                let service = Arc::new(BenchService {
                    lifecycle: TransitionContext::new(table, "stopped"),
                });

                for _ in 0..1000 {
                    invoke(&service, "start").await.unwrap();
                    invoke(&service, "stop").await.unwrap();
                }
            }
        })
    });
}

criterion_group!(benches, benchmark_cycle_throughput);
criterion_main!(benches);
