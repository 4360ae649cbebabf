//! Runs independent account-scoped workers side by side and waits for all of them.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use tokio::{task::JoinSet, time::Instant};
use tracing::{info, warn};

use crate::util::unix_millis;

/// A unit of work that owns everything it needs, including its own connection.
#[async_trait]
pub trait Worker: Send + 'static {
    type Output: Send + 'static;

    fn name(&self) -> String;

    async fn run(self) -> Self::Output;
}

#[derive(Debug)]
pub struct WorkerResult<T> {
    pub name: String,
    /// `Err` holds the panic or cancellation message of a worker that did not finish.
    pub outcome: Result<T, String>,
}

#[derive(Debug)]
pub struct RunSummary<T> {
    pub started_at_ms: u64,
    pub finished_at_ms: u64,
    pub elapsed: Duration,
    /// In the order the workers were passed in.
    pub results: Vec<WorkerResult<T>>,
}

impl<T> RunSummary<T> {
    pub fn completed(&self) -> impl Iterator<Item = (&str, &T)> {
        self.results
            .iter()
            .filter_map(|r| r.outcome.as_ref().ok().map(|t| (r.name.as_str(), t)))
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_err()).count()
    }
}

/// Zero workers is a no-op, one runs inline on the current task, more get a
/// task each. One worker failing never stops the others.
pub async fn run_all<W: Worker>(workers: Vec<W>) -> RunSummary<W::Output> {
    let started_at_ms = unix_millis();
    let start = Instant::now();
    info!("starting {} worker(s) at {started_at_ms}", workers.len());

    let results = match workers.len() {
        0 => vec![],
        1 => {
            let mut results = vec![];
            for worker in workers {
                let name = worker.name();
                results.push(WorkerResult {
                    name,
                    outcome: Ok(worker.run().await),
                });
            }
            results
        }
        _ => join_concurrently(workers).await,
    };

    let summary = RunSummary {
        started_at_ms,
        finished_at_ms: unix_millis(),
        elapsed: start.elapsed(),
        results,
    };
    info!(
        "all workers finished at {} ({:?} elapsed, {} failed)",
        summary.finished_at_ms,
        summary.elapsed,
        summary.failed()
    );
    summary
}

async fn join_concurrently<W: Worker>(workers: Vec<W>) -> Vec<WorkerResult<W::Output>> {
    let mut set = JoinSet::new();
    let mut slots = HashMap::new();
    let mut results = workers.iter().map(|_| None).collect::<Vec<_>>();

    for (idx, worker) in workers.into_iter().enumerate() {
        let name = worker.name();
        let handle = set.spawn(worker.run());
        slots.insert(handle.id(), (idx, name));
    }

    while let Some(joined) = set.join_next_with_id().await {
        let (id, outcome) = match joined {
            Ok((id, output)) => (id, Ok(output)),
            Err(e) => (e.id(), Err(e.to_string())),
        };
        let Some((idx, name)) = slots.remove(&id) else {
            continue;
        };
        if let Err(e) = &outcome {
            warn!("worker {name} failed: {e}");
        }
        results[idx] = Some(WorkerResult { name, outcome });
    }

    results.into_iter().flatten().collect()
}
