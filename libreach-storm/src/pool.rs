use crate::{pipeline::PipelineError, prober::Prober, types::ProbeOutcome};
use std::sync::Arc;
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinSet,
};
use tracing::trace;

type SharedReceiver = Arc<Mutex<mpsc::Receiver<String>>>;

/// Fixed set of workers pulling domains from one bounded queue.
pub struct WorkerPool {
    workers: JoinSet<Result<usize, PipelineError>>,
}

impl WorkerPool {
    /// Starts `workers` tasks and returns the pool with the sending half of
    /// its input queue. Dropping that sender closes the queue; each worker
    /// exits once the queue is closed and drained.
    ///
    /// The outcome senders are moved into the workers, so both outcome
    /// queues close as soon as the last worker exits.
    pub fn spawn(
        workers: usize,
        prober: Prober,
        success_tx: mpsc::Sender<ProbeOutcome>,
        failure_tx: mpsc::Sender<ProbeOutcome>,
    ) -> Result<(Self, mpsc::Sender<String>), PipelineError> {
        if workers == 0 {
            return Err(PipelineError::NoWorkers);
        }

        let (input_tx, input_rx) = mpsc::channel(workers);
        let input_rx: SharedReceiver = Arc::new(Mutex::new(input_rx));

        let mut set = JoinSet::new();
        for id in 0..workers {
            set.spawn(work(
                id,
                Arc::clone(&input_rx),
                prober.clone(),
                success_tx.clone(),
                failure_tx.clone(),
            ));
        }

        Ok((Self { workers: set }, input_tx))
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Waits for every worker to exit and returns how many domains they
    /// processed. The first fatal error is returned immediately; dropping
    /// the pool aborts the workers still running.
    pub async fn join(mut self) -> Result<usize, PipelineError> {
        let mut processed = 0;
        while let Some(result) = self.workers.join_next().await {
            match result {
                Ok(Ok(count)) => processed += count,
                Ok(Err(e)) => return Err(e),
                Err(join_error) => return Err(PipelineError::TaskPanicked(join_error.to_string())),
            }
        }
        Ok(processed)
    }
}

async fn work(
    id: usize,
    input: SharedReceiver,
    prober: Prober,
    success_tx: mpsc::Sender<ProbeOutcome>,
    failure_tx: mpsc::Sender<ProbeOutcome>,
) -> Result<usize, PipelineError> {
    let mut processed = 0;

    loop {
        let next = input.lock().await.recv().await;
        let Some(domain) = next else {
            break;
        };

        let outcome = prober.probe_one(&domain).await?;
        let tx = if outcome.is_success() {
            &success_tx
        } else {
            &failure_tx
        };
        tx.send(outcome)
            .await
            .map_err(|_| PipelineError::QueueClosed)?;
        processed += 1;
    }

    trace!(worker = id, processed, "worker finished");
    Ok(processed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{filter::FilterSet, types::ProbeConfig};

    fn rejecting_prober() -> Prober {
        // nothing matches an empty filter set, so no request leaves the process
        Prober::new(Arc::new(FilterSet::new()), ProbeConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn zero_workers_is_rejected() {
        let (success_tx, _success_rx) = mpsc::channel(1);
        let (failure_tx, _failure_rx) = mpsc::channel(1);
        let result = WorkerPool::spawn(0, rejecting_prober(), success_tx, failure_tx);
        assert!(matches!(result, Err(PipelineError::NoWorkers)));
    }

    #[tokio::test]
    async fn spawns_requested_worker_count() {
        let (success_tx, _success_rx) = mpsc::channel(1);
        let (failure_tx, _failure_rx) = mpsc::channel(1);
        let (pool, input_tx) =
            WorkerPool::spawn(4, rejecting_prober(), success_tx, failure_tx).unwrap();
        assert_eq!(pool.len(), 4);
        assert!(!pool.is_empty());

        drop(input_tx);
        assert_eq!(pool.join().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn every_domain_yields_one_outcome() {
        let (success_tx, mut success_rx) = mpsc::channel(1);
        let (failure_tx, mut failure_rx) = mpsc::channel(1);
        let (pool, input_tx) =
            WorkerPool::spawn(3, rejecting_prober(), success_tx, failure_tx).unwrap();

        let collect = tokio::spawn(async move {
            let mut failures = Vec::new();
            while let Some(outcome) = failure_rx.recv().await {
                failures.push(outcome.domain().to_string());
            }
            failures
        });

        for domain in ["a.com", "b.org", "c.net", "d.io", "e.dev"] {
            input_tx.send(domain.to_string()).await.unwrap();
        }
        drop(input_tx);

        assert_eq!(pool.join().await.unwrap(), 5);
        assert!(success_rx.recv().await.is_none());

        let mut failures = collect.await.unwrap();
        failures.sort();
        assert_eq!(failures, vec!["a.com", "b.org", "c.net", "d.io", "e.dev"]);
    }

    #[tokio::test]
    async fn closed_outcome_queue_is_fatal() {
        let (success_tx, _success_rx) = mpsc::channel(1);
        let (failure_tx, failure_rx) = mpsc::channel(1);
        drop(failure_rx);

        let (pool, input_tx) =
            WorkerPool::spawn(2, rejecting_prober(), success_tx, failure_tx).unwrap();
        input_tx.send("example.com".to_string()).await.unwrap();
        drop(input_tx);

        assert!(matches!(pool.join().await, Err(PipelineError::QueueClosed)));
    }

    #[tokio::test]
    async fn invalid_url_stops_the_pool() {
        let prober = Prober::new(Arc::new(FilterSet::parse("com")), ProbeConfig::default()).unwrap();
        let (success_tx, _success_rx) = mpsc::channel(1);
        let (failure_tx, _failure_rx) = mpsc::channel(1);
        let (pool, input_tx) = WorkerPool::spawn(1, prober, success_tx, failure_tx).unwrap();

        input_tx.send("http://exa mple.com".to_string()).await.unwrap();
        drop(input_tx);

        assert!(matches!(pool.join().await, Err(PipelineError::Probe(_))));
    }
}
