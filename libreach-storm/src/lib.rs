mod collector;
pub mod filter;
mod http;
mod pipeline;
mod pool;
mod prober;
mod types;

pub use collector::drain;
pub use filter::{normalize_pattern, FilterError, FilterSet};
pub use pipeline::{Pipeline, PipelineError, PipelineOutput};
pub use pool::WorkerPool;
pub use prober::{ProbeError, Prober};
pub use types::{FailureReason, ProbeConfig, ProbeOutcome, RunSummary, Threshold};

use futures::TryStreamExt;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncWrite};

pub async fn probe(
    domain: &str,
    filters: Arc<FilterSet>,
    config: ProbeConfig,
) -> Result<ProbeOutcome, ProbeError> {
    Prober::new(filters, config)?.probe_one(domain).await
}

pub async fn probe_many<I>(
    domains: I,
    filters: Arc<FilterSet>,
    config: ProbeConfig,
    concurrency: usize,
) -> Result<Vec<ProbeOutcome>, ProbeError>
where
    I: IntoIterator<Item = String> + 'static,
{
    let prober = Prober::new(filters, config)?;
    prober.probe_stream(domains, concurrency).try_collect().await
}

/// Runs the whole pipeline over `input` with `workers` concurrent probers.
pub async fn run_all<R, S, F>(
    input: R,
    filters: FilterSet,
    workers: usize,
    threshold: Threshold,
    success_sink: S,
    failure_sink: F,
) -> Result<PipelineOutput<S, F>, PipelineError>
where
    R: AsyncBufRead + Unpin,
    S: AsyncWrite + Unpin + Send + 'static,
    F: AsyncWrite + Unpin + Send + 'static,
{
    let config = ProbeConfig {
        threshold,
        ..ProbeConfig::default()
    };
    let prober = Prober::new(Arc::new(filters), config)?;
    Pipeline::new(prober, workers)
        .run(input, success_sink, failure_sink)
        .await
}
