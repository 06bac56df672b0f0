use crate::{
    collector::drain,
    pool::WorkerPool,
    prober::{ProbeError, Prober},
    types::{ProbeOutcome, RunSummary},
};
use std::io;
use thiserror::Error;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite},
    sync::mpsc,
};
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Worker count must be at least 1")]
    NoWorkers,
    #[error(transparent)]
    Probe(#[from] ProbeError),
    #[error("Failed to read domain input: {0}")]
    Read(#[source] io::Error),
    #[error("Failed to write result line: {0}")]
    Write(#[source] io::Error),
    #[error("Pipeline queue closed before all domains were processed")]
    QueueClosed,
    #[error("Pipeline task panicked: {0}")]
    TaskPanicked(String),
}

/// Summary of a finished run together with both sinks.
#[derive(Debug)]
pub struct PipelineOutput<S, F> {
    pub summary: RunSummary,
    pub success_sink: S,
    pub failure_sink: F,
}

pub struct Pipeline {
    prober: Prober,
    workers: usize,
}

impl Pipeline {
    pub fn new(prober: Prober, workers: usize) -> Self {
        Self { prober, workers }
    }

    /// Feeds every line of `input` through the worker pool, writing success
    /// lines to `success_sink` and failure lines to `failure_sink`.
    ///
    /// Blank input lines are probed like any other line and end up in the
    /// failure sink, so one line in always gives one line out.
    pub async fn run<R, S, F>(
        &self,
        input: R,
        success_sink: S,
        failure_sink: F,
    ) -> Result<PipelineOutput<S, F>, PipelineError>
    where
        R: AsyncBufRead + Unpin,
        S: AsyncWrite + Unpin + Send + 'static,
        F: AsyncWrite + Unpin + Send + 'static,
    {
        let (success_tx, success_rx) = mpsc::channel::<ProbeOutcome>(1);
        let (failure_tx, failure_rx) = mpsc::channel::<ProbeOutcome>(1);

        let (pool, input_tx) =
            WorkerPool::spawn(self.workers, self.prober.clone(), success_tx, failure_tx)?;
        debug!(workers = pool.len(), "worker pool started");

        let success_collector = tokio::spawn(drain(success_rx, success_sink));
        let failure_collector = tokio::spawn(drain(failure_rx, failure_sink));

        let feed = async move {
            let mut input = input;
            let mut buf = Vec::new();
            let mut index = 0usize;
            loop {
                buf.clear();
                let read = input
                    .read_until(b'\n', &mut buf)
                    .await
                    .map_err(PipelineError::Read)?;
                if read == 0 {
                    break;
                }
                let domain = line_text(&buf);
                info!(index, domain = %domain, "processing");
                input_tx
                    .send(domain)
                    .await
                    .map_err(|_| PipelineError::QueueClosed)?;
                index += 1;
            }
            // input_tx is dropped here, closing the queue
            Ok::<usize, PipelineError>(index)
        };

        // Both halves always finish: a failed pool drops the receiver and
        // unblocks the feed, a failed feed drops the sender and drains the pool.
        let (fed, joined) = tokio::join!(feed, pool.join());

        // outcome senders lived in the workers, so the collectors see the
        // queues close once the pool is gone
        let success = success_collector.await;
        let failure = failure_collector.await;

        // a closed queue is only a symptom; report the collector error behind it
        let joined = match joined {
            Err(PipelineError::QueueClosed) => Err(PipelineError::QueueClosed),
            Err(e) => return Err(e),
            ok => ok,
        };
        let fed = match fed {
            Err(PipelineError::QueueClosed) => Err(PipelineError::QueueClosed),
            Err(e) => return Err(e),
            ok => ok,
        };

        let (success_sink, succeeded) = collector_result(success)?;
        let (failure_sink, failed) = collector_result(failure)?;
        let total = fed?;
        joined?;

        let summary = RunSummary {
            total,
            succeeded,
            failed,
        };
        debug!(?summary, "pipeline finished");

        Ok(PipelineOutput {
            summary,
            success_sink,
            failure_sink,
        })
    }
}

/// Input lines are opaque bytes: the line ending is stripped and anything
/// that is not UTF-8 is replaced rather than rejected.
fn line_text(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

fn collector_result<W>(
    result: Result<io::Result<(W, usize)>, tokio::task::JoinError>,
) -> Result<(W, usize), PipelineError> {
    match result {
        Ok(Ok(done)) => Ok(done),
        Ok(Err(e)) => Err(PipelineError::Write(e)),
        Err(join_error) => Err(PipelineError::TaskPanicked(join_error.to_string())),
    }
}
