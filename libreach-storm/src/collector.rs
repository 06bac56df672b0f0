use crate::types::ProbeOutcome;
use std::io;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};

/// Writes one line per outcome to `sink` until every sender is gone,
/// flushing after each line. Returns the sink and the number of lines
/// written.
pub async fn drain<W>(mut rx: mpsc::Receiver<ProbeOutcome>, mut sink: W) -> io::Result<(W, usize)>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;

    while let Some(outcome) = rx.recv().await {
        let line = format!("{}\n", outcome);
        sink.write_all(line.as_bytes()).await?;
        sink.flush().await?;
        written += 1;
    }

    Ok((sink, written))
}
