//! Stream ingestion loop
//!
//! Reads newline-delimited lines from a byte source and hands each
//! non-blank line to a callback. Every read is bounded by a timeout so a
//! silently dead connection is detected.

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::IngestError;

/// Receives each line of the stream
pub type LineCallback = Arc<dyn Fn(String) + Send + Sync>;

/// How lines are handed to the callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum LineDelivery {
    /// Single worker draining a bounded queue; lines arrive in stream order
    Ordered { capacity: usize },
    /// One task per line; no ordering guarantee
    Concurrent,
}

impl Default for LineDelivery {
    fn default() -> Self {
        LineDelivery::Ordered { capacity: 1024 }
    }
}

/// Normal end of an ingestion loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The remote side closed the stream
    Closed,
    /// The loop was cancelled locally
    Cancelled,
}

/// Read `source` until it ends, fails, times out or `cancel` fires
///
/// `source` is dropped before this returns. When the stream ends on its
/// own, lines already queued are delivered before the function completes;
/// once `cancel` fires, queued lines are discarded and only the callback
/// already running is waited for.
pub async fn run<R>(
    source: R,
    on_line: LineCallback,
    read_timeout: Duration,
    delivery: LineDelivery,
    cancel: &CancellationToken,
) -> Result<StreamEnd, IngestError>
where
    R: AsyncBufRead + Unpin,
{
    let mut source = source;
    let sink = LineSink::start(delivery, on_line, cancel.clone());

    let result = read_lines(&mut source, &sink, read_timeout, cancel).await;
    drop(source);

    sink.finish().await;
    debug!("Ingestion loop finished: {:?}", result);
    result
}

async fn read_lines<R>(
    source: &mut R,
    sink: &LineSink,
    read_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<StreamEnd, IngestError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::with_capacity(4096);
    loop {
        buf.clear();
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
            read = tokio::time::timeout(read_timeout, source.read_until(b'\n', &mut buf)) => read,
        };

        let n = read.map_err(|_| IngestError::Timeout(read_timeout))??;
        if n == 0 {
            return Ok(StreamEnd::Closed);
        }

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim();
        if line.is_empty() {
            trace!("keep-alive");
            continue;
        }

        if !sink.deliver(line.to_string(), cancel).await {
            return Ok(StreamEnd::Cancelled);
        }
    }
}

enum LineSink {
    Ordered {
        tx: mpsc::Sender<String>,
        worker: JoinHandle<()>,
    },
    Concurrent {
        on_line: LineCallback,
    },
}

impl LineSink {
    fn start(delivery: LineDelivery, on_line: LineCallback, cancel: CancellationToken) -> Self {
        match delivery {
            LineDelivery::Ordered { capacity } => {
                let (tx, mut rx) = mpsc::channel::<String>(capacity.max(1));
                let worker = tokio::spawn(async move {
                    loop {
                        let line = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => {
                                debug!("Discarding {} queued lines", rx.len());
                                break;
                            }
                            line = rx.recv() => line,
                        };
                        match line {
                            Some(line) => on_line(line),
                            None => break,
                        }
                    }
                });
                LineSink::Ordered { tx, worker }
            }
            LineDelivery::Concurrent => LineSink::Concurrent { on_line },
        }
    }

    /// Returns `false` if cancelled while waiting for queue space
    async fn deliver(&self, line: String, cancel: &CancellationToken) -> bool {
        match self {
            LineSink::Ordered { tx, .. } => tokio::select! {
                biased;
                _ = cancel.cancelled() => false,
                sent = tx.send(line) => sent.is_ok(),
            },
            LineSink::Concurrent { on_line } => {
                let on_line = on_line.clone();
                tokio::spawn(async move { on_line(line) });
                true
            }
        }
    }

    async fn finish(self) {
        if let LineSink::Ordered { tx, worker } = self {
            drop(tx);
            if let Err(e) = worker.await {
                debug!("Line worker ended abnormally: {}", e);
            }
        }
    }
}
