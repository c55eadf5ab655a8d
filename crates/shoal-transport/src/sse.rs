//! Event stream ingestion
//!
//! A background task holds one long-lived GET open against the event
//! endpoint, splits the body into lines, and pushes the payload of every
//! `data: ` line onto the spawn queue. It never touches scene state.

use reqwest::{Client, Response};
use shoal_core::{ShoalError, ShoalResult};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::http::{transport_err, RetryPolicy};

/// Prefix marking a payload line
pub const DATA_MARKER: &str = "data: ";

/// Longest stream line accepted before it is discarded
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Spawn queue consumer side (main tick)
pub type SpawnReceiver = mpsc::UnboundedReceiver<String>;

/// Spawn queue producer side (ingester task)
pub type SpawnSender = mpsc::UnboundedSender<String>;

/// Ingester configuration
#[derive(Clone, Debug)]
pub struct IngesterConfig {
    pub url: String,
    pub marker: String,
    /// Reconnect policy; `RetryPolicy::none()` ends the loop on first failure
    pub reconnect: RetryPolicy,
    pub max_line_len: usize,
}

impl Default for IngesterConfig {
    fn default() -> Self {
        IngesterConfig {
            url: "http://localhost:3000/events".to_string(),
            marker: DATA_MARKER.to_string(),
            reconnect: RetryPolicy::none(),
            max_line_len: MAX_LINE_LEN,
        }
    }
}

/// Extract the payload from one stream line, if it is a non-empty data line
pub fn parse_event_line<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    let payload = line.strip_prefix(marker)?;
    (!payload.trim().is_empty()).then_some(payload)
}

/// Accumulates body chunks and yields complete lines (`\n` or `\r\n`).
///
/// A line longer than the cap is discarded up to its terminating newline.
/// Lines that are not valid UTF-8 are dropped.
#[derive(Debug)]
pub struct LineBuffer {
    pending: Vec<u8>,
    max_len: usize,
    /// Skipping the rest of an overlong line
    discarding: bool,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_max_len(MAX_LINE_LEN)
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_len(max_len: usize) -> Self {
        LineBuffer {
            pending: Vec::new(),
            max_len,
            discarding: false,
        }
    }

    /// Feed a chunk and collect every line it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let head = &rest[..pos];
            rest = &rest[pos + 1..];

            if std::mem::take(&mut self.discarding) {
                continue;
            }
            if self.pending.len() + head.len() > self.max_len {
                tracing::warn!(limit = self.max_len, "dropping overlong stream line");
                self.pending.clear();
                continue;
            }

            self.pending.extend_from_slice(head);
            let mut line = std::mem::take(&mut self.pending);
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            match String::from_utf8(line) {
                Ok(line) => lines.push(line),
                Err(e) => {
                    tracing::debug!(error = %e.utf8_error(), "dropping non-UTF-8 stream line");
                }
            }
        }

        if !self.discarding {
            if self.pending.len() + rest.len() > self.max_len {
                tracing::warn!(limit = self.max_len, "stream line exceeds limit, skipping to next newline");
                self.pending = Vec::new();
                self.discarding = true;
            } else {
                self.pending.extend_from_slice(rest);
            }
        }
        lines
    }

    /// Bytes held back waiting for a newline
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

enum StreamEnd {
    Shutdown,
    Eof,
}

/// Background reader for the spawn event stream
pub struct PoseStreamIngester {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PoseStreamIngester {
    /// Start the read loop on the current tokio runtime.
    ///
    /// Returns the ingester handle and the consumer end of the spawn queue.
    pub fn start(config: IngesterConfig, client: Client) -> (Self, SpawnReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run(config, client, tx, cancel.clone()));

        (PoseStreamIngester { cancel, task }, rx)
    }

    /// Has the read loop not yet exited?
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Token that stops the read loop when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the read loop and wait for it to release the connection
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "stream ingester task ended abnormally");
        }
    }
}

async fn run(config: IngesterConfig, client: Client, tx: SpawnSender, cancel: CancellationToken) {
    // Cancelled on every exit path, before `tx` is dropped.
    let _exit = cancel.clone().drop_guard();
    let mut failures = 0u32;

    while !cancel.is_cancelled() {
        let err = match read_stream(&config, &client, &tx, &cancel, &mut failures).await {
            Ok(StreamEnd::Shutdown) => break,
            Ok(StreamEnd::Eof) => {
                tracing::info!(url = %config.url, "event stream closed by remote");
                ShoalError::StreamClosed
            }
            Err(e) => {
                tracing::error!(url = %config.url, error = %e, "event stream error");
                e
            }
        };

        failures += 1;
        if !err.is_transient() || !config.reconnect.allows_retry(failures) {
            break;
        }

        let backoff = config.reconnect.backoff_for(failures);
        tracing::info!(attempt = failures, ?backoff, "reconnecting event stream");
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = cancel.cancelled() => break,
        }
    }

    tracing::debug!(url = %config.url, "event stream reader exited");
}

async fn read_stream(
    config: &IngesterConfig,
    client: &Client,
    tx: &SpawnSender,
    cancel: &CancellationToken,
    failures: &mut u32,
) -> ShoalResult<StreamEnd> {
    let mut response: Response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(StreamEnd::Shutdown),
        sent = client.get(&config.url).send() => sent.map_err(transport_err)?,
    };

    let status = response.status();
    if !status.is_success() {
        return Err(ShoalError::HttpStatus {
            url: config.url.clone(),
            status: status.as_u16(),
        });
    }
    tracing::info!(url = %config.url, "event stream connected");

    let mut lines = LineBuffer::with_max_len(config.max_line_len);
    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(StreamEnd::Shutdown),
            chunk = response.chunk() => chunk.map_err(transport_err)?,
        };

        let Some(chunk) = chunk else {
            return Ok(StreamEnd::Eof);
        };

        for line in lines.push(&chunk) {
            if let Some(payload) = parse_event_line(&line, &config.marker) {
                *failures = 0;
                if tx.send(payload.to_string()).is_err() {
                    // Consumer dropped; nobody left to feed.
                    return Ok(StreamEnd::Shutdown);
                }
            }
        }
    }
}
