//! SSE framing and cancellation-aware event delivery, shared by the
//! streaming aggregators.

use manifold_core::{Error, StreamEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Reassembles SSE lines out of arbitrary byte chunks.
///
/// Upstream chunk boundaries do not align with line boundaries, so bytes are
/// buffered until a newline arrives. Lines come back trimmed.
#[derive(Default)]
pub(crate) struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pop the next complete line, if one is buffered.
    pub fn next_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.buf.drain(..=pos).collect();
        Some(String::from_utf8_lossy(&line).trim().to_string())
    }
}

/// Result of pushing one event into the bounded channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SendOutcome {
    Sent,
    /// The caller's cancellation signal fired; a terminal cancellation error
    /// was delivered in place of the event.
    Cancelled,
    /// The consumer dropped the stream.
    Closed,
}

/// Send one event, honoring cancellation while blocked on a full channel.
///
/// The channel is bounded, so a slow consumer exerts backpressure here; the
/// only ways out are channel capacity, cancellation, or the receiver going
/// away.
pub(crate) async fn send_event(
    tx: &mpsc::Sender<StreamEvent>,
    cancel: &CancellationToken,
    event: StreamEvent,
) -> SendOutcome {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            let _ = tx.send(StreamEvent::Error(Error::Cancelled)).await;
            SendOutcome::Cancelled
        }
        res = tx.send(event) => match res {
            Ok(()) => SendOutcome::Sent,
            Err(_) => SendOutcome::Closed,
        },
    }
}

/// Deliver the terminal cancellation error after the read loop observed the
/// token fire.
pub(crate) async fn send_cancelled(tx: &mpsc::Sender<StreamEvent>) {
    let _ = tx.send(StreamEvent::Error(Error::Cancelled)).await;
}
