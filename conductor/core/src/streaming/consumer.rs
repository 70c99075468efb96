//! Streaming Completion Consumer
//!
//! Turns a provider's incremental response body into an ordered stream of
//! [`TextDelta`]s plus a single [`StreamOutcome`] carrying the accumulated
//! text.
//!
//! # Design
//!
//! A spawned producer task owns the transport stream. Deltas are pushed
//! through a bounded channel, so a slow caller blocks the producer and
//! nothing is dropped. When the caller drops the delta receiver the
//! producer stops reading, drops the transport stream (closing the
//! connection) and reports [`GenerationError::Cancelled`] with the partial
//! text.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;

use super::frame::{data_payload, FrameDecoder, LineFramer, DONE_SENTINEL};
use crate::error::GenerationError;

/// Raw transport chunks
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, GenerationError>> + Send>>;

/// Default capacity of the delta channel
pub const DEFAULT_STREAM_BUFFER: usize = 64;

/// One nonempty text fragment
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextDelta {
    /// Position in the stream, starting at zero
    pub index: usize,
    /// Text fragment
    pub text: String,
}

/// Final result of one consumption
#[derive(Clone, Debug, PartialEq)]
pub struct StreamOutcome {
    /// Concatenation of every delta produced
    pub content: String,
    /// Number of deltas produced
    pub deltas: usize,
    /// Terminal error, if the stream did not complete
    pub error: Option<GenerationError>,
}

impl StreamOutcome {
    /// Whether the stream completed normally
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Full text, or the error paired with partial text
    ///
    /// # Errors
    ///
    /// Returns the terminal error and the partial content when the stream
    /// did not complete.
    pub fn into_result(self) -> Result<String, (GenerationError, String)> {
        match self.error {
            None => Ok(self.content),
            Some(e) => Err((e, self.content)),
        }
    }
}

/// Receives the [`StreamOutcome`] once the producer finishes
#[derive(Debug)]
pub struct OutcomeReceiver(oneshot::Receiver<StreamOutcome>);

impl OutcomeReceiver {
    /// Wait for the outcome
    pub async fn wait(self) -> StreamOutcome {
        self.0.await.unwrap_or_else(|_| StreamOutcome {
            content: String::new(),
            deltas: 0,
            error: Some(GenerationError::transport(
                "stream",
                "producer task ended without an outcome",
            )),
        })
    }
}

/// Lazy, finite stream of deltas from one provider response
///
/// The last item is an `Err` when the stream failed. The stream cannot be
/// restarted.
#[derive(Debug)]
pub struct CompletionStream {
    deltas: ReceiverStream<Result<TextDelta, GenerationError>>,
    outcome: OutcomeReceiver,
}

impl CompletionStream {
    /// Split into the delta stream and the outcome receiver
    ///
    /// Dropping the delta stream while keeping the outcome receiver cancels
    /// the consumption and still yields the partial outcome.
    #[must_use]
    pub fn into_parts(
        self,
    ) -> (
        ReceiverStream<Result<TextDelta, GenerationError>>,
        OutcomeReceiver,
    ) {
        (self.deltas, self.outcome)
    }

    /// Drain remaining deltas and return the outcome
    pub async fn finish(self) -> StreamOutcome {
        let (mut deltas, outcome) = self.into_parts();
        while deltas.next().await.is_some() {}
        outcome.wait().await
    }
}

impl Stream for CompletionStream {
    type Item = Result<TextDelta, GenerationError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().deltas).poll_next(cx)
    }
}

/// Spawns producers that consume provider streams
#[derive(Clone, Copy, Debug)]
pub struct StreamingConsumer {
    buffer: usize,
}

impl Default for StreamingConsumer {
    fn default() -> Self {
        Self::new(DEFAULT_STREAM_BUFFER)
    }
}

impl StreamingConsumer {
    /// Consumer with the given delta channel capacity
    #[must_use]
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
        }
    }

    /// Start consuming `frames`, decoding each payload with `decoder`
    ///
    /// Must be called within a tokio runtime.
    pub fn consume<D: FrameDecoder>(&self, frames: ByteStream, decoder: D) -> CompletionStream {
        let (tx, rx) = mpsc::channel(self.buffer);
        let (outcome_tx, outcome_rx) = oneshot::channel();

        tokio::spawn(async move {
            let outcome = Producer::new(decoder, tx).run(frames).await;
            // Outcome receiver may be gone too
            let _ = outcome_tx.send(outcome);
        });

        CompletionStream {
            deltas: ReceiverStream::new(rx),
            outcome: OutcomeReceiver(outcome_rx),
        }
    }
}

/// What to do after a line
enum Flow {
    Continue,
    Done,
    Stop(GenerationError),
}

struct Producer<D> {
    decoder: D,
    tx: mpsc::Sender<Result<TextDelta, GenerationError>>,
    content: String,
    deltas: usize,
    skipped: usize,
}

impl<D: FrameDecoder> Producer<D> {
    fn new(decoder: D, tx: mpsc::Sender<Result<TextDelta, GenerationError>>) -> Self {
        Self {
            decoder,
            tx,
            content: String::new(),
            deltas: 0,
            skipped: 0,
        }
    }

    async fn run(mut self, mut frames: ByteStream) -> StreamOutcome {
        let mut framer = LineFramer::new();

        let flow = 'read: loop {
            match frames.next().await {
                Some(Ok(chunk)) => {
                    for line in framer.push(&chunk) {
                        match self.line(&line).await {
                            Flow::Continue => {}
                            other => break 'read other,
                        }
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, delivered = self.deltas, "Stream transport failed");
                    break Flow::Stop(e);
                }
                None => {
                    break match framer.finish() {
                        Some(line) => match self.line(&line).await {
                            Flow::Continue => Flow::Done,
                            other => other,
                        },
                        None => Flow::Done,
                    };
                }
            }
        };
        // Closes the provider connection before finalization
        drop(frames);

        let error = match flow {
            Flow::Continue | Flow::Done => None,
            Flow::Stop(GenerationError::Cancelled) => Some(GenerationError::Cancelled),
            Flow::Stop(e) => {
                let _ = self.tx.send(Err(e.clone())).await;
                Some(e)
            }
        };

        tracing::debug!(
            deltas = self.deltas,
            skipped = self.skipped,
            chars = self.content.len(),
            failed = error.is_some(),
            "Stream consumption finished"
        );

        StreamOutcome {
            content: self.content,
            deltas: self.deltas,
            error,
        }
    }

    async fn line(&mut self, line: &str) -> Flow {
        let Some(payload) = data_payload(line) else {
            return Flow::Continue;
        };
        if payload.trim() == DONE_SENTINEL {
            return Flow::Done;
        }

        let text = match self.decoder.decode(payload) {
            Ok(Some(text)) => text,
            Ok(None) => return Flow::Continue,
            Err(e) if e.is_recoverable() => {
                self.skipped += 1;
                tracing::debug!(error = %e, "Skipping undecodable frame");
                return Flow::Continue;
            }
            Err(e) => return Flow::Stop(e),
        };

        // Content only ever holds text the caller received
        let delivered = self.content.len();
        self.content.push_str(&text);
        let delta = TextDelta {
            index: self.deltas,
            text,
        };

        if self.tx.send(Ok(delta)).await.is_err() {
            self.content.truncate(delivered);
            tracing::info!(delivered = self.deltas, "Delta receiver dropped, cancelling stream");
            return Flow::Stop(GenerationError::Cancelled);
        }
        self.deltas += 1;
        Flow::Continue
    }
}
