//! Streaming Completion Infrastructure
//!
//! Providers deliver generated text as an event stream: newline-delimited
//! `data:` lines, each carrying one JSON frame, terminated by `data: [DONE]`
//! or by the end of the body.
//!
//! # Architecture
//!
//! ```text
//!  reqwest bytes_stream ──► LineFramer ──► data_payload ──► FrameDecoder
//!                                                              │
//!                           bounded mpsc ◄── TextDelta ◄───────┘
//!                                │
//!                   caller (CompletionStream)   StreamOutcome (oneshot)
//! ```
//!
//! - [`LineFramer`] keeps partial lines across transport chunks
//! - [`FrameDecoder`] is implemented per provider frame shape
//! - [`StreamingConsumer`] runs the producer and hands back a
//!   [`CompletionStream`]

mod consumer;
mod frame;

pub use consumer::{
    ByteStream, CompletionStream, OutcomeReceiver, StreamOutcome, StreamingConsumer, TextDelta,
    DEFAULT_STREAM_BUFFER,
};
pub use frame::{
    data_payload, ChatDeltaDecoder, FrameDecoder, LineFramer, PresentationDecoder, ResultSlot,
    DATA_PREFIX, DONE_SENTINEL,
};
