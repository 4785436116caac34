//! Streaming client for the prompt API's provider invocations.
//!
//! [`client::PromptClient::stream_invocation`] returns a [`session::StreamSession`]
//! that yields [`sse::ProtocolMessage`]s as they arrive; [`accumulate`] folds
//! those into reply text for display.

pub mod accumulate;
pub mod client;
pub mod config;
pub mod error;
pub mod session;
pub mod sse;
pub mod types;

pub use accumulate::{Applied, Notice, ReplyAccumulator, Usage, consume};
pub use client::PromptClient;
pub use config::ClientConfig;
pub use error::ClientError;
pub use session::{ChunkSource, SessionState, StreamSession};
pub use sse::{EventStreamDecoder, ProtocolMessage};
pub use types::{ChatMessage, HistoryItem, HistoryQuery, InvocationRequest};
