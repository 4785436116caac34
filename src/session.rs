//! Stream session — one cancellable, pull-driven invocation.
//!
//! LIFECYCLE
//! =========
//! `Idle → Connecting → Streaming → {Completed | Cancelled | Failed}`.
//! Nothing happens until the first [`StreamSession::next`]: that pull drives
//! the connect future, later pulls read chunks. Every await races the
//! cancellation token, so a cancel takes effect at the next suspension point
//! and ends the sequence silently.
//!
//! RESOURCES
//! =========
//! The chunk source sits in an `Option` and is taken on the first terminal
//! transition (or at end-of-stream, or on drop), so it is released exactly
//! once. Framing state and queued messages are private to the session and
//! cleared when it terminates; sessions are never reused.

use std::collections::VecDeque;
use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::sse::{DecodeError, EventStreamDecoder, ProtocolMessage};

// =============================================================================
// STATE
// =============================================================================

/// Lifecycle position of a [`StreamSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Streaming,
    Completed,
    Cancelled,
    Failed,
}

impl SessionState {
    /// Terminal states are never left.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

// =============================================================================
// CHUNK SOURCE
// =============================================================================

/// A readable response body. Enables mocking in tests.
#[async_trait]
pub trait ChunkSource: Send {
    /// Next chunk of raw bytes; `Ok(None)` at end-of-stream.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] when the read fails.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, ClientError>;

    /// Called once when the session lets go of the source.
    fn release(&mut self) {}
}

/// Future that resolves to an open body, or to the reason there is none.
pub type ConnectFuture = BoxFuture<'static, Result<Box<dyn ChunkSource>, ClientError>>;

enum Halt {
    Cancelled,
    Failed(ClientError),
}

fn decode_failure(err: DecodeError) -> Halt {
    Halt::Failed(ClientError::Transport(format!("decode failed: {err}")))
}

// =============================================================================
// SESSION
// =============================================================================

/// Lazily produced, single-pass sequence of [`ProtocolMessage`]s.
pub struct StreamSession {
    connect: Option<ConnectFuture>,
    source: Option<Box<dyn ChunkSource>>,
    decoder: EventStreamDecoder,
    queue: VecDeque<ProtocolMessage>,
    state: SessionState,
    end_of_stream: bool,
    token: CancellationToken,
    yielded: usize,
}

impl StreamSession {
    /// Create an idle session. `connect` is not polled until the first pull.
    #[must_use]
    pub fn new(connect: ConnectFuture, token: CancellationToken) -> Self {
        Self {
            connect: Some(connect),
            source: None,
            decoder: EventStreamDecoder::new(),
            queue: VecDeque::new(),
            state: SessionState::Idle,
            end_of_stream: false,
            token,
            yielded: 0,
        }
    }

    /// Session over an already-open body.
    #[must_use]
    pub fn from_source(source: Box<dyn ChunkSource>, token: CancellationToken) -> Self {
        Self::new(Box::pin(futures::future::ready(Ok(source))), token)
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Clone of the token; cancelling it ends this session.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Messages handed to the consumer so far.
    #[must_use]
    pub fn messages_yielded(&self) -> usize {
        self.yielded
    }

    /// Pull the next message.
    ///
    /// Returns `None` once the session is terminal: after completion, after
    /// cancellation, and after the single `Some(Err(_))` that reports a
    /// failure.
    pub async fn next(&mut self) -> Option<Result<ProtocolMessage, ClientError>> {
        loop {
            if self.state.is_terminal() {
                return None;
            }
            if self.token.is_cancelled() {
                self.terminate(SessionState::Cancelled);
                return None;
            }
            if let Some(message) = self.queue.pop_front() {
                self.yielded += 1;
                return Some(Ok(message));
            }
            if self.end_of_stream {
                self.terminate(SessionState::Completed);
                return None;
            }

            let step = if self.source.is_some() { self.read().await } else { self.connect().await };
            match step {
                Ok(()) => {}
                Err(Halt::Cancelled) => {
                    self.terminate(SessionState::Cancelled);
                    return None;
                }
                Err(Halt::Failed(err)) => {
                    warn!(code = err.error_code(), error = %err, yielded = self.yielded, "stream failed");
                    self.terminate(SessionState::Failed);
                    return Some(Err(err));
                }
            }
        }
    }

    /// Adapt into a [`Stream`]. Ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<ProtocolMessage, ClientError>> + Send {
        futures::stream::unfold(self, |mut session| async move {
            let item = session.next().await?;
            Some((item, session))
        })
    }

    async fn connect(&mut self) -> Result<(), Halt> {
        if self.state == SessionState::Idle {
            self.transition(SessionState::Connecting);
        }
        let Some(connect) = self.connect.as_mut() else {
            return Err(Halt::Failed(ClientError::StreamUnavailable));
        };

        let source = tokio::select! {
            biased;
            () = self.token.cancelled() => return Err(Halt::Cancelled),
            result = connect => result,
        };
        self.connect = None;

        self.source = Some(source.map_err(Halt::Failed)?);
        self.transition(SessionState::Streaming);
        Ok(())
    }

    async fn read(&mut self) -> Result<(), Halt> {
        let Some(source) = self.source.as_mut() else {
            return Ok(());
        };

        let chunk = tokio::select! {
            biased;
            () = self.token.cancelled() => return Err(Halt::Cancelled),
            chunk = source.next_chunk() => chunk.map_err(Halt::Failed)?,
        };

        if let Some(bytes) = chunk {
            let messages = self.decoder.push(&bytes).map_err(decode_failure)?;
            self.queue.extend(messages);
        } else {
            debug!("end of stream");
            self.end_of_stream = true;
            self.release_source();
            let tail = self.decoder.finish().map_err(decode_failure)?;
            self.queue.extend(tail);
        }
        Ok(())
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "stream session transition");
        self.state = next;
    }

    fn terminate(&mut self, state: SessionState) {
        self.release_source();
        self.connect = None;
        self.decoder.reset();
        self.queue.clear();
        self.transition(state);
        match state {
            SessionState::Completed => info!(messages = self.yielded, "stream completed"),
            SessionState::Cancelled => info!(messages = self.yielded, "stream cancelled"),
            _ => {}
        }
    }

    fn release_source(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.release();
            debug!("response body released");
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.release_source();
    }
}

impl fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("state", &self.state)
            .field("queued", &self.queue.len())
            .field("yielded", &self.yielded)
            .field("end_of_stream", &self.end_of_stream)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
