//! Token stream reader: raw response body to a lazy sequence of deltas.
//!
//! Items are `Result<Delta>`:
//!
//! - `Ok(delta)` for every parsed block, ending with a terminal delta when
//!   the `[DONE]` sentinel arrives;
//! - `Err(AvatarError::Protocol)` for a malformed block, after which reading
//!   continues;
//! - `Err(AvatarError::Transport)` when the body fails, after which the
//!   stream ends.
//!
//! A body that ends without `[DONE]` simply ends the stream.

use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::chat::delta::{Delta, ResponseMode, parse_block};
use crate::chat::sse::SseLineParser;
use crate::error::{AvatarError, Result};

/// A boxed stream of parsed deltas.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<Delta>> + Send>>;

/// Turn a byte stream into a [`DeltaStream`].
pub fn read_deltas<S, E>(byte_stream: S, mode: ResponseMode) -> DeltaStream
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut byte_stream = Box::pin(byte_stream);
        let mut parser = SseLineParser::new();
        let mut block: usize = 0;

        loop {
            let (events, exhausted) = match byte_stream.next().await {
                Some(Ok(chunk)) => (parser.push(&chunk), false),
                Some(Err(e)) => {
                    yield Err(AvatarError::Transport(format!("response stream failed: {e}")));
                    return;
                }
                None => (parser.flush().into_iter().collect::<Vec<_>>(), true),
            };

            for event in events {
                block += 1;
                if event.is_done() {
                    debug!(block, "end of response stream");
                    yield Ok(Delta::terminal());
                    return;
                }
                match parse_block(&event.data, mode) {
                    Ok(delta) => yield Ok(delta),
                    Err(e) => {
                        warn!(block, error = %e, "skipping malformed block");
                        yield Err(e);
                    }
                }
            }

            if exhausted {
                debug!(block, "response body ended without [DONE]");
                return;
            }
        }
    })
}
