//! Async adapter: byte stream in, redacted byte stream out
//!
//! The output is pull-driven. Nothing is read from the input until the
//! consumer asks for the next chunk, so a slow client slows the upstream read
//! and dropping the output drops the input with it.

use std::collections::VecDeque;
use std::pin::Pin;

use avrofilter_core::{Error, ForbiddenSet, MissingFieldPolicy, Result};
use bytes::Bytes;
use futures_util::stream::{self, BoxStream};
use futures_util::{Stream, StreamExt};
use tracing::error;

use crate::redactor::Redactor;

pub type ByteStream = BoxStream<'static, Result<Bytes>>;

struct Pump<S> {
    input: Pin<Box<S>>,
    redactor: Redactor,
    ready: VecDeque<Bytes>,
    done: bool,
}

/// Wrap `input` so the container it carries comes out with `forbidden` removed.
///
/// An empty forbidden set forwards chunks untouched. The first error ends the
/// stream; nothing produced after it is emitted.
pub fn redact_stream<S, E>(input: S, forbidden: &ForbiddenSet, missing: MissingFieldPolicy) -> ByteStream
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    if forbidden.is_empty() {
        return input
            .map(|chunk| chunk.map_err(|e| Error::Io(std::io::Error::other(e))))
            .boxed();
    }

    let pump = Pump {
        input: Box::pin(input),
        redactor: Redactor::new(forbidden, missing),
        ready: VecDeque::new(),
        done: false,
    };

    stream::unfold(pump, |mut pump| async move {
        loop {
            if let Some(chunk) = pump.ready.pop_front() {
                return Some((Ok(chunk), pump));
            }
            if pump.done {
                return None;
            }

            let step = match pump.input.next().await {
                Some(Ok(chunk)) => pump.redactor.push(&chunk).map(|out| pump.ready.extend(out)),
                Some(Err(e)) => Err(Error::Io(std::io::Error::other(e))),
                None => {
                    pump.done = true;
                    pump.redactor.finish().map(|_| ())
                }
            };

            if let Err(err) = step {
                error!(error = %err, "redaction aborted");
                pump.done = true;
                pump.ready.clear();
                return Some((Err(err), pump));
            }
        }
    })
    .boxed()
}
