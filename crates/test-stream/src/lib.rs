//! Scripted byte streams for testing stream consumers.

mod preset;

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::Stream;
use serde_json::Value;
use tokio::time::{Sleep, sleep};

pub use preset::*;

#[derive(Debug, PartialEq, Eq)]
pub struct Error {
    message: &'static str,
}

impl Error {
    #[inline]
    pub fn message(&self) -> &'static str {
        self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.message)
    }
}

impl StdError for Error {}

#[derive(Clone, Debug)]
enum ScriptStep {
    Bytes(Bytes),
    Stall(Duration),
    Fail(&'static str),
}

/// A script describing how a fake transport delivers bytes.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Debug, Default)]
pub struct StreamScript {
    steps: Vec<ScriptStep>,
    delay: Option<Duration>,
}

impl StreamScript {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event in server-sent events format, with an `event:`
    /// line named after its `type`.
    pub fn event(self, event: Value) -> Self {
        let name = event
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("message")
            .to_owned();
        self.raw(format!("event: {name}\ndata: {event}\n\n"))
    }

    #[inline]
    pub fn events(self, events: impl IntoIterator<Item = Value>) -> Self {
        events.into_iter().fold(self, Self::event)
    }

    /// Appends a bare `data:` frame.
    #[inline]
    pub fn data(self, payload: impl Display) -> Self {
        self.raw(format!("data: {payload}\n\n"))
    }

    #[inline]
    pub fn done(self) -> Self {
        self.data("[DONE]")
    }

    #[inline]
    pub fn raw(mut self, bytes: impl Into<Bytes>) -> Self {
        self.steps.push(ScriptStep::Bytes(bytes.into()));
        self
    }

    /// Makes the transport go silent for `duration`.
    #[inline]
    pub fn stall(mut self, duration: Duration) -> Self {
        self.steps.push(ScriptStep::Stall(duration));
        self
    }

    /// Makes the transport fail.
    #[inline]
    pub fn fail(mut self, message: &'static str) -> Self {
        self.steps.push(ScriptStep::Fail(message));
        self
    }

    /// Waits `duration` before delivering every byte chunk.
    #[inline]
    pub fn with_delay(mut self, duration: Duration) -> Self {
        self.delay = Some(duration);
        self
    }

    /// Re-chunks the bytes into pieces of at most `size` bytes,
    /// ignoring frame boundaries.
    pub fn split_every(mut self, size: usize) -> Self {
        let size = size.max(1);
        let mut steps = Vec::new();
        let mut run = BytesMut::new();
        for step in self.steps.drain(..) {
            if let ScriptStep::Bytes(bytes) = step {
                run.extend_from_slice(&bytes);
                continue;
            }
            flush_run(&mut run, size, &mut steps);
            steps.push(step);
        }
        flush_run(&mut run, size, &mut steps);
        self.steps = steps;
        self
    }

    #[inline]
    pub fn into_stream(self) -> ScriptedStream {
        ScriptedStream {
            steps: self.steps.into(),
            delay: self.delay,
            delayed: false,
            sleep: None,
        }
    }
}

fn flush_run(run: &mut BytesMut, size: usize, steps: &mut Vec<ScriptStep>) {
    let mut bytes = run.split().freeze();
    while !bytes.is_empty() {
        let piece = bytes.split_to(size.min(bytes.len()));
        steps.push(ScriptStep::Bytes(piece));
    }
}

/// A byte stream that replays a [`StreamScript`].
pub struct ScriptedStream {
    steps: VecDeque<ScriptStep>,
    delay: Option<Duration>,
    delayed: bool,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl Debug for ScriptedStream {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedStream")
            .field("steps", &self.steps)
            .field("delay", &self.delay)
            .finish()
    }
}

impl Stream for ScriptedStream {
    type Item = Result<Bytes, Error>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(sleep) = &mut this.sleep {
                ready!(sleep.as_mut().poll(cx));
                this.sleep = None;
            }

            match this.steps.pop_front() {
                None => return Poll::Ready(None),
                Some(ScriptStep::Stall(duration)) => {
                    this.sleep = Some(Box::pin(sleep(duration)));
                }
                Some(ScriptStep::Fail(message)) => {
                    return Poll::Ready(Some(Err(Error { message })));
                }
                Some(ScriptStep::Bytes(bytes)) => match this.delay {
                    Some(delay) if !this.delayed => {
                        this.steps.push_front(ScriptStep::Bytes(bytes));
                        this.delayed = true;
                        this.sleep = Some(Box::pin(sleep(delay)));
                    }
                    _ => {
                        this.delayed = false;
                        return Poll::Ready(Some(Ok(bytes)));
                    }
                },
            }
        }
    }
}
