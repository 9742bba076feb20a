use std::fmt::Display;
use std::mem;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use mime::Mime;
use pin_project_lite::pin_project;
use reqwest::{Response, header};
use streamfold_message::{
    AccumulatedMessage, FinalizedToolCalls, MessageChunk, ToolCallAccumulator,
};
use tokio::time::timeout;

use crate::builder::build_chunk;
use crate::config::StreamConfig;
use crate::io::{Chunks, Frames};
use crate::proto::{RawEvent, decode_frame};
use crate::{Error, ErrorKind};

struct FoldState {
    frames: Frames,
    frame_timeout: Option<Duration>,
    skip_malformed_frames: bool,
    tool_calls: ToolCallAccumulator,
    // Set once the end of the stream is known. No more frames are read
    // after that.
    ended: bool,
}

impl FoldState {
    async fn next_event(&mut self) -> Result<Option<RawEvent>, Error> {
        let next_frame = self.frames.next_frame();
        let frame = match self.frame_timeout {
            Some(duration) => timeout(duration, next_frame)
                .await
                .map_err(|_| Error::stream_timeout(duration))??,
            None => next_frame.await?,
        };
        let Some(frame) = frame else {
            return Ok(None);
        };
        trace!("got frame: {frame}");
        decode_frame(&frame).map(Some)
    }
}

enum Step {
    Chunk(MessageChunk, FoldState),
    Malformed(Error, FoldState),
    Finished(FinalizedToolCalls),
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

pin_project! {
    /// A response stream being folded into one message.
    ///
    /// As a [`Stream`], it yields every [`MessageChunk`] for live
    /// rendering, and keeps the left fold of everything it yielded in
    /// [`running`](Self::running). Items are:
    ///
    /// - `Ok(chunk)` for each event that contributes to the message.
    /// - `Err(e)` with [`ErrorKind::Protocol`] for a malformed frame. The
    ///   frame is consumed, polling again continues with the next one.
    ///   Dropping the stream instead aborts it.
    /// - `Err(e)` with [`ErrorKind::ToolCallParse`] once at the end, if
    ///   some tool calls could not be parsed. The stream ends after it.
    /// - `Err(e)` with [`ErrorKind::StreamTimeout`] or
    ///   [`ErrorKind::Transport`]. The fold is discarded and the stream
    ///   ends.
    ///
    /// After the stream ends gracefully, [`message`](Self::message)
    /// returns the finished message.
    pub struct FoldResponse {
        next_step_fut: Option<PinnedFuture<Result<Step, Error>>>,
        running: MessageChunk,
        message: Option<AccumulatedMessage>,
    }
}

impl FoldResponse {
    /// Creates a response from an HTTP response whose body is an event
    /// stream.
    pub fn from_response(
        resp: Response,
        config: &StreamConfig,
    ) -> Result<Self, Error> {
        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        let is_event_stream = content_type
            .and_then(|v| v.parse().ok())
            .map(|m: Mime| {
                m.essence_str() == mime::TEXT_EVENT_STREAM.essence_str()
            })
            .unwrap_or(false);
        if !is_event_stream {
            return Err(Error::new(
                format!("unexpected content type: {content_type:?}"),
                ErrorKind::Transport,
            ));
        }

        Ok(Self::from_chunks(Chunks::from_response(resp), config))
    }

    /// Creates a response from any stream of raw bytes.
    pub fn from_byte_stream<S, E>(stream: S, config: &StreamConfig) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Display,
    {
        Self::from_chunks(Chunks::from_stream(stream), config)
    }

    pub(crate) fn from_chunks(chunks: Chunks, config: &StreamConfig) -> Self {
        let state = FoldState {
            frames: Frames::new(chunks),
            frame_timeout: config.frame_timeout,
            skip_malformed_frames: config.skip_malformed_frames,
            tool_calls: ToolCallAccumulator::new(),
            ended: false,
        };
        Self {
            next_step_fut: Some(Box::pin(next_step(state))),
            running: MessageChunk::default(),
            message: None,
        }
    }

    /// Returns the fold of every chunk yielded so far.
    #[inline]
    pub fn running(&self) -> &MessageChunk {
        &self.running
    }

    /// Returns the finished message once the stream has ended. If some
    /// tool calls failed to parse, the message holds the rest.
    #[inline]
    pub fn message(&self) -> Option<&AccumulatedMessage> {
        self.message.as_ref()
    }

    /// Returns `true` if the stream will not yield any more items.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.next_step_fut.is_none()
    }

    /// Drives the stream to the end, calling `on_token` with every text
    /// token.
    ///
    /// Returns the first error. A malformed frame aborts the stream
    /// unless the config skips them, and the error carries the message
    /// folded up to that point.
    pub async fn accumulate(
        mut self,
        mut on_token: impl FnMut(&str),
    ) -> Result<AccumulatedMessage, Error> {
        while let Some(item) = self.next().await {
            match item {
                Ok(chunk) => {
                    if let Some(token) = chunk.token() {
                        on_token(token);
                    }
                }
                Err(err) if err.kind() == ErrorKind::Protocol => {
                    let (partial, _) =
                        AccumulatedMessage::from_chunk(self.running.clone());
                    return Err(err.with_partial(partial));
                }
                Err(err) => return Err(err),
            }
        }

        self.message.take().ok_or_else(|| {
            Error::new("stream ended without a message", ErrorKind::Transport)
        })
    }
}

impl Stream for FoldResponse {
    type Item = Result<MessageChunk, Error>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        let this = self.project();
        let Some(next_step_fut) = this.next_step_fut else {
            return Poll::Ready(None);
        };
        let step = ready!(next_step_fut.as_mut().poll(cx));
        *this.next_step_fut = None;

        match step {
            Ok(Step::Chunk(chunk, state)) => {
                *this.running = mem::take(this.running).concat(chunk.clone());
                *this.next_step_fut = Some(Box::pin(next_step(state)));
                Poll::Ready(Some(Ok(chunk)))
            }
            Ok(Step::Malformed(err, state)) => {
                *this.next_step_fut = Some(Box::pin(next_step(state)));
                Poll::Ready(Some(Err(err)))
            }
            Ok(Step::Finished(finalized)) => {
                let message = AccumulatedMessage::new(
                    this.running.clone(),
                    finalized.tool_calls,
                );
                if finalized.failures.is_empty() {
                    *this.message = Some(message);
                    return Poll::Ready(None);
                }
                *this.message = Some(message.clone());
                Poll::Ready(Some(Err(Error::tool_call_parse(
                    finalized.failures,
                    message,
                ))))
            }
            Err(err) => Poll::Ready(Some(Err(err))),
        }
    }
}

async fn next_step(mut state: FoldState) -> Result<Step, Error> {
    loop {
        if state.ended {
            let finalized = state.tool_calls.finish();
            for failure in &finalized.failures {
                warn!("{failure}");
            }
            return Ok(Step::Finished(finalized));
        }

        let event = match state.next_event().await {
            Ok(Some(event)) => event,
            Ok(None) => {
                debug!("byte stream ended without `message_stop`");
                state.ended = true;
                continue;
            }
            Err(err) if err.kind() == ErrorKind::Protocol => {
                if state.skip_malformed_frames {
                    warn!("skipping malformed frame: {err}");
                    continue;
                }
                return Ok(Step::Malformed(err, state));
            }
            Err(err) => {
                error!("stream failed: {err}");
                return Err(err);
            }
        };

        match &event {
            RawEvent::Done => {
                debug!("got `[DONE]`");
                state.ended = true;
            }
            RawEvent::MessageStop { .. } => state.ended = true,
            RawEvent::ContentBlockStop { index } => {
                if state.tool_calls.try_finalize(*index) {
                    debug!("finalized tool call {index}");
                }
            }
            RawEvent::Unknown(raw) => trace!("dropping unknown event: {raw}"),
            _ => {}
        }

        let Some(chunk) = build_chunk(event) else {
            continue;
        };
        for tool_call in chunk.tool_calls.values() {
            state.tool_calls.push(tool_call);
        }
        return Ok(Step::Chunk(chunk, state));
    }
}
