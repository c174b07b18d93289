use std::collections::VecDeque;

use futures::{Stream, StreamExt as _, stream};
use tracing::{debug, warn};

use crate::decoder::LineDecoder;
use crate::errors::StreamError;
use crate::record::{LineOutcome, WireRecord, parse_line};
use crate::step::StepEvent;

/// Events yielded by a `StreamSession`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReaderEvent {
    /// An agent step to surface to the caller.
    Step(StepEvent),
    /// Streamed answer text.
    Text(String),
    /// Intentional termination (`[DONE]` or a `done` record).
    Done,
}

/// Text handed to the completion callback.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompletionPolicy {
    /// Always complete with an empty string.
    #[default]
    Empty,
    /// Complete with the concatenated content of all `text` records.
    Accumulated,
}

/// Per-request streaming state: the body stream plus the partial-line buffer.
///
/// Owning the body means dropping the session releases the connection, which
/// happens on every exit path of `StreamingChunkReader::consume`.
pub struct StreamSession<S> {
    body: S,
    decoder: LineDecoder,
    pending: VecDeque<Result<ReaderEvent, StreamError>>,
    steps_seen: u64,
    eof: bool,
    terminated: bool,
}

impl<S, B, E> StreamSession<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    /// Opens a session over a body stream, failing when there is none.
    pub fn open(body: Option<S>) -> Result<Self, StreamError> {
        let body = body.ok_or(StreamError::NoStream)?;
        Ok(Self {
            body,
            decoder: LineDecoder::default(),
            pending: VecDeque::new(),
            steps_seen: 0,
            eof: false,
            terminated: false,
        })
    }

    /// Number of step events produced so far.
    pub fn steps_seen(&self) -> u64 {
        self.steps_seen
    }

    /// Waits for and returns the next event.
    ///
    /// Returns `None` after end-of-stream, and after `ReaderEvent::Done` has
    /// been yielded once.
    pub async fn next_event(&mut self) -> Result<Option<ReaderEvent>, StreamError> {
        loop {
            if let Some(next) = self.pending.pop_front() {
                return next.map(Some);
            }
            if self.terminated || self.eof {
                return Ok(None);
            }

            match self.body.next().await {
                Some(Ok(chunk)) => {
                    for line in self.decoder.push_chunk(chunk.as_ref()) {
                        self.handle_line(&line);
                        if self.terminated {
                            break;
                        }
                    }
                }
                Some(Err(e)) => {
                    self.terminated = true;
                    return Err(StreamError::transport(e.to_string()));
                }
                None => {
                    self.eof = true;
                    if let Some(line) = self.decoder.finish() {
                        self.handle_line(&line);
                    }
                }
            }
        }
    }

    /// Adapts the session into a `Stream` of events.
    pub fn into_events(self) -> impl Stream<Item = Result<ReaderEvent, StreamError>> {
        stream::try_unfold(self, |mut session| async move {
            let next = session.next_event().await?;
            Ok::<_, StreamError>(next.map(|event| (event, session)))
        })
    }

    fn handle_line(&mut self, line: &str) {
        match parse_line(line) {
            LineOutcome::Ignored => {}
            LineOutcome::Sentinel => self.terminate(),
            LineOutcome::Malformed { payload, reason } => {
                warn!(%payload, %reason, "skipping malformed stream record");
            }
            LineOutcome::Record(record) => match record {
                WireRecord::Error { content, message } => {
                    // steps already queued from this chunk are still delivered first
                    self.terminated = true;
                    self.pending.push_back(Err(StreamError::Upstream(
                        WireRecord::error_message(content, message),
                    )));
                }
                WireRecord::Text { content } => {
                    if !content.is_empty() {
                        self.pending.push_back(Ok(ReaderEvent::Text(content)));
                    }
                }
                WireRecord::Done => self.terminate(),
                WireRecord::Unknown => debug!("skipping stream record with unknown type"),
                step @ (WireRecord::Routing(_)
                | WireRecord::Action(_)
                | WireRecord::Tool(_)
                | WireRecord::Completion(_)) => {
                    if let Some(step) = step.into_step() {
                        debug!(seq = self.steps_seen, kind = %step.kind, agent = %step.agent(), "stream step");
                        self.steps_seen = self.steps_seen.saturating_add(1);
                        self.pending.push_back(Ok(ReaderEvent::Step(step)));
                    }
                }
            },
        }
    }

    fn terminate(&mut self) {
        self.terminated = true;
        self.pending.push_back(Ok(ReaderEvent::Done));
    }
}

/// Turns a body stream into step and completion callbacks.
#[derive(Clone, Copy, Debug, Default)]
pub struct StreamingChunkReader {
    completion: CompletionPolicy,
}

impl StreamingChunkReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets what text the completion callback receives.
    pub fn completion_policy(mut self, policy: CompletionPolicy) -> Self {
        self.completion = policy;
        self
    }

    /// Reads `body` until `[DONE]` or end-of-stream.
    ///
    /// `on_step` runs once per step in stream order. `on_complete` runs exactly
    /// once on success and never on error. The body is dropped before this
    /// returns.
    pub async fn consume<S, B, E, F, C>(
        &self,
        body: Option<S>,
        mut on_step: F,
        on_complete: C,
    ) -> Result<(), StreamError>
    where
        S: Stream<Item = Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
        F: FnMut(StepEvent),
        C: FnOnce(String),
    {
        let mut session = StreamSession::open(body)?;
        let mut text = String::new();
        while let Some(event) = session.next_event().await? {
            match event {
                ReaderEvent::Step(step) => on_step(step),
                ReaderEvent::Text(chunk) => text.push_str(&chunk),
                ReaderEvent::Done => break,
            }
        }
        let steps = session.steps_seen();
        drop(session);
        debug!(steps, text_len = text.len(), "stream complete");

        on_complete(match self.completion {
            CompletionPolicy::Empty => String::new(),
            CompletionPolicy::Accumulated => text,
        });
        Ok(())
    }
}
