//! `data: ` line parsing into typed wire records.

use serde::Deserialize;
use serde_json::Value;

use crate::step::{StepBody, StepEvent, StepKind};

pub(crate) const DATA_PREFIX: &str = "data: ";
pub(crate) const DONE_SENTINEL: &str = "[DONE]";

const DEFAULT_UPSTREAM_ERROR: &str = "upstream reported an error";

/// One parsed `data: ` payload, keyed by its `type` tag.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireRecord {
    Routing(StepBody),
    Action(StepBody),
    Tool(StepBody),
    Completion(StepBody),
    /// Fields are untyped: every `type: "error"` record parses.
    Error {
        #[serde(default)]
        content: Option<Value>,
        #[serde(default)]
        message: Option<Value>,
    },
    Text {
        #[serde(default)]
        content: String,
    },
    Done,
    #[serde(other)]
    Unknown,
}

impl WireRecord {
    /// Converts step-shaped records into a `StepEvent`.
    pub fn into_step(self) -> Option<StepEvent> {
        let (kind, body) = match self {
            Self::Routing(body) => (StepKind::Routing, body),
            Self::Action(body) => (StepKind::Action, body),
            Self::Tool(body) => (StepKind::Tool, body),
            Self::Completion(body) => (StepKind::Completion, body),
            Self::Error { .. } | Self::Text { .. } | Self::Done | Self::Unknown => return None,
        };
        Some(StepEvent { kind, body })
    }

    /// Picks `content`, then `message`; strings verbatim, other JSON as text.
    pub(crate) fn error_message(content: Option<Value>, message: Option<Value>) -> String {
        [content, message]
            .into_iter()
            .flatten()
            .find_map(|value| match value {
                Value::Null => None,
                Value::String(text) => Some(text),
                other => Some(other.to_string()),
            })
            .unwrap_or_else(|| DEFAULT_UPSTREAM_ERROR.to_string())
    }
}

/// Result of classifying one complete line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LineOutcome {
    /// Not a `data: ` line (blank, comment, `event:` and so on).
    Ignored,
    /// The `[DONE]` sentinel.
    Sentinel,
    /// A well-formed record.
    Record(WireRecord),
    /// A `data: ` payload that is not a typed JSON object.
    Malformed { payload: String, reason: String },
}

/// Classifies one complete line (without its trailing newline).
pub fn parse_line(line: &str) -> LineOutcome {
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return LineOutcome::Ignored;
    };
    if payload == DONE_SENTINEL {
        return LineOutcome::Sentinel;
    }
    match serde_json::from_str::<WireRecord>(payload) {
        Ok(record) => LineOutcome::Record(record),
        Err(e) => LineOutcome::Malformed {
            payload: payload.to_string(),
            reason: e.to_string(),
        },
    }
}
