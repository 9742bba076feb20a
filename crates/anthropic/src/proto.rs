use serde::Deserialize;
use serde_json::Value;

use crate::{Error, ErrorKind};

// ------------------------------
// Types received from the server
// ------------------------------

/// The `message` object of a `message_start` event.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct MessageStart {
    /// Identifier of the message.
    pub id: Option<String>,
    /// Role of the author.
    pub role: Option<String>,
    /// The model generating the message.
    pub model: Option<String>,
}

/// The top-level fields patched by a `message_delta` event.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct MessageDeltaFields {
    /// Why the model stopped generating.
    pub stop_reason: Option<String>,
    /// The stop sequence that was hit.
    pub stop_sequence: Option<String>,
}

/// A usage fragment attached to `message_delta`. Missing counts are
/// zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct UsageReport {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

/// Cumulative token counts some providers attach to `message_stop`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationMetrics {
    pub input_token_count: u64,
    pub output_token_count: u64,
}

/// The block opened by `content_block_start`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// A text block, possibly with initial text.
    Text {
        #[serde(default)]
        text: String,
    },
    /// A tool call. Its input streams in as `input_json_delta`s.
    ToolUse { id: String, name: String },
    /// Any other block kind, e.g. `thinking`.
    #[serde(other)]
    Other,
}

/// The payload of `content_block_delta`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockDelta {
    TextDelta { text: String },
    /// A fragment of a tool call's JSON input. Not valid JSON on its
    /// own.
    InputJsonDelta { partial_json: String },
    /// Any other delta kind.
    #[serde(other)]
    Other,
}

/// An event decoded from one frame.
///
/// The set of events is closed. Any payload whose `type` is not known
/// decodes to [`RawEvent::Unknown`], which is never an error and never
/// produces a chunk.
#[derive(Clone, Debug, PartialEq)]
pub enum RawEvent {
    /// Opens the message.
    MessageStart(MessageStart),
    /// Patches top-level fields, optionally with a usage fragment.
    MessageDelta {
        delta: MessageDeltaFields,
        usage: Option<UsageReport>,
    },
    ContentBlockStart {
        index: usize,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: BlockDelta,
    },
    /// No more deltas follow for the block at `index`.
    ContentBlockStop { index: usize },
    /// Ends the message. `metrics` is the provider usage extension.
    MessageStop { metrics: Option<InvocationMetrics> },
    Ping,
    /// An event of a type this decoder doesn't know, or an empty
    /// payload.
    Unknown(Value),
    /// The `[DONE]` sentinel.
    Done,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum KnownEvent {
    MessageStart {
        message: MessageStart,
    },
    MessageDelta {
        #[serde(default)]
        delta: MessageDeltaFields,
        #[serde(default)]
        usage: Option<UsageReport>,
    },
    ContentBlockStart {
        index: usize,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: BlockDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageStop {
        #[serde(rename = "amazon-bedrock-invocationMetrics", default)]
        metrics: Option<InvocationMetrics>,
    },
    Ping,
}

const KNOWN_TYPES: &[&str] = &[
    "message_start",
    "message_delta",
    "content_block_start",
    "content_block_delta",
    "content_block_stop",
    "message_stop",
    "ping",
];

impl From<KnownEvent> for RawEvent {
    fn from(event: KnownEvent) -> Self {
        match event {
            KnownEvent::MessageStart { message } => {
                RawEvent::MessageStart(message)
            }
            KnownEvent::MessageDelta { delta, usage } => {
                RawEvent::MessageDelta { delta, usage }
            }
            KnownEvent::ContentBlockStart {
                index,
                content_block,
            } => RawEvent::ContentBlockStart {
                index,
                content_block,
            },
            KnownEvent::ContentBlockDelta { index, delta } => {
                RawEvent::ContentBlockDelta { index, delta }
            }
            KnownEvent::ContentBlockStop { index } => {
                RawEvent::ContentBlockStop { index }
            }
            KnownEvent::MessageStop { metrics } => {
                RawEvent::MessageStop { metrics }
            }
            KnownEvent::Ping => RawEvent::Ping,
        }
    }
}

// -----------
// Decoding
// -----------

/// Decodes one frame line, e.g. `data: {"type":"ping"}`.
///
/// The `[DONE]` sentinel is recognized before any JSON parsing, and an
/// empty payload decodes to [`RawEvent::Unknown`]. Fails with
/// [`ErrorKind::Protocol`] only if a present payload is not valid JSON,
/// or if a known event type has a malformed body.
pub fn decode_frame(line: &str) -> Result<RawEvent, Error> {
    let payload = line
        .strip_prefix("data:")
        .unwrap_or(line)
        .trim_matches(|c: char| c.is_ascii_whitespace());
    if payload == "[DONE]" {
        return Ok(RawEvent::Done);
    }
    // A `data:` line with nothing after it carries no event.
    if payload.is_empty() {
        return Ok(RawEvent::Unknown(Value::Null));
    }

    let value = serde_json::from_str::<Value>(payload).map_err(|err| {
        Error::new(format!("invalid frame: {err}"), ErrorKind::Protocol)
    })?;
    let is_known = value
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|ty| KNOWN_TYPES.contains(&ty));
    if !is_known {
        return Ok(RawEvent::Unknown(value));
    }

    serde_json::from_value::<KnownEvent>(value)
        .map(RawEvent::from)
        .map_err(|err| {
            Error::new(format!("malformed event: {err}"), ErrorKind::Protocol)
        })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_done() {
        assert_eq!(decode_frame("data: [DONE]").unwrap(), RawEvent::Done);
        assert_eq!(decode_frame("data:[DONE]").unwrap(), RawEvent::Done);
        assert_eq!(decode_frame("data: [DONE]\r").unwrap(), RawEvent::Done);
    }

    #[test]
    fn test_invalid_json() {
        let err = decode_frame("data: {\"type\":").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        let err = decode_frame("data: {}}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn test_empty_payload() {
        let empty = RawEvent::Unknown(Value::Null);
        assert_eq!(decode_frame("data: ").unwrap(), empty);
        assert_eq!(decode_frame("data:").unwrap(), empty);
        assert_eq!(decode_frame("data: \r").unwrap(), empty);
    }

    #[test]
    fn test_unknown() {
        let event = decode_frame(r#"data: {"type":"future_thing","x":1}"#)
            .unwrap();
        assert_eq!(
            event,
            RawEvent::Unknown(json!({ "type": "future_thing", "x": 1 }))
        );
        let event = decode_frame("data: [1, 2]").unwrap();
        assert_eq!(event, RawEvent::Unknown(json!([1, 2])));
    }

    #[test]
    fn test_malformed_known_event() {
        let err = decode_frame(r#"data: {"type":"content_block_stop"}"#)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn test_message_start() {
        let event = decode_frame(
            r#"data: {"type":"message_start","message":{"id":"msg_1","type":"message","role":"assistant","model":"claude","content":[],"usage":{"input_tokens":25,"output_tokens":1}}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            RawEvent::MessageStart(MessageStart {
                id: Some("msg_1".to_owned()),
                role: Some("assistant".to_owned()),
                model: Some("claude".to_owned()),
            })
        );
    }

    #[test]
    fn test_content_blocks() {
        let event = decode_frame(
            r#"data: {"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"t1","name":"get_weather","input":{}}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            RawEvent::ContentBlockStart {
                index: 1,
                content_block: ContentBlock::ToolUse {
                    id: "t1".to_owned(),
                    name: "get_weather".to_owned(),
                },
            }
        );

        let event = decode_frame(
            r#"data: {"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"loc"}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            RawEvent::ContentBlockDelta {
                index: 1,
                delta: BlockDelta::InputJsonDelta {
                    partial_json: "{\"loc".to_owned(),
                },
            }
        );

        let event = decode_frame(
            r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"hmm"}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            RawEvent::ContentBlockDelta {
                index: 0,
                delta: BlockDelta::Other,
            }
        );
    }

    #[test]
    fn test_message_delta_and_stop() {
        let event = decode_frame(
            r#"data: {"type":"message_delta","delta":{"stop_reason":"tool_use","stop_sequence":null},"usage":{"output_tokens":89}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            RawEvent::MessageDelta {
                delta: MessageDeltaFields {
                    stop_reason: Some("tool_use".to_owned()),
                    stop_sequence: None,
                },
                usage: Some(UsageReport {
                    input_tokens: None,
                    output_tokens: Some(89),
                }),
            }
        );

        let event = decode_frame(
            r#"data: {"type":"message_stop","amazon-bedrock-invocationMetrics":{"inputTokenCount":10,"outputTokenCount":5,"invocationLatency":100}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            RawEvent::MessageStop {
                metrics: Some(InvocationMetrics {
                    input_token_count: 10,
                    output_token_count: 5,
                }),
            }
        );

        let event = decode_frame(r#"data: {"type":"message_stop"}"#).unwrap();
        assert_eq!(event, RawEvent::MessageStop { metrics: None });
        assert_eq!(
            decode_frame(r#"data: {"type":"ping"}"#).unwrap(),
            RawEvent::Ping
        );
    }
}
