//! Builders for the events of an Anthropic-style message stream.

use serde_json::{Value, json};

pub fn message_start(id: &str, model: &str) -> Value {
    json!({
        "type": "message_start",
        "message": {
            "id": id,
            "type": "message",
            "role": "assistant",
            "content": [],
            "model": model,
            "stop_reason": null,
            "stop_sequence": null,
            "usage": { "input_tokens": 1, "output_tokens": 1 }
        }
    })
}

pub fn text_block_start(index: usize) -> Value {
    json!({
        "type": "content_block_start",
        "index": index,
        "content_block": { "type": "text", "text": "" }
    })
}

pub fn text_delta(index: usize, text: &str) -> Value {
    json!({
        "type": "content_block_delta",
        "index": index,
        "delta": { "type": "text_delta", "text": text }
    })
}

pub fn tool_use_start(index: usize, id: &str, name: &str) -> Value {
    json!({
        "type": "content_block_start",
        "index": index,
        "content_block": {
            "type": "tool_use",
            "id": id,
            "name": name,
            "input": {}
        }
    })
}

pub fn input_json_delta(index: usize, partial_json: &str) -> Value {
    json!({
        "type": "content_block_delta",
        "index": index,
        "delta": { "type": "input_json_delta", "partial_json": partial_json }
    })
}

pub fn content_block_stop(index: usize) -> Value {
    json!({ "type": "content_block_stop", "index": index })
}

pub fn message_delta(stop_reason: &str) -> Value {
    json!({
        "type": "message_delta",
        "delta": { "stop_reason": stop_reason, "stop_sequence": null }
    })
}

/// A `message_delta` carrying only a usage report.
pub fn usage_delta(
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
) -> Value {
    let mut usage = serde_json::Map::new();
    if let Some(tokens) = input_tokens {
        usage.insert("input_tokens".to_owned(), tokens.into());
    }
    if let Some(tokens) = output_tokens {
        usage.insert("output_tokens".to_owned(), tokens.into());
    }
    json!({ "type": "message_delta", "delta": {}, "usage": usage })
}

pub fn message_stop() -> Value {
    json!({ "type": "message_stop" })
}

/// A `message_stop` carrying cumulative invocation metrics.
pub fn message_stop_with_metrics(
    input_tokens: u64,
    output_tokens: u64,
) -> Value {
    json!({
        "type": "message_stop",
        "amazon-bedrock-invocationMetrics": {
            "inputTokenCount": input_tokens,
            "outputTokenCount": output_tokens,
            "invocationLatency": 1200,
            "firstByteLatency": 300
        }
    })
}

pub fn ping() -> Value {
    json!({ "type": "ping" })
}

/// The events of a complete, text-only reply.
pub fn text_reply(fragments: &[&str]) -> Vec<Value> {
    let mut events =
        vec![message_start("msg_test", "test-model"), text_block_start(0)];
    events.extend(fragments.iter().map(|fragment| text_delta(0, fragment)));
    events.extend([
        content_block_stop(0),
        message_delta("end_turn"),
        message_stop(),
    ]);
    events
}
