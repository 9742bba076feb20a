use streamfold_message::{MessageChunk, MessageMetadata, ToolCallChunk, Usage};

use crate::proto::{BlockDelta, ContentBlock, RawEvent};

/// Maps one decoded event to the chunk it contributes, if any.
///
/// `ping`, unknown events, `content_block_stop`, `[DONE]`, and content
/// kinds other than text and tool use contribute nothing. Dropping them
/// is not an error.
pub fn build_chunk(event: RawEvent) -> Option<MessageChunk> {
    match event {
        RawEvent::MessageStart(message) => {
            Some(MessageChunk::metadata(MessageMetadata {
                id: message.id,
                role: message.role,
                model: message.model,
                ..Default::default()
            }))
        }
        RawEvent::MessageDelta { delta, usage } => Some(MessageChunk {
            metadata: MessageMetadata {
                stop_reason: delta.stop_reason,
                stop_sequence: delta.stop_sequence,
                ..Default::default()
            },
            usage: usage.map(|usage| {
                Usage::new(
                    usage.input_tokens.unwrap_or_default(),
                    usage.output_tokens.unwrap_or_default(),
                )
            }),
            ..Default::default()
        }),
        RawEvent::ContentBlockStart {
            index,
            content_block,
        } => match content_block {
            ContentBlock::ToolUse { id, name } => Some(MessageChunk::tool_call(
                ToolCallChunk::start(index, id, name),
            )),
            ContentBlock::Text { text } if !text.is_empty() => {
                Some(MessageChunk::text(index, text))
            }
            ContentBlock::Text { .. } | ContentBlock::Other => None,
        },
        RawEvent::ContentBlockDelta { index, delta } => match delta {
            BlockDelta::TextDelta { text } => {
                Some(MessageChunk::text(index, text))
            }
            BlockDelta::InputJsonDelta { partial_json } => {
                Some(MessageChunk::tool_call(ToolCallChunk::args(
                    index,
                    partial_json,
                )))
            }
            BlockDelta::Other => None,
        },
        RawEvent::MessageStop {
            metrics: Some(metrics),
        } => Some(MessageChunk::usage(Usage::new(
            metrics.input_token_count,
            metrics.output_token_count,
        ))),
        RawEvent::MessageStop { metrics: None }
        | RawEvent::ContentBlockStop { .. }
        | RawEvent::Ping
        | RawEvent::Unknown(_)
        | RawEvent::Done => None,
    }
}
