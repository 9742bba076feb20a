use serde::{Deserialize, Serialize};

use crate::chunk::{MessageChunk, MessageMetadata};
use crate::tool_call::{ToolCall, ToolCallAccumulator, ToolCallParseError};
use crate::usage::Usage;

/// A finished message, folded from a whole stream of chunks.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulatedMessage {
    /// The free text of the message.
    pub text: String,
    /// Tool calls, ordered by ascending index.
    pub tool_calls: Vec<ToolCall>,
    /// Total usage, if the provider reported any.
    pub usage: Option<Usage>,
    /// Why the model stopped generating.
    pub stop_reason: Option<String>,
    /// Other top-level fields of the message.
    pub metadata: MessageMetadata,
}

impl AccumulatedMessage {
    /// Assembles a message from the folded chunk of a stream and the
    /// tool calls finalized for it.
    pub fn new(folded: MessageChunk, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            text: folded.text,
            tool_calls,
            usage: folded.usage,
            stop_reason: folded.metadata.stop_reason.clone(),
            metadata: folded.metadata,
        }
    }

    /// Finalizes any prefix fold into a message.
    ///
    /// Tool calls are taken from the partial calls in `folded`. Calls
    /// whose arguments don't parse are left out of the message and
    /// returned as errors.
    pub fn from_chunk(
        mut folded: MessageChunk,
    ) -> (Self, Vec<ToolCallParseError>) {
        let mut accumulator = ToolCallAccumulator::new();
        for (_, tool_call) in std::mem::take(&mut folded.tool_calls) {
            accumulator.push(&tool_call);
        }
        let finalized = accumulator.finish();
        (Self::new(folded, finalized.tool_calls), finalized.failures)
    }

    /// Returns `true` if the message requests any tool call.
    #[inline]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}
