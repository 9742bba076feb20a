use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use serde::{Deserialize, Serialize};

use crate::usage::{Usage, merge_usage};

/// A fragment of a tool call, keyed by its position in the response.
///
/// Only the chunk that originates an index carries `id` and `name`,
/// every later chunk at that index carries an argument fragment only.
/// The concatenated `args` are an arbitrary prefix of a JSON document
/// until the call is finalized.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct ToolCallChunk {
    /// Position of the call, stable for the lifetime of one stream.
    pub index: usize,
    /// Identifier assigned by the provider.
    pub id: Option<String>,
    /// Name of the tool to call.
    pub name: Option<String>,
    /// A fragment of the JSON-encoded arguments.
    pub args: String,
}

impl ToolCallChunk {
    /// Creates the chunk that originates a tool call at `index`.
    #[inline]
    pub fn start<I, N>(index: usize, id: I, name: N) -> Self
    where
        I: Into<String>,
        N: Into<String>,
    {
        Self {
            index,
            id: Some(id.into()),
            name: Some(name.into()),
            args: String::new(),
        }
    }

    /// Creates a chunk carrying an argument fragment for `index`.
    #[inline]
    pub fn args<S: Into<String>>(index: usize, fragment: S) -> Self {
        Self {
            index,
            id: None,
            name: None,
            args: fragment.into(),
        }
    }

    /// Returns `true` if this chunk opens a new tool call.
    #[inline]
    pub fn is_origin(&self) -> bool {
        self.id.is_some() || self.name.is_some()
    }

    /// Appends `other` to this chunk. `id` and `name` keep the first
    /// non-null value.
    pub fn merge(&mut self, other: ToolCallChunk) {
        if self.id.is_none() {
            self.id = other.id;
        }
        if self.name.is_none() {
            self.name = other.name;
        }
        self.args.push_str(&other.args);
    }
}

/// Top-level fields of a message.
///
/// Every field merges with last-non-null-wins.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct MessageMetadata {
    /// Identifier of the message.
    pub id: Option<String>,
    /// Role of the author, usually `assistant`.
    pub role: Option<String>,
    /// The model that produced the message.
    pub model: Option<String>,
    /// Why the model stopped generating.
    pub stop_reason: Option<String>,
    /// The stop sequence that was hit, if any.
    pub stop_sequence: Option<String>,
}

impl MessageMetadata {
    /// Returns `true` if no field is set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.id.is_none()
            && self.role.is_none()
            && self.model.is_none()
            && self.stop_reason.is_none()
            && self.stop_sequence.is_none()
    }

    #[inline]
    fn merge(self, other: Self) -> Self {
        Self {
            id: other.id.or(self.id),
            role: other.role.or(self.role),
            model: other.model.or(self.model),
            stop_reason: other.stop_reason.or(self.stop_reason),
            stop_sequence: other.stop_sequence.or(self.stop_sequence),
        }
    }
}

/// A mergeable partial result of a streamed message.
///
/// `MessageChunk::default()` is the empty chunk, which is both a left
/// and a right identity of [`MessageChunk::concat`].
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct MessageChunk {
    /// Text fragment. Empty when the chunk carries no text.
    pub text: String,
    /// Index of the content block the text belongs to. Used for
    /// ordering only, text is never keyed by it.
    pub text_index: Option<usize>,
    /// Partial tool calls, keyed by index.
    pub tool_calls: BTreeMap<usize, ToolCallChunk>,
    /// Top-level message fields.
    pub metadata: MessageMetadata,
    /// Usage fragment.
    pub usage: Option<Usage>,
}

impl MessageChunk {
    /// Creates a text chunk for the content block at `index`.
    #[inline]
    pub fn text<S: Into<String>>(index: usize, text: S) -> Self {
        Self {
            text: text.into(),
            text_index: Some(index),
            ..Default::default()
        }
    }

    /// Creates a chunk carrying a single tool call fragment.
    #[inline]
    pub fn tool_call(chunk: ToolCallChunk) -> Self {
        Self {
            tool_calls: BTreeMap::from([(chunk.index, chunk)]),
            ..Default::default()
        }
    }

    /// Creates a chunk carrying top-level fields only.
    #[inline]
    pub fn metadata(metadata: MessageMetadata) -> Self {
        Self {
            metadata,
            ..Default::default()
        }
    }

    /// Creates a chunk carrying a usage fragment only.
    #[inline]
    pub fn usage(usage: Usage) -> Self {
        Self {
            usage: Some(usage),
            ..Default::default()
        }
    }

    /// Returns `true` if this is the empty chunk.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Combines this chunk with `other`, in that order.
    ///
    /// - Text is appended.
    /// - Tool calls are grouped by index and merged with
    ///   [`ToolCallChunk::merge`].
    /// - Metadata fields are last-non-null-wins.
    /// - Usage is summed field by field.
    pub fn concat(mut self, other: MessageChunk) -> MessageChunk {
        self.text.push_str(&other.text);
        self.text_index = other.text_index.or(self.text_index);
        for (index, tool_call) in other.tool_calls {
            match self.tool_calls.entry(index) {
                Entry::Vacant(entry) => {
                    entry.insert(tool_call);
                }
                Entry::Occupied(mut entry) => entry.get_mut().merge(tool_call),
            }
        }
        self.metadata = self.metadata.merge(other.metadata);
        self.usage = merge_usage(self.usage, other.usage);
        self
    }

    /// Returns the text of this chunk when its content is a bare,
    /// non-empty string.
    ///
    /// Chunks that carry tool call content never yield a token, so a
    /// token-by-token consumer doesn't receive spurious events.
    #[inline]
    pub fn token(&self) -> Option<&str> {
        if self.text.is_empty() || !self.tool_calls.is_empty() {
            return None;
        }
        Some(&self.text)
    }
}

impl FromIterator<MessageChunk> for MessageChunk {
    /// Left-folds the chunks, starting from the empty chunk.
    fn from_iter<T: IntoIterator<Item = MessageChunk>>(iter: T) -> Self {
        iter.into_iter().fold(Self::default(), Self::concat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_ordering() {
        let chunk: MessageChunk = ["Hel", "lo, ", "world"]
            .into_iter()
            .map(|s| MessageChunk::text(0, s))
            .collect();
        assert_eq!(chunk.text, "Hello, world");
        assert_eq!(chunk.text_index, Some(0));
    }

    #[test]
    fn test_tool_calls_by_index() {
        let chunk: MessageChunk = [
            MessageChunk::tool_call(ToolCallChunk::start(0, "t1", "a")),
            MessageChunk::tool_call(ToolCallChunk::start(1, "t2", "b")),
            MessageChunk::tool_call(ToolCallChunk::args(1, "{\"y\"")),
            MessageChunk::tool_call(ToolCallChunk::args(0, "{\"x\":1}")),
            MessageChunk::tool_call(ToolCallChunk::args(1, ":2}")),
        ]
        .into_iter()
        .collect();

        assert_eq!(chunk.tool_calls.len(), 2);
        let first = &chunk.tool_calls[&0];
        assert_eq!(first.id.as_deref(), Some("t1"));
        assert_eq!(first.name.as_deref(), Some("a"));
        assert_eq!(first.args, "{\"x\":1}");
        let second = &chunk.tool_calls[&1];
        assert_eq!(second.id.as_deref(), Some("t2"));
        assert_eq!(second.args, "{\"y\":2}");
    }

    #[test]
    fn test_first_id_wins() {
        let mut tool_call = ToolCallChunk::start(0, "t1", "a");
        tool_call.merge(ToolCallChunk::start(0, "t2", "b"));
        assert_eq!(tool_call.id.as_deref(), Some("t1"));
        assert_eq!(tool_call.name.as_deref(), Some("a"));
    }

    #[test]
    fn test_last_metadata_wins() {
        let a = MessageChunk::metadata(MessageMetadata {
            role: Some("assistant".to_owned()),
            stop_reason: Some("max_tokens".to_owned()),
            ..Default::default()
        });
        let b = MessageChunk::metadata(MessageMetadata {
            stop_reason: Some("end_turn".to_owned()),
            ..Default::default()
        });
        let merged = a.concat(b);
        assert_eq!(merged.metadata.role.as_deref(), Some("assistant"));
        assert_eq!(merged.metadata.stop_reason.as_deref(), Some("end_turn"));
    }

    #[test]
    fn test_usage_merge() {
        let merged = MessageChunk::usage(Usage::input(10))
            .concat(MessageChunk::default())
            .concat(MessageChunk::usage(Usage::output(5)));
        assert_eq!(merged.usage, Some(Usage::new(10, 5)));
        assert_eq!(merged.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn test_token() {
        assert_eq!(MessageChunk::text(0, "Hi").token(), Some("Hi"));
        assert_eq!(MessageChunk::text(0, "").token(), None);
        assert_eq!(MessageChunk::default().token(), None);
        assert_eq!(
            MessageChunk::tool_call(ToolCallChunk::args(0, "{")).token(),
            None
        );
        assert_eq!(MessageChunk::usage(Usage::new(1, 1)).token(), None);
    }

    #[test]
    fn test_empty() {
        assert!(MessageChunk::default().is_empty());
        assert!(!MessageChunk::text(0, "").is_empty());
        assert!(MessageMetadata::default().is_empty());
    }
}
