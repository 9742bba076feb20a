use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::chunk::ToolCallChunk;

/// A finished tool call with parsed arguments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// The unique identifier for the tool call.
    pub id: String,
    /// The name of the tool to call.
    pub name: String,
    /// The parsed arguments.
    pub arguments: Value,
}

/// A tool call whose arguments are not valid JSON at the end of the
/// stream.
///
/// The error is scoped to that single call. Text and other tool calls
/// of the same message are unaffected.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ToolCallParseError {
    /// Index of the failed call.
    pub index: usize,
    /// Identifier of the failed call, if one was received.
    pub id: Option<String>,
    /// Name of the failed call, if one was received.
    pub name: Option<String>,
    /// The raw argument buffer.
    pub arguments: String,
    /// Why parsing failed.
    pub reason: String,
}

impl Display for ToolCallParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid arguments for tool call {} ({}): {}",
            self.index,
            self.name.as_deref().unwrap_or("<unnamed>"),
            self.reason
        )
    }
}

impl Error for ToolCallParseError {}

/// The outcome of finalizing every tool call of a stream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FinalizedToolCalls {
    /// Successfully parsed calls, ordered by ascending index.
    pub tool_calls: Vec<ToolCall>,
    /// Calls whose arguments could not be parsed.
    pub failures: Vec<ToolCallParseError>,
}

/// Buffers tool call fragments per index and parses them into
/// [`ToolCall`]s.
///
/// Each buffer is parsed once, when the call is finalized. Finalizing
/// before the end of the stream is optional: a buffer that is not valid
/// JSON yet simply stays open. At the end of the stream, every open
/// call is finalized and parse failures are reported.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    pending: BTreeMap<usize, ToolCallChunk>,
    // Arrival order is kept among calls sharing an index.
    finished: Vec<(usize, ToolCall)>,
    // Raw buffers of calls finalized before the end of the stream, so a
    // late fragment can reopen them.
    closed: BTreeMap<usize, ToolCallChunk>,
    failures: Vec<ToolCallParseError>,
}

impl ToolCallAccumulator {
    /// Creates an empty accumulator.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one fragment.
    ///
    /// A fragment that originates a call at index `i` is a finalization
    /// opportunity for every open call below `i`. If a call at `i` is
    /// still open, it can never receive more data, so it is finalized
    /// for good.
    ///
    /// A late fragment for a call that was finalized early reopens it,
    /// unless the fragment is blank.
    pub fn push(&mut self, chunk: &ToolCallChunk) {
        if chunk.is_origin() {
            let passed: Vec<usize> =
                self.pending.range(..chunk.index).map(|(i, _)| *i).collect();
            for index in passed {
                self.try_finalize(index);
            }
            self.closed.remove(&chunk.index);
            if let Some(prev) = self.pending.remove(&chunk.index) {
                self.finalize(prev);
            }
            self.pending.insert(chunk.index, chunk.clone());
            return;
        }

        if let Some(pending) = self.pending.get_mut(&chunk.index) {
            pending.merge(chunk.clone());
            return;
        }
        if self.closed.contains_key(&chunk.index) {
            if !chunk.args.trim().is_empty() {
                self.reopen(chunk);
            }
            return;
        }
        self.pending.insert(chunk.index, chunk.clone());
    }

    /// Attempts to finalize the call at `index`.
    ///
    /// Returns `true` if the call was finalized. A buffer that doesn't
    /// parse yet stays open and no error is recorded. An empty buffer
    /// also stays open, its fragments may still be on the way.
    pub fn try_finalize(&mut self, index: usize) -> bool {
        let Some(pending) = self.pending.get(&index) else {
            return false;
        };
        if pending.args.trim().is_empty() {
            return false;
        }
        let Ok(arguments) = serde_json::from_str::<Value>(&pending.args) else {
            return false;
        };
        if let Some(pending) = self.pending.remove(&index) {
            self.closed.insert(index, pending.clone());
            self.finished.push((index, make_tool_call(pending, arguments)));
        }
        true
    }

    fn reopen(&mut self, chunk: &ToolCallChunk) {
        let Some(mut reopened) = self.closed.remove(&chunk.index) else {
            return;
        };
        // The early finalized call is the latest one at its index.
        if let Some(pos) =
            self.finished.iter().rposition(|(i, _)| *i == chunk.index)
        {
            self.finished.remove(pos);
        }
        reopened.merge(chunk.clone());
        self.pending.insert(chunk.index, reopened);
    }

    /// Returns the number of calls that are still open.
    #[inline]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Returns the number of finalized calls, including failed ones.
    #[inline]
    pub fn finalized_len(&self) -> usize {
        self.finished.len() + self.failures.len()
    }

    /// Finalizes every open call at the end of the stream.
    pub fn finish(mut self) -> FinalizedToolCalls {
        let pending = std::mem::take(&mut self.pending);
        for (_, chunk) in pending {
            self.finalize(chunk);
        }

        // Stable, so calls sharing an index keep their arrival order.
        self.finished.sort_by_key(|(index, _)| *index);
        self.failures.sort_by_key(|failure| failure.index);
        FinalizedToolCalls {
            tool_calls: self
                .finished
                .into_iter()
                .map(|(_, tool_call)| tool_call)
                .collect(),
            failures: self.failures,
        }
    }

    fn finalize(&mut self, chunk: ToolCallChunk) {
        match parse_arguments(&chunk.args) {
            Ok(arguments) => {
                let index = chunk.index;
                self.finished.push((index, make_tool_call(chunk, arguments)));
            }
            Err(err) => self.failures.push(ToolCallParseError {
                index: chunk.index,
                id: chunk.id,
                name: chunk.name,
                arguments: chunk.args,
                reason: err.to_string(),
            }),
        }
    }
}

#[inline]
fn make_tool_call(chunk: ToolCallChunk, arguments: Value) -> ToolCall {
    ToolCall {
        id: chunk.id.unwrap_or_default(),
        name: chunk.name.unwrap_or_default(),
        arguments,
    }
}

fn parse_arguments(args: &str) -> Result<Value, serde_json::Error> {
    // Tools without parameters stream no argument fragments at all.
    if args.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_str(args)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_reassemble() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(&ToolCallChunk::start(0, "t1", "get_weather"));
        acc.push(&ToolCallChunk::args(0, "{\"loc"));
        acc.push(&ToolCallChunk::args(0, "ation\":\"NYC\"}"));
        let finalized = acc.finish();
        assert!(finalized.failures.is_empty());
        assert_eq!(
            finalized.tool_calls,
            vec![ToolCall {
                id: "t1".to_owned(),
                name: "get_weather".to_owned(),
                arguments: json!({ "location": "NYC" }),
            }]
        );
    }

    #[test]
    fn test_incomplete_stays_open() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(&ToolCallChunk::start(0, "t1", "search"));
        acc.push(&ToolCallChunk::args(0, "{\"q\":"));
        assert!(!acc.try_finalize(0));
        assert_eq!(acc.pending_len(), 1);

        acc.push(&ToolCallChunk::args(0, "\"rust\"}"));
        assert!(acc.try_finalize(0));
        assert_eq!(acc.pending_len(), 0);
        assert_eq!(acc.finalized_len(), 1);
        assert!(!acc.try_finalize(0));
    }

    #[test]
    fn test_ordered_by_index() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(&ToolCallChunk::start(2, "t2", "b"));
        acc.push(&ToolCallChunk::args(2, "{}"));
        acc.push(&ToolCallChunk::start(1, "t1", "a"));
        acc.push(&ToolCallChunk::args(1, "{}"));
        assert!(acc.try_finalize(2));
        let names: Vec<_> = acc
            .finish()
            .tool_calls
            .into_iter()
            .map(|tool_call| tool_call.name)
            .collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn test_moving_past_finalizes() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(&ToolCallChunk::start(0, "t1", "a"));
        acc.push(&ToolCallChunk::args(0, "{\"x\":1}"));
        acc.push(&ToolCallChunk::start(1, "t2", "b"));
        assert_eq!(acc.pending_len(), 1);
        assert_eq!(acc.finalized_len(), 1);
    }

    #[test]
    fn test_reused_index() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(&ToolCallChunk::start(0, "t1", "a"));
        acc.push(&ToolCallChunk::args(0, "{\"x\":"));
        acc.push(&ToolCallChunk::start(0, "t2", "b"));
        acc.push(&ToolCallChunk::args(0, "{\"y\":2}"));
        let finalized = acc.finish();
        assert_eq!(finalized.tool_calls.len(), 1);
        assert_eq!(finalized.tool_calls[0].id, "t2");
        assert_eq!(finalized.failures.len(), 1);
        assert_eq!(finalized.failures[0].id.as_deref(), Some("t1"));
    }

    #[test]
    fn test_failure_is_scoped() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(&ToolCallChunk::start(0, "t1", "a"));
        acc.push(&ToolCallChunk::args(0, "{\"x\":1}"));
        acc.push(&ToolCallChunk::start(1, "t2", "b"));
        acc.push(&ToolCallChunk::args(1, "{\"y\":[1,"));
        let finalized = acc.finish();
        assert_eq!(finalized.tool_calls.len(), 1);
        assert_eq!(finalized.tool_calls[0].arguments, json!({ "x": 1 }));
        let failure = &finalized.failures[0];
        assert_eq!(failure.index, 1);
        assert_eq!(failure.name.as_deref(), Some("b"));
        assert_eq!(failure.arguments, "{\"y\":[1,");
        assert!(failure.to_string().contains("tool call 1 (b)"));
    }

    #[test]
    fn test_empty_buffer_stays_open() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(&ToolCallChunk::start(0, "t1", "a"));
        acc.push(&ToolCallChunk::start(1, "t2", "b"));
        assert!(!acc.try_finalize(0));
        assert_eq!(acc.pending_len(), 2);

        acc.push(&ToolCallChunk::args(0, "{\"x\":1}"));
        acc.push(&ToolCallChunk::args(1, "{\"y\":2}"));
        let finalized = acc.finish();
        assert_eq!(finalized.tool_calls[0].arguments, json!({ "x": 1 }));
        assert_eq!(finalized.tool_calls[1].arguments, json!({ "y": 2 }));
    }

    #[test]
    fn test_blank_fragment_after_finalized() {
        for blank in ["", " ", "\n"] {
            let mut acc = ToolCallAccumulator::new();
            acc.push(&ToolCallChunk::start(0, "t1", "a"));
            acc.push(&ToolCallChunk::args(0, "{\"x\":1}"));
            acc.push(&ToolCallChunk::start(1, "t2", "b"));
            assert_eq!(acc.finalized_len(), 1);
            acc.push(&ToolCallChunk::args(0, blank));
            acc.push(&ToolCallChunk::args(1, "{\"y\":2}"));
            let finalized = acc.finish();
            assert!(finalized.failures.is_empty());
            let ids: Vec<_> = finalized
                .tool_calls
                .iter()
                .map(|tool_call| tool_call.id.as_str())
                .collect();
            assert_eq!(ids, ["t1", "t2"]);
            assert_eq!(finalized.tool_calls[0].arguments, json!({ "x": 1 }));
        }
    }

    #[test]
    fn test_late_fragment_reopens() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(&ToolCallChunk::start(0, "t1", "a"));
        acc.push(&ToolCallChunk::args(0, "1"));
        assert!(acc.try_finalize(0));
        acc.push(&ToolCallChunk::args(0, "2"));
        assert_eq!(acc.pending_len(), 1);
        assert_eq!(acc.finalized_len(), 0);

        let finalized = acc.finish();
        assert_eq!(finalized.tool_calls.len(), 1);
        assert_eq!(finalized.tool_calls[0].id, "t1");
        assert_eq!(finalized.tool_calls[0].arguments, json!(12));
    }

    #[test]
    fn test_empty_arguments() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(&ToolCallChunk::start(0, "t1", "now"));
        let finalized = acc.finish();
        assert_eq!(finalized.tool_calls[0].arguments, json!({}));
    }

    #[test]
    fn test_orphan_fragment() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(&ToolCallChunk::args(3, "[1, 2]"));
        let finalized = acc.finish();
        assert_eq!(finalized.tool_calls[0].id, "");
        assert_eq!(finalized.tool_calls[0].name, "");
        assert_eq!(finalized.tool_calls[0].arguments, json!([1, 2]));
    }
}
