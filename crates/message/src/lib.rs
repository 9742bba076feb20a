//! A provider-agnostic model for streamed assistant messages.
//!
//! A streaming chat response is delivered as a sequence of small
//! [`MessageChunk`]s. Chunks form a monoid under [`concat`]: the empty
//! chunk is the identity and the operation is associative, so folding
//! any prefix of a stream yields a valid partial message that can be
//! rendered as-is.
//!
//! Tool-call arguments arrive as arbitrary string prefixes of a JSON
//! document. The [`ToolCallAccumulator`] buffers them per index and
//! parses each buffer exactly once, when the call is finalized. The
//! terminal result of a stream is an [`AccumulatedMessage`].
//!
//! Types in this crate don't do any I/O. Decoding a concrete wire
//! protocol into chunks is the job of the provider crates.

#![deny(missing_docs)]

mod chunk;
mod message;
mod tool_call;
mod usage;

pub use chunk::*;
pub use message::*;
pub use tool_call::*;
pub use usage::*;

/// Combines two chunks into one, `a` first.
///
/// This is a shorthand for [`MessageChunk::concat`].
#[inline]
pub fn concat(a: MessageChunk, b: MessageChunk) -> MessageChunk {
    a.concat(b)
}

/// Returns the text token carried by `chunk`, if it is a bare,
/// non-empty string.
///
/// This is a shorthand for [`MessageChunk::token`].
#[inline]
pub fn extract_token(chunk: &MessageChunk) -> Option<&str> {
    chunk.token()
}
