use std::ops::Add;

use serde::{Deserialize, Serialize};

/// Token usage of a response, or a fragment of it.
///
/// Fragments are merged by field-wise sum, never by overwrite. A
/// fragment built with [`Usage::new`] always has
/// `total_tokens == input_tokens + output_tokens`, and sums preserve
/// that.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct Usage {
    /// Tokens consumed by the prompt.
    pub input_tokens: u64,
    /// Tokens generated by the model.
    pub output_tokens: u64,
    /// Sum of input and output tokens.
    pub total_tokens: u64,
}

impl Usage {
    /// Creates a usage fragment, deriving the total.
    #[inline]
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens.saturating_add(output_tokens),
        }
    }

    /// Creates a fragment that only reports input tokens.
    #[inline]
    pub fn input(tokens: u64) -> Self {
        Self::new(tokens, 0)
    }

    /// Creates a fragment that only reports output tokens.
    #[inline]
    pub fn output(tokens: u64) -> Self {
        Self::new(0, tokens)
    }

    /// Merges two fragments by field-wise sum.
    #[inline]
    pub fn merge(self, other: Self) -> Self {
        Self {
            input_tokens: self.input_tokens.saturating_add(other.input_tokens),
            output_tokens: self
                .output_tokens
                .saturating_add(other.output_tokens),
            total_tokens: self.total_tokens.saturating_add(other.total_tokens),
        }
    }
}

impl Add for Usage {
    type Output = Usage;

    #[inline]
    fn add(self, rhs: Self) -> Self::Output {
        self.merge(rhs)
    }
}

/// Absent + present = present; present + present = summed.
#[inline]
pub(crate) fn merge_usage(a: Option<Usage>, b: Option<Usage>) -> Option<Usage> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a + b),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_fragments() {
        let merged = Usage::input(10) + Usage::output(5);
        assert_eq!(merged, Usage::new(10, 5));
        assert_eq!(merged.total_tokens, 15);
    }

    #[test]
    fn test_merge_optional() {
        let usage = Usage::new(3, 4);
        assert_eq!(merge_usage(None, None), None);
        assert_eq!(merge_usage(Some(usage), None), Some(usage));
        assert_eq!(merge_usage(None, Some(usage)), Some(usage));
        assert_eq!(
            merge_usage(Some(usage), Some(usage)),
            Some(Usage::new(6, 8))
        );
    }

    #[test]
    fn test_saturating() {
        let merged = Usage::output(u64::MAX) + Usage::output(1);
        assert_eq!(merged.output_tokens, u64::MAX);
    }
}
