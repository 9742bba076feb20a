use std::time::Duration;

/// Builder for [`StreamConfig`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct StreamConfigBuilder {
    frame_timeout: Option<Duration>,
    skip_malformed_frames: bool,
}

impl StreamConfigBuilder {
    /// Creates a builder with default settings.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how long to wait for the next frame before the stream is
    /// abandoned.
    #[inline]
    pub fn with_frame_timeout(mut self, timeout: Duration) -> Self {
        self.frame_timeout = Some(timeout);
        self
    }

    /// Sets whether malformed frames are logged and skipped instead of
    /// being surfaced to the caller.
    #[inline]
    pub fn skip_malformed_frames(mut self, skip: bool) -> Self {
        self.skip_malformed_frames = skip;
        self
    }

    /// Builds the configuration.
    #[inline]
    pub fn build(self) -> StreamConfig {
        StreamConfig {
            frame_timeout: self.frame_timeout,
            skip_malformed_frames: self.skip_malformed_frames,
        }
    }
}

/// Configuration for folding one response stream.
///
/// The default has no timeout and surfaces every malformed frame.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct StreamConfig {
    pub(crate) frame_timeout: Option<Duration>,
    pub(crate) skip_malformed_frames: bool,
}

impl StreamConfig {
    /// Returns a builder.
    #[inline]
    pub fn builder() -> StreamConfigBuilder {
        StreamConfigBuilder::new()
    }

    /// Returns the per-frame timeout, if any.
    #[inline]
    pub fn frame_timeout(&self) -> Option<Duration> {
        self.frame_timeout
    }

    /// Returns whether malformed frames are skipped.
    #[inline]
    pub fn skips_malformed_frames(&self) -> bool {
        self.skip_malformed_frames
    }
}
