mod chunks;
mod frames;

pub use chunks::{Chunks, Error as ChunksError};
pub use frames::{Error as FramesError, Frames};
