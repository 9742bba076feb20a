#[cfg(test)]
use std::collections::VecDeque;
use std::fmt::{self, Display};
use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::Response;

/// A transport failure while reading raw bytes.
#[derive(Debug, PartialEq, Eq)]
pub struct Error(pub String);

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>;

/// An adapter for streaming byte chunks.
pub enum Chunks {
    Response(Response),
    Stream(ByteStream),
}

impl Chunks {
    #[inline]
    pub fn from_response(response: Response) -> Self {
        Chunks::Response(response)
    }

    pub fn from_stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Display,
    {
        Chunks::Stream(Box::pin(
            stream.map(|chunk| chunk.map_err(|err| Error(err.to_string()))),
        ))
    }

    #[cfg(test)]
    pub fn from_vec_deque(vec: VecDeque<Bytes>) -> Self {
        Self::from_stream(futures_util::stream::iter(
            vec.into_iter().map(Ok::<_, std::convert::Infallible>),
        ))
    }

    #[inline]
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
        match self {
            Chunks::Response(response) => response
                .chunk()
                .await
                .map_err(|err| Error(err.to_string())),
            Chunks::Stream(stream) => stream.next().await.transpose(),
        }
    }
}
