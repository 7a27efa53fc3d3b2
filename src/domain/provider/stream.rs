//! A pull-based, single-terminal-event chunk stream.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{BoxStream, Stream};

use super::errors::ProviderError;
use super::response::StreamChunk;

/// Stream of chunks that ends with exactly one terminal event.
///
/// The terminal event is a final chunk, an error, or `Cancelled`. After it,
/// every poll returns `None`. An inner stream that runs dry without a final
/// chunk is reported as a network error.
pub struct ChunkStream {
    inner: BoxStream<'static, Result<StreamChunk, ProviderError>>,
    finished: bool,
}

impl ChunkStream {
    /// Wraps a raw chunk stream.
    pub fn new<S>(inner: S) -> Self
    where
        S: Stream<Item = Result<StreamChunk, ProviderError>> + Send + 'static,
    {
        Self {
            inner: Box::pin(inner),
            finished: false,
        }
    }

    /// A stream that yields the given chunks then nothing.
    pub fn from_chunks(chunks: Vec<Result<StreamChunk, ProviderError>>) -> Self {
        Self::new(futures::stream::iter(chunks))
    }

    /// Returns true once the terminal event has been delivered.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Stream for ChunkStream {
    type Item = Result<StreamChunk, ProviderError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }

        match self.inner.as_mut().poll_next(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(chunk))) => {
                if chunk.is_final {
                    self.finished = true;
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(err))) => {
                self.finished = true;
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(Some(Err(ProviderError::network(
                    "stream ended before completion",
                ))))
            }
        }
    }
}

impl std::fmt::Debug for ChunkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStream")
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn fuses_after_final_chunk() {
        let mut stream = ChunkStream::from_chunks(vec![
            Ok(StreamChunk::content("Hel")),
            Ok(StreamChunk::final_chunk(4)),
            Ok(StreamChunk::content("ignored")),
        ]);

        assert_eq!(stream.next().await.unwrap().unwrap().text, "Hel");
        assert!(stream.next().await.unwrap().unwrap().is_final);
        assert!(stream.next().await.is_none());
        assert!(stream.is_finished());
    }

    #[tokio::test]
    async fn fuses_after_error() {
        let mut stream = ChunkStream::from_chunks(vec![
            Ok(StreamChunk::content("a")),
            Err(ProviderError::Cancelled),
            Ok(StreamChunk::content("b")),
        ]);

        assert!(stream.next().await.unwrap().is_ok());
        assert_eq!(stream.next().await.unwrap().unwrap_err(), ProviderError::Cancelled);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn premature_end_is_network_error() {
        let mut stream = ChunkStream::from_chunks(vec![Ok(StreamChunk::content("partial"))]);

        assert!(stream.next().await.unwrap().is_ok());
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, ProviderError::Network(_)));
        assert!(stream.next().await.is_none());
    }
}
