use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use http::HeaderMap;
use http_body::{Body, SizeHint};
use pin_project::pin_project;
use tokio::io::{AsyncRead, AsyncReadExt, Take};
use tokio_util::io::ReaderStream;

/// Streams at most `limit` bytes of an `AsyncRead` as an `http_body::Body`.
///
/// The reader is owned by the body, so dropping the body (client gone, request cancelled)
/// closes the underlying file.
#[pin_project]
#[derive(Debug)]
pub struct AsyncReadBody<T> {
    #[pin]
    reader: ReaderStream<Take<T>>,
    remaining: u64,
}

impl<T> AsyncReadBody<T>
where
    T: AsyncRead,
{
    pub(crate) fn new(read: T, capacity: usize, limit: u64) -> Self {
        Self {
            reader: ReaderStream::with_capacity(read.take(limit), capacity),
            remaining: limit,
        }
    }
}

impl<T> Body for AsyncReadBody<T>
where
    T: AsyncRead,
{
    type Data = Bytes;
    type Error = io::Error;

    fn poll_data(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Self::Data, Self::Error>>> {
        let this = self.project();
        let chunk = futures_util::ready!(this.reader.poll_next(cx));
        if let Some(Ok(bytes)) = &chunk {
            *this.remaining = this.remaining.saturating_sub(bytes.len() as u64);
        }

        Poll::Ready(chunk)
    }

    fn poll_trailers(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Result<Option<HeaderMap>, Self::Error>> {
        Poll::Ready(Ok(None))
    }

    fn size_hint(&self) -> SizeHint {
        let mut hint = SizeHint::new();
        hint.set_upper(self.remaining);
        hint
    }
}
