use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};

/// Counts the bytes read through it, so an upload can report its exact size
/// without knowing the length of the source up front.
pub struct ReadCounter<R> {
    inner: R,
    n: u64,
}

impl<R> ReadCounter<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, n: 0 }
    }

    /// Bytes read so far.
    pub fn n(&self) -> u64 {
        self.n
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ReadCounter<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let res = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = res {
            self.n += (buf.filled().len() - before) as u64;
        }
        res
    }
}
