//! Raw Capture Path.
//!
//! [`TapStream`] wraps an accepted connection underneath the HTTP layer. Every
//! chunk read from the peer passes through it before hyper sees it, so the
//! bytes relayed to viewers are exactly the bytes received, whatever the HTTP
//! parser later makes of them.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::capture::engine::{CaptureEngine, CaptureHandle};
use crate::net::connection::ConnectionMeta;

enum TapState {
    /// Nothing read yet.
    AwaitingFirstChunk,
    /// First chunk did not target the capture endpoint.
    Ignored,
    Capturing(Arc<CaptureHandle>),
}

/// Transparent stream wrapper feeding the capture engine.
pub struct TapStream<S> {
    inner: S,
    meta: ConnectionMeta,
    engine: Arc<CaptureEngine>,
    state: TapState,
}

impl<S> TapStream<S> {
    pub fn new(inner: S, meta: ConnectionMeta, engine: Arc<CaptureEngine>) -> Self {
        Self {
            inner,
            meta,
            engine,
            state: TapState::AwaitingFirstChunk,
        }
    }

    pub fn meta(&self) -> &ConnectionMeta {
        &self.meta
    }

    /// The capture this connection feeds, if any.
    pub fn capture(&self) -> Option<&Arc<CaptureHandle>> {
        match &self.state {
            TapState::Capturing(handle) => Some(handle),
            _ => None,
        }
    }

    fn observe(&mut self, chunk: &[u8]) {
        if let TapState::AwaitingFirstChunk = self.state {
            self.state = match self.engine.begin(&self.meta, chunk) {
                Some(handle) => TapState::Capturing(handle),
                None => {
                    tracing::trace!(connection_id = %self.meta.id, "Not a capture, tap disengaged");
                    TapState::Ignored
                }
            };
        }

        if let TapState::Capturing(handle) = &self.state {
            self.engine.relay(handle, chunk);
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for TapStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = Pin::into_inner(self);
        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;

        let chunk = &buf.filled()[before..];
        if !chunk.is_empty() {
            this.observe(chunk);
        }
        Poll::Ready(Ok(()))
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for TapStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl<S> Drop for TapStream<S> {
    fn drop(&mut self) {
        if let TapState::Capturing(handle) = &self.state {
            self.engine.release(self.meta.key(), handle);
        }
    }
}
