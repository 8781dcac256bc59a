//! Response body that signals when the acknowledgment has been handed off.
//!
//! The signal fires when the body has been read to the end, fails, or is
//! dropped by the server. Work gated on [`AckSignal`] therefore never starts
//! before the caller's response has left the handler.

use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::{Body, Bytes};
use http_body::{Body as HttpBody, Frame, SizeHint};
use tokio::sync::oneshot;

/// Resolves once the paired [`AckBody`] is finished or dropped.
pub struct AckSignal(oneshot::Receiver<()>);

impl AckSignal {
    /// Wait for the acknowledgment to be handed off.
    pub async fn handed_off(self) {
        // A dropped sender means the body is gone, which counts as handed off.
        let _ = self.0.await;
    }
}

/// Wraps a response body and fires an [`AckSignal`] when it is done.
pub struct AckBody {
    inner: Body,
    ack: Option<oneshot::Sender<()>>,
}

impl AckBody {
    /// Wrap `inner`, returning the body and its paired signal.
    pub fn new(inner: Body) -> (Self, AckSignal) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                inner,
                ack: Some(tx),
            },
            AckSignal(rx),
        )
    }

    fn release(&mut self) {
        if let Some(tx) = self.ack.take() {
            let _ = tx.send(());
        }
    }
}

impl HttpBody for AckBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let poll = Pin::new(&mut self.inner).poll_frame(cx);
        if matches!(poll, Poll::Ready(None) | Poll::Ready(Some(Err(_)))) {
            self.release();
        }
        poll
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for AckBody {
    fn drop(&mut self) {
        self.release();
    }
}
