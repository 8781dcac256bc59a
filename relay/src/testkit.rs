//! Transport doubles for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::forward::{OutboundRequest, Transport, TransportError, TransportResponse};

/// Records every request and answers with a canned result.
pub struct RecordingTransport {
    calls: Mutex<Vec<OutboundRequest>>,
    reply: Result<TransportResponse, String>,
    notify: Notify,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Self::with_response(200, "ok")
    }

    pub fn with_response(status: u16, preview: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            reply: Ok(TransportResponse {
                status,
                preview: preview.to_string(),
            }),
            notify: Notify::new(),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            reply: Err(message.to_string()),
            notify: Notify::new(),
        })
    }

    pub fn calls(&self) -> Vec<OutboundRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Wait until at least one call has been recorded.
    pub async fn wait_for_call(&self) {
        loop {
            let notified = self.notify.notified();
            if self.call_count() > 0 {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn post(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError> {
        self.calls.lock().unwrap().push(request);
        self.notify.notify_waiters();
        self.reply.clone().map_err(TransportError::Request)
    }
}

/// Never answers. Tracks how many calls are still pending.
pub struct HangingTransport {
    started: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
}

struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl HangingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            started: AtomicUsize::new(0),
            in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for HangingTransport {
    async fn post(&self, _request: OutboundRequest) -> Result<TransportResponse, TransportError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlightGuard(Arc::clone(&self.in_flight));
        std::future::pending().await
    }
}
