//! Registry of outstanding requests, keyed by request id.
//!
//! Each entry holds the one-shot sender for its response. An entry leaves
//! the registry exactly once: by resolution or by discard on timeout. Any
//! later response for the same id finds nothing and is dropped.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::oneshot;

use ghostkey_core::RequestId;

use crate::error::{BridgeError, BridgeResult};
use crate::types::PageResponse;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PendingSnapshot {
    pub pending: usize,
    pub total_registered: u64,
    pub total_resolved: u64,
    pub total_discarded: u64,
    pub total_dropped_responses: u64,
}

#[derive(Default)]
struct Inner {
    waiting: HashMap<RequestId, oneshot::Sender<PageResponse>>,
    stats: PendingSnapshot,
}

#[derive(Default)]
pub struct PendingRequests {
    inner: Mutex<Inner>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> BridgeResult<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| BridgeError::Internal(format!("lock poisoned: {}", e)))
    }

    /// Start waiting for `request_id`. Fails on an id that is already pending.
    pub fn register(&self, request_id: RequestId) -> BridgeResult<oneshot::Receiver<PageResponse>> {
        let mut inner = self.lock()?;
        if inner.waiting.contains_key(&request_id) {
            return Err(BridgeError::DuplicateRequest);
        }
        let (tx, rx) = oneshot::channel();
        inner.waiting.insert(request_id, tx);
        inner.stats.total_registered += 1;
        Ok(rx)
    }

    /// Route a response to its waiter. Returns false, and drops the
    /// response, if nobody is waiting for that id any more.
    pub fn resolve(&self, response: PageResponse) -> bool {
        let Ok(mut inner) = self.lock() else {
            return false;
        };
        match inner.waiting.remove(&response.request_id) {
            Some(tx) => {
                let request_id = response.request_id.clone();
                if tx.send(response).is_ok() {
                    inner.stats.total_resolved += 1;
                    true
                } else {
                    tracing::debug!(request_id = %request_id, "requester gone; response dropped");
                    inner.stats.total_dropped_responses += 1;
                    false
                }
            }
            None => {
                tracing::debug!(
                    request_id = %response.request_id,
                    "no pending request; response dropped"
                );
                inner.stats.total_dropped_responses += 1;
                false
            }
        }
    }

    /// Forget a pending request. Returns true if it was still pending.
    pub fn discard(&self, request_id: &RequestId) -> bool {
        let Ok(mut inner) = self.lock() else {
            return false;
        };
        let removed = inner.waiting.remove(request_id).is_some();
        if removed {
            inner.stats.total_discarded += 1;
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().map(|i| i.waiting.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> PendingSnapshot {
        self.lock()
            .map(|i| PendingSnapshot {
                pending: i.waiting.len(),
                ..i.stats
            })
            .unwrap_or_default()
    }
}
