//! Async request/response plumbing between untrusted requesters and the
//! privileged handler.
//!
//! Requesters submit through [`Requester`], which stamps the origin it was
//! created with. The privileged side drains a [`BridgeLink`] and delivers
//! responses back by request id. Every request waits at most
//! `BridgeConfig::timeout`; after that it is terminal and any late response
//! is dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use ghostkey_core::RequestId;

use crate::error::{BridgeError, BridgeResult};
use crate::handler::AuthHandler;
use crate::pending::{PendingRequests, PendingSnapshot};
use crate::types::{BridgeOutcome, ForwardedRequest, PageRequest, PageResponse};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeConfig {
    pub timeout: Duration,
    pub channel_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Requester-facing half. Cheap to clone.
#[derive(Clone)]
pub struct AuthBridge {
    pending: Arc<PendingRequests>,
    outbound: mpsc::Sender<ForwardedRequest>,
    timeout: Duration,
}

/// Privileged-side half: the stream of forwarded requests.
pub struct BridgeLink {
    inbound: mpsc::Receiver<ForwardedRequest>,
}

impl BridgeLink {
    pub async fn recv(&mut self) -> Option<ForwardedRequest> {
        self.inbound.recv().await
    }
}

impl AuthBridge {
    pub fn new(config: BridgeConfig) -> (Self, BridgeLink) {
        let (outbound, inbound) = mpsc::channel(config.channel_capacity.max(1));
        (
            Self {
                pending: Arc::new(PendingRequests::new()),
                outbound,
                timeout: config.timeout,
            },
            BridgeLink { inbound },
        )
    }

    /// A requester whose requests carry `origin`. Only the trusted transport
    /// that knows the real origin should construct one.
    pub fn requester(&self, origin: impl Into<String>) -> Requester {
        Requester {
            bridge: self.clone(),
            origin: origin.into(),
        }
    }

    /// Forward `request` and wait for its response or the timeout.
    ///
    /// The deadline covers queueing towards the privileged side as well as
    /// the wait for the answer. The pending entry is released on every exit,
    /// including when the caller drops this future.
    pub async fn submit(&self, origin: &str, request: PageRequest) -> BridgeResult<BridgeOutcome> {
        let request_id = request.request_id.clone();
        let rx = self.pending.register(request_id.clone())?;
        let _registration = Registration {
            pending: &self.pending,
            request_id: &request_id,
        };

        let forwarded = ForwardedRequest {
            origin: origin.to_string(),
            request,
        };
        let exchange = async {
            self.outbound
                .send(forwarded)
                .await
                .map_err(|_| BridgeError::ChannelClosed)?;
            rx.await.map_err(|_| BridgeError::ChannelClosed)
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(Ok(response)) => Ok(BridgeOutcome::Response(response)),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                tracing::warn!(request_id = %request_id, "bridge request timed out");
                Ok(BridgeOutcome::Timeout)
            }
        }
    }

    /// Hand a response back to its requester. Returns false if the request
    /// already resolved or timed out; the response is then discarded.
    pub fn deliver(&self, response: PageResponse) -> bool {
        self.pending.resolve(response)
    }

    /// Delivery-only handle for the privileged side.
    pub fn responder(&self) -> Responder {
        Responder {
            pending: self.pending.clone(),
        }
    }

    pub fn snapshot(&self) -> PendingSnapshot {
        self.pending.snapshot()
    }
}

/// Discards its pending entry when dropped. A no-op once resolved.
struct Registration<'a> {
    pending: &'a PendingRequests,
    request_id: &'a RequestId,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.pending.discard(self.request_id);
    }
}

/// Can answer requests but not create them. Holding one does not keep the
/// link open.
#[derive(Clone)]
pub struct Responder {
    pending: Arc<PendingRequests>,
}

impl Responder {
    pub fn deliver(&self, response: PageResponse) -> bool {
        self.pending.resolve(response)
    }
}

#[derive(Clone)]
pub struct Requester {
    bridge: AuthBridge,
    origin: String,
}

impl Requester {
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub async fn submit(&self, request: PageRequest) -> BridgeResult<BridgeOutcome> {
        self.bridge.submit(&self.origin, request).await
    }

    pub async fn authenticate(&self, challenge: &str, purpose: &str) -> BridgeResult<BridgeOutcome> {
        self.submit(PageRequest::authenticate(challenge, purpose)).await
    }

    pub async fn authenticate_contract(
        &self,
        contract_address: &str,
        challenge: &str,
        purpose: &str,
    ) -> BridgeResult<BridgeOutcome> {
        self.submit(PageRequest::authenticate_contract(
            contract_address,
            challenge,
            purpose,
        ))
        .await
    }
}

/// Privileged host loop: answer every forwarded request until all
/// `AuthBridge` handle is gone.
pub async fn serve(handler: Arc<AuthHandler>, mut link: BridgeLink, responder: Responder) {
    while let Some(forwarded) = link.recv().await {
        let handler = handler.clone();
        let responder = responder.clone();
        tokio::spawn(async move {
            let request_id: RequestId = forwarded.request.request_id.clone();
            let response = handler.handle(&forwarded);
            if !responder.deliver(response) {
                tracing::debug!(request_id = %request_id, "late response discarded");
            }
        });
    }
    tracing::debug!("bridge link closed");
}
