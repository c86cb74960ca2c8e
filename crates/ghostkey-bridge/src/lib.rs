//! Authentication bridge for ghost keys.
//!
//! An untrusted page asks for a challenge signature; the privileged side
//! checks the vault state, signs a payload bound to the page's true origin
//! with the active ghost key, and returns the signature and certificate.
//! Key material never crosses the bridge.

pub mod bridge;
pub mod error;
pub mod handler;
pub mod pending;
pub mod types;

pub use bridge::{
    serve, AuthBridge, BridgeConfig, BridgeLink, Requester, Responder,
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_TIMEOUT,
};
pub use error::{BridgeError, BridgeResult};
pub use handler::AuthHandler;
pub use pending::{PendingRequests, PendingSnapshot};
pub use types::{
    AuthPayload, AuthResponse, BridgeOutcome, ErrorBody, ForwardedRequest, PageRequest,
    PageResponse, RequestKind,
};
