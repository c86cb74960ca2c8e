use serde::{Deserialize, Serialize};

use ghostkey_core::{RequestId, Timestamp};

use crate::error::{BridgeError, BridgeResult};

// ---------------------------------------------------------------------------
// Requester -> privileged side
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestKind {
    Authenticate,
    AuthenticateContract,
}

/// A request as emitted by the untrusted page. It carries no origin; the
/// transport attaches one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(rename = "type")]
    pub kind: RequestKind,
    pub request_id: RequestId,
    pub challenge: String,
    pub purpose: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
}

impl PageRequest {
    pub fn authenticate(challenge: impl Into<String>, purpose: impl Into<String>) -> Self {
        Self {
            kind: RequestKind::Authenticate,
            request_id: RequestId::generate(),
            challenge: challenge.into(),
            purpose: purpose.into(),
            contract_address: None,
        }
    }

    pub fn authenticate_contract(
        contract_address: impl Into<String>,
        challenge: impl Into<String>,
        purpose: impl Into<String>,
    ) -> Self {
        Self {
            kind: RequestKind::AuthenticateContract,
            contract_address: Some(contract_address.into()),
            ..Self::authenticate(challenge, purpose)
        }
    }

    pub fn validate(&self) -> BridgeResult<()> {
        if self.request_id.as_str().is_empty() {
            return Err(BridgeError::InvalidRequest("missing request_id".into()));
        }
        if self.challenge.is_empty() {
            return Err(BridgeError::InvalidRequest("missing challenge".into()));
        }
        match (self.kind, self.contract_address.as_deref()) {
            (RequestKind::AuthenticateContract, None | Some("")) => Err(
                BridgeError::InvalidRequest("authenticateContract requires contract_address".into()),
            ),
            _ => Ok(()),
        }
    }
}

/// A page request after the trusted transport attached the true origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardedRequest {
    pub origin: String,
    #[serde(flatten)]
    pub request: PageRequest,
}

// ---------------------------------------------------------------------------
// Privileged side -> requester
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    /// Armored `SIGNED_MESSAGE_V1` over the canonical [`AuthPayload`].
    pub signed_payload: String,
    /// Armored `GHOSTKEY_CERTIFICATE_V1` of the signing key.
    pub certificate: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl From<&BridgeError> for ErrorBody {
    fn from(e: &BridgeError) -> Self {
        Self {
            code: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResponse {
    pub request_id: RequestId,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<AuthResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl PageResponse {
    pub fn ok(request_id: RequestId, data: AuthResponse) -> Self {
        Self {
            request_id,
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(request_id: RequestId, error: &BridgeError) -> Self {
        Self {
            request_id,
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// What a requester gets back for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeOutcome {
    Response(PageResponse),
    Timeout,
}

impl BridgeOutcome {
    /// Flatten into the wire response; a timeout becomes a `TIMEOUT` error.
    pub fn into_response(self, request_id: RequestId) -> PageResponse {
        match self {
            BridgeOutcome::Response(r) => r,
            BridgeOutcome::Timeout => PageResponse::err(request_id, &BridgeError::Timeout),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, BridgeOutcome::Timeout)
    }
}

// ---------------------------------------------------------------------------
// AuthPayload: the bytes a ghost key signs for a challenge
// ---------------------------------------------------------------------------

/// Fields are declared in lexicographic key order so the JSON encoding is
/// canonical. `timestamp` is set by the privileged side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthPayload {
    pub challenge: String,
    #[serde(
        rename = "contractAddress",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub contract_address: Option<String>,
    pub origin: String,
    pub purpose: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    #[serde(rename = "type")]
    pub kind: String,
}

impl AuthPayload {
    pub fn new(origin: &str, request: &PageRequest, now: Timestamp) -> Self {
        Self {
            challenge: request.challenge.clone(),
            contract_address: request.contract_address.clone(),
            origin: origin.to_string(),
            purpose: request.purpose.clone(),
            timestamp: now.as_millis(),
            kind: "auth".to_string(),
        }
    }

    pub fn to_canonical_bytes(&self) -> BridgeResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| BridgeError::Internal(e.to_string()))
    }
}
