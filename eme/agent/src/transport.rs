/*!
    The license transport collaborator.

    The library never performs HTTP itself; the host injects whatever can do
    a binary POST and report a status code plus body. The setup hook mirrors
    the host-supplied request-customization point (auth headers, withCredentials
    and the like) and defaults to a no-op.
*/

use std::sync::Arc;

use async_trait::async_trait;

/**
    Outbound license POST.
*/
#[derive(Debug, Clone)]
pub struct LicenseRequest {
    pub url: String,
    /// Headers demanded by the key message, in source order.
    pub headers: Vec<(String, String)>,
    /// The challenge bytes.
    pub body: Vec<u8>,
}

/**
    Transport-level outcome of a license POST.
*/
#[derive(Debug, Clone)]
pub struct LicenseResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/**
    A transport-level failure (connection refused, timeout, ...). Counts
    against the same retry budget as a non-200 status.
*/
#[derive(Debug, Clone, thiserror::Error)]
#[error("license transport failed: {0}")]
pub struct TransportError(pub String);

#[async_trait]
pub trait LicenseTransport: Send + Sync {
    /**
        Perform a binary POST and report the status code and response body.
    */
    async fn post(&self, request: &LicenseRequest) -> Result<LicenseResponse, TransportError>;
}

/**
    Hook applied to every outbound license request before it is sent.
*/
pub type TransportSetupHook = Arc<dyn Fn(&mut LicenseRequest) + Send + Sync>;
