use thiserror::Error;

use eme_core::{ChallengeError, KeyStatus, NegotiationError};

/**
    The KEY_SYSTEM_ERROR taxonomy. Every failure of the subsystem surfaces
    through one outbound channel as one of these, tagged with a fatal flag.

    Only [`EmeError::GenerateRequestFailed`] is non-fatal: playback may
    continue without that session's keys. Everything else means the host
    must decide abort-vs-continue.
*/
#[derive(Debug, Clone, Error)]
pub enum EmeError {
    // ── negotiation ───────────────────────────────────────────────────
    #[error("unsupported key system: {0}")]
    UnsupportedKeySystem(String),
    #[error("key-system access rejected by platform: {0}")]
    KeySystemNoAccess(String),
    #[error("output protection below required level: {0}")]
    InvalidHdcpVersion(String),

    // ── encrypted signal in an inconsistent environment ───────────────
    #[error("media reported encrypted before any key-system negotiation")]
    NoKeys,
    #[error("no CDM access available for encrypted media")]
    NoAccess,
    #[error("no key session available for encrypted media")]
    NoSession,
    #[error("encrypted signal carried no initialization data")]
    NoInitData,

    // ── license exchange ──────────────────────────────────────────────
    #[error("disallowed key status '{0}'")]
    LicenseInvalidStatus(KeyStatus),
    #[error("license request failed after {attempts} attempts")]
    LicenseRequestFailed { attempts: u32 },
    #[error("license update rejected by CDM: {0}")]
    LicenseUpdateFailed(String),

    // ── configuration / environment ───────────────────────────────────
    #[error("license system error: {0}")]
    LicenseSystemError(String),

    // ── non-fatal ─────────────────────────────────────────────────────
    #[error("key-session generate-request failed: {0}")]
    GenerateRequestFailed(String),
}

impl EmeError {
    /**
        Whether the host should treat this error as fatal for playback.
    */
    pub const fn fatal(&self) -> bool {
        !matches!(self, Self::GenerateRequestFailed(_))
    }
}

impl From<NegotiationError> for EmeError {
    fn from(e: NegotiationError) -> Self {
        match e {
            NegotiationError::UnsupportedKeySystem(ks) => {
                Self::UnsupportedKeySystem(ks.to_string())
            }
        }
    }
}

impl From<ChallengeError> for EmeError {
    fn from(e: ChallengeError) -> Self {
        Self::LicenseSystemError(e.to_string())
    }
}

/**
    Type alias for results that may return an [`EmeError`].
*/
pub type EmeResult<T> = std::result::Result<T, EmeError>;
