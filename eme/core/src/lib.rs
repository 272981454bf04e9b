/*!
    Core EME (Encrypted Media Extensions) domain logic.

    Everything in this crate is synchronous and platform-free: key-system
    identifiers, capability-configuration building for the platform access
    query, license-challenge extraction from CDM key messages, and the DRM
    configuration surface. The asynchronous orchestration lives in
    `eme-agent`.
*/

mod capability;
mod challenge;
mod config;
mod error;
mod types;

pub use self::capability::{CENC_INIT_DATA_TYPE, supported_configurations};
pub use self::challenge::{LicenseChallenge, extract_challenge};
pub use self::config::{DrmConfig, DrmSystemOptions};
pub use self::error::{ChallengeError, NegotiationError, ParseError};
pub use self::types::{CapabilityConfiguration, KeySystem, KeyStatus, MediaCapability};
