/*!
    Asynchronous EME orchestration: the DRM session lifecycle state machine
    and license-acquisition protocol.

    The host injects the platform EME surface (`platform` traits) and a
    license transport (`transport`), then drives an [`EmeController`] actor
    through its [`EmeHandle`]: attach a media element, report stream
    metadata, and consume [`EmeEvent`]s. On platforms without native EME the
    host supplies a polyfill adapter exposing the same trait surface; the
    controller never branches on platform identity.

    Steady-state flow: metadata parsed → capability negotiation → key-system
    access → CDM → key session → (platform `encrypted` signal) → license
    challenge POST → session update → key-status monitoring. Teardown flows
    the other way and always completes with a
    [`EmeEvent::DrmTeardownComplete`].
*/

mod access;
mod controller;
mod error;
mod events;
mod license;
mod platform;
mod status;
mod transport;

pub use self::access::{CdmAccessRecord, negotiate_access};
pub use self::controller::{EmeController, EmeHandle, LifecycleState};
pub use self::error::{EmeError, EmeResult};
pub use self::events::EmeEvent;
pub use self::license::{LicenseExchanger, MAX_LICENSE_REQUEST_FAILURES};
pub use self::platform::{
    EncryptedEvent, EncryptedEventSender, KeySession, KeySystemAccess, KeySystemAccessProvider,
    MediaElementBinding, MediaKeys, PlatformError, SessionEvent, SessionEventSender,
};
pub use self::status::check_key_statuses;
pub use self::transport::{
    LicenseRequest, LicenseResponse, LicenseTransport, TransportError, TransportSetupHook,
};

// Re-export the synchronous domain types hosts need for wiring.
pub use eme_core::{
    CapabilityConfiguration, DrmConfig, DrmSystemOptions, KeySystem, KeyStatus, MediaCapability,
};
