/*!
    The injected platform EME surface.

    These traits are the standardized EME shape (`requestMediaKeySystemAccess`
    → `MediaKeySystemAccess` → `MediaKeys` → `MediaKeySession`). Hosts on
    platforms with only a legacy prefixed API supply a polyfill adapter
    exposing this exact surface; nothing downstream detects the platform.

    Platform-raised signals (`message`, `keystatuseschange`, `encrypted`)
    are delivered through channels handed over at session creation and media
    attach, keeping the controller a single select loop instead of a web of
    callbacks.
*/

use async_trait::async_trait;
use tokio::sync::mpsc;

use eme_core::{CapabilityConfiguration, KeySystem, KeyStatus};

/**
    Failure reported by a platform collaborator.
*/
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct PlatformError(pub String);

/**
    Events a key session raises after creation.
*/
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The CDM produced a key message to send to the license server.
    Message(Vec<u8>),
    /// The session's key-status collection changed.
    KeyStatusesChange,
}

pub type SessionEventSender = mpsc::UnboundedSender<SessionEvent>;

/**
    Payload of the media element's `encrypted` signal.
*/
#[derive(Debug, Clone)]
pub struct EncryptedEvent {
    pub init_data_type: String,
    /// None models init data the platform withheld (e.g. cross-origin media).
    pub init_data: Option<Vec<u8>>,
}

pub type EncryptedEventSender = mpsc::UnboundedSender<EncryptedEvent>;

/**
    The platform's asynchronous key-system-access query.

    Supplying this is mandatory for DRM playback; its absence is a fatal
    configuration error, not a silent skip.
*/
#[async_trait]
pub trait KeySystemAccessProvider: Send + Sync {
    async fn request_access(
        &self,
        key_system: KeySystem,
        configurations: &[CapabilityConfiguration],
    ) -> Result<Box<dyn KeySystemAccess>, PlatformError>;
}

/**
    A granted key-system access from which one CDM instance can be created.
*/
#[async_trait]
pub trait KeySystemAccess: Send {
    async fn create_media_keys(&self) -> Result<Box<dyn MediaKeys>, PlatformError>;
}

/**
    A CDM instance: creates key sessions and answers output-protection
    policy queries.
*/
#[async_trait]
pub trait MediaKeys: Send + Sync {
    /**
        Status the CDM reports for a minimum required HDCP version, or None
        when the platform has no policy-query support.
    */
    async fn policy_status(&self, min_hdcp_version: &str) -> Option<KeyStatus>;

    /**
        Create a key session. Session events flow through `events`.
    */
    async fn create_session(
        &self,
        events: SessionEventSender,
    ) -> Result<Box<dyn KeySession>, PlatformError>;
}

/**
    A platform key session.
*/
#[async_trait]
pub trait KeySession: Send {
    async fn generate_request(
        &mut self,
        init_data_type: &str,
        init_data: &[u8],
    ) -> Result<(), PlatformError>;

    async fn update(&mut self, license: &[u8]) -> Result<(), PlatformError>;

    async fn close(&mut self) -> Result<(), PlatformError>;

    /**
        Snapshot of the session's key-status collection, keyed by key id.
    */
    fn key_statuses(&self) -> Vec<(Vec<u8>, KeyStatus)>;
}

/**
    Binding to the host's media element.
*/
#[async_trait]
pub trait MediaElementBinding: Send {
    /// Install the `encrypted` signal listener.
    fn attach_encrypted_signal(&mut self, events: EncryptedEventSender);

    /// Remove the `encrypted` signal listener.
    fn detach_encrypted_signal(&mut self);

    /**
        Attach media keys to the element, or clear them with None.
    */
    async fn set_media_keys(&mut self, keys: Option<&dyn MediaKeys>)
    -> Result<(), PlatformError>;
}
