/*!
    Key-system access negotiation: access query → CDM creation → optional
    output-protection policy gate.
*/

use eme_core::{DrmConfig, KeySystem, KeyStatus, supported_configurations};

use crate::error::{EmeError, EmeResult};
use crate::platform::{KeySession, KeySystemAccess, KeySystemAccessProvider, MediaKeys};

/**
    The single tracked CDM access. At most one record exists at a time; it
    is created when platform negotiation succeeds and destroyed on detach.
*/
pub struct CdmAccessRecord {
    pub key_system: KeySystem,
    /// The granted access handle. Retained for the record's lifetime.
    pub access: Box<dyn KeySystemAccess>,
    pub media_keys: Box<dyn MediaKeys>,
    /// Latches true when the session's one generate-request has been made.
    pub session_initialized: bool,
    /// The record's single key session, created once the CDM exists.
    pub session: Option<Box<dyn KeySession>>,
}

/**
    Drive the access-negotiation sequence for one key system.

    1. Build capability configurations (fails before any platform call for
       unsupported key systems).
    2. Ask the platform for key-system access; rejection is fatal and never
       retried.
    3. Create the CDM instance.
    4. If a minimum output-protection version is configured and the CDM
       supports policy queries, a non-usable status discards the CDM.
*/
pub async fn negotiate_access(
    provider: &dyn KeySystemAccessProvider,
    config: &DrmConfig,
    key_system: KeySystem,
    audio_codecs: &[String],
    video_codecs: &[String],
) -> EmeResult<CdmAccessRecord> {
    let configurations =
        supported_configurations(key_system, audio_codecs, video_codecs, &config.system_options)?;

    tracing::debug!(
        key_system = %key_system,
        configurations = configurations.len(),
        "requesting key-system access"
    );

    let access = provider
        .request_access(key_system, &configurations)
        .await
        .map_err(|e| EmeError::KeySystemNoAccess(e.to_string()))?;

    let media_keys = access
        .create_media_keys()
        .await
        .map_err(|e| EmeError::LicenseSystemError(format!("failed to create media keys: {e}")))?;

    if let Some(min_version) = config.min_output_protection_version.as_deref() {
        match media_keys.policy_status(min_version).await {
            Some(KeyStatus::Usable) => {
                tracing::debug!(min_version, "output-protection policy usable");
            }
            Some(status) => {
                // The CDM instance is discarded here; no session is created.
                return Err(EmeError::InvalidHdcpVersion(format!(
                    "hdcp {min_version} policy status '{status}'"
                )));
            }
            None => {
                tracing::debug!("platform has no policy-query support, proceeding");
            }
        }
    }

    tracing::info!(key_system = %key_system, "CDM ready");

    Ok(CdmAccessRecord {
        key_system,
        access,
        media_keys,
        session_initialized: false,
        session: None,
    })
}
