use crate::types::KeySystem;

/**
    Per-key-system robustness overrides for capability negotiation.

    Empty strings (the default) offer capabilities without a robustness
    requirement.
*/
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrmSystemOptions {
    pub audio_robustness: String,
    pub video_robustness: String,
}

/**
    DRM configuration consumed by the EME subsystem.

    Only the data surface lives here; the injected collaborators (access
    query function, license transport, transport setup hook) are wired into
    the controller directly.
*/
#[derive(Debug, Clone, Default)]
pub struct DrmConfig {
    pub widevine_license_url: Option<String>,
    pub playready_license_url: Option<String>,
    /// Minimum required HDCP version, e.g. "1.4". None skips the policy check.
    pub min_output_protection_version: Option<String>,
    pub system_options: DrmSystemOptions,
}

impl DrmConfig {
    /**
        Key system selected by license-URL configuration priority:
        PlayReady first, then Widevine. None when no license URL is
        configured at all.
    */
    pub fn preferred_key_system(&self) -> Option<KeySystem> {
        if self.playready_license_url.is_some() {
            Some(KeySystem::PlayReady)
        } else if self.widevine_license_url.is_some() {
            Some(KeySystem::Widevine)
        } else {
            None
        }
    }

    /**
        License-server URL for the given key system, if configured.
    */
    pub fn license_url(&self, key_system: KeySystem) -> Option<&str> {
        match key_system {
            KeySystem::Widevine => self.widevine_license_url.as_deref(),
            KeySystem::PlayReady => self.playready_license_url.as_deref(),
            KeySystem::FairPlay => None,
        }
    }
}
