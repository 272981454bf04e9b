/*!
    Capability-configuration building for the platform access query.

    Each negotiation attempt offers exactly one configuration holding one
    capability entry per codec, in the caller's order. Key systems differ
    only in the extras they require (PlayReady pins `cenc` init data).
*/

use crate::config::DrmSystemOptions;
use crate::error::NegotiationError;
use crate::types::{CapabilityConfiguration, KeySystem, MediaCapability};

/// The only init-data type offered where a key system requires one.
pub const CENC_INIT_DATA_TYPE: &str = "cenc";

/**
    Build the configurations to offer the key-system-access query.

    Fails before any platform call for key systems that cannot be
    negotiated (FairPlay is reserved).
*/
pub fn supported_configurations(
    key_system: KeySystem,
    audio_codecs: &[String],
    video_codecs: &[String],
    options: &DrmSystemOptions,
) -> Result<Vec<CapabilityConfiguration>, NegotiationError> {
    match key_system {
        KeySystem::Widevine => Ok(vec![base_configuration(audio_codecs, video_codecs, options)]),
        KeySystem::PlayReady => {
            let mut configuration = base_configuration(audio_codecs, video_codecs, options);
            configuration.init_data_types = vec![CENC_INIT_DATA_TYPE.to_owned()];
            Ok(vec![configuration])
        }
        KeySystem::FairPlay => Err(NegotiationError::UnsupportedKeySystem(key_system)),
    }
}

fn base_configuration(
    audio_codecs: &[String],
    video_codecs: &[String],
    options: &DrmSystemOptions,
) -> CapabilityConfiguration {
    CapabilityConfiguration {
        init_data_types: Vec::new(),
        audio_capabilities: audio_codecs
            .iter()
            .map(|codec| MediaCapability {
                content_type: format!("audio/mp4; codecs=\"{codec}\""),
                robustness: options.audio_robustness.clone(),
            })
            .collect(),
        video_capabilities: video_codecs
            .iter()
            .map(|codec| MediaCapability {
                content_type: format!("video/mp4; codecs=\"{codec}\""),
                robustness: options.video_robustness.clone(),
            })
            .collect(),
    }
}
