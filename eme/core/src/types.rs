use core::fmt;
use core::str::FromStr;

use crate::error::ParseError;

/**
    DRM key-system identifier.

    Selects the license-server URL, the capability-configuration builder and
    the challenge-extraction strategy. At most one key system is active per
    playback session.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeySystem {
    Widevine,
    PlayReady,
    /// Reserved: recognized in configuration, not negotiable yet.
    FairPlay,
}

impl KeySystem {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "com.widevine.alpha" => Some(Self::Widevine),
            "com.microsoft.playready" => Some(Self::PlayReady),
            "com.apple.fps" => Some(Self::FairPlay),
            _ => None,
        }
    }

    /**
        The reverse-domain identifier used in the platform access query.
    */
    pub const fn to_name(self) -> &'static str {
        match self {
            Self::Widevine => "com.widevine.alpha",
            Self::PlayReady => "com.microsoft.playready",
            Self::FairPlay => "com.apple.fps",
        }
    }
}

impl fmt::Display for KeySystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_name())
    }
}

impl FromStr for KeySystem {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| ParseError {
            kind: "key system",
            value: s.to_owned(),
        })
    }
}

/**
    Key status as reported by the CDM per key id, EME `MediaKeyStatus` shaped.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyStatus {
    Usable,
    Expired,
    Released,
    OutputRestricted,
    OutputDownscaled,
    StatusPending,
    InternalError,
}

impl KeyStatus {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "usable" => Some(Self::Usable),
            "expired" => Some(Self::Expired),
            "released" => Some(Self::Released),
            "output-restricted" => Some(Self::OutputRestricted),
            "output-downscaled" => Some(Self::OutputDownscaled),
            "status-pending" => Some(Self::StatusPending),
            "internal-error" => Some(Self::InternalError),
            _ => None,
        }
    }

    pub const fn to_name(self) -> &'static str {
        match self {
            Self::Usable => "usable",
            Self::Expired => "expired",
            Self::Released => "released",
            Self::OutputRestricted => "output-restricted",
            Self::OutputDownscaled => "output-downscaled",
            Self::StatusPending => "status-pending",
            Self::InternalError => "internal-error",
        }
    }

    /**
        Whether this status means the license demanded output protection the
        playback path is not honoring.
    */
    pub const fn is_output_blocked(self) -> bool {
        matches!(self, Self::OutputRestricted | Self::OutputDownscaled)
    }
}

impl fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_name())
    }
}

impl FromStr for KeyStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| ParseError {
            kind: "key status",
            value: s.to_owned(),
        })
    }
}

/**
    One audio or video capability entry offered to the access query.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaCapability {
    /// Full MIME content type, e.g. `audio/mp4; codecs="mp4a.40.2"`.
    pub content_type: String,
    /// Requested robustness; empty string means "no requirement".
    pub robustness: String,
}

/**
    Capability-configuration descriptor offered to the platform's
    key-system-access query. Built once per negotiation attempt, never
    mutated afterwards.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityConfiguration {
    /// Init-data types, only populated for key systems that require them.
    pub init_data_types: Vec<String>,
    pub audio_capabilities: Vec<MediaCapability>,
    pub video_capabilities: Vec<MediaCapability>,
}
