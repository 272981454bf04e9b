use thiserror::Error;

use crate::types::KeySystem;

/**
    Error returned by `FromStr` implementations on enum types.
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseError {
    pub kind: &'static str,
    pub value: String,
}

/**
    Errors from capability negotiation.

    Raised before any platform call is made; an unsupported key system is a
    configuration defect, never silently worked around.
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationError {
    #[error("key system {0} cannot be negotiated")]
    UnsupportedKeySystem(KeySystem),
}

/**
    Errors from license-challenge extraction out of a CDM key message.
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChallengeError {
    // ── UTF-16 framing (PlayReady key messages) ───────────────────────
    #[error("key message is not valid UTF-16: {0}")]
    InvalidUtf16(String),

    // ── XML ───────────────────────────────────────────────────────────
    #[error("invalid key message XML: {0}")]
    InvalidXml(String),
    #[error("key message contains no Challenge element")]
    MissingChallenge,
    #[error("invalid base64 in Challenge: {0}")]
    InvalidBase64(String),
    #[error("header name/value count mismatch: {names} names, {values} values")]
    HeaderPairMismatch { names: usize, values: usize },

    // ── strategy selection ────────────────────────────────────────────
    #[error("no challenge strategy for key system {0}")]
    NoStrategy(KeySystem),
}
