/*!
    License-challenge extraction from CDM key messages.

    Widevine key messages already are the challenge and pass through
    untouched. PlayReady key messages are UTF-16 LE XML carrying a
    base64-encoded `<Challenge>` plus optional `<name>`/`<value>` HTTP
    header pairs that must accompany the license POST.
*/

use data_encoding::BASE64;
use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::ChallengeError;
use crate::types::KeySystem;

/**
    Outbound license-request payload extracted from a key message.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseChallenge {
    /// Raw bytes to POST to the license server.
    pub payload: Vec<u8>,
    /// HTTP headers demanded by the key message, in source order.
    pub headers: Vec<(String, String)>,
}

/**
    Extract the license challenge from `key_message` using the strategy of
    the given key system.
*/
pub fn extract_challenge(
    key_system: KeySystem,
    key_message: &[u8],
) -> Result<LicenseChallenge, ChallengeError> {
    match key_system {
        KeySystem::Widevine => Ok(LicenseChallenge {
            payload: key_message.to_vec(),
            headers: Vec::new(),
        }),
        KeySystem::PlayReady => extract_playready_challenge(key_message),
        KeySystem::FairPlay => Err(ChallengeError::NoStrategy(key_system)),
    }
}

/**
    Decode a UTF-16 LE byte buffer, tolerating a leading BOM.
*/
fn decode_utf16_le(bytes: &[u8]) -> Result<String, ChallengeError> {
    if bytes.len() % 2 != 0 {
        return Err(ChallengeError::InvalidUtf16(format!(
            "odd byte length {}",
            bytes.len()
        )));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    let units = match units.first() {
        Some(&0xFEFF) => &units[1..],
        _ => &units[..],
    };
    String::from_utf16(units).map_err(|e| ChallengeError::InvalidUtf16(e.to_string()))
}

/**
    Parse a PlayReady key message: UTF-16 LE XML with a base64 `<Challenge>`
    and zero or more `<name>`/`<value>` header pairs.
*/
fn extract_playready_challenge(key_message: &[u8]) -> Result<LicenseChallenge, ChallengeError> {
    let xml = decode_utf16_le(key_message)?;
    let mut reader = Reader::from_str(&xml);

    enum Capture {
        Challenge,
        HeaderName,
        HeaderValue,
    }

    let mut challenge_b64: Option<String> = None;
    let mut names: Vec<String> = Vec::new();
    let mut values: Vec<String> = Vec::new();
    // Which element's text we are currently inside, if any.
    let mut capture: Option<Capture> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name();
                capture = match local_name(name.as_ref()) {
                    b"Challenge" => Some(Capture::Challenge),
                    b"name" => Some(Capture::HeaderName),
                    b"value" => Some(Capture::HeaderValue),
                    _ => None,
                };
            }
            Ok(Event::End(_)) => capture = None,
            Ok(Event::Text(e)) => {
                if let Some(kind) = &capture {
                    let text = e
                        .unescape()
                        .map_err(|e| ChallengeError::InvalidXml(e.to_string()))?;
                    let text = text.trim();
                    if text.is_empty() {
                        continue;
                    }
                    match kind {
                        Capture::Challenge => {
                            challenge_b64
                                .get_or_insert_with(String::new)
                                .push_str(text);
                        }
                        Capture::HeaderName => names.push(text.to_owned()),
                        Capture::HeaderValue => values.push(text.to_owned()),
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ChallengeError::InvalidXml(e.to_string())),
            _ => {}
        }
    }

    if names.len() != values.len() {
        return Err(ChallengeError::HeaderPairMismatch {
            names: names.len(),
            values: values.len(),
        });
    }

    let challenge_b64 = challenge_b64.ok_or(ChallengeError::MissingChallenge)?;
    let payload = BASE64
        .decode(challenge_b64.as_bytes())
        .map_err(|e| ChallengeError::InvalidBase64(e.to_string()))?;

    tracing::debug!(
        payload_bytes = payload.len(),
        headers = names.len(),
        "playready challenge extracted"
    );

    Ok(LicenseChallenge {
        payload,
        headers: names.into_iter().zip(values).collect(),
    })
}

/**
    Extract the local name from a possibly namespace-prefixed tag.
*/
fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().position(|&b| b == b':') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}
