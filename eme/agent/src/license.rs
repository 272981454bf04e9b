/*!
    The license exchange: challenge out, license back, bounded retry.
*/

use std::sync::Arc;

use eme_core::{DrmConfig, KeySystem, extract_challenge};

use crate::error::{EmeError, EmeResult};
use crate::transport::{LicenseRequest, LicenseTransport, TransportSetupHook};

/**
    Extra attempts after the first failure; 4 sends total. Exceeding this is
    terminal for the challenge.
*/
pub const MAX_LICENSE_REQUEST_FAILURES: u32 = 3;

/**
    Builds license requests from CDM key messages and drives them through
    the injected transport.
*/
pub struct LicenseExchanger {
    config: DrmConfig,
    transport: Arc<dyn LicenseTransport>,
    setup_hook: Option<TransportSetupHook>,
}

impl LicenseExchanger {
    pub fn new(
        config: DrmConfig,
        transport: Arc<dyn LicenseTransport>,
        setup_hook: Option<TransportSetupHook>,
    ) -> Self {
        Self {
            config,
            transport,
            setup_hook,
        }
    }

    /**
        Exchange `key_message` for license bytes.

        Resolves the license URL by key system, extracts the challenge with
        the key-system strategy, POSTs it, and retries the identical request
        on any non-200 status or transport failure. Retry is same-URL,
        same-challenge and deliberately has no backoff: the surrounding
        license-server behavior under rapid retry is unspecified upstream
        and is preserved as-is.
    */
    pub async fn request_license(
        &self,
        key_system: KeySystem,
        key_message: &[u8],
    ) -> EmeResult<Vec<u8>> {
        let url = self.config.license_url(key_system).ok_or_else(|| {
            EmeError::LicenseSystemError(format!("no license url configured for {key_system}"))
        })?;

        let challenge = extract_challenge(key_system, key_message)?;
        let mut request = LicenseRequest {
            url: url.to_owned(),
            headers: challenge.headers,
            body: challenge.payload,
        };
        if let Some(hook) = &self.setup_hook {
            hook(&mut request);
        }

        let mut failures = 0u32;
        loop {
            match self.transport.post(&request).await {
                Ok(response) if response.status == 200 => {
                    tracing::debug!(
                        key_system = %key_system,
                        bytes = response.body.len(),
                        "license received"
                    );
                    return Ok(response.body);
                }
                Ok(response) => {
                    failures += 1;
                    tracing::warn!(
                        status = response.status,
                        failures,
                        "license request rejected"
                    );
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!(error = %e, failures, "license transport failed");
                }
            }
            if failures > MAX_LICENSE_REQUEST_FAILURES {
                return Err(EmeError::LicenseRequestFailed { attempts: failures });
            }
        }
    }
}
