use eme_core::KeyStatus;

use crate::error::{EmeError, EmeResult};

/**
    Scan a session's key-status collection after a status-change signal.

    Any `output-restricted` or `output-downscaled` entry is fatal: the
    license demanded output protection the playback path is not honoring.
    Every other status requires no action here.
*/
pub fn check_key_statuses(statuses: &[(Vec<u8>, KeyStatus)]) -> EmeResult<()> {
    for (key_id, status) in statuses {
        if status.is_output_blocked() {
            tracing::error!(key_id = ?key_id, status = %status, "disallowed key status");
            return Err(EmeError::LicenseInvalidStatus(*status));
        }
        tracing::debug!(key_id = ?key_id, status = %status, "key status");
    }
    Ok(())
}
