use crate::error::EmeError;

/**
    Events the controller raises toward the host application.
*/
#[derive(Debug, Clone)]
pub enum EmeEvent {
    /**
        A key-system error. `fatal` mirrors [`EmeError::fatal`]; the host
        decides abort-vs-continue.
    */
    KeySystemError { error: EmeError, fatal: bool },
    /**
        DRM teardown finished. Emitted exactly once per attached lifetime,
        even when intermediate cleanup steps failed.
    */
    DrmTeardownComplete,
}
