//! Process-wide operating mode
//!
//! Single writer (operator), many readers (devices polling `GET /mode`).
//! Starts in `idle` on every coordinator start.

use crate::domain::Mode;
use crate::services::error::CoordinatorError;
use parking_lot::RwLock;
use tracing::info;

#[derive(Debug, Default)]
pub struct ModeAuthority {
    mode: RwLock<Mode>,
}

impl ModeAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Mode {
        *self.mode.read()
    }

    /// Validate and store a new mode. Returns the stored mode.
    ///
    /// Anything outside `idle`/`enroll`/`attendance` is rejected and the
    /// current value is left untouched.
    pub fn set(&self, raw: &str) -> Result<Mode, CoordinatorError> {
        let mode: Mode =
            raw.trim().parse().map_err(|e: crate::domain::types::InvalidMode| {
                CoordinatorError::validation(e.to_string())
            })?;

        let previous = std::mem::replace(&mut *self.mode.write(), mode);
        if previous != mode {
            info!(from = %previous, to = %mode, "mode_changed");
        }
        Ok(mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_idle() {
        assert_eq!(ModeAuthority::new().get(), Mode::Idle);
    }

    #[test]
    fn test_set_valid_mode() {
        let authority = ModeAuthority::new();
        assert_eq!(authority.set("attendance").unwrap(), Mode::Attendance);
        assert_eq!(authority.get(), Mode::Attendance);
        assert_eq!(authority.set(" enroll ").unwrap(), Mode::Enroll);
    }

    #[test]
    fn test_invalid_mode_leaves_state() {
        let authority = ModeAuthority::new();
        authority.set("enroll").unwrap();

        let err = authority.set("party").unwrap_err();
        assert!(matches!(err, CoordinatorError::Validation(_)));
        assert_eq!(authority.get(), Mode::Enroll);
    }
}
