//! Buzzer drivers

use crate::io::hardware::{Buzzer, HardwareError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Buzzer on an exported sysfs GPIO line (`.../gpioN/value`, direction `out`)
pub struct SysfsGpioBuzzer {
    value_path: PathBuf,
}

impl SysfsGpioBuzzer {
    pub fn new(value_path: impl AsRef<Path>) -> Self {
        let value_path = value_path.as_ref().to_path_buf();
        info!(path = %value_path.display(), "gpio_buzzer_configured");
        Self { value_path }
    }
}

impl Buzzer for SysfsGpioBuzzer {
    fn set(&mut self, on: bool) -> Result<(), HardwareError> {
        std::fs::write(&self.value_path, if on { "1" } else { "0" })?;
        Ok(())
    }
}

/// Buzzer that only logs, for hosts without the actuator
#[derive(Debug, Default)]
pub struct LogBuzzer {
    on: bool,
}

impl Buzzer for LogBuzzer {
    fn set(&mut self, on: bool) -> Result<(), HardwareError> {
        if on != self.on {
            debug!(on, "buzzer");
            self.on = on;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpio_buzzer_writes_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("value");
        let mut buzzer = SysfsGpioBuzzer::new(&path);

        buzzer.set(true).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1");
        buzzer.set(false).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "0");
    }
}
