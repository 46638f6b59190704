//! Wall clocks for scan timestamps
//!
//! The Linux RTC class exposes `date` (`YYYY-MM-DD`) and `time` (`HH:MM:SS`)
//! under `/sys/class/rtc/rtcN/`. The module is set to local wall time on
//! these devices, so the values are used as-is.

use crate::domain::Timestamp;
use crate::io::hardware::{HardwareClock, HardwareError};
use std::path::{Path, PathBuf};

pub struct SysfsRtc {
    dir: PathBuf,
}

impl SysfsRtc {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    fn read_attr(&self, name: &str) -> Result<String, HardwareError> {
        let raw = std::fs::read_to_string(self.dir.join(name))?;
        Ok(raw.trim().to_string())
    }
}

impl HardwareClock for SysfsRtc {
    fn now(&mut self) -> Result<Timestamp, HardwareError> {
        let date = self.read_attr("date")?;
        let time = self.read_attr("time")?;
        Timestamp::parse(&format!("{} {}", date, time))
            .map_err(|e| HardwareError::Frame(format!("rtc value {:?} {:?}: {}", date, time, e)))
    }
}

/// Host clock
#[derive(Debug, Default)]
pub struct SystemClock;

impl HardwareClock for SystemClock {
    fn now(&mut self) -> Result<Timestamp, HardwareError> {
        Ok(Timestamp::now_local())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sysfs_rtc_reads_date_and_time() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("date"), "2024-01-01\n").unwrap();
        std::fs::write(dir.path().join("time"), "09:00:30\n").unwrap();

        let mut rtc = SysfsRtc::new(dir.path());
        assert_eq!(rtc.now().unwrap().to_string(), "2024-01-01 09:00:30");
    }

    #[test]
    fn test_sysfs_rtc_missing_device() {
        let dir = tempfile::tempdir().unwrap();
        let mut rtc = SysfsRtc::new(dir.path().join("rtc9"));
        assert!(matches!(rtc.now(), Err(HardwareError::Io(_))));
    }

    #[test]
    fn test_sysfs_rtc_garbage() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("date"), "not-a-date").unwrap();
        std::fs::write(dir.path().join("time"), "09:00:30").unwrap();
        assert!(matches!(SysfsRtc::new(dir.path()).now(), Err(HardwareError::Frame(_))));
    }
}
