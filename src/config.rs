use std::time::Duration;

use crate::watchdog::DEFAULT_WATCHDOG_BUDGET;

/// Timing of the connect sequence and the watchdog.
///
/// The defaults are calibrated against the response latency of real Tau 2
/// cores behind a GrabberUSB.
#[derive(Debug, Clone)]
pub struct GrabberConfig {
    /// USB iSerial of the grabber to open, `None` for the first one found.
    pub device_serial: Option<String>,
    pub startup_delay: Duration,
    /// Pause after every transmitted command.
    pub command_settle: Duration,
    pub handshake_attempts: u32,
    pub handshake_interval: Duration,
    pub identify_attempts: u32,
    pub identify_interval: Duration,
    pub config_check_attempts: u32,
    pub config_check_interval: Duration,
    pub correction_pause: Duration,
    pub save_pause: Duration,
    pub save_settle: Duration,
    pub watchdog_interval: Duration,
    pub watchdog_budget: u32,
    pub reconnect_pause: Duration,
    /// Bytes requested from the transport per read.
    pub read_chunk: usize,
}

impl Default for GrabberConfig {
    fn default() -> Self {
        Self {
            device_serial: None,
            startup_delay: Duration::from_millis(100),
            command_settle: Duration::from_millis(150),
            handshake_attempts: 10,
            handshake_interval: Duration::from_millis(100),
            identify_attempts: 5,
            identify_interval: Duration::from_millis(100),
            config_check_attempts: 12,
            config_check_interval: Duration::from_millis(250),
            correction_pause: Duration::from_millis(300),
            save_pause: Duration::from_millis(2000),
            save_settle: Duration::from_millis(500),
            watchdog_interval: Duration::from_millis(500),
            watchdog_budget: DEFAULT_WATCHDOG_BUDGET,
            reconnect_pause: Duration::from_millis(1000),
            read_chunk: 510 * 256,
        }
    }
}

impl GrabberConfig {
    pub fn with_serial(serial: &str) -> Self {
        Self {
            device_serial: Some(serial.to_string()),
            ..Self::default()
        }
    }

    /// Upper bound of the connect sequence when every step exhausts its retries.
    pub fn worst_case_connect(&self) -> Duration {
        let handshake = self.handshake_interval * self.handshake_attempts;
        let identify =
            (self.identify_interval + self.command_settle * 3) * self.identify_attempts;
        let check =
            (self.config_check_interval + self.command_settle * 3) * self.config_check_attempts;
        let correct = (self.correction_pause + self.command_settle) * 3
            + self.save_pause
            + self.save_settle
            + self.command_settle;
        self.startup_delay
            + handshake
            + self.command_settle * self.handshake_attempts
            + identify
            + check
            + correct
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_device_timing() {
        let cfg = GrabberConfig::default();
        assert_eq!(cfg.handshake_attempts, 10);
        assert_eq!(cfg.handshake_interval, Duration::from_millis(100));
        assert_eq!(cfg.identify_attempts, 5);
        assert_eq!(cfg.config_check_attempts, 12);
        assert_eq!(cfg.config_check_interval, Duration::from_millis(250));
        assert_eq!(cfg.command_settle, Duration::from_millis(150));
        assert_eq!(cfg.watchdog_interval * cfg.watchdog_budget, Duration::from_secs(5));
        assert!(cfg.device_serial.is_none());
    }

    #[test]
    fn connect_latency_is_bounded() {
        let cfg = GrabberConfig::default();
        let bound = cfg.worst_case_connect();
        assert!(bound > Duration::from_secs(5));
        assert!(bound < Duration::from_secs(30));
    }

    #[test]
    fn serial_selection() {
        let cfg = GrabberConfig::with_serial("TG000123");
        assert_eq!(cfg.device_serial.as_deref(), Some("TG000123"));
        assert_eq!(cfg.watchdog_budget, 10);
    }
}
