/// Status byte (byte 1) of a Tau response frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TauStatus {
    Ok,
    NotReady,
    RangeError,
    ChecksumError,
    UndefinedProcessError,
    UndefinedFunctionError,
    TimeoutError,
    ByteCountError,
    FeatureNotEnabled,
    Unknown(u8),
}

impl TauStatus {
    pub fn is_ok(&self) -> bool {
        *self == TauStatus::Ok
    }

    /// Label used by the camera documentation, empty for codes outside the table.
    pub fn label(&self) -> &'static str {
        match self {
            TauStatus::Ok => "CAM_OK",
            TauStatus::NotReady => "CAM_NOT_READY",
            TauStatus::RangeError => "CAM_RANGE_ERROR",
            TauStatus::ChecksumError => "CAM_CHECKSUM_ERROR",
            TauStatus::UndefinedProcessError => "CAM_UNDEFINED_PROCESS_ERROR",
            TauStatus::UndefinedFunctionError => "CAM_UNDEFINED_FUNCTION_ERROR",
            TauStatus::TimeoutError => "CAM_TIMEOUT_ERROR",
            TauStatus::ByteCountError => "CAM_BYTE_COUNT_ERROR",
            TauStatus::FeatureNotEnabled => "CAM_FEATURE_NOT_ENABLED",
            TauStatus::Unknown(_) => "",
        }
    }
}

impl From<u8> for TauStatus {
    fn from(value: u8) -> Self {
        match value {
            0x00 => TauStatus::Ok,
            0x02 => TauStatus::NotReady,
            0x03 => TauStatus::RangeError,
            0x04 => TauStatus::ChecksumError,
            0x05 => TauStatus::UndefinedProcessError,
            0x06 => TauStatus::UndefinedFunctionError,
            0x07 => TauStatus::TimeoutError,
            0x09 => TauStatus::ByteCountError,
            0x0A => TauStatus::FeatureNotEnabled,
            other => TauStatus::Unknown(other),
        }
    }
}

impl From<TauStatus> for u8 {
    fn from(status: TauStatus) -> u8 {
        match status {
            TauStatus::Ok => 0x00,
            TauStatus::NotReady => 0x02,
            TauStatus::RangeError => 0x03,
            TauStatus::ChecksumError => 0x04,
            TauStatus::UndefinedProcessError => 0x05,
            TauStatus::UndefinedFunctionError => 0x06,
            TauStatus::TimeoutError => 0x07,
            TauStatus::ByteCountError => 0x09,
            TauStatus::FeatureNotEnabled => 0x0A,
            TauStatus::Unknown(code) => code,
        }
    }
}

impl core::fmt::Display for TauStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            TauStatus::Ok => write!(f, "Ok"),
            TauStatus::NotReady => write!(f, "Not Ready"),
            TauStatus::RangeError => write!(f, "Range Error"),
            TauStatus::ChecksumError => write!(f, "Checksum Error"),
            TauStatus::UndefinedProcessError => write!(f, "Undefined Process Error"),
            TauStatus::UndefinedFunctionError => write!(f, "Undefined Function Error"),
            TauStatus::TimeoutError => write!(f, "Timeout Error"),
            TauStatus::ByteCountError => write!(f, "Byte Count Error"),
            TauStatus::FeatureNotEnabled => write!(f, "Feature Not Enabled"),
            TauStatus::Unknown(code) => write!(f, "Unknown Status 0x{:02X}", code),
        }
    }
}

impl std::error::Error for TauStatus {}

#[cfg(test)]
mod tests {
    use super::TauStatus;

    #[test]
    fn table_codes_round_trip() {
        for code in [0x00u8, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x09, 0x0A] {
            let status = TauStatus::from(code);
            assert!(!matches!(status, TauStatus::Unknown(_)));
            assert_eq!(u8::from(status), code);
        }
    }

    #[test]
    fn unknown_codes_have_empty_label() {
        assert_eq!(TauStatus::from(0x01), TauStatus::Unknown(0x01));
        assert_eq!(TauStatus::from(0x08).label(), "");
        assert_eq!(TauStatus::from(0xFF).label(), "");
    }

    #[test]
    fn labels_follow_camera_documentation() {
        assert_eq!(TauStatus::from(0x0A).label(), "CAM_FEATURE_NOT_ENABLED");
        assert_eq!(TauStatus::from(0x09).label(), "CAM_BYTE_COUNT_ERROR");
        assert!(TauStatus::from(0).is_ok());
    }
}
