use log::{debug, info, warn};

use crate::tau_command::{Function, GainMode, RequestKind, TLinearResolution};
use crate::tau_frame::TauFrame;

const PART_NUMBER_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Handshaking,
    Identifying,
    ConfiguringOutputs,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: usize,
    pub height: usize,
}

impl Resolution {
    pub const fn new(width: usize, height: usize) -> Self {
        Resolution { width, height }
    }

    /// Derives the sensor geometry from the model code three characters
    /// after the `^` of a part number such as `46640013H-SPNLX^46640013H`.
    pub fn from_part_number(part_number: &str) -> Option<Self> {
        let bytes = part_number.as_bytes();
        let caret = bytes.iter().position(|&b| b == b'^')?;
        let code = bytes.get(caret + 3..)?;
        let digits: String = code
            .iter()
            .take(3)
            .take_while(|b| b.is_ascii_digit())
            .map(|&b| b as char)
            .collect();

        match digits.parse::<u32>().ok()? {
            640 => Some(Resolution::new(640, 512)),
            336 => Some(Resolution::new(336, 256)),
            324 | 320 => Some(Resolution::new(324, 256)),
            160 => Some(Resolution::new(160, 128)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Revision {
    pub software_major: u16,
    pub software_minor: u16,
    pub firmware_major: u16,
    pub firmware_minor: u16,
}

impl Revision {
    pub fn is_known(&self) -> bool {
        (self.software_major != 0 || self.software_minor != 0)
            && (self.firmware_major != 0 || self.firmware_minor != 0)
    }
}

/// A cached configuration register; `checked` separates "never queried"
/// from "queried and off".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigFlag {
    pub checked: bool,
    pub enabled: bool,
}

impl ConfigFlag {
    fn record(&mut self, enabled: bool) {
        self.checked = true;
        self.enabled = enabled;
    }
}

/// Everything learned about the attached core during a session.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    pub connection: ConnectionState,
    pub comm_ok: bool,
    pub resolution: Option<Resolution>,
    pub part_number: String,
    pub camera_serial: u32,
    pub sensor_serial: u32,
    pub revision: Revision,
    pub gain_mode: Option<GainMode>,
    pub digital_output: ConfigFlag,
    pub xp_mode_cmos_14bit: ConfigFlag,
    pub cmos_bit_depth_14bit: ConfigFlag,
    pub tlinear: ConfigFlag,
    pub tlinear_status: u16,
    pub tlinear_resolution: Option<TLinearResolution>,
    pub sensor_temperature: Option<i16>,
    pub pending: Option<RequestKind>,
}

impl Default for DeviceState {
    fn default() -> Self {
        DeviceState {
            connection: ConnectionState::Disconnected,
            comm_ok: false,
            resolution: None,
            part_number: String::new(),
            camera_serial: 0,
            sensor_serial: 0,
            revision: Revision::default(),
            gain_mode: None,
            digital_output: ConfigFlag::default(),
            xp_mode_cmos_14bit: ConfigFlag::default(),
            cmos_bit_depth_14bit: ConfigFlag::default(),
            tlinear: ConfigFlag::default(),
            tlinear_status: 0,
            tlinear_resolution: None,
            sensor_temperature: None,
            pending: None,
        }
    }
}

impl DeviceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets everything learned from the core, keeping the connection state.
    pub fn reset_session(&mut self) {
        let connection = self.connection;
        *self = DeviceState {
            connection,
            ..DeviceState::default()
        };
    }

    pub fn needs_part_number(&self) -> bool {
        self.resolution.is_none()
    }

    pub fn needs_serials(&self) -> bool {
        self.camera_serial == 0 || self.sensor_serial == 0
    }

    pub fn needs_revision(&self) -> bool {
        !self.revision.is_known()
    }

    pub fn is_identified(&self) -> bool {
        !self.needs_part_number() && !self.needs_serials() && !self.needs_revision()
    }

    pub fn outputs_checked(&self) -> bool {
        self.digital_output.checked
            && self.xp_mode_cmos_14bit.checked
            && self.cmos_bit_depth_14bit.checked
    }

    /// Updates the cached state from a validated response frame.
    pub fn apply_response(&mut self, frame: &TauFrame<'_>) {
        let payload = frame.payload;
        let Some(function) = Function::from_code(frame.function) else {
            debug!("Unhandled response for function 0x{:02X}", frame.function);
            return;
        };

        match function {
            Function::NoOp => {
                if !self.comm_ok {
                    info!("Tau core answered no-op");
                }
                self.comm_ok = true;
            }
            Function::SetDefaults => info!("Current settings stored as power-on defaults"),
            Function::CameraReset => info!("Camera reset acknowledged"),
            Function::RestoreFactoryDefaults => info!("Factory defaults restored"),
            Function::DoFfc => debug!("FFC acknowledged"),
            Function::ExternalSync => debug!("External sync mode acknowledged"),
            Function::SerialNumber => {
                if let (Some(camera), Some(sensor)) = (frame.payload_u32(0), frame.payload_u32(4)) {
                    self.camera_serial = camera;
                    self.sensor_serial = sensor;
                    info!("Camera serial {}, sensor serial {}", camera, sensor);
                } else {
                    warn!("Serial number response too short ({} bytes)", payload.len());
                }
            }
            Function::GetRevision => {
                let words = (
                    frame.payload_u16(0),
                    frame.payload_u16(2),
                    frame.payload_u16(4),
                    frame.payload_u16(6),
                );
                if let (Some(sw_major), Some(sw_minor), Some(fw_major), Some(fw_minor)) = words {
                    self.revision = Revision {
                        software_major: sw_major,
                        software_minor: sw_minor,
                        firmware_major: fw_major,
                        firmware_minor: fw_minor,
                    };
                    info!(
                        "Software {}.{}, firmware {}.{}",
                        sw_major, sw_minor, fw_major, fw_minor
                    );
                } else {
                    warn!("Revision response too short ({} bytes)", payload.len());
                }
            }
            Function::GainMode => {
                self.gain_mode = payload.get(1).copied().and_then(GainMode::from_register);
                debug!("Gain mode {:?}", self.gain_mode);
            }
            Function::DigitalOutputMode => self.apply_digital_output(payload),
            Function::ReadSensor => {
                self.sensor_temperature = frame.payload_u16(0).map(|raw| raw as i16);
                debug!("Sensor temperature raw {:?}", self.sensor_temperature);
            }
            Function::CameraPart => self.apply_part_number(payload),
            Function::TLinear => self.apply_tlinear(frame),
        }
    }

    fn apply_digital_output(&mut self, payload: &[u8]) {
        let (Some(&selector), Some(&value)) = (payload.first(), payload.get(1)) else {
            debug!("Digital output response without value");
            return;
        };

        match selector {
            // Plain value responses only make sense against the request that caused them.
            0x00 => match self.pending {
                Some(RequestKind::DigitalOutputEnabled) => {
                    match value {
                        0x00 => self.digital_output.record(true),
                        0x02 => self.digital_output.record(false),
                        other => {
                            self.digital_output.checked = true;
                            warn!("Unknown digital output status 0x{:02X}", other);
                        }
                    }
                    debug!("Digital output enabled: {}", self.digital_output.enabled);
                }
                Some(RequestKind::DigitalOutputXpMode) => {
                    self.xp_mode_cmos_14bit.record(value == 0x02);
                    debug!("XP mode 0x{:02X}", value);
                }
                Some(RequestKind::DigitalOutputCmosMode) => {
                    self.cmos_bit_depth_14bit.record(value == 0x00);
                    debug!("CMOS bit depth 0x{:02X}", value);
                }
                other => debug!("Digital output response for request {:?}", other),
            },
            0x03 => debug!("XP mode set to 0x{:02X}", value),
            0x06 => debug!("CMOS bit depth set to 0x{:02X}", value),
            other => debug!("Digital output response with selector 0x{:02X}", other),
        }
    }

    fn apply_part_number(&mut self, payload: &[u8]) {
        let raw = &payload[..payload.len().min(PART_NUMBER_LEN)];
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        self.part_number = String::from_utf8_lossy(&raw[..end]).into_owned();
        info!("Camera part number {}", self.part_number);

        if self.resolution.is_none() {
            self.resolution = Resolution::from_part_number(&self.part_number);
            match self.resolution {
                Some(res) => info!("Tau core resolution {}x{}", res.width, res.height),
                None => warn!("No resolution known for part {}", self.part_number),
            }
        }
    }

    fn apply_tlinear(&mut self, frame: &TauFrame<'_>) {
        match self.pending {
            Some(RequestKind::TLinearGetEnabled) => {
                if let Some(status) = frame.payload_u16(0) {
                    self.tlinear_status = status;
                    self.tlinear.record(status != 0);
                    info!("TLinear status {}", status);
                }
            }
            Some(RequestKind::TLinearGetMode) => {
                self.tlinear_resolution = match frame.payload.get(1) {
                    Some(0x00) => Some(TLinearResolution::Low),
                    Some(0x01) => Some(TLinearResolution::High),
                    _ => None,
                };
                info!("TLinear resolution {:?}", self.tlinear_resolution);
            }
            Some(RequestKind::TLinearSetEnabled) => debug!("TLinear enable set"),
            Some(RequestKind::TLinearSetMode) => debug!("TLinear mode set"),
            other => debug!("TLinear response for request {:?}", other),
        }
    }
}
