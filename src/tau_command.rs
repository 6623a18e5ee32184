use crate::tau_frame::encode_frame;

/// Function byte (byte 3) of a Tau command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Function {
    NoOp = 0x00,
    SetDefaults = 0x01,
    CameraReset = 0x02,
    RestoreFactoryDefaults = 0x03,
    SerialNumber = 0x04,
    GetRevision = 0x05,
    GainMode = 0x0A,
    DoFfc = 0x0C,
    DigitalOutputMode = 0x12,
    ReadSensor = 0x20,
    ExternalSync = 0x21,
    CameraPart = 0x66,
    TLinear = 0x8E,
}

impl Function {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        let function = match code {
            0x00 => Function::NoOp,
            0x01 => Function::SetDefaults,
            0x02 => Function::CameraReset,
            0x03 => Function::RestoreFactoryDefaults,
            0x04 => Function::SerialNumber,
            0x05 => Function::GetRevision,
            0x0A => Function::GainMode,
            0x0C => Function::DoFfc,
            0x12 => Function::DigitalOutputMode,
            0x20 => Function::ReadSensor,
            0x21 => Function::ExternalSync,
            0x66 => Function::CameraPart,
            0x8E => Function::TLinear,
            _ => return None,
        };
        Some(function)
    }
}

/// Kind of the request a response to a sub-addressed function belongs to.
///
/// Responses to `0x12` and `0x8E` do not echo the sub-address, so the last
/// issued request decides how the payload is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    DigitalOutputEnabled,
    DigitalOutputXpMode,
    DigitalOutputCmosMode,
    TLinearSetEnabled,
    TLinearGetEnabled,
    TLinearSetMode,
    TLinearGetMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainMode {
    Automatic,
    LowGain,
    HighGain,
    Manual,
}

impl GainMode {
    pub fn from_register(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(GainMode::Automatic),
            0x01 => Some(GainMode::LowGain),
            0x02 => Some(GainMode::HighGain),
            0x03 => Some(GainMode::Manual),
            _ => None,
        }
    }
}

/// External sync (trigger) role of the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    Disabled,
    Slave,
    Master,
}

/// Output resolution of the radiometric TLinear mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TLinearResolution {
    /// 0.04 K per count.
    High,
    /// 0.4 K per count.
    Low,
}

impl TLinearResolution {
    pub fn kelvin_per_count(&self) -> f32 {
        match self {
            TLinearResolution::High => 0.04,
            TLinearResolution::Low => 0.4,
        }
    }

    /// Converts a TLinear pixel count to Kelvin.
    pub fn to_kelvin(&self, count: u16) -> f32 {
        count as f32 * self.kelvin_per_count()
    }
}

/// A canned command: function byte, fixed argument bytes and the request kind
/// its response has to be read as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TauCommand {
    function: Function,
    args: &'static [u8],
    request: Option<RequestKind>,
}

macro_rules! tau_command_fn {
    ($fn_name:ident, $function:expr, [$($arg:expr),*]) => {
        pub fn $fn_name() -> TauCommand {
            TauCommand::new($function, &[$($arg),*], None)
        }
    };
    ($fn_name:ident, $function:expr, [$($arg:expr),*], $request:expr) => {
        pub fn $fn_name() -> TauCommand {
            TauCommand::new($function, &[$($arg),*], Some($request))
        }
    };
}

impl TauCommand {
    fn new(function: Function, args: &'static [u8], request: Option<RequestKind>) -> Self {
        TauCommand {
            function,
            args,
            request,
        }
    }

    pub fn function(&self) -> Function {
        self.function
    }

    pub fn args(&self) -> &'static [u8] {
        self.args
    }

    pub fn request(&self) -> Option<RequestKind> {
        self.request
    }

    /// Complete wire frame for this command.
    pub fn encode(&self) -> Vec<u8> {
        encode_frame(self.function.code(), self.args)
    }

    tau_command_fn!(no_op, Function::NoOp, []);
    tau_command_fn!(set_defaults, Function::SetDefaults, []);
    tau_command_fn!(camera_reset, Function::CameraReset, []);
    tau_command_fn!(restore_factory_defaults, Function::RestoreFactoryDefaults, []);
    tau_command_fn!(serial_number, Function::SerialNumber, []);
    tau_command_fn!(get_revision, Function::GetRevision, []);
    tau_command_fn!(camera_part, Function::CameraPart, []);
    tau_command_fn!(do_ffc, Function::DoFfc, []);
    tau_command_fn!(read_sensor_temperature, Function::ReadSensor, [0x00, 0x00]);

    tau_command_fn!(gain_mode_automatic, Function::GainMode, [0x00, 0x00]);
    tau_command_fn!(gain_mode_low, Function::GainMode, [0x00, 0x01]);
    tau_command_fn!(gain_mode_high, Function::GainMode, [0x00, 0x02]);
    tau_command_fn!(gain_mode_manual, Function::GainMode, [0x00, 0x03]);

    tau_command_fn!(trigger_disabled, Function::ExternalSync, [0x00, 0x00]);
    tau_command_fn!(trigger_slave, Function::ExternalSync, [0x00, 0x01]);
    tau_command_fn!(trigger_master, Function::ExternalSync, [0x00, 0x02]);

    tau_command_fn!(
        enable_tlinear,
        Function::TLinear,
        [0x00, 0x40, 0x00, 0x01],
        RequestKind::TLinearSetEnabled
    );
    tau_command_fn!(
        disable_tlinear,
        Function::TLinear,
        [0x00, 0x40, 0x00, 0x00],
        RequestKind::TLinearSetEnabled
    );
    tau_command_fn!(
        tlinear_high_resolution,
        Function::TLinear,
        [0x00, 0x10, 0x00, 0x01],
        RequestKind::TLinearSetMode
    );
    tau_command_fn!(
        tlinear_low_resolution,
        Function::TLinear,
        [0x00, 0x10, 0x00, 0x00],
        RequestKind::TLinearSetMode
    );
    tau_command_fn!(
        get_tlinear_enabled,
        Function::TLinear,
        [0x00, 0x40],
        RequestKind::TLinearGetEnabled
    );
    tau_command_fn!(
        get_tlinear_mode,
        Function::TLinear,
        [0x00, 0x10],
        RequestKind::TLinearGetMode
    );

    // Common enable/disable for the LVDS and XP channels.
    tau_command_fn!(
        enable_digital_output,
        Function::DigitalOutputMode,
        [0x00, 0x00],
        RequestKind::DigitalOutputEnabled
    );
    tau_command_fn!(
        disable_digital_output,
        Function::DigitalOutputMode,
        [0x00, 0x02],
        RequestKind::DigitalOutputEnabled
    );
    tau_command_fn!(
        get_digital_output_enabled,
        Function::DigitalOutputMode,
        [],
        RequestKind::DigitalOutputEnabled
    );

    // XP mode, sub-address 0x03 (set) / 0x02 (get).
    tau_command_fn!(xp_mode_cmos_14bit, Function::DigitalOutputMode, [0x03, 0x02]);
    tau_command_fn!(xp_mode_disabled, Function::DigitalOutputMode, [0x03, 0x00]);
    tau_command_fn!(
        get_xp_mode,
        Function::DigitalOutputMode,
        [0x02, 0x00],
        RequestKind::DigitalOutputXpMode
    );

    // CMOS bit depth, sub-address 0x06 (set) / 0x08 (get).
    tau_command_fn!(cmos_bit_depth_14bit, Function::DigitalOutputMode, [0x06, 0x00]);
    tau_command_fn!(
        get_cmos_bit_depth,
        Function::DigitalOutputMode,
        [0x08, 0x00],
        RequestKind::DigitalOutputCmosMode
    );

    pub fn gain_mode(mode: GainMode) -> TauCommand {
        match mode {
            GainMode::Automatic => Self::gain_mode_automatic(),
            GainMode::LowGain => Self::gain_mode_low(),
            GainMode::HighGain => Self::gain_mode_high(),
            GainMode::Manual => Self::gain_mode_manual(),
        }
    }

    pub fn trigger_mode(mode: TriggerMode) -> TauCommand {
        match mode {
            TriggerMode::Disabled => Self::trigger_disabled(),
            TriggerMode::Slave => Self::trigger_slave(),
            TriggerMode::Master => Self::trigger_master(),
        }
    }

    pub fn tlinear_resolution(resolution: TLinearResolution) -> TauCommand {
        match resolution {
            TLinearResolution::High => Self::tlinear_high_resolution(),
            TLinearResolution::Low => Self::tlinear_low_resolution(),
        }
    }
}
