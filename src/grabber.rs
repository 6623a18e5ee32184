use core::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, TryLockError, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use log::{debug, error, info, trace, warn};

use crate::config::GrabberConfig;
use crate::decoder::{decode_frame, RawThermalFrame};
use crate::device::{ConnectionState, DeviceState, Resolution, Revision};
use crate::ftdi::{FtdiConfig, FtdiConnector};
use crate::stream::{uart_packet, StreamDemux, StreamDiagnostics, StreamSink};
use crate::tau_command::{GainMode, RequestKind, TLinearResolution, TauCommand, TriggerMode};
use crate::tau_frame::{build_frame, parse_frame, FrameParser, ParserDiagnostics};
use crate::transport::{ByteSink, ByteSource, Connector, Link, StdDelay};
use crate::watchdog::Watchdog;

#[derive(Debug)]
pub enum GrabberError {
    Usb(rusb::Error),
    NoDevice,
    NotConnected,
    PayloadTooLarge(usize),
    HandshakeTimeout,
    IdentifyTimeout,
    ConfigurationTimeout,
    ResponseTimeout,
    Cancelled,
    Transport(&'static str),
}

impl From<rusb::Error> for GrabberError {
    fn from(err: rusb::Error) -> Self {
        match err {
            rusb::Error::NoDevice | rusb::Error::NotFound => GrabberError::NoDevice,
            other => GrabberError::Usb(other),
        }
    }
}

impl fmt::Display for GrabberError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrabberError::Usb(e) => write!(f, "USB Error: {}", e),
            GrabberError::NoDevice => write!(f, "No ThermalCapture GrabberUSB found"),
            GrabberError::NotConnected => write!(f, "Not connected"),
            GrabberError::PayloadTooLarge(len) => {
                write!(f, "Command payload of {} bytes does not fit the UART channel", len)
            }
            GrabberError::HandshakeTimeout => {
                write!(f, "Timeout: Communication problem with ThermalCapture GrabberUSB")
            }
            GrabberError::IdentifyTimeout => {
                write!(f, "Timeout: Configuration could not be detected")
            }
            GrabberError::ConfigurationTimeout => {
                write!(f, "Timeout: Digital output configuration could not be read")
            }
            GrabberError::ResponseTimeout => write!(f, "Timeout: No response from Tau core"),
            GrabberError::Cancelled => write!(f, "Connect attempt cancelled"),
            GrabberError::Transport(msg) => write!(f, "Transport Error: {}", msg),
        }
    }
}

impl std::error::Error for GrabberError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GrabberError::Usb(e) => Some(e),
            _ => None,
        }
    }
}

/// Consumer of decoded frames, called on the I/O worker thread.
pub trait FrameHandler: Send {
    fn on_frame(&mut self, frame: &RawThermalFrame);
}

impl<F> FrameHandler for F
where
    F: FnMut(&RawThermalFrame) + Send,
{
    fn on_frame(&mut self, frame: &RawThermalFrame) {
        self(frame)
    }
}

/// Counters of the currently running I/O worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkDiagnostics {
    pub stream: StreamDiagnostics,
    pub parser: ParserDiagnostics,
    pub frames_decoded: u64,
    pub frames_dropped: u64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn millis(duration: Duration) -> u32 {
    duration.as_millis().min(u32::MAX as u128) as u32
}

struct Worker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

struct WatchdogThread {
    stop: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

struct Shared {
    config: GrabberConfig,
    connector: Box<dyn Connector>,
    delay: Mutex<Box<dyn DelayNs + Send>>,
    device: Mutex<DeviceState>,
    responses: Condvar,
    /// Outbound half of the link; holding it serializes command transmission.
    link: Mutex<Option<Box<dyn ByteSink>>>,
    worker: Mutex<Option<Worker>>,
    connect_lock: Mutex<()>,
    running: AtomicBool,
    watchdog: Watchdog,
    watchdog_thread: Mutex<Option<WatchdogThread>>,
    handler: Mutex<Box<dyn FrameHandler>>,
    last_serial: Mutex<Option<String>>,
    reconnects: AtomicU32,
    diagnostics: Mutex<LinkDiagnostics>,
}

/// Session with one ThermalCapture GrabberUSB and the Tau core behind it.
///
/// Frames are delivered to the handler on the I/O worker thread. A watchdog
/// thread reconnects when no frame was decoded for
/// `watchdog_interval * watchdog_budget`.
pub struct ThermalGrabber {
    shared: Arc<Shared>,
}

impl ThermalGrabber {
    pub fn new<C, H>(connector: C, config: GrabberConfig, handler: H) -> Self
    where
        C: Connector + 'static,
        H: FrameHandler + 'static,
    {
        Self::with_delay(connector, config, handler, StdDelay)
    }

    pub fn with_delay<C, H, D>(connector: C, config: GrabberConfig, handler: H, delay: D) -> Self
    where
        C: Connector + 'static,
        H: FrameHandler + 'static,
        D: DelayNs + Send + 'static,
    {
        let watchdog = Watchdog::new(config.watchdog_budget);
        ThermalGrabber {
            shared: Arc::new(Shared {
                config,
                connector: Box::new(connector),
                delay: Mutex::new(Box::new(delay)),
                device: Mutex::new(DeviceState::new()),
                responses: Condvar::new(),
                link: Mutex::new(None),
                worker: Mutex::new(None),
                connect_lock: Mutex::new(()),
                running: AtomicBool::new(false),
                watchdog,
                watchdog_thread: Mutex::new(None),
                handler: Mutex::new(Box::new(handler)),
                last_serial: Mutex::new(None),
                reconnects: AtomicU32::new(0),
                diagnostics: Mutex::new(LinkDiagnostics::default()),
            }),
        }
    }

    /// Session over the FTDI USB transport.
    pub fn ftdi<H>(config: GrabberConfig, usb: FtdiConfig, handler: H) -> Self
    where
        H: FrameHandler + 'static,
    {
        Self::new(FtdiConnector::new(usb), config, handler)
    }

    /// Opens the grabber and runs the handshake, identification and output
    /// configuration sequence.
    ///
    /// `serial` selects a grabber by USB iSerial and falls back to the
    /// configured serial, then to the first grabber found. The watchdog keeps
    /// retrying in the background if this fails.
    pub fn connect(&self, serial: Option<&str>) -> Result<(), GrabberError> {
        let serial = serial
            .map(str::to_string)
            .or_else(|| self.shared.config.device_serial.clone());
        *lock(&self.shared.last_serial) = serial.clone();

        self.shared.running.store(true, Ordering::Release);
        self.shared.watchdog.feed();
        self.shared.ensure_watchdog();
        self.shared.connect_session(serial.as_deref())
    }

    /// Stops the I/O worker and the watchdog.
    pub fn disconnect(&self) {
        self.shared.shutdown();
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.shared.link).is_some()
    }

    pub fn connection_state(&self) -> ConnectionState {
        lock(&self.shared.device).connection
    }

    /// Snapshot of everything learned about the core.
    pub fn device_state(&self) -> DeviceState {
        lock(&self.shared.device).clone()
    }

    pub fn resolution(&self) -> Option<Resolution> {
        lock(&self.shared.device).resolution
    }

    /// Sensor width, 0 until the part number has been read.
    pub fn width(&self) -> usize {
        self.resolution().map_or(0, |r| r.width)
    }

    pub fn height(&self) -> usize {
        self.resolution().map_or(0, |r| r.height)
    }

    pub fn camera_serial_number(&self) -> u32 {
        lock(&self.shared.device).camera_serial
    }

    pub fn sensor_serial_number(&self) -> u32 {
        lock(&self.shared.device).sensor_serial
    }

    pub fn camera_part_number(&self) -> String {
        lock(&self.shared.device).part_number.clone()
    }

    pub fn revision(&self) -> Revision {
        lock(&self.shared.device).revision
    }

    pub fn tlinear_enable_status(&self) -> u16 {
        lock(&self.shared.device).tlinear_status
    }

    pub fn tlinear_resolution(&self) -> Option<TLinearResolution> {
        lock(&self.shared.device).tlinear_resolution
    }

    /// Last FPA temperature reading in degrees Celsius.
    pub fn sensor_temperature(&self) -> Option<f32> {
        lock(&self.shared.device)
            .sensor_temperature
            .map(|raw| raw as f32 / 10.0)
    }

    pub fn reconnect_count(&self) -> u32 {
        self.shared.reconnects.load(Ordering::Acquire)
    }

    pub fn diagnostics(&self) -> LinkDiagnostics {
        *lock(&self.shared.diagnostics)
    }

    /// Sends a raw command frame; the response is handled asynchronously.
    pub fn send_command(&self, function: u8, payload: &[u8]) -> Result<(), GrabberError> {
        self.shared.transmit(function, payload, None)
    }

    pub fn send(&self, command: TauCommand) -> Result<(), GrabberError> {
        self.shared.send(command)
    }

    pub fn do_ffc(&self) -> Result<(), GrabberError> {
        self.send(TauCommand::do_ffc())
    }

    pub fn set_gain_mode(&self, mode: GainMode) -> Result<(), GrabberError> {
        self.send(TauCommand::gain_mode(mode))
    }

    pub fn set_trigger_mode(&self, mode: TriggerMode) -> Result<(), GrabberError> {
        self.send(TauCommand::trigger_mode(mode))
    }

    pub fn enable_tlinear(&self, resolution: TLinearResolution) -> Result<(), GrabberError> {
        self.send(TauCommand::enable_tlinear())?;
        self.send(TauCommand::tlinear_resolution(resolution))
    }

    pub fn enable_tlinear_high_resolution(&self) -> Result<(), GrabberError> {
        self.enable_tlinear(TLinearResolution::High)
    }

    pub fn enable_tlinear_low_resolution(&self) -> Result<(), GrabberError> {
        self.enable_tlinear(TLinearResolution::Low)
    }

    pub fn disable_tlinear(&self) -> Result<(), GrabberError> {
        self.send(TauCommand::disable_tlinear())
    }

    /// Queries the TLinear enable register and waits for the answer.
    pub fn query_tlinear_status(&self) -> Result<u16, GrabberError> {
        lock(&self.shared.device).tlinear.checked = false;
        self.send(TauCommand::get_tlinear_enabled())?;
        if self
            .shared
            .wait_for(self.shared.config.config_check_interval, |d| d.tlinear.checked)
        {
            Ok(self.tlinear_enable_status())
        } else {
            Err(GrabberError::ResponseTimeout)
        }
    }

    /// Queries the TLinear resolution and waits for the answer.
    pub fn query_tlinear_resolution(&self) -> Result<TLinearResolution, GrabberError> {
        lock(&self.shared.device).tlinear_resolution = None;
        self.send(TauCommand::get_tlinear_mode())?;
        let interval = self.shared.config.config_check_interval;
        if self.shared.wait_for(interval, |d| d.tlinear_resolution.is_some()) {
            self.tlinear_resolution().ok_or(GrabberError::ResponseTimeout)
        } else {
            Err(GrabberError::ResponseTimeout)
        }
    }

    pub fn enable_digital_output(&self) -> Result<(), GrabberError> {
        self.send(TauCommand::enable_digital_output())
    }

    pub fn disable_digital_output(&self) -> Result<(), GrabberError> {
        self.send(TauCommand::disable_digital_output())
    }

    pub fn enable_xp_mode_cmos_14bit(&self) -> Result<(), GrabberError> {
        self.send(TauCommand::xp_mode_cmos_14bit())
    }

    pub fn disable_xp_mode(&self) -> Result<(), GrabberError> {
        self.send(TauCommand::xp_mode_disabled())
    }

    pub fn set_cmos_bit_depth_14bit(&self) -> Result<(), GrabberError> {
        self.send(TauCommand::cmos_bit_depth_14bit())
    }

    pub fn read_sensor_temperature(&self) -> Result<(), GrabberError> {
        self.send(TauCommand::read_sensor_temperature())
    }

    pub fn camera_reset(&self) -> Result<(), GrabberError> {
        self.send(TauCommand::camera_reset())
    }

    /// Stores the current core settings as power-on defaults.
    pub fn save_settings_as_defaults(&self) -> Result<(), GrabberError> {
        self.send(TauCommand::set_defaults())
    }

    pub fn restore_factory_defaults(&self) -> Result<(), GrabberError> {
        self.send(TauCommand::restore_factory_defaults())
    }

    #[cfg(test)]
    fn watchdog_tick(&self) -> bool {
        self.shared.watchdog_tick()
    }
}

impl Drop for ThermalGrabber {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

impl Shared {
    fn pause(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        lock(&self.delay).delay_ms(millis(duration));
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn check_running(&self) -> Result<(), GrabberError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(GrabberError::Cancelled)
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let mut device = lock(&self.device);
        if device.connection != state {
            debug!("Connection state {:?} -> {:?}", device.connection, state);
            device.connection = state;
        }
    }

    /// Waits until `ready` holds for the device state, the timeout passes or
    /// the session is stopped.
    fn wait_for<F>(&self, timeout: Duration, mut ready: F) -> bool
    where
        F: FnMut(&DeviceState) -> bool,
    {
        let guard = lock(&self.device);
        let (guard, _) = self
            .responses
            .wait_timeout_while(guard, timeout, |d| !ready(d) && self.is_running())
            .unwrap_or_else(PoisonError::into_inner);
        ready(&guard)
    }

    fn send(&self, command: TauCommand) -> Result<(), GrabberError> {
        self.transmit(command.function().code(), command.args(), command.request())
    }

    fn transmit(
        &self,
        function: u8,
        payload: &[u8],
        request: Option<RequestKind>,
    ) -> Result<(), GrabberError> {
        let too_large = |_| GrabberError::PayloadTooLarge(payload.len());
        let frame = build_frame(function, payload).map_err(too_large)?;
        let packet = uart_packet(&frame).map_err(too_large)?;

        let mut link = lock(&self.link);
        let Some(sink) = link.as_mut() else {
            warn!("Send command 0x{:02X} failed: not connected", function);
            return Err(GrabberError::NotConnected);
        };

        if let Some(request) = request {
            lock(&self.device).pending = Some(request);
        }
        debug!("Sending command 0x{:02X} ({} payload bytes)", function, payload.len());
        sink.write_all(&packet)?;

        // Give the core time to process before the next command goes out.
        self.pause(self.config.command_settle);
        Ok(())
    }

    fn connect_session(self: &Arc<Self>, serial: Option<&str>) -> Result<(), GrabberError> {
        let _guard = lock(&self.connect_lock);
        self.check_running()?;
        self.stop_link();

        {
            let mut device = lock(&self.device);
            device.reset_session();
            device.connection = ConnectionState::Connecting;
        }
        *lock(&self.diagnostics) = LinkDiagnostics::default();

        self.pause(self.config.startup_delay);
        let result = self.open_link(serial).and_then(|_| self.negotiate());
        match &result {
            Ok(()) => {
                self.set_state(ConnectionState::Ready);
                let device = lock(&self.device);
                info!(
                    "ThermalCapture GrabberUSB ready: {} ({}x{}), camera serial {}",
                    device.part_number,
                    device.resolution.map_or(0, |r| r.width),
                    device.resolution.map_or(0, |r| r.height),
                    device.camera_serial
                );
            }
            Err(err) => {
                warn!("Connecting ThermalCapture GrabberUSB failed: {}", err);
                self.stop_link();
            }
        }
        self.watchdog.feed();
        result
    }

    fn open_link(self: &Arc<Self>, serial: Option<&str>) -> Result<(), GrabberError> {
        match serial {
            Some(serial) => info!("Trying to connect ThermalCapture GrabberUSB {}", serial),
            None => info!("Trying to connect first available ThermalCapture GrabberUSB"),
        }
        let Link { source, sink } = self.connector.open(serial)?;
        *lock(&self.link) = Some(sink);

        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = Arc::clone(&stop);
        let shared = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("thermalgrabber-io".into())
            .spawn(move || shared.run_worker(source, worker_stop))
            .map_err(|_| GrabberError::Transport("Failed to spawn I/O worker"))?;

        *lock(&self.worker) = Some(Worker { stop, handle });
        Ok(())
    }

    fn stop_link(&self) {
        let worker = lock(&self.worker).take();
        if let Some(worker) = worker {
            worker.stop.store(true, Ordering::Release);
            if worker.handle.thread().id() != thread::current().id()
                && worker.handle.join().is_err()
            {
                error!("I/O worker panicked");
            }
        }

        if lock(&self.link).take().is_some() {
            debug!("Grabber link closed");
        }

        let mut device = lock(&self.device);
        device.connection = ConnectionState::Disconnected;
        device.pending = None;
    }

    fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        // Waiters re-check `running` under the device lock.
        drop(lock(&self.device));
        self.responses.notify_all();
        {
            let _guard = lock(&self.connect_lock);
            self.stop_link();
        }

        let watchdog = lock(&self.watchdog_thread).take();
        if let Some(WatchdogThread { stop, handle }) = watchdog {
            drop(stop);
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                error!("Watchdog thread panicked");
            }
        }
    }

    fn negotiate(&self) -> Result<(), GrabberError> {
        self.set_state(ConnectionState::Handshaking);
        self.handshake()?;
        self.set_state(ConnectionState::Identifying);
        self.identify()?;
        self.set_state(ConnectionState::ConfiguringOutputs);
        self.configure_outputs()
    }

    fn handshake(&self) -> Result<(), GrabberError> {
        for attempt in 0..self.config.handshake_attempts {
            self.check_running()?;
            self.send(TauCommand::no_op())?;
            if self.wait_for(self.config.handshake_interval, |d| d.comm_ok) {
                debug!("Handshake after {} attempt(s)", attempt + 1);
                return Ok(());
            }
        }
        Err(GrabberError::HandshakeTimeout)
    }

    fn identify(&self) -> Result<(), GrabberError> {
        for _ in 0..self.config.identify_attempts {
            self.check_running()?;
            let (part, serials, revision) = {
                let device = lock(&self.device);
                (
                    device.needs_part_number(),
                    device.needs_serials(),
                    device.needs_revision(),
                )
            };

            if part {
                self.send(TauCommand::camera_part())?;
            }
            if serials {
                self.send(TauCommand::serial_number())?;
            }
            if revision {
                self.send(TauCommand::get_revision())?;
            }

            if self.wait_for(self.config.identify_interval, |d| d.resolution.is_some()) {
                return Ok(());
            }
        }
        Err(GrabberError::IdentifyTimeout)
    }

    fn configure_outputs(&self) -> Result<(), GrabberError> {
        for _ in 0..self.config.config_check_attempts {
            self.check_running()?;
            let Some(query) = next_output_query(&lock(&self.device)) else {
                break;
            };
            self.send(query)?;
            self.wait_for(self.config.config_check_interval, |d| {
                next_output_query(d) != Some(query)
            });
        }

        let (cmos, xp, digital) = {
            let device = lock(&self.device);
            if !device.outputs_checked() {
                return Err(GrabberError::ConfigurationTimeout);
            }
            (
                device.cmos_bit_depth_14bit.enabled,
                device.xp_mode_cmos_14bit.enabled,
                device.digital_output.enabled,
            )
        };

        let mut corrected = false;
        if !cmos {
            info!("Enabling CMOS 14 bit");
            self.send(TauCommand::cmos_bit_depth_14bit())?;
            self.pause(self.config.correction_pause);
            corrected = true;
        }
        if !xp {
            info!("Enabling XP mode CMOS 14 bit");
            self.send(TauCommand::xp_mode_cmos_14bit())?;
            self.pause(self.config.correction_pause);
            corrected = true;
        }
        if !digital {
            info!("Enabling digital output");
            self.send(TauCommand::enable_digital_output())?;
            self.pause(self.config.correction_pause);
            corrected = true;
        }

        // Only persist when something changed, the core flash has limited write cycles.
        if corrected {
            info!("Saving settings as power-on defaults");
            self.pause(self.config.save_pause);
            self.check_running()?;
            self.send(TauCommand::set_defaults())?;
            self.pause(self.config.save_settle);
        }
        Ok(())
    }

    fn ensure_watchdog(self: &Arc<Self>) {
        let mut slot = lock(&self.watchdog_thread);
        if slot.is_some() {
            return;
        }

        let (stop, stopped) = mpsc::channel();
        let shared = Arc::downgrade(self);
        let interval = self.config.watchdog_interval;
        match thread::Builder::new()
            .name("thermalgrabber-watchdog".into())
            .spawn(move || run_watchdog(shared, stopped, interval))
        {
            Ok(handle) => *slot = Some(WatchdogThread { stop, handle }),
            Err(err) => error!("Failed to spawn watchdog thread: {}", err),
        }
    }

    /// One watchdog period; returns `true` if a reconnect was triggered.
    fn watchdog_tick(self: &Arc<Self>) -> bool {
        if !self.is_running() {
            return false;
        }

        // A connect attempt in progress is bounded on its own.
        if let Err(TryLockError::WouldBlock) = self.connect_lock.try_lock() {
            self.watchdog.feed();
            return false;
        }

        if !self.watchdog.tick() {
            return false;
        }

        warn!("Stopping unresponsive ThermalCapture GrabberUSB");
        self.reconnects.fetch_add(1, Ordering::AcqRel);
        {
            let _guard = lock(&self.connect_lock);
            self.stop_link();
        }
        self.pause(self.config.reconnect_pause);

        if self.is_running() {
            let serial = lock(&self.last_serial).clone();
            if let Err(err) = self.connect_session(serial.as_deref()) {
                warn!("Reconnect failed: {}", err);
            }
        }
        self.watchdog.feed();
        true
    }

    fn run_worker(self: Arc<Self>, mut source: Box<dyn ByteSource>, stop: Arc<AtomicBool>) {
        debug!("I/O worker started");
        let mut demux = StreamDemux::new();
        let mut sink = SessionSink {
            shared: &self,
            parser: FrameParser::new(),
            decoded: 0,
            dropped: 0,
        };
        let mut buf = vec![0u8; self.config.read_chunk.max(1)];

        while !stop.load(Ordering::Acquire) {
            match source.read(&mut buf) {
                Ok(0) => {}
                Ok(n) => {
                    demux.feed(&buf[..n], &mut sink);
                    *lock(&self.diagnostics) = LinkDiagnostics {
                        stream: demux.diagnostics(),
                        parser: sink.parser.diagnostics(),
                        frames_decoded: sink.decoded,
                        frames_dropped: sink.dropped,
                    };
                }
                Err(err) => {
                    error!("Reading from ThermalCapture GrabberUSB failed: {}", err);
                    break;
                }
            }
        }
        debug!("I/O worker stopped after {} frames", sink.decoded);
    }

    fn dispatch(&self, raw: &[u8]) {
        match parse_frame(raw) {
            Ok(frame) => {
                trace!("Response 0x{:02X} ({} bytes)", frame.function, frame.payload.len());
                lock(&self.device).apply_response(&frame);
                self.responses.notify_all();
            }
            Err(err) => warn!("Dropping Tau response: {}", err),
        }
    }
}

fn next_output_query(device: &DeviceState) -> Option<TauCommand> {
    if !device.digital_output.checked {
        Some(TauCommand::get_digital_output_enabled())
    } else if !device.xp_mode_cmos_14bit.checked {
        Some(TauCommand::get_xp_mode())
    } else if !device.cmos_bit_depth_14bit.checked {
        Some(TauCommand::get_cmos_bit_depth())
    } else {
        None
    }
}

fn run_watchdog(shared: Weak<Shared>, stopped: mpsc::Receiver<()>, interval: Duration) {
    loop {
        match stopped.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            _ => break,
        }
        let Some(shared) = shared.upgrade() else {
            break;
        };
        shared.watchdog_tick();
    }
    debug!("Watchdog stopped");
}

/// Routes demultiplexed channels into the session.
struct SessionSink<'a> {
    shared: &'a Shared,
    parser: FrameParser,
    decoded: u64,
    dropped: u64,
}

impl StreamSink for SessionSink<'_> {
    fn video_payload(&mut self, words: &[u16]) {
        let Some(resolution) = lock(&self.shared.device).resolution else {
            trace!("Video payload before the core was identified");
            return;
        };

        match decode_frame(words, resolution.width, resolution.height) {
            Ok(frame) => {
                self.decoded += 1;
                self.shared.watchdog.feed();
                lock(&self.shared.handler).on_frame(&frame);
            }
            Err(err) => {
                self.dropped += 1;
                debug!("Dropping video payload of {} words: {}", words.len(), err);
            }
        }
    }

    fn uart_payload(&mut self, bytes: &[u8]) {
        let shared = self.shared;
        self.parser.feed(bytes, |raw| shared.dispatch(raw));
    }
}
