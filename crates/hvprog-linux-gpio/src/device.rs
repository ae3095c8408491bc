//! Linux GPIO bitbanging pin backends
//!
//! This module provides `LinuxGpioParallel` and `LinuxGpioSerial`, which
//! implement the pin-level traits of hvprog-core using Linux's GPIO
//! character device interface (gpiocdev). The protocol drivers in
//! `hvprog_core::protocol` run on top of them.
//!
//! Target VCC and the 12V /RESET switch share one line: the external RC
//! network delays /RESET behind VCC, so a single `vcc` line powers the
//! target into programming mode.

use std::collections::HashSet;
use std::time::Duration;

use crate::error::{LinuxGpioError, Result};

use gpiocdev::line::{Offset, Value};
use gpiocdev::request::{Config, Request};

use hvprog_core::programmer::{ControlLines, ParallelPins, SerialPins};

/// Consumer label shown in `gpioinfo`
const CONSUMER: &str = "hvprog";

/// Default strobe width in nanoseconds
const DEFAULT_PULSE_NS: u64 = 1000;

/// Default SCI half-period in nanoseconds (~500 kHz, datasheet minimum period is 220ns)
const DEFAULT_HALF_PERIOD_NS: u64 = 1000;

fn level(high: bool) -> Value {
    if high {
        Value::Active
    } else {
        Value::Inactive
    }
}

fn sleep_ns(ns: u64) {
    if ns > 0 {
        std::thread::sleep(Duration::from_nanos(ns));
    }
}

fn request_lines(device: &str, config: Config) -> Result<Request> {
    Request::from_config(config)
        .on_chip(device)
        .with_consumer(CONSUMER)
        .request()
        .map_err(|source| LinuxGpioError::LineRequestFailed {
            path: device.to_string(),
            source,
        })
}

fn check_unique(offsets: &[Offset]) -> Result<()> {
    let mut seen = HashSet::new();
    for &offset in offsets {
        if !seen.insert(offset) {
            return Err(LinuxGpioError::DuplicateLine(offset));
        }
    }
    Ok(())
}

/// Line offsets for the parallel wiring
///
/// Defaults follow the reference programmer board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParallelPinConfig {
    /// Data bus lines, bit 0 first
    pub data: [Offset; 8],
    /// RDY/BSY input (low means busy)
    pub rdy: Offset,
    /// Output enable
    pub oe: Offset,
    /// Write pulse
    pub wr: Offset,
    /// Byte select 1
    pub bs1: Offset,
    /// Byte select 2
    pub bs2: Offset,
    /// Action select 0
    pub xa0: Offset,
    /// Action select 1
    pub xa1: Offset,
    /// Page data latch
    pub pagel: Offset,
    /// Latch clock
    pub xtal1: Offset,
    /// Target VCC (and /RESET through the level shifter)
    pub vcc: Offset,
    /// Strobe high/low time in nanoseconds
    pub pulse_ns: u64,
}

impl Default for ParallelPinConfig {
    fn default() -> Self {
        Self {
            data: [6, 7, 8, 9, 10, 11, 12, 13],
            rdy: 14,
            oe: 15,
            wr: 16,
            bs1: 17,
            xtal1: 18,
            xa0: 19,
            xa1: 2,
            pagel: 3,
            bs2: 4,
            vcc: 5,
            pulse_ns: DEFAULT_PULSE_NS,
        }
    }
}

impl ParallelPinConfig {
    fn control_offset(&self, line: ControlLines) -> Option<Offset> {
        [
            (ControlLines::OE, self.oe),
            (ControlLines::WR, self.wr),
            (ControlLines::BS1, self.bs1),
            (ControlLines::BS2, self.bs2),
            (ControlLines::XA0, self.xa0),
            (ControlLines::XA1, self.xa1),
            (ControlLines::PAGEL, self.pagel),
            (ControlLines::XTAL1, self.xtal1),
        ]
        .into_iter()
        .find(|&(flag, _)| flag == line)
        .map(|(_, offset)| offset)
    }

    fn outputs(&self) -> [Offset; 9] {
        [
            self.oe, self.wr, self.bs1, self.bs2, self.xa0, self.xa1, self.pagel, self.xtal1,
            self.vcc,
        ]
    }

    fn all_offsets(&self) -> Vec<Offset> {
        let mut offsets = self.outputs().to_vec();
        offsets.extend_from_slice(&self.data);
        offsets.push(self.rdy);
        offsets
    }
}

/// Line offsets for the serial wiring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPinConfig {
    /// Target VCC (and /RESET through the level shifter)
    pub vcc: Offset,
    /// Serial data input
    pub sdi: Offset,
    /// Serial instruction input
    pub sii: Offset,
    /// Serial data output (also Prog_enable during power-up)
    pub sdo: Offset,
    /// Serial clock input
    pub sci: Offset,
    /// SCI half-period in nanoseconds
    pub half_period_ns: u64,
}

impl Default for SerialPinConfig {
    fn default() -> Self {
        Self {
            vcc: 3,
            sdi: 4,
            sii: 5,
            sdo: 6,
            sci: 7,
            half_period_ns: DEFAULT_HALF_PERIOD_NS,
        }
    }
}

impl SerialPinConfig {
    /// Set the SCI frequency in Hz (approximate, via half-period calculation)
    pub fn with_speed_hz(mut self, hz: u32) -> Self {
        if hz > 0 {
            self.half_period_ns = 500_000_000 / hz as u64;
        }
        self
    }
}

/// Pin wiring for the selected protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinConfig {
    /// High-voltage parallel wiring
    Parallel(ParallelPinConfig),
    /// High-voltage serial wiring
    Serial(SerialPinConfig),
}

/// Configuration for opening a Linux GPIO programmer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinuxGpioConfig {
    /// Device path (e.g., "/dev/gpiochip0")
    pub device: String,
    /// Protocol and line assignment
    pub pins: PinConfig,
}

/// Parallel programming pins on a Linux GPIO chip
pub struct LinuxGpioParallel {
    request: Request,
    pins: ParallelPinConfig,
    data_output: bool,
}

impl LinuxGpioParallel {
    /// Request the lines and leave the target unpowered with every line low
    pub fn open(device: &str, pins: &ParallelPinConfig) -> Result<Self> {
        check_unique(&pins.all_offsets())?;
        log::debug!("linux_gpio: Opening {} for parallel programming", device);

        let mut config = Config::default();
        for offset in pins.outputs() {
            config.with_line(offset).as_output(Value::Inactive);
        }
        config.with_lines(&pins.data).as_input();
        config.with_line(pins.rdy).as_input();

        let request = request_lines(device, config)?;
        log::info!(
            "linux_gpio: Opened {} (parallel, data={:?}, rdy={}, vcc={})",
            device,
            pins.data,
            pins.rdy,
            pins.vcc
        );

        Ok(Self {
            request,
            pins: pins.clone(),
            data_output: false,
        })
    }

    fn set(&self, offset: Offset, high: bool, name: &str) {
        if let Err(e) = self.request.set_value(offset, level(high)) {
            log::error!("Failed to set {}: {}", name, e);
        }
    }

    fn set_data_direction(&mut self, output: bool) {
        if self.data_output == output {
            return;
        }
        let mut config = Config::default();
        if output {
            config.with_lines(&self.pins.data).as_output(Value::Inactive);
        } else {
            config.with_lines(&self.pins.data).as_input();
        }
        if let Err(e) = self.request.reconfigure(&config) {
            log::error!("Failed to reconfigure data bus: {}", e);
        }
        self.data_output = output;
    }
}

impl ParallelPins for LinuxGpioParallel {
    fn set_power(&mut self, on: bool) {
        self.set(self.pins.vcc, on, "VCC");
    }

    fn set_lines(&mut self, lines: ControlLines, high: bool) {
        for line in lines.iter() {
            if let Some(offset) = self.pins.control_offset(line) {
                self.set(offset, high, "control line");
            }
        }
    }

    fn write_data(&mut self, byte: u8) {
        self.set_data_direction(true);
        for (bit, &offset) in self.pins.data.iter().enumerate() {
            self.set(offset, byte & (1 << bit) != 0, "data line");
        }
    }

    fn release_data(&mut self) {
        self.set_data_direction(false);
    }

    fn read_data(&mut self) -> u8 {
        let mut byte = 0u8;
        for (bit, &offset) in self.pins.data.iter().enumerate() {
            match self.request.value(offset) {
                Ok(Value::Active) => byte |= 1 << bit,
                Ok(Value::Inactive) => {}
                Err(e) => log::error!("Failed to read data line {}: {}", bit, e),
            }
        }
        byte
    }

    fn is_ready(&mut self) -> bool {
        match self.request.value(self.pins.rdy) {
            Ok(value) => value == Value::Active,
            Err(e) => {
                log::error!("Failed to read RDY: {}", e);
                false
            }
        }
    }

    fn delay_us(&mut self, us: u32) {
        std::thread::sleep(Duration::from_micros(us as u64));
    }

    fn pulse_delay(&mut self) {
        sleep_ns(self.pins.pulse_ns);
    }
}

impl Drop for LinuxGpioParallel {
    fn drop(&mut self) {
        self.set_lines(ControlLines::all(), false);
        self.release_data();
        self.set_power(false);
    }
}

/// Serial programming pins on a Linux GPIO chip
pub struct LinuxGpioSerial {
    request: Request,
    pins: SerialPinConfig,
}

impl LinuxGpioSerial {
    /// Request the lines and leave the target unpowered with every line low
    pub fn open(device: &str, pins: &SerialPinConfig) -> Result<Self> {
        check_unique(&[pins.vcc, pins.sdi, pins.sii, pins.sdo, pins.sci])?;
        log::debug!("linux_gpio: Opening {} for serial programming", device);

        let mut config = Config::default();
        config
            .with_lines(&[pins.vcc, pins.sdi, pins.sii, pins.sci])
            .as_output(Value::Inactive);
        config.with_line(pins.sdo).as_input();

        let request = request_lines(device, config)?;
        log::info!(
            "linux_gpio: Opened {} (serial, vcc={}, sdi={}, sii={}, sdo={}, sci={})",
            device,
            pins.vcc,
            pins.sdi,
            pins.sii,
            pins.sdo,
            pins.sci
        );

        Ok(Self {
            request,
            pins: pins.clone(),
        })
    }

    fn set(&self, offset: Offset, high: bool, name: &str) {
        if let Err(e) = self.request.set_value(offset, level(high)) {
            log::error!("Failed to set {}: {}", name, e);
        }
    }
}

impl SerialPins for LinuxGpioSerial {
    fn set_power(&mut self, on: bool) {
        self.set(self.pins.vcc, on, "VCC");
    }

    fn set_sdi(&mut self, high: bool) {
        self.set(self.pins.sdi, high, "SDI");
    }

    fn set_sii(&mut self, high: bool) {
        self.set(self.pins.sii, high, "SII");
    }

    fn set_sci(&mut self, high: bool) {
        self.set(self.pins.sci, high, "SCI");
    }

    fn get_sdo(&mut self) -> bool {
        match self.request.value(self.pins.sdo) {
            Ok(value) => value == Value::Active,
            Err(e) => {
                log::error!("Failed to get SDO: {}", e);
                false
            }
        }
    }

    fn drive_sdo(&mut self, state: Option<bool>) {
        let mut config = Config::default();
        match state {
            Some(high) => config.with_line(self.pins.sdo).as_output(level(high)),
            None => config.with_line(self.pins.sdo).as_input(),
        };
        if let Err(e) = self.request.reconfigure(&config) {
            log::error!("Failed to reconfigure SDO: {}", e);
        }
    }

    fn half_period_delay(&self) {
        sleep_ns(self.pins.half_period_ns);
    }

    fn delay_us(&mut self, us: u32) {
        std::thread::sleep(Duration::from_micros(us as u64));
    }
}

impl Drop for LinuxGpioSerial {
    fn drop(&mut self) {
        self.set_sdi_set_sii(false, false);
        self.set_sci(false);
        self.set_power(false);
    }
}

fn parse_offset(name: &str, value: &str) -> Result<Offset> {
    value
        .parse()
        .map_err(|_| LinuxGpioError::InvalidLineNumber {
            name: name.to_string(),
            value: value.to_string(),
        })
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| LinuxGpioError::InvalidParameter(format!("{}={}", name, value)))
}

fn parse_parallel(options: &[(&str, &str)]) -> Result<ParallelPinConfig> {
    let mut pins = ParallelPinConfig::default();
    for &(key, value) in options {
        let slot = match key {
            "rdy" => &mut pins.rdy,
            "oe" => &mut pins.oe,
            "wr" => &mut pins.wr,
            "bs1" => &mut pins.bs1,
            "bs2" => &mut pins.bs2,
            "xa0" => &mut pins.xa0,
            "xa1" => &mut pins.xa1,
            "pagel" => &mut pins.pagel,
            "xtal1" => &mut pins.xtal1,
            "vcc" => &mut pins.vcc,
            "pulse_ns" => {
                pins.pulse_ns = parse_number(key, value)?;
                continue;
            }
            _ => match key
                .strip_prefix('d')
                .and_then(|bit| bit.parse::<usize>().ok())
                .filter(|&bit| bit < 8)
            {
                Some(bit) => &mut pins.data[bit],
                None => {
                    log::warn!("linux_gpio: Unknown parallel option: {}={}", key, value);
                    continue;
                }
            },
        };
        *slot = parse_offset(key, value)?;
    }
    Ok(pins)
}

fn parse_serial(options: &[(&str, &str)]) -> Result<SerialPinConfig> {
    let mut pins = SerialPinConfig::default();
    for &(key, value) in options {
        let slot = match key {
            "vcc" => &mut pins.vcc,
            "sdi" => &mut pins.sdi,
            "sii" => &mut pins.sii,
            "sdo" => &mut pins.sdo,
            "sci" => &mut pins.sci,
            "speed" => {
                let khz: u32 = parse_number(key, value)?;
                pins = pins.with_speed_hz(khz * 1000);
                continue;
            }
            _ => {
                log::warn!("linux_gpio: Unknown serial option: {}={}", key, value);
                continue;
            }
        };
        *slot = parse_offset(key, value)?;
    }
    Ok(pins)
}

/// Parse programmer options from a list of key-value pairs
///
/// # Supported Options
///
/// - `dev=/dev/gpiochipN` - GPIO chip device path (required, or use gpiochip)
/// - `gpiochip=N` - GPIO chip number (alternative to dev)
/// - `mode=parallel|serial` - Protocol (default parallel)
///
/// Parallel lines (defaults follow the reference board):
/// `d0`..`d7`, `rdy`, `oe`, `wr`, `bs1`, `bs2`, `xa0`, `xa1`, `pagel`,
/// `xtal1`, `vcc`, and `pulse_ns` for the strobe width.
///
/// Serial lines: `vcc`, `sdi`, `sii`, `sdo`, `sci`, and `speed` for the
/// SCI clock in kHz.
pub fn parse_options(options: &[(&str, &str)]) -> Result<LinuxGpioConfig> {
    let mut device = None;
    let mut gpiochip: Option<u32> = None;
    let mut serial = false;
    let mut pin_options = Vec::new();

    for &(key, value) in options {
        match key {
            "dev" => device = Some(value.to_string()),
            "gpiochip" => gpiochip = Some(parse_number(key, value)?),
            "mode" => {
                serial = match value {
                    "parallel" | "hvpp" => false,
                    "serial" | "hvsp" => true,
                    other => return Err(LinuxGpioError::InvalidMode(other.to_string())),
                }
            }
            _ => pin_options.push((key, value)),
        }
    }

    let device = match (device, gpiochip) {
        (Some(_), Some(_)) => return Err(LinuxGpioError::ConflictingDevice),
        (Some(dev), None) => dev,
        (None, Some(n)) => format!("/dev/gpiochip{}", n),
        (None, None) => return Err(LinuxGpioError::NoDevice),
    };

    let pins = if serial {
        PinConfig::Serial(parse_serial(&pin_options)?)
    } else {
        PinConfig::Parallel(parse_parallel(&pin_options)?)
    };

    Ok(LinuxGpioConfig { device, pins })
}
