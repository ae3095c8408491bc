//! Pin-level traits for high-voltage programmers
//!
//! This module provides the traits a GPIO backend implements so that the
//! protocol drivers in [`crate::protocol`] can bitbang the target.
//!
//! ## Parallel (HVPP)
//!
//! The parallel interface drives an 8-bit data bus plus a set of control
//! lines ([`ControlLines`]). The XA1/XA0 pair selects what the next XTAL1
//! pulse latches ([`Action`]); BS1/BS2 select the byte within a word or the
//! fuse being accessed.
//!
//! ## Serial (HVSP)
//!
//! The serial interface shifts an instruction (SII) and a data byte (SDI)
//! into the target simultaneously, one 11-bit frame per transfer, while the
//! target shifts its answer out on SDO.
//!
//! Like the SPI bitbang traits these primitives are infallible: backends
//! log GPIO failures and carry on, and the protocol layer detects a dead
//! target through timeouts and signature mismatches.

use bitflags::bitflags;

bitflags! {
    /// Control lines of the parallel programming interface
    ///
    /// A set bit means the line is driven high.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ControlLines: u16 {
        /// Output enable (active low)
        const OE    = 1 << 0;
        /// Write pulse (active low)
        const WR    = 1 << 1;
        /// Byte select 1
        const BS1   = 1 << 2;
        /// Byte select 2
        const BS2   = 1 << 3;
        /// Action select bit 0
        const XA0   = 1 << 4;
        /// Action select bit 1
        const XA1   = 1 << 5;
        /// Program memory and EEPROM data latch
        const PAGEL = 1 << 6;
        /// Clock used to latch address, data and commands
        const XTAL1 = 1 << 7;
    }
}

impl Default for ControlLines {
    fn default() -> Self {
        ControlLines::empty()
    }
}

impl ControlLines {
    /// Lines held high between operations while in programming mode
    pub const IDLE: ControlLines = ControlLines::OE.union(ControlLines::WR);
}

/// What the next XTAL1 pulse latches, selected by XA1/XA0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Load flash or EEPROM address (BS1/BS2 select the byte)
    LoadAddress,
    /// Load data byte (BS1 selects low/high)
    LoadData,
    /// Load command
    LoadCommand,
}

impl Action {
    /// The XA1/XA0 lines that must be high for this action
    pub fn lines(self) -> ControlLines {
        match self {
            Action::LoadAddress => ControlLines::empty(),
            Action::LoadData => ControlLines::XA0,
            Action::LoadCommand => ControlLines::XA1,
        }
    }
}

/// Trait for low-level parallel programming pin operations
pub trait ParallelPins {
    /// Switch target VCC, which also raises /RESET to 12V through the
    /// level-shifting network
    fn set_power(&mut self, on: bool);

    /// Drive every line in `lines` to the given level
    fn set_lines(&mut self, lines: ControlLines, high: bool);

    /// Drive the data bus with `byte` (switches the bus to outputs)
    fn write_data(&mut self, byte: u8);

    /// Switch the data bus to inputs so the target can drive it
    fn release_data(&mut self);

    /// Sample the data bus (the bus must be released)
    fn read_data(&mut self) -> u8;

    /// Read the RDY/BSY line (true when the target is ready)
    fn is_ready(&mut self) -> bool;

    /// Delay for the specified number of microseconds
    fn delay_us(&mut self, us: u32);

    /// Minimum high/low time of a strobe pulse
    fn pulse_delay(&mut self) {}
}

/// Trait for low-level serial programming pin operations
pub trait SerialPins {
    /// Switch target VCC, which also raises /RESET to 12V through the
    /// level-shifting network
    fn set_power(&mut self, on: bool);

    /// Set serial data input (SDI)
    fn set_sdi(&mut self, high: bool);

    /// Set serial instruction input (SII)
    fn set_sii(&mut self, high: bool);

    /// Set serial clock input (SCI)
    fn set_sci(&mut self, high: bool);

    /// Read serial data output (SDO)
    fn get_sdo(&mut self) -> bool;

    /// Drive SDO as an output (`Some(level)`) or release it to an input (`None`)
    ///
    /// SDO doubles as a Prog_enable pin and must be held low while the
    /// target powers up.
    fn drive_sdo(&mut self, level: Option<bool>);

    /// Delay for half a clock period (at least 110ns, for a 220ns SCI period)
    fn half_period_delay(&self);

    /// Delay for the specified number of microseconds
    fn delay_us(&mut self, us: u32);

    /// Optional: Set SDI and SII together (optimization)
    ///
    /// Default implementation calls `set_sdi` then `set_sii`.
    fn set_sdi_set_sii(&mut self, sdi: bool, sii: bool) {
        self.set_sdi(sdi);
        self.set_sii(sii);
    }
}

/// Helper functions for the parallel interface
///
/// These are standalone functions that can be used by any `ParallelPins` implementation.
pub mod parallel {
    use super::{Action, ControlLines, ParallelPins};

    /// Give a positive pulse on XTAL1
    pub fn pulse_xtal1<P: ParallelPins + ?Sized>(pins: &mut P) {
        pins.set_lines(ControlLines::XTAL1, true);
        pins.pulse_delay();
        pins.set_lines(ControlLines::XTAL1, false);
        pins.pulse_delay();
    }

    /// Give a positive pulse on PAGEL
    pub fn pulse_pagel<P: ParallelPins + ?Sized>(pins: &mut P) {
        pins.set_lines(ControlLines::PAGEL, true);
        pins.pulse_delay();
        pins.set_lines(ControlLines::PAGEL, false);
        pins.pulse_delay();
    }

    /// Give a negative pulse on WR
    pub fn pulse_wr<P: ParallelPins + ?Sized>(pins: &mut P) {
        pins.set_lines(ControlLines::WR, false);
        pins.pulse_delay();
        pins.set_lines(ControlLines::WR, true);
        pins.pulse_delay();
    }

    /// Select the action latched by the next XTAL1 pulse
    pub fn set_action<P: ParallelPins + ?Sized>(pins: &mut P, action: Action) {
        let xa = ControlLines::XA0 | ControlLines::XA1;
        pins.set_lines(xa - action.lines(), false);
        pins.set_lines(action.lines(), true);
    }

    /// Set BS1/BS2 to exactly the lines given in `select`
    pub fn set_byte_select<P: ParallelPins + ?Sized>(pins: &mut P, select: ControlLines) {
        let bs = ControlLines::BS1 | ControlLines::BS2;
        pins.set_lines(bs - select, false);
        pins.set_lines(bs & select, true);
    }

    /// Latch one byte: select action and byte, present data, pulse XTAL1
    pub fn load<P: ParallelPins + ?Sized>(
        pins: &mut P,
        action: Action,
        select: ControlLines,
        byte: u8,
    ) {
        set_action(pins, action);
        set_byte_select(pins, select);
        pins.write_data(byte);
        pulse_xtal1(pins);
    }

    /// Read one byte with OE asserted and the given byte select
    pub fn read<P: ParallelPins + ?Sized>(pins: &mut P, select: ControlLines) -> u8 {
        pins.release_data();
        set_byte_select(pins, select);
        pins.set_lines(ControlLines::OE, false);
        pins.pulse_delay();
        let byte = pins.read_data();
        pins.set_lines(ControlLines::OE, true);
        byte
    }
}

/// Helper functions for the serial interface
pub mod serial {
    use super::SerialPins;

    /// Number of SCI clocks per frame: start bit, 8 data bits, 2 stop bits
    pub const FRAME_BITS: u32 = 11;

    /// Shift one instruction/data frame into the target and return the
    /// byte it shifted out on SDO
    ///
    /// Bits are sent MSB first; SDO is sampled before each rising SCI edge,
    /// and its data byte occupies the same frame positions as SDI's.
    pub fn transfer<P: SerialPins + ?Sized>(pins: &mut P, data: u8, instr: u8) -> u8 {
        let sdi = (data as u16) << 2;
        let sii = (instr as u16) << 2;
        let mut sdo = 0u16;

        for bit in (0..FRAME_BITS).rev() {
            pins.set_sdi_set_sii((sdi >> bit) & 1 != 0, (sii >> bit) & 1 != 0);
            sdo = (sdo << 1) | pins.get_sdo() as u16;
            pins.half_period_delay();
            pins.set_sci(true);
            pins.half_period_delay();
            pins.set_sci(false);
        }

        (sdo >> 2) as u8
    }
}
