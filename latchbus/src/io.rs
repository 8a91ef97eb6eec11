//! The digital IO adapter that fronts the motherboard latch bus.
//!
//! The motherboard is driven by a LabJack U3. Only a handful of its lines matter here, and they
//! are addressed by the WBDC signal names rather than by LabJack channel numbers.

use num_derive::{
    FromPrimitive,
    ToPrimitive,
};
use num_traits::FromPrimitive;
use std::fmt::Display;
use thiserror::Error;

/// WBDC motherboard signals and the LabJack channel each one is wired to
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum Signal {
    /// Analog input measuring supply currents
    Imon = 0,
    /// Analog input measuring supply voltages
    Vmon = 1,
    /// Analog input measuring temperatures
    Temp = 2,
    /// Spare analog input
    Lna = 3,
    /// Serial readback from the latch shift register
    Sdo = 7,
    /// Latch address LSB
    A0 = 8,
    A1 = 9,
    A2 = 10,
    A3 = 11,
    A4 = 12,
    A5 = 13,
    A6 = 14,
    /// Latch address MSB
    A7 = 15,
    /// Serial clock
    Sck = 16,
    /// Serial data into the latch shift register
    Sdi = 17,
    /// Captures the latch status into the shift register (active low)
    NLoad = 18,
    /// Global bus enable (active low)
    CsBus = 19,
}

impl Signal {
    /// The eight address lines, LSB first
    pub const ADDRESS: [Signal; 8] = [
        Signal::A0,
        Signal::A1,
        Signal::A2,
        Signal::A3,
        Signal::A4,
        Signal::A5,
        Signal::A6,
        Signal::A7,
    ];

    /// The LabJack channel (IO number) of this signal
    #[must_use]
    pub const fn channel(self) -> u8 {
        self as u8
    }

    /// Looks up the signal wired to LabJack channel `channel`, if any
    #[must_use]
    pub fn from_channel(channel: u8) -> Option<Self> {
        Self::from_u8(channel)
    }

    /// The port this signal lives on
    #[must_use]
    pub const fn port(self) -> Port {
        match self.channel() {
            0..=7 => Port::Fio,
            8..=15 => Port::Eio,
            _ => Port::Cio,
        }
    }

    /// The name printed on the motherboard schematic
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Signal::Imon => "IMON",
            Signal::Vmon => "VMON",
            Signal::Temp => "TEMP",
            Signal::Lna => "LNA",
            Signal::Sdo => "SDO",
            Signal::A0 => "A0",
            Signal::A1 => "A1",
            Signal::A2 => "A2",
            Signal::A3 => "A3",
            Signal::A4 => "A4",
            Signal::A5 => "A5",
            Signal::A6 => "A6",
            Signal::A7 => "A7",
            Signal::Sck => "SCK",
            Signal::Sdi => "SDI",
            Signal::NLoad => "NLOAD",
            Signal::CsBus => "CS-BUS",
        }
    }
}

impl Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The three eight-bit digital ports of the adapter
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Port {
    /// Flexible IO, channels 0-7 (analog inputs and SDO)
    Fio,
    /// Extended IO, channels 8-15 (latch address)
    Eio,
    /// Control IO, channels 16-19
    Cio,
}

impl Port {
    /// Channel number of bit 0 of this port
    #[must_use]
    pub const fn first_channel(self) -> u8 {
        match self {
            Port::Fio => 0,
            Port::Eio => 8,
            Port::Cio => 16,
        }
    }
}

impl Display for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Port::Fio => "FIO",
                Port::Eio => "EIO",
                Port::Cio => "CIO",
            }
        )
    }
}

/// Errors raised by a digital IO adapter
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("The adapter is not connected")]
    Disconnected,
    #[error("Timed out waiting for the adapter")]
    Timeout,
    #[error("Signal {0} is not wired on this adapter")]
    Unwired(Signal),
    #[error("Internal system IO error")]
    Io(#[from] std::io::Error),
    #[error("Adapter reported an error: {0}")]
    Device(String),
}

/// The narrow slice of a digital IO adapter the latch protocol needs.
/// The methods of this trait *assume* that the adapter is already connected and its port
/// directions configured (EIO and CIO as outputs, FIO0-3 analog, FIO7 digital input).
pub trait DigitalIo {
    /// Drive `line` to `value`
    fn write_bit(&mut self, line: Signal, value: bool) -> Result<(), AdapterError>;

    /// Read back the current state of every line on `port`
    fn read_port(&mut self, port: Port) -> Result<u8, AdapterError>;

    /// Read the state of the digital input `line`
    fn read_input_bit(&mut self, line: Signal) -> Result<bool, AdapterError>;

    /// Read the voltage on analog input `channel`
    fn read_analog(&mut self, channel: u8) -> Result<f64, AdapterError>;

    /// Drive every named line of `port` from the bits of `value`.
    /// Adapters that can set a whole port in one transaction should override this.
    fn write_port(&mut self, port: Port, value: u8) -> Result<(), AdapterError> {
        for bit in 0..8 {
            if let Some(line) = Signal::from_channel(port.first_channel() + bit) {
                self.write_bit(line, (value >> bit) & 1 == 1)?;
            }
        }
        Ok(())
    }
}
