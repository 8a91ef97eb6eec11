//! The WBDC latch bus.
//!
//! Every switch, hybrid and status line of a Wide Band Down Converter sits behind an eight-bit
//! latch on the motherboard. The latches share one address bus and one three-wire serial bus,
//! both driven by bit-banging the lines of a digital IO adapter. This crate implements that
//! protocol and nothing above it.

pub mod address;
pub mod group;
pub mod io;
pub mod sim;

pub use address::{
    compute_address,
    AddressError,
    AddressScheme,
    Direction,
    LatchAddress,
    Location,
    READ_BIT,
};
pub use group::{
    drive_idle,
    LatchGroup,
    Timing,
};
pub use io::{
    AdapterError,
    DigitalIo,
    Port,
    Signal,
};

use std::fmt::Display;
use thiserror::Error;

/// The step of a latch transfer that was running when it failed
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Phase {
    /// Driving the address lines
    Select,
    /// Reading the address lines back
    Verify,
    /// Driving the serial lines to their idle levels
    Idle,
    /// Strobing NLOAD
    Load,
    /// Pulling CS-BUS low
    Enable,
    /// Clocking data bit n
    Shift(u8),
    /// Sampling SDO for bit n
    Sample(u8),
    /// Releasing CS-BUS
    Disable,
    /// Reading analog input n
    Analog(u8),
}

impl Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Select => write!(f, "address select"),
            Phase::Verify => write!(f, "address verify"),
            Phase::Idle => write!(f, "idle"),
            Phase::Load => write!(f, "load strobe"),
            Phase::Enable => write!(f, "bus enable"),
            Phase::Shift(n) => write!(f, "shift of bit {n}"),
            Phase::Sample(n) => write!(f, "sample of bit {n}"),
            Phase::Disable => write!(f, "bus disable"),
            Phase::Analog(n) => write!(f, "read of AIN{n}"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Address readback mismatch, sent {expected} but the bus shows {observed}")]
    AddressMismatch { expected: u8, observed: u8 },
    #[error("Adapter failed during {phase}")]
    Adapter {
        phase: Phase,
        #[source]
        source: AdapterError,
    },
    #[error("The digital IO adapter has been dropped")]
    BusDropped,
    #[error("The bus lock was poisoned by a panicking thread")]
    Poisoned,
    #[error(transparent)]
    Address(#[from] AddressError),
}
