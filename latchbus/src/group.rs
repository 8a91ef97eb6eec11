//! Serial transfers to and from one latch group.
//!
//! A write selects the group's write address, shifts eight bits into the latch MSB first and
//! commits them when CS-BUS is released. A read selects the read address, strobes NLOAD to
//! capture the status lines, then shifts the captured byte out of SDO MSB first.
//!
//! Both start by driving the serial lines idle while the previous address is still on the bus.
//! An aborted transfer leaves CS-BUS low, so whatever it shifted is committed to its own latch
//! and never to the next one selected.

use crate::{
    address::{
        AddressError,
        AddressScheme,
        Direction,
        LatchAddress,
        READ_BIT,
    },
    io::{
        DigitalIo,
        Port,
        Signal,
    },
    Error,
    Phase,
};
use std::{
    sync::{
        Arc,
        Mutex,
        Weak,
    },
    thread,
    time::Duration,
};
use tracing::{
    debug,
    error,
};

/// Levels of the serial lines between transfers
const IDLE: [(Signal, bool); 4] = [
    (Signal::Sck, true),
    (Signal::Sdi, true),
    (Signal::NLoad, true),
    (Signal::CsBus, true),
];

/// Bus timing
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Timing {
    /// Time to wait after every group of line changes
    pub settle: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(10),
        }
    }
}

impl Timing {
    /// No settling at all, for simulated adapters
    #[must_use]
    pub const fn none() -> Self {
        Self {
            settle: Duration::ZERO,
        }
    }
}

/// Drives the serial lines to their idle levels
/// # Errors
/// Returns an error on adapter failure
pub fn drive_idle<T>(io: &mut T, timing: Timing) -> Result<(), Error>
where
    T: DigitalIo,
{
    Session { io, timing }.drive(Phase::Idle, &IDLE)
}

/// One of the four latch groups of a digital module
#[derive(Debug)]
pub struct LatchGroup<T> {
    bus: Weak<Mutex<T>>,
    address: u8,
    timing: Timing,
}

// Derived Clone would require T: Clone
impl<T> Clone for LatchGroup<T> {
    fn clone(&self) -> Self {
        Self {
            bus: self.bus.clone(),
            address: self.address,
            timing: self.timing,
        }
    }
}

impl<T> LatchGroup<T>
where
    T: DigitalIo,
{
    /// Latch group `group` of digital module `module` on a board using `scheme`
    /// # Errors
    /// Returns an error if the module or group don't exist in `scheme`
    pub fn new(
        bus: &Arc<Mutex<T>>,
        scheme: &AddressScheme,
        module: u8,
        group: u8,
        timing: Timing,
    ) -> Result<Self, AddressError> {
        let address = scheme.address(module, group, Direction::Write)?;
        Ok(Self {
            bus: Arc::downgrade(bus),
            address,
            timing,
        })
    }

    /// The latch group whose write address is `address`
    /// # Errors
    /// Returns an error if `address` is a read-mode address
    pub fn at_address(
        bus: &Arc<Mutex<T>>,
        address: u8,
        timing: Timing,
    ) -> Result<Self, AddressError> {
        if address & READ_BIT != 0 {
            return Err(AddressError::ReadAddress(address));
        }
        Ok(Self {
            bus: Arc::downgrade(bus),
            address,
            timing,
        })
    }

    /// The write address of this group
    #[must_use]
    pub fn address(&self) -> u8 {
        self.address
    }

    /// The read address of this group
    #[must_use]
    pub fn read_address(&self) -> u8 {
        self.address | READ_BIT
    }

    /// Runs `f` with the bus locked. Every transfer inside `f` is atomic with respect to all
    /// other users of the bus.
    /// # Errors
    /// Returns an error if the adapter has been dropped, the lock is poisoned, or `f` fails
    pub fn with_bus<R, F>(&self, f: F) -> Result<R, Error>
    where
        F: FnOnce(&mut T) -> Result<R, Error>,
    {
        let tarc = self.bus.upgrade().ok_or(Error::BusDropped)?;
        let mut io = tarc.lock().map_err(|_| Error::Poisoned)?;
        f(&mut *io)
    }

    /// Writes `byte` using an adapter the caller has already locked
    /// # Errors
    /// Returns an error on address mismatch or adapter failure. The remaining steps are skipped
    /// and the latch is left in an unknown state until the next transfer releases the bus.
    pub fn write_with(&self, io: &mut T, byte: u8) -> Result<(), Error> {
        debug!(address = self.address, byte, "Writing latch");
        let mut s = Session {
            io,
            timing: self.timing,
        };
        s.drive(Phase::Idle, &IDLE)?;
        s.select(self.address, &[self.address])?;
        s.drive(Phase::Enable, &[(Signal::CsBus, false)])?;
        for i in (0..=7).rev() {
            let bit = (byte >> i) & 1 == 1;
            s.drive(Phase::Shift(i), &[(Signal::Sdi, bit), (Signal::Sck, false)])?;
            s.drive(Phase::Shift(i), &[(Signal::Sck, true)])?;
        }
        s.drive(Phase::Disable, &[(Signal::CsBus, true)])
    }

    /// Reads the status byte using an adapter the caller has already locked
    /// # Errors
    /// Returns an error on address mismatch or adapter failure
    pub fn read_with(&self, io: &mut T) -> Result<u8, Error> {
        let address = self.read_address();
        let mut s = Session {
            io,
            timing: self.timing,
        };
        s.drive(Phase::Idle, &IDLE)?;
        // Some boards don't bring A2 back to the adapter, so the write address is accepted too
        s.select(address, &[address, self.address])?;
        s.drive(Phase::Load, &[(Signal::NLoad, false)])?;
        s.drive(Phase::Load, &[(Signal::NLoad, true)])?;
        s.drive(Phase::Enable, &[(Signal::CsBus, false)])?;
        let mut byte = 0u8;
        for i in (0..=7).rev() {
            let bit = s
                .io
                .read_input_bit(Signal::Sdo)
                .map_err(|source| Error::Adapter {
                    phase: Phase::Sample(i),
                    source,
                })?;
            byte |= u8::from(bit) << i;
            if i > 0 {
                s.drive(Phase::Shift(i), &[(Signal::Sck, false)])?;
                s.drive(Phase::Shift(i), &[(Signal::Sck, true)])?;
            }
        }
        s.drive(Phase::Disable, &[(Signal::CsBus, true)])?;
        debug!(address, byte, "Read latch");
        Ok(byte)
    }

    /// Locks the bus and writes `byte`
    /// # Errors
    /// Returns an error if the bus is unavailable or the transfer fails
    pub fn try_write(&self, byte: u8) -> Result<(), Error> {
        self.with_bus(|io| self.write_with(io, byte))
    }

    /// Locks the bus and reads the status byte
    /// # Errors
    /// Returns an error if the bus is unavailable or the transfer fails
    pub fn try_read(&self) -> Result<u8, Error> {
        self.with_bus(|io| self.read_with(io))
    }

    /// Writes `byte`, returning whether every step succeeded. A `false` return means the latch
    /// state is unknown and must be re-read.
    pub fn write(&self, byte: u8) -> bool {
        match self.try_write(byte) {
            Ok(()) => true,
            Err(e) => {
                error!(address = self.address, byte, "Latch write failed: {e}");
                false
            }
        }
    }

    /// Reads the status byte, or `None` if the transfer failed
    pub fn read(&self) -> Option<u8> {
        match self.try_read() {
            Ok(b) => Some(b),
            Err(e) => {
                error!(address = self.read_address(), "Latch read failed: {e}");
                None
            }
        }
    }
}

/// Line operations of one transfer, each group followed by the settling delay
struct Session<'a, T> {
    io: &'a mut T,
    timing: Timing,
}

impl<T> Session<'_, T>
where
    T: DigitalIo,
{
    fn settle(&self) {
        if !self.timing.settle.is_zero() {
            thread::sleep(self.timing.settle);
        }
    }

    fn drive(&mut self, phase: Phase, lines: &[(Signal, bool)]) -> Result<(), Error> {
        for (line, value) in lines {
            self.io
                .write_bit(*line, *value)
                .map_err(|source| Error::Adapter { phase, source })?;
        }
        self.settle();
        Ok(())
    }

    fn select(&mut self, address: u8, accept: &[u8]) -> Result<(), Error> {
        self.io
            .write_port(Port::Eio, address)
            .map_err(|source| Error::Adapter {
                phase: Phase::Select,
                source,
            })?;
        self.settle();
        let observed = self
            .io
            .read_port(Port::Eio)
            .map_err(|source| Error::Adapter {
                phase: Phase::Verify,
                source,
            })?;
        if !accept.contains(&observed) {
            match LatchAddress::decode(observed) {
                Ok(decoded) => {
                    error!(
                        expected = address,
                        observed,
                        "Address lines show {}",
                        decoded.location()
                    );
                }
                Err(_) => {
                    error!(expected = address, observed, "Address lines disagree");
                }
            }
            return Err(Error::AddressMismatch {
                expected: address,
                observed,
            });
        }
        Ok(())
    }
}
