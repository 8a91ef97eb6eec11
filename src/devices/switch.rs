//! Latch-controlled switches.
//!
//! A switch is commanded through a field of a write-mode latch and sensed through a field of a
//! read-mode latch, which need not belong to the same group. Control bytes are shared with
//! unrelated devices, so every command is a read-modify-write with the bus held throughout.

use super::{
    field::BitField,
    Control,
    Error,
};
use kstring::KString;
use latchbus::{
    DigitalIo,
    LatchGroup,
};
use std::marker::PhantomData;
use tracing::{
    debug,
    error,
};

/// A field of a latch group
#[derive(Debug)]
pub struct Tap<T> {
    pub group: LatchGroup<T>,
    pub field: BitField,
}

impl<T> Clone for Tap<T> {
    fn clone(&self) -> Self {
        Self {
            group: self.group.clone(),
            field: self.field,
        }
    }
}

impl<T> Tap<T> {
    #[must_use]
    pub fn new(group: LatchGroup<T>, field: BitField) -> Self {
        Self { group, field }
    }
}

/// A single two-state switch
#[derive(Debug)]
pub struct LatchSwitch<T, S> {
    name: KString,
    control: Tap<T>,
    sense: Tap<T>,
    state: PhantomData<fn() -> S>,
}

impl<T, S> LatchSwitch<T, S>
where
    T: DigitalIo,
    S: From<bool> + Into<bool> + Copy,
{
    pub fn new(name: impl Into<KString>, control: Tap<T>, sense: Tap<T>) -> Self {
        Self {
            name: name.into(),
            control,
            sense,
            state: PhantomData,
        }
    }

    /// Reads the control byte, replaces this switch's field and writes it back
    /// # Errors
    /// Returns an error if either transfer fails
    pub fn command_with(&self, io: &mut T, state: S) -> Result<(), latchbus::Error> {
        let current = self.control.group.read_with(io)?;
        let byte = self.control.field.encode(current, state.into());
        debug!(
            switch = self.name.as_str(),
            current, byte, "Commanding latch switch"
        );
        self.control.group.write_with(io, byte)
    }

    /// Reads the raw sense byte
    /// # Errors
    /// Returns an error if the transfer fails
    pub fn sense_with(&self, io: &mut T) -> Result<u8, latchbus::Error> {
        self.sense.group.read_with(io)
    }

    /// Interprets a sense byte
    /// # Errors
    /// Returns an error if the sense field shows neither state
    pub fn decode(&self, byte: u8) -> Result<S, Error> {
        match self.sense.field.decode(byte) {
            Some(on) => Ok(S::from(on)),
            None => {
                error!(switch = self.name.as_str(), byte, "Indeterminate state");
                Err(Error::Indeterminate {
                    device: self.name.clone(),
                    byte,
                })
            }
        }
    }

    /// Runs `f` on the bus shared by this switch
    /// # Errors
    /// Returns an error if the bus is unavailable or `f` fails
    pub fn with_bus<R, F>(&self, f: F) -> Result<R, latchbus::Error>
    where
        F: FnOnce(&mut T) -> Result<R, latchbus::Error>,
    {
        self.control.group.with_bus(f)
    }
}

impl<T, S> Control for LatchSwitch<T, S>
where
    T: DigitalIo,
    S: From<bool> + Into<bool> + Copy,
{
    type State = S;

    fn name(&self) -> &str {
        self.name.as_str()
    }

    fn get_state(&self) -> Result<S, Error> {
        let byte = self.sense.group.try_read()?;
        self.decode(byte)
    }

    fn set_state(&self, state: S) -> Result<S, Error> {
        self.with_bus(|io| self.command_with(io, state))?;
        self.get_state()
    }
}

/// Two switches that always carry the same command, such as the two 2x2 transfer switches that
/// make up the feed crossover
#[derive(Debug)]
pub struct GangedSwitch<T, S> {
    name: KString,
    switches: [LatchSwitch<T, S>; 2],
}

impl<T, S> GangedSwitch<T, S>
where
    T: DigitalIo,
    S: From<bool> + Into<bool> + Copy + PartialEq,
{
    pub fn new(name: impl Into<KString>, switches: [LatchSwitch<T, S>; 2]) -> Self {
        Self {
            name: name.into(),
            switches,
        }
    }

    #[must_use]
    pub fn switches(&self) -> &[LatchSwitch<T, S>; 2] {
        &self.switches
    }
}

impl<T, S> Control for GangedSwitch<T, S>
where
    T: DigitalIo,
    S: From<bool> + Into<bool> + Copy + PartialEq,
{
    type State = S;

    fn name(&self) -> &str {
        self.name.as_str()
    }

    fn get_state(&self) -> Result<S, Error> {
        let [a, b] = &self.switches;
        let (byte_a, byte_b) = a.with_bus(|io| Ok((a.sense_with(io)?, b.sense_with(io)?)))?;
        let (state_a, state_b) = (a.decode(byte_a)?, b.decode(byte_b)?);
        if state_a == state_b {
            Ok(state_a)
        } else {
            error!(
                switch = self.name.as_str(),
                first = a.name(),
                second = b.name(),
                "Sub-switches disagree"
            );
            Err(Error::Disagreement {
                device: self.name.clone(),
            })
        }
    }

    fn set_state(&self, state: S) -> Result<S, Error> {
        let [a, b] = &self.switches;
        a.with_bus(|io| {
            // Command both even if the first fails, so neither is left behind
            let first = a.command_with(io, state);
            let second = b.command_with(io, state);
            first.and(second)
        })?;
        self.get_state()
    }
}

/// A read-only status bit, such as a PLO lock indicator
#[derive(Debug)]
pub struct StatusFlag<T> {
    name: KString,
    sense: Tap<T>,
}

impl<T> StatusFlag<T>
where
    T: DigitalIo,
{
    pub fn new(name: impl Into<KString>, sense: Tap<T>) -> Self {
        Self {
            name: name.into(),
            sense,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Whether the flag is raised
    /// # Errors
    /// Returns an error on bus failure or if the field shows neither level
    pub fn is_set(&self) -> Result<bool, Error> {
        let byte = self.sense.group.try_read()?;
        self.sense
            .field
            .decode(byte)
            .ok_or_else(|| Error::Indeterminate {
                device: self.name.clone(),
                byte,
            })
    }
}
