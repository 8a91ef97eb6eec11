//! Switches, hybrids and status lines built from latch bits, and the analog monitor

pub mod field;
pub mod monitor;
pub mod switch;

use kstring::KString;
use latchbus::AddressError;
use std::fmt::Display;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Bus(#[from] latchbus::Error),
    #[error("{device} reads back {byte:#010b}, which is neither state")]
    Indeterminate { device: KString, byte: u8 },
    #[error("The sub-switches of {device} disagree")]
    Disagreement { device: KString },
    #[error("No monitor point is labelled {0:?}")]
    UnknownLabel(String),
    #[error("Bad board configuration: {0}")]
    Config(String),
    #[error("This board revision has no {0}")]
    Unsupported(&'static str),
    #[error(transparent)]
    Address(#[from] AddressError),
}

/// A device with a logical state that is commanded through one latch and sensed through another
pub trait Control {
    type State;

    fn name(&self) -> &str;

    /// Reads the state from hardware
    /// # Errors
    /// Returns an error on bus failure or if the hardware shows no valid state
    fn get_state(&self) -> Result<Self::State, Error>;

    /// Commands `state`, then returns the state read back from hardware
    /// # Errors
    /// Returns an error on bus failure or if the hardware shows no valid state afterwards
    fn set_state(&self, state: Self::State) -> Result<Self::State, Error>;
}

/// Implements the conversions between a two-state enum and the bit level that encodes it.
/// `$on` is the state encoded by the "on" pattern of its field.
macro_rules! two_state {
    ($name:ident, $on:ident, $off:ident) => {
        impl From<bool> for $name {
            fn from(on: bool) -> Self {
                if on {
                    $name::$on
                } else {
                    $name::$off
                }
            }
        }

        impl From<$name> for bool {
            fn from(state: $name) -> bool {
                state == $name::$on
            }
        }
    };
}

/// State of the feed transfer switch
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Crossover {
    Through,
    Crossed,
}

/// Whether the polarization hybrids pass linear polarization or convert it to circular
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Polarization {
    Linear,
    Circular,
}

/// Whether the I/Q outputs of the image rejection mixers are combined into upper and lower
/// sidebands
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Sideband {
    /// The hybrid is bypassed
    IQ,
    /// Upper and lower sidebands
    LU,
}

/// The phase locked oscillator band of a WBDC1
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PloBand {
    Ghz22,
    Ghz24,
}

two_state!(Crossover, Crossed, Through);
two_state!(Polarization, Circular, Linear);
two_state!(Sideband, IQ, LU);
two_state!(PloBand, Ghz24, Ghz22);

impl Display for Crossover {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Crossover::Through => write!(f, "through"),
            Crossover::Crossed => write!(f, "crossed"),
        }
    }
}

impl Display for Polarization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Polarization::Linear => write!(f, "linear"),
            Polarization::Circular => write!(f, "circular"),
        }
    }
}

impl Display for Sideband {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sideband::IQ => write!(f, "I/Q"),
            Sideband::LU => write!(f, "L/U"),
        }
    }
}

impl Display for PloBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PloBand::Ghz22 => write!(f, "22 GHz"),
            PloBand::Ghz24 => write!(f, "24 GHz"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paste::paste;

    macro_rules! test_two_state {
        ($name:ident, $on:ident, $off:ident) => {
            paste! {
                #[test]
                fn [<test_ $name:lower _levels>]() {
                    assert_eq!($name::from(true), $name::$on);
                    assert_eq!($name::from(false), $name::$off);
                    assert!(bool::from($name::$on));
                    assert!(!bool::from($name::$off));
                }
            }
        };
    }

    test_two_state!(Crossover, Crossed, Through);
    test_two_state!(Polarization, Circular, Linear);
    test_two_state!(Sideband, IQ, LU);
    test_two_state!(PloBand, Ghz24, Ghz22);
}
