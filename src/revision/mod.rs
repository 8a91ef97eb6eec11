//! Board revisions.
//!
//! The two down converter generations share the latch protocol but wire their switches,
//! hybrids and monitor points differently. Each revision is a table of devices built over a
//! shared bus; nothing outside this module knows which latch bit does what.

pub mod wbdc1;
pub mod wbdc2;

use crate::{
    core::BoardConfig,
    devices::{
        monitor::AnalogMonitor,
        switch::{
            GangedSwitch,
            LatchSwitch,
            StatusFlag,
        },
        Crossover,
        Error,
        PloBand,
        Polarization,
        Sideband,
    },
};
use latchbus::DigitalIo;
use std::{
    collections::BTreeMap,
    fmt::Display,
    str::FromStr,
    sync::{
        Arc,
        Mutex,
    },
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Revision {
    /// One digital module at 80, two 22/24 GHz PLO bands
    Wbdc1,
    /// Two digital modules at 8 and 160, five sub-bands from 18 to 26 GHz
    Wbdc2,
}

impl FromStr for Revision {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "WBDC1" => Ok(Revision::Wbdc1),
            "WBDC2" => Ok(Revision::Wbdc2),
            _ => Err(Error::Config(format!("unknown board revision {s:?}"))),
        }
    }
}

impl Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Revision::Wbdc1 => write!(f, "WBDC1"),
            Revision::Wbdc2 => write!(f, "WBDC2"),
        }
    }
}

/// Receiver chain
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Chain {
    R1,
    R2,
}

impl Chain {
    pub const ALL: [Chain; 2] = [Chain::R1, Chain::R2];

    #[must_use]
    pub const fn index(self) -> u8 {
        match self {
            Chain::R1 => 0,
            Chain::R2 => 1,
        }
    }
}

/// Polarization channel of a receiver chain
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Pol {
    P1,
    P2,
}

impl Pol {
    pub const ALL: [Pol; 2] = [Pol::P1, Pol::P2];

    #[must_use]
    pub const fn index(self) -> u8 {
        match self {
            Pol::P1 => 0,
            Pol::P2 => 1,
        }
    }
}

/// Down converter sub-band, by the frequency of its local oscillator
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SubBand {
    B18,
    B20,
    B22,
    B24,
    B26,
}

impl SubBand {
    pub const ALL: [SubBand; 5] = [
        SubBand::B18,
        SubBand::B20,
        SubBand::B22,
        SubBand::B24,
        SubBand::B26,
    ];

    #[must_use]
    pub const fn ghz(self) -> u8 {
        match self {
            SubBand::B18 => 18,
            SubBand::B20 => 20,
            SubBand::B22 => 22,
            SubBand::B24 => 24,
            SubBand::B26 => 26,
        }
    }

    /// Position counting up from 18 GHz
    #[must_use]
    pub const fn index(self) -> u8 {
        (self.ghz() - 18) / 2
    }
}

macro_rules! display_as {
    ($ty:ty, $($variant:path => $s:literal),+) => {
        impl Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $($variant => write!(f, $s),)+
                }
            }
        }
    };
}

display_as!(Chain, Chain::R1 => "R1", Chain::R2 => "R2");
display_as!(Pol, Pol::P1 => "P1", Pol::P2 => "P2");
display_as!(SubBand,
    SubBand::B18 => "18",
    SubBand::B20 => "20",
    SubBand::B22 => "22",
    SubBand::B24 => "24",
    SubBand::B26 => "26"
);

/// How the polarization hybrid control bits of the two receiver chains are ordered.
///
/// Two wirings are documented for WBDC2 boards. Check the wiring diagram of the deployed board
/// before choosing.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum PolarizerWiring {
    /// R1 bits fall with band (18 GHz on bit 4), R2 bits rise (18 GHz on bit 0)
    #[default]
    Mirrored,
    /// Both chains have 18 GHz on bit 0
    Ascending,
}

/// The latch bit controlling the polarization hybrid of `chain` in `band`
#[must_use]
pub const fn polarizer_bit(wiring: PolarizerWiring, chain: Chain, band: SubBand) -> u8 {
    match (wiring, chain) {
        (PolarizerWiring::Mirrored, Chain::R1) => 4 - band.index(),
        _ => band.index(),
    }
}

/// Identifies a polarization hybrid. WBDC1 has one per chain, WBDC2 one per chain and band.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PolarizerId {
    pub chain: Chain,
    pub band: Option<SubBand>,
}

impl Display for PolarizerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.band {
            Some(band) => write!(f, "{}-{band}", self.chain),
            None => write!(f, "{}", self.chain),
        }
    }
}

/// Identifies an I/Q to sideband hybrid
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HybridId {
    pub chain: Chain,
    pub band: Option<SubBand>,
    pub pol: Pol,
}

impl Display for HybridId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.band {
            Some(band) => write!(f, "{}-{band}-{}", self.chain, self.pol),
            None => write!(f, "{}-{}", self.chain, self.pol),
        }
    }
}

/// Every device of a board
pub struct Devices<T> {
    pub crossover: GangedSwitch<T, Crossover>,
    pub polarizers: BTreeMap<PolarizerId, LatchSwitch<T, Polarization>>,
    pub sideband_hybrids: BTreeMap<HybridId, LatchSwitch<T, Sideband>>,
    /// WBDC1 only
    pub plo_band: Option<LatchSwitch<T, PloBand>>,
    pub pll_locks: BTreeMap<SubBand, StatusFlag<T>>,
    pub monitor: AnalogMonitor<T>,
}

/// Builds the devices of `config.revision` on `bus`
/// # Errors
/// Returns an error if the revision's tables don't fit the configured address scheme
pub fn build<T>(bus: &Arc<Mutex<T>>, config: &BoardConfig) -> Result<Devices<T>, Error>
where
    T: DigitalIo,
{
    match config.revision {
        Revision::Wbdc1 => wbdc1::build(bus, config),
        Revision::Wbdc2 => wbdc2::build(bus, config),
    }
}
