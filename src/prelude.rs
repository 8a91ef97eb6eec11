//! Prelude (helpful reexports) for this package

pub use crate::{
    core::{
        BoardConfig,
        Wbdc,
    },
    devices::{
        monitor::MonitorData,
        Control,
        Crossover,
        Error,
        PloBand,
        Polarization,
        Sideband,
    },
    revision::{
        Chain,
        HybridId,
        Pol,
        PolarizerId,
        PolarizerWiring,
        Revision,
        SubBand,
    },
    transport::{
        DigitalIo,
        Signal,
    },
};
pub use latchbus::{
    AddressScheme,
    LatchGroup,
    Timing,
};
