//! The digital IO adapter that fronts the motherboard latch bus.
//! Any [`DigitalIo`] implementation can drive a board, the simulated one included.

pub mod mock;

pub use latchbus::{
    sim::{
        SimulatedBus,
        Wiring,
    },
    AdapterError,
    DigitalIo,
    Port,
    Signal,
};
