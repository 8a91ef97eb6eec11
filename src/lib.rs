//! Monitor and control of the K-band Wide Band Down Converters.
//!
//! A [`Wbdc`](core::Wbdc) owns the digital IO adapter that drives the motherboard latch bus and
//! builds the switches, hybrids, status flags and analog monitor of its board revision on top of
//! it. The latch protocol itself lives in the `latchbus` crate.

pub mod core;
pub mod devices;
pub mod prelude;
pub mod revision;
pub mod transport;

pub use devices::Error;
