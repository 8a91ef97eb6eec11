//! Simulated WBDC status wiring, for driving a [`SimulatedBus`](latchbus::sim::SimulatedBus)
//! that behaves like a real board

use crate::revision::{
    Pol,
    Revision,
    SubBand,
};
use latchbus::{
    sim::{
        Latches,
        Wiring,
    },
    READ_BIT,
};
use std::collections::HashMap;

/// What the status inputs and analog channels of a healthy board show.
/// Every PLO is locked, tell-tales follow their commands, and every analog input reads
/// [`WbdcWiring::nominal`] unless told otherwise.
#[derive(Debug, Clone)]
pub struct WbdcWiring {
    revision: Revision,
    locks: HashMap<SubBand, bool>,
    jammed: [Option<bool>; 2],
    readings: HashMap<(u8, u8), f64>,
    nominal: f64,
}

impl WbdcWiring {
    #[must_use]
    pub fn simulated(revision: Revision) -> Self {
        Self {
            revision,
            locks: SubBand::ALL.iter().map(|b| (*b, true)).collect(),
            jammed: [None; 2],
            readings: HashMap::new(),
            nominal: 1.0,
        }
    }

    #[must_use]
    pub fn nominal(&self) -> f64 {
        self.nominal
    }

    pub fn set_nominal(&mut self, volts: f64) {
        self.nominal = volts;
    }

    pub fn set_lock(&mut self, band: SubBand, locked: bool) {
        self.locks.insert(band, locked);
    }

    /// Forces the crossover tell-tale of `pol` to show `crossed`, or releases it with `None`
    pub fn jam_crossover(&mut self, pol: Pol, crossed: Option<bool>) {
        self.jammed[usize::from(pol.index())] = crossed;
    }

    /// Analog input `channel` reads `volts` while its select latch holds `select`
    pub fn set_analog(&mut self, channel: u8, select: u8, volts: f64) {
        self.readings.insert((channel, select), volts);
    }

    /// Write address of the select latch that routes to `channel`
    #[must_use]
    pub fn select_latch(&self, channel: u8) -> u8 {
        match (self.revision, channel) {
            (_, 0 | 1) => 0,
            (Revision::Wbdc1, _) => 2,
            (Revision::Wbdc2, _) => 1,
        }
    }

    fn locked(&self, band: SubBand) -> bool {
        self.locks.get(&band).copied().unwrap_or(false)
    }

    fn crossover_bits(&self, commanded: [bool; 2]) -> u8 {
        commanded
            .iter()
            .zip(self.jammed)
            .enumerate()
            .map(|(i, (c, jam))| u8::from(jam.unwrap_or(*c)) << i)
            .sum()
    }
}

impl Wiring for WbdcWiring {
    fn readback(&self, latches: &Latches, address: u8) -> u8 {
        let echo = latches[usize::from(address & !READ_BIT)];
        match (self.revision, address) {
            (Revision::Wbdc2, 15) => {
                let commanded = latches[8];
                let locks: u8 = SubBand::ALL
                    .iter()
                    .map(|b| u8::from(self.locked(*b)) << (2 + b.index()))
                    .sum();
                self.crossover_bits([commanded & 1 != 0, commanded & 2 != 0]) | locks
            }
            (Revision::Wbdc1, 86) => {
                let lg1 = latches[80];
                let r1 = match lg1 & 0b0_0110 {
                    0b0_0010 => 0b0101,
                    0b0_0100 => 0b1010,
                    _ => 0,
                };
                let r2 = match lg1 & 0b1_1000 {
                    0b1_0000 => 0b1010_0000,
                    0b0_1000 => 0b0101_0000,
                    _ => 0,
                };
                r1 | r2
            }
            (Revision::Wbdc1, 87) => {
                let lg1 = latches[80];
                let crossed = lg1 & 1 != 0;
                self.crossover_bits([crossed, crossed])
                    | u8::from(self.locked(SubBand::B22)) << 2
                    | u8::from(self.locked(SubBand::B24)) << 3
                    | (lg1 & 0b10_0000) >> 1
            }
            _ => echo,
        }
    }

    fn analog(&self, latches: &Latches, channel: u8) -> f64 {
        let select = latches[usize::from(self.select_latch(channel))];
        self.readings
            .get(&(channel, select))
            .copied()
            .unwrap_or(self.nominal)
    }
}
