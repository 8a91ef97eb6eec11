//! WBDC2: two digital modules, five sub-bands per receiver chain.
//!
//! Digital module 1 (write addresses 8-11, read addresses 12-15):
//! - LG1 bits 0/1 command the two feed transfer switches, sensed on LG4 bits 0/1
//! - LG2 (R1) and LG3 (R2) command the polarization hybrids, one bit per sub-band, read back on
//!   the same groups
//! - LG4 bits 2-6 show the PLO locks for 18-26 GHz
//!
//! Digital module 2 (write addresses 160-163) commands the I/Q hybrids, R1 on LG1 (18, 20 GHz)
//! and LG2 (22-26 GHz), R2 on LG3 and LG4.
//!
//! Analog select latches sit at 0 (currents on AIN0, rail voltages on AIN1) and 1 (detectors on
//! AIN2, plate temperatures on AIN3).

use super::{
    polarizer_bit,
    Chain,
    Devices,
    HybridId,
    Pol,
    PolarizerId,
    SubBand,
};
use crate::{
    core::BoardConfig,
    devices::{
        field::BitField,
        monitor::{
            AnalogBank,
            AnalogMonitor,
            Calibrations,
            Category::{
                self,
                Current,
                Detector,
                Temperature,
                Voltage,
            },
            Linear,
            MonitorPoint,
            MonitorTable,
            Rail::{
                Analog6,
                Digital6,
                Minus16,
                Plus12,
                Plus16,
            },
        },
        switch::{
            GangedSwitch,
            LatchSwitch,
            StatusFlag,
            Tap,
        },
        Error,
    },
};
use latchbus::{
    DigitalIo,
    LatchGroup,
};
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        Mutex,
    },
};

pub const CURRENT_BANK: AnalogBank = AnalogBank {
    selects: &[0],
    channels: &[0, 1],
};

pub const DETECTOR_BANK: AnalogBank = AnalogBank {
    selects: &[1],
    channels: &[2, 3],
};

pub const CALIBRATIONS: Calibrations = Calibrations {
    current: Linear {
        offset: 0.026,
        scale: 1.0,
    },
    temperature: Linear {
        offset: -0.238_927_5,
        scale: 23.549_481,
    },
    detector: Linear {
        offset: 0.004,
        scale: 2.0064,
    },
    digital6: Linear::scale(4.0211),
    analog6: Linear::scale(4.0278),
    plus12: Linear::scale(10.5827),
    plus16: Linear::scale(10.5446),
    minus16: Linear::scale(-10.5446),
};

type Readings = [Option<(&'static str, Category)>; 2];

/// Select bytes for latch 0. Bits 0-2 pick the rail voltage, bits 3-6 the supply current.
const CURRENT_POINTS: [(u8, Readings); 16] = [
    (0b000_0000, [Some(("+6 V digitalMB", Current)), Some(("+6 V dig", Voltage(Digital6)))]),
    (0b100_0001, [Some(("+6 V analog MB", Current)), Some(("+6 V ana", Voltage(Analog6)))]),
    (0b000_1010, [Some(("+16 V MB", Current)), Some(("+16 V", Voltage(Plus16)))]),
    (0b000_0011, [None, Some(("+12 V", Voltage(Plus12)))]),
    (0b010_0100, [Some(("-16 V MB", Current)), Some(("-16 V", Voltage(Minus16)))]),
    (0b110_0010, [Some(("+16 V R1 FE", Current)), Some(("+16 V", Voltage(Plus16)))]),
    (0b001_0010, [Some(("+16 V R2 FE", Current)), Some(("+16 V", Voltage(Plus16)))]),
    (0b101_0010, [Some(("+16 V R1 BE", Current)), Some(("+16 V", Voltage(Plus16)))]),
    (0b011_0010, [Some(("+16 V R2 BE", Current)), Some(("+16 V", Voltage(Plus16)))]),
    (0b111_0010, [Some(("+16 V LDROs", Current)), Some(("+16 V", Voltage(Plus16)))]),
    (0b100_1001, [Some(("+6 V R1 FE", Current)), Some(("+6 V ana", Voltage(Analog6)))]),
    (0b010_1001, [Some(("+6 V R2 FE", Current)), Some(("+6 V ana", Voltage(Analog6)))]),
    (0b110_1100, [Some(("-16 V R1 FE", Current)), Some(("-16 V", Voltage(Minus16)))]),
    (0b001_1100, [Some(("-16 V R2 FE", Current)), Some(("-16 V", Voltage(Minus16)))]),
    (0b101_1100, [Some(("-16 V R1 BE", Current)), Some(("-16 V", Voltage(Minus16)))]),
    (0b011_1100, [Some(("-16 V R2 BE", Current)), Some(("-16 V", Voltage(Minus16)))]),
];

/// Select bytes for latch 1. Bits 0-2 pick the thermistor, bits 3-6 the detector.
const DETECTOR_POINTS: [(u8, Readings); 4] = [
    (0b000_0000, [Some(("R1 E-plane", Detector)), Some(("R1 RF plate", Temperature))]),
    (0b100_0001, [Some(("R2 E-plane", Detector)), Some(("R2 RF plate", Temperature))]),
    (0b010_0010, [Some(("R1 H-plane", Detector)), Some(("BE plate", Temperature))]),
    (0b110_0000, [Some(("R2 H-plane", Detector)), None]),
];

/// The monitor points, numbered from 1 through the current bank and then the detector bank
/// # Errors
/// Returns an error if the table is inconsistent
pub fn monitor_table() -> Result<MonitorTable, Error> {
    let banks = [
        (CURRENT_BANK, &CURRENT_POINTS[..]),
        (DETECTOR_BANK, &DETECTOR_POINTS[..]),
    ];
    let points = banks
        .iter()
        .flat_map(|(bank, points)| points.iter().map(move |p| (*bank, p)))
        .zip(1u8..)
        .map(|((bank, (select, readings)), index)| {
            MonitorPoint::new(index, bank, &[*select], readings)
        })
        .collect();
    MonitorTable::new(points, CALIBRATIONS)
}

/// Latch group and bit of the I/Q hybrid of `pol` in `chain` and `band`
#[must_use]
pub const fn sideband_bit(chain: Chain, band: SubBand, pol: Pol) -> (u8, u8) {
    let low = band.index() < 2;
    let group = match (chain, low) {
        (Chain::R1, true) => 1,
        (Chain::R1, false) => 2,
        (Chain::R2, true) => 3,
        (Chain::R2, false) => 4,
    };
    let within = if low { band.index() } else { band.index() - 2 };
    (group, 2 * within + pol.index())
}

pub fn build<T>(bus: &Arc<Mutex<T>>, config: &BoardConfig) -> Result<Devices<T>, Error>
where
    T: DigitalIo,
{
    let group = |module, lg| LatchGroup::new(bus, &config.scheme, module, lg, config.timing);

    let crossover = GangedSwitch::new(
        "crossover",
        [
            LatchSwitch::new(
                "crossover-P1",
                Tap::new(group(1, 1)?, BitField::bit(0)?),
                Tap::new(group(1, 4)?, BitField::bit(0)?),
            ),
            LatchSwitch::new(
                "crossover-P2",
                Tap::new(group(1, 1)?, BitField::bit(1)?),
                Tap::new(group(1, 4)?, BitField::bit(1)?),
            ),
        ],
    );

    let mut polarizers = BTreeMap::new();
    for chain in Chain::ALL {
        let lg = match chain {
            Chain::R1 => 2,
            Chain::R2 => 3,
        };
        for band in SubBand::ALL {
            let id = PolarizerId {
                chain,
                band: Some(band),
            };
            let tap = Tap::new(
                group(1, lg)?,
                BitField::bit(polarizer_bit(config.polarizer_wiring, chain, band))?,
            );
            polarizers.insert(
                id,
                LatchSwitch::new(format!("polarizer-{id}"), tap.clone(), tap),
            );
        }
    }

    let mut sideband_hybrids = BTreeMap::new();
    for chain in Chain::ALL {
        for band in SubBand::ALL {
            for pol in Pol::ALL {
                let id = HybridId {
                    chain,
                    band: Some(band),
                    pol,
                };
                let (lg, bit) = sideband_bit(chain, band, pol);
                let tap = Tap::new(group(2, lg)?, BitField::bit(bit)?);
                sideband_hybrids.insert(
                    id,
                    LatchSwitch::new(format!("hybrid-{id}"), tap.clone(), tap),
                );
            }
        }
    }

    let mut pll_locks = BTreeMap::new();
    for band in SubBand::ALL {
        pll_locks.insert(
            band,
            StatusFlag::new(
                format!("PLO-{band}"),
                Tap::new(group(1, 4)?, BitField::bit(2 + band.index())?),
            ),
        );
    }

    Ok(Devices {
        crossover,
        polarizers,
        sideband_hybrids,
        plo_band: None,
        pll_locks,
        monitor: AnalogMonitor::new(bus, monitor_table()?, config.timing)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::BoardConfig,
        devices::{
            Control,
            Polarization,
            Sideband,
        },
        revision::{
            PolarizerWiring,
            Revision,
        },
        transport::mock::WbdcWiring,
    };
    use latchbus::{
        sim::SimulatedBus,
        Timing,
    };

    type Bus = Arc<Mutex<SimulatedBus<WbdcWiring>>>;

    fn board(wiring: PolarizerWiring) -> (Bus, Devices<SimulatedBus<WbdcWiring>>) {
        let bus = Arc::new(Mutex::new(SimulatedBus::new(WbdcWiring::simulated(
            Revision::Wbdc2,
        ))));
        let config = BoardConfig::new(Revision::Wbdc2)
            .with_timing(Timing::none())
            .with_polarizer_wiring(wiring);
        let devices = build(&bus, &config).unwrap();
        (bus, devices)
    }

    #[test]
    fn test_device_counts() {
        let (_, devices) = board(PolarizerWiring::Mirrored);
        assert_eq!(devices.polarizers.len(), 10);
        assert_eq!(devices.sideband_hybrids.len(), 20);
        assert_eq!(devices.pll_locks.len(), 5);
        assert!(devices.plo_band.is_none());
        assert_eq!(devices.monitor.table().points().len(), 20);
    }

    #[test]
    fn test_sideband_bits() {
        assert_eq!(sideband_bit(Chain::R1, SubBand::B18, Pol::P1), (1, 0));
        assert_eq!(sideband_bit(Chain::R1, SubBand::B20, Pol::P2), (1, 3));
        assert_eq!(sideband_bit(Chain::R1, SubBand::B22, Pol::P1), (2, 0));
        assert_eq!(sideband_bit(Chain::R2, SubBand::B26, Pol::P2), (4, 5));
        assert_eq!(sideband_bit(Chain::R2, SubBand::B20, Pol::P1), (3, 2));
    }

    #[test]
    fn test_mirrored_polarizers() {
        let (bus, devices) = board(PolarizerWiring::Mirrored);
        let r1_18 = &devices.polarizers[&PolarizerId {
            chain: Chain::R1,
            band: Some(SubBand::B18),
        }];
        let r2_18 = &devices.polarizers[&PolarizerId {
            chain: Chain::R2,
            band: Some(SubBand::B18),
        }];
        assert_eq!(
            r1_18.set_state(Polarization::Circular).unwrap(),
            Polarization::Circular
        );
        assert_eq!(
            r2_18.set_state(Polarization::Circular).unwrap(),
            Polarization::Circular
        );
        assert_eq!(bus.lock().unwrap().latch(9), 0b1_0000);
        assert_eq!(bus.lock().unwrap().latch(10), 0b0_0001);
    }

    #[test]
    fn test_ascending_polarizers() {
        let (bus, devices) = board(PolarizerWiring::Ascending);
        let r1_18 = &devices.polarizers[&PolarizerId {
            chain: Chain::R1,
            band: Some(SubBand::B18),
        }];
        r1_18.set_state(Polarization::Circular).unwrap();
        assert_eq!(bus.lock().unwrap().latch(9), 0b0_0001);
    }

    #[test]
    fn test_sideband_hybrids_on_second_module() {
        let (bus, devices) = board(PolarizerWiring::Mirrored);
        let id = HybridId {
            chain: Chain::R2,
            band: Some(SubBand::B24),
            pol: Pol::P2,
        };
        assert_eq!(
            devices.sideband_hybrids[&id].set_state(Sideband::IQ).unwrap(),
            Sideband::IQ
        );
        assert_eq!(bus.lock().unwrap().latch(163), 0b1000);
        assert_eq!(
            devices.sideband_hybrids[&id].set_state(Sideband::LU).unwrap(),
            Sideband::LU
        );
        assert_eq!(bus.lock().unwrap().latch(163), 0);
    }

    #[test]
    fn test_pll_locks() {
        let (bus, devices) = board(PolarizerWiring::Mirrored);
        assert!(devices.pll_locks[&SubBand::B22].is_set().unwrap());
        bus.lock()
            .unwrap()
            .wiring_mut()
            .set_lock(SubBand::B22, false);
        assert!(!devices.pll_locks[&SubBand::B22].is_set().unwrap());
        assert!(devices.pll_locks[&SubBand::B26].is_set().unwrap());
    }

    #[test]
    fn test_calibrations() {
        let table = monitor_table().unwrap();
        let close = |a: f64, b: f64| (a - b).abs() < 1e-9;
        assert!(close(table.convert("+16 V R1 FE", 0.126).unwrap(), 0.1));
        assert_eq!(
            table.convert("+6 V digitalMB", 0.5).unwrap(),
            table.convert("+16 V MB", 0.5).unwrap()
        );
        assert!(table.convert("+6 V digital MB", 0.5).is_err());
        assert!(close(table.convert("-16 V", 1.0).unwrap(), -10.5446));
        assert!(close(table.convert("+12 V", 1.0).unwrap(), 10.5827));
        assert!(close(
            table.convert("R1 E-plane", 1.004).unwrap(),
            2.0064
        ));
        assert!(close(
            table.convert("BE plate", 0.7610725).unwrap(),
            23.549481
        ));
    }
}
