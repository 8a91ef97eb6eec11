//! WBDC1: one digital module at 80, two PLO bands.
//!
//! LG1 (80) carries most of the control bits:
//!
//! | bit | function                                  |
//! |-----|-------------------------------------------|
//! | 0   | feed crossover, both transfer switches    |
//! | 1-2 | R1 polarizers, `01` circular, `10` linear |
//! | 3-4 | R2 polarizers, `10` circular, `01` linear |
//! | 5   | PLO band, 0 for 22 GHz, 1 for 24 GHz      |
//!
//! LG2 (81) holds the four I/Q hybrid pairs. The polarizer tell-tales are read at 86 and the
//! crossover tell-tales, PLO locks and band sense at 87.

use super::{
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
                Temperature,
                Voltage,
            },
            Linear,
            MonitorPoint,
            MonitorTable,
            Rail,
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

/// Select latches 0 (current and voltage) and 2 (thermistor), read on AIN0-AIN2
pub const BANK: AnalogBank = AnalogBank {
    selects: &[0, 2],
    channels: &[0, 1, 2],
};

pub const CALIBRATIONS: Calibrations = Calibrations {
    current: Linear {
        offset: 0.004,
        scale: 1.0,
    },
    temperature: Linear {
        offset: 0.16,
        scale: 20.0,
    },
    // No RF detectors on this board
    detector: Linear::scale(1.0),
    digital6: Linear::scale(4.0211),
    analog6: Linear::scale(4.0211),
    plus12: Linear::scale(10.5542),
    plus16: Linear::scale(10.5542),
    minus16: Linear::scale(10.5542),
};

type Readings = [Option<(&'static str, Category)>; 3];

const POINTS: [([u8; 2], Readings); 8] = [
    (
        [0b0000_0000, 0b0000_0000],
        [
            Some(("+6V DC I", Current)),
            Some(("+6V DC V", Voltage(Rail::Digital6))),
            None,
        ],
    ),
    (
        [0b0000_1001, 0b0001_0000],
        [
            Some(("+6V AC I", Current)),
            Some(("+6V AC V", Voltage(Rail::Analog6))),
            None,
        ],
    ),
    (
        [0b0001_0100, 0b0010_0000],
        [
            Some(("-16V DC I", Current)),
            Some(("-16V AC V", Voltage(Rail::Minus16))),
            Some(("Air", Temperature)),
        ],
    ),
    (
        [0b0101_1011, 0b0011_0000],
        [
            Some(("+16V I RF1", Current)),
            Some(("+12V V", Voltage(Rail::Plus12))),
            None,
        ],
    ),
    (
        [0b0110_0010, 0b0100_0000],
        [
            Some(("+16V I RF2", Current)),
            Some(("+16V V", Voltage(Rail::Plus16))),
            Some(("RF 1 Plate", Temperature)),
        ],
    ),
    (
        [0b1010_0000, 0b0101_0000],
        [
            Some(("+16V I IF1", Current)),
            None,
            Some(("RF 2 Plate", Temperature)),
        ],
    ),
    (
        [0b1010_1000, 0b0110_0000],
        [
            Some(("+16V I IF2", Current)),
            None,
            Some(("Box Wall", Temperature)),
        ],
    ),
    (
        [0b0000_0000, 0b0111_0000],
        [None, None, Some(("LDROs", Temperature))],
    ),
];

/// The eight monitor points, numbered from 1
/// # Errors
/// Returns an error if the table is inconsistent
pub fn monitor_table() -> Result<MonitorTable, Error> {
    let points = POINTS
        .iter()
        .zip(1u8..)
        .map(|((select, readings), index)| MonitorPoint::new(index, BANK, select, readings))
        .collect();
    MonitorTable::new(points, CALIBRATIONS)
}

/// Command field and tell-tale field of the polarizer pair of `chain`
fn polarizer_fields(chain: Chain) -> Result<(BitField, BitField), Error> {
    Ok(match chain {
        Chain::R1 => (
            BitField::pattern(0b0_0110, 0b0_0010, 0b0_0100)?,
            BitField::pattern(0x0F, 0b0101, 0b1010)?,
        ),
        Chain::R2 => (
            BitField::pattern(0b1_1000, 0b1_0000, 0b0_1000)?,
            BitField::pattern(0xF0, 0b1010_0000, 0b0101_0000)?,
        ),
    })
}

/// The two-bit field of the I/Q hybrid pair of `pol` in `chain`, `10` for I/Q and `01` for L/U
fn sideband_field(chain: Chain, pol: Pol) -> Result<BitField, Error> {
    let shift = 2 * (pol.index() + 2 * chain.index());
    BitField::pattern(0b11 << shift, 0b10 << shift, 0b01 << shift)
}

pub fn build<T>(bus: &Arc<Mutex<T>>, config: &BoardConfig) -> Result<Devices<T>, Error>
where
    T: DigitalIo,
{
    let group = |lg| LatchGroup::new(bus, &config.scheme, 1, lg, config.timing);
    let (lg1, lg2, lg3, lg4) = (group(1)?, group(2)?, group(3)?, group(4)?);

    // One control bit drives both transfer switches, each has its own tell-tale
    let crossover = GangedSwitch::new(
        "crossover",
        [
            LatchSwitch::new(
                "crossover-P1",
                Tap::new(lg1.clone(), BitField::bit(0)?),
                Tap::new(lg4.clone(), BitField::bit(0)?),
            ),
            LatchSwitch::new(
                "crossover-P2",
                Tap::new(lg1.clone(), BitField::bit(0)?),
                Tap::new(lg4.clone(), BitField::bit(1)?),
            ),
        ],
    );

    let mut polarizers = BTreeMap::new();
    for chain in Chain::ALL {
        let id = PolarizerId { chain, band: None };
        let (control, sense) = polarizer_fields(chain)?;
        polarizers.insert(
            id,
            LatchSwitch::new(
                format!("polarizer-{id}"),
                Tap::new(lg1.clone(), control),
                Tap::new(lg3.clone(), sense),
            ),
        );
    }

    let mut sideband_hybrids = BTreeMap::new();
    for chain in Chain::ALL {
        for pol in Pol::ALL {
            let id = HybridId {
                chain,
                band: None,
                pol,
            };
            let tap = Tap::new(lg2.clone(), sideband_field(chain, pol)?);
            sideband_hybrids.insert(
                id,
                LatchSwitch::new(format!("hybrid-{id}"), tap.clone(), tap),
            );
        }
    }

    let plo_band = LatchSwitch::new(
        "PLO band",
        Tap::new(lg1, BitField::bit(5)?),
        Tap::new(lg4.clone(), BitField::bit(4)?),
    );

    let mut pll_locks = BTreeMap::new();
    for (band, bit) in [(SubBand::B22, 2), (SubBand::B24, 3)] {
        pll_locks.insert(
            band,
            StatusFlag::new(
                format!("PLO-{band}"),
                Tap::new(lg4.clone(), BitField::bit(bit)?),
            ),
        );
    }

    Ok(Devices {
        crossover,
        polarizers,
        sideband_hybrids,
        plo_band: Some(plo_band),
        pll_locks,
        monitor: AnalogMonitor::new(bus, monitor_table()?, config.timing)?,
    })
}
