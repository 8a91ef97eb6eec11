//! The analog monitor.
//!
//! Supply currents, rail voltages, plate temperatures and RF detector levels are multiplexed onto
//! the analog inputs of the adapter by select latches. A monitor point is one setting of those
//! latches together with the inputs that are meaningful for it.

use super::Error;
use kstring::KString;
use latchbus::{
    DigitalIo,
    LatchGroup,
    Phase,
    Timing,
};
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        Mutex,
    },
};
use tracing::{
    debug,
    warn,
};

/// Supply rails with their own voltage divider
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Rail {
    Digital6,
    Analog6,
    Plus12,
    Plus16,
    Minus16,
}

/// What a monitor output measures, which fixes how it is calibrated
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Category {
    Current,
    Voltage(Rail),
    Temperature,
    Detector,
}

/// `(raw - offset) * scale`
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Linear {
    pub offset: f64,
    pub scale: f64,
}

impl Linear {
    #[must_use]
    pub const fn scale(scale: f64) -> Self {
        Self { offset: 0.0, scale }
    }

    #[must_use]
    pub fn apply(&self, raw: f64) -> f64 {
        (raw - self.offset) * self.scale
    }
}

/// Calibration of every category of a board
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Calibrations {
    pub current: Linear,
    pub temperature: Linear,
    pub detector: Linear,
    pub digital6: Linear,
    pub analog6: Linear,
    pub plus12: Linear,
    pub plus16: Linear,
    pub minus16: Linear,
}

impl Calibrations {
    #[must_use]
    pub fn linear(&self, category: Category) -> Linear {
        match category {
            Category::Current => self.current,
            Category::Temperature => self.temperature,
            Category::Detector => self.detector,
            Category::Voltage(Rail::Digital6) => self.digital6,
            Category::Voltage(Rail::Analog6) => self.analog6,
            Category::Voltage(Rail::Plus12) => self.plus12,
            Category::Voltage(Rail::Plus16) => self.plus16,
            Category::Voltage(Rail::Minus16) => self.minus16,
        }
    }
}

/// A set of select latches and the analog inputs they route signals to
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AnalogBank {
    /// Write addresses of the select latches
    pub selects: &'static [u8],
    /// Analog inputs fed by this bank
    pub channels: &'static [u8],
}

/// One analog input of a monitor point
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub channel: u8,
    pub label: KString,
    pub category: Category,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorPoint {
    pub index: u8,
    pub bank: AnalogBank,
    /// One byte for each select latch of the bank
    pub select: Vec<u8>,
    pub outputs: Vec<Output>,
}

impl MonitorPoint {
    /// A point of `bank` with outputs given as `(label, category)` per bank channel. Channels with
    /// no label are not read.
    #[must_use]
    pub fn new(
        index: u8,
        bank: AnalogBank,
        select: &[u8],
        outputs: &[Option<(&'static str, Category)>],
    ) -> Self {
        let outputs = bank
            .channels
            .iter()
            .zip(outputs)
            .filter_map(|(channel, output)| {
                output.map(|(label, category)| Output {
                    channel: *channel,
                    label: KString::from_static(label),
                    category,
                })
            })
            .collect();
        Self {
            index,
            bank,
            select: select.to_vec(),
            outputs,
        }
    }
}

/// The monitor points of a board and the calibrations that go with them
#[derive(Debug, Clone)]
pub struct MonitorTable {
    points: Vec<MonitorPoint>,
    categories: BTreeMap<KString, Category>,
    calibrations: Calibrations,
}

impl MonitorTable {
    /// # Errors
    /// Returns an error if the table is empty, a point doesn't match its bank, a label is empty,
    /// an index is repeated, or one label is used for two different categories
    pub fn new(points: Vec<MonitorPoint>, calibrations: Calibrations) -> Result<Self, Error> {
        if points.is_empty() {
            return Err(Error::Config("the monitor table has no points".into()));
        }
        let mut categories = BTreeMap::new();
        let mut seen = vec![];
        for point in &points {
            if seen.contains(&point.index) {
                return Err(Error::Config(format!(
                    "monitor point {} appears twice",
                    point.index
                )));
            }
            seen.push(point.index);
            if point.bank.selects.is_empty() || point.select.len() != point.bank.selects.len() {
                return Err(Error::Config(format!(
                    "monitor point {} needs {} select byte(s)",
                    point.index,
                    point.bank.selects.len()
                )));
            }
            for output in &point.outputs {
                if output.label.trim().is_empty() {
                    return Err(Error::Config(format!(
                        "monitor point {} has an unlabelled output",
                        point.index
                    )));
                }
                if !point.bank.channels.contains(&output.channel) {
                    return Err(Error::Config(format!(
                        "monitor point {} reads AIN{}, which its bank doesn't feed",
                        point.index, output.channel
                    )));
                }
                match categories.insert(output.label.clone(), output.category) {
                    Some(previous) if previous != output.category => {
                        return Err(Error::Config(format!(
                            "{} is both {previous:?} and {:?}",
                            output.label, output.category
                        )));
                    }
                    _ => (),
                }
            }
        }
        Ok(Self {
            points,
            categories,
            calibrations,
        })
    }

    #[must_use]
    pub fn points(&self) -> &[MonitorPoint] {
        &self.points
    }

    #[must_use]
    pub fn point(&self, index: u8) -> Option<&MonitorPoint> {
        self.points.iter().find(|p| p.index == index)
    }

    #[must_use]
    pub fn calibrations(&self) -> &Calibrations {
        &self.calibrations
    }

    /// Converts a raw reading of the output labelled `label` to engineering units
    /// # Errors
    /// Returns an error if no output carries `label`
    pub fn convert(&self, label: &str, raw: f64) -> Result<f64, Error> {
        let category = self
            .categories
            .get(label)
            .ok_or_else(|| Error::UnknownLabel(label.to_owned()))?;
        Ok(self.calibrations.linear(*category).apply(raw))
    }
}

/// The result of a sweep over every monitor point
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MonitorData {
    /// Converted readings by label
    pub values: BTreeMap<KString, f64>,
    /// Point index and label of every output that could not be read
    pub failed: Vec<(u8, KString)>,
}

pub struct AnalogMonitor<T> {
    table: MonitorTable,
    selects: BTreeMap<u8, LatchGroup<T>>,
}

impl<T> AnalogMonitor<T>
where
    T: DigitalIo,
{
    /// # Errors
    /// Returns an error if a select latch address is a read-mode address
    pub fn new(bus: &Arc<Mutex<T>>, table: MonitorTable, timing: Timing) -> Result<Self, Error> {
        let mut selects = BTreeMap::new();
        for point in table.points() {
            for address in point.bank.selects {
                if !selects.contains_key(address) {
                    selects.insert(*address, LatchGroup::at_address(bus, *address, timing)?);
                }
            }
        }
        Ok(Self { table, selects })
    }

    #[must_use]
    pub fn table(&self) -> &MonitorTable {
        &self.table
    }

    fn lookup(&self, index: u8) -> Result<&MonitorPoint, Error> {
        self.table
            .point(index)
            .ok_or_else(|| Error::Config(format!("there is no monitor point {index}")))
    }

    fn with_bus<R, F>(&self, f: F) -> Result<R, Error>
    where
        F: FnOnce(&mut T) -> Result<R, latchbus::Error>,
    {
        // The table is never empty and every point has a select latch
        let group = self
            .selects
            .values()
            .next()
            .ok_or_else(|| Error::Config("the monitor has no select latches".into()))?;
        Ok(group.with_bus(f)?)
    }

    fn select_with(&self, io: &mut T, point: &MonitorPoint) -> Result<(), latchbus::Error> {
        for (address, byte) in point.bank.selects.iter().zip(&point.select) {
            if let Some(group) = self.selects.get(address) {
                group.write_with(io, *byte)?;
            }
        }
        Ok(())
    }

    /// Routes monitor point `index` to the analog inputs
    /// # Errors
    /// Returns an error if there is no such point or a latch write fails
    pub fn select(&self, index: u8) -> Result<(), Error> {
        let point = self.lookup(index)?;
        self.with_bus(|io| self.select_with(io, point))
    }

    /// Selects point `index` and reads each of its outputs, as `(channel, volts)` pairs.
    /// The bus is held from the select until the last reading. An input that fails to read
    /// doesn't stop the others from being read.
    /// # Errors
    /// Returns an error if there is no such point or the select fails
    pub fn read_raw(&self, index: u8) -> Result<Vec<(u8, Result<f64, Error>)>, Error> {
        let point = self.lookup(index)?;
        self.with_bus(|io| {
            self.select_with(io, point)?;
            Ok(point
                .outputs
                .iter()
                .map(|output| {
                    let reading = io.read_analog(output.channel).map_err(|source| {
                        Error::Bus(latchbus::Error::Adapter {
                            phase: Phase::Analog(output.channel),
                            source,
                        })
                    });
                    (output.channel, reading)
                })
                .collect())
        })
    }

    /// Converts a raw reading of the output labelled `label`
    /// # Errors
    /// Returns an error if no output carries `label`
    pub fn convert(&self, label: &str, raw: f64) -> Result<f64, Error> {
        self.table.convert(label, raw)
    }

    /// Reads and converts every monitor point. Outputs that fail are listed in
    /// [`MonitorData::failed`] and the sweep carries on.
    #[must_use]
    pub fn get_monitor_data(&self) -> MonitorData {
        let mut data = MonitorData::default();
        for point in self.table.points() {
            let readings = match self.read_raw(point.index) {
                Ok(readings) => readings,
                Err(e) => {
                    warn!(point = point.index, "Skipping monitor point: {e}");
                    data.failed.extend(
                        point
                            .outputs
                            .iter()
                            .map(|output| (point.index, output.label.clone())),
                    );
                    continue;
                }
            };
            for (output, (_, reading)) in point.outputs.iter().zip(readings) {
                match reading {
                    Ok(raw) => {
                        let value = self.table.calibrations.linear(output.category).apply(raw);
                        debug!(label = output.label.as_str(), raw, value, "Monitor reading");
                        data.values.insert(output.label.clone(), value);
                    }
                    Err(e) => {
                        warn!(
                            point = point.index,
                            label = output.label.as_str(),
                            "Skipping monitor output: {e}"
                        );
                        data.failed.push((point.index, output.label.clone()));
                    }
                }
            }
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use latchbus::sim::{
        Latches,
        SimulatedBus,
        Wiring,
    };

    const BANK: AnalogBank = AnalogBank {
        selects: &[0, 2],
        channels: &[0, 1, 2],
    };

    const CALS: Calibrations = Calibrations {
        current: Linear {
            offset: 0.004,
            scale: 1.0,
        },
        temperature: Linear {
            offset: 0.16,
            scale: 20.0,
        },
        detector: Linear::scale(1.0),
        digital6: Linear::scale(4.0211),
        analog6: Linear::scale(4.0211),
        plus12: Linear::scale(10.5542),
        plus16: Linear::scale(10.5542),
        minus16: Linear::scale(10.5542),
    };

    /// Each input shows the sum of the select latches plus a tenth of its channel number
    struct Echo;

    impl Wiring for Echo {
        fn analog(&self, latches: &Latches, channel: u8) -> f64 {
            f64::from(latches[0]) + f64::from(latches[2]) + f64::from(channel) / 10.0
        }
    }

    fn table() -> MonitorTable {
        MonitorTable::new(
            vec![
                MonitorPoint::new(
                    1,
                    BANK,
                    &[1, 0],
                    &[
                        Some(("+6V I", Category::Current)),
                        Some(("+6V V", Category::Voltage(Rail::Digital6))),
                        None,
                    ],
                ),
                MonitorPoint::new(
                    2,
                    BANK,
                    &[2, 1],
                    &[
                        Some(("+16V I", Category::Current)),
                        Some(("+16V V", Category::Voltage(Rail::Plus16))),
                        Some(("Plate", Category::Temperature)),
                    ],
                ),
            ],
            CALS,
        )
        .unwrap()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_conversions() {
        let t = table();
        assert!(close(t.convert("+6V I", 0.5).unwrap(), 0.496));
        assert!(close(t.convert("+16V V", 1.0).unwrap(), 10.5542));
        assert!(close(t.convert("+6V V", 1.0).unwrap(), 4.0211));
        assert!(close(t.convert("Plate", 1.16).unwrap(), 20.0));
        assert!(matches!(
            t.convert("-5V V", 1.0),
            Err(Error::UnknownLabel(_))
        ));
    }

    #[test]
    fn test_bad_tables() {
        let conflicting = MonitorTable::new(
            vec![
                MonitorPoint::new(1, BANK, &[0, 0], &[Some(("x", Category::Current))]),
                MonitorPoint::new(2, BANK, &[1, 0], &[Some(("x", Category::Temperature))]),
            ],
            CALS,
        );
        assert!(matches!(conflicting, Err(Error::Config(_))));
        let short_select = MonitorTable::new(
            vec![MonitorPoint::new(1, BANK, &[0], &[Some(("x", Category::Current))])],
            CALS,
        );
        assert!(matches!(short_select, Err(Error::Config(_))));
        let blank = MonitorTable::new(
            vec![MonitorPoint::new(1, BANK, &[0, 0], &[Some((" ", Category::Current))])],
            CALS,
        );
        assert!(matches!(blank, Err(Error::Config(_))));
        assert!(MonitorTable::new(vec![], CALS).is_err());
    }

    #[test]
    fn test_read_raw() {
        let bus = Arc::new(Mutex::new(SimulatedBus::new(Echo)));
        let monitor = AnalogMonitor::new(&bus, table(), Timing::none()).unwrap();
        monitor.select(2).unwrap();
        assert_eq!(bus.lock().unwrap().latch(0), 2);
        assert_eq!(bus.lock().unwrap().latch(2), 1);
        let raw = monitor.read_raw(1).unwrap();
        assert_eq!(raw.len(), 2);
        assert_eq!(raw[0].0, 0);
        assert!(close(*raw[0].1.as_ref().unwrap(), 1.0));
        assert!(close(*raw[1].1.as_ref().unwrap(), 1.1));
        assert!(monitor.read_raw(9).is_err());
    }

    #[test]
    fn test_read_raw_keeps_good_inputs() {
        let bus = Arc::new(Mutex::new(SimulatedBus::new(Echo)));
        let monitor = AnalogMonitor::new(&bus, table(), Timing::none()).unwrap();
        bus.lock().unwrap().fail_analog(1);
        let raw = monitor.read_raw(2).unwrap();
        assert_eq!(raw.len(), 3);
        assert!(close(*raw[0].1.as_ref().unwrap(), 3.0));
        assert!(matches!(
            raw[1],
            (
                1,
                Err(Error::Bus(latchbus::Error::Adapter {
                    phase: Phase::Analog(1),
                    ..
                }))
            )
        ));
        assert!(close(*raw[2].1.as_ref().unwrap(), 3.2));
    }

    #[test]
    fn test_failed_select_fails_every_output() {
        let bus = Arc::new(Mutex::new(SimulatedBus::new(Echo)));
        let monitor = AnalogMonitor::new(&bus, table(), Timing::none()).unwrap();
        bus.lock().unwrap().disconnect();
        let data = monitor.get_monitor_data();
        assert!(data.values.is_empty());
        assert_eq!(data.failed.len(), 5);
        assert_eq!(data.failed[0], (1, KString::from_static("+6V I")));
        assert_eq!(data.failed[4], (2, KString::from_static("Plate")));
    }

    #[test]
    fn test_sweep_continues_past_failures() {
        let bus = Arc::new(Mutex::new(SimulatedBus::new(Echo)));
        let monitor = AnalogMonitor::new(&bus, table(), Timing::none()).unwrap();
        bus.lock().unwrap().fail_analog(2);
        let data = monitor.get_monitor_data();
        assert_eq!(data.failed, vec![(2, KString::from_static("Plate"))]);
        assert_eq!(data.values.len(), 4);
        assert!(close(data.values["+6V I"], 1.0 - 0.004));
        assert!(close(data.values["+16V I"], 3.0 - 0.004));
        assert!(close(data.values["+16V V"], 3.1 * 10.5542));
        assert!(close(data.values["+6V V"], 1.1 * 4.0211));
        bus.lock().unwrap().repair_analog(2);
        let data = monitor.get_monitor_data();
        assert!(data.failed.is_empty());
        assert!(close(data.values["Plate"], (3.2 - 0.16) * 20.0));
    }
}
