//! The core types for monitor and control of a whole down converter
use crate::{
    devices::{
        monitor::{
            AnalogMonitor,
            MonitorData,
        },
        Control,
        Crossover,
        Error,
        PloBand,
        Polarization,
        Sideband,
    },
    revision::{
        self,
        Devices,
        HybridId,
        PolarizerId,
        PolarizerWiring,
        Revision,
        SubBand,
    },
};
use latchbus::{
    drive_idle,
    AddressScheme,
    DigitalIo,
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
    error,
    info,
};

/// Everything needed to build a board besides the adapter
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BoardConfig {
    pub revision: Revision,
    pub scheme: AddressScheme,
    pub timing: Timing,
    /// Only used by WBDC2
    pub polarizer_wiring: PolarizerWiring,
}

impl BoardConfig {
    /// The standard configuration of `revision`
    #[must_use]
    pub fn new(revision: Revision) -> Self {
        Self {
            revision,
            scheme: match revision {
                Revision::Wbdc1 => AddressScheme::WBDC1,
                Revision::Wbdc2 => AddressScheme::WBDC2,
            },
            timing: Timing::default(),
            polarizer_wiring: PolarizerWiring::default(),
        }
    }

    #[must_use]
    pub fn with_scheme(mut self, scheme: AddressScheme) -> Self {
        self.scheme = scheme;
        self
    }

    #[must_use]
    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    #[must_use]
    pub fn with_polarizer_wiring(mut self, wiring: PolarizerWiring) -> Self {
        self.polarizer_wiring = wiring;
        self
    }
}

/// A Wide Band Down Converter.
/// This owns the adapter, every device holds a weak reference to it.
pub struct Wbdc<T> {
    bus: Arc<Mutex<T>>,
    config: BoardConfig,
    devices: Devices<T>,
}

/// Logs and passes through the result of one device in a batch
fn logged<S>(device: impl std::fmt::Display, result: Result<S, Error>) -> Result<S, Error> {
    if let Err(e) = &result {
        error!(%device, "{e}");
    }
    result
}

impl<T> Wbdc<T>
where
    T: DigitalIo,
{
    /// Takes ownership of `io`, drives the serial lines idle and builds every device
    /// # Errors
    /// Returns an error if the adapter fails or the configuration doesn't fit the board
    pub fn new(io: T, config: BoardConfig) -> Result<Self, Error> {
        let bus = Arc::new(Mutex::new(io));
        {
            let mut io = bus.lock().map_err(|_| latchbus::Error::Poisoned)?;
            drive_idle(&mut *io, config.timing)?;
        }
        let devices = revision::build(&bus, &config)?;
        info!(revision = %config.revision, "Down converter ready");
        Ok(Self {
            bus,
            config,
            devices,
        })
    }

    /// The shared adapter
    #[must_use]
    pub fn bus(&self) -> &Arc<Mutex<T>> {
        &self.bus
    }

    #[must_use]
    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    #[must_use]
    pub fn devices(&self) -> &Devices<T> {
        &self.devices
    }

    #[must_use]
    pub fn monitor(&self) -> &AnalogMonitor<T> {
        &self.devices.monitor
    }

    /// # Errors
    /// Returns an error on bus failure or if the two transfer switches disagree
    pub fn get_crossover(&self) -> Result<Crossover, Error> {
        self.devices.crossover.get_state()
    }

    /// Commands both transfer switches and returns the state they report afterwards
    /// # Errors
    /// Returns an error on bus failure or if the two transfer switches disagree
    pub fn set_crossover(&self, state: Crossover) -> Result<Crossover, Error> {
        self.devices.crossover.set_state(state)
    }

    #[must_use]
    pub fn get_polarizers(&self) -> BTreeMap<PolarizerId, Result<Polarization, Error>> {
        self.devices
            .polarizers
            .iter()
            .map(|(id, p)| (*id, logged(id, p.get_state())))
            .collect()
    }

    /// # Errors
    /// Returns an error if there is no polarizer `id` or it can't be set
    pub fn set_polarizer(
        &self,
        id: PolarizerId,
        state: Polarization,
    ) -> Result<Polarization, Error> {
        self.devices
            .polarizers
            .get(&id)
            .ok_or_else(|| Error::Config(format!("there is no polarizer {id}")))?
            .set_state(state)
    }

    /// Sets every polarization hybrid, carrying on past failures
    pub fn set_polarizers(
        &self,
        state: Polarization,
    ) -> BTreeMap<PolarizerId, Result<Polarization, Error>> {
        self.devices
            .polarizers
            .iter()
            .map(|(id, p)| (*id, logged(id, p.set_state(state))))
            .collect()
    }

    #[must_use]
    pub fn get_sideband_hybrids(&self) -> BTreeMap<HybridId, Result<Sideband, Error>> {
        self.devices
            .sideband_hybrids
            .iter()
            .map(|(id, h)| (*id, logged(id, h.get_state())))
            .collect()
    }

    /// # Errors
    /// Returns an error if there is no hybrid `id` or it can't be set
    pub fn set_sideband_hybrid(&self, id: HybridId, state: Sideband) -> Result<Sideband, Error> {
        self.devices
            .sideband_hybrids
            .get(&id)
            .ok_or_else(|| Error::Config(format!("there is no hybrid {id}")))?
            .set_state(state)
    }

    /// Sets every I/Q hybrid, carrying on past failures
    pub fn set_sideband_separation(
        &self,
        state: Sideband,
    ) -> BTreeMap<HybridId, Result<Sideband, Error>> {
        self.devices
            .sideband_hybrids
            .iter()
            .map(|(id, h)| (*id, logged(id, h.set_state(state))))
            .collect()
    }

    /// # Errors
    /// Returns [`Error::Unsupported`] on a WBDC2, otherwise as [`Control::get_state`]
    pub fn get_band(&self) -> Result<PloBand, Error> {
        self.devices
            .plo_band
            .as_ref()
            .ok_or(Error::Unsupported("PLO band select"))?
            .get_state()
    }

    /// # Errors
    /// Returns [`Error::Unsupported`] on a WBDC2, otherwise as [`Control::set_state`]
    pub fn set_band(&self, band: PloBand) -> Result<PloBand, Error> {
        self.devices
            .plo_band
            .as_ref()
            .ok_or(Error::Unsupported("PLO band select"))?
            .set_state(band)
    }

    #[must_use]
    pub fn pll_locks(&self) -> BTreeMap<SubBand, Result<bool, Error>> {
        self.devices
            .pll_locks
            .iter()
            .map(|(band, flag)| (*band, logged(flag.name(), flag.is_set())))
            .collect()
    }

    /// Reads every analog monitor point
    #[must_use]
    pub fn get_monitor_data(&self) -> MonitorData {
        self.devices.monitor.get_monitor_data()
    }

    /// # Errors
    /// Returns an error if no monitor output carries `label`
    pub fn convert(&self, label: &str, raw: f64) -> Result<f64, Error> {
        self.devices.monitor.convert(label, raw)
    }
}
