//! A simulated latch board behind a simulated digital IO adapter.
//!
//! The simulation works at the level of individual line edges, so a transfer only succeeds if
//! the lines are driven in the right order. Rising SCK with CS-BUS low shifts the register, the
//! rising edge of CS-BUS commits a write, and the falling edge of NLOAD captures a readback.

use crate::{
    address::READ_BIT,
    io::{
        AdapterError,
        DigitalIo,
        Port,
        Signal,
    },
};
use std::collections::HashSet;

/// The contents of every write-mode latch
pub type Latches = [u8; 256];

/// How the status inputs and analog channels of a simulated board are wired
pub trait Wiring: Send {
    /// The byte the board presents at read address `address`
    fn readback(&self, latches: &Latches, address: u8) -> u8 {
        latches[usize::from(address & !READ_BIT)]
    }

    /// The voltage on analog input `channel`
    fn analog(&self, _latches: &Latches, _channel: u8) -> f64 {
        0.0
    }
}

/// Every read address echoes the commanded byte of its write latch
#[derive(Debug, Default, Copy, Clone)]
pub struct Loopback;

impl Wiring for Loopback {}

/// An operation performed on the adapter
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Event {
    Write(Signal, bool),
    ReadPort(Port),
    ReadInput(Signal),
    ReadAnalog(u8),
}

// SCK, SDI, NLOAD and CS-BUS are pulled up on the motherboard
const IDLE_LINES: u32 = 0b1111 << 16;

#[derive(Debug)]
struct WriteFault {
    line: Signal,
    remaining: usize,
}

#[derive(Debug)]
pub struct SimulatedBus<W = Loopback> {
    wiring: W,
    // Bit n is the level of channel n
    lines: u32,
    latches: Latches,
    shift: u8,
    clocked: u8,
    connected: bool,
    stuck_address: Option<u8>,
    write_faults: Vec<WriteFault>,
    analog_faults: HashSet<u8>,
    trace: Vec<Event>,
}

impl Default for SimulatedBus<Loopback> {
    fn default() -> Self {
        Self::new(Loopback)
    }
}

impl<W> SimulatedBus<W>
where
    W: Wiring,
{
    pub fn new(wiring: W) -> Self {
        Self {
            wiring,
            lines: IDLE_LINES,
            latches: [0; 256],
            shift: 0,
            clocked: 0,
            connected: true,
            stuck_address: None,
            write_faults: vec![],
            analog_faults: HashSet::new(),
            trace: vec![],
        }
    }

    #[must_use]
    pub fn wiring(&self) -> &W {
        &self.wiring
    }

    pub fn wiring_mut(&mut self) -> &mut W {
        &mut self.wiring
    }

    /// The last byte committed to the write latch at `address`
    #[must_use]
    pub fn latch(&self, address: u8) -> u8 {
        self.latches[usize::from(address)]
    }

    /// Preloads a latch, as if some earlier client had written it
    pub fn set_latch(&mut self, address: u8, byte: u8) {
        self.latches[usize::from(address)] = byte;
    }

    #[must_use]
    pub fn latches(&self) -> &Latches {
        &self.latches
    }

    /// Current level of `line` as last driven
    #[must_use]
    pub fn level(&self, line: Signal) -> bool {
        self.lines & (1 << line.channel()) != 0
    }

    #[must_use]
    pub fn trace(&self) -> &[Event] {
        &self.trace
    }

    /// Returns the trace and starts a new one
    pub fn take_trace(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.trace)
    }

    /// The `n`th write to `line` from now on (counting from 1) fails with a timeout.
    /// An `n` of 0 fails the very next write, same as 1.
    pub fn fail_nth_write(&mut self, line: Signal, n: usize) {
        self.write_faults.push(WriteFault {
            line,
            remaining: n.max(1),
        });
    }

    /// Pins the address lines at `address`, or frees them with `None`
    pub fn stick_address(&mut self, address: Option<u8>) {
        self.stuck_address = address;
    }

    /// Every operation fails until [`SimulatedBus::reconnect`]
    pub fn disconnect(&mut self) {
        self.connected = false;
    }

    pub fn reconnect(&mut self) {
        self.connected = true;
    }

    /// Reads of analog `channel` fail with a device error
    pub fn fail_analog(&mut self, channel: u8) {
        self.analog_faults.insert(channel);
    }

    pub fn repair_analog(&mut self, channel: u8) {
        self.analog_faults.remove(&channel);
    }

    fn check_connected(&self) -> Result<(), AdapterError> {
        if self.connected {
            Ok(())
        } else {
            Err(AdapterError::Disconnected)
        }
    }

    fn port_bits(&self, port: Port) -> u8 {
        ((self.lines >> port.first_channel()) & 0xFF) as u8
    }

    /// What the board sees on A0-A7
    fn address(&self) -> u8 {
        self.stuck_address
            .unwrap_or_else(|| self.port_bits(Port::Eio))
    }

    fn edge(&mut self, line: Signal, rising: bool) {
        let selected = !self.level(Signal::CsBus);
        let address = self.address();
        match (line, rising) {
            (Signal::Sck, true) if selected => {
                if address & READ_BIT == 0 {
                    self.shift = (self.shift << 1) | u8::from(self.level(Signal::Sdi));
                    self.clocked = self.clocked.saturating_add(1);
                } else {
                    self.shift <<= 1;
                }
            }
            (Signal::CsBus, true) => {
                if address & READ_BIT == 0 && self.clocked > 0 {
                    self.latches[usize::from(address)] = self.shift;
                }
                self.clocked = 0;
            }
            (Signal::CsBus, false) => self.clocked = 0,
            (Signal::NLoad, false) if !selected => {
                self.shift = self.wiring.readback(&self.latches, address);
            }
            _ => (),
        }
    }
}

impl<W> DigitalIo for SimulatedBus<W>
where
    W: Wiring,
{
    fn write_bit(&mut self, line: Signal, value: bool) -> Result<(), AdapterError> {
        self.check_connected()?;
        if let Some(i) = self.write_faults.iter().position(|f| f.line == line) {
            let fault = &mut self.write_faults[i];
            fault.remaining = fault.remaining.saturating_sub(1);
            if fault.remaining == 0 {
                self.write_faults.remove(i);
                return Err(AdapterError::Timeout);
            }
        }
        self.trace.push(Event::Write(line, value));
        let before = self.level(line);
        let mask = 1 << line.channel();
        if value {
            self.lines |= mask;
        } else {
            self.lines &= !mask;
        }
        if before != value {
            self.edge(line, value);
        }
        Ok(())
    }

    fn read_port(&mut self, port: Port) -> Result<u8, AdapterError> {
        self.check_connected()?;
        self.trace.push(Event::ReadPort(port));
        Ok(match port {
            Port::Eio => self.address(),
            Port::Fio => {
                let sdo = u8::from(self.shift & 0x80 != 0) << Signal::Sdo.channel();
                (self.port_bits(Port::Fio) & 0x7F) | sdo
            }
            Port::Cio => self.port_bits(Port::Cio),
        })
    }

    fn read_input_bit(&mut self, line: Signal) -> Result<bool, AdapterError> {
        self.check_connected()?;
        self.trace.push(Event::ReadInput(line));
        Ok(match line {
            Signal::Sdo => self.shift & 0x80 != 0,
            other => self.level(other),
        })
    }

    fn read_analog(&mut self, channel: u8) -> Result<f64, AdapterError> {
        self.check_connected()?;
        self.trace.push(Event::ReadAnalog(channel));
        if self.analog_faults.contains(&channel) {
            return Err(AdapterError::Device(format!(
                "analog input {channel} did not respond"
            )));
        }
        Ok(self.wiring.analog(&self.latches, channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant(u8);

    impl Wiring for Constant {
        fn readback(&self, _latches: &Latches, _address: u8) -> u8 {
            self.0
        }

        fn analog(&self, latches: &Latches, channel: u8) -> f64 {
            f64::from(latches[0]) + f64::from(channel) / 10.0
        }
    }

    fn shift_in(bus: &mut SimulatedBus, byte: u8) {
        bus.write_bit(Signal::CsBus, false).unwrap();
        for i in (0..=7).rev() {
            bus.write_bit(Signal::Sdi, (byte >> i) & 1 == 1).unwrap();
            bus.write_bit(Signal::Sck, false).unwrap();
            bus.write_bit(Signal::Sck, true).unwrap();
        }
        bus.write_bit(Signal::CsBus, true).unwrap();
    }

    #[test]
    fn test_commit_on_release() {
        let mut bus = SimulatedBus::default();
        bus.write_port(Port::Eio, 82).unwrap();
        bus.write_bit(Signal::CsBus, true).unwrap();
        bus.write_bit(Signal::Sck, true).unwrap();
        shift_in(&mut bus, 0x9C);
        assert_eq!(bus.latch(82), 0x9C);
        assert_eq!(bus.read_port(Port::Eio).unwrap(), 82);
    }

    #[test]
    fn test_clocks_ignored_when_deselected() {
        let mut bus = SimulatedBus::default();
        bus.write_port(Port::Eio, 8).unwrap();
        bus.write_bit(Signal::CsBus, true).unwrap();
        for _ in 0..8 {
            bus.write_bit(Signal::Sdi, true).unwrap();
            bus.write_bit(Signal::Sck, false).unwrap();
            bus.write_bit(Signal::Sck, true).unwrap();
        }
        bus.write_bit(Signal::CsBus, false).unwrap();
        bus.write_bit(Signal::CsBus, true).unwrap();
        assert_eq!(bus.latch(8), 0);
    }

    #[test]
    fn test_load_and_shift_out() {
        let mut bus = SimulatedBus::new(Constant(0b1010_0110));
        bus.write_port(Port::Eio, 12).unwrap();
        bus.write_bit(Signal::CsBus, true).unwrap();
        bus.write_bit(Signal::NLoad, true).unwrap();
        bus.write_bit(Signal::NLoad, false).unwrap();
        bus.write_bit(Signal::CsBus, false).unwrap();
        let mut bits = vec![];
        for _ in 0..8 {
            bits.push(bus.read_input_bit(Signal::Sdo).unwrap());
            bus.write_bit(Signal::Sck, false).unwrap();
            bus.write_bit(Signal::Sck, true).unwrap();
        }
        assert_eq!(
            bits,
            vec![true, false, true, false, false, true, true, false]
        );
    }

    #[test]
    fn test_analog() {
        let mut bus = SimulatedBus::new(Constant(0));
        bus.set_latch(0, 3);
        assert!((bus.read_analog(2).unwrap() - 3.2).abs() < 1e-12);
        bus.fail_analog(2);
        assert!(matches!(
            bus.read_analog(2),
            Err(AdapterError::Device(_))
        ));
        bus.repair_analog(2);
        assert!(bus.read_analog(2).is_ok());
    }

    #[test]
    fn test_faults() {
        let mut bus = SimulatedBus::default();
        bus.fail_nth_write(Signal::Sck, 2);
        assert!(bus.write_bit(Signal::Sck, true).is_ok());
        assert!(matches!(
            bus.write_bit(Signal::Sck, false),
            Err(AdapterError::Timeout)
        ));
        // A failed write leaves the line alone
        assert!(bus.level(Signal::Sck));
        assert!(bus.write_bit(Signal::Sck, false).is_ok());
        bus.disconnect();
        assert!(matches!(
            bus.read_port(Port::Cio),
            Err(AdapterError::Disconnected)
        ));
        bus.reconnect();
        assert_eq!(bus.read_port(Port::Cio).unwrap(), 0b1110);
    }

    #[test]
    fn test_zeroth_write_fault_is_the_next_write() {
        let mut bus = SimulatedBus::default();
        bus.fail_nth_write(Signal::Sdi, 0);
        assert!(matches!(
            bus.write_bit(Signal::Sdi, false),
            Err(AdapterError::Timeout)
        ));
        assert!(bus.write_bit(Signal::Sdi, false).is_ok());
        assert!(!bus.level(Signal::Sdi));
    }
}
