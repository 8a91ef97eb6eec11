//! End-to-end scenarios against simulated boards of both revisions

use latchbus::{
    Phase,
    Signal,
};
use wbdc::{
    prelude::*,
    transport::{
        mock::WbdcWiring,
        SimulatedBus,
    },
};

type Board = Wbdc<SimulatedBus<WbdcWiring>>;

mod helpers {
    use super::*;

    /// A board with no settling delays
    pub fn board(revision: Revision) -> Board {
        Wbdc::new(
            SimulatedBus::new(WbdcWiring::simulated(revision)),
            BoardConfig::new(revision).with_timing(Timing::none()),
        )
        .unwrap()
    }

    pub fn latch(board: &Board, address: u8) -> u8 {
        board.bus().lock().unwrap().latch(address)
    }

    pub fn with_sim<R>(board: &Board, f: impl FnOnce(&mut SimulatedBus<WbdcWiring>) -> R) -> R {
        f(&mut *board.bus().lock().unwrap())
    }
}

use helpers::*;

#[test]
fn crossover_preserves_band_select_on_wbdc1() {
    let board = board(Revision::Wbdc1);
    assert_eq!(board.set_band(PloBand::Ghz24).unwrap(), PloBand::Ghz24);
    let band_bit = latch(&board, 80) & 0b10_0000;
    assert_ne!(band_bit, 0);

    assert_eq!(board.set_crossover(Crossover::Crossed).unwrap(), Crossover::Crossed);
    assert_eq!(board.get_crossover().unwrap(), Crossover::Crossed);
    assert_eq!(latch(&board, 80) & 0b10_0000, band_bit);

    assert_eq!(board.set_crossover(Crossover::Through).unwrap(), Crossover::Through);
    assert_eq!(board.get_crossover().unwrap(), Crossover::Through);
    assert_eq!(latch(&board, 80) & 0b10_0000, band_bit);
    assert_eq!(board.get_band().unwrap(), PloBand::Ghz24);
}

#[test]
fn crossover_preserves_neighbours_on_wbdc2() {
    let board = board(Revision::Wbdc2);
    with_sim(&board, |sim| sim.set_latch(8, 0b1010_0100));
    assert_eq!(board.set_crossover(Crossover::Crossed).unwrap(), Crossover::Crossed);
    assert_eq!(latch(&board, 8), 0b1010_0111);
    assert_eq!(board.set_crossover(Crossover::Through).unwrap(), Crossover::Through);
    assert_eq!(latch(&board, 8), 0b1010_0100);
}

#[test]
fn disagreeing_transfer_switches_are_reported() {
    let board = board(Revision::Wbdc2);
    board.set_crossover(Crossover::Crossed).unwrap();
    with_sim(&board, |sim| sim.wiring_mut().jam_crossover(Pol::P2, Some(false)));
    assert!(matches!(
        board.get_crossover(),
        Err(Error::Disagreement { .. })
    ));
    assert!(matches!(
        board.set_crossover(Crossover::Crossed),
        Err(Error::Disagreement { .. })
    ));
    with_sim(&board, |sim| sim.wiring_mut().jam_crossover(Pol::P2, None));
    assert_eq!(board.get_crossover().unwrap(), Crossover::Crossed);
}

#[test]
fn failed_bit_write_leaves_state_to_be_reread() {
    let board = board(Revision::Wbdc2);
    // The read and the write of the read-modify-write each drive SDI idle once, so the fourth
    // SDI write is data bit 6 of the first transfer switch
    with_sim(&board, |sim| sim.fail_nth_write(Signal::Sdi, 4));
    assert!(matches!(
        board.set_crossover(Crossover::Crossed),
        Err(Error::Bus(latchbus::Error::Adapter {
            phase: Phase::Shift(6),
            ..
        }))
    ));
    // Only the second transfer switch took the command, and the readback says so
    assert_eq!(latch(&board, 8), 0b10);
    assert!(matches!(
        board.get_crossover(),
        Err(Error::Disagreement { .. })
    ));
    assert_eq!(board.set_crossover(Crossover::Crossed).unwrap(), Crossover::Crossed);
}

#[test]
fn sideband_separation_sets_every_hybrid() {
    let board = board(Revision::Wbdc2);
    let results = board.set_sideband_separation(Sideband::IQ);
    assert_eq!(results.len(), 20);
    assert!(results.values().all(|r| matches!(r, Ok(Sideband::IQ))));
    // R1 18/20 GHz on 160 bits 0-3, R1 22-26 GHz on 161 bits 0-5, likewise R2 on 162/163
    assert_eq!(latch(&board, 160), 0b1111);
    assert_eq!(latch(&board, 161), 0b11_1111);
    assert_eq!(latch(&board, 162), 0b1111);
    assert_eq!(latch(&board, 163), 0b11_1111);
    let states = board.get_sideband_hybrids();
    assert!(states.values().all(|r| matches!(r, Ok(Sideband::IQ))));
}

#[test]
fn locks_are_reported_per_band() {
    let board = board(Revision::Wbdc2);
    with_sim(&board, |sim| sim.wiring_mut().set_lock(SubBand::B20, false));
    let locks = board.pll_locks();
    assert_eq!(locks.len(), 5);
    assert!(!*locks[&SubBand::B20].as_ref().unwrap());
    assert!(*locks[&SubBand::B26].as_ref().unwrap());
}

#[test]
fn monitor_sweep_keeps_readings_next_to_failed_inputs() {
    let board = board(Revision::Wbdc1);
    with_sim(&board, |sim| {
        // Point 5 selects 0b0110_0010 on latch 0 and 0b0100_0000 on latch 2
        sim.wiring_mut().set_analog(1, 0b0110_0010, 1.5);
        sim.wiring_mut().set_analog(2, 0b0100_0000, 1.41);
    });
    let data = board.get_monitor_data();
    assert!(data.failed.is_empty());
    assert!((data.values["+16V V"] - 1.5 * 10.5542).abs() < 1e-9);
    assert!((data.values["RF 1 Plate"] - 25.0).abs() < 1e-9);
    assert!((data.values["+6V DC I"] - (1.0 - 0.004)).abs() < 1e-9);
    assert_eq!(data.values.len(), 17);

    // AIN2 only feeds the thermistors, so only the temperatures go missing
    with_sim(&board, |sim| sim.fail_analog(2));
    let data = board.get_monitor_data();
    let failed: Vec<(u8, &str)> = data
        .failed
        .iter()
        .map(|(index, label)| (*index, label.as_str()))
        .collect();
    assert_eq!(
        failed,
        vec![
            (3, "Air"),
            (5, "RF 1 Plate"),
            (6, "RF 2 Plate"),
            (7, "Box Wall"),
            (8, "LDROs")
        ]
    );
    assert_eq!(data.values.len(), 12);
    assert!(data.values.contains_key("+6V DC V"));
    assert!(data.values.contains_key("-16V AC V"));
    assert!(data.values.contains_key("+16V I RF2"));
    assert!((data.values["+16V V"] - 1.5 * 10.5542).abs() < 1e-9);
    assert!(!data.values.contains_key("Air"));
}

#[test]
fn wbdc2_monitor_covers_both_banks() {
    let board = board(Revision::Wbdc2);
    with_sim(&board, |sim| {
        sim.wiring_mut().set_nominal(0.5);
        sim.wiring_mut().set_analog(3, 0b010_0010, 1.0 - 0.238_927_5);
    });
    let data = board.get_monitor_data();
    assert!(data.failed.is_empty());
    assert!((data.values["BE plate"] - 23.549_481).abs() < 1e-9);
    assert!((data.values["R2 H-plane"] - (0.5 - 0.004) * 2.0064).abs() < 1e-9);
    assert!((data.values["-16 V"] - 0.5 * -10.5446).abs() < 1e-9);
    assert!(board.convert("no such point", 1.0).is_err());
}
