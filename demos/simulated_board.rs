//! In this example, we bring up a simulated WBDC2, route the signals through the crossover,
//! select circular polarization, turn on sideband separation and sweep the analog monitor.
//!
//! Run with `RUST_LOG=debug` to watch the individual latch transfers.

use tracing_subscriber::{
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};
use wbdc::{
    prelude::*,
    transport::{
        mock::WbdcWiring,
        SimulatedBus,
    },
};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let revision: Revision = std::env::args()
        .nth(1)
        .as_deref()
        .unwrap_or("WBDC2")
        .parse()?;

    let io = SimulatedBus::new(WbdcWiring::simulated(revision));
    let board = Wbdc::new(io, BoardConfig::new(revision).with_timing(Timing::none()))?;

    println!("Crossover: {}", board.set_crossover(Crossover::Crossed)?);

    for (id, state) in board.set_polarizers(Polarization::Circular) {
        println!("{id}: {}", state?);
    }
    for (id, state) in board.set_sideband_separation(Sideband::IQ) {
        println!("{id}: {}", state?);
    }
    if revision == Revision::Wbdc1 {
        println!("PLO band: {}", board.set_band(PloBand::Ghz24)?);
    }
    for (band, locked) in board.pll_locks() {
        println!("{band} PLL locked: {}", locked?);
    }

    let data = board.get_monitor_data();
    for (label, value) in &data.values {
        println!("{label:>16} = {value:8.3}");
    }
    for (index, label) in &data.failed {
        println!("{label:>16} failed (point {index})");
    }
    Ok(())
}
