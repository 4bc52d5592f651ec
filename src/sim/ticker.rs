//! The single periodic driver of the simulation.

use std::sync::Arc;

use parking_lot::Mutex;

use super::engine::Simulation;
use super::types::GridSnapshot;

/// Simulation state shared between the ticker and command callers.
///
/// One global lock: ticks and commands each run inside one short critical
/// section and never interleave.
pub type SharedSimulation = Arc<Mutex<Simulation>>;

/// Wraps a simulation for sharing.
pub fn shared(sim: Simulation) -> SharedSimulation {
    Arc::new(Mutex::new(sim))
}

/// Advances a [`SharedSimulation`] one tick at a time.
#[derive(Clone)]
pub struct Ticker {
    sim: SharedSimulation,
}

impl Ticker {
    pub fn new(sim: SharedSimulation) -> Self {
        Self { sim }
    }

    pub fn simulation(&self) -> &SharedSimulation {
        &self.sim
    }

    /// Runs one tick under the lock.
    pub fn step(&self) -> GridSnapshot {
        self.sim.lock().tick()
    }

    /// Runs `ticks` ticks back to back, releasing the lock between ticks.
    ///
    /// # Arguments
    ///
    /// * `ticks` - Number of ticks to run
    /// * `on_tick` - Called with each snapshot as it is produced
    ///
    /// # Returns
    ///
    /// Every snapshot, in tick order.
    pub fn run(&self, ticks: u64, mut on_tick: impl FnMut(&GridSnapshot)) -> Vec<GridSnapshot> {
        let mut out = Vec::with_capacity(ticks.min(1 << 20) as usize);
        for _ in 0..ticks {
            let snap = self.step();
            on_tick(&snap);
            out.push(snap);
        }
        out
    }

    /// Ticks on a wall-clock interval until the returned task is aborted.
    ///
    /// Missed intervals are skipped, not replayed, so a stalled process
    /// never bursts through a backlog of ticks.
    #[cfg(feature = "api")]
    pub fn spawn(self, period: std::time::Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // the first tick of a tokio interval completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let snap = self.step();
                tracing::trace!(tick = snap.tick, "background tick");
            }
        })
    }
}
