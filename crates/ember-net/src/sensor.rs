//! Simulated fire sensor.
//!
//! Produces uniformly random readings over the configured grid at the
//! configured rate and feeds them through the admission policy. Peripheral
//! to the protocol - any reading source posting to `/sensor` works the same
//! way - but it makes a fleet observable out of the box.

use chrono::Utc;
use ember_state::{Cell, FireState, SensorReading};
use parking_lot::RwLock;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::trace;

pub struct SensorSimulator {
    state: Arc<RwLock<FireState>>,
    grid_width: i32,
    grid_height: i32,
    interval: Duration,
}

impl SensorSimulator {
    pub fn new(
        state: Arc<RwLock<FireState>>,
        grid_width: i32,
        grid_height: i32,
        interval: Duration,
    ) -> Self {
        Self {
            state,
            grid_width: grid_width.max(1),
            grid_height: grid_height.max(1),
            interval,
        }
    }

    fn sample(&self) -> SensorReading {
        let mut rng = rand::thread_rng();
        SensorReading::new(
            Cell::new(
                rng.gen_range(0..self.grid_width),
                rng.gen_range(0..self.grid_height),
            ),
            Utc::now().timestamp_millis(),
            rng.gen_range(0.0..100.0),
            rng.gen_range(20.0..100.0),
        )
    }

    /// Sampling loop; a zero interval disables the sensor.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        if self.interval.is_zero() {
            return;
        }
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let reading = self.sample();
                    let outcome = self.state.write().apply_reading(&reading);
                    trace!(cell = %reading.cell, ?outcome, "sensor sample");
                }
                _ = shutdown.changed() => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_stay_on_grid() {
        let state = Arc::new(RwLock::new(FireState::new("s")));
        let sensor = SensorSimulator::new(state, 4, 6, Duration::from_secs(1));
        for _ in 0..200 {
            let reading = sensor.sample();
            assert!((0..4).contains(&reading.cell.x));
            assert!((0..6).contains(&reading.cell.y));
            assert!((0.0..100.0).contains(&reading.confidence));
            assert!((20.0..100.0).contains(&reading.temperature));
        }
    }

    #[test]
    fn test_degenerate_grid_is_clamped() {
        let state = Arc::new(RwLock::new(FireState::new("s")));
        let sensor = SensorSimulator::new(state, 0, -3, Duration::from_secs(1));
        let reading = sensor.sample();
        assert_eq!(reading.cell, Cell::new(0, 0));
    }
}
