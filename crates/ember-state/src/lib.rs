//! Ember State - the replicated fire picture
//!
//! Converts raw sensor readings into delta-state CRDT operations and back
//! into a queryable map of burning cells:
//!
//! - [`cell`] - grid cells
//! - [`reading`] - sensor readings and detection metadata
//! - [`state`] - [`FireState`]: admission policy, metadata side table,
//!   delta generation and merge

pub mod cell;
pub mod reading;
pub mod state;

pub use cell::Cell;
pub use reading::{FireMeta, SensorReading};
pub use state::{
    ActiveFire, AdmissionPolicy, DeltaEntry, FireDelta, FireState, ReadingOutcome,
    DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_TEMPERATURE_THRESHOLD,
};
