//! Domain types: bars, bar frequency, instrument classification.

pub mod bar;
pub mod instrument;

pub use bar::{Bar, Frequency};
pub use instrument::{InstrumentKind, INDEX_CODES};
