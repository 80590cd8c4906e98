//! Carousel Discovery - bus scanning for dispenser units
//!
//! Probes every address on the shared bus and builds a position-indexed
//! map of hardware dispenser drivers for the responders.

pub mod scanner;

pub use scanner::{BusScanner, ScanPolicy, MAX_BUS_ADDRESS};
