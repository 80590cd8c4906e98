//! Carousel Fleet - facade over the dispenser registry and session protocol
//!
//! The [`Fleet`] handle owns both serial channels, the bus scanner, and
//! the registry/session state behind a single guard. Callers initialize
//! it once and thread the handle through to every call site.

pub mod config;
pub mod fleet;

pub use config::{load_config, Config};
pub use fleet::{Fleet, FleetError};
