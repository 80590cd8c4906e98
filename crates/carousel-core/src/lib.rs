//! Carousel Core - device capability contract, dispenser registry, session state
//!
//! This crate provides the foundational types for the Carousel system:
//! - The `Dispenser` capability trait that hardware and placeholder devices share
//! - The position-indexed dispenser registry with ascending gap fill
//! - Session state for the two-phase dispense/reload protocol

pub mod device;
pub mod registry;
pub mod session;

pub use device::{DeviceError, Dispenser, DispenserKind, MockDispenser};
pub use registry::{DispenserRegistry, RegistryError};
pub use session::Session;
