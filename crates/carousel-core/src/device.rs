//! The dispenser capability contract and the placeholder implementation
//!
//! Every dispensing unit, physical or not, is driven through the
//! [`Dispenser`] trait. Hardware-backed drivers live in the bus crate;
//! the [`MockDispenser`] placeholder defined here pads out positions that
//! have no physical unit behind them.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::trace;

/// Transport-level failures surfaced by device drivers
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("device at address {address} did not respond")]
    Timeout { address: u8 },
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Which implementation backs a registry entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispenserKind {
    /// Driven over the physical bus
    Hardware,
    /// Placeholder with no physical backing
    Mock,
}

impl std::fmt::Display for DispenserKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispenserKind::Hardware => write!(f, "hardware"),
            DispenserKind::Mock => write!(f, "mock"),
        }
    }
}

/// A single item-dispensing unit.
///
/// Each call is one command to the underlying device and blocks for the
/// duration of its transport round-trip.
#[async_trait]
pub trait Dispenser: Send + Sync + std::fmt::Debug {
    /// Eject the current item and return its item code.
    async fn dispense(&self) -> Result<u64, DeviceError>;

    /// Return the unit to its home state.
    async fn reset(&self) -> Result<(), DeviceError>;

    /// Switch the feed motor on.
    async fn motor_on(&self) -> Result<(), DeviceError>;

    /// Switch the feed motor off.
    async fn motor_off(&self) -> Result<(), DeviceError>;

    /// Advance the unit to the next item and return that item's code.
    async fn load_next_item(&self) -> Result<u64, DeviceError>;

    /// Which implementation backs this unit.
    fn kind(&self) -> DispenserKind;
}

/// Placeholder dispenser used to complete a fixed-size position layout.
///
/// Serves monotonically increasing synthetic item codes so tests can
/// observe instance identity; motor and reset commands are no-ops.
#[derive(Debug)]
pub struct MockDispenser {
    next_code: AtomicU64,
}

impl MockDispenser {
    pub fn new() -> Self {
        Self::with_next_code(1)
    }

    /// Start the synthetic code sequence at `code`.
    pub fn with_next_code(code: u64) -> Self {
        Self {
            next_code: AtomicU64::new(code),
        }
    }
}

impl Default for MockDispenser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Dispenser for MockDispenser {
    async fn dispense(&self) -> Result<u64, DeviceError> {
        let code = self.next_code.fetch_add(1, Ordering::Relaxed);
        trace!(code, "Mock dispense");
        Ok(code)
    }

    async fn reset(&self) -> Result<(), DeviceError> {
        trace!("Mock reset");
        Ok(())
    }

    async fn motor_on(&self) -> Result<(), DeviceError> {
        trace!("Mock motor on");
        Ok(())
    }

    async fn motor_off(&self) -> Result<(), DeviceError> {
        trace!("Mock motor off");
        Ok(())
    }

    async fn load_next_item(&self) -> Result<u64, DeviceError> {
        let code = self.next_code.load(Ordering::Relaxed);
        trace!(code, "Mock load next item");
        Ok(code)
    }

    fn kind(&self) -> DispenserKind {
        DispenserKind::Mock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_serves_sequential_codes() {
        let mock = MockDispenser::new();
        assert_eq!(mock.dispense().await.unwrap(), 1);
        assert_eq!(mock.dispense().await.unwrap(), 2);
        // Load reports the code now at the front without consuming it
        assert_eq!(mock.load_next_item().await.unwrap(), 3);
        assert_eq!(mock.dispense().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_mock_motor_and_reset_are_noops() {
        let mock = MockDispenser::with_next_code(7);
        mock.motor_on().await.unwrap();
        mock.motor_off().await.unwrap();
        mock.reset().await.unwrap();
        assert_eq!(mock.dispense().await.unwrap(), 7);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(MockDispenser::new().kind().to_string(), "mock");
        assert_eq!(DispenserKind::Hardware.to_string(), "hardware");
    }
}
