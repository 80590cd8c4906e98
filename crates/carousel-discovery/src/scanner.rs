//! Bus scanner combining probe policy and driver construction

use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

use carousel_core::Dispenser;
use carousel_rs485::{probe, Rs485Dispenser, SharedChannel};

/// Fixed address-space bound of the dispenser bus
pub const MAX_BUS_ADDRESS: u8 = 64;

/// How hard the scanner tries at each address.
#[derive(Debug, Clone)]
pub struct ScanPolicy {
    /// Probe attempts per address before giving up
    pub attempts: u32,
    /// Pause between attempts, letting the bus settle after a collision
    pub settle_ms: u64,
}

impl ScanPolicy {
    /// Thorough discovery: retried probes with settle pauses.
    pub fn thorough() -> Self {
        Self {
            attempts: 3,
            settle_ms: 20,
        }
    }

    /// Fast discovery: one probe per address, no pauses. Trades missed
    /// units on a noisy bus for a scan that finishes in one pass.
    pub fn fast() -> Self {
        Self {
            attempts: 1,
            settle_ms: 0,
        }
    }
}

/// Discovers dispensers on the shared bus.
pub struct BusScanner {
    policy: ScanPolicy,
}

impl BusScanner {
    pub fn new(policy: ScanPolicy) -> Self {
        Self { policy }
    }

    /// Probe every address in `0..max_address` and return a dispenser
    /// driver for each responder, keyed by position.
    ///
    /// Total over the bound: a probe failure of any kind counts as "no
    /// device at that address", and an empty map is a valid result,
    /// never an error. Addresses are probed sequentially because the bus
    /// is half-duplex.
    pub async fn scan(
        &self,
        bus: &SharedChannel,
        aux: &SharedChannel,
        max_address: u8,
    ) -> BTreeMap<u32, Box<dyn Dispenser>> {
        let mut found: BTreeMap<u32, Box<dyn Dispenser>> = BTreeMap::new();
        for address in 0..max_address {
            if self.probe_with_retry(bus, address).await {
                debug!(address, "Found dispenser");
                found.insert(
                    u32::from(address),
                    Box::new(Rs485Dispenser::new(address, bus.clone(), aux.clone())),
                );
            }
        }
        info!(
            probed = max_address,
            found = found.len(),
            "Bus scan finished"
        );
        found
    }

    async fn probe_with_retry(&self, bus: &SharedChannel, address: u8) -> bool {
        for attempt in 0..self.policy.attempts {
            {
                let mut channel = bus.lock().await;
                if probe(&mut channel, address).await {
                    return true;
                }
            }
            if attempt + 1 < self.policy.attempts && self.policy.settle_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.policy.settle_ms)).await;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policies() {
        let thorough = ScanPolicy::thorough();
        assert!(thorough.attempts > 1);
        let fast = ScanPolicy::fast();
        assert_eq!(fast.attempts, 1);
        assert_eq!(fast.settle_ms, 0);
    }
}
