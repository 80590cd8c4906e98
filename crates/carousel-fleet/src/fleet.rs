//! Fleet facade: lifecycle, registry operations, session protocol
//!
//! One [`Fleet`] per process. The registry and session state share a
//! single mutex so a scan can never interleave with a dispense burst;
//! every public operation holds the guard for its full duration,
//! including the device I/O it performs.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use carousel_core::{DeviceError, DispenserKind, DispenserRegistry, RegistryError, Session};
use carousel_discovery::{BusScanner, ScanPolicy, MAX_BUS_ADDRESS};
use carousel_rs485::{Channel, ChannelError, SerialConfig, SharedChannel};

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("dispenser fleet is already initialized")]
    AlreadyInitialized,
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("transport error: {0}")]
    Transport(#[from] ChannelError),
    #[error("device error: {0}")]
    Device(#[from] DeviceError),
}

/// Process-wide claim backing the at-most-one-instance invariant.
static CLAIMED: AtomicBool = AtomicBool::new(false);

/// Registry and session state, guarded together.
struct FleetState {
    registry: DispenserRegistry,
    session: Session,
}

impl FleetState {
    fn new() -> Self {
        Self {
            registry: DispenserRegistry::new(),
            session: Session::new(),
        }
    }

    async fn dispense(&mut self, position: u32) -> Result<u64, FleetError> {
        let code = self.registry.get(position)?.dispense().await?;
        self.session.record(position);
        debug!(position, code, "Dispensed");
        Ok(code)
    }

    /// Second phase of the protocol: reload every dispensed position
    /// exactly once, ascending, then close the session. A position
    /// leaves the pending set only when its reload succeeded, so a
    /// mid-batch failure leaves the remainder pending and the session
    /// open for a retry.
    async fn end_session(&mut self) -> Result<(), FleetError> {
        for position in self.session.pending() {
            let code = self.registry.get(position)?.load_next_item().await?;
            debug!(position, code, "Reloaded position");
            self.session.mark_reloaded(position);
        }
        self.session.close();
        Ok(())
    }
}

/// Facade over the dispenser fleet.
pub struct Fleet {
    bus: SharedChannel,
    aux: SharedChannel,
    state: Mutex<FleetState>,
}

impl std::fmt::Debug for Fleet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fleet").finish_non_exhaustive()
    }
}

impl Fleet {
    /// Open both serial channels with the fixed bus configuration and
    /// return the process's fleet handle.
    ///
    /// # Errors
    ///
    /// [`FleetError::AlreadyInitialized`] when a fleet is already live
    /// in this process; [`FleetError::Transport`] when a channel cannot
    /// be opened (the claim is released so initialization can be
    /// retried).
    pub fn initialize(net_path: &str, adam_path: &str) -> Result<Self, FleetError> {
        Self::initialize_guarded(net_path, adam_path, &CLAIMED)
    }

    fn initialize_guarded(
        net_path: &str,
        adam_path: &str,
        claim: &AtomicBool,
    ) -> Result<Self, FleetError> {
        if claim
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(FleetError::AlreadyInitialized);
        }
        info!(net = net_path, adam = adam_path, "Initializing dispenser fleet");

        let config = SerialConfig::default();
        let opened = Channel::open(net_path, &config)
            .and_then(|bus| Channel::open(adam_path, &config).map(|aux| (bus, aux)));
        let (bus, aux) = match opened {
            Ok(channels) => channels,
            Err(e) => {
                claim.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        };

        Ok(Self {
            bus: Arc::new(Mutex::new(bus)),
            aux: Arc::new(Mutex::new(aux)),
            state: Mutex::new(FleetState::new()),
        })
    }

    /// Thorough discovery over both channels, replacing the registry's
    /// entire contents. An empty set is a valid outcome.
    pub async fn scan(&self) -> BTreeSet<u32> {
        let mut state = self.state.lock().await;
        self.scan_locked(&mut state, ScanPolicy::thorough()).await
    }

    /// Same contract as [`Fleet::scan`] with the fast probe policy.
    pub async fn scan_fast(&self) -> BTreeSet<u32> {
        let mut state = self.state.lock().await;
        self.scan_locked(&mut state, ScanPolicy::fast()).await
    }

    async fn scan_locked(&self, state: &mut FleetState, policy: ScanPolicy) -> BTreeSet<u32> {
        info!("Scan");
        let scanner = BusScanner::new(policy);
        let found = scanner.scan(&self.bus, &self.aux, MAX_BUS_ADDRESS).await;
        if !found.is_empty() {
            info!(found = found.len(), "Found dispensers");
        }
        state.registry.replace(found);
        state.registry.positions()
    }

    /// Ensure the registry holds at least `count` entries, padding the
    /// low-numbered gaps with placeholder dispensers. Scans first if the
    /// registry has never been populated. Returns all occupied
    /// positions.
    pub async fn create_mock_dispensers(&self, count: usize) -> BTreeSet<u32> {
        let mut state = self.state.lock().await;
        if !state.registry.is_populated() {
            self.scan_locked(&mut state, ScanPolicy::thorough()).await;
        }
        let missing = count.saturating_sub(state.registry.len());
        if missing > 0 {
            info!(count = missing, "Creating mock dispensers");
            state.registry.fill_with_mocks(count);
        }
        state.registry.positions()
    }

    /// Open a session for a dispense burst. Idempotent while open.
    pub async fn start_session(&self) {
        self.state.lock().await.session.start();
    }

    /// Close the session, reloading every dispensed position once.
    pub async fn end_session(&self) -> Result<(), FleetError> {
        self.state.lock().await.end_session().await
    }

    /// Dispense from `position` and return the item's code. The position
    /// is recorded for the session's reload phase whether or not a
    /// session is open.
    pub async fn dispense(&self, position: u32) -> Result<u64, FleetError> {
        self.state.lock().await.dispense(position).await
    }

    pub async fn reset(&self, position: u32) -> Result<(), FleetError> {
        let state = self.state.lock().await;
        state.registry.get(position)?.reset().await?;
        Ok(())
    }

    pub async fn motor_on(&self, position: u32) -> Result<(), FleetError> {
        let state = self.state.lock().await;
        state.registry.get(position)?.motor_on().await?;
        Ok(())
    }

    pub async fn motor_off(&self, position: u32) -> Result<(), FleetError> {
        let state = self.state.lock().await;
        state.registry.get(position)?.motor_off().await?;
        Ok(())
    }

    /// Occupied positions with the kind of dispenser at each.
    pub async fn kinds(&self) -> BTreeMap<u32, DispenserKind> {
        self.state.lock().await.registry.kinds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use carousel_core::Dispenser;
    use std::sync::atomic::AtomicU32;

    /// Test double that counts capability calls through shared handles.
    #[derive(Debug)]
    struct CountingDispenser {
        dispenses: Arc<AtomicU32>,
        loads: Arc<AtomicU32>,
        fail_loads: bool,
    }

    struct Counters {
        dispenses: Arc<AtomicU32>,
        loads: Arc<AtomicU32>,
    }

    fn counting(fail_loads: bool) -> (CountingDispenser, Counters) {
        let dispenses = Arc::new(AtomicU32::new(0));
        let loads = Arc::new(AtomicU32::new(0));
        (
            CountingDispenser {
                dispenses: dispenses.clone(),
                loads: loads.clone(),
                fail_loads,
            },
            Counters { dispenses, loads },
        )
    }

    #[async_trait]
    impl Dispenser for CountingDispenser {
        async fn dispense(&self) -> Result<u64, DeviceError> {
            Ok(u64::from(self.dispenses.fetch_add(1, Ordering::SeqCst)))
        }

        async fn reset(&self) -> Result<(), DeviceError> {
            Ok(())
        }

        async fn motor_on(&self) -> Result<(), DeviceError> {
            Ok(())
        }

        async fn motor_off(&self) -> Result<(), DeviceError> {
            Ok(())
        }

        async fn load_next_item(&self) -> Result<u64, DeviceError> {
            if self.fail_loads {
                return Err(DeviceError::Timeout { address: 0 });
            }
            Ok(u64::from(self.loads.fetch_add(1, Ordering::SeqCst)))
        }

        fn kind(&self) -> DispenserKind {
            DispenserKind::Mock
        }
    }

    fn state_with_counters(positions: &[u32]) -> (FleetState, Vec<Counters>) {
        let mut slots: BTreeMap<u32, Box<dyn Dispenser>> = BTreeMap::new();
        let mut counters = Vec::new();
        for &p in positions {
            let (dispenser, c) = counting(false);
            slots.insert(p, Box::new(dispenser));
            counters.push(c);
        }
        let mut state = FleetState::new();
        state.registry.replace(slots);
        (state, counters)
    }

    #[tokio::test]
    async fn test_end_session_reloads_each_position_once() {
        let (mut state, counters) = state_with_counters(&[0, 1]);
        state.session.start();
        state.dispense(0).await.unwrap();
        state.dispense(0).await.unwrap();
        state.dispense(1).await.unwrap();
        state.end_session().await.unwrap();

        assert_eq!(counters[0].dispenses.load(Ordering::SeqCst), 2);
        assert_eq!(counters[0].loads.load(Ordering::SeqCst), 1);
        assert_eq!(counters[1].loads.load(Ordering::SeqCst), 1);
        assert!(!state.session.is_open());
        assert!(state.session.pending().is_empty());
    }

    #[tokio::test]
    async fn test_end_session_skips_undispensed_positions() {
        let (mut state, counters) = state_with_counters(&[0, 1, 2]);
        state.session.start();
        state.dispense(1).await.unwrap();
        state.end_session().await.unwrap();

        assert_eq!(counters[0].loads.load(Ordering::SeqCst), 0);
        assert_eq!(counters[1].loads.load(Ordering::SeqCst), 1);
        assert_eq!(counters[2].loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dispense_records_without_a_session() {
        let (mut state, _counters) = state_with_counters(&[3]);
        state.dispense(3).await.unwrap();
        assert_eq!(state.session.pending(), vec![3]);
    }

    #[tokio::test]
    async fn test_dispense_unknown_position_has_no_side_effects() {
        let (mut state, counters) = state_with_counters(&[0]);
        let err = state.dispense(9).await.unwrap_err();
        assert!(matches!(
            err,
            FleetError::Registry(RegistryError::InvalidPosition(9))
        ));
        assert_eq!(counters[0].dispenses.load(Ordering::SeqCst), 0);
        assert!(state.session.pending().is_empty());
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_remainder_pending() {
        let mut slots: BTreeMap<u32, Box<dyn Dispenser>> = BTreeMap::new();
        let (ok, ok_counters) = counting(false);
        let (failing, _) = counting(true);
        slots.insert(0, Box::new(ok));
        slots.insert(1, Box::new(failing));
        let mut state = FleetState::new();
        state.registry.replace(slots);

        state.session.start();
        state.dispense(0).await.unwrap();
        state.dispense(1).await.unwrap();

        let err = state.end_session().await.unwrap_err();
        assert!(matches!(err, FleetError::Device(_)));
        // Position 0 was reloaded and retired; position 1 stays pending
        // with the session still open, so a retry cannot reload 0 twice.
        assert_eq!(ok_counters.loads.load(Ordering::SeqCst), 1);
        assert_eq!(state.session.pending(), vec![1]);
        assert!(state.session.is_open());
    }

    #[test]
    fn test_second_initialize_is_rejected() {
        let claim = AtomicBool::new(true); // a fleet is already live
        let err = Fleet::initialize_guarded("/dev/null", "/dev/null", &claim).unwrap_err();
        assert!(matches!(err, FleetError::AlreadyInitialized));
        // The live fleet's claim is left in place.
        assert!(claim.load(Ordering::SeqCst));
    }

    #[test]
    fn test_failed_channel_open_releases_claim() {
        let claim = AtomicBool::new(false);
        let err =
            Fleet::initialize_guarded("/nonexistent/ttyA", "/nonexistent/ttyB", &claim).unwrap_err();
        assert!(matches!(err, FleetError::Transport(_)));
        assert!(!claim.load(Ordering::SeqCst));
    }
}
