//! Position-indexed dispenser registry
//!
//! The registry maps integer positions to [`Dispenser`] instances. A bus
//! scan installs its result with [`DispenserRegistry::replace`] (full
//! replacement, never a merge); [`DispenserRegistry::fill_with_mocks`]
//! pads missing positions with placeholders, ascending from zero, without
//! disturbing existing entries.

use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::debug;

use crate::device::{Dispenser, DispenserKind, MockDispenser};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{0} is not a valid position")]
    InvalidPosition(u32),
}

/// Mapping from position to the dispenser occupying it.
#[derive(Default)]
pub struct DispenserRegistry {
    slots: BTreeMap<u32, Box<dyn Dispenser>>,
    /// Whether a scan result has ever been installed. An empty scan still
    /// counts as populated; only a never-scanned registry triggers the
    /// implicit scan in the fill path.
    populated: bool,
}

impl DispenserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a scan result, replacing the registry's entire contents.
    pub fn replace(&mut self, slots: BTreeMap<u32, Box<dyn Dispenser>>) {
        self.slots = slots;
        self.populated = true;
    }

    /// All occupied positions, ascending.
    pub fn positions(&self) -> BTreeSet<u32> {
        self.slots.keys().copied().collect()
    }

    /// Occupied positions with the kind of dispenser at each.
    pub fn kinds(&self) -> BTreeMap<u32, DispenserKind> {
        self.slots.iter().map(|(&p, d)| (p, d.kind())).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_populated(&self) -> bool {
        self.populated
    }

    /// Look up the dispenser at `position`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidPosition`] when no dispenser
    /// occupies the position.
    pub fn get(&self, position: u32) -> Result<&dyn Dispenser, RegistryError> {
        self.slots
            .get(&position)
            .map(|d| d.as_ref())
            .ok_or(RegistryError::InvalidPosition(position))
    }

    /// Pad the registry with placeholders until it holds `count` entries.
    ///
    /// Candidate positions are scanned ascending from zero and occupied
    /// ones are skipped, so low-numbered gaps fill first and no existing
    /// entry is ever displaced. No-op when the registry already holds
    /// `count` or more. Returns the number of placeholders inserted.
    pub fn fill_with_mocks(&mut self, count: usize) -> usize {
        let mut added = 0;
        let mut idx: u32 = 0;
        while self.slots.len() < count {
            if !self.slots.contains_key(&idx) {
                debug!(position = idx, "Creating mock dispenser");
                self.slots.insert(idx, Box::new(MockDispenser::new()));
                added += 1;
            }
            idx += 1;
        }
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceError;
    use async_trait::async_trait;

    /// Stands in for a bus-backed unit so kind bookkeeping is testable
    /// without serial hardware.
    #[derive(Debug)]
    struct FakeHardware;

    #[async_trait]
    impl Dispenser for FakeHardware {
        async fn dispense(&self) -> Result<u64, DeviceError> {
            Ok(0)
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
            Ok(0)
        }

        fn kind(&self) -> DispenserKind {
            DispenserKind::Hardware
        }
    }

    fn registry_with_mocks_at(positions: &[u32]) -> DispenserRegistry {
        let mut slots: BTreeMap<u32, Box<dyn Dispenser>> = BTreeMap::new();
        for &p in positions {
            slots.insert(p, Box::new(MockDispenser::new()));
        }
        let mut registry = DispenserRegistry::new();
        registry.replace(slots);
        registry
    }

    #[test]
    fn test_fill_empty_registry() {
        let mut registry = DispenserRegistry::new();
        let added = registry.fill_with_mocks(3);
        assert_eq!(added, 3);
        assert_eq!(registry.positions(), BTreeSet::from([0, 1, 2]));
        assert!(registry
            .kinds()
            .values()
            .all(|&k| k == DispenserKind::Mock));
    }

    #[test]
    fn test_fill_skips_occupied_positions() {
        let mut registry = registry_with_mocks_at(&[1, 3]);
        let added = registry.fill_with_mocks(4);
        assert_eq!(added, 2);
        assert_eq!(registry.positions(), BTreeSet::from([0, 1, 2, 3]));
    }

    #[test]
    fn test_fill_interleaves_mocks_between_hardware() {
        let mut slots: BTreeMap<u32, Box<dyn Dispenser>> = BTreeMap::new();
        slots.insert(0, Box::new(FakeHardware));
        slots.insert(2, Box::new(FakeHardware));
        let mut registry = DispenserRegistry::new();
        registry.replace(slots);

        registry.fill_with_mocks(4);

        assert_eq!(
            registry.kinds(),
            BTreeMap::from([
                (0, DispenserKind::Hardware),
                (1, DispenserKind::Mock),
                (2, DispenserKind::Hardware),
                (3, DispenserKind::Mock),
            ])
        );
    }

    #[test]
    fn test_fill_is_noop_at_or_above_count() {
        let mut registry = registry_with_mocks_at(&[0, 1, 2]);
        assert_eq!(registry.fill_with_mocks(3), 0);
        assert_eq!(registry.fill_with_mocks(2), 0);
        assert_eq!(registry.len(), 3);
    }

    #[tokio::test]
    async fn test_fill_never_displaces_existing_entries() {
        let mut slots: BTreeMap<u32, Box<dyn Dispenser>> = BTreeMap::new();
        slots.insert(1, Box::new(MockDispenser::with_next_code(100)));
        let mut registry = DispenserRegistry::new();
        registry.replace(slots);

        registry.fill_with_mocks(4);

        // The original instance at position 1 keeps serving its own
        // code sequence; a replacement would have restarted at 1.
        assert_eq!(registry.get(1).unwrap().dispense().await.unwrap(), 100);
        // Fresh placeholders landed in the gaps
        assert_eq!(registry.get(0).unwrap().dispense().await.unwrap(), 1);
        assert_eq!(registry.positions(), BTreeSet::from([0, 1, 2, 3]));
    }

    #[test]
    fn test_fill_size_is_max_of_count_and_previous() {
        let mut registry = registry_with_mocks_at(&[0, 5, 9]);
        registry.fill_with_mocks(2);
        assert_eq!(registry.len(), 3);
        registry.fill_with_mocks(5);
        assert_eq!(registry.len(), 5);
        assert_eq!(registry.positions(), BTreeSet::from([0, 1, 2, 5, 9]));
    }

    #[test]
    fn test_get_unknown_position() {
        let registry = registry_with_mocks_at(&[0]);
        assert_eq!(
            registry.get(7).unwrap_err(),
            RegistryError::InvalidPosition(7)
        );
    }

    #[test]
    fn test_replace_discards_previous_contents() {
        let mut registry = registry_with_mocks_at(&[0, 1, 2]);
        registry.replace(BTreeMap::new());
        assert!(registry.is_empty());
        assert!(registry.is_populated());
    }

    #[test]
    fn test_new_registry_is_not_populated() {
        let registry = DispenserRegistry::new();
        assert!(!registry.is_populated());
        assert!(registry.is_empty());
    }
}
