//! The active store connection.
//!
//! Mirrors "the currently selected bucket": empty until a profile is
//! connected, swapped wholesale when the user picks another profile. Each
//! swap bumps an epoch counter so caches keyed on the old bucket can tell
//! they are stale.

use std::sync::Arc;

use crate::profile::ConnectionProfile;
use crate::s3::S3Store;
use crate::{ObjectStore, StoreError};

/// Holds the active [`ObjectStore`], if any, and its connection epoch.
#[derive(Default)]
pub struct ConnectionSlot {
    store: Option<Arc<dyn ObjectStore>>,
    public_base_url: Option<String>,
    epoch: u64,
}

impl ConnectionSlot {
    /// Creates an empty (disconnected) slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a slot already connected to `store`.
    #[must_use]
    pub fn connected(store: Arc<dyn ObjectStore>) -> Self {
        let mut slot = Self::new();
        slot.connect(store, None);
        slot
    }

    /// Connects an S3 store for `profile`, replacing any previous
    /// connection.
    pub fn connect_profile(&mut self, profile: &ConnectionProfile) {
        log::info!("Using bucket {}", profile.name);
        self.connect(
            Arc::new(S3Store::connect(profile)),
            profile.public_base_url.clone(),
        );
    }

    /// Replaces the active store and starts a new epoch.
    pub fn connect(&mut self, store: Arc<dyn ObjectStore>, public_base_url: Option<String>) {
        self.store = Some(store);
        self.public_base_url = public_base_url;
        self.epoch += 1;
    }

    /// Drops the active store and starts a new epoch.
    pub fn disconnect(&mut self) {
        self.store = None;
        self.public_base_url = None;
        self.epoch += 1;
    }

    /// Returns the active store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotConnected`] if no store is connected.
    pub fn require(&self) -> Result<Arc<dyn ObjectStore>, StoreError> {
        self.store.clone().ok_or(StoreError::NotConnected)
    }

    /// Returns `true` if a store is connected.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.store.is_some()
    }

    /// Monotonic counter identifying the current connection.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Public base URL of the connected profile.
    #[must_use]
    pub fn public_base_url(&self) -> Option<&str> {
        self.public_base_url.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[test]
    fn empty_slot_fails_fast() {
        let slot = ConnectionSlot::new();
        assert!(!slot.is_connected());
        assert!(matches!(slot.require(), Err(StoreError::NotConnected)));
    }

    #[test]
    fn every_switch_bumps_epoch() {
        let mut slot = ConnectionSlot::new();
        let before = slot.epoch();

        slot.connect(Arc::new(MemoryStore::new("one")), None);
        let first = slot.epoch();
        assert!(first > before);
        assert_eq!(slot.require().unwrap().bucket(), "one");

        slot.connect(
            Arc::new(MemoryStore::new("two")),
            Some("https://cdn".to_string()),
        );
        assert!(slot.epoch() > first);
        assert_eq!(slot.require().unwrap().bucket(), "two");
        assert_eq!(slot.public_base_url(), Some("https://cdn"));

        let connected = slot.epoch();
        slot.disconnect();
        assert!(slot.epoch() > connected);
        assert!(slot.require().is_err());
    }
}
