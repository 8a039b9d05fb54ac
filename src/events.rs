//! Synchronous provisioning event bus
//!
//! Repository registries publish [`RepositoryEvent`]s here. Listeners are
//! notified in registration order on the publishing thread.

use crate::location::RepositoryLocation;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// What happened to a repository
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryEventKind {
    Added,
    Removed,
    Changed,
    Enabled,
    Discovered,
}

/// Kind of repository an event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryType {
    Metadata,
    Artifact,
}

impl fmt::Display for RepositoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Metadata => write!(f, "metadata"),
            Self::Artifact => write!(f, "artifact"),
        }
    }
}

/// A change to a known repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryEvent {
    pub kind: RepositoryEventKind,
    pub repository_type: RepositoryType,
    pub location: RepositoryLocation,
}

impl RepositoryEvent {
    pub fn new(
        kind: RepositoryEventKind,
        repository_type: RepositoryType,
        location: RepositoryLocation,
    ) -> Self {
        Self {
            kind,
            repository_type,
            location,
        }
    }

    /// Shorthand for a metadata repository removal
    pub fn metadata_removed(location: RepositoryLocation) -> Self {
        Self::new(
            RepositoryEventKind::Removed,
            RepositoryType::Metadata,
            location,
        )
    }
}

/// Receiver of repository events
pub trait ProvisioningListener: Send + Sync {
    fn notify(&self, event: &RepositoryEvent);
}

/// Process-wide event bus holding listeners by identity
#[derive(Default)]
pub struct ProvisioningEventBus {
    listeners: Mutex<Vec<Arc<dyn ProvisioningListener>>>,
}

impl ProvisioningEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn listeners(&self) -> MutexGuard<'_, Vec<Arc<dyn ProvisioningListener>>> {
        // a listener panicking mid-notify leaves the list itself intact
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a listener; adding the same listener twice has no effect
    pub fn add_listener(&self, listener: Arc<dyn ProvisioningListener>) {
        let mut listeners = self.listeners();
        if listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            return;
        }
        listeners.push(listener);
    }

    /// Remove a listener previously added
    pub fn remove_listener(&self, listener: &Arc<dyn ProvisioningListener>) {
        self.listeners().retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// Deliver an event to every listener
    pub fn publish(&self, event: &RepositoryEvent) {
        // snapshot so listeners may (un)register while being notified
        let listeners: Vec<_> = self.listeners().clone();
        debug!(
            "Publishing {:?} for {} repository {} to {} listener(s)",
            event.kind,
            event.repository_type,
            event.location,
            listeners.len()
        );
        for listener in listeners {
            listener.notify(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners().len()
    }
}
