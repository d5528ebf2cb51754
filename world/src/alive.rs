//! Session-scoped registry of instances that count as alive for scheduling.

use std::fmt;

use slotmap::SlotMap;
use wave_warden_core::{InstanceKey, LifeToken};

/// Payload delivered to death listeners.
///
/// Carries no identity so listeners never couple to the registry's internals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeathNotice {
    remaining_alive: usize,
}

impl DeathNotice {
    /// Alive count after the death was applied.
    #[must_use]
    pub const fn remaining_alive(&self) -> usize {
        self.remaining_alive
    }
}

/// Handle returned when subscribing to death notifications.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type DeathListener = Box<dyn FnMut(DeathNotice)>;

/// Tracks which spawned instances are in flight and fans out death notices.
///
/// The alive count is always the size of the tracked set, so it can never go
/// negative and a second death report for the same lifetime changes nothing.
#[derive(Default)]
pub struct AliveRegistry {
    alive: SlotMap<LifeToken, InstanceKey>,
    listeners: Vec<(ListenerId, DeathListener)>,
    next_listener: u64,
}

impl AliveRegistry {
    /// Creates an empty registry with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking a spawned instance and returns the token for its death report.
    pub fn register_spawn(&mut self, instance: InstanceKey) -> LifeToken {
        self.alive.insert(instance)
    }

    /// Stops tracking the lifetime identified by `token`.
    ///
    /// Returns `false` without side effects when the token was never issued, was
    /// already reported, or predates the last reset. Every successful removal
    /// notifies all listeners.
    pub fn register_death(&mut self, token: LifeToken) -> bool {
        if self.alive.remove(token).is_none() {
            log::debug!("ignoring death report for untracked lifetime {token:?}");
            return false;
        }

        let notice = DeathNotice {
            remaining_alive: self.alive.len(),
        };
        for (_, listener) in &mut self.listeners {
            listener(notice);
        }
        true
    }

    /// Number of instances currently alive.
    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.alive.len()
    }

    /// Reports whether the lifetime identified by `token` is still tracked.
    #[must_use]
    pub fn is_alive(&self, token: LifeToken) -> bool {
        self.alive.contains_key(token)
    }

    /// Instance associated with a tracked lifetime.
    #[must_use]
    pub fn instance(&self, token: LifeToken) -> Option<InstanceKey> {
        self.alive.get(token).copied()
    }

    /// Tracked lifetimes whose instance is one of `instances`.
    #[must_use]
    pub fn lifetimes_of(&self, instances: &[InstanceKey]) -> Vec<LifeToken> {
        self.alive
            .iter()
            .filter(|(_, instance)| instances.contains(instance))
            .map(|(token, _)| token)
            .collect()
    }

    /// Forgets every tracked lifetime while keeping listeners attached.
    ///
    /// Tokens issued before the reset become stale, so stragglers reporting
    /// afterwards are ignored.
    pub fn reset_alive(&mut self) {
        self.alive.clear();
    }

    /// Forgets every tracked lifetime and detaches every listener.
    pub fn reset_all(&mut self) {
        self.reset_alive();
        self.listeners.clear();
    }

    /// Attaches a listener invoked once per successful death registration.
    pub fn subscribe(&mut self, listener: impl FnMut(DeathNotice) + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener = self.next_listener.wrapping_add(1);
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Detaches a listener, returning whether it was attached.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    /// Reports whether the listener is still attached.
    #[must_use]
    pub fn is_subscribed(&self, id: ListenerId) -> bool {
        self.listeners.iter().any(|(listener_id, _)| *listener_id == id)
    }

    /// Number of attached listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl fmt::Debug for AliveRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AliveRegistry")
            .field("alive", &self.alive.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
