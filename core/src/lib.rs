#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Wave Warden engine.
//!
//! This crate defines the message surface that connects adapters, the
//! authoritative session, and pure systems. Adapters and entity collaborators
//! submit [`Command`] values describing desired mutations, the session executes
//! those commands via its `apply` entry point, and every observable transition
//! is broadcast as an [`Event`]. Authored content ([`WaveDefinition`] and
//! [`SpawnGroup`]) is validated on deserialisation so that systems only ever see
//! well-formed schedules.

mod content;

use std::{fmt, time::Duration};

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

pub use content::{ContentError, SpawnGroup, WaveDefinition};

slotmap::new_key_type! {
    /// Generational handle to an instance owned by the instance pool.
    ///
    /// The handle stays stable while an instance cycles between the active and
    /// pooled states; it is invalidated only when the instance is destroyed.
    pub struct InstanceKey;

    /// Generational handle issued when an instance is registered as alive.
    ///
    /// A fresh token is issued for every spawn, so a death reported with a token
    /// from an earlier lifetime of a recycled instance never matches the current
    /// lifetime.
    pub struct LifeToken;
}

/// Stable identifier of an emission point placed in the scene.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpawnerId(String);

impl SpawnerId {
    /// Creates a new spawner identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Retrieves the textual representation of the identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpawnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of the template the instance pool constructs and recycles.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrototypeId(String);

impl PrototypeId {
    /// Creates a new prototype identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Retrieves the textual representation of the identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrototypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Zero-based position of a wave inside the loaded wave list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WaveIndex(usize);

impl WaveIndex {
    /// Creates a new wave index.
    #[must_use]
    pub const fn new(value: usize) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the index.
    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Index of the wave that follows this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Spatial pose at which spawned instances enter the scene.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EmissionPoint {
    position: Vec3,
    orientation: Quat,
}

impl EmissionPoint {
    /// Creates an emission point from a position and orientation.
    #[must_use]
    pub const fn new(position: Vec3, orientation: Quat) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Creates an emission point facing down the default forward axis.
    #[must_use]
    pub const fn at(position: Vec3) -> Self {
        Self::new(position, Quat::IDENTITY)
    }

    /// World-space position of the emission point.
    #[must_use]
    pub const fn position(&self) -> Vec3 {
        self.position
    }

    /// Orientation applied to instances emitted from this point.
    #[must_use]
    pub const fn orientation(&self) -> Quat {
        self.orientation
    }
}

/// Contract the instance pool and the scheduler require from pooled entities.
pub trait Spawnable {
    /// Moves the instance to the provided emission point.
    fn place(&mut self, point: EmissionPoint);

    /// Activates or deactivates the instance in the scene.
    fn set_active(&mut self, active: bool);

    /// Starts a new scheduling lifetime for the instance.
    ///
    /// The instance must report its death with `token` exactly once, whether it
    /// is defeated or forcibly removed. `power_multiplier` scales its stats for
    /// this lifetime.
    fn begin_lifetime(&mut self, token: LifeToken, power_multiplier: f32);
}

/// Constructs instances for the prototypes a session knows about.
pub trait InstanceFactory {
    /// Concrete entity type handed out by the pool.
    type Instance: Spawnable;

    /// Reports whether the factory can construct the provided prototype.
    fn recognizes(&self, prototype: &PrototypeId) -> bool;

    /// Constructs a fresh instance, or `None` for an unknown prototype.
    fn construct(&mut self, prototype: &PrototypeId) -> Option<Self::Instance>;

    /// Tears down an instance that leaves the pool for good.
    fn destroy(&mut self, instance: Self::Instance) {
        drop(instance);
    }
}

/// Commands that express all permissible session mutations.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Registers an emission point discovered in the scene.
    RegisterSpawner {
        /// Identifier authored on the emission point.
        id: SpawnerId,
        /// Pose that spawned instances adopt.
        point: EmissionPoint,
    },
    /// Removes an emission point from the directory.
    DeregisterSpawner {
        /// Identifier of the emission point to remove.
        id: SpawnerId,
    },
    /// Reports that a spawned instance left play, for any reason.
    ReportDeath {
        /// Token issued when the instance was registered as alive.
        token: LifeToken,
    },
    /// Returns an instance to the pool it was acquired from.
    ReleaseInstance {
        /// Handle of the instance being returned.
        instance: InstanceKey,
    },
    /// Pre-constructs deactivated instances for a prototype.
    WarmUp {
        /// Prototype to construct.
        prototype: PrototypeId,
        /// Number of instances to add to the queue.
        count: u32,
    },
    /// Destroys every queued and in-use instance of a prototype.
    ///
    /// Lifetimes still tracked for destroyed instances are counted down as
    /// deaths, one `EnemyDied` each.
    ClearPool {
        /// Prototype whose instances are destroyed.
        prototype: PrototypeId,
    },
    /// Destroys every instance owned by the pool, retiring their lifetimes.
    ClearAllPools,
    /// Tears the session down: resets the alive registry and clears all pools.
    ///
    /// Death listeners are detached too. Meant for a session with no wave run
    /// in progress; a running scheduler re-attaches its kill counter on its
    /// next tick.
    ResetSession,
}

/// Events broadcast by the session and the scheduler.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    /// Indicates that the scheduler clock advanced.
    TimeAdvanced {
        /// Duration of simulated time that elapsed in the tick.
        dt: Duration,
    },
    /// Announces that a new wave list replaced the previous one.
    WavesLoaded {
        /// Number of waves in the list.
        count: usize,
    },
    /// Announces that a wave began dispatching its spawn groups.
    WaveStarted {
        /// Wave that started.
        wave: WaveIndex,
        /// Total number of instances the wave plans to emit.
        planned: u64,
    },
    /// Confirms that an instance was emitted into the scene.
    InstanceSpawned {
        /// Wave the instance belongs to.
        wave: WaveIndex,
        /// Position of the spawn group inside the wave's authored item list.
        group: usize,
        /// Pool handle of the emitted instance.
        instance: InstanceKey,
        /// Token the instance reports its death with.
        token: LifeToken,
    },
    /// Reports that a spawn group was dropped because its content is invalid.
    GroupAbandoned {
        /// Wave the group belongs to.
        wave: WaveIndex,
        /// Position of the spawn group inside the wave's authored item list.
        group: usize,
        /// Number of planned instances that will never be emitted.
        unspawned: u32,
        /// Specific reason the group could not be dispatched.
        reason: AbandonReason,
    },
    /// Fan-out notification that one registered instance died.
    EnemyDied {
        /// Alive count after the death was applied.
        remaining_alive: usize,
    },
    /// Announces that a wave satisfied its completion predicate.
    WaveCompleted {
        /// Wave that completed.
        wave: WaveIndex,
        /// Indicates whether the wave was ended by a forced-end request.
        forced: bool,
    },
    /// Announces the start of the countdown that precedes the next wave.
    InterWaveDelayStarted {
        /// Wave that will start when the countdown elapses.
        next: WaveIndex,
        /// Length of the countdown.
        delay: Duration,
    },
    /// Reports that a skip request cut the inter-wave countdown short.
    InterWaveDelaySkipped {
        /// Wave that starts as a result of the skip.
        next: WaveIndex,
    },
    /// Announces that the final wave completed.
    AllWavesCompleted,
    /// Confirms that an emission point joined the directory.
    SpawnerRegistered {
        /// Identifier of the registered emission point.
        id: SpawnerId,
    },
    /// Reports that an emission point was rejected by the directory.
    SpawnerRejected {
        /// Identifier carried by the rejected emission point.
        id: SpawnerId,
        /// Specific reason the registration failed.
        reason: DirectoryError,
    },
    /// Confirms that an emission point left the directory.
    SpawnerDeregistered {
        /// Identifier of the removed emission point.
        id: SpawnerId,
    },
    /// Reports the result of returning an instance to the pool.
    InstanceReleased {
        /// Handle of the returned instance.
        instance: InstanceKey,
        /// What the pool did with the instance.
        outcome: ReleaseOutcome,
    },
    /// Confirms that deactivated instances were added to a prototype queue.
    PoolWarmed {
        /// Prototype that was warmed.
        prototype: PrototypeId,
        /// Number of instances constructed.
        constructed: u32,
    },
    /// Reports that a warm-up request named a prototype the factory cannot build.
    WarmUpRejected {
        /// Prototype named by the request.
        prototype: PrototypeId,
    },
    /// Confirms that pooled instances were destroyed.
    PoolCleared {
        /// Prototype that was cleared, or `None` when every pool was cleared.
        prototype: Option<PrototypeId>,
        /// Number of instances destroyed.
        destroyed: usize,
    },
    /// Confirms that the session was torn down.
    SessionReset {
        /// Number of pooled instances destroyed during teardown.
        destroyed: usize,
    },
}

/// Reasons a spawn group may be abandoned at dispatch time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AbandonReason {
    /// No emission point is registered under the group's spawner id.
    UnknownSpawner,
    /// The instance factory cannot construct the group's prototype.
    UnknownPrototype,
}

/// Reasons the spawner directory may reject a registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, thiserror::Error)]
pub enum DirectoryError {
    /// An emission point with the same identifier is already registered.
    #[error("spawner id is already registered")]
    Duplicate,
    /// The emission point carries an empty identifier.
    #[error("spawner id is empty")]
    EmptyId,
}

/// Result of returning an instance to the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReleaseOutcome {
    /// The instance was deactivated and queued for reuse.
    Pooled,
    /// The instance had no recognised origin and was destroyed.
    Discarded,
    /// The instance was already sitting in its queue.
    AlreadyPooled,
    /// The handle does not refer to a live pooled instance.
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::{EmissionPoint, PrototypeId, SpawnerId, WaveIndex};
    use glam::{Quat, Vec3};

    #[test]
    fn identifiers_display_their_text() {
        assert_eq!(SpawnerId::new("north-gate").to_string(), "north-gate");
        assert_eq!(PrototypeId::new("grunt").as_str(), "grunt");
    }

    #[test]
    fn wave_index_advances_by_one() {
        assert_eq!(WaveIndex::new(3).next(), WaveIndex::new(4));
    }

    #[test]
    fn emission_point_defaults_to_identity_orientation() {
        let point = EmissionPoint::at(Vec3::new(1.0, 0.0, -2.0));
        assert_eq!(point.orientation(), Quat::IDENTITY);
        assert_eq!(point.position(), Vec3::new(1.0, 0.0, -2.0));
    }
}
