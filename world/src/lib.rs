#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative session state management for Wave Warden.
//!
//! A [`Session`] owns the three stores the wave scheduler cooperates with: the
//! spawner directory, the instance pool, and the alive-lifecycle registry. It is
//! constructed explicitly per play session so that independent sessions never
//! share counters or listeners.

mod alive;
mod pool;
mod spawners;

use wave_warden_core::{Command, Event, InstanceFactory, InstanceKey};

pub use alive::{AliveRegistry, DeathNotice, ListenerId};
pub use pool::{InstancePool, PoolError};
pub use spawners::SpawnerDirectory;

/// Represents one play session's spawning state.
#[derive(Debug)]
pub struct Session<F: InstanceFactory> {
    spawners: SpawnerDirectory,
    pool: InstancePool<F>,
    alive: AliveRegistry,
}

impl<F: InstanceFactory> Session<F> {
    /// Creates an empty session that constructs instances through `factory`.
    #[must_use]
    pub fn new(factory: F) -> Self {
        Self::with_spawners(factory, SpawnerDirectory::new())
    }

    /// Creates a session around an already discovered spawner directory.
    #[must_use]
    pub fn with_spawners(factory: F, spawners: SpawnerDirectory) -> Self {
        Self {
            spawners,
            pool: InstancePool::new(factory),
            alive: AliveRegistry::new(),
        }
    }

    /// Provides read-only access to the spawner directory.
    #[must_use]
    pub fn spawners(&self) -> &SpawnerDirectory {
        &self.spawners
    }

    /// Provides read-only access to the instance pool.
    #[must_use]
    pub fn pool(&self) -> &InstancePool<F> {
        &self.pool
    }

    /// Provides mutable access to the instance pool.
    pub fn pool_mut(&mut self) -> &mut InstancePool<F> {
        &mut self.pool
    }

    /// Provides read-only access to the alive-lifecycle registry.
    #[must_use]
    pub fn alive(&self) -> &AliveRegistry {
        &self.alive
    }

    /// Provides mutable access to the alive-lifecycle registry.
    pub fn alive_mut(&mut self) -> &mut AliveRegistry {
        &mut self.alive
    }
}

/// Applies the provided command to the session, broadcasting the outcome.
pub fn apply<F: InstanceFactory>(
    session: &mut Session<F>,
    command: Command,
    out_events: &mut Vec<Event>,
) {
    match command {
        Command::RegisterSpawner { id, point } => match session.spawners.register(id.clone(), point)
        {
            Ok(()) => out_events.push(Event::SpawnerRegistered { id }),
            Err(reason) => {
                log::error!("rejected spawner `{id}`: {reason}");
                out_events.push(Event::SpawnerRejected { id, reason });
            }
        },
        Command::DeregisterSpawner { id } => {
            if session.spawners.deregister(&id).is_some() {
                out_events.push(Event::SpawnerDeregistered { id });
            }
        }
        Command::ReportDeath { token } => {
            if session.alive.register_death(token) {
                out_events.push(Event::EnemyDied {
                    remaining_alive: session.alive.alive_count(),
                });
            }
        }
        Command::ReleaseInstance { instance } => {
            let outcome = session.pool.release(instance);
            out_events.push(Event::InstanceReleased { instance, outcome });
        }
        Command::WarmUp { prototype, count } => match session.pool.warm_up(&prototype, count) {
            Ok(constructed) => {
                log::info!("warmed pool `{prototype}` with {constructed} instances");
                out_events.push(Event::PoolWarmed {
                    prototype,
                    constructed,
                });
            }
            Err(error) => {
                log::error!("warm-up failed: {error}");
                out_events.push(Event::WarmUpRejected { prototype });
            }
        },
        Command::ClearPool { prototype } => {
            let destroyed = session.pool.clear_pool(&prototype);
            out_events.push(Event::PoolCleared {
                prototype: Some(prototype),
                destroyed: destroyed.len(),
            });
            retire_destroyed(session, &destroyed, out_events);
        }
        Command::ClearAllPools => {
            let destroyed = session.pool.clear_all();
            out_events.push(Event::PoolCleared {
                prototype: None,
                destroyed: destroyed.len(),
            });
            retire_destroyed(session, &destroyed, out_events);
        }
        Command::ResetSession => {
            session.alive.reset_all();
            let destroyed = session.pool.clear_all().len();
            log::info!("session reset: {destroyed} pooled instances destroyed");
            out_events.push(Event::SessionReset { destroyed });
        }
    }
}

/// Counts down every tracked lifetime whose instance no longer exists.
fn retire_destroyed<F: InstanceFactory>(
    session: &mut Session<F>,
    destroyed: &[InstanceKey],
    out_events: &mut Vec<Event>,
) {
    let lifetimes = session.alive.lifetimes_of(destroyed);
    if !lifetimes.is_empty() {
        log::warn!(
            "{} alive instances were destroyed by a pool clear",
            lifetimes.len()
        );
    }
    for token in lifetimes {
        if session.alive.register_death(token) {
            out_events.push(Event::EnemyDied {
                remaining_alive: session.alive.alive_count(),
            });
        }
    }
}

/// Query functions that provide read-only access to the session state.
pub mod query {
    use wave_warden_core::{
        EmissionPoint, InstanceFactory, InstanceKey, LifeToken, PrototypeId, SpawnerId,
    };

    use super::Session;

    /// Looks up the emission point registered under `id`.
    #[must_use]
    pub fn spawner<F: InstanceFactory>(
        session: &Session<F>,
        id: &SpawnerId,
    ) -> Option<EmissionPoint> {
        session.spawners.resolve(id)
    }

    /// Number of instances currently registered as alive.
    #[must_use]
    pub fn alive_count<F: InstanceFactory>(session: &Session<F>) -> usize {
        session.alive.alive_count()
    }

    /// Reports whether the lifetime identified by `token` is still tracked.
    #[must_use]
    pub fn is_alive<F: InstanceFactory>(session: &Session<F>, token: LifeToken) -> bool {
        session.alive.is_alive(token)
    }

    /// Number of queued instances of `prototype` ready for reuse.
    #[must_use]
    pub fn available<F: InstanceFactory>(session: &Session<F>, prototype: &PrototypeId) -> usize {
        session.pool.available(prototype)
    }

    /// Total constructions performed for `prototype`.
    #[must_use]
    pub fn constructed<F: InstanceFactory>(session: &Session<F>, prototype: &PrototypeId) -> u64 {
        session.pool.constructed(prototype)
    }

    /// Borrows an instance owned by the pool.
    #[must_use]
    pub fn instance<F: InstanceFactory>(
        session: &Session<F>,
        key: InstanceKey,
    ) -> Option<&F::Instance> {
        session.pool.get(key)
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use glam::Vec3;
    use wave_warden_core::{
        DirectoryError, EmissionPoint, LifeToken, PrototypeId, ReleaseOutcome, Spawnable,
        SpawnerId,
    };

    use super::*;

    #[derive(Debug, Default)]
    struct Marker {
        active: bool,
    }

    impl Spawnable for Marker {
        fn place(&mut self, _point: EmissionPoint) {}

        fn set_active(&mut self, active: bool) {
            self.active = active;
        }

        fn begin_lifetime(&mut self, _token: LifeToken, _power_multiplier: f32) {}
    }

    #[derive(Debug)]
    struct MarkerFactory;

    impl InstanceFactory for MarkerFactory {
        type Instance = Marker;

        fn recognizes(&self, prototype: &PrototypeId) -> bool {
            prototype.as_str() == "marker"
        }

        fn construct(&mut self, prototype: &PrototypeId) -> Option<Marker> {
            self.recognizes(prototype).then(Marker::default)
        }
    }

    fn marker() -> PrototypeId {
        PrototypeId::new("marker")
    }

    #[test]
    fn apply_registers_and_rejects_spawners() {
        let mut session = Session::new(MarkerFactory);
        let mut events = Vec::new();
        let point = EmissionPoint::at(Vec3::X);

        apply(
            &mut session,
            Command::RegisterSpawner {
                id: SpawnerId::new("gate"),
                point,
            },
            &mut events,
        );
        apply(
            &mut session,
            Command::RegisterSpawner {
                id: SpawnerId::new("gate"),
                point,
            },
            &mut events,
        );

        assert_eq!(
            events,
            vec![
                Event::SpawnerRegistered {
                    id: SpawnerId::new("gate")
                },
                Event::SpawnerRejected {
                    id: SpawnerId::new("gate"),
                    reason: DirectoryError::Duplicate,
                },
            ]
        );
        assert_eq!(query::spawner(&session, &SpawnerId::new("gate")), Some(point));
    }

    #[test]
    fn report_death_broadcasts_only_counted_deaths() {
        let mut session = Session::new(MarkerFactory);
        let key = session
            .pool_mut()
            .acquire(&marker(), EmissionPoint::at(Vec3::ZERO))
            .expect("acquire");
        let token = session.alive_mut().register_spawn(key);
        let mut events = Vec::new();

        apply(&mut session, Command::ReportDeath { token }, &mut events);
        apply(&mut session, Command::ReportDeath { token }, &mut events);

        assert_eq!(events, vec![Event::EnemyDied { remaining_alive: 0 }]);
        assert_eq!(query::alive_count(&session), 0);
    }

    #[test]
    fn warm_up_and_release_round_through_the_pool() {
        let mut session = Session::new(MarkerFactory);
        let mut events = Vec::new();

        apply(
            &mut session,
            Command::WarmUp {
                prototype: marker(),
                count: 2,
            },
            &mut events,
        );
        apply(
            &mut session,
            Command::WarmUp {
                prototype: PrototypeId::new("ghost"),
                count: 1,
            },
            &mut events,
        );
        assert_eq!(query::available(&session, &marker()), 2);

        let key = session
            .pool_mut()
            .acquire(&marker(), EmissionPoint::at(Vec3::ZERO))
            .expect("acquire");
        apply(
            &mut session,
            Command::ReleaseInstance { instance: key },
            &mut events,
        );

        assert_eq!(
            events,
            vec![
                Event::PoolWarmed {
                    prototype: marker(),
                    constructed: 2,
                },
                Event::WarmUpRejected {
                    prototype: PrototypeId::new("ghost"),
                },
                Event::InstanceReleased {
                    instance: key,
                    outcome: ReleaseOutcome::Pooled,
                },
            ]
        );
        assert_eq!(query::constructed(&session, &marker()), 2);
        assert!(query::instance(&session, key).is_some_and(|marker| !marker.active));
    }

    #[test]
    fn clearing_a_pool_retires_the_lifetimes_it_destroys() {
        let mut session = Session::new(MarkerFactory);
        let deaths = Rc::new(Cell::new(0));
        let counter = Rc::clone(&deaths);
        let _ = session
            .alive_mut()
            .subscribe(move |_| counter.set(counter.get() + 1));
        let mut tokens = Vec::new();
        for _ in 0..2 {
            let key = session
                .pool_mut()
                .acquire(&marker(), EmissionPoint::at(Vec3::ZERO))
                .expect("acquire");
            tokens.push(session.alive_mut().register_spawn(key));
        }
        let adopted = session.pool_mut().adopt(Marker::default());
        let bystander = session.alive_mut().register_spawn(adopted);
        let mut events = Vec::new();

        apply(
            &mut session,
            Command::ClearPool { prototype: marker() },
            &mut events,
        );

        assert_eq!(
            events,
            vec![
                Event::PoolCleared {
                    prototype: Some(marker()),
                    destroyed: 2,
                },
                Event::EnemyDied { remaining_alive: 1 },
                Event::EnemyDied { remaining_alive: 0 },
            ]
        );
        assert_eq!(deaths.get(), 2);
        assert!(tokens.iter().all(|token| !query::is_alive(&session, *token)));
        assert!(query::is_alive(&session, bystander));

        events.clear();
        apply(&mut session, Command::ClearAllPools, &mut events);
        assert_eq!(
            events,
            vec![
                Event::PoolCleared {
                    prototype: None,
                    destroyed: 1,
                },
                Event::EnemyDied { remaining_alive: 0 },
            ]
        );
        assert_eq!(query::alive_count(&session), 0);
    }

    #[test]
    fn reset_session_clears_pools_and_lifetimes() {
        let mut session = Session::new(MarkerFactory);
        let key = session
            .pool_mut()
            .acquire(&marker(), EmissionPoint::at(Vec3::ZERO))
            .expect("acquire");
        let token = session.alive_mut().register_spawn(key);
        let _ = session.alive_mut().subscribe(|_| {});
        let mut events = Vec::new();

        apply(&mut session, Command::ResetSession, &mut events);

        assert_eq!(events, vec![Event::SessionReset { destroyed: 1 }]);
        assert!(!query::is_alive(&session, token));
        assert_eq!(session.alive().listener_count(), 0);
        assert!(session.pool().is_empty());
    }
}
