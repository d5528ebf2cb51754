//! Headless stand-in for the entity layer that plays a scenario to completion.
//!
//! Spawned drones live for an exponentially distributed span of simulated time
//! scaled by their prototype and power multiplier, then report their death and
//! return to the pool. The same seed always replays the same run.

use std::{collections::BTreeMap, time::Duration};

use anyhow::{anyhow, Context, Result};
use glam::Vec3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Exp};
use serde::Serialize;
use wave_warden_core::{
    Command, EmissionPoint, Event, InstanceFactory, InstanceKey, LifeToken, PrototypeId, Spawnable,
    WaveDefinition,
};
use wave_warden_system_warmup::WarmUp;
use wave_warden_system_watchdog::{Config as WatchdogConfig, StallWatchdog};
use wave_warden_system_wave_scheduler::{Interrupt, WaveScheduler};
use wave_warden_world::{self as world, query, Session};

use crate::scenario::Scenario;

const MIN_POWER_MULTIPLIER: f32 = 0.1;
const MAX_LIFETIME_SECS: f32 = 600.0;

/// Simulated enemy handed out by the instance pool.
#[derive(Debug)]
pub(crate) struct Drone {
    prototype: PrototypeId,
    position: Vec3,
    active: bool,
    token: Option<LifeToken>,
    power: f32,
}

impl Spawnable for Drone {
    fn place(&mut self, point: EmissionPoint) {
        self.position = point.position();
    }

    fn set_active(&mut self, active: bool) {
        self.active = active;
        if !active {
            self.token = None;
        }
    }

    fn begin_lifetime(&mut self, token: LifeToken, power_multiplier: f32) {
        self.token = Some(token);
        self.power = power_multiplier;
    }
}

/// Constructs drones for every catalogued prototype.
#[derive(Debug, Default)]
pub(crate) struct DroneFactory {
    lifetime_scales: BTreeMap<PrototypeId, f32>,
    destroyed: u64,
}

impl DroneFactory {
    /// Adds a prototype to the catalogue, returning `false` when it was already listed.
    pub(crate) fn catalogue(&mut self, prototype: PrototypeId, lifetime_scale: f32) -> bool {
        if self.lifetime_scales.contains_key(&prototype) {
            return false;
        }
        let _ = self.lifetime_scales.insert(prototype, lifetime_scale);
        true
    }

    fn lifetime_scale(&self, prototype: &PrototypeId) -> f32 {
        self.lifetime_scales.get(prototype).copied().unwrap_or(1.0)
    }

    fn prototypes(&self) -> impl Iterator<Item = &PrototypeId> {
        self.lifetime_scales.keys()
    }
}

impl InstanceFactory for DroneFactory {
    type Instance = Drone;

    fn recognizes(&self, prototype: &PrototypeId) -> bool {
        self.lifetime_scales.contains_key(prototype)
    }

    fn construct(&mut self, prototype: &PrototypeId) -> Option<Drone> {
        self.recognizes(prototype).then(|| Drone {
            prototype: prototype.clone(),
            position: Vec3::ZERO,
            active: false,
            token: None,
            power: 1.0,
        })
    }

    fn destroy(&mut self, instance: Drone) {
        log::trace!("destroying `{}` drone", instance.prototype);
        self.destroyed = self.destroyed.saturating_add(1);
    }
}

/// Tunables of a simulation run.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Settings {
    /// Fixed simulated time step.
    pub(crate) step: Duration,
    /// Mean drone lifetime before prototype and power scaling.
    pub(crate) mean_lifetime: Duration,
    /// Silence after which the watchdog warns; zero disables it.
    pub(crate) stall_after: Duration,
    /// Cuts every inter-wave countdown short.
    pub(crate) skip_delays: bool,
    /// Force-ends any wave that runs longer than this.
    pub(crate) force_end_after: Option<Duration>,
    /// Step budget before the run is abandoned.
    pub(crate) max_steps: u64,
    /// Seed of the lifetime generator.
    pub(crate) seed: u64,
}

/// Outcome of a simulation run.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub(crate) struct Summary {
    pub(crate) waves: usize,
    pub(crate) waves_completed: u32,
    pub(crate) waves_forced: u32,
    pub(crate) delays_skipped: u32,
    pub(crate) groups_abandoned: u32,
    pub(crate) spawned: u64,
    pub(crate) killed: u64,
    pub(crate) stall_warnings: u32,
    pub(crate) ticks: u64,
    pub(crate) simulated_seconds: f64,
    pub(crate) constructed: BTreeMap<String, u64>,
    pub(crate) destroyed_on_reset: usize,
}

#[derive(Clone, Copy, Debug)]
struct ScheduledDeath {
    at: Duration,
    instance: InstanceKey,
    token: LifeToken,
}

/// Reacts to scheduler events on the scheduler's own turn.
#[derive(Debug)]
struct Director {
    waves: Vec<WaveDefinition>,
    warm_up: WarmUp,
    watchdog: StallWatchdog,
    rng: ChaCha8Rng,
    lifetime: Exp<f32>,
    skip_delays: bool,
    force_end_after: Option<Duration>,
    clock: Duration,
    wave_clock: Duration,
    wave_running: bool,
    force_end_requested: bool,
    deaths: Vec<ScheduledDeath>,
    summary: Summary,
}

impl Director {
    fn new(waves: Vec<WaveDefinition>, settings: &Settings) -> Result<Self> {
        let mean = settings.mean_lifetime.as_secs_f32();
        let lifetime = Exp::new(1.0 / mean)
            .map_err(|error| anyhow!("invalid mean lifetime {mean}s: {error}"))?;

        Ok(Self {
            summary: Summary {
                waves: waves.len(),
                ..Summary::default()
            },
            waves,
            warm_up: WarmUp::new(),
            watchdog: StallWatchdog::new(WatchdogConfig::new(settings.stall_after)),
            rng: ChaCha8Rng::seed_from_u64(settings.seed),
            lifetime,
            skip_delays: settings.skip_delays,
            force_end_after: settings.force_end_after,
            clock: Duration::ZERO,
            wave_clock: Duration::ZERO,
            wave_running: false,
            force_end_requested: false,
            deaths: Vec::new(),
        })
    }

    fn observe(
        &mut self,
        session: &mut Session<DroneFactory>,
        events: &[Event],
        interrupts: &mut Vec<Interrupt>,
    ) {
        for event in events {
            match event {
                Event::TimeAdvanced { dt } => {
                    self.clock = self.clock.saturating_add(*dt);
                    if self.wave_running {
                        self.wave_clock = self.wave_clock.saturating_add(*dt);
                    }
                }
                Event::WaveStarted { .. } => {
                    self.wave_running = true;
                    self.wave_clock = Duration::ZERO;
                    self.force_end_requested = false;
                }
                Event::InstanceSpawned { instance, .. } => {
                    self.summary.spawned += 1;
                    self.schedule_death(session, *instance);
                }
                Event::GroupAbandoned { .. } => self.summary.groups_abandoned += 1,
                Event::WaveCompleted { forced, .. } => {
                    self.wave_running = false;
                    if *forced {
                        self.summary.waves_forced += 1;
                    } else {
                        self.summary.waves_completed += 1;
                    }
                }
                Event::InterWaveDelayStarted { delay, .. } if self.skip_delays => {
                    if !delay.is_zero() {
                        interrupts.push(Interrupt::SkipInterWaveDelay);
                    }
                }
                Event::InterWaveDelaySkipped { .. } => self.summary.delays_skipped += 1,
                _ => {}
            }
        }

        let mut fallout = Vec::new();
        self.warm(session, events, &mut fallout);
        self.retire_due(session, &mut fallout);

        for batch in [events, fallout.as_slice()] {
            if self.watchdog.handle(batch).is_some() {
                self.summary.stall_warnings += 1;
            }
        }

        if let Some(limit) = self.force_end_after {
            if self.wave_running && !self.force_end_requested && self.wave_clock >= limit {
                log::info!("wave exceeded {:.1}s, forcing it to end", limit.as_secs_f32());
                interrupts.push(Interrupt::ForceEndCurrentWave);
                self.force_end_requested = true;
            }
        }
    }

    fn warm(&mut self, session: &mut Session<DroneFactory>, events: &[Event], out: &mut Vec<Event>) {
        let mut commands = Vec::new();
        self.warm_up.handle(
            events,
            &self.waves,
            |prototype| query::available(&*session, prototype),
            &mut commands,
        );
        for command in commands {
            world::apply(session, command, out);
        }
    }

    fn schedule_death(&mut self, session: &Session<DroneFactory>, instance: InstanceKey) {
        let Some(drone) = query::instance(session, instance) else {
            return;
        };
        let Some(token) = drone.token.filter(|_| drone.active) else {
            log::warn!("spawned `{}` drone has no lifetime", drone.prototype);
            return;
        };

        let scale = session.pool().factory().lifetime_scale(&drone.prototype)
            * drone.power.max(MIN_POWER_MULTIPLIER);
        let seconds = (self.lifetime.sample(&mut self.rng) * scale).clamp(0.0, MAX_LIFETIME_SECS);
        log::debug!(
            "`{}` drone entered at {} and lives {seconds:.2}s",
            drone.prototype,
            drone.position
        );
        self.deaths.push(ScheduledDeath {
            at: self.clock.saturating_add(Duration::from_secs_f32(seconds)),
            instance,
            token,
        });
    }

    fn retire_due(&mut self, session: &mut Session<DroneFactory>, out: &mut Vec<Event>) {
        let clock = self.clock;
        let (due, waiting): (Vec<ScheduledDeath>, Vec<ScheduledDeath>) =
            self.deaths.drain(..).partition(|death| death.at <= clock);
        self.deaths = waiting;

        let start = out.len();
        for death in due {
            world::apply(session, Command::ReportDeath { token: death.token }, out);
            world::apply(
                session,
                Command::ReleaseInstance {
                    instance: death.instance,
                },
                out,
            );
        }
        let killed = out[start..]
            .iter()
            .filter(|event| matches!(event, Event::EnemyDied { .. }))
            .count();
        self.summary.killed += killed as u64;
    }
}

/// Plays every wave of `scenario` and reports what happened.
pub(crate) fn simulate(scenario: &Scenario, settings: &Settings) -> Result<Summary> {
    let directory = scenario.spawner_directory()?;
    let factory = scenario.factory()?;
    let prototypes: Vec<PrototypeId> = factory.prototypes().cloned().collect();
    let mut session = Session::with_spawners(factory, directory);
    let mut director = Director::new(scenario.waves().to_vec(), settings)?;
    let mut scheduler = WaveScheduler::new();

    let mut loaded = Vec::new();
    scheduler.load_waves(scenario.waves().to_vec(), &mut loaded)?;
    director.observe(&mut session, &loaded, &mut Vec::new());

    let ticks = scheduler
        .run_until_idle(
            &mut session,
            settings.step,
            settings.max_steps,
            |session, events, interrupts| director.observe(session, events, interrupts),
        )
        .context("wave run did not finish")?;

    let mut summary = director.summary;
    summary.ticks = ticks;
    summary.simulated_seconds = director.clock.as_secs_f64();
    summary.constructed = prototypes
        .iter()
        .map(|prototype| {
            (
                prototype.to_string(),
                query::constructed(&session, prototype),
            )
        })
        .collect();

    let mut teardown = Vec::new();
    world::apply(&mut session, Command::ResetSession, &mut teardown);
    summary.destroyed_on_reset = teardown
        .iter()
        .map(|event| match event {
            Event::SessionReset { destroyed } => *destroyed,
            _ => 0,
        })
        .sum();
    log::debug!(
        "factory destroyed {} drones in total",
        session.pool().factory().destroyed
    );

    Ok(summary)
}
