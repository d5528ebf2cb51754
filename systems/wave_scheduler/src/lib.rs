#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Cooperative wave scheduler that releases spawn groups under a concurrency cap.
//!
//! The scheduler is driven by discrete ticks. Every suspension point of a wave
//! (a group waiting for its start time, an emission held back by the alive cap,
//! the interval between two emissions, the wait for the wave to drain, and the
//! countdown between waves) is a piece of state that is re-evaluated once per
//! [`WaveScheduler::tick`]. Forced-end and skip requests are flags observed at
//! the next resumption, so no wait can outlive a cancellation.

use std::{cell::Cell, collections::VecDeque, rc::Rc, time::Duration};

use wave_warden_core::{
    AbandonReason, EmissionPoint, Event, InstanceFactory, PrototypeId, SpawnGroup, Spawnable,
    SpawnerId, WaveDefinition, WaveIndex,
};
use wave_warden_world::{ListenerId, Session};

/// Errors reported by the wave scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    /// A run is already in progress; the request was ignored.
    #[error("a wave run is already in progress")]
    AlreadyRunning,
    /// A driven run did not return to idle within the allowed number of ticks.
    #[error("wave run did not finish within {ticks} ticks")]
    TickLimitReached {
        /// Number of ticks that were executed.
        ticks: u64,
    },
}

/// Lifecycle phase of the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// No run is in progress.
    Idle,
    /// A wave is dispatching groups or waiting to drain.
    RunningWave {
        /// Wave being run.
        wave: WaveIndex,
    },
    /// The countdown before the next wave is running.
    InterWaveDelay {
        /// Wave that starts when the countdown elapses.
        next: WaveIndex,
        /// Time left on the countdown.
        remaining: Duration,
    },
}

/// Control signals a driven run's turn callback may raise.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interrupt {
    /// Cuts the running inter-wave countdown short.
    SkipInterWaveDelay,
    /// Ends the running wave without emitting its remaining instances.
    ForceEndCurrentWave,
}

/// Read-only snapshot of the scheduler's progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaveTelemetry {
    /// Phase the scheduler is in.
    pub phase: Phase,
    /// Wave most recently started, if any.
    pub wave: Option<WaveIndex>,
    /// Number of loaded waves.
    pub wave_count: usize,
    /// Instances the current wave plans to emit.
    pub planned: u64,
    /// Planned instances not yet emitted or written off.
    pub pending_to_spawn: u64,
    /// Instances emitted in the current wave.
    pub spawned: u64,
    /// Deaths observed during the current wave.
    pub killed: u64,
    /// Planned instances written off because their group was abandoned.
    pub abandoned: u64,
    /// Instances currently registered as alive.
    pub alive: usize,
    /// Concurrency cap of the current wave.
    pub alive_cap: u32,
    /// Running groups currently held back by the alive cap.
    pub blocked_groups: usize,
    /// Time left on the inter-wave countdown, when one is running.
    pub inter_wave_remaining: Option<Duration>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct WaveCounters {
    planned: u64,
    pending: u64,
    spawned: u64,
    abandoned: u64,
}

/// Group waiting for the wave clock to reach its start time.
#[derive(Clone, Debug)]
struct PendingGroup {
    position: usize,
    start_time: Duration,
    spawner: SpawnerId,
    prototype: PrototypeId,
    count: u32,
    interval: Duration,
    power_multiplier: f32,
}

impl PendingGroup {
    fn from_group(position: usize, group: &SpawnGroup) -> Self {
        Self {
            position,
            start_time: group.start_time(),
            spawner: group.spawner().clone(),
            prototype: group.prototype().clone(),
            count: group.count().get(),
            interval: group.interval(),
            power_multiplier: group.power_multiplier(),
        }
    }
}

/// Emission sub-task of a launched group.
#[derive(Clone, Debug)]
struct GroupTask {
    position: usize,
    point: EmissionPoint,
    prototype: PrototypeId,
    remaining: u32,
    interval: Duration,
    power_multiplier: f32,
    next_at: Duration,
    next_tick: u64,
    blocked: bool,
}

impl GroupTask {
    fn launch(group: PendingGroup, point: EmissionPoint, clock: Duration, tick: u64) -> Self {
        Self {
            position: group.position,
            point,
            prototype: group.prototype,
            remaining: group.count,
            interval: group.interval,
            power_multiplier: group.power_multiplier,
            next_at: clock,
            next_tick: tick,
            blocked: false,
        }
    }

    /// Interval elapsed and, for zero intervals, at least one tick yielded.
    fn is_due(&self, clock: Duration, tick: u64) -> bool {
        clock >= self.next_at && tick >= self.next_tick
    }
}

/// Orchestrates a list of waves against a [`Session`].
#[derive(Debug)]
pub struct WaveScheduler {
    waves: Vec<WaveDefinition>,
    phase: Phase,
    wave: Option<WaveIndex>,
    clock: Duration,
    tick_index: u64,
    alive_cap: u32,
    dispatch: VecDeque<PendingGroup>,
    tasks: Vec<GroupTask>,
    counters: WaveCounters,
    force_end: bool,
    skip_requested: bool,
    kills: Rc<Cell<u64>>,
    kill_listener: Option<ListenerId>,
}

impl Default for WaveScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl WaveScheduler {
    /// Creates an idle scheduler with no waves loaded.
    #[must_use]
    pub fn new() -> Self {
        Self {
            waves: Vec::new(),
            phase: Phase::Idle,
            wave: None,
            clock: Duration::ZERO,
            tick_index: 0,
            alive_cap: 0,
            dispatch: VecDeque::new(),
            tasks: Vec::new(),
            counters: WaveCounters::default(),
            force_end: false,
            skip_requested: false,
            kills: Rc::new(Cell::new(0)),
            kill_listener: None,
        }
    }

    /// Replaces the wave list. Rejected while a run is in progress.
    pub fn load_waves(
        &mut self,
        waves: Vec<WaveDefinition>,
        out: &mut Vec<Event>,
    ) -> Result<(), SchedulerError> {
        if self.phase != Phase::Idle {
            log::warn!("ignoring wave list replacement while a run is in progress");
            return Err(SchedulerError::AlreadyRunning);
        }

        let count = waves.len();
        self.waves = waves;
        self.wave = None;
        self.counters = WaveCounters::default();
        log::info!("loaded {count} waves");
        out.push(Event::WavesLoaded { count });
        Ok(())
    }

    /// Starts running the loaded waves from the first one.
    ///
    /// The first wave begins on this call, so groups starting at zero are
    /// emitted immediately. A second call while a run is active is rejected and
    /// leaves the active run untouched.
    pub fn run<F: InstanceFactory>(
        &mut self,
        session: &mut Session<F>,
        out: &mut Vec<Event>,
    ) -> Result<(), SchedulerError> {
        if self.phase != Phase::Idle {
            log::warn!("run requested while a wave run is already in progress");
            return Err(SchedulerError::AlreadyRunning);
        }

        if self.waves.is_empty() {
            log::warn!("run requested with no waves loaded");
            out.push(Event::AllWavesCompleted);
            return Ok(());
        }

        self.begin_wave(WaveIndex::new(0), session, out);
        self.drive(session, out);
        Ok(())
    }

    /// Requests that the running inter-wave countdown end at the next tick.
    ///
    /// Returns `false` when no countdown is running.
    pub fn skip_inter_wave_delay(&mut self) -> bool {
        if matches!(self.phase, Phase::InterWaveDelay { .. }) {
            self.skip_requested = true;
            return true;
        }
        log::debug!("skip ignored outside of an inter-wave countdown");
        false
    }

    /// Requests that the running wave end at the next tick.
    ///
    /// Outstanding groups stop emitting; instances already emitted stay tracked
    /// until they report their death. Returns `false` when no wave is running.
    pub fn force_end_current_wave(&mut self) -> bool {
        if matches!(self.phase, Phase::RunningWave { .. }) {
            self.force_end = true;
            return true;
        }
        log::debug!("forced end ignored while no wave is running");
        false
    }

    /// Advances the scheduler by `dt`, resuming every suspended wait once.
    pub fn tick<F: InstanceFactory>(
        &mut self,
        dt: Duration,
        session: &mut Session<F>,
        out: &mut Vec<Event>,
    ) {
        self.tick_index = self.tick_index.wrapping_add(1);
        if self.phase != Phase::Idle {
            self.reattach_kill_counter(session);
        }

        match self.phase {
            Phase::Idle => return,
            Phase::RunningWave { .. } => {
                out.push(Event::TimeAdvanced { dt });
                self.clock = self.clock.saturating_add(dt);
            }
            Phase::InterWaveDelay { next, remaining } => {
                out.push(Event::TimeAdvanced { dt });
                if self.skip_requested {
                    log::info!("inter-wave countdown skipped");
                    out.push(Event::InterWaveDelaySkipped { next });
                    self.begin_wave(next, session, out);
                } else {
                    let remaining = remaining.saturating_sub(dt);
                    if !remaining.is_zero() {
                        self.phase = Phase::InterWaveDelay { next, remaining };
                        return;
                    }
                    self.begin_wave(next, session, out);
                }
            }
        }

        self.drive(session, out);
    }

    /// Runs the loaded waves to completion with a fixed time step.
    ///
    /// `turn` is invoked after the run starts and after every tick with the
    /// events produced since the previous turn. It is the place where entity
    /// collaborators report deaths and where callers raise [`Interrupt`]s, all
    /// on the scheduler's own turn. Returns the number of ticks executed.
    pub fn run_until_idle<F, H>(
        &mut self,
        session: &mut Session<F>,
        step: Duration,
        max_ticks: u64,
        mut turn: H,
    ) -> Result<u64, SchedulerError>
    where
        F: InstanceFactory,
        H: FnMut(&mut Session<F>, &[Event], &mut Vec<Interrupt>),
    {
        let mut events = Vec::new();
        let mut interrupts = Vec::new();
        self.run(session, &mut events)?;

        let mut ticks = 0;
        loop {
            turn(&mut *session, &events, &mut interrupts);
            for interrupt in interrupts.drain(..) {
                let _ = match interrupt {
                    Interrupt::SkipInterWaveDelay => self.skip_inter_wave_delay(),
                    Interrupt::ForceEndCurrentWave => self.force_end_current_wave(),
                };
            }

            if self.phase == Phase::Idle {
                return Ok(ticks);
            }
            if ticks >= max_ticks {
                log::warn!("wave run stopped after {ticks} ticks without finishing");
                return Err(SchedulerError::TickLimitReached { ticks });
            }

            events.clear();
            self.tick(step, session, &mut events);
            ticks += 1;
        }
    }

    /// Phase the scheduler is in.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Reports whether a run is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// Wave most recently started, if any.
    #[must_use]
    pub const fn current_wave(&self) -> Option<WaveIndex> {
        self.wave
    }

    /// Number of loaded waves.
    #[must_use]
    pub fn wave_count(&self) -> usize {
        self.waves.len()
    }

    /// Planned instances of the current wave not yet emitted or written off.
    #[must_use]
    pub const fn pending_to_spawn(&self) -> u64 {
        self.counters.pending
    }

    /// Deaths observed during the current wave.
    #[must_use]
    pub fn killed_this_wave(&self) -> u64 {
        self.kills.get()
    }

    /// Time left on the inter-wave countdown, when one is running.
    #[must_use]
    pub const fn inter_wave_remaining(&self) -> Option<Duration> {
        match self.phase {
            Phase::InterWaveDelay { remaining, .. } => Some(remaining),
            _ => None,
        }
    }

    /// Captures a snapshot of the scheduler's progress.
    #[must_use]
    pub fn telemetry<F: InstanceFactory>(&self, session: &Session<F>) -> WaveTelemetry {
        WaveTelemetry {
            phase: self.phase,
            wave: self.wave,
            wave_count: self.waves.len(),
            planned: self.counters.planned,
            pending_to_spawn: self.counters.pending,
            spawned: self.counters.spawned,
            killed: self.kills.get(),
            abandoned: self.counters.abandoned,
            alive: session.alive().alive_count(),
            alive_cap: self.alive_cap,
            blocked_groups: self.tasks.iter().filter(|task| task.blocked).count(),
            inter_wave_remaining: self.inter_wave_remaining(),
        }
    }

    fn begin_wave<F: InstanceFactory>(
        &mut self,
        wave: WaveIndex,
        session: &mut Session<F>,
        out: &mut Vec<Event>,
    ) {
        let Some(definition) = self.waves.get(wave.get()) else {
            self.phase = Phase::Idle;
            out.push(Event::AllWavesCompleted);
            return;
        };

        let planned = definition.planned_total();
        let alive_cap = definition.alive_cap().get();
        let dispatch: VecDeque<PendingGroup> = definition
            .dispatch_order()
            .into_iter()
            .map(|(position, group)| PendingGroup::from_group(position, group))
            .collect();
        log::info!(
            "wave {} `{}` started: {planned} planned across {} groups, alive cap {alive_cap}",
            wave.get(),
            definition.name(),
            dispatch.len(),
        );

        session.alive_mut().reset_alive();
        self.attach_kill_counter(session);

        self.phase = Phase::RunningWave { wave };
        self.wave = Some(wave);
        self.clock = Duration::ZERO;
        self.alive_cap = alive_cap;
        self.dispatch = dispatch;
        self.tasks.clear();
        self.counters = WaveCounters {
            planned,
            pending: planned,
            spawned: 0,
            abandoned: 0,
        };
        self.force_end = false;
        self.skip_requested = false;

        out.push(Event::WaveStarted { wave, planned });
    }

    fn attach_kill_counter<F: InstanceFactory>(&mut self, session: &mut Session<F>) {
        if let Some(listener) = self.kill_listener.take() {
            let _ = session.alive_mut().unsubscribe(listener);
        }
        self.kills.set(0);
        self.subscribe_kill_counter(session);
    }

    /// Subscribes again when a session reset detached the kill counter mid-run.
    fn reattach_kill_counter<F: InstanceFactory>(&mut self, session: &mut Session<F>) {
        let attached = self
            .kill_listener
            .is_some_and(|listener| session.alive().is_subscribed(listener));
        if !attached {
            log::warn!("kill counter was detached during a run; re-attaching");
            self.subscribe_kill_counter(session);
        }
    }

    fn subscribe_kill_counter<F: InstanceFactory>(&mut self, session: &mut Session<F>) {
        let kills = Rc::clone(&self.kills);
        self.kill_listener = Some(
            session
                .alive_mut()
                .subscribe(move |_| kills.set(kills.get().saturating_add(1))),
        );
    }

    fn drive<F: InstanceFactory>(&mut self, session: &mut Session<F>, out: &mut Vec<Event>) {
        while let Phase::RunningWave { wave } = self.phase {
            self.step_wave(wave, session, out);
            if !self.wave_finished(session) {
                break;
            }
            self.finish_wave(wave, session, out);
        }
    }

    fn step_wave<F: InstanceFactory>(
        &mut self,
        wave: WaveIndex,
        session: &mut Session<F>,
        out: &mut Vec<Event>,
    ) {
        if self.force_end {
            return;
        }
        self.launch_due_groups(wave, session, out);
        self.advance_tasks(wave, session, out);
    }

    fn launch_due_groups<F: InstanceFactory>(
        &mut self,
        wave: WaveIndex,
        session: &Session<F>,
        out: &mut Vec<Event>,
    ) {
        while self
            .dispatch
            .front()
            .is_some_and(|group| group.start_time <= self.clock)
        {
            let Some(group) = self.dispatch.pop_front() else {
                break;
            };

            let Some(point) = session.spawners().resolve(&group.spawner) else {
                log::error!(
                    "wave {} group {}: spawner `{}` is not registered",
                    wave.get(),
                    group.position,
                    group.spawner,
                );
                self.abandon(
                    wave,
                    group.position,
                    group.count,
                    AbandonReason::UnknownSpawner,
                    out,
                );
                continue;
            };

            if !session.pool().factory().recognizes(&group.prototype) {
                log::error!(
                    "wave {} group {}: prototype `{}` is unknown",
                    wave.get(),
                    group.position,
                    group.prototype,
                );
                self.abandon(
                    wave,
                    group.position,
                    group.count,
                    AbandonReason::UnknownPrototype,
                    out,
                );
                continue;
            }

            log::debug!(
                "wave {} group {} launched: {} x `{}` from `{}`",
                wave.get(),
                group.position,
                group.count,
                group.prototype,
                group.spawner,
            );
            self.tasks
                .push(GroupTask::launch(group, point, self.clock, self.tick_index));
        }
    }

    fn advance_tasks<F: InstanceFactory>(
        &mut self,
        wave: WaveIndex,
        session: &mut Session<F>,
        out: &mut Vec<Event>,
    ) {
        let clock = self.clock;
        let tick = self.tick_index;
        let alive_cap = usize::try_from(self.alive_cap).unwrap_or(usize::MAX);

        for task in &mut self.tasks {
            if task.remaining == 0 || !task.is_due(clock, tick) {
                continue;
            }

            if session.alive().alive_count() >= alive_cap {
                task.blocked = true;
                continue;
            }
            task.blocked = false;

            let instance = match session.pool_mut().acquire(&task.prototype, task.point) {
                Ok(instance) => instance,
                Err(error) => {
                    log::error!(
                        "wave {} group {} abandoned: {error}",
                        wave.get(),
                        task.position
                    );
                    let unspawned = u64::from(task.remaining);
                    self.counters.pending = self.counters.pending.saturating_sub(unspawned);
                    self.counters.abandoned = self.counters.abandoned.saturating_add(unspawned);
                    out.push(Event::GroupAbandoned {
                        wave,
                        group: task.position,
                        unspawned: task.remaining,
                        reason: AbandonReason::UnknownPrototype,
                    });
                    task.remaining = 0;
                    continue;
                }
            };

            let token = session.alive_mut().register_spawn(instance);
            if let Some(entity) = session.pool_mut().get_mut(instance) {
                entity.begin_lifetime(token, task.power_multiplier);
            }

            task.remaining -= 1;
            task.next_at = clock.saturating_add(task.interval);
            task.next_tick = tick.wrapping_add(1);
            self.counters.pending = self.counters.pending.saturating_sub(1);
            self.counters.spawned = self.counters.spawned.saturating_add(1);
            out.push(Event::InstanceSpawned {
                wave,
                group: task.position,
                instance,
                token,
            });
        }

        self.tasks.retain(|task| task.remaining > 0);
    }

    fn abandon(
        &mut self,
        wave: WaveIndex,
        position: usize,
        unspawned: u32,
        reason: AbandonReason,
        out: &mut Vec<Event>,
    ) {
        let written_off = u64::from(unspawned);
        self.counters.pending = self.counters.pending.saturating_sub(written_off);
        self.counters.abandoned = self.counters.abandoned.saturating_add(written_off);
        out.push(Event::GroupAbandoned {
            wave,
            group: position,
            unspawned,
            reason,
        });
    }

    fn wave_finished<F: InstanceFactory>(&self, session: &Session<F>) -> bool {
        self.force_end || (self.counters.pending == 0 && session.alive().alive_count() == 0)
    }

    fn finish_wave<F: InstanceFactory>(
        &mut self,
        wave: WaveIndex,
        session: &mut Session<F>,
        out: &mut Vec<Event>,
    ) {
        let forced = self.force_end;
        if forced {
            log::info!(
                "wave {} force-ended: {} instances never emitted, {} still alive",
                wave.get(),
                self.counters.pending,
                session.alive().alive_count(),
            );
        } else {
            log::info!(
                "wave {} completed: {} spawned, {} killed",
                wave.get(),
                self.counters.spawned,
                self.kills.get(),
            );
        }

        self.dispatch.clear();
        self.tasks.clear();
        self.force_end = false;
        out.push(Event::WaveCompleted { wave, forced });

        let next = wave.next();
        let Some(delay) = self
            .waves
            .get(wave.get())
            .filter(|_| next.get() < self.waves.len())
            .map(WaveDefinition::inter_wave_delay)
        else {
            log::info!("all {} waves completed", self.waves.len());
            self.phase = Phase::Idle;
            out.push(Event::AllWavesCompleted);
            return;
        };

        out.push(Event::InterWaveDelayStarted { next, delay });
        if delay.is_zero() {
            self.begin_wave(next, session, out);
        } else {
            self.phase = Phase::InterWaveDelay {
                next,
                remaining: delay,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_task_waits_one_tick_for_zero_interval() {
        let mut task = GroupTask {
            position: 0,
            point: EmissionPoint::at(glam::Vec3::ZERO),
            prototype: PrototypeId::new("grunt"),
            remaining: 2,
            interval: Duration::ZERO,
            power_multiplier: 1.0,
            next_at: Duration::ZERO,
            next_tick: 4,
            blocked: false,
        };
        assert!(task.is_due(Duration::ZERO, 4));

        task.next_tick = 5;
        assert!(!task.is_due(Duration::from_secs(10), 4));
        assert!(task.is_due(Duration::ZERO, 5));
    }

    #[test]
    fn idle_scheduler_ignores_control_signals() {
        let mut scheduler = WaveScheduler::new();
        assert!(!scheduler.skip_inter_wave_delay());
        assert!(!scheduler.force_end_current_wave());
        assert_eq!(scheduler.phase(), Phase::Idle);
        assert_eq!(scheduler.inter_wave_remaining(), None);
    }
}
