#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Detects waves that stop making progress.
//!
//! A wave whose last instances never report their death would otherwise wait
//! forever. The watchdog only observes the event stream; it never ends a wave.

use std::time::Duration;

use wave_warden_core::{Event, WaveIndex};

/// Configuration parameters required to construct the watchdog.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    silence: Duration,
}

impl Config {
    /// Creates a configuration that warns after `silence` without progress.
    #[must_use]
    pub const fn new(silence: Duration) -> Self {
        Self { silence }
    }
}

/// Warning raised when a running wave has been silent for too long.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StallWarning {
    /// Wave that stopped making progress.
    pub wave: WaveIndex,
    /// Simulated time since the last spawn or death.
    pub silent_for: Duration,
}

/// Pure system tracking simulated time between spawns and deaths.
#[derive(Debug)]
pub struct StallWatchdog {
    silence: Duration,
    wave: Option<WaveIndex>,
    silent_for: Duration,
    warned: bool,
}

impl StallWatchdog {
    /// Creates a watchdog using the supplied configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            silence: config.silence,
            wave: None,
            silent_for: Duration::ZERO,
            warned: false,
        }
    }

    /// Consumes scheduler events, returning a warning once per silent stretch.
    pub fn handle(&mut self, events: &[Event]) -> Option<StallWarning> {
        let mut warning = None;
        for event in events {
            match event {
                Event::WaveStarted { wave, .. } => {
                    self.wave = Some(*wave);
                    self.rearm();
                }
                Event::InstanceSpawned { .. } | Event::EnemyDied { .. } => self.rearm(),
                Event::WaveCompleted { .. } | Event::AllWavesCompleted => {
                    self.wave = None;
                    self.rearm();
                }
                Event::TimeAdvanced { dt } => {
                    let Some(wave) = self.wave else {
                        continue;
                    };
                    self.silent_for = self.silent_for.saturating_add(*dt);
                    if self.silence.is_zero() || self.warned || self.silent_for < self.silence {
                        continue;
                    }
                    self.warned = true;
                    log::warn!(
                        "wave {} has made no progress for {:.1}s",
                        wave.get(),
                        self.silent_for.as_secs_f32()
                    );
                    warning = Some(StallWarning {
                        wave,
                        silent_for: self.silent_for,
                    });
                }
                _ => {}
            }
        }
        warning
    }

    /// Simulated time since the last progress of the running wave.
    #[must_use]
    pub const fn silent_for(&self) -> Duration {
        self.silent_for
    }

    fn rearm(&mut self) {
        self.silent_for = Duration::ZERO;
        self.warned = false;
    }
}
