#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Pool warm-up planning for upcoming waves.
//!
//! Before a wave begins the system requests enough pooled instances per
//! prototype to cover the largest simultaneous release the wave schedules, so
//! the first emissions of a burst recycle instead of constructing.

use std::{
    collections::{BTreeMap, HashMap},
    time::Duration,
};

use wave_warden_core::{Command, Event, PrototypeId, WaveDefinition, WaveIndex};

/// Computes how many instances of each prototype a wave may need at once.
///
/// Counts of groups sharing a start time are summed, the largest sum across
/// start times is kept per prototype and clamped to the wave's alive cap.
#[must_use]
pub fn peak_demand(wave: &WaveDefinition) -> BTreeMap<PrototypeId, u32> {
    let mut bursts: HashMap<(&PrototypeId, Duration), u32> = HashMap::new();
    for group in wave.items() {
        let burst = bursts
            .entry((group.prototype(), group.start_time()))
            .or_default();
        *burst = burst.saturating_add(group.count().get());
    }

    let cap = wave.alive_cap().get();
    let mut peaks = BTreeMap::new();
    for ((prototype, _), burst) in bursts {
        let peak = peaks.entry(prototype.clone()).or_insert(0);
        *peak = (*peak).max(burst.min(cap));
    }
    peaks
}

/// Pure system that emits warm-up commands ahead of each wave.
#[derive(Debug, Default)]
pub struct WarmUp {
    last_planned: Option<WaveIndex>,
}

impl WarmUp {
    /// Creates a warm-up system that has not planned any wave yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes scheduler events and emits warm-up commands for the next wave.
    ///
    /// `available` reports how many instances of a prototype are already queued
    /// in the pool; only the shortfall is requested.
    pub fn handle(
        &mut self,
        events: &[Event],
        waves: &[WaveDefinition],
        available: impl Fn(&PrototypeId) -> usize,
        out: &mut Vec<Command>,
    ) {
        for event in events {
            let target = match event {
                Event::WavesLoaded { .. } => {
                    self.last_planned = None;
                    WaveIndex::new(0)
                }
                Event::InterWaveDelayStarted { next, .. } => *next,
                _ => continue,
            };

            if self.last_planned == Some(target) {
                continue;
            }
            let Some(wave) = waves.get(target.get()) else {
                continue;
            };
            self.last_planned = Some(target);
            plan(target, wave, &available, out);
        }
    }
}

fn plan(
    target: WaveIndex,
    wave: &WaveDefinition,
    available: &impl Fn(&PrototypeId) -> usize,
    out: &mut Vec<Command>,
) {
    for (prototype, peak) in peak_demand(wave) {
        let queued = u32::try_from(available(&prototype)).unwrap_or(u32::MAX);
        let shortfall = peak.saturating_sub(queued);
        if shortfall == 0 {
            continue;
        }
        log::debug!(
            "warming `{prototype}` with {shortfall} instances for wave {}",
            target.get()
        );
        out.push(Command::WarmUp {
            prototype,
            count: shortfall,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use wave_warden_core::{SpawnGroup, SpawnerId};

    use super::*;

    fn group(start_ms: u64, prototype: &str, count: u32) -> SpawnGroup {
        SpawnGroup::new(
            Duration::from_millis(start_ms),
            SpawnerId::new("gate"),
            PrototypeId::new(prototype),
            NonZeroU32::new(count).expect("non-zero"),
            Duration::from_millis(250),
            1.0,
        )
        .expect("valid group")
    }

    fn wave(items: Vec<SpawnGroup>, cap: u32) -> WaveDefinition {
        WaveDefinition::new(
            "Wave",
            items,
            NonZeroU32::new(cap).expect("non-zero"),
            Duration::ZERO,
        )
    }

    #[test]
    fn groups_sharing_a_start_time_are_summed() {
        let demand = peak_demand(&wave(
            vec![
                group(0, "grunt", 3),
                group(0, "grunt", 2),
                group(1_000, "grunt", 4),
                group(0, "brute", 1),
            ],
            20,
        ));

        assert_eq!(demand.get(&PrototypeId::new("grunt")), Some(&5));
        assert_eq!(demand.get(&PrototypeId::new("brute")), Some(&1));
    }

    #[test]
    fn demand_is_clamped_to_alive_cap() {
        let demand = peak_demand(&wave(vec![group(0, "grunt", 12)], 4));
        assert_eq!(demand.get(&PrototypeId::new("grunt")), Some(&4));
    }

    #[test]
    fn same_wave_is_planned_once() {
        let waves = vec![wave(vec![group(0, "grunt", 2)], 4)];
        let mut warm_up = WarmUp::new();
        let mut commands = Vec::new();
        let loaded = [Event::WavesLoaded { count: 1 }];

        warm_up.handle(&loaded, &waves, |_| 0, &mut commands);
        warm_up.handle(
            &[Event::InterWaveDelayStarted {
                next: WaveIndex::new(0),
                delay: Duration::ZERO,
            }],
            &waves,
            |_| 0,
            &mut commands,
        );

        assert_eq!(commands.len(), 1);
    }
}
