use std::{num::NonZeroU32, time::Duration};

use wave_warden_core::{
    Command, EmissionPoint, Event, InstanceFactory, LifeToken, PrototypeId, SpawnGroup, Spawnable,
    SpawnerId, WaveDefinition, WaveIndex,
};
use wave_warden_system_warmup::WarmUp;
use wave_warden_world::{self as world, query, Session};

#[derive(Debug)]
struct Dummy;

impl Spawnable for Dummy {
    fn place(&mut self, _point: EmissionPoint) {}

    fn set_active(&mut self, _active: bool) {}

    fn begin_lifetime(&mut self, _token: LifeToken, _power_multiplier: f32) {}
}

#[derive(Debug)]
struct DummyFactory;

impl InstanceFactory for DummyFactory {
    type Instance = Dummy;

    fn recognizes(&self, prototype: &PrototypeId) -> bool {
        prototype.as_str() != "ghost"
    }

    fn construct(&mut self, prototype: &PrototypeId) -> Option<Dummy> {
        self.recognizes(prototype).then_some(Dummy)
    }
}

fn group(start_ms: u64, prototype: &str, count: u32) -> SpawnGroup {
    SpawnGroup::new(
        Duration::from_millis(start_ms),
        SpawnerId::new("gate"),
        PrototypeId::new(prototype),
        NonZeroU32::new(count).expect("non-zero"),
        Duration::from_millis(500),
        1.0,
    )
    .expect("valid group")
}

fn wave(items: Vec<SpawnGroup>, cap: u32) -> WaveDefinition {
    WaveDefinition::new(
        "Wave",
        items,
        NonZeroU32::new(cap).expect("non-zero"),
        Duration::from_secs(5),
    )
}

fn warm(
    warm_up: &mut WarmUp,
    session: &mut Session<DummyFactory>,
    waves: &[WaveDefinition],
    events: &[Event],
) -> Vec<Event> {
    let mut commands = Vec::new();
    warm_up.handle(
        events,
        waves,
        |prototype| query::available(&*session, prototype),
        &mut commands,
    );

    let mut applied = Vec::new();
    for command in commands {
        world::apply(session, command, &mut applied);
    }
    applied
}

#[test]
fn loading_waves_warms_the_first_wave() {
    let waves = vec![wave(
        vec![group(0, "grunt", 3), group(0, "brute", 2), group(0, "grunt", 1)],
        10,
    )];
    let mut session = Session::new(DummyFactory);
    let mut warm_up = WarmUp::new();

    let applied = warm(
        &mut warm_up,
        &mut session,
        &waves,
        &[Event::WavesLoaded { count: 1 }],
    );

    assert_eq!(
        applied,
        vec![
            Event::PoolWarmed {
                prototype: PrototypeId::new("brute"),
                constructed: 2,
            },
            Event::PoolWarmed {
                prototype: PrototypeId::new("grunt"),
                constructed: 4,
            },
        ]
    );
    assert_eq!(query::available(&session, &PrototypeId::new("grunt")), 4);
}

#[test]
fn only_the_shortfall_is_requested_for_later_waves() {
    let waves = vec![
        wave(vec![group(0, "grunt", 3)], 10),
        wave(vec![group(0, "grunt", 5), group(2_000, "grunt", 8)], 6),
    ];
    let mut session = Session::new(DummyFactory);
    let mut warm_up = WarmUp::new();

    let _ = warm(
        &mut warm_up,
        &mut session,
        &waves,
        &[Event::WavesLoaded { count: 2 }],
    );
    let applied = warm(
        &mut warm_up,
        &mut session,
        &waves,
        &[Event::InterWaveDelayStarted {
            next: WaveIndex::new(1),
            delay: Duration::from_secs(5),
        }],
    );

    assert_eq!(
        applied,
        vec![Event::PoolWarmed {
            prototype: PrototypeId::new("grunt"),
            constructed: 3,
        }]
    );
    assert_eq!(query::constructed(&session, &PrototypeId::new("grunt")), 6);
}

#[test]
fn unknown_prototypes_are_rejected_by_the_pool() {
    let waves = vec![wave(vec![group(0, "ghost", 2)], 4)];
    let mut session = Session::new(DummyFactory);
    let mut warm_up = WarmUp::new();

    let applied = warm(
        &mut warm_up,
        &mut session,
        &waves,
        &[Event::WavesLoaded { count: 1 }],
    );

    assert_eq!(
        applied,
        vec![Event::WarmUpRejected {
            prototype: PrototypeId::new("ghost"),
        }]
    );
}
