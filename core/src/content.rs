//! Authored wave content and its load-time validation.

use std::{num::NonZeroU32, time::Duration};

use serde::Deserialize;

use crate::{PrototypeId, SpawnerId};

const DEFAULT_WAVE_NAME: &str = "Wave";
const DEFAULT_ALIVE_CAP: u32 = 60;
const DEFAULT_INTER_WAVE_DELAY_SECONDS: f32 = 5.0;
const DEFAULT_GROUP_COUNT: u32 = 5;
const DEFAULT_GROUP_INTERVAL_SECONDS: f32 = 0.5;
const DEFAULT_POWER_MULTIPLIER: f32 = 1.0;

/// Reasons authored content may fail validation.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ContentError {
    /// A time field was negative, not finite, or too large to represent.
    #[error("`{field}` must be a finite, non-negative number of seconds (got {value})")]
    InvalidSeconds {
        /// Name of the offending field.
        field: &'static str,
        /// Value found in the content.
        value: f32,
    },
    /// A spawn group asked for zero instances.
    #[error("`count` must be at least 1")]
    ZeroCount,
    /// A wave declared a concurrency cap of zero, which would never admit a spawn.
    #[error("`aliveCap` must be at least 1")]
    ZeroAliveCap,
    /// A spawn group carried a power multiplier that is negative or not finite.
    #[error("`powerMultiplier` must be a finite, non-negative number (got {0})")]
    InvalidPowerMultiplier(f32),
    /// A spawn group did not name its emission point.
    #[error("`spawnerId` must not be empty")]
    EmptySpawnerId,
    /// A spawn group did not name its prototype.
    #[error("`prototypeId` must not be empty")]
    EmptyPrototypeId,
}

/// Sub-schedule releasing `count` instances of one prototype from one spawner.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(try_from = "RawSpawnGroup")]
pub struct SpawnGroup {
    start_time: Duration,
    spawner: SpawnerId,
    prototype: PrototypeId,
    count: NonZeroU32,
    interval: Duration,
    power_multiplier: f32,
}

impl SpawnGroup {
    /// Creates a spawn group, validating the power multiplier and identifiers.
    pub fn new(
        start_time: Duration,
        spawner: SpawnerId,
        prototype: PrototypeId,
        count: NonZeroU32,
        interval: Duration,
        power_multiplier: f32,
    ) -> Result<Self, ContentError> {
        if spawner.as_str().is_empty() {
            return Err(ContentError::EmptySpawnerId);
        }
        if prototype.as_str().is_empty() {
            return Err(ContentError::EmptyPrototypeId);
        }
        if !power_multiplier.is_finite() || power_multiplier < 0.0 {
            return Err(ContentError::InvalidPowerMultiplier(power_multiplier));
        }

        Ok(Self {
            start_time,
            spawner,
            prototype,
            count,
            interval,
            power_multiplier,
        })
    }

    /// Offset from the start of the wave at which the group begins emitting.
    #[must_use]
    pub const fn start_time(&self) -> Duration {
        self.start_time
    }

    /// Emission point the group's instances appear at.
    #[must_use]
    pub const fn spawner(&self) -> &SpawnerId {
        &self.spawner
    }

    /// Prototype the group emits.
    #[must_use]
    pub const fn prototype(&self) -> &PrototypeId {
        &self.prototype
    }

    /// Number of instances the group emits.
    #[must_use]
    pub const fn count(&self) -> NonZeroU32 {
        self.count
    }

    /// Delay between two successive emissions of the group.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Stat multiplier handed to every instance the group emits.
    #[must_use]
    pub const fn power_multiplier(&self) -> f32 {
        self.power_multiplier
    }
}

/// One bounded campaign of timed spawn groups.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(try_from = "RawWaveDefinition")]
pub struct WaveDefinition {
    name: String,
    items: Vec<SpawnGroup>,
    alive_cap: NonZeroU32,
    inter_wave_delay: Duration,
}

impl WaveDefinition {
    /// Creates a wave definition from already validated groups.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        items: Vec<SpawnGroup>,
        alive_cap: NonZeroU32,
        inter_wave_delay: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            items,
            alive_cap,
            inter_wave_delay,
        }
    }

    /// Display name of the wave.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Spawn groups in authored order.
    #[must_use]
    pub fn items(&self) -> &[SpawnGroup] {
        &self.items
    }

    /// Maximum number of instances allowed alive at once.
    #[must_use]
    pub const fn alive_cap(&self) -> NonZeroU32 {
        self.alive_cap
    }

    /// Countdown that follows this wave before the next one starts.
    #[must_use]
    pub const fn inter_wave_delay(&self) -> Duration {
        self.inter_wave_delay
    }

    /// Sum of the counts of every group in the wave.
    #[must_use]
    pub fn planned_total(&self) -> u64 {
        self.items
            .iter()
            .map(|item| u64::from(item.count().get()))
            .sum()
    }

    /// Groups paired with their authored position, ordered by start time.
    ///
    /// The sort is stable, so groups sharing a start time keep authored order.
    #[must_use]
    pub fn dispatch_order(&self) -> Vec<(usize, &SpawnGroup)> {
        let mut ordered: Vec<(usize, &SpawnGroup)> = self.items.iter().enumerate().collect();
        ordered.sort_by_key(|(_, item)| item.start_time());
        ordered
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawSpawnGroup {
    #[serde(default)]
    start_time: f32,
    spawner_id: String,
    #[serde(alias = "enemyId")]
    prototype_id: String,
    #[serde(default = "default_group_count")]
    count: u32,
    #[serde(default = "default_group_interval")]
    interval: f32,
    #[serde(default = "default_power_multiplier")]
    power_multiplier: f32,
}

impl TryFrom<RawSpawnGroup> for SpawnGroup {
    type Error = ContentError;

    fn try_from(raw: RawSpawnGroup) -> Result<Self, Self::Error> {
        let count = NonZeroU32::new(raw.count).ok_or(ContentError::ZeroCount)?;
        SpawnGroup::new(
            seconds("startTime", raw.start_time)?,
            SpawnerId::new(raw.spawner_id),
            PrototypeId::new(raw.prototype_id),
            count,
            seconds("interval", raw.interval)?,
            raw.power_multiplier,
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawWaveDefinition {
    #[serde(default = "default_wave_name", alias = "waveName")]
    name: String,
    #[serde(default)]
    items: Vec<SpawnGroup>,
    #[serde(default = "default_alive_cap")]
    alive_cap: u32,
    #[serde(default = "default_inter_wave_delay", alias = "interWaveDelay")]
    inter_wave_delay_seconds: f32,
}

impl TryFrom<RawWaveDefinition> for WaveDefinition {
    type Error = ContentError;

    fn try_from(raw: RawWaveDefinition) -> Result<Self, Self::Error> {
        let alive_cap = NonZeroU32::new(raw.alive_cap).ok_or(ContentError::ZeroAliveCap)?;
        let inter_wave_delay = seconds("interWaveDelaySeconds", raw.inter_wave_delay_seconds)?;
        Ok(WaveDefinition::new(
            raw.name,
            raw.items,
            alive_cap,
            inter_wave_delay,
        ))
    }
}

fn seconds(field: &'static str, value: f32) -> Result<Duration, ContentError> {
    if value < 0.0 {
        return Err(ContentError::InvalidSeconds { field, value });
    }
    Duration::try_from_secs_f32(value).map_err(|_| ContentError::InvalidSeconds { field, value })
}

fn default_wave_name() -> String {
    DEFAULT_WAVE_NAME.to_owned()
}

const fn default_alive_cap() -> u32 {
    DEFAULT_ALIVE_CAP
}

const fn default_inter_wave_delay() -> f32 {
    DEFAULT_INTER_WAVE_DELAY_SECONDS
}

const fn default_group_count() -> u32 {
    DEFAULT_GROUP_COUNT
}

const fn default_group_interval() -> f32 {
    DEFAULT_GROUP_INTERVAL_SECONDS
}

const fn default_power_multiplier() -> f32 {
    DEFAULT_POWER_MULTIPLIER
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_WAVES: &str = r#"
        [[waves]]
        name = "Opening"
        aliveCap = 2
        interWaveDelaySeconds = 3.5

        [[waves.items]]
        startTime = 2.0
        spawnerId = "east"
        prototypeId = "runner"
        count = 2
        interval = 0.0

        [[waves.items]]
        spawnerId = "west"
        enemyId = "grunt"
        count = 3
        interval = 1.0

        [[waves]]
        name = "Empty"
    "#;

    #[derive(Debug, Deserialize)]
    struct WaveFile {
        waves: Vec<WaveDefinition>,
    }

    #[test]
    fn toml_waves_apply_defaults_and_aliases() {
        let file: WaveFile = toml::from_str(TWO_WAVES).expect("waves parse");
        let opening = &file.waves[0];
        assert_eq!(opening.name(), "Opening");
        assert_eq!(opening.alive_cap().get(), 2);
        assert_eq!(opening.inter_wave_delay(), Duration::from_millis(3_500));
        assert_eq!(opening.planned_total(), 5);

        let grunt = &opening.items()[1];
        assert_eq!(grunt.prototype().as_str(), "grunt");
        assert_eq!(grunt.start_time(), Duration::ZERO);
        assert!((grunt.power_multiplier() - 1.0).abs() < f32::EPSILON);

        let empty = &file.waves[1];
        assert!(empty.items().is_empty());
        assert_eq!(empty.alive_cap().get(), DEFAULT_ALIVE_CAP);
        assert_eq!(empty.inter_wave_delay(), Duration::from_secs(5));
    }

    #[test]
    fn dispatch_order_sorts_by_start_time_and_keeps_authored_positions() {
        let file: WaveFile = toml::from_str(TWO_WAVES).expect("waves parse");
        let order: Vec<usize> = file.waves[0]
            .dispatch_order()
            .into_iter()
            .map(|(position, _)| position)
            .collect();
        assert_eq!(order, vec![1, 0]);
    }

    #[test]
    fn negative_start_time_is_rejected() {
        let json = r#"{ "startTime": -1.0, "spawnerId": "a", "prototypeId": "b" }"#;
        let error = serde_json::from_str::<SpawnGroup>(json).expect_err("negative start");
        assert!(error.to_string().contains("startTime"), "{error}");
    }

    #[test]
    fn zero_alive_cap_is_rejected() {
        let json = r#"{ "name": "Broken", "aliveCap": 0 }"#;
        let error = serde_json::from_str::<WaveDefinition>(json).expect_err("zero cap");
        assert!(error.to_string().contains("aliveCap"), "{error}");
    }

    #[test]
    fn zero_count_is_rejected() {
        let json = r#"{ "spawnerId": "a", "prototypeId": "b", "count": 0 }"#;
        assert!(serde_json::from_str::<SpawnGroup>(json).is_err());
    }

    #[test]
    fn empty_spawner_id_is_rejected() {
        let result = SpawnGroup::new(
            Duration::ZERO,
            SpawnerId::new(""),
            PrototypeId::new("grunt"),
            NonZeroU32::MIN,
            Duration::ZERO,
            1.0,
        );
        assert_eq!(result, Err(ContentError::EmptySpawnerId));
    }

    #[test]
    fn non_finite_power_multiplier_is_rejected() {
        let result = SpawnGroup::new(
            Duration::ZERO,
            SpawnerId::new("a"),
            PrototypeId::new("grunt"),
            NonZeroU32::MIN,
            Duration::ZERO,
            f32::NAN,
        );
        assert!(matches!(
            result,
            Err(ContentError::InvalidPowerMultiplier(value)) if value.is_nan()
        ));
    }
}
