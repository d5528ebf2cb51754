use std::{ffi::OsStr, fs, path::Path};

use anyhow::{anyhow, bail, Context, Result};
use glam::{Quat, Vec3};
use serde::Deserialize;
use wave_warden_core::{EmissionPoint, PrototypeId, SpawnerId, WaveDefinition};
use wave_warden_world::SpawnerDirectory;

use crate::simulation::DroneFactory;

const BUNDLED_SCENARIO: &str = include_str!("../../../demos/scenario.toml");

/// Scene layout, prototype catalogue and wave list driving one simulation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct Scenario {
    #[serde(default)]
    spawners: Vec<SpawnerEntry>,
    #[serde(default)]
    prototypes: Vec<PrototypeEntry>,
    #[serde(default)]
    waves: Vec<WaveDefinition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SpawnerEntry {
    id: SpawnerId,
    position: [f32; 3],
    #[serde(default)]
    yaw_degrees: f32,
}

impl SpawnerEntry {
    fn emission_point(&self) -> EmissionPoint {
        EmissionPoint::new(
            Vec3::from_array(self.position),
            Quat::from_rotation_y(self.yaw_degrees.to_radians()),
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PrototypeEntry {
    id: PrototypeId,
    #[serde(default = "default_lifetime_scale")]
    lifetime_scale: f32,
}

const fn default_lifetime_scale() -> f32 {
    1.0
}

impl Scenario {
    /// Scenario compiled into the binary.
    pub(crate) fn bundled() -> Result<Self> {
        Self::from_toml(BUNDLED_SCENARIO).context("bundled scenario is invalid")
    }

    /// Loads a scenario, picking the format from the file extension.
    pub(crate) fn from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        let scenario = match path.extension().and_then(OsStr::to_str) {
            Some("toml") => Self::from_toml(&contents),
            Some("json") => Self::from_json(&contents),
            other => bail!("unsupported scenario extension {other:?}, expected toml or json"),
        };
        scenario.with_context(|| format!("failed to load scenario {}", path.display()))
    }

    fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("failed to parse scenario toml contents")
    }

    fn from_json(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).context("failed to parse scenario json contents")
    }

    /// Waves in play order.
    pub(crate) fn waves(&self) -> &[WaveDefinition] {
        &self.waves
    }

    /// Registers every authored emission point, rejecting empty or repeated ids.
    pub(crate) fn spawner_directory(&self) -> Result<SpawnerDirectory> {
        SpawnerDirectory::discover(
            self.spawners
                .iter()
                .map(|entry| (entry.id.clone(), entry.emission_point())),
        )
        .map_err(|(id, error)| anyhow!("spawner `{id}`: {error}"))
    }

    /// Factory able to construct every catalogued prototype.
    pub(crate) fn factory(&self) -> Result<DroneFactory> {
        let mut factory = DroneFactory::default();
        for entry in &self.prototypes {
            if !entry.lifetime_scale.is_finite() || entry.lifetime_scale <= 0.0 {
                bail!(
                    "prototype `{}` has invalid lifetime scale {}",
                    entry.id,
                    entry.lifetime_scale
                );
            }
            if !factory.catalogue(entry.id.clone(), entry.lifetime_scale) {
                bail!("prototype `{}` is listed twice", entry.id);
            }
        }
        Ok(factory)
    }
}
