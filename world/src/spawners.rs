//! Directory of emission points discovered in the scene.

use std::collections::BTreeMap;

use wave_warden_core::{DirectoryError, EmissionPoint, SpawnerId};

/// Registry mapping spawner identifiers to emission points.
#[derive(Clone, Debug, Default)]
pub struct SpawnerDirectory {
    entries: BTreeMap<SpawnerId, EmissionPoint>,
}

impl SpawnerDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a directory from every emission point found during discovery.
    ///
    /// Fails on the first empty or repeated identifier.
    pub fn discover(
        points: impl IntoIterator<Item = (SpawnerId, EmissionPoint)>,
    ) -> Result<Self, (SpawnerId, DirectoryError)> {
        let mut directory = Self::new();
        for (id, point) in points {
            if let Err(error) = directory.register(id.clone(), point) {
                return Err((id, error));
            }
        }
        Ok(directory)
    }

    /// Registers an emission point under the provided identifier.
    pub fn register(&mut self, id: SpawnerId, point: EmissionPoint) -> Result<(), DirectoryError> {
        if id.as_str().is_empty() {
            return Err(DirectoryError::EmptyId);
        }
        if self.entries.contains_key(&id) {
            return Err(DirectoryError::Duplicate);
        }
        let _ = self.entries.insert(id, point);
        Ok(())
    }

    /// Removes an emission point, returning it when it was registered.
    pub fn deregister(&mut self, id: &SpawnerId) -> Option<EmissionPoint> {
        self.entries.remove(id)
    }

    /// Looks up the emission point registered under `id`.
    #[must_use]
    pub fn resolve(&self, id: &SpawnerId) -> Option<EmissionPoint> {
        self.entries.get(id).copied()
    }

    /// Number of registered emission points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Reports whether no emission point is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered identifiers in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &SpawnerId> {
        self.entries.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn point(x: f32) -> EmissionPoint {
        EmissionPoint::at(Vec3::new(x, 0.0, 0.0))
    }

    #[test]
    fn resolves_registered_points() {
        let mut directory = SpawnerDirectory::new();
        directory
            .register(SpawnerId::new("north"), point(1.0))
            .expect("first registration");

        assert_eq!(directory.resolve(&SpawnerId::new("north")), Some(point(1.0)));
        assert_eq!(directory.resolve(&SpawnerId::new("south")), None);
    }

    #[test]
    fn duplicate_registration_keeps_first_point() {
        let mut directory = SpawnerDirectory::new();
        directory
            .register(SpawnerId::new("north"), point(1.0))
            .expect("first registration");

        let error = directory
            .register(SpawnerId::new("north"), point(2.0))
            .expect_err("duplicate rejected");

        assert_eq!(error, DirectoryError::Duplicate);
        assert_eq!(directory.resolve(&SpawnerId::new("north")), Some(point(1.0)));
    }

    #[test]
    fn empty_identifier_is_rejected() {
        let mut directory = SpawnerDirectory::new();
        assert_eq!(
            directory.register(SpawnerId::new(""), point(0.0)),
            Err(DirectoryError::EmptyId)
        );
        assert!(directory.is_empty());
    }

    #[test]
    fn discovery_reports_offending_identifier() {
        let result = SpawnerDirectory::discover([
            (SpawnerId::new("a"), point(0.0)),
            (SpawnerId::new("b"), point(1.0)),
            (SpawnerId::new("a"), point(2.0)),
        ]);

        let (id, error) = result.expect_err("duplicate discovered");
        assert_eq!(id, SpawnerId::new("a"));
        assert_eq!(error, DirectoryError::Duplicate);
    }

    #[test]
    fn deregistered_points_no_longer_resolve() {
        let mut directory =
            SpawnerDirectory::discover([(SpawnerId::new("gate"), point(3.0))]).expect("discover");

        assert_eq!(directory.deregister(&SpawnerId::new("gate")), Some(point(3.0)));
        assert_eq!(directory.resolve(&SpawnerId::new("gate")), None);
        assert_eq!(directory.len(), 0);
    }
}
