use std::collections::BTreeMap;

use crate::config::{MissionSettings, ResolvedConfig};
use crate::error::IbeError;
use crate::info::InfoMap;
use crate::missions::{
    AtlasIbeDataSource, MissionKind, PtfIbeDataSource, TwoMassIbeDataSource, WiseIbeDataSource,
    ZtfIbeDataSource,
};
use crate::source::IbeDataSource;

pub type SourceFactory =
    fn(&MissionSettings, &InfoMap) -> Result<Box<dyn IbeDataSource>, IbeError>;

struct Entry {
    settings: MissionSettings,
    factory: SourceFactory,
}

/// Mission name to data source constructor. Mission-agnostic callers pick a
/// source by the name carried in the request.
#[derive(Default)]
pub struct SourceRegistry {
    entries: BTreeMap<String, Entry>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in mission, each with its configured overrides.
    pub fn with_defaults(config: &ResolvedConfig) -> Self {
        let mut registry = Self::new();
        for kind in MissionKind::ALL {
            registry.register(kind.as_str(), config.mission(kind), factory_for(kind));
        }
        registry
    }

    pub fn register(&mut self, mission: &str, settings: MissionSettings, factory: SourceFactory) {
        self.entries
            .insert(mission.trim().to_ascii_lowercase(), Entry { settings, factory });
    }

    pub fn missions(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Builds the source for `mission`; aliases such as `2mass` resolve to
    /// their canonical name.
    pub fn create(&self, mission: &str, info: &InfoMap) -> Result<Box<dyn IbeDataSource>, IbeError> {
        let key = mission.trim().to_ascii_lowercase();
        let entry = match self.entries.get(&key) {
            Some(entry) => entry,
            None => {
                let kind: MissionKind = key.parse()?;
                self.entries
                    .get(kind.as_str())
                    .ok_or_else(|| IbeError::UnknownMission(mission.to_string()))?
            }
        };
        (entry.factory)(&entry.settings, info)
    }
}

fn factory_for(kind: MissionKind) -> SourceFactory {
    match kind {
        MissionKind::Wise => wise,
        MissionKind::TwoMass => twomass,
        MissionKind::Ptf => ptf,
        MissionKind::Ztf => ztf,
        MissionKind::Atlas => atlas,
    }
}

fn wise(settings: &MissionSettings, info: &InfoMap) -> Result<Box<dyn IbeDataSource>, IbeError> {
    Ok(Box::new(WiseIbeDataSource::from_source_info(settings, info)?))
}

fn twomass(settings: &MissionSettings, info: &InfoMap) -> Result<Box<dyn IbeDataSource>, IbeError> {
    Ok(Box::new(TwoMassIbeDataSource::from_source_info(settings, info)?))
}

fn ptf(settings: &MissionSettings, info: &InfoMap) -> Result<Box<dyn IbeDataSource>, IbeError> {
    Ok(Box::new(PtfIbeDataSource::from_source_info(settings, info)?))
}

fn ztf(settings: &MissionSettings, info: &InfoMap) -> Result<Box<dyn IbeDataSource>, IbeError> {
    Ok(Box::new(ZtfIbeDataSource::from_source_info(settings, info)?))
}

fn atlas(settings: &MissionSettings, info: &InfoMap) -> Result<Box<dyn IbeDataSource>, IbeError> {
    Ok(Box::new(AtlasIbeDataSource::from_source_info(settings, info)?))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn defaults_cover_every_mission() {
        let registry = SourceRegistry::with_defaults(&ResolvedConfig::default());
        let names: Vec<_> = registry.missions().collect();
        assert_eq!(names, ["atlas", "ptf", "twomass", "wise", "ztf"]);
    }

    #[test]
    fn alias_and_unknown() {
        let registry = SourceRegistry::with_defaults(&ResolvedConfig::default());
        let source = registry.create("2MASS", &InfoMap::new()).unwrap();
        assert_eq!(source.binding().mission, "twomass");

        assert_matches!(
            registry.create("galex", &InfoMap::new()).err(),
            Some(IbeError::UnknownMission(name)) if name == "galex"
        );
    }
}
