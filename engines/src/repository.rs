use std::collections::BTreeMap;

use tracing::debug;

use crate::engine::Engine;
use crate::error::EngineError;

/// Read-only, constructed once at startup from configuration (spec.md
/// §4.C). Exposes filtered views and direct lookup by name.
#[derive(Clone, Debug)]
pub struct EngineRepository {
    engines: BTreeMap<String, Engine>,
}

impl EngineRepository {
    pub fn from_sections(
        sections: &BTreeMap<String, BTreeMap<String, String>>,
    ) -> Result<Self, EngineError> {
        let mut engines = BTreeMap::new();
        for (name, section) in sections {
            engines.insert(name.clone(), Engine::from_section(name, section)?);
        }
        if engines.is_empty() {
            return Err(EngineError::NoEngines);
        }
        debug!("loaded {} engine(s)", engines.len());
        Ok(Self { engines })
    }

    pub fn get(&self, name: &str) -> Option<&Engine> {
        self.engines.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.engines.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.engines.keys().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &Engine> {
        self.engines.values()
    }

    /// Engines that declare support for any of `platforms`.
    pub fn filter_platforms(&self, platforms: &[String]) -> EngineRepository {
        let engines = self
            .engines
            .iter()
            .filter(|(_, e)| platforms.iter().any(|p| e.supports_platform(p)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        EngineRepository { engines }
    }

    /// Union of the OS packages required by every engine in this
    /// repository for the given platform, deduplicated.
    pub fn platform_packages(&self, platform: &str) -> Vec<String> {
        let mut pkgs: Vec<String> = self
            .engines
            .values()
            .filter_map(|e| e.packages.get(platform))
            .flatten()
            .cloned()
            .collect();
        pkgs.sort();
        pkgs.dedup();
        pkgs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sections() -> BTreeMap<String, BTreeMap<String, String>> {
        let mut m = BTreeMap::new();
        let mut demo = BTreeMap::new();
        demo.insert("platforms".into(), "debian-10".into());
        demo.insert("input_files".into(), "in.txt".into());
        demo.insert("output_files".into(), "out.txt".into());
        demo.insert("spawn".into(), "{engine_path} {task_path} {ncpus}".into());
        demo.insert("packages.debian-10".into(), "libgfortran5".into());
        m.insert("demo".into(), demo);
        m
    }

    #[test]
    fn test_from_sections_and_lookup() {
        let repo = EngineRepository::from_sections(&sections()).unwrap();
        assert_eq!(repo.len(), 1);
        assert!(repo.contains("demo"));
        assert!(repo.get("other").is_none());
    }

    #[test]
    fn test_filter_platforms_and_packages() {
        let repo = EngineRepository::from_sections(&sections()).unwrap();
        let filtered = repo.filter_platforms(&["debian-10".to_string()]);
        assert_eq!(filtered.len(), 1);
        let filtered_none = repo.filter_platforms(&["windows".to_string()]);
        assert!(filtered_none.is_empty());
        assert_eq!(repo.platform_packages("debian-10"), vec!["libgfortran5"]);
    }

    #[test]
    fn test_empty_sections_is_an_error() {
        assert!(EngineRepository::from_sections(&BTreeMap::new()).is_err());
    }
}
