//! Loads the sectioned INI-style configuration file described in spec.md §6:
//! `[local]`, `[remote]`, `[clouds]`, `[db]`, and one `[engine.<name>]` per
//! configured engine. Grounded in the teacher's `ConfigEngine`
//! (`common/src/config.rs` in the reference pack) for the load/defaulting
//! shape, but reading real INI (this crate's wire format is a fixed external
//! interface, not a free design choice — see DESIGN.md).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ini::Ini;
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration file {0}: {1}")]
    Unreadable(String, String),
    #[error("missing required section [{0}]")]
    MissingSection(String),
    #[error("missing required key '{0}' in section [{1}]")]
    MissingKey(String, String),
    #[error("invalid value for '{0}': {1}")]
    InvalidValue(String, String),
}

#[derive(Clone, Debug)]
pub struct LocalConfig {
    pub data_dir: PathBuf,
    pub engines_dir: PathBuf,
    pub tasks_dir: PathBuf,
    pub keys_dir: PathBuf,
    pub webhook_threads: usize,
}

#[derive(Clone, Debug)]
pub struct RemoteConfig {
    pub data_dir: PathBuf,
    pub engines_dir: PathBuf,
    pub tasks_dir: PathBuf,
    pub user: String,
}

#[derive(Clone, Debug)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
}

#[derive(Clone, Debug)]
pub struct CloudConfig {
    pub login: String,
    pub password: String,
    pub max_nodes: u32,
}

/// Fully parsed configuration. `engine_sections` is kept around as plain
/// string maps so the `yascheduler-engines` crate can build its own typed
/// `Engine` structs without this crate depending on the engine descriptor
/// shape (or `ini`'s `Properties` type leaking across the crate boundary).
#[derive(Clone, Debug)]
pub struct Config {
    pub local: LocalConfig,
    pub remote: RemoteConfig,
    pub db: DbConfig,
    pub clouds: BTreeMap<String, CloudConfig>,
    pub engine_sections: BTreeMap<String, BTreeMap<String, String>>,
}

fn get<'a>(ini: &'a Ini, section: &str, key: &str) -> Option<&'a str> {
    ini.section(Some(section)).and_then(|s| s.get(key))
}

fn get_or<'a>(ini: &'a Ini, section: &str, key: &str, default: &'a str) -> &'a str {
    get(ini, section, key).unwrap_or(default)
}

#[tracing::instrument(skip(path))]
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    trace!("loading config from {:?}", path);
    let ini = Ini::load_from_file(path)
        .map_err(|e| ConfigError::Unreadable(path.display().to_string(), e.to_string()))?;

    let local_data_dir = PathBuf::from(get_or(&ini, "local", "data_dir", "./data"));
    let local = LocalConfig {
        engines_dir: PathBuf::from(
            get(&ini, "local", "engines_dir")
                .map(str::to_string)
                .unwrap_or_else(|| local_data_dir.join("engines").display().to_string()),
        ),
        tasks_dir: PathBuf::from(
            get(&ini, "local", "tasks_dir")
                .map(str::to_string)
                .unwrap_or_else(|| local_data_dir.join("tasks").display().to_string()),
        ),
        keys_dir: PathBuf::from(
            get(&ini, "local", "keys_dir")
                .map(str::to_string)
                .unwrap_or_else(|| local_data_dir.join("keys").display().to_string()),
        ),
        webhook_threads: get_or(&ini, "local", "webhook_threads", "2")
            .parse()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "webhook_threads".into(),
                    "expected an integer".into(),
                )
            })?,
        data_dir: local_data_dir,
    };

    let remote_data_dir = PathBuf::from(get_or(&ini, "remote", "data_dir", "./data"));
    let remote = RemoteConfig {
        engines_dir: PathBuf::from(
            get(&ini, "remote", "engines_dir")
                .map(str::to_string)
                .unwrap_or_else(|| remote_data_dir.join("engines").display().to_string()),
        ),
        tasks_dir: PathBuf::from(
            get(&ini, "remote", "tasks_dir")
                .map(str::to_string)
                .unwrap_or_else(|| remote_data_dir.join("tasks").display().to_string()),
        ),
        user: get_or(&ini, "remote", "user", "root").to_string(),
        data_dir: remote_data_dir,
    };

    let db_section = ini
        .section(Some("db"))
        .ok_or_else(|| ConfigError::MissingSection("db".into()))?;
    let db = DbConfig {
        host: db_section.get("host").unwrap_or("localhost").to_string(),
        port: db_section
            .get("port")
            .unwrap_or("5432")
            .parse()
            .map_err(|_| ConfigError::InvalidValue("db.port".into(), "expected a port number".into()))?,
        user: db_section
            .get("user")
            .ok_or_else(|| ConfigError::MissingKey("user".into(), "db".into()))?
            .to_string(),
        password: db_section.get("password").unwrap_or("").to_string(),
        dbname: db_section
            .get("dbname")
            .ok_or_else(|| ConfigError::MissingKey("dbname".into(), "db".into()))?
            .to_string(),
    };

    let mut clouds = BTreeMap::new();
    if let Some(clouds_section) = ini.section(Some("clouds")) {
        let mut names: BTreeMap<String, (Option<String>, Option<String>, Option<u32>)> =
            BTreeMap::new();
        for (key, value) in clouds_section.iter() {
            if let Some(provider) = key.strip_suffix("_login") {
                names.entry(provider.to_string()).or_default().0 = Some(value.to_string());
            } else if let Some(provider) = key.strip_suffix("_pass") {
                names.entry(provider.to_string()).or_default().1 = Some(value.to_string());
            } else if let Some(provider) = key.strip_suffix("_max_nodes") {
                names.entry(provider.to_string()).or_default().2 = value.parse().ok();
            }
        }
        for (provider, (login, password, max_nodes)) in names {
            if let (Some(login), Some(password), Some(max_nodes)) = (login, password, max_nodes) {
                clouds.insert(
                    provider,
                    CloudConfig {
                        login,
                        password,
                        max_nodes,
                    },
                );
            }
        }
    }

    let mut engine_sections = BTreeMap::new();
    for (name, props) in ini.iter() {
        let Some(name) = name else { continue };
        let Some(engine_name) = name.strip_prefix("engine.") else {
            continue;
        };
        let map: BTreeMap<String, String> = props
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        engine_sections.insert(engine_name.to_string(), map);
    }
    debug!("found {} engine section(s)", engine_sections.len());

    Ok(Config {
        local,
        remote,
        db,
        clouds,
        engine_sections,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fixture(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_load_minimal_config() {
        let f = write_fixture(
            r#"
[local]
data_dir = ./data
webhook_threads = 3

[remote]
user = runner

[db]
user = yascheduler
dbname = yascheduler

[engine.demo]
platforms = debian-10
input_files = in.txt
output_files = out.txt
spawn = {engine_path}/run {task_path} {ncpus}
"#,
        );
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.local.webhook_threads, 3);
        assert_eq!(cfg.remote.user, "runner");
        assert_eq!(cfg.db.dbname, "yascheduler");
        assert_eq!(cfg.local.engines_dir, PathBuf::from("./data/engines"));
        assert!(cfg.engine_sections.contains_key("demo"));
        assert_eq!(
            cfg.engine_sections["demo"]["spawn"],
            "{engine_path}/run {task_path} {ncpus}"
        );
    }

    #[test]
    fn test_load_clouds_section() {
        let f = write_fixture(
            r#"
[local]
[remote]
[db]
user = u
dbname = d

[clouds]
upcloud_login = bob
upcloud_pass = secret
upcloud_max_nodes = 5

[engine.demo]
platforms = debian-10
input_files =
output_files =
spawn = run
"#,
        );
        let cfg = load_config(f.path()).unwrap();
        let upcloud = cfg.clouds.get("upcloud").expect("upcloud configured");
        assert_eq!(upcloud.login, "bob");
        assert_eq!(upcloud.max_nodes, 5);
    }

    #[test]
    fn test_missing_db_section_is_an_error() {
        let f = write_fixture("[local]\n[remote]\n");
        let err = load_config(f.path()).unwrap_err();
        matches!(err, ConfigError::MissingSection(_));
    }
}
