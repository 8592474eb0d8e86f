//! Wiring: turns a parsed [`yascheduler_common::Config`] into a running
//! [`yascheduler_scheduler::Controller`] backed by PostgreSQL.

pub mod cli;
mod error;

use std::sync::Arc;

pub use error::{DaemonError, Result};

use tracing::{info, warn};

use yascheduler_clouds::{CloudManager, UpCloudApi};
use yascheduler_common::Config;
use yascheduler_engines::EngineRepository;
use yascheduler_scheduler::{Controller, ControllerConfig};
use yascheduler_storage::PostgresStorage;

/// A [`Controller`] over the real PostgreSQL-backed storage adapter —
/// the only storage implementation this daemon ships with.
pub type YaController = Controller<PostgresStorage>;

fn public_key_for(cfg: &Config) -> Option<String> {
    let path = cfg.local.keys_dir.join(format!("{}.pub", cfg.remote.user));
    std::fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

fn build_clouds(cfg: &Config) -> Result<Option<CloudManager>> {
    if cfg.clouds.is_empty() {
        return Ok(None);
    }
    let public_key = public_key_for(cfg);
    let mut providers: Vec<Arc<dyn yascheduler_clouds::CloudApi>> = Vec::new();
    for (name, cloud_cfg) in &cfg.clouds {
        match name.as_str() {
            "upcloud" => providers.push(Arc::new(UpCloudApi::new(
                cloud_cfg.login.clone(),
                cloud_cfg.password.clone(),
                cloud_cfg.max_nodes,
                cfg.local.keys_dir.clone(),
                public_key.clone(),
            ))),
            other => return Err(DaemonError::UnsupportedCloudProvider(other.to_string())),
        }
    }
    Ok(Some(CloudManager::new(providers)))
}

/// Build a fully wired controller from a loaded configuration.
pub fn build_controller(cfg: &Config) -> Result<YaController> {
    let storage = PostgresStorage::connect(&cfg.db)?;
    let engines = EngineRepository::from_sections(&cfg.engine_sections)?;
    let clouds = build_clouds(cfg)?;

    if clouds.is_none() {
        info!("no cloud providers configured, running with static nodes only");
    }

    let controller_cfg = ControllerConfig {
        default_ssh_user: cfg.remote.user.clone(),
        keys_dir: cfg.local.keys_dir.clone(),
        local_tasks_dir: cfg.local.tasks_dir.clone(),
        local_engines_dir: cfg.local.engines_dir.clone(),
        remote_tasks_dir: cfg.remote.tasks_dir.display().to_string(),
        remote_engines_dir: cfg.remote.engines_dir.display().to_string(),
        default_platform: "debian-10".to_string(),
    };

    Ok(Controller::new(
        storage,
        engines,
        clouds,
        cfg.local.webhook_threads,
        controller_cfg,
    ))
}

/// Run passes at `interval` until `should_stop` reports true, then shut
/// the controller down cleanly.
pub fn run_loop(mut controller: YaController, interval: std::time::Duration, should_stop: impl Fn() -> bool) {
    loop {
        if should_stop() {
            break;
        }
        match controller.run_pass() {
            Ok(_) => {}
            Err(e) => warn!("scheduler pass failed, will retry next interval: {}", e),
        }
        let deadline = std::time::Instant::now() + interval;
        while std::time::Instant::now() < deadline {
            if should_stop() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(200).min(deadline.saturating_duration_since(std::time::Instant::now())));
        }
    }
    info!("stopping...");
    controller.shutdown();
}
