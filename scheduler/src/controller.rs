//! The periodic controller pass (component G): reconciles DB state with
//! cluster state one phase at a time (spec.md §4.G, grounded directly on
//! `step()` in the original `daemonize()`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::seq::SliceRandom;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use yascheduler_clouds::{CloudAsyncResult, CloudManager, NodeResource};
use yascheduler_engines::{Engine, EngineRepository};
use yascheduler_shell::{wait_until_reachable, NodeRef, ShellManager};
use yascheduler_storage::{Node, Storage, Task, TaskStatus};
use yascheduler_webhook::{WebhookEvent, WebhookPool};

use crate::error::Result;
use crate::idle::IdleCounter;

/// Everything the controller needs beyond the components wired in at
/// construction — the configuration values it reads each pass.
pub struct ControllerConfig {
    pub default_ssh_user: String,
    pub keys_dir: PathBuf,
    pub local_tasks_dir: PathBuf,
    pub local_engines_dir: PathBuf,
    pub remote_tasks_dir: String,
    pub remote_engines_dir: String,
    pub default_platform: String,
}

/// Summary of one completed pass, logged by the caller.
#[derive(Debug, Default)]
pub struct PassStats {
    pub nodes_enabled: usize,
    pub nodes_total: usize,
    pub tasks_running: usize,
    pub tasks_to_do: usize,
    pub tasks_done: usize,
}

pub struct Controller<S: Storage> {
    storage: S,
    shell: ShellManager,
    engines: EngineRepository,
    clouds: Option<CloudManager>,
    webhooks: WebhookPool,
    idle: IdleCounter,
    cfg: ControllerConfig,
}

impl<S: Storage> Controller<S> {
    pub fn new(
        storage: S,
        engines: EngineRepository,
        clouds: Option<CloudManager>,
        webhook_threads: usize,
        cfg: ControllerConfig,
    ) -> Self {
        Self {
            storage,
            shell: ShellManager::new(cfg.keys_dir.clone()),
            engines,
            clouds,
            webhooks: WebhookPool::start(webhook_threads),
            idle: IdleCounter::new(),
            cfg,
        }
    }

    /// Stop the cloud manager and the webhook pool. Call once, after the
    /// main loop breaks on a termination signal.
    pub fn shutdown(self) {
        if let Some(clouds) = self.clouds {
            clouds.stop();
        }
        self.webhooks.stop();
    }

    fn enqueue_event(&self, task_id: i32, label: &str, ip: Option<String>, status: TaskStatus, url: Option<&str>) {
        self.webhooks.enqueue(WebhookEvent {
            task_id,
            label: label.to_string(),
            ip,
            status: status.as_i16(),
            url: url.unwrap_or_default().to_string(),
        });
    }

    fn cloud_resources(&self, nodes: &[Node]) -> Vec<NodeResource> {
        nodes
            .iter()
            .map(|n| NodeResource {
                ip: n.ip.clone(),
                cloud: n.cloud.clone(),
            })
            .collect()
    }

    /// Close sessions for departed real nodes, open sessions for new ones.
    fn reconcile_sessions(&mut self, nodes: &[Node]) {
        let real: Vec<&Node> = nodes.iter().filter(|n| n.is_real()).collect();
        let users: Vec<String> = real
            .iter()
            .map(|n| {
                n.cloud
                    .as_deref()
                    .and_then(|c| self.clouds.as_ref().and_then(|m| m.ssh_user_for(c)))
                    .unwrap_or(&self.cfg.default_ssh_user)
                    .to_string()
            })
            .collect();
        let refs: Vec<NodeRef> = real
            .iter()
            .zip(users.iter())
            .map(|(n, u)| NodeRef { ip: &n.ip, user: u })
            .collect();
        self.shell.reconcile(&refs);
    }

    fn engine_probe_alive(&self, ip: &str, engine: &Engine) -> bool {
        if let Some(pname) = &engine.check_pname {
            match self.shell.is_process_running(ip, pname) {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => {
                    warn!("liveness probe (pgrep) on {} failed, assuming still running: {}", ip, e);
                    return true;
                }
            }
        }
        if let (Some(cmd), Some(code)) = (&engine.check_cmd, engine.check_cmd_code) {
            match self.shell.exec(ip, cmd) {
                Ok(out) if out.exit_code == code => return true,
                Ok(_) => {}
                Err(e) => {
                    warn!("liveness probe (check_cmd) on {} failed, assuming still running: {}", ip, e);
                    return true;
                }
            }
        }
        false
    }

    /// Detect RUNNING tasks whose engine has stopped, collect their
    /// outputs, and mark them DONE. Removes still-busy nodes from
    /// `free_nodes`.
    fn phase_completion(&mut self, free_nodes: &mut Vec<String>) -> Result<()> {
        let running = self.storage.list_tasks_by_status(&[TaskStatus::Running])?;
        debug!("running {} task(s)", running.len());

        for task in running {
            let Some(ip) = task.ip.clone() else { continue };
            let Some(engine_name) = task.engine_name().map(str::to_string) else { continue };
            let Some(engine) = self.engines.get(&engine_name).cloned() else {
                continue;
            };

            if self.engine_probe_alive(&ip, &engine) {
                free_nodes.retain(|n| n != &ip);
                continue;
            }

            self.complete_task(&task, &ip, &engine);
        }
        Ok(())
    }

    fn complete_task(&mut self, task: &Task, ip: &str, engine: &Engine) {
        let remote_folder = task.remote_folder().unwrap_or_default().to_string();
        let local_folder = task
            .local_folder()
            .map(str::to_string)
            .unwrap_or_else(|| {
                let name = Path::new(&remote_folder)
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                self.cfg.local_tasks_dir.join(name).to_string_lossy().to_string()
            });

        if let Err(e) = std::fs::create_dir_all(&local_folder) {
            warn!("could not create local folder {}: {}", local_folder, e);
        }

        'outputs: for output in &engine.output_files {
            let remote_path = format!("{remote_folder}/{output}");
            let local_path = Path::new(&local_folder).join(output);
            if let Err(e) = self.shell.download(ip, &remote_path, &local_path) {
                warn!("cannot download {}: {}", remote_path, e);
                if e.to_string().to_lowercase().contains("timed out") {
                    break 'outputs;
                }
            }
        }
        if let Err(e) = self.shell.remove(ip, &remote_folder) {
            warn!("could not remove remote folder {}: {}", remote_folder, e);
        }

        let mut metadata = json!({ "remote_folder": remote_folder, "local_folder": local_folder });
        if let Some(url) = task.webhook_url() {
            metadata["webhook_url"] = Value::String(url.to_string());
        }

        match self.storage.set_done(task.task_id, &metadata) {
            Ok(()) => {
                info!("task {} ({}) done, saved in {}", task.task_id, task.label, local_folder);
                self.enqueue_event(
                    task.task_id,
                    &task.label,
                    Some(ip.to_string()),
                    TaskStatus::Done,
                    task.webhook_url(),
                );
            }
            Err(e) => warn!("failed to mark task {} done: {}", task.task_id, e),
        }
    }

    /// Pair to-do tasks with free nodes, or request cloud capacity when
    /// there are none left.
    fn phase_dispatch(&mut self, free_nodes: &mut Vec<String>, node_ncpus: &dyn Fn(&str) -> Option<i32>, resources: &[NodeResource]) -> Result<()> {
        let cloud_capacity = self
            .clouds
            .as_ref()
            .map(|c| c.get_capacity(resources))
            .unwrap_or(0);

        let limit = free_nodes.len() as i64 + cloud_capacity as i64;
        if limit <= 0 {
            return Ok(());
        }

        let todo = self.storage.list_tasks_to_do(limit)?;
        let mut rng = rand::thread_rng();

        for task in todo {
            if free_nodes.is_empty() {
                if let Some(clouds) = &self.clouds {
                    clouds.allocate(task.task_id, resources);
                }
                continue;
            }

            free_nodes.shuffle(&mut rng);
            let ip = free_nodes.pop().expect("checked non-empty above");
            info!("submitting task {} ({}) to {}", task.task_id, task.label, ip);

            let ncpus_hint = node_ncpus(&ip).unwrap_or(0);
            match self.dispatch_task(&ip, ncpus_hint, &task) {
                Ok(()) => match self.storage.set_running(task.task_id, &ip) {
                    Ok(()) => self.enqueue_event(
                        task.task_id,
                        &task.label,
                        Some(ip.clone()),
                        TaskStatus::Running,
                        task.webhook_url(),
                    ),
                    Err(e) => warn!("failed to mark task {} running: {}", task.task_id, e),
                },
                Err(e) => {
                    warn!("spawn of task {} on {} failed, left TO_DO: {}", task.task_id, ip, e);
                    free_nodes.push(ip);
                }
            }
        }
        Ok(())
    }

    fn dispatch_task(&self, ip: &str, ncpus_hint: i32, task: &Task) -> Result<()> {
        let remote_folder = task
            .remote_folder()
            .ok_or_else(|| yascheduler_storage::StorageError::NoSuchTask(task.task_id))?;
        let engine_name = task
            .engine_name()
            .ok_or_else(|| yascheduler_storage::StorageError::NoSuchTask(task.task_id))?;
        let engine = self
            .engines
            .get(engine_name)
            .ok_or_else(|| yascheduler_engines::EngineError::UnknownEngine(engine_name.to_string()))?;

        self.shell.mkdir_p(ip, remote_folder)?;
        for input_file in &engine.input_files {
            let content = task
                .metadata
                .get(input_file)
                .and_then(Value::as_str)
                .unwrap_or_default();
            let remote_path = format!("{remote_folder}/{input_file}");
            self.shell.write_file(ip, &remote_path, content)?;
        }

        let ncpus = if ncpus_hint > 0 {
            ncpus_hint as u32
        } else {
            self.shell
                .exec(ip, "nproc --all")?
                .stdout
                .trim()
                .parse()
                .unwrap_or(1)
        };

        let engine_path = format!("{}/{}", self.cfg.remote_engines_dir, engine.name);
        let cmd = engine.format_spawn(&engine_path, remote_folder, ncpus)?;
        self.shell.spawn_detached(ip, &cmd, remote_folder)?;
        Ok(())
    }

    /// Track idle nodes and request deallocation once they cross the
    /// configured idle-pass threshold.
    fn phase_shrinkage(&mut self, free_nodes: &[String], resources: &[NodeResource]) {
        if free_nodes.is_empty() {
            return;
        }
        self.idle.record_pass(free_nodes);
        let deallocatable = self.idle.deallocatable();
        if !deallocatable.is_empty() {
            if let Some(clouds) = &self.clouds {
                clouds.deallocate(&deallocatable, resources);
            }
            self.idle.subtract(&deallocatable);
        }
    }

    /// Drain completed cloud allocations/deletions: newly-created nodes
    /// are enrolled disabled and handed to the provisioner; deleted nodes
    /// are removed from the registry.
    fn drain_cloud_work(&mut self) -> Result<()> {
        let Some(clouds) = self.clouds.take() else {
            return Ok(());
        };
        let results = clouds.do_async_work();
        for result in results {
            match result {
                CloudAsyncResult::Created { provider, ip, task_id } => {
                    info!("node {} created on {} for task {}", ip, provider, task_id);
                    self.storage.upsert_node(&Node {
                        ip: ip.clone(),
                        ncpus: None,
                        enabled: false,
                        cloud: Some(provider.clone()),
                    })?;
                    self.provision_and_enable(&ip, &provider, &clouds);
                }
                CloudAsyncResult::CreateFailed { provider, task_id } => {
                    warn!("node creation for task {} on {} failed, task stays TO_DO", task_id, provider);
                }
                CloudAsyncResult::Deleted { provider, ip } => {
                    info!("node {} on {} deleted", ip, provider);
                    self.storage.remove_node(&ip)?;
                }
            }
        }
        self.clouds = Some(clouds);
        Ok(())
    }

    fn provision_and_enable(&mut self, ip: &str, provider: &str, clouds: &CloudManager) {
        let user = clouds
            .ssh_user_for(provider)
            .unwrap_or(&self.cfg.default_ssh_user)
            .to_string();

        let session = match wait_until_reachable(ip, &user, &self.cfg.keys_dir, Duration::from_secs(180)) {
            Ok(s) => s,
            Err(e) => {
                warn!("node {} never became reachable for provisioning: {}", ip, e);
                return;
            }
        };

        if let Err(e) = yascheduler_provisioner::provision(
            &session,
            &user,
            &self.engines,
            &self.cfg.default_platform,
            &self.cfg.local_engines_dir,
            &self.cfg.remote_engines_dir,
        ) {
            warn!("provisioning {} failed, leaving disabled: {}", ip, e);
            return;
        }

        if let Err(e) = self.storage.upsert_node(&Node {
            ip: ip.to_string(),
            ncpus: None,
            enabled: true,
            cloud: Some(provider.to_string()),
        }) {
            warn!("failed to enable provisioned node {}: {}", ip, e);
        }
    }

    /// Run one full pass: session reconciliation, phases I-III, cloud
    /// async drain, then a stats summary.
    pub fn run_pass(&mut self) -> Result<PassStats> {
        let resources = self.storage.list_nodes()?;
        self.reconcile_sessions(&resources);

        let ncpus_by_ip: std::collections::HashMap<String, Option<i32>> = resources
            .iter()
            .map(|n| (n.ip.clone(), n.ncpus))
            .collect();
        let node_ncpus = |ip: &str| ncpus_by_ip.get(ip).copied().flatten();

        let mut free_nodes: Vec<String> = resources
            .iter()
            .filter(|n| n.enabled)
            .map(|n| n.ip.clone())
            .collect();

        self.phase_completion(&mut free_nodes)?;

        let cloud_resources = self.cloud_resources(&resources);
        self.phase_dispatch(&mut free_nodes, &node_ncpus, &cloud_resources)?;
        self.phase_shrinkage(&free_nodes, &cloud_resources);

        self.drain_cloud_work()?;

        let nodes = self.storage.list_nodes()?;
        let enabled = nodes.iter().filter(|n| n.enabled).count();
        let stats = PassStats {
            nodes_enabled: enabled,
            nodes_total: nodes.len(),
            tasks_running: self.storage.list_tasks_by_status(&[TaskStatus::Running])?.len(),
            tasks_to_do: self.storage.list_tasks_by_status(&[TaskStatus::ToDo])?.len(),
            tasks_done: self.storage.list_tasks_by_status(&[TaskStatus::Done])?.len(),
        };
        info!(
            "NODES: enabled={} total={} TASKS: running={} to_do={} done={}",
            stats.nodes_enabled, stats.nodes_total, stats.tasks_running, stats.tasks_to_do, stats.tasks_done
        );
        Ok(stats)
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn engines(&self) -> &EngineRepository {
        &self.engines
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.cfg
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use yascheduler_storage::{Result as StorageResult, TaskStatus};

    use super::*;

    #[derive(Default)]
    struct MemStorage {
        nodes: Vec<Node>,
        tasks: Mutex<Vec<Task>>,
        next_id: i32,
    }

    impl Storage for MemStorage {
        fn list_nodes(&mut self) -> StorageResult<Vec<Node>> {
            Ok(self.nodes.clone())
        }
        fn get_node(&mut self, ip: &str) -> StorageResult<Option<Node>> {
            Ok(self.nodes.iter().find(|n| n.ip == ip).cloned())
        }
        fn upsert_node(&mut self, node: &Node) -> StorageResult<()> {
            self.nodes.retain(|n| n.ip != node.ip);
            self.nodes.push(node.clone());
            Ok(())
        }
        fn remove_node(&mut self, ip: &str) -> StorageResult<()> {
            self.nodes.retain(|n| n.ip != ip);
            Ok(())
        }
        fn get_task(&mut self, task_id: i32) -> StorageResult<Option<Task>> {
            Ok(self.tasks.lock().unwrap().iter().find(|t| t.task_id == task_id).cloned())
        }
        fn list_tasks_to_do(&mut self, limit: i64) -> StorageResult<Vec<Task>> {
            Ok(self
                .tasks
                .lock()
                .unwrap()
                .iter()
                .filter(|t| t.status == TaskStatus::ToDo)
                .take(limit.max(0) as usize)
                .cloned()
                .collect())
        }
        fn list_tasks_by_status(&mut self, statuses: &[TaskStatus]) -> StorageResult<Vec<Task>> {
            Ok(self
                .tasks
                .lock()
                .unwrap()
                .iter()
                .filter(|t| statuses.contains(&t.status))
                .cloned()
                .collect())
        }
        fn list_tasks_by_id(&mut self, ids: &[i32]) -> StorageResult<Vec<Task>> {
            Ok(self
                .tasks
                .lock()
                .unwrap()
                .iter()
                .filter(|t| ids.contains(&t.task_id))
                .cloned()
                .collect())
        }
        fn insert_task(&mut self, label: &str, metadata: &Value) -> StorageResult<i32> {
            let mut tasks = self.tasks.lock().unwrap();
            let id = self.next_id;
            self.next_id += 1;
            tasks.push(Task {
                task_id: id,
                label: label.to_string(),
                metadata: metadata.clone(),
                ip: None,
                status: TaskStatus::ToDo,
            });
            Ok(id)
        }
        fn set_running(&mut self, task_id: i32, ip: &str) -> StorageResult<()> {
            let mut tasks = self.tasks.lock().unwrap();
            let t = tasks.iter_mut().find(|t| t.task_id == task_id).unwrap();
            t.status = TaskStatus::Running;
            t.ip = Some(ip.to_string());
            Ok(())
        }
        fn set_done(&mut self, task_id: i32, metadata: &Value) -> StorageResult<()> {
            let mut tasks = self.tasks.lock().unwrap();
            let t = tasks.iter_mut().find(|t| t.task_id == task_id).unwrap();
            t.status = TaskStatus::Done;
            t.metadata = metadata.clone();
            Ok(())
        }
    }

    fn engines() -> EngineRepository {
        let mut section = BTreeMap::new();
        section.insert("spawn".to_string(), "{engine_path} {task_path} {ncpus}".to_string());
        let mut sections = BTreeMap::new();
        sections.insert("demo".to_string(), section);
        EngineRepository::from_sections(&sections).unwrap()
    }

    fn cfg() -> ControllerConfig {
        ControllerConfig {
            default_ssh_user: "root".to_string(),
            keys_dir: PathBuf::from("/tmp/keys"),
            local_tasks_dir: PathBuf::from("/tmp/tasks"),
            local_engines_dir: PathBuf::from("/tmp/engines"),
            remote_tasks_dir: "/data/tasks".to_string(),
            remote_engines_dir: "/data/engines".to_string(),
            default_platform: "debian-10".to_string(),
        }
    }

    #[test]
    fn test_empty_pass_is_a_no_op() {
        let storage = MemStorage::default();
        let mut controller = Controller::new(storage, engines(), None, 1, cfg());
        let stats = controller.run_pass().unwrap();
        assert_eq!(stats.nodes_total, 0);
        assert_eq!(stats.tasks_to_do, 0);
        controller.shutdown();
    }

    #[test]
    fn test_dispatch_without_session_leaves_task_to_do() {
        let mut storage = MemStorage::default();
        storage.nodes.push(Node {
            ip: "fakenode1".to_string(),
            ncpus: Some(4),
            enabled: true,
            cloud: None,
        });
        storage.insert_task("job", &json!({ "engine": "demo", "remote_folder": "/data/tasks/job1" })).unwrap();

        let mut controller = Controller::new(storage, engines(), None, 1, cfg());
        let stats = controller.run_pass().unwrap();
        assert_eq!(stats.tasks_to_do, 1);
        assert_eq!(stats.tasks_running, 0);
        controller.shutdown();
    }
}
