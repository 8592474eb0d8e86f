//! Composes several [`CloudApi`] providers and runs their blocking calls on
//! a background dispatcher thread so a scheduler pass never waits on a
//! provider (spec.md §4.D, grounded on `CloudAPIManager` referenced from
//! `scheduler.py`, whose body was not part of this retrieval).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use tracing::{info, warn};

use crate::api::CloudApi;

/// A node row as the scheduler's registry sees it; only the columns the
/// cloud manager needs to reason about ownership and capacity.
#[derive(Clone, Debug)]
pub struct NodeResource {
    pub ip: String,
    pub cloud: Option<String>,
}

/// One node finished provisioning, or one deletion finished, since the
/// last drain.
#[derive(Debug)]
pub enum CloudAsyncResult {
    Created {
        provider: String,
        ip: String,
        task_id: i32,
    },
    CreateFailed {
        provider: String,
        task_id: i32,
    },
    Deleted {
        provider: String,
        ip: String,
    },
}

enum Job {
    Create { provider: usize, task_id: i32 },
    Delete { provider: usize, ip: String },
}

struct Shared {
    queue: Mutex<VecDeque<Job>>,
    cv: Condvar,
    stop: AtomicBool,
}

pub struct CloudManager {
    providers: Vec<Arc<dyn CloudApi>>,
    allocating: Mutex<HashMap<String, u32>>,
    shared: Arc<Shared>,
    results_tx: std::sync::mpsc::Sender<CloudAsyncResult>,
    results_rx: Mutex<std::sync::mpsc::Receiver<CloudAsyncResult>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CloudManager {
    pub fn new(providers: Vec<Arc<dyn CloudApi>>) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            cv: Condvar::new(),
            stop: AtomicBool::new(false),
        });
        let (results_tx, results_rx) = std::sync::mpsc::channel();

        let worker = {
            let shared = Arc::clone(&shared);
            let providers = providers.clone();
            let results_tx = results_tx.clone();
            std::thread::Builder::new()
                .name("cloud-dispatcher".into())
                .spawn(move || dispatch_loop(shared, providers, results_tx))
                .expect("failed to spawn cloud dispatcher thread")
        };

        Self {
            providers,
            allocating: Mutex::new(HashMap::new()),
            shared,
            results_tx,
            results_rx: Mutex::new(results_rx),
            worker: Mutex::new(Some(worker)),
        }
    }

    fn provider_index(&self, name: &str) -> Option<usize> {
        self.providers.iter().position(|p| p.name() == name)
    }

    /// The ssh user a provider configures on the nodes it creates, used to
    /// override the default when opening a session to a cloud-owned node.
    pub fn ssh_user_for(&self, provider: &str) -> Option<&str> {
        self.providers
            .iter()
            .find(|p| p.name() == provider)
            .map(|p| p.ssh_user())
    }

    /// Sum over providers of `max_nodes - current_owned`, where
    /// `current_owned` counts registry rows tagged for that provider plus
    /// outstanding creation intents.
    pub fn get_capacity(&self, resources: &[NodeResource]) -> u32 {
        let allocating = self.allocating.lock().unwrap();
        self.providers
            .iter()
            .map(|p| {
                let owned = resources
                    .iter()
                    .filter(|r| r.cloud.as_deref() == Some(p.name()))
                    .count() as u32;
                let in_flight = allocating.get(p.name()).copied().unwrap_or(0);
                p.max_nodes().saturating_sub(owned + in_flight)
            })
            .sum()
    }

    /// Record an intent to provision one node on behalf of `task_id`,
    /// choosing the provider with the fewest currently-owned nodes among
    /// those with spare capacity. Ties break on provider name.
    pub fn allocate(&self, task_id: i32, resources: &[NodeResource]) {
        let mut allocating = self.allocating.lock().unwrap();
        let chosen = self
            .providers
            .iter()
            .enumerate()
            .filter_map(|(idx, p)| {
                let owned = resources
                    .iter()
                    .filter(|r| r.cloud.as_deref() == Some(p.name()))
                    .count() as u32;
                let in_flight = allocating.get(p.name()).copied().unwrap_or(0);
                if owned + in_flight < p.max_nodes() {
                    Some((idx, owned + in_flight, p.name().to_string()))
                } else {
                    None
                }
            })
            .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.2.cmp(&b.2)));

        let Some((idx, _, name)) = chosen else {
            warn!(
                "no cloud provider has spare capacity, dropping allocation for task {}",
                task_id
            );
            return;
        };

        *allocating.entry(name.clone()).or_insert(0) += 1;
        drop(allocating);

        info!("allocating a node on {} for task {}", name, task_id);
        let mut queue = self.shared.queue.lock().unwrap();
        queue.push_back(Job::Create {
            provider: idx,
            task_id,
        });
        self.shared.cv.notify_one();
    }

    /// Record intents to delete the given (already cloud-owned) nodes.
    pub fn deallocate(&self, ips: &[String], resources: &[NodeResource]) {
        let mut queue = self.shared.queue.lock().unwrap();
        for ip in ips {
            let Some(cloud) = resources
                .iter()
                .find(|r| &r.ip == ip)
                .and_then(|r| r.cloud.clone())
            else {
                continue;
            };
            let Some(idx) = self.provider_index(&cloud) else {
                continue;
            };
            info!("deallocating node {} on {}", ip, cloud);
            queue.push_back(Job::Delete {
                provider: idx,
                ip: ip.clone(),
            });
        }
        self.shared.cv.notify_all();
    }

    /// Drain completed allocations and deletions without blocking.
    pub fn do_async_work(&self) -> Vec<CloudAsyncResult> {
        let rx = self.results_rx.lock().unwrap();
        let mut out = Vec::new();
        while let Ok(result) = rx.try_recv() {
            if let CloudAsyncResult::Created { provider, .. }
            | CloudAsyncResult::CreateFailed { provider, .. } = &result
            {
                let mut allocating = self.allocating.lock().unwrap();
                if let Some(count) = allocating.get_mut(provider) {
                    *count = count.saturating_sub(1);
                }
            }
            out.push(result);
        }
        out
    }

    /// Cancel any not-yet-started intents and wait for in-flight provider
    /// calls to return.
    pub fn stop(&self) {
        {
            let mut queue = self.shared.queue.lock().unwrap();
            let dropped = queue.len();
            queue.clear();
            if dropped > 0 {
                info!("cancelled {} pending cloud intent(s)", dropped);
            }
        }
        self.shared.stop.store(true, Ordering::SeqCst);
        self.shared.cv.notify_all();
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

fn dispatch_loop(
    shared: Arc<Shared>,
    providers: Vec<Arc<dyn CloudApi>>,
    results_tx: std::sync::mpsc::Sender<CloudAsyncResult>,
) {
    loop {
        let job = {
            let mut queue = shared.queue.lock().unwrap();
            loop {
                if let Some(job) = queue.pop_front() {
                    break Some(job);
                }
                if shared.stop.load(Ordering::SeqCst) {
                    break None;
                }
                queue = shared.cv.wait(queue).unwrap();
            }
        };
        let Some(job) = job else { break };

        match job {
            Job::Create { provider, task_id } => {
                let p = &providers[provider];
                match p.create_node() {
                    Ok(ip) => {
                        let _ = results_tx.send(CloudAsyncResult::Created {
                            provider: p.name().to_string(),
                            ip,
                            task_id,
                        });
                    }
                    Err(e) => {
                        warn!("node creation on {} failed: {}", p.name(), e);
                        let _ = results_tx.send(CloudAsyncResult::CreateFailed {
                            provider: p.name().to_string(),
                            task_id,
                        });
                    }
                }
            }
            Job::Delete { provider, ip } => {
                let p = &providers[provider];
                match p.delete_node(&ip) {
                    Ok(()) => {
                        let _ = results_tx.send(CloudAsyncResult::Deleted {
                            provider: p.name().to_string(),
                            ip,
                        });
                    }
                    Err(e) => {
                        warn!(
                            "node deletion of {} on {} failed, will retry: {}",
                            ip,
                            p.name(),
                            e
                        );
                        std::thread::sleep(std::time::Duration::from_secs(5));
                        let mut queue = shared.queue.lock().unwrap();
                        queue.push_back(Job::Delete { provider, ip });
                    }
                }
            }
        }
    }
}
