//! Webhook worker pool (component F): a fixed-size pool of threads
//! draining one shared queue of task-state events and POSTing them,
//! grounded on `WebhookWorker`/`WebhookTask` referenced from
//! `scheduler.py` (bodies not part of this retrieval) and on the
//! retry-with-budget policy spec.md §7 prescribes.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Serialize;
use tracing::{debug, info, warn};

const MAX_ATTEMPTS: u32 = 5;

/// One task-state transition to report, carrying its own target URL.
#[derive(Clone, Debug, Serialize)]
pub struct WebhookEvent {
    pub task_id: i32,
    pub label: String,
    pub ip: Option<String>,
    pub status: i16,
    #[serde(skip)]
    pub url: String,
}

enum Job {
    Deliver { event: WebhookEvent, attempt: u32 },
    Stop,
}

pub struct WebhookPool {
    tx: Sender<Job>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WebhookPool {
    /// Spawn `num_threads` workers sharing one queue.
    pub fn start(num_threads: usize) -> Self {
        let (tx, rx) = channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));

        let handles = (0..num_threads.max(1))
            .map(|i| {
                let rx = Arc::clone(&rx);
                let tx = tx.clone();
                std::thread::Builder::new()
                    .name(format!("webhook-{i}"))
                    .spawn(move || worker_loop(i, rx, tx))
                    .expect("failed to spawn webhook worker thread")
            })
            .collect();

        Self {
            tx,
            handles: Mutex::new(handles),
        }
    }

    /// Enqueue an event. Events with an empty `url` are discarded
    /// immediately, per spec.md §4.F.
    pub fn enqueue(&self, event: WebhookEvent) {
        if event.url.is_empty() {
            debug!("task {} has no webhook_url, discarding event", event.task_id);
            return;
        }
        let _ = self.tx.send(Job::Deliver { event, attempt: 0 });
    }

    /// Send a poison pill per worker and join them all.
    pub fn stop(self) {
        let handles = self.handles.into_inner().unwrap();
        for _ in 0..handles.len() {
            let _ = self.tx.send(Job::Stop);
        }
        for handle in handles {
            let _ = handle.join();
        }
    }
}

#[derive(Serialize)]
struct WirePayload<'a> {
    task_id: i32,
    label: &'a str,
    ip: &'a Option<String>,
    status: i16,
}

fn worker_loop(id: usize, rx: Arc<Mutex<Receiver<Job>>>, tx: Sender<Job>) {
    let client = Client::new();
    loop {
        let job = {
            let rx = rx.lock().unwrap();
            rx.recv()
        };
        match job {
            Ok(Job::Stop) | Err(_) => break,
            Ok(Job::Deliver { event, attempt }) => {
                deliver(id, &client, event, attempt, &tx);
            }
        }
    }
}

fn deliver(worker: usize, client: &Client, event: WebhookEvent, attempt: u32, tx: &Sender<Job>) {
    let payload = WirePayload {
        task_id: event.task_id,
        label: &event.label,
        ip: &event.ip,
        status: event.status,
    };

    let result = client.post(&event.url).json(&payload).send();
    match result {
        Ok(resp) if resp.status().is_success() => {
            debug!(
                "webhook[{worker}]: delivered task {} status {}",
                event.task_id, event.status
            );
        }
        Ok(resp) => {
            retry_or_drop(
                worker,
                tx,
                event,
                attempt,
                format!("http status {}", resp.status()),
            );
        }
        Err(e) => {
            retry_or_drop(worker, tx, event, attempt, e.to_string());
        }
    }
}

fn retry_or_drop(worker: usize, tx: &Sender<Job>, event: WebhookEvent, attempt: u32, reason: String) {
    if attempt + 1 >= MAX_ATTEMPTS {
        warn!(
            "webhook[{worker}]: dropping event for task {} after {} attempts: {}",
            event.task_id,
            attempt + 1,
            reason
        );
        return;
    }
    info!(
        "webhook[{worker}]: retrying task {} (attempt {}): {}",
        event.task_id,
        attempt + 1,
        reason
    );
    std::thread::sleep(Duration::from_millis(500 * 2u64.pow(attempt.min(4))));
    let _ = tx.send(Job::Deliver {
        event,
        attempt: attempt + 1,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_without_url_are_discarded() {
        let pool = WebhookPool::start(1);
        pool.enqueue(WebhookEvent {
            task_id: 1,
            label: "demo".into(),
            ip: None,
            status: 1,
            url: String::new(),
        });
        pool.stop();
    }

    #[test]
    fn test_pool_stops_and_joins_cleanly() {
        let pool = WebhookPool::start(3);
        pool.stop();
    }
}
