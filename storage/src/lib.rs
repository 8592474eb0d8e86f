//! Durable mapping of tasks and nodes to rows (spec.md §4.A). Every write is
//! committed before returning; `set_running`/`set_done` update status and
//! metadata/ip in one statement so no observer ever sees a half-updated row.

mod error;
mod node;
mod pg;
mod task;

pub use error::{Result, StorageError};
pub use node::Node;
pub use pg::PostgresStorage;
pub use task::{Task, TaskStatus};

use serde_json::Value;

/// Storage adapter contract (component A). Implemented here against
/// PostgreSQL; kept as a trait so the scheduler crate can be tested against
/// an in-memory fake without a live database (see `yascheduler-scheduler`'s
/// test module).
pub trait Storage {
    fn list_nodes(&mut self) -> Result<Vec<Node>>;
    fn get_node(&mut self, ip: &str) -> Result<Option<Node>>;
    fn upsert_node(&mut self, node: &Node) -> Result<()>;
    fn remove_node(&mut self, ip: &str) -> Result<()>;

    fn get_task(&mut self, task_id: i32) -> Result<Option<Task>>;
    fn list_tasks_to_do(&mut self, limit: i64) -> Result<Vec<Task>>;
    fn list_tasks_by_status(&mut self, statuses: &[TaskStatus]) -> Result<Vec<Task>>;
    fn list_tasks_by_id(&mut self, ids: &[i32]) -> Result<Vec<Task>>;
    fn insert_task(&mut self, label: &str, metadata: &Value) -> Result<i32>;
    fn set_running(&mut self, task_id: i32, ip: &str) -> Result<()>;
    fn set_done(&mut self, task_id: i32, metadata: &Value) -> Result<()>;
}
