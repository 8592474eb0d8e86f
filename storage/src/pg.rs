//! PostgreSQL-backed [`Storage`](crate::Storage). Uses the synchronous
//! `postgres` crate and a single connection, matching the original
//! `pg8000.Connection`/`Cursor` pair in `scheduler.py` — the controller pass
//! is single-threaded, so there is never contention for this connection.
//!
//! Schema (spec.md §6):
//! ```sql
//! CREATE TABLE yascheduler_tasks (
//!     task_id  SERIAL PRIMARY KEY,
//!     label    TEXT,
//!     metadata JSON,
//!     ip       TEXT NULL,
//!     status   SMALLINT
//! );
//! CREATE TABLE yascheduler_nodes (
//!     ip      TEXT PRIMARY KEY,
//!     ncpus   INT NULL,
//!     enabled BOOLEAN,
//!     cloud   TEXT NULL
//! );
//! ```

use postgres::types::Json;
use postgres::{Client, NoTls};
use serde_json::Value;
use tracing::trace;

use crate::error::{Result, StorageError};
use crate::node::Node;
use crate::task::{Task, TaskStatus};
use crate::Storage;
use yascheduler_common::DbConfig;

pub struct PostgresStorage {
    client: Client,
}

impl PostgresStorage {
    #[tracing::instrument(skip(cfg))]
    pub fn connect(cfg: &DbConfig) -> Result<Self> {
        let conn_str = format!(
            "host={} port={} user={} password={} dbname={}",
            cfg.host, cfg.port, cfg.user, cfg.password, cfg.dbname
        );
        let client = Client::connect(&conn_str, NoTls)?;
        Ok(Self { client })
    }

    fn row_to_task(row: &postgres::Row) -> Task {
        let status: i16 = row.get("status");
        let Json(metadata): Json<Value> = row.get("metadata");
        Task {
            task_id: row.get("task_id"),
            label: row.get("label"),
            metadata,
            ip: row.get("ip"),
            status: TaskStatus::from_i16(status).unwrap_or(TaskStatus::ToDo),
        }
    }

    fn row_to_node(row: &postgres::Row) -> Node {
        Node {
            ip: row.get("ip"),
            ncpus: row.get("ncpus"),
            enabled: row.get("enabled"),
            cloud: row.get("cloud"),
        }
    }
}

impl Storage for PostgresStorage {
    fn list_nodes(&mut self) -> Result<Vec<Node>> {
        let rows = self
            .client
            .query("SELECT ip, ncpus, enabled, cloud FROM yascheduler_nodes;", &[])?;
        Ok(rows.iter().map(Self::row_to_node).collect())
    }

    fn get_node(&mut self, ip: &str) -> Result<Option<Node>> {
        let row = self.client.query_opt(
            "SELECT ip, ncpus, enabled, cloud FROM yascheduler_nodes WHERE ip = $1;",
            &[&ip],
        )?;
        Ok(row.as_ref().map(Self::row_to_node))
    }

    fn upsert_node(&mut self, node: &Node) -> Result<()> {
        self.client.execute(
            "INSERT INTO yascheduler_nodes (ip, ncpus, enabled, cloud) VALUES ($1, $2, $3, $4)
             ON CONFLICT (ip) DO UPDATE SET ncpus = $2, enabled = $3, cloud = $4;",
            &[&node.ip, &node.ncpus, &node.enabled, &node.cloud],
        )?;
        Ok(())
    }

    fn remove_node(&mut self, ip: &str) -> Result<()> {
        self.client
            .execute("DELETE FROM yascheduler_nodes WHERE ip = $1;", &[&ip])?;
        Ok(())
    }

    fn get_task(&mut self, task_id: i32) -> Result<Option<Task>> {
        let row = self.client.query_opt(
            "SELECT task_id, label, metadata, ip, status FROM yascheduler_tasks WHERE task_id = $1;",
            &[&task_id],
        )?;
        Ok(row.as_ref().map(Self::row_to_task))
    }

    fn list_tasks_to_do(&mut self, limit: i64) -> Result<Vec<Task>> {
        let rows = self.client.query(
            "SELECT task_id, label, metadata, ip, status FROM yascheduler_tasks
             WHERE status = $1 ORDER BY task_id LIMIT $2;",
            &[&TaskStatus::ToDo.as_i16(), &limit],
        )?;
        Ok(rows.iter().map(Self::row_to_task).collect())
    }

    fn list_tasks_by_status(&mut self, statuses: &[TaskStatus]) -> Result<Vec<Task>> {
        let codes: Vec<i16> = statuses.iter().map(|s| s.as_i16()).collect();
        let rows = self.client.query(
            "SELECT task_id, label, metadata, ip, status FROM yascheduler_tasks
             WHERE status = ANY($1);",
            &[&codes],
        )?;
        Ok(rows.iter().map(Self::row_to_task).collect())
    }

    fn list_tasks_by_id(&mut self, ids: &[i32]) -> Result<Vec<Task>> {
        let rows = self.client.query(
            "SELECT task_id, label, metadata, ip, status FROM yascheduler_tasks
             WHERE task_id = ANY($1);",
            &[&ids],
        )?;
        Ok(rows.iter().map(Self::row_to_task).collect())
    }

    #[tracing::instrument(skip(self, metadata))]
    fn insert_task(&mut self, label: &str, metadata: &Value) -> Result<i32> {
        trace!("insert_task: {}", label);
        let row = self.client.query_one(
            "INSERT INTO yascheduler_tasks (label, metadata, ip, status)
             VALUES ($1, $2, NULL, $3) RETURNING task_id;",
            &[&label, &Json(metadata), &TaskStatus::ToDo.as_i16()],
        )?;
        Ok(row.get("task_id"))
    }

    fn set_running(&mut self, task_id: i32, ip: &str) -> Result<()> {
        let n = self.client.execute(
            "UPDATE yascheduler_tasks SET status = $1, ip = $2 WHERE task_id = $3;",
            &[&TaskStatus::Running.as_i16(), &ip, &task_id],
        )?;
        if n == 0 {
            return Err(StorageError::NoSuchTask(task_id));
        }
        Ok(())
    }

    fn set_done(&mut self, task_id: i32, metadata: &Value) -> Result<()> {
        let n = self.client.execute(
            "UPDATE yascheduler_tasks SET status = $1, metadata = $2 WHERE task_id = $3;",
            &[&TaskStatus::Done.as_i16(), &Json(metadata), &task_id],
        )?;
        if n == 0 {
            return Err(StorageError::NoSuchTask(task_id));
        }
        Ok(())
    }
}
