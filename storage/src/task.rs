use serde_json::Value;

/// Lifecycle status of a [`Task`]. Matches the `smallint` encoding of the
/// `yascheduler_tasks.status` column described in spec.md §6: `TO_DO=0`,
/// `RUNNING=1`, `DONE=2`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum TaskStatus {
    ToDo = 0,
    Running = 1,
    Done = 2,
}

impl TaskStatus {
    pub fn as_i16(self) -> i16 {
        self as i16
    }

    pub fn from_i16(v: i16) -> Option<Self> {
        match v {
            0 => Some(TaskStatus::ToDo),
            1 => Some(TaskStatus::Running),
            2 => Some(TaskStatus::Done),
            _ => None,
        }
    }
}

/// A submitted unit of work. `metadata` carries the reserved keys
/// (`engine`, `remote_folder`, optional `local_folder`/`webhook_url`, plus
/// one key per declared input file) alongside whatever else the submitter
/// passed through; see spec.md §3.
#[derive(Clone, Debug)]
pub struct Task {
    pub task_id: i32,
    pub label: String,
    pub metadata: Value,
    pub ip: Option<String>,
    pub status: TaskStatus,
}

impl Task {
    pub fn webhook_url(&self) -> Option<&str> {
        self.metadata.get("webhook_url").and_then(Value::as_str)
    }

    pub fn engine_name(&self) -> Option<&str> {
        self.metadata.get("engine").and_then(Value::as_str)
    }

    pub fn remote_folder(&self) -> Option<&str> {
        self.metadata.get("remote_folder").and_then(Value::as_str)
    }

    pub fn local_folder(&self) -> Option<&str> {
        self.metadata.get("local_folder").and_then(Value::as_str)
    }
}
