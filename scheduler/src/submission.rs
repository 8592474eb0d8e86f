//! Task submission: validation against the engine registry plus
//! remote-folder assignment, kept here rather than in the bare storage
//! adapter since both depend on engine metadata the storage crate doesn't
//! know about (grounded on `queue_submit_task` in the original scheduler).

use chrono::Local;
use rand::Rng;
use serde_json::Value;

use yascheduler_engines::EngineRepository;
use yascheduler_storage::Storage;

use crate::error::{Result, SchedulerError};

/// Validate `metadata` against `engine_name`'s declared input files, stamp
/// `metadata.engine` and a freshly generated `metadata.remote_folder`, and
/// insert the task as TO_DO. Returns the new task id.
pub fn submit_task<S: Storage>(
    storage: &mut S,
    engines: &EngineRepository,
    remote_tasks_dir: &str,
    label: &str,
    mut metadata: Value,
    engine_name: &str,
) -> Result<i32> {
    let engine = engines
        .get(engine_name)
        .ok_or_else(|| SchedulerError::UnknownEngine(engine_name.to_string()))?;

    let obj = metadata
        .as_object()
        .cloned()
        .unwrap_or_default();
    for input_file in &engine.input_files {
        if !obj.contains_key(input_file) {
            return Err(SchedulerError::MissingInputFile(
                input_file.clone(),
                engine_name.to_string(),
            ));
        }
    }

    let remote_folder = format!(
        "{}/{}_{}",
        remote_tasks_dir.trim_end_matches('/'),
        Local::now().format("%Y%m%d_%H%M%S"),
        random_suffix(4),
    );

    let map = metadata.as_object_mut().expect("metadata must be an object");
    map.insert("engine".to_string(), Value::String(engine_name.to_string()));
    map.insert("remote_folder".to_string(), Value::String(remote_folder));

    Ok(storage.insert_task(label, &metadata)?)
}

fn random_suffix(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| (b'a' + rng.gen_range(0..26)) as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use yascheduler_engines::EngineRepository;
    use yascheduler_storage::{Node, Task, TaskStatus};

    use super::*;

    struct FakeStorage {
        next_id: i32,
        inserted: Vec<(String, Value)>,
    }

    impl Storage for FakeStorage {
        fn list_nodes(&mut self) -> yascheduler_storage::Result<Vec<Node>> {
            Ok(vec![])
        }
        fn get_node(&mut self, _ip: &str) -> yascheduler_storage::Result<Option<Node>> {
            Ok(None)
        }
        fn upsert_node(&mut self, _node: &Node) -> yascheduler_storage::Result<()> {
            Ok(())
        }
        fn remove_node(&mut self, _ip: &str) -> yascheduler_storage::Result<()> {
            Ok(())
        }
        fn get_task(&mut self, _task_id: i32) -> yascheduler_storage::Result<Option<Task>> {
            Ok(None)
        }
        fn list_tasks_to_do(&mut self, _limit: i64) -> yascheduler_storage::Result<Vec<Task>> {
            Ok(vec![])
        }
        fn list_tasks_by_status(
            &mut self,
            _statuses: &[TaskStatus],
        ) -> yascheduler_storage::Result<Vec<Task>> {
            Ok(vec![])
        }
        fn list_tasks_by_id(&mut self, _ids: &[i32]) -> yascheduler_storage::Result<Vec<Task>> {
            Ok(vec![])
        }
        fn insert_task(&mut self, label: &str, metadata: &Value) -> yascheduler_storage::Result<i32> {
            let id = self.next_id;
            self.next_id += 1;
            self.inserted.push((label.to_string(), metadata.clone()));
            Ok(id)
        }
        fn set_running(&mut self, _task_id: i32, _ip: &str) -> yascheduler_storage::Result<()> {
            Ok(())
        }
        fn set_done(&mut self, _task_id: i32, _metadata: &Value) -> yascheduler_storage::Result<()> {
            Ok(())
        }
    }

    fn engines() -> EngineRepository {
        let mut section = BTreeMap::new();
        section.insert("spawn".to_string(), "run".to_string());
        section.insert("input_files".to_string(), "input.txt".to_string());
        let mut sections = BTreeMap::new();
        sections.insert("demo".to_string(), section);
        EngineRepository::from_sections(&sections).unwrap()
    }

    #[test]
    fn test_submit_task_stamps_engine_and_remote_folder() {
        let mut storage = FakeStorage {
            next_id: 1,
            inserted: vec![],
        };
        let id = submit_task(
            &mut storage,
            &engines(),
            "/data/tasks",
            "my-job",
            json!({ "input.txt": "contents" }),
            "demo",
        )
        .unwrap();
        assert_eq!(id, 1);
        let (_, metadata) = &storage.inserted[0];
        assert_eq!(metadata["engine"], "demo");
        assert!(metadata["remote_folder"]
            .as_str()
            .unwrap()
            .starts_with("/data/tasks/"));
    }

    #[test]
    fn test_submit_task_rejects_unknown_engine() {
        let mut storage = FakeStorage {
            next_id: 1,
            inserted: vec![],
        };
        let err = submit_task(
            &mut storage,
            &engines(),
            "/data/tasks",
            "my-job",
            json!({}),
            "nope",
        )
        .unwrap_err();
        assert!(matches!(err, SchedulerError::UnknownEngine(_)));
    }

    #[test]
    fn test_submit_task_rejects_missing_input_file() {
        let mut storage = FakeStorage {
            next_id: 1,
            inserted: vec![],
        };
        let err = submit_task(
            &mut storage,
            &engines(),
            "/data/tasks",
            "my-job",
            json!({}),
            "demo",
        )
        .unwrap_err();
        assert!(matches!(err, SchedulerError::MissingInputFile(..)));
    }
}
