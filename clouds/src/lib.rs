//! Cloud-API abstraction (component D): a uniform create/delete-node
//! contract and a manager that composes several provider accounts
//! (spec.md §4.D).

mod api;
mod error;
mod manager;
mod upcloud;

pub use api::{random_hostname, CloudApi};
pub use error::CloudError;
pub use manager::{CloudAsyncResult, CloudManager, NodeResource};
pub use upcloud::UpCloudApi;

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    struct FakeProvider {
        name: String,
        max_nodes: u32,
        created: AtomicU32,
    }

    impl CloudApi for FakeProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn create_node(&self) -> error::Result<String> {
            let n = self.created.fetch_add(1, Ordering::SeqCst);
            Ok(format!("node-{}-{}", self.name, n))
        }

        fn delete_node(&self, _ip: &str) -> error::Result<()> {
            Ok(())
        }

        fn ssh_user(&self) -> &str {
            "root"
        }

        fn max_nodes(&self) -> u32 {
            self.max_nodes
        }
    }

    fn fake(name: &str, max_nodes: u32) -> Arc<dyn CloudApi> {
        Arc::new(FakeProvider {
            name: name.to_string(),
            max_nodes,
            created: AtomicU32::new(0),
        })
    }

    #[test]
    fn test_capacity_accounts_for_owned_and_in_flight() {
        let manager = CloudManager::new(vec![fake("alpha", 2)]);
        let resources = vec![NodeResource {
            ip: "1.2.3.4".into(),
            cloud: Some("alpha".into()),
        }];
        assert_eq!(manager.get_capacity(&resources), 1);
        manager.stop();
    }

    #[test]
    fn test_allocate_prefers_least_loaded_provider() {
        let manager = CloudManager::new(vec![fake("alpha", 5), fake("beta", 5)]);
        let resources = vec![NodeResource {
            ip: "1.1.1.1".into(),
            cloud: Some("alpha".into()),
        }];
        manager.allocate(1, &resources);
        std::thread::sleep(Duration::from_millis(200));
        let results = manager.do_async_work();
        assert_eq!(results.len(), 1);
        match &results[0] {
            CloudAsyncResult::Created { provider, task_id, .. } => {
                assert_eq!(provider, "beta");
                assert_eq!(*task_id, 1);
            }
            other => panic!("unexpected result {:?}", other),
        }
        manager.stop();
    }

    #[test]
    fn test_stop_cancels_pending_intents() {
        let manager = CloudManager::new(vec![fake("alpha", 100)]);
        for i in 0..20 {
            manager.allocate(i, &[]);
        }
        manager.stop();
    }
}
