//! The uniform contract every cloud provider implements (spec.md §4.D).

use crate::error::Result;

/// One cloud provider account. `create_node`/`delete_node` are blocking —
/// they run on a background worker owned by [`crate::manager::CloudManager`],
/// never on the scheduler pass itself.
pub trait CloudApi: Send + Sync {
    /// Short, stable provider name; matches `yascheduler_nodes.cloud` and
    /// the `<name>_login`/`<name>_pass`/`<name>_max_nodes` config keys.
    fn name(&self) -> &str;

    /// Create one node and block until it answers a trivial SSH command.
    /// Returns the node's real IP.
    fn create_node(&self) -> Result<String>;

    /// Delete the node at `ip`, blocking until the provider confirms.
    fn delete_node(&self, ip: &str) -> Result<()>;

    /// The SSH login user this provider configures on nodes it creates.
    fn ssh_user(&self) -> &str;

    /// The operator-configured cap on concurrently owned nodes.
    fn max_nodes(&self) -> u32;
}

/// A short random hostname suffix, grounded on the original's
/// `"".join(random.choice(string.ascii_lowercase) for _ in range(4))`.
pub fn random_hostname(prefix: &str) -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let suffix: String = (0..4)
        .map(|_| (b'a' + rng.gen_range(0..26)) as char)
        .collect();
    format!("{prefix}-{suffix}")
}
