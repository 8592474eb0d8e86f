//! Remote-shell manager (component B): one authenticated SSH session per
//! live node, plus the primitive file and process operations the
//! provisioner and scheduler build on (spec.md §4.B).

mod error;
mod manager;
mod session;

pub use error::ShellError;
pub use manager::{wait_until_reachable, NodeRef, ShellManager};
pub use session::{CommandOutput, SshSession};
