/// A worker node. `ip` doubles as the primary key; cloud-allocated nodes use
/// a dot-free placeholder identifier until their real address is known (see
/// spec.md §3 and §6 "Node placeholder IPs").
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub ip: String,
    pub ncpus: Option<i32>,
    pub enabled: bool,
    pub cloud: Option<String>,
}

impl Node {
    /// A "real" node has an address containing a dot; a bare placeholder
    /// identifier (e.g. a random hostname) does not yet have one.
    pub fn is_real(&self) -> bool {
        self.ip.contains('.')
    }
}
