/// One step of an engine's deployment recipe (spec.md §4.E). Modeled as a
/// sum type, per spec.md §9 "Variant deployment steps" — the provisioner
/// dispatches on the variant instead of walking a class hierarchy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Deployable {
    /// Upload each named file straight into the engine directory and mark
    /// it executable.
    LocalFiles { files: Vec<String> },
    /// Upload a local archive, extract it in place, then delete the archive.
    LocalArchive { filename: String },
    /// Fetch a URL into `archive.tar.gz` on the node, extract, then delete.
    RemoteArchive { url: String },
}

impl Deployable {
    /// Parse one `;`-separated descriptor, e.g. `local-files:run,run.sh`,
    /// `local-archive:engine.tar.gz`, or `remote-archive:https://host/e.tgz`.
    pub fn parse(descriptor: &str) -> Option<Self> {
        let (kind, rest) = descriptor.split_once(':')?;
        match kind.trim() {
            "local-files" => Some(Deployable::LocalFiles {
                files: rest.split(',').map(|s| s.trim().to_string()).collect(),
            }),
            "local-archive" => Some(Deployable::LocalArchive {
                filename: rest.trim().to_string(),
            }),
            "remote-archive" => Some(Deployable::RemoteArchive {
                url: rest.trim().to_string(),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_local_files() {
        let d = Deployable::parse("local-files:run,run.sh").unwrap();
        assert_eq!(
            d,
            Deployable::LocalFiles {
                files: vec!["run".into(), "run.sh".into()]
            }
        );
    }

    #[test]
    fn test_parse_remote_archive() {
        let d = Deployable::parse("remote-archive:https://example.com/e.tar.gz").unwrap();
        assert_eq!(
            d,
            Deployable::RemoteArchive {
                url: "https://example.com/e.tar.gz".into()
            }
        );
    }

    #[test]
    fn test_parse_unknown_kind() {
        assert!(Deployable::parse("docker-image:foo").is_none());
    }
}
