//! Node provisioner (component E): a one-shot routine that turns a freshly
//! booted node into something the scheduler can dispatch work to
//! (spec.md §4.E, grounded on `setup_node` in the original scheduler).

mod error;

use std::path::Path;

pub use error::ProvisionError;
use error::Result;
use tracing::info;
use yascheduler_engines::{Deployable, EngineRepository};
use yascheduler_shell::SshSession;

/// Provision `session` for `platform`, deploying every engine in
/// `engines` that supports it. `user` is the login user used to open
/// `session`; when it isn't `root` every privileged command is wrapped
/// in `sudo`.
/// Engines relevant to a single provisioning run: those declaring support
/// for the target platform. Separated out so the "nothing to do" case can
/// be checked (and tested) without opening a session.
pub fn engines_for_platform(
    engines: &EngineRepository,
    platform: &str,
) -> Result<EngineRepository> {
    let supported = engines.filter_platforms(&[platform.to_string()]);
    if supported.is_empty() {
        return Err(ProvisionError::NoSupportedEngines(platform.to_string()));
    }
    Ok(supported)
}

pub fn provision(
    session: &SshSession,
    user: &str,
    engines: &EngineRepository,
    platform: &str,
    local_engines_dir: &Path,
    remote_engines_dir: &str,
) -> Result<()> {
    let supported = engines_for_platform(engines, platform)?;

    if let Ok(out) = session.exec("source /etc/os-release; echo $PRETTY_NAME") {
        info!("OS: {}", out.stdout.trim());
    }
    if let Ok(out) = session.exec("nproc --all") {
        info!("CPUs count: {}", out.stdout.trim());
    }

    let sudo = |cmd: &str| -> String {
        if user == "root" {
            cmd.to_string()
        } else {
            format!("sudo {cmd}")
        }
    };

    info!("updating packages...");
    let apt_opts = "-o DPkg::Lock::Timeout=600 -y";
    session.exec(&sudo(&format!("apt-get {apt_opts} update")))?;
    session.exec(&sudo(&format!("apt-get {apt_opts} upgrade")))?;

    let pkgs = supported.platform_packages(platform);
    if !pkgs.is_empty() {
        info!("installing packages: {}", pkgs.join(" "));
        session.exec(&sudo(&format!(
            "apt-get {apt_opts} install {}",
            pkgs.join(" ")
        )))?;
    }

    if let Ok(out) = session.exec("mpirun --allow-run-as-root -V") {
        if out.success() {
            if let Some(first_line) = out.stdout.lines().next() {
                info!("{}", first_line);
            }
        }
    }

    for engine in supported.values() {
        info!("setting up {} engine...", engine.name);
        let local_engine_dir = local_engines_dir.join(&engine.name);
        let remote_engine_dir = format!("{remote_engines_dir}/{}", engine.name);
        session.mkdir_p(&remote_engine_dir)?;

        for deployable in &engine.deployable {
            match deployable {
                Deployable::LocalFiles { files } => {
                    for file in files {
                        let local_path = local_engine_dir.join(file);
                        let remote_path = format!("{remote_engine_dir}/{file}");
                        info!("uploading {} to {}", file, remote_path);
                        session.upload(&local_path, &remote_path)?;
                        session.chmod_exec(&remote_path)?;
                    }
                }
                Deployable::LocalArchive { filename } => {
                    let local_path = local_engine_dir.join(filename);
                    let remote_path = format!("{remote_engine_dir}/{filename}");
                    info!("uploading {} to {}", filename, remote_path);
                    session.upload(&local_path, &remote_path)?;
                    info!("unarchiving {}", filename);
                    session.exec(&format!("cd '{remote_engine_dir}' && tar xfv '{filename}'"))?;
                    session.remove(&remote_path)?;
                }
                Deployable::RemoteArchive { url } => {
                    let fname = "archive.tar.gz";
                    let remote_path = format!("{remote_engine_dir}/{fname}");
                    info!("downloading {} to {}", url, remote_path);
                    session.exec(&format!("wget '{url}' -O '{remote_path}'"))?;
                    info!("unarchiving {}", fname);
                    session.exec(&format!("cd '{remote_engine_dir}' && tar xfv '{fname}'"))?;
                    session.remove(&remote_path)?;
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn repo_with(platforms: &str) -> EngineRepository {
        let mut section = BTreeMap::new();
        section.insert("platforms".to_string(), platforms.to_string());
        section.insert("spawn".to_string(), "run".to_string());
        let mut sections = BTreeMap::new();
        sections.insert("demo".to_string(), section);
        EngineRepository::from_sections(&sections).unwrap()
    }

    #[test]
    fn test_engines_for_platform_found() {
        let repo = repo_with("debian-10");
        let filtered = engines_for_platform(&repo, "debian-10").unwrap();
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn test_engines_for_platform_none_is_an_error() {
        let repo = repo_with("debian-10");
        assert!(engines_for_platform(&repo, "windows-server-2019").is_err());
    }
}
