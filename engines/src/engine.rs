use std::collections::{BTreeMap, BTreeSet};

use crate::deployable::Deployable;
use crate::error::EngineError;

/// A named executable stack: its input/output contract, how to tell whether
/// it is still running, and how to deploy it onto a freshly provisioned
/// node (spec.md §3 "Engine", §4.C).
#[derive(Clone, Debug)]
pub struct Engine {
    pub name: String,
    pub input_files: Vec<String>,
    pub output_files: Vec<String>,
    /// Template with `{engine_path}`, `{task_path}`, `{ncpus}` placeholders.
    pub spawn: String,
    pub check_pname: Option<String>,
    pub check_cmd: Option<String>,
    pub check_cmd_code: Option<i32>,
    pub platforms: BTreeSet<String>,
    pub deployable: Vec<Deployable>,
    /// OS packages required per supported platform.
    pub packages: BTreeMap<String, Vec<String>>,
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Engine {
    /// Build an [`Engine`] from a single `[engine.<name>]` section's keys,
    /// as loaded by `yascheduler_common::load_config`.
    pub fn from_section(
        name: &str,
        section: &BTreeMap<String, String>,
    ) -> Result<Self, EngineError> {
        let get = |key: &str| section.get(key).map(String::as_str);

        let spawn = get("spawn")
            .ok_or_else(|| EngineError::MissingKey(name.into(), "spawn".into()))?
            .to_string();

        let check_cmd = get("check_cmd").map(str::to_string);
        let check_cmd_code = match get("check_cmd_code") {
            Some(v) => Some(v.parse().map_err(|_| {
                EngineError::InvalidValue(name.into(), "check_cmd_code".into(), v.into())
            })?),
            None => None,
        };
        if check_cmd.is_some() != check_cmd_code.is_some() {
            return Err(EngineError::InvalidValue(
                name.into(),
                "check_cmd".into(),
                "check_cmd and check_cmd_code must be set together".into(),
            ));
        }

        let deployable = get("deploy")
            .map(|v| {
                v.split(';')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .filter_map(Deployable::parse)
                    .collect()
            })
            .unwrap_or_default();

        let packages = section
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix("packages.")
                    .map(|platform| (platform.to_string(), split_csv(v)))
            })
            .collect();

        Ok(Engine {
            name: name.to_string(),
            input_files: get("input_files").map(split_csv).unwrap_or_default(),
            output_files: get("output_files").map(split_csv).unwrap_or_default(),
            spawn,
            check_pname: get("check_pname").map(str::to_string),
            check_cmd,
            check_cmd_code,
            platforms: get("platforms").map(split_csv).unwrap_or_default().into_iter().collect(),
            deployable,
            packages,
        })
    }

    /// Expand the spawn template. Unknown placeholders are an error, per
    /// spec.md §6.
    pub fn format_spawn(
        &self,
        engine_path: &str,
        task_path: &str,
        ncpus: u32,
    ) -> Result<String, EngineError> {
        format_placeholders(
            &self.spawn,
            &[
                ("engine_path", engine_path.to_string()),
                ("task_path", task_path.to_string()),
                ("ncpus", ncpus.to_string()),
            ],
        )
    }

    pub fn supports_platform(&self, platform: &str) -> bool {
        self.platforms.contains(platform)
    }
}

/// Replace `{name}` placeholders from `values`; any `{...}` left over that
/// isn't in `values` is an error.
fn format_placeholders(template: &str, values: &[(&str, String)]) -> Result<String, EngineError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 1..];
        let close = after_open
            .find('}')
            .ok_or_else(|| EngineError::UnknownPlaceholder(after_open.to_string()))?;
        let name = &after_open[..close];
        match values.iter().find(|(k, _)| *k == name) {
            Some((_, v)) => out.push_str(v),
            None => return Err(EngineError::UnknownPlaceholder(name.to_string())),
        }
        rest = &after_open[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_from_section_basic() {
        let s = section(&[
            ("platforms", "debian-10, ubuntu-20.04"),
            ("input_files", "in.txt"),
            ("output_files", "out.txt"),
            ("spawn", "{engine_path}/run {task_path} {ncpus}"),
            ("check_pname", "demo-engine"),
            ("deploy", "local-files:run;remote-archive:https://x/y.tgz"),
            ("packages.debian-10", "libgfortran5, openmpi-bin"),
        ]);
        let e = Engine::from_section("demo", &s).unwrap();
        assert_eq!(e.input_files, vec!["in.txt"]);
        assert!(e.platforms.contains("debian-10"));
        assert_eq!(e.deployable.len(), 2);
        assert_eq!(e.packages["debian-10"], vec!["libgfortran5", "openmpi-bin"]);
    }

    #[test]
    fn test_format_spawn_ok() {
        let s = section(&[("spawn", "{engine_path} {task_path} {ncpus}")]);
        let e = Engine::from_section("demo", &s).unwrap();
        let cmd = e.format_spawn("/opt/demo", "/work/t1", 4).unwrap();
        assert_eq!(cmd, "/opt/demo /work/t1 4");
    }

    #[test]
    fn test_format_spawn_unknown_placeholder() {
        let s = section(&[("spawn", "{bogus}")]);
        let e = Engine::from_section("demo", &s).unwrap();
        assert!(e.format_spawn("a", "b", 1).is_err());
    }

    #[test]
    fn test_check_cmd_requires_code() {
        let s = section(&[("spawn", "run"), ("check_cmd", "pgrep demo")]);
        assert!(Engine::from_section("demo", &s).is_err());
    }
}
