//! Reference provider adapter, grounded directly on `clouds/upcloud.py`:
//! creates an 8-core/4GB Debian server in the London zone, waits for SSH,
//! and tears servers down by IP on delete. Talks to UpCloud's plain REST
//! API (`https://api.upcloud.com/1.3`) rather than a provider SDK, since
//! no such SDK crate is part of this stack.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::{json, Value};
use tracing::info;

use crate::api::{random_hostname, CloudApi};
use crate::error::{CloudError, Result};

const API_BASE: &str = "https://api.upcloud.com/1.3";

pub struct UpCloudApi {
    name: String,
    login: String,
    password: String,
    ssh_user: String,
    max_nodes: u32,
    keys_dir: PathBuf,
    public_key: Option<String>,
    client: Client,
}

impl UpCloudApi {
    pub fn new(
        login: String,
        password: String,
        max_nodes: u32,
        keys_dir: PathBuf,
        public_key: Option<String>,
    ) -> Self {
        Self {
            name: "upcloud".to_string(),
            login,
            password,
            ssh_user: "root".to_string(),
            max_nodes,
            keys_dir,
            public_key,
            client: Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{API_BASE}{path}");
        let mut req = self
            .client
            .request(method, &url)
            .basic_auth(&self.login, Some(&self.password));
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req.send()?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().unwrap_or_default();
            return Err(CloudError::Provider(
                self.name.clone(),
                format!("{status}: {text}"),
            ));
        }
        Ok(resp.json().unwrap_or(Value::Null))
    }
}

impl CloudApi for UpCloudApi {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_node(&self) -> Result<String> {
        let hostname = random_hostname("node");
        let mut login_user = json!({
            "username": self.ssh_user,
            "create_password": "no",
        });
        if let Some(key) = &self.public_key {
            login_user["ssh_keys"] = json!({ "ssh_key": [key] });
        }

        let body = json!({
            "server": {
                "zone": "uk-lon1",
                "title": hostname,
                "hostname": hostname,
                "plan": "custom",
                "core_number": "8",
                "memory_amount": "4096",
                "storage_devices": {
                    "storage_device": [{
                        "action": "clone",
                        "storage": "01000000-0000-4000-8000-000030200200",
                        "title": format!("{hostname}-disk"),
                        "size": 40,
                        "tier": "maxiops",
                    }]
                },
                "login_user": login_user,
            }
        });

        let resp = self.request(reqwest::Method::POST, "/server", Some(body))?;
        let ip = resp["server"]["ip_addresses"]["ip_address"]
            .as_array()
            .and_then(|ips| ips.iter().find(|a| a["access"] == "public"))
            .and_then(|a| a["address"].as_str())
            .ok_or_else(|| {
                CloudError::Provider(self.name.clone(), "no public ip in response".into())
            })?
            .to_string();

        info!("upcloud: created {}", ip);
        info!("upcloud: waiting for node to start accepting ssh connections");

        yascheduler_shell::wait_until_reachable(
            &ip,
            &self.ssh_user,
            &self.keys_dir,
            Duration::from_secs(300),
        )
        .map_err(|_| CloudError::Unreachable(ip.clone()))?;

        Ok(ip)
    }

    fn delete_node(&self, ip: &str) -> Result<()> {
        let servers = self.request(reqwest::Method::GET, "/server", None)?;
        let uuid = servers["servers"]["server"]
            .as_array()
            .into_iter()
            .flatten()
            .find(|s| {
                s["ip_addresses"]["ip_address"]
                    .as_array()
                    .map(|ips| ips.iter().any(|a| a["address"] == ip))
                    .unwrap_or(false)
            })
            .and_then(|s| s["uuid"].as_str())
            .map(str::to_string);

        let Some(uuid) = uuid else {
            info!("upcloud: node {} not deleted, as it is unknown", ip);
            return Ok(());
        };

        self.request(
            reqwest::Method::POST,
            &format!("/server/{uuid}/stop"),
            Some(json!({ "stop_server": { "stop_type": "hard" } })),
        )?;
        self.request(
            reqwest::Method::DELETE,
            &format!("/server/{uuid}?storages=1"),
            None,
        )?;
        info!("upcloud: deleted {}", ip);
        Ok(())
    }

    fn ssh_user(&self) -> &str {
        &self.ssh_user
    }

    fn max_nodes(&self) -> u32 {
        self.max_nodes
    }
}
