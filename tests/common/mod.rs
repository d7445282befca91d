// Shared test helpers: temp dirs, config builders, fake agents and scripts

#![allow(dead_code)]

use checkengine::config::AppConfig;
use checkengine::registry::PluginRegistry;
use checkengine::result_store::ResultStore;
use checkengine::scheduler::CycleRunner;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

pub const AGENT_OUTPUT: &str = "<<<check_mk>>>
Version: 2.3.0p1
AgentOS: linux
<<<df>>>
/dev/sda1 ext4 1000 500 500 50% /
<<<mem>>>
MemTotal: 1000 kB
MemAvailable: 500 kB
<<<uptime>>>
3600.5 7000.1
";

pub struct TestEnv {
    pub dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn cache_dir(&self) -> String {
        self.path("cache").display().to_string()
    }

    pub fn piggyback_dir(&self) -> String {
        self.path("piggyback").display().to_string()
    }

    pub fn store_path(&self) -> String {
        self.path("results.db").display().to_string()
    }

    /// Full config with the given `[[hosts]]` tables appended.
    pub fn config_toml(&self, hosts: &str) -> String {
        format!(
            r#"
[engine]
check_interval_secs = 1
cycle_deadline_ms = 5000
stats_log_interval_secs = 3600

[cache]
dir = "{}"

[piggyback]
dir = "{}"

[store]
path = "{}"

{}
"#,
            self.cache_dir(),
            self.piggyback_dir(),
            self.store_path(),
            hosts
        )
    }

    pub fn config(&self, hosts: &str) -> Arc<AppConfig> {
        Arc::new(AppConfig::load_from_str(&self.config_toml(hosts)).unwrap())
    }

    pub async fn store(&self) -> Arc<ResultStore> {
        let store = ResultStore::connect(&self.store_path()).await.unwrap();
        store.init().await.unwrap();
        Arc::new(store)
    }

    pub async fn runner(&self, hosts: &str) -> (CycleRunner, Arc<ResultStore>) {
        let config = self.config(hosts);
        let registry = Arc::new(PluginRegistry::from_names(&config.plugins.enabled).unwrap());
        let store = self.store().await;
        (CycleRunner::new(config, registry, Some(store.clone())), store)
    }

    /// Write a file under the temp dir and return its path.
    pub fn file(&self, name: &str, content: &str) -> String {
        let path = self.path(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path.display().to_string()
    }

    /// Write an executable shell script.
    pub fn script(&self, name: &str, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = self.file(name, &format!("#!/bin/sh\n{}\n", body));
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }
}

pub fn agent_host(name: &str, port: u16) -> String {
    format!(
        r#"
[[hosts]]
name = "{}"
address = "127.0.0.1"

[[hosts.sources]]
type = "agent"
port = {}
timeout_ms = 2000
"#,
        name, port
    )
}

/// Program source that prints a file (no exec of freshly written files).
pub fn program_source(path: &str) -> String {
    format!(
        r#"
[[hosts.sources]]
type = "program"
command = "cat {}"
timeout_ms = 2000
"#,
        path
    )
}

pub fn piggyback_source() -> &'static str {
    r#"
[[hosts.sources]]
type = "piggyback"
"#
}

/// Agent that answers every connection with `payload` and closes.
pub async fn fake_agent(payload: &str) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let payload = payload.as_bytes().to_vec();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let payload = payload.clone();
            tokio::spawn(async move {
                let _ = socket.write_all(&payload).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    port
}

/// Agent that accepts connections but never sends or closes.
pub async fn hanging_agent() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut open = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            open.push(socket);
        }
    });
    port
}

/// A local port with nothing listening.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}
