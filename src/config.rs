// Application config (TOML): engine limits, cache/store locations, hosts and their sources.

use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

use crate::models::SourceKind;
use crate::plugins::BUILTIN_PLUGINS;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    pub cache: CacheConfig,
    #[serde(default)]
    pub piggyback: PiggybackConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub plugins: PluginsConfig,
    #[serde(default)]
    pub hosts: Vec<HostConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// How often `run` starts a cycle for every host.
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    /// Overall budget of one host cycle unless the host overrides it.
    #[serde(default = "default_cycle_deadline_ms")]
    pub cycle_deadline_ms: u64,
    /// Concurrent source fetches within one host cycle.
    #[serde(default = "default_max_parallel_fetches")]
    pub max_parallel_fetches: usize,
    /// Host cycles running at the same time in `run`.
    #[serde(default = "default_max_concurrent_hosts")]
    pub max_concurrent_hosts: usize,
    /// How often to log worker stats at INFO level.
    #[serde(default = "default_stats_log_interval_secs")]
    pub stats_log_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval_secs(),
            cycle_deadline_ms: default_cycle_deadline_ms(),
            max_parallel_fetches: default_max_parallel_fetches(),
            max_concurrent_hosts: default_max_concurrent_hosts(),
            stats_log_interval_secs: default_stats_log_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub dir: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub max_age_secs: MaxAgeConfig,
}

/// Default cache validity per source type, in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct MaxAgeConfig {
    #[serde(default = "default_agent_max_age_secs")]
    pub agent: u64,
    #[serde(default = "default_program_max_age_secs")]
    pub program: u64,
    #[serde(default = "default_snmp_max_age_secs")]
    pub snmp: u64,
}

impl Default for MaxAgeConfig {
    fn default() -> Self {
        Self {
            agent: default_agent_max_age_secs(),
            program: default_program_max_age_secs(),
            snmp: default_snmp_max_age_secs(),
        }
    }
}

/// Per-host overrides of [`MaxAgeConfig`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MaxAgeOverrides {
    pub agent: Option<u64>,
    pub program: Option<u64>,
    pub snmp: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PiggybackConfig {
    #[serde(default = "default_piggyback_dir")]
    pub dir: String,
    /// Piggyback files older than this are ignored.
    #[serde(default = "default_piggyback_max_age_secs")]
    pub max_age_secs: u64,
}

impl Default for PiggybackConfig {
    fn default() -> Self {
        Self {
            dir: default_piggyback_dir(),
            max_age_secs: default_piggyback_max_age_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PluginsConfig {
    #[serde(default = "default_enabled_plugins")]
    pub enabled: Vec<String>,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_plugins(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    pub name: String,
    /// IP address or DNS name; the host name is used when unset.
    pub address: Option<String>,
    pub cycle_deadline_ms: Option<u64>,
    pub max_parallel_fetches: Option<usize>,
    #[serde(default)]
    pub max_age_secs: MaxAgeOverrides,
    pub sources: Vec<SourceConfig>,
}

impl HostConfig {
    pub fn address(&self) -> &str {
        self.address.as_deref().unwrap_or(&self.name)
    }

    pub fn source(&self, kind: SourceKind) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.kind() == kind)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    Agent(AgentSourceConfig),
    Snmp(SnmpSourceConfig),
    Piggyback(PiggybackSourceConfig),
    Program(ProgramSourceConfig),
}

impl SourceConfig {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceConfig::Agent(_) => SourceKind::Agent,
            SourceConfig::Snmp(_) => SourceKind::Snmp,
            SourceConfig::Piggyback(_) => SourceKind::Piggyback,
            SourceConfig::Program(_) => SourceKind::Program,
        }
    }

    pub fn priority(&self) -> u32 {
        let configured = match self {
            SourceConfig::Agent(c) => c.priority,
            SourceConfig::Snmp(c) => c.priority,
            SourceConfig::Piggyback(c) => c.priority,
            SourceConfig::Program(c) => c.priority,
        };
        configured.unwrap_or_else(|| self.kind().default_priority())
    }

    pub fn timeout_ms(&self) -> u64 {
        match self {
            SourceConfig::Agent(c) => c.timeout_ms,
            SourceConfig::Snmp(c) => c.timeout_ms,
            SourceConfig::Piggyback(c) => c.timeout_ms,
            SourceConfig::Program(c) => c.timeout_ms,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentSourceConfig {
    #[serde(default = "default_agent_port")]
    pub port: u16,
    pub tls: Option<TlsConfig>,
    #[serde(default = "default_agent_timeout_ms")]
    pub timeout_ms: u64,
    pub priority: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TlsConfig {
    /// Name to verify the agent certificate against; defaults to the host address.
    pub server_name: Option<String>,
    /// PEM bundle of trusted CAs; the webpki roots are used when unset.
    pub ca_file: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnmpVersion {
    V1,
    V2c,
    V3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnmpMode {
    Get,
    #[default]
    Walk,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnmpQuery {
    /// Section the rows of this query are delivered in.
    pub section: String,
    pub oid: String,
    #[serde(default)]
    pub mode: SnmpMode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnmpV3Credentials {
    /// noAuthNoPriv, authNoPriv or authPriv.
    pub level: String,
    pub user: String,
    pub auth_protocol: Option<String>,
    pub auth_password: Option<String>,
    pub priv_protocol: Option<String>,
    pub priv_password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnmpSourceConfig {
    #[serde(default = "default_snmp_version")]
    pub version: SnmpVersion,
    #[serde(default = "default_snmp_community")]
    pub community: String,
    pub v3: Option<SnmpV3Credentials>,
    pub port: Option<u16>,
    /// Use snmpbulkwalk for walks (v2c/v3 only).
    #[serde(default)]
    pub bulkwalk: bool,
    /// Directory holding the net-snmp tools; resolved via PATH when unset.
    pub tools_dir: Option<String>,
    pub queries: Vec<SnmpQuery>,
    #[serde(default = "default_snmp_timeout_ms")]
    pub timeout_ms: u64,
    pub priority: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PiggybackSourceConfig {
    #[serde(default = "default_piggyback_timeout_ms")]
    pub timeout_ms: u64,
    pub priority: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProgramSourceConfig {
    /// Shell command line. `$HOSTNAME$`, `$HOSTADDRESS$`, `<HOST>` and `<IP>` are substituted.
    pub command: String,
    #[serde(default = "default_program_timeout_ms")]
    pub timeout_ms: u64,
    pub priority: Option<u32>,
}

const fn default_true() -> bool {
    true
}

const fn default_check_interval_secs() -> u64 {
    60
}

const fn default_cycle_deadline_ms() -> u64 {
    60_000
}

const fn default_max_parallel_fetches() -> usize {
    4
}

const fn default_max_concurrent_hosts() -> usize {
    16
}

const fn default_stats_log_interval_secs() -> u64 {
    300
}

const fn default_agent_max_age_secs() -> u64 {
    30
}

const fn default_program_max_age_secs() -> u64 {
    300
}

const fn default_snmp_max_age_secs() -> u64 {
    60
}

fn default_piggyback_dir() -> String {
    "var/piggyback".into()
}

const fn default_piggyback_max_age_secs() -> u64 {
    3600
}

fn default_server_host() -> String {
    "127.0.0.1".into()
}

const fn default_server_port() -> u16 {
    8090
}

fn default_enabled_plugins() -> Vec<String> {
    BUILTIN_PLUGINS.iter().map(|s| s.to_string()).collect()
}

const fn default_agent_port() -> u16 {
    6556
}

const fn default_agent_timeout_ms() -> u64 {
    5_000
}

const fn default_snmp_version() -> SnmpVersion {
    SnmpVersion::V2c
}

fn default_snmp_community() -> String {
    "public".into()
}

const fn default_snmp_timeout_ms() -> u64 {
    10_000
}

const fn default_piggyback_timeout_ms() -> u64 {
    2_000
}

const fn default_program_timeout_ms() -> u64 {
    60_000
}

impl AppConfig {
    /// `path`, else `$CONFIG_FILE`, else `config.toml`.
    pub fn resolve_path(path: Option<&str>) -> String {
        match path {
            Some(p) => p.to_string(),
            None => std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into()),
        }
    }

    /// Load from `path`, else `$CONFIG_FILE`, else `config.toml`.
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let path = Self::resolve_path(path);
        let s = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("read config {}: {}", path, e))?;
        Self::load_from_str(&s)
    }

    /// Re-read the config file from a running engine.
    pub async fn reload(path: &str) -> anyhow::Result<Self> {
        let s = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("read config {}: {}", path, e))?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn example_toml() -> &'static str {
        include_str!("../config.toml.example")
    }

    pub fn host(&self, name: &str) -> Option<&HostConfig> {
        self.hosts.iter().find(|h| h.name == name)
    }

    /// Cache validity for one source type of one host. Piggyback never hits the fetch cache.
    pub fn max_age_for(&self, host: &HostConfig, kind: SourceKind) -> Duration {
        let defaults = &self.cache.max_age_secs;
        let overrides = &host.max_age_secs;
        let secs = match kind {
            SourceKind::Agent => overrides.agent.unwrap_or(defaults.agent),
            SourceKind::Program => overrides.program.unwrap_or(defaults.program),
            SourceKind::Snmp => overrides.snmp.unwrap_or(defaults.snmp),
            SourceKind::Piggyback => 0,
        };
        Duration::from_secs(secs)
    }

    pub fn cycle_deadline_for(&self, host: &HostConfig) -> Duration {
        Duration::from_millis(
            host.cycle_deadline_ms
                .unwrap_or(self.engine.cycle_deadline_ms),
        )
    }

    pub fn parallel_fetches_for(&self, host: &HostConfig) -> usize {
        host.max_parallel_fetches
            .unwrap_or(self.engine.max_parallel_fetches)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.engine.check_interval_secs > 0,
            "engine.check_interval_secs must be > 0, got {}",
            self.engine.check_interval_secs
        );
        anyhow::ensure!(
            self.engine.cycle_deadline_ms > 0,
            "engine.cycle_deadline_ms must be > 0, got {}",
            self.engine.cycle_deadline_ms
        );
        anyhow::ensure!(
            self.engine.max_parallel_fetches > 0,
            "engine.max_parallel_fetches must be > 0, got {}",
            self.engine.max_parallel_fetches
        );
        anyhow::ensure!(
            self.engine.max_concurrent_hosts > 0,
            "engine.max_concurrent_hosts must be > 0, got {}",
            self.engine.max_concurrent_hosts
        );
        anyhow::ensure!(
            self.engine.stats_log_interval_secs > 0,
            "engine.stats_log_interval_secs must be > 0, got {}",
            self.engine.stats_log_interval_secs
        );
        anyhow::ensure!(!self.cache.dir.is_empty(), "cache.dir must be non-empty");
        anyhow::ensure!(
            !self.piggyback.dir.is_empty(),
            "piggyback.dir must be non-empty"
        );
        anyhow::ensure!(!self.store.path.is_empty(), "store.path must be non-empty");
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        for name in &self.plugins.enabled {
            anyhow::ensure!(
                BUILTIN_PLUGINS.contains(&name.as_str()),
                "plugins.enabled: unknown plugin {:?}",
                name
            );
        }

        let mut names = HashSet::new();
        for host in &self.hosts {
            validate_host_name(&host.name)?;
            anyhow::ensure!(
                names.insert(host.name.as_str()),
                "hosts: duplicate host name {:?}",
                host.name
            );
            validate_host(host)?;
        }
        Ok(())
    }
}

/// Host names end up as file names in the cache and piggyback directories.
pub fn is_valid_host_name(name: &str) -> bool {
    !name.trim().is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\0')
}

fn validate_host_name(name: &str) -> anyhow::Result<()> {
    anyhow::ensure!(
        is_valid_host_name(name),
        "hosts: invalid host name {:?} (must be non-empty, not '.'/'..', without '/')",
        name
    );
    Ok(())
}

fn validate_host(host: &HostConfig) -> anyhow::Result<()> {
    let name = &host.name;
    anyhow::ensure!(
        !host.sources.is_empty(),
        "host {}: at least one source is required",
        name
    );
    if let Some(deadline) = host.cycle_deadline_ms {
        anyhow::ensure!(
            deadline > 0,
            "host {}: cycle_deadline_ms must be > 0",
            name
        );
    }
    if let Some(parallel) = host.max_parallel_fetches {
        anyhow::ensure!(
            parallel > 0,
            "host {}: max_parallel_fetches must be > 0",
            name
        );
    }

    let mut kinds = HashSet::new();
    let mut priorities = HashSet::new();
    for source in &host.sources {
        let kind = source.kind();
        anyhow::ensure!(
            kinds.insert(kind),
            "host {}: more than one {} source",
            name,
            kind
        );
        // Equal priorities would make the merge of a section delivered by both ambiguous.
        anyhow::ensure!(
            priorities.insert(source.priority()),
            "host {}: source {} reuses priority {}; source priorities must be unique",
            name,
            kind,
            source.priority()
        );
        anyhow::ensure!(
            source.timeout_ms() > 0,
            "host {}: source {} timeout_ms must be > 0",
            name,
            kind
        );
        match source {
            SourceConfig::Agent(c) => {
                anyhow::ensure!(c.port > 0, "host {}: agent port must be > 0", name);
            }
            SourceConfig::Program(c) => {
                anyhow::ensure!(
                    !c.command.trim().is_empty(),
                    "host {}: program command must be non-empty",
                    name
                );
            }
            SourceConfig::Snmp(c) => validate_snmp(name, c)?,
            SourceConfig::Piggyback(_) => {}
        }
    }
    Ok(())
}

fn validate_snmp(host: &str, c: &SnmpSourceConfig) -> anyhow::Result<()> {
    anyhow::ensure!(
        !c.queries.is_empty(),
        "host {}: snmp source needs at least one query",
        host
    );
    for q in &c.queries {
        anyhow::ensure!(
            !q.section.trim().is_empty() && !q.oid.trim().is_empty(),
            "host {}: snmp queries need a section and an oid",
            host
        );
    }
    match (c.version, &c.v3) {
        (SnmpVersion::V3, None) => {
            anyhow::bail!("host {}: snmp version v3 requires [v3] credentials", host)
        }
        (SnmpVersion::V3, Some(v3)) => {
            anyhow::ensure!(
                matches!(
                    v3.level.as_str(),
                    "noAuthNoPriv" | "authNoPriv" | "authPriv"
                ),
                "host {}: snmp v3 level must be noAuthNoPriv, authNoPriv or authPriv",
                host
            );
            if v3.level != "noAuthNoPriv" {
                anyhow::ensure!(
                    v3.auth_protocol.is_some() && v3.auth_password.is_some(),
                    "host {}: snmp v3 level {} requires auth_protocol and auth_password",
                    host,
                    v3.level
                );
            }
            if v3.level == "authPriv" {
                anyhow::ensure!(
                    v3.priv_protocol.is_some() && v3.priv_password.is_some(),
                    "host {}: snmp v3 level authPriv requires priv_protocol and priv_password",
                    host
                );
            }
        }
        _ => {
            anyhow::ensure!(
                !c.community.is_empty(),
                "host {}: snmp community must be non-empty",
                host
            );
        }
    }
    anyhow::ensure!(
        !(c.bulkwalk && c.version == SnmpVersion::V1),
        "host {}: snmp bulkwalk requires v2c or v3",
        host
    );
    Ok(())
}
