// Config loading, defaults and validation

use checkengine::config::{AppConfig, SnmpMode, SnmpVersion, SourceConfig, is_valid_host_name};
use checkengine::models::SourceKind;
use std::time::Duration;

const VALID_TOML: &str = r#"
[cache]
dir = "/tmp/checkengine-cache"

[store]
path = "/tmp/checkengine.db"

[[hosts]]
name = "web01"
address = "192.0.2.10"

[[hosts.sources]]
type = "agent"

[[hosts.sources]]
type = "piggyback"
"#;

#[test]
fn test_example_config_loads() {
    let config = AppConfig::load_from_str(AppConfig::example_toml()).unwrap();
    assert_eq!(config.hosts.len(), 3);
    assert_eq!(config.server.port, 8090);

    let switch = config.host("switch01").unwrap();
    let Some(SourceConfig::Snmp(snmp)) = switch.source(SourceKind::Snmp) else {
        panic!("switch01 should have an snmp source");
    };
    assert_eq!(snmp.version, SnmpVersion::V2c);
    assert!(snmp.bulkwalk);
    assert_eq!(snmp.queries[0].section, "snmp_info");
    assert_eq!(snmp.queries[0].mode, SnmpMode::Walk);
    assert_eq!(
        config.max_age_for(switch, SourceKind::Snmp),
        Duration::from_secs(120)
    );

    let cloud = config.host("cloud01").unwrap();
    assert_eq!(cloud.address(), "cloud01");
}

#[test]
fn test_defaults() {
    let config = AppConfig::load_from_str(VALID_TOML).unwrap();
    assert_eq!(config.engine.check_interval_secs, 60);
    assert_eq!(config.engine.cycle_deadline_ms, 60_000);
    assert_eq!(config.engine.max_parallel_fetches, 4);
    assert!(config.cache.enabled);
    assert_eq!(config.piggyback.max_age_secs, 3600);
    assert_eq!(config.plugins.enabled.len(), 5);

    let host = config.host("web01").unwrap();
    let agent = host.source(SourceKind::Agent).unwrap();
    assert_eq!(agent.priority(), 10);
    assert_eq!(agent.timeout_ms(), 5000);
    let SourceConfig::Agent(a) = agent else {
        panic!("expected agent source");
    };
    assert_eq!(a.port, 6556);
    assert!(a.tls.is_none());

    assert_eq!(host.source(SourceKind::Piggyback).unwrap().priority(), 40);
    assert_eq!(config.max_age_for(host, SourceKind::Agent), Duration::from_secs(30));
    assert_eq!(config.max_age_for(host, SourceKind::Piggyback), Duration::ZERO);
    assert_eq!(config.cycle_deadline_for(host), Duration::from_secs(60));
    assert_eq!(config.parallel_fetches_for(host), 4);
}

#[test]
fn test_host_overrides() {
    let toml = VALID_TOML.replace(
        "address = \"192.0.2.10\"",
        "address = \"192.0.2.10\"\ncycle_deadline_ms = 1500\nmax_parallel_fetches = 1\n\n[hosts.max_age_secs]\nagent = 0",
    );
    let config = AppConfig::load_from_str(&toml).unwrap();
    let host = config.host("web01").unwrap();
    assert_eq!(config.cycle_deadline_for(host), Duration::from_millis(1500));
    assert_eq!(config.parallel_fetches_for(host), 1);
    assert_eq!(config.max_age_for(host, SourceKind::Agent), Duration::ZERO);
    assert_eq!(config.max_age_for(host, SourceKind::Program), Duration::from_secs(300));
}

#[test]
fn test_invalid_check_interval_rejected() {
    let toml = format!("[engine]\ncheck_interval_secs = 0\n{}", VALID_TOML);
    let err = AppConfig::load_from_str(&toml).unwrap_err();
    assert!(err.to_string().contains("engine.check_interval_secs"));
}

#[test]
fn test_empty_cache_dir_rejected() {
    let toml = VALID_TOML.replace("dir = \"/tmp/checkengine-cache\"", "dir = \"\"");
    let err = AppConfig::load_from_str(&toml).unwrap_err();
    assert!(err.to_string().contains("cache.dir"));
}

#[test]
fn test_empty_store_path_rejected() {
    let toml = VALID_TOML.replace("path = \"/tmp/checkengine.db\"", "path = \"\"");
    let err = AppConfig::load_from_str(&toml).unwrap_err();
    assert!(err.to_string().contains("store.path"));
}

#[test]
fn test_unknown_plugin_rejected() {
    let toml = format!("[plugins]\nenabled = [\"df\", \"cpu\"]\n{}", VALID_TOML);
    let err = AppConfig::load_from_str(&toml).unwrap_err();
    assert!(err.to_string().contains("unknown plugin"));
}

#[test]
fn test_duplicate_host_rejected() {
    let toml = format!(
        "{}\n[[hosts]]\nname = \"web01\"\n\n[[hosts.sources]]\ntype = \"agent\"\n",
        VALID_TOML
    );
    let err = AppConfig::load_from_str(&toml).unwrap_err();
    assert!(err.to_string().contains("duplicate host name"));
}

#[test]
fn test_invalid_host_name_rejected() {
    let toml = VALID_TOML.replace("name = \"web01\"", "name = \"../etc\"");
    let err = AppConfig::load_from_str(&toml).unwrap_err();
    assert!(err.to_string().contains("invalid host name"));
}

#[test]
fn test_host_without_sources_rejected() {
    let toml = r#"
[cache]
dir = "/tmp/c"

[store]
path = "/tmp/s.db"

[[hosts]]
name = "empty"
sources = []
"#;
    let err = AppConfig::load_from_str(toml).unwrap_err();
    assert!(err.to_string().contains("at least one source"));
}

#[test]
fn test_two_sources_of_same_kind_rejected() {
    let toml = format!(
        "{}\n[[hosts.sources]]\ntype = \"agent\"\nport = 6557\npriority = 5\n",
        VALID_TOML
    );
    let err = AppConfig::load_from_str(&toml).unwrap_err();
    assert!(err.to_string().contains("more than one agent source"));
}

#[test]
fn test_equal_priorities_rejected() {
    let toml = VALID_TOML.replace(
        "type = \"piggyback\"",
        "type = \"piggyback\"\npriority = 10",
    );
    let err = AppConfig::load_from_str(&toml).unwrap_err();
    assert!(err.to_string().contains("reuses priority"));
}

#[test]
fn test_zero_timeout_rejected() {
    let toml = VALID_TOML.replace("type = \"agent\"", "type = \"agent\"\ntimeout_ms = 0");
    let err = AppConfig::load_from_str(&toml).unwrap_err();
    assert!(err.to_string().contains("timeout_ms must be > 0"));
}

#[test]
fn test_empty_program_command_rejected() {
    let toml = VALID_TOML.replace("type = \"agent\"", "type = \"program\"\ncommand = \"  \"");
    let err = AppConfig::load_from_str(&toml).unwrap_err();
    assert!(err.to_string().contains("program command must be non-empty"));
}

#[test]
fn test_snmp_v3_requires_credentials() {
    let toml = VALID_TOML.replace(
        "type = \"agent\"",
        "type = \"snmp\"\nversion = \"v3\"\nqueries = [{ section = \"snmp_info\", oid = \".1.3.6.1.2.1.1\" }]",
    );
    let err = AppConfig::load_from_str(&toml).unwrap_err();
    assert!(err.to_string().contains("requires [v3] credentials"));
}

#[test]
fn test_snmp_bulkwalk_v1_rejected() {
    let toml = VALID_TOML.replace(
        "type = \"agent\"",
        "type = \"snmp\"\nversion = \"v1\"\nbulkwalk = true\nqueries = [{ section = \"snmp_info\", oid = \".1.3.6.1.2.1.1\" }]",
    );
    let err = AppConfig::load_from_str(&toml).unwrap_err();
    assert!(err.to_string().contains("bulkwalk requires v2c or v3"));
}

#[test]
fn test_snmp_without_queries_rejected() {
    let toml = VALID_TOML.replace("type = \"agent\"", "type = \"snmp\"\nqueries = []");
    let err = AppConfig::load_from_str(&toml).unwrap_err();
    assert!(err.to_string().contains("at least one query"));
}

#[test]
fn test_unknown_source_type_rejected() {
    let toml = VALID_TOML.replace("type = \"agent\"", "type = \"ipmi\"");
    assert!(AppConfig::load_from_str(&toml).is_err());
}

#[test]
fn test_load_from_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, VALID_TOML).unwrap();
    let config = AppConfig::load(Some(path.to_str().unwrap())).unwrap();
    assert_eq!(config.hosts[0].name, "web01");

    let err = AppConfig::load(Some(dir.path().join("missing.toml").to_str().unwrap())).unwrap_err();
    assert!(err.to_string().contains("read config"));
}

#[test]
fn test_host_name_rules() {
    assert!(is_valid_host_name("web01.example.com"));
    assert!(is_valid_host_name("vm 1"));
    assert!(!is_valid_host_name(""));
    assert!(!is_valid_host_name("  "));
    assert!(!is_valid_host_name(".."));
    assert!(!is_valid_host_name("a/b"));
}
