// SNMP connector: GET/WALK through the net-snmp command line tools.
// Every query runs on its own; a failed query becomes an annotation, not a failed fetch.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use tokio::time::Instant;
use tracing::debug;

use crate::config::{SnmpMode, SnmpQuery, SnmpSourceConfig, SnmpVersion};
use crate::error::FetchErrorKind;
use crate::models::{OidAnnotation, RawFetchResult, Row, Section, SourceKind};
use crate::sections::encode_sections;

/// Field separator of rendered SNMP sections (tab).
const SNMP_SEPARATOR: u8 = 9;

#[derive(Debug)]
struct QueryFailure {
    kind: FetchErrorKind,
    message: String,
}

pub fn tool_name(config: &SnmpSourceConfig, mode: SnmpMode) -> &'static str {
    match mode {
        SnmpMode::Get => "snmpget",
        SnmpMode::Walk if config.bulkwalk => "snmpbulkwalk",
        SnmpMode::Walk => "snmpwalk",
    }
}

fn tool_path(config: &SnmpSourceConfig, mode: SnmpMode) -> PathBuf {
    let name = tool_name(config, mode);
    match &config.tools_dir {
        Some(dir) => PathBuf::from(dir).join(name),
        None => PathBuf::from(name),
    }
}

/// Version/credential and output-format arguments shared by every tool invocation.
pub fn base_args(config: &SnmpSourceConfig, timeout_secs: u64) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    match config.version {
        SnmpVersion::V1 => args.extend(["-v1".into(), "-c".into(), config.community.clone()]),
        SnmpVersion::V2c => args.extend(["-v2c".into(), "-c".into(), config.community.clone()]),
        SnmpVersion::V3 => {
            args.push("-v3".into());
            if let Some(v3) = &config.v3 {
                args.extend(["-l".into(), v3.level.clone(), "-u".into(), v3.user.clone()]);
                if let (Some(proto), Some(pass)) = (&v3.auth_protocol, &v3.auth_password) {
                    args.extend(["-a".into(), proto.clone(), "-A".into(), pass.clone()]);
                }
                if let (Some(proto), Some(pass)) = (&v3.priv_protocol, &v3.priv_password) {
                    args.extend(["-x".into(), proto.clone(), "-X".into(), pass.clone()]);
                }
            }
        }
    }
    args.extend([
        "-m".into(),
        String::new(),
        "-M".into(),
        String::new(),
        "-On".into(),
        "-OQ".into(),
        "-t".into(),
        timeout_secs.max(1).to_string(),
        "-r".into(),
        "0".into(),
    ]);
    args
}

fn target(address: &str, port: Option<u16>) -> String {
    match port {
        Some(p) => format!("{}:{}", address, p),
        None => address.to_string(),
    }
}

/// Parse `-OQ` output (`OID = value`). Continuation lines of multi-line values are joined.
pub fn parse_output(stdout: &str) -> Vec<Row> {
    let mut rows: Vec<Row> = Vec::new();
    for line in stdout.lines() {
        if let Some((oid, value)) = line.split_once(" = ") {
            rows.push(vec![oid.trim().to_string(), unquote(value.trim()).to_string()]);
        } else if let Some(last) = rows.last_mut() {
            let cont = line.trim().trim_end_matches('"');
            if !cont.is_empty() {
                last[1].push(' ');
                last[1].push_str(cont);
            }
        }
    }
    rows
}

fn unquote(value: &str) -> &str {
    let value = value.strip_prefix('"').unwrap_or(value);
    value.strip_suffix('"').unwrap_or(value)
}

fn is_missing_value(value: &str) -> bool {
    value.starts_with("No Such Object") || value.starts_with("No Such Instance") || value.starts_with("No more variables")
}

/// Map a failed tool run (stderr text) to an error kind.
pub fn classify_stderr(stderr: &str) -> FetchErrorKind {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("unknown user name")
        || lower.contains("authentication failure")
        || lower.contains("decryption error")
        || lower.contains("unsupported security level")
        || lower.contains("authorizationerror")
    {
        FetchErrorKind::AuthFailed
    } else {
        FetchErrorKind::Unreachable
    }
}

async fn run_query(
    config: &SnmpSourceConfig,
    address: &str,
    query: &SnmpQuery,
    deadline: Instant,
) -> Result<Vec<Row>, QueryFailure> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        return Err(QueryFailure {
            kind: FetchErrorKind::Timeout,
            message: "source deadline exceeded before query".into(),
        });
    }
    let tool = tool_path(config, query.mode);
    let child = Command::new(&tool)
        .args(base_args(config, remaining.as_secs()))
        .arg(target(address, config.port))
        .arg(&query.oid)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| QueryFailure {
            kind: FetchErrorKind::SpawnFailed,
            message: format!("could not start {}: {}", tool.display(), e),
        })?;
    let output = match tokio::time::timeout_at(deadline, child.wait_with_output()).await {
        Ok(Ok(o)) => o,
        Ok(Err(e)) => {
            return Err(QueryFailure {
                kind: FetchErrorKind::SpawnFailed,
                message: format!("waiting for {} failed: {}", tool.display(), e),
            });
        }
        Err(_) => {
            return Err(QueryFailure {
                kind: FetchErrorKind::Timeout,
                message: format!("no answer for {} within deadline", query.oid),
            });
        }
    };
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(QueryFailure {
            kind: classify_stderr(&stderr),
            message: stderr,
        });
    }
    Ok(parse_output(&stdout))
}

/// Pick the kind reported when every query failed.
fn overall_failure(kinds: &[FetchErrorKind]) -> FetchErrorKind {
    if kinds.contains(&FetchErrorKind::AuthFailed) {
        FetchErrorKind::AuthFailed
    } else if kinds.iter().all(|k| *k == FetchErrorKind::Timeout) {
        FetchErrorKind::Timeout
    } else if kinds.iter().all(|k| *k == FetchErrorKind::SpawnFailed) {
        FetchErrorKind::SpawnFailed
    } else {
        FetchErrorKind::Unreachable
    }
}

/// Queries run sequentially and each is bounded by `deadline`; rows are rendered as
/// `<<<section:sep(9)>>>` sections of `oid<TAB>value` lines.
pub async fn fetch(config: &SnmpSourceConfig, address: &str, deadline: Instant) -> RawFetchResult {
    let mut sections: BTreeMap<String, Section> = BTreeMap::new();
    let mut annotations = Vec::new();
    let mut failures = Vec::new();

    for query in &config.queries {
        match run_query(config, address, query, deadline).await {
            Ok(rows) => {
                let section = sections.entry(query.section.clone()).or_insert_with(|| {
                    Section::new(query.section.clone(), SourceKind::Snmp)
                        .with_separator(Some(SNMP_SEPARATOR))
                });
                for row in rows {
                    if is_missing_value(&row[1]) {
                        annotations.push(OidAnnotation {
                            section: query.section.clone(),
                            oid: row[0].clone(),
                            kind: FetchErrorKind::NotFound,
                            message: row[1].clone(),
                        });
                    } else {
                        section.rows.push(row);
                    }
                }
            }
            Err(f) => {
                debug!(oid = %query.oid, section = %query.section, kind = %f.kind, "SNMP query failed");
                failures.push(f.kind);
                annotations.push(OidAnnotation {
                    section: query.section.clone(),
                    oid: query.oid.clone(),
                    kind: f.kind,
                    message: f.message,
                });
            }
        }
    }

    if sections.is_empty() && !failures.is_empty() {
        let kind = overall_failure(&failures);
        let message = annotations
            .iter()
            .map(|a| format!("{}: {}", a.oid, a.message))
            .collect::<Vec<_>>()
            .join("; ");
        return RawFetchResult::failure(kind, message);
    }
    RawFetchResult::success_with_annotations(encode_sections(sections.values()), annotations)
}
