// Built-in check plugins

mod agent_info;
mod df;
mod mem;
mod snmp_info;
mod uptime;

pub use agent_info::AgentInfoPlugin;
pub use df::DfPlugin;
pub use mem::MemPlugin;
pub use snmp_info::SnmpInfoPlugin;
pub use uptime::UptimePlugin;

use crate::models::State;
use crate::registry::CheckPlugin;

pub const BUILTIN_PLUGINS: &[&str] = &["agent_info", "df", "mem", "uptime", "snmp_info"];

/// Usage levels (percent) shared by the filesystem and memory checks.
pub const USAGE_WARN_PERCENT: f64 = 80.0;
pub const USAGE_CRIT_PERCENT: f64 = 90.0;

pub fn builtin(name: &str) -> Option<Box<dyn CheckPlugin>> {
    match name {
        "agent_info" => Some(Box::new(AgentInfoPlugin)),
        "df" => Some(Box::new(DfPlugin)),
        "mem" => Some(Box::new(MemPlugin)),
        "uptime" => Some(Box::new(UptimePlugin)),
        "snmp_info" => Some(Box::new(SnmpInfoPlugin)),
        _ => None,
    }
}

/// State for an upper-bound level check (`value >= crit` is CRIT).
pub fn check_levels(value: f64, warn: f64, crit: f64) -> State {
    if value >= crit {
        State::Crit
    } else if value >= warn {
        State::Warn
    } else {
        State::Ok
    }
}

/// Human readable byte count, binary units.
pub fn render_bytes(bytes: f64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_inclusive() {
        assert_eq!(check_levels(79.9, 80.0, 90.0), State::Ok);
        assert_eq!(check_levels(80.0, 80.0, 90.0), State::Warn);
        assert_eq!(check_levels(90.0, 80.0, 90.0), State::Crit);
    }

    #[test]
    fn bytes_rendering() {
        assert_eq!(render_bytes(512.0), "512.0 B");
        assert_eq!(render_bytes(1536.0), "1.5 KiB");
        assert_eq!(render_bytes(3.0 * 1024.0 * 1024.0 * 1024.0), "3.0 GiB");
    }

    #[test]
    fn every_builtin_name_resolves() {
        for name in BUILTIN_PLUGINS {
            assert_eq!(builtin(name).map(|p| p.name()), Some(*name));
        }
        assert!(builtin("nope").is_none());
    }
}
