// Device identity from the system group (`snmp_info` section: oid, value).

use crate::error::PluginError;
use crate::models::CheckResult;
use crate::registry::{CheckPlugin, SectionRequirement, SectionView};

pub struct SnmpInfoPlugin;

const SECTIONS: &[SectionRequirement] = &[SectionRequirement::required("snmp_info")];

const SYS_DESCR: &str = "1.3.6.1.2.1.1.1.0";
const SYS_CONTACT: &str = "1.3.6.1.2.1.1.4.0";
const SYS_NAME: &str = "1.3.6.1.2.1.1.5.0";
const SYS_LOCATION: &str = "1.3.6.1.2.1.1.6.0";

impl CheckPlugin for SnmpInfoPlugin {
    fn name(&self) -> &'static str {
        "snmp_info"
    }

    fn sections(&self) -> &'static [SectionRequirement] {
        SECTIONS
    }

    fn check(&self, view: &SectionView<'_>) -> Result<Vec<CheckResult>, PluginError> {
        let value = |oid: &str| {
            view.rows("snmp_info")
                .iter()
                .find(|row| row.first().map(|o| o.trim_start_matches('.')) == Some(oid))
                .and_then(|row| row.get(1))
                .filter(|v| !v.is_empty())
                .cloned()
        };
        let mut parts = Vec::new();
        if let Some(name) = value(SYS_NAME) {
            parts.push(name);
        }
        if let Some(descr) = value(SYS_DESCR) {
            parts.push(descr);
        }
        if let Some(contact) = value(SYS_CONTACT) {
            parts.push(format!("Contact: {}", contact));
        }
        if let Some(location) = value(SYS_LOCATION) {
            parts.push(format!("Location: {}", location));
        }
        if parts.is_empty() {
            return Err(PluginError::Failed("no system group values".into()));
        }
        Ok(vec![CheckResult::ok(parts.join(", "))])
    }
}
