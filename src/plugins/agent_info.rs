// Agent summary from the `check_mk` section: version and OS of the monitoring agent.

use crate::error::PluginError;
use crate::models::CheckResult;
use crate::registry::{CheckPlugin, SectionRequirement, SectionView};

pub struct AgentInfoPlugin;

const SECTIONS: &[SectionRequirement] = &[SectionRequirement::required("check_mk")];

impl CheckPlugin for AgentInfoPlugin {
    fn name(&self) -> &'static str {
        "agent_info"
    }

    fn sections(&self) -> &'static [SectionRequirement] {
        SECTIONS
    }

    fn check(&self, view: &SectionView<'_>) -> Result<Vec<CheckResult>, PluginError> {
        let mut version = "unknown".to_string();
        let mut os = "unknown".to_string();
        for row in &view.require("check_mk")?.rows {
            let Some((key, rest)) = row.split_first() else {
                continue;
            };
            let value = rest.join(" ");
            match key.trim_end_matches(':').to_ascii_lowercase().as_str() {
                "version" => version = value,
                "agentos" => os = value,
                _ => {}
            }
        }
        Ok(vec![CheckResult::ok(format!(
            "Version: {}, OS: {}",
            version, os
        ))])
    }
}
