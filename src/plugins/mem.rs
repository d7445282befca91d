// RAM usage from the `mem` section (`/proc/meminfo` lines).

use std::collections::HashMap;

use super::{USAGE_CRIT_PERCENT, USAGE_WARN_PERCENT, check_levels, render_bytes};
use crate::error::PluginError;
use crate::models::{CheckResult, Metric};
use crate::registry::{CheckPlugin, SectionRequirement, SectionView};

pub struct MemPlugin;

const SECTIONS: &[SectionRequirement] = &[SectionRequirement::required("mem")];

impl CheckPlugin for MemPlugin {
    fn name(&self) -> &'static str {
        "mem"
    }

    fn sections(&self) -> &'static [SectionRequirement] {
        SECTIONS
    }

    fn check(&self, view: &SectionView<'_>) -> Result<Vec<CheckResult>, PluginError> {
        let info: HashMap<&str, f64> = view
            .rows("mem")
            .iter()
            .filter_map(|row| {
                let key = row.first()?.trim_end_matches(':');
                let value = row.get(1)?.parse::<f64>().ok()?;
                Some((key, value))
            })
            .collect();
        let total_kb = *info.get("MemTotal").ok_or_else(|| PluginError::MalformedRow {
            section: "mem".into(),
            message: "MemTotal missing".into(),
        })?;
        if total_kb <= 0.0 {
            return Err(PluginError::MalformedRow {
                section: "mem".into(),
                message: "MemTotal is zero".into(),
            });
        }
        // Older kernels lack MemAvailable.
        let available_kb = match info.get("MemAvailable") {
            Some(v) => *v,
            None => ["MemFree", "Buffers", "Cached"]
                .iter()
                .filter_map(|k| info.get(k))
                .sum(),
        };
        let used_kb = (total_kb - available_kb).max(0.0);
        let percent = used_kb / total_kb * 100.0;
        let state = check_levels(percent, USAGE_WARN_PERCENT, USAGE_CRIT_PERCENT);
        Ok(vec![
            CheckResult::new(
                state,
                format!(
                    "RAM: {:.1}% used ({} of {}){}",
                    percent,
                    render_bytes(used_kb * 1024.0),
                    render_bytes(total_kb * 1024.0),
                    state.marker()
                ),
            )
            .with_metric(Metric::new("mem_used_percent", percent).with_levels(
                USAGE_WARN_PERCENT,
                USAGE_CRIT_PERCENT,
            )),
        ])
    }
}
