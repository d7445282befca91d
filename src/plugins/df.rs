// Filesystem usage from the `df` section (`df -PTk` output).

use super::{USAGE_CRIT_PERCENT, USAGE_WARN_PERCENT, check_levels, render_bytes};
use crate::error::PluginError;
use crate::models::{CheckResult, Metric};
use crate::registry::{CheckPlugin, SectionRequirement, SectionView};

pub struct DfPlugin;

const SECTIONS: &[SectionRequirement] = &[SectionRequirement::required("df")];

impl CheckPlugin for DfPlugin {
    fn name(&self) -> &'static str {
        "df"
    }

    fn sections(&self) -> &'static [SectionRequirement] {
        SECTIONS
    }

    fn check(&self, view: &SectionView<'_>) -> Result<Vec<CheckResult>, PluginError> {
        let mut results = Vec::new();
        // Inside a `[df_*_start]` .. `[df_*_end]` sub-block (inode counts, not kB).
        let mut in_sub_block = false;
        for row in view.rows("df") {
            if let Some(marker) = row.first().filter(|f| f.starts_with('[')) {
                in_sub_block = marker.ends_with("_start]");
                continue;
            }
            if in_sub_block {
                continue;
            }
            if row.len() < 7 {
                return Err(PluginError::MalformedRow {
                    section: "df".into(),
                    message: format!("expected 7 fields, got {}: {:?}", row.len(), row),
                });
            }
            let size_kb = parse_kb(&row[2])?;
            let used_kb = parse_kb(&row[3])?;
            if size_kb <= 0.0 {
                continue;
            }
            let mount = row[6..].join(" ");
            let percent = used_kb / size_kb * 100.0;
            let state = check_levels(percent, USAGE_WARN_PERCENT, USAGE_CRIT_PERCENT);
            results.push(
                CheckResult::new(
                    state,
                    format!(
                        "{}: {:.1}% used ({} of {}){}",
                        mount,
                        percent,
                        render_bytes(used_kb * 1024.0),
                        render_bytes(size_kb * 1024.0),
                        state.marker()
                    ),
                )
                .with_metric(
                    Metric::new("fs_used_percent", percent)
                        .with_levels(USAGE_WARN_PERCENT, USAGE_CRIT_PERCENT),
                ),
            );
        }
        Ok(results)
    }
}

fn parse_kb(field: &str) -> Result<f64, PluginError> {
    field.parse::<f64>().map_err(|_| PluginError::MalformedRow {
        section: "df".into(),
        message: format!("not a number: {:?}", field),
    })
}
