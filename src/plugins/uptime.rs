// System uptime from the `uptime` section (`/proc/uptime`: seconds and idle seconds).

use crate::error::PluginError;
use crate::models::{CheckResult, Metric};
use crate::registry::{CheckPlugin, SectionRequirement, SectionView};

pub struct UptimePlugin;

const SECTIONS: &[SectionRequirement] = &[SectionRequirement::required("uptime")];

impl CheckPlugin for UptimePlugin {
    fn name(&self) -> &'static str {
        "uptime"
    }

    fn sections(&self) -> &'static [SectionRequirement] {
        SECTIONS
    }

    fn check(&self, view: &SectionView<'_>) -> Result<Vec<CheckResult>, PluginError> {
        let field = view
            .rows("uptime")
            .first()
            .and_then(|row| row.first())
            .ok_or_else(|| PluginError::MalformedRow {
                section: "uptime".into(),
                message: "no uptime value".into(),
            })?;
        let seconds = field.parse::<f64>().map_err(|_| PluginError::MalformedRow {
            section: "uptime".into(),
            message: format!("not a number: {:?}", field),
        })?;
        Ok(vec![
            CheckResult::ok(format!("Up {}", render_duration(seconds as u64)))
                .with_metric(Metric::new("uptime", seconds)),
        ])
    }
}

fn render_duration(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let minutes = (secs % 3600) / 60;
    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m {}s", minutes, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::render_duration;

    #[test]
    fn durations() {
        assert_eq!(render_duration(59), "0m 59s");
        assert_eq!(render_duration(3 * 3600 + 120), "3h 2m");
        assert_eq!(render_duration(2 * 86_400 + 3600), "2d 1h 0m");
    }
}
