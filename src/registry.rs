// Check plugin registry: an immutable table built at startup and shared by Arc.
// Dispatch isolates every plugin: an error or panic is reported for that plugin only.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};

use tracing::{debug, warn};

use crate::error::{PluginError, RegistryError};
use crate::models::{CheckResult, MergedHostData, PluginReport, PluginStatus, Row, Section};
use crate::plugins;

/// A section a plugin reads. Optional sections may be absent from the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionRequirement {
    pub name: &'static str,
    pub optional: bool,
}

impl SectionRequirement {
    pub const fn required(name: &'static str) -> Self {
        Self {
            name,
            optional: false,
        }
    }

    pub const fn optional(name: &'static str) -> Self {
        Self {
            name,
            optional: true,
        }
    }
}

/// The sections handed to one plugin invocation.
pub struct SectionView<'a> {
    host: &'a str,
    sections: BTreeMap<&'static str, &'a Section>,
}

impl<'a> SectionView<'a> {
    pub fn new(host: &'a str, sections: BTreeMap<&'static str, &'a Section>) -> Self {
        Self { host, sections }
    }

    pub fn host(&self) -> &str {
        self.host
    }

    pub fn get(&self, name: &str) -> Option<&'a Section> {
        self.sections.get(name).copied()
    }

    pub fn require(&self, name: &str) -> Result<&'a Section, PluginError> {
        self.get(name)
            .ok_or_else(|| PluginError::MissingSection(name.to_string()))
    }

    /// Rows of a section, empty when the section is absent.
    pub fn rows(&self, name: &str) -> &'a [Row] {
        self.get(name).map(|s| s.rows.as_slice()).unwrap_or(&[])
    }
}

pub trait CheckPlugin: Send + Sync {
    fn name(&self) -> &'static str;

    fn sections(&self) -> &'static [SectionRequirement];

    fn check(&self, view: &SectionView<'_>) -> Result<Vec<CheckResult>, PluginError>;
}

pub struct PluginRegistry {
    plugins: Vec<Box<dyn CheckPlugin>>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}

impl PluginRegistry {
    pub fn new(plugins: Vec<Box<dyn CheckPlugin>>) -> Result<Self, RegistryError> {
        let mut seen = HashSet::new();
        for p in &plugins {
            if !seen.insert(p.name()) {
                return Err(RegistryError::Duplicate(p.name().to_string()));
            }
        }
        Ok(Self { plugins })
    }

    /// Registry of the named built-in plugins, in the given order.
    pub fn from_names(names: &[String]) -> Result<Self, RegistryError> {
        let plugins = names
            .iter()
            .map(|n| plugins::builtin(n).ok_or_else(|| RegistryError::Unknown(n.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(plugins)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Names of all non-optional sections some plugin needs.
    pub fn required_sections(&self) -> BTreeSet<&'static str> {
        self.plugins
            .iter()
            .flat_map(|p| p.sections().iter())
            .filter(|r| !r.optional)
            .map(|r| r.name)
            .collect()
    }

    /// Run every plugin over `data`. Plugins missing a required section are skipped.
    pub fn dispatch(&self, host: &str, data: &MergedHostData) -> Vec<PluginReport> {
        self.plugins
            .iter()
            .map(|p| run_plugin(p.as_ref(), host, data))
            .collect()
    }
}

fn run_plugin(plugin: &dyn CheckPlugin, host: &str, data: &MergedHostData) -> PluginReport {
    let name = plugin.name();
    let missing: Vec<String> = plugin
        .sections()
        .iter()
        .filter(|r| !r.optional && !data.contains(r.name))
        .map(|r| r.name.to_string())
        .collect();
    if !missing.is_empty() {
        debug!(host, plugin = name, missing = ?missing, "Skipping plugin");
        return PluginReport {
            plugin: name.to_string(),
            status: PluginStatus::Skipped,
            results: Vec::new(),
            missing_sections: missing,
            error: None,
        };
    }

    let sections = plugin
        .sections()
        .iter()
        .filter_map(|r| data.get(r.name).map(|s| (r.name, s)))
        .collect();
    let view = SectionView::new(host, sections);
    let outcome = catch_unwind(AssertUnwindSafe(|| plugin.check(&view)))
        .unwrap_or_else(|panic| Err(PluginError::Panicked(panic_message(panic.as_ref()))));

    match outcome {
        Ok(results) => PluginReport {
            plugin: name.to_string(),
            status: PluginStatus::Ran,
            results,
            missing_sections: Vec::new(),
            error: None,
        },
        Err(e) => {
            warn!(host, plugin = name, error = %e, operation = "dispatch", "Plugin failed");
            PluginReport {
                plugin: name.to_string(),
                status: PluginStatus::Failed,
                results: Vec::new(),
                missing_sections: Vec::new(),
                error: Some(e.to_string()),
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
