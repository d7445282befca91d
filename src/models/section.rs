// Sections: named row tables parsed from agent-format payloads

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use wincode::{SchemaRead, SchemaWrite};

use super::SourceKind;

pub type Row = Vec<String>;

/// Cache metadata carried by `cached(AT,INTERVAL)` / `persist(UNTIL)` section options.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SchemaRead, SchemaWrite,
)]
#[serde(rename_all = "camelCase")]
pub struct CacheInfo {
    /// Unix seconds when the data was produced.
    pub cached_at: i64,
    /// Validity in seconds from `cached_at`.
    pub interval: i64,
}

impl CacheInfo {
    pub fn valid_until(&self) -> i64 {
        self.cached_at + self.interval
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub name: String,
    pub rows: Vec<Row>,
    pub source: SourceKind,
    /// Field separator as a byte code (`sep(N)`); `None` splits on whitespace runs.
    pub separator: Option<u8>,
    /// True when the rows did not come from a fetch of this cycle.
    pub cached: bool,
    pub cache_info: Option<CacheInfo>,
}

impl Section {
    pub fn new(name: impl Into<String>, source: SourceKind) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
            source,
            separator: None,
            cached: false,
            cache_info: None,
        }
    }

    pub fn with_separator(mut self, separator: Option<u8>) -> Self {
        self.separator = separator;
        self
    }

    pub fn with_rows(mut self, rows: Vec<Row>) -> Self {
        self.rows = rows;
        self
    }

    pub fn mark_cached(mut self) -> Self {
        self.cached = true;
        self
    }

    pub fn separator_char(&self) -> Option<char> {
        self.separator.map(char::from)
    }
}

/// The sections chosen for one host in one cycle: exactly one section per name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MergedHostData {
    sections: BTreeMap<String, Section>,
}

impl MergedHostData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a section, replacing (and returning) any section of the same name.
    pub fn insert(&mut self, section: Section) -> Option<Section> {
        self.sections.insert(section.name.clone(), section)
    }

    pub fn get(&self, name: &str) -> Option<&Section> {
        self.sections.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Section> {
        self.sections.values()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Sections ordered by name (blob layout of the result store).
    pub fn into_sections(self) -> Vec<Section> {
        self.sections.into_values().collect()
    }

    pub fn from_sections(sections: Vec<Section>) -> Self {
        let mut data = Self::new();
        for s in sections {
            data.insert(s);
        }
        data
    }
}
