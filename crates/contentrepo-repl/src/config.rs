//! Replication module configuration.
//!
//! Loaded once at startup from a TOML or JSON file. Filter parameters are kept
//! in their raw string form and parsed by each filter's `init`.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use contentrepo_journal::{ReaderConfig, MIN_BUFFER_SIZE};
use serde::{Deserialize, Serialize};

use crate::filter::FilterKind;

/// Where and how to read the journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalSettings {
    /// Journal file.
    pub path: PathBuf,
    /// Logical journal identity shared by all readers.
    pub journal_id: String,
    /// Producer whose records are replicated.
    pub producer_id: String,
    /// Workspace to replicate; all workspaces when absent.
    pub workspace: Option<String>,
    /// Events per refill.
    pub min_buffer_size: usize,
}

impl Default for JournalSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/contentrepo/journal.log"),
            journal_id: "default".to_string(),
            producer_id: "JR".to_string(),
            workspace: Some("default".to_string()),
            min_buffer_size: MIN_BUFFER_SIZE,
        }
    }
}

impl JournalSettings {
    /// Reader configuration for these settings.
    pub fn reader_config(&self) -> ReaderConfig {
        let config = ReaderConfig::new(self.producer_id.clone())
            .with_min_buffer_size(self.min_buffer_size);
        match &self.workspace {
            Some(workspace) => config.with_workspace(workspace.clone()),
            None => config,
        }
    }
}

/// A raw filter parameter. Lists and booleans are accepted for convenience and
/// normalized to the comma-separated string form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// A flag, e.g. `removeExisting = false`.
    Flag(bool),
    /// A plain string.
    Text(String),
    /// A list, joined with commas.
    List(Vec<String>),
}

impl ParamValue {
    /// The raw string form.
    pub fn to_raw(&self) -> String {
        match self {
            ParamValue::Flag(flag) => flag.to_string(),
            ParamValue::Text(text) => text.clone(),
            ParamValue::List(items) => items.join(","),
        }
    }
}

/// One configured filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Which policy.
    pub kind: FilterKind,
    /// Raw parameters (`replicate`, `exclude`, `removeExisting`).
    #[serde(flatten)]
    pub params: BTreeMap<String, ParamValue>,
}

impl FilterSpec {
    /// A spec without parameters.
    pub fn new(kind: FilterKind) -> Self {
        Self {
            kind,
            params: BTreeMap::new(),
        }
    }

    /// Add a string parameter.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), ParamValue::Text(value.into()));
        self
    }

    /// Parameters in their raw string form.
    pub fn raw_params(&self) -> BTreeMap<String, String> {
        self.params
            .iter()
            .map(|(name, value)| (name.clone(), value.to_raw()))
            .collect()
    }
}

/// Top-level configuration of the replication module.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplConfig {
    /// Journal access.
    pub journal: JournalSettings,
    /// JSON file of node snapshots of the primary repository.
    pub nodes_path: PathBuf,
    /// Pause between replication passes.
    pub poll_interval_ms: u64,
    /// Maximum events handled per pass.
    pub max_events_per_pass: usize,
    /// Filters, evaluated in order.
    pub filters: Vec<FilterSpec>,
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            journal: JournalSettings::default(),
            nodes_path: PathBuf::from("/var/lib/contentrepo/nodes.json"),
            poll_interval_ms: 1000,
            max_events_per_pass: 10_000,
            filters: Vec::new(),
        }
    }
}

impl ReplConfig {
    /// Load from a `.toml` or `.json` file and validate.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: ReplConfig = match path.extension().and_then(OsStr::to_str) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => toml::from_str(&raw)
                .with_context(|| format!("parsing {} as TOML", path.display()))?,
            Some(ext) if ext.eq_ignore_ascii_case("json") => serde_json::from_str(&raw)
                .with_context(|| format!("parsing {} as JSON", path.display()))?,
            other => bail!(
                "{}: unsupported config format {:?}, expected .toml or .json",
                path.display(),
                other.unwrap_or_default()
            ),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would stall the replication loop.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be positive");
        }
        if self.max_events_per_pass == 0 {
            bail!("max_events_per_pass must be positive");
        }
        if self.journal.min_buffer_size == 0 {
            bail!("journal.min_buffer_size must be positive");
        }
        Ok(())
    }
}
