//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.tourstat.toml` files.

use crate::pipeline::PipelineSettings;
use crate::report::RenderSettings;
use crate::sources::AnalyticsSettings;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = ".tourstat.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Threshold and time budgets of a run.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Where subject, consent and interaction data is read from.
    #[serde(default)]
    pub store: StoreConfig,

    /// Upstream analytics integration.
    #[serde(default)]
    pub analytics: AnalyticsConfig,

    /// Rendering and artifact storage.
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Also write the outcome JSON to this file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Minimum aggregated records before anything is published.
    #[serde(default = "default_threshold")]
    pub threshold: u64,

    /// Consent read budget in seconds.
    #[serde(default = "default_store_timeout")]
    pub store_timeout_seconds: u64,

    /// Per-adapter budget in seconds.
    #[serde(default = "default_adapter_timeout")]
    pub adapter_timeout_seconds: u64,

    /// Whole-run budget in seconds.
    #[serde(default = "default_run_timeout")]
    pub run_timeout_seconds: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            store_timeout_seconds: default_store_timeout(),
            adapter_timeout_seconds: default_adapter_timeout(),
            run_timeout_seconds: default_run_timeout(),
        }
    }
}

fn default_threshold() -> u64 {
    crate::analysis::MIN_DISCLOSURE_THRESHOLD
}

fn default_store_timeout() -> u64 {
    30
}

fn default_adapter_timeout() -> u64 {
    60
}

fn default_run_timeout() -> u64 {
    300
}

/// Data store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// JSON export on disk
    #[default]
    Snapshot,
    /// PostgREST-style HTTP API
    Rest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub kind: StoreKind,

    /// Snapshot file for the `snapshot` backend.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,

    /// REST endpoint for the `rest` backend.
    #[serde(default = "default_store_url")]
    pub base_url: String,

    /// Service key; usually supplied through `TOURSTAT_STORE_KEY`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_store_timeout")]
    pub timeout_seconds: u64,

    /// PATCH request status transitions back to the store.
    #[serde(default)]
    pub report_status: bool,

    /// Table holding report requests.
    #[serde(default = "default_status_table")]
    pub status_table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            snapshot_path: default_snapshot_path(),
            base_url: default_store_url(),
            api_key: None,
            timeout_seconds: default_store_timeout(),
            report_status: false,
            status_table: default_status_table(),
        }
    }
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("snapshot.json")
}

fn default_store_url() -> String {
    "http://localhost:54321/rest/v1".to_string()
}

fn default_status_table() -> String {
    "data_requests".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// The integration is off unless explicitly enabled.
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_analytics_url")]
    pub base_url: String,

    /// Usually supplied through `TOURSTAT_ANALYTICS_KEY`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_analytics_timeout")]
    pub timeout_seconds: u64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_analytics_url(),
            api_key: None,
            timeout_seconds: default_analytics_timeout(),
        }
    }
}

fn default_analytics_url() -> String {
    "http://localhost:8080/v1".to_string()
}

fn default_analytics_timeout() -> u64 {
    30
}

/// Artifact storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactBackend {
    #[default]
    Local,
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    #[serde(default)]
    pub backend: ArtifactBackend,

    /// Root directory of the `local` backend.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Storage endpoint of the `remote` backend.
    #[serde(default = "default_blob_url")]
    pub base_url: String,

    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Usually supplied through `TOURSTAT_BLOB_KEY`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_upload_timeout")]
    pub timeout_seconds: u64,

    /// Rows per ranked table in the narrative.
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Narrative page length in lines.
    #[serde(default = "default_lines_per_page")]
    pub lines_per_page: usize,

    /// Running footer text of the narrative.
    #[serde(default = "default_provenance")]
    pub provenance: String,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            backend: ArtifactBackend::default(),
            output_dir: default_output_dir(),
            base_url: default_blob_url(),
            bucket: default_bucket(),
            api_key: None,
            timeout_seconds: default_upload_timeout(),
            top_n: default_top_n(),
            lines_per_page: default_lines_per_page(),
            provenance: default_provenance(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("reports")
}

fn default_blob_url() -> String {
    "http://localhost:54321/storage/v1".to_string()
}

fn default_bucket() -> String {
    "reports".to_string()
}

fn default_upload_timeout() -> u64 {
    60
}

fn default_top_n() -> usize {
    10
}

fn default_lines_per_page() -> usize {
    60
}

fn default_provenance() -> String {
    RenderSettings::default().provenance
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, and only
    /// when they were given.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(threshold) = args.threshold {
            self.pipeline.threshold = threshold;
        }
        if let Some(timeout) = args.timeout {
            self.pipeline.run_timeout_seconds = timeout;
        }

        // A snapshot on the command line always selects the snapshot backend
        if let Some(ref snapshot) = args.snapshot {
            self.store.kind = StoreKind::Snapshot;
            self.store.snapshot_path = snapshot.clone();
        }
        if let Some(ref output_dir) = args.output_dir {
            self.artifacts.backend = ArtifactBackend::Local;
            self.artifacts.output_dir = output_dir.clone();
        }
        if let Some(ref output) = args.output {
            self.general.output = Some(output.clone());
        }

        // Secrets from the environment win over the file
        if args.store_key.is_some() {
            self.store.api_key = args.store_key.clone();
        }
        if args.analytics_key.is_some() {
            self.analytics.api_key = args.analytics_key.clone();
        }
        if args.blob_key.is_some() {
            self.artifacts.api_key = args.blob_key.clone();
        }

        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Reject settings that would disable the disclosure floor or a time budget.
    ///
    /// Runs after [`Config::merge_with_args`], so file values and command-line
    /// overrides are checked alike.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.threshold == 0 {
            bail!("pipeline.threshold must be at least 1");
        }

        let timeouts = [
            ("pipeline.store_timeout_seconds", self.pipeline.store_timeout_seconds),
            ("pipeline.adapter_timeout_seconds", self.pipeline.adapter_timeout_seconds),
            ("pipeline.run_timeout_seconds", self.pipeline.run_timeout_seconds),
            ("store.timeout_seconds", self.store.timeout_seconds),
            ("analytics.timeout_seconds", self.analytics.timeout_seconds),
            ("artifacts.timeout_seconds", self.artifacts.timeout_seconds),
        ];
        if let Some((field, _)) = timeouts.iter().find(|(_, seconds)| *seconds == 0) {
            bail!("{} must be at least 1 second", field);
        }

        if self.artifacts.top_n == 0 {
            bail!("artifacts.top_n must be at least 1");
        }
        if self.artifacts.lines_per_page == 0 {
            bail!("artifacts.lines_per_page must be at least 1");
        }

        Ok(())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            threshold: self.pipeline.threshold,
            store_timeout: Duration::from_secs(self.pipeline.store_timeout_seconds),
            adapter_timeout: Duration::from_secs(self.pipeline.adapter_timeout_seconds),
            run_timeout: Duration::from_secs(self.pipeline.run_timeout_seconds),
            render: RenderSettings {
                top_n: self.artifacts.top_n,
                lines_per_page: self.artifacts.lines_per_page,
                threshold: self.pipeline.threshold,
                provenance: self.artifacts.provenance.clone(),
            },
        }
    }

    pub fn analytics_settings(&self) -> AnalyticsSettings {
        AnalyticsSettings {
            enabled: self.analytics.enabled,
            base_url: self.analytics.base_url.clone(),
            api_key: self.analytics.api_key.clone(),
            timeout_seconds: self.analytics.timeout_seconds,
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
