//! Configuration schema for cache-dance
//!
//! Configuration is stored at `~/.config/cache-dance/config.toml`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Which cache mounts to transfer
    pub cache: CacheConfig,

    /// How the builder is invoked
    pub builder: BuilderConfig,

    /// Transfer behaviour
    pub transfer: TransferConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,

    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            log_format: "text".to_string(),
        }
    }
}

/// Options for one cache mount, keyed by its source directory in the map
///
/// Accepts either a bare target path or a table of mount options, matching
/// the JSON accepted by `--cache-map`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CacheOptions {
    /// Just the builder-visible target path
    Target(String),
    /// Full mount options
    Detailed(MountOptions),
}

/// Detailed cache mount options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MountOptions {
    /// Path of the cache mount inside the build
    pub target: String,

    /// BuildKit cache id (defaults to the target path)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Sharing mode: shared, private or locked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sharing: Option<String>,

    /// Mount the cache read-only
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub readonly: bool,

    /// Owner restored on inject
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,

    /// Group restored on inject
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<String>,
}

/// Cache map configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Source directory -> mount options
    pub map: BTreeMap<String, CacheOptions>,

    /// Single source directory used when `map` is empty
    pub source: String,

    /// Target path paired with `source`
    pub target: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            map: BTreeMap::new(),
            source: "cache".to_string(),
            target: "/var/cache-target".to_string(),
        }
    }
}

/// How the build output is recovered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum OutputStrategy {
    /// `--output type=local`, the builder writes the tree directly
    #[default]
    Local,
    /// Load an image, create a container and stream it out through tar
    Image,
}

/// How the build definition reaches the builder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DefinitionInput {
    /// Written into the job scratch directory and passed with `-f`
    #[default]
    File,
    /// Piped to the builder with `-f -`
    Stdin,
}

/// Builder invocation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// buildx builder name
    pub name: String,

    /// Utility image the copy steps run in
    pub image: String,

    /// Container CLI argv prefix (e.g. ["docker"] or ["sudo", "docker"])
    pub command: Vec<String>,

    /// Archive extraction argv prefix
    pub archive_command: Vec<String>,

    /// Output recovery strategy
    pub output: OutputStrategy,

    /// Build definition delivery
    pub definition_input: DefinitionInput,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            image: "ghcr.io/containerd/busybox:latest".to_string(),
            command: vec!["docker".to_string()],
            archive_command: vec!["tar".to_string()],
            output: OutputStrategy::Local,
            definition_input: DefinitionInput::File,
        }
    }
}

/// One job per mount, or a single job for all of them
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum JobModel {
    /// Independent concurrent jobs, one per cache mount
    #[default]
    PerMount,
    /// One builder invocation covering every mount
    Batch,
}

/// Transfer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Root for job scratch directories
    pub scratch_dir: PathBuf,

    /// Job model
    pub job_model: JobModel,

    /// Skip the extract step entirely
    pub skip_extraction: bool,

    /// Argv prefix for privileged removal; empty disables it
    pub privileged_command: Vec<String>,

    /// Deadline for a whole inject/extract run in seconds (0 = none)
    pub timeout_secs: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            scratch_dir: PathBuf::from("scratch"),
            job_model: JobModel::PerMount,
            skip_extraction: false,
            privileged_command: vec!["sudo".to_string(), "-n".to_string()],
            timeout_secs: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[builder]"));
        assert!(toml.contains("[transfer]"));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.builder.name, "default");
        assert_eq!(config.cache.source, "cache");
        assert_eq!(config.transfer.job_model, JobModel::PerMount);
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [builder]
            output = "image"

            [transfer]
            job_model = "batch"

            [cache.map]
            "/cache/npm" = "/root/.npm"
            "/cache/apt" = { target = "/var/cache/apt", sharing = "locked", uid = "0" }
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.builder.output, OutputStrategy::Image);
        assert_eq!(config.transfer.job_model, JobModel::Batch);
        assert_eq!(config.builder.image, "ghcr.io/containerd/busybox:latest");
        assert_eq!(
            config.cache.map["/cache/npm"],
            CacheOptions::Target("/root/.npm".to_string())
        );
        match &config.cache.map["/cache/apt"] {
            CacheOptions::Detailed(opts) => {
                assert_eq!(opts.sharing.as_deref(), Some("locked"));
                assert_eq!(opts.uid.as_deref(), Some("0"));
                assert!(!opts.readonly);
            }
            other => panic!("expected detailed options, got {:?}", other),
        }
    }

    #[test]
    fn cache_options_from_json() {
        let json = r#"{"a": "/x", "b": {"target": "/y", "id": "y", "readonly": true}}"#;
        let map: BTreeMap<String, CacheOptions> = serde_json::from_str(json).unwrap();
        assert_eq!(map["a"], CacheOptions::Target("/x".to_string()));
        assert_eq!(
            map["b"],
            CacheOptions::Detailed(MountOptions {
                target: "/y".to_string(),
                id: Some("y".to_string()),
                readonly: true,
                ..MountOptions::default()
            })
        );
    }

    #[test]
    fn unknown_mount_option_rejected() {
        let json = r#"{"a": {"target": "/y", "colour": "blue"}}"#;
        assert!(serde_json::from_str::<BTreeMap<String, CacheOptions>>(json).is_err());
    }
}
