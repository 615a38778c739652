//! CLI argument definitions using clap derive

use crate::config::{parse_cache_map, Config, DefinitionInput, JobModel, OutputStrategy};
use crate::error::DanceResult;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// cache-dance - persist BuildKit cache mounts across CI runs
///
/// Injects host directories into BuildKit cache mounts before a build and
/// extracts them back out afterwards.
#[derive(Parser, Debug)]
#[command(name = "cache-dance")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "DANCE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Copy host cache directories into BuildKit cache mounts
    Inject(TransferArgs),

    /// Copy BuildKit cache mounts out to host cache directories
    Extract(ExtractArgs),

    /// Show configuration
    Config(ConfigArgs),
}

/// Overrides shared by inject and extract
#[derive(Args, Debug, Default)]
pub struct TransferArgs {
    /// JSON object mapping host directories to cache mount targets or options
    #[arg(long, env = "DANCE_CACHE_MAP")]
    pub cache_map: Option<String>,

    /// Host directory used when no cache map is given
    #[arg(long, env = "DANCE_CACHE_SOURCE")]
    pub cache_source: Option<String>,

    /// Cache mount target used when no cache map is given
    #[arg(long, env = "DANCE_CACHE_TARGET")]
    pub cache_target: Option<String>,

    /// Root directory for job scratch space
    #[arg(long, env = "DANCE_SCRATCH_DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// Image the copy steps run in
    #[arg(long, env = "DANCE_UTILITY_IMAGE")]
    pub utility_image: Option<String>,

    /// buildx builder to use
    #[arg(long, env = "DANCE_BUILDER")]
    pub builder: Option<String>,

    /// How build output is recovered
    #[arg(long, value_enum)]
    pub output: Option<OutputStrategy>,

    /// One job per mount, or one job for all mounts
    #[arg(long, value_enum)]
    pub job_model: Option<JobModel>,

    /// How the build definition reaches the builder
    #[arg(long, value_enum)]
    pub definition_input: Option<DefinitionInput>,

    /// Abandon the run after this many seconds (0 = never)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Never escalate when removing extracted destinations
    #[arg(long)]
    pub no_sudo: bool,
}

impl TransferArgs {
    /// Layer these flags over the loaded configuration
    pub fn apply(&self, config: &mut Config) -> DanceResult<()> {
        if let Some(json) = &self.cache_map {
            let map = parse_cache_map(json)?;
            if !map.is_empty() {
                config.cache.map = map;
            }
        }
        if let Some(source) = &self.cache_source {
            config.cache.source = source.clone();
        }
        if let Some(target) = &self.cache_target {
            config.cache.target = target.clone();
        }
        if let Some(dir) = &self.scratch_dir {
            config.transfer.scratch_dir = dir.clone();
        }
        if let Some(image) = &self.utility_image {
            config.builder.image = image.clone();
        }
        if let Some(builder) = &self.builder {
            config.builder.name = builder.clone();
        }
        if let Some(output) = self.output {
            config.builder.output = output;
        }
        if let Some(model) = self.job_model {
            config.transfer.job_model = model;
        }
        if let Some(input) = self.definition_input {
            config.builder.definition_input = input;
        }
        if let Some(secs) = self.timeout {
            config.transfer.timeout_secs = secs;
        }
        if self.no_sudo {
            config.transfer.privileged_command.clear();
        }
        Ok(())
    }
}

/// Arguments for the extract command
#[derive(Args, Debug, Default)]
pub struct ExtractArgs {
    #[command(flatten)]
    pub transfer: TransferArgs,

    /// Do nothing, e.g. when the cache was restored from an exact key match
    #[arg(long, env = "DANCE_SKIP_EXTRACTION")]
    pub skip_extraction: bool,
}

impl ExtractArgs {
    pub fn apply(&self, config: &mut Config) -> DanceResult<()> {
        self.transfer.apply(config)?;
        if self.skip_extraction {
            config.transfer.skip_extraction = true;
        }
        Ok(())
    }
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,
}
