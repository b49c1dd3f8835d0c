//! Shared argument groups and their conversion into pipeline configuration.

use clap::{Args, ValueEnum};
use eyre::{Context, Result};
use hf_hub::api::sync::Api;
use parallax_infer::graph::{ModelRepo, SourceModel};
use parallax_infer::pipeline::{PipelineConfig, RunnerKind};
use parallax_infer::runner::{DeviceRegistry, ExecutionTarget};
use std::path::{Path, PathBuf};

/// File names tried when resolving a model from a hub repository.
const MODEL_FILES: &[&str] = &["model.json", "source.json"];

/// Execution target selection.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum TargetArg {
    Cpu,
    Accelerator,
    #[default]
    Auto,
}

impl From<TargetArg> for ExecutionTarget {
    fn from(arg: TargetArg) -> Self {
        match arg {
            TargetArg::Cpu => ExecutionTarget::Cpu,
            TargetArg::Accelerator => ExecutionTarget::Accelerator,
            TargetArg::Auto => ExecutionTarget::Auto,
        }
    }
}

/// Runner strategy selection.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum RunnerArg {
    Native,
    #[default]
    Optimized,
}

impl From<RunnerArg> for RunnerKind {
    fn from(arg: RunnerArg) -> Self {
        match arg {
            RunnerArg::Native => RunnerKind::Native,
            RunnerArg::Optimized => RunnerKind::Optimized,
        }
    }
}

/// Runner, target, and cache settings shared by every inference command.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Runner strategy
    #[arg(long, value_enum, default_value_t = RunnerArg::Optimized)]
    pub runner: RunnerArg,

    /// Execution target for the optimized runner
    #[arg(long, value_enum, default_value_t = TargetArg::Auto)]
    pub target: TargetArg,

    /// Conversion cache directory (default: system cache dir)
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
}

impl RunArgs {
    pub fn pipeline_config(&self) -> PipelineConfig {
        let cache_dir = self
            .cache_dir
            .clone()
            .unwrap_or_else(default_cache_dir);

        PipelineConfig {
            runner: self.runner.into(),
            target: self.target.into(),
            cache_dir,
            registry: host_registry(),
        }
    }
}

/// Model selection plus the shared run settings.
#[derive(Debug, Args)]
pub struct ModelArgs {
    /// Model source: local JSON file or hub repo id (`owner/name`)
    #[arg(short, long)]
    pub model: String,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Conversion cache under the platform cache directory.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("parallax")
}

/// Host registry: the accelerator target is registered when the machine has
/// more than one hardware thread to parallelize across.
pub fn host_registry() -> DeviceRegistry {
    let threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);

    let registry = DeviceRegistry::host();
    if threads > 1 {
        registry.with_accelerator()
    } else {
        registry
    }
}

/// Load a source model from a local JSON file or a hub repository id.
///
/// An existing path wins; anything else is treated as a `owner/name` repo id
/// and resolved through the hub API.
pub fn load_model(source: &str) -> Result<SourceModel> {
    if Path::new(source).exists() {
        return SourceModel::from_file(source)
            .wrap_err_with(|| format!("failed to load model from {source}"));
    }

    tracing::info!(repo = source, "resolving model from hub");
    let api = Api::new()?;
    let repo = ModelRepo::Api(api.model(source.to_string()));

    SourceModel::from_repo(&repo, MODEL_FILES)
        .wrap_err_with(|| format!("failed to resolve model from repo {source}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_args_map_to_execution_targets() {
        assert_eq!(ExecutionTarget::from(TargetArg::Cpu), ExecutionTarget::Cpu);
        assert_eq!(
            ExecutionTarget::from(TargetArg::Accelerator),
            ExecutionTarget::Accelerator
        );
        assert_eq!(ExecutionTarget::from(TargetArg::Auto), ExecutionTarget::Auto);
    }

    #[test]
    fn run_args_default_to_optimized_auto() {
        let config = RunArgs {
            runner: RunnerArg::default(),
            target: TargetArg::default(),
            cache_dir: None,
        }
        .pipeline_config();

        assert_eq!(config.runner, RunnerKind::Optimized);
        assert_eq!(config.target, ExecutionTarget::Auto);
        assert_eq!(config.cache_dir, default_cache_dir());
    }

    #[test]
    fn missing_local_path_is_treated_as_repo_id() {
        // a clearly-local name that exists should load as a file, so make one
        let dir = std::env::temp_dir().join("parallax_config_local");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("not_a_model.json");
        std::fs::write(&path, "{").unwrap();

        // exists but is not valid JSON: must fail as a file load, not a repo
        let err = load_model(path.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("failed to load model from"));

        std::fs::remove_dir_all(dir).ok();
    }
}
