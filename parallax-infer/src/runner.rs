//! Execution targets and the two interchangeable model runners.

use crate::compiled::CompiledModel;
use crate::convert::ConvertedArtifact;
use crate::error::{DeviceError, Result};
use crate::graph::{GraphDef, SourceModel};
use crate::native::NativeModel;
use ndarray::ArrayD;

/// Named compute device a compiled model runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionTarget {
    /// General-purpose CPU, always present
    Cpu,
    /// Data-parallel accelerator, present only when registered
    Accelerator,
    /// Automatic selection: accelerator when present, else CPU
    Auto,
}

impl std::fmt::Display for ExecutionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ExecutionTarget::Cpu => "cpu",
            ExecutionTarget::Accelerator => "accelerator",
            ExecutionTarget::Auto => "auto",
        };
        f.write_str(name)
    }
}

/// The execution targets present on this host.
///
/// Availability is declared by the caller, not probed: the CPU target is
/// always registered, an accelerator only when the embedder says so.
#[derive(Clone, Debug)]
pub struct DeviceRegistry {
    targets: Vec<ExecutionTarget>,
}

impl DeviceRegistry {
    /// CPU-only registry.
    pub fn host() -> Self {
        Self {
            targets: vec![ExecutionTarget::Cpu],
        }
    }

    /// Register an accelerator target.
    pub fn with_accelerator(mut self) -> Self {
        if !self.targets.contains(&ExecutionTarget::Accelerator) {
            self.targets.push(ExecutionTarget::Accelerator);
        }
        self
    }

    pub fn available(&self) -> &[ExecutionTarget] {
        &self.targets
    }

    /// Resolve a requested target to a concrete one.
    ///
    /// `Auto` prefers the accelerator when registered and falls back to the
    /// CPU. A named target that is absent is an error listing what is
    /// available; named targets never fall back silently.
    pub fn resolve(&self, requested: ExecutionTarget) -> Result<ExecutionTarget> {
        let resolved = match requested {
            ExecutionTarget::Auto => {
                if self.targets.contains(&ExecutionTarget::Accelerator) {
                    ExecutionTarget::Accelerator
                } else {
                    ExecutionTarget::Cpu
                }
            }
            concrete => concrete,
        };

        if self.targets.contains(&resolved) {
            Ok(resolved)
        } else {
            Err(DeviceError::Unavailable {
                requested: requested.to_string(),
                available: self.targets.iter().map(|t| t.to_string()).collect(),
            }
            .into())
        }
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::host()
    }
}

/// A loaded model bound to one execution strategy.
///
/// The two variants are substitutable behind the same `infer` contract;
/// callers select the strategy once at construction and never branch on it
/// afterwards.
pub enum ModelRunner {
    Native(NativeModel),
    Optimized(CompiledModel),
}

impl ModelRunner {
    /// Build the native-framework runner from a source model.
    pub fn native(model: SourceModel) -> Result<Self> {
        Ok(ModelRunner::Native(NativeModel::new(model)?))
    }

    /// Build the optimized-runtime runner from a converted artifact, bound
    /// to a target resolved through the registry.
    pub fn optimized(
        artifact: ConvertedArtifact,
        registry: &DeviceRegistry,
        target: ExecutionTarget,
    ) -> Result<Self> {
        let resolved = registry.resolve(target)?;
        Ok(ModelRunner::Optimized(CompiledModel::compile(
            artifact, resolved,
        )?))
    }

    /// Run a forward pass on tensors matching the model's declared inputs.
    pub fn infer(&self, inputs: &[ArrayD<f32>]) -> Result<Vec<ArrayD<f32>>> {
        match self {
            ModelRunner::Native(model) => model.infer(inputs),
            ModelRunner::Optimized(model) => model.infer(inputs),
        }
    }

    pub fn graph(&self) -> &GraphDef {
        match self {
            ModelRunner::Native(model) => model.graph(),
            ModelRunner::Optimized(model) => model.graph(),
        }
    }

    /// Strategy name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ModelRunner::Native(_) => "native",
            ModelRunner::Optimized(_) => "optimized",
        }
    }
}
