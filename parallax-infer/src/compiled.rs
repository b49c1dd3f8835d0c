//! Optimized-runtime runner: execution plan compiled from an artifact.

use crate::convert::ConvertedArtifact;
use crate::error::{ConvertError, Result, RunError};
use crate::graph::{GraphDef, OpKind};
use crate::ops;
use crate::runner::ExecutionTarget;
use ndarray::ArrayD;
use std::collections::HashMap;

/// One planned step: op plus pre-resolved operand and weight slots.
#[derive(Debug)]
struct Step {
    op: OpKind,
    inputs: Vec<usize>,
    weight: Option<usize>,
}

/// An artifact compiled for one execution target.
///
/// Compilation resolves every tensor name to an arena slot once, so the hot
/// path is index lookups only. The accelerator plan routes heavy kernels
/// through the data-parallel path; arithmetic is identical to the native
/// runner since both dispatch into [`crate::ops`].
#[derive(Debug)]
pub struct CompiledModel {
    graph: GraphDef,
    target: ExecutionTarget,
    weights: Vec<ArrayD<f32>>,
    steps: Vec<Step>,
    /// Arena slot per declared graph output
    output_slots: Vec<usize>,
}

impl CompiledModel {
    /// Compile a loaded artifact for a resolved execution target.
    ///
    /// `target` must be concrete (never `Auto`); resolution happens in
    /// [`crate::runner::DeviceRegistry::resolve`].
    pub fn compile(artifact: ConvertedArtifact, target: ExecutionTarget) -> Result<Self> {
        artifact.graph.validate(&artifact.weights)?;

        // Belt and braces: convert refuses these, but artifacts can be
        // hand-written.
        if let Some(node) = artifact.graph.data_dependent_node() {
            return Err(ConvertError::GraphExport {
                node: node.name.clone(),
                op: node.op.name().to_string(),
            }
            .into());
        }

        let graph = artifact.graph;

        let mut slots: HashMap<&str, usize> = HashMap::new();
        for (i, def) in graph.inputs.iter().enumerate() {
            slots.insert(def.name.as_str(), i);
        }

        let mut weight_slots: HashMap<&str, usize> = HashMap::new();
        let mut weights = Vec::with_capacity(artifact.weights.len());
        for (i, (name, tensor)) in artifact.weights.iter().enumerate() {
            weight_slots.insert(name.as_str(), i);
            weights.push(tensor.clone());
        }

        let mut steps = Vec::with_capacity(graph.nodes.len());
        for (i, node) in graph.nodes.iter().enumerate() {
            let inputs = node
                .inputs
                .iter()
                .map(|name| {
                    slots.get(name.as_str()).copied().ok_or_else(|| {
                        RunError::MissingOutput { name: name.clone() }
                    })
                })
                .collect::<std::result::Result<_, _>>()?;

            let weight = match node.op.weight_ref() {
                Some(name) => Some(weight_slots.get(name).copied().ok_or_else(|| {
                    RunError::MissingWeight {
                        op: node.op.name().to_string(),
                    }
                })?),
                None => None,
            };

            steps.push(Step {
                op: node.op.clone(),
                inputs,
                weight,
            });
            slots.insert(node.name.as_str(), graph.inputs.len() + i);
        }

        let output_slots = graph
            .outputs
            .iter()
            .map(|name| {
                slots.get(name.as_str()).copied().ok_or_else(|| {
                    RunError::MissingOutput { name: name.clone() }
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        tracing::debug!(
            model = graph.name,
            %target,
            steps = steps.len(),
            "compiled execution plan"
        );

        Ok(Self {
            graph,
            target,
            weights,
            steps,
            output_slots,
        })
    }

    pub fn graph(&self) -> &GraphDef {
        &self.graph
    }

    pub fn target(&self) -> ExecutionTarget {
        self.target
    }

    /// Run the compiled plan. Stateless; may be repeated with different inputs.
    pub fn infer(&self, inputs: &[ArrayD<f32>]) -> Result<Vec<ArrayD<f32>>> {
        self.graph.check_inputs(inputs)?;

        let parallel = self.target == ExecutionTarget::Accelerator;
        let mut arena: Vec<Option<ArrayD<f32>>> =
            Vec::with_capacity(inputs.len() + self.steps.len());
        arena.extend(inputs.iter().cloned().map(Some));
        arena.resize(inputs.len() + self.steps.len(), None);

        for (i, step) in self.steps.iter().enumerate() {
            let operands = step
                .inputs
                .iter()
                .map(|&slot| {
                    arena[slot].as_ref().ok_or_else(|| RunError::MissingOutput {
                        name: format!("slot {slot}"),
                    })
                })
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let weight = step.weight.map(|slot| &self.weights[slot]);
            let output = ops::apply(&step.op, &operands, weight, parallel)?;
            arena[inputs.len() + i] = Some(output);
        }

        self.output_slots
            .iter()
            .map(|&slot| {
                arena[slot].clone().ok_or_else(|| {
                    RunError::MissingOutput {
                        name: format!("slot {slot}"),
                    }
                    .into()
                })
            })
            .collect()
    }
}
