//! Native-framework runner: eager interpretation of a source model.

use crate::error::{Result, RunError};
use crate::graph::{GraphDef, SourceModel};
use crate::ops;
use ndarray::ArrayD;
use std::collections::HashMap;

/// Eager interpreter over a validated [`SourceModel`].
///
/// Executes nodes in their stored (topological) order, resolving tensors by
/// name on every call. Unlike the optimized runtime this can run
/// data-dependent ops, which is what makes it the conversion baseline.
pub struct NativeModel {
    model: SourceModel,
}

impl NativeModel {
    /// Wrap a source model, validating the graph against its weights.
    pub fn new(model: SourceModel) -> Result<Self> {
        model.validate()?;
        Ok(Self { model })
    }

    pub fn graph(&self) -> &GraphDef {
        &self.model.graph
    }

    /// Run a forward pass. Stateless; may be repeated with different inputs.
    pub fn infer(&self, inputs: &[ArrayD<f32>]) -> Result<Vec<ArrayD<f32>>> {
        let graph = &self.model.graph;
        graph.check_inputs(inputs)?;

        let mut env: HashMap<&str, ArrayD<f32>> = HashMap::with_capacity(
            graph.inputs.len() + graph.nodes.len(),
        );
        for (def, tensor) in graph.inputs.iter().zip(inputs) {
            env.insert(def.name.as_str(), tensor.clone());
        }

        for node in &graph.nodes {
            let operands: Vec<&ArrayD<f32>> = node
                .inputs
                .iter()
                .map(|name| {
                    env.get(name.as_str()).ok_or_else(|| RunError::MissingOutput {
                        name: name.clone(),
                    })
                })
                .collect::<std::result::Result<_, _>>()?;

            let weight = match node.op.weight_ref() {
                Some(name) => Some(self.model.weights.get(name).ok_or_else(|| {
                    RunError::MissingWeight {
                        op: node.op.name().to_string(),
                    }
                })?),
                None => None,
            };

            let output = ops::apply(&node.op, &operands, weight, false)?;
            env.insert(node.name.as_str(), output);
        }

        graph
            .outputs
            .iter()
            .map(|name| {
                env.get(name.as_str()).cloned().ok_or_else(|| {
                    RunError::MissingOutput { name: name.clone() }.into()
                })
            })
            .collect()
    }
}
