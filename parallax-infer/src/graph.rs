//! Model graph definition and source model loading.
//!
//! A [`GraphDef`] is a static data-flow graph over named tensors: each node
//! consumes graph inputs or earlier nodes and produces one tensor under its
//! own name. Nodes are stored in topological order; `validate` enforces it.
//!
//! A [`SourceModel`] pairs a graph with its named weight tensors. This is the
//! "native framework" representation: a single human-readable JSON file with
//! weights inlined. The conversion step ([`crate::convert`]) turns it into
//! the compact two-file artifact the optimized runtime loads.

use crate::error::{AssetError, GraphError, Result};
use hf_hub::CacheRepo;
use hf_hub::api::sync::ApiRepo;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Named graph input with its expected shape.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IoDef {
    pub name: String,
    pub shape: Vec<usize>,
}

/// A single operation node. Produces one tensor named after the node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeDef {
    pub name: String,
    pub op: OpKind,
    /// Data inputs: graph input names or earlier node names.
    pub inputs: Vec<String>,
}

/// Supported operations.
///
/// All ops are shape-stable except [`OpKind::GateOnMean`], which branches on
/// a tensor value and therefore cannot be exported to an artifact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OpKind {
    Identity,
    Scale { factor: f32 },
    /// Reshape to `(1, len)`.
    Flatten,
    /// 2-D matrix product with a named weight `(k, n)`.
    MatMul { weight: String },
    /// Broadcast add of a rank-1 weight along the last axis.
    AddBias { weight: String },
    Relu,
    /// Numerically stable softmax along the last axis.
    Softmax,
    /// Concatenate 2-D inputs along the feature axis.
    Concat,
    /// Pass the input through when its mean exceeds `threshold`, else zeros.
    ///
    /// Data-dependent control flow: runnable by the native interpreter,
    /// rejected by the conversion step.
    GateOnMean { threshold: f32 },
}

impl OpKind {
    /// Weight tensor referenced by this op, if any.
    pub fn weight_ref(&self) -> Option<&str> {
        match self {
            OpKind::MatMul { weight } | OpKind::AddBias { weight } => Some(weight),
            _ => None,
        }
    }

    /// Expected weight rank for ops that carry one.
    pub(crate) fn weight_rank(&self) -> Option<usize> {
        match self {
            OpKind::MatMul { .. } => Some(2),
            OpKind::AddBias { .. } => Some(1),
            _ => None,
        }
    }

    /// Number of data inputs, or `None` for variadic (two or more).
    pub fn arity(&self) -> Option<usize> {
        match self {
            OpKind::Concat => None,
            _ => Some(1),
        }
    }

    /// Whether the op branches on tensor values.
    pub fn is_data_dependent(&self) -> bool {
        matches!(self, OpKind::GateOnMean { .. })
    }

    /// Short op name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            OpKind::Identity => "identity",
            OpKind::Scale { .. } => "scale",
            OpKind::Flatten => "flatten",
            OpKind::MatMul { .. } => "matmul",
            OpKind::AddBias { .. } => "add_bias",
            OpKind::Relu => "relu",
            OpKind::Softmax => "softmax",
            OpKind::Concat => "concat",
            OpKind::GateOnMean { .. } => "gate_on_mean",
        }
    }
}

/// Static data-flow graph over named tensors.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GraphDef {
    pub name: String,
    pub inputs: Vec<IoDef>,
    pub nodes: Vec<NodeDef>,
    /// Names of the tensors the graph produces, in declared order.
    pub outputs: Vec<String>,
}

impl GraphDef {
    /// Validate internal consistency against a weight map.
    ///
    /// Checks that the graph is non-empty, tensor names are unique, every
    /// node input resolves to a graph input or an earlier node (this is what
    /// makes the stored order topological), node arity matches the op,
    /// referenced weights exist with the expected rank, and every declared
    /// output is produced.
    pub fn validate(&self, weights: &BTreeMap<String, ArrayD<f32>>) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(GraphError::Empty(self.name.clone()).into());
        }

        let mut known: HashSet<&str> = HashSet::new();
        for input in &self.inputs {
            if !known.insert(&input.name) {
                return Err(GraphError::DuplicateName(input.name.clone()).into());
            }
        }

        for node in &self.nodes {
            match node.op.arity() {
                Some(expected) if node.inputs.len() != expected => {
                    return Err(GraphError::Arity {
                        node: node.name.clone(),
                        expected,
                        got: node.inputs.len(),
                    }
                    .into());
                }
                None if node.inputs.len() < 2 => {
                    return Err(GraphError::Arity {
                        node: node.name.clone(),
                        expected: 2,
                        got: node.inputs.len(),
                    }
                    .into());
                }
                _ => {}
            }

            for input in &node.inputs {
                if !known.contains(input.as_str()) {
                    return Err(GraphError::UnknownInput {
                        node: node.name.clone(),
                        input: input.clone(),
                    }
                    .into());
                }
            }

            if let Some(weight) = node.op.weight_ref() {
                let tensor =
                    weights
                        .get(weight)
                        .ok_or_else(|| GraphError::MissingWeight {
                            node: node.name.clone(),
                            weight: weight.to_string(),
                        })?;

                let expected = node.op.weight_rank().unwrap_or(tensor.ndim());
                if tensor.ndim() != expected {
                    return Err(GraphError::WeightRank {
                        node: node.name.clone(),
                        weight: weight.to_string(),
                        expected,
                        got: tensor.ndim(),
                    }
                    .into());
                }
            }

            if !known.insert(&node.name) {
                return Err(GraphError::DuplicateName(node.name.clone()).into());
            }
        }

        for output in &self.outputs {
            if !known.contains(output.as_str()) {
                return Err(GraphError::UnproducedOutput(output.clone()).into());
            }
        }

        Ok(())
    }

    /// Check caller-supplied tensors against the declared input arity and
    /// shapes. Both runners enforce this before executing.
    pub fn check_inputs(&self, inputs: &[ndarray::ArrayD<f32>]) -> Result<()> {
        use crate::error::RunError;

        if inputs.len() != self.inputs.len() {
            return Err(RunError::ArityMismatch {
                expected: self.inputs.len(),
                got: inputs.len(),
            }
            .into());
        }

        for (def, tensor) in self.inputs.iter().zip(inputs) {
            if def.shape != tensor.shape() {
                return Err(RunError::InputShape {
                    name: def.name.clone(),
                    expected: def.shape.clone(),
                    got: tensor.shape().to_vec(),
                }
                .into());
            }
        }

        Ok(())
    }

    /// First node using a data-dependent op, if any.
    pub fn data_dependent_node(&self) -> Option<&NodeDef> {
        self.nodes.iter().find(|n| n.op.is_data_dependent())
    }
}

/// Weight tensor in the on-disk source model format (weights inlined).
#[derive(Clone, Debug, Serialize, Deserialize)]
struct WeightDef {
    shape: Vec<usize>,
    data: Vec<f32>,
}

#[derive(Serialize, Deserialize)]
struct SourceModelFile {
    graph: GraphDef,
    weights: BTreeMap<String, WeightDef>,
}

/// A model graph with its weight tensors, ready for interpretation or export.
#[derive(Clone, Debug)]
pub struct SourceModel {
    pub graph: GraphDef,
    pub weights: BTreeMap<String, ArrayD<f32>>,
}

impl SourceModel {
    pub fn new(graph: GraphDef, weights: BTreeMap<String, ArrayD<f32>>) -> Self {
        Self { graph, weights }
    }

    /// Validate the graph against the weight map.
    pub fn validate(&self) -> Result<()> {
        self.graph.validate(&self.weights)
    }

    /// Load a source model from its JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let file: SourceModelFile = serde_json::from_str(&content)?;

        let mut weights = BTreeMap::new();
        for (name, def) in file.weights {
            let len: usize = def.shape.iter().product();
            if def.data.len() != len {
                return Err(GraphError::WeightData {
                    weight: name,
                    expected: len,
                    got: def.data.len(),
                }
                .into());
            }
            weights.insert(name, ArrayD::from_shape_vec(def.shape, def.data)?);
        }

        let model = Self::new(file.graph, weights);
        model.validate()?;

        tracing::debug!(path = ?path.display(), name = model.graph.name, "loaded source model");
        Ok(model)
    }

    /// Load a source model from a repository, trying `candidates` in order.
    pub fn from_repo(repo: &ModelRepo, candidates: &[&str]) -> Result<Self> {
        Self::from_file(repo.resolve_any(candidates)?)
    }

    /// Serialize to the on-disk JSON form (weights inlined).
    pub fn to_json(&self) -> Result<String> {
        let weights = self
            .weights
            .iter()
            .map(|(name, tensor)| {
                let def = WeightDef {
                    shape: tensor.shape().to_vec(),
                    data: tensor.iter().copied().collect(),
                };
                (name.clone(), def)
            })
            .collect();

        let file = SourceModelFile {
            graph: self.graph.clone(),
            weights,
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }
}

/// Model repository sources.
#[derive(Debug)]
pub enum ModelRepo {
    /// Local filesystem path
    Path(PathBuf),
    /// HuggingFace cache repository
    Cache(CacheRepo),
    /// HuggingFace API repository
    Api(ApiRepo),
}

impl ModelRepo {
    /// Resolve a file name to its full path in this repository.
    pub fn resolve(&self, file_name: &str) -> Result<PathBuf> {
        match self {
            ModelRepo::Path(path) => path.join(file_name).canonicalize().map_err(|_| {
                AssetError::Unavailable(format!("failed to resolve model file: {file_name}")).into()
            }),
            ModelRepo::Cache(cache_repo) => cache_repo.get(file_name).ok_or_else(|| {
                AssetError::Unavailable(format!("model not found in cache: {file_name}")).into()
            }),
            ModelRepo::Api(api_repo) => api_repo.get(file_name).map_err(|e| {
                AssetError::Unavailable(format!("failed to download {file_name}: {e}")).into()
            }),
        }
    }

    /// Try resolving multiple file names, return first successful match.
    pub fn resolve_any(&self, candidates: &[&str]) -> Result<PathBuf> {
        candidates
            .iter()
            .find_map(|name| self.resolve(name).ok())
            .ok_or_else(|| {
                AssetError::Unavailable(format!(
                    "no model found from candidates: {}",
                    candidates.join(", ")
                ))
                .into()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, GraphError};
    use ndarray::Array2;

    fn chain_graph() -> GraphDef {
        GraphDef {
            name: "chain".to_string(),
            inputs: vec![IoDef {
                name: "x".to_string(),
                shape: vec![1, 4],
            }],
            nodes: vec![
                NodeDef {
                    name: "proj".to_string(),
                    op: OpKind::MatMul {
                        weight: "w".to_string(),
                    },
                    inputs: vec!["x".to_string()],
                },
                NodeDef {
                    name: "act".to_string(),
                    op: OpKind::Relu,
                    inputs: vec!["proj".to_string()],
                },
            ],
            outputs: vec!["act".to_string()],
        }
    }

    fn chain_weights() -> BTreeMap<String, ArrayD<f32>> {
        let mut weights = BTreeMap::new();
        weights.insert("w".to_string(), Array2::<f32>::zeros((4, 2)).into_dyn());
        weights
    }

    #[test]
    fn validates_well_formed_graph() {
        chain_graph().validate(&chain_weights()).unwrap();
    }

    #[test]
    fn rejects_empty_graph() {
        let mut graph = chain_graph();
        graph.nodes.clear();
        graph.outputs.clear();

        let err = graph.validate(&chain_weights()).unwrap_err();
        assert!(matches!(err, Error::Graph(GraphError::Empty(_))));
    }

    #[test]
    fn rejects_unknown_input() {
        let mut graph = chain_graph();
        graph.nodes[0].inputs = vec!["missing".to_string()];

        let err = graph.validate(&chain_weights()).unwrap_err();
        assert!(matches!(err, Error::Graph(GraphError::UnknownInput { .. })));
    }

    #[test]
    fn rejects_forward_reference() {
        let mut graph = chain_graph();
        // "proj" consuming "act" breaks topological order
        graph.nodes[0].inputs = vec!["act".to_string()];

        let err = graph.validate(&chain_weights()).unwrap_err();
        assert!(matches!(err, Error::Graph(GraphError::UnknownInput { .. })));
    }

    #[test]
    fn rejects_missing_weight() {
        let err = chain_graph().validate(&BTreeMap::new()).unwrap_err();
        assert!(matches!(
            err,
            Error::Graph(GraphError::MissingWeight { .. })
        ));
    }

    #[test]
    fn rejects_wrong_weight_rank() {
        let mut weights = BTreeMap::new();
        weights.insert("w".to_string(), ArrayD::<f32>::zeros(vec![4]));

        let err = chain_graph().validate(&weights).unwrap_err();
        assert!(matches!(err, Error::Graph(GraphError::WeightRank { .. })));
    }

    #[test]
    fn rejects_duplicate_node_name() {
        let mut graph = chain_graph();
        graph.nodes[1].name = "proj".to_string();
        graph.outputs = vec!["proj".to_string()];

        let err = graph.validate(&chain_weights()).unwrap_err();
        assert!(matches!(err, Error::Graph(GraphError::DuplicateName(_))));
    }

    #[test]
    fn rejects_unproduced_output() {
        let mut graph = chain_graph();
        graph.outputs = vec!["nowhere".to_string()];

        let err = graph.validate(&chain_weights()).unwrap_err();
        assert!(matches!(
            err,
            Error::Graph(GraphError::UnproducedOutput(_))
        ));
    }

    #[test]
    fn rejects_concat_with_single_input() {
        let mut graph = chain_graph();
        graph.nodes[1] = NodeDef {
            name: "cat".to_string(),
            op: OpKind::Concat,
            inputs: vec!["proj".to_string()],
        };
        graph.outputs = vec!["cat".to_string()];

        let err = graph.validate(&chain_weights()).unwrap_err();
        assert!(matches!(err, Error::Graph(GraphError::Arity { .. })));
    }

    #[test]
    fn finds_data_dependent_node() {
        let mut graph = chain_graph();
        graph.nodes[1].op = OpKind::GateOnMean { threshold: 0.0 };

        let node = graph.data_dependent_node().unwrap();
        assert_eq!(node.name, "act");
    }

    #[test]
    fn source_model_json_roundtrip() {
        let model = SourceModel::new(chain_graph(), chain_weights());
        let json = model.to_json().unwrap();

        let dir = std::env::temp_dir().join("parallax_graph_roundtrip");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("model.json");
        std::fs::write(&path, json).unwrap();

        let loaded = SourceModel::from_file(&path).unwrap();
        assert_eq!(loaded.graph.name, "chain");
        assert_eq!(loaded.weights["w"].shape(), &[4, 2]);

        std::fs::remove_file(path).ok();
    }
}
