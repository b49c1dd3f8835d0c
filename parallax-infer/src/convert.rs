//! Conversion step: source model to on-disk optimized artifact.
//!
//! An artifact is two co-located files sharing a base name:
//!
//! - `{base}.graph.json`: structure descriptor, the graph plus a weight
//!   index (name, shape, byte offset, byte length)
//! - `{base}.weights.bin`: raw little-endian f32 blob
//!
//! Conversion is idempotent: when both files already exist the cached
//! artifact is loaded unchanged. Serialization is deterministic (weights are
//! kept in a BTreeMap), so repeated conversions of the same source produce
//! byte-identical files. Writes go to a temp file first and are renamed into
//! place, so a crashed conversion never leaves a half-written pair. Racing
//! converters on the same cache path are unsupported.

use crate::error::{ConvertError, Result};
use crate::graph::{GraphDef, SourceModel};
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const GRAPH_EXT: &str = "graph.json";
const WEIGHTS_EXT: &str = "weights.bin";

#[derive(Serialize, Deserialize)]
struct WeightEntry {
    name: String,
    shape: Vec<usize>,
    /// Byte offset into the weights blob
    offset: usize,
    /// Byte length in the weights blob
    len: usize,
}

#[derive(Serialize, Deserialize)]
struct ArtifactDescriptor {
    graph: GraphDef,
    weights: Vec<WeightEntry>,
}

/// A loaded on-disk artifact: graph, materialized weights, and file paths.
#[derive(Clone, Debug)]
pub struct ConvertedArtifact {
    pub graph: GraphDef,
    pub weights: BTreeMap<String, ArrayD<f32>>,
    pub graph_path: PathBuf,
    pub weights_path: PathBuf,
}

/// Path of the structure descriptor for a given cache dir and base name.
pub fn graph_path(cache_dir: &Path, base: &str) -> PathBuf {
    cache_dir.join(format!("{base}.{GRAPH_EXT}"))
}

/// Path of the weights blob for a given cache dir and base name.
pub fn weights_path(cache_dir: &Path, base: &str) -> PathBuf {
    cache_dir.join(format!("{base}.{WEIGHTS_EXT}"))
}

/// Convert a source model into an on-disk artifact, or load the cached one.
///
/// Fails with a graph-export error when the model contains data-dependent
/// control flow; that condition is fatal for the model until its forward
/// computation is restructured into shape-stable ops.
pub fn convert(model: &SourceModel, cache_dir: &Path, base: &str) -> Result<ConvertedArtifact> {
    model.validate()?;

    if let Some(node) = model.graph.data_dependent_node() {
        return Err(ConvertError::GraphExport {
            node: node.name.clone(),
            op: node.op.name().to_string(),
        }
        .into());
    }

    let graph_path = graph_path(cache_dir, base);
    let weights_path = weights_path(cache_dir, base);

    if graph_path.exists() && weights_path.exists() {
        tracing::debug!(base, dir = ?cache_dir.display(), "conversion cache hit");
        return load(cache_dir, base);
    }

    write_artifact(model, cache_dir, &graph_path, &weights_path)?;
    tracing::info!(base, dir = ?cache_dir.display(), "converted model to artifact");

    Ok(ConvertedArtifact {
        graph: model.graph.clone(),
        weights: model.weights.clone(),
        graph_path,
        weights_path,
    })
}

/// Load and validate an existing artifact.
pub fn load(cache_dir: &Path, base: &str) -> Result<ConvertedArtifact> {
    let graph_path = graph_path(cache_dir, base);
    let weights_path = weights_path(cache_dir, base);

    let (descriptor, weights) = read_artifact(&graph_path, &weights_path)?;
    descriptor.graph.validate(&weights)?;

    Ok(ConvertedArtifact {
        graph: descriptor.graph,
        weights,
        graph_path,
        weights_path,
    })
}

fn write_artifact(
    model: &SourceModel,
    cache_dir: &Path,
    graph_path: &Path,
    weights_path: &Path,
) -> std::result::Result<(), ConvertError> {
    std::fs::create_dir_all(cache_dir)?;

    let mut blob = Vec::new();
    let mut entries = Vec::with_capacity(model.weights.len());

    for (name, tensor) in &model.weights {
        let offset = blob.len();
        for value in tensor.iter() {
            blob.extend_from_slice(&value.to_le_bytes());
        }
        entries.push(WeightEntry {
            name: name.clone(),
            shape: tensor.shape().to_vec(),
            offset,
            len: blob.len() - offset,
        });
    }

    let descriptor = ArtifactDescriptor {
        graph: model.graph.clone(),
        weights: entries,
    };

    // Weights land first so a descriptor never references a missing blob.
    write_atomic(weights_path, &blob)?;
    write_atomic(graph_path, serde_json::to_string_pretty(&descriptor)?.as_bytes())?;

    Ok(())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("part");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}

fn read_artifact(
    graph_path: &Path,
    weights_path: &Path,
) -> std::result::Result<(ArtifactDescriptor, BTreeMap<String, ArrayD<f32>>), ConvertError> {
    if !graph_path.exists() {
        return Err(ConvertError::DescriptorMissing(graph_path.to_path_buf()));
    }
    if !weights_path.exists() {
        return Err(ConvertError::WeightsMissing(weights_path.to_path_buf()));
    }

    let descriptor: ArtifactDescriptor =
        serde_json::from_str(&std::fs::read_to_string(graph_path)?)?;
    let blob = std::fs::read(weights_path)?;

    let total: usize = descriptor.weights.iter().map(|e| e.len).sum();
    if total != blob.len() {
        return Err(ConvertError::Descriptor(format!(
            "weight index covers {total} bytes, blob has {}",
            blob.len()
        )));
    }

    let mut weights = BTreeMap::new();
    for entry in &descriptor.weights {
        let expected = entry.shape.iter().product::<usize>() * size_of::<f32>();
        if entry.len != expected {
            return Err(ConvertError::WeightsMismatch {
                name: entry.name.clone(),
                expected,
                got: entry.len,
            });
        }

        let end = entry.offset.checked_add(entry.len).filter(|&e| e <= blob.len()).ok_or_else(
            || ConvertError::Descriptor(format!("weight `{}` range outside blob", entry.name)),
        )?;

        let data: Vec<f32> = blob[entry.offset..end]
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        let tensor = ArrayD::from_shape_vec(entry.shape.clone(), data)
            .map_err(|e| ConvertError::Descriptor(e.to_string()))?;
        weights.insert(entry.name.clone(), tensor);
    }

    Ok((descriptor, weights))
}
