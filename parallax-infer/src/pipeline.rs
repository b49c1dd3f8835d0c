//! End-to-end pipelines: media in, ranked predictions or decoded media out.
//!
//! A pipeline owns one runner (or a codec pair) and applies the full chain:
//! load, preprocess to the model's declared input shapes, infer, postprocess.
//! The runner strategy is fixed at construction; swapping native for
//! optimized changes nothing else in the flow.

use crate::audio::{AudioBuffer, AudioSpec};
use crate::convert;
use crate::error::{PreprocessError, Result, RunError};
use crate::graph::SourceModel;
use crate::postprocess::{self, LabelTable, Prediction};
use crate::runner::{DeviceRegistry, ExecutionTarget, ModelRunner};
use crate::video::{self, ClipSpec, VideoClip};
use crate::window::WindowConfig;
use ndarray::Array2;
use std::path::PathBuf;

/// Which runner strategy a pipeline is built on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunnerKind {
    Native,
    Optimized,
}

/// Shared pipeline settings: runner strategy, target, and conversion cache.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub runner: RunnerKind,
    pub target: ExecutionTarget,
    pub cache_dir: PathBuf,
    pub registry: DeviceRegistry,
}

impl PipelineConfig {
    pub fn native() -> Self {
        Self {
            runner: RunnerKind::Native,
            target: ExecutionTarget::Auto,
            cache_dir: std::env::temp_dir(),
            registry: DeviceRegistry::host(),
        }
    }

    pub fn optimized(cache_dir: impl Into<PathBuf>, target: ExecutionTarget) -> Self {
        Self {
            runner: RunnerKind::Optimized,
            target,
            cache_dir: cache_dir.into(),
            registry: DeviceRegistry::host(),
        }
    }

    pub fn with_registry(mut self, registry: DeviceRegistry) -> Self {
        self.registry = registry;
        self
    }
}

/// Build a runner for a source model according to the pipeline config.
///
/// The optimized strategy converts through the cache first (or reuses the
/// cached artifact), so repeated builds of the same model are cheap.
pub fn build_runner(model: SourceModel, config: &PipelineConfig) -> Result<ModelRunner> {
    match config.runner {
        RunnerKind::Native => ModelRunner::native(model),
        RunnerKind::Optimized => {
            let artifact = convert::convert(&model, &config.cache_dir, &model.graph.name)?;
            ModelRunner::optimized(artifact, &config.registry, config.target)
        }
    }
}

/// Video classification: clip in, top-K labeled predictions out.
///
/// The model must declare two inputs, fast pathway first, slow second, with
/// shapes matching `spec.fast_shape()` and `spec.slow_shape()`.
pub struct ClassifyPipeline {
    runner: ModelRunner,
    spec: ClipSpec,
    labels: LabelTable,
    top_k: usize,
}

impl ClassifyPipeline {
    pub fn new(runner: ModelRunner, spec: ClipSpec, labels: LabelTable, top_k: usize) -> Self {
        Self {
            runner,
            spec,
            labels,
            top_k,
        }
    }

    pub fn runner(&self) -> &ModelRunner {
        &self.runner
    }

    /// Classify a clip.
    pub fn process(&self, clip: &VideoClip) -> Result<Vec<Prediction>> {
        let fast = video::preprocess_clip(clip, &self.spec)?;
        let slow = video::slow_pathway(&fast, self.spec.slow_alpha)?;

        let outputs = self.runner.infer(&[fast.into_dyn(), slow.into_dyn()])?;
        let logits = outputs.first().ok_or_else(|| RunError::MissingOutput {
            name: "logits".to_string(),
        })?;

        let ranked = postprocess::rank(logits, &self.labels, self.top_k)?;
        tracing::info!(
            runner = self.runner.kind(),
            top = ranked.first().map(|p| p.label.as_str()).unwrap_or("-"),
            "classified clip"
        );
        Ok(ranked)
    }
}

/// Neural audio codec: waveform in, reconstructed waveform out.
///
/// The signal is conformed to the codec's audio spec, cut into fixed windows
/// sized by the encoder's declared input, passed through encoder then decoder
/// window by window, and reassembled. Output duration is the covered window
/// count times the window length, so it lands within one window of the input.
pub struct CodecPipeline {
    encoder: ModelRunner,
    decoder: ModelRunner,
    spec: AudioSpec,
    window: WindowConfig,
}

impl CodecPipeline {
    /// Pair an encoder and decoder runner.
    ///
    /// Window length comes from the encoder's declared input shape (its last
    /// dimension); the coverage threshold keeps its default unless overridden
    /// on the returned pipeline.
    pub fn new(encoder: ModelRunner, decoder: ModelRunner, spec: AudioSpec) -> Result<Self> {
        let input = encoder
            .graph()
            .inputs
            .first()
            .ok_or_else(|| PreprocessError::InvalidSpec("encoder declares no input".to_string()))?;
        let window = input.shape.last().copied().ok_or_else(|| {
            PreprocessError::InvalidSpec("encoder input has no dimensions".to_string())
        })?;

        let window = WindowConfig::new(window);
        window.validate()?;

        Ok(Self {
            encoder,
            decoder,
            spec,
            window,
        })
    }

    pub fn with_window(mut self, window: WindowConfig) -> Result<Self> {
        window.validate()?;
        self.window = window;
        Ok(self)
    }

    pub fn window(&self) -> &WindowConfig {
        &self.window
    }

    /// Encode and decode a waveform.
    pub fn process(&self, audio: &AudioBuffer) -> Result<AudioBuffer> {
        let mono = audio.conform(AudioSpec {
            sample_rate: self.spec.sample_rate,
            channels: 1,
        })?;

        let mut decoded = Vec::with_capacity(self.window.window_count(mono.samples.len()) * self.window.window);

        for chunk in self.window.iter_windows(&mono.samples) {
            let frame = Array2::from_shape_vec((1, self.window.window), chunk)
                .map_err(RunError::Shape)?
                .into_dyn();

            let latent = self.encoder.infer(&[frame])?;
            let out = self.decoder.infer(&latent)?;

            let frame = out.first().ok_or_else(|| RunError::MissingOutput {
                name: "decoded".to_string(),
            })?;
            decoded.extend(frame.iter().copied());
        }

        tracing::info!(
            windows = decoded.len() / self.window.window.max(1),
            samples = decoded.len(),
            "codec reconstruction complete"
        );

        AudioBuffer {
            samples: decoded,
            sample_rate: self.spec.sample_rate,
            channels: 1,
        }
        .conform(self.spec)
    }
}

/// Side-by-side result of running both strategies on the same input.
#[derive(Clone, Debug)]
pub struct Comparison {
    pub native: Vec<Prediction>,
    pub optimized: Vec<Prediction>,
    /// Fraction of shared indices between the two top-K sets
    pub agreement: f64,
}

/// Run the same tensors through two runners and compare their rankings.
pub fn compare(
    native: &ModelRunner,
    optimized: &ModelRunner,
    inputs: &[ndarray::ArrayD<f32>],
    labels: &LabelTable,
    top_k: usize,
) -> Result<Comparison> {
    let rank_with = |runner: &ModelRunner| -> Result<Vec<Prediction>> {
        let outputs = runner.infer(inputs)?;
        let logits = outputs.first().ok_or_else(|| RunError::MissingOutput {
            name: "logits".to_string(),
        })?;
        postprocess::rank(logits, labels, top_k)
    };

    let native = rank_with(native)?;
    let optimized = rank_with(optimized)?;
    let agreement = postprocess::ranking_agreement(&native, &optimized);

    tracing::info!(agreement, top_k, "compared runner rankings");

    Ok(Comparison {
        native,
        optimized,
        agreement,
    })
}
