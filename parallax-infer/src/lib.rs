//! parallax-infer: media-to-prediction pipelines over a portable graph IR.
//!
//! This crate turns source models (a small data-flow graph plus weights) into
//! ranked predictions or reconstructed media, with two interchangeable
//! execution strategies behind one interface.
//!
//! # Architecture
//!
//! A pipeline is a fixed chain of stages:
//!
//! - loaders ([`audio::AudioBuffer`], [`video::VideoClip`]) bring media into
//!   memory at its native format
//! - preprocessors ([`video::preprocess_clip`], [`window::WindowConfig`])
//!   conform it to the exact shapes a model declares
//! - a [`runner::ModelRunner`] executes the model, either interpreting the
//!   source graph eagerly ([`native::NativeModel`]) or running an execution
//!   plan compiled from a converted on-disk artifact
//!   ([`compiled::CompiledModel`])
//! - [`postprocess`] turns raw outputs into labeled, ranked predictions
//!
//! The [`convert`] module bridges the two strategies: it exports a validated
//! source model into a cached two-file artifact the optimized runtime loads.
//!
//! # Quick Start
//!
//! ```ignore
//! use parallax_infer::graph::SourceModel;
//! use parallax_infer::pipeline::{build_runner, ClassifyPipeline, PipelineConfig};
//! use parallax_infer::postprocess::LabelTable;
//! use parallax_infer::video::{ClipSpec, VideoClip};
//!
//! let model = SourceModel::from_file("classifier.json")?;
//! let runner = build_runner(model, &PipelineConfig::native())?;
//!
//! let pipeline = ClassifyPipeline::new(runner, ClipSpec::default(), LabelTable::empty(), 5);
//! let clip = VideoClip::from_frame_dir("frames/", 30.0)?;
//!
//! for prediction in pipeline.process(&clip)? {
//!     println!("{}: {:.3}", prediction.label, prediction.score);
//! }
//! ```

pub mod audio;
pub mod compiled;
pub mod convert;
pub mod error;
pub mod graph;
pub mod native;
pub mod ops;
pub mod pipeline;
pub mod postprocess;
pub mod runner;
pub mod video;
pub mod window;

pub use error::{Error, Result};
