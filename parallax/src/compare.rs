//! Compare subcommand - run both strategies on one clip and report agreement.

use crate::config::{self, ModelArgs};
use eyre::{Context, Result};
use parallax_infer::pipeline::{self, PipelineConfig, RunnerKind, build_runner};
use parallax_infer::postprocess::LabelTable;
use parallax_infer::video::{self, ClipSpec, VideoClip};
use std::path::PathBuf;

pub fn execute(
    args: ModelArgs,
    path: PathBuf,
    fps: f32,
    labels: Option<PathBuf>,
    top_k: usize,
) -> Result<()> {
    let model = config::load_model(&args.model)?;
    let config = args.run.pipeline_config();

    let labels = match labels {
        Some(path) => LabelTable::from_file(&path)
            .wrap_err_with(|| format!("failed to load labels from {}", path.display()))?,
        None => LabelTable::empty(),
    };

    let native = build_runner(
        model.clone(),
        &PipelineConfig {
            runner: RunnerKind::Native,
            ..config.clone()
        },
    )?;
    let optimized = build_runner(
        model,
        &PipelineConfig {
            runner: RunnerKind::Optimized,
            ..config
        },
    )?;

    let clip = VideoClip::from_frame_dir(&path, fps)
        .wrap_err_with(|| format!("failed to load clip from {}", path.display()))?;

    let spec = ClipSpec::default();
    let fast = video::preprocess_clip(&clip, &spec)?;
    let slow = video::slow_pathway(&fast, spec.slow_alpha)?;
    let inputs = [fast.into_dyn(), slow.into_dyn()];

    let comparison = pipeline::compare(&native, &optimized, &inputs, &labels, top_k)?;

    println!("agreement@{top_k}: {:.2}", comparison.agreement);
    println!("{:<10} {:<24} {:<24}", "", "native", "optimized");
    for (a, b) in comparison.native.iter().zip(&comparison.optimized) {
        println!(
            "{:<10} {:<24} {:<24}",
            "",
            format!("{} ({:.4})", a.label, a.score),
            format!("{} ({:.4})", b.label, b.score),
        );
    }

    Ok(())
}
