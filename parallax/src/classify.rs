//! Classify subcommand - rank a clip's classes through one runner.

use crate::config::{self, ModelArgs};
use eyre::{Context, Result};
use parallax_infer::pipeline::{ClassifyPipeline, build_runner};
use parallax_infer::postprocess::LabelTable;
use parallax_infer::video::{ClipSpec, VideoClip};
use std::path::PathBuf;
use std::time::Instant;

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

    let runner = build_runner(model, &config)?;
    let pipeline = ClassifyPipeline::new(runner, ClipSpec::default(), labels, top_k);

    let clip = VideoClip::from_frame_dir(&path, fps)
        .wrap_err_with(|| format!("failed to load clip from {}", path.display()))?;
    tracing::info!(
        frames = clip.frames.len(),
        duration = %format!("{:.2}s", clip.duration_secs()),
        "clip loaded"
    );

    let s = Instant::now();
    let ranked = pipeline.process(&clip)?;
    let d = s.elapsed();

    tracing::info!(duration = %format!("{:.2}s", d.as_secs_f32()), "inference completed");

    for prediction in &ranked {
        println!("{:>8.4}  {}", prediction.score, prediction.label);
    }

    Ok(())
}
