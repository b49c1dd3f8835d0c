//! Codec subcommand - round-trip a WAV file through an encoder/decoder pair.

use crate::config::{self, RunArgs};
use eyre::{Context, Result};
use parallax_infer::audio::{AudioBuffer, AudioSpec, MelSpectrogram};
use parallax_infer::pipeline::{CodecPipeline, build_runner};
use std::path::PathBuf;
use std::time::Instant;

pub fn execute(
    encoder: String,
    decoder: String,
    run: RunArgs,
    path: PathBuf,
    output: Option<PathBuf>,
) -> Result<()> {
    let config = run.pipeline_config();

    let encoder = build_runner(config::load_model(&encoder)?, &config)?;
    let decoder = build_runner(config::load_model(&decoder)?, &config)?;

    let input = AudioBuffer::from_wav(&path)
        .wrap_err_with(|| format!("failed to open audio: {}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        duration = %format!("{:.2}s", input.duration_secs()),
        channels = input.channels,
        sample_rate = input.sample_rate,
        "audio loaded"
    );

    let pipeline = CodecPipeline::new(
        encoder,
        decoder,
        AudioSpec {
            sample_rate: input.sample_rate,
            channels: 1,
        },
    )?;

    let s = Instant::now();
    let reconstructed = pipeline.process(&input)?;
    let d = s.elapsed();

    tracing::info!(duration = %format!("{:.2}s", d.as_secs_f32()), "codec run complete");
    log_fidelity(&input, &reconstructed);

    let output = output.unwrap_or_else(|| {
        let mut out = path.clone();
        out.set_extension("decoded.wav");
        out
    });

    reconstructed
        .to_wav(&output)
        .wrap_err_with(|| format!("failed to write {}", output.display()))?;
    println!("{}", output.display());

    Ok(())
}

/// Log reconstruction fidelity as a mel-feature distance.
///
/// Both signals are conformed to the reference spec first; signals too short
/// for one analysis window are skipped.
fn log_fidelity(input: &AudioBuffer, reconstructed: &AudioBuffer) {
    let extractor = MelSpectrogram::REFERENCE;
    let spec = AudioSpec {
        sample_rate: extractor.sample_rate as u32,
        channels: 1,
    };

    let features = |buffer: &AudioBuffer| {
        buffer
            .conform(spec)
            .and_then(|mono| extractor.apply(&mono.samples))
    };

    match (features(input), features(reconstructed)) {
        (Ok(a), Ok(b)) => {
            let frames = a.nrows().min(b.nrows());
            if frames == 0 {
                return;
            }

            let mut total = 0.0f32;
            let mut count = 0usize;
            for row in 0..frames {
                for (x, y) in a.row(row).iter().zip(b.row(row)) {
                    total += (x - y).abs();
                    count += 1;
                }
            }
            let distance = total / count as f32;

            tracing::info!(frames, mel_distance = distance, "reconstruction fidelity");
        }
        _ => tracing::debug!("signal too short for mel fidelity check"),
    }
}
