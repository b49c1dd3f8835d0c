//! CLI argument definitions using clap.

use crate::config::{ModelArgs, RunArgs};
use clap::{Parser, Subcommand};
use eyre::Result;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "plx")]
#[command(about = "Model conversion and media inference pipelines")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Convert a source model into the cached optimized artifact
    Convert {
        #[command(flatten)]
        model: ModelArgs,

        /// Artifact base name (default: the model's graph name)
        #[arg(short, long)]
        base: Option<String>,
    },

    /// Classify a video clip (directory of frame images)
    Classify {
        #[command(flatten)]
        model: ModelArgs,

        /// Directory of frame images, sorted by file name
        path: PathBuf,

        /// Clip frame rate
        #[arg(long, default_value_t = 30.0)]
        fps: f32,

        /// Label file, one label per line
        #[arg(short, long)]
        labels: Option<PathBuf>,

        /// Number of predictions to print
        #[arg(short = 'k', long, default_value_t = 5)]
        top_k: usize,
    },

    /// Encode and decode a WAV file through a codec model pair
    Codec {
        /// Encoder source model (JSON file or hub repo id)
        #[arg(long)]
        encoder: String,

        /// Decoder source model (JSON file or hub repo id)
        #[arg(long)]
        decoder: String,

        #[command(flatten)]
        run: RunArgs,

        /// Input WAV file
        path: PathBuf,

        /// Output WAV path (default: input with a `.decoded.wav` suffix)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run both strategies on the same clip and report ranking agreement
    Compare {
        #[command(flatten)]
        model: ModelArgs,

        /// Directory of frame images, sorted by file name
        path: PathBuf,

        /// Clip frame rate
        #[arg(long, default_value_t = 30.0)]
        fps: f32,

        /// Label file, one label per line
        #[arg(short, long)]
        labels: Option<PathBuf>,

        /// Ranking depth for the agreement score
        #[arg(short = 'k', long, default_value_t = 5)]
        top_k: usize,
    },

    /// Download a sample file into the local cache
    Fetch {
        /// URL to download
        url: String,

        /// Output directory (default: system download directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Execute CLI command - separated for testing.
pub fn run_cli(cli: Cli) -> Result<()> {
    tracing::debug!(?cli, "parsed arguments");

    match cli.command {
        Commands::Convert { model, base } => crate::convert::execute(model, base),
        Commands::Classify {
            model,
            path,
            fps,
            labels,
            top_k,
        } => crate::classify::execute(model, path, fps, labels, top_k),
        Commands::Codec {
            encoder,
            decoder,
            run,
            path,
            output,
        } => crate::codec::execute(encoder, decoder, run, path, output),
        Commands::Compare {
            model,
            path,
            fps,
            labels,
            top_k,
        } => crate::compare::execute(model, path, fps, labels, top_k),
        Commands::Fetch { url, output } => crate::fetch::execute(url, output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_convert_command() {
        let cli = Cli::parse_from(["plx", "convert", "--model", "model.json"]);

        assert!(matches!(
            &cli.command,
            Commands::Convert { model, base: None }
            if model.model == "model.json"
        ));
    }

    #[test]
    fn parses_classify_with_labels_and_k() {
        let cli = Cli::parse_from([
            "plx", "classify", "--model", "clf.json", "frames/", "-l", "labels.txt", "-k", "3",
        ]);

        assert!(matches!(
            &cli.command,
            Commands::Classify { path, labels, top_k: 3, .. }
            if path.to_str() == Some("frames/")
            && labels.as_deref().is_some_and(|p| p == "labels.txt")
        ));
    }

    #[test]
    fn parses_codec_with_output() {
        let cli = Cli::parse_from([
            "plx", "codec", "--encoder", "enc.json", "--decoder", "dec.json", "in.wav", "-o",
            "out.wav",
        ]);

        assert!(matches!(
            &cli.command,
            Commands::Codec { encoder, decoder, output, .. }
            if encoder == "enc.json"
            && decoder == "dec.json"
            && output.as_deref().is_some_and(|p| p == "out.wav")
        ));
    }

    #[test]
    fn parses_compare_defaults() {
        let cli = Cli::parse_from(["plx", "compare", "--model", "clf.json", "frames/"]);

        assert!(matches!(
            &cli.command,
            Commands::Compare { top_k: 5, labels: None, .. }
        ));
    }

    #[test]
    fn parses_fetch_command() {
        let cli = Cli::parse_from(["plx", "fetch", "https://example.com/clip.wav"]);

        assert!(matches!(
            &cli.command,
            Commands::Fetch { url, output: None }
            if url == "https://example.com/clip.wav"
        ));
    }
}
