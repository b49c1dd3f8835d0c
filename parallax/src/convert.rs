//! Convert subcommand - export a source model to the cached artifact.

use crate::config::{self, ModelArgs};
use eyre::{Context, Result};
use parallax_infer::convert;
use std::time::Instant;

pub fn execute(args: ModelArgs, base: Option<String>) -> Result<()> {
    let model = config::load_model(&args.model)?;
    let base = base.unwrap_or_else(|| model.graph.name.clone());
    let config = args.run.pipeline_config();

    let s = Instant::now();

    let artifact = convert::convert(&model, &config.cache_dir, &base)
        .wrap_err_with(|| format!("conversion failed for {}", args.model))?;

    let d = s.elapsed();
    tracing::info!(
        base,
        duration = %format!("{:.2}s", d.as_secs_f32()),
        "conversion complete"
    );

    println!("{}", artifact.graph_path.display());
    println!("{}", artifact.weights_path.display());

    Ok(())
}
