//! Fetch subcommand - download a sample file into the local cache.

use eyre::{Context, Result};
use parallax_dl::dl;
use std::path::PathBuf;

pub fn execute(url: String, output: Option<PathBuf>) -> Result<()> {
    let dir = output.unwrap_or_else(dl::default_dir);

    let path = dl::fetch(&url, &dir).wrap_err("failed to download sample")?;
    println!("{}", path.display());

    Ok(())
}
