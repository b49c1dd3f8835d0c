//! parallax-dl: sample media fetching with a skip-if-present cache.
//!
//! Fetches sample clips and source models over HTTP into a local directory,
//! skipping anything already on disk so repeated runs stay offline.
//!
//! ```no_run
//! use parallax_dl::dl::{default_dir, fetch};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let path = fetch("https://example.com/samples/clip.wav", &default_dir())?;
//! println!("sample at {}", path.display());
//! # Ok(())
//! # }
//! ```

pub mod dl;

pub use dl::{DlError, default_dir, fetch};
