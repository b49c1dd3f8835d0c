//! Fixed-size windowing with a zero-pad/drop coverage policy.
//!
//! Codec-style models consume exact-length windows. A trailing short window
//! is zero-padded to full length when enough real data covers it, and
//! dropped entirely when it does not.

use crate::error::{PreprocessError, Result};

/// Default minimum fraction of real data required to keep a padded window.
const DEFAULT_COVERAGE_THRESHOLD: f32 = 0.75;

/// Configuration for fixed-size windowing.
#[derive(Clone, Copy, Debug)]
pub struct WindowConfig {
    /// Window length in samples
    pub window: usize,

    /// Minimum fraction of real data for a padded trailing window
    pub coverage_threshold: f32,
}

impl WindowConfig {
    /// Create a configuration with the default coverage threshold.
    pub fn new(window: usize) -> Self {
        Self {
            window,
            coverage_threshold: DEFAULT_COVERAGE_THRESHOLD,
        }
    }

    /// Override the coverage threshold.
    pub fn with_coverage_threshold(mut self, threshold: f32) -> Self {
        self.coverage_threshold = threshold;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.window == 0 {
            return Err(PreprocessError::InvalidSpec("window length is zero".to_string()).into());
        }
        if !(0.0..=1.0).contains(&self.coverage_threshold) {
            return Err(PreprocessError::InvalidSpec(format!(
                "coverage threshold {} outside [0, 1]",
                self.coverage_threshold
            ))
            .into());
        }
        Ok(())
    }

    /// Iterate over full-length windows of `data`.
    ///
    /// Every yielded window has exactly `self.window` samples. The trailing
    /// remainder is zero-padded when `remainder / window >= threshold` and
    /// dropped otherwise; a signal shorter than one window follows the same
    /// rule.
    pub fn iter_windows<'a>(&self, data: &'a [f32]) -> WindowIter<'a> {
        WindowIter {
            data,
            window: self.window,
            coverage_threshold: self.coverage_threshold,
            position: 0,
        }
    }

    /// Number of windows that will be produced for a signal of `len` samples.
    pub fn window_count(&self, len: usize) -> usize {
        let full = len / self.window;
        let remainder = len % self.window;

        if remainder == 0 {
            return full;
        }

        let coverage = remainder as f32 / self.window as f32;
        if coverage >= self.coverage_threshold {
            full + 1
        } else {
            full
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self::new(16000)
    }
}

/// Iterator over fixed-size, zero-padded windows.
pub struct WindowIter<'a> {
    data: &'a [f32],
    window: usize,
    coverage_threshold: f32,
    position: usize,
}

impl Iterator for WindowIter<'_> {
    type Item = Vec<f32>;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.data.len() - self.position;
        if remaining == 0 {
            return None;
        }

        if remaining >= self.window {
            let start = self.position;
            self.position += self.window;
            return Some(self.data[start..start + self.window].to_vec());
        }

        // Trailing short window: pad or drop by coverage
        let coverage = remaining as f32 / self.window as f32;
        let start = self.position;
        self.position = self.data.len();

        if coverage >= self.coverage_threshold {
            let mut padded = self.data[start..].to_vec();
            padded.resize(self.window, 0.0);
            Some(padded)
        } else {
            None
        }
    }
}
