//! Video clip loading and preprocessing.
//!
//! Clips are loaded from a directory of frame images (sorted by file name).
//! Preprocessing scales the shorter side, center-crops to a square,
//! normalizes with fixed per-channel statistics, lays the data out as
//! `(C, T, H, W)`, and subsamples the temporal axis to an exact frame count.
//! A coarser stride-alpha subsample derives the slow pathway from the fast.

use crate::error::{AssetError, PreprocessError, Result};
use image::RgbImage;
use image::imageops::{self, FilterType};
use ndarray::{Array4, Axis, s};
use std::path::Path;

/// Decoded video frames plus frame-rate metadata.
///
/// Immutable once loaded; owned by the pipeline invocation that loaded it.
#[derive(Clone, Debug)]
pub struct VideoClip {
    pub frames: Vec<RgbImage>,
    pub fps: f32,
}

impl VideoClip {
    pub fn new(frames: Vec<RgbImage>, fps: f32) -> Self {
        Self { frames, fps }
    }

    /// Load a clip from a directory of frame images, sorted by file name.
    ///
    /// Recognizes `.png`, `.jpg`, and `.jpeg` files; other entries are
    /// ignored. Fails when the directory holds no frames.
    pub fn from_frame_dir(dir: impl AsRef<Path>, fps: f32) -> Result<Self> {
        let dir = dir.as_ref();

        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| {
                        matches!(ext.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg")
                    })
            })
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(AssetError::Unavailable(format!(
                "no frame images in {}",
                dir.display()
            ))
            .into());
        }

        let mut frames = Vec::with_capacity(paths.len());
        for path in &paths {
            frames.push(image::open(path)?.to_rgb8());
        }

        tracing::debug!(dir = ?dir.display(), frames = frames.len(), "loaded clip");
        Ok(Self::new(frames, fps))
    }

    pub fn duration_secs(&self) -> f32 {
        self.frames.len() as f32 / self.fps
    }
}

/// Target specification for clip preprocessing.
#[derive(Clone, Debug)]
pub struct ClipSpec {
    /// Square crop side; the shorter spatial side is scaled to this first
    pub side: u32,
    /// Exact frame count of the fast pathway
    pub frames: usize,
    /// Per-channel normalization mean
    pub mean: [f32; 3],
    /// Per-channel normalization std
    pub std: [f32; 3],
    /// Temporal stride deriving the slow pathway from the fast
    pub slow_alpha: usize,
}

impl Default for ClipSpec {
    fn default() -> Self {
        Self {
            side: 256,
            frames: 32,
            mean: [0.45, 0.45, 0.45],
            std: [0.225, 0.225, 0.225],
            slow_alpha: 4,
        }
    }
}

impl ClipSpec {
    /// Expected fast-pathway tensor shape `(C, T, H, W)`.
    pub fn fast_shape(&self) -> [usize; 4] {
        [3, self.frames, self.side as usize, self.side as usize]
    }

    /// Expected slow-pathway tensor shape.
    pub fn slow_shape(&self) -> [usize; 4] {
        [
            3,
            self.frames / self.slow_alpha,
            self.side as usize,
            self.side as usize,
        ]
    }

    pub fn validate(&self) -> Result<()> {
        if self.side == 0 || self.frames == 0 {
            return Err(
                PreprocessError::InvalidSpec("zero crop side or frame count".to_string()).into(),
            );
        }
        if self.slow_alpha == 0 || self.frames % self.slow_alpha != 0 {
            return Err(PreprocessError::InvalidSpec(format!(
                "slow_alpha {} must divide frame count {}",
                self.slow_alpha, self.frames
            ))
            .into());
        }
        Ok(())
    }
}

/// Evenly spaced index picks covering `0..len`, `count` of them.
///
/// Indices repeat when the clip has fewer frames than requested.
pub fn linspace_indices(len: usize, count: usize) -> Vec<usize> {
    if len == 0 || count == 0 {
        return Vec::new();
    }
    if count == 1 {
        return vec![0];
    }

    (0..count)
        .map(|i| {
            let pos = i as f64 * (len - 1) as f64 / (count - 1) as f64;
            pos.round() as usize
        })
        .collect()
}

/// Preprocess a clip into the fast-pathway tensor `(C, T, H, W)`.
///
/// The output shape is exactly `spec.fast_shape()` or the call fails.
pub fn preprocess_clip(clip: &VideoClip, spec: &ClipSpec) -> Result<Array4<f32>> {
    spec.validate()?;

    if clip.frames.is_empty() {
        return Err(PreprocessError::EmptyClip.into());
    }

    let side = spec.side as usize;
    let indices = linspace_indices(clip.frames.len(), spec.frames);
    let mut tensor = Array4::<f32>::zeros((3, spec.frames, side, side));

    for (t, &index) in indices.iter().enumerate() {
        let cropped = scale_and_crop(&clip.frames[index], spec.side);

        for y in 0..side {
            for x in 0..side {
                let pixel = cropped.get_pixel(x as u32, y as u32).0;
                for c in 0..3 {
                    let value = pixel[c] as f32 / 255.0;
                    tensor[[c, t, y, x]] = (value - spec.mean[c]) / spec.std[c];
                }
            }
        }
    }

    debug_assert_eq!(tensor.shape(), spec.fast_shape());
    Ok(tensor)
}

/// Scale the shorter side to `side` preserving aspect ratio (nearest
/// interpolation), then center-crop to `side x side`.
fn scale_and_crop(frame: &RgbImage, side: u32) -> RgbImage {
    let (w, h) = frame.dimensions();

    let (new_w, new_h) = if w <= h {
        (side, (h as f64 * side as f64 / w as f64).round() as u32)
    } else {
        ((w as f64 * side as f64 / h as f64).round() as u32, side)
    };

    let scaled = imageops::resize(frame, new_w.max(side), new_h.max(side), FilterType::Nearest);

    let x0 = (scaled.width() - side) / 2;
    let y0 = (scaled.height() - side) / 2;
    imageops::crop_imm(&scaled, x0, y0, side, side).to_image()
}

/// Derive the slow pathway by striding the fast tensor's temporal axis.
///
/// Same spatial content, `frames / alpha` time steps.
pub fn slow_pathway(fast: &Array4<f32>, alpha: usize) -> Result<Array4<f32>> {
    if alpha == 0 {
        return Err(PreprocessError::InvalidSpec("slow_alpha is zero".to_string()).into());
    }

    Ok(fast.slice(s![.., ..;alpha, .., ..]).to_owned())
}

/// Undo normalization and cast a `(C, H, W)` slice back to 8-bit pixels.
///
/// Inverse of the preprocessing transform for a single time step; values are
/// clipped to the storage range.
pub fn frame_to_image(fast: &Array4<f32>, t: usize, spec: &ClipSpec) -> Result<RgbImage> {
    let side = spec.side as usize;
    if t >= fast.len_of(Axis(1)) {
        return Err(PreprocessError::ShapeMismatch {
            expected: vec![fast.len_of(Axis(1))],
            got: vec![t],
        }
        .into());
    }

    let mut image = RgbImage::new(spec.side, spec.side);
    for y in 0..side {
        for x in 0..side {
            let mut pixel = [0u8; 3];
            for c in 0..3 {
                let value = fast[[c, t, y, x]] * spec.std[c] + spec.mean[c];
                pixel[c] = (value * 255.0).round().clamp(0.0, 255.0) as u8;
            }
            image.put_pixel(x as u32, y as u32, image::Rgb(pixel));
        }
    }

    Ok(image)
}
