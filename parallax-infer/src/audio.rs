//! Audio loading and preprocessing utilities.

use crate::error::{PreprocessError, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use ndarray::Array2;
use std::f32::consts::PI;
use std::path::Path;

/// In-memory audio asset: interleaved samples plus format metadata.
///
/// Immutable once loaded; preprocessing produces new buffers.
#[derive(Clone, Debug)]
pub struct AudioBuffer {
    /// Interleaved f32 samples in [-1, 1]
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Target audio specification a preprocessor must satisfy exactly.
#[derive(Clone, Copy, Debug)]
pub struct AudioSpec {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioBuffer {
    /// Load audio from a WAV file at its native rate and channel layout.
    pub fn from_wav(path: impl AsRef<Path>) -> Result<Self> {
        let mut reader = WavReader::open(path)?;
        let spec = reader.spec();

        let samples: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader.samples::<f32>().collect::<hound::Result<_>>()?,
            SampleFormat::Int => reader
                .samples::<i16>()
                .map(|s| s.map(|s| s as f32 / i16::MAX as f32))
                .collect::<hound::Result<_>>()?,
        };

        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
        })
    }

    /// Write the buffer as a 16-bit PCM WAV file.
    pub fn to_wav(&self, path: impl AsRef<Path>) -> Result<()> {
        let spec = WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        let mut writer = WavWriter::create(path, spec)?;
        for &sample in &self.samples {
            let v = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
            writer.write_sample(v)?;
        }
        writer.finalize()?;

        Ok(())
    }

    /// Number of sample frames (samples per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f32 {
        self.frames() as f32 / self.sample_rate as f32
    }

    /// Conform the buffer to a target spec: fold or duplicate channels, then
    /// resample to the target rate.
    ///
    /// Mono is duplicated to stereo, stereo averaged to mono. Zero or more
    /// than two channels are rejected.
    pub fn conform(&self, spec: AudioSpec) -> Result<AudioBuffer> {
        if self.channels == 0 || self.channels > 2 || spec.channels == 0 || spec.channels > 2 {
            let got = if self.channels == 0 || self.channels > 2 {
                self.channels
            } else {
                spec.channels
            };
            return Err(PreprocessError::InvalidChannels(got).into());
        }

        let mono: Vec<f32> = match self.channels {
            2 => self
                .samples
                .chunks(2)
                .map(|pair| pair.iter().sum::<f32>() / pair.len() as f32)
                .collect(),
            _ => self.samples.clone(),
        };

        let resampled = resample(&mono, self.sample_rate, spec.sample_rate);

        let samples = match spec.channels {
            2 => resampled.iter().flat_map(|&s| [s, s]).collect(),
            _ => resampled,
        };

        Ok(AudioBuffer {
            samples,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
        })
    }
}

/// Linear-interpolation resampler.
///
/// Output length is `round(len * to / from)`; endpoints are preserved.
pub fn resample(samples: &[f32], from_hz: u32, to_hz: u32) -> Vec<f32> {
    if from_hz == to_hz || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = to_hz as f64 / from_hz as f64;
    let out_len = ((samples.len() as f64) * ratio).round() as usize;
    let step = samples.len() as f64 / out_len as f64;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = pos as usize;
            let frac = (pos - idx as f64) as f32;

            let a = samples[idx.min(samples.len() - 1)];
            let b = samples[(idx + 1).min(samples.len() - 1)];
            a + (b - a) * frac
        })
        .collect()
}

/// Trim leading and trailing samples below a dB-full-scale threshold.
///
/// Used when preparing reference embeddings; returns an empty slice when the
/// whole signal is below the threshold.
pub fn trim_silence(samples: &[f32], threshold_db: f32) -> &[f32] {
    let amplitude = 10.0_f32.powf(threshold_db / 20.0);

    let start = samples.iter().position(|s| s.abs() >= amplitude);
    let end = samples.iter().rposition(|s| s.abs() >= amplitude);

    match (start, end) {
        (Some(start), Some(end)) => &samples[start..=end],
        _ => &[],
    }
}

/// Mel-spectrogram feature extractor.
///
/// Converts mono audio into mel features for reference embeddings.
#[derive(Clone, Debug)]
pub struct MelSpectrogram {
    pub n_mels: usize,
    pub hop_length: usize,
    pub n_fft: usize,
    pub preemphasis: f32,
    pub sample_rate: usize,
    pub win_length: usize,
}

impl MelSpectrogram {
    /// 16kHz reference-embedding extractor (80 mel features).
    pub const REFERENCE: Self = Self {
        n_mels: 80,
        hop_length: 160,
        n_fft: 512,
        preemphasis: 0.97,
        sample_rate: 16000,
        win_length: 400,
    };

    /// Apply mel-spectrogram extraction to mono audio samples.
    ///
    /// Returns a 2D array of features `(time_steps, n_mels)`. The signal must
    /// cover at least one analysis window.
    pub fn apply(&self, audio: &[f32]) -> Result<Array2<f32>> {
        if audio.len() < self.win_length {
            return Err(PreprocessError::ShapeMismatch {
                expected: vec![self.win_length],
                got: vec![audio.len()],
            }
            .into());
        }
        Ok(mel_spectrogram(audio, self))
    }
}

/// Apply preemphasis filter to audio signal.
///
/// Enhances high frequencies by applying: `y[i] = x[i] - coef * x[i-1]`
fn apply_preemphasis(audio: &[f32], coef: f32) -> Vec<f32> {
    let mut result = Vec::with_capacity(audio.len());
    result.push(audio[0]);

    for i in 1..audio.len() {
        result.push(audio[i] - coef * audio[i - 1]);
    }

    result
}

/// Create Hann window for STFT.
fn hann_window(window_length: usize) -> Vec<f32> {
    (0..window_length)
        .map(|i| 0.5 - 0.5 * ((2.0 * PI * i as f32) / (window_length as f32 - 1.0)).cos())
        .collect()
}

/// Compute Short-Time Fourier Transform (STFT) power spectrogram.
fn stft(audio: &[f32], n_fft: usize, hop_length: usize, win_length: usize) -> Array2<f32> {
    use rustfft::{FftPlanner, num_complex::Complex};

    let window = hann_window(win_length);
    let num_frames = (audio.len() - win_length) / hop_length + 1;
    let freq_bins = n_fft / 2 + 1;
    let mut spectrogram = Array2::<f32>::zeros((freq_bins, num_frames));

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n_fft);

    for frame_idx in 0..num_frames {
        let start = frame_idx * hop_length;

        let mut frame: Vec<Complex<f32>> = vec![Complex::new(0.0, 0.0); n_fft];
        for i in 0..win_length.min(audio.len() - start) {
            frame[i] = Complex::new(audio[start + i] * window[i], 0.0);
        }

        fft.process(&mut frame);

        for k in 0..freq_bins {
            let magnitude = frame[k].norm();
            spectrogram[[k, frame_idx]] = magnitude * magnitude;
        }
    }

    spectrogram
}

/// Convert frequency in Hz to mel scale.
fn hz_to_mel(freq: f32) -> f32 {
    2595.0 * (1.0 + freq / 700.0).log10()
}

/// Convert mel scale to frequency in Hz.
fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0_f32.powf(mel / 2595.0) - 1.0)
}

/// Create mel filterbank for converting STFT to mel spectrogram.
fn create_mel_filterbank(n_fft: usize, n_mels: usize, sample_rate: usize) -> Array2<f32> {
    let freq_bins = n_fft / 2 + 1;
    let mut filterbank = Array2::<f32>::zeros((n_mels, freq_bins));

    let min_mel = hz_to_mel(0.0);
    let max_mel = hz_to_mel(sample_rate as f32 / 2.0);

    let mel_points: Vec<f32> = (0..=n_mels + 1)
        .map(|i| mel_to_hz(min_mel + (max_mel - min_mel) * i as f32 / (n_mels + 1) as f32))
        .collect();

    let freq_bin_width = sample_rate as f32 / n_fft as f32;

    for mel_idx in 0..n_mels {
        let left = mel_points[mel_idx];
        let center = mel_points[mel_idx + 1];
        let right = mel_points[mel_idx + 2];

        for freq_idx in 0..freq_bins {
            let freq = freq_idx as f32 * freq_bin_width;

            if freq >= left && freq <= center {
                filterbank[[mel_idx, freq_idx]] = (freq - left) / (center - left);
            } else if freq > center && freq <= right {
                filterbank[[mel_idx, freq_idx]] = (right - freq) / (right - center);
            }
        }
    }

    filterbank
}

/// Extract mel-spectrogram features from audio samples.
///
/// Performs the complete chain: preemphasis, STFT power spectrogram, mel
/// filterbank, log compression, per-feature mean-variance normalization.
fn mel_spectrogram(audio: &[f32], config: &MelSpectrogram) -> Array2<f32> {
    let audio = apply_preemphasis(audio, config.preemphasis);

    let spectrogram = stft(&audio, config.n_fft, config.hop_length, config.win_length);

    let mel_filterbank = create_mel_filterbank(config.n_fft, config.n_mels, config.sample_rate);
    let mel_spectrogram = mel_filterbank.dot(&spectrogram);
    let mel_spectrogram = mel_spectrogram.mapv(|x| (x.max(1e-10)).ln());

    let mut mel_spectrogram = mel_spectrogram.t().to_owned();

    // Normalize each feature dimension to mean=0, std=1
    let num_frames = mel_spectrogram.shape()[0];
    let num_features = mel_spectrogram.shape()[1];

    for feat_idx in 0..num_features {
        let mut column = mel_spectrogram.column_mut(feat_idx);
        let mean: f32 = column.iter().sum::<f32>() / num_frames as f32;
        let variance: f32 =
            column.iter().map(|&x| (x - mean).powi(2)).sum::<f32>() / num_frames as f32;
        let std = variance.sqrt().max(1e-10);

        for val in column.iter_mut() {
            *val = (*val - mean) / std;
        }
    }

    mel_spectrogram
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_test_wav(
        path: &Path,
        sample_rate: u32,
        channels: u16,
        samples: &[f32],
    ) -> hound::Result<()> {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec)?;
        for &sample in samples {
            writer.write_sample((sample * 32767.0) as i16)?;
        }
        writer.finalize()?;
        Ok(())
    }

    #[test]
    fn loads_wav_at_native_rate() {
        let path = std::env::temp_dir().join("parallax_load.wav");
        write_test_wav(&path, 44100, 1, &[0.1, 0.2, 0.3]).unwrap();

        let buffer = AudioBuffer::from_wav(&path).unwrap();

        assert_eq!(buffer.sample_rate, 44100);
        assert_eq!(buffer.channels, 1);
        assert_eq!(buffer.frames(), 3);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn conform_folds_stereo_to_mono() {
        let buffer = AudioBuffer {
            samples: vec![0.2, 0.4, 0.6, 0.8],
            sample_rate: 16000,
            channels: 2,
        };

        let spec = AudioSpec {
            sample_rate: 16000,
            channels: 1,
        };
        let out = buffer.conform(spec).unwrap();

        assert_eq!(out.channels, 1);
        assert_eq!(out.samples.len(), 2);
        assert!((out.samples[0] - 0.3).abs() < 1e-6);
        assert!((out.samples[1] - 0.7).abs() < 1e-6);
    }

    #[test]
    fn conform_duplicates_mono_to_stereo() {
        let buffer = AudioBuffer {
            samples: vec![0.5, -0.5],
            sample_rate: 8000,
            channels: 1,
        };

        let spec = AudioSpec {
            sample_rate: 8000,
            channels: 2,
        };
        let out = buffer.conform(spec).unwrap();

        assert_eq!(out.samples, vec![0.5, 0.5, -0.5, -0.5]);
    }

    #[test]
    fn conform_rejects_invalid_channels() {
        let buffer = AudioBuffer {
            samples: vec![0.0; 12],
            sample_rate: 16000,
            channels: 6,
        };

        let spec = AudioSpec {
            sample_rate: 16000,
            channels: 1,
        };
        let result = buffer.conform(spec);

        assert!(result.is_err());
        if let Err(e) = result {
            assert!(matches!(e, crate::error::Error::Preprocess(_)));
        }
    }

    #[test]
    fn resample_halves_and_doubles_length() {
        let samples: Vec<f32> = (0..100).map(|i| i as f32 / 100.0).collect();

        let down = resample(&samples, 16000, 8000);
        assert_eq!(down.len(), 50);

        let up = resample(&samples, 8000, 16000);
        assert_eq!(up.len(), 200);

        // monotone input stays monotone under linear interpolation
        assert!(up.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn resample_same_rate_is_identity() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(resample(&samples, 16000, 16000), samples);
    }

    #[test]
    fn trims_silence_at_both_ends() {
        let mut samples = vec![0.0001; 10];
        samples.extend([0.5, 0.4, 0.5]);
        samples.extend(vec![0.0001; 10]);

        let trimmed = trim_silence(&samples, -40.0);
        assert_eq!(trimmed, &[0.5, 0.4, 0.5]);
    }

    #[test]
    fn trims_all_silent_signal_to_empty() {
        let samples = vec![0.0001; 32];
        assert!(trim_silence(&samples, -40.0).is_empty());
    }

    #[test]
    fn mel_features_have_expected_shape() {
        let config = MelSpectrogram::REFERENCE;
        // one second of a 440Hz tone at 16kHz
        let audio: Vec<f32> = (0..16000)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / 16000.0).sin())
            .collect();

        let features = config.apply(&audio).unwrap();

        let expected_frames = (audio.len() - config.win_length) / config.hop_length + 1;
        assert_eq!(features.shape(), &[expected_frames, config.n_mels]);
    }

    #[test]
    fn mel_rejects_signal_shorter_than_window() {
        let config = MelSpectrogram::REFERENCE;
        let audio = vec![0.0; config.win_length - 1];

        assert!(config.apply(&audio).is_err());
    }

    #[test]
    fn wav_roundtrip_preserves_duration() {
        let path = std::env::temp_dir().join("parallax_roundtrip.wav");
        let buffer = AudioBuffer {
            samples: (0..800).map(|i| (i as f32 / 800.0) - 0.5).collect(),
            sample_rate: 8000,
            channels: 1,
        };

        buffer.to_wav(&path).unwrap();
        let loaded = AudioBuffer::from_wav(&path).unwrap();

        assert_eq!(loaded.frames(), buffer.frames());
        assert_eq!(loaded.sample_rate, 8000);

        std::fs::remove_file(path).ok();
    }
}
