use std::path::Path;

use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};

use crate::audio::beats;
use crate::audio::decode::{self, Waveform};
use crate::audio::features::{AnalysisResult, FeatureFrame};
use crate::audio::synth;
use crate::config::Config;

const EPSILON: f32 = 1e-6;

/// Run the full pipeline on one input file: probe duration, extract the
/// waveform, compute per-frame features, detect beats, freeze the result.
///
/// Never fails. Decode failure degrades to synthetic feature generation so
/// downstream animation always has a stream to sample.
pub fn analyze(input: &Path, fps: u32, config: &Config) -> AnalysisResult {
    let fps = fps.max(1);
    let probed = decode::probe_duration(input, config);
    log::info!("probed duration: {probed:.2}s");

    match decode::extract_waveform(input, config) {
        Ok(waveform) => {
            // Container metadata and decoded audio may disagree when
            // extraction is partial; trust the shorter of the two.
            let duration = probed.min(waveform.duration());
            analyze_waveform(&waveform, fps, duration, config)
        }
        Err(err) => {
            log::warn!("audio extraction failed ({err}), generating synthetic features");
            synth::generate(probed, fps, config)
        }
    }
}

/// Feature extraction and beat detection over an already-decoded waveform.
pub fn analyze_waveform(
    waveform: &Waveform,
    fps: u32,
    duration: f64,
    config: &Config,
) -> AnalysisResult {
    let fps = fps.max(1);
    let raw = extract_windows(&waveform.samples, waveform.sample_rate, fps);

    let cap = (duration * fps as f64).ceil().max(0.0) as usize;
    let total = raw.energy.len().min(cap);

    let percentile = config.analysis.percentile;
    let energy = normalize_channel(&raw.energy[..total], percentile);
    let novelty = normalize_channel(&raw.novelty[..total], percentile);
    let activity = normalize_channel(&raw.activity[..total], percentile);
    let flux = normalize_channel(&raw.flux[..total], percentile);

    let mut beat_list = beats::detect(&energy, &novelty, &flux, &config.detector);
    log::info!("detected {} beats in {} frames", beat_list.len(), total);
    beat_list = beats::enforce_density_floor(beat_list, total, fps, &config.detector);
    let strength = beats::strength_envelope(&beat_list, total);

    let frames = (0..total)
        .map(|i| FeatureFrame {
            index: i as u32,
            energy: energy[i],
            novelty: novelty[i],
            activity: activity[i],
            beat_strength: strength[i],
        })
        .collect();

    AnalysisResult::new(frames, beat_list, duration, fps)
}

/// Raw (un-normalized) per-window feature channels.
pub(crate) struct RawChannels {
    pub energy: Vec<f32>,
    pub novelty: Vec<f32>,
    pub activity: Vec<f32>,
    pub flux: Vec<f32>,
}

/// Slice the waveform into frame-rate-aligned overlapping windows and compute
/// the scalar channels. One window per output video frame: hop = rate / fps,
/// window = 2 * hop.
pub(crate) fn extract_windows(samples: &[f32], sample_rate: u32, fps: u32) -> RawChannels {
    let hop = ((sample_rate / fps.max(1)) as usize).max(1);
    let window = hop * 2;
    let count = samples.len() / hop;

    if count == 0 {
        return RawChannels {
            energy: Vec::new(),
            novelty: Vec::new(),
            activity: Vec::new(),
            flux: Vec::new(),
        };
    }

    let hann = hann_window(window);

    // Windows are independent; spectra are collected in order and the flux
    // post-pass runs sequentially over consecutive pairs.
    let per_window: Vec<(f32, f32, f32, Vec<f32>)> = (0..count)
        .into_par_iter()
        .map(|idx| {
            let start = idx * hop;
            let end = (start + window).min(samples.len());
            let slice = &samples[start..end];
            (
                rms(slice),
                mean_abs_diff(slice),
                zero_crossing_rate(slice),
                magnitude_spectrum(slice, window, &hann),
            )
        })
        .collect();

    let mut energy = Vec::with_capacity(count);
    let mut novelty = Vec::with_capacity(count);
    let mut activity = Vec::with_capacity(count);
    let mut flux = Vec::with_capacity(count);

    let mut prev_spectrum: Option<&Vec<f32>> = None;
    for (e, n, a, spectrum) in &per_window {
        energy.push(*e);
        novelty.push(*n);
        activity.push(*a);
        flux.push(match prev_spectrum {
            Some(prev) => spectral_flux(spectrum, prev),
            None => 0.0,
        });
        prev_spectrum = Some(spectrum);
    }

    RawChannels {
        energy,
        novelty,
        activity,
        flux,
    }
}

/// Root-mean-square amplitude; loudness proxy.
pub(crate) fn rms(window: &[f32]) -> f32 {
    if window.is_empty() {
        return 0.0;
    }
    (window.iter().map(|s| s * s).sum::<f32>() / window.len() as f32).sqrt()
}

/// Mean absolute first difference; cheap brightness/transient proxy.
pub(crate) fn mean_abs_diff(window: &[f32]) -> f32 {
    if window.len() < 2 {
        return 0.0;
    }
    window.windows(2).map(|p| (p[1] - p[0]).abs()).sum::<f32>() / (window.len() - 1) as f32
}

pub(crate) fn zero_crossing_rate(window: &[f32]) -> f32 {
    if window.len() < 2 {
        return 0.0;
    }
    let crossings = window
        .windows(2)
        .filter(|p| (p[0] >= 0.0) != (p[1] >= 0.0))
        .count();
    crossings as f32 / (window.len() - 1) as f32
}

fn magnitude_spectrum(slice: &[f32], size: usize, hann: &[f32]) -> Vec<f32> {
    if size < 2 {
        return Vec::new();
    }

    let mut buffer: Vec<Complex<f32>> = vec![Complex::new(0.0, 0.0); size];
    for (i, &s) in slice.iter().enumerate() {
        buffer[i] = Complex::new(s * hann[i], 0.0);
    }

    // Planner per window keeps this closure rayon-safe
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(size);
    fft.process(&mut buffer);

    buffer[..size / 2].iter().map(|c| c.norm()).collect()
}

/// Mean squared magnitude difference between consecutive windows' spectra.
fn spectral_flux(current: &[f32], previous: &[f32]) -> f32 {
    if current.is_empty() || current.len() != previous.len() {
        return 0.0;
    }
    current
        .iter()
        .zip(previous)
        .map(|(c, p)| {
            let d = c - p;
            d * d
        })
        .sum::<f32>()
        / current.len() as f32
}

/// Rescale a non-negative channel into [0,1] by its percentile value,
/// clamping outliers to 1. A degenerate (silent/constant) channel normalizes
/// to all-zero, never NaN.
pub(crate) fn normalize_channel(values: &[f32], percentile: f32) -> Vec<f32> {
    if values.is_empty() {
        return Vec::new();
    }

    let mut sorted: Vec<f32> = values
        .iter()
        .map(|&v| if v.is_finite() { v.max(0.0) } else { 0.0 })
        .collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = ((sorted.len() - 1) as f32 * percentile.clamp(0.0, 1.0)).round() as usize;
    let denom = sorted[rank];
    if denom <= EPSILON {
        return vec![0.0; values.len()];
    }

    values
        .iter()
        .map(|&v| {
            if v.is_finite() {
                (v / denom).clamp(0.0, 1.0)
            } else {
                0.0
            }
        })
        .collect()
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, amplitude: f32, sample_rate: u32, seconds: f32) -> Vec<f32> {
        let n = (sample_rate as f32 * seconds) as usize;
        (0..n)
            .map(|i| {
                amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin()
            })
            .collect()
    }

    #[test]
    fn rms_of_constant_signal() {
        let window = vec![0.5f32; 100];
        assert!((rms(&window) - 0.5).abs() < 1e-6);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn rms_of_sine_approaches_peak_over_sqrt2() {
        let samples = sine(440.0, 0.8, 44100, 1.0);
        let expected = 0.8 / 2.0f32.sqrt();
        assert!((rms(&samples) - expected).abs() < 0.01);
    }

    #[test]
    fn mean_abs_diff_flat_is_zero() {
        assert_eq!(mean_abs_diff(&[0.3; 50]), 0.0);
        assert_eq!(mean_abs_diff(&[0.3]), 0.0);
    }

    #[test]
    fn zero_crossing_rate_of_alternating_signal() {
        let window: Vec<f32> = (0..100).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
        assert!((zero_crossing_rate(&window) - 1.0).abs() < 1e-6);
        assert_eq!(zero_crossing_rate(&[0.5; 10]), 0.0);
    }

    #[test]
    fn one_window_per_output_frame() {
        // 300 Hz at 30 fps: hop 10, window 20
        let samples = vec![0.1f32; 100];
        let raw = extract_windows(&samples, 300, 30);
        assert_eq!(raw.energy.len(), 10);
        assert_eq!(raw.novelty.len(), 10);
        assert_eq!(raw.activity.len(), 10);
        assert_eq!(raw.flux.len(), 10);
    }

    #[test]
    fn short_waveform_yields_no_windows() {
        let raw = extract_windows(&[0.1; 3], 300, 30);
        assert!(raw.energy.is_empty());
    }

    #[test]
    fn silent_waveform_extracts_zeros() {
        let samples = vec![0.0f32; 3000];
        let raw = extract_windows(&samples, 300, 30);
        assert!(raw.energy.iter().all(|&e| e == 0.0));
        assert!(raw.flux.iter().all(|&f| f == 0.0));
    }

    #[test]
    fn first_window_has_zero_flux() {
        let samples = sine(50.0, 0.5, 300, 2.0);
        let raw = extract_windows(&samples, 300, 30);
        assert_eq!(raw.flux[0], 0.0);
    }

    #[test]
    fn normalize_scales_to_unit_range() {
        let values: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let normalized = normalize_channel(&values, 0.95);
        assert!(normalized.iter().all(|v| (0.0..=1.0).contains(v)));
        assert_eq!(*normalized.last().unwrap(), 1.0);
    }

    #[test]
    fn normalize_resists_outliers() {
        let mut values = vec![1.0f32; 99];
        values.push(1000.0);
        let normalized = normalize_channel(&values, 0.95);
        // Percentile denominator ignores the spike: ordinary values stay high
        assert!((normalized[0] - 1.0).abs() < 1e-6);
        assert_eq!(*normalized.last().unwrap(), 1.0);
    }

    #[test]
    fn normalize_degenerate_channel_is_all_zero() {
        let normalized = normalize_channel(&[0.0; 50], 0.95);
        assert!(normalized.iter().all(|&v| v == 0.0));
        assert!(normalized.iter().all(|v| v.is_finite()));
        assert!(normalize_channel(&[], 0.95).is_empty());
    }

    #[test]
    fn normalize_never_emits_nan() {
        let values = [f32::NAN, f32::INFINITY, 1.0, 0.5];
        let normalized = normalize_channel(&values, 0.95);
        assert!(normalized.iter().all(|v| v.is_finite()));
    }
}
