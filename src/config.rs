use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Default, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub tools: ToolConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// Sample rate requested from the external decoder
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Percentile used as the normalization denominator per feature channel
    #[serde(default = "default_percentile")]
    pub percentile: f32,
    /// Seed for the synthetic fallback generator; entropy-seeded when unset
    #[serde(default)]
    pub synth_seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    /// Floor below which no energy peak qualifies, regardless of local stats
    #[serde(default = "default_base_threshold")]
    pub base_threshold: f32,
    /// Std-dev multiplier for the local adaptive energy threshold
    #[serde(default = "default_energy_k")]
    pub energy_k: f32,
    /// Std-dev multiplier for the global novelty corroboration gate
    #[serde(default = "default_novelty_k")]
    pub novelty_k: f32,
    /// Std-dev multiplier for the global spectral-flux corroboration gate
    #[serde(default = "default_flux_k")]
    pub flux_k: f32,
    /// Half-width (frames) of the sliding window for local energy stats
    #[serde(default = "default_local_window")]
    pub local_window: usize,
    /// Half-width (frames) of the local-maximum confirmation window
    #[serde(default = "default_confirm_window")]
    pub confirm_window: usize,
    /// Minimum frames between accepted beats
    #[serde(default = "default_min_beat_gap")]
    pub min_beat_gap: usize,
    /// Guaranteed minimum beat rate (beats per second) after backfill
    #[serde(default = "default_min_density")]
    pub min_density: f32,
    /// Required energy ratio over the previous frame for a beat
    #[serde(default = "default_rise_ratio")]
    pub rise_ratio: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
    #[serde(default = "default_ffprobe")]
    pub ffprobe: String,
    /// Bound on each external tool invocation, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            percentile: default_percentile(),
            synth_seed: None,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            base_threshold: default_base_threshold(),
            energy_k: default_energy_k(),
            novelty_k: default_novelty_k(),
            flux_k: default_flux_k(),
            local_window: default_local_window(),
            confirm_window: default_confirm_window(),
            min_beat_gap: default_min_beat_gap(),
            min_density: default_min_density(),
            rise_ratio: default_rise_ratio(),
        }
    }
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_sample_rate() -> u32 { 44100 }
fn default_percentile() -> f32 { 0.95 }
fn default_base_threshold() -> f32 { 0.1 }
fn default_energy_k() -> f32 { 0.5 }
fn default_novelty_k() -> f32 { 0.3 }
fn default_flux_k() -> f32 { 0.4 }
fn default_local_window() -> usize { 20 }
fn default_confirm_window() -> usize { 3 }
fn default_min_beat_gap() -> usize { 6 }
fn default_min_density() -> f32 { 0.5 }
fn default_rise_ratio() -> f32 { 1.2 }
fn default_ffmpeg() -> String { "ffmpeg".into() }
fn default_ffprobe() -> String { "ffprobe".into() }
fn default_timeout_secs() -> u64 { 30 }

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.analysis.sample_rate, 44100);
        assert_eq!(cfg.detector.min_beat_gap, 6);
        assert_eq!(cfg.tools.ffmpeg, "ffmpeg");
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let cfg: Config = toml::from_str(
            "[detector]\nmin_beat_gap = 10\n\n[tools]\nffmpeg = \"/opt/ffmpeg\"\n",
        )
        .unwrap();
        assert_eq!(cfg.detector.min_beat_gap, 10);
        assert_eq!(cfg.detector.local_window, 20);
        assert_eq!(cfg.tools.ffmpeg, "/opt/ffmpeg");
        assert_eq!(cfg.tools.ffprobe, "ffprobe");
    }

    #[test]
    fn seed_roundtrip() {
        let cfg: Config = toml::from_str("[analysis]\nsynth_seed = 42\n").unwrap();
        assert_eq!(cfg.analysis.synth_seed, Some(42));
    }
}
