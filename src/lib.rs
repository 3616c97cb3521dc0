//! Frame-quantized audio feature extraction and beat detection.
//!
//! Decodes a video's soundtrack into a mono waveform, computes one
//! energy/brightness feature record per output video frame, detects beat
//! events with adaptive thresholds, and freezes everything into a read-only
//! [`AnalysisResult`] that downstream animators sample once per frame.
//!
//! The pipeline never fails: if audio extraction is impossible, a synthetic,
//! musically-plausible feature stream is generated instead.

pub mod audio;
pub mod config;
pub mod error;

pub use audio::analysis::{analyze, analyze_waveform};
pub use audio::decode::Waveform;
pub use audio::features::{AnalysisResult, FeatureFrame};
pub use config::Config;
