use serde::Serialize;

/// One frame-quantized record of the motion-control stream.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct FeatureFrame {
    pub index: u32,
    /// RMS loudness, normalized (0.0-1.0)
    pub energy: f32,
    /// Brightness / transient proxy, normalized (0.0-1.0)
    pub novelty: f32,
    /// Zero-crossing activity, normalized (0.0-1.0)
    pub activity: f32,
    /// Soft envelope around confirmed beats, 1.0 on the beat frame
    pub beat_strength: f32,
}

impl FeatureFrame {
    pub(crate) fn silent(index: u32) -> Self {
        Self {
            index,
            energy: 0.0,
            novelty: 0.0,
            activity: 0.0,
            beat_strength: 0.0,
        }
    }
}

/// Frozen output of one pipeline run: the per-frame feature table, the beat
/// index list, and the analyzed duration. Immutable after construction and
/// safe to share read-only across render workers.
#[derive(Clone, Debug, Serialize)]
pub struct AnalysisResult {
    frames: Vec<FeatureFrame>,
    beats: Vec<u32>,
    duration: f64,
    fps: u32,
}

impl AnalysisResult {
    pub(crate) fn new(frames: Vec<FeatureFrame>, beats: Vec<u32>, duration: f64, fps: u32) -> Self {
        debug_assert!(frames.iter().enumerate().all(|(i, f)| f.index as usize == i));
        debug_assert!(beats.windows(2).all(|w| w[0] < w[1]));
        Self {
            frames,
            beats,
            duration,
            fps: fps.max(1),
        }
    }

    pub fn frames(&self) -> &[FeatureFrame] {
        &self.frames
    }

    /// Confirmed beat frame indices, strictly increasing.
    pub fn beats(&self) -> &[u32] {
        &self.beats
    }

    /// Analyzed duration in seconds.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn total_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn is_beat(&self, index: usize) -> bool {
        u32::try_from(index).map_or(false, |i| self.beats.binary_search(&i).is_ok())
    }

    /// Features at an output frame index, plus whether a beat fires there.
    ///
    /// Indices past the analyzed range return the last record with every
    /// channel zeroed so consumers keep animating through audio-less tails.
    pub fn feature_at_frame(&self, index: usize) -> (FeatureFrame, bool) {
        let Some(&last) = self.frames.last() else {
            return (FeatureFrame::silent(0), false);
        };
        if index >= self.frames.len() {
            return (FeatureFrame::silent(last.index), false);
        }
        (self.frames[index], self.is_beat(index))
    }

    /// Features at a time in seconds: `index = round(t * fps)`, clamped.
    pub fn feature_at_time(&self, seconds: f64) -> (FeatureFrame, bool) {
        if self.frames.is_empty() {
            return (FeatureFrame::silent(0), false);
        }
        let raw = (seconds * self.fps as f64).round();
        let index = if raw.is_finite() && raw > 0.0 {
            (raw as usize).min(self.frames.len() - 1)
        } else {
            0
        };
        self.feature_at_frame(index)
    }
}
