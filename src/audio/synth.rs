use std::f32::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::audio::beats;
use crate::audio::features::{AnalysisResult, FeatureFrame};
use crate::config::Config;

/// Minimum frames between probabilistically sampled beats.
const SYNTH_BEAT_GAP: usize = 8;

/// Generate a musically-plausible feature stream when audio extraction is
/// impossible: superposed low-frequency sinusoids at a randomly chosen base
/// tempo plus noise, and tempo-locked probabilistic beats.
///
/// Seeding from `analysis.synth_seed` makes the fallback deterministic.
pub(crate) fn generate(duration: f64, fps: u32, config: &Config) -> AnalysisResult {
    let fps = fps.max(1);
    let mut rng = match config.analysis.synth_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let total = (duration.max(0.0) * fps as f64) as usize;
    let base_tempo: f32 = rng.gen_range(0.4..0.8); // Hz
    log::info!(
        "synthesizing {total} frames at {fps} fps, base tempo {base_tempo:.2} Hz"
    );

    let mut energy = Vec::with_capacity(total);
    let mut novelty = Vec::with_capacity(total);
    let mut activity = Vec::with_capacity(total);
    let mut beat_list: Vec<u32> = Vec::new();

    let period = (fps as f32 / base_tempo) as usize;

    for i in 0..total {
        let t = i as f32 / fps as f32;
        let bass = 0.6 * (t * base_tempo * 2.0 * PI).sin();
        let mid = 0.3 * (t * base_tempo * 4.0 * PI + PI / 3.0).sin();
        let high = 0.2 * (t * base_tempo * 8.0 * PI + PI / 2.0).sin();
        let noise = 0.1 * rng.gen::<f32>();

        energy.push((0.4 + bass + mid + high + noise).clamp(0.0, 1.0));
        novelty.push((0.5 + 2.0 * high + noise).clamp(0.0, 1.0));
        activity.push((0.3 + mid + 0.4 * rng.gen::<f32>()).clamp(0.0, 1.0));

        let gap_ok = beat_list
            .last()
            .map_or(true, |&b| i - b as usize >= SYNTH_BEAT_GAP);
        if gap_ok && rng.gen::<f32>() < base_tempo * 0.3 {
            beat_list.push(i as u32);
        } else if period > 0 && i % period == 0 && rng.gen::<f32>() > 0.4 {
            // Downbeat of the locked tempo grid
            beat_list.push(i as u32);
        }
    }

    // Tempo-locked extras can land inside the debounce gap
    beats::enforce_spacing(&mut beat_list, config.detector.min_beat_gap);
    let beat_list = beats::enforce_density_floor(beat_list, total, fps, &config.detector);
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

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_config(seed: u64) -> Config {
        let mut config = Config::default();
        config.analysis.synth_seed = Some(seed);
        config
    }

    #[test]
    fn sized_to_duration_and_fps() {
        let result = generate(10.0, 30, &seeded_config(1));
        assert_eq!(result.total_frames(), 300);
        assert!((result.duration() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn deterministic_under_a_seed() {
        let a = generate(12.0, 30, &seeded_config(42));
        let b = generate(12.0, 30, &seeded_config(42));
        assert_eq!(a.frames(), b.frames());
        assert_eq!(a.beats(), b.beats());
    }

    #[test]
    fn different_seeds_differ() {
        let a = generate(12.0, 30, &seeded_config(1));
        let b = generate(12.0, 30, &seeded_config(2));
        assert_ne!(a.frames(), b.frames());
    }

    #[test]
    fn all_channels_stay_in_unit_range() {
        let result = generate(20.0, 30, &seeded_config(7));
        for frame in result.frames() {
            assert!((0.0..=1.0).contains(&frame.energy));
            assert!((0.0..=1.0).contains(&frame.novelty));
            assert!((0.0..=1.0).contains(&frame.activity));
            assert!((0.0..=1.0).contains(&frame.beat_strength));
            assert!(frame.energy.is_finite());
        }
    }

    #[test]
    fn beats_respect_spacing_and_density() {
        let config = seeded_config(9);
        let result = generate(30.0, 30, &config);
        let beats = result.beats();
        assert!(!beats.is_empty());
        assert!(beats.windows(2).all(|w| w[0] < w[1]));
        assert!(beats
            .windows(2)
            .all(|w| (w[1] - w[0]) as usize >= config.detector.min_beat_gap));
        // Density floor: no gap wider than fps / min_density frames (+1 rounding)
        assert!(beats.windows(2).all(|w| (w[1] - w[0]) as usize <= 61));
    }

    #[test]
    fn zero_duration_yields_empty_result() {
        let result = generate(0.0, 30, &seeded_config(3));
        assert_eq!(result.total_frames(), 0);
        assert!(result.beats().is_empty());
    }
}
