use crate::config::DetectorConfig;

/// Scan the normalized channels for beats.
///
/// A frame qualifies when its energy clears a locally adaptive threshold,
/// peaks above both neighbors, is the maximum of its confirmation window,
/// rises sharply over the previous frame, and is corroborated by a
/// simultaneous novelty or spectral-flux peak. Accepted beats are debounced
/// by `min_beat_gap`.
pub(crate) fn detect(
    energy: &[f32],
    novelty: &[f32],
    flux: &[f32],
    config: &DetectorConfig,
) -> Vec<u32> {
    let total = energy.len();
    if total < 10 {
        return Vec::new();
    }

    let margin = config.confirm_window.max(1);
    if total <= margin * 2 {
        return Vec::new();
    }

    let novelty_gate = global_gate(novelty, config.novelty_k);
    let flux_gate = global_gate(flux, config.flux_k);
    log::debug!("corroboration gates: novelty {novelty_gate:.3}, flux {flux_gate:.3}");

    let min_gap = config.min_beat_gap.max(1);
    let mut beats: Vec<u32> = Vec::new();

    for i in margin..total - margin {
        let (local_mean, local_std) = local_stats(energy, i, config.local_window);
        let threshold = config
            .base_threshold
            .max(local_mean + config.energy_k * local_std);

        let energy_peak =
            energy[i] > threshold && energy[i] > energy[i - 1] && energy[i] > energy[i + 1];
        if !energy_peak {
            continue;
        }

        // A loud passage alone is not a beat; require a transient witness
        let corroborated = novelty[i] > novelty_gate || flux[i] > flux_gate;
        if !corroborated {
            continue;
        }

        let lo = i.saturating_sub(margin);
        let hi = (i + margin + 1).min(total);
        let local_max = energy[lo..hi].iter().all(|&v| energy[i] >= v);
        if !local_max {
            continue;
        }

        if energy[i] <= energy[i - 1] * config.rise_ratio {
            continue;
        }

        if let Some(&last) = beats.last() {
            if i - (last as usize) < min_gap {
                continue;
            }
        }

        beats.push(i as u32);
    }

    beats
}

/// Global mean + k·std gate over one corroboration channel.
fn global_gate(values: &[f32], k: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f32>() / values.len() as f32;
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / values.len() as f32;
    mean + k * variance.sqrt()
}

fn local_stats(values: &[f32], center: usize, radius: usize) -> (f32, f32) {
    let lo = center.saturating_sub(radius);
    let hi = (center + radius + 1).min(values.len());
    let slice = &values[lo..hi];
    let mean = slice.iter().sum::<f32>() / slice.len() as f32;
    let variance = slice.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / slice.len() as f32;
    (mean, variance.sqrt())
}

/// Sort, deduplicate, and drop beats that land inside the debounce gap.
pub(crate) fn enforce_spacing(beats: &mut Vec<u32>, min_gap: usize) {
    beats.sort_unstable();
    beats.dedup();
    let min_gap = min_gap.max(1);
    let mut kept: Vec<u32> = Vec::with_capacity(beats.len());
    for &beat in beats.iter() {
        if kept
            .last()
            .map_or(true, |&last| beat as usize - last as usize >= min_gap)
        {
            kept.push(beat);
        }
    }
    *beats = kept;
}

/// Guarantee a minimum beat rate by backfilling evenly spaced beats into any
/// gap wider than `fps / min_density` frames, keeping `min_beat_gap` distance
/// to existing beats. An empty list backfills from frame 0.
pub(crate) fn enforce_density_floor(
    beats: Vec<u32>,
    total_frames: usize,
    fps: u32,
    config: &DetectorConfig,
) -> Vec<u32> {
    if total_frames == 0 || config.min_density <= 0.0 {
        return beats;
    }

    let total = total_frames as i64;
    let min_gap = config.min_beat_gap.max(1) as i64;
    let max_gap = ((fps.max(1) as f32 / config.min_density).round() as i64).max(min_gap);

    let mut synthetic: Vec<u32> = Vec::new();
    // Sentinels one full interval before the start and past the end make the
    // fill loop cover leading and trailing gaps uniformly
    let mut prev = -max_gap;
    let bounds: Vec<i64> = beats
        .iter()
        .map(|&b| b as i64)
        .chain(std::iter::once(total + max_gap))
        .collect();

    for &next in &bounds {
        let gap = next - prev;
        if gap > max_gap {
            // Subdivide the gap evenly; every resulting stretch is <= max_gap
            let segments = (gap as f64 / max_gap as f64).ceil() as i64;
            let step = gap as f64 / segments as f64;
            for j in 1..segments {
                let p = prev + (j as f64 * step).round() as i64;
                let clear_of_prev = prev < 0 || p - prev >= min_gap;
                let clear_of_next = next >= total || next - p >= min_gap;
                if p >= 0 && p < total && clear_of_prev && clear_of_next {
                    synthetic.push(p as u32);
                }
            }
        }
        prev = next;
    }

    if synthetic.is_empty() {
        return beats;
    }

    log::debug!(
        "density floor backfilled {} beats over {} frames",
        synthetic.len(),
        total_frames
    );

    let mut merged = beats;
    merged.extend(synthetic);
    merged.sort_unstable();
    merged.dedup();
    merged
}

/// Soft envelope around each beat: 1.0 on the beat frame, Gaussian falloff
/// over the neighboring frames. Gives animators a ramp instead of a spike.
pub(crate) fn strength_envelope(beats: &[u32], total_frames: usize) -> Vec<f32> {
    const RADIUS: i64 = 5;
    const SIGMA: f32 = 2.0;

    let mut strength = vec![0.0f32; total_frames];
    for &beat in beats {
        let beat = beat as i64;
        for offset in -RADIUS..=RADIUS {
            let idx = beat + offset;
            if idx < 0 || idx >= total_frames as i64 {
                continue;
            }
            let x = offset as f32 / SIGMA;
            let value = (-x * x).exp();
            let slot = &mut strength[idx as usize];
            if value > *slot {
                *slot = value;
            }
        }
    }
    strength
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DetectorConfig {
        DetectorConfig::default()
    }

    /// Energy track with sharp peaks every `period` frames starting at 7.
    fn pulse_train(total: usize, period: usize) -> Vec<f32> {
        let mut energy = vec![0.1f32; total];
        let mut p = 7;
        while p + 1 < total {
            energy[p - 1] = 0.3;
            energy[p] = 0.9;
            energy[p + 1] = 0.3;
            p += period;
        }
        energy
    }

    #[test]
    fn detects_periodic_pulses_near_true_period() {
        let period = 15;
        let energy = pulse_train(300, period);
        let novelty = energy.clone();
        let flux = vec![0.0f32; 300];

        let beats = detect(&energy, &novelty, &flux, &config());
        assert!(beats.len() >= 15, "expected most pulses found, got {}", beats.len());

        let near_period = beats
            .windows(2)
            .filter(|w| {
                let gap = (w[1] - w[0]) as i64;
                (gap - period as i64).abs() <= 2
            })
            .count();
        assert!(
            near_period >= beats.len() - 2,
            "beat spacing should cluster near the pulse period"
        );
    }

    #[test]
    fn beats_are_strictly_increasing_with_min_gap() {
        let energy = pulse_train(600, 9);
        let novelty = energy.clone();
        let flux = vec![0.0f32; 600];
        let cfg = config();

        let beats = detect(&energy, &novelty, &flux, &cfg);
        assert!(beats.windows(2).all(|w| w[0] < w[1]));
        assert!(beats
            .windows(2)
            .all(|w| (w[1] - w[0]) as usize >= cfg.min_beat_gap));
    }

    #[test]
    fn silent_input_has_no_detected_beats() {
        let zeros = vec![0.0f32; 300];
        assert!(detect(&zeros, &zeros, &zeros, &config()).is_empty());
    }

    #[test]
    fn monotonic_ramp_has_no_beats() {
        // Loud but featureless: no local peaks, so nothing qualifies
        let energy: Vec<f32> = (0..300).map(|i| i as f32 / 300.0).collect();
        let novelty = energy.clone();
        let flux = energy.clone();
        assert!(detect(&energy, &novelty, &flux, &config()).is_empty());
    }

    #[test]
    fn uncorroborated_peaks_are_rejected() {
        let energy = pulse_train(300, 15);
        // Flat corroboration channels: gates sit at 0 and nothing exceeds them
        let flat = vec![0.0f32; 300];
        assert!(detect(&energy, &flat, &flat, &config()).is_empty());
    }

    #[test]
    fn short_input_is_rejected() {
        let energy = vec![0.9f32; 5];
        assert!(detect(&energy, &energy, &energy, &config()).is_empty());
    }

    #[test]
    fn spacing_enforcement_dedups_and_debounces() {
        let mut beats = vec![40, 10, 10, 12, 30, 100];
        enforce_spacing(&mut beats, 6);
        assert_eq!(beats, vec![10, 30, 40, 100]);
    }

    #[test]
    fn density_floor_fills_empty_track_evenly() {
        // 300 frames at 30 fps, 0.5 beats/s floor: one beat every 60 frames
        let beats = enforce_density_floor(Vec::new(), 300, 30, &config());
        assert_eq!(beats, vec![0, 60, 120, 180, 240]);
    }

    #[test]
    fn density_floor_fills_around_existing_beats() {
        let cfg = config();
        let beats = enforce_density_floor(vec![100], 300, 30, &cfg);

        assert!(beats.contains(&100));
        assert!(beats.windows(2).all(|w| w[0] < w[1]));
        // No gap wider than the density interval survives (+1 for rounding)
        assert!(beats.windows(2).all(|w| (w[1] - w[0]) as usize <= 61));
        // Backfill respects the debounce distance
        assert!(beats
            .windows(2)
            .all(|w| (w[1] - w[0]) as usize >= cfg.min_beat_gap));
        assert!(*beats.first().unwrap() <= 60);
        assert!(*beats.last().unwrap() as usize >= 300 - 60 - 1);
    }

    #[test]
    fn density_floor_leaves_dense_tracks_alone() {
        let dense: Vec<u32> = (0..300).step_by(20).collect();
        let beats = enforce_density_floor(dense.clone(), 300, 30, &config());
        assert_eq!(beats, dense);
    }

    #[test]
    fn density_floor_handles_empty_timeline() {
        assert!(enforce_density_floor(Vec::new(), 0, 30, &config()).is_empty());
    }

    #[test]
    fn strength_envelope_peaks_on_the_beat() {
        let strength = strength_envelope(&[50], 100);
        assert_eq!(strength[50], 1.0);
        assert!(strength[49] < 1.0 && strength[49] > 0.5);
        assert_eq!(strength[80], 0.0);
        assert!(strength.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn strength_envelope_clips_at_track_edges() {
        let strength = strength_envelope(&[0, 99], 100);
        assert_eq!(strength.len(), 100);
        assert_eq!(strength[0], 1.0);
        assert_eq!(strength[99], 1.0);
    }
}
