use crate::{
    audio::{downmix_to_mono, read_audio},
    core::acquire::AcquiredMedia,
    error::Result,
    types::{TimingResult, MIN_BEAT_SPACING_SEC},
};
use tracing::info;

/// Raw output of a tempo/beat/onset estimator.
#[derive(Clone, Debug, Default)]
pub struct RawAnalysis {
    /// Estimators may report several candidates; the first one is used.
    pub tempo: Vec<f64>,
    pub beat_frames: Vec<usize>,
    /// Samples per analysis frame.
    pub hop_length: usize,
    /// Onset times in seconds.
    pub onsets: Vec<f64>,
}

pub trait BeatAnalyzer: Send + Sync {
    fn analyze(&self, signal: &[f32], sample_rate: u32) -> Result<RawAnalysis>;
}

pub fn frames_to_time(frames: &[usize], hop_length: usize, sample_rate: u32) -> Vec<f64> {
    frames
        .iter()
        .map(|&f| (f * hop_length) as f64 / sample_rate as f64)
        .collect()
}

/// Greedy minimum-spacing filter over time-ordered beats. Keeps a beat only
/// if it is at least `min_gap` seconds after the last kept one; later beats
/// are dropped, never merged.
pub fn enforce_min_spacing(times: &[f64], min_gap: f64) -> Vec<f64> {
    let mut kept: Vec<f64> = Vec::with_capacity(times.len());
    let mut last = f64::NEG_INFINITY;
    for &t in times {
        if t - last >= min_gap {
            kept.push(t);
            last = t;
        }
    }
    kept
}

pub struct TimingExtractor<'a, A: BeatAnalyzer + ?Sized> {
    analyzer: &'a A,
}

impl<'a, A: BeatAnalyzer + ?Sized> TimingExtractor<'a, A> {
    pub fn new(analyzer: &'a A) -> Self {
        Self { analyzer }
    }

    pub fn analyze(&self, media: &AcquiredMedia<'_>, video_id: &str) -> Result<TimingResult> {
        let audio = read_audio(media.path())?;
        let mono = downmix_to_mono(&audio.samples, audio.channels);
        self.analyze_signal(&mono, audio.sample_rate, video_id)
    }

    pub fn analyze_signal(
        &self,
        signal: &[f32],
        sample_rate: u32,
        video_id: &str,
    ) -> Result<TimingResult> {
        let raw = self.analyzer.analyze(signal, sample_rate)?;
        let result = post_process(raw, sample_rate, video_id);
        info!(
            tempo_bpm = result.tempo_bpm,
            beats = result.beats.len(),
            onsets = result.onsets.len(),
            "timing extracted"
        );
        Ok(result)
    }
}

pub fn post_process(raw: RawAnalysis, sample_rate: u32, video_id: &str) -> TimingResult {
    let mut times = frames_to_time(&raw.beat_frames, raw.hop_length, sample_rate);
    times.sort_by(|a, b| a.total_cmp(b));

    TimingResult {
        video_id: video_id.to_string(),
        sample_rate,
        tempo_bpm: raw.tempo.first().copied().unwrap_or(0.0),
        beats: enforce_min_spacing(&times, MIN_BEAT_SPACING_SEC),
        onsets: raw.onsets,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_later_beat_instead_of_averaging() {
        let kept = enforce_min_spacing(&[1.0, 1.1, 1.2, 1.3, 2.0], 0.15);
        assert_eq!(kept, vec![1.0, 1.2, 2.0]);
    }

    #[test]
    fn first_beat_at_zero_is_kept() {
        assert_eq!(enforce_min_spacing(&[0.0, 0.1, 0.2], 0.15), vec![0.0, 0.2]);
    }

    #[test]
    fn tempo_takes_first_candidate() {
        let raw = RawAnalysis {
            tempo: vec![128.0, 64.0],
            beat_frames: vec![0, 2, 43],
            hop_length: 512,
            onsets: vec![0.05, 0.06, 0.07],
        };
        let r = post_process(raw, 22_050, "vid");
        assert_eq!(r.tempo_bpm, 128.0);
        // frame 2 is 46 ms after frame 0 and gets dropped
        assert_eq!(r.beats.len(), 2);
        assert_eq!(r.onsets, vec![0.05, 0.06, 0.07]);
    }

    #[test]
    fn empty_tempo_sequence_reports_zero() {
        let r = post_process(RawAnalysis::default(), 22_050, "vid");
        assert_eq!(r.tempo_bpm, 0.0);
        assert!(r.beats.is_empty());
    }
}
