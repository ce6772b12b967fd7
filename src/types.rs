use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Latest timestamp a window may reference (6 hours).
pub const MAX_TIMESTAMP_SEC: f64 = 6.0 * 3600.0;
pub const MAX_SPEED: f64 = 2.0;
pub const MAX_REPEATS: u32 = 100;
/// Default full-length cap for loop requests (20 min).
pub const DEFAULT_MAX_SOURCE_SEC: u64 = 20 * 60;
/// Largest maximum-source-duration a caller may declare.
pub const MAX_SOURCE_CEILING_SEC: u64 = 6 * 3600;
/// Full-length cap for analysis requests (15 min).
pub const ANALYZE_MAX_SOURCE_SEC: u64 = 15 * 60;
/// Hard cap on final output seconds.
pub const MAX_OUTPUT_SEC: u64 = 15 * 60;
pub const MAX_DOWNLOAD_BYTES: u64 = 50 * 1024 * 1024;
pub const TARGET_SAMPLE_RATE: u32 = 22_050;
pub const MIN_BEAT_SPACING_SEC: f64 = 0.15;
/// Upper bound on tool diagnostics carried inside errors.
pub const DIAGNOSTIC_LIMIT: usize = 5000;

#[derive(Clone, Debug)]
pub struct AudioData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioData {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration_sec(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Resource caps applied to every pipeline run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Limits {
    /// Ceiling for a caller-declared maximum source duration.
    pub max_source_sec: u64,
    pub default_loop_source_sec: u64,
    pub default_analyze_source_sec: u64,
    pub max_output_sec: u64,
    pub max_download_bytes: u64,
    pub max_speed: f64,
    pub max_repeats: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_source_sec: MAX_SOURCE_CEILING_SEC,
            default_loop_source_sec: DEFAULT_MAX_SOURCE_SEC,
            default_analyze_source_sec: ANALYZE_MAX_SOURCE_SEC,
            max_output_sec: MAX_OUTPUT_SEC,
            max_download_bytes: MAX_DOWNLOAD_BYTES,
            max_speed: MAX_SPEED,
            max_repeats: MAX_REPEATS,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LoopSpec {
    pub start_sec: f64,
    pub end_sec: f64,
    pub speed: f64,
    pub repeats: u32,
    pub output: PathBuf,
}

/// Which pipeline a request runs. Exactly one is active per run.
#[derive(Clone, Debug)]
pub enum Job {
    Analyze,
    Loop(LoopSpec),
}

/// Raw, untrusted request as received from a caller.
#[derive(Clone, Debug)]
pub struct Request {
    pub url: String,
    pub job: Job,
    pub max_source_sec: Option<u64>,
}

impl Request {
    pub fn analyze(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            job: Job::Analyze,
            max_source_sec: None,
        }
    }

    pub fn looped(url: impl Into<String>, spec: LoopSpec) -> Self {
        Self {
            url: url.into(),
            job: Job::Loop(spec),
            max_source_sec: None,
        }
    }

    pub fn with_max_source_sec(mut self, secs: u64) -> Self {
        self.max_source_sec = Some(secs);
        self
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimingResult {
    pub video_id: String,
    #[serde(rename = "sr")]
    pub sample_rate: u32,
    #[serde(rename = "bpm_estimate")]
    pub tempo_bpm: f64,
    /// Seconds, strictly increasing, at least `MIN_BEAT_SPACING_SEC` apart.
    pub beats: Vec<f64>,
    /// Seconds, unfiltered.
    pub onsets: Vec<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoopOutcome {
    pub output: PathBuf,
    pub repetitions: usize,
    pub duration_sec: f64,
}

#[derive(Clone, Debug)]
pub enum PipelineOutput {
    Timing(TimingResult),
    Loop(LoopOutcome),
}
