use crate::{
    audio::wav_info,
    core::acquire::AcquiredMedia,
    error::{MaestroError, Result},
    io::ffmpeg::{OutputCodec, TranscodeJob, Transcoder},
    types::TARGET_SAMPLE_RATE,
    workspace::Workspace,
};
use std::path::Path;
use tracing::info;

/// Per-filter range accepted by the time-stretch primitive.
pub const ATEMPO_MIN: f64 = 0.5;
pub const ATEMPO_MAX: f64 = 2.0;

/// Split `speed` into factors each within `[ATEMPO_MIN, ATEMPO_MAX]` whose
/// product is `speed`.
pub fn atempo_chain(speed: f64) -> Vec<f64> {
    let mut rest = speed;
    let mut chain = Vec::new();
    while rest > ATEMPO_MAX {
        chain.push(ATEMPO_MAX);
        rest /= ATEMPO_MAX;
    }
    while rest < ATEMPO_MIN {
        chain.push(ATEMPO_MIN);
        rest /= ATEMPO_MIN;
    }
    chain.push(rest);
    chain
}

/// Resample, trim and time-stretch through an external transcoder.
pub struct TransformStage<'a, T: Transcoder + ?Sized> {
    tool: &'a T,
    sample_rate: u32,
}

impl<'a, T: Transcoder + ?Sized> TransformStage<'a, T> {
    pub fn new(tool: &'a T) -> Self {
        Self {
            tool,
            sample_rate: TARGET_SAMPLE_RATE,
        }
    }

    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    /// Mono WAV at the working rate. Enforces the measured duration against
    /// `max_duration_sec`, since declared metadata may be missing or wrong.
    pub fn normalize<'ws>(
        &self,
        media: &AcquiredMedia<'ws>,
        ws: &'ws Workspace,
        max_duration_sec: u64,
    ) -> Result<AcquiredMedia<'ws>> {
        let out = ws.file("normalized.wav");
        let mut job = TranscodeJob::new(media.path(), &out);
        job.channels = Some(1);
        job.sample_rate = Some(self.sample_rate);
        self.tool.transcode(&job)?;

        let normalized = measured(ws, &out)?;
        let duration = normalized.duration_sec().unwrap_or(0.0);
        if duration > max_duration_sec as f64 {
            return Err(MaestroError::SourceTooLong {
                duration_sec: duration,
                limit_sec: max_duration_sec,
            });
        }
        info!(duration_sec = duration, "normalized source");
        Ok(normalized)
    }

    /// Extract `[start, end)` and change tempo by `speed`, keeping pitch.
    pub fn trim_and_speed<'ws>(
        &self,
        media: &AcquiredMedia<'ws>,
        ws: &'ws Workspace,
        start_sec: f64,
        end_sec: f64,
        speed: f64,
    ) -> Result<AcquiredMedia<'ws>> {
        let out = ws.file("segment.wav");
        let mut job = TranscodeJob::new(media.path(), &out);
        job.start_sec = Some(start_sec);
        job.duration_sec = Some(end_sec - start_sec);
        job.tempo = atempo_chain(speed);
        job.channels = Some(1);
        job.sample_rate = Some(self.sample_rate);
        self.tool.transcode(&job)?;

        let segment = measured(ws, &out)?;
        info!(
            start_sec,
            end_sec,
            speed,
            duration_sec = segment.duration_sec(),
            "trimmed segment"
        );
        Ok(segment)
    }

    /// Encode a finished WAV to MP3 at `dest`.
    pub fn export_mp3(&self, wav: &Path, dest: &Path, bitrate_kbps: u32) -> Result<()> {
        let mut job = TranscodeJob::new(wav, dest);
        job.codec = OutputCodec::Mp3 { bitrate_kbps };
        self.tool.transcode(&job)
    }
}

fn measured<'ws>(ws: &'ws Workspace, path: &Path) -> Result<AcquiredMedia<'ws>> {
    if !path.exists() {
        return Err(MaestroError::AcquisitionFailed(format!(
            "transcoder produced no output at {}",
            path.display()
        )));
    }
    let info = wav_info(path)?;
    AcquiredMedia::new(
        ws,
        path.to_path_buf(),
        Some(info.duration_sec),
        Some(info.sample_rate),
    )
}
