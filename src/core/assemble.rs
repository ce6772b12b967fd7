use crate::{audio::write_audio, error::Result, types::AudioData};
use std::{path::Path, time::Duration};
use tracing::{info, warn};

/// A segment repeated in memory. Exported once, then gone.
#[derive(Debug)]
pub struct LoopedClip {
    audio: AudioData,
    repetitions: usize,
}

impl LoopedClip {
    pub fn repetitions(&self) -> usize {
        self.repetitions
    }

    pub fn duration_sec(&self) -> f64 {
        self.audio.duration_sec()
    }

    pub fn audio(&self) -> &AudioData {
        &self.audio
    }

    /// Write the clip as a 16-bit WAV and drop the buffer.
    pub fn export<P: AsRef<Path>>(self, path: P) -> Result<()> {
        write_audio(path, &self.audio)
    }
}

/// Append `segment` up to `count` times, stopping early (without error) as
/// soon as one more copy would push the clip past `cap`.
pub fn repeat(segment: &AudioData, count: u32, cap: Duration) -> LoopedClip {
    let channels = segment.channels.max(1) as usize;
    let seg_frames = segment.frames();
    let cap_frames = (cap.as_nanos() * segment.sample_rate as u128 / 1_000_000_000) as usize;

    let allowed = if seg_frames == 0 {
        count as usize
    } else {
        (count as usize).min(cap_frames / seg_frames)
    };
    if allowed < count as usize {
        warn!(
            requested = count,
            allowed,
            cap_sec = cap.as_secs_f64(),
            "repeat count capped by output duration"
        );
    }

    let mut samples = Vec::with_capacity(seg_frames * channels * allowed);
    let mut repetitions = 0usize;
    for _ in 0..count {
        if (samples.len() / channels) + seg_frames > cap_frames {
            break;
        }
        samples.extend_from_slice(&segment.samples);
        repetitions += 1;
    }

    info!(repetitions, "assembled loop");
    LoopedClip {
        audio: AudioData {
            samples,
            sample_rate: segment.sample_rate,
            channels: segment.channels,
        },
        repetitions,
    }
}
