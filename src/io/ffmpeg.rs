use crate::{config::ToolPaths, error::Result, io::command::ToolCommand};
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputCodec {
    Wav,
    Mp3 { bitrate_kbps: u32 },
}

/// One invocation of the external transcode/trim/speed tool.
#[derive(Clone, Debug)]
pub struct TranscodeJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub start_sec: Option<f64>,
    pub duration_sec: Option<f64>,
    pub channels: Option<u16>,
    pub sample_rate: Option<u32>,
    /// Time-stretch factors, applied in order. Empty means no change.
    pub tempo: Vec<f64>,
    pub codec: OutputCodec,
}

impl TranscodeJob {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            start_sec: None,
            duration_sec: None,
            channels: None,
            sample_rate: None,
            tempo: Vec::new(),
            codec: OutputCodec::Wav,
        }
    }
}

pub trait Transcoder: Send + Sync {
    fn transcode(&self, job: &TranscodeJob) -> Result<()>;
}

pub struct Ffmpeg {
    program: PathBuf,
}

impl Ffmpeg {
    pub fn new(paths: &ToolPaths) -> Self {
        Self {
            program: paths.ffmpeg.clone(),
        }
    }

    /// Fails with a tool error when ffmpeg cannot be started.
    pub fn check(&self) -> Result<()> {
        ToolCommand::new("ffmpeg", &self.program)
            .arg("-hide_banner")
            .arg("-version")
            .run()?;
        Ok(())
    }

    pub fn command_for(&self, job: &TranscodeJob) -> ToolCommand {
        let mut cmd = ToolCommand::new("ffmpeg", &self.program)
            .arg("-hide_banner")
            .arg("-nostdin")
            .arg("-y");

        if let Some(start) = job.start_sec {
            cmd = cmd.arg("-ss").seconds(start);
        }
        if let Some(duration) = job.duration_sec {
            cmd = cmd.arg("-t").seconds(duration);
        }
        cmd = cmd.arg("-i").path(&job.input);

        if !job.tempo.is_empty() {
            let filter = job
                .tempo
                .iter()
                .map(|f| format!("atempo={f:.6}"))
                .collect::<Vec<_>>()
                .join(",");
            cmd = cmd.arg("-filter:a").generated(filter);
        }
        if let Some(channels) = job.channels {
            cmd = cmd.arg("-ac").uint(channels as u64);
        }
        if let Some(rate) = job.sample_rate {
            cmd = cmd.arg("-ar").uint(rate as u64);
        }

        cmd = match job.codec {
            OutputCodec::Wav => cmd.arg("-c:a").arg("pcm_s16le"),
            OutputCodec::Mp3 { bitrate_kbps } => cmd
                .arg("-c:a")
                .arg("libmp3lame")
                .arg("-b:a")
                .generated(format!("{bitrate_kbps}k")),
        };

        cmd.path(&job.output)
    }
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self::new(&ToolPaths::from_env())
    }
}

impl Transcoder for Ffmpeg {
    fn transcode(&self, job: &TranscodeJob) -> Result<()> {
        self.command_for(job).run()?;
        Ok(())
    }
}
