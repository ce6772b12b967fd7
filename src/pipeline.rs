//! Pipeline orchestrator.
//!
//! Validation happens before anything else. Each run then owns one
//! [`Workspace`] that is released on every exit path; stages run strictly
//! in sequence and the first error ends the run.

use crate::{
    audio::read_audio,
    config::ToolPaths,
    core::{
        acquire::{AcquiredMedia, BoundedAcquirer},
        assemble::repeat,
        dsp::SpectralFluxAnalyzer,
        timing::{BeatAnalyzer, TimingExtractor},
        transform::TransformStage,
    },
    error::{MaestroError, Result},
    io::{
        ffmpeg::{Ffmpeg, Transcoder},
        ytdlp::{MediaSource, YtDlp},
    },
    policy::{validate, ValidatedJob, ValidatedRequest},
    types::{Job, Limits, LoopOutcome, LoopSpec, PipelineOutput, Request, TimingResult},
    workspace::Workspace,
};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{info, info_span, warn};

const MP3_BITRATE_KBPS: u32 = 192;

pub struct Pipeline<S, T, A> {
    source: S,
    transcoder: T,
    analyzer: A,
    limits: Limits,
    workspace_root: Option<PathBuf>,
}

pub type DefaultPipeline = Pipeline<YtDlp, Ffmpeg, SpectralFluxAnalyzer>;

impl DefaultPipeline {
    /// yt-dlp + ffmpeg located via `ToolPaths::from_env`, default limits.
    pub fn from_env() -> Self {
        let paths = ToolPaths::from_env();
        Pipeline::new(
            YtDlp::new(&paths),
            Ffmpeg::new(&paths),
            SpectralFluxAnalyzer,
            Limits::default(),
        )
    }
}

impl<S: MediaSource, T: Transcoder, A: BeatAnalyzer> Pipeline<S, T, A> {
    pub fn new(source: S, transcoder: T, analyzer: A, limits: Limits) -> Self {
        Self {
            source,
            transcoder,
            analyzer,
            limits,
            workspace_root: None,
        }
    }

    /// Create workspaces under `root` instead of the configured temp dir.
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn transcoder(&self) -> &T {
        &self.transcoder
    }

    pub fn run(&self, req: Request) -> Result<PipelineOutput> {
        let validated = validate(req, &self.limits)?;
        let span = info_span!("run", video_id = validated.video_id());
        let _enter = span.enter();

        match validated.job().clone() {
            ValidatedJob::Analyze => {
                let timing = self.with_workspace(|ws| self.analyze_in(&validated, ws))?;
                Ok(PipelineOutput::Timing(timing))
            }
            ValidatedJob::Loop(spec) => {
                if let Some(parent) = spec.output.parent() {
                    if !parent.as_os_str().is_empty() {
                        fs::create_dir_all(parent)?;
                    }
                }
                let outcome = self.with_workspace(|ws| self.loop_in(&validated, &spec, ws))?;
                Ok(PipelineOutput::Loop(outcome))
            }
        }
    }

    pub fn analyze(&self, req: Request) -> Result<TimingResult> {
        if !matches!(req.job, Job::Analyze) {
            return Err(MaestroError::policy("expected an analysis request"));
        }
        match self.run(req)? {
            PipelineOutput::Timing(t) => Ok(t),
            PipelineOutput::Loop(_) => Err(anyhow::anyhow!("analysis produced a loop").into()),
        }
    }

    pub fn make_loop(&self, req: Request) -> Result<LoopOutcome> {
        if !matches!(req.job, Job::Loop(_)) {
            return Err(MaestroError::policy("expected a loop request"));
        }
        match self.run(req)? {
            PipelineOutput::Loop(l) => Ok(l),
            PipelineOutput::Timing(_) => Err(anyhow::anyhow!("loop produced timing").into()),
        }
    }

    fn with_workspace<R>(&self, f: impl FnOnce(&Workspace) -> Result<R>) -> Result<R> {
        let ws = match &self.workspace_root {
            Some(root) => Workspace::acquire_in(root)?,
            None => Workspace::acquire()?,
        };
        let result = f(&ws);
        if let Err(e) = &result {
            warn!(kind = e.kind().as_str(), error = %e, "run failed");
        }
        ws.release();
        result
    }

    fn acquire_normalized<'ws>(
        &self,
        req: &ValidatedRequest,
        ws: &'ws Workspace,
    ) -> Result<AcquiredMedia<'ws>> {
        let media = BoundedAcquirer::new(&self.source, self.limits.max_download_bytes)
            .fetch(req, ws)?;
        TransformStage::new(&self.transcoder).normalize(&media, ws, req.max_source_sec())
    }

    fn analyze_in(&self, req: &ValidatedRequest, ws: &Workspace) -> Result<TimingResult> {
        let normalized = self.acquire_normalized(req, ws)?;
        TimingExtractor::new(&self.analyzer).analyze(&normalized, req.video_id())
    }

    fn loop_in(&self, req: &ValidatedRequest, spec: &LoopSpec, ws: &Workspace) -> Result<LoopOutcome> {
        let normalized = self.acquire_normalized(req, ws)?;

        let source_len = normalized.duration_sec().unwrap_or(0.0);
        if spec.start_sec >= source_len {
            return Err(MaestroError::policy(format!(
                "start ({:.1}s) is beyond the end of the source ({:.1}s)",
                spec.start_sec, source_len
            )));
        }

        let stage = TransformStage::new(&self.transcoder);
        let segment = stage.trim_and_speed(&normalized, ws, spec.start_sec, spec.end_sec, spec.speed)?;
        let audio = read_audio(segment.path())?;

        let clip = repeat(
            &audio,
            spec.repeats,
            Duration::from_secs(self.limits.max_output_sec),
        );
        let repetitions = clip.repetitions();
        let duration_sec = clip.duration_sec();

        let staged = ws.file("looped.wav");
        clip.export(&staged)?;

        if is_mp3(&spec.output) {
            stage.export_mp3(&staged, &spec.output, MP3_BITRATE_KBPS)?;
        } else {
            fs::copy(&staged, &spec.output)?;
        }

        info!(
            output = %spec.output.display(),
            repetitions,
            duration_sec,
            "loop written"
        );
        Ok(LoopOutcome {
            output: spec.output.clone(),
            repetitions,
            duration_sec,
        })
    }
}

fn is_mp3(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("mp3"))
        .unwrap_or(false)
}
