//! # securemaestro-core
//!
//! Bounded media pipeline: validates an untrusted video URL, fetches capped
//! audio through yt-dlp and ffmpeg inside a throwaway workspace, then either
//! extracts tempo/beats/onsets or builds a slowed-down practice loop. Also
//! ships a drift-resistant metronome.

pub mod audio;
pub mod config;
pub mod core;
pub mod cue;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod policy;
pub mod server;
pub mod types;
pub mod workspace;

pub use crate::{
    audio::{read_audio, write_audio},
    config::ToolPaths,
    core::{
        acquire::{AcquiredMedia, BoundedAcquirer},
        assemble::{repeat, LoopedClip},
        dsp::SpectralFluxAnalyzer,
        metronome::{Metronome, MetronomeSettings, Outcome, SchedulerState},
        timing::{enforce_min_spacing, BeatAnalyzer, RawAnalysis, TimingExtractor},
        transform::{atempo_chain, TransformStage},
    },
    cue::{select_cue_sink, AudioCue, CueSink, TextCue, Tick},
    error::{ErrorKind, MaestroError, Result},
    io::{
        ffmpeg::{Ffmpeg, TranscodeJob, Transcoder},
        ytdlp::{MediaSource, SourceMetadata, YtDlp},
    },
    pipeline::{DefaultPipeline, Pipeline},
    policy::{validate, ValidatedRequest},
    server::{build_router, AppState},
    types::*,
    workspace::Workspace,
};
