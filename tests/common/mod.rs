#![allow(dead_code)]

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use securemaestro_core::{
    MaestroError, MediaSource, Pipeline, Result, SourceMetadata, SpectralFluxAnalyzer,
    TranscodeJob, Transcoder, ValidatedRequest,
};
use securemaestro_core::io::ffmpeg::OutputCodec;
use securemaestro_core::types::Limits;
use std::{
    f32::consts::PI,
    fs,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

#[derive(Clone, Copy, Debug)]
pub enum Signal {
    Tone,
    /// Short bursts every `period` samples, first one at `period / 2`.
    Clicks { period: usize },
}

/// Stand-in for yt-dlp that writes a real WAV into the download dir.
pub struct FakeSource {
    pub declared_duration: Option<f64>,
    pub declared_size: Option<u64>,
    pub actual_duration_sec: f64,
    pub sample_rate: u32,
    pub signal: Signal,
    pub produce_audio: bool,
    /// Probe reports a playlist with entries.
    pub multi_item: bool,
    pub extra_files: Vec<(String, Vec<u8>)>,
    pub probes: AtomicUsize,
    pub downloads: AtomicUsize,
}

impl FakeSource {
    pub fn minutes(minutes: f64) -> Self {
        Self {
            declared_duration: Some(minutes * 60.0),
            declared_size: None,
            actual_duration_sec: minutes * 60.0,
            sample_rate: 1000,
            signal: Signal::Tone,
            produce_audio: true,
            multi_item: false,
            extra_files: Vec::new(),
            probes: AtomicUsize::new(0),
            downloads: AtomicUsize::new(0),
        }
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.probes() + self.downloads()
    }
}

impl MediaSource for FakeSource {
    fn probe(&self, req: &ValidatedRequest) -> Result<Option<SourceMetadata>> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let mut meta = SourceMetadata {
            id: Some(req.video_id().to_string()),
            duration_sec: self.declared_duration,
            filesize: self.declared_size,
            ..SourceMetadata::default()
        };
        if self.multi_item {
            meta = serde_json::from_str(r#"{"_type":"playlist","entries":[{},{},{}]}"#)?;
        }
        Ok(Some(meta))
    }

    fn download(&self, req: &ValidatedRequest, dest: &Path, _max_bytes: u64) -> Result<()> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if self.produce_audio {
            let frames = (self.actual_duration_sec * self.sample_rate as f64) as usize;
            let samples = synth(self.signal, frames, self.sample_rate);
            write_wav(
                &dest.join(format!("{}.wav", req.video_id())),
                &samples,
                self.sample_rate,
            );
        }
        for (name, bytes) in &self.extra_files {
            fs::write(dest.join(name), bytes)?;
        }
        Ok(())
    }
}

pub fn synth(signal: Signal, frames: usize, rate: u32) -> Vec<i16> {
    match signal {
        Signal::Tone => (0..frames)
            .map(|i| {
                let t = i as f32 / rate as f32;
                ((2.0 * PI * 220.0 * t).sin() * 0.3 * i16::MAX as f32) as i16
            })
            .collect(),
        Signal::Clicks { period } => {
            let mut out = vec![0i16; frames];
            let burst = 200usize;
            let mut at = period / 2;
            while at < frames {
                for j in 0..burst.min(frames - at) {
                    let t = j as f32 / rate as f32;
                    let env = 1.0 - j as f32 / burst as f32;
                    out[at + j] =
                        ((2.0 * PI * 1000.0 * t).sin() * env * 0.8 * i16::MAX as f32) as i16;
                }
                at += period;
            }
            out
        }
    }
}

pub fn write_wav(path: &Path, samples: &[i16], rate: u32) {
    let spec = WavSpec {
        channels: 1,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut w = WavWriter::create(path, spec).unwrap();
    for s in samples {
        w.write_sample(*s).unwrap();
    }
    w.finalize().unwrap();
}

/// In-process stand-in for ffmpeg: trims, time-stretches by dropping or
/// repeating frames, keeps the input sample rate. MP3 jobs copy bytes.
#[derive(Default)]
pub struct FakeTranscoder {
    pub jobs: Mutex<Vec<TranscodeJob>>,
    pub fail_with: Option<String>,
}

impl FakeTranscoder {
    pub fn failing(diagnostic: &str) -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            fail_with: Some(diagnostic.to_string()),
        }
    }

    pub fn jobs(&self) -> Vec<TranscodeJob> {
        self.jobs.lock().unwrap().clone()
    }
}

impl Transcoder for FakeTranscoder {
    fn transcode(&self, job: &TranscodeJob) -> Result<()> {
        self.jobs.lock().unwrap().push(job.clone());
        if let Some(msg) = &self.fail_with {
            return Err(MaestroError::ExternalToolError {
                tool: "ffmpeg".into(),
                diagnostic: msg.clone(),
            });
        }
        if let OutputCodec::Mp3 { .. } = job.codec {
            fs::copy(&job.input, &job.output)?;
            return Ok(());
        }

        let mut reader = WavReader::open(&job.input)?;
        let spec = reader.spec();
        let rate = spec.sample_rate as f64;
        let channels = spec.channels.max(1) as usize;
        let samples: Vec<i16> = reader
            .samples::<i16>()
            .collect::<std::result::Result<_, _>>()?;
        let mono: Vec<i16> = samples.chunks(channels).map(|c| c[0]).collect();

        let start = job
            .start_sec
            .map(|s| (s * rate) as usize)
            .unwrap_or(0)
            .min(mono.len());
        let end = job
            .duration_sec
            .map(|d| start + (d * rate) as usize)
            .unwrap_or(mono.len())
            .min(mono.len());
        let slice = &mono[start..end];

        let speed: f64 = job.tempo.iter().product();
        let out_len = (slice.len() as f64 / speed).round() as usize;
        let out: Vec<i16> = (0..out_len)
            .map(|i| slice[((i as f64 * speed) as usize).min(slice.len() - 1)])
            .collect();

        write_wav(&job.output, &out, spec.sample_rate);
        Ok(())
    }
}

pub type FakePipeline = Pipeline<FakeSource, FakeTranscoder, SpectralFluxAnalyzer>;

pub fn fake_pipeline(source: FakeSource, root: &Path) -> FakePipeline {
    Pipeline::new(
        source,
        FakeTranscoder::default(),
        SpectralFluxAnalyzer,
        Limits::default(),
    )
    .with_workspace_root(root)
}

pub fn dir_is_empty(path: &Path) -> bool {
    fs::read_dir(path).map(|mut d| d.next().is_none()).unwrap_or(true)
}
