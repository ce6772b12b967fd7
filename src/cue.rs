//! Per-tick cue sinks for the metronome.
//!
//! The sink is chosen once at startup with [`select_cue_sink`] and handed to
//! the scheduler; nothing probes for an audio backend after that.

use crate::error::Result;
use std::io::{self, Write};
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tick {
    pub index: u64,
    pub downbeat: bool,
}

pub trait CueSink {
    fn cue(&mut self, tick: Tick) -> Result<()>;

    fn describe(&self) -> &'static str;
}

/// Neutral text marker: `TICK` on downbeats, `tick` otherwise. Write
/// failures are swallowed so a closed terminal never stops the clock.
pub struct TextCue<W: Write> {
    out: W,
}

impl<W: Write> TextCue<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> CueSink for TextCue<W> {
    fn cue(&mut self, tick: Tick) -> Result<()> {
        let marker: &[u8] = if tick.downbeat { b"TICK\n" } else { b"tick\n" };
        let _ = self.out.write_all(marker).and_then(|_| self.out.flush());
        Ok(())
    }

    fn describe(&self) -> &'static str {
        "no sound"
    }
}

/// Text marker plus an audible click.
pub struct AudioCue {
    text: TextCue<io::Stdout>,
    #[cfg(feature = "audio-cue")]
    click: click::ClickPlayer,
}

impl AudioCue {
    #[cfg(feature = "audio-cue")]
    pub fn open() -> Result<Self> {
        Ok(Self {
            text: TextCue::new(io::stdout()),
            click: click::ClickPlayer::open()?,
        })
    }

    /// Without an audio backend the click is the terminal bell.
    #[cfg(not(feature = "audio-cue"))]
    pub fn open() -> Result<Self> {
        Ok(Self {
            text: TextCue::new(io::stdout()),
        })
    }
}

impl CueSink for AudioCue {
    fn cue(&mut self, tick: Tick) -> Result<()> {
        self.text.cue(tick)?;

        #[cfg(feature = "audio-cue")]
        self.click.trigger(tick.downbeat);

        #[cfg(not(feature = "audio-cue"))]
        {
            let _ = self.text.out.write_all(b"\x07").and_then(|_| self.text.out.flush());
        }
        Ok(())
    }

    fn describe(&self) -> &'static str {
        "sound"
    }
}

/// Pick the cue sink for this process. Falls back to the text marker when
/// sound is not wanted or the audio backend cannot be opened.
pub fn select_cue_sink(prefer_audio: bool) -> Box<dyn CueSink> {
    if prefer_audio {
        match AudioCue::open() {
            Ok(cue) => return Box::new(cue),
            Err(e) => warn!(error = %e, "audio cue unavailable, using text marker"),
        }
    }
    let sink = TextCue::new(io::stdout());
    info!(mode = sink.describe(), "cue sink selected");
    Box::new(sink)
}

#[cfg(feature = "audio-cue")]
mod click {
    use crate::error::{MaestroError, Result};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use std::sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    };

    const CLICK_SEC: f32 = 0.03;
    const HI_HZ: f32 = 1500.0;
    const LO_HZ: f32 = 1000.0;

    const NONE: u8 = 0;
    const HI: u8 = 1;
    const LO: u8 = 2;

    /// Short decaying sine, synthesized in the output callback.
    pub struct ClickPlayer {
        _stream: cpal::Stream,
        pending: Arc<AtomicU8>,
    }

    fn backend(msg: impl std::fmt::Display) -> MaestroError {
        anyhow::anyhow!("audio backend: {msg}").into()
    }

    impl ClickPlayer {
        pub fn open() -> Result<Self> {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| backend("no output device"))?;
            let supported = device.default_output_config().map_err(backend)?;
            if supported.sample_format() != cpal::SampleFormat::F32 {
                return Err(backend("output device does not accept f32 samples"));
            }
            let config: cpal::StreamConfig = supported.into();
            let channels = config.channels as usize;
            let rate = config.sample_rate.0 as f32;
            let click_len = (CLICK_SEC * rate) as usize;

            let pending = Arc::new(AtomicU8::new(NONE));
            let cb_pending = Arc::clone(&pending);
            let mut pos = click_len;
            let mut freq = HI_HZ;

            let stream = device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        match cb_pending.swap(NONE, Ordering::AcqRel) {
                            HI => {
                                freq = HI_HZ;
                                pos = 0;
                            }
                            LO => {
                                freq = LO_HZ;
                                pos = 0;
                            }
                            _ => {}
                        }
                        for frame in data.chunks_mut(channels) {
                            let v = if pos < click_len {
                                let t = pos as f32 / rate;
                                let env = 1.0 - pos as f32 / click_len as f32;
                                pos += 1;
                                0.5 * env * (2.0 * std::f32::consts::PI * freq * t).sin()
                            } else {
                                0.0
                            };
                            frame.fill(v);
                        }
                    },
                    |e| tracing::warn!(error = %e, "audio stream error"),
                    None,
                )
                .map_err(backend)?;
            stream.play().map_err(backend)?;

            Ok(Self {
                _stream: stream,
                pending,
            })
        }

        pub fn trigger(&self, downbeat: bool) {
            self.pending
                .store(if downbeat { HI } else { LO }, Ordering::Release);
        }
    }
}
