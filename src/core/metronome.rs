//! Drift-resistant periodic playback.
//!
//! Tick `n` is due at `start + (n - 1) * 60 / bpm`, always computed from the
//! absolute start, so scheduling jitter never accumulates. A late tick fires
//! immediately and is never doubled.

use crate::{
    cue::{CueSink, Tick},
    error::{MaestroError, Result},
};
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct MetronomeSettings {
    pub bpm: f64,
    /// `"N/M"`; only `N` (beats per bar) affects accenting.
    pub meter: String,
    /// `None` runs until cancelled.
    pub total_beats: Option<u64>,
}

impl Default for MetronomeSettings {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            meter: "4/4".into(),
            total_beats: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
    Cancelled,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Stopped { ticks: u64 },
    Cancelled { ticks: u64 },
}

struct ScheduleState {
    tick: u64,
    meter: u64,
    start: Instant,
    interval_sec: f64,
}

impl ScheduleState {
    fn is_downbeat(&self) -> bool {
        (self.tick - 1) % self.meter == 0
    }

    /// Absolute due time of tick `n` (1-based); `None` when it cannot be
    /// represented as an instant.
    fn due(&self, n: u64) -> Option<Instant> {
        let offset = Duration::try_from_secs_f64((n - 1) as f64 * self.interval_sec).ok()?;
        self.start.checked_add(offset)
    }
}

/// Parse the beats-per-bar from a meter such as `"4/4"` or `"7/8"`.
pub fn parse_meter(meter: &str) -> Result<u64> {
    let invalid = || MaestroError::InvalidParameter(format!(
        "Invalid meter '{meter}'. Use like '4/4' or '3/4'."
    ));

    let (top, bottom) = match meter.trim().split_once('/') {
        Some((t, b)) => (t.trim(), Some(b.trim())),
        None => (meter.trim(), None),
    };
    let top: u64 = top.parse().map_err(|_| invalid())?;
    if top < 1 {
        return Err(invalid());
    }
    if let Some(bottom) = bottom {
        match bottom.parse::<u64>() {
            Ok(b) if b >= 1 => {}
            _ => return Err(invalid()),
        }
    }
    Ok(top)
}

pub struct Metronome {
    bpm: f64,
    interval: Duration,
    meter: u64,
    total_beats: Option<u64>,
    state: SchedulerState,
}

impl Metronome {
    pub fn new(settings: &MetronomeSettings) -> Result<Self> {
        if !settings.bpm.is_finite() || settings.bpm <= 0.0 {
            return Err(MaestroError::InvalidParameter(
                "BPM must be a positive number.".into(),
            ));
        }
        let interval = Duration::try_from_secs_f64(60.0 / settings.bpm).map_err(|_| {
            MaestroError::InvalidParameter(format!("BPM {} is too slow.", settings.bpm))
        })?;
        let meter = parse_meter(&settings.meter)?;
        if settings.total_beats == Some(0) {
            return Err(MaestroError::InvalidParameter(
                "Total beats must be at least 1.".into(),
            ));
        }

        Ok(Self {
            bpm: settings.bpm,
            interval,
            meter,
            total_beats: settings.total_beats,
            state: SchedulerState::Idle,
        })
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn meter(&self) -> u64 {
        self.meter
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Tick until the beat count is reached, `cancel` fires, or the sink
    /// fails. Cancellation is observed between ticks and wakes the wait.
    pub async fn run(
        &mut self,
        sink: &mut dyn CueSink,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        if self.state != SchedulerState::Idle {
            return Err(MaestroError::InvalidParameter(
                "metronome already ran".into(),
            ));
        }
        self.state = SchedulerState::Running;
        info!(
            bpm = self.bpm,
            meter = self.meter,
            total_beats = self.total_beats,
            sink = sink.describe(),
            "metronome started"
        );

        let mut sched = ScheduleState {
            tick: 0,
            meter: self.meter,
            start: Instant::now(),
            interval_sec: 60.0 / self.bpm,
        };

        loop {
            if cancel.is_cancelled() {
                return Ok(self.finish(Outcome::Cancelled { ticks: sched.tick }));
            }

            sched.tick += 1;
            let tick = Tick {
                index: sched.tick,
                downbeat: sched.is_downbeat(),
            };
            if let Err(e) = sink.cue(tick) {
                self.state = SchedulerState::Failed;
                warn!(tick = sched.tick, error = %e, "metronome failed");
                return Err(e);
            }
            debug!(tick = sched.tick, downbeat = tick.downbeat, "tick");

            if self.total_beats.is_some_and(|total| sched.tick >= total) {
                return Ok(self.finish(Outcome::Stopped { ticks: sched.tick }));
            }

            let Some(next) = sched.due(sched.tick + 1) else {
                self.state = SchedulerState::Failed;
                warn!(tick = sched.tick, "next tick is out of range");
                return Err(MaestroError::InvalidParameter(format!(
                    "tick {} cannot be scheduled at {} bpm",
                    sched.tick + 1,
                    self.bpm
                )));
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Ok(self.finish(Outcome::Cancelled { ticks: sched.tick }));
                }
                _ = sleep_until(next) => {}
            }
        }
    }

    fn finish(&mut self, outcome: Outcome) -> Outcome {
        self.state = match outcome {
            Outcome::Stopped { .. } => SchedulerState::Stopped,
            Outcome::Cancelled { .. } => SchedulerState::Cancelled,
        };
        info!(?outcome, "metronome finished");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meter_parsing() {
        assert_eq!(parse_meter("4/4").unwrap(), 4);
        assert_eq!(parse_meter("7/8").unwrap(), 7);
        assert_eq!(parse_meter(" 3 / 4 ").unwrap(), 3);
        assert_eq!(parse_meter("5").unwrap(), 5);
        for bad in ["0/4", "x/4", "4/0", "4/x", "", "/4", "-1/4", "2.5/4"] {
            let err = parse_meter(bad).unwrap_err();
            assert!(matches!(err, MaestroError::InvalidParameter(_)), "{bad}");
        }
    }

    #[test]
    fn rejects_bad_bpm_and_zero_beats() {
        let mut s = MetronomeSettings::default();
        s.bpm = 0.0;
        assert!(Metronome::new(&s).is_err());
        s.bpm = f64::NAN;
        assert!(Metronome::new(&s).is_err());
        s.bpm = 90.0;
        s.total_beats = Some(0);
        assert!(Metronome::new(&s).is_err());
        s.total_beats = Some(8);
        s.bpm = 1e-300;
        let err = Metronome::new(&s).err().unwrap();
        assert!(matches!(err, MaestroError::InvalidParameter(_)));
        s.bpm = 90.0;
        let m = Metronome::new(&s).unwrap();
        assert_eq!(m.state(), SchedulerState::Idle);
        assert_eq!(m.interval(), Duration::from_secs_f64(60.0 / 90.0));
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_tick_time_fails_the_run() {
        // 60 / 5e-18 s fits a Duration but not an Instant offset.
        let settings = MetronomeSettings {
            bpm: 5e-18,
            meter: "4/4".into(),
            total_beats: Some(3),
        };
        let mut m = Metronome::new(&settings).unwrap();
        let mut sink = crate::cue::TextCue::new(Vec::new());

        let err = m.run(&mut sink, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, MaestroError::InvalidParameter(_)));
        assert_eq!(m.state(), SchedulerState::Failed);
        assert_eq!(sink.into_inner(), b"TICK\n");
    }
}
