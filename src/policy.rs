//! Validation gate.
//!
//! Everything a caller sends passes through [`validate`] before the crate
//! touches the network, the filesystem or a subprocess. Downstream stages
//! only accept [`ValidatedRequest`], which has no public constructor.

use crate::{
    error::{MaestroError, Result},
    types::{Job, Limits, LoopSpec, Request, MAX_TIMESTAMP_SEC},
};
use std::path::Path;
use tracing::debug;

const ALLOWED_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtu.be",
];

#[derive(Clone, Debug)]
pub enum ValidatedJob {
    Analyze,
    Loop(LoopSpec),
}

/// A request that passed every policy check. Immutable.
#[derive(Clone, Debug)]
pub struct ValidatedRequest {
    url: String,
    video_id: String,
    job: ValidatedJob,
    max_source_sec: u64,
}

impl ValidatedRequest {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn job(&self) -> &ValidatedJob {
        &self.job
    }

    pub fn max_source_sec(&self) -> u64 {
        self.max_source_sec
    }

    pub fn loop_spec(&self) -> Option<&LoopSpec> {
        match &self.job {
            ValidatedJob::Loop(spec) => Some(spec),
            ValidatedJob::Analyze => None,
        }
    }
}

pub fn validate(req: Request, limits: &Limits) -> Result<ValidatedRequest> {
    let parts = split_url(&req.url)?;

    if !ALLOWED_HOSTS.contains(&parts.host.as_str()) {
        return Err(MaestroError::policy(
            "Only YouTube/youtu.be URLs are allowed.",
        ));
    }
    if is_playlist(&parts) {
        return Err(MaestroError::policy(
            "Playlists not supported; submit a single video URL.",
        ));
    }
    let video_id = single_video_id(&parts).ok_or_else(|| {
        MaestroError::policy("URL does not reference a single video.")
    })?;

    if let Job::Loop(spec) = &req.job {
        check_window(spec.start_sec, spec.end_sec)?;
        check_speed(spec.speed, limits.max_speed)?;
        check_repeats(spec.repeats, limits.max_repeats)?;
        check_output(&spec.output)?;
    }

    let default_cap = match req.job {
        Job::Analyze => limits.default_analyze_source_sec,
        Job::Loop(_) => limits.default_loop_source_sec,
    };
    let max_source_sec = match req.max_source_sec {
        None => default_cap,
        Some(0) => {
            return Err(MaestroError::policy(
                "Maximum source duration must be a positive number of seconds.",
            ))
        }
        Some(s) if s > limits.max_source_sec => {
            return Err(MaestroError::policy(format!(
                "Maximum source duration must be at most {}s.",
                limits.max_source_sec
            )))
        }
        Some(s) => s,
    };

    debug!(video_id = %video_id, max_source_sec, "request validated");

    Ok(ValidatedRequest {
        url: req.url,
        video_id,
        job: match req.job {
            Job::Analyze => ValidatedJob::Analyze,
            Job::Loop(spec) => ValidatedJob::Loop(spec),
        },
        max_source_sec,
    })
}

struct UrlParts {
    host: String,
    path: String,
    query: String,
}

fn split_url(raw: &str) -> Result<UrlParts> {
    if raw.is_empty() || raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(MaestroError::policy("URL contains invalid characters."));
    }

    let lower = raw.to_ascii_lowercase();
    let rest = if lower.starts_with("https://") {
        &raw[8..]
    } else if lower.starts_with("http://") {
        &raw[7..]
    } else if lower.contains("://") {
        return Err(MaestroError::policy("Only http(s) URLs are allowed."));
    } else {
        raw
    };

    let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(authority_end);

    if authority.contains('@') {
        return Err(MaestroError::policy("Credentials in URLs are not allowed."));
    }
    let host = match authority.split_once(':') {
        Some((host, port)) => {
            if port.is_empty() || !port.chars().all(|c| c.is_ascii_digit()) {
                return Err(MaestroError::policy("URL port is malformed."));
            }
            host
        }
        None => authority,
    };

    let tail = tail.split('#').next().unwrap_or("");
    let (path, query) = match tail.split_once('?') {
        Some((p, q)) => (p, q),
        None => (tail, ""),
    };

    Ok(UrlParts {
        host: host.to_ascii_lowercase(),
        path: path.to_string(),
        query: query.to_string(),
    })
}

fn query_param<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        (k == key).then_some(v)
    })
}

fn is_playlist(parts: &UrlParts) -> bool {
    parts.path.to_ascii_lowercase().starts_with("/playlist")
        || query_param(&parts.query, "list").is_some()
}

/// Video id for the single-video URL shapes; `None` for anything that could
/// expand to several items (channels, handles, searches, feeds).
fn single_video_id(parts: &UrlParts) -> Option<String> {
    let mut segments = parts.path.split('/').filter(|s| !s.is_empty());
    let first = segments.next()?;

    let candidate = if parts.host == "youtu.be" {
        first
    } else {
        match first {
            "watch" => query_param(&parts.query, "v")?,
            "shorts" | "live" | "embed" => segments.next()?,
            _ => return None,
        }
    };
    if segments.next().is_some() {
        return None;
    }

    let valid = !candidate.is_empty()
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then(|| candidate.to_string())
}

fn check_window(start: f64, end: f64) -> Result<()> {
    for t in [start, end] {
        if !t.is_finite() || !(0.0..=MAX_TIMESTAMP_SEC).contains(&t) {
            return Err(MaestroError::policy(format!(
                "Time must be within 0..{} seconds.",
                MAX_TIMESTAMP_SEC as u64
            )));
        }
    }
    if start >= end {
        return Err(MaestroError::policy("end must be greater than start."));
    }
    Ok(())
}

fn check_speed(speed: f64, max: f64) -> Result<()> {
    if !speed.is_finite() || speed <= 0.0 || speed > max {
        return Err(MaestroError::policy(format!("Speed must be in (0, {max}].")));
    }
    Ok(())
}

fn check_repeats(repeats: u32, max: u32) -> Result<()> {
    if repeats < 1 || repeats > max {
        return Err(MaestroError::policy(format!("Repeats must be 1..{max}.")));
    }
    Ok(())
}

fn check_output(output: &Path) -> Result<()> {
    if output.as_os_str().is_empty() || output.file_name().is_none() {
        return Err(MaestroError::policy("Output path must name a file."));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loop_req(url: &str, speed: f64) -> Request {
        Request::looped(
            url,
            LoopSpec {
                start_sec: 0.0,
                end_sec: 15.0,
                speed,
                repeats: 5,
                output: "out/looped.wav".into(),
            },
        )
    }

    #[test]
    fn accepts_short_and_long_youtube_forms() {
        let limits = Limits::default();
        for url in [
            "https://youtu.be/abc123",
            "http://www.youtube.com/watch?v=abc123",
            "youtube.com/watch?v=abc123&t=30",
            "HTTPS://M.YOUTUBE.COM/watch?v=abc123",
        ] {
            let v = validate(loop_req(url, 0.7), &limits).unwrap();
            assert_eq!(v.video_id(), "abc123", "{url}");
        }
    }

    #[test]
    fn rejects_lookalike_hosts() {
        let limits = Limits::default();
        for url in [
            "https://youtube.com.evil.example/watch?v=x",
            "https://evil.example/youtube.com/watch?v=x",
            "https://youtube.com@evil.example/watch?v=x",
            "ftp://youtube.com/watch?v=x",
            "https://youtu.be/",
            "https://youtu.be/abc 123",
            "-o/etc/passwd",
        ] {
            let err = validate(loop_req(url, 0.7), &limits).unwrap_err();
            assert!(matches!(err, MaestroError::PolicyViolation(_)), "{url}");
        }
    }

    #[test]
    fn rejects_playlists() {
        let limits = Limits::default();
        for url in [
            "https://www.youtube.com/playlist?list=PL123",
            "https://www.youtube.com/watch?v=abc&list=PL123",
            "https://youtu.be/abc?list=PL123",
        ] {
            let err = validate(Request::analyze(url), &limits).unwrap_err();
            assert!(err.to_string().contains("Playlists"), "{url}");
        }
    }

    #[test]
    fn rejects_multi_item_sources() {
        let limits = Limits::default();
        for url in [
            "https://www.youtube.com/@SomeChannel/videos",
            "https://www.youtube.com/@SomeChannel",
            "https://www.youtube.com/channel/UC1234567890",
            "https://www.youtube.com/c/SomeChannel",
            "https://www.youtube.com/user/someone",
            "https://www.youtube.com/results?search_query=drums",
            "https://www.youtube.com/feed/trending",
            "https://www.youtube.com/watch",
            "https://www.youtube.com/watch?v=",
            "https://youtube.com/shorts/",
            "https://youtube.com/shorts/abc123/extra",
            "https://youtu.be/abc123/extra",
        ] {
            let err = validate(Request::analyze(url), &limits).unwrap_err();
            assert!(matches!(err, MaestroError::PolicyViolation(_)), "{url}");
        }
    }

    #[test]
    fn accepts_shorts_live_and_embed() {
        let limits = Limits::default();
        for url in [
            "https://youtube.com/shorts/abc123",
            "https://www.youtube.com/live/abc123?feature=share",
            "https://www.youtube.com/embed/abc123",
            "https://youtu.be/abc123?t=42",
        ] {
            let v = validate(Request::analyze(url), &limits).unwrap();
            assert_eq!(v.video_id(), "abc123", "{url}");
        }
    }

    #[test]
    fn defaults_max_source_per_job() {
        let limits = Limits::default();
        let a = validate(Request::analyze("https://youtu.be/a"), &limits).unwrap();
        assert_eq!(a.max_source_sec(), limits.default_analyze_source_sec);
        let l = validate(loop_req("https://youtu.be/a", 1.0), &limits).unwrap();
        assert_eq!(l.max_source_sec(), limits.default_loop_source_sec);
        let err = validate(Request::analyze("https://youtu.be/a").with_max_source_sec(0), &limits);
        assert!(err.is_err());
    }

    #[test]
    fn window_and_speed_bounds() {
        let limits = Limits::default();
        assert!(check_window(0.0, 21_600.0).is_ok());
        assert!(check_window(10.0, 10.0).is_err());
        assert!(check_window(-1.0, 10.0).is_err());
        assert!(check_window(0.0, 21_600.5).is_err());
        assert!(check_window(0.0, f64::NAN).is_err());
        assert!(check_speed(2.0, limits.max_speed).is_ok());
        assert!(check_speed(0.0, limits.max_speed).is_err());
        assert!(check_speed(3.0, limits.max_speed).is_err());
        assert!(check_repeats(0, limits.max_repeats).is_err());
        assert!(check_repeats(100, limits.max_repeats).is_ok());
        assert!(check_repeats(101, limits.max_repeats).is_err());
    }
}
