mod common;

use common::{dir_is_empty, fake_pipeline, FakeSource};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use securemaestro_core::{validate, Limits, LoopSpec, MaestroError, Request};
use tempfile::tempdir;

fn loop_spec(speed: f64) -> LoopSpec {
    LoopSpec {
        start_sec: 0.0,
        end_sec: 15.0,
        speed,
        repeats: 5,
        output: "looped.wav".into(),
    }
}

fn random_host(rng: &mut StdRng) -> String {
    const LABELS: &[&str] = &[
        "evil", "example", "youtube", "youtu", "com", "be", "cdn", "m", "www", "music",
    ];
    const TLDS: &[&str] = &["com", "net", "org", "be", "io", "example"];
    let parts = rng.gen_range(1..4);
    let mut host: Vec<&str> = (0..parts).map(|_| *LABELS.choose(rng).unwrap()).collect();
    host.push(*TLDS.choose(rng).unwrap());
    host.join(".")
}

#[test]
fn disallowed_hosts_never_reach_the_network() {
    let root = tempdir().unwrap();
    let pipeline = fake_pipeline(FakeSource::minutes(1.0), root.path());
    let allowed = [
        "youtube.com",
        "www.youtube.com",
        "m.youtube.com",
        "music.youtube.com",
        "youtu.be",
    ];
    let mut rng = StdRng::seed_from_u64(7);

    let mut rejected = 0;
    for _ in 0..500 {
        let host = random_host(&mut rng);
        if allowed.contains(&host.as_str()) {
            continue;
        }
        let url = format!("https://{host}/watch?v=abc123");
        let err = pipeline.analyze(Request::analyze(url.clone())).unwrap_err();
        assert!(matches!(err, MaestroError::PolicyViolation(_)), "{url}");
        rejected += 1;
    }

    assert!(rejected > 100);
    assert_eq!(pipeline.source().calls(), 0);
    assert!(pipeline.transcoder().jobs().is_empty());
    assert!(dir_is_empty(root.path()));
}

#[test]
fn excessive_speed_is_rejected_before_acquisition() {
    let root = tempdir().unwrap();
    let pipeline = fake_pipeline(FakeSource::minutes(1.0), root.path());

    let err = pipeline
        .make_loop(Request::looped(
            "https://www.youtube.com/watch?v=abc123",
            loop_spec(3.0),
        ))
        .unwrap_err();

    match err {
        MaestroError::PolicyViolation(msg) => assert!(msg.contains("Speed")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(pipeline.source().calls(), 0);
}

#[test]
fn out_of_range_loop_parameters_are_rejected() {
    let limits = Limits::default();
    let url = "https://youtu.be/abc123";
    let cases = [
        LoopSpec { start_sec: 20.0, end_sec: 10.0, ..loop_spec(1.0) },
        LoopSpec { end_sec: 30_000.0, ..loop_spec(1.0) },
        LoopSpec { repeats: 0, ..loop_spec(1.0) },
        LoopSpec { repeats: 101, ..loop_spec(1.0) },
        loop_spec(0.0),
        loop_spec(-0.5),
        loop_spec(f64::INFINITY),
    ];
    for spec in cases {
        let desc = format!("{spec:?}");
        let err = validate(Request::looped(url, spec), &limits).unwrap_err();
        assert!(matches!(err, MaestroError::PolicyViolation(_)), "{desc}");
    }
}

#[test]
fn max_source_must_stay_under_ceiling() {
    let limits = Limits::default();
    let req = Request::analyze("https://youtu.be/abc123").with_max_source_sec(limits.max_source_sec + 1);
    assert!(validate(req, &limits).is_err());

    let req = Request::analyze("https://youtu.be/abc123").with_max_source_sec(limits.max_source_sec);
    assert_eq!(validate(req, &limits).unwrap().max_source_sec(), limits.max_source_sec);
}

#[test]
fn argument_injection_is_not_a_url() {
    let limits = Limits::default();
    for url in ["--exec=rm -rf /", "-o /tmp/x", "--config-location=/etc/passwd"] {
        let err = validate(Request::analyze(url), &limits).unwrap_err();
        assert!(matches!(err, MaestroError::PolicyViolation(_)), "{url}");
    }
}

#[test]
fn channel_and_search_urls_never_reach_the_network() {
    let root = tempdir().unwrap();
    let pipeline = fake_pipeline(FakeSource::minutes(1.0), root.path());

    for url in [
        "https://www.youtube.com/@SomeChannel/videos",
        "https://www.youtube.com/channel/UC1234567890",
        "https://www.youtube.com/c/SomeChannel",
        "https://www.youtube.com/user/someone",
        "https://www.youtube.com/results?search_query=drums",
    ] {
        let err = pipeline.analyze(Request::analyze(url)).unwrap_err();
        assert!(matches!(err, MaestroError::PolicyViolation(_)), "{url}");
    }
    assert_eq!(pipeline.source().calls(), 0);
}
