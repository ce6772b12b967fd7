use anyhow::Result;
use clap::{Parser, Subcommand};
use securemaestro_core::{
    build_router, select_cue_sink, AppState, DefaultPipeline, LoopSpec, Metronome,
    MetronomeSettings, Outcome, Request, DEFAULT_MAX_SOURCE_SEC,
};
use std::{path::PathBuf, process};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "securemaestro")]
#[command(about = "Practice loops, beat analysis and a drift-free metronome", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download audio, cut [start, end], apply speed and repeat N times
    Loop {
        /// YouTube URL
        url: String,

        /// Start time in seconds
        #[arg(long, default_value_t = 0.0)]
        start: f64,

        /// End time in seconds
        #[arg(long, default_value_t = 15.0)]
        end: f64,

        /// Playback speed (0.5-2.0). Ex: 0.5, 0.7, 0.9
        #[arg(long, default_value_t = 0.7)]
        speed: f64,

        /// How many times to repeat the section
        #[arg(long, default_value_t = 5)]
        repeats: u32,

        /// Output file path (.wav/.mp3)
        #[arg(short, long, default_value = "outputs/looped.wav")]
        out: PathBuf,

        /// Max full video length allowed (sec)
        #[arg(long, default_value_t = DEFAULT_MAX_SOURCE_SEC)]
        max_download_sec: u64,
    },

    /// Estimate tempo, beats and onsets; prints JSON
    Analyze {
        /// YouTube URL
        url: String,

        #[arg(long)]
        pretty: bool,
    },

    /// Run a metronome; Ctrl+C stops it
    Metronome {
        /// Beats per minute (e.g., 60, 90, 120)
        bpm: f64,

        /// Total beats to play (default: infinite)
        #[arg(short = 'n', long)]
        beats: Option<u64>,

        /// Meter for accenting (e.g., 4/4, 3/4)
        #[arg(short, long, default_value = "4/4")]
        meter: String,

        /// Text marker only, no sound
        #[arg(long)]
        silent: bool,
    },

    /// Serve the HTTP API
    Serve {
        #[arg(long, env = "SECUREMAESTRO_BIND", default_value = "127.0.0.1:8000")]
        bind: String,

        /// Directory for loop outputs
        #[arg(long, env = "SECUREMAESTRO_OUTPUT_DIR", default_value = "outputs")]
        output_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Loop {
            url,
            start,
            end,
            speed,
            repeats,
            out,
            max_download_sec,
        } => {
            let spec = LoopSpec {
                start_sec: start,
                end_sec: end,
                speed,
                repeats,
                output: out,
            };
            handle_loop(Request::looped(url, spec).with_max_source_sec(max_download_sec)).await
        }
        Commands::Analyze { url, pretty } => handle_analyze(url, pretty).await,
        Commands::Metronome {
            bpm,
            beats,
            meter,
            silent,
        } => {
            let settings = MetronomeSettings {
                bpm,
                meter,
                total_beats: beats,
            };
            handle_metronome(settings, silent).await
        }
        Commands::Serve { bind, output_dir } => handle_serve(bind, output_dir).await,
    };

    match result {
        Ok(()) => process::exit(0),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

async fn handle_loop(req: Request) -> Result<()> {
    let outcome = tokio::task::spawn_blocking(move || {
        let pipeline = DefaultPipeline::from_env();
        pipeline.transcoder().check()?;
        pipeline.make_loop(req)
    })
    .await??;

    eprintln!(
        "Done! Wrote: {} ({} repeats, {:.1}s)",
        outcome.output.display(),
        outcome.repetitions,
        outcome.duration_sec
    );
    Ok(())
}

async fn handle_analyze(url: String, pretty: bool) -> Result<()> {
    let timing = tokio::task::spawn_blocking(move || {
        DefaultPipeline::from_env().analyze(Request::analyze(url))
    })
    .await??;

    let json = if pretty {
        serde_json::to_string_pretty(&timing)?
    } else {
        serde_json::to_string(&timing)?
    };
    println!("{json}");
    Ok(())
}

async fn handle_metronome(settings: MetronomeSettings, silent: bool) -> Result<()> {
    let mut metronome = Metronome::new(&settings)?;
    let mut sink = select_cue_sink(!silent);

    eprintln!(
        "Metronome: {} bpm, meter {} ({})",
        settings.bpm,
        settings.meter,
        sink.describe()
    );
    eprintln!("Press Ctrl+C to stop.\n");

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    match metronome.run(sink.as_mut(), &cancel).await {
        Ok(Outcome::Cancelled { .. }) => eprintln!("\nStopped."),
        Ok(Outcome::Stopped { .. }) => {}
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

async fn handle_serve(bind: String, output_dir: PathBuf) -> Result<()> {
    std::fs::create_dir_all(&output_dir)?;
    let pipeline = DefaultPipeline::from_env();
    pipeline.transcoder().check()?;

    let app = build_router(AppState::new(pipeline, output_dir));
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("Listening on http://{bind}");
    axum::serve(listener, app).await?;
    Ok(())
}
