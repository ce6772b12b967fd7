use crate::{
    config::ToolPaths,
    error::{MaestroError, Result},
    io::command::ToolCommand,
    policy::ValidatedRequest,
};
use serde::{de::IgnoredAny, Deserialize};
use std::path::{Path, PathBuf};
use tracing::info;

const MAX_FILESIZE_MARKER: &str = "larger than max-filesize";
/// Format selector shared by probe and download, so declared sizes describe
/// the stream that is actually fetched.
pub const AUDIO_FORMAT: &str = "bestaudio/best";

/// Metadata a remote source declares before any media is transferred.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SourceMetadata {
    pub id: Option<String>,
    #[serde(rename = "duration")]
    pub duration_sec: Option<f64>,
    pub filesize: Option<u64>,
    pub filesize_approx: Option<u64>,
    /// `"playlist"` for multi-item sources.
    #[serde(rename = "_type")]
    pub kind: Option<String>,
    pub entries: Option<Vec<IgnoredAny>>,
}

impl SourceMetadata {
    pub fn declared_size(&self) -> Option<u64> {
        self.filesize.or(self.filesize_approx)
    }

    pub fn is_multi_item(&self) -> bool {
        self.entries.is_some()
            || self
                .kind
                .as_deref()
                .is_some_and(|k| k == "playlist" || k == "multi_video")
    }
}

/// Remote media acquisition tool.
pub trait MediaSource: Send + Sync {
    /// Pre-download metadata, if the source exposes any.
    fn probe(&self, req: &ValidatedRequest) -> Result<Option<SourceMetadata>>;

    /// Fetch the best audio stream into `dest`, aborting above `max_bytes`.
    fn download(&self, req: &ValidatedRequest, dest: &Path, max_bytes: u64) -> Result<()>;
}

pub struct YtDlp {
    program: PathBuf,
}

impl YtDlp {
    pub fn new(paths: &ToolPaths) -> Self {
        Self {
            program: paths.ytdlp.clone(),
        }
    }

    fn command(&self) -> ToolCommand {
        ToolCommand::new("yt-dlp", &self.program)
            .arg("--no-playlist")
            .arg("--no-warnings")
            .arg("--format")
            .arg(AUDIO_FORMAT)
    }

    pub fn probe_command(&self, req: &ValidatedRequest) -> ToolCommand {
        self.command()
            .arg("--dump-single-json")
            .arg("--skip-download")
            .url(req)
    }

    pub fn download_command(
        &self,
        req: &ValidatedRequest,
        dest: &Path,
        max_bytes: u64,
    ) -> ToolCommand {
        self.command()
            .arg("--no-progress")
            .arg("--max-filesize")
            .uint(max_bytes)
            .arg("--output")
            .path(&dest.join("%(id)s.%(ext)s"))
            .url(req)
    }
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new(&ToolPaths::from_env())
    }
}

impl MediaSource for YtDlp {
    fn probe(&self, req: &ValidatedRequest) -> Result<Option<SourceMetadata>> {
        let out = self.probe_command(req).run()?;

        if out.stdout.trim().is_empty() {
            return Ok(None);
        }
        let meta: SourceMetadata = serde_json::from_str(&out.stdout)?;
        Ok(Some(meta))
    }

    fn download(&self, req: &ValidatedRequest, dest: &Path, max_bytes: u64) -> Result<()> {
        info!(video_id = req.video_id(), "downloading audio");

        let out = self
            .download_command(req, dest, max_bytes)
            .run()
            .map_err(|e| match e {
                MaestroError::ExternalToolError { ref diagnostic, .. }
                    if diagnostic.contains(MAX_FILESIZE_MARKER) =>
                {
                    MaestroError::SourceTooLarge {
                        limit_bytes: max_bytes,
                    }
                }
                other => other,
            })?;

        // yt-dlp exits 0 after skipping an oversized file.
        if out.stdout.contains(MAX_FILESIZE_MARKER) || out.stderr.contains(MAX_FILESIZE_MARKER) {
            return Err(MaestroError::SourceTooLarge {
                limit_bytes: max_bytes,
            });
        }
        Ok(())
    }
}
