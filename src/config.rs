use std::{env, path::PathBuf};

pub const YTDLP_ENV: &str = "SECUREMAESTRO_YTDLP";
pub const FFMPEG_ENV: &str = "SECUREMAESTRO_FFMPEG";
pub const TMP_DIR_ENV: &str = "SECUREMAESTRO_TMP_DIR";

/// Locations of the external tools the pipeline shells out to.
#[derive(Clone, Debug)]
pub struct ToolPaths {
    pub ytdlp: PathBuf,
    pub ffmpeg: PathBuf,
}

impl ToolPaths {
    pub fn from_env() -> Self {
        Self {
            ytdlp: env::var_os(YTDLP_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("yt-dlp")),
            ffmpeg: env::var_os(FFMPEG_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("ffmpeg")),
        }
    }
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Base directory for workspaces; `None` means the system temp dir.
pub fn tmp_dir() -> Option<PathBuf> {
    env::var_os(TMP_DIR_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
