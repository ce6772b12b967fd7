use crate::{
    audio::probe_media,
    error::{MaestroError, Result},
    io::ytdlp::MediaSource,
    policy::ValidatedRequest,
    workspace::Workspace,
};
use std::{
    fs,
    marker::PhantomData,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

const PARTIAL_EXTENSIONS: &[&str] = &["part", "ytdl", "temp", "tmp"];

/// A media file inside a workspace. Cannot outlive the workspace.
#[derive(Debug, Clone)]
pub struct AcquiredMedia<'ws> {
    path: PathBuf,
    duration_sec: Option<f64>,
    sample_rate: Option<u32>,
    size_bytes: u64,
    _workspace: PhantomData<&'ws Workspace>,
}

impl<'ws> AcquiredMedia<'ws> {
    pub(crate) fn new(
        _ws: &'ws Workspace,
        path: PathBuf,
        duration_sec: Option<f64>,
        sample_rate: Option<u32>,
    ) -> Result<Self> {
        let size_bytes = fs::metadata(&path)?.len();
        Ok(Self {
            path,
            duration_sec,
            sample_rate,
            size_bytes,
            _workspace: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn duration_sec(&self) -> Option<f64> {
        self.duration_sec
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }
}

/// Fetches remote audio under a duration and byte ceiling.
pub struct BoundedAcquirer<'a, S: MediaSource + ?Sized> {
    source: &'a S,
    max_bytes: u64,
}

impl<'a, S: MediaSource + ?Sized> BoundedAcquirer<'a, S> {
    pub fn new(source: &'a S, max_bytes: u64) -> Self {
        Self { source, max_bytes }
    }

    pub fn fetch<'ws>(
        &self,
        req: &ValidatedRequest,
        ws: &'ws Workspace,
    ) -> Result<AcquiredMedia<'ws>> {
        let cap = req.max_source_sec();

        if let Some(meta) = self.source.probe(req)? {
            if meta.is_multi_item() {
                return Err(MaestroError::PolicyViolation(
                    "Source expands to multiple items; submit a single video URL.".into(),
                ));
            }
            if let Some(duration) = meta.duration_sec {
                if duration > cap as f64 {
                    return Err(MaestroError::SourceTooLong {
                        duration_sec: duration,
                        limit_sec: cap,
                    });
                }
            }
            if let Some(size) = meta.declared_size() {
                if size > self.max_bytes {
                    return Err(MaestroError::SourceTooLarge {
                        limit_bytes: self.max_bytes,
                    });
                }
            }
        }

        let dest = ws.file("download");
        fs::create_dir_all(&dest)?;
        self.source.download(req, &dest, self.max_bytes)?;

        let candidates = list_candidates(&dest)?;
        if candidates.is_empty() {
            return Err(MaestroError::AcquisitionFailed(
                "Download failed or produced no files.".into(),
            ));
        }
        if candidates.iter().any(|(_, size)| *size > self.max_bytes) {
            return Err(MaestroError::SourceTooLarge {
                limit_bytes: self.max_bytes,
            });
        }
        if candidates.len() > 1 {
            warn!(count = candidates.len(), "multiple downloads, keeping the largest");
        }

        // Largest file wins; see DESIGN.md on why this stays a heuristic.
        let (path, size) = candidates
            .into_iter()
            .max_by_key(|(_, size)| *size)
            .ok_or_else(|| MaestroError::AcquisitionFailed("no candidate file".into()))?;

        let info = probe_media(&path);
        info!(
            file = %path.display(),
            size,
            duration_sec = info.map(|i| i.duration_sec),
            "acquired source"
        );

        AcquiredMedia::new(
            ws,
            path,
            info.map(|i| i.duration_sec),
            info.map(|i| i.sample_rate),
        )
    }
}

fn list_candidates(dir: &Path) -> Result<Vec<(PathBuf, u64)>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        let path = entry.path();
        let partial = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| PARTIAL_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if partial {
            continue;
        }
        out.push((path, meta.len()));
    }
    Ok(out)
}
